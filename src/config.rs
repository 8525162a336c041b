//! Configuration loader - YAML manifest + .env overrides

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::features::FeatureKind;
use crate::loader::DataSource;
use crate::selection::{default_popup_fields, FieldSpec};
use crate::surface::{FitOptions, Padding};

/// Main configuration loaded from catastro.yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sources: Sources,
    pub initial_view: InitialView,
    pub basemap: Basemap,
    pub palette: PaletteConfig,
    pub camera: CameraConfig,
    pub popup_fields: Vec<FieldSpec>,
    pub search_fields: Vec<String>,
}

/// Where the two GeoJSON documents live (URL or path)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Sources {
    pub sections: String,
    pub parcels: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialView {
    pub lat: f64,
    pub lon: f64,
    pub zoom: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Basemap {
    pub url_template: String,
    pub max_zoom: u8,
    pub attribution: String,
    pub user_agent: String,
}

/// Section colors: curated table, fallback rotation, neutral gray
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaletteConfig {
    pub known: BTreeMap<String, String>,
    pub fallback: Vec<String>,
    pub neutral: String,
}

/// Camera framing on selection, in screen pixels.
///
/// The side panel width is added to `padding_right` at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub padding_top: f32,
    pub padding_right: f32,
    pub padding_bottom: f32,
    pub padding_left: f32,
    pub max_zoom: f64,
    pub duration_secs: f32,
}

/// Overrides loaded from .env / the environment
#[derive(Debug, Clone)]
pub struct Env {
    pub data_dir: String,
    pub tile_url: Option<String>,
    pub log_dir: String,
}

impl Config {
    /// Load configuration from YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Resolve the document source for a layer against the data dir
    pub fn source_for(&self, kind: FeatureKind, env: &Env) -> DataSource {
        let raw = match kind {
            FeatureKind::Section => &self.sources.sections,
            FeatureKind::Parcel => &self.sources.parcels,
        };
        DataSource::resolve(raw, &env.data_dir)
    }

    pub fn tile_template<'a>(&'a self, env: &'a Env) -> &'a str {
        env.tile_url.as_deref().unwrap_or(&self.basemap.url_template)
    }
}

impl CameraConfig {
    pub fn fit_options(&self) -> FitOptions {
        FitOptions {
            padding: Padding {
                top: self.padding_top,
                right: self.padding_right,
                bottom: self.padding_bottom,
                left: self.padding_left,
            },
            max_zoom: self.max_zoom,
            duration: Duration::from_secs_f32(self.duration_secs.max(0.0)),
        }
    }
}

impl Env {
    /// Load overrides from .env file
    pub fn load() -> Self {
        dotenvy::dotenv().ok();

        Env {
            data_dir: std::env::var("CATASTRO_DATA_DIR").unwrap_or_else(|_| ".".to_string()),
            tile_url: std::env::var("CATASTRO_TILE_URL").ok().filter(|s| !s.is_empty()),
            log_dir: std::env::var("CATASTRO_LOG_DIR").unwrap_or_else(|_| "logs".to_string()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sources: Sources::default(),
            initial_view: InitialView::default(),
            basemap: Basemap::default(),
            palette: PaletteConfig::default(),
            camera: CameraConfig::default(),
            popup_fields: default_popup_fields(),
            search_fields: default_search_fields(),
        }
    }
}

impl Default for Sources {
    fn default() -> Self {
        Self {
            sections: "sections.geojson".to_string(),
            parcels: "parcels.geojson".to_string(),
        }
    }
}

impl Default for InitialView {
    fn default() -> Self {
        Self {
            lat: -34.266,
            lon: -62.712,
            zoom: 14.0,
        }
    }
}

impl Default for Basemap {
    fn default() -> Self {
        Self {
            url_template: "https://tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
            max_zoom: 19,
            attribution: "Map data © OpenStreetMap contributors".to_string(),
            user_agent: concat!("catastro_viewer/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Default for PaletteConfig {
    fn default() -> Self {
        let known = [
            ("SECCION 1", "#8e44ad"),
            ("SECCION 2", "#2980b9"),
            ("SECCION 3", "#27ae60"),
            ("SECCION 4", "#16a085"),
            ("SECCION 5", "#f39c12"),
            ("SECCION 6", "#d35400"),
            ("SECCION 7", "#c0392b"),
            ("SECCION 8", "#2c3e50"),
        ]
        .into_iter()
        .map(|(name, hex)| (name.to_string(), hex.to_string()))
        .collect();

        Self {
            known,
            fallback: ["#e84393", "#00cec9", "#6c5ce7", "#fdcb6e", "#e17055", "#0984e3"]
                .into_iter()
                .map(String::from)
                .collect(),
            neutral: "#95a5a6".to_string(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        // Popup opens above the parcel, side panel sits on the right
        Self {
            padding_top: 280.0,
            padding_right: 40.0,
            padding_bottom: 40.0,
            padding_left: 40.0,
            max_zoom: 18.0,
            duration_secs: 0.8,
        }
    }
}

pub fn default_search_fields() -> Vec<String> {
    vec!["TGI".to_string(), "PARTIDA".to_string(), "NOMBRE".to_string()]
}
