//! Section legend / filter panel state
//!
//! Built once per successful sections load. Names are grouped by their
//! normalized form, so "Seccion 1" and "SECCIÓN 1 " are one entry.

use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{info, warn};

use crate::attributes::normalize_key;
use crate::colors::{Rgb, SectionColors};
use crate::features::MapFeature;
use crate::layers::{section_label, LayerRegistry};

/// Substring identifying the section field among property keys
pub const SECTION_FIELD_HINT: &str = "SECCION";

#[derive(Error, Debug, PartialEq)]
pub enum LegendError {
    #[error("section layer has no features")]
    NoFeatures,
    #[error("no property containing \"SECCION\" in the first section feature")]
    MissingSectionField,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegendEntry {
    /// Normalized name, the grouping key
    pub key: String,
    /// First-seen trimmed spelling
    pub label: String,
    pub color: Rgb,
    pub visible: bool,
    pub count: usize,
}

#[derive(Debug, Clone)]
pub struct SectionLegend {
    field: String,
    entries: Vec<LegendEntry>,
    all_checked: bool,
}

impl SectionLegend {
    /// First property key of `feature` whose normalized form contains the hint
    pub fn detect_field(feature: &MapFeature) -> Option<String> {
        feature
            .properties
            .as_ref()?
            .keys()
            .find(|key| normalize_key(key).contains(SECTION_FIELD_HINT))
            .cloned()
    }

    pub fn build(sections: &[MapFeature], colors: &mut SectionColors) -> Result<Self, LegendError> {
        let first = sections.first().ok_or(LegendError::NoFeatures)?;
        let Some(field) = Self::detect_field(first) else {
            warn!("Legend disabled: {}", LegendError::MissingSectionField);
            return Err(LegendError::MissingSectionField);
        };

        let mut grouped: BTreeMap<String, (String, usize)> = BTreeMap::new();
        for feature in sections {
            if let Some(label) = section_label(feature, &field) {
                grouped
                    .entry(normalize_key(&label))
                    .or_insert_with(|| (label, 0))
                    .1 += 1;
            }
        }

        let entries: Vec<LegendEntry> = grouped
            .into_iter()
            .map(|(key, (label, count))| LegendEntry {
                color: colors.color_for(Some(label.as_str())),
                key,
                label,
                visible: true,
                count,
            })
            .collect();

        info!("Legend built on field '{}': {} sections", field, entries.len());
        Ok(Self {
            field,
            entries,
            all_checked: true,
        })
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn entries(&self) -> &[LegendEntry] {
        &self.entries
    }

    pub fn all_checked(&self) -> bool {
        self.all_checked
    }

    /// One section checkbox changed. Unchecking clears the master checkbox.
    pub fn toggle(&mut self, registry: &mut LayerRegistry, name: &str, visible: bool) {
        let key = normalize_key(name);
        let Some(entry) = self.entries.iter_mut().find(|entry| entry.key == key) else {
            warn!("Toggle for unknown section '{}'", name);
            return;
        };
        entry.visible = visible;
        registry.set_section_visible(&entry.key, visible);
        if !visible {
            self.all_checked = false;
        }
    }

    /// Master checkbox: every section follows it, including those with no
    /// name in the section field
    pub fn set_all(&mut self, registry: &mut LayerRegistry, visible: bool) {
        info!("All sections visible={}", visible);
        self.all_checked = visible;
        for entry in self.entries.iter_mut() {
            entry.visible = visible;
        }
        registry.set_all_sections_visible(visible);
    }
}
