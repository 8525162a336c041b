//! Data loader - fetch the sections and parcels GeoJSON documents
//!
//! Each document is fetched in its own task, so a stalled or failed sections
//! request never holds back the parcels. Outcomes reach the GUI thread as
//! `LoadEvent`s.

use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;

use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use crate::features::{parse_collection, FeatureError, FeatureKind, MapFeature};

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("cannot read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Features(#[from] FeatureError),
}

/// Where a GeoJSON document comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    Url(String),
    File(PathBuf),
}

impl DataSource {
    /// Resolve a configured location against the data dir (a path or a URL prefix)
    pub fn resolve(raw: &str, base: &str) -> Self {
        if is_url(raw) {
            return DataSource::Url(raw.to_string());
        }
        if is_url(base) {
            return DataSource::Url(format!(
                "{}/{}",
                base.trim_end_matches('/'),
                raw.trim_start_matches('/')
            ));
        }
        let path = Path::new(raw);
        if path.is_absolute() {
            DataSource::File(path.to_path_buf())
        } else {
            DataSource::File(Path::new(base).join(path))
        }
    }
}

impl std::fmt::Display for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataSource::Url(url) => write!(f, "{}", url),
            DataSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Outcome of one document load, delivered to the GUI thread
#[derive(Debug)]
pub enum LoadEvent {
    Sections(Result<Vec<MapFeature>, LoadError>),
    Parcels(Result<Vec<MapFeature>, LoadError>),
}

pub async fn fetch_text(client: &reqwest::Client, source: &DataSource) -> Result<String, LoadError> {
    match source {
        DataSource::Url(url) => {
            debug!("Fetching from: {}", url);
            let network = |source: reqwest::Error| LoadError::Network {
                url: url.clone(),
                source,
            };
            let response = client.get(url).send().await.map_err(network)?;
            if !response.status().is_success() {
                return Err(LoadError::Status {
                    url: url.clone(),
                    status: response.status().as_u16(),
                });
            }
            response.text().await.map_err(network)
        }
        DataSource::File(path) => {
            debug!("Reading from: {:?}", path);
            tokio::fs::read_to_string(path).await.map_err(|source| LoadError::Io {
                path: path.clone(),
                source,
            })
        }
    }
}

/// Fetch and parse one FeatureCollection
pub async fn fetch_collection(
    client: &reqwest::Client,
    source: &DataSource,
    kind: FeatureKind,
) -> Result<Vec<MapFeature>, LoadError> {
    info!("Loading {} from {}", kind.label(), source);
    let text = fetch_text(client, source).await?;
    debug!("Downloaded {} bytes of {}", text.len(), kind.label());

    let features = parse_collection(kind, &text)?;
    info!("Loaded {} {}", features.len(), kind.label());
    Ok(features)
}

/// Kick off both document loads; `notify` is called after each event is sent
pub fn spawn_load<F>(
    runtime: &Handle,
    client: reqwest::Client,
    sections: DataSource,
    parcels: DataSource,
    tx: Sender<LoadEvent>,
    notify: F,
) where
    F: Fn() + Clone + Send + Sync + 'static,
{
    {
        let client = client.clone();
        let tx = tx.clone();
        let notify = notify.clone();
        runtime.spawn(async move {
            let result = fetch_collection(&client, &sections, FeatureKind::Section).await;
            if let Err(e) = &result {
                warn!("Sections unavailable, continuing without them: {}", e);
            }
            let _ = tx.send(LoadEvent::Sections(result));
            notify();
        });
    }

    runtime.spawn(async move {
        let result = fetch_collection(&client, &parcels, FeatureKind::Parcel).await;
        if let Err(e) = &result {
            error!("Parcels failed to load: {}", e);
        }
        let _ = tx.send(LoadEvent::Parcels(result));
        notify();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{"type":"FeatureCollection","features":[
        {"type":"Feature","properties":{"SECCION":"Seccion 1"},
         "geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,1],[0,0]]]}}
    ]}"#;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("catastro_viewer_{}_{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_resolve_sources() {
        assert_eq!(
            DataSource::resolve("https://x.org/p.geojson", "./data"),
            DataSource::Url("https://x.org/p.geojson".to_string())
        );
        assert_eq!(
            DataSource::resolve("parcels.geojson", "https://x.org/data/"),
            DataSource::Url("https://x.org/data/parcels.geojson".to_string())
        );
        assert_eq!(
            DataSource::resolve("parcels.geojson", "data"),
            DataSource::File(Path::new("data").join("parcels.geojson"))
        );
    }

    #[tokio::test]
    async fn test_fetch_collection_from_file() {
        let dir = temp_dir("ok");
        let path = dir.join("sections.geojson");
        std::fs::write(&path, DOC).unwrap();

        let client = reqwest::Client::new();
        let features = fetch_collection(&client, &DataSource::File(path), FeatureKind::Section)
            .await
            .unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].kind, FeatureKind::Section);
    }

    #[tokio::test]
    async fn test_missing_and_malformed_documents() {
        let dir = temp_dir("bad");
        let client = reqwest::Client::new();

        let missing = DataSource::File(dir.join("nope.geojson"));
        let err = fetch_collection(&client, &missing, FeatureKind::Parcel).await.unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));

        let path = dir.join("broken.geojson");
        std::fs::write(&path, "{ not geojson").unwrap();
        let err = fetch_collection(&client, &DataSource::File(path), FeatureKind::Parcel)
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Features(FeatureError::Parse(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failed_sections_do_not_block_parcels() {
        let dir = temp_dir("split");
        let parcels = dir.join("parcels.geojson");
        std::fs::write(&parcels, DOC).unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        spawn_load(
            &Handle::current(),
            reqwest::Client::new(),
            DataSource::File(dir.join("missing-sections.geojson")),
            DataSource::File(parcels),
            tx,
            || {},
        );

        let mut sections_failed = false;
        let mut parcels_loaded = 0;
        for _ in 0..2 {
            match rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap() {
                LoadEvent::Sections(result) => sections_failed = result.is_err(),
                LoadEvent::Parcels(result) => parcels_loaded = result.unwrap().len(),
            }
        }
        assert!(sections_failed);
        assert_eq!(parcels_loaded, 1);
    }
}
