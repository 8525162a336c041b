//! Parcel search - first match wins, in load order

use tracing::{debug, info};

use crate::features::FeatureId;
use crate::layers::LayerRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    /// Blank query, nothing to do
    Empty,
    Found(FeatureId),
    NotFound,
}

/// Case-insensitive substring search over the given logical fields.
///
/// Fields are compared as displayed, so a missing field reads as "-" and a
/// query of "-" hits the first parcel lacking one.
pub fn search(registry: &LayerRegistry, query: &str, fields: &[String]) -> SearchOutcome {
    let term = query.trim().to_lowercase();
    if term.is_empty() {
        return SearchOutcome::Empty;
    }

    let hit = registry.parcels().iter().find(|parcel| {
        fields.iter().any(|field| {
            parcel.resolve_display(field).to_lowercase().contains(&term)
        })
    });

    match hit {
        Some(parcel) => {
            info!("Search '{}' matched parcel {:?}", term, parcel.id);
            SearchOutcome::Found(parcel.id)
        }
        None => {
            debug!("Search '{}' scanned {} parcels, no match", term, registry.parcels().len());
            SearchOutcome::NotFound
        }
    }
}
