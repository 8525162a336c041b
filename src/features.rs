//! Map features - parcels and sections parsed from GeoJSON
//!
//! Geometry is converted once at load time into `geo` multipolygons, with the
//! bounding box and a fill triangulation cached next to it.

use geo::{BoundingRect, Contains, Coord, MultiPolygon, Point, Rect, TriangulateEarcut, Triangle};
use geojson::{GeoJson, JsonObject};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::attributes;

#[derive(Error, Debug)]
pub enum FeatureError {
    #[error("invalid GeoJSON: {0}")]
    Parse(#[from] geojson::Error),
    #[error("expected a FeatureCollection, got a {0}")]
    NotAFeatureCollection(&'static str),
}

/// Position of a feature in its collection's load order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureKind {
    Parcel,
    Section,
}

impl FeatureKind {
    pub fn label(self) -> &'static str {
        match self {
            FeatureKind::Parcel => "parcels",
            FeatureKind::Section => "sections",
        }
    }
}

#[derive(Debug, Clone)]
pub struct MapFeature {
    pub id: FeatureId,
    pub kind: FeatureKind,
    pub properties: Option<JsonObject>,
    pub geometry: MultiPolygon<f64>,
    pub bounds: Option<Rect<f64>>,
    pub triangles: Vec<Triangle<f64>>,
}

impl MapFeature {
    pub fn new(
        id: FeatureId,
        kind: FeatureKind,
        properties: Option<JsonObject>,
        geometry: MultiPolygon<f64>,
    ) -> Self {
        let bounds = geometry.bounding_rect();
        let triangles = geometry
            .0
            .iter()
            .flat_map(|polygon| polygon.earcut_triangles())
            .collect();
        Self {
            id,
            kind,
            properties,
            geometry,
            bounds,
            triangles,
        }
    }

    pub fn resolve(&self, logical_name: &str) -> Option<&Value> {
        attributes::resolve(self.properties.as_ref(), logical_name)
    }

    pub fn resolve_display(&self, logical_name: &str) -> String {
        attributes::resolve_display(self.properties.as_ref(), logical_name)
    }

    /// Hit test in lon/lat
    pub fn contains(&self, coord: Coord<f64>) -> bool {
        let Some(bounds) = self.bounds else {
            return false;
        };
        let min = bounds.min();
        let max = bounds.max();
        if coord.x < min.x || coord.x > max.x || coord.y < min.y || coord.y > max.y {
            return false;
        }
        self.geometry.contains(&Point::from(coord))
    }

    /// Top-center of the bounding box, where popups are anchored
    pub fn anchor(&self) -> Option<Coord<f64>> {
        self.bounds.map(|b| Coord {
            x: (b.min().x + b.max().x) / 2.0,
            y: b.max().y,
        })
    }
}

/// Parse a FeatureCollection document into features of one kind
pub fn parse_collection(kind: FeatureKind, text: &str) -> Result<Vec<MapFeature>, FeatureError> {
    let collection = match text.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(collection) => collection,
        GeoJson::Feature(_) => return Err(FeatureError::NotAFeatureCollection("Feature")),
        GeoJson::Geometry(_) => return Err(FeatureError::NotAFeatureCollection("Geometry")),
    };

    let features = collection
        .features
        .into_iter()
        .enumerate()
        .map(|(i, feature)| {
            let geometry = to_multipolygon(feature.geometry, i);
            MapFeature::new(FeatureId(i), kind, feature.properties, geometry)
        })
        .collect();
    Ok(features)
}

fn to_multipolygon(geometry: Option<geojson::Geometry>, index: usize) -> MultiPolygon<f64> {
    let Some(geometry) = geometry else {
        debug!("Feature {} has no geometry", index);
        return MultiPolygon::new(vec![]);
    };

    match geo::Geometry::<f64>::try_from(geometry) {
        Ok(geo::Geometry::Polygon(polygon)) => MultiPolygon::new(vec![polygon]),
        Ok(geo::Geometry::MultiPolygon(multi)) => multi,
        Ok(_) => {
            debug!("Feature {} is not a polygon, drawing nothing", index);
            MultiPolygon::new(vec![])
        }
        Err(e) => {
            debug!("Feature {} geometry rejected: {}", index, e);
            MultiPolygon::new(vec![])
        }
    }
}
