//! Layer registry - owns the parcel and section layers and their display state
//!
//! Feature data never changes after load. What changes is per-parcel style,
//! parcel draw order, per-section transparency and whole-layer visibility.

use tracing::{debug, info};

use crate::attributes::{display_value, normalize_key};
use crate::colors::{Rgb, SectionColors};
use crate::features::{FeatureId, FeatureKind, MapFeature};

/// Outline + fill, Leaflet path style
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathStyle {
    pub stroke: Rgb,
    pub weight: f32,
    pub stroke_opacity: f32,
    pub fill: Rgb,
    pub fill_opacity: f32,
}

impl PathStyle {
    pub const PARCEL: PathStyle = PathStyle {
        stroke: Rgb(0x55, 0x55, 0x55),
        weight: 1.0,
        stroke_opacity: 1.0,
        fill: Rgb(0xec, 0xf0, 0xf1),
        fill_opacity: 0.05,
    };

    pub const PARCEL_HOVER: PathStyle = PathStyle {
        stroke: Rgb(0xe6, 0x7e, 0x22),
        weight: 2.0,
        stroke_opacity: 1.0,
        fill: Rgb(0xf3, 0x9c, 0x12),
        fill_opacity: 0.7,
    };

    pub const PARCEL_SELECTED: PathStyle = PathStyle {
        stroke: Rgb(0xc0, 0x39, 0x2b),
        weight: 3.0,
        stroke_opacity: 1.0,
        fill: Rgb(0xe7, 0x4c, 0x3c),
        fill_opacity: 0.8,
    };

    pub const SECTION_FILL_OPACITY: f32 = 0.4;

    pub fn section(fill: Rgb) -> PathStyle {
        PathStyle {
            stroke: Rgb::WHITE,
            weight: 1.0,
            stroke_opacity: 1.0,
            fill,
            fill_opacity: Self::SECTION_FILL_OPACITY,
        }
    }
}

/// Interaction style applied to a parcel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParcelStyle {
    #[default]
    Default,
    Hover,
    Selected,
}

impl ParcelStyle {
    pub fn path(self) -> PathStyle {
        match self {
            ParcelStyle::Default => PathStyle::PARCEL,
            ParcelStyle::Hover => PathStyle::PARCEL_HOVER,
            ParcelStyle::Selected => PathStyle::PARCEL_SELECTED,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Parcels,
    Sections,
}

struct SectionEntry {
    feature: MapFeature,
    /// Normalized value of the section field, when known
    name: Option<String>,
    color: Rgb,
    hidden: bool,
}

pub struct LayerRegistry {
    parcels: Vec<MapFeature>,
    parcel_styles: Vec<ParcelStyle>,
    /// Back-to-front
    draw_order: Vec<FeatureId>,
    sections: Vec<SectionEntry>,
    parcels_visible: bool,
    sections_visible: bool,
}

impl Default for LayerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LayerRegistry {
    pub fn new() -> Self {
        Self {
            parcels: Vec::new(),
            parcel_styles: Vec::new(),
            draw_order: Vec::new(),
            sections: Vec::new(),
            parcels_visible: true,
            sections_visible: true,
        }
    }

    pub fn set_parcels(&mut self, parcels: Vec<MapFeature>) {
        debug_assert!(parcels.iter().all(|f| f.kind == FeatureKind::Parcel));
        info!("Parcel layer ready: {} features", parcels.len());
        self.parcel_styles = vec![ParcelStyle::Default; parcels.len()];
        self.draw_order = parcels.iter().map(|f| f.id).collect();
        self.parcels = parcels;
    }

    /// Install sections, coloring each by its `field` value.
    ///
    /// Without a field (no legend) every section gets the neutral color.
    pub fn set_sections(
        &mut self,
        sections: Vec<MapFeature>,
        field: Option<&str>,
        colors: &mut SectionColors,
    ) {
        debug_assert!(sections.iter().all(|f| f.kind == FeatureKind::Section));
        info!("Section layer ready: {} features, field={:?}", sections.len(), field);
        self.sections = sections
            .into_iter()
            .map(|feature| {
                let label = field.and_then(|f| section_label(&feature, f));
                let color = match &label {
                    Some(label) => colors.color_for(Some(label.as_str())),
                    None => colors.neutral(),
                };
                SectionEntry {
                    name: label.as_deref().map(normalize_key),
                    feature,
                    color,
                    hidden: false,
                }
            })
            .collect();
    }

    pub fn has_parcels(&self) -> bool {
        !self.parcels.is_empty()
    }

    pub fn has_sections(&self) -> bool {
        !self.sections.is_empty()
    }

    /// Parcels in load order
    pub fn parcels(&self) -> &[MapFeature] {
        &self.parcels
    }

    pub fn parcel(&self, id: FeatureId) -> Option<&MapFeature> {
        self.parcels.get(id.0)
    }

    pub fn parcel_style(&self, id: FeatureId) -> ParcelStyle {
        self.parcel_styles.get(id.0).copied().unwrap_or_default()
    }

    pub fn set_parcel_style(&mut self, id: FeatureId, style: ParcelStyle) {
        if let Some(slot) = self.parcel_styles.get_mut(id.0) {
            *slot = style;
        }
    }

    /// Back to the style derived from the parcel itself
    pub fn reset_parcel_style(&mut self, id: FeatureId) {
        self.set_parcel_style(id, ParcelStyle::Default);
    }

    pub fn bring_to_front(&mut self, id: FeatureId) {
        if let Some(pos) = self.draw_order.iter().position(|&f| f == id) {
            let id = self.draw_order.remove(pos);
            self.draw_order.push(id);
        }
    }

    /// Parcels with their current style, back-to-front
    pub fn parcels_in_draw_order(&self) -> impl Iterator<Item = (&MapFeature, PathStyle)> + '_ {
        self.draw_order.iter().filter_map(move |&id| {
            self.parcel(id).map(|f| (f, self.parcel_style(id).path()))
        })
    }

    /// Sections with their current style
    pub fn sections_with_style(&self) -> impl Iterator<Item = (&MapFeature, PathStyle)> + '_ {
        self.sections.iter().map(|entry| {
            let mut style = PathStyle::section(entry.color);
            if entry.hidden {
                style.fill_opacity = 0.0;
                style.stroke_opacity = 0.0;
            }
            (&entry.feature, style)
        })
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    /// Make every section whose field value matches `name` transparent or not.
    /// Features stay in the layer either way.
    pub fn set_section_visible(&mut self, name: &str, visible: bool) -> usize {
        let key = normalize_key(name);
        let mut touched = 0;
        for entry in self.sections.iter_mut() {
            if entry.name.as_deref() == Some(key.as_str()) {
                entry.hidden = !visible;
                touched += 1;
            }
        }
        debug!("Section '{}' visible={} ({} features)", key, visible, touched);
        touched
    }

    /// Every section, named or not, follows `visible`
    pub fn set_all_sections_visible(&mut self, visible: bool) {
        for entry in self.sections.iter_mut() {
            entry.hidden = !visible;
        }
        debug!("All {} sections visible={}", self.sections.len(), visible);
    }

    pub fn is_layer_visible(&self, layer: LayerKind) -> bool {
        match layer {
            LayerKind::Parcels => self.parcels_visible,
            LayerKind::Sections => self.sections_visible,
        }
    }

    /// Add/remove a whole layer from the map
    pub fn set_layer_visible(&mut self, layer: LayerKind, visible: bool) {
        info!("Layer {:?} visible={}", layer, visible);
        match layer {
            LayerKind::Parcels => self.parcels_visible = visible,
            LayerKind::Sections => self.sections_visible = visible,
        }
    }

    /// Topmost visible parcel under a lon/lat point
    pub fn parcel_at(&self, coord: geo::Coord<f64>) -> Option<FeatureId> {
        if !self.parcels_visible {
            return None;
        }
        self.draw_order
            .iter()
            .rev()
            .copied()
            .find(|&id| self.parcel(id).is_some_and(|f| f.contains(coord)))
    }
}

/// Trimmed display value of the section field, if present and non-blank
pub fn section_label(feature: &MapFeature, field: &str) -> Option<String> {
    let value = feature.properties.as_ref()?.get(field)?;
    if value.is_null() {
        return None;
    }
    let label = display_value(value).trim().to_string();
    if label.is_empty() {
        None
    } else {
        Some(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PaletteConfig;
    use crate::features::tests::square;
    use serde_json::json;

    fn registry_with_sections() -> LayerRegistry {
        let mut colors = SectionColors::from_config(&PaletteConfig::default()).unwrap();
        let mut registry = LayerRegistry::new();
        registry.set_sections(
            vec![
                square(0, FeatureKind::Section, 0.0, 0.0, json!({ "SECCION": "Seccion 1" })),
                square(1, FeatureKind::Section, 1.0, 0.0, json!({ "SECCION": "SECCION 1 " })),
                square(2, FeatureKind::Section, 2.0, 0.0, json!({ "SECCION": "Quinta" })),
            ],
            Some("SECCION"),
            &mut colors,
        );
        registry
    }

    #[test]
    fn test_section_hide_is_transparent_not_removed() {
        let mut registry = registry_with_sections();
        assert_eq!(registry.set_section_visible("seccion 1", false), 2);
        assert_eq!(registry.section_count(), 3);

        let styles: Vec<PathStyle> = registry.sections_with_style().map(|(_, s)| s).collect();
        assert_eq!(styles[0].fill_opacity, 0.0);
        assert_eq!(styles[0].stroke_opacity, 0.0);
        assert_eq!(styles[1].fill_opacity, 0.0);
        assert_eq!(styles[2].fill_opacity, PathStyle::SECTION_FILL_OPACITY);

        registry.set_section_visible("SECCION 1", true);
        let styles: Vec<PathStyle> = registry.sections_with_style().map(|(_, s)| s).collect();
        assert_eq!(styles[0].fill_opacity, PathStyle::SECTION_FILL_OPACITY);
        assert_eq!(styles[0].stroke_opacity, 1.0);
    }

    #[test]
    fn test_all_sections_includes_unnamed() {
        let mut colors = SectionColors::from_config(&PaletteConfig::default()).unwrap();
        let mut registry = LayerRegistry::new();
        registry.set_sections(
            vec![
                square(0, FeatureKind::Section, 0.0, 0.0, json!({ "SECCION": "Seccion 1" })),
                square(1, FeatureKind::Section, 1.0, 0.0, json!({ "SECCION": "" })),
                square(2, FeatureKind::Section, 2.0, 0.0, json!({ "SECCION": null })),
            ],
            Some("SECCION"),
            &mut colors,
        );

        registry.set_all_sections_visible(false);
        let drawn: Vec<(f32, f32)> = registry
            .sections_with_style()
            .map(|(_, s)| (s.fill_opacity, s.stroke_opacity))
            .collect();
        assert_eq!(drawn, vec![(0.0, 0.0); 3]);

        registry.set_all_sections_visible(true);
        assert!(registry
            .sections_with_style()
            .all(|(_, s)| s.fill_opacity == PathStyle::SECTION_FILL_OPACITY));
    }

    #[test]
    fn test_sections_use_curated_colors() {
        let registry = registry_with_sections();
        let fills: Vec<Rgb> = registry.sections_with_style().map(|(_, s)| s.fill).collect();
        assert_eq!(fills[0], "#8e44ad".parse::<Rgb>().unwrap());
        assert_eq!(fills[0], fills[1]);
        assert_ne!(fills[2], fills[0]);
    }

    #[test]
    fn test_sections_without_field_are_neutral() {
        let mut colors = SectionColors::from_config(&PaletteConfig::default()).unwrap();
        let mut registry = LayerRegistry::new();
        registry.set_sections(
            vec![square(0, FeatureKind::Section, 0.0, 0.0, json!({ "SECCION": "Seccion 1" }))],
            None,
            &mut colors,
        );
        let fill = registry.sections_with_style().next().map(|(_, s)| s.fill);
        assert_eq!(fill, Some(colors.neutral()));
    }

    #[test]
    fn test_bring_to_front_and_hit_test() {
        let mut registry = LayerRegistry::new();
        registry.set_parcels(vec![
            square(0, FeatureKind::Parcel, 0.0, 0.0, json!({})),
            square(1, FeatureKind::Parcel, 0.5, 0.0, json!({})),
        ]);
        let overlap = geo::Coord { x: 0.75, y: 0.5 };
        assert_eq!(registry.parcel_at(overlap), Some(FeatureId(1)));

        registry.bring_to_front(FeatureId(0));
        assert_eq!(registry.parcel_at(overlap), Some(FeatureId(0)));
        let order: Vec<FeatureId> = registry.parcels_in_draw_order().map(|(f, _)| f.id).collect();
        assert_eq!(order, vec![FeatureId(1), FeatureId(0)]);

        registry.set_layer_visible(LayerKind::Parcels, false);
        assert_eq!(registry.parcel_at(overlap), None);
    }

    #[test]
    fn test_reset_restores_default_style() {
        let mut registry = LayerRegistry::new();
        registry.set_parcels(vec![square(0, FeatureKind::Parcel, 0.0, 0.0, json!({}))]);
        registry.set_parcel_style(FeatureId(0), ParcelStyle::Selected);
        registry.reset_parcel_style(FeatureId(0));
        assert_eq!(registry.parcel_style(FeatureId(0)), ParcelStyle::Default);
        assert_eq!(registry.parcel_style(FeatureId(0)).path(), PathStyle::PARCEL);
    }
}
