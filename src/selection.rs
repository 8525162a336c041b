//! Selection controller - hover / select / deselect over parcels
//!
//! At most one parcel carries the selected style. Selecting another parcel
//! restores the previous one before styling the new one, so overlapping
//! selections (camera still flying, popup still open) stay consistent.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::attributes::SENTINEL;
use crate::features::{FeatureId, MapFeature};
use crate::layers::{LayerRegistry, ParcelStyle};
use crate::surface::{FitOptions, MapSurface};

/// Logical field shown as the owner in the side-panel summary
pub const OWNER_FIELD: &str = "NOMBRE";
/// Logical field shown as the primary tax id in the side-panel summary
pub const TAX_ID_FIELD: &str = "TGI";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldFormat {
    #[default]
    Plain,
    Money,
}

/// One row of the parcel info table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub label: String,
    pub key: String,
    #[serde(default)]
    pub format: FieldFormat,
}

impl FieldSpec {
    fn new(label: &str, key: &str, format: FieldFormat) -> Self {
        Self {
            label: label.to_string(),
            key: key.to_string(),
            format,
        }
    }
}

/// Owner, ids, location, cadastral designation, dimensions, fiscal card, debts
pub fn default_popup_fields() -> Vec<FieldSpec> {
    use FieldFormat::{Money, Plain};
    vec![
        FieldSpec::new("Titular", OWNER_FIELD, Plain),
        FieldSpec::new("Partida", "PARTIDA", Plain),
        FieldSpec::new("TGI", TAX_ID_FIELD, Plain),
        FieldSpec::new("Ubicación", "UBICACION", Plain),
        FieldSpec::new("Sección", "SECCION", Plain),
        FieldSpec::new("Manzana", "MANZ", Plain),
        FieldSpec::new("Lote", "LOTE", Plain),
        FieldSpec::new("Zona", "ZONA", Plain),
        FieldSpec::new("Frente", "FRENTE", Plain),
        FieldSpec::new("Fondo", "FONDO", Plain),
        FieldSpec::new("Superficie", "SUPERFICIE", Plain),
        FieldSpec::new("Cédula Fiscal", "CEDULA", Plain),
        FieldSpec::new("Deuda TGI", "DEUDA TGI", Money),
        FieldSpec::new("Meses Adeudados", "MESES", Plain),
        FieldSpec::new("Deuda Obras Públicas", "OBRAS", Money),
        FieldSpec::new("Cuotas Plan", "CUOTAS", Plain),
        FieldSpec::new("Cuotas Pagas", "PAGAS", Plain),
    ]
}

#[derive(Debug, Clone, PartialEq)]
pub struct InfoRow {
    pub label: String,
    pub key: String,
    pub value: String,
}

/// Key-value table shown in the popup
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InfoCard {
    pub rows: Vec<InfoRow>,
}

impl InfoCard {
    pub fn build(feature: &MapFeature, fields: &[FieldSpec]) -> Self {
        let rows = fields
            .iter()
            .map(|field| {
                let raw = feature.resolve_display(&field.key);
                let value = match field.format {
                    FieldFormat::Money if raw != SENTINEL => format!("$ {}", raw),
                    _ => raw,
                };
                InfoRow {
                    label: field.label.clone(),
                    key: field.key.clone(),
                    value,
                }
            })
            .collect();
        Self { rows }
    }

    #[cfg(test)]
    pub fn value(&self, label: &str) -> Option<&str> {
        self.rows
            .iter()
            .find(|row| row.label == label)
            .map(|row| row.value.as_str())
    }

    fn value_for_key(&self, key: &str) -> Option<&str> {
        self.rows
            .iter()
            .find(|row| row.key == key)
            .map(|row| row.value.as_str())
    }

    /// "Label: value" lines, for headless output
    pub fn lines(&self) -> impl Iterator<Item = String> + '_ {
        self.rows.iter().map(|row| format!("{}: {}", row.label, row.value))
    }
}

/// Persistent side-panel summary of the current selection
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionSummary {
    pub owner: String,
    pub tax_id: String,
}

pub struct SelectionController {
    selected: Option<FeatureId>,
    summary: Option<SelectionSummary>,
    fields: Vec<FieldSpec>,
    fit: FitOptions,
}

impl SelectionController {
    pub fn new(fields: Vec<FieldSpec>, fit: FitOptions) -> Self {
        Self {
            selected: None,
            summary: None,
            fields,
            fit,
        }
    }

    pub fn selected(&self) -> Option<FeatureId> {
        self.selected
    }

    pub fn summary(&self) -> Option<&SelectionSummary> {
        self.summary.as_ref()
    }

    pub fn on_hover(&self, registry: &mut LayerRegistry, id: FeatureId) {
        if self.selected != Some(id) {
            registry.set_parcel_style(id, ParcelStyle::Hover);
        }
    }

    pub fn on_unhover(&self, registry: &mut LayerRegistry, id: FeatureId) {
        if self.selected != Some(id) {
            registry.reset_parcel_style(id);
        }
    }

    /// Select a parcel: restyle, raise, fill the popup and summary, frame it.
    /// Returns false when the id is not a loaded parcel.
    pub fn on_select(
        &mut self,
        registry: &mut LayerRegistry,
        surface: &mut impl MapSurface,
        id: FeatureId,
    ) -> bool {
        let Some(feature) = registry.parcel(id) else {
            warn!("Select ignored: no parcel {:?}", id);
            return false;
        };
        let card = InfoCard::build(feature, &self.fields);
        let bounds = feature.bounds;

        if let Some(previous) = self.selected.filter(|&prev| prev != id) {
            debug!("Restoring previous selection {:?}", previous);
            registry.reset_parcel_style(previous);
        }

        self.selected = Some(id);
        registry.set_parcel_style(id, ParcelStyle::Selected);
        registry.bring_to_front(id);

        let summary = SelectionSummary {
            owner: card.value_for_key(OWNER_FIELD).unwrap_or(SENTINEL).to_string(),
            tax_id: card.value_for_key(TAX_ID_FIELD).unwrap_or(SENTINEL).to_string(),
        };
        info!("Selected parcel {:?} (TGI {}, owner {})", id, summary.tax_id, summary.owner);
        self.summary = Some(summary);

        match bounds {
            Some(bounds) => surface.fly_to_bounds(bounds, &self.fit),
            None => debug!("Parcel {:?} has no geometry, camera stays", id),
        }
        surface.open_popup(id, card);
        true
    }

    /// Drop the current selection and close its popup
    pub fn on_deselect(&mut self, registry: &mut LayerRegistry, surface: &mut impl MapSurface) {
        if let Some(previous) = self.selected.take() {
            info!("Deselected parcel {:?}", previous);
            registry.reset_parcel_style(previous);
            self.summary = None;
            surface.close_popup();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CameraConfig;
    use crate::features::tests::square;
    use crate::features::FeatureKind;
    use crate::surface::testing::RecordingSurface;
    use serde_json::json;

    fn setup() -> (LayerRegistry, SelectionController, RecordingSurface) {
        let mut registry = LayerRegistry::new();
        registry.set_parcels(vec![
            square(0, FeatureKind::Parcel, 0.0, 0.0, json!({ "PARTIDA": "55", "TGI": "900-1", "Tit. Nombre": "J. Perez" })),
            square(1, FeatureKind::Parcel, 2.0, 0.0, json!({ "TGI": "901", "Deuda TGI": 1500 })),
            square(2, FeatureKind::Parcel, 4.0, 0.0, json!({ "TGI": "902" })),
        ]);
        let controller =
            SelectionController::new(default_popup_fields(), CameraConfig::default().fit_options());
        (registry, controller, RecordingSurface::default())
    }

    fn selected_count(registry: &LayerRegistry) -> usize {
        registry
            .parcels()
            .iter()
            .filter(|f| registry.parcel_style(f.id) == ParcelStyle::Selected)
            .count()
    }

    #[test]
    fn test_click_shows_owner_and_tgi() {
        let (mut registry, mut controller, mut surface) = setup();
        assert!(controller.on_select(&mut registry, &mut surface, FeatureId(0)));

        let (anchor, card) = surface.popup.clone().unwrap();
        assert_eq!(anchor, FeatureId(0));
        assert_eq!(card.value("Titular"), Some("J. Perez"));
        assert_eq!(card.value("TGI"), Some("900-1"));
        assert_eq!(card.value("Partida"), Some("55"));
        assert_eq!(card.value("Deuda TGI"), Some(SENTINEL));
        assert!(card.lines().any(|line| line == "Titular: J. Perez"));

        let summary = controller.summary().unwrap();
        assert_eq!(summary.owner, "J. Perez");
        assert_eq!(summary.tax_id, "900-1");
        assert_eq!(surface.flights.len(), 1);
    }

    #[test]
    fn test_money_prefix_only_when_present() {
        let (mut registry, mut controller, mut surface) = setup();
        controller.on_select(&mut registry, &mut surface, FeatureId(1));
        let (_, card) = surface.popup.clone().unwrap();
        assert_eq!(card.value("Deuda TGI"), Some("$ 1500"));
        assert_eq!(card.value("Deuda Obras Públicas"), Some(SENTINEL));
    }

    #[test]
    fn test_single_selection_invariant() {
        let (mut registry, mut controller, mut surface) = setup();
        controller.on_hover(&mut registry, FeatureId(2));
        controller.on_select(&mut registry, &mut surface, FeatureId(0));
        controller.on_select(&mut registry, &mut surface, FeatureId(1));
        controller.on_hover(&mut registry, FeatureId(0));
        controller.on_select(&mut registry, &mut surface, FeatureId(2));

        assert_eq!(selected_count(&registry), 1);
        assert_eq!(controller.selected(), Some(FeatureId(2)));
        assert_eq!(registry.parcel_style(FeatureId(1)), ParcelStyle::Default);
        assert_eq!(registry.parcel_style(FeatureId(0)), ParcelStyle::Hover);
    }

    #[test]
    fn test_hover_does_not_touch_selection() {
        let (mut registry, mut controller, mut surface) = setup();
        controller.on_select(&mut registry, &mut surface, FeatureId(0));
        controller.on_hover(&mut registry, FeatureId(0));
        assert_eq!(registry.parcel_style(FeatureId(0)), ParcelStyle::Selected);
        controller.on_unhover(&mut registry, FeatureId(0));
        assert_eq!(registry.parcel_style(FeatureId(0)), ParcelStyle::Selected);

        controller.on_hover(&mut registry, FeatureId(1));
        assert_eq!(registry.parcel_style(FeatureId(1)), ParcelStyle::Hover);
        controller.on_unhover(&mut registry, FeatureId(1));
        assert_eq!(registry.parcel_style(FeatureId(1)), ParcelStyle::Default);
    }

    #[test]
    fn test_deselect_restores_and_closes_popup() {
        let (mut registry, mut controller, mut surface) = setup();
        controller.on_select(&mut registry, &mut surface, FeatureId(1));
        controller.on_deselect(&mut registry, &mut surface);

        assert_eq!(selected_count(&registry), 0);
        assert_eq!(controller.selected(), None);
        assert!(controller.summary().is_none());
        assert!(surface.popup.is_none());
        assert_eq!(surface.closed, 1);

        // Nothing selected: no-op
        controller.on_deselect(&mut registry, &mut surface);
        assert_eq!(surface.closed, 1);
    }

    #[test]
    fn test_select_unknown_id_is_ignored() {
        let (mut registry, mut controller, mut surface) = setup();
        assert!(!controller.on_select(&mut registry, &mut surface, FeatureId(42)));
        assert_eq!(controller.selected(), None);
        assert!(surface.flights.is_empty());
    }

    #[test]
    fn test_selection_raises_parcel() {
        let (mut registry, mut controller, mut surface) = setup();
        controller.on_select(&mut registry, &mut surface, FeatureId(0));
        let top = registry.parcels_in_draw_order().last().map(|(f, _)| f.id);
        assert_eq!(top, Some(FeatureId(0)));
    }
}
