//! Native map viewer using egui
//!
//! Slippy basemap, colored section overlay and interactive parcels, with a
//! search bar on top and a collapsible layers panel on the right.

use eframe::egui;
use egui::{Align2, Color32, FontId, Pos2, Rect as ScreenRect, Sense, Shape, Stroke, Vec2};
use geo::{Coord, Rect};
use std::sync::mpsc::{channel, Receiver};
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use crate::colors::SectionColors;
use crate::config::{Config, Env};
use crate::features::{FeatureId, FeatureKind, MapFeature};
use crate::layers::{LayerKind, LayerRegistry, PathStyle};
use crate::legend::SectionLegend;
use crate::loader::{spawn_load, LoadEvent};
use crate::search::{search, SearchOutcome};
use crate::selection::{InfoCard, SelectionController};
use crate::surface::{FitOptions, MapSurface};
use crate::tiles::TileLayer;
use crate::viewport::Viewport;

const MIN_ZOOM: f64 = 2.0;
/// Zoom levels per scrolled point
const SCROLL_ZOOM_RATE: f64 = 1.0 / 100.0;
const PANEL_MARGIN: f32 = 10.0;
const ERROR_RED: Color32 = Color32::from_rgb(0xc0, 0x39, 0x2b);
/// Space between the parcel's top edge and the popup tip
const POPUP_GAP: f32 = 6.0;
const POPUP_HEADER_HEIGHT: f32 = 36.0;
const POPUP_ROW_HEIGHT: f32 = 22.0;

/// Popup height before it has been rendered once
fn estimated_popup_height(rows: usize) -> f32 {
    POPUP_HEADER_HEIGHT + rows as f32 * POPUP_ROW_HEIGHT
}

/// Run the native GUI viewer. Must be called from inside the tokio runtime.
pub fn run_viewer(config: Config, env: Env) -> anyhow::Result<()> {
    let runtime = Handle::current();
    let colors = SectionColors::from_config(&config.palette)?;
    let client = reqwest::Client::builder()
        .user_agent(&config.basemap.user_agent)
        .build()?;
    let tiles = TileLayer::new(
        config.tile_template(&env),
        config.basemap.max_zoom,
        &config.basemap.user_agent,
        runtime.clone(),
    )?;

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 820.0])
            .with_title("Catastro"),
        ..Default::default()
    };

    eframe::run_native(
        "Catastro",
        options,
        Box::new(move |cc| {
            Ok(Box::new(CadastreApp::new(
                cc, config, &env, runtime, client, tiles, colors,
            )))
        }),
    )
    .map_err(|e| anyhow::anyhow!("GUI error: {}", e))
}

/// The egui side of `MapSurface`: camera flights and the popup slot
struct EguiSurface<'a> {
    viewport: &'a mut Viewport,
    popup: &'a mut Option<(FeatureId, InfoCard)>,
    map_size: Vec2,
    /// Width of the layers panel overlapping the right edge of the map
    panel_width: f32,
    /// Height of the popup that opens above the parcel
    popup_height: f32,
    now: f64,
}

impl MapSurface for EguiSurface<'_> {
    fn fly_to_bounds(&mut self, bounds: Rect<f64>, options: &FitOptions) {
        let mut padding = options.padding;
        padding.right += self.panel_width;
        // The popup hangs above the parcel; egui would push it down over the
        // geometry if it did not fit
        padding.top = padding.top.max(self.popup_height + POPUP_GAP + PANEL_MARGIN);
        let (center, zoom) = self
            .viewport
            .fit_bounds(bounds, self.map_size, &padding, options.max_zoom);
        debug!("Flying to zoom {:.2}", zoom);
        self.viewport
            .fly_to(center, zoom, self.now, options.duration.as_secs_f64());
    }

    fn open_popup(&mut self, anchor: FeatureId, card: InfoCard) {
        *self.popup = Some((anchor, card));
    }

    fn close_popup(&mut self) {
        *self.popup = None;
    }
}

struct CadastreApp {
    registry: LayerRegistry,
    selection: SelectionController,
    legend: Option<SectionLegend>,
    /// Why there is no legend, when there is none
    legend_error: Option<String>,
    colors: SectionColors,
    search_fields: Vec<String>,
    // Map state
    viewport: Viewport,
    tiles: TileLayer,
    attribution: String,
    map_rect: ScreenRect,
    hovered: Option<FeatureId>,
    popup: Option<(FeatureId, InfoCard)>,
    // Loading
    loads: Receiver<LoadEvent>,
    pending: usize,
    parcels_error: Option<String>,
    // UI state
    search_text: String,
    notice: Option<String>,
    panel_open: bool,
    panel_width: f32,
    popup_height: f32,
}

impl CadastreApp {
    fn new(
        cc: &eframe::CreationContext<'_>,
        config: Config,
        env: &Env,
        runtime: Handle,
        client: reqwest::Client,
        tiles: TileLayer,
        colors: SectionColors,
    ) -> Self {
        cc.egui_ctx.set_visuals(egui::Visuals::light());

        let (tx, rx) = channel();
        let ctx = cc.egui_ctx.clone();
        spawn_load(
            &runtime,
            client,
            config.source_for(FeatureKind::Section, env),
            config.source_for(FeatureKind::Parcel, env),
            tx,
            move || ctx.request_repaint(),
        );

        let view = &config.initial_view;
        let viewport = Viewport::new(
            Coord { x: view.lon, y: view.lat },
            view.zoom,
            MIN_ZOOM,
            tiles.max_zoom() as f64,
        );
        info!("Viewer ready at {:.3}, {:.3} zoom {}", view.lat, view.lon, view.zoom);
        let popup_height = estimated_popup_height(config.popup_fields.len());

        Self {
            registry: LayerRegistry::new(),
            selection: SelectionController::new(config.popup_fields, config.camera.fit_options()),
            legend: None,
            legend_error: None,
            colors,
            search_fields: config.search_fields,
            viewport,
            tiles,
            attribution: config.basemap.attribution,
            map_rect: ScreenRect::NOTHING,
            hovered: None,
            popup: None,
            loads: rx,
            pending: 2,
            parcels_error: None,
            search_text: String::new(),
            notice: None,
            panel_open: true,
            panel_width: 0.0,
            popup_height,
        }
    }

    /// Apply finished document loads
    fn drain_loads(&mut self) {
        while let Ok(event) = self.loads.try_recv() {
            self.pending = self.pending.saturating_sub(1);
            match event {
                LoadEvent::Sections(Ok(features)) => self.install_sections(features),
                LoadEvent::Sections(Err(e)) => {
                    self.legend_error = Some(format!("Secciones no disponibles: {}", e));
                }
                LoadEvent::Parcels(Ok(features)) => self.registry.set_parcels(features),
                LoadEvent::Parcels(Err(e)) => {
                    error!("Parcels unavailable: {}", e);
                    self.parcels_error = Some(e.to_string());
                }
            }
        }
    }

    fn install_sections(&mut self, features: Vec<MapFeature>) {
        match SectionLegend::build(&features, &mut self.colors) {
            Ok(legend) => {
                self.registry
                    .set_sections(features, Some(legend.field()), &mut self.colors);
                self.legend = Some(legend);
            }
            Err(e) => {
                warn!("Sections shown without legend: {}", e);
                self.legend_error = Some(format!("Leyenda no disponible: {}", e));
                self.registry.set_sections(features, None, &mut self.colors);
            }
        }
    }

    fn select(&mut self, id: FeatureId, now: f64) {
        let mut surface = EguiSurface {
            viewport: &mut self.viewport,
            popup: &mut self.popup,
            map_size: self.map_rect.size(),
            panel_width: self.panel_width,
            popup_height: self.popup_height,
            now,
        };
        self.selection.on_select(&mut self.registry, &mut surface, id);
    }

    fn deselect(&mut self, now: f64) {
        let mut surface = EguiSurface {
            viewport: &mut self.viewport,
            popup: &mut self.popup,
            map_size: self.map_rect.size(),
            panel_width: self.panel_width,
            popup_height: self.popup_height,
            now,
        };
        self.selection.on_deselect(&mut self.registry, &mut surface);
    }

    fn run_search(&mut self, now: f64) {
        match search(&self.registry, &self.search_text, &self.search_fields) {
            SearchOutcome::Empty => {}
            SearchOutcome::Found(id) => {
                self.notice = None;
                self.select(id, now);
            }
            SearchOutcome::NotFound => {
                self.notice = Some(format!(
                    "No se encontró ninguna parcela para \"{}\"",
                    self.search_text.trim()
                ));
            }
        }
    }

    /// Hover transitions for the parcel under the pointer
    fn update_hover(&mut self, pointer: Option<Pos2>) {
        let under = pointer.and_then(|pos| {
            let coord = self.viewport.screen_to_geo(pos, self.map_rect);
            self.registry.parcel_at(coord)
        });
        if under == self.hovered {
            return;
        }
        if let Some(previous) = self.hovered {
            self.selection.on_unhover(&mut self.registry, previous);
        }
        if let Some(id) = under {
            self.selection.on_hover(&mut self.registry, id);
        }
        self.hovered = under;
    }

    fn search_bar(&mut self, ui: &mut egui::Ui, now: f64) {
        ui.horizontal(|ui| {
            ui.label("Buscar:");
            let response = ui.add_enabled(
                self.registry.has_parcels(),
                egui::TextEdit::singleline(&mut self.search_text)
                    .hint_text("TGI, partida o titular")
                    .desired_width(280.0),
            );
            if response.changed() {
                self.notice = None;
                if self.search_text.is_empty() {
                    self.deselect(now);
                }
            }
            if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                self.run_search(now);
            }

            if self.pending > 0 {
                ui.separator();
                ui.spinner();
                ui.label("Cargando datos…");
            }
            if let Some(notice) = &self.notice {
                ui.separator();
                ui.colored_label(ERROR_RED, notice);
            }
        });
    }

    fn map(&mut self, ui: &mut egui::Ui, now: f64) {
        let rect = ui.max_rect();
        self.map_rect = rect;
        let response = ui.allocate_rect(rect, Sense::click_and_drag());

        if response.dragged() {
            self.viewport.pan(response.drag_delta());
        }
        if let Some(pointer) = response.hover_pos() {
            let (scroll, pinch) = ui.input(|i| (i.smooth_scroll_delta.y, i.zoom_delta()));
            if scroll != 0.0 {
                self.viewport
                    .zoom_around(scroll as f64 * SCROLL_ZOOM_RATE, pointer, rect);
            }
            if pinch != 1.0 {
                self.viewport
                    .zoom_around((pinch as f64).log2(), pointer, rect);
            }
        }
        if response.double_clicked() {
            if let Some(pos) = response.interact_pointer_pos() {
                self.viewport.zoom_around(1.0, pos, rect);
            }
        }

        self.update_hover(response.hover_pos());
        if response.clicked() {
            let hit = response
                .interact_pointer_pos()
                .and_then(|pos| self.registry.parcel_at(self.viewport.screen_to_geo(pos, rect)));
            if let Some(id) = hit {
                self.select(id, now);
            }
        }

        let painter = ui.painter_at(rect);
        painter.rect_filled(rect, 0.0, Color32::from_gray(0xdd));
        self.tiles.draw(ui.ctx(), &painter, &self.viewport, rect);

        let visible = self.viewport.visible_bounds(rect);
        if self.registry.is_layer_visible(LayerKind::Sections) {
            for (feature, style) in self.registry.sections_with_style() {
                paint_feature(&painter, &self.viewport, rect, &visible, feature, &style);
            }
        }
        if self.registry.is_layer_visible(LayerKind::Parcels) {
            for (feature, style) in self.registry.parcels_in_draw_order() {
                paint_feature(&painter, &self.viewport, rect, &visible, feature, &style);
            }
        }

        self.paint_attribution(&painter, rect);
    }

    fn paint_attribution(&self, painter: &egui::Painter, rect: ScreenRect) {
        let galley = painter.layout_no_wrap(
            self.attribution.clone(),
            FontId::proportional(11.0),
            Color32::from_gray(0x33),
        );
        let pos = rect.right_bottom() - galley.size() - Vec2::new(4.0, 2.0);
        painter.rect_filled(
            ScreenRect::from_min_size(pos, galley.size()).expand(2.0),
            0.0,
            Color32::from_white_alpha(200),
        );
        painter.galley(pos, galley, Color32::from_gray(0x33));
    }

    fn zoom_control(&mut self, ctx: &egui::Context) {
        egui::Area::new(egui::Id::new("zoom_control"))
            .anchor(Align2::LEFT_TOP, Vec2::new(PANEL_MARGIN, PANEL_MARGIN))
            .show(ctx, |ui| {
                egui::Frame::popup(ui.style()).show(ui, |ui| {
                    let center = self.map_rect.center();
                    if ui.button("+").clicked() {
                        self.viewport.zoom_around(1.0, center, self.map_rect);
                    }
                    if ui.button("-").clicked() {
                        self.viewport.zoom_around(-1.0, center, self.map_rect);
                    }
                });
            });
    }

    fn popup(&mut self, ctx: &egui::Context) {
        let Some((id, card)) = &self.popup else {
            return;
        };
        let Some(anchor) = self.registry.parcel(*id).and_then(MapFeature::anchor) else {
            return;
        };
        let pos = self.viewport.geo_to_screen(anchor, self.map_rect);

        let mut close = false;
        let shown = egui::Area::new(egui::Id::new("parcel_popup"))
            .fixed_pos(pos - Vec2::new(0.0, POPUP_GAP))
            .pivot(Align2::CENTER_BOTTOM)
            .order(egui::Order::Foreground)
            .show(ctx, |ui| {
                egui::Frame::popup(ui.style()).show(ui, |ui| {
                    ui.set_max_width(320.0);
                    ui.horizontal(|ui| {
                        ui.strong("Parcela");
                        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                            close = ui.small_button("×").clicked();
                        });
                    });
                    ui.separator();
                    egui::Grid::new("info_card").striped(true).show(ui, |ui| {
                        for row in &card.rows {
                            ui.strong(&row.label);
                            ui.label(&row.value);
                            ui.end_row();
                        }
                    });
                });
            });

        self.popup_height = shown.response.rect.height();

        if close {
            debug!("Popup closed");
            self.popup = None;
        }
    }

    fn layers_panel(&mut self, ctx: &egui::Context) {
        let shown = egui::Window::new("Capas")
            .id(egui::Id::new("layers_panel"))
            .anchor(Align2::RIGHT_TOP, Vec2::new(-PANEL_MARGIN, PANEL_MARGIN))
            .title_bar(false)
            .resizable(false)
            .movable(false)
            .default_width(260.0)
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.heading("Catastro");
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        let label = if self.panel_open { "-" } else { "+" };
                        if ui.button(label).clicked() {
                            self.panel_open = !self.panel_open;
                        }
                    });
                });
                if !self.panel_open {
                    return;
                }
                ui.separator();
                self.layer_toggles(ui);
                ui.separator();
                self.selection_summary(ui);
            });

        self.panel_width = shown
            .map(|inner| inner.response.rect.width() + PANEL_MARGIN)
            .unwrap_or(0.0);
    }

    fn layer_toggles(&mut self, ui: &mut egui::Ui) {
        let mut parcels = self.registry.is_layer_visible(LayerKind::Parcels);
        if ui.checkbox(&mut parcels, "Parcelas").changed() {
            self.registry.set_layer_visible(LayerKind::Parcels, parcels);
        }

        match self.legend.as_mut() {
            Some(legend) => {
                let mut all = legend.all_checked();
                if ui.checkbox(&mut all, "Secciones").changed() {
                    legend.set_all(&mut self.registry, all);
                }

                let mut toggles = Vec::new();
                egui::ScrollArea::vertical().max_height(320.0).show(ui, |ui| {
                    for entry in legend.entries() {
                        ui.horizontal(|ui| {
                            ui.add_space(12.0);
                            let (swatch, _) = ui.allocate_exact_size(Vec2::splat(12.0), Sense::hover());
                            ui.painter().rect_filled(swatch, 2.0, entry.color.to_color32());
                            let mut visible = entry.visible;
                            let text = format!("{} ({})", entry.label, entry.count);
                            if ui.checkbox(&mut visible, text).changed() {
                                toggles.push((entry.key.clone(), visible));
                            }
                        });
                    }
                });
                for (key, visible) in toggles {
                    legend.toggle(&mut self.registry, &key, visible);
                }
            }
            None => {
                if self.registry.has_sections() {
                    let mut sections = self.registry.is_layer_visible(LayerKind::Sections);
                    let label = format!("Secciones ({})", self.registry.section_count());
                    if ui.checkbox(&mut sections, label).changed() {
                        self.registry.set_layer_visible(LayerKind::Sections, sections);
                    }
                }
                if let Some(e) = &self.legend_error {
                    ui.colored_label(ERROR_RED, e);
                }
            }
        }
    }

    fn selection_summary(&self, ui: &mut egui::Ui) {
        match self.selection.summary() {
            Some(summary) => {
                match self.selection.selected() {
                    Some(id) => ui.strong(format!("Parcela seleccionada #{}", id.0)),
                    None => ui.strong("Parcela seleccionada"),
                };
                ui.label(format!("Titular: {}", summary.owner));
                ui.label(format!("TGI: {}", summary.tax_id));
            }
            None => {
                ui.weak("Ninguna parcela seleccionada");
            }
        }
    }

    fn parcels_error_notice(&self, ctx: &egui::Context) {
        let Some(e) = &self.parcels_error else {
            return;
        };
        egui::Window::new("Error")
            .collapsible(false)
            .resizable(false)
            .anchor(Align2::CENTER_CENTER, Vec2::ZERO)
            .show(ctx, |ui| {
                ui.label("No se pudieron cargar las parcelas.");
                ui.colored_label(ERROR_RED, e);
                ui.add_space(8.0);
                if ui.button("Salir").clicked() {
                    ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                }
            });
    }
}

impl eframe::App for CadastreApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_loads();

        let now = ctx.input(|i| i.time);
        let flying = self.viewport.is_flying();
        if self.viewport.tick(now) {
            ctx.request_repaint();
        } else if flying {
            let center = self.viewport.center();
            debug!("Camera settled at {:.5}, {:.5} zoom {:.2}", center.y, center.x, self.viewport.zoom());
        }

        egui::TopBottomPanel::top("search_bar").show(ctx, |ui| {
            self.search_bar(ui, now);
        });

        egui::CentralPanel::default()
            .frame(egui::Frame::none())
            .show(ctx, |ui| {
                // The parcels notice blocks all map interaction
                ui.add_enabled_ui(self.parcels_error.is_none(), |ui| self.map(ui, now));
            });

        self.zoom_control(ctx);
        self.popup(ctx);
        self.layers_panel(ctx);
        self.parcels_error_notice(ctx);
    }
}

/// Fill from the cached triangulation, then outline every ring
fn paint_feature(
    painter: &egui::Painter,
    viewport: &Viewport,
    rect: ScreenRect,
    visible: &Rect<f64>,
    feature: &MapFeature,
    style: &PathStyle,
) {
    let Some(bounds) = feature.bounds else {
        return;
    };
    if !overlaps(&bounds, visible) {
        return;
    }
    let to_screen = |c: Coord<f64>| viewport.geo_to_screen(c, rect);

    if style.fill_opacity > 0.0 {
        let color = style.fill.with_opacity(style.fill_opacity);
        let mut mesh = egui::Mesh::default();
        for triangle in &feature.triangles {
            let base = mesh.vertices.len() as u32;
            for coord in triangle.to_array() {
                mesh.colored_vertex(to_screen(coord), color);
            }
            mesh.add_triangle(base, base + 1, base + 2);
        }
        painter.add(Shape::mesh(mesh));
    }

    if style.stroke_opacity > 0.0 {
        let stroke = Stroke::new(style.weight, style.stroke.with_opacity(style.stroke_opacity));
        for polygon in &feature.geometry {
            for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
                let points: Vec<Pos2> = ring.coords().map(|c| to_screen(*c)).collect();
                painter.add(Shape::closed_line(points, stroke));
            }
        }
    }
}

fn overlaps(a: &Rect<f64>, b: &Rect<f64>) -> bool {
    a.min().x <= b.max().x && a.max().x >= b.min().x && a.min().y <= b.max().y && a.max().y >= b.min().y
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::Padding;
    use std::time::Duration;

    #[test]
    fn test_surface_reserves_panel_width() {
        let mut viewport = Viewport::new(Coord { x: -62.712, y: -34.266 }, 14.0, MIN_ZOOM, 19.0);
        let mut popup = None;
        let size = Vec2::new(1200.0, 800.0);
        let bounds = Rect::new(Coord { x: -62.72, y: -34.27 }, Coord { x: -62.70, y: -34.26 });
        let options = FitOptions {
            padding: Padding { top: 280.0, right: 40.0, bottom: 40.0, left: 40.0 },
            max_zoom: 18.0,
            duration: Duration::ZERO,
        };

        let mut surface = EguiSurface {
            viewport: &mut viewport,
            popup: &mut popup,
            map_size: size,
            panel_width: 300.0,
            popup_height: 0.0,
            now: 0.0,
        };
        surface.fly_to_bounds(bounds, &options);

        let rect = ScreenRect::from_min_size(Pos2::ZERO, size);
        let east = viewport.geo_to_screen(Coord { x: -62.70, y: -34.265 }, rect);
        assert!(east.x <= 1200.0 - 340.0 + 0.5);
    }

    #[test]
    fn test_surface_popup_slot() {
        let mut viewport = Viewport::new(Coord { x: 0.0, y: 0.0 }, 10.0, MIN_ZOOM, 19.0);
        let mut popup = None;
        let mut surface = EguiSurface {
            viewport: &mut viewport,
            popup: &mut popup,
            map_size: Vec2::new(800.0, 600.0),
            panel_width: 0.0,
            popup_height: 0.0,
            now: 0.0,
        };
        surface.open_popup(FeatureId(3), InfoCard::default());
        surface.close_popup();
        surface.open_popup(FeatureId(4), InfoCard::default());
        assert_eq!(popup.map(|(id, _)| id), Some(FeatureId(4)));
    }

    #[test]
    fn test_tall_parcel_leaves_room_for_popup() {
        let mut viewport = Viewport::new(Coord { x: -62.712, y: -34.266 }, 14.0, MIN_ZOOM, 19.0);
        let mut popup = None;
        let size = Vec2::new(1280.0, 790.0);
        // Tall and narrow, so the vertical span decides the zoom
        let bounds = Rect::new(Coord { x: -62.7125, y: -34.28 }, Coord { x: -62.7115, y: -34.25 });
        let popup_height = estimated_popup_height(17);
        assert!(popup_height > 396.0);

        let mut surface = EguiSurface {
            viewport: &mut viewport,
            popup: &mut popup,
            map_size: size,
            panel_width: 280.0,
            popup_height,
            now: 0.0,
        };
        surface.fly_to_bounds(bounds, &crate::config::CameraConfig::default().fit_options());
        assert!(!viewport.tick(10.0));

        let rect = ScreenRect::from_min_size(Pos2::ZERO, size);
        let parcel_top = viewport.geo_to_screen(Coord { x: -62.712, y: -34.25 }, rect).y;
        let popup_bottom = parcel_top - POPUP_GAP;
        let popup_top = popup_bottom - popup_height;
        // Fits without being pushed down, so its bottom stays above the parcel
        assert!(popup_top >= 0.0);
        assert!(popup_bottom < parcel_top);
        let parcel_bottom = viewport.geo_to_screen(Coord { x: -62.712, y: -34.28 }, rect).y;
        assert!(parcel_bottom <= size.y);
    }

    #[test]
    fn test_overlaps() {
        let a = Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 1.0 });
        let b = Rect::new(Coord { x: 0.5, y: 0.5 }, Coord { x: 2.0, y: 2.0 });
        let c = Rect::new(Coord { x: 3.0, y: 3.0 }, Coord { x: 4.0, y: 4.0 });
        assert!(overlaps(&a, &b));
        assert!(!overlaps(&a, &c));
    }
}
