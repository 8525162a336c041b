//! Slippy-map basemap tiles
//!
//! Tiles are fetched on the tokio runtime and handed back to the GUI thread
//! over a channel. The cache lives in memory for the session only.

use std::collections::HashMap;
use std::sync::mpsc::{channel, Receiver, Sender};

use egui::{Color32, ColorImage, Pos2, Rect as ScreenRect, TextureHandle, TextureOptions};
use geo::Coord;
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::viewport::Viewport;

/// Keep at most this many decoded tiles around
const MAX_CACHED_TILES: usize = 512;

#[derive(Error, Debug)]
pub enum TileError {
    #[error("tile request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("tile server returned status {0}")]
    Status(u16),
    #[error("tile image could not be decoded: {0}")]
    Decode(#[from] image::ImageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileId {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileId {
    pub fn url(&self, template: &str) -> String {
        template
            .replace("{z}", &self.z.to_string())
            .replace("{x}", &self.x.to_string())
            .replace("{y}", &self.y.to_string())
    }
}

/// Tiles covering `rect` at the integer zoom nearest to the view zoom,
/// with the screen rectangle each one occupies
pub fn visible_tiles(viewport: &Viewport, rect: ScreenRect, max_zoom: u8) -> Vec<(TileId, ScreenRect)> {
    let z = viewport.zoom().round().clamp(0.0, max_zoom as f64) as u8;
    let n = 1u32 << z;
    let tiles_per_unit = n as f64;

    let top_left = viewport.screen_to_world(rect.left_top(), rect);
    let bottom_right = viewport.screen_to_world(rect.right_bottom(), rect);

    let x0 = (top_left.x * tiles_per_unit).floor() as i64;
    let x1 = (bottom_right.x * tiles_per_unit).floor() as i64;
    let y0 = ((top_left.y * tiles_per_unit).floor() as i64).max(0);
    let y1 = ((bottom_right.y * tiles_per_unit).floor() as i64).min(n as i64 - 1);

    let mut tiles = Vec::new();
    for ty in y0..=y1 {
        for tx in x0..=x1 {
            let corner = |dx: i64, dy: i64| {
                viewport.world_to_screen(
                    Coord {
                        x: (tx + dx) as f64 / tiles_per_unit,
                        y: (ty + dy) as f64 / tiles_per_unit,
                    },
                    rect,
                )
            };
            let screen = ScreenRect::from_min_max(corner(0, 0), corner(1, 1));
            let id = TileId {
                z,
                x: tx.rem_euclid(n as i64) as u32,
                y: ty as u32,
            };
            tiles.push((id, screen));
        }
    }
    tiles
}

enum Slot {
    Pending,
    Ready(TextureHandle),
    Failed,
}

pub struct TileLayer {
    template: String,
    max_zoom: u8,
    client: reqwest::Client,
    runtime: Handle,
    slots: HashMap<TileId, Slot>,
    tx: Sender<(TileId, Result<ColorImage, TileError>)>,
    rx: Receiver<(TileId, Result<ColorImage, TileError>)>,
}

impl TileLayer {
    pub fn new(template: &str, max_zoom: u8, user_agent: &str, runtime: Handle) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().user_agent(user_agent).build()?;
        let (tx, rx) = channel();
        Ok(Self {
            template: template.to_string(),
            max_zoom,
            client,
            runtime,
            slots: HashMap::new(),
            tx,
            rx,
        })
    }

    pub fn max_zoom(&self) -> u8 {
        self.max_zoom
    }

    /// Turn finished downloads into textures
    fn receive(&mut self, ctx: &egui::Context) {
        while let Ok((id, result)) = self.rx.try_recv() {
            let slot = match result {
                Ok(image) => {
                    let name = format!("tile-{}-{}-{}", id.z, id.x, id.y);
                    Slot::Ready(ctx.load_texture(name, image, TextureOptions::LINEAR))
                }
                Err(e) => {
                    warn!("Tile {:?} failed: {}", id, e);
                    Slot::Failed
                }
            };
            self.slots.insert(id, slot);
        }
    }

    fn request(&mut self, id: TileId, ctx: &egui::Context) {
        self.slots.insert(id, Slot::Pending);
        let url = id.url(&self.template);
        let client = self.client.clone();
        let tx = self.tx.clone();
        let ctx = ctx.clone();
        debug!("Fetching tile {}", url);
        self.runtime.spawn(async move {
            let result = fetch_tile(&client, &url).await;
            // Receiver gone means the viewer closed
            let _ = tx.send((id, result));
            ctx.request_repaint();
        });
    }

    /// Paint the basemap, requesting any tile not yet cached
    pub fn draw(&mut self, ctx: &egui::Context, painter: &egui::Painter, viewport: &Viewport, rect: ScreenRect) {
        self.receive(ctx);

        let visible = visible_tiles(viewport, rect, self.max_zoom);
        let uv = ScreenRect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0));
        for (id, screen) in &visible {
            match self.slots.get(id) {
                Some(Slot::Ready(texture)) => {
                    painter.image(texture.id(), *screen, uv, Color32::WHITE);
                }
                Some(Slot::Pending) | Some(Slot::Failed) => {}
                None => self.request(*id, ctx),
            }
        }

        if self.slots.len() > MAX_CACHED_TILES {
            let keep: Vec<TileId> = visible.iter().map(|(id, _)| *id).collect();
            self.slots
                .retain(|id, slot| matches!(slot, Slot::Pending) || keep.contains(id));
            debug!("Tile cache trimmed to {}", self.slots.len());
        }
    }
}

async fn fetch_tile(client: &reqwest::Client, url: &str) -> Result<ColorImage, TileError> {
    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(TileError::Status(response.status().as_u16()));
    }
    let bytes = response.bytes().await?;
    let rgba = image::load_from_memory(&bytes)?.to_rgba8();
    let size = [rgba.width() as usize, rgba.height() as usize];
    Ok(ColorImage::from_rgba_unmultiplied(size, rgba.as_raw()))
}
