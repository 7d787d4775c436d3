use crate::config::MapConfig;
use crate::map::MapSurface;
use crate::types::MarkerDescriptor;
use anyhow::{Context, Result};
use geo::Rect;
use image::{ImageBuffer, Rgba, RgbaImage};
use std::f64::consts::PI;
use std::path::Path;
use tracing::{debug, info};

// Constants for Web Mercator
const TILE_SIZE: f64 = 256.0;
const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

const BACKGROUND: Rgba<u8> = Rgba([242, 239, 233, 255]);

/// Static raster stand-in for the interactive map: draws circle markers
/// over a flat background in Web Mercator pixel space.
#[derive(Debug, Clone)]
pub struct RasterMap {
    width: u32,
    height: u32,
    zoom: u8,
    max_zoom: u8,
    // View center in normalized Mercator coordinates (0..1).
    center: (f64, f64),
    markers: Vec<MarkerDescriptor>,
}

impl RasterMap {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            zoom: 0,
            max_zoom: 19,
            center: (0.5, 0.5),
            markers: Vec::new(),
        }
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    pub fn markers(&self) -> &[MarkerDescriptor] {
        &self.markers
    }

    /// Canvas pixel for a coordinate at the current view.
    pub fn pixel(&self, lat: f64, lon: f64) -> (f64, f64) {
        let (nx, ny) = normalized_mercator(lat, lon);
        let world = world_size(self.zoom);
        (
            (nx - self.center.0) * world + self.width as f64 / 2.0,
            (ny - self.center.1) * world + self.height as f64 / 2.0,
        )
    }

    pub fn to_image(&self) -> RgbaImage {
        let mut img: RgbaImage = ImageBuffer::from_pixel(self.width, self.height, BACKGROUND);
        for marker in &self.markers {
            self.draw_marker(&mut img, marker);
        }
        img
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.to_image()
            .save(path)
            .with_context(|| format!("Failed to save map image: {:?}", path))?;
        info!("Wrote {} markers to {:?}", self.markers.len(), path);
        Ok(())
    }

    fn draw_marker(&self, img: &mut RgbaImage, marker: &MarkerDescriptor) {
        let (cx, cy) = self.pixel(marker.lat(), marker.lon());
        let style = &marker.style;
        let half_stroke = style.weight / 2.0;
        let reach = style.radius + half_stroke;

        let fill = hex_to_rgba(&style.fill_color);
        let stroke = hex_to_rgba(&style.stroke_color);

        let x0 = (cx - reach).floor().max(0.0) as u32;
        let y0 = (cy - reach).floor().max(0.0) as u32;
        let x1 = ((cx + reach).ceil().max(0.0) as u32).min(self.width);
        let y1 = ((cy + reach).ceil().max(0.0) as u32).min(self.height);

        for py in y0..y1 {
            for px in x0..x1 {
                let dx = px as f64 + 0.5 - cx;
                let dy = py as f64 + 0.5 - cy;
                let d = (dx * dx + dy * dy).sqrt();

                let pixel = img.get_pixel_mut(px, py);
                if d <= style.radius {
                    blend(pixel, fill, style.fill_opacity);
                }
                if (d - style.radius).abs() <= half_stroke {
                    blend(pixel, stroke, style.opacity);
                }
            }
        }
    }
}

impl MapSurface for RasterMap {
    fn set_view(&mut self, center: (f64, f64), zoom: u8) {
        self.center = normalized_mercator(center.0, center.1);
        self.zoom = zoom.min(self.max_zoom);
    }

    fn add_tile_layer(&mut self, tiles: &MapConfig) {
        // Imagery is not fetched; only the zoom ceiling applies.
        self.max_zoom = tiles.max_zoom;
    }

    fn clear_markers(&mut self) {
        self.markers.clear();
    }

    fn add_marker(&mut self, marker: &MarkerDescriptor) {
        self.markers.push(marker.clone());
    }

    /// Centers on `bounds` at the highest zoom where they still fit.
    fn fit_bounds(&mut self, bounds: Rect<f64>) {
        let (x_min, y_max) = normalized_mercator(bounds.min().y, bounds.min().x);
        let (x_max, y_min) = normalized_mercator(bounds.max().y, bounds.max().x);
        let span_x = x_max - x_min;
        let span_y = y_max - y_min;

        let mut zoom = 0;
        for z in 0..=self.max_zoom {
            let world = world_size(z);
            if span_x * world <= self.width as f64 && span_y * world <= self.height as f64 {
                zoom = z;
            } else {
                break;
            }
        }

        self.center = ((x_min + x_max) / 2.0, (y_min + y_max) / 2.0);
        self.zoom = zoom;
        debug!("Fit bounds at zoom {}", zoom);
    }
}

fn world_size(zoom: u8) -> f64 {
    TILE_SIZE * 2.0_f64.powi(zoom as i32)
}

/// Web Mercator position scaled to 0..1 on both axes, y growing southward.
fn normalized_mercator(lat: f64, lon: f64) -> (f64, f64) {
    let lat_rad = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    let x = (lon + 180.0) / 360.0;
    let y = (1.0 - (lat_rad.tan() + (1.0 / lat_rad.cos())).ln() / PI) / 2.0;
    (x, y)
}

fn blend(pixel: &mut Rgba<u8>, color: Rgba<u8>, alpha: f64) {
    let alpha = alpha.clamp(0.0, 1.0);
    for channel in 0..3 {
        let src = color[channel] as f64;
        let dst = pixel[channel] as f64;
        pixel[channel] = (src * alpha + dst * (1.0 - alpha)).round() as u8;
    }
    pixel[3] = 255;
}

/// Parses `#rrggbb` or the named color `gray`. Anything else is black.
pub fn hex_to_rgba(color: &str) -> Rgba<u8> {
    if color.eq_ignore_ascii_case("gray") || color.eq_ignore_ascii_case("grey") {
        return Rgba([128, 128, 128, 255]);
    }
    let hex = color.trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return Rgba([0, 0, 0, 255]);
    }
    let r = u8::from_str_radix(&hex[0..2], 16).unwrap_or(0);
    let g = u8::from_str_radix(&hex[2..4], 16).unwrap_or(0);
    let b = u8::from_str_radix(&hex[4..6], 16).unwrap_or(0);
    Rgba([r, g, b, 255])
}
