//! Adapter between marker projection and a live map.
//!
//! The map itself (tiles, pan/zoom, popups) belongs to whatever implements
//! [`MapSurface`]. [`GeoWebMap`] owns that handle, decides when the
//! projection must re-run and replays the result onto the surface by
//! clearing the marker layer and adding every marker again.

use crate::config::MapConfig;
use crate::processing::{project_markers, DisplayOptions};
use crate::types::{DisplayMode, MarkerDescriptor, Projection, RoleBinding, Roles, Row};
use geo::Rect;
use std::sync::Arc;
use tracing::{debug, info};

pub type Dataset = Arc<Vec<Row>>;

/// Initial view before any data has been framed.
pub const INITIAL_CENTER: (f64, f64) = (0.0, 0.0);
pub const INITIAL_ZOOM: u8 = 2;

/// Rendering surface provided by the external map library.
pub trait MapSurface {
    /// `center` is (lat, lon).
    fn set_view(&mut self, center: (f64, f64), zoom: u8);
    fn add_tile_layer(&mut self, tiles: &MapConfig);
    fn clear_markers(&mut self);
    fn add_marker(&mut self, marker: &MarkerDescriptor);
    fn fit_bounds(&mut self, bounds: Rect<f64>);
}

/// Host channel for reporting selections. Delivery is not acknowledged.
pub trait SelectionSink {
    fn post_selection(&self, role: Option<&RoleBinding>, rows: &[usize]);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingSelection;

impl SelectionSink for LoggingSelection {
    fn post_selection(&self, role: Option<&RoleBinding>, rows: &[usize]) {
        let column = role.map(|r| r.column.as_str()).unwrap_or("<none>");
        info!(selection = column, ?rows, "selection posted");
    }
}

/// The inputs whose change requires a recompute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RecomputeKey {
    dataset: usize,
    radius: u64,
    fill_opacity: u64,
    mode: DisplayMode,
}

impl RecomputeKey {
    fn new(dataset: &Dataset, options: &DisplayOptions) -> Self {
        Self {
            dataset: Arc::as_ptr(dataset) as usize,
            radius: options.marker_size.to_bits(),
            fill_opacity: options.fill_opacity.to_bits(),
            mode: options.display_mode,
        }
    }
}

pub struct GeoWebMap<S> {
    surface: S,
    initialized: bool,
    roles: Roles,
    last_key: Option<RecomputeKey>,
    projection: Projection,
}

impl<S: MapSurface> GeoWebMap<S> {
    pub fn new(surface: S) -> Self {
        Self {
            surface,
            initialized: false,
            roles: Roles::default(),
            last_key: None,
            projection: Projection::default(),
        }
    }

    /// Creates the view and base tile layer. Only the first call has an effect.
    pub fn init(&mut self, tiles: &MapConfig) {
        if self.initialized {
            return;
        }
        self.surface.set_view(INITIAL_CENTER, INITIAL_ZOOM);
        self.surface.add_tile_layer(tiles);
        self.initialized = true;
    }

    /// Change notification from the hosting shell.
    ///
    /// Recomputes when the dataset identity or any display option differs
    /// from the previous pass. Returns whether markers were rebuilt.
    pub fn update(&mut self, dataset: &Dataset, roles: Roles, options: &DisplayOptions) -> bool {
        if !self.initialized {
            debug!("map not initialized, ignoring update");
            return false;
        }
        let key = RecomputeKey::new(dataset, options);
        if self.last_key == Some(key) {
            return false;
        }
        self.last_key = Some(key);
        self.recompute(dataset, roles, options);
        true
    }

    /// Rebuilds markers regardless of what changed.
    pub fn refresh(&mut self, dataset: &Dataset, roles: Roles, options: &DisplayOptions) {
        if !self.initialized {
            return;
        }
        self.last_key = Some(RecomputeKey::new(dataset, options));
        self.recompute(dataset, roles, options);
    }

    fn recompute(&mut self, dataset: &Dataset, roles: Roles, options: &DisplayOptions) {
        let projection = project_markers(dataset, &roles, options);

        self.surface.clear_markers();
        for marker in &projection.markers {
            self.surface.add_marker(marker);
        }
        if let Some(bounds) = projection.bounds {
            self.surface.fit_bounds(bounds);
        }

        info!(
            "Rendered {} markers from {} rows",
            projection.markers.len(),
            dataset.len()
        );
        self.roles = roles;
        self.projection = projection;
    }

    /// Reports the row behind the marker at `marker` (position in the
    /// current marker list) to the host.
    pub fn click(&self, marker: usize, sink: &dyn SelectionSink) -> Option<usize> {
        let row = self.projection.markers.get(marker)?.row_index;
        sink.post_selection(self.roles.selection.as_ref(), &[row]);
        Some(row)
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

}
