//! Geowebmap: projects tabular point data onto map markers.
//!
//! Rows arrive from a host with a role map naming the latitude, longitude,
//! location, color, measure and selection columns. [`processing::project_markers`]
//! turns them into [`types::MarkerDescriptor`]s and a framing region;
//! [`map::GeoWebMap`] replays that onto a [`map::MapSurface`].

pub mod config;
pub mod data;
pub mod export;
pub mod map;
pub mod palette;
pub mod processing;
pub mod render;
pub mod server;
pub mod types;

pub use map::{Dataset, GeoWebMap, MapSurface, SelectionSink};
pub use palette::ColorPalette;
pub use processing::{project_markers, DisplayOptions};
pub use types::{ColumnRole, DisplayMode, MarkerDescriptor, Projection, RoleBinding, Roles, Row, Value};
