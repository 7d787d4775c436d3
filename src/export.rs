//! GeoJSON form of a projection, ready for a client-side map layer.

use crate::config::MapConfig;
use crate::types::{MarkerDescriptor, Projection};
use anyhow::{Context, Result};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, JsonValue};
use std::fs;
use std::path::Path;
use tracing::info;

/// Markers as point features. The tile layer settings ride along as a
/// `tiles` foreign member so a client can build the base layer.
pub fn to_feature_collection(projection: &Projection, tiles: &MapConfig) -> FeatureCollection {
    let bbox = projection
        .bounds
        .map(|b| vec![b.min().x, b.min().y, b.max().x, b.max().y]);

    let mut foreign_members = JsonObject::new();
    foreign_members.insert("tiles".to_string(), tile_layer(tiles));

    FeatureCollection {
        bbox,
        features: projection.markers.iter().map(marker_feature).collect(),
        foreign_members: Some(foreign_members),
    }
}

fn tile_layer(tiles: &MapConfig) -> JsonValue {
    serde_json::json!({
        "url": tiles.tile_url,
        "attribution": tiles.attribution,
        "maxZoom": tiles.max_zoom,
    })
}

fn marker_feature(marker: &MarkerDescriptor) -> Feature {
    let style = &marker.style;
    let mut properties = JsonObject::new();
    properties.insert("row".to_string(), JsonValue::from(marker.row_index));
    properties.insert("popup".to_string(), JsonValue::from(marker.popup.to_html()));
    properties.insert("fillColor".to_string(), JsonValue::from(style.fill_color.clone()));
    properties.insert("color".to_string(), JsonValue::from(style.stroke_color.clone()));
    properties.insert("weight".to_string(), JsonValue::from(style.weight));
    properties.insert("opacity".to_string(), JsonValue::from(style.opacity));
    properties.insert("fillOpacity".to_string(), JsonValue::from(style.fill_opacity));
    properties.insert("radius".to_string(), JsonValue::from(style.radius));

    Feature {
        bbox: None,
        geometry: Some(Geometry::new(geojson::Value::Point(vec![
            marker.lon(),
            marker.lat(),
        ]))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

pub fn write_geojson(path: &Path, projection: &Projection, tiles: &MapConfig) -> Result<()> {
    let collection = to_feature_collection(projection, tiles);
    let json = serde_json::to_string(&collection).context("Failed to serialize GeoJSON")?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write GeoJSON: {:?}", path))?;
    info!("Wrote {} features to {:?}", collection.features.len(), path);
    Ok(())
}
