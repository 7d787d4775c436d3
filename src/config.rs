use crate::processing::DisplayOptions;
use crate::types::ColumnRole;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    /// CSV or JSON rows
    pub data: PathBuf,
    #[serde(default)]
    pub roles: RolesConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RolesConfig {
    pub latitude: Option<RoleConfig>,
    pub longitude: Option<RoleConfig>,
    pub location: Option<RoleConfig>,
    pub color: Option<RoleConfig>,
    pub measure: Option<RoleConfig>,
    pub selection: Option<RoleConfig>,
}

impl RolesConfig {
    pub fn get(&self, role: ColumnRole) -> Option<&RoleConfig> {
        match role {
            ColumnRole::Latitude => self.latitude.as_ref(),
            ColumnRole::Longitude => self.longitude.as_ref(),
            ColumnRole::Location => self.location.as_ref(),
            ColumnRole::Color => self.color.as_ref(),
            ColumnRole::Measure => self.measure.as_ref(),
            ColumnRole::Selection => self.selection.as_ref(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RoleConfig {
    pub column: String,
    pub label: Option<String>, // defaults to the column name
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DisplayConfig {
    #[serde(flatten)]
    pub options: DisplayOptions,
    // Layout passthrough for the hosting page.
    pub height: Option<u32>,
    pub width: Option<u32>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MapConfig {
    pub tile_url: String,
    pub max_zoom: u8,
    pub attribution: String,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            tile_url: "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
            max_zoom: 19,
            attribution: "© OpenStreetMap contributors".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OutputConfig {
    pub geojson: PathBuf,
    pub image: Option<PathBuf>,
    pub image_width: u32,
    pub image_height: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            geojson: PathBuf::from("markers.geojson"),
            image: None,
            image_width: 1024,
            image_height: 768,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            static_dir: PathBuf::from("."),
        }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)
            .with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }
}
