use clap::{Args, Parser, Subcommand};
use geowebmap::config::AppConfig;
use geowebmap::render::RasterMap;
use geowebmap::types::DisplayMode;
use geowebmap::{data, export, server, GeoWebMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Project the data into GeoJSON markers and an optional PNG preview
    Render {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        #[command(flatten)]
        display: DisplayArgs,
    },
    /// Serve the projected markers over HTTP
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        #[command(flatten)]
        display: DisplayArgs,
    },
}

/// Overrides for the `[display]` section.
#[derive(Args)]
struct DisplayArgs {
    #[arg(long)]
    marker_size: Option<f64>,
    #[arg(long)]
    fill_opacity: Option<f64>,
    /// "Percentual" for percentages of the total, anything else for raw values
    #[arg(long)]
    display_mode: Option<String>,
}

impl DisplayArgs {
    fn apply(&self, config: &mut AppConfig) {
        let options = &mut config.display.options;
        if let Some(size) = self.marker_size {
            options.marker_size = size;
        }
        if let Some(opacity) = self.fill_opacity {
            options.fill_opacity = opacity;
        }
        if let Some(mode) = &self.display_mode {
            options.display_mode = DisplayMode::from(mode.as_str());
        }
    }
}

fn load(config: &Path, display: &DisplayArgs) -> anyhow::Result<(AppConfig, geowebmap::Dataset, geowebmap::Roles)> {
    let mut app_config = AppConfig::load_from_file(config)?;
    display.apply(&mut app_config);

    let rows = data::load_rows(&app_config.input.data)?;
    let roles = data::resolve_roles(&app_config.input.roles, &rows);
    Ok((app_config, Arc::new(rows), roles))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Render { config, display } => {
            println!("Rendering map with config: {:?}", config);
            let (app_config, dataset, roles) = load(config, display)?;

            let surface = RasterMap::new(app_config.output.image_width, app_config.output.image_height);
            let mut map = GeoWebMap::new(surface);
            map.init(&app_config.map);
            map.update(&dataset, roles, &app_config.display.options);

            export::write_geojson(&app_config.output.geojson, map.projection(), &app_config.map)?;
            if let Some(image) = &app_config.output.image {
                map.surface().save(image)?;
            }

            println!(
                "Render complete: {} markers from {} rows.",
                map.projection().markers.len(),
                dataset.len()
            );
        }
        Commands::Serve { config, display } => {
            println!("Serving map with config: {:?}", config);
            let (app_config, dataset, roles) = load(config, display)?;

            let projection = geowebmap::project_markers(&dataset, &roles, &app_config.display.options);
            server::start_server(app_config, projection, roles.selection).await?;
        }
    }

    Ok(())
}
