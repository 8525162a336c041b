//! Catastro viewer - interactive cadastral parcel map
//!
//! CLI commands:
//! - gui: Open the map viewer (default)
//! - sections: Load the section layer and print its legend
//! - search: Load the parcels and print the first match

mod attributes;
mod colors;
mod config;
mod features;
mod gui;
mod layers;
mod legend;
mod loader;
mod logging;
mod search;
mod selection;
mod surface;
mod tiles;
mod viewport;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::colors::SectionColors;
use crate::config::{Config, Env};
use crate::features::FeatureKind;
use crate::layers::LayerRegistry;
use crate::legend::SectionLegend;
use crate::loader::fetch_collection;
use crate::search::SearchOutcome;
use crate::selection::InfoCard;

#[derive(Parser)]
#[command(name = "catastro_viewer")]
#[command(about = "Interactive cadastral parcel map")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to catastro.yaml config
    #[arg(short, long, default_value = "catastro.yaml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the map viewer
    Gui,

    /// Print the section legend (name, color, feature count)
    Sections,

    /// Search parcels by tax id, record id or owner
    Search {
        /// Text to look for
        query: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let env = Env::load();

    let _log_guard = logging::init_logging(&env.log_dir)?;
    tracing::info!("Catastro viewer starting up");
    tracing::debug!("CLI args parsed: config={:?}", cli.config);

    let config = if cli.config.exists() {
        tracing::info!("Loading config from {:?}", cli.config);
        Config::load(&cli.config)?
    } else {
        tracing::warn!("Config file not found: {:?}, using defaults", cli.config);
        Config::default()
    };
    tracing::info!(
        "Config loaded: {} popup fields, {} search fields",
        config.popup_fields.len(),
        config.search_fields.len()
    );

    match cli.command.unwrap_or(Commands::Gui) {
        Commands::Gui => {
            tracing::info!("Launching map viewer");
            gui::run_viewer(config, env)?;
        }

        Commands::Sections => {
            print_sections(&config, &env).await?;
        }

        Commands::Search { query } => {
            search_parcels(&config, &env, &query).await?;
        }
    }

    Ok(())
}

/// Load sections and print the legend the viewer would show
async fn print_sections(config: &Config, env: &Env) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    let source = config.source_for(FeatureKind::Section, env);
    let sections = fetch_collection(&client, &source, FeatureKind::Section).await?;

    let mut colors = SectionColors::from_config(&config.palette)?;
    match SectionLegend::build(&sections, &mut colors) {
        Ok(legend) => {
            println!("Sections by '{}' ({}):", legend.field(), legend.entries().len());
            println!();
            for entry in legend.entries() {
                println!("  {} {} ({} features)", entry.color.to_hex(), entry.label, entry.count);
            }
        }
        Err(e) => {
            println!("No legend: {}", e);
            println!("{} sections would be drawn in {}", sections.len(), colors.neutral().to_hex());
        }
    }
    Ok(())
}

/// Load parcels, run a search and print the info card of the hit
async fn search_parcels(config: &Config, env: &Env, query: &str) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    let source = config.source_for(FeatureKind::Parcel, env);
    let parcels = fetch_collection(&client, &source, FeatureKind::Parcel).await?;

    let mut registry = LayerRegistry::new();
    registry.set_parcels(parcels);

    match search::search(&registry, query, &config.search_fields) {
        SearchOutcome::Empty => println!("Empty query"),
        SearchOutcome::NotFound => println!("No parcel matches '{}'", query.trim()),
        SearchOutcome::Found(id) => {
            let parcel = registry
                .parcel(id)
                .ok_or_else(|| anyhow::anyhow!("Parcel {:?} vanished", id))?;
            let card = InfoCard::build(parcel, &config.popup_fields);
            println!("Parcel #{}:", id.0);
            for line in card.lines() {
                println!("  {}", line);
            }
        }
    }
    Ok(())
}
