//! Framecast CLI: offline rendering of animated scenes.
//!
//! Usage:
//!   framecast render <MANIFEST>          Render one manifest
//!   framecast batch <MANIFEST>...        Render several manifests in turn
//!   framecast validate <MANIFEST>        Check a manifest without rendering
//!   framecast check                      Check ffmpeg and font availability

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use framecast_common::config::AppConfig;

mod commands;

use commands::RenderOptions;

#[derive(Parser)]
#[command(
    name = "framecast",
    about = "Render animated canvas scenes to video, GIF, or image sequences",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a scene manifest
    Render {
        /// Path to the manifest JSON
        manifest: PathBuf,

        /// Output file (directory for image sequences); the extension
        /// follows the format
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        options: RenderOptions,

        /// Print the export summary as JSON on success
        #[arg(long)]
        json: bool,
    },

    /// Render several manifests one after another
    Batch {
        /// Manifest JSON files
        #[arg(required = true)]
        manifests: Vec<PathBuf>,

        /// Directory receiving every output, named after each manifest
        #[arg(long)]
        output_dir: PathBuf,

        #[command(flatten)]
        options: RenderOptions,
    },

    /// Validate a scene manifest
    Validate {
        /// Path to the manifest JSON
        manifest: PathBuf,
    },

    /// Check system capabilities
    Check {
        /// Write a default config file if none exists
        #[arg(long)]
        init_config: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load();

    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    framecast_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Render {
            manifest,
            output,
            options,
            json,
        } => commands::render::run(manifest, output, options, json, config).await,
        Commands::Batch {
            manifests,
            output_dir,
            options,
        } => commands::batch::run(manifests, output_dir, options, config).await,
        Commands::Validate { manifest } => commands::validate::run(manifest),
        Commands::Check { init_config } => commands::check::run(&config, init_config),
    }
}
