//! Lumen - background image processing for an AI photo gallery.
//!
//! Lumen receives references to uploaded images, generates thumbnails,
//! extracts dominant colors, asks a vision model for tags and a description,
//! and writes everything back to the image's metadata record.
//!
//! # Usage
//!
//! ```bash
//! # Run the HTTP API with the background queue
//! lumen serve --port 8000
//!
//! # Process (or re-process) one image in the foreground
//! lumen process --image-id 42 --user-id u1 --original-path u1/original/cat.jpg --filename cat.jpg
//!
//! # View configuration
//! lumen config show
//! ```

use clap::{Parser, Subcommand};

mod api;
mod cli;
mod logging;

/// Lumen - background image processing: thumbnails, colors and AI tags.
#[derive(Parser, Debug)]
#[command(name = "lumen")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API and background processing queue
    Serve(cli::serve::ServeArgs),

    /// Process a single image in the foreground
    Process(cli::process::ProcessArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't initialized yet, so use eprintln for config warnings.
    let config = match lumen_core::Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `lumen config path`."
            );
            lumen_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("Lumen v{}", lumen_core::VERSION);

    match cli.command {
        Commands::Serve(args) => cli::serve::execute(args).await,
        Commands::Process(args) => cli::process::execute(args).await,
        Commands::Config(args) => cli::config::execute(args).await,
    }
}
