//! CAPI Configurer - apply, preview or render a cluster specification

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use capi_configurer::cluster::validate_request;
use capi_configurer::config::Settings;
use capi_configurer::configurer::ConfigureResponse;
use capi_configurer::{Error, Result};

/// CAPI Configurer - diff and render Cluster API cluster specifications
#[derive(Parser, Debug)]
#[command(name = "capi-configurer", version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Persist a specification and write its manifests
    ///
    /// Prints the response document with the detected changes and the
    /// locations of the state and manifest files.
    Apply(RequestArgs),

    /// Show what applying a specification would change
    Preview(RequestArgs),

    /// Print the manifest stream for a specification without touching state
    Render(RequestArgs),
}

/// Request input
#[derive(Parser, Debug)]
struct RequestArgs {
    /// Path to the request document (JSON or YAML)
    #[arg(short = 'f', long = "file")]
    file: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let configurer = cli.settings.configurer().await;

    let result = match cli.command {
        Commands::Apply(args) => {
            let body = read_request(&args.file).await?;
            to_document(configurer.apply_or_preview(&body, true).await)
        }
        Commands::Preview(args) => {
            let body = read_request(&args.file).await?;
            to_document(configurer.apply_or_preview(&body, false).await)
        }
        Commands::Render(args) => {
            let body = read_request(&args.file).await?;
            match validate_request(&body) {
                Ok(spec) => configurer.render(&spec).await,
                Err(e) => Err(e),
            }
        }
    };

    match result {
        Ok(output) => {
            println!("{output}");
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "request failed");
            println!("{}", serde_json::to_string_pretty(&e.to_document())?);
            std::process::exit(1);
        }
    }
}

async fn read_request(path: &Path) -> anyhow::Result<serde_json::Value> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read request file {:?}: {}", path, e))?;
    serde_yaml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Failed to parse request file {:?}: {}", path, e))
}

fn to_document(result: Result<ConfigureResponse>) -> Result<String> {
    result.and_then(|response| {
        serde_json::to_string_pretty(&response)
            .map_err(|e| Error::serialization(format!("response: {e}")))
    })
}
