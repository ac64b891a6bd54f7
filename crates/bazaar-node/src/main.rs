//! bazaar - Bazaar marketplace node
//!
//! Runs an in-process demo market and manages node configuration files.

use std::path::PathBuf;

use anyhow::Context;
use bazaar_core::Parameters;
use bazaar_node::{build_ai, config::MarketConfig, demo, telemetry, DemoOptions};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::info;

#[derive(Parser)]
#[command(name = "bazaar")]
#[command(about = "Bazaar bot marketplace node")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, env = "BAZAAR_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a demo market and print the results as JSON
    Demo {
        /// Capability to request
        #[arg(long, default_value = "ai-news")]
        capability: String,

        /// Request parameters as a JSON object
        #[arg(long, default_value = r#"{"topic": "AI trends"}"#)]
        params: String,
    },

    /// Write a config file with default values
    InitConfig {
        /// Path to write config
        #[arg(short, long, default_value = "bazaar.toml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Validate a config file and print the effective settings
    CheckConfig,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<MarketConfig> {
    let mut config = match path {
        Some(path) => MarketConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => MarketConfig::default(),
    };
    config.apply_env()?;
    config.validate()?;
    Ok(config)
}

fn parse_params(raw: &str) -> anyhow::Result<Parameters> {
    match serde_json::from_str::<Value>(raw).context("--params is not valid JSON")? {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!("--params must be a JSON object, got {other}"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Demo { capability, params } => {
            let config = load_config(cli.config.as_ref())?;
            telemetry::init(&config.logging);

            let options = DemoOptions {
                capability,
                parameters: parse_params(&params)?,
            };
            let ai = build_ai(&config)?;
            info!(capability = %options.capability, "starting demo market");
            let report = demo::run(&config, ai, &options).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::InitConfig { output, force } => {
            if output.exists() && !force {
                anyhow::bail!("{} already exists (use --force to overwrite)", output.display());
            }
            MarketConfig::default().write_to(&output)?;
            println!("Config written to {}", output.display());
        }

        Commands::CheckConfig => {
            let config = load_config(cli.config.as_ref())?;
            config.resolve_credentials()?;
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}
