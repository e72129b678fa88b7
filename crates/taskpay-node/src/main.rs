use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

mod api;
mod api_payments;
mod config;
mod logging;
mod metrics;
mod node;

use config::NodeConfig;

#[derive(Parser)]
#[command(name = "taskpay")]
#[command(about = "TaskPay - micro-task earnings platform node", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbosity level (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the platform node
    Start {
        /// Port for the HTTP API
        #[arg(long)]
        api_port: Option<u16>,

        /// Host for the HTTP API
        #[arg(long)]
        host: Option<String>,
    },

    /// Write a default configuration file
    Init {
        /// Output directory for the configuration
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { output } => {
            let path = output.join("taskpay.toml");
            NodeConfig::default()
                .save_to_file(&path)
                .with_context(|| format!("writing {}", path.display()))?;
            println!("Wrote default configuration to {}", path.display());
            Ok(())
        }
        Commands::Start { api_port, host } => {
            let mut config = match &cli.config {
                Some(path) => NodeConfig::from_file(path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => {
                    let default_path = PathBuf::from("taskpay.toml");
                    if default_path.exists() {
                        NodeConfig::from_file(&default_path)?
                    } else {
                        NodeConfig::default()
                    }
                }
            };
            config.apply_env_overrides();

            if let Some(port) = api_port {
                config.api.port = port;
            }
            if let Some(host) = host {
                config.api.host = host;
            }
            match cli.verbose {
                0 => {}
                1 => config.logging.level = "debug".to_string(),
                _ => config.logging.level = "trace".to_string(),
            }

            logging::init_logging(&config.logging)?;
            info!(
                node = %config.node.name,
                api = %format!("{}:{}", config.api.host, config.api.port),
                "🚀 Starting TaskPay node"
            );

            let metrics = metrics::Metrics::new();
            let node = node::TaskPayNode::new(config)?;
            let _background = node.start_background(&metrics);
            let _api = api::start_api_server(node, metrics)?;

            tokio::signal::ctrl_c().await?;
            info!("🛑 Shutting down");
            Ok(())
        }
    }
}
