use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lingobook::config::Config;

/// Lingobook - language learning notes and translation.
#[derive(Parser, Debug)]
#[command(name = "lingobook")]
#[command(author = "lingobook contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Language learning notes and translation.", long_about = None)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the web server
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print the effective configuration with secrets hidden
    Config,
}

fn init_tracing() {
    // RUST_LOG overrides the default filter
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("lingobook=info,tower_http=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    init_tracing();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            tracing::info!(
                store = ?config.store.backend,
                "Starting lingobook on {}:{}",
                config.server.host,
                config.server.port
            );
            lingobook::gateway::run_gateway(config).await
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config.redacted())?);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn serve_accepts_host_and_port_overrides() {
        let cli = Cli::parse_from(["lingobook", "serve", "--host", "0.0.0.0", "-p", "8080"]);
        match cli.command {
            Commands::Serve { host, port } => {
                assert_eq!(host.as_deref(), Some("0.0.0.0"));
                assert_eq!(port, Some(8080));
            }
            Commands::Config => panic!("expected serve"),
        }
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::parse_from(["lingobook", "config", "--config", "/tmp/lingobook.toml"]);
        assert!(matches!(cli.command, Commands::Config));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/lingobook.toml")));
    }
}
