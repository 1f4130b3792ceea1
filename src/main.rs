//! Fitbit MCP - the Fitbit Web API as Model Context Protocol tools

use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, error, info};

use fitbit_mcp::{
    cli::{Cli, Command},
    config::Config,
    gateway::Gateway,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is fine; variables may come from the environment
    let dotenv = dotenvy::dotenv();

    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    if let Ok(path) = dotenv {
        debug!(path = %path.display(), "Loaded .env file");
    }

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(code) => return code,
    };

    match cli.command {
        Some(Command::AuthUrl) => print_auth_url(&config),
        Some(Command::Serve) | None => run_server(config).await,
    }
}

fn load_config(cli: &Cli) -> Result<Config, ExitCode> {
    match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            if let Some(port) = cli.port {
                config.server.port = port;
            }
            if let Some(ref host) = cli.host {
                config.server.host = host.clone();
            }
            Ok(config)
        }
        Err(e) => {
            error!("Failed to load configuration: {e}");
            Err(ExitCode::FAILURE)
        }
    }
}

/// Print the authorization URL for the configured client
fn print_auth_url(config: &Config) -> ExitCode {
    match config.oauth_settings() {
        Ok(settings) => {
            println!("{}", settings.authorization_url());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_server(config: Config) -> ExitCode {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        "Starting Fitbit MCP server"
    );

    let gateway = match Gateway::new(config) {
        Ok(g) => g,
        Err(e) => {
            error!("Failed to create server: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = gateway.run().await {
        error!("Server error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Shutdown complete");
    ExitCode::SUCCESS
}
