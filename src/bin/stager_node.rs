use clap::Parser;
use droplet_stager::gateway::StagerHttpServer;
use droplet_stager::logging::LoggingSystem;
use droplet_stager::{load_stager_config, StagingNode};
use log::info;

/// Command line options for the staging node.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Path to the JSON node configuration
    #[arg(long)]
    config: Option<String>,

    /// Path to a TOML logging configuration
    #[arg(long)]
    log_config: Option<String>,

    /// Port for the callback server, overriding the configured bind address
    #[arg(long)]
    port: Option<u16>,
}

/// Start a staging node: load configuration, open storage, listen for worker
/// heartbeats and serve the internal completion endpoint.
///
/// # Environment Variables
///
/// * `STAGER_CONFIG` - Path to the node configuration file (default: config/stager_config.json)
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let logging = match &cli.log_config {
        Some(path) => droplet_stager::logging::LogConfig::from_file(path)
            .and_then(LoggingSystem::init_with_config),
        None => LoggingSystem::init_default(),
    };
    if let Err(e) = logging {
        eprintln!("Failed to initialize logging, using defaults: {}", e);
        droplet_stager::logging::init();
    }

    let mut config = load_stager_config(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.bind_address = format!("127.0.0.1:{}", port);
    }
    info!("Starting staging node with {} backend", config.backend);

    let node = StagingNode::load(config)?;
    let background = node.start_background().await;

    let server = StagerHttpServer::new(node.gateway_state(), &node.config().bind_address);
    let result = server.run().await;

    for handle in background {
        handle.abort();
    }
    node.db().flush()?;
    result?;
    Ok(())
}
