mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use lumicast::{config, server};

async fn start_server(
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<&std::path::Path>,
) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;

    // Override host/port from CLI if specified
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }

    tracing::info!("Starting lumicast server");
    tracing::info!(
        channels = config.channels.len(),
        tick_ms = config.tick_ms,
        "Server will listen on {}:{}",
        config.host,
        config.port
    );

    server::run(config).await
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on the
    // verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "lumicast=debug,tower_http=debug".to_string()
        } else {
            "lumicast=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("lumicast {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn validate_config(path: Option<&std::path::Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            println!("  Server: {}:{}", config.host, config.port);
            println!("  Tick: {} ms", config.tick_ms);
            println!("  Channels: {}", config.channels.len());
            for channel in &config.channels {
                println!(
                    "    {} ({} video / {} audio qualities, timescale {})",
                    channel.name,
                    channel.video_qualities.len(),
                    channel.audio_qualities.len(),
                    channel.timescale
                );
            }
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            println!("  Server: {}:{}", config.host, config.port);
        }
    }

    Ok(())
}
