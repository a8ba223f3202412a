// src/main.rs

//! Entry point: load configuration, install a reloadable tracing
//! subscriber, and run the server. A `--config` flag defaults to
//! `config.toml`; a `tracing_subscriber::reload::Layer` is wired for
//! future dynamic level changes; bad config exits immediately.

use anyhow::Result;
use objectdb::config::Config;
use objectdb::server;
use std::env;
use tracing::error;
use tracing_subscriber::{filter::EnvFilter, prelude::*, reload};

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("objectdb version {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
        .unwrap_or("config.toml");

    let config = match Config::from_file(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration from '{config_path}': {e}");
            std::process::exit(1);
        }
    };

    let initial_level = env::var("RUST_LOG").unwrap_or_else(|_| config.logger.level.clone());
    let (filter, _reload_handle) = reload::Layer::new(EnvFilter::new(initial_level));
    if config.logger.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().compact().with_ansi(true))
            .init();
    }

    if let Err(e) = server::run(config).await {
        error!("Server runtime error: {}", e);
        return Err(e);
    }
    Ok(())
}
