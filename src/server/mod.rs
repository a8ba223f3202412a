// src/server/mod.rs

//! Server startup orchestration: build every component and bind the
//! listener (`initialization::setup`), then run the accept loop until
//! shutdown (`connection_loop::run`).

mod connection_loop;
mod context;
mod initialization;
mod metrics_server;
mod stream;

pub use stream::AnyStream;

use crate::config::Config;
use anyhow::Result;

pub async fn run(config: Config) -> Result<()> {
    let ctx = initialization::setup(config).await?;
    connection_loop::run(ctx).await;
    Ok(())
}
