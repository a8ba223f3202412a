// src/server/connection_loop.rs

//! The main accept loop and graceful shutdown sequence, grounded on the
//! teacher's `server::connection_loop::run` (`tokio::select!` racing a
//! platform shutdown signal against new connections, then draining
//! client tasks and flushing state on the way out).

use super::context::ServerContext;
use super::metrics_server;
use super::stream::AnyStream;
use crate::connection::ConnectionHandler;
use crate::core::metrics;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

#[cfg(windows)]
use tokio::signal;
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

async fn await_shutdown_signal() {
    #[cfg(unix)]
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    #[cfg(unix)]
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

    #[cfg(windows)]
    let mut ctrl_c = signal::ctrl_c();

    tokio::select! {
        _ = async { #[cfg(unix)] { sigint.recv().await; info!("SIGINT received, shutting down."); } } => {},
        _ = async { #[cfg(unix)] { sigterm.recv().await; info!("SIGTERM received, shutting down."); } } => {},
        _ = async { #[cfg(windows)] { let _ = (&mut ctrl_c).await; info!("Ctrl-C received, shutting down."); } } => {},
    }
}

pub async fn run(mut ctx: ServerContext) {
    let mut client_tasks = JoinSet::new();
    let metrics_shutdown_rx = ctx.shutdown_tx.subscribe();
    if ctx.metrics_enabled {
        let port = ctx.metrics_port;
        tokio::spawn(metrics_server::run_metrics_server(port, metrics_shutdown_rx));
    }

    loop {
        tokio::select! {
            biased;

            _ = await_shutdown_signal() => {
                break;
            }

            res = ctx.listener.accept() => {
                match res {
                    Ok((socket, addr)) => {
                        info!("Accepted connection from {}", addr);
                        metrics::CONNECTIONS_RECEIVED_TOTAL.inc();
                        metrics::CONNECTED_CLIENTS.inc();

                        let facade = ctx.facade.clone();
                        let shutdown_rx = ctx.shutdown_tx.subscribe();

                        if let Some(acceptor) = ctx.acceptor.clone() {
                            client_tasks.spawn(async move {
                                match acceptor.accept(socket).await {
                                    Ok(tls_stream) => {
                                        let any_stream = AnyStream::Tls(Box::new(tls_stream));
                                        let mut handler = ConnectionHandler::new(any_stream, addr, facade, shutdown_rx);
                                        handler.run().await;
                                    }
                                    Err(e) => warn!("TLS handshake failed for {}: {}", addr, e),
                                }
                                metrics::CONNECTED_CLIENTS.dec();
                            });
                        } else {
                            client_tasks.spawn(async move {
                                let any_stream = AnyStream::Tcp(socket);
                                let mut handler = ConnectionHandler::new(any_stream, addr, facade, shutdown_rx);
                                handler.run().await;
                                metrics::CONNECTED_CLIENTS.dec();
                            });
                        }
                    }
                    Err(e) => error!("Failed to accept connection: {}", e),
                }
            }

            Some(res) = client_tasks.join_next() => {
                if let Err(e) = res {
                    if e.is_panic() {
                        error!("A connection handler panicked: {:?}", e);
                    }
                }
            }
        }
    }

    info!("Shutting down: signalling all connections.");
    let _ = ctx.shutdown_tx.send(());
    if tokio::time::timeout(Duration::from_secs(10), async {
        while client_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("Timed out waiting for connections to close cleanly.");
    }

    info!("Flushing object snapshot and file sidecars before exit.");
    ctx.facade.destroy().await;
    info!("Shutdown complete.");
}
