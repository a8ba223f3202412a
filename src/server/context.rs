// src/server/context.rs

use crate::core::facade::RequestFacade;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_rustls::TlsAcceptor;

/// Everything needed to run the main accept loop, assembled by
/// [`super::initialization::setup`].
pub struct ServerContext {
    pub facade: Arc<RequestFacade>,
    pub listener: TcpListener,
    pub acceptor: Option<TlsAcceptor>,
    pub shutdown_tx: broadcast::Sender<()>,
    pub metrics_enabled: bool,
    pub metrics_port: u16,
}
