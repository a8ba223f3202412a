// src/server/initialization.rs

//! Builds every component (ACL engine, object/file stores, pub/sub
//! dispatcher, persistence handle, request façade) and binds the
//! listener, in a staged-startup sequence.

use super::context::ServerContext;
use crate::config::Config;
use crate::core::acl::AclEngine;
use crate::core::facade::RequestFacade;
use crate::core::file_store::FileStore;
use crate::core::object_store::ObjectStore;
use crate::core::persistence::PersistenceHandle;
use crate::core::pubsub::PubSubDispatcher;
use anyhow::{Context, Result, anyhow};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_rustls::{TlsAcceptor, rustls};
use tracing::info;

pub async fn setup(config: Config) -> Result<ServerContext> {
    let data_dir = PathBuf::from(&config.connection.data_dir);
    tokio::fs::create_dir_all(&data_dir)
        .await
        .with_context(|| format!("failed to create data directory '{}'", data_dir.display()))?;

    let acceptor = setup_tls(&config).await?;

    let acl = Arc::new(AclEngine::new());
    let pubsub = Arc::new(PubSubDispatcher::new());
    let persistence = Arc::new(PersistenceHandle::new(data_dir.clone(), config.backup.clone()));
    let objects = ObjectStore::new(acl.clone(), pubsub.clone(), persistence.clone());
    objects.load_from_disk().await;
    objects.seed_default_new_acl(config.default_new_acl.clone()).await;

    let files = FileStore::new(
        data_dir.join("files"),
        acl.clone(),
        pubsub.clone(),
        config.connection.no_file_cache,
    );
    files.set_default_acl(objects.default_new_acl().await).await;

    let facade = RequestFacade::new(acl, objects, files, pubsub, persistence);

    let (shutdown_tx, _) = broadcast::channel(1);
    let listener = match TcpListener::bind((config.connection.host.as_str(), config.connection.port)).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(
                "Failed to bind {}:{}: {}",
                config.connection.host,
                config.connection.port,
                e
            );
            // Port-bind failure is fatal with exit code 24.
            std::process::exit(24);
        }
    };
    info!("objectdb listening on {}:{}", config.connection.host, config.connection.port);

    Ok(ServerContext {
        facade,
        listener,
        acceptor,
        shutdown_tx,
        metrics_enabled: config.metrics.enabled,
        metrics_port: config.metrics.port,
    })
}

async fn setup_tls(config: &Config) -> Result<Option<TlsAcceptor>> {
    if !config.connection.secure {
        return Ok(None);
    }
    let certs_config = config
        .connection
        .certificates
        .as_ref()
        .ok_or_else(|| anyhow!("connection.secure is set but connection.certificates is missing"))?;

    info!("TLS enabled, loading certificate and key.");
    let certs = load_certs(&certs_config.cert_path)?;
    let key = load_key(&certs_config.key_path)?;
    let server_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    Ok(Some(TlsAcceptor::from(Arc::new(server_config))))
}

fn load_certs(path: &str) -> Result<Vec<rustls::pki_types::CertificateDer<'static>>> {
    let cert_file = File::open(path).with_context(|| format!("failed to open certificate file '{path}'"))?;
    let mut cert_reader = BufReader::new(cert_file);
    let certs = rustls_pemfile::certs(&mut cert_reader).collect::<Result<Vec<_>, _>>()?;
    if certs.is_empty() {
        return Err(anyhow!("no certificates found in '{path}'"));
    }
    Ok(certs)
}

fn load_key(path: &str) -> Result<rustls::pki_types::PrivateKeyDer<'static>> {
    let key_file = File::open(path).with_context(|| format!("failed to open private key file '{path}'"))?;
    let mut key_reader = BufReader::new(key_file);
    rustls_pemfile::private_key(&mut key_reader)?
        .ok_or_else(|| anyhow!("no private key found in key file '{path}'"))
}
