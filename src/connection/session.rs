// src/connection/session.rs

//! Per-connection state: auth bookkeeping kept alongside the connection
//! rather than in the shared store.

use crate::core::pubsub::Notification;
use std::collections::HashMap;
use tokio::sync::mpsc;

/// An in-flight `insert` stream: the target blob plus the bytes buffered
/// so far, accumulated across `insertChunk` frames and flushed to
/// `writeFile` on `insertEnd`.
pub struct InsertStream {
    pub id: String,
    pub name: String,
    pub mime_type: Option<String>,
    pub buffer: Vec<u8>,
}

/// The connection's identity and its pub/sub notification inbox. A real
/// pre-handshake authentication hook would populate `user` before the
/// first request is dispatched; absent one, each request line carries
/// its own `user` field and this struct only tracks which one was used
/// most recently, for logging.
pub struct SessionState {
    pub conn_id: u64,
    pub notify_rx: mpsc::UnboundedReceiver<Notification>,
    pub last_user: Option<String>,
    pub inserts: HashMap<String, InsertStream>,
}

impl SessionState {
    pub fn new(conn_id: u64, notify_rx: mpsc::UnboundedReceiver<Notification>) -> Self {
        Self {
            conn_id,
            notify_rx,
            last_user: None,
            inserts: HashMap::new(),
        }
    }
}
