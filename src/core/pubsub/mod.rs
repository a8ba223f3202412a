// src/core/pubsub/mod.rs

//! The publish/subscribe dispatcher: per-connection subscription tables
//! plus a process-local sink, fanning out object/file changes to matching
//! glob subscriptions.
//!
//! Each connection's subscription table is keyed by realm + glob pattern
//! rather than a flat channel name. Fan-out is **first-match-wins per
//! subscriber**: a connection with several overlapping patterns is
//! notified once, via the earliest-registered match, not once per
//! matching pattern.

use crate::core::glob::glob_to_regex;
use crate::core::types::{Object, ObjectId, Realm};
use dashmap::DashMap;
use regex::Regex;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// A single subscriber's view of a change: the pattern that matched, the
/// object/file id, and the new value (`None` signals deletion). Shared by
/// both realms: objects carry the full `Object` envelope, files carry their
/// sidecar descriptor, both as plain JSON.
#[derive(Debug, Clone)]
pub struct Notification {
    pub pattern: String,
    pub id: String,
    pub value: Option<Value>,
}

/// One entry in a subscription table: the original glob plus its compiled
/// regex, kept in insertion order so first-match-wins fan-out is well
/// defined.
#[derive(Clone)]
struct Subscription {
    pattern: String,
    regex: Regex,
}

/// A single connection's ordered subscription lists, one per realm.
#[derive(Default)]
pub struct ConnectionSubs {
    objects: Vec<Subscription>,
    files: Vec<Subscription>,
}

impl ConnectionSubs {
    fn table_mut(&mut self, realm: Realm) -> &mut Vec<Subscription> {
        match realm {
            Realm::Objects => &mut self.objects,
            Realm::Files => &mut self.files,
        }
    }

    fn table(&self, realm: Realm) -> &[Subscription] {
        match realm {
            Realm::Objects => &self.objects,
            Realm::Files => &self.files,
        }
    }

    pub fn subscribe(&mut self, realm: Realm, pattern: &str) {
        let table = self.table_mut(realm);
        if table.iter().any(|s| s.pattern == pattern) {
            return;
        }
        table.push(Subscription {
            pattern: pattern.to_string(),
            regex: glob_to_regex(pattern),
        });
    }

    pub fn unsubscribe(&mut self, realm: Realm, pattern: &str) {
        let table = self.table_mut(realm);
        if let Some(idx) = table.iter().position(|s| s.pattern == pattern) {
            table.remove(idx);
        }
    }

    /// Returns the first subscription (by insertion order) matching `id`.
    fn first_match(&self, realm: Realm, id: &str) -> Option<String> {
        self.table(realm)
            .iter()
            .find(|s| s.regex.is_match(id))
            .map(|s| s.pattern.clone())
    }
}

type ConnId = u64;

/// The central pub/sub registry: per-connection subscription tables plus a
/// single process-local sink.
#[derive(Default)]
pub struct PubSubDispatcher {
    connections: DashMap<ConnId, (ConnectionSubs, mpsc::UnboundedSender<Notification>)>,
    next_conn_id: AtomicU64,
    local_subs: Arc<std::sync::Mutex<ConnectionSubs>>,
    local_sink: std::sync::Mutex<Option<mpsc::UnboundedSender<(Realm, Notification)>>>,
}

impl PubSubDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new connection, returning its id and the receiving end
    /// of its notification channel.
    pub fn register_connection(&self) -> (ConnId, mpsc::UnboundedReceiver<Notification>) {
        let id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.insert(id, (ConnectionSubs::default(), tx));
        (id, rx)
    }

    pub fn drop_connection(&self, conn_id: ConnId) {
        self.connections.remove(&conn_id);
    }

    pub fn subscribe(&self, conn_id: ConnId, realm: Realm, pattern: &str) {
        if let Some(mut entry) = self.connections.get_mut(&conn_id) {
            entry.0.subscribe(realm, pattern);
        }
    }

    pub fn unsubscribe(&self, conn_id: ConnId, realm: Realm, pattern: &str) {
        if let Some(mut entry) = self.connections.get_mut(&conn_id) {
            entry.0.unsubscribe(realm, pattern);
        }
    }

    /// Registers the process-local sink. Only one may be active at a time;
    /// a later call replaces the earlier one.
    pub fn set_local_sink(&self, sink: mpsc::UnboundedSender<(Realm, Notification)>) {
        *self.local_sink.lock().unwrap() = Some(sink);
    }

    pub fn subscribe_local(&self, realm: Realm, pattern: &str) {
        self.local_subs.lock().unwrap().subscribe(realm, pattern);
    }

    pub fn unsubscribe_local(&self, realm: Realm, pattern: &str) {
        self.local_subs.lock().unwrap().unsubscribe(realm, pattern);
    }

    /// `publishAll(realm, id, obj)`: fans out to the first matching
    /// subscription per connected client, then independently notifies the
    /// process-local sink if it has a match. Materializes the connection
    /// list up front, as an immutable snapshot, so fan-out never observes
    /// a connection table mutated mid-broadcast.
    pub fn publish_all(&self, realm: Realm, id: &ObjectId, value: Option<&Object>) {
        self.publish_raw(realm, id.as_str(), value.map(|o| o.0.clone()));
    }

    /// Same fan-out as `publishAll`, but for the files realm: `id` is the
    /// combined `"<objectId>/<path>"` key the glob subscription matches
    /// against, and `value` is the blob's sidecar descriptor (`None` on
    /// delete). File mutations emit through this dispatcher the same as
    /// object mutations do.
    pub fn publish_file(&self, object_id: &str, path: &str, value: Option<Value>) {
        let combined = format!("{object_id}/{path}");
        self.publish_raw(Realm::Files, &combined, value);
    }

    fn publish_raw(&self, realm: Realm, id: &str, value: Option<Value>) {
        let snapshot: Vec<(ConnId, mpsc::UnboundedSender<Notification>, String)> = self
            .connections
            .iter()
            .filter_map(|entry| {
                let (subs, sender) = entry.value();
                subs.first_match(realm, id).map(|pattern| (*entry.key(), sender.clone(), pattern))
            })
            .collect();

        for (conn_id, sender, pattern) in snapshot {
            let notification = Notification {
                pattern,
                id: id.to_string(),
                value: value.clone(),
            };
            if sender.send(notification).is_err() {
                self.connections.remove(&conn_id);
            }
        }

        let local_match = self.local_subs.lock().unwrap().first_match(realm, id);
        if let Some(pattern) = local_match {
            if let Some(sink) = self.local_sink.lock().unwrap().as_ref() {
                let _ = sink.send((
                    realm,
                    Notification {
                        pattern,
                        id: id.to_string(),
                        value: value.clone(),
                    },
                ));
            }
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}
