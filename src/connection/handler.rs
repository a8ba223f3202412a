// src/connection/handler.rs

//! Manages the full lifecycle of a client connection: decode a
//! newline-delimited JSON request, dispatch it to the [`RequestFacade`],
//! encode the response, and interleave push notifications from the
//! pub/sub dispatcher.
//!
//! A `tokio::select!` loop races shutdown signals against frame reads,
//! with a single `dispatch` match rather than a `Router`/`Command` table:
//! the wire surface is a small, fixed, named operation set rather than a
//! generalizable command grammar.

use super::session::SessionState;
use crate::core::errors::CoreError;
use crate::core::facade::RequestFacade;
use crate::core::metrics;
use crate::core::object_store::SetOptions;
use crate::core::types::{PermissionBits, Realm};
use crate::core::view::ViewSpec;
use crate::server::AnyStream;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use super::codec::LineCodec;

pub struct ConnectionHandler {
    framed: Framed<AnyStream, LineCodec>,
    addr: SocketAddr,
    facade: Arc<RequestFacade>,
    session: SessionState,
    shutdown_rx: broadcast::Receiver<()>,
}

impl ConnectionHandler {
    pub fn new(
        socket: AnyStream,
        addr: SocketAddr,
        facade: Arc<RequestFacade>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        let (conn_id, notify_rx) = facade.pubsub.register_connection();
        Self {
            framed: Framed::new(socket, LineCodec),
            addr,
            facade,
            session: SessionState::new(conn_id, notify_rx),
            shutdown_rx,
        }
    }

    pub async fn run(&mut self) {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown_rx.recv() => {
                    debug!("Connection {} received shutdown signal.", self.addr);
                    break;
                }
                notification = self.session.notify_rx.recv() => {
                    let Some(notification) = notification else { break };
                    let frame = json!({
                        "type": "message",
                        "pattern": notification.pattern,
                        "id": notification.id,
                        "value": notification.value,
                    });
                    if self.framed.send(frame).await.is_err() {
                        break;
                    }
                    metrics::NOTIFICATIONS_SENT_TOTAL.inc();
                }
                frame = self.framed.next() => {
                    match frame {
                        Some(Ok(request)) => {
                            metrics::REQUESTS_TOTAL.inc();
                            let response = self.dispatch(request).await;
                            if let Value::Object(ref obj) = response {
                                if obj.get("ok") == Some(&Value::Bool(false)) {
                                    metrics::REQUEST_ERRORS_TOTAL.inc();
                                }
                            }
                            if self.framed.send(response).await.is_err() {
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            warn!("Connection {} decode error: {}", self.addr, e);
                            break;
                        }
                        None => {
                            debug!("Connection {} closed by peer.", self.addr);
                            break;
                        }
                    }
                }
            }
        }
        self.facade.pubsub.drop_connection(self.session.conn_id);
        info!("Connection {} closed.", self.addr);
    }

    async fn dispatch(&mut self, request: Value) -> Value {
        let op = request.get("op").and_then(Value::as_str).unwrap_or_default().to_string();
        let user = request
            .get("user")
            .and_then(Value::as_str)
            .unwrap_or(crate::core::types::ADMIN_USER)
            .to_string();
        self.session.last_user = Some(user.clone());
        let args = request.get("args").cloned().unwrap_or(Value::Null);

        let result = self.execute(&op, &user, args).await;
        match result {
            Ok(value) => json!({ "ok": true, "result": value }),
            Err(e) => json!({ "ok": false, "error": error_body(&e) }),
        }
    }

    async fn execute(&mut self, op: &str, user: &str, args: Value) -> Result<Value, CoreError> {
        match op {
            "getObject" => {
                let id = arg_str(&args, "id")?;
                let obj = self.facade.get_object(user, &id).await?;
                Ok(json!(obj))
            }
            "getKeys" => {
                let pattern = arg_str(&args, "pattern")?;
                Ok(json!(self.facade.get_keys(user, &pattern).await?))
            }
            "getObjectList" => {
                let startkey = arg_opt_str(&args, "startkey");
                let endkey = arg_opt_str(&args, "endkey");
                let include_docs = arg_bool(&args, "includeDocs", false);
                let rows = self
                    .facade
                    .get_object_list(user, startkey.as_deref(), endkey.as_deref(), include_docs)
                    .await?;
                Ok(json!(
                    rows.into_iter()
                        .map(|r| json!({"id": r.id, "value": r.value.0, "doc": r.doc.map(|d| d.0)}))
                        .collect::<Vec<_>>()
                ))
            }
            "setObject" => {
                let id = arg_str(&args, "id")?;
                let obj = args.get("obj").cloned().unwrap_or(Value::Null);
                let options = args
                    .get("options")
                    .map(parse_set_options)
                    .unwrap_or_default();
                self.facade.set_object(user, &id, obj, options).await?;
                Ok(Value::Null)
            }
            "extendObject" => {
                let id = arg_str(&args, "id")?;
                let patch = args.get("patch").cloned().unwrap_or(Value::Null);
                let password = arg_opt_str(&args, "password");
                let obj = self.facade.extend_object(user, &id, patch, password.as_deref()).await?;
                Ok(json!(obj.0))
            }
            "delObject" => {
                let id = arg_str(&args, "id")?;
                self.facade.del_object(user, &id).await?;
                Ok(Value::Null)
            }
            "chownObject" => {
                let pattern = arg_str(&args, "pattern")?;
                let owner = arg_str(&args, "owner")?;
                let owner_group = arg_str(&args, "ownerGroup")?;
                Ok(json!(self.facade.chown_object(user, &pattern, &owner, &owner_group).await?))
            }
            "chmodObject" => {
                let pattern = arg_str(&args, "pattern")?;
                let object_bits = parse_bits(&args, "objectBits")?;
                let state_bits = parse_bits(&args, "stateBits")?;
                Ok(json!(self.facade.chmod_object(user, &pattern, object_bits, state_bits).await?))
            }
            "findObject" => {
                let id_or_name = arg_str(&args, "idOrName")?;
                let type_filter = arg_opt_str(&args, "type");
                Ok(json!(self.facade.find_object(user, &id_or_name, type_filter.as_deref()).await?))
            }
            "destroyDB" => {
                self.facade.destroy_db(user).await?;
                Ok(Value::Null)
            }
            "getObjectView" => {
                let design = arg_str(&args, "design")?;
                let search = arg_str(&args, "search")?;
                let startkey = arg_opt_str(&args, "startkey");
                let endkey = arg_opt_str(&args, "endkey");
                let rows = self
                    .facade
                    .get_object_view(user, &design, &search, startkey.as_deref(), endkey.as_deref())
                    .await?;
                Ok(json!(rows.into_iter().map(|r| json!({"id": r.id, "value": r.value})).collect::<Vec<_>>()))
            }
            "applyView" => {
                let spec: ViewSpec = serde_json::from_value(args.get("func").cloned().unwrap_or(Value::Null))
                    .map_err(|e| CoreError::InvalidParameter(e.to_string()))?;
                let startkey = arg_opt_str(&args, "startkey");
                let endkey = arg_opt_str(&args, "endkey");
                let rows = self.facade.apply_view(user, &spec, startkey.as_deref(), endkey.as_deref()).await?;
                Ok(json!(rows.into_iter().map(|r| json!({"id": r.id, "value": r.value})).collect::<Vec<_>>()))
            }
            "writeFile" => {
                let id = arg_str(&args, "id")?;
                let name = arg_str(&args, "name")?;
                let data = arg_bytes(&args, "data")?;
                let mime_type = arg_opt_str(&args, "mimeType");
                self.facade.write_file(user, &id, &name, data, mime_type).await?;
                Ok(Value::Null)
            }
            "readFile" => {
                let id = arg_str(&args, "id")?;
                let name = arg_str(&args, "name")?;
                let (data, mime_type) = self.facade.read_file(user, &id, &name).await?;
                Ok(json!({ "data": base64_encode(&data), "mimeType": mime_type }))
            }
            "unlink" => {
                let id = arg_str(&args, "id")?;
                let name = arg_str(&args, "name")?;
                self.facade.unlink(user, &id, &name).await?;
                Ok(Value::Null)
            }
            "readDir" => {
                let id = arg_str(&args, "id")?;
                let name = arg_str(&args, "name")?;
                let filter = arg_bool(&args, "filter", true);
                Ok(json!(self.facade.read_dir(user, &id, &name, filter).await?))
            }
            "rename" => {
                let id = arg_str(&args, "id")?;
                let old_name = arg_str(&args, "oldName")?;
                let new_name = arg_str(&args, "newName")?;
                self.facade.rename(user, &id, &old_name, &new_name).await?;
                Ok(Value::Null)
            }
            "touch" => {
                let id = arg_str(&args, "id")?;
                let pattern = arg_str(&args, "pattern")?;
                Ok(json!(self.facade.touch(user, &id, &pattern).await?))
            }
            "rm" => {
                let id = arg_str(&args, "id")?;
                let pattern = arg_str(&args, "pattern")?;
                Ok(json!(self.facade.rm(user, &id, &pattern).await?))
            }
            "mkdir" => {
                let id = arg_str(&args, "id")?;
                let dirname = arg_str(&args, "dirname")?;
                self.facade.mkdir(user, &id, &dirname).await?;
                Ok(Value::Null)
            }
            "chownFile" => {
                let id = arg_str(&args, "id")?;
                let pattern = arg_str(&args, "pattern")?;
                let owner = arg_str(&args, "owner")?;
                let owner_group = arg_str(&args, "ownerGroup")?;
                Ok(json!(self.facade.chown_file(user, &id, &pattern, &owner, &owner_group).await?))
            }
            "chmodFile" => {
                let id = arg_str(&args, "id")?;
                let pattern = arg_str(&args, "pattern")?;
                let mode = parse_bits(&args, "mode")?.unwrap_or_else(PermissionBits::empty);
                Ok(json!(self.facade.chmod_file(user, &id, &pattern, mode).await?))
            }
            "insert" => {
                let id = arg_str(&args, "id")?;
                let name = arg_str(&args, "name")?;
                let mime_type = arg_opt_str(&args, "mimeType");
                let token = format!("{}:{}:{}", self.session.conn_id, id, name);
                self.session.inserts.insert(
                    token.clone(),
                    super::session::InsertStream { id, name, mime_type, buffer: Vec::new() },
                );
                Ok(json!({ "token": token }))
            }
            "insertChunk" => {
                let token = arg_str(&args, "token")?;
                let chunk = arg_bytes(&args, "data")?;
                let stream = self
                    .session
                    .inserts
                    .get_mut(&token)
                    .ok_or_else(|| CoreError::InvalidParameter(format!("unknown insert token '{token}'")))?;
                stream.buffer.extend_from_slice(&chunk);
                Ok(Value::Null)
            }
            "insertEnd" => {
                let token = arg_str(&args, "token")?;
                let stream = self
                    .session
                    .inserts
                    .remove(&token)
                    .ok_or_else(|| CoreError::InvalidParameter(format!("unknown insert token '{token}'")))?;
                self.facade
                    .write_file(user, &stream.id, &stream.name, stream.buffer, stream.mime_type)
                    .await?;
                Ok(Value::Null)
            }
            "enableFileCache" => {
                let enabled = arg_bool(&args, "enabled", true);
                self.facade.enable_file_cache(user, enabled).await?;
                Ok(Value::Null)
            }
            "subscribe" => {
                let realm = parse_realm(&args)?;
                let pattern = arg_str(&args, "pattern")?;
                self.facade.subscribe(user, self.session.conn_id, realm, &pattern).await?;
                Ok(Value::Null)
            }
            "unsubscribe" => {
                let realm = parse_realm(&args)?;
                let pattern = arg_str(&args, "pattern")?;
                self.facade.unsubscribe(user, self.session.conn_id, realm, &pattern).await?;
                Ok(Value::Null)
            }
            "destroy" => {
                self.facade.destroy().await;
                Ok(Value::Null)
            }
            other => Err(CoreError::InvalidParameter(format!("unknown operation '{other}'"))),
        }
    }
}

fn error_body(e: &CoreError) -> Value {
    json!({ "code": error_code(e), "message": e.to_string() })
}

/// A short machine-readable tag per error variant, alongside the
/// human-readable `message`.
fn error_code(e: &CoreError) -> &'static str {
    match e {
        CoreError::InvalidId(_) => "invalidId",
        CoreError::EmptyId => "emptyId",
        CoreError::PermissionError => "permissionError",
        CoreError::NotExists => "notExists",
        CoreError::YetExists => "yetExists",
        CoreError::InvalidPassword => "invalidPassword",
        CoreError::ObjNull => "objNull",
        CoreError::NonDeletable => "nonDeletable",
        CoreError::InvalidParameter(_) => "invalidParameter",
        CoreError::NoKeys => "noKeys",
        CoreError::UnknownView(_) => "unknownView",
        CoreError::Io(_) => "ioError",
        CoreError::Serde(_) => "serdeError",
    }
}

fn arg_str(args: &Value, key: &str) -> Result<String, CoreError> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| CoreError::InvalidParameter(format!("missing '{key}'")))
}

fn arg_opt_str(args: &Value, key: &str) -> Option<String> {
    args.get(key).and_then(Value::as_str).map(str::to_string)
}

fn arg_bool(args: &Value, key: &str, default: bool) -> bool {
    args.get(key).and_then(Value::as_bool).unwrap_or(default)
}

fn arg_bytes(args: &Value, key: &str) -> Result<Vec<u8>, CoreError> {
    let encoded = arg_str(args, key)?;
    base64_decode(&encoded).map_err(|e| CoreError::InvalidParameter(format!("bad base64 in '{key}': {e}")))
}

fn parse_set_options(value: &Value) -> SetOptions {
    SetOptions {
        preserve_settings: value
            .get("preserveSettings")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default(),
        owner: value.get("owner").and_then(Value::as_str).map(str::to_string),
        owner_group: value.get("ownerGroup").and_then(Value::as_str).map(str::to_string),
    }
}

fn parse_bits(args: &Value, key: &str) -> Result<Option<PermissionBits>, CoreError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => serde_json::from_value(v.clone())
            .map(Some)
            .map_err(|e| CoreError::InvalidParameter(format!("bad '{key}': {e}"))),
    }
}

fn parse_realm(args: &Value) -> Result<Realm, CoreError> {
    let raw = arg_str(args, "realm")?;
    serde_json::from_value(Value::String(raw.clone()))
        .map_err(|_| CoreError::InvalidParameter(format!("unknown realm '{raw}'")))
}

/// A minimal base64 codec (standard alphabet, padded) so binary file
/// payloads survive the JSON wire format without pulling in a dedicated
/// crate for two small functions.
fn base64_encode(data: &[u8]) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut out = String::with_capacity(data.len().div_ceil(3) * 4);
    for chunk in data.chunks(3) {
        let b0 = chunk[0];
        let b1 = chunk.get(1).copied();
        let b2 = chunk.get(2).copied();
        out.push(ALPHABET[(b0 >> 2) as usize] as char);
        out.push(ALPHABET[(((b0 & 0x03) << 4) | (b1.unwrap_or(0) >> 4)) as usize] as char);
        if let Some(b1) = b1 {
            out.push(ALPHABET[(((b1 & 0x0f) << 2) | (b2.unwrap_or(0) >> 6)) as usize] as char);
        } else {
            out.push('=');
        }
        if let Some(b2) = b2 {
            out.push(ALPHABET[(b2 & 0x3f) as usize] as char);
        } else {
            out.push('=');
        }
    }
    out
}

fn base64_decode(s: &str) -> Result<Vec<u8>, String> {
    fn val(c: u8) -> Option<u8> {
        match c {
            b'A'..=b'Z' => Some(c - b'A'),
            b'a'..=b'z' => Some(c - b'a' + 26),
            b'0'..=b'9' => Some(c - b'0' + 52),
            b'+' => Some(62),
            b'/' => Some(63),
            _ => None,
        }
    }
    let cleaned: Vec<u8> = s.bytes().filter(|b| *b != b'=').collect();
    let mut out = Vec::with_capacity(cleaned.len() * 3 / 4);
    for chunk in cleaned.chunks(4) {
        let vals: Vec<u8> = chunk
            .iter()
            .map(|c| val(*c).ok_or_else(|| "invalid base64 character".to_string()))
            .collect::<Result<_, _>>()?;
        out.push((vals[0] << 2) | (vals.get(1).copied().unwrap_or(0) >> 4));
        if vals.len() > 2 {
            out.push((vals[1] << 4) | (vals[2] >> 2));
        }
        if vals.len() > 3 {
            out.push((vals[2] << 6) | vals[3]);
        }
    }
    Ok(out)
}
