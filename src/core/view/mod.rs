// src/core/view/mod.rs

//! The view executor: a restricted map/reduce interpreter rather than a
//! general `eval`. Map bodies are parsed once by [`grammar`] into an AST
//! and run against every document in range; they can only read the
//! document handed to them and call the injected `emit`, never reach
//! back into the object store.

mod grammar;

use crate::core::acl::subject::SubjectAcl;
use crate::core::errors::CoreError;
use crate::core::object_store::ObjectStore;
use crate::core::types::ObjectId;
use serde_json::Value;

/// One row of a view result: `{id, value}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewRow {
    pub id: String,
    pub value: Value,
}

/// A `{map, reduce?}` function pair, as stored under `_design/<name>.views`.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ViewSpec {
    pub map: String,
    pub reduce: Option<String>,
}

/// `_applyView(func, params)`. `params.startkey`/`params.endkey` bound the
/// id range scanned; failures parsing or running the map body against a
/// single document are logged and that document is skipped, never
/// propagated.
pub async fn apply_view(
    store: &ObjectStore,
    subject: &SubjectAcl,
    func: &ViewSpec,
    startkey: Option<&str>,
    endkey: Option<&str>,
) -> Result<Vec<ViewRow>, CoreError> {
    let program = grammar::parse(&func.map).map_err(|e| CoreError::InvalidParameter(e.to_string()))?;

    let rows = store.get_object_list(subject, startkey, endkey, true).await;
    let mut out = Vec::new();
    for row in rows {
        let doc = match row.doc {
            Some(doc) => doc,
            None => continue,
        };
        for (key, value) in grammar::run(&program, &doc.0) {
            let id = match key {
                Value::String(s) => s,
                other => other.to_string(),
            };
            out.push(ViewRow { id, value });
        }
    }

    if func.reduce.as_deref() == Some("_stats") {
        return Ok(reduce_stats(out));
    }
    Ok(out)
}

/// `reduce === "_stats"`: collapses every row to a single `{id: "_stats",
/// value: {max}}`, `max` being the greatest emitted value by numeric
/// comparison. Empty input yields no rows.
fn reduce_stats(rows: Vec<ViewRow>) -> Vec<ViewRow> {
    let max = rows
        .iter()
        .filter_map(|r| r.value.as_f64())
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))));

    match max {
        Some(max) => vec![ViewRow {
            id: "_stats".to_string(),
            value: serde_json::json!({ "max": max }),
        }],
        None => Vec::new(),
    }
}

/// `getObjectView(design, search, params)`: looks up
/// `_design/<design>.views[<search>]` and delegates to `apply_view`.
/// Unknown design/search yields a 404-shaped error.
pub async fn get_object_view(
    store: &ObjectStore,
    subject: &SubjectAcl,
    design: &str,
    search: &str,
    startkey: Option<&str>,
    endkey: Option<&str>,
) -> Result<Vec<ViewRow>, CoreError> {
    let design_id = ObjectId::parse(format!("_design/{design}"))?;
    let design_obj = store
        .get_object(subject, &design_id)
        .await?
        .ok_or_else(|| CoreError::UnknownView(format!("{design}/{search}")))?;

    let views = design_obj
        .0
        .get("views")
        .and_then(|v| v.get(search))
        .cloned()
        .ok_or_else(|| CoreError::UnknownView(format!("{design}/{search}")))?;

    let spec: ViewSpec = serde_json::from_value(views)?;
    apply_view(store, subject, &spec, startkey, endkey).await
}
