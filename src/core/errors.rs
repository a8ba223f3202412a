// src/core/errors.rs

//! The primary error type for the entire application.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, covering every error kind named in the object/file
/// store's error taxonomy, plus the I/O and serialization failures that
/// surface from the persistence layer.
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    #[error("Invalid ID: {0}")]
    InvalidId(String),

    #[error("Empty ID")]
    EmptyId,

    #[error("permissionError")]
    PermissionError,

    #[error("Not exists")]
    NotExists,

    #[error("Yet exists")]
    YetExists,

    #[error("Invalid password for update of vendor information")]
    InvalidPassword,

    #[error("obj is null")]
    ObjNull,

    #[error("Object is marked as non deletable")]
    NonDeletable,

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("no keys")]
    NoKeys,

    #[error("unknown view design/search: {0}")]
    UnknownView(String),

    #[error("IO error: {0}")]
    Io(#[from] Arc<std::io::Error>),

    #[error("serialization error: {0}")]
    Serde(String),
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::Io(Arc::new(e))
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Serde(e.to_string())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
