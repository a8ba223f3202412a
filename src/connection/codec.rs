// src/connection/codec.rs

//! The wire codec: newline-delimited JSON, one request or response object
//! per line, built on `tokio_util::codec`'s `Decoder`/`Encoder` split over
//! bare `serde_json::Value`s. The concrete framing is an implementation
//! detail; only the operation names and JSON shapes it carries matter to
//! callers.

use bytes::BytesMut;
use serde_json::Value;
use std::io;
use tokio_util::codec::{Decoder, Encoder};

#[derive(Debug, Default)]
pub struct LineCodec;

impl Decoder for LineCodec {
    type Item = Value;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Value>, io::Error> {
        let Some(newline) = src.iter().position(|b| *b == b'\n') else {
            return Ok(None);
        };
        let line = src.split_to(newline + 1);
        let line = &line[..line.len() - 1];
        if line.is_empty() {
            return Ok(Some(Value::Null));
        }
        let value = serde_json::from_slice(line)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(Some(value))
    }
}

impl Encoder<Value> for LineCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Value, dst: &mut BytesMut) -> Result<(), io::Error> {
        let mut bytes = serde_json::to_vec(&item)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        bytes.push(b'\n');
        dst.extend_from_slice(&bytes);
        Ok(())
    }
}
