//! JSON text encoding for [`Delivery`] values.
//!
//! # Wire format
//!
//! ```text
//! null                      -> empty delivery (nothing new)
//! {"cmdname": ..., ...}     -> one frame
//! [{...}, {...}, ...]       -> ordered batch
//! ```
//!
//! A batch is validated as a whole before any frame is handed out, so a
//! single malformed element rejects the delivery instead of applying half
//! of it.

use serde_json::Value;
use thiserror::Error;

use crate::frame::{Delivery, Frame, KEY_COMMAND, KEY_COMMAND_LEGACY};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("expected an object or an array of objects, found {0}")]
    UnexpectedShape(&'static str),

    #[error("batch element {index} is {found}, expected an object")]
    MalformedElement { index: usize, found: &'static str },
}

/// Which key outbound frames use for the command name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireDialect {
    /// `cmdname`, spoken through the HTTP relay.
    #[default]
    Bridge,
    /// `cmd`, spoken by the direct socket server.
    Socket,
}

impl WireDialect {
    pub fn command_key(self) -> &'static str {
        match self {
            WireDialect::Bridge => KEY_COMMAND,
            WireDialect::Socket => KEY_COMMAND_LEGACY,
        }
    }
}

pub fn decode_delivery(text: &str) -> Result<Delivery, CodecError> {
    let value: Value = serde_json::from_str(text)?;
    delivery_from_value(value)
}

pub fn decode_delivery_slice(bytes: &[u8]) -> Result<Delivery, CodecError> {
    let value: Value = serde_json::from_slice(bytes)?;
    delivery_from_value(value)
}

pub fn delivery_from_value(value: Value) -> Result<Delivery, CodecError> {
    match value {
        Value::Null => Ok(Delivery::empty()),
        Value::Object(object) => Ok(Delivery::Single(Frame::from_object(object))),
        Value::Array(elements) => {
            if let Some((index, element)) = elements
                .iter()
                .enumerate()
                .find(|(_, element)| !element.is_object())
            {
                return Err(CodecError::MalformedElement {
                    index,
                    found: kind_name(element),
                });
            }
            let frames = elements
                .into_iter()
                .filter_map(|element| match element {
                    Value::Object(object) => Some(Frame::from_object(object)),
                    _ => None,
                })
                .collect();
            Ok(Delivery::Batch(frames))
        }
        other => Err(CodecError::UnexpectedShape(kind_name(&other))),
    }
}

/// A lone frame encodes as an object; any batch (even of one) as an array.
pub fn delivery_to_value(delivery: &Delivery, dialect: WireDialect) -> Value {
    let key = dialect.command_key();
    match delivery {
        Delivery::Single(frame) => frame.clone().into_value(key),
        Delivery::Batch(frames) => Value::Array(
            frames
                .iter()
                .map(|frame| frame.clone().into_value(key))
                .collect(),
        ),
    }
}

pub fn encode_delivery(delivery: &Delivery, dialect: WireDialect) -> String {
    delivery_to_value(delivery, dialect).to_string()
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
