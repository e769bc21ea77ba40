//! Decoding and encoding of queue message bodies.

use crate::events::types::{
    FAILURE_EVENT_TYPE, ProcessingEvent, REQUEST_EVENT_TYPE, SUCCESS_EVENT_TYPE,
};
use serde_json::Value;
use thiserror::Error;

/// Reasons a message body could not be turned into a [`ProcessingEvent`].
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Body is not a JSON document.
    #[error("Message body is not valid JSON: {0}")]
    Malformed(#[source] serde_json::Error),
    /// Body is JSON but carries no string `eventType`.
    #[error("Message has no eventType discriminator")]
    MissingEventType,
    /// Discriminator names an event this pipeline does not know.
    #[error("Unknown eventType `{0}`")]
    UnknownEventType(String),
    /// Discriminator is known but the fields do not match its schema.
    #[error("Invalid `{event_type}` payload: {source}")]
    InvalidPayload {
        /// Discriminator found on the message.
        event_type: String,
        /// Underlying field-level error.
        #[source]
        source: serde_json::Error,
    },
}

/// Decode a raw message body into a tagged event.
pub fn decode_event(body: &str) -> Result<ProcessingEvent, DecodeError> {
    let value: Value = serde_json::from_str(body).map_err(DecodeError::Malformed)?;
    let event_type = value
        .get("eventType")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingEventType)?
        .to_string();

    if ![REQUEST_EVENT_TYPE, SUCCESS_EVENT_TYPE, FAILURE_EVENT_TYPE].contains(&event_type.as_str())
    {
        return Err(DecodeError::UnknownEventType(event_type));
    }

    serde_json::from_value(value)
        .map_err(|source| DecodeError::InvalidPayload { event_type, source })
}

/// Encode an event as a message body.
pub fn encode_event(event: &ProcessingEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(event)
}
