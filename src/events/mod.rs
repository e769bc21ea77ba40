//! Processing event schema shared by the publisher and the status consumer.

pub mod codec;
pub mod timestamp;
pub mod types;

pub use codec::{DecodeError, decode_event, encode_event};
pub use types::{
    ContentKind, FAILURE_EVENT_TYPE, FailureEvent, ProcessingEvent, REQUEST_EVENT_TYPE,
    RequestEvent, SUCCESS_EVENT_TYPE, SuccessEvent,
};
