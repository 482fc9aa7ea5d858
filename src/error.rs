use crate::domain::tag::TagId;
use thiserror::Error;

/// A per-message problem. Logged and discarded; the loop keeps running.
#[derive(Error, Debug)]
pub enum MessageError {
    #[error("payload is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("payload has no `id` field")]
    MissingId,
    #[error("`{0}` is not a hexadecimal tag id")]
    InvalidId(String),
    #[error("payment for unknown account {0}")]
    UnknownAccount(TagId),
}

/// A fault that the controller cannot recover from in place.
///
/// Any `Fault` raised inside a tick ends the running session and hands
/// control back to the supervisor, which restarts the device.
#[derive(Error, Debug)]
pub enum Fault {
    #[error("network link not established after {attempts} attempts")]
    LinkUnavailable { attempts: u32 },
    #[error("bus session error: {0}")]
    Session(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("tag reader error: {0}")]
    Reader(String),
    #[error("indicator error: {0}")]
    Indicator(String),
    #[error("could not encode outbound payload: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Fault>;
