use crate::error::MessageError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a physical card: the uppercase hex rendering of its UID bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagId(String);

impl TagId {
    /// Builds the identifier straight from the bytes returned by the reader.
    pub fn from_bytes(raw: &[u8]) -> Self {
        Self(hex::encode_upper(raw))
    }

    /// Normalizes an identifier received over the bus.
    ///
    /// Surrounding whitespace is dropped and the digits are upper-cased, so
    /// `a1b2c3` and `A1B2C3` name the same card.
    pub fn parse(value: &str) -> Result<Self, MessageError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(MessageError::MissingId);
        }
        if !trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(MessageError::InvalidId(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
