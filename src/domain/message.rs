use super::account::{Amount, Balance};
use super::tag::TagId;
use crate::error::MessageError;
use serde::{Deserialize, Serialize};

/// Fully qualified bus topics for one deployment namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub status: String,
    pub topup: String,
    pub pay: String,
    pub balance: String,
}

impl Topics {
    pub fn new(namespace: &str) -> Self {
        let ns = namespace.trim_end_matches('/');
        Self {
            status: format!("{ns}/card/status"),
            topup: format!("{ns}/card/topup"),
            pay: format!("{ns}/card/pay"),
            balance: format!("{ns}/card/balance"),
        }
    }

    /// Topics the controller subscribes to.
    pub fn inbound(&self) -> [&str; 2] {
        [self.topup.as_str(), self.pay.as_str()]
    }
}

/// A message pulled off the bus, not yet decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

// Wire shape shared by top-up and payment requests. Older backends send `uid`.
#[derive(Debug, Deserialize)]
struct CardInstruction {
    #[serde(default, alias = "uid")]
    id: Option<String>,
    #[serde(default)]
    amount: Option<i64>,
}

fn decode_instruction(payload: &[u8]) -> Result<(TagId, Amount), MessageError> {
    let raw: CardInstruction = serde_json::from_slice(payload)?;
    let id = raw.id.ok_or(MessageError::MissingId)?;
    Ok((TagId::parse(&id)?, Amount::coerce(raw.amount)))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopupMessage {
    pub id: TagId,
    pub amount: Amount,
}

impl TopupMessage {
    pub fn decode(payload: &[u8]) -> Result<Self, MessageError> {
        let (id, amount) = decode_instruction(payload)?;
        Ok(Self { id, amount })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentMessage {
    pub id: TagId,
    pub amount: Amount,
}

impl PaymentMessage {
    pub fn decode(payload: &[u8]) -> Result<Self, MessageError> {
        let (id, amount) = decode_instruction(payload)?;
        Ok(Self { id, amount })
    }
}

/// Published on the status topic whenever a card is scanned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub id: TagId,
    pub balance: Balance,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BalanceKind {
    Topup,
}

/// Published on the balance topic after a top-up has been applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceMessage {
    pub id: TagId,
    pub new_balance: Balance,
    pub kind: BalanceKind,
    pub timestamp: u64,
}
