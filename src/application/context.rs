use super::ledger::Ledger;
use crate::domain::message::Topics;
use crate::domain::ports::{Clock, Indicator, TagReader, Transport};
use crate::error::Result;
use serde::Serialize;
use std::sync::Arc;

/// Everything one session of the controller owns.
///
/// Built fresh on every (re)start and handed to the event loop, so no balance
/// or connection state outlives a restart.
pub struct Context {
    pub ledger: Ledger,
    pub bus: Box<dyn Transport>,
    pub reader: Box<dyn TagReader>,
    pub indicator: Box<dyn Indicator>,
    pub clock: Arc<dyn Clock>,
    pub topics: Topics,
}

impl Context {
    pub fn new(
        bus: Box<dyn Transport>,
        reader: Box<dyn TagReader>,
        indicator: Box<dyn Indicator>,
        clock: Arc<dyn Clock>,
        topics: Topics,
    ) -> Self {
        Self {
            ledger: Ledger::new(),
            bus,
            reader,
            indicator,
            clock,
            topics,
        }
    }

    /// Whole seconds since the Unix epoch, as stamped on outbound messages.
    pub fn timestamp(&self) -> u64 {
        self.clock.now().as_secs()
    }
}

/// Serializes `message` as JSON and publishes it on `topic`.
pub async fn publish_json<T: Serialize>(
    bus: &mut dyn Transport,
    topic: &str,
    message: &T,
) -> Result<()> {
    let payload = serde_json::to_vec(message)?;
    bus.publish(topic, payload).await
}
