use super::message::InboundMessage;
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;

/// The network link underneath the bus (Wi-Fi, Ethernet, ...).
#[async_trait]
pub trait NetworkLink: Send {
    /// Starts bringing the link up. Returns immediately.
    async fn connect(&mut self) -> Result<()>;
    async fn is_connected(&mut self) -> bool;
}

/// Identity and keep-alive of one bus session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub client_id: String,
    pub keep_alive: Duration,
}

/// Publish/subscribe message bus.
#[async_trait]
pub trait Transport: Send {
    async fn connect(&mut self, options: &SessionOptions) -> Result<()>;
    async fn subscribe(&mut self, topic: &str) -> Result<()>;
    /// Fire-and-forget; no delivery acknowledgement is tracked.
    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<()>;
    /// Returns the next buffered message, or `None` when the buffer is empty.
    /// Never waits for traffic.
    async fn poll_incoming(&mut self) -> Result<Option<InboundMessage>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    Ok,
    NoTag,
    Error,
}

/// Card reader driver. Both polling calls return immediately.
#[async_trait]
pub trait TagReader: Send {
    /// Prepares the driver. Called once per boot, before the network is up.
    async fn init(&mut self) -> Result<()>;
    /// Asks whether a tag is in the field, returning its type byte.
    async fn request(&mut self) -> Result<(ReadStatus, u8)>;
    /// Reads the UID of the tag found by `request`.
    async fn read_identity(&mut self) -> Result<(ReadStatus, Vec<u8>)>;
}

/// A blink pattern: `count` pulses, each lasting `each`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pulse {
    pub count: u32,
    pub each: Duration,
}

impl Pulse {
    pub const SCAN: Pulse = Pulse::new(1, Duration::from_millis(100));
    pub const TOPUP: Pulse = Pulse::new(3, Duration::from_millis(100));
    pub const PAYMENT: Pulse = Pulse::new(1, Duration::from_millis(500));
    pub const LINK_RETRY: Pulse = Pulse::new(1, Duration::ZERO);

    pub const fn new(count: u32, each: Duration) -> Self {
        Self { count, each }
    }
}

/// Status LED or equivalent.
#[async_trait]
pub trait Indicator: Send {
    async fn off(&mut self) -> Result<()>;
    async fn pulse(&mut self, pulse: Pulse) -> Result<()>;
}

/// Wall time for stamping messages, monotonic time for measuring gaps.
pub trait Clock: Send + Sync {
    /// Time since the Unix epoch. May step backwards.
    fn now(&self) -> Duration;
    /// Never goes backwards.
    fn instant(&self) -> Instant;
}
