//! In-memory adapters for every port.
//!
//! Each adapter is a cheap cloneable handle over shared state, so a test (or
//! the `--simulate` binary) can keep one clone for inspection while the
//! controller owns another.

use crate::domain::message::InboundMessage;
use crate::domain::ports::{
    Clock, Indicator, NetworkLink, Pulse, ReadStatus, SessionOptions, TagReader, Transport,
};
use crate::error::{Fault, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

/// A message handed to [`Transport::publish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub topic: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, Default)]
struct BusState {
    session: Option<SessionOptions>,
    subscriptions: Vec<String>,
    inbound: VecDeque<InboundMessage>,
    published: Vec<Published>,
    connect_error: Option<String>,
    subscribe_error: Option<String>,
    publish_error: Option<String>,
    poll_error: Option<String>,
}

/// A broker that lives in the process.
///
/// Messages queued with [`deliver`](Self::deliver) are only handed out for
/// topics the session subscribed to, like a real broker.
#[derive(Debug, Default, Clone)]
pub struct InMemoryTransport {
    state: Arc<RwLock<BusState>>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn deliver(&self, msg: InboundMessage) {
        self.state.write().await.inbound.push_back(msg);
    }

    pub async fn published(&self) -> Vec<Published> {
        self.state.read().await.published.clone()
    }

    pub async fn subscriptions(&self) -> Vec<String> {
        self.state.read().await.subscriptions.clone()
    }

    pub async fn session(&self) -> Option<SessionOptions> {
        self.state.read().await.session.clone()
    }

    pub async fn fail_connect(&self, reason: &str) {
        self.state.write().await.connect_error = Some(reason.to_string());
    }

    pub async fn fail_subscribe(&self, reason: &str) {
        self.state.write().await.subscribe_error = Some(reason.to_string());
    }

    pub async fn fail_publishes(&self, reason: &str) {
        self.state.write().await.publish_error = Some(reason.to_string());
    }

    pub async fn fail_polls(&self, reason: &str) {
        self.state.write().await.poll_error = Some(reason.to_string());
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn connect(&mut self, options: &SessionOptions) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(reason) = &state.connect_error {
            return Err(Fault::Session(reason.clone()));
        }
        state.session = Some(options.clone());
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if state.session.is_none() {
            return Err(Fault::Session("subscribe before connect".to_string()));
        }
        if let Some(reason) = &state.subscribe_error {
            return Err(Fault::Session(reason.clone()));
        }
        state.subscriptions.push(topic.to_string());
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(reason) = &state.publish_error {
            return Err(Fault::Transport(reason.clone()));
        }
        debug!(topic, payload = %String::from_utf8_lossy(&payload), "published");
        state.published.push(Published {
            topic: topic.to_string(),
            payload,
        });
        Ok(())
    }

    async fn poll_incoming(&mut self) -> Result<Option<InboundMessage>> {
        let mut state = self.state.write().await;
        if let Some(reason) = &state.poll_error {
            return Err(Fault::Transport(reason.clone()));
        }
        while let Some(msg) = state.inbound.pop_front() {
            if state.subscriptions.iter().any(|t| *t == msg.topic) {
                return Ok(Some(msg));
            }
        }
        Ok(None)
    }
}

#[derive(Debug, Clone)]
enum ReaderStep {
    Empty,
    Tag(Vec<u8>),
    RequestError,
    IdentityError,
    Fault(String),
}

#[derive(Debug, Default)]
struct ReaderState {
    init_error: Option<String>,
    steps: VecDeque<ReaderStep>,
    selected: Option<std::result::Result<Vec<u8>, ()>>,
}

/// A reader that plays back a script, one step per poll.
/// An exhausted script means an empty field.
#[derive(Debug, Default, Clone)]
pub struct ScriptedReader {
    state: Arc<RwLock<ReaderState>>,
}

/// Appends steps to a [`ScriptedReader`]'s script.
#[derive(Debug, Clone)]
pub struct ReaderScript {
    state: Arc<RwLock<ReaderState>>,
}

impl ScriptedReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> ReaderScript {
        ReaderScript {
            state: Arc::clone(&self.state),
        }
    }
}

impl ReaderScript {
    /// The reader fails to initialise.
    pub async fn fail_init(&self, reason: &str) {
        self.state.write().await.init_error = Some(reason.to_string());
    }

    /// Next poll sees a tag with this UID.
    pub async fn present(&self, uid: &[u8]) {
        self.push(ReaderStep::Tag(uid.to_vec())).await;
    }

    /// Next poll sees nothing.
    pub async fn absent(&self) {
        self.push(ReaderStep::Empty).await;
    }

    /// Next poll fails at the request step.
    pub async fn fail_request(&self) {
        self.push(ReaderStep::RequestError).await;
    }

    /// Next poll finds a tag but cannot read its UID.
    pub async fn fail_identity(&self) {
        self.push(ReaderStep::IdentityError).await;
    }

    /// Next poll raises a driver fault.
    pub async fn fault(&self, reason: &str) {
        self.push(ReaderStep::Fault(reason.to_string())).await;
    }

    async fn push(&self, step: ReaderStep) {
        self.state.write().await.steps.push_back(step);
    }
}

#[async_trait]
impl TagReader for ScriptedReader {
    async fn init(&mut self) -> Result<()> {
        match &self.state.read().await.init_error {
            Some(reason) => Err(Fault::Reader(reason.clone())),
            None => Ok(()),
        }
    }

    async fn request(&mut self) -> Result<(ReadStatus, u8)> {
        let mut state = self.state.write().await;
        state.selected = None;
        match state.steps.pop_front() {
            None | Some(ReaderStep::Empty) => Ok((ReadStatus::NoTag, 0)),
            Some(ReaderStep::Tag(uid)) => {
                state.selected = Some(Ok(uid));
                Ok((ReadStatus::Ok, 0x10))
            }
            Some(ReaderStep::RequestError) => Ok((ReadStatus::Error, 0)),
            Some(ReaderStep::IdentityError) => {
                state.selected = Some(Err(()));
                Ok((ReadStatus::Ok, 0x10))
            }
            Some(ReaderStep::Fault(reason)) => Err(Fault::Reader(reason)),
        }
    }

    async fn read_identity(&mut self) -> Result<(ReadStatus, Vec<u8>)> {
        match self.state.write().await.selected.take() {
            Some(Ok(uid)) => Ok((ReadStatus::Ok, uid)),
            Some(Err(())) => Ok((ReadStatus::Error, Vec::new())),
            None => Ok((ReadStatus::NoTag, Vec::new())),
        }
    }
}

/// Records every pulse instead of blinking.
#[derive(Debug, Default, Clone)]
pub struct RecordingIndicator {
    pulses: Arc<RwLock<Vec<Pulse>>>,
    pulse_error: Arc<RwLock<Option<String>>>,
    offs: Arc<AtomicU32>,
}

impl RecordingIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn pulses(&self) -> Vec<Pulse> {
        self.pulses.read().await.clone()
    }

    pub fn off_calls(&self) -> u32 {
        self.offs.load(Ordering::SeqCst)
    }

    /// Every later pulse fails, as a driver would when its pin is lost.
    pub async fn fail_pulses(&self, reason: &str) {
        *self.pulse_error.write().await = Some(reason.to_string());
    }
}

#[async_trait]
impl Indicator for RecordingIndicator {
    async fn off(&mut self) -> Result<()> {
        self.offs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn pulse(&mut self, pulse: Pulse) -> Result<()> {
        if let Some(reason) = self.pulse_error.read().await.as_ref() {
            return Err(Fault::Indicator(reason.clone()));
        }
        self.pulses.write().await.push(pulse);
        Ok(())
    }
}

/// A clock that only moves when told to.
///
/// [`advance`](Self::advance) moves wall and monotonic time together, while
/// [`set`](Self::set) steps only the wall clock, like an NTP correction.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    wall_nanos: Arc<AtomicU64>,
    elapsed_nanos: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn at(now: Duration) -> Self {
        let clock = Self {
            origin: Instant::now(),
            wall_nanos: Arc::default(),
            elapsed_nanos: Arc::default(),
        };
        clock.set(now);
        clock
    }

    pub fn set(&self, now: Duration) {
        self.wall_nanos.store(now.as_nanos() as u64, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        let nanos = by.as_nanos() as u64;
        self.wall_nanos.fetch_add(nanos, Ordering::SeqCst);
        self.elapsed_nanos.fetch_add(nanos, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.wall_nanos.load(Ordering::SeqCst))
    }

    fn instant(&self) -> Instant {
        self.origin + Duration::from_nanos(self.elapsed_nanos.load(Ordering::SeqCst))
    }
}

/// A link that comes up after a fixed number of polls, or never.
#[derive(Debug, Clone)]
pub struct ScriptedLink {
    up_after: Option<u32>,
    polls: Arc<AtomicU32>,
    connects: Arc<AtomicU32>,
}

impl ScriptedLink {
    pub fn up() -> Self {
        Self::up_after(0)
    }

    pub fn up_after(polls: u32) -> Self {
        Self {
            up_after: Some(polls),
            polls: Arc::default(),
            connects: Arc::default(),
        }
    }

    pub fn down() -> Self {
        Self {
            up_after: None,
            polls: Arc::default(),
            connects: Arc::default(),
        }
    }

    pub fn polls(&self) -> u32 {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NetworkLink for ScriptedLink {
    async fn connect(&mut self) -> Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn is_connected(&mut self) -> bool {
        let seen = self.polls.fetch_add(1, Ordering::SeqCst);
        self.up_after.is_some_and(|n| seen >= n)
    }
}
