#![allow(dead_code)]

use cardbridge::application::context::Context;
use cardbridge::application::debouncer::ScanDebouncer;
use cardbridge::application::event_loop::EventLoop;
use cardbridge::application::supervisor::{Peripherals, RetryPolicy, Supervisor, SupervisorConfig};
use cardbridge::domain::message::{InboundMessage, Topics};
use cardbridge::domain::ports::SessionOptions;
use cardbridge::infrastructure::in_memory::{
    InMemoryTransport, ManualClock, ReaderScript, RecordingIndicator, ScriptedLink, ScriptedReader,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub const NAMESPACE: &str = "rfid/test_team";

/// Handles onto the in-memory peripherals of one simulated device boot.
pub struct Device {
    pub bus: InMemoryTransport,
    pub reader: ReaderScript,
    pub indicator: RecordingIndicator,
    pub clock: ManualClock,
    pub link: ScriptedLink,
    scripted_reader: ScriptedReader,
}

impl Device {
    pub fn new(link: ScriptedLink) -> Self {
        let scripted_reader = ScriptedReader::new();
        Self {
            bus: InMemoryTransport::new(),
            reader: scripted_reader.handle(),
            indicator: RecordingIndicator::new(),
            clock: ManualClock::at(Duration::from_secs(1_700_000_000)),
            link,
            scripted_reader,
        }
    }

    pub fn topics(&self) -> Topics {
        Topics::new(NAMESPACE)
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            link_retry: RetryPolicy {
                attempts: 3,
                interval: Duration::ZERO,
            },
            session: SessionOptions {
                client_id: "edge_0123456789ab".to_string(),
                keep_alive: Duration::from_secs(60),
            },
            topics: self.topics(),
            tick_interval: Duration::ZERO,
            debounce_window: ScanDebouncer::DEFAULT_WINDOW,
            cooldown: Duration::ZERO,
        }
    }

    pub fn peripherals(&self) -> Peripherals {
        Peripherals {
            link: Box::new(self.link.clone()),
            bus: Box::new(self.bus.clone()),
            reader: Box::new(self.scripted_reader.clone()),
            indicator: Box::new(self.indicator.clone()),
            clock: Arc::new(self.clock.clone()),
        }
    }

    pub fn supervisor(&self) -> Supervisor {
        Supervisor::new(self.supervisor_config(), self.peripherals())
    }

    /// An event loop over this device whose bus session is already up.
    pub async fn connected_loop(&self) -> EventLoop {
        let mut bus = self.bus.clone();
        cardbridge::application::supervisor::ensure_session(
            &mut bus,
            &self.supervisor_config().session,
            &self.topics(),
        )
        .await
        .unwrap();
        let ctx = Context::new(
            Box::new(bus),
            Box::new(self.scripted_reader.clone()),
            Box::new(self.indicator.clone()),
            Arc::new(self.clock.clone()),
            self.topics(),
        );
        EventLoop::new(ctx, ScanDebouncer::default(), Duration::ZERO)
    }

    pub async fn send_topup(&self, id: &str, amount: i64) {
        let payload = serde_json::json!({ "id": id, "amount": amount }).to_string();
        self.bus
            .deliver(InboundMessage::new(self.topics().topup, payload))
            .await;
    }

    pub async fn send_payment(&self, id: &str, amount: i64) {
        let payload = serde_json::json!({ "id": id, "amount": amount }).to_string();
        self.bus
            .deliver(InboundMessage::new(self.topics().pay, payload))
            .await;
    }

    /// Published payloads on `topic`, decoded as JSON.
    pub async fn published_on(&self, topic: &str) -> Vec<Value> {
        self.bus
            .published()
            .await
            .into_iter()
            .filter(|m| m.topic == topic)
            .map(|m| serde_json::from_slice(&m.payload).unwrap())
            .collect()
    }
}
