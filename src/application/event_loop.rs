use super::context::{Context, publish_json};
use super::debouncer::{ScanDebouncer, ScanEvent, poll_reader};
use super::ledger::Ledger;
use super::router::{MessageRouter, RouteOutcome};
use crate::domain::account::Balance;
use crate::domain::message::StatusMessage;
use crate::domain::ports::Pulse;
use crate::error::{Fault, Result};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Starting,
    Connected,
    Running,
    /// Terminal. The supervisor restarts the device from here.
    Faulted,
}

/// What a single tick did.
#[derive(Debug, Default)]
pub struct TickReport {
    pub routed: Vec<RouteOutcome>,
    pub scan: Option<(ScanEvent, Balance)>,
}

/// The steady-state loop of a connected controller.
///
/// Each tick drains the bus, then polls the reader once. Messages applied in
/// a tick are therefore visible to a scan reported later in the same tick.
pub struct EventLoop {
    ctx: Context,
    router: MessageRouter,
    debouncer: ScanDebouncer,
    tick_interval: Duration,
    state: LoopState,
}

impl EventLoop {
    pub const DEFAULT_TICK: Duration = Duration::from_millis(100);

    /// Wraps a context whose bus session is already established.
    pub fn new(ctx: Context, debouncer: ScanDebouncer, tick_interval: Duration) -> Self {
        Self {
            ctx,
            router: MessageRouter::new(),
            debouncer,
            tick_interval,
            state: LoopState::Connected,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ctx.ledger
    }

    /// Runs ticks until one faults. Never returns otherwise.
    pub async fn run(&mut self) -> Fault {
        info!("system ready");
        loop {
            if let Err(fault) = self.tick().await {
                return fault;
            }
            tokio::time::sleep(self.tick_interval).await;
        }
    }

    /// One pass: drain inbound messages, then poll the reader.
    ///
    /// Once a tick has failed the loop stays `Faulted` and refuses to tick.
    pub async fn tick(&mut self) -> Result<TickReport> {
        if self.state == LoopState::Faulted {
            return Err(Fault::Session("event loop already faulted".to_string()));
        }
        self.state = LoopState::Running;
        let result = self.step().await;
        if result.is_err() {
            self.state = LoopState::Faulted;
        }
        result
    }

    async fn step(&mut self) -> Result<TickReport> {
        let mut report = TickReport::default();

        while let Some(msg) = self.ctx.bus.poll_incoming().await? {
            let outcome = self.router.route(&mut self.ctx, &msg.topic, &msg.payload).await?;
            report.routed.push(outcome);
        }

        let read = poll_reader(self.ctx.reader.as_mut()).await?;
        if let Some(event) = self.debouncer.observe(read, self.ctx.clock.instant()) {
            let balance = self.ctx.ledger.get_or_create(&event.id);
            let status = StatusMessage {
                id: event.id.clone(),
                balance,
                timestamp: self.ctx.timestamp(),
            };
            publish_json(self.ctx.bus.as_mut(), &self.ctx.topics.status, &status).await?;
            info!(id = %event.id, %balance, "card scanned");
            self.ctx.indicator.pulse(Pulse::SCAN).await?;
            report.scan = Some((event, balance));
        }

        Ok(report)
    }
}
