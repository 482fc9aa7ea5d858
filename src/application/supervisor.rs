use super::context::Context;
use super::debouncer::ScanDebouncer;
use super::event_loop::{EventLoop, LoopState};
use crate::domain::message::Topics;
use crate::domain::ports::{
    Clock, Indicator, NetworkLink, Pulse, SessionOptions, TagReader, Transport,
};
use crate::error::{Fault, Result};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Bounded retry for bringing the network link up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 20,
            interval: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub link_retry: RetryPolicy,
    pub session: SessionOptions,
    pub topics: Topics,
    pub tick_interval: Duration,
    pub debounce_window: Duration,
    /// Pause between a runtime fault and the restart.
    pub cooldown: Duration,
}

impl SupervisorConfig {
    pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5);
}

/// The collaborators one session runs against.
pub struct Peripherals {
    pub link: Box<dyn NetworkLink>,
    pub bus: Box<dyn Transport>,
    pub reader: Box<dyn TagReader>,
    pub indicator: Box<dyn Indicator>,
    pub clock: Arc<dyn Clock>,
}

/// Why the device has to restart.
#[derive(Debug)]
pub enum RestartReason {
    LinkUnavailable { attempts: u32 },
    StartupFault(Fault),
    RuntimeFault(Fault),
    Panicked(String),
}

impl RestartReason {
    /// Whether the cooldown was served before this reason was reported.
    pub fn after_cooldown(&self) -> bool {
        matches!(self, Self::RuntimeFault(_) | Self::Panicked(_))
    }
}

impl fmt::Display for RestartReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LinkUnavailable { attempts } => {
                write!(f, "network link unavailable after {attempts} attempts")
            }
            Self::StartupFault(fault) => write!(f, "startup failed: {fault}"),
            Self::RuntimeFault(fault) => write!(f, "runtime fault: {fault}"),
            Self::Panicked(msg) => write!(f, "session panicked: {msg}"),
        }
    }
}

/// Polls the link until it is up, pulsing the indicator between attempts.
///
/// Returns `Ok(false)` once `policy.attempts` retries are used up.
pub async fn ensure_link(
    link: &mut dyn NetworkLink,
    indicator: &mut dyn Indicator,
    policy: &RetryPolicy,
) -> Result<bool> {
    if link.is_connected().await {
        return Ok(true);
    }
    link.connect().await?;
    let mut attempt = 0;
    while attempt < policy.attempts {
        if link.is_connected().await {
            indicator.off().await?;
            info!(attempt, "network link up");
            return Ok(true);
        }
        indicator.pulse(Pulse::LINK_RETRY).await?;
        tokio::time::sleep(policy.interval).await;
        attempt += 1;
        warn!(attempt, of = policy.attempts, "waiting for network link");
    }
    if link.is_connected().await {
        indicator.off().await?;
        info!("network link up");
        return Ok(true);
    }
    Ok(false)
}

/// Opens the bus session and subscribes to the inbound topics.
pub async fn ensure_session(
    bus: &mut dyn Transport,
    options: &SessionOptions,
    topics: &Topics,
) -> Result<()> {
    bus.connect(options).await?;
    for topic in topics.inbound() {
        bus.subscribe(topic).await?;
    }
    info!(client_id = %options.client_id, "bus session connected and subscribed");
    Ok(())
}

/// Owns connectivity and the fail-fast restart policy for one device boot.
///
/// [`run`](Self::run) never tries to repair a half-broken session: any fault
/// ends it with a [`RestartReason`], and the caller restarts from scratch.
pub struct Supervisor {
    config: SupervisorConfig,
    peripherals: Peripherals,
    state: watch::Sender<LoopState>,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig, peripherals: Peripherals) -> Self {
        let (state, _) = watch::channel(LoopState::Starting);
        Self {
            config,
            peripherals,
            state,
        }
    }

    /// Follows the session through its states.
    pub fn watch_state(&self) -> watch::Receiver<LoopState> {
        self.state.subscribe()
    }

    pub async fn run(self) -> RestartReason {
        let Self {
            config,
            peripherals,
            state,
        } = self;
        let Peripherals {
            mut link,
            mut bus,
            mut reader,
            mut indicator,
            clock,
        } = peripherals;

        if let Err(fault) = indicator.off().await {
            return startup_failed(&state, fault);
        }
        if let Err(fault) = reader.init().await {
            return startup_failed(&state, fault);
        }
        match ensure_link(link.as_mut(), indicator.as_mut(), &config.link_retry).await {
            Ok(true) => {}
            Ok(false) => {
                let attempts = config.link_retry.attempts;
                error!(attempts, "network link unavailable, restarting");
                state.send_replace(LoopState::Faulted);
                return RestartReason::LinkUnavailable { attempts };
            }
            Err(fault) => return startup_failed(&state, fault),
        }
        if let Err(fault) = ensure_session(bus.as_mut(), &config.session, &config.topics).await {
            return startup_failed(&state, fault);
        }
        state.send_replace(LoopState::Connected);

        let ctx = Context::new(bus, reader, indicator, clock, config.topics);
        let mut event_loop = EventLoop::new(
            ctx,
            ScanDebouncer::new(config.debounce_window),
            config.tick_interval,
        );
        state.send_replace(LoopState::Running);
        let fault = event_loop.run().await;
        state.send_replace(LoopState::Faulted);

        error!(%fault, cooldown = ?config.cooldown, "loop error, restarting after cooldown");
        tokio::time::sleep(config.cooldown).await;
        RestartReason::RuntimeFault(fault)
    }
}

fn startup_failed(state: &watch::Sender<LoopState>, fault: Fault) -> RestartReason {
    error!(%fault, "startup failed, restarting");
    state.send_replace(LoopState::Faulted);
    RestartReason::StartupFault(fault)
}

/// Runs a supervisor on its own task so that a panic inside the session
/// restarts the device like any other runtime fault.
pub async fn run_contained(supervisor: Supervisor) -> RestartReason {
    let cooldown = supervisor.config.cooldown;
    match tokio::spawn(supervisor.run()).await {
        Ok(reason) => reason,
        Err(join_error) => {
            error!(%join_error, cooldown = ?cooldown, "session aborted, restarting after cooldown");
            tokio::time::sleep(cooldown).await;
            RestartReason::Panicked(join_error.to_string())
        }
    }
}
