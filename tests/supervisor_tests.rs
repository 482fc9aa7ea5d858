mod common;

use async_trait::async_trait;
use cardbridge::application::event_loop::LoopState;
use cardbridge::application::supervisor::{
    RestartReason, RetryPolicy, Supervisor, SupervisorConfig, run_contained,
};
use cardbridge::domain::ports::{ReadStatus, TagReader};
use cardbridge::error::{Fault, Result};
use cardbridge::infrastructure::in_memory::ScriptedLink;
use common::Device;
use serde_json::json;
use std::time::Duration;
use tokio::time::Instant;

const COOLDOWN: Duration = SupervisorConfig::DEFAULT_COOLDOWN;

#[tokio::test]
async fn test_link_exhaustion_restarts_without_session() {
    let device = Device::new(ScriptedLink::down());
    let supervisor = device.supervisor();
    let state = supervisor.watch_state();

    let reason = supervisor.run().await;

    assert!(matches!(reason, RestartReason::LinkUnavailable { attempts: 3 }));
    assert!(!reason.after_cooldown());
    assert_eq!(*state.borrow(), LoopState::Faulted);
    assert!(device.bus.session().await.is_none());
}

#[tokio::test]
async fn test_reader_init_failure_is_startup_fatal() {
    let device = Device::new(ScriptedLink::up());
    device.reader.fail_init("no SPI device").await;
    let supervisor = device.supervisor();
    let state = supervisor.watch_state();

    let reason = supervisor.run().await;

    assert!(matches!(
        reason,
        RestartReason::StartupFault(Fault::Reader(ref msg)) if msg == "no SPI device"
    ));
    assert!(!reason.after_cooldown());
    assert_eq!(*state.borrow(), LoopState::Faulted);
    // The reader is checked before the network is touched.
    assert_eq!(device.link.polls(), 0);
    assert!(device.bus.session().await.is_none());
}

#[tokio::test]
async fn test_session_failure_is_startup_fatal() {
    let device = Device::new(ScriptedLink::up());
    device.bus.fail_connect("connection refused").await;

    let reason = device.supervisor().run().await;

    assert!(matches!(
        reason,
        RestartReason::StartupFault(Fault::Session(msg)) if msg == "connection refused"
    ));
}

#[tokio::test]
async fn test_subscribe_failure_is_startup_fatal() {
    let device = Device::new(ScriptedLink::up());
    device.bus.fail_subscribe("not authorized").await;

    let reason = device.supervisor().run().await;

    assert!(matches!(reason, RestartReason::StartupFault(Fault::Session(_))));
}

#[tokio::test]
async fn test_session_subscribes_and_runs_until_fault() {
    let device = Device::new(ScriptedLink::up_after(2));
    device.send_topup("0A0B", 40).await;
    device.reader.present(&[0x0a, 0x0b]).await;
    device.reader.fault("reader unplugged").await;

    let supervisor = device.supervisor();
    let state = supervisor.watch_state();
    let reason = supervisor.run().await;

    assert!(matches!(
        reason,
        RestartReason::RuntimeFault(Fault::Reader(ref msg)) if msg == "reader unplugged"
    ));
    assert!(reason.after_cooldown());
    assert_eq!(*state.borrow(), LoopState::Faulted);

    let session = device.bus.session().await.unwrap();
    assert_eq!(session.client_id, "edge_0123456789ab");
    let topics = device.topics();
    assert_eq!(
        device.bus.subscriptions().await,
        vec![topics.topup.clone(), topics.pay.clone()]
    );
    assert_eq!(device.link.connects(), 1);
    assert_eq!(
        device.published_on(&topics.status).await,
        vec![json!({"id": "0A0B", "balance": 40, "timestamp": 1_700_000_000u64})]
    );
}

#[tokio::test]
async fn test_publish_failure_is_runtime_fatal() {
    let device = Device::new(ScriptedLink::up());
    device.send_topup("FF", 1).await;
    device.bus.fail_publishes("broker gone").await;

    let reason = device.supervisor().run().await;

    assert!(matches!(reason, RestartReason::RuntimeFault(Fault::Transport(_))));
}

#[tokio::test]
async fn test_restart_starts_from_an_empty_ledger() {
    let first = Device::new(ScriptedLink::up());
    first.send_topup("C0FFEE", 30).await;
    first.reader.fault("watchdog").await;
    let reason = first.supervisor().run().await;
    assert!(matches!(reason, RestartReason::RuntimeFault(_)));

    // A restart builds everything again; nothing carries over.
    let second = Device::new(ScriptedLink::up());
    second.reader.present(&[0xc0, 0xff, 0xee]).await;
    second.reader.fault("watchdog").await;
    second.supervisor().run().await;

    assert_eq!(
        second.published_on(&second.topics().status).await,
        vec![json!({"id": "C0FFEE", "balance": 0, "timestamp": 1_700_000_000u64})]
    );
}

#[tokio::test]
async fn test_indicator_failure_is_runtime_fatal() {
    let device = Device::new(ScriptedLink::up());
    device.send_topup("0A", 5).await;
    device.indicator.fail_pulses("gpio busy").await;

    let reason = device.supervisor().run().await;

    assert!(matches!(reason, RestartReason::RuntimeFault(Fault::Indicator(_))));
    // The balance report goes out before the indicator is driven.
    assert_eq!(device.published_on(&device.topics().balance).await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_runtime_fault_waits_out_the_cooldown() {
    let device = Device::new(ScriptedLink::up());
    device.reader.fault("reader unplugged").await;
    let mut config = device.supervisor_config();
    config.cooldown = COOLDOWN;

    let started = Instant::now();
    let reason = Supervisor::new(config, device.peripherals()).run().await;

    assert!(matches!(reason, RestartReason::RuntimeFault(_)));
    assert!(started.elapsed() >= COOLDOWN);
}

#[tokio::test(start_paused = true)]
async fn test_startup_fault_restarts_without_cooldown() {
    let device = Device::new(ScriptedLink::up());
    device.bus.fail_connect("connection refused").await;
    let mut config = device.supervisor_config();
    config.cooldown = COOLDOWN;

    let started = Instant::now();
    let reason = Supervisor::new(config, device.peripherals()).run().await;

    assert!(matches!(reason, RestartReason::StartupFault(_)));
    assert!(started.elapsed() < COOLDOWN);
}

#[tokio::test(start_paused = true)]
async fn test_link_exhaustion_only_waits_for_retries() {
    let device = Device::new(ScriptedLink::down());
    let mut config = device.supervisor_config();
    config.cooldown = COOLDOWN;
    config.link_retry = RetryPolicy {
        attempts: 3,
        interval: Duration::from_millis(500),
    };

    let started = Instant::now();
    let reason = Supervisor::new(config, device.peripherals()).run().await;

    assert!(matches!(reason, RestartReason::LinkUnavailable { attempts: 3 }));
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(1_500), "{elapsed:?}");
    assert!(elapsed < COOLDOWN, "{elapsed:?}");
}

struct PanickingReader;

#[async_trait]
impl TagReader for PanickingReader {
    async fn init(&mut self) -> Result<()> {
        Ok(())
    }

    async fn request(&mut self) -> Result<(ReadStatus, u8)> {
        panic!("driver bug");
    }

    async fn read_identity(&mut self) -> Result<(ReadStatus, Vec<u8>)> {
        Ok((ReadStatus::NoTag, Vec::new()))
    }
}

#[tokio::test]
async fn test_panic_in_session_is_contained() {
    let device = Device::new(ScriptedLink::up());
    let mut peripherals = device.peripherals();
    peripherals.reader = Box::new(PanickingReader);
    let supervisor = Supervisor::new(device.supervisor_config(), peripherals);

    let reason = run_contained(supervisor).await;

    assert!(matches!(reason, RestartReason::Panicked(_)));
    assert!(reason.after_cooldown());
}

#[tokio::test(start_paused = true)]
async fn test_contained_panic_waits_out_the_cooldown() {
    let device = Device::new(ScriptedLink::up());
    let mut peripherals = device.peripherals();
    peripherals.reader = Box::new(PanickingReader);
    let mut config = device.supervisor_config();
    config.cooldown = COOLDOWN;

    let started = Instant::now();
    let reason = run_contained(Supervisor::new(config, peripherals)).await;

    assert!(matches!(reason, RestartReason::Panicked(_)));
    assert!(started.elapsed() >= COOLDOWN);
}
