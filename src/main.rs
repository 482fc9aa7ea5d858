use cardbridge::application::supervisor::{Peripherals, Supervisor, run_contained};
use cardbridge::config::{BridgeConfig, DeviceIdentity, RESTART_EXIT_CODE};
use cardbridge::domain::ports::{NetworkLink, Transport};
use cardbridge::infrastructure::host::{HostLink, LineTagReader, LogIndicator, SystemClock};
use cardbridge::infrastructure::in_memory::{InMemoryTransport, ScriptedLink};
use cardbridge::infrastructure::mqtt::MqttTransport;
use clap::Parser;
use miette::Result;
use std::io::IsTerminal;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn peripherals(config: &BridgeConfig, tags: &LineTagReader) -> Peripherals {
    let (link, bus): (Box<dyn NetworkLink>, Box<dyn Transport>) = if config.simulate {
        (Box::new(ScriptedLink::up()), Box::new(InMemoryTransport::new()))
    } else {
        let mut mqtt = MqttTransport::new(config.broker_host.clone(), config.broker_port);
        if let Some((username, password)) = config.credentials() {
            mqtt = mqtt.with_credentials(username, password);
        }
        (
            Box::new(HostLink::new(config.broker_host.clone(), config.broker_port)),
            Box::new(mqtt),
        )
    };
    Peripherals {
        link,
        bus,
        reader: Box::new(tags.clone()),
        indicator: Box::new(LogIndicator),
        clock: Arc::new(SystemClock),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = BridgeConfig::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_ansi(std::io::stdout().is_terminal())
        .init();

    config.validate()?;

    let identity = DeviceIdentity::resolve(config.device_id.as_deref());
    let supervisor_config = config.supervisor_config(&identity);
    let tags = LineTagReader::spawn(BufReader::new(tokio::io::stdin()));

    let mut boot: u64 = 0;
    loop {
        boot += 1;
        info!(
            boot,
            client_id = %supervisor_config.session.client_id,
            simulate = config.simulate,
            "starting controller"
        );
        let supervisor = Supervisor::new(supervisor_config.clone(), peripherals(&config, &tags));
        let reason = run_contained(supervisor).await;
        warn!(%reason, boot, "device restart");
        if config.exit_on_restart {
            std::process::exit(RESTART_EXIT_CODE);
        }
    }
}
