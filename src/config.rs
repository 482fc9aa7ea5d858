use crate::application::supervisor::{RetryPolicy, SupervisorConfig};
use crate::domain::message::Topics;
use crate::domain::ports::SessionOptions;
use clap::Parser;
use miette::Diagnostic;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Process exit status used by `--exit-on-restart` (EX_TEMPFAIL).
pub const RESTART_EXIT_CODE: i32 = 75;

const IDENTITY_SOURCES: [&str; 3] = [
    "/etc/machine-id",
    "/var/lib/dbus/machine-id",
    "/etc/hostname",
];

#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about = "Card-tap edge controller bridging a tag reader to an MQTT bus",
    long_about = None
)]
pub struct BridgeConfig {
    /// MQTT broker host
    #[arg(long, env = "CARDBRIDGE_BROKER_HOST", default_value = "broker.benax.rw")]
    pub broker_host: String,

    /// MQTT broker port
    #[arg(long, env = "CARDBRIDGE_BROKER_PORT", default_value_t = 1883)]
    pub broker_port: u16,

    /// Topic prefix; topics are `<namespace>/card/{status,topup,pay,balance}`
    #[arg(long, env = "CARDBRIDGE_NAMESPACE", default_value = "rfid/edge")]
    pub namespace: String,

    #[arg(long, env = "CARDBRIDGE_USERNAME")]
    pub username: Option<String>,

    #[arg(long, env = "CARDBRIDGE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Stable device token. Read from the machine id when omitted.
    #[arg(long, env = "CARDBRIDGE_DEVICE_ID")]
    pub device_id: Option<String>,

    #[arg(long, env = "CARDBRIDGE_KEEP_ALIVE_SECS", default_value_t = 60)]
    pub keep_alive_secs: u64,

    /// How many times to retry the network link before restarting
    #[arg(long, env = "CARDBRIDGE_LINK_ATTEMPTS", default_value_t = 20)]
    pub link_attempts: u32,

    #[arg(long, env = "CARDBRIDGE_LINK_RETRY_MS", default_value_t = 500)]
    pub link_retry_ms: u64,

    #[arg(long, env = "CARDBRIDGE_TICK_MS", default_value_t = 100)]
    pub tick_ms: u64,

    /// Minimum gap before the same tag counts as a new scan
    #[arg(long, env = "CARDBRIDGE_DEBOUNCE_MS", default_value_t = 2000)]
    pub debounce_ms: u64,

    /// Pause after a runtime fault before restarting
    #[arg(long, env = "CARDBRIDGE_COOLDOWN_MS", default_value_t = 5000)]
    pub cooldown_ms: u64,

    /// Exit with status 75 instead of restarting in-process
    #[arg(long, env = "CARDBRIDGE_EXIT_ON_RESTART")]
    pub exit_on_restart: bool,

    /// Run against an in-process bus instead of a broker
    #[arg(long)]
    pub simulate: bool,
}

#[derive(Error, Diagnostic, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid namespace `{0}`")]
    #[diagnostic(
        code(cardbridge::config::namespace),
        help("use a non-empty topic prefix without `+` or `#` wildcards")
    )]
    Namespace(String),
    #[error("broker host is empty")]
    #[diagnostic(code(cardbridge::config::broker_host))]
    BrokerHost,
    #[error("username and password must be given together")]
    #[diagnostic(code(cardbridge::config::credentials))]
    Credentials,
    #[error("tick interval must be at least 1 ms")]
    #[diagnostic(code(cardbridge::config::tick))]
    Tick,
    #[error("keep-alive must be at least 1 second")]
    #[diagnostic(code(cardbridge::config::keep_alive))]
    KeepAlive,
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ns = self.namespace.trim_matches('/');
        if ns.is_empty() || ns.contains(['+', '#']) {
            return Err(ConfigError::Namespace(self.namespace.clone()));
        }
        if !self.simulate && self.broker_host.trim().is_empty() {
            return Err(ConfigError::BrokerHost);
        }
        if self.username.is_some() != self.password.is_some() {
            return Err(ConfigError::Credentials);
        }
        if self.tick_ms == 0 {
            return Err(ConfigError::Tick);
        }
        if self.keep_alive_secs == 0 {
            return Err(ConfigError::KeepAlive);
        }
        Ok(())
    }

    pub fn topics(&self) -> Topics {
        Topics::new(&self.namespace)
    }

    pub fn credentials(&self) -> Option<(&str, &str)> {
        self.username.as_deref().zip(self.password.as_deref())
    }

    pub fn supervisor_config(&self, identity: &DeviceIdentity) -> SupervisorConfig {
        SupervisorConfig {
            link_retry: RetryPolicy {
                attempts: self.link_attempts,
                interval: Duration::from_millis(self.link_retry_ms),
            },
            session: SessionOptions {
                client_id: identity.client_id(),
                keep_alive: Duration::from_secs(self.keep_alive_secs),
            },
            topics: self.topics(),
            tick_interval: Duration::from_millis(self.tick_ms),
            debounce_window: Duration::from_millis(self.debounce_ms),
            cooldown: Duration::from_millis(self.cooldown_ms),
        }
    }
}

/// Stable per-device token from which the bus client id is derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Uses `explicit` if given, else the first readable system identity file.
    pub fn resolve(explicit: Option<&str>) -> Self {
        if let Some(token) = explicit.map(str::trim).filter(|t| !t.is_empty()) {
            return Self::new(token);
        }
        let sources: Vec<&Path> = IDENTITY_SOURCES.iter().map(Path::new).collect();
        Self::from_files(&sources).unwrap_or_else(|| Self::new("unknown"))
    }

    pub fn from_files(paths: &[&Path]) -> Option<Self> {
        paths.iter().find_map(|path| {
            let token = fs::read_to_string(path).ok()?;
            let token = token.trim();
            (!token.is_empty()).then(|| Self::new(token))
        })
    }

    /// `edge_` followed by up to 12 lowercase hex digits of the token.
    pub fn client_id(&self) -> String {
        let digits = if self.0.chars().all(|c| c.is_ascii_hexdigit()) {
            self.0.to_ascii_lowercase()
        } else {
            hex::encode(self.0.as_bytes())
        };
        let end = digits.len().min(12);
        format!("edge_{}", &digits[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(args: &[&str]) -> BridgeConfig {
        let mut argv = vec!["cardbridge"];
        argv.extend_from_slice(args);
        BridgeConfig::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults_match_design_constants() {
        let config = parse(&[]);
        let supervisor = config.supervisor_config(&DeviceIdentity::new("ab"));
        assert_eq!(supervisor.tick_interval, Duration::from_millis(100));
        assert_eq!(supervisor.debounce_window, Duration::from_secs(2));
        assert_eq!(supervisor.cooldown, SupervisorConfig::DEFAULT_COOLDOWN);
        assert_eq!(supervisor.link_retry, RetryPolicy::default());
        assert_eq!(supervisor.session.keep_alive, Duration::from_secs(60));
        assert_eq!(supervisor.topics.topup, "rfid/edge/card/topup");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_errors() {
        assert_eq!(
            parse(&["--namespace", "rfid/+"]).validate(),
            Err(ConfigError::Namespace("rfid/+".to_string()))
        );
        assert_eq!(
            parse(&["--namespace", "/"]).validate(),
            Err(ConfigError::Namespace("/".to_string()))
        );
        assert_eq!(
            parse(&["--username", "u"]).validate(),
            Err(ConfigError::Credentials)
        );
        assert_eq!(parse(&["--tick-ms", "0"]).validate(), Err(ConfigError::Tick));
        assert_eq!(
            parse(&["--broker-host", " "]).validate(),
            Err(ConfigError::BrokerHost)
        );
        assert!(parse(&["--broker-host", " ", "--simulate"]).validate().is_ok());
    }

    #[test]
    fn test_credentials_pair() {
        let config = parse(&["--username", "u", "--password", "p"]);
        assert_eq!(config.credentials(), Some(("u", "p")));
    }

    #[test]
    fn test_client_id_from_hex_token() {
        let identity = DeviceIdentity::new("3F2A9C0D11E84B7FA0C1D2E3F4A5B6C7");
        assert_eq!(identity.client_id(), "edge_3f2a9c0d11e8");
    }

    #[test]
    fn test_client_id_from_hostname_token() {
        assert_eq!(DeviceIdentity::new("kiosk").client_id(), "edge_6b696f736b");
    }

    #[test]
    fn test_identity_from_first_readable_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        let empty = dir.path().join("empty");
        fs::File::create(&empty).unwrap();
        let mut file = tempfile::NamedTempFile::new_in(dir.path()).unwrap();
        writeln!(file, "  0123456789abcdef  ").unwrap();

        let identity =
            DeviceIdentity::from_files(&[missing.as_path(), empty.as_path(), file.path()]).unwrap();
        assert_eq!(identity, DeviceIdentity::new("0123456789abcdef"));
    }

    #[test]
    fn test_explicit_identity_wins() {
        assert_eq!(DeviceIdentity::resolve(Some(" dev1 ")), DeviceIdentity::new("dev1"));
    }
}
