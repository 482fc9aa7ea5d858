//! Adapters for running the controller on an ordinary host.

use crate::domain::ports::{Clock, Indicator, NetworkLink, Pulse, ReadStatus, TagReader};
use crate::error::{Fault, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Treats the link as up when the broker's TCP endpoint accepts a connection.
///
/// The operating system owns the actual interface, so `connect` only logs.
pub struct HostLink {
    host: String,
    port: u16,
    probe_timeout: Duration,
}

impl HostLink {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            probe_timeout: Duration::from_secs(2),
        }
    }
}

#[async_trait]
impl NetworkLink for HostLink {
    async fn connect(&mut self) -> Result<()> {
        info!(host = %self.host, port = self.port, "waiting for network link");
        Ok(())
    }

    async fn is_connected(&mut self) -> bool {
        let probe = TcpStream::connect((self.host.as_str(), self.port));
        matches!(tokio::time::timeout(self.probe_timeout, probe).await, Ok(Ok(_)))
    }
}

/// Reports pulses as log events.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogIndicator;

#[async_trait]
impl Indicator for LogIndicator {
    async fn off(&mut self) -> Result<()> {
        debug!("indicator off");
        Ok(())
    }

    async fn pulse(&mut self, pulse: Pulse) -> Result<()> {
        debug!(count = pulse.count, each = ?pulse.each, "indicator pulse");
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }
}

/// A keyboard-wedge style reader: each input line carries one tag UID in hex.
///
/// Lines are read on a background task, so polling never waits. The line
/// stream is shared between clones, which lets a restarted session pick up
/// where the previous one stopped. End of input is a reader fault.
#[derive(Clone)]
pub struct LineTagReader {
    lines: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    selected: Option<Vec<u8>>,
}

impl LineTagReader {
    pub fn spawn<R>(source: R) -> Self
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut lines = source.lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "tag input failed");
                        break;
                    }
                }
            }
        });
        Self {
            lines: Arc::new(Mutex::new(rx)),
            selected: None,
        }
    }
}

#[async_trait]
impl TagReader for LineTagReader {
    async fn init(&mut self) -> Result<()> {
        let lines = self.lines.lock().await;
        if lines.is_closed() && lines.is_empty() {
            return Err(Fault::Reader("tag input closed".to_string()));
        }
        info!("tag reader ready");
        Ok(())
    }

    async fn request(&mut self) -> Result<(ReadStatus, u8)> {
        self.selected = None;
        let next = self.lines.lock().await.try_recv();
        match next {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    return Ok((ReadStatus::NoTag, 0));
                }
                match hex::decode(line) {
                    Ok(uid) => {
                        self.selected = Some(uid);
                        Ok((ReadStatus::Ok, 0))
                    }
                    Err(e) => {
                        warn!(line, error = %e, "unreadable tag input");
                        Ok((ReadStatus::Error, 0))
                    }
                }
            }
            Err(mpsc::error::TryRecvError::Empty) => Ok((ReadStatus::NoTag, 0)),
            Err(mpsc::error::TryRecvError::Disconnected) => {
                Err(Fault::Reader("tag input closed".to_string()))
            }
        }
    }

    async fn read_identity(&mut self) -> Result<(ReadStatus, Vec<u8>)> {
        match self.selected.take() {
            Some(uid) => Ok((ReadStatus::Ok, uid)),
            None => Ok((ReadStatus::NoTag, Vec::new())),
        }
    }
}
