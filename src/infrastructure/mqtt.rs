use crate::domain::message::InboundMessage;
use crate::domain::ports::{SessionOptions, Transport};
use crate::error::{Fault, Result};
use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tracing::debug;

type Delivery = std::result::Result<InboundMessage, String>;

struct Session {
    client: AsyncClient,
    inbound: mpsc::Receiver<Delivery>,
    driver: JoinHandle<()>,
}

/// MQTT bus over `rumqttc`, at QoS 0.
///
/// `rumqttc` only makes progress while its event loop is polled, so
/// [`connect`](Transport::connect) hands the event loop to a background task
/// that forwards incoming publishes into a channel, and `poll_incoming`
/// drains that channel without waiting. A broken connection is reported once
/// through the same channel; there is no automatic reconnect.
pub struct MqttTransport {
    host: String,
    port: u16,
    credentials: Option<(String, String)>,
    connect_timeout: Duration,
    capacity: usize,
    session: Option<Session>,
}

impl MqttTransport {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            credentials: None,
            connect_timeout: Duration::from_secs(10),
            capacity: 64,
            session: None,
        }
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn session(&mut self) -> Result<&mut Session> {
        self.session
            .as_mut()
            .ok_or_else(|| Fault::Session("not connected".to_string()))
    }
}

async fn await_connack(eventloop: &mut EventLoop) -> Result<()> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return if ack.code == ConnectReturnCode::Success {
                    Ok(())
                } else {
                    Err(Fault::Session(format!("broker refused connection: {:?}", ack.code)))
                };
            }
            Ok(_) => {}
            Err(e) => return Err(Fault::Session(e.to_string())),
        }
    }
}

async fn drive(mut eventloop: EventLoop, tx: mpsc::Sender<Delivery>) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let msg = InboundMessage::new(publish.topic, publish.payload.to_vec());
                if tx.send(Ok(msg)).await.is_err() {
                    break;
                }
            }
            Ok(event) => debug!(?event, "mqtt event"),
            Err(e) => {
                let _ = tx.send(Err(e.to_string())).await;
                break;
            }
        }
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn connect(&mut self, options: &SessionOptions) -> Result<()> {
        if let Some(old) = self.session.take() {
            old.driver.abort();
        }
        let mut mqtt = MqttOptions::new(options.client_id.clone(), self.host.clone(), self.port);
        mqtt.set_keep_alive(options.keep_alive);
        if let Some((username, password)) = &self.credentials {
            mqtt.set_credentials(username.clone(), password.clone());
        }

        let (client, mut eventloop) = AsyncClient::new(mqtt, self.capacity);
        match tokio::time::timeout(self.connect_timeout, await_connack(&mut eventloop)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(Fault::Session(format!(
                    "no CONNACK from {}:{} within {:?}",
                    self.host, self.port, self.connect_timeout
                )));
            }
        }

        let (tx, inbound) = mpsc::channel(self.capacity);
        let driver = tokio::spawn(drive(eventloop, tx));
        self.session = Some(Session {
            client,
            inbound,
            driver,
        });
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<()> {
        self.session()?
            .client
            .subscribe(topic, QoS::AtMostOnce)
            .await
            .map_err(|e| Fault::Session(e.to_string()))
    }

    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.session()?
            .client
            .publish(topic, QoS::AtMostOnce, false, payload)
            .await
            .map_err(|e| Fault::Transport(e.to_string()))
    }

    async fn poll_incoming(&mut self) -> Result<Option<InboundMessage>> {
        match self.session()?.inbound.try_recv() {
            Ok(Ok(msg)) => Ok(Some(msg)),
            Ok(Err(reason)) => Err(Fault::Transport(reason)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => {
                Err(Fault::Transport("mqtt event loop stopped".to_string()))
            }
        }
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        if let Some(session) = &self.session {
            session.driver.abort();
        }
    }
}
