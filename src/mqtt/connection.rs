use super::error::SessionError;
use super::handler::{EventHandler, SUCCESS, UNEXPECTED_DISCONNECT, UNREACHABLE};
use super::messages::{InboundMessage, OutboundMessage};
use crate::config::BrokerConfig;
use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
    /// Carries the connect status code reported to the handler.
    Failed(u8),
}

/// Publishes waiting for the broker to take them over.
///
/// rumqttc handles requests strictly in the order they are queued, so the
/// n-th `Outgoing::Publish` belongs to the n-th waiter in `queued`.
#[derive(Default)]
struct Inflight {
    queued: VecDeque<(QoS, oneshot::Sender<()>)>,
    awaiting: HashMap<u16, oneshot::Sender<()>>,
    closed: bool,
}

impl Inflight {
    fn enqueue(&mut self, qos: QoS) -> Option<oneshot::Receiver<()>> {
        if self.closed {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        self.queued.push_back((qos, tx));
        Some(rx)
    }

    fn on_outgoing_publish(&mut self, pkid: u16) {
        match self.queued.pop_front() {
            Some((QoS::AtMostOnce, ack)) => {
                let _ = ack.send(());
            }
            Some((_, ack)) => {
                // Waiters that timed out never see their ack.
                self.awaiting.retain(|_, waiter| !waiter.is_closed());
                self.awaiting.insert(pkid, ack);
            }
            None => debug!("Outgoing publish {} has no waiter", pkid),
        }
    }

    fn on_ack(&mut self, pkid: u16) {
        if let Some(ack) = self.awaiting.remove(&pkid) {
            let _ = ack.send(());
        }
    }

    /// Drops every waiter so blocked publishers see the connection as lost.
    fn close(&mut self) {
        self.closed = true;
        self.queued.clear();
        self.awaiting.clear();
    }
}

fn lock(inflight: &Mutex<Inflight>) -> MutexGuard<'_, Inflight> {
    inflight.lock().unwrap_or_else(PoisonError::into_inner)
}

fn generate_client_id() -> String {
    // MQTT 3.1.1 brokers are only required to accept ids up to 23 characters
    let id = Uuid::new_v4().simple().to_string();
    format!("mqttline-{}", &id[..12])
}

/// One broker session with its background event loop.
///
/// The event loop is spawned by [`Connection::connect`] and lives until
/// [`Connection::disconnect`] is called or the connection is dropped.
pub struct Connection {
    client: AsyncClient,
    host: String,
    state: watch::Receiver<ConnectionState>,
    inflight: Arc<Mutex<Inflight>>,
    publish_gate: tokio::sync::Mutex<()>,
    task: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
    publish_timeout: Duration,
    disconnect_timeout: Duration,
}

impl Connection {
    /// Starts the event loop and waits until the broker accepts the session,
    /// refuses it, or `connect_timeout` elapses.
    pub async fn connect(
        config: &BrokerConfig,
        handler: Arc<dyn EventHandler>,
    ) -> Result<Self, SessionError> {
        let client_id = config.client_id.clone().unwrap_or_else(generate_client_id);
        let mut mqtt_options = MqttOptions::new(&client_id, config.host.clone(), config.port);
        mqtt_options.set_keep_alive(config.keep_alive());
        mqtt_options.set_clean_session(true);

        let (client, event_loop) = AsyncClient::new(mqtt_options, 10);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let inflight = Arc::new(Mutex::new(Inflight::default()));
        let cancel = CancellationToken::new();

        let task = EventLoopTask {
            event_loop,
            host: config.host.clone(),
            handler,
            state: state_tx,
            inflight: inflight.clone(),
            cancel: cancel.clone(),
            reconnect_attempts: config.reconnect_attempts,
            reconnect_delay: config.reconnect_delay(),
        };

        info!(
            "Connecting to MQTT broker {}:{} as {}",
            config.host, config.port, client_id
        );

        let connection = Self {
            client,
            host: config.host.clone(),
            state: state_rx,
            inflight,
            publish_gate: tokio::sync::Mutex::new(()),
            task: Mutex::new(Some(tokio::spawn(task.run()))),
            cancel,
            publish_timeout: config.publish_timeout(),
            disconnect_timeout: config.disconnect_timeout(),
        };

        // On failure the connection is dropped here, which stops the task.
        connection.wait_until_connected(config.connect_timeout()).await?;
        Ok(connection)
    }

    async fn wait_until_connected(&self, limit: Duration) -> Result<(), SessionError> {
        let mut state = self.state.clone();
        let settled = timeout(limit, async move {
            loop {
                let current = *state.borrow_and_update();
                if current != ConnectionState::Connecting {
                    return current;
                }
                if state.changed().await.is_err() {
                    // The task has exited; its last state is final.
                    let last = *state.borrow();
                    return last;
                }
            }
        })
        .await;

        let settled = match settled {
            Ok(current) => current,
            Err(_) => {
                return Err(SessionError::ConnectTimeout {
                    host: self.host.clone(),
                    timeout: limit,
                })
            }
        };

        match settled {
            ConnectionState::Connected => Ok(()),
            ConnectionState::Failed(code) => Err(SessionError::ConnectFailed {
                host: self.host.clone(),
                code,
            }),
            _ => Err(SessionError::ConnectFailed {
                host: self.host.clone(),
                code: UNREACHABLE,
            }),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    fn ensure_connected(&self) -> Result<(), SessionError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(SessionError::NotConnected)
        }
    }

    /// Publishes `message` and blocks until the broker has taken it over:
    /// written to the socket for QoS 0, PUBACK for QoS 1, PUBCOMP for QoS 2.
    pub async fn publish(&self, topic: &str, message: &str, qos: QoS) -> Result<(), SessionError> {
        self.send(OutboundMessage::new(topic, message, qos)).await
    }

    pub async fn send(&self, message: OutboundMessage) -> Result<(), SessionError> {
        self.ensure_connected()?;

        let acked = {
            // Held until the request is queued so waiter order matches packet order.
            let _gate = self.publish_gate.lock().await;
            let acked = lock(&self.inflight)
                .enqueue(message.qos)
                .ok_or(SessionError::ConnectionLost)?;

            if let Err(e) = self
                .client
                .publish(
                    &message.topic,
                    message.qos,
                    false,
                    message.payload.as_bytes().to_vec(),
                )
                .await
            {
                lock(&self.inflight).queued.pop_back();
                return Err(e.into());
            }
            acked
        };

        debug!("Publishing to topic: {}", message.topic);
        match timeout(self.publish_timeout, acked).await {
            Ok(Ok(())) => {
                debug!("Message on '{}' acknowledged", message.topic);
                Ok(())
            }
            Ok(Err(_)) => Err(SessionError::ConnectionLost),
            Err(_) => Err(SessionError::PublishTimeout {
                topic: message.topic,
                timeout: self.publish_timeout,
            }),
        }
    }

    /// Registers interest in `topic`. Does not wait for the SUBACK.
    pub async fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), SessionError> {
        self.ensure_connected()?;
        info!("Subscribing to topic: {}", topic);
        self.client.subscribe(topic, qos).await?;
        Ok(())
    }

    pub async fn unsubscribe(&self, topic: &str) -> Result<(), SessionError> {
        self.ensure_connected()?;
        info!("Unsubscribing from topic: {}", topic);
        self.client.unsubscribe(topic).await?;
        Ok(())
    }

    /// Sends DISCONNECT and stops the event loop. Calling it again is a no-op.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut task) = task else {
            debug!("Already disconnected from {}", self.host);
            return Ok(());
        };

        let mut finished = false;
        if self.is_connected() {
            match self.client.disconnect().await {
                Ok(()) => match timeout(self.disconnect_timeout, &mut task).await {
                    Ok(joined) => {
                        finished = true;
                        if let Err(e) = joined {
                            warn!("MQTT event loop ended abnormally: {}", e);
                        }
                    }
                    Err(_) => warn!(
                        "Event loop for {} did not stop within {:?}, cancelling",
                        self.host, self.disconnect_timeout
                    ),
                },
                Err(e) => warn!("Failed to send disconnect request: {}", e),
            }
        }

        self.cancel.cancel();
        if !finished {
            if let Err(e) = task.await {
                warn!("MQTT event loop ended abnormally: {}", e);
            }
        }

        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.cancel.cancel();
        let task = self
            .task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if task.is_some() {
            debug!("Connection to {} dropped without disconnect, stopping event loop", self.host);
        }
    }
}

struct EventLoopTask {
    event_loop: EventLoop,
    host: String,
    handler: Arc<dyn EventHandler>,
    state: watch::Sender<ConnectionState>,
    inflight: Arc<Mutex<Inflight>>,
    cancel: CancellationToken,
    reconnect_attempts: u32,
    reconnect_delay: Duration,
}

impl EventLoopTask {
    async fn run(mut self) {
        debug!("Starting MQTT event loop for {}", self.host);

        let mut connected = false;
        let mut attempts_left = self.reconnect_attempts;

        loop {
            let polled = tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("MQTT event loop for {} cancelled", self.host);
                    break;
                }
                polled = self.event_loop.poll() => polled,
            };

            match polled {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    connected = true;
                    self.state.send_replace(ConnectionState::Connected);
                    self.handler.on_connect(&self.host, SUCCESS);
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    debug!("Received message on topic: {}", publish.topic);
                    self.handler.on_message(InboundMessage::from_publish(&publish));
                }
                Ok(Event::Incoming(Packet::PubAck(ack))) => lock(&self.inflight).on_ack(ack.pkid),
                Ok(Event::Incoming(Packet::PubComp(ack))) => lock(&self.inflight).on_ack(ack.pkid),
                Ok(Event::Incoming(Packet::SubAck(_))) => {
                    debug!("Successfully subscribed to topic");
                }
                Ok(Event::Incoming(packet)) => {
                    debug!("Received MQTT packet: {:?}", packet);
                }
                Ok(Event::Outgoing(Outgoing::Publish(pkid))) => {
                    lock(&self.inflight).on_outgoing_publish(pkid);
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    self.state.send_replace(ConnectionState::Disconnected);
                    self.handler.on_disconnect(&self.host, SUCCESS);
                    break;
                }
                Ok(Event::Outgoing(_)) => {}
                Err(ConnectionError::ConnectionRefused(code)) if !connected => {
                    let code = code as u8;
                    error!("Broker {} refused the connection with code {}", self.host, code);
                    self.state.send_replace(ConnectionState::Failed(code));
                    self.handler.on_connect(&self.host, code);
                    break;
                }
                Err(e) if !connected => {
                    if attempts_left == 0 {
                        error!("Could not connect to {}: {}", self.host, e);
                        self.state.send_replace(ConnectionState::Failed(UNREACHABLE));
                        self.handler.on_connect(&self.host, UNREACHABLE);
                        break;
                    }

                    attempts_left -= 1;
                    warn!("Could not connect to {} ({}), reconnecting", self.host, e);
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.reconnect_delay) => {}
                    }
                }
                Err(e) => {
                    error!("MQTT connection error: {}", e);
                    self.state.send_replace(ConnectionState::Disconnected);
                    self.handler.on_disconnect(&self.host, UNEXPECTED_DISCONNECT);
                    break;
                }
            }
        }

        lock(&self.inflight).close();
        self.state.send_if_modified(|state| match state {
            ConnectionState::Connecting | ConnectionState::Connected => {
                *state = ConnectionState::Disconnected;
                true
            }
            _ => false,
        });
        debug!("MQTT event loop for {} stopped", self.host);
    }
}
