//! Connection to the message broker.
//!
//! Two background threads move payloads between the broker and the simulation loop: the
//! receiver forwards every message below the topic prefix, the sender collects outbound messages
//! and publishes them in batches. Both talk to the loop over bounded channels only.

use std::{
    io, thread,
    time::{Duration, Instant},
};

use bevy::log::{debug, error, info, warn};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use indexmap::IndexMap;
use rumqttc::{Client, Connection, ConnectionError, Event, MqttOptions, Packet, QoS};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::{InboundMessage, OutboundMessage, Topics};

const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const REQUEST_CAPACITY: usize = 64;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to start {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: io::Error,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Runs without network threads if disabled.
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub topic_prefix: String,
    pub keep_alive_secs: u64,
    pub flush_interval_ms: u64,
    /// Capacity of each channel between the threads and the simulation loop.
    pub channel_capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "localhost".to_owned(),
            port: 1883,
            client_id: "forklift-warehouse".to_owned(),
            topic_prefix: "warehouse".to_owned(),
            keep_alive_secs: 30,
            flush_interval_ms: 1000,
            channel_capacity: 1024,
        }
    }
}

impl BrokerConfig {
    fn options(&self, role: &str) -> MqttOptions {
        let mut options = MqttOptions::new(
            format!("{}-{role}", self.client_id),
            self.host.as_str(),
            self.port,
        );
        options.set_keep_alive(Duration::from_secs(self.keep_alive_secs.max(5)));
        options
    }
}

/// Simulation side of the channels to the broker threads.
pub struct ControlChannel {
    inbound: Receiver<InboundMessage>,
    outbound: Sender<OutboundMessage>,
    inbound_closed: bool,
    outbound_closed: bool,
}

impl ControlChannel {
    pub fn new(inbound: Receiver<InboundMessage>, outbound: Sender<OutboundMessage>) -> Self {
        Self {
            inbound,
            outbound,
            inbound_closed: false,
            outbound_closed: false,
        }
    }

    /// Channel pair without threads. Returns the far ends for the caller to drive.
    pub fn detached(capacity: usize) -> (Self, Sender<InboundMessage>, Receiver<OutboundMessage>) {
        let (inbound_sender, inbound) = bounded(capacity);
        let (outbound, outbound_receiver) = bounded(capacity);
        (
            Self::new(inbound, outbound),
            inbound_sender,
            outbound_receiver,
        )
    }

    /// Everything received since the last call.
    pub fn receive(&mut self) -> Vec<InboundMessage> {
        let mut messages = vec![];
        loop {
            match self.inbound.try_recv() {
                Ok(message) => messages.push(message),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.inbound_closed {
                        warn!("Inbound channel closed, no more commands will be received");
                        self.inbound_closed = true;
                    }
                    break;
                }
            }
        }
        messages
    }

    pub fn send(&mut self, message: OutboundMessage) {
        match self.outbound.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(message)) => {
                debug!("Outbound channel full, dropping message on {}", message.topic);
            }
            Err(TrySendError::Disconnected(_)) => {
                if !self.outbound_closed {
                    warn!("Outbound channel closed, telemetry will not be published");
                    self.outbound_closed = true;
                }
            }
        }
    }
}

/// Starts the receiver and sender threads.
pub fn connect(config: &BrokerConfig) -> Result<ControlChannel, TransportError> {
    let (inbound_sender, inbound) = bounded(config.channel_capacity);
    let (outbound, outbound_receiver) = bounded(config.channel_capacity);

    spawn("mqtt-receiver", {
        let config = config.clone();
        move || receive(&config, inbound_sender)
    })?;
    spawn("mqtt-sender", {
        let config = config.clone();
        move || send(&config, outbound_receiver)
    })?;

    info!(
        "Connecting to broker at {}:{} below {:?}",
        config.host, config.port, config.topic_prefix
    );
    Ok(ControlChannel::new(inbound, outbound))
}

fn spawn(name: &'static str, f: impl FnOnce() + Send + 'static) -> Result<(), TransportError> {
    thread::Builder::new()
        .name(name.to_owned())
        .spawn(f)
        .map(|_| ())
        .map_err(|source| TransportError::Spawn { name, source })
}

fn receive(config: &BrokerConfig, inbound: Sender<InboundMessage>) {
    let topics = Topics::new(&config.topic_prefix);
    let (client, mut connection) = Client::new(config.options("rx"), REQUEST_CAPACITY);

    for notification in connection.iter() {
        match notification {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("Receiver connected, subscribing to {}", topics.subscription());
                if let Err(error) = client.try_subscribe(topics.subscription(), QoS::AtMostOnce) {
                    error!("Failed to subscribe: {error}");
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let Some(topic) = topics.strip(&publish.topic) else {
                    continue;
                };
                let message = InboundMessage {
                    topic: topic.to_owned(),
                    payload: String::from_utf8_lossy(&publish.payload).into_owned(),
                };
                match inbound.try_send(message) {
                    Ok(()) => {}
                    Err(TrySendError::Full(message)) => {
                        debug!("Inbound channel full, dropping message on {}", message.topic);
                    }
                    Err(TrySendError::Disconnected(_)) => return,
                }
            }
            Ok(_) => {}
            Err(error) => {
                warn!("Receiver connection error: {error}");
                thread::sleep(RECONNECT_DELAY);
            }
        }
    }
}

/// Client whose request queue holds as many messages as the outbound channel.
fn sender_client(config: &BrokerConfig) -> (Client, Connection) {
    Client::new(config.options("tx"), config.channel_capacity.max(1))
}

fn send(config: &BrokerConfig, outbound: Receiver<OutboundMessage>) {
    let (client, mut connection) = sender_client(config);

    let driver = thread::Builder::new()
        .name("mqtt-sender-connection".to_owned())
        .spawn(move || {
            for notification in connection.iter() {
                match notification {
                    Ok(_) => {}
                    Err(ConnectionError::RequestsDone) => return,
                    Err(error) => {
                        warn!("Sender connection error: {error}");
                        thread::sleep(RECONNECT_DELAY);
                    }
                }
            }
        });
    if let Err(error) = driver {
        error!("Failed to start sender connection thread: {error}");
        return;
    }

    let flush_interval = Duration::from_millis(config.flush_interval_ms);
    let mut outbox = Outbox::default();
    let mut next_flush = Instant::now() + flush_interval;
    loop {
        match outbound.recv_timeout(next_flush.saturating_duration_since(Instant::now())) {
            Ok(message) => outbox.push(message),
            Err(RecvTimeoutError::Timeout) => {
                let pending = outbox.take();
                if !pending.is_empty() {
                    debug!("Flushing {} messages", pending.len());
                }
                publish(&client, pending);
                next_flush = Instant::now() + flush_interval;
            }
            Err(RecvTimeoutError::Disconnected) => {
                publish(&client, outbox.take());
                return;
            }
        }
    }
}

/// Hands every message to the connection, waiting while its request queue is full. Returns the
/// number of messages accepted.
fn publish(client: &Client, messages: Vec<OutboundMessage>) -> usize {
    let total = messages.len();
    let mut published = 0;
    for message in messages {
        let topic = message.topic;
        match client.publish(topic.as_str(), QoS::AtMostOnce, message.retain, message.payload) {
            Ok(()) => published += 1,
            Err(error) => warn!("Failed to publish on {topic}: {error}"),
        }
    }
    if published < total {
        warn!("Published {published} of {total} messages");
    }
    published
}

/// Pending outbound messages grouped by topic, topics in order of first use.
#[derive(Debug, Default)]
pub struct Outbox {
    pending: IndexMap<String, Vec<OutboundMessage>>,
}

impl Outbox {
    pub fn push(&mut self, message: OutboundMessage) {
        self.pending
            .entry(message.topic.clone())
            .or_default()
            .push(message);
    }

    pub fn len(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Removes everything pending.
    pub fn take(&mut self) -> Vec<OutboundMessage> {
        self.pending.drain(..).flat_map(|(_, messages)| messages).collect()
    }
}
