//! Channel establishment between the host and iframe sides.
//!
//! Two delivery paths exist. The broadcast lane models the document-wide
//! `postMessage` bus: always available, carries the readiness handshake,
//! and stays fully functional on its own. The dedicated port pair models a
//! `MessageChannel`: the host creates it after the agent announces
//! readiness and transfers one end inside an `init-port` message, after
//! which both sides bind all traffic to the port. Delivery on either lane
//! is FIFO; no ordering holds across the two, which is why the switch is
//! all-or-nothing.

use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{Result, VeditError};

/// A message on the broadcast lane: a JSON value plus any transferred
/// ports, mirroring the `postMessage(data, transfer)` shape.
#[derive(Debug)]
pub struct BusMessage {
    pub value: Value,
    pub ports: Vec<Port>,
}

impl BusMessage {
    pub fn data(value: Value) -> Self {
        Self {
            value,
            ports: Vec::new(),
        }
    }
}

/// One end of an entangled duplex port pair.
#[derive(Debug)]
pub struct Port {
    tx: mpsc::UnboundedSender<Value>,
    rx: mpsc::UnboundedReceiver<Value>,
}

/// Create two cross-wired ports: what one sends, the other receives.
pub fn port_pair() -> (Port, Port) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    (Port { tx: a_tx, rx: a_rx }, Port { tx: b_tx, rx: b_rx })
}

impl Port {
    pub fn send(&self, value: Value) -> Result<()> {
        self.tx
            .send(value)
            .map_err(|_| VeditError::ChannelClosed("dedicated port"))
    }

    pub async fn recv(&mut self) -> Option<Value> {
        self.rx.recv().await
    }

    /// Split into an outbound sender and the raw inbound receiver, the
    /// shape each side binds into its run loop.
    pub fn split(self) -> (PortSender, mpsc::UnboundedReceiver<Value>) {
        (PortSender(self.tx), self.rx)
    }
}

/// The outbound capability both sides depend on. Which lane sits behind it
/// is decided at bind time and can change exactly once, broadcast → port.
pub trait Outbound: Send {
    fn send(&self, value: Value) -> Result<()>;
}

/// Outbound over the broadcast lane.
pub struct BroadcastSender(pub(crate) mpsc::UnboundedSender<BusMessage>);

impl Outbound for BroadcastSender {
    fn send(&self, value: Value) -> Result<()> {
        self.0
            .send(BusMessage::data(value))
            .map_err(|_| VeditError::ChannelClosed("broadcast lane"))
    }
}

/// Outbound over a bound dedicated port.
pub struct PortSender(mpsc::UnboundedSender<Value>);

impl Outbound for PortSender {
    fn send(&self, value: Value) -> Result<()> {
        self.0
            .send(value)
            .map_err(|_| VeditError::ChannelClosed("dedicated port"))
    }
}

/// Host end of the embedding boundary.
#[derive(Debug)]
pub struct HostEndpoint {
    pub(crate) to_agent: mpsc::UnboundedSender<BusMessage>,
    pub(crate) from_agent: mpsc::UnboundedReceiver<BusMessage>,
}

/// Iframe end of the embedding boundary.
#[derive(Debug)]
pub struct AgentEndpoint {
    pub(crate) to_host: mpsc::UnboundedSender<BusMessage>,
    pub(crate) from_host: mpsc::UnboundedReceiver<BusMessage>,
}

/// Build the broadcast lane connecting a host and the iframe it embeds.
pub fn frame_link() -> (HostEndpoint, AgentEndpoint) {
    let (to_agent, from_host) = mpsc::unbounded_channel();
    let (to_host, from_agent) = mpsc::unbounded_channel();
    (
        HostEndpoint { to_agent, from_agent },
        AgentEndpoint { to_host, from_host },
    )
}

impl HostEndpoint {
    /// Post a plain value on the broadcast lane.
    pub fn post(&self, value: Value) -> Result<()> {
        self.post_message(BusMessage::data(value))
    }

    pub fn post_message(&self, message: BusMessage) -> Result<()> {
        self.to_agent
            .send(message)
            .map_err(|_| VeditError::ChannelClosed("broadcast lane"))
    }

    pub async fn recv(&mut self) -> Option<BusMessage> {
        self.from_agent.recv().await
    }

    pub fn try_recv(&mut self) -> Option<BusMessage> {
        self.from_agent.try_recv().ok()
    }
}

impl AgentEndpoint {
    pub fn post(&self, value: Value) -> Result<()> {
        self.to_host
            .send(BusMessage::data(value))
            .map_err(|_| VeditError::ChannelClosed("broadcast lane"))
    }

    pub async fn recv(&mut self) -> Option<BusMessage> {
        self.from_host.recv().await
    }
}
