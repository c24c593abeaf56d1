//! The transport primitive rooms are built on.
//!
//! A transport joins a room named by an application scope, a shared secret
//! and a topic, then reports peers joining and leaving plus raw payloads on
//! named channels. It knows nothing about what the payloads mean.

use tokio::sync::mpsc;

use peerchat_shared::types::PeerId;

use crate::error::NetError;

/// Identifies one room on a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinConfig {
    /// Application scope, e.g. `p2p-chat:<login>`.
    pub app_scope: String,
    /// Shared secret; peers with a different secret never meet.
    pub secret: String,
    /// Room topic inside the scope.
    pub topic: String,
}

/// Handle of one outbound payload, echoed back in [`TransportEvent::SendProgress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SendTicket(pub u64);

/// A payload handed to the transport.
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    /// Channel the payload belongs to.
    pub channel: String,
    /// Encoded payload.
    pub data: Vec<u8>,
    /// `None` broadcasts to every peer in the room.
    pub target: Option<PeerId>,
    /// Opaque metadata delivered alongside the payload and its progress ticks.
    pub metadata: Option<Vec<u8>>,
}

/// Everything a transport reports back, in arrival order.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A peer entered the room.
    PeerJoined(PeerId),
    /// A peer left the room or became unreachable.
    PeerLeft(PeerId),
    /// A complete payload arrived.
    Payload {
        channel: String,
        peer: PeerId,
        data: Vec<u8>,
        metadata: Option<Vec<u8>>,
    },
    /// Part of a payload arrived; `fraction` runs from 0.0 to 1.0.
    Progress {
        channel: String,
        peer: PeerId,
        fraction: f32,
        metadata: Option<Vec<u8>>,
    },
    /// Part of a local payload went out; `done` is set on the last tick.
    SendProgress {
        ticket: SendTicket,
        fraction: f32,
        done: bool,
    },
    /// A local payload could not be delivered; no further ticks follow.
    SendFailed { ticket: SendTicket, reason: String },
}

/// A joined room. Dropping or leaving it stops all further events.
pub trait TransportSession {
    /// Queue a payload for delivery. Returns the ticket its progress is
    /// reported under.
    fn send(&self, frame: OutboundFrame) -> Result<SendTicket, NetError>;

    /// Leave the room. Calling it more than once is harmless.
    fn leave(&self);
}

pub trait Transport {
    /// Join a room. Returns immediately; peers and payloads show up later on
    /// the returned receiver.
    fn join(
        &self,
        config: &JoinConfig,
    ) -> Result<
        (
            Box<dyn TransportSession>,
            mpsc::UnboundedReceiver<TransportEvent>,
        ),
        NetError,
    >;
}
