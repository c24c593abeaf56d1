// Room sessions and typed peer channels on top of a pluggable transport.
//
// The transport only knows peers, named channels and raw bytes. Everything
// above it (per-peer routing, payload validation, send progress) lives here.

pub mod behaviour;
pub mod channels;
pub mod discovery;
pub mod error;
pub mod framing;
pub mod memory;
pub mod peers;
pub mod room;
pub mod router;
pub mod swarm;
pub mod transport;

#[cfg(test)]
mod testing;

pub use channels::{Channel, ChannelSet, FileChannel, SendProgress};
pub use discovery::load_bootstrap_peers;
pub use error::NetError;
pub use memory::{MemoryHub, MemorySession};
pub use peers::PeerTracker;
pub use room::RoomSession;
pub use router::{PeerEventRouter, Subscription};
pub use swarm::{SwarmConfig, SwarmTransport};
pub use transport::{JoinConfig, OutboundFrame, SendTicket, Transport, TransportEvent, TransportSession};
