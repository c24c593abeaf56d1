//! Wire envelope for the libp2p transport.
//!
//! A payload larger than one chunk is split into numbered frames that share a
//! message number. The receiver reassembles them per (peer, message) and
//! reports progress for every chunk before the complete payload.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use peerchat_shared::constants::{CHUNK_SIZE, MAX_FILE_SIZE};
use peerchat_shared::error::ProtocolError;
use peerchat_shared::types::PeerId;

use crate::transport::TransportEvent;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Frame {
    pub channel: String,
    /// Addressed peer; `None` for broadcast.
    pub target: Option<String>,
    pub metadata: Option<Vec<u8>>,
    /// Sender-local message number shared by all chunks of one payload.
    pub message: u64,
    pub index: u32,
    pub total: u32,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        let frame: Self = bincode::deserialize(data)?;
        frame.validate()?;
        Ok(frame)
    }

    /// Bounds a peer-supplied frame must respect before it is buffered.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.total == 0 || self.total > max_chunks() {
            return Err(ProtocolError::invalid("frame.total", self.total.to_string()));
        }
        if self.index >= self.total {
            return Err(ProtocolError::invalid(
                "frame.index",
                format!("{} of {}", self.index, self.total),
            ));
        }
        if self.data.len() > CHUNK_SIZE {
            return Err(ProtocolError::invalid("frame.data", format!("{} bytes", self.data.len())));
        }
        Ok(())
    }

    /// Whether the local peer should see this frame.
    pub fn is_for(&self, local: &str) -> bool {
        self.target.as_deref().map_or(true, |target| target == local)
    }
}

/// Half-received payloads kept per peer; the oldest is dropped beyond this.
pub const MAX_PENDING_PER_PEER: usize = 4;

pub fn chunk_count(len: usize) -> u32 {
    len.div_ceil(CHUNK_SIZE).max(1) as u32
}

/// Largest chunk count a payload can legitimately need.
pub fn max_chunks() -> u32 {
    MAX_FILE_SIZE.div_ceil(CHUNK_SIZE as u64) as u32 + 1
}

/// Split one payload into frames of at most [`CHUNK_SIZE`] bytes. An empty
/// payload still yields one frame.
pub fn split(
    channel: &str,
    target: Option<&PeerId>,
    metadata: Option<Vec<u8>>,
    message: u64,
    data: &[u8],
) -> Vec<Frame> {
    let total = chunk_count(data.len());
    let frame = |index: u32, chunk: &[u8]| Frame {
        channel: channel.to_string(),
        target: target.map(|peer| peer.as_str().to_string()),
        metadata: metadata.clone(),
        message,
        index,
        total,
        data: chunk.to_vec(),
    };
    if data.is_empty() {
        return vec![frame(0, &[])];
    }
    data.chunks(CHUNK_SIZE)
        .enumerate()
        .map(|(index, chunk)| frame(index as u32, chunk))
        .collect()
}

struct Partial {
    total: u32,
    chunks: BTreeMap<u32, Vec<u8>>,
}

#[derive(Default)]
pub struct Reassembler {
    partial: HashMap<(PeerId, u64), Partial>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one frame from `peer`. Returns the events it completes: a
    /// progress tick for multi-chunk payloads, and the payload itself once
    /// every chunk is in.
    pub fn push(&mut self, peer: &PeerId, frame: Frame) -> Vec<TransportEvent> {
        if let Err(e) = frame.validate() {
            warn!(peer = %peer, message = frame.message, error = %e, "Dropping malformed frame");
            return Vec::new();
        }
        if frame.total == 1 {
            return vec![TransportEvent::Payload {
                channel: frame.channel,
                peer: peer.clone(),
                data: frame.data,
                metadata: frame.metadata,
            }];
        }

        let key = (peer.clone(), frame.message);
        if !self.partial.contains_key(&key) {
            self.evict_oldest(peer);
        }
        let partial = self.partial.entry(key.clone()).or_insert_with(|| Partial {
            total: frame.total,
            chunks: BTreeMap::new(),
        });
        if partial.total != frame.total {
            warn!(peer = %peer, message = frame.message, "Chunk count changed mid-message");
            return Vec::new();
        }
        if partial.chunks.contains_key(&frame.index) {
            debug!(peer = %peer, message = frame.message, index = frame.index, "Duplicate chunk");
            return Vec::new();
        }
        partial.chunks.insert(frame.index, frame.data);
        let received = partial.chunks.len() as u32;

        let mut events = vec![TransportEvent::Progress {
            channel: frame.channel.clone(),
            peer: peer.clone(),
            fraction: received as f32 / partial.total as f32,
            metadata: frame.metadata.clone(),
        }];

        if received == partial.total {
            if let Some(done) = self.partial.remove(&key) {
                let data = done.chunks.into_values().flatten().collect();
                events.push(TransportEvent::Payload {
                    channel: frame.channel,
                    peer: peer.clone(),
                    data,
                    metadata: frame.metadata,
                });
            }
        }
        events
    }

    /// Make room for one more half-received payload from `peer` by dropping
    /// its lowest-numbered ones.
    fn evict_oldest(&mut self, peer: &PeerId) {
        loop {
            let pending = self.partial.keys().filter(|(from, _)| from == peer);
            let count = pending.clone().count();
            if count < MAX_PENDING_PER_PEER {
                return;
            }
            let Some(oldest) = pending.map(|(_, message)| *message).min() else {
                return;
            };
            warn!(peer = %peer, message = oldest, "Dropping incomplete payload");
            self.partial.remove(&(peer.clone(), oldest));
        }
    }

    /// Drop half-received payloads of a peer that went away.
    pub fn forget_peer(&mut self, peer: &PeerId) {
        self.partial.retain(|(from, _), _| from != peer);
    }

    pub fn pending(&self) -> usize {
        self.partial.len()
    }
}
