//! In-process transport.
//!
//! Every session joined through the same [`MemoryHub`] with the same scope,
//! secret and topic shares a room. Delivery is immediate and ordered; large
//! payloads are still reported in chunks so progress listeners see the same
//! shape of events as over the network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, info};

use peerchat_shared::crypto::derive_room_topic;
use peerchat_shared::types::PeerId;

use crate::error::NetError;
use crate::framing::chunk_count;
use crate::transport::{
    JoinConfig, OutboundFrame, SendTicket, Transport, TransportEvent, TransportSession,
};

struct Member {
    peer: PeerId,
    events: mpsc::UnboundedSender<TransportEvent>,
}

#[derive(Default)]
struct HubState {
    next_peer: u64,
    rooms: HashMap<String, Vec<Member>>,
}

#[derive(Clone, Default)]
pub struct MemoryHub {
    state: Arc<Mutex<HubState>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join under a chosen peer id instead of a generated one.
    pub fn join_as(
        &self,
        config: &JoinConfig,
        peer: PeerId,
    ) -> Result<(MemorySession, mpsc::UnboundedReceiver<TransportEvent>), NetError> {
        let room = derive_room_topic(&config.app_scope, &config.secret, &config.topic);
        let (tx, rx) = mpsc::unbounded_channel();

        let mut state = self
            .state
            .lock()
            .map_err(|e| NetError::Transport(format!("Lock poisoned: {e}")))?;
        let members = state.rooms.entry(room.clone()).or_default();
        if members.iter().any(|member| member.peer == peer) {
            return Err(NetError::Transport(format!("Peer {peer} already joined")));
        }
        for member in members.iter() {
            let _ = member.events.send(TransportEvent::PeerJoined(peer.clone()));
            let _ = tx.send(TransportEvent::PeerJoined(member.peer.clone()));
        }
        members.push(Member {
            peer: peer.clone(),
            events: tx.clone(),
        });
        info!(peer = %peer, members = members.len(), "Joined memory room");

        Ok((
            MemorySession {
                hub: self.clone(),
                room,
                peer,
                events: tx,
                closed: AtomicBool::new(false),
                next_ticket: AtomicU64::new(0),
            },
            rx,
        ))
    }

    /// Number of sessions currently in the room for `config`.
    pub fn member_count(&self, config: &JoinConfig) -> usize {
        let room = derive_room_topic(&config.app_scope, &config.secret, &config.topic);
        match self.state.lock() {
            Ok(state) => state.rooms.get(&room).map_or(0, Vec::len),
            Err(_) => 0,
        }
    }
}

impl Transport for MemoryHub {
    fn join(
        &self,
        config: &JoinConfig,
    ) -> Result<
        (
            Box<dyn TransportSession>,
            mpsc::UnboundedReceiver<TransportEvent>,
        ),
        NetError,
    > {
        let peer = {
            let mut state = self
                .state
                .lock()
                .map_err(|e| NetError::Transport(format!("Lock poisoned: {e}")))?;
            state.next_peer += 1;
            PeerId::new(format!("peer-{}", state.next_peer))
        };
        let (session, events) = self.join_as(config, peer)?;
        Ok((Box::new(session), events))
    }
}

pub struct MemorySession {
    hub: MemoryHub,
    room: String,
    peer: PeerId,
    /// Own event queue, for send progress.
    events: mpsc::UnboundedSender<TransportEvent>,
    closed: AtomicBool,
    next_ticket: AtomicU64,
}

impl MemorySession {
    pub fn peer_id(&self) -> &PeerId {
        &self.peer
    }
}

impl TransportSession for MemorySession {
    fn send(&self, frame: OutboundFrame) -> Result<SendTicket, NetError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(NetError::SessionClosed);
        }
        let state = self
            .hub
            .state
            .lock()
            .map_err(|e| NetError::Transport(format!("Lock poisoned: {e}")))?;
        let members = state.rooms.get(&self.room).map(Vec::as_slice).unwrap_or(&[]);

        let recipients: Vec<&Member> = members
            .iter()
            .filter(|member| member.peer != self.peer)
            .filter(|member| frame.target.as_ref().map_or(true, |target| *target == member.peer))
            .collect();
        if let Some(target) = &frame.target {
            if recipients.is_empty() {
                return Err(NetError::PeerUnavailable(target.clone()));
            }
        }

        let ticket = SendTicket(self.next_ticket.fetch_add(1, Ordering::SeqCst));
        let chunks = chunk_count(frame.data.len());
        debug!(
            peer = %self.peer,
            channel = %frame.channel,
            recipients = recipients.len(),
            chunks,
            "Memory send"
        );

        for member in &recipients {
            if chunks > 1 {
                for index in 1..=chunks {
                    let _ = member.events.send(TransportEvent::Progress {
                        channel: frame.channel.clone(),
                        peer: self.peer.clone(),
                        fraction: index as f32 / chunks as f32,
                        metadata: frame.metadata.clone(),
                    });
                }
            }
            let _ = member.events.send(TransportEvent::Payload {
                channel: frame.channel.clone(),
                peer: self.peer.clone(),
                data: frame.data.clone(),
                metadata: frame.metadata.clone(),
            });
        }

        for index in 1..=chunks {
            let _ = self.events.send(TransportEvent::SendProgress {
                ticket,
                fraction: index as f32 / chunks as f32,
                done: index == chunks,
            });
        }

        Ok(ticket)
    }

    fn leave(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut state = match self.hub.state.lock() {
            Ok(state) => state,
            Err(_) => return,
        };
        if let Some(members) = state.rooms.get_mut(&self.room) {
            members.retain(|member| member.peer != self.peer);
            for member in members.iter() {
                let _ = member.events.send(TransportEvent::PeerLeft(self.peer.clone()));
            }
            if members.is_empty() {
                state.rooms.remove(&self.room);
            }
        }
        info!(peer = %self.peer, "Left memory room");
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.leave();
    }
}
