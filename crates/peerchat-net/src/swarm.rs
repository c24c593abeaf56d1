//! libp2p room transport with the tokio mpsc command/event pattern.
//!
//! Joining spawns a swarm event loop in a dedicated tokio task. The session
//! handle talks to it through a command channel and the loop reports back on
//! the room's event channel. Every frame published on the room topic is
//! encrypted with a key derived from the join parameters, so peers that only
//! share the (public) topic name learn nothing.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures::StreamExt;
use libp2p::{
    gossipsub, identify, identity::Keypair, kad, swarm::SwarmEvent, Multiaddr, Swarm,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use peerchat_shared::constants::DEFAULT_QUIC_PORT;
use peerchat_shared::crypto::{decrypt, derive_room_key, derive_room_topic, encrypt, SymmetricKey};
use peerchat_shared::types::PeerId;

use crate::behaviour::{build_swarm, RoomBehaviour, RoomEvent};
use crate::discovery::{extract_peer_id, load_bootstrap_peers};
use crate::error::NetError;
use crate::framing::{split, Frame, Reassembler};
use crate::peers::PeerTracker;
use crate::transport::{
    JoinConfig, OutboundFrame, SendTicket, Transport, TransportEvent, TransportSession,
};

/// Commands sent *into* the swarm task.
#[derive(Debug)]
pub enum SwarmCommand {
    /// Publish the encrypted chunks of one payload, in order.
    Publish {
        ticket: SendTicket,
        chunks: Vec<Vec<u8>>,
    },
    /// Dial a remote peer at the given multiaddr.
    Dial(Multiaddr),
    /// Unsubscribe and stop the loop.
    Leave,
}

/// Configuration for the swarm spawned on join.
#[derive(Debug, Clone)]
pub struct SwarmConfig {
    /// Path to the bootstrap peers file.
    pub bootstrap_peers_path: Option<PathBuf>,
    /// Port to listen on (defaults to `DEFAULT_QUIC_PORT`).
    pub listen_port: u16,
    /// Additional multiaddrs to dial on startup.
    pub extra_dials: Vec<Multiaddr>,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            bootstrap_peers_path: None,
            listen_port: DEFAULT_QUIC_PORT,
            extra_dials: Vec::new(),
        }
    }
}

pub struct SwarmTransport {
    keypair: Keypair,
    config: SwarmConfig,
}

impl SwarmTransport {
    pub fn new(keypair: Keypair, config: SwarmConfig) -> Self {
        Self { keypair, config }
    }

    /// Transport with a fresh ed25519 identity.
    pub fn generate(config: SwarmConfig) -> Self {
        Self::new(Keypair::generate_ed25519(), config)
    }

    pub fn local_peer_id(&self) -> PeerId {
        PeerId::new(self.keypair.public().to_peer_id().to_string())
    }

    fn start(&self, swarm: &mut Swarm<RoomBehaviour>) -> Result<(), NetError> {
        for addr in [
            format!("/ip4/0.0.0.0/udp/{}/quic-v1", self.config.listen_port),
            format!("/ip6/::/udp/{}/quic-v1", self.config.listen_port),
        ] {
            let addr: Multiaddr = addr
                .parse()
                .map_err(|e| NetError::Transport(format!("Listen address: {e}")))?;
            swarm
                .listen_on(addr)
                .map_err(|e| NetError::Transport(format!("Listen failed: {e}")))?;
        }

        info!(
            peer_id = %swarm.local_peer_id(),
            port = self.config.listen_port,
            "Swarm listening"
        );

        if let Some(ref path) = self.config.bootstrap_peers_path {
            let bootstrap_addrs = load_bootstrap_peers(path);
            for addr in &bootstrap_addrs {
                if let Err(e) = swarm.dial(addr.clone()) {
                    warn!(addr = %addr, error = %e, "Failed to dial bootstrap peer");
                } else {
                    if let Some(peer_id) = extract_peer_id(addr) {
                        swarm
                            .behaviour_mut()
                            .kademlia
                            .add_address(&peer_id, addr.clone());
                    }
                    debug!(addr = %addr, "Dialing bootstrap peer");
                }
            }

            if !bootstrap_addrs.is_empty() {
                if let Err(e) = swarm.behaviour_mut().kademlia.bootstrap() {
                    warn!(error = %e, "Kademlia bootstrap failed to start");
                }
            }
        }

        for addr in &self.config.extra_dials {
            if let Err(e) = swarm.dial(addr.clone()) {
                warn!(addr = %addr, error = %e, "Failed to dial extra address");
            }
        }

        Ok(())
    }
}

impl Transport for SwarmTransport {
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
        let handle = tokio::runtime::Handle::try_current().map_err(|_| NetError::NoRuntime)?;
        let _guard = handle.enter();

        let mut swarm = build_swarm(self.keypair.clone())
            .map_err(|e| NetError::Transport(format!("Swarm build failed: {e}")))?;
        self.start(&mut swarm)?;

        let topic = gossipsub::IdentTopic::new(derive_room_topic(
            &config.app_scope,
            &config.secret,
            &config.topic,
        ));
        swarm
            .behaviour_mut()
            .gossipsub
            .subscribe(&topic)
            .map_err(|e| NetError::Transport(format!("Subscribe failed: {e}")))?;

        let key = derive_room_key(&config.app_scope, &config.secret, &config.topic);
        let local = swarm.local_peer_id().to_string();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let room_loop = RoomLoop {
            swarm,
            topic,
            key,
            local: local.clone(),
            tracker: PeerTracker::new(),
            reassembler: Reassembler::new(),
            events: event_tx,
        };
        handle.spawn(room_loop.run(cmd_rx));

        Ok((
            Box::new(SwarmSession {
                commands: cmd_tx,
                key,
                local: PeerId::new(local),
                next_message: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
            event_rx,
        ))
    }
}

pub struct SwarmSession {
    commands: mpsc::UnboundedSender<SwarmCommand>,
    key: SymmetricKey,
    local: PeerId,
    next_message: AtomicU64,
    closed: AtomicBool,
}

impl SwarmSession {
    pub fn local_peer_id(&self) -> &PeerId {
        &self.local
    }

    pub fn dial(&self, addr: Multiaddr) -> Result<(), NetError> {
        self.commands
            .send(SwarmCommand::Dial(addr))
            .map_err(|_| NetError::SessionClosed)
    }
}

impl TransportSession for SwarmSession {
    fn send(&self, frame: OutboundFrame) -> Result<SendTicket, NetError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(NetError::SessionClosed);
        }
        let message = self.next_message.fetch_add(1, Ordering::SeqCst);
        let ticket = SendTicket(message);

        let chunks = split(
            &frame.channel,
            frame.target.as_ref(),
            frame.metadata,
            message,
            &frame.data,
        )
        .iter()
        .map(|chunk| Ok(encrypt(&self.key, &chunk.to_bytes()?)?))
        .collect::<Result<Vec<_>, NetError>>()?;

        self.commands
            .send(SwarmCommand::Publish { ticket, chunks })
            .map_err(|_| NetError::SessionClosed)?;
        Ok(ticket)
    }

    fn leave(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.commands.send(SwarmCommand::Leave);
        }
    }
}

impl Drop for SwarmSession {
    fn drop(&mut self) {
        self.leave();
    }
}

struct RoomLoop {
    swarm: Swarm<RoomBehaviour>,
    topic: gossipsub::IdentTopic,
    key: SymmetricKey,
    local: String,
    tracker: PeerTracker,
    reassembler: Reassembler,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl RoomLoop {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<SwarmCommand>) {
        loop {
            tokio::select! {
                cmd = commands.recv() => {
                    match cmd {
                        Some(SwarmCommand::Publish { ticket, chunks }) => self.publish(ticket, chunks),
                        Some(SwarmCommand::Dial(addr)) => {
                            if let Err(e) = self.swarm.dial(addr.clone()) {
                                error!(addr = %addr, error = %e, "Dial failed");
                            }
                        }
                        Some(SwarmCommand::Leave) | None => {
                            info!("Leaving room, shutting down swarm");
                            let _ = self.swarm.behaviour_mut().gossipsub.unsubscribe(&self.topic);
                            break;
                        }
                    }
                }

                event = self.swarm.select_next_some() => self.on_swarm_event(event),
            }
        }

        info!("Swarm event loop terminated");
    }

    fn publish(&mut self, ticket: SendTicket, chunks: Vec<Vec<u8>>) {
        let total = chunks.len();
        for (index, chunk) in chunks.into_iter().enumerate() {
            if let Err(e) = self
                .swarm
                .behaviour_mut()
                .gossipsub
                .publish(self.topic.clone(), chunk)
            {
                error!(ticket = ticket.0, index, error = %e, "Publish failed");
                self.emit(TransportEvent::SendFailed {
                    ticket,
                    reason: e.to_string(),
                });
                return;
            }
            let _ = self.events.send(TransportEvent::SendProgress {
                ticket,
                fraction: (index + 1) as f32 / total as f32,
                done: index + 1 == total,
            });
        }
    }

    fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    fn on_swarm_event(&mut self, event: SwarmEvent<RoomEvent>) {
        match event {
            SwarmEvent::Behaviour(RoomEvent::Gossipsub(gossipsub::Event::Message {
                message, ..
            })) => {
                if message.topic != self.topic.hash() {
                    return;
                }
                let Some(source) = message.source else {
                    debug!("Dropping unsigned room message");
                    return;
                };
                self.on_room_message(&source, &message.data);
            }

            SwarmEvent::Behaviour(RoomEvent::Gossipsub(gossipsub::Event::Subscribed {
                peer_id,
                topic,
            })) => {
                if topic == self.topic.hash() && self.tracker.on_subscribed(peer_id) {
                    self.emit(TransportEvent::PeerJoined(PeerId::new(peer_id.to_string())));
                }
            }

            SwarmEvent::Behaviour(RoomEvent::Gossipsub(gossipsub::Event::Unsubscribed {
                peer_id,
                topic,
            })) => {
                if topic == self.topic.hash() && self.tracker.on_unsubscribed(&peer_id) {
                    self.peer_gone(&peer_id);
                }
            }

            SwarmEvent::Behaviour(RoomEvent::Kademlia(kad::Event::OutboundQueryProgressed {
                result,
                ..
            })) => {
                debug!(result = ?result, "Kademlia query progressed");
            }

            SwarmEvent::Behaviour(RoomEvent::Identify(identify::Event::Received {
                peer_id,
                info,
                ..
            })) => {
                debug!(
                    peer = %peer_id,
                    protocol = ?info.protocol_version,
                    "Identify: received info from peer"
                );
                for addr in &info.listen_addrs {
                    self.swarm
                        .behaviour_mut()
                        .kademlia
                        .add_address(&peer_id, addr.clone());
                }
            }

            SwarmEvent::ConnectionEstablished {
                peer_id, endpoint, ..
            } => {
                let addr = endpoint.get_remote_address().clone();
                info!(peer = %peer_id, addr = %addr, "Peer connected");
                self.tracker.on_connected(peer_id, addr);
            }

            SwarmEvent::ConnectionClosed {
                peer_id,
                num_established,
                ..
            } => {
                if num_established == 0 {
                    info!(peer = %peer_id, "Peer disconnected");
                    if self.tracker.on_disconnected(&peer_id) {
                        self.peer_gone(&peer_id);
                    }
                }
            }

            SwarmEvent::NewListenAddr { address, .. } => {
                info!(addr = %address, "Listening on new address");
            }

            SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                warn!(peer = ?peer_id, error = %error, "Outgoing connection error");
            }

            SwarmEvent::IncomingConnectionError { error, .. } => {
                warn!(error = %error, "Incoming connection error");
            }

            _ => {}
        }
    }

    fn peer_gone(&mut self, peer_id: &libp2p::PeerId) {
        let peer = PeerId::new(peer_id.to_string());
        self.reassembler.forget_peer(&peer);
        self.emit(TransportEvent::PeerLeft(peer));
    }

    fn on_room_message(&mut self, source: &libp2p::PeerId, data: &[u8]) {
        let plaintext = match decrypt(&self.key, data) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                warn!(peer = %source, error = %e, "Dropping undecryptable room message");
                return;
            }
        };
        let frame = match Frame::from_bytes(&plaintext) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(peer = %source, error = %e, "Dropping malformed frame");
                return;
            }
        };
        if !frame.is_for(&self.local) {
            return;
        }

        // gossipsub may deliver frames before the subscription notice
        if self.tracker.on_subscribed(*source) {
            self.emit(TransportEvent::PeerJoined(PeerId::new(source.to_string())));
        }

        let peer = PeerId::new(source.to_string());
        for event in self.reassembler.push(&peer, frame) {
            self.emit(event);
        }
    }
}
