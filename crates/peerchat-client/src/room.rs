//! Room coordinator.
//!
//! Owns the room session and one [`Device`] per peer. Creates devices when
//! peers join, settles display-name collisions, archives devices when peers
//! leave and tracks which device is selected.
//!
//! All state changes happen on the task that calls [`Room::next_event`] or
//! [`Room::drain`], one event at a time.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use peerchat_net::{JoinConfig, RoomSession, Subscription, Transport, TransportEvent};
use peerchat_shared::constants::ROOM_TOPIC;
use peerchat_shared::protocol::{validate_device_name, Advice, DeviceName};
use peerchat_shared::types::PeerId;
use peerchat_shared::Credentials;

use crate::context::{LocalEvent, SessionContext};
use crate::device::Device;
use crate::error::{ClientError, Result};
use crate::events::{ChatEvent, EventBus};

struct RoomState {
    local_name: String,
    devices: Vec<Device>,
    selected: Option<PeerId>,
    context: SessionContext,
}

impl RoomState {
    fn device(&self, peer: &PeerId) -> Option<Device> {
        self.devices.iter().find(|d| d.peer() == *peer).cloned()
    }
}

pub struct Room {
    session: RoomSession,
    state: Rc<RefCell<RoomState>>,
    events: EventBus,
    transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    local_rx: mpsc::UnboundedReceiver<LocalEvent>,
    subscriptions: Vec<Subscription>,
    closed: bool,
}

impl Room {
    /// Join the room of `credentials`: scope `p2p-chat:<login>`, the password
    /// hash as shared secret, and the common room topic.
    pub fn open(transport: &dyn Transport, credentials: &Credentials, events: EventBus) -> Result<Self> {
        let config = JoinConfig {
            app_scope: credentials.app_scope(),
            secret: credentials.hash.clone(),
            topic: ROOM_TOPIC.to_string(),
        };
        Self::open_with(transport, config, credentials.device_name.clone(), events)
    }

    pub fn open_with(
        transport: &dyn Transport,
        config: JoinConfig,
        local_name: String,
        events: EventBus,
    ) -> Result<Self> {
        validate_device_name(&local_name)?;
        let (session, transport_rx) = RoomSession::open(transport, config)?;
        let (local_tx, local_rx) = mpsc::unbounded_channel();
        let context = SessionContext {
            channels: Rc::downgrade(session.channels()),
            local: local_tx,
            events: events.clone(),
        };
        let state = Rc::new(RefCell::new(RoomState {
            local_name,
            devices: Vec::new(),
            selected: None,
            context,
        }));

        let weak = Rc::downgrade(&state);
        let joins = session.on_peer_join(move |peer| {
            if let Some(state) = weak.upgrade() {
                peer_joined(&state, peer);
            }
        });
        let weak = Rc::downgrade(&state);
        let leaves = session.on_peer_leave(move |peer| {
            if let Some(state) = weak.upgrade() {
                peer_left(&state, peer);
            }
        });
        let weak = Rc::downgrade(&state);
        let advice = session.channels().advice.on_receive(
            move |advice, from| {
                if let Some(state) = weak.upgrade() {
                    advice_received(&state, advice, from);
                }
            },
            None,
        );

        Ok(Self {
            session,
            state,
            events,
            transport_rx,
            local_rx,
            subscriptions: vec![joins, leaves, advice],
            closed: false,
        })
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn local_name(&self) -> String {
        self.state.borrow().local_name.clone()
    }

    /// Devices in join order, archived ones included.
    pub fn devices(&self) -> Vec<Device> {
        self.state.borrow().devices.clone()
    }

    pub fn device(&self, peer: &PeerId) -> Option<Device> {
        self.state.borrow().device(peer)
    }

    pub fn selected(&self) -> Option<Device> {
        let state = self.state.borrow();
        state.selected.as_ref().and_then(|peer| state.device(peer))
    }

    /// Select `peer`'s device, or clear the selection with `None`.
    pub fn select(&self, peer: Option<&PeerId>) -> Result<()> {
        let target = match peer {
            Some(peer) => Some(
                self.device(peer)
                    .ok_or_else(|| ClientError::UnknownDevice(peer.to_string()))?,
            ),
            None => None,
        };

        let previous = self.selected();
        if let Some(previous) = &previous {
            previous.set_selected(false);
        }
        if let Some(device) = &target {
            device.set_selected(true);
        }
        self.state.borrow_mut().selected = target.as_ref().map(Device::peer);
        self.events.emit(ChatEvent::SelectionChanged {
            peer: target.map(|d| d.peer()),
        });
        Ok(())
    }

    /// Rename the local device and announce the new name to every peer.
    pub fn rename(&self, name: &str) -> Result<()> {
        let name = name.trim();
        validate_device_name(name)?;
        adopt_local_name(&self.state, name);
        Ok(())
    }

    /// Handle the next transport or local event. Returns `false` once the
    /// transport stopped reporting.
    pub async fn next_event(&mut self) -> bool {
        tokio::select! {
            event = self.transport_rx.recv() => match event {
                Some(event) => {
                    self.session.dispatch(event);
                    true
                }
                None => false,
            },
            Some(event) = self.local_rx.recv() => {
                self.handle_local(event);
                true
            }
        }
    }

    /// Handle every event already queued, without waiting. Returns how many
    /// were handled.
    pub fn drain(&mut self) -> usize {
        let mut handled = 0;
        loop {
            if let Ok(event) = self.transport_rx.try_recv() {
                self.session.dispatch(event);
            } else if let Ok(event) = self.local_rx.try_recv() {
                self.handle_local(event);
            } else {
                return handled;
            }
            handled += 1;
        }
    }

    fn handle_local(&self, event: LocalEvent) {
        match event {
            LocalEvent::SourceLoaded {
                peer,
                file_id,
                result,
            } => match self.device(&peer).and_then(|d| d.transfer(file_id)) {
                Some(transfer) => transfer.on_source_loaded(result),
                None => debug!(peer = %peer, file_id = %file_id, "Source read for a removed transfer"),
            },
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Dispose every device, then leave the room. Calling it again does
    /// nothing.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.subscriptions.clear();

        let devices = {
            let mut state = self.state.borrow_mut();
            state.selected = None;
            std::mem::take(&mut state.devices)
        };
        for device in &devices {
            device.dispose();
        }
        self.session.close();
        info!(devices = devices.len(), "Room closed");
    }
}

impl Drop for Room {
    fn drop(&mut self) {
        self.close();
    }
}

fn placeholder_name(peer: &PeerId) -> String {
    format!("Peer {}", peer.short())
}

/// `name` if nobody in `taken` uses it, otherwise `"<name> (n)"` with the
/// smallest `n >= 1` that is free.
pub fn disambiguate(name: &str, taken: &[String]) -> String {
    if !taken.iter().any(|t| t == name) {
        return name.to_string();
    }
    (1..)
        .map(|n| format!("{name} ({n})"))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| name.to_string())
}

fn peer_joined(state: &Rc<RefCell<RoomState>>, peer: &PeerId) {
    let (existing, context, local_name) = {
        let s = state.borrow();
        (s.device(peer), s.context.clone(), s.local_name.clone())
    };

    if let Some(existing) = existing {
        if existing.is_online() {
            debug!(peer = %peer, "Duplicate join");
            return;
        }
        info!(peer = %peer, "Peer rejoined, replacing archived device");
        let was_selected = {
            let mut s = state.borrow_mut();
            s.devices.retain(|d| !d.same(&existing));
            let was_selected = s.selected.as_ref() == Some(peer);
            if was_selected {
                s.selected = None;
            }
            was_selected
        };
        existing.dispose();
        context.events.emit(ChatEvent::DeviceRemoved { peer: peer.clone() });
        if was_selected {
            context.events.emit(ChatEvent::SelectionChanged { peer: None });
        }
    }

    let Some(channels) = context.channels() else {
        return;
    };
    let name = placeholder_name(peer);
    let device = Device::new(peer.clone(), name.clone(), context.clone());

    if let Err(e) = channels.device_name.send(&DeviceName(local_name), Some(peer)) {
        warn!(peer = %peer, error = %e, "Failed to announce device name");
    }

    let weak: Weak<RefCell<RoomState>> = Rc::downgrade(state);
    device.hold(channels.device_name.on_receive(
        move |announced, from| {
            if let Some(state) = weak.upgrade() {
                name_announced(&state, from, &announced.0);
            }
        },
        Some(peer.clone()),
    ));
    device.attach();

    state.borrow_mut().devices.push(device);
    info!(peer = %peer, "Device joined");
    context.events.emit(ChatEvent::DeviceJoined {
        peer: peer.clone(),
        name,
    });
}

fn name_announced(state: &Rc<RefCell<RoomState>>, peer: &PeerId, announced: &str) {
    let (device, taken, context) = {
        let s = state.borrow();
        let taken: Vec<String> = s
            .devices
            .iter()
            .filter(|d| d.peer() != *peer)
            .map(Device::name)
            .collect();
        (s.device(peer), taken, s.context.clone())
    };
    let Some(device) = device else {
        return;
    };

    let name = disambiguate(announced, &taken);
    if device.name() != name {
        device.set_name(name.clone());
        context.events.emit(ChatEvent::DeviceRenamed {
            peer: peer.clone(),
            name: name.clone(),
        });
    }

    if name != announced {
        info!(peer = %peer, announced, advised = %name, "Name collision, advising rename");
        let Some(channels) = context.channels() else {
            return;
        };
        if let Err(e) = channels.advice.send(&Advice::Rename { name }, Some(peer)) {
            warn!(peer = %peer, error = %e, "Failed to send rename advice");
        }
    }
}

fn advice_received(state: &Rc<RefCell<RoomState>>, advice: &Advice, from: &PeerId) {
    match advice {
        Advice::Rename { name } => {
            if state.borrow().local_name == *name {
                debug!(peer = %from, name = %name, "Advice already applied");
                return;
            }
            info!(peer = %from, name = %name, "Adopting advised name");
            adopt_local_name(state, name);
        }
    }
}

fn adopt_local_name(state: &Rc<RefCell<RoomState>>, name: &str) {
    let context = {
        let mut s = state.borrow_mut();
        s.local_name = name.to_string();
        s.context.clone()
    };
    if let Some(channels) = context.channels() {
        if let Err(e) = channels.device_name.send(&DeviceName(name.to_string()), None) {
            warn!(error = %e, "Failed to announce device name");
        }
    }
    context.events.emit(ChatEvent::LocalNameChanged {
        name: name.to_string(),
    });
}

fn peer_left(state: &Rc<RefCell<RoomState>>, peer: &PeerId) {
    let device = state.borrow().device(peer);
    match device {
        Some(device) => device.go_offline(),
        None => debug!(peer = %peer, "Leave for unknown peer"),
    }
}
