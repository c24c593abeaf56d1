//! Observable state changes.
//!
//! Everything a front-end needs to redraw is published on an [`EventBus`].
//! Publishing never fails: with no subscriber the event is simply dropped.

use serde::Serialize;
use tokio::sync::broadcast;

use peerchat_shared::types::{FileId, PeerId};

const EVENT_BUS_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ChatEvent {
    DeviceJoined { peer: PeerId, name: String },
    DeviceRenamed { peer: PeerId, name: String },
    DeviceOffline { peer: PeerId },
    DeviceRemoved { peer: PeerId },
    MessageReceived { peer: PeerId, preview: String },
    TransferUpdated { peer: PeerId, file_id: FileId, status: String },
    SelectionChanged { peer: Option<PeerId> },
    /// The local device adopted a new name, by rename or by advice.
    LocalNameChanged { name: String },
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ChatEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: ChatEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("No event subscribers");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
