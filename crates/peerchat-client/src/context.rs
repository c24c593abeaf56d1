use std::io;
use std::rc::{Rc, Weak};

use tokio::sync::mpsc;

use peerchat_net::ChannelSet;
use peerchat_shared::types::{FileId, PeerId};

use crate::events::EventBus;

/// Work finished off the event loop, fed back into it.
#[derive(Debug)]
pub(crate) enum LocalEvent {
    SourceLoaded {
        peer: PeerId,
        file_id: FileId,
        result: io::Result<Vec<u8>>,
    },
}

/// What devices and transfers need from their room. The channel set is held
/// weakly: a transfer never keeps a closed session alive.
#[derive(Clone)]
pub(crate) struct SessionContext {
    pub channels: Weak<ChannelSet>,
    pub local: mpsc::UnboundedSender<LocalEvent>,
    pub events: EventBus,
}

impl SessionContext {
    pub fn channels(&self) -> Option<Rc<ChannelSet>> {
        self.channels.upgrade()
    }
}
