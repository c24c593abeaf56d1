//! The fixed channel set declared on every room session.
//!
//! Each channel encodes outbound payloads, and on the way in decodes and
//! validates them before any listener sees them. Payloads that fail the shape
//! check are logged and dropped; the channel stays usable.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use bytes::Bytes;
use tracing::{debug, warn};

use peerchat_shared::protocol::{
    percent_from_fraction, Advice, ChannelName, DeviceName, FileRequest, Payload,
};
use peerchat_shared::types::{FileId, FileMetadata, PeerId};

use crate::error::NetError;
use crate::router::{PeerEventRouter, Subscription};
use crate::transport::{OutboundFrame, SendTicket, TransportSession};

/// One progress tick of a local outbound payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SendProgress {
    /// Whole percent, 0 ..= 100.
    pub percent: u8,
    /// Set on the last tick, once the whole payload went out.
    pub done: bool,
    /// Set instead of `done` when the transport gave up on the payload.
    pub failed: bool,
}

impl SendProgress {
    pub fn tick(percent: u8, done: bool) -> Self {
        Self {
            percent,
            done,
            failed: false,
        }
    }
}

type ProgressCallback = Rc<dyn Fn(SendProgress)>;

/// Shared handle on the joined transport session.
pub(crate) struct SessionLink {
    transport: Box<dyn TransportSession>,
    closed: Cell<bool>,
    outbound: RefCell<HashMap<SendTicket, ProgressCallback>>,
}

impl SessionLink {
    pub(crate) fn new(transport: Box<dyn TransportSession>) -> Self {
        Self {
            transport,
            closed: Cell::new(false),
            outbound: RefCell::new(HashMap::new()),
        }
    }

    pub(crate) fn send(&self, frame: OutboundFrame) -> Result<SendTicket, NetError> {
        if self.closed.get() {
            return Err(NetError::SessionClosed);
        }
        self.transport.send(frame)
    }

    fn track(&self, ticket: SendTicket, callback: ProgressCallback) {
        self.outbound.borrow_mut().insert(ticket, callback);
    }

    pub(crate) fn send_progress(&self, ticket: SendTicket, fraction: f32, done: bool) {
        let callback = if done {
            self.outbound.borrow_mut().remove(&ticket)
        } else {
            self.outbound.borrow().get(&ticket).cloned()
        };
        let Some(callback) = callback else {
            debug!(ticket = ticket.0, "Progress for an untracked send");
            return;
        };
        match percent_from_fraction(fraction) {
            Ok(percent) => callback(SendProgress::tick(percent, done)),
            Err(e) if done => {
                warn!(ticket = ticket.0, error = %e, "Invalid final send progress");
                callback(SendProgress::tick(100, done))
            }
            Err(e) => warn!(ticket = ticket.0, error = %e, "Dropping invalid send progress"),
        }
    }

    pub(crate) fn send_failed(&self, ticket: SendTicket, reason: &str) {
        let Some(callback) = self.outbound.borrow_mut().remove(&ticket) else {
            debug!(ticket = ticket.0, "Failure for an untracked send");
            return;
        };
        warn!(ticket = ticket.0, reason, "Outbound payload failed");
        callback(SendProgress {
            percent: 0,
            done: false,
            failed: true,
        })
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.get()
    }

    pub(crate) fn close(&self) {
        if !self.closed.replace(true) {
            self.outbound.borrow_mut().clear();
            self.transport.leave();
        }
    }
}

/// A named channel carrying payloads of type `T`.
pub struct Channel<T> {
    name: ChannelName,
    link: Rc<SessionLink>,
    router: PeerEventRouter<T>,
}

impl<T: Payload + 'static> Channel<T> {
    fn declare(name: ChannelName, link: &Rc<SessionLink>) -> Self {
        Self {
            name,
            link: link.clone(),
            router: PeerEventRouter::new(),
        }
    }

    pub fn name(&self) -> ChannelName {
        self.name
    }

    /// Send `payload` to `target`, or to every peer when `target` is `None`.
    pub fn send(&self, payload: &T, target: Option<&PeerId>) -> Result<SendTicket, NetError> {
        let data = payload.to_bytes()?;
        self.link.send(OutboundFrame {
            channel: self.name.as_str().to_string(),
            data,
            target: target.cloned(),
            metadata: None,
        })
    }

    /// Listen for payloads from `peer`, or from every peer when `None`.
    pub fn on_receive<F>(&self, listener: F, peer: Option<PeerId>) -> Subscription
    where
        F: Fn(&T, &PeerId) + 'static,
    {
        self.router
            .register(move |payload, from, _| listener(payload, from), peer)
    }

    fn deliver(&self, peer: &PeerId, data: &[u8]) {
        match T::from_bytes(data) {
            Ok(payload) => self.router.dispatch(&payload, peer, None),
            Err(e) => warn!(
                channel = %self.name,
                peer = %peer,
                error = %e,
                "Dropping malformed payload"
            ),
        }
    }
}

/// The file-bytes channel and its companion progress stream.
///
/// Every payload and progress tick carries the [`FileMetadata`] of the
/// transfer it belongs to.
pub struct FileChannel {
    link: Rc<SessionLink>,
    bytes: PeerEventRouter<Bytes, FileMetadata>,
    progress: PeerEventRouter<u8, FileMetadata>,
}

impl FileChannel {
    fn declare(link: &Rc<SessionLink>) -> Self {
        Self {
            link: link.clone(),
            bytes: PeerEventRouter::new(),
            progress: PeerEventRouter::new(),
        }
    }

    /// Send the content of `file` to `target`. `on_progress` is called for
    /// every outbound tick until the one flagged `done`.
    pub fn send<F>(
        &self,
        content: Vec<u8>,
        file: &FileMetadata,
        target: &PeerId,
        on_progress: F,
    ) -> Result<SendTicket, NetError>
    where
        F: Fn(SendProgress) + 'static,
    {
        let ticket = self.link.send(OutboundFrame {
            channel: ChannelName::File.as_str().to_string(),
            data: content,
            target: Some(target.clone()),
            metadata: Some(file.to_bytes()?),
        })?;
        self.link.track(ticket, Rc::new(on_progress));
        Ok(ticket)
    }

    /// Listen for the complete content of file `id` from `peer`.
    pub fn on_receive<F>(&self, listener: F, peer: PeerId, id: FileId) -> Subscription
    where
        F: Fn(&Bytes, &FileMetadata) + 'static,
    {
        self.bytes.register(
            move |content, _, file| {
                if let Some(file) = file.filter(|file| file.id == id) {
                    listener(content, file);
                }
            },
            Some(peer),
        )
    }

    /// Listen for inbound progress (whole percent) of file `id` from `peer`.
    pub fn on_progress<F>(&self, listener: F, peer: PeerId, id: FileId) -> Subscription
    where
        F: Fn(u8, &FileMetadata) + 'static,
    {
        self.progress.register(
            move |percent, _, file| {
                if let Some(file) = file.filter(|file| file.id == id) {
                    listener(*percent, file);
                }
            },
            Some(peer),
        )
    }

    fn deliver(&self, peer: &PeerId, data: Vec<u8>, metadata: Option<&[u8]>) {
        let Some(file) = decode_file_metadata(peer, metadata) else {
            return;
        };
        self.bytes.dispatch(&Bytes::from(data), peer, Some(&file));
    }

    fn deliver_progress(&self, peer: &PeerId, fraction: f32, metadata: Option<&[u8]>) {
        let Some(file) = decode_file_metadata(peer, metadata) else {
            return;
        };
        match percent_from_fraction(fraction) {
            Ok(percent) => self.progress.dispatch(&percent, peer, Some(&file)),
            Err(e) => warn!(peer = %peer, file_id = %file.id, error = %e, "Dropping malformed progress"),
        }
    }
}

fn decode_file_metadata(peer: &PeerId, metadata: Option<&[u8]>) -> Option<FileMetadata> {
    let Some(raw) = metadata else {
        warn!(peer = %peer, "Dropping file payload without metadata");
        return None;
    };
    match FileMetadata::from_bytes(raw) {
        Ok(file) => Some(file),
        Err(e) => {
            warn!(peer = %peer, error = %e, "Dropping file payload with malformed metadata");
            None
        }
    }
}

/// All channels of one room session, declared once when the session opens.
pub struct ChannelSet {
    pub device_name: Channel<DeviceName>,
    pub advice: Channel<Advice>,
    pub text: Channel<String>,
    pub file_request: Channel<FileRequest>,
    pub file: FileChannel,
}

impl ChannelSet {
    pub(crate) fn declare(link: &Rc<SessionLink>) -> Self {
        Self {
            device_name: Channel::declare(ChannelName::DeviceName, link),
            advice: Channel::declare(ChannelName::Advice, link),
            text: Channel::declare(ChannelName::Text, link),
            file_request: Channel::declare(ChannelName::FileRequest, link),
            file: FileChannel::declare(link),
        }
    }

    pub(crate) fn route_payload(
        &self,
        channel: &str,
        peer: &PeerId,
        data: Vec<u8>,
        metadata: Option<Vec<u8>>,
    ) {
        let channel = match ChannelName::parse(channel) {
            Ok(channel) => channel,
            Err(e) => {
                warn!(peer = %peer, error = %e, "Dropping payload");
                return;
            }
        };
        match channel {
            ChannelName::DeviceName => self.device_name.deliver(peer, &data),
            ChannelName::Advice => self.advice.deliver(peer, &data),
            ChannelName::Text => self.text.deliver(peer, &data),
            ChannelName::FileRequest => self.file_request.deliver(peer, &data),
            ChannelName::File => self.file.deliver(peer, data, metadata.as_deref()),
        }
    }

    pub(crate) fn route_progress(
        &self,
        channel: &str,
        peer: &PeerId,
        fraction: f32,
        metadata: Option<Vec<u8>>,
    ) {
        match ChannelName::parse(channel) {
            Ok(ChannelName::File) => self.file.deliver_progress(peer, fraction, metadata.as_deref()),
            Ok(_) => {}
            Err(e) => debug!(peer = %peer, error = %e, "Ignoring progress"),
        }
    }
}
