//! One remote peer as seen from this device: its display name, whether it is
//! still in the room, and the conversation with it.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::{debug, info, warn};

use peerchat_net::Subscription;
use peerchat_shared::protocol::{FileRequest, FileRequestKind};
use peerchat_shared::types::{Direction, FileId, PeerId};

use crate::context::SessionContext;
use crate::error::{ClientError, Result};
use crate::events::ChatEvent;
use crate::message::{Message, MessageLog};
use crate::source::FileSource;
use crate::transfer::FileTransfer;

struct DeviceInner {
    peer: PeerId,
    name: String,
    /// Starts `true`; once the peer leaves it never comes back.
    online: bool,
    messages: MessageLog,
    unseen: usize,
    selected: bool,
    subscriptions: Vec<Subscription>,
    context: SessionContext,
    disposed: bool,
}

#[derive(Clone)]
pub struct Device(Rc<RefCell<DeviceInner>>);

impl Device {
    pub(crate) fn new(peer: PeerId, name: String, context: SessionContext) -> Self {
        Self(Rc::new(RefCell::new(DeviceInner {
            peer,
            name,
            online: true,
            messages: MessageLog::new(),
            unseen: 0,
            selected: false,
            subscriptions: Vec::new(),
            context,
            disposed: false,
        })))
    }

    /// Start listening to text and file requests from this device's peer.
    pub(crate) fn attach(&self) {
        let (channels, peer) = {
            let inner = self.0.borrow();
            (inner.context.channels(), inner.peer.clone())
        };
        let Some(channels) = channels else {
            return;
        };

        let weak = Rc::downgrade(&self.0);
        let text = channels.text.on_receive(
            move |text, _| {
                if let Some(device) = upgrade(&weak) {
                    device.on_text(text);
                }
            },
            Some(peer.clone()),
        );

        let weak = Rc::downgrade(&self.0);
        let requests = channels.file_request.on_receive(
            move |request, _| {
                if let Some(device) = upgrade(&weak) {
                    device.on_file_request(request);
                }
            },
            Some(peer),
        );

        self.hold(text);
        self.hold(requests);
    }

    /// Keep `subscription` alive until the device goes offline or is disposed.
    pub(crate) fn hold(&self, subscription: Subscription) {
        self.0.borrow_mut().subscriptions.push(subscription);
    }

    pub fn peer(&self) -> PeerId {
        self.0.borrow().peer.clone()
    }

    pub fn name(&self) -> String {
        self.0.borrow().name.clone()
    }

    pub fn is_online(&self) -> bool {
        self.0.borrow().online
    }

    pub fn unseen(&self) -> usize {
        self.0.borrow().unseen
    }

    pub fn is_selected(&self) -> bool {
        self.0.borrow().selected
    }

    pub fn messages(&self) -> Vec<Rc<Message>> {
        self.0.borrow().messages.iter().cloned().collect()
    }

    pub fn message(&self, index: usize) -> Option<Rc<Message>> {
        self.0.borrow().messages.get(index).cloned()
    }

    pub fn message_count(&self) -> usize {
        self.0.borrow().messages.len()
    }

    pub fn last_message(&self) -> Option<Rc<Message>> {
        self.0.borrow().messages.last().cloned()
    }

    pub fn transfer(&self, id: FileId) -> Option<FileTransfer> {
        self.0.borrow().messages.find_transfer(id)
    }

    pub fn same(&self, other: &Device) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Send a text message and append it to the log. Transport failures are
    /// logged; the message is kept either way.
    pub fn send_text(&self, text: &str) -> Result<Rc<Message>> {
        let (peer, channels) = self.ensure_online()?;
        if let Some(channels) = channels {
            if let Err(e) = channels.text.send(&text.to_string(), Some(&peer)) {
                warn!(peer = %peer, error = %e, "Failed to send text");
            }
        }
        Ok(self.0.borrow_mut().messages.push(Message::text(Direction::Sent, text)))
    }

    /// Offer a file to this device and append it to the log.
    pub fn send_file(&self, source: Box<dyn FileSource>) -> Result<FileTransfer> {
        let (peer, _) = self.ensure_online()?;
        let context = self.0.borrow().context.clone();
        let transfer = FileTransfer::outgoing(peer, source, context)?;
        self.0
            .borrow_mut()
            .messages
            .push(Message::file(Direction::Sent, transfer.clone()));
        Ok(transfer)
    }

    /// Remove `message` from the log and dispose it. Removing a file entry
    /// with an unfinished transfer cancels that transfer.
    pub fn remove_message(&self, message: &Rc<Message>) -> bool {
        let removed = self.0.borrow_mut().messages.remove(message);
        match removed {
            Some(message) => {
                message.dispose();
                true
            }
            None => false,
        }
    }

    fn ensure_online(&self) -> Result<(PeerId, Option<Rc<peerchat_net::ChannelSet>>)> {
        let inner = self.0.borrow();
        if !inner.online || inner.disposed {
            return Err(ClientError::DeviceOffline(inner.peer.clone()));
        }
        Ok((inner.peer.clone(), inner.context.channels()))
    }

    fn on_text(&self, text: &str) {
        let message = Message::text(Direction::Received, text);
        self.receive(message);
    }

    fn on_file_request(&self, request: &FileRequest) {
        let (existing, peer, context) = {
            let inner = self.0.borrow();
            (
                inner.messages.find_transfer(request.file.id),
                inner.peer.clone(),
                inner.context.clone(),
            )
        };
        match (existing, request.kind) {
            (Some(transfer), kind) => transfer.handle_request(kind),
            (None, FileRequestKind::Send) => {
                let transfer = FileTransfer::incoming(peer, request.file.clone(), context);
                self.receive(Message::file(Direction::Received, transfer));
            }
            (None, kind) => warn!(
                peer = %peer,
                file_id = %request.file.id,
                %kind,
                "Request for unknown file"
            ),
        }
    }

    fn receive(&self, message: Message) {
        let (event, events) = {
            let mut inner = self.0.borrow_mut();
            let preview = message.preview();
            inner.messages.push(message);
            if !inner.selected {
                inner.unseen += 1;
            }
            (
                ChatEvent::MessageReceived {
                    peer: inner.peer.clone(),
                    preview,
                },
                inner.context.events.clone(),
            )
        };
        events.emit(event);
    }

    pub(crate) fn set_name(&self, name: String) {
        self.0.borrow_mut().name = name;
    }

    pub(crate) fn set_selected(&self, selected: bool) {
        let mut inner = self.0.borrow_mut();
        inner.selected = selected;
        if selected {
            inner.unseen = 0;
        }
    }

    /// The peer left. Unfinished transfers break; the history stays.
    pub(crate) fn go_offline(&self) {
        let (transfers, subscriptions, peer, events) = {
            let mut inner = self.0.borrow_mut();
            if !inner.online {
                return;
            }
            inner.online = false;
            let transfers: Vec<FileTransfer> = inner
                .messages
                .iter()
                .filter_map(|m| m.transfer().cloned())
                .collect();
            (
                transfers,
                std::mem::take(&mut inner.subscriptions),
                inner.peer.clone(),
                inner.context.events.clone(),
            )
        };
        drop(subscriptions);
        for transfer in &transfers {
            transfer.go_offline();
        }
        info!(peer = %peer, transfers = transfers.len(), "Device went offline");
        events.emit(ChatEvent::DeviceOffline { peer });
    }

    /// Release the device: every message is disposed, which cancels
    /// unfinished transfers. Runs once.
    pub(crate) fn dispose(&self) {
        let (messages, subscriptions) = {
            let mut inner = self.0.borrow_mut();
            if inner.disposed {
                return;
            }
            inner.disposed = true;
            (inner.messages.drain(), std::mem::take(&mut inner.subscriptions))
        };
        drop(subscriptions);
        for message in &messages {
            message.dispose();
        }
        debug!(peer = %self.peer(), messages = messages.len(), "Disposed device");
    }
}

fn upgrade(weak: &Weak<RefCell<DeviceInner>>) -> Option<Device> {
    weak.upgrade().map(Device)
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.0.borrow();
        f.debug_struct("Device")
            .field("peer", &inner.peer)
            .field("name", &inner.name)
            .field("online", &inner.online)
            .field("messages", &inner.messages.len())
            .finish()
    }
}
