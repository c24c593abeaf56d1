use std::io;
use std::rc::Rc;
use std::sync::Mutex;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};

use peerchat_net::{
    JoinConfig, MemoryHub, MemorySession, OutboundFrame, RoomSession, TransportEvent,
    TransportSession,
};
use peerchat_shared::protocol::{ChannelName, FileRequest, FileRequestKind, Payload};
use peerchat_shared::types::{FileMetadata, PeerId};

use crate::context::{LocalEvent, SessionContext};
use crate::events::EventBus;
use crate::source::FileSource;

pub(crate) fn join_config() -> JoinConfig {
    JoinConfig {
        app_scope: "p2p-chat:alice".into(),
        secret: "secret".into(),
        topic: "common-room".into(),
    }
}

/// A local room session plus a raw remote peer "bob" in the same memory room.
pub(crate) struct Harness {
    pub room: RoomSession,
    pub room_rx: mpsc::UnboundedReceiver<TransportEvent>,
    pub local_rx: mpsc::UnboundedReceiver<LocalEvent>,
    pub context: SessionContext,
    pub remote: MemorySession,
    pub remote_rx: mpsc::UnboundedReceiver<TransportEvent>,
    pub bob: PeerId,
    inbox: Vec<TransportEvent>,
    _hub: MemoryHub,
}

impl Harness {
    pub fn new() -> Self {
        let hub = MemoryHub::new();
        let (room, room_rx) = RoomSession::open(&hub, join_config()).unwrap();
        let bob = PeerId::new("bob");
        let (remote, remote_rx) = hub.join_as(&join_config(), bob.clone()).unwrap();
        let (local_tx, local_rx) = mpsc::unbounded_channel();
        let context = SessionContext {
            channels: Rc::downgrade(room.channels()),
            local: local_tx,
            events: EventBus::new(),
        };
        Self {
            room,
            room_rx,
            local_rx,
            context,
            remote,
            remote_rx,
            bob,
            inbox: Vec::new(),
            _hub: hub,
        }
    }

    /// Dispatch every pending transport event of the local room.
    pub fn pump(&mut self) {
        while let Ok(event) = self.room_rx.try_recv() {
            self.room.dispatch(event);
        }
    }

    fn take_remote(&mut self, channel: ChannelName) -> Vec<(Vec<u8>, Option<Vec<u8>>)> {
        while let Ok(event) = self.remote_rx.try_recv() {
            self.inbox.push(event);
        }
        let mut taken = Vec::new();
        self.inbox.retain(|event| match event {
            TransportEvent::Payload {
                channel: name,
                data,
                metadata,
                ..
            } if name == channel.as_str() => {
                taken.push((data.clone(), metadata.clone()));
                false
            }
            _ => true,
        });
        taken
    }

    /// File requests the remote peer received since the last call.
    pub fn remote_requests(&mut self) -> Vec<FileRequest> {
        self.take_remote(ChannelName::FileRequest)
            .into_iter()
            .map(|(data, _)| FileRequest::from_bytes(&data).unwrap())
            .collect()
    }

    /// File contents the remote peer received since the last call.
    pub fn remote_file_payloads(&mut self) -> Vec<Vec<u8>> {
        self.take_remote(ChannelName::File)
            .into_iter()
            .map(|(data, _)| data)
            .collect()
    }

    pub fn remote_request(&self, kind: FileRequestKind, file: &FileMetadata) {
        let request = FileRequest::new(kind, file.clone());
        self.remote
            .send(OutboundFrame {
                channel: ChannelName::FileRequest.as_str().into(),
                data: request.to_bytes().unwrap(),
                target: None,
                metadata: None,
            })
            .unwrap();
    }

    pub fn remote_send_file(&self, file: &FileMetadata, content: Vec<u8>) {
        self.remote
            .send(OutboundFrame {
                channel: ChannelName::File.as_str().into(),
                data: content,
                target: None,
                metadata: Some(file.to_bytes().unwrap()),
            })
            .unwrap();
    }
}

/// A source whose read completes when the test says so.
pub(crate) struct DeferredSource {
    size: u64,
    pending: Mutex<Option<oneshot::Receiver<io::Result<Vec<u8>>>>>,
}

impl DeferredSource {
    pub fn new(size: u64) -> (Self, oneshot::Sender<io::Result<Vec<u8>>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                size,
                pending: Mutex::new(Some(rx)),
            },
            tx,
        )
    }
}

impl FileSource for DeferredSource {
    fn name(&self) -> &str {
        "deferred.bin"
    }

    fn mime_type(&self) -> &str {
        "application/octet-stream"
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn read(&self) -> BoxFuture<'static, io::Result<Vec<u8>>> {
        let pending = self.pending.lock().unwrap().take();
        async move {
            match pending {
                Some(rx) => rx
                    .await
                    .unwrap_or_else(|_| Err(io::Error::new(io::ErrorKind::Other, "dropped"))),
                None => Err(io::Error::new(io::ErrorKind::Other, "already read")),
            }
        }
        .boxed()
    }
}
