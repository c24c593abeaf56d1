//! Per-file handshake and transfer state machine.
//!
//! One [`FileTransfer`] exists per (peer, file id). The sender offers the file
//! with a `send` request; the receiver answers `accept` or `reject`; either
//! side may `cancel` until the transfer is finished. Once a transfer reaches a
//! terminal status nothing moves it again, so late or duplicated requests,
//! bytes and progress ticks are ignored.

use std::cell::RefCell;
use std::fmt;
use std::io;
use std::path::Path;
use std::rc::Rc;

use bytes::Bytes;
use tracing::{debug, info, warn};

use peerchat_net::{SendProgress, Subscription};
use peerchat_shared::error::ProtocolError;
use peerchat_shared::protocol::{FileRequest, FileRequestKind};
use peerchat_shared::types::{Direction, FileId, FileMetadata, PeerId};

use crate::context::{LocalEvent, SessionContext};
use crate::error::{ClientError, Result};
use crate::events::ChatEvent;
use crate::source::FileSource;

#[derive(Debug, Clone, PartialEq)]
pub enum FileStatus {
    /// Offered to the peer, waiting for an answer.
    Outgoing,
    /// Offered by the peer, waiting for a local answer.
    Incoming,
    Sending { progress: u8 },
    Receiving { progress: u8 },
    Sent,
    Received { content: Bytes },
    Rejected,
    Cancelled,
    /// The peer went away or the local file could not be read.
    Broken,
}

impl FileStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FileStatus::Sent
                | FileStatus::Received { .. }
                | FileStatus::Rejected
                | FileStatus::Cancelled
                | FileStatus::Broken
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            FileStatus::Outgoing => "outgoing",
            FileStatus::Incoming => "incoming",
            FileStatus::Sending { .. } => "sending",
            FileStatus::Receiving { .. } => "receiving",
            FileStatus::Sent => "sent",
            FileStatus::Received { .. } => "received",
            FileStatus::Rejected => "rejected",
            FileStatus::Cancelled => "cancelled",
            FileStatus::Broken => "broken",
        }
    }

    pub fn progress(&self) -> Option<u8> {
        match self {
            FileStatus::Sending { progress } | FileStatus::Receiving { progress } => Some(*progress),
            _ => None,
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.progress() {
            Some(progress) => write!(f, "{} {progress}%", self.label()),
            None => f.write_str(self.label()),
        }
    }
}

struct TransferInner {
    peer: PeerId,
    metadata: FileMetadata,
    direction: Direction,
    status: FileStatus,
    source: Option<Box<dyn FileSource>>,
    /// The source read is in flight.
    reading: bool,
    /// A cancel arrived while reading; applied when the read completes.
    cancel_requested: bool,
    /// A cancel request was sent or received; never send another.
    cancel_exchanged: bool,
    disposed: bool,
    subscriptions: Vec<Subscription>,
    context: SessionContext,
}

#[derive(Clone)]
pub struct FileTransfer(Rc<RefCell<TransferInner>>);

impl FileTransfer {
    fn build(
        peer: PeerId,
        metadata: FileMetadata,
        direction: Direction,
        status: FileStatus,
        source: Option<Box<dyn FileSource>>,
        context: SessionContext,
    ) -> Self {
        Self(Rc::new(RefCell::new(TransferInner {
            peer,
            metadata,
            direction,
            status,
            source,
            reading: false,
            cancel_requested: false,
            cancel_exchanged: false,
            disposed: false,
            subscriptions: Vec::new(),
            context,
        })))
    }

    /// Offer `source` to `peer`.
    pub(crate) fn outgoing(
        peer: PeerId,
        source: Box<dyn FileSource>,
        context: SessionContext,
    ) -> std::result::Result<Self, ProtocolError> {
        let metadata = FileMetadata {
            id: FileId::new(),
            name: source.name().to_string(),
            mime_type: source.mime_type().to_string(),
            size: source.size(),
        };
        metadata.validate()?;

        info!(peer = %peer, file_id = %metadata.id, size = metadata.size, "Offering file");
        let transfer = Self::build(
            peer,
            metadata,
            Direction::Sent,
            FileStatus::Outgoing,
            Some(source),
            context,
        );
        transfer.request(FileRequestKind::Send);
        Ok(transfer)
    }

    /// A file offered by `peer`.
    pub(crate) fn incoming(peer: PeerId, metadata: FileMetadata, context: SessionContext) -> Self {
        info!(peer = %peer, file_id = %metadata.id, size = metadata.size, "Incoming file offer");
        Self::build(peer, metadata, Direction::Received, FileStatus::Incoming, None, context)
    }

    pub fn id(&self) -> FileId {
        self.0.borrow().metadata.id
    }

    pub fn metadata(&self) -> FileMetadata {
        self.0.borrow().metadata.clone()
    }

    pub fn name(&self) -> String {
        self.0.borrow().metadata.name.clone()
    }

    pub fn size(&self) -> u64 {
        self.0.borrow().metadata.size
    }

    pub fn peer(&self) -> PeerId {
        self.0.borrow().peer.clone()
    }

    pub fn direction(&self) -> Direction {
        self.0.borrow().direction
    }

    pub fn status(&self) -> FileStatus {
        self.0.borrow().status.clone()
    }

    pub fn content(&self) -> Option<Bytes> {
        match &self.0.borrow().status {
            FileStatus::Received { content } => Some(content.clone()),
            _ => None,
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.0.borrow().disposed
    }

    pub fn same(&self, other: &FileTransfer) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Accept an incoming offer.
    pub fn accept(&self) {
        if !self.is_live_in(&FileStatus::Incoming, "accept") {
            return;
        }
        self.subscribe_content();
        self.update(FileStatus::Receiving { progress: 0 });
        self.request(FileRequestKind::Accept);
    }

    /// Turn down an incoming offer.
    pub fn reject(&self) {
        if !self.is_live_in(&FileStatus::Incoming, "reject") {
            return;
        }
        self.update(FileStatus::Rejected);
        self.request(FileRequestKind::Reject);
    }

    /// Abort the transfer from any non-terminal status. While the source of
    /// an accepted offer is still being read the status stays `outgoing`;
    /// the read's outcome then settles it.
    pub fn cancel(&self) {
        let (send, reading) = {
            let mut inner = self.0.borrow_mut();
            if inner.status.is_terminal() {
                debug!(file_id = %inner.metadata.id, status = %inner.status, "Ignoring cancel");
                return;
            }
            if inner.reading {
                inner.cancel_requested = true;
            }
            let send = !inner.cancel_exchanged;
            inner.cancel_exchanged = true;
            (send, inner.reading)
        };
        if send {
            self.request(FileRequestKind::Cancel);
        }
        if !reading {
            self.update(FileStatus::Cancelled);
        }
    }

    /// Save received content to `path`.
    pub async fn save_to(&self, path: impl AsRef<Path>) -> Result<u64> {
        let content = self.content().ok_or_else(|| ClientError::NotReceived(self.id()))?;
        tokio::fs::write(path.as_ref(), &content).await?;
        info!(file_id = %self.id(), path = %path.as_ref().display(), "Saved received file");
        Ok(content.len() as u64)
    }

    /// A handshake request from the peer for this transfer's id.
    pub(crate) fn handle_request(&self, kind: FileRequestKind) {
        let (status, direction, reading, cancel_requested, id) = {
            let inner = self.0.borrow();
            if inner.disposed {
                return;
            }
            (
                inner.status.clone(),
                inner.direction,
                inner.reading,
                inner.cancel_requested,
                inner.metadata.id,
            )
        };
        if status.is_terminal() {
            debug!(file_id = %id, %kind, status = %status, "Ignoring request for finished transfer");
            return;
        }

        match kind {
            FileRequestKind::Send => debug!(file_id = %id, "Duplicate file offer"),
            FileRequestKind::Accept => {
                if direction == Direction::Sent
                    && status == FileStatus::Outgoing
                    && !reading
                    && !cancel_requested
                {
                    self.start_read();
                } else {
                    debug!(file_id = %id, status = %status, "Ignoring accept");
                }
            }
            FileRequestKind::Reject => {
                if direction == Direction::Sent && status == FileStatus::Outgoing && !reading {
                    self.update(FileStatus::Rejected);
                } else {
                    debug!(file_id = %id, status = %status, "Ignoring stale reject");
                }
            }
            FileRequestKind::Cancel => {
                {
                    let mut inner = self.0.borrow_mut();
                    inner.cancel_exchanged = true;
                    if inner.reading {
                        inner.cancel_requested = true;
                        return;
                    }
                }
                self.update(FileStatus::Cancelled);
            }
        }
    }

    fn start_read(&self) {
        let (read, peer, file_id, local) = {
            let mut inner = self.0.borrow_mut();
            let Some(source) = inner.source.as_ref() else {
                warn!(file_id = %inner.metadata.id, "Accepted transfer has no source");
                return;
            };
            let read = source.read();
            inner.reading = true;
            (read, inner.peer.clone(), inner.metadata.id, inner.context.local.clone())
        };
        debug!(peer = %peer, file_id = %file_id, "Peer accepted, reading file");

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let result = read.await;
                    let _ = local.send(LocalEvent::SourceLoaded {
                        peer,
                        file_id,
                        result,
                    });
                });
            }
            Err(_) => self.on_source_loaded(Err(io::Error::new(
                io::ErrorKind::Other,
                "no async runtime to read the file",
            ))),
        }
    }

    /// Completion of the source read started by the peer's accept.
    pub(crate) fn on_source_loaded(&self, result: io::Result<Vec<u8>>) {
        let cancel_requested = {
            let mut inner = self.0.borrow_mut();
            if !inner.reading {
                debug!(file_id = %inner.metadata.id, "Unexpected source read completion");
                return;
            }
            inner.reading = false;
            if inner.status.is_terminal() {
                debug!(file_id = %inner.metadata.id, status = %inner.status, "Read finished after transfer ended");
                return;
            }
            inner.cancel_requested
        };

        let data = match result {
            Ok(data) => data,
            Err(e) => {
                warn!(file_id = %self.id(), error = %e, "Failed to read file");
                self.update(FileStatus::Broken);
                return;
            }
        };
        if cancel_requested {
            self.update(FileStatus::Cancelled);
            return;
        }

        let (metadata, peer, channels) = {
            let mut inner = self.0.borrow_mut();
            inner.source = None;
            (inner.metadata.clone(), inner.peer.clone(), inner.context.channels())
        };
        if data.len() as u64 != metadata.size {
            warn!(
                file_id = %metadata.id,
                expected = metadata.size,
                actual = data.len(),
                "File changed size since it was offered"
            );
            self.update(FileStatus::Broken);
            return;
        }
        let Some(channels) = channels else {
            warn!(file_id = %metadata.id, "Room closed before the file could be sent");
            self.update(FileStatus::Broken);
            return;
        };

        self.update(FileStatus::Sending { progress: 0 });
        let weak = Rc::downgrade(&self.0);
        let sent = channels.file.send(data, &metadata, &peer, move |progress| {
            if let Some(inner) = weak.upgrade() {
                FileTransfer(inner).on_send_progress(progress);
            }
        });
        if let Err(e) = sent {
            warn!(peer = %peer, file_id = %metadata.id, error = %e, "Failed to send file");
            self.update(FileStatus::Broken);
        }
    }

    fn on_send_progress(&self, progress: SendProgress) {
        if !matches!(self.0.borrow().status, FileStatus::Sending { .. }) {
            return;
        }
        if progress.failed {
            warn!(peer = %self.peer(), file_id = %self.id(), "Transport dropped the file");
            self.update(FileStatus::Broken);
        } else if progress.done {
            self.update(FileStatus::Sent);
        } else {
            self.update(FileStatus::Sending {
                progress: progress.percent.min(100),
            });
        }
    }

    fn subscribe_content(&self) {
        let (channels, peer, id) = {
            let inner = self.0.borrow();
            (inner.context.channels(), inner.peer.clone(), inner.metadata.id)
        };
        let Some(channels) = channels else {
            return;
        };

        let weak = Rc::downgrade(&self.0);
        let bytes = channels.file.on_receive(
            move |content, _| {
                if let Some(inner) = weak.upgrade() {
                    FileTransfer(inner).on_bytes(content);
                }
            },
            peer.clone(),
            id,
        );
        let weak = Rc::downgrade(&self.0);
        let progress = channels.file.on_progress(
            move |percent, _| {
                if let Some(inner) = weak.upgrade() {
                    FileTransfer(inner).on_progress(percent);
                }
            },
            peer,
            id,
        );

        self.0.borrow_mut().subscriptions.extend([bytes, progress]);
    }

    fn on_bytes(&self, content: &Bytes) {
        let (status, size, id) = {
            let inner = self.0.borrow();
            (inner.status.clone(), inner.metadata.size, inner.metadata.id)
        };
        if !matches!(status, FileStatus::Receiving { .. }) {
            debug!(file_id = %id, status = %status, "Ignoring file content");
            return;
        }
        if content.len() as u64 != size {
            warn!(file_id = %id, expected = size, actual = content.len(), "Received file size mismatch");
            self.update(FileStatus::Broken);
            return;
        }
        self.update(FileStatus::Received {
            content: content.clone(),
        });
    }

    fn on_progress(&self, percent: u8) {
        let percent = percent.min(100);
        match self.0.borrow().status {
            FileStatus::Receiving { progress } if progress != percent => {}
            _ => return,
        }
        self.update(FileStatus::Receiving { progress: percent });
    }

    /// The peer left: anything unfinished is broken.
    pub(crate) fn go_offline(&self) {
        if !self.0.borrow().status.is_terminal() {
            self.update(FileStatus::Broken);
        }
    }

    /// Release the transfer. Unfinished transfers are cancelled first, which
    /// sends at most one cancel request to the peer. A pending source read
    /// is abandoned and the transfer settles as cancelled. Calling it again
    /// does nothing.
    pub(crate) fn dispose(&self) {
        let (disposed, terminal) = {
            let inner = self.0.borrow();
            (inner.disposed, inner.status.is_terminal())
        };
        if disposed {
            return;
        }
        if !terminal {
            self.cancel();
            let abandoned = std::mem::replace(&mut self.0.borrow_mut().reading, false);
            if abandoned {
                self.update(FileStatus::Cancelled);
            }
        }
        let subscriptions = {
            let mut inner = self.0.borrow_mut();
            inner.disposed = true;
            inner.source = None;
            std::mem::take(&mut inner.subscriptions)
        };
        drop(subscriptions);
    }

    fn is_live_in(&self, expected: &FileStatus, action: &str) -> bool {
        let inner = self.0.borrow();
        if inner.disposed || inner.status != *expected {
            debug!(file_id = %inner.metadata.id, status = %inner.status, action, "Ignoring local action");
            return false;
        }
        true
    }

    fn request(&self, kind: FileRequestKind) {
        let (channels, request, peer) = {
            let inner = self.0.borrow();
            (
                inner.context.channels(),
                FileRequest::new(kind, inner.metadata.clone()),
                inner.peer.clone(),
            )
        };
        let Some(channels) = channels else {
            debug!(file_id = %request.file.id, %kind, "Room closed, request not sent");
            return;
        };
        if let Err(e) = channels.file_request.send(&request, Some(&peer)) {
            warn!(peer = %peer, file_id = %request.file.id, %kind, error = %e, "Failed to send file request");
        }
    }

    /// Move to `status` unless already terminal. Reaching a terminal status
    /// drops the content subscriptions and the source.
    fn update(&self, status: FileStatus) {
        let (event, events, subscriptions) = {
            let mut inner = self.0.borrow_mut();
            if inner.status.is_terminal() {
                debug!(file_id = %inner.metadata.id, from = %inner.status, to = %status, "Terminal status kept");
                return;
            }
            inner.status = status;

            let subscriptions = if inner.status.is_terminal() {
                info!(
                    peer = %inner.peer,
                    file_id = %inner.metadata.id,
                    status = %inner.status,
                    "Transfer finished"
                );
                inner.source = None;
                std::mem::take(&mut inner.subscriptions)
            } else {
                Vec::new()
            };

            let event = ChatEvent::TransferUpdated {
                peer: inner.peer.clone(),
                file_id: inner.metadata.id,
                status: inner.status.to_string(),
            };
            (event, inner.context.events.clone(), subscriptions)
        };
        drop(subscriptions);
        events.emit(event);
    }
}

impl fmt::Debug for FileTransfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.0.borrow();
        f.debug_struct("FileTransfer")
            .field("peer", &inner.peer)
            .field("file", &inner.metadata)
            .field("status", &inner.status.to_string())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peerchat_shared::constants::CHUNK_SIZE;

    use crate::source::MemorySource;
    use crate::testing::{DeferredSource, Harness};

    fn offer(h: &mut Harness, content: &[u8]) -> FileTransfer {
        let source = MemorySource::new("notes.txt", "text/plain", content.to_vec());
        FileTransfer::outgoing(h.bob.clone(), Box::new(source), h.context.clone()).unwrap()
    }

    fn incoming(h: &mut Harness, size: u64) -> FileTransfer {
        let metadata = FileMetadata {
            id: FileId::new(),
            name: "photo.png".into(),
            mime_type: "image/png".into(),
            size,
        };
        FileTransfer::incoming(h.bob.clone(), metadata, h.context.clone())
    }

    async fn finish_read(h: &mut Harness, transfer: &FileTransfer) {
        match h.local_rx.recv().await {
            Some(LocalEvent::SourceLoaded { file_id, result, .. }) => {
                assert_eq!(file_id, transfer.id());
                transfer.on_source_loaded(result);
            }
            None => panic!("local channel closed"),
        }
    }

    #[tokio::test]
    async fn test_outgoing_round_trip() {
        let mut h = Harness::new();
        let content = vec![7u8; CHUNK_SIZE * 2 + 3];
        let transfer = offer(&mut h, &content);

        let requests = h.remote_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].kind, FileRequestKind::Send);
        assert_eq!(requests[0].file.size, content.len() as u64);
        assert_eq!(requests[0].file.mime_type, "text/plain");
        assert_eq!(transfer.status(), FileStatus::Outgoing);

        transfer.handle_request(FileRequestKind::Accept);
        assert_eq!(transfer.status(), FileStatus::Outgoing);
        finish_read(&mut h, &transfer).await;
        assert!(matches!(transfer.status(), FileStatus::Sending { .. }));

        let mut seen = Vec::new();
        let mut events = h.context.events.subscribe();
        h.pump();
        while let Ok(ChatEvent::TransferUpdated { status, .. }) = events.try_recv() {
            seen.push(status);
        }
        assert_eq!(transfer.status(), FileStatus::Sent);
        assert_eq!(seen.last().map(String::as_str), Some("sent"));

        let received = h.remote_file_payloads();
        assert_eq!(received, vec![content]);
    }

    #[tokio::test]
    async fn test_remote_reject() {
        let mut h = Harness::new();
        let transfer = offer(&mut h, b"hello");
        transfer.handle_request(FileRequestKind::Reject);
        assert_eq!(transfer.status(), FileStatus::Rejected);

        transfer.handle_request(FileRequestKind::Accept);
        transfer.cancel();
        assert_eq!(transfer.status(), FileStatus::Rejected);
    }

    #[tokio::test]
    async fn test_accept_then_stale_reject() {
        let mut h = Harness::new();
        let transfer = offer(&mut h, b"hello");
        transfer.handle_request(FileRequestKind::Accept);
        transfer.handle_request(FileRequestKind::Reject);
        finish_read(&mut h, &transfer).await;
        assert!(matches!(transfer.status(), FileStatus::Sending { .. }));
    }

    #[tokio::test]
    async fn test_cancel_while_reading_then_read_ok() {
        let mut h = Harness::new();
        let (source, release) = DeferredSource::new(5);
        let transfer =
            FileTransfer::outgoing(h.bob.clone(), Box::new(source), h.context.clone()).unwrap();
        transfer.handle_request(FileRequestKind::Accept);

        transfer.cancel();
        transfer.cancel();
        assert_eq!(transfer.status(), FileStatus::Outgoing);

        let _ = release.send(Ok(b"hello".to_vec()));
        finish_read(&mut h, &transfer).await;
        assert_eq!(transfer.status(), FileStatus::Cancelled);

        let kinds: Vec<_> = h.remote_requests().into_iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![FileRequestKind::Send, FileRequestKind::Cancel]);
    }

    #[tokio::test]
    async fn test_cancel_while_reading_then_read_fails() {
        let mut h = Harness::new();
        let (source, release) = DeferredSource::new(5);
        let transfer =
            FileTransfer::outgoing(h.bob.clone(), Box::new(source), h.context.clone()).unwrap();
        transfer.handle_request(FileRequestKind::Accept);
        transfer.cancel();

        let _ = release.send(Err(io::Error::new(io::ErrorKind::NotFound, "gone")));
        finish_read(&mut h, &transfer).await;
        assert_eq!(transfer.status(), FileStatus::Broken);
    }

    #[tokio::test]
    async fn test_read_failure_breaks() {
        let mut h = Harness::new();
        let (source, release) = DeferredSource::new(5);
        let transfer =
            FileTransfer::outgoing(h.bob.clone(), Box::new(source), h.context.clone()).unwrap();
        transfer.handle_request(FileRequestKind::Accept);

        let _ = release.send(Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied")));
        finish_read(&mut h, &transfer).await;
        assert_eq!(transfer.status(), FileStatus::Broken);
    }

    #[tokio::test]
    async fn test_source_changed_size_breaks() {
        let mut h = Harness::new();
        let (source, release) = DeferredSource::new(5);
        let transfer =
            FileTransfer::outgoing(h.bob.clone(), Box::new(source), h.context.clone()).unwrap();
        transfer.handle_request(FileRequestKind::Accept);

        let _ = release.send(Ok(b"hello world".to_vec()));
        finish_read(&mut h, &transfer).await;
        assert_eq!(transfer.status(), FileStatus::Broken);
    }

    #[tokio::test]
    async fn test_transport_failure_while_sending_breaks() {
        let mut h = Harness::new();
        let transfer = offer(&mut h, b"hello");
        transfer.handle_request(FileRequestKind::Accept);
        finish_read(&mut h, &transfer).await;
        assert!(matches!(transfer.status(), FileStatus::Sending { .. }));

        transfer.on_send_progress(SendProgress {
            percent: 0,
            done: false,
            failed: true,
        });
        assert_eq!(transfer.status(), FileStatus::Broken);

        h.pump();
        assert_eq!(transfer.status(), FileStatus::Broken);
    }

    #[tokio::test]
    async fn test_incoming_accept_and_receive() {
        let mut h = Harness::new();
        let transfer = incoming(&mut h, 5);
        transfer.accept();
        assert_eq!(transfer.status(), FileStatus::Receiving { progress: 0 });
        assert_eq!(h.remote_requests()[0].kind, FileRequestKind::Accept);

        h.remote_send_file(&transfer.metadata(), b"hello".to_vec());
        h.pump();
        assert_eq!(transfer.content().as_deref(), Some(&b"hello"[..]));

        transfer.cancel();
        assert!(matches!(transfer.status(), FileStatus::Received { .. }));
        assert!(h.remote_requests().is_empty());
    }

    #[tokio::test]
    async fn test_incoming_progress_is_whole_percent() {
        let mut h = Harness::new();
        let size = (CHUNK_SIZE * 4) as u64;
        let transfer = incoming(&mut h, size);
        transfer.accept();
        let mut events = h.context.events.subscribe();

        h.remote_send_file(&transfer.metadata(), vec![0u8; size as usize]);
        h.pump();

        let mut progress = Vec::new();
        while let Ok(ChatEvent::TransferUpdated { status, .. }) = events.try_recv() {
            progress.push(status);
        }
        assert_eq!(
            progress,
            vec!["receiving 25%", "receiving 50%", "receiving 75%", "receiving 100%", "received"]
        );
    }

    #[tokio::test]
    async fn test_incoming_size_mismatch_breaks() {
        let mut h = Harness::new();
        let transfer = incoming(&mut h, 10);
        transfer.accept();
        h.remote_send_file(&transfer.metadata(), b"short".to_vec());
        h.pump();
        assert_eq!(transfer.status(), FileStatus::Broken);
    }

    #[tokio::test]
    async fn test_bytes_before_accept_ignored() {
        let mut h = Harness::new();
        let transfer = incoming(&mut h, 5);
        h.remote_send_file(&transfer.metadata(), b"hello".to_vec());
        h.pump();
        assert_eq!(transfer.status(), FileStatus::Incoming);
    }

    #[tokio::test]
    async fn test_local_reject_and_remote_cancel() {
        let mut h = Harness::new();
        let rejected = incoming(&mut h, 5);
        rejected.reject();
        assert_eq!(rejected.status(), FileStatus::Rejected);
        assert_eq!(h.remote_requests()[0].kind, FileRequestKind::Reject);

        let cancelled = incoming(&mut h, 5);
        cancelled.handle_request(FileRequestKind::Cancel);
        assert_eq!(cancelled.status(), FileStatus::Cancelled);
        cancelled.dispose();
        assert!(h.remote_requests().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_from_every_live_state() {
        let mut h = Harness::new();

        let outgoing = offer(&mut h, b"hello");
        outgoing.cancel();
        assert_eq!(outgoing.status(), FileStatus::Cancelled);

        let receiving = incoming(&mut h, 5);
        receiving.accept();
        receiving.cancel();
        assert_eq!(receiving.status(), FileStatus::Cancelled);

        let sending = offer(&mut h, b"hello");
        sending.handle_request(FileRequestKind::Accept);
        finish_read(&mut h, &sending).await;
        sending.cancel();
        assert_eq!(sending.status(), FileStatus::Cancelled);
        h.pump();
        assert_eq!(sending.status(), FileStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_offline_breaks_only_unfinished() {
        let mut h = Harness::new();
        let waiting = offer(&mut h, b"hello");
        let done = incoming(&mut h, 5);
        done.reject();

        waiting.go_offline();
        done.go_offline();
        assert_eq!(waiting.status(), FileStatus::Broken);
        assert_eq!(done.status(), FileStatus::Rejected);

        waiting.handle_request(FileRequestKind::Accept);
        assert_eq!(waiting.status(), FileStatus::Broken);
    }

    #[tokio::test]
    async fn test_dispose_cancels_exactly_once() {
        let mut h = Harness::new();
        let transfer = offer(&mut h, b"hello");
        h.remote_requests();

        transfer.dispose();
        transfer.dispose();
        assert!(transfer.is_disposed());
        assert_eq!(transfer.status(), FileStatus::Cancelled);
        let kinds: Vec<_> = h.remote_requests().into_iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![FileRequestKind::Cancel]);
    }

    #[tokio::test]
    async fn test_dispose_after_cancel_sends_nothing_more() {
        let mut h = Harness::new();
        let (source, _release) = DeferredSource::new(5);
        let transfer =
            FileTransfer::outgoing(h.bob.clone(), Box::new(source), h.context.clone()).unwrap();
        transfer.handle_request(FileRequestKind::Accept);
        transfer.cancel();
        transfer.dispose();

        let kinds: Vec<_> = h.remote_requests().into_iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![FileRequestKind::Send, FileRequestKind::Cancel]);
    }

    #[tokio::test]
    async fn test_dispose_while_reading_settles_cancelled() {
        let mut h = Harness::new();
        let (source, release) = DeferredSource::new(5);
        let transfer =
            FileTransfer::outgoing(h.bob.clone(), Box::new(source), h.context.clone()).unwrap();
        transfer.handle_request(FileRequestKind::Accept);

        transfer.dispose();
        assert_eq!(transfer.status(), FileStatus::Cancelled);

        let _ = release.send(Ok(b"hello".to_vec()));
        finish_read(&mut h, &transfer).await;
        assert_eq!(transfer.status(), FileStatus::Cancelled);
        assert!(h.remote_file_payloads().is_empty());
        let kinds: Vec<_> = h.remote_requests().into_iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![FileRequestKind::Send, FileRequestKind::Cancel]);
    }

    #[tokio::test]
    async fn test_save_received_content() {
        let mut h = Harness::new();
        let transfer = incoming(&mut h, 5);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        assert!(matches!(
            transfer.save_to(&path).await,
            Err(ClientError::NotReceived(_))
        ));

        transfer.accept();
        h.remote_send_file(&transfer.metadata(), b"hello".to_vec());
        h.pump();
        assert_eq!(transfer.save_to(&path).await.unwrap(), 5);
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"hello");
    }

    #[test]
    fn test_status_display() {
        assert_eq!(FileStatus::Sending { progress: 42 }.to_string(), "sending 42%");
        assert_eq!(FileStatus::Broken.to_string(), "broken");
        assert!(FileStatus::Received { content: Bytes::new() }.is_terminal());
        assert!(!FileStatus::Receiving { progress: 100 }.is_terminal());
    }
}
