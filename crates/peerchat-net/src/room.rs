use std::rc::Rc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use peerchat_shared::types::PeerId;

use crate::channels::{ChannelSet, SessionLink};
use crate::error::NetError;
use crate::router::{PeerEventRouter, Subscription};
use crate::transport::{JoinConfig, Transport, TransportEvent};

/// One joined room: the transport session, its channel set, and peer
/// join/leave notifications.
///
/// The session does not pump its own events. The owner reads the receiver
/// returned by [`RoomSession::open`] and hands every event to
/// [`RoomSession::dispatch`], so all listeners run on the owner's task, one
/// event at a time.
pub struct RoomSession {
    config: JoinConfig,
    link: Rc<SessionLink>,
    channels: Rc<ChannelSet>,
    joins: PeerEventRouter<()>,
    leaves: PeerEventRouter<()>,
}

impl RoomSession {
    pub fn open(
        transport: &dyn Transport,
        config: JoinConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<TransportEvent>), NetError> {
        let (session, events) = transport.join(&config)?;
        let link = Rc::new(SessionLink::new(session));
        let channels = Rc::new(ChannelSet::declare(&link));

        info!(scope = %config.app_scope, topic = %config.topic, "Joined room");

        Ok((
            Self {
                config,
                link,
                channels,
                joins: PeerEventRouter::new(),
                leaves: PeerEventRouter::new(),
            },
            events,
        ))
    }

    pub fn config(&self) -> &JoinConfig {
        &self.config
    }

    pub fn channels(&self) -> &Rc<ChannelSet> {
        &self.channels
    }

    pub fn on_peer_join<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&PeerId) + 'static,
    {
        self.joins.register(move |_, peer, _| listener(peer), None)
    }

    pub fn on_peer_leave<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&PeerId) + 'static,
    {
        self.leaves.register(move |_, peer, _| listener(peer), None)
    }

    /// Route one transport event to the matching listeners. Events arriving
    /// after [`RoomSession::close`] are dropped.
    pub fn dispatch(&self, event: TransportEvent) {
        if self.link.is_closed() {
            debug!("Dropping event for closed room");
            return;
        }
        match event {
            TransportEvent::PeerJoined(peer) => {
                info!(peer = %peer, "Peer joined");
                self.joins.dispatch(&(), &peer, None);
            }
            TransportEvent::PeerLeft(peer) => {
                info!(peer = %peer, "Peer left");
                self.leaves.dispatch(&(), &peer, None);
            }
            TransportEvent::Payload {
                channel,
                peer,
                data,
                metadata,
            } => self.channels.route_payload(&channel, &peer, data, metadata),
            TransportEvent::Progress {
                channel,
                peer,
                fraction,
                metadata,
            } => self.channels.route_progress(&channel, &peer, fraction, metadata),
            TransportEvent::SendProgress {
                ticket,
                fraction,
                done,
            } => self.link.send_progress(ticket, fraction, done),
            TransportEvent::SendFailed { ticket, reason } => self.link.send_failed(ticket, &reason),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.link.is_closed()
    }

    /// Leave the transport. Later sends fail with [`NetError::SessionClosed`]
    /// and later events are dropped.
    pub fn close(&self) {
        if !self.link.is_closed() {
            info!(topic = %self.config.topic, "Leaving room");
            self.link.close();
        }
    }
}

impl Drop for RoomSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    use peerchat_shared::protocol::{
        Advice, ChannelName, DeviceName, FileRequest, FileRequestKind, Payload,
    };
    use peerchat_shared::types::{FileId, FileMetadata};

    use crate::channels::SendProgress;
    use crate::testing::RecordingSession;
    use crate::transport::{SendTicket, TransportSession};

    struct FakeTransport {
        session: RecordingSession,
    }

    impl Transport for FakeTransport {
        fn join(
            &self,
            _config: &JoinConfig,
        ) -> Result<
            (
                Box<dyn TransportSession>,
                mpsc::UnboundedReceiver<TransportEvent>,
            ),
            NetError,
        > {
            let (_tx, rx) = mpsc::unbounded_channel();
            Ok((Box::new(self.session.clone()), rx))
        }
    }

    fn open() -> (RoomSession, RecordingSession) {
        let session = RecordingSession::default();
        let transport = FakeTransport {
            session: session.clone(),
        };
        let config = JoinConfig {
            app_scope: "p2p-chat:alice".into(),
            secret: "secret".into(),
            topic: "common-room".into(),
        };
        let (room, _events) = RoomSession::open(&transport, config).unwrap();
        (room, session)
    }

    fn metadata() -> FileMetadata {
        FileMetadata {
            id: FileId::new(),
            name: "notes.txt".into(),
            mime_type: "text/plain".into(),
            size: 5,
        }
    }

    fn payload(channel: ChannelName, peer: &str, data: Vec<u8>) -> TransportEvent {
        TransportEvent::Payload {
            channel: channel.as_str().into(),
            peer: PeerId::new(peer),
            data,
            metadata: None,
        }
    }

    #[test]
    fn test_join_and_leave_notifications() {
        let (room, _) = open();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let s = seen.clone();
        let _join = room.on_peer_join(move |peer| s.borrow_mut().push(format!("join:{peer}")));
        let s = seen.clone();
        let _leave = room.on_peer_leave(move |peer| s.borrow_mut().push(format!("leave:{peer}")));

        room.dispatch(TransportEvent::PeerJoined(PeerId::new("bob")));
        room.dispatch(TransportEvent::PeerLeft(PeerId::new("bob")));
        assert_eq!(*seen.borrow(), vec!["join:bob", "leave:bob"]);
    }

    #[test]
    fn test_text_routed_to_scoped_listener() {
        let (room, _) = open();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let s = seen.clone();
        let _sub = room.channels().text.on_receive(
            move |text, peer| s.borrow_mut().push(format!("{peer}:{text}")),
            Some(PeerId::new("bob")),
        );

        let hello = "hello".to_string().to_bytes().unwrap();
        room.dispatch(payload(ChannelName::Text, "carol", hello.clone()));
        room.dispatch(payload(ChannelName::Text, "bob", hello));
        assert_eq!(*seen.borrow(), vec!["bob:hello"]);
    }

    #[test]
    fn test_malformed_payload_dropped_channel_stays_usable() {
        let (room, _) = open();
        let names = Rc::new(RefCell::new(Vec::new()));

        let n = names.clone();
        let _sub = room
            .channels()
            .device_name
            .on_receive(move |name, _| n.borrow_mut().push(name.0.clone()), None);

        room.dispatch(payload(ChannelName::DeviceName, "bob", vec![0xff, 0x01]));
        let empty = DeviceName(String::new());
        room.dispatch(payload(
            ChannelName::DeviceName,
            "bob",
            bincode::serialize(&empty).unwrap(),
        ));
        room.dispatch(payload(
            ChannelName::DeviceName,
            "bob",
            DeviceName("Laptop".into()).to_bytes().unwrap(),
        ));
        assert_eq!(*names.borrow(), vec!["Laptop"]);
    }

    #[test]
    fn test_unknown_channel_ignored() {
        let (room, _) = open();
        room.dispatch(TransportEvent::Payload {
            channel: "bogus".into(),
            peer: PeerId::new("bob"),
            data: vec![1, 2, 3],
            metadata: None,
        });
    }

    #[test]
    fn test_send_encodes_and_targets() {
        let (room, session) = open();
        let bob = PeerId::new("bob");

        room.channels()
            .advice
            .send(&Advice::Rename { name: "X (1)".into() }, Some(&bob))
            .unwrap();
        room.channels().text.send(&"hi".to_string(), None).unwrap();

        let sent = session.sent.borrow();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].channel, "advice");
        assert_eq!(sent[0].target.as_ref(), Some(&bob));
        assert_eq!(
            Advice::from_bytes(&sent[0].data).unwrap(),
            Advice::Rename { name: "X (1)".into() }
        );
        assert_eq!(sent[1].channel, "text");
        assert!(sent[1].target.is_none());
    }

    #[test]
    fn test_file_request_shape_checked() {
        let (room, _) = open();
        let hits = Rc::new(Cell::new(0));

        let h = hits.clone();
        let _sub = room
            .channels()
            .file_request
            .on_receive(move |_, _| h.set(h.get() + 1), None);

        let mut bad = metadata();
        bad.name = String::new();
        let bad = bincode::serialize(&FileRequest::new(FileRequestKind::Send, bad)).unwrap();
        room.dispatch(payload(ChannelName::FileRequest, "bob", bad));
        assert_eq!(hits.get(), 0);

        let good = FileRequest::new(FileRequestKind::Send, metadata())
            .to_bytes()
            .unwrap();
        room.dispatch(payload(ChannelName::FileRequest, "bob", good));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_file_bytes_and_progress_filtered_by_id() {
        let (room, _) = open();
        let file = metadata();
        let other = metadata();
        let bob = PeerId::new("bob");
        let seen = Rc::new(RefCell::new(Vec::new()));

        let s = seen.clone();
        let _bytes = room.channels().file.on_receive(
            move |content, _| s.borrow_mut().push(format!("bytes:{}", content.len())),
            bob.clone(),
            file.id,
        );
        let s = seen.clone();
        let _progress = room.channels().file.on_progress(
            move |percent, _| s.borrow_mut().push(format!("progress:{percent}")),
            bob.clone(),
            file.id,
        );

        for (meta, fraction) in [(&other, 0.5), (&file, 0.5)] {
            room.dispatch(TransportEvent::Progress {
                channel: "file".into(),
                peer: bob.clone(),
                fraction,
                metadata: Some(meta.to_bytes().unwrap()),
            });
        }
        room.dispatch(TransportEvent::Payload {
            channel: "file".into(),
            peer: bob.clone(),
            data: b"hello".to_vec(),
            metadata: None,
        });
        room.dispatch(TransportEvent::Payload {
            channel: "file".into(),
            peer: bob.clone(),
            data: b"hello".to_vec(),
            metadata: Some(file.to_bytes().unwrap()),
        });

        assert_eq!(*seen.borrow(), vec!["progress:50", "bytes:5"]);
    }

    #[test]
    fn test_send_progress_reaches_callback_until_done() {
        let (room, session) = open();
        let ticks = Rc::new(RefCell::new(Vec::new()));

        let t = ticks.clone();
        let ticket = room
            .channels()
            .file
            .send(b"hello".to_vec(), &metadata(), &PeerId::new("bob"), move |p| {
                t.borrow_mut().push(p)
            })
            .unwrap();
        assert!(session.sent.borrow()[0].metadata.is_some());

        room.dispatch(TransportEvent::SendProgress { ticket, fraction: 0.5, done: false });
        room.dispatch(TransportEvent::SendProgress { ticket, fraction: 1.0, done: true });
        room.dispatch(TransportEvent::SendProgress { ticket, fraction: 1.0, done: true });
        room.dispatch(TransportEvent::SendProgress {
            ticket: SendTicket(99),
            fraction: 1.0,
            done: true,
        });

        assert_eq!(
            *ticks.borrow(),
            vec![
                SendProgress::tick(50, false),
                SendProgress::tick(100, true),
            ]
        );
    }

    #[test]
    fn test_send_failure_reaches_callback_once() {
        let (room, _session) = open();
        let ticks = Rc::new(RefCell::new(Vec::new()));

        let t = ticks.clone();
        let ticket = room
            .channels()
            .file
            .send(b"hello".to_vec(), &metadata(), &PeerId::new("bob"), move |p| {
                t.borrow_mut().push(p)
            })
            .unwrap();

        room.dispatch(TransportEvent::SendProgress { ticket, fraction: 0.5, done: false });
        room.dispatch(TransportEvent::SendFailed {
            ticket,
            reason: "InsufficientPeers".into(),
        });
        room.dispatch(TransportEvent::SendProgress { ticket, fraction: 1.0, done: true });
        room.dispatch(TransportEvent::SendFailed {
            ticket,
            reason: "InsufficientPeers".into(),
        });

        let ticks = ticks.borrow();
        assert_eq!(ticks.len(), 2);
        assert_eq!(ticks[0], SendProgress::tick(50, false));
        assert!(ticks[1].failed && !ticks[1].done);
    }

    #[test]
    fn test_close_leaves_once_and_stops_everything() {
        let (room, session) = open();
        let hits = Rc::new(Cell::new(0));

        let h = hits.clone();
        let _sub = room.on_peer_join(move |_| h.set(h.get() + 1));

        room.close();
        room.close();
        assert_eq!(session.left.get(), 1);
        assert!(room.is_closed());

        room.dispatch(TransportEvent::PeerJoined(PeerId::new("bob")));
        assert_eq!(hits.get(), 0);

        let err = room.channels().text.send(&"late".to_string(), None);
        assert!(matches!(err, Err(NetError::SessionClosed)));
        assert!(session.sent.borrow().is_empty());

        drop(room);
        assert_eq!(session.left.get(), 1);
    }
}
