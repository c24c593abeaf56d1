use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::error::NetError;
use crate::transport::{OutboundFrame, SendTicket, TransportSession};

/// Transport session that records what it was asked to send.
#[derive(Clone, Default)]
pub(crate) struct RecordingSession {
    pub sent: Rc<RefCell<Vec<OutboundFrame>>>,
    pub left: Rc<Cell<u32>>,
    next: Rc<Cell<u64>>,
}

impl TransportSession for RecordingSession {
    fn send(&self, frame: OutboundFrame) -> Result<SendTicket, NetError> {
        self.sent.borrow_mut().push(frame);
        let ticket = self.next.get();
        self.next.set(ticket + 1);
        Ok(SendTicket(ticket))
    }

    fn leave(&self) {
        self.left.set(self.left.get() + 1);
    }
}
