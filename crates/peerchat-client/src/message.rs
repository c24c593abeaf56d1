//! Per-device message history. Text and file entries share one ordered log;
//! insertion order is display order.

use std::rc::Rc;

use chrono::{DateTime, Utc};

use peerchat_shared::types::{Direction, FileId};

use crate::transfer::FileTransfer;

#[derive(Debug, Clone)]
pub enum MessageContent {
    Text(String),
    File(FileTransfer),
}

#[derive(Debug)]
pub struct Message {
    pub direction: Direction,
    pub timestamp: DateTime<Utc>,
    pub content: MessageContent,
}

impl Message {
    pub fn text(direction: Direction, text: impl Into<String>) -> Self {
        Self {
            direction,
            timestamp: Utc::now(),
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn file(direction: Direction, transfer: FileTransfer) -> Self {
        Self {
            direction,
            timestamp: Utc::now(),
            content: MessageContent::File(transfer),
        }
    }

    pub fn transfer(&self) -> Option<&FileTransfer> {
        match &self.content {
            MessageContent::File(transfer) => Some(transfer),
            MessageContent::Text(_) => None,
        }
    }

    /// One-line summary for list views.
    pub fn preview(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::File(transfer) => crate::format::transfer_summary(transfer),
        }
    }

    /// Release the message. A file entry disposes its transfer.
    pub(crate) fn dispose(&self) {
        if let MessageContent::File(transfer) = &self.content {
            transfer.dispose();
        }
    }
}

#[derive(Debug, Default)]
pub struct MessageLog {
    messages: Vec<Rc<Message>>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) -> Rc<Message> {
        let message = Rc::new(message);
        self.messages.push(message.clone());
        message
    }

    /// Remove exactly the given entry, if it is in the log.
    pub fn remove(&mut self, message: &Rc<Message>) -> Option<Rc<Message>> {
        let index = self.messages.iter().position(|m| Rc::ptr_eq(m, message))?;
        Some(self.messages.remove(index))
    }

    pub fn get(&self, index: usize) -> Option<&Rc<Message>> {
        self.messages.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rc<Message>> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Rc<Message>> {
        self.messages.last()
    }

    pub fn find_transfer(&self, id: FileId) -> Option<FileTransfer> {
        self.messages
            .iter()
            .filter_map(|m| m.transfer())
            .find(|transfer| transfer.id() == id)
            .cloned()
    }

    pub(crate) fn drain(&mut self) -> Vec<Rc<Message>> {
        std::mem::take(&mut self.messages)
    }
}
