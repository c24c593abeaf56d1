use thiserror::Error;

use peerchat_net::NetError;
use peerchat_shared::error::ProtocolError;
use peerchat_shared::types::{FileId, PeerId};
use peerchat_store::StoreError;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Network error: {0}")]
    Net(#[from] NetError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not logged in")]
    NotLoggedIn,

    #[error("No device matches '{0}'")]
    UnknownDevice(String),

    #[error("No device selected")]
    NoSelection,

    #[error("Device {0} is offline")]
    DeviceOffline(PeerId),

    #[error("No message #{0}")]
    UnknownMessage(usize),

    #[error("Message #{0} is not a file")]
    NotAFile(usize),

    #[error("File {0} has not been received")]
    NotReceived(FileId),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;
