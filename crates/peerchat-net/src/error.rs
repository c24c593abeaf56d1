use thiserror::Error;

use peerchat_shared::error::{CryptoError, ProtocolError};
use peerchat_shared::types::PeerId;

#[derive(Error, Debug)]
pub enum NetError {
    #[error("Room session is closed")]
    SessionClosed,

    #[error("Peer {0} is not in the room")]
    PeerUnavailable(PeerId),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("No tokio runtime available to drive the transport")]
    NoRuntime,
}
