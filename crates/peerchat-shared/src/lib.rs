// Identifiers, wire payloads and helpers shared by every peerchat crate.

pub mod constants;
pub mod credentials;
pub mod crypto;
pub mod error;
pub mod protocol;
pub mod types;

pub use credentials::Credentials;
pub use error::{CryptoError, PeerchatError, ProtocolError};
pub use protocol::{Advice, ChannelName, DeviceName, FileRequest, FileRequestKind, Payload};
pub use types::{Direction, FileId, FileMetadata, PeerId};
