/// Protocol version string for libp2p identify
pub const PROTOCOL_VERSION: &str = "/peerchat/1.0.0";

/// Application name
pub const APP_NAME: &str = "peerchat";

/// Prefix of the application scope a room is joined under (`<prefix><login>`)
pub const APP_SCOPE_PREFIX: &str = "p2p-chat:";

/// Topic every device of one login joins
pub const ROOM_TOPIC: &str = "common-room";

/// Namespace under which settings are persisted
pub const STORAGE_NAMESPACE: &str = "peerchat";

/// XChaCha20-Poly1305 nonce size in bytes
pub const NONCE_SIZE: usize = 24;

/// Symmetric key size in bytes (for XChaCha20-Poly1305)
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// Maximum size of a single transport frame in bytes (256 KiB)
pub const MAX_MESSAGE_SIZE: usize = 262_144;

/// Payload bytes carried per transport chunk (64 KiB)
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Maximum file transfer size in bytes (50 MiB)
pub const MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Maximum length of a device display name in characters
pub const MAX_DEVICE_NAME_LEN: usize = 64;

/// GossipSub heartbeat interval in seconds
pub const GOSSIPSUB_HEARTBEAT_SECS: u64 = 1;

/// Default QUIC listen port
pub const DEFAULT_QUIC_PORT: u16 = 4001;

/// Key derivation contexts (BLAKE3)
pub const KDF_CONTEXT_ROOM_KEY: &str = "peerchat-room-key-v1";
pub const KDF_CONTEXT_ROOM_TOPIC: &str = "peerchat-room-topic-v1";
pub const KDF_CONTEXT_PASSWORD: &str = "peerchat-password-v1";
