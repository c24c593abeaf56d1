//! # peerchat-client
//!
//! Devices, file transfers and the room coordinator on top of a
//! `peerchat-net` room session, plus the persisted application state and the
//! terminal command layer used by the `peerchat` binary.

pub mod commands;
pub mod config;
pub mod device;
pub mod events;
pub mod format;
pub mod message;
pub mod room;
pub mod source;
pub mod state;
pub mod transfer;

mod context;
mod error;

#[cfg(test)]
mod testing;

use tracing_subscriber::{fmt, EnvFilter};

pub use config::ClientConfig;
pub use device::Device;
pub use error::{ClientError, Result};
pub use events::{ChatEvent, EventBus};
pub use message::{Message, MessageContent, MessageLog};
pub use room::Room;
pub use source::{FileSource, MemorySource, PathSource};
pub use state::AppState;
pub use transfer::{FileStatus, FileTransfer};

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("peerchat=info,peerchat_client=info,peerchat_net=info,peerchat_store=info,warn")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();
}
