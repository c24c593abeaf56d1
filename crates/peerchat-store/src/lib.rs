//! # peerchat-store
//!
//! Local settings storage for peerchat, backed by SQLite.
//!
//! Only small preferences live here: the login credentials, the theme and
//! the panel size. Chat history is never written to disk. Values are JSON
//! encoded under a namespaced key.

pub mod database;
pub mod migrations;
pub mod models;
pub mod settings;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
