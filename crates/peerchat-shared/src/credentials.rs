//! Login credentials a room is joined with.
//!
//! The login scopes the room, the password hash is the shared secret, and the
//! device name is what this device announces to its peers.

use serde::{Deserialize, Serialize};

use crate::constants::APP_SCOPE_PREFIX;
use crate::crypto::hash_password;
use crate::error::ProtocolError;
use crate::protocol::validate_device_name;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    pub login: String,
    pub hash: String,
    pub device_name: String,
}

impl Credentials {
    /// Build credentials from what the user typed; the password is hashed
    /// and never kept.
    pub fn from_password(
        login: &str,
        password: &str,
        device_name: &str,
    ) -> Result<Self, ProtocolError> {
        if password.is_empty() {
            return Err(ProtocolError::invalid("password", "empty"));
        }
        let credentials = Self {
            login: login.trim().to_string(),
            hash: hash_password(password),
            device_name: device_name.trim().to_string(),
        };
        credentials.validate()?;
        Ok(credentials)
    }

    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.login.is_empty() {
            return Err(ProtocolError::invalid("login", "empty"));
        }
        if self.hash.is_empty() {
            return Err(ProtocolError::invalid("hash", "empty"));
        }
        validate_device_name(&self.device_name)
    }

    /// Application scope the room is joined under.
    pub fn app_scope(&self) -> String {
        format!("{APP_SCOPE_PREFIX}{}", self.login)
    }
}
