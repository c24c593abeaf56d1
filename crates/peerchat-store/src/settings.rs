//! Namespaced key-value settings.
//!
//! Keys are stored as `<namespace>/<name>`. A stored value that no longer
//! decodes reads as absent, so a bad write never locks the user out.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use tracing::warn;

use peerchat_shared::constants::STORAGE_NAMESPACE;
use peerchat_shared::credentials::Credentials;

use crate::database::Database;
use crate::error::Result;
use crate::models::Theme;

pub const CREDENTIALS_KEY: &str = "credentials";
pub const THEME_KEY: &str = "theme";
pub const PANEL_SIZE_KEY: &str = "panel-size";

fn namespaced(key: &str) -> String {
    format!("{STORAGE_NAMESPACE}/{key}")
}

impl Database {
    pub fn read_setting<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let raw: Option<String> = self
            .conn()
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![namespaced(key)],
                |row| row.get(0),
            )
            .optional()?;

        let Some(raw) = raw else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(key, error = %e, "Ignoring undecodable setting");
                Ok(None)
            }
        }
    }

    /// Store `value` under `key`; `None` deletes the key.
    pub fn write_setting<T: Serialize>(&self, key: &str, value: Option<&T>) -> Result<()> {
        match value {
            Some(value) => {
                let json = serde_json::to_string(value)?;
                self.conn().execute(
                    "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                                    updated_at = excluded.updated_at",
                    params![namespaced(key), json, Utc::now().to_rfc3339()],
                )?;
            }
            None => {
                self.conn()
                    .execute("DELETE FROM settings WHERE key = ?1", params![namespaced(key)])?;
            }
        }
        Ok(())
    }

    /// Stored credentials; ones that fail validation read as absent.
    pub fn load_credentials(&self) -> Result<Option<Credentials>> {
        let credentials: Option<Credentials> = self.read_setting(CREDENTIALS_KEY)?;
        Ok(credentials.filter(|credentials| match credentials.validate() {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Ignoring invalid stored credentials");
                false
            }
        }))
    }

    pub fn save_credentials(&self, credentials: &Credentials) -> Result<()> {
        self.write_setting(CREDENTIALS_KEY, Some(credentials))
    }

    pub fn clear_credentials(&self) -> Result<()> {
        self.write_setting::<Credentials>(CREDENTIALS_KEY, None)
    }

    pub fn theme(&self) -> Result<Theme> {
        Ok(self.read_setting(THEME_KEY)?.unwrap_or_default())
    }

    pub fn set_theme(&self, theme: Theme) -> Result<()> {
        self.write_setting(THEME_KEY, Some(&theme))
    }

    pub fn panel_size(&self) -> Result<Option<u32>> {
        self.read_setting(PANEL_SIZE_KEY)
    }

    pub fn set_panel_size(&self, size: Option<u32>) -> Result<()> {
        self.write_setting(PANEL_SIZE_KEY, size.as_ref())
    }
}
