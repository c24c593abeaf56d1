//! Persisted application state: who is logged in and the UI preferences.
//!
//! Message history is never persisted; only credentials, theme and panel
//! size survive a restart.

use tracing::info;

use peerchat_shared::Credentials;
use peerchat_store::{Database, Theme};

use crate::error::{ClientError, Result};

pub struct AppState {
    /// Settings database.
    pub database: Database,

    /// `None` until the user logs in, or after logout.
    pub credentials: Option<Credentials>,

    pub theme: Theme,

    /// Width of the device list panel, when the user resized it.
    pub panel_size: Option<u32>,
}

impl AppState {
    /// Load everything stored in `database`.
    pub fn load(database: Database) -> Result<Self> {
        let credentials = database.load_credentials()?;
        let theme = database.theme()?;
        let panel_size = database.panel_size()?;
        Ok(Self {
            database,
            credentials,
            theme,
            panel_size,
        })
    }

    pub fn is_logged_in(&self) -> bool {
        self.credentials.is_some()
    }

    pub fn credentials(&self) -> Result<&Credentials> {
        self.credentials.as_ref().ok_or(ClientError::NotLoggedIn)
    }

    pub fn login(&mut self, login: &str, password: &str, device_name: &str) -> Result<&Credentials> {
        let credentials = Credentials::from_password(login, password, device_name)?;
        self.database.save_credentials(&credentials)?;
        info!(login = %credentials.login, device = %credentials.device_name, "Logged in");
        Ok(self.credentials.insert(credentials))
    }

    pub fn logout(&mut self) -> Result<()> {
        self.database.clear_credentials()?;
        if let Some(credentials) = self.credentials.take() {
            info!(login = %credentials.login, "Logged out");
        }
        Ok(())
    }

    /// Keep the stored device name in step with the room's local name.
    pub fn set_device_name(&mut self, name: &str) -> Result<()> {
        let credentials = self.credentials.as_mut().ok_or(ClientError::NotLoggedIn)?;
        if credentials.device_name == name {
            return Ok(());
        }
        credentials.device_name = name.to_string();
        self.database.save_credentials(credentials)?;
        Ok(())
    }

    pub fn set_theme(&mut self, theme: Theme) -> Result<()> {
        self.database.set_theme(theme)?;
        self.theme = theme;
        Ok(())
    }

    pub fn set_panel_size(&mut self, size: Option<u32>) -> Result<()> {
        self.database.set_panel_size(size)?;
        self.panel_size = size;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_state() {
        let state = AppState::load(Database::open_in_memory().unwrap()).unwrap();
        assert!(!state.is_logged_in());
        assert_eq!(state.theme, Theme::System);
        assert_eq!(state.panel_size, None);
        assert!(matches!(state.credentials(), Err(ClientError::NotLoggedIn)));
    }

    #[test]
    fn test_state_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("peerchat.db");

        let mut state = AppState::load(Database::open_at(&path).unwrap()).unwrap();
        state.login("alice", "pw", "Laptop").unwrap();
        state.set_device_name("Laptop (1)").unwrap();
        state.set_theme(Theme::Dark).unwrap();
        state.set_panel_size(Some(320)).unwrap();
        drop(state);

        let state = AppState::load(Database::open_at(&path).unwrap()).unwrap();
        let credentials = state.credentials().unwrap();
        assert_eq!(credentials.login, "alice");
        assert_eq!(credentials.device_name, "Laptop (1)");
        assert_eq!(state.theme, Theme::Dark);
        assert_eq!(state.panel_size, Some(320));
    }

    #[test]
    fn test_logout_clears_credentials_only() {
        let mut state = AppState::load(Database::open_in_memory().unwrap()).unwrap();
        state.login("alice", "pw", "Laptop").unwrap();
        state.set_theme(Theme::Light).unwrap();
        state.logout().unwrap();

        assert!(!state.is_logged_in());
        assert!(state.database.load_credentials().unwrap().is_none());
        assert_eq!(state.database.theme().unwrap(), Theme::Light);
        assert!(matches!(state.set_device_name("x"), Err(ClientError::NotLoggedIn)));
    }

    #[test]
    fn test_bad_login_is_refused() {
        let mut state = AppState::load(Database::open_in_memory().unwrap()).unwrap();
        assert!(matches!(state.login("alice", "", "Laptop"), Err(ClientError::Protocol(_))));
        assert!(!state.is_logged_in());
    }
}
