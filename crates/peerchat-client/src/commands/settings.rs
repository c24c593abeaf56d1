use tracing::info;

use peerchat_store::Theme;

use super::Outcome;
use crate::error::Result;
use crate::state::AppState;

pub fn set_theme(state: &mut AppState, theme: Theme) -> Result<Outcome> {
    state.set_theme(theme)?;
    info!(theme = %theme, "Theme updated");
    Ok(Outcome::line(format!("Theme: {theme}")))
}

pub fn set_panel(state: &mut AppState, width: Option<u32>) -> Result<Outcome> {
    state.set_panel_size(width)?;
    Ok(match width {
        Some(width) => Outcome::line(format!("Panel width: {width}")),
        None => Outcome::line("Panel width reset"),
    })
}

pub fn logout(state: &mut AppState) -> Result<Outcome> {
    state.logout()?;
    Ok(Outcome::Logout)
}
