//! Terminal command handlers.
//!
//! Each sub-module groups related commands by domain. [`parse`] turns one
//! input line into a [`Command`]; [`execute`] runs it against the room and
//! the persisted state and returns lines to print.

pub mod devices;
pub mod files;
pub mod messaging;
pub mod settings;

use std::path::PathBuf;

use peerchat_store::Theme;

use crate::device::Device;
use crate::error::{ClientError, Result};
use crate::room::Room;
use crate::state::AppState;

pub const HELP: &str = "\
<text>               send text to the selected device (//text sends '/text')
/devices             list devices
/select <n|name|->   select a device, '-' clears the selection
/history             show the conversation with the selected device
/file <path>         offer a file to the selected device
/accept [n]          accept file message n (default: latest file)
/reject [n]          reject file message n
/cancel [n]          cancel file message n
/save <n> <path>     save received file message n to path
/remove <n>          remove message n
/rename <name>       rename this device
/theme <system|light|dark>
/panel <width|->     remember the device panel width
/logout              forget the stored login and quit
/quit                leave the room and quit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Say(String),
    Devices,
    Select(Option<String>),
    History,
    SendFile(PathBuf),
    Accept(Option<usize>),
    Reject(Option<usize>),
    Cancel(Option<usize>),
    Save { index: usize, path: PathBuf },
    Remove(usize),
    Rename(String),
    Theme(Theme),
    Panel(Option<u32>),
    Logout,
    Quit,
    Help,
}

#[derive(Debug, PartialEq)]
pub enum Outcome {
    Lines(Vec<String>),
    Logout,
    Quit,
}

impl Outcome {
    pub fn line(line: impl Into<String>) -> Self {
        Outcome::Lines(vec![line.into()])
    }

    pub fn none() -> Self {
        Outcome::Lines(Vec::new())
    }
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<Command>> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Ok(None);
    }
    if let Some(escaped) = line.strip_prefix("//") {
        return Ok(Some(Command::Say(format!("/{escaped}"))));
    }
    let Some(input) = line.strip_prefix('/') else {
        return Ok(Some(Command::Say(line.to_string())));
    };

    let (name, rest) = match input.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (input, ""),
    };
    let invalid = || ClientError::InvalidCommand(line.to_string());

    let command = match name {
        "devices" | "d" => Command::Devices,
        "select" | "s" => match rest {
            "" => return Err(invalid()),
            "-" => Command::Select(None),
            query => Command::Select(Some(query.to_string())),
        },
        "history" | "h" => Command::History,
        "file" | "f" if !rest.is_empty() => Command::SendFile(PathBuf::from(rest)),
        "accept" => Command::Accept(optional_index(rest).ok_or_else(invalid)?),
        "reject" => Command::Reject(optional_index(rest).ok_or_else(invalid)?),
        "cancel" => Command::Cancel(optional_index(rest).ok_or_else(invalid)?),
        "save" => {
            let (index, path) = rest.split_once(char::is_whitespace).ok_or_else(invalid)?;
            Command::Save {
                index: index.parse().map_err(|_| invalid())?,
                path: PathBuf::from(path.trim()),
            }
        }
        "remove" | "rm" => Command::Remove(rest.parse().map_err(|_| invalid())?),
        "rename" if !rest.is_empty() => Command::Rename(rest.to_string()),
        "theme" => Command::Theme(rest.parse().map_err(|_| invalid())?),
        "panel" => match rest {
            "-" => Command::Panel(None),
            width => Command::Panel(Some(width.parse().map_err(|_| invalid())?)),
        },
        "logout" => Command::Logout,
        "quit" | "q" | "exit" => Command::Quit,
        "help" | "?" => Command::Help,
        _ => return Err(invalid()),
    };
    Ok(Some(command))
}

/// `""` is `Some(None)`, a number is `Some(Some(n))`, anything else `None`.
fn optional_index(rest: &str) -> Option<Option<usize>> {
    if rest.is_empty() {
        return Some(None);
    }
    rest.parse().ok().map(Some)
}

pub async fn execute(command: Command, room: &Room, state: &mut AppState) -> Result<Outcome> {
    match command {
        Command::Say(text) => messaging::say(room, &text),
        Command::Devices => Ok(devices::list(room)),
        Command::Select(query) => devices::select(room, query.as_deref()),
        Command::History => messaging::history(room),
        Command::SendFile(path) => files::send_file(room, &path).await,
        Command::Accept(index) => files::accept(room, index),
        Command::Reject(index) => files::reject(room, index),
        Command::Cancel(index) => files::cancel(room, index),
        Command::Save { index, path } => files::save(room, index, &path).await,
        Command::Remove(index) => messaging::remove(room, index),
        Command::Rename(name) => devices::rename(room, state, &name),
        Command::Theme(theme) => settings::set_theme(state, theme),
        Command::Panel(width) => settings::set_panel(state, width),
        Command::Logout => settings::logout(state),
        Command::Quit => Ok(Outcome::Quit),
        Command::Help => Ok(Outcome::Lines(HELP.lines().map(String::from).collect())),
    }
}

pub(crate) fn selected_device(room: &Room) -> Result<Device> {
    room.selected().ok_or(ClientError::NoSelection)
}
