use super::Outcome;
use crate::device::Device;
use crate::error::{ClientError, Result};
use crate::room::Room;
use crate::state::AppState;

pub fn list(room: &Room) -> Outcome {
    let devices = room.devices();
    if devices.is_empty() {
        return Outcome::line("No devices yet");
    }
    let lines = devices
        .iter()
        .enumerate()
        .map(|(i, device)| {
            let marker = if device.is_selected() { '*' } else { ' ' };
            let presence = if device.is_online() { "online" } else { "offline" };
            let mut line = format!("{marker}{}. {} [{presence}]", i + 1, device.name());
            if device.unseen() > 0 {
                line.push_str(&format!(" ({} new)", device.unseen()));
            }
            if let Some(last) = device.last_message() {
                line.push_str(": ");
                line.push_str(&last.preview());
            }
            line
        })
        .collect();
    Outcome::Lines(lines)
}

pub fn select(room: &Room, query: Option<&str>) -> Result<Outcome> {
    let Some(query) = query else {
        room.select(None)?;
        return Ok(Outcome::line("Selection cleared"));
    };
    let device = resolve(room, query)?;
    room.select(Some(&device.peer()))?;
    Ok(Outcome::line(format!("Talking to {}", device.name())))
}

pub fn rename(room: &Room, state: &mut AppState, name: &str) -> Result<Outcome> {
    room.rename(name)?;
    let name = room.local_name();
    state.set_device_name(&name)?;
    Ok(Outcome::line(format!("This device is now {name}")))
}

/// A device by list number (1-based), exact name or peer id.
fn resolve(room: &Room, query: &str) -> Result<Device> {
    let devices = room.devices();
    if let Ok(n) = query.parse::<usize>() {
        if let Some(device) = n.checked_sub(1).and_then(|i| devices.get(i)) {
            return Ok(device.clone());
        }
    }
    devices
        .iter()
        .find(|d| d.name() == query || d.peer().as_str() == query)
        .cloned()
        .ok_or_else(|| ClientError::UnknownDevice(query.to_string()))
}
