use peerchat_shared::types::Direction;

use super::{selected_device, Outcome};
use crate::error::{ClientError, Result};
use crate::room::Room;

pub fn say(room: &Room, text: &str) -> Result<Outcome> {
    let device = selected_device(room)?;
    device.send_text(text)?;
    Ok(Outcome::none())
}

/// The selected conversation, oldest first, numbered from 1.
pub fn history(room: &Room) -> Result<Outcome> {
    let device = selected_device(room)?;
    let lines = device
        .messages()
        .iter()
        .enumerate()
        .map(|(i, message)| {
            let arrow = match message.direction {
                Direction::Sent => "->",
                Direction::Received => "<-",
            };
            format!(
                "#{} {} {arrow} {}",
                i + 1,
                message.timestamp.format("%H:%M"),
                message.preview()
            )
        })
        .collect();
    Ok(Outcome::Lines(lines))
}

pub fn remove(room: &Room, index: usize) -> Result<Outcome> {
    let device = selected_device(room)?;
    let message = index
        .checked_sub(1)
        .and_then(|i| device.message(i))
        .ok_or(ClientError::UnknownMessage(index))?;
    device.remove_message(&message);
    Ok(Outcome::line(format!("Removed #{index}")))
}
