use std::path::Path;

use tracing::info;

use super::{selected_device, Outcome};
use crate::device::Device;
use crate::error::{ClientError, Result};
use crate::format::format_size;
use crate::room::Room;
use crate::source::PathSource;
use crate::transfer::FileTransfer;

pub async fn send_file(room: &Room, path: &Path) -> Result<Outcome> {
    let device = selected_device(room)?;
    let source = PathSource::open(path).await?;
    let transfer = device.send_file(Box::new(source))?;
    info!(peer = %device.peer(), file_id = %transfer.id(), "File offered");
    Ok(Outcome::line(format!(
        "Offered {} ({}) to {}",
        transfer.name(),
        format_size(transfer.size()),
        device.name()
    )))
}

pub fn accept(room: &Room, index: Option<usize>) -> Result<Outcome> {
    let transfer = file_message(&selected_device(room)?, index)?;
    transfer.accept();
    Ok(status_line(&transfer))
}

pub fn reject(room: &Room, index: Option<usize>) -> Result<Outcome> {
    let transfer = file_message(&selected_device(room)?, index)?;
    transfer.reject();
    Ok(status_line(&transfer))
}

pub fn cancel(room: &Room, index: Option<usize>) -> Result<Outcome> {
    let transfer = file_message(&selected_device(room)?, index)?;
    transfer.cancel();
    Ok(status_line(&transfer))
}

pub async fn save(room: &Room, index: usize, path: &Path) -> Result<Outcome> {
    let transfer = file_message(&selected_device(room)?, Some(index))?;
    let written = transfer.save_to(path).await?;
    Ok(Outcome::line(format!(
        "Saved {} ({}) to {}",
        transfer.name(),
        format_size(written),
        path.display()
    )))
}

/// File message `index` (1-based), or the latest file message.
fn file_message(device: &Device, index: Option<usize>) -> Result<FileTransfer> {
    match index {
        Some(index) => {
            let message = index
                .checked_sub(1)
                .and_then(|i| device.message(i))
                .ok_or(ClientError::UnknownMessage(index))?;
            message.transfer().cloned().ok_or(ClientError::NotAFile(index))
        }
        None => device
            .messages()
            .iter()
            .rev()
            .find_map(|m| m.transfer().cloned())
            .ok_or(ClientError::UnknownMessage(device.message_count())),
    }
}

fn status_line(transfer: &FileTransfer) -> Outcome {
    Outcome::line(format!("{}: {}", transfer.name(), transfer.status()))
}
