//! Presentation helpers for list views.

use crate::transfer::{FileStatus, FileTransfer};

const UNITS: [&str; 3] = ["K", "M", "G"];

/// Human-readable byte size: `512B`, `2K`, `14M`, `3G`.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes}B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.0}{}", UNITS[unit])
}

pub fn status_icon(status: &FileStatus) -> String {
    match status {
        FileStatus::Outgoing | FileStatus::Incoming => "⏳".to_string(),
        FileStatus::Sending { progress } => format!("⬆️ {progress}%"),
        FileStatus::Receiving { progress } => format!("⬇️ {progress}%"),
        FileStatus::Sent | FileStatus::Received { .. } => "✅".to_string(),
        FileStatus::Rejected | FileStatus::Cancelled | FileStatus::Broken => "❌".to_string(),
    }
}

/// `"<file name> <status icon>"`.
pub fn transfer_summary(transfer: &FileTransfer) -> String {
    format!("{} {}", transfer.name(), status_icon(&transfer.status()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0B");
        assert_eq!(format_size(1023), "1023B");
        assert_eq!(format_size(1024), "1K");
        assert_eq!(format_size(1536), "2K");
        assert_eq!(format_size(5 * 1024 * 1024), "5M");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3G");
        assert_eq!(format_size(2048 * 1024 * 1024 * 1024), "2048G");
    }

    #[test]
    fn test_status_icon() {
        assert_eq!(status_icon(&FileStatus::Incoming), "⏳");
        assert_eq!(status_icon(&FileStatus::Sending { progress: 40 }), "⬆️ 40%");
        assert_eq!(status_icon(&FileStatus::Receiving { progress: 7 }), "⬇️ 7%");
        assert_eq!(status_icon(&FileStatus::Received { content: Bytes::new() }), "✅");
        assert_eq!(status_icon(&FileStatus::Broken), "❌");
    }
}
