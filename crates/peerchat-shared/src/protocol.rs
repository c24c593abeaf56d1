use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::constants::MAX_DEVICE_NAME_LEN;
use crate::error::ProtocolError;
use crate::types::FileMetadata;

/// The fixed set of named channels declared on every room session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelName {
    /// Device name announce
    DeviceName,
    /// Rename advice after a name collision
    Advice,
    /// Plain text message
    Text,
    /// File transfer handshake (send / accept / reject / cancel)
    FileRequest,
    /// File bytes, with a companion progress stream
    File,
}

impl ChannelName {
    pub const ALL: [ChannelName; 5] = [
        ChannelName::DeviceName,
        ChannelName::Advice,
        ChannelName::Text,
        ChannelName::FileRequest,
        ChannelName::File,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelName::DeviceName => "deviceName",
            ChannelName::Advice => "advice",
            ChannelName::Text => "text",
            ChannelName::FileRequest => "fileRequest",
            ChannelName::File => "file",
        }
    }

    pub fn parse(name: &str) -> Result<Self, ProtocolError> {
        Self::ALL
            .into_iter()
            .find(|channel| channel.as_str() == name)
            .ok_or_else(|| ProtocolError::UnknownChannel(name.to_string()))
    }
}

impl std::fmt::Display for ChannelName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value that travels over a named channel.
///
/// Decoding always runs [`Payload::validate`], so a value obtained through
/// [`Payload::from_bytes`] has the expected shape.
pub trait Payload: Serialize + DeserializeOwned + Sized {
    fn validate(&self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(bincode::serialize(self)?)
    }

    fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        let value: Self = bincode::deserialize(data)?;
        value.validate()?;
        Ok(value)
    }
}

/// Plain text message body.
impl Payload for String {}

/// Announced display name of the sending device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceName(pub String);

impl Payload for DeviceName {
    fn validate(&self) -> Result<(), ProtocolError> {
        validate_device_name(&self.0)
    }
}

pub fn validate_device_name(name: &str) -> Result<(), ProtocolError> {
    if name.trim().is_empty() {
        return Err(ProtocolError::invalid("device_name", "empty"));
    }
    if name.chars().count() > MAX_DEVICE_NAME_LEN {
        return Err(ProtocolError::invalid(
            "device_name",
            format!("longer than {MAX_DEVICE_NAME_LEN} characters"),
        ));
    }
    Ok(())
}

/// Control message used to settle name collisions. Never stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Advice {
    /// Adopt `name` as the local device name.
    Rename { name: String },
}

impl Payload for Advice {
    fn validate(&self) -> Result<(), ProtocolError> {
        match self {
            Advice::Rename { name } => validate_device_name(name),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FileRequestKind {
    Send,
    Accept,
    Reject,
    Cancel,
}

impl std::fmt::Display for FileRequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FileRequestKind::Send => "send",
            FileRequestKind::Accept => "accept",
            FileRequestKind::Reject => "reject",
            FileRequestKind::Cancel => "cancel",
        };
        f.write_str(s)
    }
}

/// Handshake request for one transfer id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileRequest {
    pub kind: FileRequestKind,
    pub file: FileMetadata,
}

impl FileRequest {
    pub fn new(kind: FileRequestKind, file: FileMetadata) -> Self {
        Self { kind, file }
    }
}

impl Payload for FileRequest {
    fn validate(&self) -> Result<(), ProtocolError> {
        self.file.validate()
    }
}

/// File metadata rides along with every file-bytes payload and progress tick.
impl Payload for FileMetadata {
    fn validate(&self) -> Result<(), ProtocolError> {
        FileMetadata::validate(self)
    }
}

/// Convert a transport progress fraction (0.0 ..= 1.0) to whole percent.
///
/// Values outside the range are clamped; NaN and infinities are refused.
pub fn percent_from_fraction(fraction: f32) -> Result<u8, ProtocolError> {
    if !fraction.is_finite() {
        return Err(ProtocolError::invalid("progress", format!("{fraction}")));
    }
    Ok((fraction.clamp(0.0, 1.0) * 100.0).round() as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FileId;

    fn request(kind: FileRequestKind) -> FileRequest {
        FileRequest::new(
            kind,
            FileMetadata {
                id: FileId::new(),
                name: "photo.png".into(),
                mime_type: "image/png".into(),
                size: 2048,
            },
        )
    }

    #[test]
    fn test_file_request_decodes() {
        let req = request(FileRequestKind::Accept);
        let bytes = req.to_bytes().unwrap();
        assert_eq!(FileRequest::from_bytes(&bytes).unwrap(), req);
    }

    #[test]
    fn test_garbage_is_malformed() {
        let err = FileRequest::from_bytes(&[0xff, 0x01]).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn test_invalid_metadata_is_refused() {
        let mut req = request(FileRequestKind::Send);
        req.file.name.clear();
        let bytes = bincode::serialize(&req).unwrap();
        let err = FileRequest::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, ProtocolError::Invalid { .. }));
    }

    #[test]
    fn test_advice_requires_name() {
        let bytes = bincode::serialize(&Advice::Rename { name: String::new() }).unwrap();
        assert!(Advice::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_channel_names() {
        for channel in ChannelName::ALL {
            assert_eq!(ChannelName::parse(channel.as_str()).unwrap(), channel);
        }
        assert!(ChannelName::parse("voice").is_err());
    }

    #[test]
    fn test_percent_from_fraction() {
        assert_eq!(percent_from_fraction(0.0).unwrap(), 0);
        assert_eq!(percent_from_fraction(0.424).unwrap(), 42);
        assert_eq!(percent_from_fraction(1.7).unwrap(), 100);
        assert_eq!(percent_from_fraction(-0.3).unwrap(), 0);
        assert!(percent_from_fraction(f32::NAN).is_err());
    }
}
