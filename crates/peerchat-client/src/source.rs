//! Local file sources for outgoing transfers.
//!
//! A source describes a file up front (name, MIME type, size) and reads its
//! content only once the remote side accepted the transfer.

use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;

const FALLBACK_MIME: &str = "application/octet-stream";

pub trait FileSource {
    fn name(&self) -> &str;
    fn mime_type(&self) -> &str;
    fn size(&self) -> u64;

    /// Read the whole content. The future runs on the tokio runtime, off the
    /// room's event loop.
    fn read(&self) -> BoxFuture<'static, io::Result<Vec<u8>>>;
}

/// A file on disk.
#[derive(Debug, Clone)]
pub struct PathSource {
    path: PathBuf,
    name: String,
    mime_type: String,
    size: u64,
}

impl PathSource {
    pub async fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path).await?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a file", path.display()),
            ));
        }
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        Ok(Self {
            mime_type: guess_mime(&path).to_string(),
            name,
            size: metadata.len(),
            path,
        })
    }
}

impl FileSource for PathSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn read(&self) -> BoxFuture<'static, io::Result<Vec<u8>>> {
        tokio::fs::read(self.path.clone()).boxed()
    }
}

/// Content already in memory.
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    mime_type: String,
    content: Bytes,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            content: content.into(),
        }
    }
}

impl FileSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn size(&self) -> u64 {
        self.content.len() as u64
    }

    fn read(&self) -> BoxFuture<'static, io::Result<Vec<u8>>> {
        let content = self.content.clone();
        async move { Ok(content.to_vec()) }.boxed()
    }
}

/// MIME type from the file extension.
pub fn guess_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "txt" | "log" | "md" => "text/plain",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "csv" => "text/csv",
        "js" => "text/javascript",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        _ => FALLBACK_MIME,
    }
}
