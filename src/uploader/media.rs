use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Jpeg,
    Png,
    Mp4,
}

impl MediaType {
    /// Every type X accepts through this service
    const SUPPORTED: [MediaType; 3] = [MediaType::Jpeg, MediaType::Png, MediaType::Mp4];

    /// Parse a declared content type. Parameters such as `; charset=binary`
    /// and letter case are ignored.
    pub fn from_content_type(content_type: &str) -> AppResult<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        Self::SUPPORTED
            .into_iter()
            .find(|media_type| media_type.mime() == essence)
            .ok_or_else(|| AppError::unsupported_media_type(content_type))
    }

    pub fn mime(&self) -> &'static str {
        match self {
            MediaType::Jpeg => "image/jpeg",
            MediaType::Png => "image/png",
            MediaType::Mp4 => "video/mp4",
        }
    }

    pub fn is_video(&self) -> bool {
        self.mime().starts_with("video/")
    }

    pub fn media_category(&self) -> &'static str {
        if self.is_video() {
            "tweet_video"
        } else {
            "tweet_image"
        }
    }
}

/// Opaque handle the posting service assigns to uploaded media
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaId(String);

impl MediaId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Media payload handed to the uploader. The content type is kept as declared
/// by the client and only checked when the upload starts.
#[derive(Debug, Clone)]
pub struct MediaAsset {
    bytes: Bytes,
    content_type: String,
}

impl MediaAsset {
    pub fn new(bytes: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.into(),
        }
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn media_type(&self) -> AppResult<MediaType> {
        MediaType::from_content_type(&self.content_type)
    }
}
