// Calls the uploader and publisher make against the posting service.
//
// `XClient` is the production implementation; tests swap in a recording fake.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::media::{MediaId, MediaType};
use crate::errors::AppResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingState {
    Pending,
    InProgress,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingError {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ProcessingError {
    pub fn reason(&self) -> String {
        match (&self.name, &self.message) {
            (Some(name), Some(message)) => format!("{}: {}", name, message),
            (None, Some(message)) => message.clone(),
            (Some(name), None) => name.clone(),
            (None, None) => "unknown processing error".to_string(),
        }
    }
}

/// Server-side transcoding status reported after FINALIZE
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingInfo {
    pub state: ProcessingState,
    #[serde(default)]
    pub check_after_secs: Option<u64>,
    #[serde(default)]
    pub progress_percent: Option<u8>,
    #[serde(default)]
    pub error: Option<ProcessingError>,
}

/// Identifier and canonical URL of a published post
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostReference {
    pub id: String,
    pub url: Option<String>,
}

#[async_trait]
pub trait MediaService: Send + Sync {
    /// INIT: announce a chunked upload and receive its media id.
    async fn init_upload(&self, total_bytes: u64, media_type: MediaType) -> AppResult<MediaId>;

    /// APPEND: send one chunk. `segment_index` starts at 0.
    async fn append_chunk(
        &self,
        media_id: &MediaId,
        chunk: Bytes,
        segment_index: u32,
    ) -> AppResult<()>;

    /// FINALIZE: every chunk has been accepted, start server-side processing.
    async fn finalize_upload(&self, media_id: &MediaId) -> AppResult<()>;

    /// STATUS: `None` means the service reports no processing for this media.
    async fn processing_status(&self, media_id: &MediaId) -> AppResult<Option<ProcessingInfo>>;

    async fn upload_single_shot(&self, data: Bytes, media_type: MediaType) -> AppResult<MediaId>;
}

#[async_trait]
pub trait PostService: Send + Sync {
    async fn publish_post(&self, text: &str, media_ids: &[MediaId]) -> AppResult<PostReference>;
}
