use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Mutex;

use super::media::{MediaId, MediaType};
use super::remote::{
    MediaService, PostReference, PostService, ProcessingError, ProcessingInfo, ProcessingState,
};
use crate::errors::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Init { total_bytes: u64, media_type: MediaType },
    Append { media_id: String, index: u32, len: usize },
    Finalize { media_id: String },
    Status { media_id: String },
    SingleShot { len: usize, media_type: MediaType },
    Publish { text: String, media_ids: Vec<String> },
}

/// Records every call and answers from a script
pub struct FakeService {
    calls: Mutex<Vec<Call>>,
    statuses: Mutex<Vec<Option<ProcessingInfo>>>,
    pub fail_operation: Option<&'static str>,
    pub fail_append_at: Option<u32>,
}

impl FakeService {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            statuses: Mutex::new(Vec::new()),
            fail_operation: None,
            fail_append_at: None,
        }
    }

    /// Status responses returned in order; the last one repeats.
    pub fn with_statuses(self, statuses: Vec<Option<ProcessingInfo>>) -> Self {
        *self.statuses.lock().unwrap() = statuses;
        self
    }

    pub fn failing(mut self, operation: &'static str) -> Self {
        self.fail_operation = Some(operation);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn append_calls(&self) -> Vec<(u32, usize)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Append { index, len, .. } => Some((index, len)),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|call| matches(call)).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn check(&self, operation: &'static str) -> AppResult<()> {
        if self.fail_operation == Some(operation) {
            return Err(AppError::remote(operation, "503 Service Unavailable"));
        }
        Ok(())
    }
}

pub fn status(state: ProcessingState, check_after_secs: Option<u64>) -> Option<ProcessingInfo> {
    Some(ProcessingInfo {
        state,
        check_after_secs,
        progress_percent: None,
        error: None,
    })
}

pub fn failed_status(message: &str) -> Option<ProcessingInfo> {
    Some(ProcessingInfo {
        state: ProcessingState::Failed,
        check_after_secs: None,
        progress_percent: None,
        error: Some(ProcessingError {
            code: Some(1),
            name: Some("InvalidMedia".to_string()),
            message: Some(message.to_string()),
        }),
    })
}

#[async_trait]
impl MediaService for FakeService {
    async fn init_upload(&self, total_bytes: u64, media_type: MediaType) -> AppResult<MediaId> {
        self.record(Call::Init {
            total_bytes,
            media_type,
        });
        self.check("INIT")?;
        Ok(MediaId::new("v1"))
    }

    async fn append_chunk(
        &self,
        media_id: &MediaId,
        chunk: Bytes,
        segment_index: u32,
    ) -> AppResult<()> {
        self.record(Call::Append {
            media_id: media_id.to_string(),
            index: segment_index,
            len: chunk.len(),
        });
        self.check("APPEND")?;
        if self.fail_append_at == Some(segment_index) {
            return Err(AppError::remote("APPEND", "400 Bad Request: segment rejected"));
        }
        Ok(())
    }

    async fn finalize_upload(&self, media_id: &MediaId) -> AppResult<()> {
        self.record(Call::Finalize {
            media_id: media_id.to_string(),
        });
        self.check("FINALIZE")
    }

    async fn processing_status(&self, media_id: &MediaId) -> AppResult<Option<ProcessingInfo>> {
        self.record(Call::Status {
            media_id: media_id.to_string(),
        });
        self.check("STATUS")?;
        let mut statuses = self.statuses.lock().unwrap();
        if statuses.len() > 1 {
            Ok(statuses.remove(0))
        } else {
            Ok(statuses.first().cloned().flatten())
        }
    }

    async fn upload_single_shot(&self, data: Bytes, media_type: MediaType) -> AppResult<MediaId> {
        self.record(Call::SingleShot {
            len: data.len(),
            media_type,
        });
        self.check("UPLOAD")?;
        Ok(MediaId::new("m1"))
    }
}

#[async_trait]
impl PostService for FakeService {
    async fn publish_post(&self, text: &str, media_ids: &[MediaId]) -> AppResult<PostReference> {
        self.record(Call::Publish {
            text: text.to_string(),
            media_ids: media_ids.iter().map(|id| id.to_string()).collect(),
        });
        self.check("PUBLISH")?;
        Ok(PostReference {
            id: "p1".to_string(),
            url: Some("https://x.com/i/web/status/p1".to_string()),
        })
    }
}
