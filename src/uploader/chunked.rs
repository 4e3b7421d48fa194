use bytes::Bytes;
use std::future::Future;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;

use super::media::{MediaId, MediaType};
use super::remote::{MediaService, ProcessingState};
use crate::errors::{AppError, AppResult};

/// APPEND payload size; the last chunk may be shorter
pub const CHUNK_SIZE_BYTES: usize = 5 * 1024 * 1024;

/// Status checks allowed after FINALIZE before giving up
pub const MAX_STATUS_CHECKS: u32 = 10;

/// Wait between status checks when the service gives no `check_after_secs`
pub const DEFAULT_CHECK_AFTER: Duration = Duration::from_secs(5);

/// Run a remote call unless the request is cancelled first.
pub(crate) async fn cancellable<T>(
    cancel: &CancellationToken,
    phase: &str,
    call: impl Future<Output = AppResult<T>>,
) -> AppResult<T> {
    if cancel.is_cancelled() {
        return Err(AppError::cancelled(phase));
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AppError::cancelled(phase)),
        result = call => result,
    }
}

/// Progress of one chunked upload. Lives only for the duration of a single
/// `upload_chunked` call.
#[derive(Debug)]
pub struct ChunkedUploadSession {
    media_id: MediaId,
    total_bytes: u64,
    bytes_sent: u64,
    chunk_index: u32,
    finalized: bool,
    processing_state: Option<ProcessingState>,
}

impl ChunkedUploadSession {
    /// INIT. Nothing exists remotely until this succeeds, so a failure here
    /// leaves nothing to clean up.
    pub async fn init(
        service: &dyn MediaService,
        total_bytes: u64,
        media_type: MediaType,
        cancel: &CancellationToken,
    ) -> AppResult<Self> {
        let media_id = cancellable(
            cancel,
            "INIT",
            service.init_upload(total_bytes, media_type),
        )
        .await?;

        log::info!(
            "Initialized chunked upload {} ({} bytes, {})",
            media_id,
            total_bytes,
            media_type.mime()
        );

        Ok(Self {
            media_id,
            total_bytes,
            bytes_sent: 0,
            chunk_index: 0,
            finalized: false,
            processing_state: None,
        })
    }

    pub fn media_id(&self) -> &MediaId {
        &self.media_id
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn chunk_index(&self) -> u32 {
        self.chunk_index
    }

    pub fn processing_state(&self) -> Option<ProcessingState> {
        self.processing_state
    }

    /// APPEND every chunk of `data` in index order, one awaited call at a
    /// time. The first rejected chunk aborts the upload.
    pub async fn append_all(
        &mut self,
        service: &dyn MediaService,
        data: &Bytes,
        cancel: &CancellationToken,
    ) -> AppResult<()> {
        if data.len() as u64 != self.total_bytes {
            return Err(AppError::Internal(format!(
                "payload is {} bytes but session {} was initialized for {}",
                data.len(),
                self.media_id,
                self.total_bytes
            )));
        }

        while self.bytes_sent < self.total_bytes {
            let start = self.bytes_sent as usize;
            let end = (start + CHUNK_SIZE_BYTES).min(data.len());
            let chunk = data.slice(start..end);

            cancellable(
                cancel,
                "APPEND",
                service.append_chunk(&self.media_id, chunk, self.chunk_index),
            )
            .await?;

            log::debug!(
                "Appended chunk {} of {} ({}..{} of {} bytes)",
                self.chunk_index,
                self.media_id,
                start,
                end,
                self.total_bytes
            );

            self.bytes_sent = end as u64;
            self.chunk_index += 1;
        }

        log::info!(
            "Sent {} chunks for {} ({} bytes)",
            self.chunk_index,
            self.media_id,
            self.bytes_sent
        );
        Ok(())
    }

    /// FINALIZE, at most once and only after the whole payload was accepted.
    pub async fn finalize(
        &mut self,
        service: &dyn MediaService,
        cancel: &CancellationToken,
    ) -> AppResult<()> {
        if self.finalized {
            return Err(AppError::Internal(format!(
                "upload {} already finalized",
                self.media_id
            )));
        }
        if self.bytes_sent != self.total_bytes {
            return Err(AppError::Internal(format!(
                "cannot finalize {}: {} of {} bytes sent",
                self.media_id, self.bytes_sent, self.total_bytes
            )));
        }

        // Marked before the call: a failed FINALIZE is not reissued either.
        self.finalized = true;
        cancellable(cancel, "FINALIZE", service.finalize_upload(&self.media_id)).await?;
        self.processing_state = Some(ProcessingState::Pending);

        log::info!("Finalized upload {}", self.media_id);
        Ok(())
    }

    /// Poll processing status until the media is usable, processing fails,
    /// or `MAX_STATUS_CHECKS` polls have been spent.
    pub async fn await_processing(
        &mut self,
        service: &dyn MediaService,
        cancel: &CancellationToken,
    ) -> AppResult<()> {
        if !self.finalized {
            return Err(AppError::Internal(format!(
                "upload {} polled before FINALIZE",
                self.media_id
            )));
        }

        for attempt in 1..=MAX_STATUS_CHECKS {
            let status = cancellable(
                cancel,
                "STATUS",
                service.processing_status(&self.media_id),
            )
            .await?;

            let info = match status {
                Some(info) => info,
                None => {
                    log::info!("No processing reported for {}, media is ready", self.media_id);
                    self.processing_state = Some(ProcessingState::Succeeded);
                    return Ok(());
                }
            };

            self.processing_state = Some(info.state);

            match info.state {
                ProcessingState::Succeeded => {
                    log::info!(
                        "Processing succeeded for {} on attempt {}",
                        self.media_id,
                        attempt
                    );
                    return Ok(());
                }
                ProcessingState::Failed => {
                    let reason = info
                        .error
                        .map(|error| error.reason())
                        .unwrap_or_else(|| "unknown processing error".to_string());
                    log::error!(
                        "Processing failed for {} on attempt {}: {}",
                        self.media_id,
                        attempt,
                        reason
                    );
                    return Err(AppError::MediaProcessingFailed {
                        media_id: self.media_id.to_string(),
                        reason,
                    });
                }
                ProcessingState::Pending | ProcessingState::InProgress => {
                    log::debug!(
                        "Media {} is {:?} ({}%), attempt {} of {}",
                        self.media_id,
                        info.state,
                        info.progress_percent.unwrap_or(0),
                        attempt,
                        MAX_STATUS_CHECKS
                    );

                    if attempt == MAX_STATUS_CHECKS {
                        break;
                    }

                    let wait = info
                        .check_after_secs
                        .map(Duration::from_secs)
                        .unwrap_or(DEFAULT_CHECK_AFTER);

                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(AppError::cancelled("STATUS")),
                        _ = sleep(wait) => {}
                    }
                }
            }
        }

        log::warn!(
            "Giving up on {} after {} status checks; it may still finish server-side",
            self.media_id,
            MAX_STATUS_CHECKS
        );
        Err(AppError::ProcessingTimeout {
            media_id: self.media_id.to_string(),
            attempts: MAX_STATUS_CHECKS,
        })
    }

    pub fn into_media_id(self) -> MediaId {
        self.media_id
    }
}

/// INIT, APPEND every chunk, FINALIZE, then wait for processing.
pub async fn upload_chunked(
    service: &dyn MediaService,
    data: &Bytes,
    media_type: MediaType,
    cancel: &CancellationToken,
) -> AppResult<MediaId> {
    let mut session =
        ChunkedUploadSession::init(service, data.len() as u64, media_type, cancel).await?;
    session.append_all(service, data, cancel).await?;
    session.finalize(service, cancel).await?;
    session.await_processing(service, cancel).await?;
    Ok(session.into_media_id())
}
