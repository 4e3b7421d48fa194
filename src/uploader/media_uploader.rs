use tokio_util::sync::CancellationToken;

use super::chunked::{cancellable, upload_chunked};
use super::media::{MediaAsset, MediaId};
use super::remote::MediaService;
use crate::errors::{AppError, AppResult};

/// Uploads one asset and returns the id the posting service assigned to it
pub struct MediaUploader<'a> {
    service: &'a dyn MediaService,
}

impl<'a> MediaUploader<'a> {
    pub fn new(service: &'a dyn MediaService) -> Self {
        Self { service }
    }

    /// Validates the asset, then picks the path by content type: video goes
    /// through the chunked INIT/APPEND/FINALIZE protocol, images are sent in
    /// a single call.
    pub async fn upload(&self, asset: MediaAsset, cancel: &CancellationToken) -> AppResult<MediaId> {
        let media_type = asset.media_type()?;

        if asset.size_bytes() == 0 {
            return Err(AppError::validation("media", "Media file is empty"));
        }

        if media_type.is_video() {
            log::info!(
                "Uploading {} ({} bytes) in chunks",
                media_type.mime(),
                asset.size_bytes()
            );
            upload_chunked(self.service, asset.bytes(), media_type, cancel).await
        } else {
            log::info!(
                "Uploading {} ({} bytes) in one request",
                media_type.mime(),
                asset.size_bytes()
            );
            let media_id = cancellable(
                cancel,
                "UPLOAD",
                self.service
                    .upload_single_shot(asset.bytes().clone(), media_type),
            )
            .await?;
            log::info!("Uploaded image as {}", media_id);
            Ok(media_id)
        }
    }
}
