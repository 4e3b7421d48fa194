use bytes::Bytes;
use std::path::Path;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

use crate::errors::{AppError, AppResult};
use crate::security::{FileSystemGuard, InputValidator};
use crate::uploader::MediaAsset;

/// Inbound media spooled to a temporary file while the request body is read.
/// Dropping it deletes the file, whichever way the request ends.
pub struct StagedMedia {
    file: NamedTempFile,
    writer: tokio::fs::File,
    content_type: String,
    file_name: Option<String>,
    size: u64,
    max_bytes: u64,
}

impl StagedMedia {
    pub fn create(
        temp_dir: &Path,
        content_type: &str,
        file_name: Option<&str>,
        max_bytes: u64,
    ) -> AppResult<Self> {
        let file = FileSystemGuard::create_staging_file(temp_dir)?;
        let writer = tokio::fs::File::from_std(file.as_file().try_clone()?);

        Ok(Self {
            file,
            writer,
            content_type: content_type.to_string(),
            file_name: file_name.map(InputValidator::sanitize_filename),
            size: 0,
            max_bytes,
        })
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> AppResult<()> {
        let size = self.size + chunk.len() as u64;
        if size > self.max_bytes {
            return Err(AppError::FileTooLarge {
                size,
                max: self.max_bytes,
            });
        }

        self.writer.write_all(chunk).await?;
        self.size = size;
        Ok(())
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    /// Read the staged bytes back and release the temporary file.
    pub async fn into_asset(mut self) -> AppResult<MediaAsset> {
        self.writer.flush().await?;
        let data = tokio::fs::read(self.file.path()).await?;

        log::debug!(
            "Read {} staged bytes for {} from {}",
            data.len(),
            self.file_name.as_deref().unwrap_or("unnamed upload"),
            self.file.path().display()
        );

        Ok(MediaAsset::new(Bytes::from(data), self.content_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staging_dir() -> std::path::PathBuf {
        std::env::temp_dir().join("tweet_uploader_test_staged_media")
    }

    #[tokio::test]
    async fn test_staged_bytes_become_asset() {
        let mut staged =
            StagedMedia::create(&staging_dir(), "image/png", Some("photo.png"), 1024).unwrap();
        staged.write_chunk(b"hello ").await.unwrap();
        staged.write_chunk(b"world").await.unwrap();
        assert_eq!(staged.size(), 11);
        assert_eq!(staged.file_name(), Some("photo.png"));

        let asset = staged.into_asset().await.unwrap();
        assert_eq!(asset.bytes().as_ref(), b"hello world");
        assert_eq!(asset.content_type(), "image/png");
    }

    #[tokio::test]
    async fn test_size_limit_enforced() {
        let mut staged = StagedMedia::create(&staging_dir(), "video/mp4", None, 8).unwrap();
        staged.write_chunk(b"12345").await.unwrap();

        let result = staged.write_chunk(b"6789").await;
        assert!(matches!(result, Err(AppError::FileTooLarge { size: 9, max: 8 })));
    }

    #[tokio::test]
    async fn test_staging_file_removed_when_dropped_on_error_path() {
        let staged = StagedMedia::create(&staging_dir(), "video/mp4", None, 8).unwrap();
        let path = staged.file.path().to_path_buf();
        assert!(path.exists());

        drop(staged);
        assert!(!path.exists());
    }
}
