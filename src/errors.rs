use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("Unsupported media type: {content_type}")]
    UnsupportedMediaType { content_type: String },

    #[error("Text too long: {length} characters (maximum is {max})")]
    TextTooLong { length: usize, max: usize },

    #[error("A post needs text or media")]
    EmptyPost,

    #[error("Media too large: {size} bytes (maximum is {max} bytes)")]
    FileTooLarge { size: u64, max: u64 },

    #[error("{operation} failed: {message}")]
    RemoteService { operation: String, message: String },

    #[error("Media processing failed for {media_id}: {reason}")]
    MediaProcessingFailed { media_id: String, reason: String },

    #[error("Media {media_id} still processing after {attempts} status checks")]
    ProcessingTimeout { media_id: String, attempts: u32 },

    #[error("Upload cancelled during {phase}")]
    Cancelled { phase: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Custom result type
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(field: &str, message: &str) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.to_string(),
        }
    }

    pub fn unsupported_media_type(content_type: &str) -> Self {
        Self::UnsupportedMediaType {
            content_type: content_type.to_string(),
        }
    }

    /// Wrap a failed call to the posting service, keeping the underlying message.
    pub fn remote(operation: &str, message: impl std::fmt::Display) -> Self {
        Self::RemoteService {
            operation: operation.to_string(),
            message: message.to_string(),
        }
    }

    pub fn cancelled(phase: &str) -> Self {
        log::debug!("Upload cancelled during {}", phase);
        Self::Cancelled {
            phase: phase.to_string(),
        }
    }

    /// Errors raised before any remote call is made; the caller sent a bad request.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AppError::Validation { .. }
                | AppError::UnsupportedMediaType { .. }
                | AppError::TextTooLong { .. }
                | AppError::EmptyPost
                | AppError::FileTooLarge { .. }
        )
    }

    /// The media may still finish server-side; this request just stopped waiting.
    pub fn is_soft_failure(&self) -> bool {
        matches!(self, AppError::ProcessingTimeout { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, AppError::Cancelled { .. })
    }
}
