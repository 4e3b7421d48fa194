use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, State};
use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::security::InputValidator;
use crate::server::{AppState, SharedState};
use crate::staging::StagedMedia;
use crate::tweet::{self, MediaSource, TweetOutcome, TweetRequest};
use crate::uploader::{Credentials, MediaType};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TweetResponse {
    pub success: bool,
    pub message: String,
    pub tweet_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tweet_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_id: Option<String>,
}

impl From<TweetOutcome> for TweetResponse {
    fn from(outcome: TweetOutcome) -> Self {
        Self {
            success: true,
            message: "Tweet posted!".to_string(),
            tweet_id: outcome.post.id,
            tweet_url: outcome.post.url,
            media_id: outcome.media_id.map(|id| id.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub async fn post_tweet(
    State(state): State<SharedState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    let request_id = Uuid::new_v4();
    log::info!("[{}] POST /api/tweet", request_id);

    let request = match read_tweet_form(&state, &headers, multipart).await {
        Ok(request) => request,
        Err(e) => return error_response(request_id, e),
    };

    // The upload runs in its own task; if this handler is dropped because the
    // client went away, the guard cancels the token and the task stops.
    let cancel = state.shutdown.child_token();
    let guard = cancel.clone().drop_guard();

    let task_state = state.clone();
    let task_cancel = cancel.clone();
    let task =
        tokio::spawn(async move { tweet::post_tweet(&task_state, request, &task_cancel).await });

    let result = match task.await {
        Ok(result) => result,
        Err(e) => Err(AppError::Internal(format!("tweet task failed: {}", e))),
    };
    guard.disarm();

    match result {
        Ok(outcome) => {
            log::info!(
                "[{}] Tweet posted: {} (media: {})",
                request_id,
                outcome.post.id,
                outcome
                    .media_id
                    .as_ref()
                    .map(|id| id.as_str())
                    .unwrap_or("none")
            );
            (StatusCode::OK, Json(TweetResponse::from(outcome))).into_response()
        }
        Err(e) => error_response(request_id, e),
    }
}

async fn read_tweet_form(
    state: &AppState,
    headers: &HeaderMap,
    mut multipart: Multipart,
) -> AppResult<TweetRequest> {
    let mut text = String::new();
    let mut access_token: Option<String> = None;
    let mut media_url: Option<String> = None;
    let mut staged: Option<StagedMedia> = None;

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "text" => text = field.text().await.map_err(multipart_error)?,
            "accessToken" | "access_token" => {
                access_token = Some(field.text().await.map_err(multipart_error)?)
            }
            "mediaUrl" | "media_url" => {
                let value = field.text().await.map_err(multipart_error)?;
                if !value.trim().is_empty() {
                    media_url = Some(value);
                }
            }
            "media" => {
                // Browsers send an empty, unnamed part when no file was picked
                if field.file_name() == Some("") {
                    continue;
                }
                if staged.is_some() {
                    return Err(AppError::validation("media", "Only one media file per post"));
                }

                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                MediaType::from_content_type(&content_type)?;

                let mut media = StagedMedia::create(
                    &state.temp_dir,
                    &content_type,
                    field.file_name(),
                    state.max_media_bytes,
                )?;
                while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
                    media.write_chunk(&chunk).await?;
                }

                log::debug!(
                    "Staged {} ({} bytes, {})",
                    media.file_name().unwrap_or("unnamed upload"),
                    media.size(),
                    media.content_type()
                );
                staged = Some(media);
            }
            other => log::debug!("Ignoring form field '{}'", other),
        }
    }

    let access_token = access_token
        .filter(|token| !token.trim().is_empty())
        .or_else(|| bearer_token(headers))
        .ok_or_else(|| AppError::validation("accessToken", "Missing required credentials"))?;
    InputValidator::validate_access_token(&access_token)?;

    let media = match (staged, media_url) {
        (Some(_), Some(_)) => {
            return Err(AppError::validation(
                "media",
                "Provide either a media file or mediaUrl, not both",
            ))
        }
        (Some(staged), None) => Some(MediaSource::Staged(staged)),
        (None, Some(url)) => Some(MediaSource::Url(InputValidator::validate_media_url(&url)?)),
        (None, None) => None,
    };

    let request = TweetRequest {
        text,
        credentials: Credentials::new(access_token),
        media,
    };
    request.validate()?;
    Ok(request)
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

fn multipart_error(error: MultipartError) -> AppError {
    AppError::validation("body", &error.body_text())
}

pub fn status_for(error: &AppError) -> StatusCode {
    if error.is_validation() {
        StatusCode::BAD_REQUEST
    } else if error.is_cancelled() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

fn error_response(request_id: Uuid, error: AppError) -> Response {
    let status = status_for(&error);

    let body = if error.is_validation() {
        log::warn!("[{}] Rejected request: {}", request_id, error);
        ErrorResponse {
            error: error.to_string(),
            details: None,
        }
    } else if error.is_cancelled() {
        log::info!("[{}] {}", request_id, error);
        ErrorResponse {
            error: "Request cancelled".to_string(),
            details: Some(error.to_string()),
        }
    } else {
        if error.is_soft_failure() {
            log::warn!("[{}] {}", request_id, error);
        } else {
            log::error!("[{}] Failed to tweet: {}", request_id, error);
        }
        ErrorResponse {
            error: "Failed to tweet".to_string(),
            details: Some(error.to_string()),
        }
    };

    (status, Json(body)).into_response()
}
