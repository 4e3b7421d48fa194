use bytes::BytesMut;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::errors::{AppError, AppResult};
use crate::publisher::{PostRequest, Publisher};
use crate::security::{InputValidator, MediaHostGuard};
use crate::server::AppState;
use crate::staging::StagedMedia;
use crate::uploader::chunked::cancellable;
use crate::uploader::{Credentials, MediaAsset, MediaId, MediaType, MediaUploader, PostReference, XClient};

pub enum MediaSource {
    Staged(StagedMedia),
    Url(reqwest::Url),
}

/// Everything one `POST /api/tweet` asked for, already validated
pub struct TweetRequest {
    pub text: String,
    pub credentials: Credentials,
    pub media: Option<MediaSource>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TweetOutcome {
    pub post: PostReference,
    pub media_id: Option<MediaId>,
}

impl TweetRequest {
    /// Checks that need no network access. A request that fails here never
    /// reaches the posting service.
    pub fn validate(&self) -> AppResult<()> {
        InputValidator::validate_post_text(&self.text, self.media.is_some())?;

        if let Some(MediaSource::Staged(staged)) = &self.media {
            MediaType::from_content_type(staged.content_type())?;
        }

        Ok(())
    }
}

/// Upload the media (if any) and publish the post.
pub async fn post_tweet(
    state: &AppState,
    request: TweetRequest,
    cancel: &CancellationToken,
) -> AppResult<TweetOutcome> {
    request.validate()?;

    let client = XClient::new(
        state.http.clone(),
        state.endpoints.clone(),
        request.credentials,
    );

    let media_id = match request.media {
        Some(source) => {
            let asset = match source {
                MediaSource::Staged(staged) => staged.into_asset().await?,
                MediaSource::Url(url) => {
                    fetch_media(state, url, cancel).await?
                }
            };
            Some(MediaUploader::new(&client).upload(asset, cancel).await?)
        }
        None => None,
    };

    let post = Publisher::new(&client)
        .publish(
            PostRequest {
                text: request.text,
                media_id: media_id.clone(),
            },
            cancel,
        )
        .await?;

    Ok(TweetOutcome { post, media_id })
}

/// Client for one media download. Redirects are never followed, and unless
/// private hosts are allowed the connection is pinned to the address that was
/// checked.
async fn media_fetch_client(state: &AppState, url: &reqwest::Url) -> AppResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(state.request_timeout)
        .redirect(reqwest::redirect::Policy::none());

    if !state.allow_private_media_hosts {
        if let Some((domain, addr)) = MediaHostGuard::resolve_public(url).await? {
            builder = builder.resolve(&domain, addr);
        }
    }

    Ok(builder.build()?)
}

/// Download media given by URL. The response `Content-Type` is the declared
/// type and is checked before the body is read.
pub async fn fetch_media(
    state: &AppState,
    url: reqwest::Url,
    cancel: &CancellationToken,
) -> AppResult<MediaAsset> {
    log::info!("Fetching media from {}", url);
    let max_bytes = state.max_media_bytes;

    let download = async {
        let client = media_fetch_client(state, &url).await?;
        let response = client.get(url.clone()).send().await?;

        if response.status().is_redirection() {
            return Err(AppError::validation(
                "mediaUrl",
                "Media URL redirects; give the final location",
            ));
        }
        let mut response = response.error_for_status()?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        MediaType::from_content_type(&content_type)?;

        if let Some(length) = response.content_length() {
            if length > max_bytes {
                return Err(AppError::FileTooLarge {
                    size: length,
                    max: max_bytes,
                });
            }
        }

        let mut data = BytesMut::new();
        while let Some(chunk) = response.chunk().await? {
            let size = (data.len() + chunk.len()) as u64;
            if size > max_bytes {
                return Err(AppError::FileTooLarge {
                    size,
                    max: max_bytes,
                });
            }
            data.extend_from_slice(&chunk);
        }

        Ok::<_, AppError>(MediaAsset::new(data.freeze(), content_type))
    };

    cancellable(cancel, "FETCH", download).await
}
