use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{multipart, Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::media::{MediaId, MediaType};
use super::remote::{MediaService, PostReference, PostService, ProcessingInfo};
use crate::config::Config;
use crate::errors::{AppError, AppResult};

/// Where the client sends its requests
#[derive(Debug, Clone)]
pub struct ApiEndpoints {
    pub api_base_url: String,
    pub upload_url: String,
    pub post_url_base: String,
}

impl ApiEndpoints {
    pub fn from_config(config: &Config) -> Self {
        Self {
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            upload_url: config.upload_url.trim_end_matches('/').to_string(),
            post_url_base: config.post_url_base.trim_end_matches('/').to_string(),
        }
    }

    fn tweets_url(&self) -> String {
        format!("{}/2/tweets", self.api_base_url)
    }

    pub fn post_url(&self, post_id: &str) -> String {
        format!("{}/{}", self.post_url_base, post_id)
    }
}

/// User-context OAuth 2.0 bearer token supplied with each request
#[derive(Clone)]
pub struct Credentials {
    access_token: String,
}

impl Credentials {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into().trim().to_string(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct MediaUploadData {
    id: String,
    #[serde(default)]
    processing_info: Option<ProcessingInfo>,
}

#[derive(Debug, Deserialize)]
struct MediaStatusData {
    #[serde(default)]
    processing_info: Option<ProcessingInfo>,
}

#[derive(Debug, Deserialize)]
struct CreatedPost {
    id: String,
}

#[derive(Debug, Serialize)]
struct CreatePostBody<'a> {
    #[serde(skip_serializing_if = "str::is_empty")]
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    media: Option<CreatePostMedia<'a>>,
}

#[derive(Debug, Serialize)]
struct CreatePostMedia<'a> {
    media_ids: Vec<&'a str>,
}

/// Multipart body for the media upload endpoint
#[derive(Debug, Clone, Default)]
pub struct UploadForm {
    text_fields: Vec<(&'static str, String)>,
    media: Option<(Bytes, &'static str)>,
}

impl UploadForm {
    pub fn command(command: &str) -> Self {
        let mut form = Self::default();
        form.add_text_field("command", command.to_string());
        form
    }

    pub fn add_text_field(&mut self, key: &'static str, value: String) {
        self.text_fields.push((key, value));
    }

    pub fn set_media(&mut self, data: Bytes, mime_type: &'static str) {
        self.media = Some((data, mime_type));
    }

    pub fn build_form(self) -> AppResult<multipart::Form> {
        let mut form = multipart::Form::new();

        for (key, value) in self.text_fields {
            form = form.text(key, value);
        }

        if let Some((data, mime_type)) = self.media {
            let length = data.len() as u64;
            let part = multipart::Part::stream_with_length(data, length)
                .file_name("media")
                .mime_str(mime_type)?;
            form = form.part("media", part);
        }

        Ok(form)
    }
}

/// Client for the X media upload and post endpoints, bound to one caller's
/// credentials. Calls are never retried here.
pub struct XClient {
    client: Client,
    endpoints: ApiEndpoints,
    credentials: Credentials,
}

impl XClient {
    pub fn new(client: Client, endpoints: ApiEndpoints, credentials: Credentials) -> Self {
        Self {
            client,
            endpoints,
            credentials,
        }
    }

    async fn send(&self, operation: &str, request: RequestBuilder) -> AppResult<String> {
        let response = request
            .bearer_auth(&self.credentials.access_token)
            .send()
            .await
            .map_err(|e| AppError::remote(operation, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::remote(operation, e))?;

        log::debug!(
            "{} response {} (first 300 chars): {}",
            operation,
            status,
            truncate(&body, 300)
        );

        if status.is_success() {
            return Ok(body);
        }

        Err(AppError::remote(
            operation,
            format!("X API error {}: {}", status, extract_error_detail(&body)),
        ))
    }

    async fn post_form(&self, operation: &str, form: UploadForm) -> AppResult<String> {
        let request = self
            .client
            .post(&self.endpoints.upload_url)
            .multipart(form.build_form()?);
        self.send(operation, request).await
    }
}

fn parse_response<T: DeserializeOwned>(operation: &str, body: &str) -> AppResult<T> {
    serde_json::from_str(body).map_err(|e| {
        AppError::remote(
            operation,
            format!("unexpected response ({}): {}", e, truncate(body, 300)),
        )
    })
}

#[async_trait]
impl MediaService for XClient {
    async fn init_upload(&self, total_bytes: u64, media_type: MediaType) -> AppResult<MediaId> {
        let mut form = UploadForm::command("INIT");
        form.add_text_field("total_bytes", total_bytes.to_string());
        form.add_text_field("media_type", media_type.mime().to_string());
        form.add_text_field("media_category", media_type.media_category().to_string());

        let body = self.post_form("INIT", form).await?;
        let response: Envelope<MediaUploadData> = parse_response("INIT", &body)?;
        Ok(MediaId::new(response.data.id))
    }

    async fn append_chunk(
        &self,
        media_id: &MediaId,
        chunk: Bytes,
        segment_index: u32,
    ) -> AppResult<()> {
        let mut form = UploadForm::command("APPEND");
        form.add_text_field("media_id", media_id.to_string());
        form.add_text_field("segment_index", segment_index.to_string());
        form.set_media(chunk, "application/octet-stream");

        self.post_form("APPEND", form).await?;
        Ok(())
    }

    async fn finalize_upload(&self, media_id: &MediaId) -> AppResult<()> {
        let mut form = UploadForm::command("FINALIZE");
        form.add_text_field("media_id", media_id.to_string());

        let body = self.post_form("FINALIZE", form).await?;
        if let Ok(response) = serde_json::from_str::<Envelope<MediaUploadData>>(&body) {
            log::debug!(
                "FINALIZE for {} reported processing: {:?}",
                response.data.id,
                response.data.processing_info
            );
        }
        Ok(())
    }

    async fn processing_status(&self, media_id: &MediaId) -> AppResult<Option<ProcessingInfo>> {
        let request = self
            .client
            .get(&self.endpoints.upload_url)
            .query(&[("command", "STATUS"), ("media_id", media_id.as_str())]);

        let body = self.send("STATUS", request).await?;
        let response: Envelope<MediaStatusData> = parse_response("STATUS", &body)?;
        Ok(response.data.processing_info)
    }

    async fn upload_single_shot(&self, data: Bytes, media_type: MediaType) -> AppResult<MediaId> {
        let mut form = UploadForm::default();
        form.add_text_field("media_category", media_type.media_category().to_string());
        form.add_text_field("media_type", media_type.mime().to_string());
        form.set_media(data, media_type.mime());

        let body = self.post_form("UPLOAD", form).await?;
        let response: Envelope<MediaUploadData> = parse_response("UPLOAD", &body)?;
        Ok(MediaId::new(response.data.id))
    }
}

#[async_trait]
impl PostService for XClient {
    async fn publish_post(&self, text: &str, media_ids: &[MediaId]) -> AppResult<PostReference> {
        let body = CreatePostBody {
            text,
            media: if media_ids.is_empty() {
                None
            } else {
                Some(CreatePostMedia {
                    media_ids: media_ids.iter().map(MediaId::as_str).collect(),
                })
            },
        };

        let request = self.client.post(self.endpoints.tweets_url()).json(&body);
        let response_body = self.send("PUBLISH", request).await?;
        let response: Envelope<CreatedPost> = parse_response("PUBLISH", &response_body)?;

        Ok(PostReference {
            url: Some(self.endpoints.post_url(&response.data.id)),
            id: response.data.id,
        })
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Condense an X error body into one line. Falls back to the raw body.
pub fn extract_error_detail(body: &str) -> String {
    if body.trim().is_empty() {
        return "empty response body".to_string();
    }

    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(detail) = json.get("detail").and_then(|v| v.as_str()) {
            return detail.to_string();
        }

        if let Some(messages) = json.get("errors").and_then(|v| v.as_array()) {
            let joined: Vec<&str> = messages
                .iter()
                .filter_map(|e| e.get("message").and_then(|m| m.as_str()))
                .collect();
            if !joined.is_empty() {
                return joined.join("; ");
            }
        }

        if let Some(title) = json.get("title").and_then(|v| v.as_str()) {
            return title.to_string();
        }
    }

    truncate(body.trim(), 300)
}
