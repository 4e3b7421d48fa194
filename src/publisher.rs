use tokio_util::sync::CancellationToken;

use crate::errors::{AppError, AppResult};
use crate::security::InputValidator;
use crate::uploader::{MediaId, PostReference, PostService};

#[derive(Debug, Clone, Default)]
pub struct PostRequest {
    pub text: String,
    pub media_id: Option<MediaId>,
}

pub struct Publisher<'a> {
    service: &'a dyn PostService,
}

impl<'a> Publisher<'a> {
    pub fn new(service: &'a dyn PostService) -> Self {
        Self { service }
    }

    /// Publishes exactly once. Posting is not idempotent, so a failed call is
    /// reported as-is and never retried. Cancellation is only honored before
    /// the call is sent; once in flight the call runs to completion.
    pub async fn publish(
        &self,
        request: PostRequest,
        cancel: &CancellationToken,
    ) -> AppResult<PostReference> {
        InputValidator::validate_post_text(&request.text, request.media_id.is_some())?;

        if cancel.is_cancelled() {
            return Err(AppError::cancelled("PUBLISH"));
        }

        let media_ids: Vec<MediaId> = request.media_id.into_iter().collect();
        let post = self
            .service
            .publish_post(&request.text, &media_ids)
            .await?;

        log::info!(
            "Published post {} with {} media attachment(s)",
            post.id,
            media_ids.len()
        );
        Ok(post)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uploader::test_support::{Call, FakeService};
    use async_trait::async_trait;
    use tokio::time::{sleep, Duration};

    /// Cancels the request's token while its publish call is in flight
    struct CancelsMidPublish {
        inner: FakeService,
        cancel: CancellationToken,
    }

    #[async_trait]
    impl PostService for CancelsMidPublish {
        async fn publish_post(&self, text: &str, media_ids: &[MediaId]) -> AppResult<PostReference> {
            self.cancel.cancel();
            sleep(Duration::from_millis(50)).await;
            self.inner.publish_post(text, media_ids).await
        }
    }

    #[tokio::test]
    async fn test_empty_post_rejected_without_remote_call() {
        let service = FakeService::new();
        let publisher = Publisher::new(&service);

        let result = publisher
            .publish(PostRequest::default(), &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(AppError::EmptyPost)));
        assert!(service.calls().is_empty());
    }

    #[tokio::test]
    async fn test_text_too_long_rejected() {
        let service = FakeService::new();
        let publisher = Publisher::new(&service);

        let request = PostRequest {
            text: "x".repeat(281),
            media_id: None,
        };
        let result = publisher.publish(request, &CancellationToken::new()).await;

        assert!(matches!(result, Err(AppError::TextTooLong { .. })));
        assert!(service.calls().is_empty());
    }

    #[tokio::test]
    async fn test_publish_with_media() {
        let service = FakeService::new();
        let publisher = Publisher::new(&service);

        let post = publisher
            .publish(
                PostRequest {
                    text: "hello".to_string(),
                    media_id: Some(MediaId::new("m1")),
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(post.id, "p1");
        assert_eq!(
            service.calls(),
            vec![Call::Publish {
                text: "hello".to_string(),
                media_ids: vec!["m1".to_string()]
            }]
        );
    }

    #[tokio::test]
    async fn test_media_only_post_allowed() {
        let service = FakeService::new();
        let publisher = Publisher::new(&service);

        let request = PostRequest {
            text: String::new(),
            media_id: Some(MediaId::new("m1")),
        };
        assert!(publisher.publish(request, &CancellationToken::new()).await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_publish_not_retried() {
        let service = FakeService::new().failing("PUBLISH");
        let publisher = Publisher::new(&service);

        let request = PostRequest {
            text: "hello".to_string(),
            media_id: None,
        };
        let result = publisher.publish(request, &CancellationToken::new()).await;

        assert!(matches!(result, Err(AppError::RemoteService { .. })));
        assert_eq!(service.count(|c| matches!(c, Call::Publish { .. })), 1);
    }

    #[tokio::test]
    async fn test_cancel_during_publish_lets_the_call_finish() {
        let cancel = CancellationToken::new();
        let service = CancelsMidPublish {
            inner: FakeService::new(),
            cancel: cancel.clone(),
        };
        let publisher = Publisher::new(&service);

        let request = PostRequest {
            text: "hello".to_string(),
            media_id: None,
        };
        let post = publisher.publish(request, &cancel).await.unwrap();

        assert_eq!(post.id, "p1");
        assert!(cancel.is_cancelled());
        assert_eq!(
            service.inner.count(|c| matches!(c, Call::Publish { .. })),
            1
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_publish_sends_nothing() {
        let service = FakeService::new();
        let publisher = Publisher::new(&service);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let request = PostRequest {
            text: "hello".to_string(),
            media_id: None,
        };
        let result = publisher.publish(request, &cancel).await;

        assert!(matches!(result, Err(AppError::Cancelled { .. })));
        assert!(service.calls().is_empty());
    }
}
