//! User-facing alerts about decisions, published to ntfy.

use std::time::Duration;

use picker_core::{NotificationEvent, NotificationKind, NtfyConfig, PickerError};
use serde::Serialize;

use crate::prompt::format_size;

const PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);
const OVERRIDE_PRIORITY: u8 = 3;
const FAILURE_PRIORITY: u8 = 1;

/// Receiver of decision alerts.
///
/// `notify` must return immediately. Delivery is best effort and a failed
/// delivery never reaches the caller.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: NotificationEvent);
}

/// A notifier that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _event: NotificationEvent) {}
}

/// ntfy publish body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NtfyMessage {
    pub topic: String,
    pub title: String,
    pub message: String,
    pub priority: u8,
    pub tags: Vec<String>,
}

impl NtfyMessage {
    /// Render an event for `topic`.
    ///
    /// # Examples
    ///
    /// ```
    /// use picker_core::{NotificationEvent, NotificationKind, Service};
    /// use picker_engine::notify::NtfyMessage;
    ///
    /// let event = NotificationEvent {
    ///     kind: NotificationKind::Failure,
    ///     service: Service::Sonarr,
    ///     media_title: "Severance".into(),
    ///     profile_name: "WEB-2160p".into(),
    ///     release: None,
    ///     reason: "LLM request timed out after 90s".into(),
    /// };
    /// let msg = NtfyMessage::from_event("media", &event);
    /// assert_eq!(msg.title, "AI Warning: Severance");
    /// assert_eq!(msg.priority, 1);
    /// ```
    pub fn from_event(topic: &str, event: &NotificationEvent) -> Self {
        let service = event.service.display_name();
        match event.kind {
            NotificationKind::Override => {
                let (release, size) = event
                    .release
                    .as_ref()
                    .map(|r| (r.title.as_str(), format_size(r.size)))
                    .unwrap_or(("Unknown", format_size(0)));
                Self {
                    topic: topic.to_string(),
                    title: format!("AI Override: {}", event.media_title),
                    message: format!(
                        "Profile: {}\nRelease: {release}\nSize: {size}\nReason: {}",
                        event.profile_name, event.reason
                    ),
                    priority: OVERRIDE_PRIORITY,
                    tags: vec![event.service.notification_tag().to_string()],
                }
            }
            NotificationKind::Failure => Self {
                topic: topic.to_string(),
                title: format!("AI Warning: {}", event.media_title),
                message: format!("Selection failed: {}\nUsing {service} default", event.reason),
                priority: FAILURE_PRIORITY,
                tags: vec!["warning".to_string()],
            },
        }
    }
}

/// Publishes events to an ntfy server.
///
/// Without a URL every event is dropped.
#[derive(Debug, Clone)]
pub struct NtfyNotifier {
    client: reqwest::Client,
    url: Option<String>,
    topic: String,
}

impl NtfyNotifier {
    /// # Errors
    ///
    /// Returns [`PickerError::Config`] if the HTTP client cannot be built.
    pub fn new(config: &NtfyConfig) -> Result<Self, PickerError> {
        let client = reqwest::Client::builder()
            .timeout(PUBLISH_TIMEOUT)
            .build()
            .map_err(|e| PickerError::Config(format!("failed to create ntfy HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: config
                .url
                .as_ref()
                .map(|u| u.trim_end_matches('/').to_string()),
            topic: config.topic.clone(),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }

    /// Send one event and wait for the server's answer.
    ///
    /// # Errors
    ///
    /// Returns [`PickerError::Notify`] on network errors or a non-2xx status.
    pub async fn publish(&self, event: &NotificationEvent) -> Result<(), PickerError> {
        let Some(url) = &self.url else {
            return Ok(());
        };
        let message = NtfyMessage::from_event(&self.topic, event);

        let response = self
            .client
            .post(url)
            .json(&message)
            .send()
            .await
            .map_err(|e| PickerError::Notify(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PickerError::Notify(format!("ntfy returned {status}")));
        }
        tracing::info!(title = %message.title, "notification sent");
        Ok(())
    }
}

impl Notifier for NtfyNotifier {
    fn notify(&self, event: NotificationEvent) {
        if !self.is_enabled() {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(media = %event.media_title, "no async runtime, notification dropped");
            return;
        };
        let notifier = self.clone();
        handle.spawn(async move {
            if let Err(e) = notifier.publish(&event).await {
                tracing::error!(media = %event.media_title, error = %e, "failed to send notification");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use picker_core::{ReleaseSummary, Service};
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn override_event() -> NotificationEvent {
        NotificationEvent {
            kind: NotificationKind::Override,
            service: Service::Radarr,
            media_title: "Dune".into(),
            profile_name: "HD-1080p".into(),
            release: Some(ReleaseSummary {
                title: "Dune.2021.1080p.WEB-DL".into(),
                size: 5_368_709_120,
            }),
            reason: "smaller size, same quality".into(),
        }
    }

    fn notifier(url: Option<String>) -> NtfyNotifier {
        NtfyNotifier::new(&NtfyConfig {
            url,
            topic: "media".into(),
        })
        .unwrap()
    }

    #[test]
    fn override_message_lists_release() {
        let msg = NtfyMessage::from_event("media", &override_event());
        assert_eq!(msg.title, "AI Override: Dune");
        assert_eq!(msg.priority, 3);
        assert_eq!(msg.tags, vec!["movie_camera"]);
        assert_eq!(
            msg.message,
            "Profile: HD-1080p\nRelease: Dune.2021.1080p.WEB-DL\nSize: 5.00 GB\nReason: smaller size, same quality"
        );
    }

    #[test]
    fn sonarr_override_uses_tv_tag() {
        let mut event = override_event();
        event.service = Service::Sonarr;
        assert_eq!(NtfyMessage::from_event("t", &event).tags, vec!["tv"]);
    }

    #[test]
    fn failure_message_names_fallback() {
        let mut event = override_event();
        event.kind = NotificationKind::Failure;
        event.release = None;
        event.reason = "choice 7 out of range".into();
        let msg = NtfyMessage::from_event("media", &event);
        assert_eq!(msg.title, "AI Warning: Dune");
        assert_eq!(msg.priority, 1);
        assert_eq!(msg.tags, vec!["warning"]);
        assert_eq!(msg.message, "Selection failed: choice 7 out of range\nUsing Radarr default");
    }

    #[tokio::test]
    async fn publish_posts_json_body() {
        let server = MockServer::start().await;
        let expected = NtfyMessage::from_event("media", &override_event());
        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_json(&expected))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = notifier(Some(format!("{}/", server.uri())));
        notifier.publish(&override_event()).await.unwrap();
    }

    #[tokio::test]
    async fn publish_reports_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = notifier(Some(server.uri()))
            .publish(&override_event())
            .await
            .unwrap_err();
        assert!(matches!(err, PickerError::Notify(_)));
    }

    #[tokio::test]
    async fn disabled_notifier_sends_nothing() {
        let notifier = notifier(None);
        assert!(!notifier.is_enabled());
        notifier.publish(&override_event()).await.unwrap();
        notifier.notify(override_event());
    }

    #[tokio::test]
    async fn notify_returns_before_delivery() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = notifier(Some(server.uri()));
        let started = std::time::Instant::now();
        notifier.notify(override_event());
        assert!(started.elapsed() < Duration::from_millis(500));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(server.received_requests().await.unwrap_or_default().len(), 1);
    }

    #[tokio::test]
    async fn notify_swallows_delivery_failure() {
        let notifier = notifier(Some("http://127.0.0.1:1".into()));
        notifier.notify(override_event());
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    #[test]
    fn notify_without_runtime_does_not_panic() {
        notifier(Some("http://127.0.0.1:1".into())).notify(override_event());
    }
}
