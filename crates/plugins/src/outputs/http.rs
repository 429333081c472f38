// HTTP output: POST each batch as a JSON array

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use duct_core::domain::{ComponentConfig, DomainError, Event};
use duct_core::port::{DeliveryError, OutputPlugin};

use crate::error::PluginError;

const DEFAULT_TIMEOUT_SECS: f64 = 10.0;

/// **Configuration**: `url` (required), `timeout` (seconds, default 10),
/// `user` and `password` for basic auth
pub struct HttpOutput {
    client: Client,
    url: String,
    credentials: Option<(String, Option<String>)>,
}

impl HttpOutput {
    pub fn from_config(config: &ComponentConfig) -> Result<Self, PluginError> {
        let url = config.require_str("url")?;
        let timeout = config.f64_or("timeout", DEFAULT_TIMEOUT_SECS)?;
        if timeout <= 0.0 || !timeout.is_finite() {
            return Err(DomainError::InvalidSetting {
                key: "timeout".to_string(),
                reason: format!("must be a positive number of seconds, got {}", timeout),
            }
            .into());
        }

        let client = Client::builder()
            .timeout(Duration::from_secs_f64(timeout))
            .build()
            .map_err(|e| PluginError::Client(e.to_string()))?;

        let credentials = config
            .str("user")?
            .map(|user| Ok::<_, DomainError>((user, config.str("password")?)))
            .transpose()?;

        Ok(Self {
            client,
            url,
            credentials,
        })
    }
}

#[async_trait]
impl OutputPlugin for HttpOutput {
    fn name(&self) -> &str {
        "http"
    }

    async fn send(&self, events: &[Event]) -> Result<(), DeliveryError> {
        let mut request = self.client.post(&self.url).json(events);
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, password.as_ref());
        }

        let response = request
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!(url = %self.url, events = events.len(), "Batch posted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(service: &str) -> Event {
        Event::builder(service, "web01").metric(1.0).build()
    }

    fn output(url: String, extra: serde_json::Value) -> HttpOutput {
        let mut value = json!({ "url": url });
        if let (Some(base), Some(extra)) = (value.as_object_mut(), extra.as_object()) {
            base.extend(extra.clone());
        }
        HttpOutput::from_config(&ComponentConfig::from_value(value).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_posts_json_array() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/events")
            .match_header("content-type", "application/json")
            .match_body(mockito::Matcher::AllOf(vec![
                mockito::Matcher::Regex(r#"^\[\{"#.to_string()),
                mockito::Matcher::Regex(r#""service":"cpu""#.to_string()),
                mockito::Matcher::Regex(r#""service":"mem""#.to_string()),
            ]))
            .with_status(200)
            .create_async()
            .await;

        let output = output(format!("{}/events", server.url()), json!({}));
        output.send(&[event("cpu"), event("mem")]).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_success_status_is_rejection() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/events")
            .with_status(503)
            .with_body("overloaded")
            .create_async()
            .await;

        let output = output(format!("{}/events", server.url()), json!({}));
        let result = output.send(&[event("cpu")]).await;

        match result {
            Err(DeliveryError::Rejected { status, body }) => {
                assert_eq!(status, 503);
                assert_eq!(body, "overloaded");
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_basic_auth_header() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_header("authorization", "Basic ZHVjdDpzZWNyZXQ=")
            .with_status(204)
            .create_async()
            .await;

        let output = output(format!("{}/", server.url()), json!({"user": "duct", "password": "secret"}));
        output.send(&[event("cpu")]).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let output = output("http://127.0.0.1:9/events".to_string(), json!({"timeout": 1}));
        let result = output.send(&[event("cpu")]).await;

        assert!(matches!(result, Err(DeliveryError::Transport(_))));
    }

    #[test]
    fn test_url_is_required() {
        let result = HttpOutput::from_config(&ComponentConfig::default());
        assert!(matches!(result, Err(PluginError::Config(DomainError::MissingSetting(_)))));
    }
}
