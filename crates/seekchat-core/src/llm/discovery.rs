use serde::Deserialize;
use std::time::Duration;

use crate::config::Settings;
use crate::constants::{api, defaults};
use crate::context::endpoint_url;
use crate::error::{ChatError, Result};
use crate::exchange::{request_headers, REQUEST_TIMEOUT};
use crate::llm::ChatTransport;

/// A model offered by the remote endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    pub id: String,
    pub description: String,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    #[serde(default)]
    id: String,
}

/// Lists models from `GET {endpoint}/v1/models`.
pub struct ModelCatalog;

impl ModelCatalog {
    /// Fetch available models. A response without a `data` array yields an
    /// empty list; a non-2xx reply is a network error. Gives up after the
    /// same timeout as a chat exchange.
    pub async fn fetch_models(
        transport: &dyn ChatTransport,
        settings: &Settings,
    ) -> Result<Vec<ModelInfo>> {
        Self::fetch_models_within(transport, settings, REQUEST_TIMEOUT).await
    }

    pub async fn fetch_models_within(
        transport: &dyn ChatTransport,
        settings: &Settings,
        timeout: Duration,
    ) -> Result<Vec<ModelInfo>> {
        let url = endpoint_url(&settings.endpoint, api::MODELS)?;
        tracing::debug!("Fetching models from {}", url);

        let headers = request_headers(settings.api_key())?;
        let reply = tokio::time::timeout(timeout, transport.get(url, headers))
            .await
            .map_err(|_| {
                tracing::warn!("Model listing timed out after {:?}", timeout);
                ChatError::Timeout
            })??;
        if !reply.is_success() {
            return Err(reply.into_error());
        }

        let body: ModelsResponse = match serde_json::from_str(&reply.body) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!("Unexpected models response: {}", e);
                return Ok(Vec::new());
            }
        };

        Ok(body
            .data
            .into_iter()
            .filter(|m| !m.id.is_empty())
            .map(|m| ModelInfo {
                description: describe_model(&m.id).to_string(),
                id: m.id,
            })
            .collect())
    }

    /// Keep `current` when the endpoint still offers it, otherwise fall back
    /// to the first offered model, or the placeholder when there are none.
    pub fn choose_model(current: &str, models: &[ModelInfo]) -> String {
        if models.iter().any(|m| m.id == current) {
            return current.to_string();
        }
        models
            .first()
            .map(|m| m.id.clone())
            .unwrap_or_else(|| defaults::NO_MODEL.to_string())
    }
}

fn describe_model(id: &str) -> &'static str {
    match id {
        "deepseek-chat" => "General model for conversation and technical assistance.",
        "deepseek-reasoner" => "Optimized for logical and mathematical reasoning.",
        _ => "No description available.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::HttpReply;
    use reqwest::header::HeaderMap;
    use url::Url;

    struct SilentEndpoint;

    #[async_trait::async_trait]
    impl ChatTransport for SilentEndpoint {
        async fn post(&self, _url: Url, _headers: HeaderMap, _body: Vec<u8>) -> Result<HttpReply> {
            std::future::pending().await
        }

        async fn get(&self, _url: Url, _headers: HeaderMap) -> Result<HttpReply> {
            std::future::pending().await
        }
    }

    fn models(ids: &[&str]) -> Vec<ModelInfo> {
        ids.iter()
            .map(|id| ModelInfo {
                id: id.to_string(),
                description: describe_model(id).to_string(),
            })
            .collect()
    }

    #[test]
    fn test_choose_model_keeps_current() {
        let offered = models(&["deepseek-chat", "deepseek-reasoner"]);
        assert_eq!(
            ModelCatalog::choose_model("deepseek-reasoner", &offered),
            "deepseek-reasoner"
        );
    }

    #[test]
    fn test_choose_model_falls_back() {
        let offered = models(&["deepseek-chat"]);
        assert_eq!(ModelCatalog::choose_model("gone", &offered), "deepseek-chat");
        assert_eq!(ModelCatalog::choose_model("gone", &[]), "Without Model");
    }

    #[test]
    fn test_known_descriptions() {
        assert!(describe_model("deepseek-chat").starts_with("General"));
        assert_eq!(describe_model("other"), "No description available.");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_models_gives_up_on_silent_endpoint() {
        let started = tokio::time::Instant::now();
        let err = ModelCatalog::fetch_models(&SilentEndpoint, &Settings::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ChatError::Timeout));
        assert!(started.elapsed() >= REQUEST_TIMEOUT);
    }
}
