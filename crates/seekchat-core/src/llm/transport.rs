use reqwest::header::HeaderMap;
use url::Url;

use crate::error::{ChatError, Result};

/// Raw HTTP reply: status and body text, whatever the status.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub reason: String,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Convert a non-2xx reply into a network error carrying the body.
    pub fn into_error(self) -> ChatError {
        ChatError::network(Some(self.status), self.reason, Some(self.body))
    }
}

/// The HTTP seam used by exchanges and model discovery.
#[async_trait::async_trait]
pub trait ChatTransport: Send + Sync {
    async fn post(&self, url: Url, headers: HeaderMap, body: Vec<u8>) -> Result<HttpReply>;

    async fn get(&self, url: Url, headers: HeaderMap) -> Result<HttpReply>;
}

/// [`ChatTransport`] over a shared reqwest client.
#[derive(Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn into_reply(response: reqwest::Response) -> Result<HttpReply> {
        let status = response.status();
        let body = response.text().await?;
        Ok(HttpReply {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("").to_string(),
            body,
        })
    }
}

#[async_trait::async_trait]
impl ChatTransport for HttpTransport {
    async fn post(&self, url: Url, headers: HeaderMap, body: Vec<u8>) -> Result<HttpReply> {
        let response = self
            .client
            .post(url)
            .headers(headers)
            .body(body)
            .send()
            .await?;
        Self::into_reply(response).await
    }

    async fn get(&self, url: Url, headers: HeaderMap) -> Result<HttpReply> {
        let response = self.client.get(url).headers(headers).send().await?;
        Self::into_reply(response).await
    }
}
