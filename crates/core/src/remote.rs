use crate::clip::ClipId;
use crate::error::ClassifyError;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Longest utterance the remote endpoint accepts.
pub const MAX_REMOTE_TEXT_CHARS: usize = 2000;

/// A validated answer from the remote classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteVerdict {
    pub category: ClipId,
    pub summary: Option<String>,
}

// Tests substitute `MockRemoteClassifier` for the HTTP client.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RemoteClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<RemoteVerdict, ClassifyError>;
}

#[derive(Debug, Serialize)]
struct ClassifyRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    #[serde(default)]
    summary: Option<String>,
    #[serde(alias = "clip")]
    category: String,
}

/// Parses and validates an endpoint response body.
pub fn parse_verdict(body: &str) -> Result<RemoteVerdict, ClassifyError> {
    let response: ClassifyResponse =
        serde_json::from_str(body).map_err(|e| ClassifyError::Malformed(e.to_string()))?;

    let category = response
        .category
        .parse::<ClipId>()
        .ok()
        .filter(|category| category.is_response())
        .ok_or_else(|| ClassifyError::InvalidCategory(response.category.clone()))?;

    let summary = response
        .summary
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    Ok(RemoteVerdict { category, summary })
}

/// Posts `{"text": ...}` to an HTTP endpoint that answers
/// `{"summary": ..., "category": ...}`.
pub struct HttpClassifier {
    client: Client,
    endpoint: String,
    token: Option<SecretString>,
}

impl HttpClassifier {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ClassifyError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            token: None,
        })
    }

    pub fn with_token(mut self, token: SecretString) -> Self {
        self.token = Some(token);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl RemoteClassifier for HttpClassifier {
    async fn classify(&self, text: &str) -> Result<RemoteVerdict, ClassifyError> {
        let mut request = self.client.post(&self.endpoint).json(&ClassifyRequest { text });
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClassifyError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        parse_verdict(&body)
    }
}
