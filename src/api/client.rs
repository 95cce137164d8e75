//! HTTP client for the chat server API
//!
//! Wraps reqwest::Client with the configured base URL and user email.
//! There is no authentication; the email identifies the user.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::Config;
use crate::error::ChatError;

pub struct ChatClient {
    http: reqwest::Client,
    base: String,
    email: String,
}

impl ChatClient {
    pub fn new(config: &Config) -> Result<Self> {
        let email = config.email()?.to_string();
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base: config.api_base.trim_end_matches('/').to_string(),
            email,
        })
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    /// Absolute URL for an API path such as `/chat/new/`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// GET with query parameters, decoding a JSON body.
    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = self.url(path);
        tracing::debug!("API GET {}", url);

        let resp = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| ChatError::Request(e.to_string()))
            .with_context(|| format!("GET {} failed", url))?;

        let resp = check_response(resp, &url).await?;
        resp.json()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))
    }

    /// Send a JSON body with `method`, returning the checked response.
    pub async fn send_json(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response> {
        let url = self.url(path);
        tracing::debug!("API {} {}", method, url);

        let resp = self
            .http
            .request(method.clone(), &url)
            .json(body)
            .send()
            .await
            .map_err(|e| ChatError::Request(e.to_string()))
            .with_context(|| format!("{} {} failed", method, url))?;

        check_response(resp, &url).await
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Check HTTP response status code and return a clear error on failure.
async fn check_response(resp: reqwest::Response, url: &str) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    tracing::debug!("HTTP {} for {}: {}", status.as_u16(), url, body);
    Err(ChatError::Request(error_message(status, &body)).into())
}

/// The server's `{"error": ..}` text when present, else the status line.
fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(b) if !b.error.trim().is_empty() => b.error,
        _ => format!(
            "HTTP {} {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("error")
        ),
    }
}
