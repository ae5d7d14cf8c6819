//! HTTP client for the target site
//!
//! Thin wrapper over `reqwest` that maps transport failures and non-2xx
//! responses to [`HandlerError`], so handlers can use `?` throughout.

use crate::crawler::HandlerError;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Builds an HTTP client with the configured user agent
///
/// # Example
///
/// ```no_run
/// use gallery_harvest::site::build_http_client;
///
/// let client = build_http_client("Mozilla/5.0 (X11; Linux x86_64)").unwrap();
/// ```
pub fn build_http_client(user_agent: &str) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Shared client used by every site handler
#[derive(Debug, Clone)]
pub struct SiteClient {
    client: Client,
}

impl SiteClient {
    pub fn new(user_agent: &str) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(user_agent)?,
        })
    }

    /// Fetches a page body as text
    pub async fn get_text(&self, url: &str) -> Result<String, HandlerError> {
        let response = self.send(self.client.get(url), url).await?;
        response.text().await.map_err(|e| http_error(url, e))
    }

    /// Calls a JSON endpoint with query parameters
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, HandlerError> {
        let response = self.send(self.client.get(url).query(query), url).await?;
        let body = response.text().await.map_err(|e| http_error(url, e))?;
        serde_json::from_str(&body).map_err(|e| HandlerError::Parse {
            url: url.to_string(),
            message: format!("invalid JSON response: {}", e),
        })
    }

    /// Downloads a binary resource
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, HandlerError> {
        let response = self.send(self.client.get(url), url).await?;
        let bytes = response.bytes().await.map_err(|e| http_error(url, e))?;
        Ok(bytes.to_vec())
    }

    async fn send(&self, request: RequestBuilder, url: &str) -> Result<Response, HandlerError> {
        let response = request.send().await.map_err(|e| http_error(url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(HandlerError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

fn http_error(url: &str, source: reqwest::Error) -> HandlerError {
    HandlerError::Http {
        url: url.to_string(),
        source,
    }
}
