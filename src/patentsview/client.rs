//! PatentSearch API Client
//!
//! Rate-limited HTTP client for the PatentsView search endpoints.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use super::error::ApiError;
use super::rate_limit::RateLimiter;
use super::types::{SearchPage, SearchRequest};
use crate::config::{ApiCredentials, ApiSettings};

/// The single seam between the harvester and the upstream service.
///
/// One call is one request: implementations surface non-success statuses,
/// an `error: true` body, or an undecodable body as `ApiError`.
#[async_trait]
pub trait SearchApi: Send + Sync {
    async fn request(&self, request: &SearchRequest) -> Result<SearchPage, ApiError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMethod {
    #[default]
    Get,
    /// Same parameters sent as a JSON body; for queries too long for a URL
    Post,
}

pub struct HttpSearchClient {
    client: Client,
    base_url: String,
    credentials: ApiCredentials,
    limiter: RateLimiter,
    method: RequestMethod,
}

impl HttpSearchClient {
    pub fn new(settings: &ApiSettings, credentials: ApiCredentials) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            credentials,
            limiter: RateLimiter::per_minute(settings.requests_per_minute),
            method: RequestMethod::Get,
        })
    }

    pub fn with_method(mut self, method: RequestMethod) -> Self {
        self.method = method;
        self
    }

    fn url_for(&self, request: &SearchRequest) -> String {
        format!("{}/{}/", self.base_url, request.endpoint_name())
    }
}

#[async_trait]
impl SearchApi for HttpSearchClient {
    async fn request(&self, request: &SearchRequest) -> Result<SearchPage, ApiError> {
        request.validate()?;
        self.limiter.acquire().await;

        let url = self.url_for(request);
        let builder = match self.method {
            RequestMethod::Get => self.client.get(&url).query(&request.encoded_params()),
            RequestMethod::Post => self.client.post(&url).json(&request.json_body()),
        };

        tracing::debug!(endpoint = request.endpoint_name(), "PatentSearch request");

        let response = builder
            .header("X-Api-Key", self.credentials.api_key())
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let reason = response
                .headers()
                .get("X-Status-Reason")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: body.chars().take(300).collect(),
                reason,
            });
        }

        let text = response.text().await?;
        let body: Value = serde_json::from_str(&text).map_err(|e| {
            ApiError::Malformed(format!(
                "JSON parse error at line {} col {}: {}. First 300 chars: {}",
                e.line(),
                e.column(),
                e,
                text.chars().take(300).collect::<String>()
            ))
        })?;

        SearchPage::from_body(request.endpoint_name(), body)
    }
}
