//! HTTP-backed completion provider.
//!
//! Speaks the provider-neutral completion contract: the full
//! `ProviderRequest` is POSTed as JSON to the configured endpoint, which
//! replies with a `ProviderResponse` body. Vendor-specific wire protocols
//! stay behind the endpoint, not in this repo.

use async_trait::async_trait;

use toolflow_core::error::ProviderError;
use toolflow_core::{Provider, ProviderRequest, ProviderResponse};

/// Stands in when no completion endpoint is configured. Catalog-only
/// commands never call the model; any attempt to complete is an error.
pub struct DisabledProvider;

#[async_trait]
impl Provider for DisabledProvider {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn complete(
        &self,
        _request: ProviderRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::NotConfigured(
            "provider.api_url is not set".into(),
        ))
    }
}

pub struct HttpCompletionProvider {
    name: String,
    api_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpCompletionProvider {
    pub fn new(name: impl Into<String>, api_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            name: name.into(),
            api_url: api_url.into(),
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Provider for HttpCompletionProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        let mut http_request = self.client.post(&self.api_url).json(&request);
        if let Some(key) = &self.api_key {
            http_request = http_request.bearer_auth(key);
        }

        let response = http_request
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ProviderError::AuthenticationFailed(
                "completion endpoint rejected the API key".into(),
            ));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status_code: status.as_u16(),
                message,
            });
        }

        response
            .json::<ProviderResponse>()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))
    }
}
