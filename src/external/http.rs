//! Downstream API client over HTTP.

use super::ApiClient;
use crate::config::secrets::{SecretString, bearer};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Posts each payload line as a plain-text body to `{base_url}/post`.
#[derive(Debug, Clone)]
pub struct HttpApiClient {
    client: reqwest::Client,
    endpoint: String,
    token: Option<SecretString>,
}

impl HttpApiClient {
    pub fn new(base_url: &str, token: Option<SecretString>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/post", base_url.trim_end_matches('/')),
            token,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ApiClient for HttpApiClient {
    async fn post(&self, payload: &str) -> Result<String> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(payload.to_string());
        if let Some(ref token) = self.token {
            request = request.header(reqwest::header::AUTHORIZATION, bearer(token));
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::Processing(format!(
                "POST {} returned {status}: {body}",
                self.endpoint
            )));
        }
        debug!(endpoint = %self.endpoint, %status, "api call succeeded");
        Ok(body)
    }
}
