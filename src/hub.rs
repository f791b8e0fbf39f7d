//! Home Assistant REST client

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::config::HubConfig;
use crate::intent::ServiceCall;
use crate::{Error, Result};

/// Upper bound on a single service call
const CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// A home-automation hub
#[async_trait]
pub trait HomeHub: Send + Sync {
    /// Whether the hub answered its API root with success in time
    async fn is_healthy(&self) -> bool;

    /// Invoke a service
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the hub rejects the call
    async fn call_service(&self, call: &ServiceCall) -> Result<()>;
}

/// Client for the Home Assistant REST API
pub struct HomeAssistantClient {
    client: reqwest::Client,
    base_url: String,
    token: SecretString,
    health_timeout: Duration,
}

impl HomeAssistantClient {
    /// Create a client from hub configuration
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: &HubConfig) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(CALL_TIMEOUT).build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            health_timeout: config.health_timeout,
        })
    }

    /// Base URL requests are sent to
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl HomeHub for HomeAssistantClient {
    async fn is_healthy(&self) -> bool {
        let result = self
            .client
            .get(format!("{}/api/", self.base_url))
            .bearer_auth(self.token.expose_secret())
            .timeout(self.health_timeout)
            .send()
            .await;

        // Any answer within the timeout means the hub is up
        match result {
            Ok(response) => {
                if !response.status().is_success() {
                    tracing::warn!(
                        status = %response.status(),
                        "hub answered health check with an error status"
                    );
                }
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "hub unreachable");
                false
            }
        }
    }

    async fn call_service(&self, call: &ServiceCall) -> Result<()> {
        validate_segment("domain", &call.domain)?;
        validate_segment("service", &call.service)?;

        let url = format!(
            "{}/api/services/{}/{}",
            self.base_url, call.domain, call.service
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.token.expose_secret())
            .json(&call.body())
            .send()
            .await
            .map_err(|e| Error::Hub(format!("service call failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Hub(format!(
                "{}.{} returned {status}: {body}",
                call.domain, call.service
            )));
        }

        tracing::debug!(
            domain = %call.domain,
            service = %call.service,
            entity_id = %call.entity_id,
            "service call accepted"
        );
        Ok(())
    }
}

/// Reject names that would escape the service path
fn validate_segment(kind: &str, value: &str) -> Result<()> {
    let valid = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(Error::Hub(format!("invalid {kind} name: {value:?}")))
    }
}
