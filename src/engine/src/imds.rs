//! Instance metadata service client.
//!
//! Each request first asks for an IMDSv2 session token and sends it along;
//! when the token endpoint is unreachable or refuses, the request goes out
//! without one (IMDSv1). Tokens are not cached between requests.

use async_trait::async_trait;
use tracing::{debug, warn};

use eni_core::{HostError, ImdsConfig, MetadataClient};

const TOKEN_PATH: &str = "/latest/api/token";
const METADATA_ROOT: &str = "/latest/meta-data/";
const TOKEN_TTL_HEADER: &str = "X-aws-ec2-metadata-token-ttl-seconds";
const TOKEN_HEADER: &str = "X-aws-ec2-metadata-token";

/// HTTP client for the instance metadata service.
#[derive(Debug, Clone)]
pub struct ImdsClient {
    http: reqwest::Client,
    config: ImdsConfig,
}

impl ImdsClient {
    pub fn new(config: ImdsConfig) -> Result<Self, HostError> {
        // The metadata service is link-local; never route it through a proxy.
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .no_proxy()
            .build()
            .map_err(|e| HostError::Metadata(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { http, config })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}{}",
            self.config.endpoint.trim_end_matches('/'),
            path
        )
    }

    async fn session_token(&self) -> Option<String> {
        let response = self
            .http
            .put(self.url(TOKEN_PATH))
            .header(TOKEN_TTL_HEADER, self.config.token_ttl_secs.to_string())
            .send()
            .await;

        match response {
            Ok(r) if r.status().is_success() => match r.text().await {
                Ok(token) => Some(token.trim().to_string()),
                Err(e) => {
                    warn!(error = %e, "Failed to read IMDSv2 token, falling back to IMDSv1");
                    None
                }
            },
            Ok(r) => {
                debug!(status = %r.status(), "IMDSv2 token refused, falling back to IMDSv1");
                None
            }
            Err(e) => {
                debug!(error = %e, "IMDSv2 token request failed, falling back to IMDSv1");
                None
            }
        }
    }
}

#[async_trait]
impl MetadataClient for ImdsClient {
    async fn get_metadata(&self, path: &str) -> Result<String, HostError> {
        let url = self.url(&format!("{}{}", METADATA_ROOT, path.trim_start_matches('/')));

        let mut request = self.http.get(&url);
        if let Some(token) = self.session_token().await {
            request = request.header(TOKEN_HEADER, token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| HostError::Metadata(format!("GET {} failed: {}", url, e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(HostError::NotFound(url));
        }
        if !status.is_success() {
            return Err(HostError::Metadata(format!("GET {} returned {}", url, status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| HostError::Metadata(format!("GET {} body: {}", url, e)))?;
        debug!(path = %path, body = %body, "Metadata response");
        Ok(body)
    }
}
