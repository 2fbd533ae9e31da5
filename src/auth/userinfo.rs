//! Access-token validation through the identity provider's userinfo endpoint.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use crate::auth::claims::IdentityClaims;
use crate::config::OidcConfig;
use crate::error::{ConfigError, IdentityError};

/// Validates a bearer access token and returns who it belongs to.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, access_token: &str) -> Result<IdentityClaims, IdentityError>;
}

/// Calls `GET {userinfo}` with the token as bearer credentials.
///
/// A 2xx response proves the token is live; its body supplies the claims.
#[derive(Debug, Clone)]
pub struct UserInfoClient {
    client: Client,
    userinfo_url: String,
}

impl UserInfoClient {
    pub fn new(config: &OidcConfig) -> Result<Self, ConfigError> {
        let userinfo_url = config
            .userinfo_endpoint()
            .ok_or_else(|| ConfigError::MissingRequired {
                key: "OIDC_ISSUER_URL".to_string(),
                hint: "needed to locate the userinfo endpoint".to_string(),
            })?;
        let client = Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                key: "OIDC_HTTP_TIMEOUT_SECS".to_string(),
                message: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            userinfo_url,
        })
    }
}

#[async_trait]
impl IdentityVerifier for UserInfoClient {
    async fn verify(&self, access_token: &str) -> Result<IdentityClaims, IdentityError> {
        if access_token.trim().is_empty() {
            return Err(IdentityError::Unauthorized);
        }

        let response = self
            .client
            .get(&self.userinfo_url)
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| IdentityError::Upstream(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(IdentityError::Unauthorized);
        }
        if !status.is_success() {
            return Err(IdentityError::Upstream(format!(
                "userinfo endpoint returned HTTP {}",
                status
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| IdentityError::Upstream(format!("failed to read userinfo body: {}", e)))?;
        IdentityClaims::from_json(&body)
    }
}
