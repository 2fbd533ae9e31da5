//! OAuth 2.0 token exchange (RFC 8693).
//!
//! Trades the user's access token, issued to the portal client, for a token
//! whose audience is the cluster's OIDC client. The exchanged token is what
//! ends up inside the console's kubeconfig.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::config::OidcConfig;
use crate::error::ExchangeError;

pub const TOKEN_EXCHANGE_GRANT: &str = "urn:ietf:params:oauth:grant-type:token-exchange";
pub const ACCESS_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:access_token";

/// Successful token-exchange response.
#[derive(Debug, Clone)]
pub struct ExchangedToken {
    pub access_token: SecretString,
    pub token_type: Option<String>,
    pub expires_in: Option<u64>,
    pub refresh_token: Option<SecretString>,
    pub refresh_expires_in: Option<u64>,
    pub issued_token_type: Option<String>,
    pub scope: Option<String>,
}

/// Wire shape of the token endpoint's JSON body.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    refresh_expires_in: Option<u64>,
    #[serde(default)]
    issued_token_type: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

impl TryFrom<TokenResponse> for ExchangedToken {
    type Error = ExchangeError;

    fn try_from(raw: TokenResponse) -> Result<Self, Self::Error> {
        if raw.access_token.is_empty() {
            return Err(ExchangeError::Decode("access_token is empty".to_string()));
        }
        Ok(Self {
            access_token: SecretString::from(raw.access_token),
            token_type: raw.token_type,
            expires_in: raw.expires_in,
            refresh_token: raw
                .refresh_token
                .filter(|t| !t.is_empty())
                .map(SecretString::from),
            refresh_expires_in: raw.refresh_expires_in,
            issued_token_type: raw.issued_token_type,
            scope: raw.scope,
        })
    }
}

/// Anything that can trade a subject token for a cluster-scoped one.
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange(&self, subject_token: &str) -> Result<ExchangedToken, ExchangeError>;
}

/// HTTP client for the identity provider's token endpoint.
#[derive(Clone)]
pub struct TokenExchangeClient {
    client: Client,
    token_url: String,
    client_id: String,
    client_secret: SecretString,
    audience: String,
}

impl std::fmt::Debug for TokenExchangeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenExchangeClient")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("audience", &self.audience)
            .finish()
    }
}

impl TokenExchangeClient {
    /// Build a client from OIDC settings.
    ///
    /// Fails with [`ExchangeError::Configuration`] when the endpoint, client
    /// credentials or audience are missing.
    pub fn new(config: &OidcConfig) -> Result<Self, ExchangeError> {
        let token_url = config
            .token_endpoint()
            .ok_or_else(|| ExchangeError::Configuration("token endpoint is not set".to_string()))?;
        let client_id = non_empty(config.client_id.as_deref())
            .ok_or_else(|| ExchangeError::Configuration("client ID is not set".to_string()))?;
        let client_secret = config
            .client_secret
            .clone()
            .filter(|s| !s.expose_secret().is_empty())
            .ok_or_else(|| ExchangeError::Configuration("client secret is not set".to_string()))?;
        let audience = non_empty(config.audience.as_deref())
            .ok_or_else(|| ExchangeError::Configuration("audience is not set".to_string()))?;

        let client = Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| {
                ExchangeError::Configuration(format!("failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            token_url,
            client_id: client_id.to_string(),
            client_secret,
            audience: audience.to_string(),
        })
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }
}

#[async_trait]
impl TokenExchanger for TokenExchangeClient {
    async fn exchange(&self, subject_token: &str) -> Result<ExchangedToken, ExchangeError> {
        if subject_token.trim().is_empty() {
            return Err(ExchangeError::InvalidSubject);
        }

        let form = [
            ("grant_type", TOKEN_EXCHANGE_GRANT),
            ("subject_token", subject_token),
            ("subject_token_type", ACCESS_TOKEN_TYPE),
            ("requested_token_type", ACCESS_TOKEN_TYPE),
            ("audience", self.audience.as_str()),
        ];

        let response = self
            .client
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(self.client_secret.expose_secret()))
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| ExchangeError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ExchangeError::Network(format!("failed to read response body: {}", e)))?;

        if !status.is_success() {
            tracing::warn!(
                status = status.as_u16(),
                audience = %self.audience,
                "Token exchange rejected by identity provider"
            );
            return Err(ExchangeError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let raw: TokenResponse =
            serde_json::from_str(&body).map_err(|e| ExchangeError::Decode(e.to_string()))?;
        let token = ExchangedToken::try_from(raw)?;

        tracing::debug!(
            audience = %self.audience,
            expires_in = ?token.expires_in,
            "Exchanged token for cluster audience"
        );
        Ok(token)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
