use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::config::helpers::{optional_env, parse_optional_env};
use crate::error::ConfigError;

/// Identity provider settings used for token exchange and token validation.
///
/// Fields stay optional here so partially configured deployments can still
/// load; [`OidcConfig::validate`] is what enforces completeness at startup.
#[derive(Clone)]
pub struct OidcConfig {
    /// Issuer base URL, e.g. `https://sso.example.com/realms/main`.
    pub issuer_url: Option<String>,
    /// Client ID of this service (the exchanging client).
    pub client_id: Option<String>,
    pub client_secret: Option<SecretString>,
    /// Audience the exchanged token is issued for (the cluster's OIDC client).
    pub audience: Option<String>,
    /// Explicit token endpoint, overriding the issuer-derived one.
    pub token_url: Option<String>,
    /// Explicit userinfo endpoint, overriding the issuer-derived one.
    pub userinfo_url: Option<String>,
    pub http_timeout: Duration,
}

impl Default for OidcConfig {
    fn default() -> Self {
        Self {
            issuer_url: None,
            client_id: None,
            client_secret: None,
            audience: None,
            token_url: None,
            userinfo_url: None,
            http_timeout: Duration::from_secs(10),
        }
    }
}

impl std::fmt::Debug for OidcConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OidcConfig")
            .field("issuer_url", &self.issuer_url)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("audience", &self.audience)
            .field("token_url", &self.token_url)
            .field("userinfo_url", &self.userinfo_url)
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}

impl OidcConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        let config = Self {
            issuer_url: optional_env("OIDC_ISSUER_URL")?
                .map(|s| s.trim_end_matches('/').to_string()),
            client_id: optional_env("OIDC_CLIENT_ID")?,
            client_secret: optional_env("OIDC_CLIENT_SECRET")?.map(SecretString::from),
            audience: optional_env("KUBERNETES_CLIENT_ID")?,
            token_url: optional_env("OIDC_TOKEN_URL")?,
            userinfo_url: optional_env("OIDC_USERINFO_URL")?,
            http_timeout: Duration::from_secs(parse_optional_env("OIDC_HTTP_TIMEOUT_SECS", 10)?),
        };

        for (key, value) in [
            ("OIDC_ISSUER_URL", config.issuer_url.as_deref()),
            ("OIDC_TOKEN_URL", config.token_url.as_deref()),
            ("OIDC_USERINFO_URL", config.userinfo_url.as_deref()),
        ] {
            if let Some(raw) = value {
                url::Url::parse(raw).map_err(|e| ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: format!("'{}' is not a URL: {}", raw, e),
                })?;
            }
        }

        Ok(config)
    }

    /// Token endpoint, defaulting to the Keycloak layout under the issuer.
    pub fn token_endpoint(&self) -> Option<String> {
        self.token_url.clone().or_else(|| {
            self.issuer_url
                .as_ref()
                .map(|issuer| format!("{}/protocol/openid-connect/token", issuer))
        })
    }

    pub fn userinfo_endpoint(&self) -> Option<String> {
        self.userinfo_url.clone().or_else(|| {
            self.issuer_url
                .as_ref()
                .map(|issuer| format!("{}/protocol/openid-connect/userinfo", issuer))
        })
    }

    /// Check that everything needed to exchange and validate tokens is set.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let missing = |key: &str, hint: &str| ConfigError::MissingRequired {
            key: key.to_string(),
            hint: hint.to_string(),
        };

        if self.token_endpoint().is_none() || self.userinfo_endpoint().is_none() {
            return Err(missing(
                "OIDC_ISSUER_URL",
                "set the issuer or both OIDC_TOKEN_URL and OIDC_USERINFO_URL",
            ));
        }
        if self.client_id.as_deref().is_none_or(str::is_empty) {
            return Err(missing("OIDC_CLIENT_ID", "client ID of this service"));
        }
        if self
            .client_secret
            .as_ref()
            .is_none_or(|s| s.expose_secret().is_empty())
        {
            return Err(missing("OIDC_CLIENT_SECRET", "client secret of this service"));
        }
        if self.audience.as_deref().is_none_or(str::is_empty) {
            return Err(missing(
                "KUBERNETES_CLIENT_ID",
                "audience of the exchanged cluster token",
            ));
        }
        Ok(())
    }
}
