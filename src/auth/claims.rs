//! Typed identity claims.
//!
//! Claims arrive either from the identity provider's userinfo endpoint or
//! from the payload of an access token the provider has accepted. Both are decoded into the same strict
//! schema: unknown fields are ignored, but known fields must have the
//! expected shape.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::IdentityError;

/// Identity of an authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// Subject identifier assigned by the identity provider.
    pub sub: String,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Group paths such as `/tenant/team/project_dev`.
    #[serde(default, deserialize_with = "deserialize_groups")]
    pub groups: Vec<String>,
}

/// Accepted wire shapes of the `groups` claim.
#[derive(Deserialize)]
#[serde(untagged)]
enum GroupsClaim {
    List(Vec<String>),
    Joined(String),
}

fn deserialize_groups<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let groups = match Option::<GroupsClaim>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(GroupsClaim::List(list)) => list,
        Some(GroupsClaim::Joined(joined)) => joined
            .split(',')
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(str::to_string)
            .collect(),
    };
    Ok(groups)
}

impl IdentityClaims {
    /// Decode claims from a JSON document and check a user ID can be derived.
    pub fn from_json(bytes: &[u8]) -> Result<Self, IdentityError> {
        let claims: Self = serde_json::from_slice(bytes)
            .map_err(|e| IdentityError::InvalidClaims(e.to_string()))?;
        if claims.user_id().is_empty() {
            return Err(IdentityError::InvalidClaims(
                "neither preferred_username nor sub is set".to_string(),
            ));
        }
        Ok(claims)
    }

    /// Decode the payload of a compact JWT without checking its signature.
    ///
    /// Only for tokens the identity provider has just accepted, such as an
    /// access token that userinfo answered for. Never for tokens a client
    /// hands over on its own.
    pub fn from_accepted_jwt(token: &str) -> Result<Self, IdentityError> {
        let mut parts = token.split('.');
        let payload = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(_), Some(payload), Some(_), None) => payload,
            _ => {
                return Err(IdentityError::InvalidClaims(
                    "token is not a compact JWT".to_string(),
                ));
            }
        };
        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| IdentityError::InvalidClaims(format!("payload is not base64url: {}", e)))?;
        Self::from_json(&bytes)
    }

    /// Stable user identifier: `preferred_username` when present, else `sub`.
    pub fn user_id(&self) -> &str {
        match self.preferred_username.as_deref().map(str::trim) {
            Some(username) if !username.is_empty() => username,
            _ => self.sub.trim(),
        }
    }

    /// Fill in groups from another claim set when this one carries none.
    ///
    /// Userinfo responses often omit groups unless a mapper is configured,
    /// while the access token usually has them.
    pub fn with_fallback_groups(mut self, other: &IdentityClaims) -> Self {
        if self.groups.is_empty() && other.sub == self.sub {
            self.groups = other.groups.clone();
        }
        self
    }
}
