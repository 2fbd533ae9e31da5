//! Identity handling: who the caller is and what they may reach.
//!
//! ```text
//! bearer token ──► IdentityVerifier (userinfo) ──► IdentityClaims
//!                                                   │
//!                        groups ──► resolve_default_namespace
//!                                                   │
//! bearer token ──► TokenExchanger ──► cluster-audience token
//! ```
//!
//! Browser logins are kept in the [`SessionStore`].

pub mod claims;
pub mod exchange;
pub mod namespace;
pub mod session;
pub mod userinfo;

pub use claims::IdentityClaims;
pub use exchange::{ExchangedToken, TokenExchangeClient, TokenExchanger};
pub use namespace::{DEFAULT_NAMESPACE, parse_group, resolve_default_namespace};
pub use session::{Session, SessionStore, SessionTokens};
pub use userinfo::{IdentityVerifier, UserInfoClient};
