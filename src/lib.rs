//! Web console service: short-lived, per-user terminal pods on Kubernetes.
//!
//! A caller proves who they are with an identity-provider access token. The
//! token is exchanged for one the target cluster trusts, the caller's groups
//! pick a namespace, and a console bundle (credentials Secret, Deployment,
//! Service, plus a long-lived history volume) is created for them.

pub mod api;
pub mod auth;
pub mod cluster;
pub mod config;
pub mod console;
pub mod error;
pub mod tasks;
pub mod testing;

pub use config::Config;
pub use error::{Error, Result};
