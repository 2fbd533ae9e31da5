//! Per-user web consoles.
//!
//! A console is a short-lived terminal pod with the user's own cluster
//! credentials mounted into it. [`ConsoleOrchestrator`] creates and removes
//! them, [`ResourceStore`] remembers which ones exist, and
//! [`GarbageCollector`] cleans up what failed to start or was forgotten.

pub mod gc;
pub mod manifest;
pub mod orchestrator;
pub mod store;

pub use gc::{GarbageCollector, GcConfig, SweepReport};
pub use orchestrator::{ConsoleOrchestrator, TeardownReport};
pub use store::{ConsoleResource, ResourceStore};
