// Resource endpoints
//
// Typed wrappers over the orchestrator. `client` owns the shared plumbing;
// each sibling module adds inherent methods for one resource family and
// declares its timeout tier, retry budget and dedup key.

pub mod auth;
pub mod client;
pub mod connections;
pub mod events;
pub mod health;
pub mod pipelines;
pub mod preview;

pub use client::ApiClient;
