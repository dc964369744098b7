//! Sync protocol: wire models, HTTP client, and the client-side orchestrator.

pub mod client;
pub mod engine;
pub mod models;

pub use models::{
    Applied, Conflict, ConflictReason, ItemChange, ItemSnapshot, ItemSummary, ResolvePolicy,
    ServerItem, SyncRequest, SyncResponse, EPOCH_RFC3339,
};
