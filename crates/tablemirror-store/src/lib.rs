//! Per-snapshot `PostgreSQL` record store for mirrored tables.
//!
//! Each snapshot (one mirrored connection to an external service) owns
//! a dynamically-provisioned schema holding one physical table per
//! logical table. The store ingests externally-fetched records, tracks
//! exactly which fields a user has changed since the last sync, lets
//! concurrent workers claim batches of pending changes for push-back
//! without double-processing, and reconciles local identities with
//! remote ones once a push succeeds.

#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod pool;
pub mod store;

mod claim;
mod ident;
mod ingest;
mod mutate;
mod reconcile;
mod schema;
mod value;

pub use config::StoreConfig;
pub use error::{BoxError, Result, StoreError};
pub use store::SnapshotStore;
