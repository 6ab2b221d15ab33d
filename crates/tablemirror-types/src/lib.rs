//! Shared data types for the tablemirror snapshot record store.
//!
//! Pure serde types only: table specifications, records, dirty
//! metadata, mutation operations, and the connector boundary. Kept
//! free of storage dependencies so both the store and the sync
//! orchestration can share them without circular dependencies.

#![warn(clippy::pedantic)]

pub mod connector;
pub mod ids;
pub mod record;
pub mod spec;
