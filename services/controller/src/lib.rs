//! tagsync controller library
//!
//! Reconciliation controller that watches externally-managed service
//! objects and mirrors their state into an external tag API. Change
//! notifications become deduplicated work items; a fixed pool of
//! workers drains them with retry-on-failure semantics.
//!
//! ## Architecture
//!
//! ```text
//! Watcher ──> MemoryStore (cache)
//!    │
//!    └──> EventAdapter ──> WorkQueue ──> workers ──> Handler
//! ```
//!
//! - `watch`: polls the inventory API and diffs against the cache
//! - `adapter`: turns notifications into immutable work items
//! - `controller`: worker pool, per-item retry/forget decisions
//! - `handler`: pluggable side effects (tag API, logging)
//!
//! The queue itself lives in the `tagsync-workqueue` crate.

pub mod adapter;
pub mod client;
pub mod config;
pub mod controller;
pub mod handler;
pub mod item;
pub mod store;
pub mod watch;
