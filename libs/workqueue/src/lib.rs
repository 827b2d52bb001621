//! # tagsync-workqueue
//!
//! Deduplicating, rate-limited work queue for reconciliation controllers.
//!
//! ## Design Principles
//!
//! - At most one pending copy of any item: re-adding an item that is
//!   already waiting is a no-op, so event storms for a single resource
//!   collapse into one unit of work.
//! - At-least-once delivery: an item handed out by [`WorkQueue::get`] is
//!   marked in-flight until [`WorkQueue::done`] is called; an add that
//!   races with processing is parked and re-queued on `done`.
//! - Failure-aware re-adds: [`WorkQueue::add_rate_limited`] delays the
//!   re-add by an exponential backoff derived from the item's consecutive
//!   failure count; [`WorkQueue::forget`] resets that count.
//! - Cooperative shutdown: [`WorkQueue::shut_down`] rejects further adds
//!   and wakes every blocked consumer with `None`.
//!
//! The queue is generic over the item type and carries no domain
//! knowledge; producers and consumers share it behind an [`std::sync::Arc`].

mod backoff;
mod queue;

pub use backoff::BackoffPolicy;
pub use queue::WorkQueue;
