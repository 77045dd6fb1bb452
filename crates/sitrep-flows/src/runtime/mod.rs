//! In-process durable-workflow runtime.
//!
//! Provides the contract the workflows are written against: per-activity
//! retry policies with backoff and non-retryable kinds, activity timeouts,
//! idempotent interval schedules partitioned by task queue, and cooperative
//! cancellation through a shared shutdown signal.

mod retry;
mod schedule;

pub use retry::{execute_activity, ActivityOptions, RetryPolicy};
pub use schedule::{Scheduler, ShutdownHandle, ShutdownSignal};
