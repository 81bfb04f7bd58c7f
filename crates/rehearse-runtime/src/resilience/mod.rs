//! Resilience patterns for rehearse-runtime.
//!
//! Remote judgment calls (termination classification and rubric scoring) go
//! through a [`RetryPolicy`]. Conversation turns do not retry; they are
//! bounded by the per-call deadline only.

mod retry;

pub use retry::RetryPolicy;
