//! Per-request context: deadline and cancellation (spec §4.7/§5).

use std::time::Duration;

use meshrpc_core::{Error, Result};
use tokio::time::Instant;

/// Carries the request's deadline (if any) and lets a handler check
/// whether it has already been cancelled. A `Context` is cheap to clone
/// and has no shared mutable state.
#[derive(Clone, Debug)]
pub struct Context {
    deadline: Option<Instant>,
}

impl Context {
    pub fn new(timeout: Duration) -> Self {
        Context {
            deadline: if timeout.is_zero() {
                None
            } else {
                Some(Instant::now() + timeout)
            },
        }
    }

    pub fn no_deadline() -> Self {
        Context { deadline: None }
    }

    pub fn is_expired(&self) -> bool {
        matches!(self.deadline, Some(d) if Instant::now() >= d)
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn check(&self) -> Result<()> {
        if self.is_expired() {
            Err(Error::Timeout)
        } else {
            Ok(())
        }
    }
}
