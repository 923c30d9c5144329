//!
//! Endpoint construction: the transport handle an [`Adapter`](crate::adapter::Adapter)
//! is built from. Construction is retried since the bus may come up after
//! the container hosting this process does.
//!

use std::thread;
use std::time::Duration;

use crate::error::{Result, SimError};

const DEFAULT_RETRIES: u32 = 60;
const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// A transport handle the controller binds an adapter to.
///
/// `start` is an optional hook invoked once, before the first `connect`
/// (used by some transports to spin up background I/O); the default is a
/// no-op.
pub trait Endpoint {
    /// Attempts a single connection attempt; `Ok(())` means the endpoint
    /// is usable.
    fn connect(&mut self) -> Result<()>;

    /// Optional pre-connect hook.
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    /// The process UID this endpoint was assigned (possibly by the
    /// transport itself, if the caller passed `0`).
    fn uid(&self) -> u32;
}

/// Retries `build` up to `retries` times at `interval`, logging each
/// failed attempt. `should_stop` is polled between attempts so a
/// `Controller::stop()` observed during the retry loop aborts with
/// [`SimError::Cancelled`] instead of exhausting the full retry budget.
pub fn create_endpoint<E, F>(
    mut build: F,
    should_stop: impl Fn() -> bool,
    retries: u32,
    interval: Duration,
) -> Result<E>
where
    F: FnMut() -> Result<E>,
{
    let mut last_err = None;
    for attempt in 1..=retries {
        if should_stop() {
            return Err(SimError::Cancelled);
        }
        match build() {
            Ok(endpoint) => return Ok(endpoint),
            Err(e) => {
                tracing::warn!(attempt, retries, error = %e, "endpoint construction failed, retrying");
                last_err = Some(e);
            }
        }
        if attempt < retries {
            thread::sleep(interval);
        }
    }
    Err(last_err.unwrap_or_else(|| SimError::Config("endpoint construction failed".into())))
}

/// Convenience wrapper over [`create_endpoint`] using the production
/// retry budget (60 attempts, 1 second apart).
pub fn create_endpoint_default<E, F>(build: F, should_stop: impl Fn() -> bool) -> Result<E>
where
    F: FnMut() -> Result<E>,
{
    create_endpoint(build, should_stop, DEFAULT_RETRIES, DEFAULT_RETRY_INTERVAL)
}
