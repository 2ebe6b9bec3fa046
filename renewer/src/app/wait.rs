//! Bounded waiting primitives
//!
//! `wait_for` replaces ad-hoc sleep-and-count loops: it checks a probe, then
//! sleeps `interval` on the injected clock, until the probe yields a value or
//! `timeout` has elapsed.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::domain::ports::Clock;
use crate::error::{DriverError, FaultKind};

/// The awaited condition did not hold within the bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("condition not met within {timeout:?} ({checks} checks)")]
pub struct WaitTimeout {
    pub timeout: Duration,
    pub checks: u32,
}

/// Poll `probe` until it returns `Some`, or fail once `timeout` has elapsed.
///
/// The probe is checked immediately and then after every `interval`; the final
/// sleep is shortened so the last check lands exactly on the bound.
pub async fn wait_for<C, T, F, Fut>(
    clock: &C,
    timeout: Duration,
    interval: Duration,
    mut probe: F,
) -> Result<T, WaitTimeout>
where
    C: Clock + ?Sized,
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let start = clock.now();
    let mut checks = 0;
    loop {
        checks += 1;
        if let Some(value) = probe().await {
            return Ok(value);
        }
        let elapsed = clock.now().saturating_sub(start);
        if elapsed >= timeout {
            return Err(WaitTimeout { timeout, checks });
        }
        clock.sleep(interval.min(timeout - elapsed)).await;
    }
}

/// Run `op`, retrying up to `attempts` times while it fails transiently.
///
/// Structural and session faults return immediately.
pub async fn retry_transient<C, T, F, Fut>(
    clock: &C,
    attempts: u32,
    delay: Duration,
    mut op: F,
) -> Result<T, DriverError>
where
    C: Clock + ?Sized,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DriverError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.kind() == FaultKind::Transient && attempt < attempts => {
                tracing::warn!(attempt, error = %e, "Transient fault, retrying");
                attempt += 1;
                clock.sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
