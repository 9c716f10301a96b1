//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use crate::panic_message;

/// Outcome of a single condition evaluation.
///
/// Conditions polled by [`wait_until`] may return anything implementing this
/// trait. An `Err` is treated like a failed check: it's logged and the
/// condition is evaluated again on the next interval.
pub trait IntoCheck {
    fn into_check(self) -> Result<bool, String>;
}

// ===== impl IntoCheck =====

impl IntoCheck for bool {
    fn into_check(self) -> Result<bool, String> {
        Ok(self)
    }
}

impl<T> IntoCheck for Option<T> {
    fn into_check(self) -> Result<bool, String> {
        Ok(self.is_some())
    }
}

impl<R, E> IntoCheck for Result<R, E>
where
    R: IntoCheck,
    E: std::fmt::Display,
{
    fn into_check(self) -> Result<bool, String> {
        match self {
            Ok(check) => check.into_check(),
            Err(error) => Err(error.to_string()),
        }
    }
}

// ===== global functions =====

/// Pauses the calling thread for the specified duration, logging the reason.
pub fn wait(duration: Duration, reason: &str) {
    info!(?duration, %reason, "pausing");
    thread::sleep(duration);
}

/// Polls `condition` until it holds or `timeout` expires.
///
/// The condition name used in logs is derived from the closure type. See
/// [`wait_until_named`] for the full contract.
pub fn wait_until<F, R>(
    timeout: Duration,
    interval: Duration,
    delay: Duration,
    condition: F,
) -> bool
where
    F: FnMut() -> R,
    R: IntoCheck,
{
    wait_until_named(
        std::any::type_name::<F>(),
        timeout,
        interval,
        delay,
        condition,
    )
}

/// Polls `condition` until it holds or `timeout` expires.
///
/// If `delay` is non-zero, the calling thread sleeps for that long before the
/// first evaluation. The delay isn't counted against `timeout`.
///
/// The condition is evaluated while the elapsed time is strictly less than
/// `timeout`. Returns `true` as soon as an evaluation succeeds, or `false`
/// once the deadline is reached. Errors and panics raised by the condition
/// are logged and count as a failed check; they're never propagated.
///
/// A zero `timeout` returns `false` immediately, without evaluating the
/// condition a single time. Callers that need exactly one check must pass a
/// non-zero timeout.
///
/// # Panics
///
/// Panics if `interval` is zero.
pub fn wait_until_named<F, R>(
    name: &str,
    timeout: Duration,
    interval: Duration,
    delay: Duration,
    mut condition: F,
) -> bool
where
    F: FnMut() -> R,
    R: IntoCheck,
{
    assert!(!interval.is_zero(), "poll interval must be greater than zero");

    debug!(
        condition = %name, ?timeout, ?interval, ?delay,
        "waiting until condition is true"
    );

    if !delay.is_zero() {
        debug!(?delay, "delaying first check");
        thread::sleep(delay);
    }

    let start = Instant::now();
    let mut elapsed = Duration::ZERO;
    while elapsed < timeout {
        debug!(?elapsed, "time elapsed");

        if check(name, &mut condition) {
            debug!(condition = %name, "condition is true, exiting early");
            return true;
        }

        debug!(
            condition = %name, ?interval,
            "condition is false, checking again after interval"
        );
        thread::sleep(interval);
        elapsed = start.elapsed();
    }

    debug!(
        condition = %name, ?timeout,
        "condition is still false after timeout"
    );
    false
}

// Evaluates the condition once, absorbing errors and panics.
//
// No backtrace is logged: by the time the failure is seen, the stack of the
// condition has already unwound.
fn check<F, R>(name: &str, condition: &mut F) -> bool
where
    F: FnMut() -> R,
    R: IntoCheck,
{
    match evaluate(condition) {
        Ok(check) => check,
        Err((kind, error)) => {
            error!(
                condition = %name, %kind, %error,
                "exception caught while checking condition"
            );
            false
        }
    }
}

// Runs the condition, classifying a failure as either a returned error or a
// panic.
fn evaluate<F, R>(condition: &mut F) -> Result<bool, (&'static str, String)>
where
    F: FnMut() -> R,
    R: IntoCheck,
{
    match panic::catch_unwind(AssertUnwindSafe(condition)) {
        Ok(result) => result.into_check().map_err(|error| ("error", error)),
        Err(payload) => Err(("panic", panic_message(&*payload))),
    }
}

// ===== unit tests =====
