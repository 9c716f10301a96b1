//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;
use std::ffi::OsString;

use tracing::debug;

/// Guard for a temporary change of the process environment.
///
/// Created by [`EnvScope::enter`]. Dropping the guard, including while
/// unwinding, restores the previous values of the touched variables and
/// removes the variables that didn't exist before.
#[derive(Debug)]
#[must_use = "the environment is restored as soon as the scope is dropped"]
pub struct EnvScope {
    restore: Vec<(String, OsString)>,
    added: Vec<String>,
}

// ===== impl EnvScope =====

impl EnvScope {
    /// Removes the `remove` variables and sets the `update` ones until the
    /// returned guard is dropped.
    ///
    /// # Safety
    ///
    /// The process environment is shared by all threads. The caller must
    /// ensure no other thread reads or writes environment variables while
    /// the scope is entered or restored.
    pub unsafe fn enter(remove: &[&str], update: &[(&str, &str)]) -> EnvScope {
        let touched = update
            .iter()
            .map(|(key, _)| *key)
            .chain(remove.iter().copied())
            .collect::<BTreeSet<_>>();
        let restore = touched
            .iter()
            .filter_map(|key| {
                std::env::var_os(key).map(|value| (key.to_string(), value))
            })
            .collect::<Vec<_>>();
        let added = update
            .iter()
            .filter(|(key, _)| std::env::var_os(key).is_none())
            .map(|(key, _)| key.to_string())
            .collect::<Vec<_>>();

        debug!(?update, ?remove, "updating environment");
        for (key, value) in update {
            // SAFETY: upheld by the caller.
            unsafe { std::env::set_var(key, value) };
        }
        for key in remove {
            // SAFETY: upheld by the caller.
            unsafe { std::env::remove_var(key) };
        }

        EnvScope { restore, added }
    }
}

impl Drop for EnvScope {
    fn drop(&mut self) {
        debug!(restore = ?self.restore, added = ?self.added, "restoring environment");
        for (key, value) in &self.restore {
            // SAFETY: the contract of `EnvScope::enter` covers the whole
            // lifetime of the guard.
            unsafe { std::env::set_var(key, value) };
        }
        for key in &self.added {
            // SAFETY: see above.
            unsafe { std::env::remove_var(key) };
        }
    }
}
