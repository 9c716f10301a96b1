//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use dut_utils::poll::wait;
use tracing::{debug, info};

use crate::error::Error;
use crate::host::Host;

/// Commands that undo the changes a test made to a host.
///
/// Tests register restore commands as they go. Once the test is over,
/// [`RestoreCommands::teardown`] runs them all, whatever the outcome of each
/// one, and reports every failure at once.
#[derive(Debug, Default)]
pub struct RestoreCommands {
    commands: Mutex<BTreeMap<String, Vec<String>>>,
    // Time to let the host settle after the commands run.
    settle: Option<Duration>,
}

// ===== impl RestoreCommands =====

impl RestoreCommands {
    pub fn new(settle: Option<Duration>) -> RestoreCommands {
        RestoreCommands {
            commands: Default::default(),
            settle,
        }
    }

    /// Registers a restore command for a test.
    pub fn push(&self, test: &str, cmd: impl Into<String>) {
        let cmd = cmd.into();
        debug!(%test, %cmd, "registering restore command");
        self.commands
            .lock()
            .unwrap()
            .entry(test.to_owned())
            .or_default()
            .push(cmd);
    }

    /// Returns the restore commands pending for a test.
    pub fn pending(&self, test: &str) -> Vec<String> {
        self.commands
            .lock()
            .unwrap()
            .get(test)
            .cloned()
            .unwrap_or_default()
    }

    /// Runs and clears the restore commands of a test.
    ///
    /// Commands registered for other tests are left alone, so a test that
    /// failed before clearing its own list can't affect the next one.
    pub fn teardown(&self, test: &str, host: &dyn Host) -> Result<(), Error> {
        let commands = self
            .commands
            .lock()
            .unwrap()
            .remove(test)
            .unwrap_or_default();
        info!(%test, hostname = %host.hostname(), ?commands, "executing test cleanup");

        let mut failures = vec![];
        for cmd in &commands {
            info!(%cmd, "restoring");
            if let Err(error) = host.shell(cmd) {
                error.log();
                failures.push(format!(
                    "Failure during command execution '{}':\n{}",
                    cmd, error
                ));
            }
        }

        if let Some(settle) = self.settle {
            wait(settle, "processing cleanup");
        }

        if !failures.is_empty() {
            return Err(Error::CleanupFailed(test.to_owned(), failures));
        }
        Ok(())
    }
}
