//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use itertools::Itertools;
use tracing::{error, warn};

use crate::host::CommandResult;

// Remote host errors.
#[derive(Debug)]
pub enum Error {
    ModuleFailed(String, &'static str, CommandResult),
    CleanupFailed(String, Vec<String>),
}

// ===== impl Error =====

impl Error {
    pub fn log(&self) {
        match self {
            Error::ModuleFailed(hostname, module, result) => {
                warn!(
                    %hostname, %module, rc = %result.rc,
                    stderr = %result.stderr.trim_end(),
                    exception = ?result.exception,
                    "{}", self
                );
            }
            Error::CleanupFailed(test, failures) => {
                error!(%test, failures = %failures.len(), "{}", self);
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::ModuleFailed(hostname, module, result) => {
                write!(f, "run module {} failed on {}: ", module, hostname)?;
                match &result.exception {
                    Some(exception) => write!(f, "{}", exception),
                    None => write!(
                        f,
                        "rc={} stderr={:?}",
                        result.rc,
                        result.stderr.trim_end()
                    ),
                }
            }
            Error::CleanupFailed(_, failures) => {
                write!(f, "{}", failures.iter().join("\n"))
            }
        }
    }
}

impl std::error::Error for Error {}
