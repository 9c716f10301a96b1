//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use itertools::Itertools;
use tracing::{error, warn};

use crate::task::Failure;
use crate::with_source;

// Worker and barrier errors.
#[derive(Debug)]
pub enum Error {
    SpawnError(String, std::io::Error),
    WorkerFailed(Failure),
    JoinTimeout(Vec<String>),
}

// ===== impl Error =====

impl Error {
    pub fn log(&self) {
        match self {
            Error::SpawnError(worker, error) => {
                error!(%worker, error = %with_source(error), "{}", self);
            }
            Error::WorkerFailed(failure) => {
                warn!(
                    worker = %failure.worker(),
                    error_type = %failure.type_name(),
                    backtrace = %failure.backtrace(),
                    "{}", self
                );
            }
            Error::JoinTimeout(..) => {
                warn!("{}", self);
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::SpawnError(worker, ..) => {
                write!(f, "failed to spawn thread for worker {}", worker)
            }
            Error::WorkerFailed(failure) => write!(f, "{}", failure),
            Error::JoinTimeout(workers) => {
                write!(
                    f,
                    "timeout on waiting workers: [{}]",
                    workers.iter().join(", ")
                )
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::SpawnError(_, error) => Some(error),
            Error::WorkerFailed(failure) => Some(failure),
            Error::JoinTimeout(..) => None,
        }
    }
}

impl From<Failure> for Error {
    fn from(failure: Failure) -> Error {
        Error::WorkerFailed(failure)
    }
}
