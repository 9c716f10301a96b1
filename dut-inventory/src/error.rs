//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::path::PathBuf;

use dut_utils::with_source;
use tracing::{error, warn};

// Inventory errors.
#[derive(Debug)]
pub enum Error {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_json::Error),
    HostNotFound(String),
    Cache(dut_cache::Error),
}

// ===== impl Error =====

impl Error {
    pub fn log(&self) {
        match self {
            Error::ReadError(path, error) => {
                error!(path = %path.display(), error = %with_source(error), "{}", self);
            }
            Error::ParseError(path, error) => {
                error!(path = %path.display(), error = %with_source(error), "{}", self);
            }
            Error::HostNotFound(hostname) => {
                warn!(%hostname, "{}", self);
            }
            Error::Cache(error) => {
                error.log();
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::ReadError(..) => {
                write!(f, "failed to read inventory file")
            }
            Error::ParseError(..) => {
                write!(f, "failed to parse inventory file")
            }
            Error::HostNotFound(hostname) => {
                write!(f, "host {} not found in inventory", hostname)
            }
            Error::Cache(error) => write!(f, "{}", error),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::ReadError(_, error) => Some(error),
            Error::ParseError(_, error) => Some(error),
            Error::Cache(error) => Some(error),
            _ => None,
        }
    }
}

impl From<dut_cache::Error> for Error {
    fn from(error: dut_cache::Error) -> Error {
        Error::Cache(error)
    }
}
