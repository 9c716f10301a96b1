//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::path::PathBuf;

use dut_utils::with_source;
use tracing::{error, warn};

// Fact cache errors.
#[derive(Debug)]
pub enum Error {
    ZoneNotFound(String, String),
    CacheDirError(PathBuf, std::io::Error),
    StoreError(String, pickledb::error::Error),
}

// ===== impl Error =====

impl Error {
    pub fn log(&self) {
        match self {
            Error::ZoneNotFound(function, param) => {
                error!(%function, %param, "{}", self);
            }
            Error::CacheDirError(path, error) => {
                warn!(path = %path.display(), error = %with_source(error), "{}", self);
            }
            Error::StoreError(zone, error) => {
                warn!(%zone, error = %with_source(error), "{}", self);
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::ZoneNotFound(function, param) => {
                write!(
                    f,
                    "failed to get parameter '{}' from function {} as zone",
                    param, function
                )
            }
            Error::CacheDirError(..) => {
                write!(f, "failed to access cache directory")
            }
            Error::StoreError(..) => {
                write!(f, "failed to update cache store")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::CacheDirError(_, error) => Some(error),
            Error::StoreError(_, error) => Some(error),
            _ => None,
        }
    }
}
