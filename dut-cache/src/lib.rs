//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod cached;
pub mod error;
pub mod storage;

pub use cached::{CallArgs, Cached, ZoneGetter, default_zone_getter, zone_by_param};
pub use error::Error;
pub use storage::{Config, FactsCache};
