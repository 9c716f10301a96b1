//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod error;
pub mod facts;
pub mod inventory;
pub mod json;

pub use error::Error;
pub use facts::{Facts, GroupArgs, HostArgs, ServerArgs};
pub use inventory::{Inventory, Vars};
pub use json::JsonInventory;
