//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod cleanup;
pub mod error;
pub mod host;
pub mod local;
pub mod net;

pub use cleanup::RestoreCommands;
pub use error::Error;
pub use host::{CommandResult, Host, Module};
pub use local::LocalHost;
pub use net::wait_tcp_connection;
