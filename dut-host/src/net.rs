//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use dut_utils::poll::wait_until_named;
use tracing::{debug, warn};

// Interval between connection attempts, also used as the timeout of each
// attempt.
const CONNECT_INTERVAL: Duration = Duration::from_secs(1);

/// Waits until a TCP connection to `address` (`host:port`) can be established.
///
/// Returns `false`, after logging a warning, if no connection succeeded
/// within `timeout`.
pub fn wait_tcp_connection(address: &str, timeout: Duration) -> bool {
    let name = format!("tcp connection to {}", address);
    let connected =
        wait_until_named(&name, timeout, CONNECT_INTERVAL, Duration::ZERO, || {
            connect(address)
        });
    if !connected {
        warn!(%address, ?timeout, "failed to establish TCP connection");
    }
    connected
}

// Tries every address the name resolves to, in order.
fn connect(address: &str) -> std::io::Result<bool> {
    for addr in address.to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, CONNECT_INTERVAL) {
            Ok(_) => {
                debug!(%addr, "connection established");
                return Ok(true);
            }
            Err(error) => {
                debug!(%addr, %error, "connection attempt failed");
            }
        }
    }
    Ok(false)
}
