//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::TcpListener;
use std::time::Duration;

use dut_host::wait_tcp_connection;
use dut_utils::test::setup;

//
// Tests.
//

#[test]
fn listening_port() {
    setup();

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap().to_string();

    assert!(wait_tcp_connection(&address, Duration::from_secs(5)));
}

#[test]
fn closed_port_times_out() {
    setup();

    let address = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().to_string()
    };

    assert!(!wait_tcp_connection(&address, Duration::from_millis(1500)));
}

#[test]
fn unresolvable_address_times_out() {
    setup();

    assert!(!wait_tcp_connection("not an address", Duration::from_millis(500)));
}
