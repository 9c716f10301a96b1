//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use dut_host::{Error, Host, LocalHost, Module};
use dut_utils::test::setup;
use maplit::btreemap;

//
// Tests.
//

#[test]
fn shell_output() {
    setup();

    let host = LocalHost::default();
    let result = host.shell("echo first; echo second >&2; echo third").unwrap();

    assert_eq!(result.rc, 0);
    assert!(!result.failed);
    assert_eq!(result.stdout, "first\nthird\n");
    assert_eq!(result.stdout_lines, ["first", "third"]);
    assert_eq!(result.stderr_lines, ["second"]);
    assert_eq!(result.exception, None);
}

#[test]
fn shell_failure() {
    setup();

    let host = LocalHost::new("dut1".to_owned());
    let error = host.shell("echo oops >&2; exit 3").unwrap_err();

    match &error {
        Error::ModuleFailed(hostname, module, result) => {
            assert_eq!(hostname, "dut1");
            assert_eq!(*module, "shell");
            assert_eq!(result.rc, 3);
            assert!(result.failed);
        }
        error => panic!("unexpected error: {error:?}"),
    }
    assert_eq!(
        error.to_string(),
        "run module shell failed on dut1: rc=3 stderr=\"oops\""
    );
}

#[test]
fn ignore_errors() {
    setup();

    let host = LocalHost::default();
    let result = host
        .run(&Module::Shell("exit 1".to_owned()), true)
        .unwrap();
    assert_eq!(result.rc, 1);
    assert!(result.failed);
}

#[test]
fn command_without_shell() {
    setup();

    let host = LocalHost::default();
    let result = host.command("echo $HOME ; true").unwrap();
    assert_eq!(result.stdout, "$HOME ; true\n");

    let error = host.command("   ").unwrap_err();
    assert!(matches!(
        error,
        Error::ModuleFailed(_, "command", ref result)
            if result.exception.as_deref() == Some("no command given")
    ));

    let error = host.command("/nonexistent/binary").unwrap_err();
    assert!(matches!(
        error,
        Error::ModuleFailed(_, _, ref result) if result.exception.is_some()
    ));
}

#[test]
fn copy_into_directory() {
    setup();

    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("minigraph.xml");
    let dest = dir.path().join("dut");
    std::fs::write(&src, "<DeviceMiniGraph/>").unwrap();
    std::fs::create_dir(&dest).unwrap();

    let host = LocalHost::default();
    host.copy(&src, &dest).unwrap();
    assert_eq!(
        std::fs::read_to_string(dest.join("minigraph.xml")).unwrap(),
        "<DeviceMiniGraph/>"
    );

    let error = host.copy(dir.path().join("missing"), &dest).unwrap_err();
    assert!(matches!(error, Error::ModuleFailed(_, "copy", _)));
}

#[test]
fn template_rendering() {
    setup();

    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("ntp.conf.j2");
    let dest = dir.path().join("ntp.conf");
    std::fs::write(&src, "server {{ ntp_server }} iburst\n").unwrap();

    let host = LocalHost::default();
    host.template(
        &src,
        &dest,
        btreemap! { "ntp_server".to_owned() => "10.0.0.123".to_owned() },
    )
    .unwrap();
    assert_eq!(
        std::fs::read_to_string(&dest).unwrap(),
        "server 10.0.0.123 iburst\n"
    );

    let error = host.template(&src, &dest, Default::default()).unwrap_err();
    assert!(error.to_string().contains("'ntp_server' is undefined"));
}
