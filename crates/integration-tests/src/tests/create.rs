//! Integration tests for `lxckit create`
//!
//! ⚠️  These provision a real container on the local Proxmox VE node using
//! the ID from `LXCKIT_TEST_ID` (default 9999). The ID must be free.
//!
//! Integration tests must fail hard. Never "warn and continue": use
//! `assert!()`, `panic!()` or `unwrap()`.

use std::process::Command;

use crate::{get_lxckit_command, get_test_id, INTEGRATION_TEST_TAG};

fn pct(args: &[&str]) -> String {
    let output = Command::new("pct")
        .args(args)
        .output()
        .expect("Failed to run pct");
    assert!(
        output.status.success(),
        "pct {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Mailpit on DHCP comes up running, with notes and both ports, and a
/// second run against the same ID is rejected before any download.
pub fn test_mailpit_end_to_end() {
    let lxckit = get_lxckit_command().unwrap();
    let id = get_test_id();

    eprintln!("Provisioning Mailpit in container {id}...");
    let output = Command::new("timeout")
        .args([
            "1200s",
            &lxckit,
            "create",
            "--id",
            &id,
            "--ip",
            "dhcp",
            "--on-failure",
            "destroy",
            "--tag",
            INTEGRATION_TEST_TAG,
            "mailpit",
        ])
        .output()
        .expect("Failed to run lxckit create");

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    eprintln!("stdout: {stdout}");
    eprintln!("stderr: {stderr}");
    assert!(output.status.success(), "create failed: {stderr}");

    assert!(stdout.contains("Mailpit"), "Summary lacks title: {stdout}");
    assert!(stdout.contains(":8025"), "Summary lacks web UI: {stdout}");
    assert!(stdout.contains(":1025"), "Summary lacks SMTP: {stdout}");

    let status = pct(&["status", &id]);
    assert!(status.contains("running"), "Container not running: {status}");

    let config = pct(&["config", &id]);
    assert!(config.contains("Mailpit"), "Notes not written: {config}");
    assert!(config.contains(INTEGRATION_TEST_TAG), "Tag missing: {config}");

    let service = pct(&["exec", &id, "--", "systemctl", "is-active", "mailpit.service"]);
    assert_eq!(service.trim(), "active");

    eprintln!("Re-running create against the existing container {id}...");
    let again = Command::new(&lxckit)
        .args(["create", "--id", &id, "mailpit"])
        .output()
        .expect("Failed to run lxckit create");
    let stderr = String::from_utf8_lossy(&again.stderr);
    assert!(!again.status.success(), "Duplicate ID was accepted");
    assert!(
        stderr.contains(&format!("Container ID {id} already exists")),
        "Unexpected error: {stderr}"
    );
    assert!(
        !stderr.contains("Downloading") && !stderr.contains("Selected template"),
        "Template handling ran before the ID check: {stderr}"
    );

    let destroy = Command::new(&lxckit)
        .args(["destroy", &id, "--force", "--stop"])
        .output()
        .expect("Failed to run lxckit destroy");
    assert!(
        destroy.status.success(),
        "destroy failed: {}",
        String::from_utf8_lossy(&destroy.stderr)
    );
    let gone = Command::new("pct")
        .args(["status", &id])
        .output()
        .expect("Failed to run pct status");
    assert!(!gone.status.success(), "Container {id} still exists");
}
