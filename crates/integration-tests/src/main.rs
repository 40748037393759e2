use std::path::Path;

use color_eyre::eyre::{eyre, Context};
use color_eyre::Result;
use libtest_mimic::{Arguments, Trial};
use serde_json::Value;
use xshell::{cmd, Shell};

/// Tag applied to every container created by integration tests
pub(crate) const INTEGRATION_TEST_TAG: &str = "lxckit-integration-test";

/// Destroy every container carrying the integration test tag
pub(crate) fn cleanup_integration_test_containers() {
    println!("Cleaning up integration test containers...");

    let Ok(sh) = Shell::new() else {
        return;
    };
    let Ok(output) = cmd!(sh, "pvesh get /cluster/resources --type vm --output-format json")
        .quiet()
        .read()
    else {
        return;
    };
    let Ok(resources) = serde_json::from_str::<Vec<Value>>(&output) else {
        return;
    };

    let ids: Vec<String> = resources
        .iter()
        .filter(|r| {
            r["type"] == "lxc"
                && r["tags"]
                    .as_str()
                    .is_some_and(|t| t.split(';').any(|t| t == INTEGRATION_TEST_TAG))
        })
        .filter_map(|r| r["vmid"].as_u64().map(|v| v.to_string()))
        .collect();

    if ids.is_empty() {
        println!("No integration test containers found to clean up");
        return;
    }
    println!("Found {} integration test container(s) to clean up", ids.len());
    for id in ids {
        let _ = cmd!(sh, "pct stop {id}").quiet().ignore_status().run();
        let _ = cmd!(sh, "pct destroy {id} --purge").quiet().ignore_status().run();
    }
    println!("Cleanup completed");
}

mod tests {
    pub mod cli;
    pub mod create;
}

/// Get the path to the lxckit binary, checking LXCKIT_PATH env var first, then falling back to "lxckit"
pub(crate) fn get_lxckit_command() -> Result<String> {
    if let Ok(path) = std::env::var("LXCKIT_PATH") {
        return Ok(path);
    }
    // Force the user to set this if we're running from the project dir
    if let Some(path) = ["target/debug/lxckit", "target/release/lxckit"]
        .into_iter()
        .find(|p| Path::new(p).exists())
    {
        return Err(eyre!(
            "Detected {path} - set LXCKIT_PATH={path} to run using this binary"
        ));
    }
    Ok("lxckit".to_owned())
}

/// Container ID reserved for tests that create containers
pub(crate) fn get_test_id() -> String {
    std::env::var("LXCKIT_TEST_ID").unwrap_or_else(|_| "9999".to_string())
}

/// Whether this machine is a Proxmox VE node we may provision on.
fn is_pve_host() -> bool {
    Path::new("/etc/pve").is_dir() && is_root()
}

fn is_root() -> bool {
    Shell::new()
        .and_then(|sh| cmd!(sh, "id -u").quiet().read())
        .is_ok_and(|uid| uid.trim() == "0")
}

fn test_recipes_list() -> Result<()> {
    println!("Running test: lxckit recipes list --json");

    let sh = Shell::new()?;
    let lxckit = get_lxckit_command()?;

    let stdout = cmd!(sh, "{lxckit} recipes list --json").read()?;
    let recipes: Value = serde_json::from_str(&stdout).context("Failed to parse JSON output")?;
    let recipes = recipes
        .as_array()
        .ok_or_else(|| eyre!("Expected JSON array in output, got: {}", stdout))?;

    let names: Vec<&str> = recipes.iter().filter_map(|r| r["name"].as_str()).collect();
    for expected in ["base", "mailpit", "portainer", "node-red"] {
        if !names.contains(&expected) {
            return Err(eyre!("Recipe {expected} missing from {names:?}"));
        }
    }
    println!("Test passed: lxckit recipes list --json (found {} recipes)", names.len());
    Ok(())
}

fn main() {
    let args = Arguments::from_args();
    let ignore_host_tests = !is_pve_host();

    let host_tests = vec![
        Trial::test("list_json_output", || {
            tests::cli::test_list_json_output();
            Ok(())
        }),
        Trial::test("template_resolve", || {
            tests::cli::test_template_resolve();
            Ok(())
        }),
        Trial::test("create_dry_run", || {
            tests::cli::test_create_dry_run();
            Ok(())
        }),
        Trial::test("mailpit_end_to_end", || {
            tests::create::test_mailpit_end_to_end();
            Ok(())
        }),
    ];

    let mut tests = vec![
        Trial::test("recipes_list", || {
            test_recipes_list()?;
            Ok(())
        }),
        Trial::test("create_requires_root", || {
            tests::cli::test_create_requires_root();
            Ok(())
        })
        .with_ignored_flag(is_root()),
    ];
    tests.extend(
        host_tests
            .into_iter()
            .map(|t| t.with_ignored_flag(ignore_host_tests)),
    );

    // Run the tests and capture the exit code
    let exit_code = libtest_mimic::run(&args, tests);

    if !ignore_host_tests {
        cleanup_integration_test_containers();
    }

    // Exit with the test result
    exit_code.exit();
}
