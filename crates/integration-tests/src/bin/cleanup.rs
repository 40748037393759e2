//! Remove containers left behind by interrupted integration test runs.

use std::process::Command;

/// Tag carried by containers created by integration tests
const INTEGRATION_TEST_TAG: &str = "lxckit-integration-test";

fn tagged_containers() -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let output = Command::new("pvesh")
        .args([
            "get",
            "/cluster/resources",
            "--type",
            "vm",
            "--output-format",
            "json",
        ])
        .output()?;
    if !output.status.success() {
        return Err(format!(
            "pvesh failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )
        .into());
    }

    let resources: Vec<serde_json::Value> = serde_json::from_slice(&output.stdout)?;
    Ok(resources
        .iter()
        .filter(|r| r["type"] == "lxc")
        .filter(|r| {
            r["tags"]
                .as_str()
                .is_some_and(|t| t.split(';').any(|t| t == INTEGRATION_TEST_TAG))
        })
        .filter_map(|r| r["vmid"].as_u64().map(|v| v.to_string()))
        .collect())
}

fn cleanup_integration_test_containers() -> Result<(), Box<dyn std::error::Error>> {
    println!("Cleaning up integration test containers...");

    let containers = tagged_containers()?;
    if containers.is_empty() {
        println!("No integration test containers found to clean up");
        return Ok(());
    }

    println!(
        "Found {} integration test container(s) to clean up",
        containers.len()
    );

    let mut cleaned = 0;
    for id in containers {
        print!("  Removing container {id}... ");
        // Stopping an already stopped container fails; that's fine
        let _ = Command::new("pct").args(["stop", &id]).output()?;
        let rm_output = Command::new("pct")
            .args(["destroy", &id, "--purge"])
            .output()?;

        if rm_output.status.success() {
            println!("✓");
            cleaned += 1;
        } else {
            println!("✗ (failed)");
            eprintln!("    Error: {}", String::from_utf8_lossy(&rm_output.stderr));
        }
    }

    println!("Cleanup completed: {} container(s) removed", cleaned);
    Ok(())
}

fn main() {
    if let Err(e) = cleanup_integration_test_containers() {
        eprintln!("Error during cleanup: {}", e);
        std::process::exit(1);
    }
}
