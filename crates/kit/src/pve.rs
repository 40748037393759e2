//! Wrappers around the Proxmox VE host tools
//!
//! Everything lxckit does to the host goes through `pct`, `pveam` or `pvesh`.
//! Listing and ID lookups use the structured `pvesh` JSON output; the
//! template catalog is only exposed as text by `pveam` and is parsed in
//! [`crate::template`].

use std::ffi::{OsStr, OsString};
use std::process::{Command, Stdio};

use bootc_utils::CommandRunExt;
use color_eyre::eyre::{eyre, Context};
use color_eyre::Result;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// A host executable, optionally invoked through an interpreter.
#[derive(Debug, Clone)]
pub struct Tool {
    program: OsString,
    leading: Vec<OsString>,
}

impl Tool {
    /// A tool looked up by name on `PATH`.
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            leading: Vec::new(),
        }
    }

    /// A shell script run via `/bin/sh`.
    #[cfg(test)]
    pub fn script(path: impl Into<OsString>) -> Self {
        Self {
            program: "/bin/sh".into(),
            leading: vec![path.into()],
        }
    }

    /// Name used in diagnostics.
    pub fn name(&self) -> String {
        let target = self.leading.first().unwrap_or(&self.program);
        std::path::Path::new(target)
            .file_name()
            .unwrap_or(target.as_os_str())
            .to_string_lossy()
            .into_owned()
    }

    /// Whether the program can be found.
    pub fn is_available(&self) -> bool {
        let found = which::which(&self.program).is_ok();
        match self.leading.first() {
            Some(script) => found && std::path::Path::new(script).exists(),
            None => found,
        }
    }

    /// Build a command for this tool.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading);
        cmd
    }
}

/// A guest (LXC or QEMU) as reported by `/cluster/resources`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterResource {
    /// Numeric guest ID
    pub vmid: u32,
    /// Guest name (hostname for containers)
    pub name: Option<String>,
    /// `running`, `stopped`, ...
    pub status: Option<String>,
    /// `lxc` or `qemu`
    #[serde(rename = "type")]
    pub kind: String,
    /// Cluster node hosting the guest
    pub node: Option<String>,
    /// Memory limit in bytes
    pub maxmem: Option<u64>,
    /// Disk size in bytes
    pub maxdisk: Option<u64>,
    /// Semicolon separated tags
    pub tags: Option<String>,
}

impl ClusterResource {
    /// Whether this guest is a container.
    pub fn is_lxc(&self) -> bool {
        self.kind == "lxc"
    }

    /// Whether this guest is running.
    pub fn is_running(&self) -> bool {
        self.status.as_deref() == Some("running")
    }
}

/// Handle on the Proxmox host tools.
#[derive(Debug, Clone)]
pub struct Pve {
    /// Container toolkit
    pub pct: Tool,
    /// Appliance (template) manager
    pub pveam: Tool,
    /// API shell
    pub pvesh: Tool,
}

impl Default for Pve {
    fn default() -> Self {
        Self {
            pct: Tool::new("pct"),
            pveam: Tool::new("pveam"),
            pvesh: Tool::new("pvesh"),
        }
    }
}

impl Pve {
    /// The tools in the order preflight checks them.
    pub fn tools(&self) -> [&Tool; 3] {
        [&self.pct, &self.pveam, &self.pvesh]
    }

    /// Build a `pct` command.
    pub fn pct_command(&self) -> Command {
        self.pct.command()
    }

    /// Build a `pveam` command.
    pub fn pveam_command(&self) -> Command {
        self.pveam.command()
    }

    /// All guests known to the cluster.
    #[instrument(skip(self))]
    pub fn resources(&self) -> Result<Vec<ClusterResource>> {
        let output = self
            .pvesh
            .command()
            .args([
                "get",
                "/cluster/resources",
                "--type",
                "vm",
                "--output-format",
                "json",
            ])
            .run_get_string()
            .map_err(|e| eyre!("Listing cluster resources: {e}"))?;
        parse_resources(&output)
    }

    /// Whether any guest (container or VM) already uses `id`.
    #[instrument(skip(self))]
    pub fn guest_exists(&self, id: u32) -> Result<bool> {
        Ok(self.resources()?.iter().any(|r| r.vmid == id))
    }

    /// Ask the cluster for the next free guest ID.
    #[instrument(skip(self))]
    pub fn next_id(&self) -> Result<u32> {
        let output = self
            .pvesh
            .command()
            .args(["get", "/cluster/nextid", "--output-format", "json"])
            .run_get_string()
            .map_err(|e| eyre!("Querying next free ID: {e}"))?;
        parse_next_id(&output)
    }

    /// Run `pct create` with pre-built arguments.
    #[instrument(skip(self, args))]
    pub fn create<I, S>(&self, args: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.pct_command()
            .args(args)
            .run_capture_stderr()
            .map_err(|e| eyre!("Creating container: {e}"))
    }

    /// Start a container.
    #[instrument(skip(self))]
    pub fn start(&self, id: u32) -> Result<()> {
        self.pct_command()
            .args(["start", &id.to_string()])
            .run_capture_stderr()
            .map_err(|e| eyre!("Starting container {id}: {e}"))
    }

    /// Stop a container immediately.
    #[instrument(skip(self))]
    pub fn stop(&self, id: u32) -> Result<()> {
        self.pct_command()
            .args(["stop", &id.to_string()])
            .run_capture_stderr()
            .map_err(|e| eyre!("Stopping container {id}: {e}"))
    }

    /// Destroy a container along with its storage and job references.
    #[instrument(skip(self))]
    pub fn destroy(&self, id: u32) -> Result<()> {
        self.pct_command()
            .args(["destroy", &id.to_string(), "--purge"])
            .run_capture_stderr()
            .map_err(|e| eyre!("Destroying container {id}: {e}"))
    }

    /// Replace the notes (description) of a container.
    #[instrument(skip(self, text))]
    pub fn set_description(&self, id: u32, text: &str) -> Result<()> {
        self.pct_command()
            .args(["set", &id.to_string(), "--description", text])
            .run_capture_stderr()
            .map_err(|e| eyre!("Setting notes on container {id}: {e}"))
    }

    /// Current status word from `pct status`, e.g. `running`.
    #[instrument(skip(self))]
    pub fn status(&self, id: u32) -> Result<String> {
        let output = self
            .pct_command()
            .args(["status", &id.to_string()])
            .run_get_string()
            .map_err(|e| eyre!("Querying status of container {id}: {e}"))?;
        parse_status(&output)
    }

    /// Run a command inside a container, returning only whether it succeeded.
    pub fn exec_succeeds(&self, id: u32, args: &[&str]) -> Result<bool> {
        let status = self
            .pct_command()
            .args(["exec", &id.to_string(), "--"])
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .with_context(|| format!("Running pct exec on container {id}"))?;
        Ok(status.success())
    }
}

fn parse_resources(output: &str) -> Result<Vec<ClusterResource>> {
    serde_json::from_str(output).context("Parsing pvesh cluster resources JSON")
}

fn parse_next_id(output: &str) -> Result<u32> {
    let value: serde_json::Value =
        serde_json::from_str(output.trim()).context("Parsing pvesh nextid output")?;
    let id = match &value {
        serde_json::Value::String(s) => s.parse().ok(),
        serde_json::Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        _ => None,
    };
    id.ok_or_else(|| eyre!("Unexpected nextid output: {value}"))
}

fn parse_status(output: &str) -> Result<String> {
    output
        .lines()
        .find_map(|line| line.trim().strip_prefix("status:"))
        .map(|s| s.trim().to_string())
        .ok_or_else(|| eyre!("Unexpected pct status output: {output}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resources() {
        let input = r#"[
            {"id":"lxc/101","maxdisk":8589934592,"maxmem":1073741824,"name":"mailpit","node":"pve","status":"running","tags":"lxckit","type":"lxc","vmid":101},
            {"id":"qemu/100","name":"win11","node":"pve","status":"stopped","type":"qemu","vmid":100}
        ]"#;
        let result = parse_resources(input).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].vmid, 101);
        assert!(result[0].is_lxc());
        assert!(result[0].is_running());
        assert_eq!(result[0].tags.as_deref(), Some("lxckit"));
        assert!(!result[1].is_lxc());
        assert!(!result[1].is_running());
        assert_eq!(result[1].maxmem, None);
    }

    #[test]
    fn test_parse_resources_empty() {
        assert!(parse_resources("[]").unwrap().is_empty());
    }

    #[test]
    fn test_parse_next_id() {
        assert_eq!(parse_next_id("\"105\"\n").unwrap(), 105);
        assert_eq!(parse_next_id("106").unwrap(), 106);
        assert!(parse_next_id("null").is_err());
    }

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_status("status: running\n").unwrap(), "running");
        assert_eq!(parse_status("status: stopped").unwrap(), "stopped");
        assert!(parse_status("garbage").is_err());
    }

    #[test]
    fn test_tool_name() {
        assert_eq!(Tool::new("pct").name(), "pct");
        assert_eq!(Tool::new("/usr/sbin/pveam").name(), "pveam");
        assert_eq!(Tool::script("/tmp/x/pvesh").name(), "pvesh");
    }

    #[test]
    fn test_missing_tool_unavailable() {
        assert!(!Tool::new("/nonexistent/lxckit-test/pct").is_available());
    }
}
