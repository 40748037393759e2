//! Running commands inside a container
//!
//! Every provisioning action is a separate `pct exec` (or `pct push`)
//! round-trip. A non-zero exit aborts the recipe; there is no retry and no
//! undo of the steps that already ran.

use std::cell::Cell;
use std::ffi::OsStr;
use std::io::Write as _;

use bootc_utils::CommandRunExt;
use color_eyre::eyre::{eyre, Context};
use color_eyre::Result;
use tracing::{debug, info};

use crate::pve::Pve;

/// Command runner bound to one container.
#[derive(Debug)]
pub struct ContainerShell<'a> {
    pve: &'a Pve,
    id: u32,
    apt_updated: Cell<bool>,
}

impl<'a> ContainerShell<'a> {
    /// A shell for container `id`.
    pub fn new(pve: &'a Pve, id: u32) -> Self {
        Self {
            pve,
            id,
            apt_updated: Cell::new(false),
        }
    }

    /// The container this shell talks to.
    pub fn id(&self) -> u32 {
        self.id
    }

    fn exec_command<I, S>(&self, args: I) -> std::process::Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = self.pve.pct_command();
        cmd.args(["exec", &self.id.to_string(), "--"]).args(args);
        cmd
    }

    /// Run a program inside the container.
    pub fn run<I, S>(&self, args: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = self.exec_command(args);
        debug!("{cmd:?}");
        cmd.run_capture_stderr().map_err(|e| eyre!("{e}"))
    }

    /// Run a program inside the container and capture its stdout.
    pub fn output<I, S>(&self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.exec_command(args)
            .run_get_string()
            .map_err(|e| eyre!("{e}"))
    }

    /// Run a bash script with `errexit`, `nounset` and `pipefail` set.
    pub fn script(&self, script: &str) -> Result<()> {
        self.run(["bash", "-euo", "pipefail", "-c", script])
    }

    /// Install `contents` at `path` inside the container.
    pub fn write_file(&self, path: &str, contents: &str, mode: u32) -> Result<()> {
        let mut tmp = tempfile::NamedTempFile::new().context("Creating temporary file")?;
        tmp.write_all(contents.as_bytes())
            .and_then(|_| tmp.flush())
            .context("Writing temporary file")?;
        self.pve
            .pct_command()
            .arg("push")
            .arg(self.id.to_string())
            .arg(tmp.path())
            .arg(path)
            .args(["--perms", &format!("{mode:04o}")])
            .run_capture_stderr()
            .map_err(|e| eyre!("Copying {path} into container {}: {e}", self.id))
    }

    /// Install Debian packages, refreshing the index on first use.
    pub fn apt_install(&self, packages: &[&str]) -> Result<()> {
        if !self.apt_updated.get() {
            self.run(["apt-get", "update", "-qq"])
                .context("Updating package index")?;
            self.apt_updated.set(true);
        }
        let mut args = vec![
            "env",
            "DEBIAN_FRONTEND=noninteractive",
            "apt-get",
            "install",
            "-y",
            "-qq",
            "--no-install-recommends",
        ];
        args.extend_from_slice(packages);
        self.run(args)
            .with_context(|| format!("Installing {}", packages.join(" ")))
    }

    /// Reload units and enable/start `unit`.
    pub fn enable_service(&self, unit: &str) -> Result<()> {
        self.run(["systemctl", "daemon-reload"])?;
        self.run(["systemctl", "enable", "--now", unit])
            .with_context(|| format!("Enabling {unit}"))
    }

    /// Run one named provisioning step, attaching its name to any failure.
    pub fn step<T>(&self, description: &str, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        info!("{description}");
        f(self).with_context(|| format!("Step failed: {description}"))
    }
}
