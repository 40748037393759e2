//! Container lifecycle: create, start and wait for boot
//!
//! The `pct create` command line is built in one place from the validated
//! configuration so it can be printed for dry runs and checked in tests.

use std::time::Duration;

use color_eyre::eyre::eyre;
use color_eyre::Result;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing::{info, instrument, warn};

use crate::config::ContainerConfig;
use crate::pve::Pve;
use crate::template::{OsFamily, TemplateRef};

/// Exists once systemd is running as PID 1 inside the container.
pub const BOOT_MARKER: &str = "/run/systemd/system";

const NETWORK_ATTEMPTS: u32 = 30;

/// Everything needed to create one container.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub id: u32,
    pub config: ContainerConfig,
    pub template: TemplateRef,
}

impl ContainerSpec {
    /// Arguments for `pct`, starting with the `create` subcommand.
    pub fn create_args(&self) -> Vec<String> {
        let c = &self.config;
        let mut args: Vec<String> = vec![
            "create".into(),
            self.id.to_string(),
            self.template.volid(),
            "--hostname".into(),
            c.hostname.clone(),
            "--cores".into(),
            c.cores.to_string(),
            "--memory".into(),
            c.memory_mb.to_string(),
            "--swap".into(),
            c.swap_mb.to_string(),
            "--rootfs".into(),
            format!("{}:{}", c.storage, c.disk_gb),
            "--net0".into(),
            c.network.net0(),
            "--unprivileged".into(),
            if c.unprivileged { "1" } else { "0" }.into(),
        ];
        if c.nesting {
            args.push("--features".into());
            args.push(if c.unprivileged {
                "nesting=1,keyctl=1".into()
            } else {
                "nesting=1".into()
            });
        }
        if let Some(ns) = &c.network.nameserver {
            args.push("--nameserver".into());
            args.push(ns.clone());
        }
        if let Some(keys) = &c.ssh_keys {
            args.push("--ssh-public-keys".into());
            args.push(keys.to_string());
        }
        args.extend([
            "--onboot".into(),
            "1".into(),
            "--tags".into(),
            c.tags.join(";"),
        ]);
        args
    }

    /// The create command as a copy-pasteable shell line.
    pub fn create_command_line(&self) -> String {
        let args = self.create_args();
        let quoted = args
            .iter()
            .map(|a| shlex::try_quote(a).map(|q| q.into_owned()).unwrap_or_else(|_| a.clone()))
            .collect::<Vec<_>>()
            .join(" ");
        format!("pct {quoted}")
    }
}

/// Run `pct create`.
#[instrument(skip_all, fields(id = spec.id))]
pub fn create(pve: &Pve, spec: &ContainerSpec) -> Result<()> {
    info!(
        "Creating container {} ({}) from {}",
        spec.id,
        spec.config.hostname,
        spec.template.name
    );
    pve.create(spec.create_args())
}

fn boot_progress_bar(id: u32) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_draw_target(ProgressDrawTarget::stderr());
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg} [{elapsed}]") {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(format!("Waiting for container {id} to boot..."));
    pb
}

/// Poll for [`BOOT_MARKER`] every `interval` until `timeout` elapses.
#[instrument(skip(pve))]
pub fn wait_for_boot(pve: &Pve, id: u32, timeout: Duration, interval: Duration) -> Result<()> {
    let attempts = (timeout.as_millis() / interval.as_millis().max(1)).max(1);
    let pb = boot_progress_bar(id);
    for _ in 0..attempts {
        if pve.exec_succeeds(id, &["test", "-e", BOOT_MARKER])? {
            pb.finish_and_clear();
            info!("Container {id} booted");
            return Ok(());
        }
        std::thread::sleep(interval);
    }
    pb.finish_and_clear();
    Err(eyre!(
        "Container {id} did not finish booting within {}s",
        timeout.as_secs()
    ))
}

/// Host the guest resolves to prove DNS and routing work.
pub fn network_check_host(os: OsFamily) -> &'static str {
    match os {
        OsFamily::Debian => "deb.debian.org",
        OsFamily::Ubuntu => "archive.ubuntu.com",
    }
}

/// Wait until name resolution works inside the container.
///
/// Gives up with a warning; the next package install reports the real error.
#[instrument(skip(pve))]
pub fn wait_for_network(pve: &Pve, id: u32, lookup_host: &str, interval: Duration) -> Result<()> {
    for attempt in 1..=NETWORK_ATTEMPTS {
        if pve.exec_succeeds(id, &["getent", "hosts", lookup_host])? {
            info!("Network is up in container {id}");
            return Ok(());
        }
        tracing::debug!("Network not ready (attempt {attempt}/{NETWORK_ATTEMPTS})");
        std::thread::sleep(interval);
    }
    warn!("Container {id} cannot resolve {lookup_host}; continuing anyway");
    Ok(())
}
