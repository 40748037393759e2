//! Checks run before anything on the host is modified
//!
//! Order matters: privilege first, then the host tools, then the container
//! ID. The first two only inspect the local process; callers validate their
//! configuration between [`check_host`] and [`claim_id`], so a bad option is
//! reported before any host tool runs.

use color_eyre::Result;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::pve::Pve;

/// A failed preflight check.
#[derive(Debug, Error)]
pub enum PreflightError {
    /// Effective user is not root.
    #[error("This command must be run as root (effective UID is {0})")]
    NotRoot(u32),
    /// A Proxmox host tool is not installed.
    #[error("'{0}' not found - this command must run on a Proxmox VE host")]
    MissingTool(String),
    /// The requested ID belongs to an existing guest.
    #[error("Container ID {0} already exists")]
    IdInUse(u32),
    /// Looking up existing guests failed.
    #[error("Failed to query existing guests: {0}")]
    Lookup(color_eyre::Report),
}

/// Effective privilege of the invoking process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Privilege {
    /// Effective UID
    pub euid: u32,
}

impl Privilege {
    /// Privilege of the current process.
    pub fn current() -> Self {
        Self {
            euid: rustix::process::geteuid().as_raw(),
        }
    }

    /// Whether the effective UID is 0.
    pub fn is_root(&self) -> bool {
        self.euid == 0
    }
}

/// Fail unless every host tool is reachable.
pub fn require_tools(pve: &Pve) -> Result<(), PreflightError> {
    for tool in pve.tools() {
        if !tool.is_available() {
            return Err(PreflightError::MissingTool(tool.name()));
        }
    }
    Ok(())
}

/// Fail unless running as root on a host with every Proxmox tool.
///
/// Nothing is executed; this only inspects the process and `PATH`.
pub fn check_host(pve: &Pve, privilege: Privilege) -> Result<(), PreflightError> {
    if !privilege.is_root() {
        return Err(PreflightError::NotRoot(privilege.euid));
    }
    require_tools(pve)
}

/// Return the container ID to use.
///
/// A requested ID must be free; without one the cluster's next free ID is
/// allocated. The lookup is point-in-time: nothing stops another process
/// from claiming the ID before `pct create` runs.
#[instrument(skip(pve))]
pub fn claim_id(pve: &Pve, requested: Option<u32>) -> Result<u32, PreflightError> {
    match requested {
        Some(id) => {
            if pve.guest_exists(id).map_err(PreflightError::Lookup)? {
                return Err(PreflightError::IdInUse(id));
            }
            debug!("Container ID {id} is free");
            Ok(id)
        }
        None => {
            let id = pve.next_id().map_err(PreflightError::Lookup)?;
            info!("Using next free container ID {id}");
            Ok(id)
        }
    }
}
