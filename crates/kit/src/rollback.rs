//! Handling of half-built containers
//!
//! Provisioning is not transactional. If a step fails after `pct create`
//! succeeded, the operator chooses (up front or interactively) whether the
//! partial container is kept for debugging or destroyed.

use color_eyre::Result;
use inquire::Confirm;
use tracing::{info, warn};

use crate::pve::Pve;

/// Policy for a container whose provisioning failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum OnFailure {
    /// Leave the container in place
    Keep,
    /// Ask on the terminal; keep when not interactive
    #[default]
    Prompt,
    /// Stop and purge the container
    Destroy,
}

/// Apply `policy` to container `id` after a failed provisioning step.
///
/// `Prompt` asks only when `interactive`; otherwise the container is kept.
/// Errors while cleaning up are logged, never returned: the caller always
/// reports the original failure.
pub fn handle_failure(pve: &Pve, id: u32, policy: OnFailure, interactive: bool) {
    info!("Provisioning of container {id} failed; on-failure policy is '{policy}'");
    let destroy = match policy {
        OnFailure::Keep => false,
        OnFailure::Destroy => true,
        OnFailure::Prompt => {
            if interactive {
                Confirm::new(&format!(
                    "Provisioning failed. Destroy the partially configured container {id}?"
                ))
                .with_default(false)
                .prompt()
                .unwrap_or_else(|e| {
                    warn!("Prompt failed ({e}); keeping container {id}");
                    false
                })
            } else {
                false
            }
        }
    };

    if destroy {
        if let Err(e) = destroy_container(pve, id) {
            warn!("Cleanup of container {id} failed: {e:#}");
            warn!("Remove it manually with: pct stop {id} && pct destroy {id} --purge");
        }
    } else {
        warn!("Container {id} was left in a partially configured state");
        warn!("Inspect it with 'pct enter {id}' or remove it with 'pct stop {id} && pct destroy {id} --purge'");
    }
}

fn destroy_container(pve: &Pve, id: u32) -> Result<()> {
    info!("Destroying container {id}");
    if pve.status(id).map(|s| s == "running").unwrap_or(true) {
        if let Err(e) = pve.stop(id) {
            warn!("Stopping container {id} failed: {e}");
        }
    }
    pve.destroy(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeHost;

    #[test]
    fn test_keep_leaves_container() {
        let host = FakeHost::builder().build();
        handle_failure(&host.pve(), 120, OnFailure::Keep, false);
        assert!(!host.called("pct destroy"));
        assert!(!host.called("pct stop"));
    }

    #[test]
    fn test_prompt_without_terminal_keeps() {
        let host = FakeHost::builder().build();
        handle_failure(&host.pve(), 120, OnFailure::Prompt, false);
        assert!(host.log().is_empty(), "unexpected calls: {}", host.log());
    }

    #[test]
    fn test_destroy_stops_and_purges() {
        let host = FakeHost::builder().build();
        handle_failure(&host.pve(), 120, OnFailure::Destroy, false);
        let stop = host.position("pct stop 120").unwrap();
        let destroy = host.position("pct destroy 120 --purge").unwrap();
        assert!(stop < destroy);
    }

    #[test]
    fn test_destroy_failure_is_swallowed() {
        let host = FakeHost::builder().fail_matching("pct destroy").build();
        handle_failure(&host.pve(), 120, OnFailure::Destroy, false);
        assert!(host.called("pct destroy 120"));
    }
}
