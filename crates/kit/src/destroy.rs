//! `lxckit destroy` - remove a container and its storage

use std::io::IsTerminal;

use clap::Parser;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use inquire::Confirm;

use crate::preflight::{self, Privilege};
use crate::pve::Pve;

/// Options for removing a container
#[derive(Debug, Parser)]
pub struct DestroyOpts {
    /// ID of the container to remove
    pub id: u32,

    /// Force removal without confirmation
    #[clap(long, short = 'f')]
    pub force: bool,

    /// Remove the container even if it's running
    #[clap(long)]
    pub stop: bool,
}

/// Execute the destroy command
pub fn run(opts: DestroyOpts) -> Result<()> {
    let interactive = std::io::stdin().is_terminal();
    remove(&Pve::default(), Privilege::current(), &opts, interactive)?;
    Ok(())
}

/// Remove the container; returns false if nothing was removed.
///
/// Without `--force` the operator is asked when `interactive`; otherwise
/// only the listing and a hint are printed.
pub fn remove(
    pve: &Pve,
    privilege: Privilege,
    opts: &DestroyOpts,
    interactive: bool,
) -> Result<bool> {
    let id = opts.id;
    preflight::check_host(pve, privilege)?;

    let resources = pve.resources()?;
    let guest = resources
        .iter()
        .find(|r| r.vmid == id)
        .ok_or_else(|| eyre!("Container {id} not found"))?;
    if !guest.is_lxc() {
        return Err(eyre!("Guest {id} is a {}, not a container", guest.kind));
    }

    if guest.is_running() && !opts.stop {
        return Err(eyre!(
            "Container {id} is running. Use --stop to force removal or stop it first."
        ));
    }

    if !opts.force {
        println!("This will permanently delete container {id} and its disks:");
        if let Some(name) = &guest.name {
            println!("  Name: {name}");
        }
        if let Some(tags) = &guest.tags {
            println!("  Tags: {tags}");
        }
        println!("  Status: {}", guest.status.as_deref().unwrap_or("unknown"));
        println!();
        if !interactive {
            println!("Are you sure? This cannot be undone. Use --force to skip this prompt.");
            return Ok(false);
        }
        let confirmed = Confirm::new("Are you sure? This cannot be undone.")
            .with_default(false)
            .prompt()
            .map_err(|e| eyre!("Prompt failed: {e}"))?;
        if !confirmed {
            println!("Cancelled.");
            return Ok(false);
        }
    }

    if guest.is_running() {
        println!("Stopping container {id}...");
        pve.stop(id)?;
    }
    println!("Removing container {id}...");
    pve.destroy(id)?;
    println!("Container {id} removed successfully");
    Ok(true)
}
