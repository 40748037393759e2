//! List LXC containers on the cluster

use clap::Parser;
use color_eyre::Result;
use comfy_table::{presets, Table};

use crate::config::MANAGED_TAG;
use crate::pve::{ClusterResource, Pve};

/// Options for listing containers
#[derive(Debug, Parser)]
pub struct ListOpts {
    /// Output as structured JSON instead of table format
    #[clap(long)]
    pub json: bool,

    /// Only show containers created by lxckit
    #[clap(long)]
    pub managed: bool,
}

fn is_managed(r: &ClusterResource) -> bool {
    r.tags
        .as_deref()
        .is_some_and(|tags| tags.split([';', ',', ' ']).any(|t| t == MANAGED_TAG))
}

fn filter(resources: Vec<ClusterResource>, managed: bool) -> Vec<ClusterResource> {
    let mut r: Vec<_> = resources
        .into_iter()
        .filter(|r| r.is_lxc() && (!managed || is_managed(r)))
        .collect();
    r.sort_by_key(|r| r.vmid);
    r
}

fn format_bytes_mb(bytes: Option<u64>) -> String {
    bytes
        .map(|b| format!("{} MB", b / (1024 * 1024)))
        .unwrap_or_else(|| "-".to_string())
}

fn table(containers: &[ClusterResource]) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::NOTHING);
    table.set_header(vec!["VMID", "NAME", "STATUS", "NODE", "MEMORY", "TAGS"]);
    for c in containers {
        table.add_row(vec![
            c.vmid.to_string(),
            c.name.clone().unwrap_or_default(),
            c.status.clone().unwrap_or_else(|| "-".into()),
            c.node.clone().unwrap_or_default(),
            format_bytes_mb(c.maxmem),
            c.tags.clone().unwrap_or_default(),
        ]);
    }
    table
}

/// Execute the list command
pub fn run(opts: ListOpts) -> Result<()> {
    let pve = Pve::default();
    crate::preflight::require_tools(&pve)?;
    let containers = filter(pve.resources()?, opts.managed);

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&containers)?);
    } else if containers.is_empty() {
        println!("No containers found");
    } else {
        println!("{}", table(&containers));
    }
    Ok(())
}
