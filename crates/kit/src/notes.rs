//! Summary written to the container's notes field and the terminal
//!
//! The text is for humans only. Proxmox renders notes as Markdown, so the
//! layout uses headings and lists; nothing parses it back.

use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use indoc::formatdoc;
use tracing::{info, warn};

use crate::exec::ContainerShell;
use crate::pve::Pve;
use crate::recipes::Endpoint;

/// How the container's address is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    /// Configured statically
    Static(Ipv4Addr),
    /// Read back from a DHCP lease
    Discovered(String),
    /// DHCP, but no lease was seen
    Pending,
}

impl Address {
    /// Address to use in URLs, if any.
    pub fn host(&self) -> Option<String> {
        match self {
            Address::Static(a) => Some(a.to_string()),
            Address::Discovered(a) => Some(a.clone()),
            Address::Pending => None,
        }
    }

    fn describe(&self) -> String {
        match self {
            Address::Static(a) => format!("{a} (static)"),
            Address::Discovered(a) => format!("{a} (DHCP)"),
            Address::Pending => "DHCP (pending)".to_string(),
        }
    }
}

/// Facts about a provisioned container.
#[derive(Debug, Clone)]
pub struct Report {
    pub id: u32,
    pub hostname: String,
    pub title: &'static str,
    pub template: String,
    pub cores: u32,
    pub memory_mb: u32,
    pub disk_gb: u32,
    pub storage: String,
    pub address: Address,
    pub endpoints: Vec<Endpoint>,
    pub created: DateTime<Utc>,
}

impl Report {
    /// Markdown text for the notes field and the terminal.
    pub fn render(&self) -> String {
        let mut s = formatdoc! {"
            ## {title}

            Provisioned by lxckit on {created}

            **Container**
            - ID: {id}
            - Hostname: {hostname}
            - Address: {address}
            - Template: {template}
            - Resources: {cores} cores, {memory} MB RAM, {disk} GB disk on {storage}
            ",
            title = self.title,
            created = self.created.format("%Y-%m-%d %H:%M UTC"),
            id = self.id,
            hostname = self.hostname,
            address = self.address.describe(),
            template = self.template,
            cores = self.cores,
            memory = self.memory_mb,
            disk = self.disk_gb,
            storage = self.storage,
        };
        if !self.endpoints.is_empty() {
            s.push_str("\n**Endpoints**\n");
            for e in &self.endpoints {
                s.push_str(&format!("- {}: {}\n", e.label, e.url));
            }
        }
        s.push_str(&formatdoc! {"

            **Operations**
            - Shell: `pct enter {id}`
            - Stop: `pct stop {id}`
            - Remove: `pct stop {id} && pct destroy {id} --purge`
            ",
            id = self.id,
        });
        s
    }
}

/// First IPv4 address reported by the guest, if any.
pub fn discover_address(sh: &ContainerShell) -> Option<String> {
    match sh.output(["hostname", "-I"]) {
        Ok(out) => out
            .split_whitespace()
            .find(|a| a.parse::<Ipv4Addr>().is_ok())
            .map(ToOwned::to_owned),
        Err(e) => {
            warn!("Could not read the address of container {}: {e}", sh.id());
            None
        }
    }
}

/// Store `text` as the container's notes; failure is only a warning.
pub fn attach(pve: &Pve, id: u32, text: &str) {
    match pve.set_description(id, text) {
        Ok(()) => info!("Wrote notes for container {id}"),
        Err(e) => warn!("Could not write notes for container {id}: {e}"),
    }
}
