//! OS template resolution
//!
//! Picks the newest "standard" system template for a distribution release
//! from the `pveam` catalog and makes sure it is present in the template
//! storage before `pct create` needs it.

use bootc_utils::CommandRunExt;
use clap::Parser;
use color_eyre::eyre::eyre;
use color_eyre::{Result, Section};
use tracing::{info, instrument, warn};

use crate::pve::Pve;

/// Supported guest distributions; both ship apt and systemd.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    clap::ValueEnum,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum OsFamily {
    /// Debian GNU/Linux
    Debian,
    /// Ubuntu
    Ubuntu,
}

/// A distribution release to look up in the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateQuery {
    /// Distribution
    pub os: OsFamily,
    /// Release, e.g. `12` or `24.04`
    pub version: String,
}

impl TemplateQuery {
    /// Name prefix shared by all builds of the standard template.
    pub fn prefix(&self) -> String {
        format!("{}-{}-standard_", self.os, self.version)
    }
}

/// A template file in a Proxmox storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRef {
    /// Storage holding `vztmpl` content
    pub storage: String,
    /// File name, e.g. `debian-12-standard_12.7-1_amd64.tar.zst`
    pub name: String,
}

impl TemplateRef {
    /// Volume ID as accepted by `pct create`.
    pub fn volid(&self) -> String {
        format!("{}:vztmpl/{}", self.storage, self.name)
    }
}

/// What to do when the selected template is not cached locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fetch {
    /// Download it with `pveam download`.
    Download,
    /// Fail.
    CachedOnly,
    /// Only report, against the cached catalog index; used by dry runs.
    Plan,
}

/// Options for `lxckit template resolve`
#[derive(Debug, Parser)]
pub struct ResolveOpts {
    /// Distribution
    #[clap(long, env = "CT_OS", value_enum, default_value_t = OsFamily::Debian)]
    pub os: OsFamily,

    /// Distribution release
    #[clap(long = "os-version", env = "CT_OS_VERSION", default_value = "12")]
    pub version: String,

    /// Storage holding container templates
    #[clap(long, env = "CT_TEMPLATE_STORAGE", default_value = "local")]
    pub storage: String,

    /// Fail instead of downloading a missing template
    #[clap(long)]
    pub no_download: bool,
}

/// Subcommands for template handling
#[derive(Debug, clap::Subcommand)]
pub enum TemplateCommands {
    /// Resolve (and download if needed) the newest standard template
    Resolve(ResolveOpts),
}

impl TemplateCommands {
    pub fn run(self) -> Result<()> {
        match self {
            TemplateCommands::Resolve(opts) => {
                let pve = Pve::default();
                crate::preflight::require_tools(&pve)?;
                let query = TemplateQuery {
                    os: opts.os,
                    version: opts.version,
                };
                let fetch = if opts.no_download {
                    Fetch::CachedOnly
                } else {
                    Fetch::Download
                };
                let template = resolve(&pve, &query, &opts.storage, fetch)?;
                println!("{}", template.volid());
                Ok(())
            }
        }
    }
}

/// Template names from `pveam available` output, `system` section only.
pub fn parse_available(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let section = parts.next()?;
            let name = parts.next()?;
            (section == "system").then(|| name.to_string())
        })
        .collect()
}

/// Template file names from `pveam list <storage>` output.
pub fn parse_local(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let volid = line.split_whitespace().next()?;
            let (_, name) = volid.split_once(":vztmpl/")?;
            Some(name.to_string())
        })
        .collect()
}

/// The lexicographically greatest candidate matching the query.
pub fn select_latest<'a>(
    candidates: impl IntoIterator<Item = &'a String>,
    query: &TemplateQuery,
) -> Option<&'a String> {
    let prefix = query.prefix();
    candidates
        .into_iter()
        .filter(|name| name.starts_with(&prefix))
        .max()
}

/// Find the newest matching template and make sure it is in `storage`.
#[instrument(skip(pve))]
pub fn resolve(pve: &Pve, query: &TemplateQuery, storage: &str, fetch: Fetch) -> Result<TemplateRef> {
    // Plans read the cached index
    if fetch != Fetch::Plan {
        if let Err(e) = pve.pveam_command().arg("update").run_capture_stderr() {
            warn!("pveam update failed, using the existing catalog index: {e}");
        }
    }

    let available = pve
        .pveam_command()
        .args(["available", "--section", "system"])
        .run_get_string()
        .map_err(|e| {
            eyre!("Querying the template catalog: {e}")
                .suggestion("Check that this host can reach download.proxmox.com")
                .suggestion("Run `pveam update` manually and look at its output")
        })?;
    let available = parse_available(&available);

    let Some(name) = select_latest(&available, query) else {
        return Err(eyre!("No template found for {} {}", query.os, query.version)
            .suggestion(format!(
                "List candidates with `pveam available --section system | grep {}`",
                query.os
            ))
            .suggestion("Check that the requested release is still published"));
    };
    let template = TemplateRef {
        storage: storage.to_string(),
        name: name.clone(),
    };
    info!("Selected template {}", template.name);

    let local = pve
        .pveam_command()
        .args(["list", storage])
        .run_get_string()
        .map_err(|e| {
            eyre!("Listing templates in storage '{storage}': {e}")
                .suggestion("Check that the storage exists and allows 'vztmpl' content")
        })?;
    if parse_local(&local).contains(&template.name) {
        info!("Template already present in {storage}");
        return Ok(template);
    }

    match fetch {
        Fetch::Plan => {
            info!("Template would be downloaded to {storage}");
            Ok(template)
        }
        Fetch::CachedOnly => Err(eyre!(
            "Template {} is not present in storage '{storage}'",
            template.name
        )
        .suggestion(format!("Run `pveam download {storage} {}`", template.name))),
        Fetch::Download => {
            info!("Downloading {} to {storage}", template.name);
            pve.pveam_command()
                .args(["download", storage, &template.name])
                .run_capture_stderr()
                .map_err(|e| {
                    eyre!("Downloading template {}: {e}", template.name)
                        .suggestion("Check free space on the template storage")
                        .suggestion("Check that this host can reach download.proxmox.com")
                })?;
            Ok(template)
        }
    }
}
