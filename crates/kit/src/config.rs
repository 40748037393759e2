//! Container configuration
//!
//! Raw options come from the command line or the `CT_*` environment
//! variables and are validated into a [`ContainerConfig`] before anything
//! touches the host.

use std::fmt::Display;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::Args;
use color_eyre::eyre::{self, eyre, Context};
use color_eyre::Result;
use regex::Regex;
use tracing::warn;

use crate::recipes::RecipeInfo;
use crate::rollback::OnFailure;
use crate::template::{OsFamily, TemplateQuery};
use crate::utils::{parse_disk_to_gb, parse_memory_to_mb};

/// Lowest guest ID Proxmox accepts.
pub const MIN_ID: u32 = 100;
/// Highest guest ID Proxmox accepts.
pub const MAX_ID: u32 = 999_999_999;

/// Tag added to every container lxckit creates.
pub const MANAGED_TAG: &str = "lxckit";

/// Container options shared by every recipe.
#[derive(Debug, Clone, Args)]
pub struct ContainerOpts {
    /// Container ID (defaults to the next free ID in the cluster)
    #[clap(long = "id", env = "CT_ID")]
    pub id: Option<u32>,

    /// Hostname (defaults to the recipe name)
    #[clap(long, env = "CT_HOSTNAME")]
    pub hostname: Option<String>,

    /// CPU cores (defaults per recipe)
    #[clap(long, env = "CT_CORES")]
    pub cores: Option<u32>,

    /// Memory, e.g. 2G or 1024 (MB; defaults per recipe)
    #[clap(long, env = "CT_MEMORY")]
    pub memory: Option<String>,

    /// Swap, e.g. 512 (MB; defaults per recipe)
    #[clap(long, env = "CT_SWAP")]
    pub swap: Option<String>,

    /// Root disk size in GB (defaults per recipe)
    #[clap(long, env = "CT_DISK")]
    pub disk: Option<String>,

    /// Storage for the root filesystem
    #[clap(long, env = "CT_STORAGE", default_value = "local-lvm")]
    pub storage: String,

    /// Storage holding container templates
    #[clap(long, env = "CT_TEMPLATE_STORAGE", default_value = "local")]
    pub template_storage: String,

    /// Bridge for eth0
    #[clap(long, env = "CT_BRIDGE", default_value = "vmbr0")]
    pub bridge: String,

    /// `dhcp` or a static IPv4 address in CIDR form (10.0.0.20/24)
    #[clap(long, env = "CT_IP", default_value = "dhcp")]
    pub ip: String,

    /// Gateway; only used with a static address
    #[clap(long = "gateway", env = "CT_GW")]
    pub gateway: Option<String>,

    /// VLAN tag for eth0
    #[clap(long, env = "CT_VLAN")]
    pub vlan: Option<u16>,

    /// DNS server (defaults to the host's settings)
    #[clap(long, env = "CT_DNS")]
    pub nameserver: Option<String>,

    /// Guest distribution
    #[clap(long, env = "CT_OS", value_enum, default_value_t = OsFamily::Debian)]
    pub os: OsFamily,

    /// Guest distribution release
    #[clap(long, env = "CT_OS_VERSION", default_value = "12")]
    pub os_version: String,

    /// Create an unprivileged container
    #[clap(long, env = "CT_UNPRIVILEGED", default_value_t = true, action = clap::ArgAction::Set)]
    pub unprivileged: bool,

    /// Enable nesting even if the recipe does not need it
    #[clap(long, env = "CT_NESTING")]
    pub nesting: bool,

    /// File with SSH public keys for root
    #[clap(long, env = "CT_SSH_KEYS")]
    pub ssh_keys: Option<Utf8PathBuf>,

    /// Extra tags (comma separated)
    #[clap(long = "tag", env = "CT_TAGS", value_delimiter = ',')]
    pub tags: Vec<String>,

    /// Seconds to wait for the container to finish booting
    #[clap(long, env = "CT_BOOT_TIMEOUT", default_value_t = 60)]
    pub boot_timeout: u64,

    /// What to do with a half-built container when provisioning fails
    #[clap(long, env = "CT_ON_FAILURE", value_enum, default_value_t = OnFailure::Prompt)]
    pub on_failure: OnFailure,
}

/// IPv4 configuration of eth0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpConfig {
    /// Address assigned by DHCP
    Dhcp,
    /// Fixed address
    Static {
        /// Host address
        address: Ipv4Addr,
        /// Prefix length
        prefix: u8,
    },
}

impl FromStr for IpConfig {
    type Err = eyre::Report;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("dhcp") {
            return Ok(IpConfig::Dhcp);
        }
        let (address, prefix) = s
            .split_once('/')
            .ok_or_else(|| eyre!("Static address must be in CIDR form (e.g. 10.0.0.20/24): {s}"))?;
        let address: Ipv4Addr = address
            .parse()
            .with_context(|| format!("Invalid IPv4 address: {address}"))?;
        let prefix: u8 = prefix
            .parse()
            .with_context(|| format!("Invalid prefix length: {prefix}"))?;
        if prefix > 32 {
            return Err(eyre!("Prefix length must be at most 32: {prefix}"));
        }
        Ok(IpConfig::Static { address, prefix })
    }
}

impl Display for IpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IpConfig::Dhcp => write!(f, "dhcp"),
            IpConfig::Static { address, prefix } => write!(f, "{address}/{prefix}"),
        }
    }
}

/// Network settings for the single interface lxckit configures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Host bridge
    pub bridge: String,
    /// Address
    pub ip: IpConfig,
    /// Gateway, kept only for static addresses
    pub gateway: Option<Ipv4Addr>,
    /// VLAN tag
    pub vlan: Option<u16>,
    /// DNS server
    pub nameserver: Option<String>,
}

impl NetworkConfig {
    /// The `--net0` value for `pct create`.
    ///
    /// The `gw=` clause is emitted only for a static address with a gateway.
    pub fn net0(&self) -> String {
        let mut r = format!("name=eth0,bridge={},ip={}", self.bridge, self.ip);
        if let (IpConfig::Static { .. }, Some(gw)) = (&self.ip, &self.gateway) {
            r.push_str(&format!(",gw={gw}"));
        }
        if let Some(tag) = self.vlan {
            r.push_str(&format!(",tag={tag}"));
        }
        r
    }

    /// The static address without prefix, if any.
    pub fn static_address(&self) -> Option<Ipv4Addr> {
        match self.ip {
            IpConfig::Static { address, .. } => Some(address),
            IpConfig::Dhcp => None,
        }
    }
}

/// Validated description of the container to create.
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    /// Requested ID; allocated during preflight when absent
    pub id: Option<u32>,
    pub hostname: String,
    pub cores: u32,
    pub memory_mb: u32,
    pub swap_mb: u32,
    pub disk_gb: u32,
    /// Storage for the root filesystem
    pub storage: String,
    /// Storage holding templates
    pub template_storage: String,
    pub network: NetworkConfig,
    pub template: TemplateQuery,
    pub unprivileged: bool,
    pub nesting: bool,
    pub ssh_keys: Option<Utf8PathBuf>,
    /// Tags, always including [`MANAGED_TAG`]
    pub tags: Vec<String>,
    pub boot_timeout: Duration,
    pub on_failure: OnFailure,
}

fn hostname_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$")
            .unwrap()
    })
}

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9_][a-z0-9_\-+.]*$").unwrap())
}

/// Check a guest ID is in the range Proxmox accepts.
pub fn validate_id(id: u32) -> Result<()> {
    if !(MIN_ID..=MAX_ID).contains(&id) {
        return Err(eyre!(
            "Container ID must be between {MIN_ID} and {MAX_ID}: {id}"
        ));
    }
    Ok(())
}

impl ContainerConfig {
    /// Validate `opts`, falling back to the recipe's defaults.
    pub fn from_opts(opts: ContainerOpts, recipe: &RecipeInfo) -> Result<Self> {
        if let Some(id) = opts.id {
            validate_id(id)?;
        }

        let hostname = opts.hostname.unwrap_or_else(|| recipe.name.to_string());
        if hostname.len() > 253 || !hostname_regex().is_match(&hostname) {
            return Err(eyre!("Invalid hostname: {hostname:?}"));
        }

        let cores = opts.cores.unwrap_or(recipe.cores);
        let memory_mb = match opts.memory.as_deref() {
            Some(m) => parse_memory_to_mb(m)?,
            None => recipe.memory_mb,
        };
        let swap_mb = match opts.swap.as_deref() {
            Some(m) => parse_memory_to_mb(m)?,
            None => recipe.swap_mb,
        };
        let disk_gb = match opts.disk.as_deref() {
            Some(d) => parse_disk_to_gb(d)?,
            None => recipe.disk_gb,
        };
        if cores == 0 {
            return Err(eyre!("CPU cores must be at least 1"));
        }
        if memory_mb < 64 {
            return Err(eyre!("Memory must be at least 64 MB: {memory_mb}"));
        }
        if disk_gb == 0 {
            return Err(eyre!("Disk size must be at least 1 GB"));
        }

        let ip: IpConfig = opts.ip.parse()?;
        let gateway = opts
            .gateway
            .as_deref()
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(|g| {
                g.parse::<Ipv4Addr>()
                    .with_context(|| format!("Invalid gateway address: {g}"))
            })
            .transpose()?;
        let gateway = match (ip, gateway) {
            (IpConfig::Dhcp, Some(gw)) => {
                warn!("Ignoring gateway {gw}: the address is assigned by DHCP");
                None
            }
            (_, gw) => gw,
        };
        if let Some(vlan) = opts.vlan {
            if !(1..=4094).contains(&vlan) {
                return Err(eyre!("VLAN tag must be between 1 and 4094: {vlan}"));
            }
        }

        if let Some(keys) = &opts.ssh_keys {
            if !keys.is_file() {
                return Err(eyre!("SSH public key file not found: {keys}"));
            }
        }

        let mut tags = vec![MANAGED_TAG.to_string(), recipe.name.to_string()];
        for tag in opts.tags {
            let tag = tag.trim().to_lowercase();
            if tag.is_empty() {
                continue;
            }
            if !tag_regex().is_match(&tag) {
                return Err(eyre!("Invalid tag: {tag:?}"));
            }
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }

        Ok(ContainerConfig {
            id: opts.id,
            hostname,
            cores,
            memory_mb,
            swap_mb,
            disk_gb,
            storage: opts.storage,
            template_storage: opts.template_storage,
            network: NetworkConfig {
                bridge: opts.bridge,
                ip,
                gateway,
                vlan: opts.vlan,
                nameserver: opts.nameserver,
            },
            template: TemplateQuery {
                os: opts.os,
                version: opts.os_version,
            },
            unprivileged: opts.unprivileged,
            nesting: opts.nesting || recipe.nesting,
            ssh_keys: opts.ssh_keys,
            tags,
            boot_timeout: Duration::from_secs(opts.boot_timeout),
            on_failure: opts.on_failure,
        })
    }
}
