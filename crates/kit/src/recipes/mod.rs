//! Application recipes
//!
//! A recipe is a fixed, linear list of provisioning steps run inside a
//! freshly booted container, plus the defaults and endpoints needed to
//! size the container and describe the result.

use clap::Subcommand;
use color_eyre::Result;
use comfy_table::{presets, Table};
use serde::Serialize;

use crate::exec::ContainerShell;

pub mod mailpit;
pub mod node_red;
pub mod portainer;

/// Static facts about a recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecipeInfo {
    /// CLI name, also the default hostname
    pub name: &'static str,
    /// Human readable name used in notes
    pub title: &'static str,
    pub description: &'static str,
    pub cores: u32,
    pub memory_mb: u32,
    pub swap_mb: u32,
    pub disk_gb: u32,
    /// Container needs `nesting=1` (e.g. for Docker)
    pub nesting: bool,
}

/// Something the operator can connect to once provisioning finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub label: &'static str,
    pub url: String,
}

const BASE: RecipeInfo = RecipeInfo {
    name: "base",
    title: "Base container",
    description: "Debian/Ubuntu container with an up-to-date base system",
    cores: 1,
    memory_mb: 512,
    swap_mb: 512,
    disk_gb: 4,
    nesting: false,
};

/// Applications lxckit knows how to install.
#[derive(Debug, Clone, Subcommand)]
pub enum Recipe {
    /// Plain container with an up-to-date base system
    Base,
    /// Mailpit email testing server (SMTP + web UI)
    Mailpit(mailpit::MailpitOpts),
    /// Portainer CE on Docker
    Portainer(portainer::PortainerOpts),
    /// Node-RED flow editor
    NodeRed(node_red::NodeRedOpts),
}

impl Recipe {
    /// Every recipe, in display order.
    pub fn catalog() -> [RecipeInfo; 4] {
        [BASE, mailpit::INFO, portainer::INFO, node_red::INFO]
    }

    pub fn info(&self) -> RecipeInfo {
        match self {
            Recipe::Base => BASE,
            Recipe::Mailpit(_) => mailpit::INFO,
            Recipe::Portainer(_) => portainer::INFO,
            Recipe::NodeRed(_) => node_red::INFO,
        }
    }

    /// Endpoints exposed on `host` once installed.
    pub fn endpoints(&self, host: &str) -> Vec<Endpoint> {
        match self {
            Recipe::Base => Vec::new(),
            Recipe::Mailpit(opts) => opts.endpoints(host),
            Recipe::Portainer(opts) => opts.endpoints(host),
            Recipe::NodeRed(opts) => opts.endpoints(host),
        }
    }

    /// Run the recipe's steps; the first failure aborts.
    pub fn install(&self, sh: &ContainerShell) -> Result<()> {
        sh.step("Updating base system", prepare_base)?;
        match self {
            Recipe::Base => Ok(()),
            Recipe::Mailpit(opts) => opts.install(sh),
            Recipe::Portainer(opts) => opts.install(sh),
            Recipe::NodeRed(opts) => opts.install(sh),
        }
    }
}

fn prepare_base(sh: &ContainerShell) -> Result<()> {
    sh.apt_install(&["ca-certificates", "curl"])?;
    sh.run([
        "env",
        "DEBIAN_FRONTEND=noninteractive",
        "apt-get",
        "-y",
        "-qq",
        "dist-upgrade",
    ])
}

/// Create a system user owning `home`, unless it already exists.
pub(crate) fn ensure_system_user(sh: &ContainerShell, user: &str, home: &str) -> Result<()> {
    sh.script(&format!(
        "id -u {user} >/dev/null 2>&1 || useradd --system --home-dir {home} --create-home --shell /usr/sbin/nologin {user}"
    ))
}

/// Poll `url` from inside the container until it answers.
pub(crate) fn wait_for_http(sh: &ContainerShell, url: &str, attempts: u32) -> Result<()> {
    sh.script(&format!(
        "for _ in $(seq 1 {attempts}); do curl -fsSk -o /dev/null {url} && exit 0; sleep 1; done; echo 'no answer from {url}' >&2; exit 1"
    ))
}

/// Subcommands for inspecting the recipe catalog
#[derive(Debug, Subcommand)]
pub enum RecipesCommands {
    /// List available recipes with their default sizing
    List {
        /// Output as structured JSON instead of table format
        #[clap(long)]
        json: bool,
    },
}

impl RecipesCommands {
    pub fn run(self) -> Result<()> {
        match self {
            RecipesCommands::List { json } => {
                let catalog = Recipe::catalog();
                if json {
                    println!("{}", serde_json::to_string_pretty(&catalog)?);
                } else {
                    println!("{}", catalog_table(&catalog));
                }
                Ok(())
            }
        }
    }
}

fn catalog_table(catalog: &[RecipeInfo]) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::NOTHING);
    table.set_header(vec!["NAME", "CORES", "MEMORY", "DISK", "DESCRIPTION"]);
    for r in catalog {
        table.add_row(vec![
            r.name.to_string(),
            r.cores.to_string(),
            format!("{} MB", r.memory_mb),
            format!("{} GB", r.disk_gb),
            r.description.to_string(),
        ]);
    }
    table
}
