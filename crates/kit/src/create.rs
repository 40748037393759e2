//! `lxckit create`: provision a container and install a recipe into it
//!
//! The flow is strictly linear: host checks, configuration, ID, template,
//! create, start, boot, network, recipe, notes. Any failure before
//! `pct create` leaves the host untouched; any failure after it is handed
//! to [`crate::rollback`].

use std::io::IsTerminal;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use color_eyre::Result;
use tracing::info;

use crate::config::{ContainerConfig, ContainerOpts};
use crate::container::{self, ContainerSpec};
use crate::exec::ContainerShell;
use crate::notes::{self, Address, Report};
use crate::preflight::{self, Privilege};
use crate::pve::Pve;
use crate::recipes::Recipe;
use crate::rollback;
use crate::template::{self, Fetch};

const BOOT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const NETWORK_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Options for creating and provisioning a container
#[derive(Debug, Parser)]
pub struct CreateOpts {
    #[clap(flatten)]
    pub container: ContainerOpts,

    /// Validate and print the `pct create` command without creating anything
    #[clap(long)]
    pub dry_run: bool,

    /// Fail instead of downloading a missing template
    #[clap(long)]
    pub no_download: bool,

    /// Application to install
    #[command(subcommand)]
    pub recipe: Recipe,
}

/// Execute the create command
pub fn run(opts: CreateOpts) -> Result<()> {
    let interactive = std::io::stdin().is_terminal();
    if let Some(report) = provision(&Pve::default(), Privilege::current(), opts, interactive)? {
        println!("{}", report.render());
    }
    Ok(())
}

/// Run the whole pipeline; returns `None` for dry runs.
///
/// `interactive` allows prompting when the failure policy is `prompt`.
pub fn provision(
    pve: &Pve,
    privilege: Privilege,
    opts: CreateOpts,
    interactive: bool,
) -> Result<Option<Report>> {
    preflight::check_host(pve, privilege)?;
    let recipe = opts.recipe;
    let info = recipe.info();
    let mut config = ContainerConfig::from_opts(opts.container, &info)?;
    let id = preflight::claim_id(pve, config.id)?;
    config.id = Some(id);

    let fetch = if opts.dry_run {
        Fetch::Plan
    } else if opts.no_download {
        Fetch::CachedOnly
    } else {
        Fetch::Download
    };
    let template = template::resolve(pve, &config.template, &config.template_storage, fetch)?;
    let spec = ContainerSpec {
        id,
        config,
        template,
    };

    if opts.dry_run {
        println!("{}", spec.create_command_line());
        return Ok(None);
    }

    container::create(pve, &spec)?;
    let sh = ContainerShell::new(pve, id);
    if let Err(e) = bring_up(pve, &spec, &recipe, &sh) {
        rollback::handle_failure(pve, id, spec.config.on_failure, interactive);
        return Err(e);
    }

    let address = match spec.config.network.static_address() {
        Some(a) => Address::Static(a),
        None => notes::discover_address(&sh)
            .map(Address::Discovered)
            .unwrap_or(Address::Pending),
    };
    let host = address
        .host()
        .unwrap_or_else(|| spec.config.hostname.clone());
    let report = Report {
        id,
        hostname: spec.config.hostname.clone(),
        title: info.title,
        template: spec.template.volid(),
        cores: spec.config.cores,
        memory_mb: spec.config.memory_mb,
        disk_gb: spec.config.disk_gb,
        storage: spec.config.storage.clone(),
        address,
        endpoints: recipe.endpoints(&host),
        created: Utc::now(),
    };
    notes::attach(pve, id, &report.render());
    info!("{} is ready in container {id}", info.title);
    Ok(Some(report))
}

fn bring_up(pve: &Pve, spec: &ContainerSpec, recipe: &Recipe, sh: &ContainerShell) -> Result<()> {
    pve.start(spec.id)?;
    container::wait_for_boot(pve, spec.id, spec.config.boot_timeout, BOOT_POLL_INTERVAL)?;
    container::wait_for_network(
        pve,
        spec.id,
        container::network_check_host(spec.config.template.os),
        NETWORK_POLL_INTERVAL,
    )?;
    recipe.install(sh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preflight::PreflightError;
    use crate::testutil::FakeHost;

    const ROOT: Privilege = Privilege { euid: 0 };

    fn opts(args: &[&str]) -> CreateOpts {
        let argv = std::iter::once("create").chain(args.iter().copied());
        CreateOpts::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_mailpit_end_to_end() {
        let host = FakeHost::builder().build();
        let report = provision(
            &host.pve(),
            ROOT,
            opts(&["--id", "9999", "--ip", "dhcp", "mailpit"]),
            false,
        )
        .unwrap()
        .unwrap();

        assert_eq!(report.address, Address::Discovered("10.0.0.50".into()));
        let text = report.render();
        assert!(text.contains("Mailpit"));
        assert!(text.contains("http://10.0.0.50:8025"));
        assert!(text.contains("smtp://10.0.0.50:1025"));

        let steps = [
            "pvesh get /cluster/resources",
            "pveam download local debian-12-standard_12.7-1_amd64.tar.zst",
            "pct create 9999 local:vztmpl/debian-12-standard_12.7-1_amd64.tar.zst",
            "pct start 9999",
            "test -e /run/systemd/system",
            "getent hosts deb.debian.org",
            "systemctl enable --now mailpit.service",
            "pct set 9999 --description ## Mailpit",
        ];
        let positions: Vec<_> = steps
            .iter()
            .map(|s| host.position(s).unwrap_or_else(|| panic!("missing {s}: {}", host.log())))
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_existing_id_fails_before_template() {
        let host = FakeHost::builder().guest(9999, "lxc").build();
        let err = provision(&host.pve(), ROOT, opts(&["--id", "9999", "mailpit"]), false).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PreflightError>(),
            Some(PreflightError::IdInUse(9999))
        ));
        assert!(err.to_string().contains("Container ID 9999 already exists"));
        assert!(!host.called("pveam"));
        assert!(!host.called("pct create"));
    }

    #[test]
    fn test_non_root_runs_nothing() {
        let host = FakeHost::builder().build();
        let err = provision(
            &host.pve(),
            Privilege { euid: 1000 },
            opts(&["--id", "9999", "mailpit"]),
            false,
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PreflightError>(),
            Some(PreflightError::NotRoot(1000))
        ));
        assert!(host.log().is_empty());
    }

    #[test]
    fn test_dry_run_creates_nothing() {
        let host = FakeHost::builder().build();
        let r = provision(&host.pve(), ROOT, opts(&["--dry-run", "--id", "300", "base"]), false).unwrap();
        assert!(r.is_none());
        assert!(!host.called("pct create"));
        assert!(!host.called("pveam download"));
        assert!(!host.called("pveam update"));
    }

    #[test]
    fn test_invalid_config_touches_no_host_tool() {
        let host = FakeHost::builder().build();
        let err = provision(&host.pve(), ROOT, opts(&["--ip", "10.0.0.5", "base"]), false)
            .unwrap_err();
        assert!(err.to_string().contains("CIDR"));
        assert!(host.log().is_empty(), "unexpected calls: {}", host.log());
    }

    #[test]
    fn test_invalid_config_reported_before_id_conflict() {
        let host = FakeHost::builder().guest(9999, "lxc").build();
        let err = provision(
            &host.pve(),
            ROOT,
            opts(&["--id", "9999", "--vlan", "5000", "base"]),
            false,
        )
        .unwrap_err();
        assert!(err.to_string().contains("VLAN tag"));
        assert!(err.downcast_ref::<PreflightError>().is_none());
        assert!(host.log().is_empty());
    }

    #[test]
    fn test_next_id_used_when_unset() {
        let host = FakeHost::builder().next_id(321).build();
        let report = provision(&host.pve(), ROOT, opts(&["base"]), false).unwrap().unwrap();
        assert_eq!(report.id, 321);
        assert!(host.called("pct create 321 "));
    }

    #[test]
    fn test_static_address_in_report() {
        let host = FakeHost::builder().build();
        let report = provision(
            &host.pve(),
            ROOT,
            opts(&[
                "--id",
                "9999",
                "--ip",
                "192.168.1.80/24",
                "--gateway",
                "192.168.1.1",
                "node-red",
            ]),
            false,
        )
        .unwrap()
        .unwrap();
        assert_eq!(report.endpoints[0].url, "http://192.168.1.80:1880");
        assert!(host.called("ip=192.168.1.80/24,gw=192.168.1.1"));
        assert!(!host.called("hostname -I"));
    }

    #[test]
    fn test_failed_step_destroys_when_requested() {
        let host = FakeHost::builder().fail_matching("axllent/mailpit").build();
        let err = provision(
            &host.pve(),
            ROOT,
            opts(&["--id", "9999", "--on-failure", "destroy", "mailpit"]),
            false,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("Installing Mailpit"));
        assert!(host.called("pct destroy 9999 --purge"));
        assert!(!host.called("--description"));
    }

    #[test]
    fn test_failed_step_keeps_when_requested() {
        let host = FakeHost::builder().fail_matching("axllent/mailpit").build();
        provision(
            &host.pve(),
            ROOT,
            opts(&["--id", "9999", "--on-failure", "keep", "mailpit"]),
            false,
        )
        .unwrap_err();
        assert!(!host.called("pct destroy"));
    }

    #[test]
    fn test_prompt_without_terminal_keeps() {
        let host = FakeHost::builder().fail_matching("axllent/mailpit").build();
        provision(
            &host.pve(),
            ROOT,
            opts(&["--id", "9999", "--on-failure", "prompt", "mailpit"]),
            false,
        )
        .unwrap_err();
        assert!(host.called("pct create 9999"));
        assert!(!host.called("pct stop"));
        assert!(!host.called("pct destroy"));
    }

    #[test]
    fn test_create_failure_has_nothing_to_roll_back() {
        let host = FakeHost::builder().fail_matching("pct create").build();
        provision(
            &host.pve(),
            ROOT,
            opts(&["--id", "9999", "--on-failure", "destroy", "base"]),
            false,
        )
        .unwrap_err();
        assert!(!host.called("pct start"));
        assert!(!host.called("pct destroy"));
    }
}
