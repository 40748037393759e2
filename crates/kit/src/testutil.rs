//! Fake Proxmox host for tests
//!
//! Writes `pct`, `pveam` and `pvesh` stand-ins into a temporary directory.
//! Every invocation is appended to a log so tests can assert which host
//! commands were (or were not) issued.

use std::fmt::Write as _;
use std::path::PathBuf;

use tempfile::TempDir;

use crate::pve::{Pve, Tool};

/// Trimmed `pveam available` output captured from a PVE 8 host.
pub(crate) const FAKE_CATALOG: &str = "\
mail            proxmox-mail-gateway-8.1-standard_8.1-1_amd64.tar.zst
system          almalinux-9-default_20240911_amd64.tar.xz
system          debian-11-standard_11.7-1_amd64.tar.zst
system          debian-12-standard_12.2-1_amd64.tar.zst
system          debian-12-standard_12.7-1_amd64.tar.zst
system          ubuntu-22.04-standard_22.04-1_amd64.tar.zst
system          ubuntu-24.04-standard_24.04-2_amd64.tar.zst
turnkeylinux    debian-12-turnkey-nextcloud_18.0-1_amd64.tar.gz
";

#[derive(Debug, Default)]
pub(crate) struct FakeHostBuilder {
    guests: Vec<(u32, &'static str)>,
    local: Vec<String>,
    fail: Vec<String>,
    next_id: Option<u32>,
}

impl FakeHostBuilder {
    /// An existing guest of the given type (`lxc` or `qemu`).
    pub(crate) fn guest(mut self, vmid: u32, kind: &'static str) -> Self {
        self.guests.push((vmid, kind));
        self
    }

    /// A template already present in `local`.
    pub(crate) fn local_template(mut self, name: &str) -> Self {
        self.local.push(name.to_string());
        self
    }

    /// Any invocation whose `tool args` line contains `pattern` exits 1.
    pub(crate) fn fail_matching(mut self, pattern: &str) -> Self {
        self.fail.push(pattern.to_string());
        self
    }

    pub(crate) fn next_id(mut self, id: u32) -> Self {
        self.next_id = Some(id);
        self
    }

    pub(crate) fn build(self) -> FakeHost {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let log = root.join("calls.log");

        let resources: Vec<serde_json::Value> = self
            .guests
            .iter()
            .map(|(vmid, kind)| {
                serde_json::json!({
                    "id": format!("{kind}/{vmid}"),
                    "vmid": vmid,
                    "type": kind,
                    "name": format!("guest{vmid}"),
                    "node": "pve",
                    "status": "running",
                })
            })
            .collect();
        std::fs::write(
            root.join("resources.json"),
            serde_json::to_string(&resources).unwrap(),
        )
        .unwrap();
        std::fs::write(root.join("catalog.txt"), FAKE_CATALOG).unwrap();
        let local: String = self
            .local
            .iter()
            .map(|n| format!("local:vztmpl/{n} 120.29MB\n"))
            .collect();
        std::fs::write(root.join("local.txt"), local).unwrap();

        let root_s = root.display().to_string();
        let next_id = self.next_id.unwrap_or(100);
        let pct_body = "case \"$1\" in
  status) echo \"status: running\" ;;
  exec)
    case \"$*\" in
      *'hostname -I'*) echo \"10.0.0.50 fd00::50\" ;;
    esac ;;
esac
"
        .to_string();
        let pveam_body = format!(
            "case \"$1\" in
  update) echo \"update successful\" ;;
  available) cat '{root_s}/catalog.txt' ;;
  list) echo \"NAME SIZE\"; cat '{root_s}/local.txt' ;;
  download) echo \"local:vztmpl/$3 120.29MB\" >> '{root_s}/local.txt' ;;
esac
"
        );
        let pvesh_body = format!(
            "case \"$2\" in
  /cluster/resources) cat '{root_s}/resources.json' ;;
  /cluster/nextid) echo '\"{next_id}\"' ;;
  *) exit 2 ;;
esac
"
        );

        for (tool, body) in [("pct", pct_body), ("pveam", pveam_body), ("pvesh", pvesh_body)] {
            let mut script = String::from("#!/bin/sh\n");
            writeln!(script, "echo \"{tool} $*\" >> '{}'", log.display()).unwrap();
            script.push_str(&format!("case \"{tool} $*\" in\n"));
            for pattern in &self.fail {
                writeln!(
                    script,
                    "  *'{pattern}'*) echo \"{tool}: simulated failure\" >&2; exit 1 ;;"
                )
                .unwrap();
            }
            script.push_str("esac\n");
            script.push_str(&body);
            script.push_str("exit 0\n");
            std::fs::write(root.join(tool), script).unwrap();
        }

        FakeHost { dir, log }
    }
}

/// A temporary directory of fake host tools.
#[derive(Debug)]
pub(crate) struct FakeHost {
    dir: TempDir,
    log: PathBuf,
}

impl FakeHost {
    pub(crate) fn builder() -> FakeHostBuilder {
        FakeHostBuilder::default()
    }

    pub(crate) fn pve(&self) -> Pve {
        let tool = |name: &str| Tool::script(self.dir.path().join(name));
        Pve {
            pct: tool("pct"),
            pveam: tool("pveam"),
            pvesh: tool("pvesh"),
        }
    }

    /// Everything the fake tools were invoked with, in order.
    pub(crate) fn log(&self) -> String {
        std::fs::read_to_string(&self.log).unwrap_or_default()
    }

    pub(crate) fn called(&self, fragment: &str) -> bool {
        self.log().contains(fragment)
    }

    /// Byte offset of the first invocation containing `fragment`.
    pub(crate) fn position(&self, fragment: &str) -> Option<usize> {
        self.log().find(fragment)
    }
}
