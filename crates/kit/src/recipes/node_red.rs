//! Node-RED installed from npm and run as a systemd service.

use clap::Parser;
use color_eyre::Result;
use indoc::formatdoc;

use super::{ensure_system_user, wait_for_http, Endpoint, RecipeInfo};
use crate::exec::ContainerShell;

pub(crate) const INFO: RecipeInfo = RecipeInfo {
    name: "node-red",
    title: "Node-RED",
    description: "Low-code flow editor for event-driven applications",
    cores: 1,
    memory_mb: 1024,
    swap_mb: 512,
    disk_gb: 6,
    nesting: false,
};

const USER_DIR: &str = "/var/lib/node-red";

/// Options for the Node-RED recipe
#[derive(Debug, Clone, Parser)]
pub struct NodeRedOpts {
    /// Port of the editor and HTTP nodes
    #[clap(long, env = "NODE_RED_PORT", default_value_t = 1880)]
    pub port: u16,
}

impl NodeRedOpts {
    pub(crate) fn endpoints(&self, host: &str) -> Vec<Endpoint> {
        vec![Endpoint {
            label: "Editor",
            url: format!("http://{host}:{}", self.port),
        }]
    }

    fn unit_file(&self) -> String {
        formatdoc! {"
            [Unit]
            Description=Node-RED
            After=network-online.target
            Wants=network-online.target

            [Service]
            Type=simple
            User=nodered
            Group=nodered
            WorkingDirectory={user_dir}
            ExecStart=/usr/local/bin/node-red --port {port} --userDir {user_dir}
            Restart=on-failure
            RestartSec=10
            KillSignal=SIGINT

            [Install]
            WantedBy=multi-user.target
            ",
            port = self.port,
            user_dir = USER_DIR,
        }
    }

    pub(crate) fn install(&self, sh: &ContainerShell) -> Result<()> {
        sh.step("Installing Node.js", |sh| sh.apt_install(&["nodejs", "npm"]))?;
        sh.step("Installing Node-RED", |sh| {
            sh.run(["npm", "install", "-g", "--unsafe-perm", "node-red"])
        })?;
        sh.step("Creating nodered user", |sh| {
            ensure_system_user(sh, "nodered", USER_DIR)
        })?;
        sh.step("Writing node-red.service", |sh| {
            sh.write_file("/etc/systemd/system/node-red.service", &self.unit_file(), 0o644)
        })?;
        sh.step("Starting Node-RED", |sh| sh.enable_service("node-red.service"))?;
        sh.step("Waiting for the Node-RED editor", |sh| {
            wait_for_http(sh, &format!("http://127.0.0.1:{}/", self.port), 60)
        })
    }
}
