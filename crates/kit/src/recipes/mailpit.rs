//! Mailpit: an SMTP sink with a web UI for inspecting captured mail.

use clap::Parser;
use color_eyre::Result;
use indoc::formatdoc;

use super::{ensure_system_user, wait_for_http, Endpoint, RecipeInfo};
use crate::exec::ContainerShell;

pub(crate) const INFO: RecipeInfo = RecipeInfo {
    name: "mailpit",
    title: "Mailpit",
    description: "Email testing server with SMTP capture and web UI",
    cores: 1,
    memory_mb: 512,
    swap_mb: 512,
    disk_gb: 4,
    nesting: false,
};

const INSTALL_SCRIPT: &str = "https://raw.githubusercontent.com/axllent/mailpit/develop/install.sh";
const UNIT_PATH: &str = "/etc/systemd/system/mailpit.service";

/// Options for the Mailpit recipe
#[derive(Debug, Clone, Parser)]
pub struct MailpitOpts {
    /// Port of the web UI and API
    #[clap(long, env = "MAILPIT_WEB_PORT", default_value_t = 8025)]
    pub web_port: u16,

    /// Port of the SMTP listener
    #[clap(long, env = "MAILPIT_SMTP_PORT", default_value_t = 1025)]
    pub smtp_port: u16,

    /// Number of messages kept before the oldest are pruned (0 keeps all)
    #[clap(long, env = "MAILPIT_MAX_MESSAGES", default_value_t = 500)]
    pub max_messages: u32,
}

impl MailpitOpts {
    pub(crate) fn endpoints(&self, host: &str) -> Vec<Endpoint> {
        vec![
            Endpoint {
                label: "Web UI",
                url: format!("http://{host}:{}", self.web_port),
            },
            Endpoint {
                label: "SMTP",
                url: format!("smtp://{host}:{}", self.smtp_port),
            },
        ]
    }

    fn unit_file(&self) -> String {
        formatdoc! {"
            [Unit]
            Description=Mailpit email testing server
            After=network-online.target
            Wants=network-online.target

            [Service]
            Type=simple
            User=mailpit
            Group=mailpit
            ExecStart=/usr/local/bin/mailpit --listen 0.0.0.0:{web} --smtp 0.0.0.0:{smtp} --database /var/lib/mailpit/mailpit.db --max {max} --smtp-auth-accept-any --smtp-auth-allow-insecure
            Restart=on-failure
            RestartSec=5

            [Install]
            WantedBy=multi-user.target
            ",
            web = self.web_port,
            smtp = self.smtp_port,
            max = self.max_messages,
        }
    }

    pub(crate) fn install(&self, sh: &ContainerShell) -> Result<()> {
        sh.step("Installing Mailpit", |sh| {
            sh.script(&format!("curl -fsSL {INSTALL_SCRIPT} | bash"))
        })?;
        sh.step("Creating mailpit user", |sh| {
            ensure_system_user(sh, "mailpit", "/var/lib/mailpit")
        })?;
        sh.step("Writing mailpit.service", |sh| {
            sh.write_file(UNIT_PATH, &self.unit_file(), 0o644)
        })?;
        sh.step("Starting Mailpit", |sh| sh.enable_service("mailpit.service"))?;
        sh.step("Waiting for the Mailpit web UI", |sh| {
            wait_for_http(sh, &format!("http://127.0.0.1:{}/", self.web_port), 30)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeHost;

    fn opts() -> MailpitOpts {
        MailpitOpts {
            web_port: 8025,
            smtp_port: 1025,
            max_messages: 500,
        }
    }

    #[test]
    fn test_unit_file() {
        let unit = opts().unit_file();
        assert!(unit.starts_with("[Unit]\n"));
        assert!(unit.contains(
            "ExecStart=/usr/local/bin/mailpit --listen 0.0.0.0:8025 --smtp 0.0.0.0:1025 --database /var/lib/mailpit/mailpit.db --max 500 "
        ));
        assert!(unit.contains("\nUser=mailpit\n"));
        assert!(unit.ends_with("WantedBy=multi-user.target\n"));
    }

    #[test]
    fn test_endpoints() {
        let endpoints = opts().endpoints("10.0.0.50");
        assert_eq!(endpoints[0].url, "http://10.0.0.50:8025");
        assert_eq!(endpoints[1].url, "smtp://10.0.0.50:1025");
    }

    #[test]
    fn test_install_sequence() {
        let host = FakeHost::builder().build();
        let pve = host.pve();
        opts().install(&ContainerShell::new(&pve, 9999)).unwrap();
        let order = [
            "raw.githubusercontent.com/axllent/mailpit",
            "useradd --system --home-dir /var/lib/mailpit",
            "pct push 9999",
            "systemctl enable --now mailpit.service",
            "http://127.0.0.1:8025/",
        ];
        let positions: Vec<_> = order.iter().map(|f| host.position(f).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{}", host.log());
    }

    #[test]
    fn test_install_aborts_on_first_failure() {
        let host = FakeHost::builder().fail_matching("axllent/mailpit").build();
        let pve = host.pve();
        let err = opts().install(&ContainerShell::new(&pve, 9999)).unwrap_err();
        assert!(format!("{err:#}").contains("Installing Mailpit"));
        assert!(!host.called("useradd"));
        assert!(!host.called("systemctl"));
    }
}
