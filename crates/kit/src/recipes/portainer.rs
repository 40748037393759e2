//! Portainer CE running on Docker inside the container.

use clap::Parser;
use color_eyre::Result;

use super::{wait_for_http, Endpoint, RecipeInfo};
use crate::exec::ContainerShell;

pub(crate) const INFO: RecipeInfo = RecipeInfo {
    name: "portainer",
    title: "Portainer",
    description: "Docker engine with the Portainer CE management UI",
    cores: 2,
    memory_mb: 2048,
    swap_mb: 512,
    disk_gb: 16,
    nesting: true,
};

/// Options for the Portainer recipe
#[derive(Debug, Clone, Parser)]
pub struct PortainerOpts {
    /// Host port for the HTTPS UI
    #[clap(long, env = "PORTAINER_PORT", default_value_t = 9443)]
    pub port: u16,

    /// Portainer image to run
    #[clap(long, env = "PORTAINER_IMAGE", default_value = "portainer/portainer-ce:lts")]
    pub image: String,
}

impl PortainerOpts {
    pub(crate) fn endpoints(&self, host: &str) -> Vec<Endpoint> {
        vec![Endpoint {
            label: "Web UI",
            url: format!("https://{host}:{}", self.port),
        }]
    }

    fn docker_run_args(&self) -> Vec<String> {
        let publish = format!("{}:9443", self.port);
        [
            "docker",
            "run",
            "-d",
            "--name",
            "portainer",
            "--restart=always",
            "-p",
            publish.as_str(),
            "-v",
            "/var/run/docker.sock:/var/run/docker.sock",
            "-v",
            "portainer_data:/data",
            self.image.as_str(),
        ]
        .into_iter()
        .map(ToOwned::to_owned)
        .collect()
    }

    pub(crate) fn install(&self, sh: &ContainerShell) -> Result<()> {
        sh.step("Installing Docker", |sh| {
            sh.script("curl -fsSL https://get.docker.com | sh")?;
            sh.enable_service("docker.service")
        })?;
        sh.step("Starting Portainer", |sh| {
            sh.run(["docker", "volume", "create", "portainer_data"])?;
            sh.run(self.docker_run_args())
        })?;
        sh.step("Waiting for the Portainer UI", |sh| {
            wait_for_http(sh, &format!("https://127.0.0.1:{}/", self.port), 60)
        })
    }
}
