use clap::{Parser, Subcommand};
use color_eyre::{Report, Result};

mod config;
mod container;
mod create;
mod destroy;
mod exec;
mod list;
mod notes;
mod preflight;
mod pve;
mod recipes;
mod rollback;
mod template;
#[cfg(test)]
mod testutil;
mod utils;

/// Provision Proxmox VE LXC containers with self-hosted applications.
///
/// lxckit checks the host, picks and downloads the newest OS template,
/// creates and boots the container, installs the chosen application inside
/// it and records a summary in the container's notes. Every container
/// option can also be set through its `CT_*` environment variable.
#[derive(Parser)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available lxckit commands.
#[derive(Subcommand)]
enum Commands {
    /// Create a container and install an application into it
    Create(create::CreateOpts),

    /// Resolve and download OS templates
    #[clap(subcommand)]
    Template(template::TemplateCommands),

    /// Inspect the application recipes
    #[clap(subcommand)]
    Recipes(recipes::RecipesCommands),

    /// List containers on the cluster
    List(list::ListOpts),

    /// Stop and remove a container with its disks
    Destroy(destroy::DestroyOpts),
}

/// Install and configure the tracing/logging system.
///
/// Logs go to stderr so stdout carries only the summary and listings.
/// Filtered by RUST_LOG, defaulting to 'info'.
fn install_tracing() {
    use tracing_error::ErrorLayer;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let fmt_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let filter_layer = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .init();
}

fn main() -> Result<(), Report> {
    install_tracing();
    color_eyre::install()?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Create(opts) => create::run(opts)?,
        Commands::Template(cmd) => cmd.run()?,
        Commands::Recipes(cmd) => cmd.run()?,
        Commands::List(opts) => list::run(opts)?,
        Commands::Destroy(opts) => destroy::run(opts)?,
    }
    Ok(())
}
