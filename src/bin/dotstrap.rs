// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use dotstrap::{
    bootstrap::{Bootstrap, Steps},
    config::Manifest,
    path::resolve_dotfiles,
    platform::{Platform, Privilege},
    report::{Report, Step},
    syscall::{DryRun, Syscall, SystemShell},
};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::{path::PathBuf, process::exit};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "dotstrap [options] <command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to bootstrap manifest instead of the built-in one.
    #[arg(short, long, global = true, value_name = "path")]
    pub config: Option<PathBuf>,

    /// Directory holding dotfiles to link.
    #[arg(short, long, global = true, value_name = "path")]
    pub dotfiles: Option<PathBuf>,

    /// Show what would be done without changing anything.
    #[arg(short = 'n', long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    async fn run(self) -> Result<()> {
        if let Command::Manifest = self.command {
            return run_manifest(self.config);
        }

        let manifest = match &self.config {
            Some(path) => Manifest::load(path)?,
            None => Manifest::builtin()?,
        };
        let dotfiles = resolve_dotfiles(
            self.dotfiles.as_deref(),
            manifest.settings.dotfiles.as_deref(),
            self.config.as_deref(),
        )?;

        if self.dry_run {
            self.dispatch(Bootstrap::new(manifest, dotfiles, DryRun::new(SystemShell)))
                .await
        } else {
            self.dispatch(Bootstrap::new(manifest, dotfiles, SystemShell))
                .await
        }
    }

    async fn dispatch<S: Syscall>(self, bootstrap: Bootstrap<S>) -> Result<()> {
        let bootstrap = bootstrap.with_dry_run(self.dry_run);
        let steps = match self.command {
            Command::Install(opts) => opts.steps(),
            Command::Packages => Steps::only(Step::Package),
            Command::Plugins => Steps::only(Step::Plugin),
            Command::Link => Steps::only(Step::Link),
            Command::Shell => Steps::only(Step::Shell),
            Command::Unlink => return finish(bootstrap.unlink_all()),
            Command::Doctor => return run_doctor(&bootstrap),
            Command::Manifest => unreachable!("manifest is handled before loading"),
        };

        let bootstrap = if steps.packages {
            with_detected_platform(bootstrap)
        } else {
            bootstrap
        };

        finish(bootstrap.run(steps).await)
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Run every bootstrap step.
    #[command(override_usage = "dotstrap install [options]")]
    Install(InstallOptions),

    /// Install missing packages.
    Packages,

    /// Fetch missing plugins.
    Plugins,

    /// Symlink dotfiles into place, backing up conflicting files.
    Link,

    /// Remove dotfile symlinks, restoring backups.
    Unlink,

    /// Make configured shell the login shell.
    Shell,

    /// Show status of every package, plugin, and link.
    Doctor,

    /// Print bootstrap manifest.
    Manifest,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct InstallOptions {
    /// Do not install packages.
    #[arg(long)]
    pub skip_packages: bool,

    /// Do not fetch plugins.
    #[arg(long)]
    pub skip_plugins: bool,

    /// Do not link dotfiles.
    #[arg(long)]
    pub skip_links: bool,

    /// Do not change login shell.
    #[arg(long)]
    pub skip_shell: bool,
}

impl InstallOptions {
    fn steps(&self) -> Steps {
        Steps {
            packages: !self.skip_packages,
            plugins: !self.skip_plugins,
            links: !self.skip_links,
            shell: !self.skip_shell,
        }
    }
}

#[tokio::main]
async fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run().await {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

async fn run() -> Result<()> {
    Cli::parse().run().await
}

fn with_detected_platform<S: Syscall>(bootstrap: Bootstrap<S>) -> Bootstrap<S> {
    // INVARIANT: Detection always probes the real system, even on dry runs.
    match Platform::detect(&SystemShell) {
        Ok(platform) => {
            info!("detected {} using {}", platform.name, platform.manager);
            let privilege = Privilege::detect(&SystemShell);
            bootstrap.with_platform(platform, privilege)
        }
        Err(error) => {
            warn!("{error}");
            bootstrap
        }
    }
}

fn finish(report: Report) -> Result<()> {
    println!("{report}");
    if !report.is_success() {
        bail!("{} step(s) failed", report.failures());
    }

    Ok(())
}

fn run_doctor<S: Syscall>(bootstrap: &Bootstrap<S>) -> Result<()> {
    println!("dotfiles: {}", bootstrap.dotfiles().display());
    for check in bootstrap.doctor() {
        println!("{check}");
    }

    Ok(())
}

fn run_manifest(config: Option<PathBuf>) -> Result<()> {
    match config {
        Some(path) => print!("{}", Manifest::load(path)?),
        None => print!("{}", Manifest::builtin_text()),
    }

    Ok(())
}
