// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Bootstrap orchestration.
//!
//! Drive every step of a bootstrap manifest in a fixed order: packages,
//! plugins, links, then the login shell. Packages come first because plugin
//! installers need git and curl, and the login shell comes last because zsh
//! has to be installed before it can be selected.

use crate::{
    config::Manifest,
    link::{LinkState, Linker},
    packages::PackageInstaller,
    platform::{Platform, Privilege},
    plugins::PluginInstaller,
    report::{Report, Step},
    shell::LoginShell,
    syscall::{Syscall, SystemShell},
};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};
use tokio::{
    runtime::{Handle, RuntimeFlavor},
    task::block_in_place,
};
use tracing::{info, instrument};

/// Selection of bootstrap steps to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Steps {
    pub packages: bool,
    pub plugins: bool,
    pub links: bool,
    pub shell: bool,
}

impl Steps {
    /// Every step.
    pub fn all() -> Self {
        Self {
            packages: true,
            plugins: true,
            links: true,
            shell: true,
        }
    }

    /// One step only.
    pub fn only(step: Step) -> Self {
        Self {
            packages: step == Step::Package,
            plugins: step == Step::Plugin,
            links: step == Step::Link,
            shell: step == Step::Shell,
        }
    }
}

impl Default for Steps {
    fn default() -> Self {
        Self::all()
    }
}

/// One line of a status check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub step: Step,
    pub name: String,
    pub ok: bool,
    pub detail: String,
}

impl Display for Check {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(
            fmt,
            "[{}] {} {}: {}",
            if self.ok { "OK" } else { "MISSING" },
            self.step,
            self.name,
            self.detail
        )
    }
}

/// Bootstrap a machine from a manifest.
#[derive(Debug)]
pub struct Bootstrap<S = SystemShell>
where
    S: Syscall,
{
    manifest: Manifest,
    dotfiles: PathBuf,
    shell: S,
    platform: Option<(Platform, Privilege)>,
    current_shell: Option<String>,
    dry_run: bool,
}

impl<S> Bootstrap<S>
where
    S: Syscall,
{
    /// Construct new bootstrap.
    ///
    /// The current login shell is read from `$SHELL`.
    pub fn new(manifest: Manifest, dotfiles: impl Into<PathBuf>, shell: S) -> Self {
        Self {
            manifest,
            dotfiles: dotfiles.into(),
            shell,
            platform: None,
            current_shell: std::env::var("SHELL").ok(),
            dry_run: false,
        }
    }

    /// Set detected platform to install packages on.
    pub fn with_platform(mut self, platform: Platform, privilege: Privilege) -> Self {
        self.platform = Some((platform, privilege));
        self
    }

    /// Override current login shell.
    pub fn with_current_shell(mut self, current: Option<String>) -> Self {
        self.current_shell = current;
        self
    }

    /// Report what would happen without touching anything.
    ///
    /// External commands are the responsibility of the [`Syscall`] given at
    /// construction, see [`crate::syscall::DryRun`].
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn dotfiles(&self) -> &Path {
        &self.dotfiles
    }

    fn linker(&self) -> Linker {
        Linker::new(&self.dotfiles).with_dry_run(self.dry_run)
    }

    /// Run selected steps in order.
    ///
    /// A failing step never stops later steps.
    #[instrument(skip(self), level = "debug")]
    pub async fn run(&self, steps: Steps) -> Report {
        let mut report = Report::new();

        if steps.packages {
            blocking(|| self.install_packages(&mut report));
        }

        if steps.plugins {
            PluginInstaller::new(&self.shell)
                .with_dry_run(self.dry_run)
                .install_all(&self.manifest.plugins, &mut report)
                .await;
        }

        if steps.links {
            info!("link dotfiles from {}", self.dotfiles.display());
            self.linker().link_all(&self.manifest.links, &mut report);
        }

        if steps.shell {
            if let Some(name) = &self.manifest.settings.login_shell {
                blocking(|| {
                    LoginShell::new(&self.shell).ensure(
                        name,
                        self.current_shell.as_deref(),
                        &mut report,
                    )
                });
            }
        }

        report
    }

    fn install_packages(&self, report: &mut Report) {
        let Some((platform, privilege)) = &self.platform else {
            for package in &self.manifest.packages {
                report.failed(Step::Package, &package.name, "no supported package manager");
            }
            return;
        };

        info!("install packages on {} with {}", platform.name, platform.manager);
        PackageInstaller::new(&self.shell, platform.manager, *privilege)
            .with_dry_run(self.dry_run)
            .install_all(&self.manifest.packages, report);
    }

    /// Remove every link, restoring backups.
    pub fn unlink_all(&self) -> Report {
        let mut report = Report::new();
        self.linker().unlink_all(&self.manifest.links, &mut report);
        report
    }

    /// Inspect current state of every manifest entry without changing it.
    pub fn doctor(&self) -> Vec<Check> {
        let mut checks = Vec::new();

        for package in &self.manifest.packages {
            let found = self.shell.find_program(package.program());
            checks.push(Check {
                step: Step::Package,
                name: package.name.clone(),
                ok: found.is_some(),
                detail: match found {
                    Some(path) => path.display().to_string(),
                    None => format!("{} not on PATH", package.program()),
                },
            });
        }

        for plugin in &self.manifest.plugins {
            checks.push(Check {
                step: Step::Plugin,
                name: plugin.name.clone(),
                ok: PluginInstaller::<S>::is_installed(plugin),
                detail: plugin.dest.display().to_string(),
            });
        }

        let linker = self.linker();
        for link in &self.manifest.links {
            let (ok, detail) = match linker.state(link) {
                Ok(LinkState::Linked) => (true, "linked".to_string()),
                Ok(LinkState::Absent) => (false, "absent".to_string()),
                Ok(LinkState::Conflict) => (false, "occupied by another file".to_string()),
                Err(error) => (false, error.to_string()),
            };
            checks.push(Check {
                step: Step::Link,
                name: link.target.display().to_string(),
                ok,
                detail,
            });
        }

        if let Some(name) = &self.manifest.settings.login_shell {
            let current = self.current_shell.as_deref();
            checks.push(Check {
                step: Step::Shell,
                name: name.clone(),
                ok: LoginShell::<S>::is_current(name, current),
                detail: format!("current login shell is {}", current.unwrap_or("unknown")),
            });
        }

        checks
    }
}

/// Run blocking process calls without stalling other tasks on the runtime.
///
/// Only a multi-threaded runtime can hand its worker over, anything else runs
/// the closure in place.
fn blocking<T>(func: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            block_in_place(func)
        }
        _ => func(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{LinkSpec, PackageSpec, PluginSpec, Settings},
        platform::PackageManager,
        report::Outcome,
        syscall::{fake::FakeShell, DryRun},
    };
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::fs::{create_dir_all, write};

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(future)
    }

    fn manifest(root: &Path) -> Manifest {
        Manifest {
            settings: Settings {
                dotfiles: None,
                login_shell: Some("zsh".into()),
            },
            packages: vec![PackageSpec::new("zsh"), PackageSpec::new("git")],
            plugins: vec![PluginSpec {
                name: "tpm".into(),
                url: Some("https://blah.org/tpm.git".into()),
                dest: root.join("home/.tmux/plugins/tpm"),
                ..Default::default()
            }],
            links: vec![
                LinkSpec::new(".zshrc", root.join("home/.zshrc")),
                LinkSpec::new(".tmux.conf", root.join("home/.tmux.conf")),
            ],
        }
    }

    fn debian() -> Platform {
        Platform {
            name: "Debian".into(),
            manager: PackageManager::Apt,
        }
    }

    #[sealed_test]
    fn run_every_step_in_order() -> anyhow::Result<()> {
        let root = std::env::current_dir()?;
        create_dir_all(root.join("dots"))?;
        write(root.join("dots/.zshrc"), "")?;
        write(root.join("dots/.tmux.conf"), "")?;
        git2::Repository::init(root.join("home/.tmux/plugins/tpm"))?;

        let shell = FakeShell::new()
            .with_programs(["git"])
            .installing("install -y zsh", "zsh");
        let bootstrap = Bootstrap::new(manifest(&root), root.join("dots"), shell)
            .with_platform(debian(), Privilege::Direct)
            .with_current_shell(Some("/bin/bash".into()));

        let report = block_on(bootstrap.run(Steps::all()));
        let steps = report.entries().iter().map(|e| e.step).collect::<Vec<_>>();
        assert_eq!(
            steps,
            [
                Step::Package,
                Step::Package,
                Step::Plugin,
                Step::Link,
                Step::Link,
                Step::Shell,
            ]
        );
        assert!(report.is_success());
        assert_eq!(
            bootstrap.shell.calls(),
            [
                "apt-get update",
                "apt-get install -y zsh",
                "chsh -s /usr/bin/zsh",
            ]
        );

        let checks = bootstrap.doctor();
        assert_eq!(checks.len(), 6);
        assert!(checks[..5].iter().all(|check| check.ok));

        Ok(())
    }

    #[sealed_test]
    fn failures_do_not_stop_later_steps() -> anyhow::Result<()> {
        let root = std::env::current_dir()?;
        create_dir_all(root.join("dots"))?;
        write(root.join("dots/.zshrc"), "")?;

        let bootstrap = Bootstrap::new(manifest(&root), root.join("dots"), FakeShell::new())
            .with_current_shell(Some("/bin/zsh".into()))
            .with_dry_run(true);

        let steps = Steps {
            plugins: false,
            ..Steps::all()
        };
        let report = block_on(bootstrap.run(steps));

        // No platform, so both packages fail. Missing .tmux.conf fails.
        assert_eq!(report.failures(), 3);
        assert_eq!(report.count(Outcome::Done), 1);
        assert_eq!(report.count(Outcome::Skipped), 1);
        assert!(!root.join("home/.zshrc").exists());

        Ok(())
    }

    #[sealed_test]
    fn unlink_everything() -> anyhow::Result<()> {
        let root = std::env::current_dir()?;
        create_dir_all(root.join("dots"))?;
        create_dir_all(root.join("home"))?;
        write(root.join("dots/.zshrc"), "")?;
        write(root.join("dots/.tmux.conf"), "")?;
        write(root.join("home/.zshrc"), "original\n")?;

        let bootstrap = Bootstrap::new(manifest(&root), root.join("dots"), FakeShell::new());
        block_on(bootstrap.run(Steps::only(Step::Link)));
        let report = bootstrap.unlink_all();

        assert_eq!(report.count(Outcome::Done), 2);
        assert_eq!(
            std::fs::read_to_string(root.join("home/.zshrc"))?,
            "original\n"
        );
        assert!(!root.join("home/.tmux.conf").exists());

        Ok(())
    }

    #[sealed_test]
    fn packages_on_multi_thread_runtime() -> anyhow::Result<()> {
        let root = std::env::current_dir()?;
        let shell = FakeShell::new().installing("install -y", "zsh").with_programs(["git"]);
        let bootstrap = Bootstrap::new(manifest(&root), root.join("dots"), shell)
            .with_platform(debian(), Privilege::Sudo);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()?;
        let report = runtime.block_on(bootstrap.run(Steps::only(Step::Package)));

        assert!(report.is_success(), "{report}");
        assert_eq!(
            bootstrap.shell.calls(),
            ["sudo apt-get update", "sudo apt-get install -y zsh"]
        );

        Ok(())
    }

    #[sealed_test]
    fn dry_run_packages_report_plan() -> anyhow::Result<()> {
        let root = std::env::current_dir()?;
        let shell = DryRun::new(FakeShell::new().with_programs(["git"]));
        let bootstrap = Bootstrap::new(manifest(&root), root.join("dots"), shell)
            .with_platform(debian(), Privilege::Sudo)
            .with_dry_run(true);

        let report = block_on(bootstrap.run(Steps::only(Step::Package)));

        assert!(report.is_success(), "{report}");
        assert_eq!(report.count(Outcome::Done), 1);
        assert!(bootstrap.shell.inner().calls().is_empty());

        Ok(())
    }

    #[test]
    fn check_display() {
        let check = Check {
            step: Step::Package,
            name: "zsh".into(),
            ok: false,
            detail: "zsh not on PATH".into(),
        };
        assert_eq!(check.to_string(), "[MISSING] package zsh: zsh not on PATH");
    }
}
