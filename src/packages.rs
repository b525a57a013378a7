// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Package installation.
//!
//! A package counts as installed when its program can be found on PATH.
//! Anything missing is handed to the platform package manager one package at
//! a time, so that one bad package name does not take the others down with
//! it.

use crate::{
    config::PackageSpec,
    path::{prepend_search_path, PathError},
    platform::{PackageManager, Privilege},
    report::{Report, Step},
    syscall::{fetch_script, run_script, CommandLine, Syscall, SyscallError},
};

use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

/// Official Homebrew installer script.
pub const HOMEBREW_INSTALLER: &str =
    "https://raw.githubusercontent.com/Homebrew/install/HEAD/install.sh";

/// Places the Homebrew installer puts itself, none of which need to be on PATH.
pub const HOMEBREW_PREFIXES: [&str; 3] = [
    "/opt/homebrew",
    "/usr/local",
    "/home/linuxbrew/.linuxbrew",
];

/// Install packages through a package manager.
#[derive(Debug)]
pub struct PackageInstaller<'a, S>
where
    S: Syscall,
{
    shell: &'a S,
    manager: PackageManager,
    privilege: Privilege,
    homebrew_prefixes: Vec<PathBuf>,
    dry_run: bool,
}

impl<'a, S> PackageInstaller<'a, S>
where
    S: Syscall,
{
    /// Construct new package installer.
    pub fn new(shell: &'a S, manager: PackageManager, privilege: Privilege) -> Self {
        Self {
            shell,
            manager,
            privilege,
            homebrew_prefixes: HOMEBREW_PREFIXES.iter().map(PathBuf::from).collect(),
            dry_run: false,
        }
    }

    /// Report what would be installed instead of checking the result.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Override where to look for Homebrew when it is not on PATH.
    pub fn with_homebrew_prefixes(mut self, prefixes: impl IntoIterator<Item = PathBuf>) -> Self {
        self.homebrew_prefixes = prefixes.into_iter().collect();
        self
    }

    /// Check if package is already installed.
    pub fn is_installed(&self, package: &PackageSpec) -> bool {
        self.locate(package, None).is_some()
    }

    fn locate(&self, package: &PackageSpec, extra_bin: Option<&Path>) -> Option<PathBuf> {
        let program = package.program();
        self.shell.find_program(program).or_else(|| {
            extra_bin
                .map(|bin| bin.join(program))
                .filter(|path| path.is_file())
        })
    }

    /// Install every package that is missing.
    ///
    /// Records one entry per package into the report.
    #[instrument(skip(self, packages, report), fields(manager = %self.manager), level = "debug")]
    pub fn install_all(&self, packages: &[PackageSpec], report: &mut Report) {
        let mut missing = Vec::new();
        for package in packages {
            if self.is_installed(package) {
                report.skipped(Step::Package, &package.name, "already installed");
            } else {
                missing.push(package);
            }
        }

        if missing.is_empty() {
            return;
        }

        let brew = match self.ensure_homebrew() {
            Ok(brew) => brew,
            Err(error) => {
                for package in missing {
                    report.failed(
                        Step::Package,
                        &package.name,
                        format!("homebrew unavailable: {error}"),
                    );
                }
                return;
            }
        };

        // INVARIANT: Refresh package index once, and only if something needs installing.
        if let Some(refresh) = self.manager.refresh_command() {
            info!("refresh {} package index", self.manager);
            if let Err(error) = self.shell.run_interactive(&self.escalate(refresh)) {
                warn!("package index refresh failed: {error}");
            }
        }

        for package in missing {
            self.install(package, brew.as_deref(), report);
        }
    }

    fn install(&self, package: &PackageSpec, brew: Option<&Path>, report: &mut Report) {
        let name = package.name_for(self.manager);
        info!("install {name} through {}", self.manager);

        let command = match brew {
            Some(brew) => self.manager.install_command_via(brew, name),
            None => self.manager.install_command(name),
        };
        if let Err(error) = self.shell.run_interactive(&self.escalate(command)) {
            report.failed(Step::Package, &package.name, error);
            return;
        }

        if self.dry_run {
            report.done(
                Step::Package,
                &package.name,
                format!("would install via {}", self.manager),
            );
            return;
        }

        // INVARIANT: Package manager success is not enough, program must be on PATH.
        let brew_bin = brew.and_then(Path::parent);
        if self.locate(package, brew_bin).is_some() {
            report.done(Step::Package, &package.name, format!("installed via {}", self.manager));
        } else {
            report.failed(
                Step::Package,
                &package.name,
                format!("installed but {:?} not found on PATH", package.program()),
            );
        }
    }

    fn escalate(&self, command: CommandLine) -> CommandLine {
        if self.manager.needs_privilege() {
            self.privilege.apply(command)
        } else {
            command
        }
    }

    /// Make sure Homebrew is available when it is the package manager.
    ///
    /// Runs the official installer when `brew` cannot be found. Returns the
    /// path to `brew`, or `None` for any other package manager.
    ///
    /// # Errors
    ///
    /// - Return [`PackageError::Syscall`] if the installer script cannot be
    ///   fetched or fails.
    /// - Return [`PackageError::HomebrewMissing`] if the installer finished but
    ///   `brew` is still nowhere to be found.
    /// - Return [`PackageError::SearchPath`] if Homebrew's bin directory cannot
    ///   be put on PATH.
    pub fn ensure_homebrew(&self) -> Result<Option<PathBuf>> {
        if self.manager != PackageManager::Brew {
            return Ok(None);
        }

        if let Some(brew) = self.locate_homebrew()? {
            return Ok(Some(brew));
        }

        if self.dry_run {
            info!("dry run: install homebrew from {HOMEBREW_INSTALLER}");
            return Ok(Some(PathBuf::from(self.manager.program())));
        }

        info!("homebrew not found, running its installer");
        let script = fetch_script(self.shell, HOMEBREW_INSTALLER, "homebrew")?;
        run_script(self.shell, &script, [("NONINTERACTIVE", "1")])?;

        match self.locate_homebrew()? {
            Some(brew) => Ok(Some(brew)),
            None => Err(PackageError::HomebrewMissing),
        }
    }

    fn locate_homebrew(&self) -> Result<Option<PathBuf>> {
        if let Some(brew) = self.shell.find_program("brew") {
            return Ok(Some(brew));
        }

        let Some(brew) = self
            .homebrew_prefixes
            .iter()
            .map(|prefix| prefix.join("bin").join("brew"))
            .find(|path| path.is_file())
        else {
            return Ok(None);
        };

        // INVARIANT: Later steps must see programs installed under the Homebrew prefix.
        if !self.dry_run {
            if let Some(bin) = brew.parent() {
                info!("add {} to PATH", bin.display());
                prepend_search_path(bin)?;
            }
        }

        Ok(Some(brew))
    }
}

/// Package installation error types.
#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    /// External process failed.
    #[error(transparent)]
    Syscall(#[from] SyscallError),

    /// Homebrew installer succeeded without leaving `brew` behind.
    #[error("homebrew installer finished but brew cannot be found")]
    HomebrewMissing,

    /// Homebrew's bin directory could not be put on PATH.
    #[error(transparent)]
    SearchPath(#[from] PathError),
}

/// Friendly result alias :3
pub type Result<T, E = PackageError> = std::result::Result<T, E>;
