// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Operating system detection.
//!
//! Figure out which package manager to drive on the current machine. macOS
//! always uses Homebrew. Linux distributions are identified through
//! `/etc/os-release`, first by `ID`, then by each entry of `ID_LIKE`. A Linux
//! distribution dotstrap does not recognize may still be bootstrapped if
//! Homebrew happens to be installed.
//!
//! # See Also
//!
//! - [os-release(5)](https://www.freedesktop.org/software/systemd/man/latest/os-release.html)

use crate::syscall::{CommandLine, Syscall};

use std::{
    collections::HashMap,
    ffi::OsString,
    fmt::{Display, Formatter, Result as FmtResult},
    fs::read_to_string,
};
use tracing::{debug, instrument, warn};

/// Location of the os-release file.
pub const OS_RELEASE_PATH: &str = "/etc/os-release";

/// Parsed contents of os-release file.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OsRelease {
    fields: HashMap<String, String>,
}

impl OsRelease {
    /// Parse os-release file contents.
    ///
    /// Blank lines, comments, and malformed lines are skipped. Values may be
    /// wrapped in single or double quotes.
    pub fn parse(text: &str) -> Self {
        let fields = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| line.split_once('='))
            .map(|(key, value)| (key.trim().to_string(), unquote(value.trim()).to_string()))
            .collect();

        Self { fields }
    }

    /// Lookup raw field.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Distribution identifier, e.g., "ubuntu".
    pub fn id(&self) -> Option<&str> {
        self.get("ID")
    }

    /// Identifiers of distributions this one derives from.
    pub fn id_like(&self) -> impl Iterator<Item = &str> {
        self.get("ID_LIKE")
            .into_iter()
            .flat_map(str::split_whitespace)
    }

    /// Human readable name of distribution.
    pub fn pretty_name(&self) -> Option<&str> {
        self.get("PRETTY_NAME").or_else(|| self.get("NAME"))
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }

    value
}

/// Supported package managers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageManager {
    Apt,
    Dnf,
    Yum,
    Pacman,
    Zypper,
    Apk,
    Brew,
}

impl PackageManager {
    /// Short name used for package aliases in manifests.
    pub fn key(self) -> &'static str {
        match self {
            Self::Apt => "apt",
            Self::Dnf => "dnf",
            Self::Yum => "yum",
            Self::Pacman => "pacman",
            Self::Zypper => "zypper",
            Self::Apk => "apk",
            Self::Brew => "brew",
        }
    }

    /// Program that implements the package manager.
    pub fn program(self) -> &'static str {
        match self {
            Self::Apt => "apt-get",
            Self::Brew => "brew",
            other => other.key(),
        }
    }

    /// Check if package manager must run with root privileges.
    pub fn needs_privilege(self) -> bool {
        !matches!(self, Self::Brew)
    }

    /// Command to refresh package index before installing, if any.
    pub fn refresh_command(self) -> Option<CommandLine> {
        match self {
            Self::Apt => Some(CommandLine::new("apt-get").arg("update")),
            Self::Pacman => Some(CommandLine::new("pacman").arg("-Sy")),
            Self::Apk => Some(CommandLine::new("apk").arg("update")),
            _ => None,
        }
    }

    /// Command to install one package.
    pub fn install_command(self, package: &str) -> CommandLine {
        self.install_command_via(self.program(), package)
    }

    /// Command to install one package through a specific program, e.g., an
    /// absolute path to a freshly installed `brew`.
    pub fn install_command_via(self, program: impl Into<OsString>, package: &str) -> CommandLine {
        let command = CommandLine::new(program);
        match self {
            Self::Apt | Self::Dnf | Self::Yum => command.args(["install", "-y", package]),
            Self::Pacman => command.args(["-S", "--noconfirm", "--needed", package]),
            Self::Zypper => command.args(["--non-interactive", "install", package]),
            Self::Apk => command.args(["add", package]),
            Self::Brew => command.args(["install", package]),
        }
    }

    fn from_distro(id: &str) -> Option<Self> {
        match id {
            "debian" | "ubuntu" | "linuxmint" | "pop" | "raspbian" => Some(Self::Apt),
            "fedora" | "rhel" | "centos" | "rocky" | "almalinux" => Some(Self::Dnf),
            "arch" | "manjaro" | "endeavouros" => Some(Self::Pacman),
            "opensuse" | "opensuse-leap" | "opensuse-tumbleweed" | "suse" | "sles" => {
                Some(Self::Zypper)
            }
            "alpine" => Some(Self::Apk),
            _ => None,
        }
    }
}

impl Display for PackageManager {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.key())
    }
}

/// Detected platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    /// Human readable description of operating system.
    pub name: String,

    /// Package manager to drive.
    pub manager: PackageManager,
}

impl Platform {
    /// Detect platform of current machine.
    ///
    /// # Errors
    ///
    /// - Return [`PlatformError::Unsupported`] if no package manager fits.
    #[instrument(skip(shell), level = "debug")]
    pub fn detect(shell: &impl Syscall) -> Result<Self> {
        let os_release = match read_to_string(OS_RELEASE_PATH) {
            Ok(text) => Some(OsRelease::parse(&text)),
            Err(err) => {
                debug!("cannot read {OS_RELEASE_PATH}: {err}");
                None
            }
        };

        Self::resolve(std::env::consts::OS, os_release.as_ref(), |name| {
            shell.find_program(name).is_some()
        })
    }

    /// Choose package manager from operating system facts.
    ///
    /// # Errors
    ///
    /// - Return [`PlatformError::Unsupported`] if no package manager fits.
    pub fn resolve(
        os: &str,
        os_release: Option<&OsRelease>,
        has_program: impl Fn(&str) -> bool,
    ) -> Result<Self> {
        if os == "macos" {
            return Ok(Self {
                name: "macOS".into(),
                manager: PackageManager::Brew,
            });
        }

        if os != "linux" {
            return Err(PlatformError::Unsupported { os: os.into() });
        }

        let name = os_release
            .and_then(OsRelease::pretty_name)
            .unwrap_or("Linux")
            .to_string();

        let manager = os_release.and_then(|release| {
            release
                .id()
                .into_iter()
                .chain(release.id_like())
                .find_map(PackageManager::from_distro)
        });

        let manager = match manager {
            // INVARIANT: Older RHEL derivatives only ship yum.
            Some(PackageManager::Dnf) if !has_program("dnf") && has_program("yum") => {
                PackageManager::Yum
            }
            Some(manager) => manager,
            None if has_program("brew") => {
                warn!("unrecognized distribution {name:?}, falling back to Homebrew");
                PackageManager::Brew
            }
            None => return Err(PlatformError::Unsupported { os: name }),
        };

        Ok(Self { name, manager })
    }
}

/// How to gain root privileges for package installation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    /// Already root, or no way to escalate.
    #[default]
    Direct,

    /// Escalate through sudo.
    Sudo,
}

impl Privilege {
    /// Determine how current user escalates privileges.
    pub fn detect(shell: &impl Syscall) -> Self {
        let is_root = shell
            .run(&CommandLine::new("id").arg("-u"))
            .map(|uid| uid.trim() == "0")
            .unwrap_or(false);

        if is_root {
            return Self::Direct;
        }

        if shell.find_program("sudo").is_some() {
            Self::Sudo
        } else {
            warn!("not running as root and sudo is unavailable");
            Self::Direct
        }
    }

    /// Apply privilege escalation to command.
    pub fn apply(self, command: CommandLine) -> CommandLine {
        match self {
            Self::Direct => command,
            Self::Sudo => command.wrapped_by("sudo"),
        }
    }
}

/// Platform detection error types.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// No package manager available for the platform.
    #[error("unsupported platform {os:?}: no known package manager")]
    Unsupported { os: String },
}

/// Friendly result alias :3
type Result<T, E = PlatformError> = std::result::Result<T, E>;
