// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the __bootstrap manifest__, the TOML file that tells
//! dotstrap which packages to install, which plugins to fetch, and which
//! dotfiles to link.
//!
//! # General Layout
//!
//! A manifest is composed of four parts: settings, packages, plugins, and
//! links. Each part except settings is an array of tables.
//!
//! ```toml
//! [settings]
//! dotfiles = "~/.dotfiles"
//! login_shell = "zsh"
//!
//! [[package]]
//! name = "neovim"
//! bin = "nvim"
//!
//! [[plugin]]
//! name = "tpm"
//! url = "https://github.com/tmux-plugins/tpm"
//! dest = "~/.tmux/plugins/tpm"
//!
//! [[link]]
//! source = ".tmux.conf"
//! target = "~/.tmux.conf"
//! ```
//!
//! All destination and target paths go through shell expansion when parsed,
//! so `~` and environment variables may be used freely.

use crate::{
    path::{expand, PathError},
    platform::PackageManager,
};

use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashSet},
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
};

/// Bootstrap manifest bundled into the binary.
const BUILTIN_MANIFEST: &str = include_str!("../dotfiles/dotstrap.toml");

/// Bootstrap manifest layout.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Manifest {
    /// General settings.
    #[serde(default)]
    pub settings: Settings,

    /// Packages to install through the platform package manager.
    #[serde(rename = "package", default, skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<PackageSpec>,

    /// Plugins to fetch.
    #[serde(rename = "plugin", default, skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<PluginSpec>,

    /// Dotfiles to symlink into place.
    #[serde(rename = "link", default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<LinkSpec>,
}

impl Manifest {
    /// Load manifest bundled with dotstrap.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::ShellExpansion`] if paths cannot be expanded.
    pub fn builtin() -> Result<Self> {
        BUILTIN_MANIFEST.parse()
    }

    /// Raw text of manifest bundled with dotstrap.
    pub fn builtin_text() -> &'static str {
        BUILTIN_MANIFEST
    }

    /// Load manifest from file.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if file cannot be read.
    /// - Return any parse error from [`Manifest::from_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = read_to_string(path).map_err(|err| ConfigError::Read {
            source: err,
            path: path.to_path_buf(),
        })?;

        data.parse()
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for package in &self.packages {
            if !seen.insert(package.name.as_str()) {
                return Err(ConfigError::DuplicateName {
                    kind: "package",
                    name: package.name.clone(),
                });
            }
        }

        let mut seen = HashSet::new();
        for plugin in &self.plugins {
            if !seen.insert(plugin.name.as_str()) {
                return Err(ConfigError::DuplicateName {
                    kind: "plugin",
                    name: plugin.name.clone(),
                });
            }

            // INVARIANT: Exactly one plugin source.
            plugin.source()?;
        }

        Ok(())
    }
}

impl FromStr for Manifest {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut manifest: Manifest = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on every path field.
        if let Some(dotfiles) = manifest.settings.dotfiles.take() {
            manifest.settings.dotfiles = Some(expand_path(&dotfiles)?);
        }

        for plugin in &mut manifest.plugins {
            plugin.dest = expand_path(&plugin.dest)?;
        }

        for link in &mut manifest.links {
            link.target = expand_path(&link.target)?;
        }

        manifest.validate()?;

        Ok(manifest)
    }
}

impl Display for Manifest {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    Ok(expand(path.to_string_lossy())?)
}

/// General manifest settings.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Directory holding link sources.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dotfiles: Option<PathBuf>,

    /// Shell to make the user's login shell.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_shell: Option<String>,
}

/// Package to install.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct PackageSpec {
    /// Package name as known to most package managers.
    pub name: String,

    /// Program to probe on PATH to see if package is installed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bin: Option<String>,

    /// Package name overrides keyed by package manager, e.g., "apt".
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub alias: BTreeMap<String, String>,
}

impl PackageSpec {
    /// Construct new package specification.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set program used to probe for the package.
    pub fn with_bin(mut self, bin: impl Into<String>) -> Self {
        self.bin = Some(bin.into());
        self
    }

    /// Program that indicates the package is installed.
    pub fn program(&self) -> &str {
        self.bin.as_deref().unwrap_or(&self.name)
    }

    /// Package name to hand to target package manager.
    pub fn name_for(&self, manager: PackageManager) -> &str {
        self.alias
            .get(manager.key())
            .map(String::as_str)
            .unwrap_or(&self.name)
    }
}

/// Plugin to fetch.
///
/// A plugin is either a git repository cloned into place, or an installer
/// script that puts the plugin into place by itself.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct PluginSpec {
    /// Name of plugin.
    pub name: String,

    /// Remote URL of git repository to clone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Branch to check out instead of the remote's default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    /// URL of installer script to run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,

    /// Where the plugin lives once installed.
    pub dest: PathBuf,

    /// Environment for installer script.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl PluginSpec {
    /// Determine where the plugin comes from.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::PluginSource`] if not exactly one of `url` or
    ///   `script` is set.
    pub fn source(&self) -> Result<PluginSource<'_>> {
        match (&self.url, &self.script) {
            (Some(url), None) => Ok(PluginSource::Git {
                url,
                branch: self.branch.as_deref(),
            }),
            (None, Some(url)) => Ok(PluginSource::Script {
                url,
                env: &self.env,
            }),
            _ => Err(ConfigError::PluginSource {
                name: self.name.clone(),
            }),
        }
    }
}

/// Origin of a plugin.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PluginSource<'a> {
    /// Clone git repository.
    Git {
        url: &'a str,
        branch: Option<&'a str>,
    },

    /// Run installer script.
    Script {
        url: &'a str,
        env: &'a BTreeMap<String, String>,
    },
}

/// Dotfile to symlink into place.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct LinkSpec {
    /// Path relative to the dotfiles directory.
    pub source: PathBuf,

    /// Where the symlink goes.
    pub target: PathBuf,
}

impl LinkSpec {
    /// Construct new link specification.
    pub fn new(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] PathError),

    /// Failed to read manifest file.
    #[error("failed to read manifest at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Plugin lists no source, or too many.
    #[error("plugin {name:?} must set exactly one of 'url' or 'script'")]
    PluginSource { name: String },

    /// Name used twice in one listing.
    #[error("{kind} {name:?} listed more than once")]
    DuplicateName { kind: &'static str, name: String },
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
