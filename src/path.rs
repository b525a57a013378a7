// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for files that dotstrap reads from, or
//! deploys into.

use std::{
    env::{join_paths, set_var, split_paths, var_os},
    path::{Path, PathBuf},
};

/// Determine absolute path to user's home directory.
///
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`PathError::NoWayHome`] if home directory path cannot be
///   determined.
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or(PathError::NoWayHome)
}

/// Determine default absolute path to dotfiles directory.
///
/// Uses `$HOME/.dotfiles` as the default location of link sources. Does not
/// check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`PathError::NoWayHome`] if home directory path cannot be
///   determined.
pub fn default_dotfiles_dir() -> Result<PathBuf> {
    home_dir().map(|path| path.join(".dotfiles"))
}

/// Choose directory holding link sources.
///
/// First match wins: an explicit directory (shell expanded), the manifest's
/// own `dotfiles` setting, the directory containing the manifest file, then
/// [`default_dotfiles_dir`].
///
/// # Errors
///
/// - Return [`PathError::ShellExpansion`] if explicit directory fails to
///   expand.
/// - Return [`PathError::NoWayHome`] if the default is needed but home
///   directory cannot be determined.
pub fn resolve_dotfiles(
    explicit: Option<&Path>,
    configured: Option<&Path>,
    manifest_file: Option<&Path>,
) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return expand(path.to_string_lossy());
    }

    if let Some(path) = configured {
        return Ok(path.to_path_buf());
    }

    // INVARIANT: A manifest without a dotfiles setting lives in the dotfiles directory.
    if let Some(file) = manifest_file {
        return match file.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => Ok(parent.to_path_buf()),
            _ => Ok(PathBuf::from(".")),
        };
    }

    default_dotfiles_dir()
}

/// Put directory in front of `PATH` for this process and its children.
///
/// Does nothing if directory is already listed.
///
/// # Errors
///
/// - Return [`PathError::SearchPath`] if directory cannot be joined into
///   `PATH`, e.g., it contains the path separator.
pub fn prepend_search_path(dir: &Path) -> Result<()> {
    let current = var_os("PATH").unwrap_or_default();
    let mut paths = split_paths(&current).collect::<Vec<_>>();
    if paths.iter().any(|path| path == dir) {
        return Ok(());
    }

    paths.insert(0, dir.to_path_buf());
    let joined = join_paths(paths).map_err(|_| PathError::SearchPath(dir.to_path_buf()))?;
    set_var("PATH", joined);

    Ok(())
}

/// Perform shell expansion on a raw path.
///
/// Expands a leading tilde, and any `$VAR` or `${VAR}` reference.
///
/// # Errors
///
/// - Return [`PathError::ShellExpansion`] if a referenced variable is unset.
pub fn expand(raw: impl AsRef<str>) -> Result<PathBuf> {
    let expanded = shellexpand::full(raw.as_ref())?;
    Ok(PathBuf::from(expanded.into_owned()))
}

/// Path resolution error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum PathError {
    /// No way to determine user's home directory.
    #[error("cannot determine absolute path to user's home directory")]
    NoWayHome,

    /// Directory cannot be added to `PATH`.
    #[error("cannot add {0:?} to PATH")]
    SearchPath(PathBuf),

    /// Failed to perform shell expansion on path.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

/// Friendly result alias :3
pub type Result<T, E = PathError> = std::result::Result<T, E>;
