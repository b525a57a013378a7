// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Dotfile linking.
//!
//! Dotfiles are deployed by symlinking each link source in the dotfiles
//! directory to its target path, usually somewhere under the user's home
//! directory. Because the target is a symlink, editing the deployed file edits
//! the tracked copy directly.
//!
//! # Backup On Conflict
//!
//! Fresh machines tend to ship default configuration files, e.g., a skeleton
//! `.zshrc`. Whatever sits at a target path that is not already the expected
//! symlink gets renamed to a __backup__ before the link is made:
//!
//! ```text
//! ~/.zshrc  ->  ~/.zshrc.bak.20250114093012
//! ```
//!
//! The suffix is a local timestamp taken once per [`Linker`]. If that name is
//! also taken, a counter is appended, e.g., `.bak.20250114093012-1`. Backups
//! are never deleted by dotstrap. Unlinking a target restores its newest
//! backup.

use crate::{
    config::LinkSpec,
    report::{Report, Step},
};

use chrono::Local;
use std::{
    ffi::OsString,
    fs::{read_link, remove_file, rename, symlink_metadata},
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// Current state of a link target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    /// Target is a symlink to the link source.
    Linked,

    /// Nothing exists at target.
    Absent,

    /// Something other than the expected symlink exists at target.
    Conflict,
}

/// Result of linking a dotfile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    /// Symlink created where nothing existed.
    Created,

    /// Symlink was already in place.
    AlreadyLinked,

    /// Existing file was backed up, then replaced by symlink.
    Replaced { backup: PathBuf },
}

/// Result of unlinking a dotfile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnlinkOutcome {
    /// Symlink removed, and no backup to restore.
    Removed,

    /// Symlink removed, and newest backup moved back into place.
    Restored { backup: PathBuf },

    /// Target is not our symlink, so it was left alone.
    NotLinked,
}

/// Symlink dotfiles into place.
#[derive(Debug, Clone)]
pub struct Linker {
    dotfiles: PathBuf,
    stamp: String,
    dry_run: bool,
}

impl Linker {
    /// Construct new linker over a dotfiles directory.
    ///
    /// Backup suffix is taken from the current local time.
    pub fn new(dotfiles: impl Into<PathBuf>) -> Self {
        Self {
            dotfiles: dotfiles.into(),
            stamp: Local::now().format("%Y%m%d%H%M%S").to_string(),
            dry_run: false,
        }
    }

    /// Use fixed backup suffix.
    pub fn with_stamp(mut self, stamp: impl Into<String>) -> Self {
        self.stamp = stamp.into();
        self
    }

    /// Report what would happen without touching the file system.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Absolute path to link source.
    ///
    /// # Errors
    ///
    /// - Return [`LinkError::Resolve`] if current directory is unavailable
    ///   for a relative dotfiles directory.
    pub fn source_path(&self, spec: &LinkSpec) -> Result<PathBuf> {
        let source = self.dotfiles.join(&spec.source);
        std::path::absolute(&source).map_err(|err| LinkError::Resolve {
            source: err,
            path: source,
        })
    }

    /// Inspect link target.
    ///
    /// # Errors
    ///
    /// - Return [`LinkError::Resolve`] if source path cannot be resolved.
    pub fn state(&self, spec: &LinkSpec) -> Result<LinkState> {
        let source = self.source_path(spec)?;
        Ok(target_state(&source, &spec.target))
    }

    /// Symlink dotfile into place, backing up anything in the way.
    ///
    /// # Errors
    ///
    /// - Return [`LinkError::MissingSource`] if link source does not exist.
    /// - Return [`LinkError::CreateParent`] if parent of target cannot be
    ///   created.
    /// - Return [`LinkError::Backup`] if existing target cannot be moved.
    /// - Return [`LinkError::Symlink`] if symlink cannot be created.
    #[instrument(skip(self, spec), fields(path = %spec.target.display()), level = "debug")]
    pub fn link(&self, spec: &LinkSpec) -> Result<LinkOutcome> {
        let source = self.source_path(spec)?;
        if symlink_metadata(&source).is_err() {
            return Err(LinkError::MissingSource { path: source });
        }

        let target = spec.target.as_path();
        let outcome = match target_state(&source, target) {
            LinkState::Linked => return Ok(LinkOutcome::AlreadyLinked),
            LinkState::Absent => LinkOutcome::Created,
            LinkState::Conflict => LinkOutcome::Replaced {
                backup: self.backup_path(target),
            },
        };

        if self.dry_run {
            info!("dry run: link {} -> {}", target.display(), source.display());
            return Ok(outcome);
        }

        if let LinkOutcome::Replaced { backup } = &outcome {
            debug!("back up {} to {}", target.display(), backup.display());
            rename(target, backup).map_err(|err| LinkError::Backup {
                source: err,
                path: target.to_path_buf(),
            })?;
        }

        if let Some(parent) = target.parent() {
            mkdirp::mkdirp(parent).map_err(|err| LinkError::CreateParent {
                source: err,
                path: parent.to_path_buf(),
            })?;
        }

        symlink(&source, target).map_err(|err| LinkError::Symlink {
            source: err,
            path: target.to_path_buf(),
        })?;

        Ok(outcome)
    }

    /// Remove symlink, and restore newest backup if any.
    ///
    /// # Errors
    ///
    /// - Return [`LinkError::Remove`] if symlink cannot be removed.
    /// - Return [`LinkError::Restore`] if backup cannot be moved back.
    /// - Return [`LinkError::Pattern`] if backup search pattern is invalid.
    #[instrument(skip(self, spec), fields(path = %spec.target.display()), level = "debug")]
    pub fn unlink(&self, spec: &LinkSpec) -> Result<UnlinkOutcome> {
        let source = self.source_path(spec)?;
        let target = spec.target.as_path();
        if target_state(&source, target) != LinkState::Linked {
            return Ok(UnlinkOutcome::NotLinked);
        }

        let backup = newest_backup(target)?;
        if self.dry_run {
            info!("dry run: unlink {}", target.display());
            return Ok(match backup {
                Some(backup) => UnlinkOutcome::Restored { backup },
                None => UnlinkOutcome::Removed,
            });
        }

        remove_file(target).map_err(|err| LinkError::Remove {
            source: err,
            path: target.to_path_buf(),
        })?;

        let Some(backup) = backup else {
            return Ok(UnlinkOutcome::Removed);
        };

        rename(&backup, target).map_err(|err| LinkError::Restore {
            source: err,
            path: backup.clone(),
        })?;

        Ok(UnlinkOutcome::Restored { backup })
    }

    /// Link every dotfile, recording one entry per link.
    pub fn link_all(&self, specs: &[LinkSpec], report: &mut Report) {
        for spec in specs {
            let name = spec.source.display().to_string();
            match self.link(spec) {
                Ok(LinkOutcome::Created) => {
                    report.done(Step::Link, name, format!("linked {}", spec.target.display()))
                }
                Ok(LinkOutcome::AlreadyLinked) => report.skipped(Step::Link, name, "already linked"),
                Ok(LinkOutcome::Replaced { backup }) => report.done(
                    Step::Link,
                    name,
                    format!(
                        "linked {}, previous file kept at {}",
                        spec.target.display(),
                        backup.display()
                    ),
                ),
                Err(error) => report.failed(Step::Link, name, error),
            }
        }
    }

    /// Unlink every dotfile, recording one entry per link.
    pub fn unlink_all(&self, specs: &[LinkSpec], report: &mut Report) {
        for spec in specs {
            let name = spec.source.display().to_string();
            match self.unlink(spec) {
                Ok(UnlinkOutcome::Removed) => {
                    report.done(Step::Link, name, format!("removed {}", spec.target.display()))
                }
                Ok(UnlinkOutcome::Restored { backup }) => report.done(
                    Step::Link,
                    name,
                    format!("restored {}", backup.display()),
                ),
                Ok(UnlinkOutcome::NotLinked) => {
                    warn!("{} is not linked by dotstrap", spec.target.display());
                    report.skipped(Step::Link, name, "not linked")
                }
                Err(error) => report.failed(Step::Link, name, error),
            }
        }
    }

    fn backup_path(&self, target: &Path) -> PathBuf {
        let base = with_suffix(target, &format!(".bak.{}", self.stamp));
        let mut backup = base.clone();
        let mut counter = 1;

        // INVARIANT: Never clobber an older backup.
        while symlink_metadata(&backup).is_ok() {
            backup = with_suffix(&base, &format!("-{counter}"));
            counter += 1;
        }

        backup
    }
}

fn target_state(source: &Path, target: &Path) -> LinkState {
    match symlink_metadata(target) {
        Ok(meta) if meta.file_type().is_symlink() => match read_link(target) {
            Ok(points_to) if points_to == source => LinkState::Linked,
            _ => LinkState::Conflict,
        },
        Ok(_) => LinkState::Conflict,
        Err(err) if err.kind() == ErrorKind::NotFound => LinkState::Absent,
        Err(_) => LinkState::Conflict,
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

fn newest_backup(target: &Path) -> Result<Option<PathBuf>> {
    let pattern = format!(
        "{}.bak.*",
        glob::Pattern::escape(&target.to_string_lossy())
    );
    let newest = glob::glob(&pattern)?
        .filter_map(std::result::Result::ok)
        .filter_map(|path| backup_order(target, &path).map(|order| (order, path)))
        .max_by(|(lhs, _), (rhs, _)| lhs.cmp(rhs))
        .map(|(_, path)| path);

    Ok(newest)
}

/// Sort key of a backup made by [`Linker::link`], i.e., `(stamp, counter)`.
///
/// Anything not named `<target>.bak.<14 digits>[-<counter>]` is not ours.
fn backup_order(target: &Path, backup: &Path) -> Option<(u64, u32)> {
    let name = backup.file_name()?.to_str()?;
    let suffix = name
        .strip_prefix(target.file_name()?.to_str()?)?
        .strip_prefix(".bak.")?;
    let (stamp, counter) = match suffix.split_once('-') {
        Some((stamp, counter)) if is_digits(counter) => (stamp, counter.parse().ok()?),
        Some(_) => return None,
        None => (suffix, 0),
    };

    if stamp.len() != 14 || !is_digits(stamp) {
        return None;
    }

    Some((stamp.parse().ok()?, counter))
}

fn is_digits(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|byte| byte.is_ascii_digit())
}

#[cfg(unix)]
fn symlink(source: &Path, target: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(source, target)
}

#[cfg(windows)]
fn symlink(source: &Path, target: &Path) -> std::io::Result<()> {
    if source.is_dir() {
        std::os::windows::fs::symlink_dir(source, target)
    } else {
        std::os::windows::fs::symlink_file(source, target)
    }
}

/// Dotfile linking error types.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Link source does not exist in dotfiles directory.
    #[error("link source {:?} does not exist", path.display())]
    MissingSource { path: PathBuf },

    /// Link source cannot be made absolute.
    #[error("failed to resolve {:?}", path.display())]
    Resolve {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Parent directory of target cannot be created.
    #[error("failed to create directory {:?}", path.display())]
    CreateParent {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Existing target cannot be moved out of the way.
    #[error("failed to back up {:?}", path.display())]
    Backup {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Symlink cannot be created.
    #[error("failed to create symlink at {:?}", path.display())]
    Symlink {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Symlink cannot be removed.
    #[error("failed to remove symlink at {:?}", path.display())]
    Remove {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Backup cannot be moved back into place.
    #[error("failed to restore backup {:?}", path.display())]
    Restore {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Backup search pattern is invalid.
    #[error(transparent)]
    Pattern(#[from] glob::PatternError),
}

/// Friendly result alias :3
pub type Result<T, E = LinkError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Outcome;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::fs::{create_dir_all, read_to_string, write};

    struct Fixture {
        dotfiles: PathBuf,
        home: PathBuf,
    }

    impl Fixture {
        fn new() -> anyhow::Result<Self> {
            let root = std::env::current_dir()?;
            let dotfiles = root.join("dots");
            let home = root.join("home");
            create_dir_all(dotfiles.join("nvim/lua"))?;
            create_dir_all(&home)?;
            write(dotfiles.join(".zshrc"), "plugins=(git)\n")?;
            write(dotfiles.join("nvim/lua/keymaps.lua"), "-- keymaps\n")?;

            Ok(Self { dotfiles, home })
        }

        fn linker(&self) -> Linker {
            Linker::new(&self.dotfiles).with_stamp("20250101000000")
        }

        fn spec(&self, source: &str, target: &str) -> LinkSpec {
            LinkSpec::new(source, self.home.join(target))
        }
    }

    #[sealed_test]
    fn link_into_empty_home() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        let linker = fixture.linker();
        let spec = fixture.spec(".zshrc", ".zshrc");

        assert_eq!(linker.state(&spec)?, LinkState::Absent);
        assert_eq!(linker.link(&spec)?, LinkOutcome::Created);
        assert_eq!(read_link(&spec.target)?, fixture.dotfiles.join(".zshrc"));
        assert_eq!(linker.state(&spec)?, LinkState::Linked);

        // Idempotent.
        assert_eq!(linker.link(&spec)?, LinkOutcome::AlreadyLinked);

        Ok(())
    }

    #[sealed_test]
    fn link_creates_missing_parents() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        let spec = fixture.spec("nvim", ".config/nvim");

        assert_eq!(fixture.linker().link(&spec)?, LinkOutcome::Created);
        assert_eq!(
            read_to_string(spec.target.join("lua/keymaps.lua"))?,
            "-- keymaps\n"
        );

        Ok(())
    }

    #[sealed_test]
    fn link_backs_up_conflicting_file() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        let spec = fixture.spec(".zshrc", ".zshrc");
        write(&spec.target, "# distro default\n")?;

        let backup = fixture.home.join(".zshrc.bak.20250101000000");
        assert_eq!(fixture.linker().state(&spec)?, LinkState::Conflict);
        assert_eq!(
            fixture.linker().link(&spec)?,
            LinkOutcome::Replaced {
                backup: backup.clone()
            }
        );
        assert_eq!(read_to_string(&backup)?, "# distro default\n");
        assert_eq!(read_to_string(&spec.target)?, "plugins=(git)\n");

        Ok(())
    }

    #[sealed_test]
    fn backups_never_clobber_each_other() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        let spec = fixture.spec(".zshrc", ".zshrc");
        let linker = fixture.linker();

        write(&spec.target, "first\n")?;
        linker.link(&spec)?;

        // Replace our link by a foreign symlink, then link again.
        remove_file(&spec.target)?;
        symlink(&fixture.dotfiles.join("nvim"), &spec.target)?;
        let outcome = linker.link(&spec)?;

        let expect = fixture.home.join(".zshrc.bak.20250101000000-1");
        assert_eq!(outcome, LinkOutcome::Replaced { backup: expect.clone() });
        assert_eq!(read_link(&expect)?, fixture.dotfiles.join("nvim"));
        assert_eq!(
            read_to_string(fixture.home.join(".zshrc.bak.20250101000000"))?,
            "first\n"
        );

        Ok(())
    }

    #[sealed_test]
    fn link_missing_source_fails() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        let spec = fixture.spec(".vimrc", ".vimrc");

        let result = fixture.linker().link(&spec);
        assert!(matches!(result, Err(LinkError::MissingSource { .. })));
        assert!(symlink_metadata(&spec.target).is_err());

        Ok(())
    }

    #[sealed_test]
    fn unlink_restores_newest_backup() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        let spec = fixture.spec(".zshrc", ".zshrc");
        write(fixture.home.join(".zshrc.bak.20240101000000"), "older\n")?;
        write(&spec.target, "newer\n")?;

        let linker = fixture.linker();
        linker.link(&spec)?;
        let outcome = linker.unlink(&spec)?;

        assert_eq!(
            outcome,
            UnlinkOutcome::Restored {
                backup: fixture.home.join(".zshrc.bak.20250101000000")
            }
        );
        assert_eq!(read_to_string(&spec.target)?, "newer\n");
        assert!(!symlink_metadata(&spec.target)?.file_type().is_symlink());

        Ok(())
    }

    #[sealed_test]
    fn unlink_leaves_foreign_files_alone() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        let spec = fixture.spec(".zshrc", ".zshrc");
        write(&spec.target, "mine\n")?;

        assert_eq!(fixture.linker().unlink(&spec)?, UnlinkOutcome::NotLinked);
        assert_eq!(read_to_string(&spec.target)?, "mine\n");

        let absent = fixture.spec("nvim", ".config/nvim");
        assert_eq!(fixture.linker().unlink(&absent)?, UnlinkOutcome::NotLinked);

        Ok(())
    }

    #[sealed_test]
    fn unlink_without_backup_just_removes() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        let spec = fixture.spec(".zshrc", ".zshrc");
        let linker = fixture.linker();

        linker.link(&spec)?;
        assert_eq!(linker.unlink(&spec)?, UnlinkOutcome::Removed);
        assert!(symlink_metadata(&spec.target).is_err());

        Ok(())
    }

    #[sealed_test]
    fn dry_run_touches_nothing() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        let spec = fixture.spec(".zshrc", ".zshrc");
        write(&spec.target, "keep me\n")?;

        let linker = fixture.linker().with_dry_run(true);
        assert!(matches!(linker.link(&spec)?, LinkOutcome::Replaced { .. }));
        assert_eq!(read_to_string(&spec.target)?, "keep me\n");
        assert!(newest_backup(&spec.target)?.is_none());

        Ok(())
    }

    #[sealed_test]
    fn link_all_reports_each_link() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        let specs = [
            fixture.spec(".zshrc", ".zshrc"),
            fixture.spec(".vimrc", ".vimrc"),
            fixture.spec("nvim", ".config/nvim"),
        ];

        let mut report = Report::new();
        fixture.linker().link_all(&specs, &mut report);
        assert_eq!(report.count(Outcome::Done), 2);
        assert_eq!(report.failures(), 1);

        let mut report = Report::new();
        fixture.linker().unlink_all(&specs, &mut report);
        assert_eq!(report.count(Outcome::Done), 2);
        assert_eq!(report.count(Outcome::Skipped), 1);

        Ok(())
    }

    #[sealed_test]
    fn link_backs_up_dangling_symlink() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        let spec = fixture.spec(".zshrc", ".zshrc");
        let gone = fixture.home.join("gone/.zshrc");
        symlink(&gone, &spec.target)?;

        let backup = fixture.home.join(".zshrc.bak.20250101000000");
        assert_eq!(fixture.linker().state(&spec)?, LinkState::Conflict);
        assert_eq!(
            fixture.linker().link(&spec)?,
            LinkOutcome::Replaced {
                backup: backup.clone()
            }
        );
        assert_eq!(read_link(&backup)?, gone);
        assert_eq!(read_link(&spec.target)?, fixture.dotfiles.join(".zshrc"));

        Ok(())
    }

    #[sealed_test]
    fn dry_run_unlink_touches_nothing() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        let spec = fixture.spec(".zshrc", ".zshrc");
        write(&spec.target, "original\n")?;
        fixture.linker().link(&spec)?;

        let backup = fixture.home.join(".zshrc.bak.20250101000000");
        let linker = fixture.linker().with_dry_run(true);
        assert_eq!(
            linker.unlink(&spec)?,
            UnlinkOutcome::Restored {
                backup: backup.clone()
            }
        );
        assert_eq!(linker.state(&spec)?, LinkState::Linked);
        assert_eq!(read_to_string(&backup)?, "original\n");

        let fresh = fixture.spec("nvim", ".config/nvim");
        fixture.linker().link(&fresh)?;
        assert_eq!(linker.unlink(&fresh)?, UnlinkOutcome::Removed);
        assert_eq!(linker.state(&fresh)?, LinkState::Linked);

        Ok(())
    }

    #[sealed_test]
    fn newest_backup_orders_by_stamp_then_counter() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        let target = fixture.home.join(".zshrc");
        for suffix in [
            "20240101000000",
            "20250101000000",
            "20250101000000-9",
            "20250101000000-10",
            "old",
            "20250101000000-x",
            "2025",
        ] {
            write(fixture.home.join(format!(".zshrc.bak.{suffix}")), "")?;
        }

        assert_eq!(
            newest_backup(&target)?,
            Some(fixture.home.join(".zshrc.bak.20250101000000-10"))
        );

        Ok(())
    }

    #[sealed_test]
    fn unlink_ignores_foreign_backup_names() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        let spec = fixture.spec(".zshrc", ".zshrc");
        write(fixture.home.join(".zshrc.bak.old"), "user notes\n")?;

        let linker = fixture.linker();
        linker.link(&spec)?;
        assert_eq!(linker.unlink(&spec)?, UnlinkOutcome::Removed);
        assert_eq!(
            read_to_string(fixture.home.join(".zshrc.bak.old"))?,
            "user notes\n"
        );

        Ok(())
    }
}
