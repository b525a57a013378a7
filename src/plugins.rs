// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Plugin fetching.
//!
//! Shell and tmux plugins come in two flavors. A __git plugin__ is a plain
//! repository that only needs to be cloned into its destination, e.g., tpm or
//! zsh-autosuggestions. A __script plugin__ ships its own installer script
//! that must be run instead, e.g., oh-my-zsh.
//!
//! Script plugins run first and one at a time, because they may prompt, and
//! because git plugins tend to live inside the directories they create. Git
//! plugins are cloned afterwards, concurrently, each with its own progress
//! bar.
//!
//! A plugin whose destination already exists is never touched again.

use crate::{
    config::{PluginSource, PluginSpec},
    report::{Report, Step},
    syscall::{fetch_script, run_script, Syscall, SyscallError},
};

use auth_git2::{GitAuthenticator, Prompter};
use futures::future::join_all;
use git2::{build::RepoBuilder, Config, FetchOptions, RemoteCallbacks, Repository};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use inquire::{Password, Text};
use std::{
    collections::BTreeMap,
    fs::symlink_metadata,
    path::{Path, PathBuf},
    time,
};
use tracing::{debug, info, instrument, warn};

/// Fetch plugins into place.
#[derive(Debug)]
pub struct PluginInstaller<'a, S>
where
    S: Syscall,
{
    shell: &'a S,
    bars: MultiProgress,
    dry_run: bool,
}

impl<'a, S> PluginInstaller<'a, S>
where
    S: Syscall,
{
    /// Construct new plugin installer.
    ///
    /// Installer scripts are fetched and run through target shell.
    pub fn new(shell: &'a S) -> Self {
        Self {
            shell,
            bars: MultiProgress::new(),
            dry_run: false,
        }
    }

    /// Report what would happen without cloning anything.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Check if plugin destination exists.
    pub fn is_installed(plugin: &PluginSpec) -> bool {
        symlink_metadata(&plugin.dest).is_ok()
    }

    /// Install every plugin that is missing.
    ///
    /// Records one entry per plugin into the report.
    #[instrument(skip(self, plugins, report), level = "debug")]
    pub async fn install_all(&self, plugins: &[PluginSpec], report: &mut Report) {
        for plugin in plugins {
            if let Ok(PluginSource::Script { url, env }) = plugin.source() {
                self.install_script(plugin, url, env, report);
            }
        }

        let mut jobs = Vec::new();
        for plugin in plugins {
            match plugin.source() {
                Ok(PluginSource::Git { url, branch }) => {
                    if let Some(job) = self.plan_clone(plugin, url, branch, report) {
                        jobs.push(job);
                    }
                }
                Ok(PluginSource::Script { .. }) => continue,
                Err(error) => report.failed(Step::Plugin, &plugin.name, error),
            }
        }

        let names = jobs.iter().map(|job| job.name.clone()).collect::<Vec<_>>();
        let tasks = jobs.into_iter().map(|job| {
            let bar = self.bars.add(ProgressBar::new(0));
            tokio::task::spawn_blocking(move || {
                clone_repository(&job.url, job.branch.as_deref(), &job.dest, bar)
            })
        });

        // INVARIANT: Every clone reports, even when its task panics.
        for (name, result) in names.into_iter().zip(join_all(tasks).await) {
            match result {
                Ok(Ok(dest)) => report.done(
                    Step::Plugin,
                    name,
                    format!("cloned into {}", dest.display()),
                ),
                Ok(Err(error)) => report.failed(Step::Plugin, name, error),
                Err(error) => report.failed(Step::Plugin, name, error),
            }
        }
    }

    fn install_script(
        &self,
        plugin: &PluginSpec,
        url: &str,
        env: &BTreeMap<String, String>,
        report: &mut Report,
    ) {
        if Self::is_installed(plugin) {
            report.skipped(Step::Plugin, &plugin.name, "already installed");
            return;
        }

        info!("run installer for {}", plugin.name);
        let result = fetch_script(self.shell, url, &plugin.name).and_then(|script| {
            run_script(
                self.shell,
                &script,
                env.iter().map(|(key, value)| (key.as_str(), value.as_str())),
            )
        });

        match result {
            Err(error) => report.failed(Step::Plugin, &plugin.name, error),
            Ok(()) if self.dry_run => {
                report.done(Step::Plugin, &plugin.name, format!("would run installer {url}"))
            }
            Ok(()) if !Self::is_installed(plugin) => report.failed(
                Step::Plugin,
                &plugin.name,
                format!(
                    "installer finished but {} does not exist",
                    plugin.dest.display()
                ),
            ),
            Ok(()) => report.done(
                Step::Plugin,
                &plugin.name,
                format!("installed into {}", plugin.dest.display()),
            ),
        }
    }

    fn plan_clone(
        &self,
        plugin: &PluginSpec,
        url: &str,
        branch: Option<&str>,
        report: &mut Report,
    ) -> Option<CloneJob> {
        if Self::is_installed(plugin) {
            if Repository::open(&plugin.dest).is_ok() {
                report.skipped(Step::Plugin, &plugin.name, "already cloned");
            } else {
                report.failed(
                    Step::Plugin,
                    &plugin.name,
                    format!(
                        "destination {} occupied by something other than a repository",
                        plugin.dest.display()
                    ),
                );
            }
            return None;
        }

        if self.dry_run {
            info!("dry run: clone {url} into {}", plugin.dest.display());
            report.done(Step::Plugin, &plugin.name, format!("would clone {url}"));
            return None;
        }

        Some(CloneJob {
            name: plugin.name.clone(),
            url: url.to_string(),
            branch: branch.map(ToString::to_string),
            dest: plugin.dest.clone(),
        })
    }
}

#[derive(Debug)]
struct CloneJob {
    name: String,
    url: String,
    branch: Option<String>,
    dest: PathBuf,
}

/// Clone git repository into destination.
///
/// The progress of the clone is displayed through a progress bar. If the
/// remote requires credentials, then the user will be prompted for them
/// accordingly, and the progress bar is blocked for user input.
///
/// # Errors
///
/// - Return [`PluginError::Git2`] if libgit2 operations fail.
/// - Return [`PluginError::CreateParent`] if parent of destination cannot be
///   created.
/// - Return [`PluginError::IndicatifStyleTemplate`] if progress bar style is
///   invalid.
#[instrument(skip(bar), level = "debug")]
pub fn clone_repository(
    url: &str,
    branch: Option<&str>,
    dest: &Path,
    bar: ProgressBar,
) -> Result<PathBuf> {
    let style = ProgressStyle::with_template(
        "{elapsed_precise:.green}  {msg:<50}  [{wide_bar:.yellow/blue}]",
    )?
    .progress_chars("-Cco.");
    bar.set_style(style);
    bar.set_message(url.to_string());
    bar.enable_steady_tick(time::Duration::from_millis(100));

    if let Some(parent) = dest.parent() {
        mkdirp::mkdirp(parent).map_err(|err| PluginError::CreateParent {
            source: err,
            path: parent.to_path_buf(),
        })?;
    }

    let prompter = CredentialPrompter::for_destination(dest, bar);
    let authenticator = GitAuthenticator::default().set_prompter(prompter.clone());
    let config = Config::open_default()?;

    let mut throttle = time::Instant::now();
    let mut rc = RemoteCallbacks::new();
    rc.credentials(authenticator.credentials(&config));
    rc.transfer_progress(|progress| {
        if throttle.elapsed() > time::Duration::from_millis(10) {
            throttle = time::Instant::now();
            prompter.bar.set_length(progress.total_objects() as u64);
            prompter.bar.set_position(progress.received_objects() as u64);
        }
        true
    });

    let mut fo = FetchOptions::new();
    fo.remote_callbacks(rc);

    let mut builder = RepoBuilder::new();
    builder.fetch_options(fo);
    if let Some(branch) = branch {
        builder.branch(branch);
    }

    debug!("clone {url} into {}", dest.display());
    let repository = builder.clone(url, dest)?;
    prompter.bar.finish_and_clear();

    Ok(repository
        .workdir()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| dest.to_path_buf()))
}

/// Ask for plugin credentials while its clone progress bar is suspended.
///
/// A prompt that is cancelled, or cannot be shown at all because there is no
/// terminal, gives up on authentication. The clone then fails with whatever
/// libgit2 reports.
#[derive(Debug, Clone)]
struct CredentialPrompter {
    plugin: String,
    bar: ProgressBar,
}

impl CredentialPrompter {
    /// Name prompts after the directory the plugin is cloned into.
    fn for_destination(dest: &Path, bar: ProgressBar) -> Self {
        let plugin = dest
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| dest.display().to_string());
        Self { plugin, bar }
    }

    fn ask(&self, what: &str, secret: bool) -> Option<String> {
        let message = format!("{} {what}:", self.plugin);
        let answer = self.bar.suspend(|| {
            if secret {
                Password::new(&message).without_confirmation().prompt()
            } else {
                Text::new(&message).prompt()
            }
        });

        match answer {
            Ok(answer) => Some(answer),
            Err(error) => {
                warn!("no {what} given for {}: {error}", self.plugin);
                None
            }
        }
    }
}

impl Prompter for CredentialPrompter {
    #[instrument(skip(self, url, _config), level = "debug")]
    fn prompt_username_password(
        &mut self,
        url: &str,
        _config: &git2::Config,
    ) -> Option<(String, String)> {
        info!("{} needs credentials for {url}", self.plugin);
        let username = self.ask("username", false)?;
        let password = self.ask("password", true)?;
        Some((username, password))
    }

    #[instrument(skip(self, username, url, _config), level = "debug")]
    fn prompt_password(
        &mut self,
        username: &str,
        url: &str,
        _config: &git2::Config,
    ) -> Option<String> {
        info!("{} needs password of {username} for {url}", self.plugin);
        self.ask("password", true)
    }

    #[instrument(skip(self, ssh_key_path, _config), level = "debug")]
    fn prompt_ssh_key_passphrase(
        &mut self,
        ssh_key_path: &Path,
        _config: &git2::Config,
    ) -> Option<String> {
        info!(
            "{} needs passphrase of ssh key {}",
            self.plugin,
            ssh_key_path.display()
        );
        self.ask("ssh key passphrase", true)
    }
}

/// Plugin fetching error types.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),

    /// Style template cannot be set for progress bars.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),

    /// Installer script cannot be fetched or run.
    #[error(transparent)]
    Syscall(#[from] SyscallError),

    /// Parent directory of destination cannot be created.
    #[error("failed to create directory {:?}", path.display())]
    CreateParent {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
type Result<T, E = PluginError> = std::result::Result<T, E>;
