// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! External process handling.
//!
//! Dotstrap leans on external tools for nearly everything it does: package
//! managers, `curl`, `sh`, and `chsh`. All of them are invoked through the
//! [`Syscall`] trait so callers can swap the real process layer for a dry run
//! that only logs what would happen.

use std::{
    ffi::{OsStr, OsString},
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    process::Command,
};
use tempfile::TempDir;
use tracing::{debug, info, instrument};

/// Command line to hand to an external process.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: OsString,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
}

impl CommandLine {
    /// Construct new command line for target program.
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    /// Append argument.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append listing of arguments.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<OsString>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set environment variable for the process.
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Run the command through another program, e.g., "sudo".
    pub fn wrapped_by(self, wrapper: impl Into<OsString>) -> Self {
        let mut args = Vec::with_capacity(self.args.len() + 1);
        args.push(self.program);
        args.extend(self.args);

        Self {
            program: wrapper.into(),
            args,
            envs: self.envs,
        }
    }

    fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command.envs(self.envs.iter().map(|(key, value)| (key, value)));
        command
    }
}

impl Display for CommandLine {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let mut words = Vec::new();
        for (key, value) in &self.envs {
            words.push(format!("{}={}", key.to_string_lossy(), quote(value)));
        }
        words.push(quote(&self.program));
        words.extend(self.args.iter().map(|arg| quote(arg)));

        fmt.write_str(&words.join(" "))
    }
}

fn quote(word: &OsStr) -> String {
    let word = word.to_string_lossy();
    if word.is_empty() || word.contains(char::is_whitespace) {
        format!("'{word}'")
    } else {
        word.into_owned()
    }
}

/// Layer of indirection for external process calls.
pub trait Syscall {
    /// Run command without blocking on user interaction.
    ///
    /// Output to stdout and stderr is returned together.
    fn run(&self, command: &CommandLine) -> Result<String>;

    /// Run command attached to the terminal of the current process.
    ///
    /// Use this for anything that may prompt, e.g., sudo or chsh.
    fn run_interactive(&self, command: &CommandLine) -> Result<()>;

    /// Locate program on PATH.
    fn find_program(&self, name: &str) -> Option<PathBuf>;
}

/// Real processes through [`std::process::Command`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemShell;

impl Syscall for SystemShell {
    #[instrument(skip(self, command), fields(command = %command), level = "debug")]
    fn run(&self, command: &CommandLine) -> Result<String> {
        let output = command
            .to_command()
            .output()
            .map_err(|err| SyscallError::Spawn {
                source: err,
                program: command.program.to_string_lossy().into_owned(),
            })?;
        let stdout = String::from_utf8_lossy(output.stdout.as_slice()).into_owned();
        let stderr = String::from_utf8_lossy(output.stderr.as_slice()).into_owned();
        let mut message = String::new();

        if !stdout.is_empty() {
            message.push_str(stdout.as_str());
        }

        if !stderr.is_empty() {
            message.push_str(stderr.as_str());
        }

        // INVARIANT: Chomp trailing newlines.
        let message = message.trim_end_matches(['\r', '\n']).to_string();

        if !output.status.success() {
            return Err(SyscallError::Failed {
                command: command.to_string(),
                message,
            });
        }

        Ok(message)
    }

    #[instrument(skip(self, command), fields(command = %command), level = "debug")]
    fn run_interactive(&self, command: &CommandLine) -> Result<()> {
        let status = command
            .to_command()
            .spawn()
            .and_then(|mut child| child.wait())
            .map_err(|err| SyscallError::Spawn {
                source: err,
                program: command.program.to_string_lossy().into_owned(),
            })?;

        if !status.success() {
            return Err(SyscallError::Failed {
                command: command.to_string(),
                message: status.to_string(),
            });
        }

        Ok(())
    }

    fn find_program(&self, name: &str) -> Option<PathBuf> {
        which::which(name).ok()
    }
}

/// Log commands instead of running them.
///
/// Program lookups still go through the wrapped shell so that a dry run
/// reports the same decisions a real run would make.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRun<S = SystemShell> {
    inner: S,
}

impl<S> DryRun<S>
where
    S: Syscall,
{
    /// Construct new dry run over target shell.
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S> Syscall for DryRun<S>
where
    S: Syscall,
{
    fn run(&self, command: &CommandLine) -> Result<String> {
        info!("dry run: {command}");
        Ok(String::new())
    }

    fn run_interactive(&self, command: &CommandLine) -> Result<()> {
        info!("dry run: {command}");
        Ok(())
    }

    fn find_program(&self, name: &str) -> Option<PathBuf> {
        self.inner.find_program(name)
    }
}

/// Installer script downloaded into a private temporary directory.
///
/// The directory is created with a random name readable only by the current
/// user, and is removed together with the script on drop.
#[derive(Debug)]
pub struct InstallerScript {
    dir: TempDir,
    path: PathBuf,
}

impl InstallerScript {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

/// Download installer script to a fresh temporary directory.
///
/// # Errors
///
/// - Return [`SyscallError::TempDir`] if temporary directory cannot be made.
/// - Return [`SyscallError::Failed`] if curl fails.
/// - Return [`SyscallError::Spawn`] if curl cannot be spawned.
pub fn fetch_script(shell: &impl Syscall, url: &str, name: &str) -> Result<InstallerScript> {
    let dir = tempfile::Builder::new()
        .prefix(&format!("dotstrap-{name}-"))
        .tempdir()
        .map_err(|err| SyscallError::TempDir { source: err })?;
    let path = dir.path().join("install.sh");

    debug!("fetch {url} into {}", path.display());
    shell.run(
        &CommandLine::new("curl")
            .args(["-fsSL", url, "-o"])
            .arg(path.as_os_str()),
    )?;

    Ok(InstallerScript { dir, path })
}

/// Run downloaded installer script with `sh`.
///
/// # Errors
///
/// - Return [`SyscallError::Failed`] if script exits with failure.
/// - Return [`SyscallError::Spawn`] if sh cannot be spawned.
pub fn run_script<'a>(
    shell: &impl Syscall,
    script: &InstallerScript,
    envs: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> Result<()> {
    let mut command = CommandLine::new("sh").arg(script.path().as_os_str());
    for (key, value) in envs {
        command = command.env(key, value);
    }

    shell.run_interactive(&command)
}

/// External process error types.
#[derive(Debug, thiserror::Error)]
pub enum SyscallError {
    /// Program could not be started.
    #[error("failed to spawn {program:?}")]
    Spawn {
        #[source]
        source: std::io::Error,
        program: String,
    },

    /// Program exited with failure.
    #[error("command {command:?} failed: {message}")]
    Failed { command: String, message: String },

    /// Temporary directory for downloads could not be created.
    #[error("failed to create temporary directory")]
    TempDir {
        #[source]
        source: std::io::Error,
    },
}

/// Friendly result alias :3
pub type Result<T, E = SyscallError> = std::result::Result<T, E>;
