// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Login shell management.

use crate::{
    report::{Report, Step},
    syscall::{CommandLine, Syscall},
};

use std::path::Path;
use tracing::{info, instrument};

/// Change the user's login shell through chsh.
#[derive(Debug)]
pub struct LoginShell<'a, S>
where
    S: Syscall,
{
    shell: &'a S,
}

impl<'a, S> LoginShell<'a, S>
where
    S: Syscall,
{
    pub fn new(shell: &'a S) -> Self {
        Self { shell }
    }

    /// Check if current login shell is already target shell.
    ///
    /// Compares program names only, so `/bin/zsh` and `/usr/bin/zsh` both
    /// count as "zsh".
    pub fn is_current(name: &str, current: Option<&str>) -> bool {
        current
            .and_then(|path| Path::new(path).file_name())
            .is_some_and(|file_name| file_name == name)
    }

    /// Make target shell the login shell.
    ///
    /// The `current` shell normally comes from `$SHELL`.
    #[instrument(skip(self, report), level = "debug")]
    pub fn ensure(&self, name: &str, current: Option<&str>, report: &mut Report) {
        if Self::is_current(name, current) {
            report.skipped(Step::Shell, name, "already the login shell");
            return;
        }

        let Some(path) = self.shell.find_program(name) else {
            report.failed(Step::Shell, name, format!("{name} is not installed"));
            return;
        };

        info!("change login shell to {}", path.display());
        let command = CommandLine::new("chsh").arg("-s").arg(path.as_os_str());
        match self.shell.run_interactive(&command) {
            Ok(()) => report.done(
                Step::Shell,
                name,
                format!("login shell set to {}, log in again to use it", path.display()),
            ),
            Err(error) => report.failed(Step::Shell, name, error),
        }
    }
}
