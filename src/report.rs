// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Step accounting.
//!
//! Every package, plugin, link, and login shell change is recorded as one
//! [`Entry`]. Failures are tallied instead of propagated, so one broken step
//! never keeps the rest of the bootstrap from running.

use std::fmt::{Display, Formatter, Result as FmtResult};
use tracing::{error, info};

/// Kind of work a step performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Package,
    Plugin,
    Link,
    Shell,
}

impl Display for Step {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(match self {
            Self::Package => "package",
            Self::Plugin => "plugin",
            Self::Link => "link",
            Self::Shell => "shell",
        })
    }
}

/// Result of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done,
    Skipped,
    Failed,
}

/// One recorded step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub step: Step,
    pub name: String,
    pub outcome: Outcome,
    pub detail: String,
}

/// Tally of every step taken during a run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Report {
    entries: Vec<Entry>,
}

impl Report {
    /// Construct new empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record completed step.
    pub fn done(&mut self, step: Step, name: impl Into<String>, detail: impl Into<String>) {
        self.record(step, name.into(), Outcome::Done, detail.into());
    }

    /// Record step that had nothing to do.
    pub fn skipped(&mut self, step: Step, name: impl Into<String>, detail: impl Into<String>) {
        self.record(step, name.into(), Outcome::Skipped, detail.into());
    }

    /// Record failed step.
    pub fn failed(&mut self, step: Step, name: impl Into<String>, detail: impl Display) {
        self.record(step, name.into(), Outcome::Failed, detail.to_string());
    }

    fn record(&mut self, step: Step, name: String, outcome: Outcome, detail: String) {
        match outcome {
            Outcome::Failed => error!("{step} {name}: {detail}"),
            _ => info!("{step} {name}: {detail}"),
        }

        self.entries.push(Entry {
            step,
            name,
            outcome,
            detail,
        });
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Count steps with target outcome.
    pub fn count(&self, outcome: Outcome) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.outcome == outcome)
            .count()
    }

    /// Number of failed steps.
    pub fn failures(&self) -> usize {
        self.count(Outcome::Failed)
    }

    /// Check if every step went through.
    pub fn is_success(&self) -> bool {
        self.failures() == 0
    }
}

impl Display for Report {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        for entry in self.entries.iter().filter(|e| e.outcome == Outcome::Failed) {
            writeln!(fmt, "failed {} {}: {}", entry.step, entry.name, entry.detail)?;
        }

        write!(
            fmt,
            "{} done, {} skipped, {} failed",
            self.count(Outcome::Done),
            self.count(Outcome::Skipped),
            self.failures()
        )
    }
}
