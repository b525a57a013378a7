// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Workstation bootstrap from a dotfiles repository.
//!
//! Dotstrap takes a fresh machine to a usable shell environment in one pass.
//! It detects the operating system, installs a short list of packages through
//! the platform package manager (or Homebrew), fetches shell and tmux plugins,
//! and symlinks static configuration files from a dotfiles directory into the
//! user's home directory.
//!
//! # Bootstrap Manifest
//!
//! Everything dotstrap does is described by a __bootstrap manifest__, a small
//! TOML file listing packages, plugins, and links. A default manifest ships
//! with the binary. See [`config::Manifest`] for the layout.
//!
//! # Step Accounting
//!
//! Each unit of work, e.g., one package, one plugin, one link, is recorded in
//! a [`report::Report`] as done, skipped, or failed. A failure never aborts
//! the remaining work. The caller decides what to do with the tally at the
//! end.
//!
//! # External Tools
//!
//! Dotstrap does not manage packages or implement plugin frameworks. Package
//! managers, `curl`, `sh`, and `chsh` are invoked as subprocesses through the
//! [`syscall::Syscall`] seam.

pub mod bootstrap;
pub mod config;
pub mod link;
pub mod packages;
pub mod path;
pub mod platform;
pub mod plugins;
pub mod report;
pub mod shell;
pub mod syscall;
