// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::RepoFixture;

use dotstrap::{
    bootstrap::{Bootstrap, Steps},
    config::{LinkSpec, Manifest, PluginSpec, Settings},
    plugins::{clone_repository, PluginInstaller},
    report::{Outcome, Report},
    syscall::SystemShell,
};

use anyhow::Result;
use indicatif::ProgressBar;
use pretty_assertions::assert_eq;
use sealed_test::prelude::*;
use std::{
    fs::{read_link, read_to_string, write},
    path::{Path, PathBuf},
};

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("build runtime")
        .block_on(future)
}

fn payload_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("dotfiles")
}

#[sealed_test]
fn clone_plugin_from_local_remote() -> Result<()> {
    let root = std::env::current_dir()?;
    let remote = RepoFixture::new(root.join("remote/tpm"))?;
    remote.stage_and_commit("tpm", "#!/usr/bin/env bash\n")?;

    let dest = root.join("home/.tmux/plugins/tpm");
    clone_repository(&remote.url(), None, &dest, ProgressBar::hidden())?;

    assert_eq!(read_to_string(dest.join("tpm"))?, "#!/usr/bin/env bash\n");

    Ok(())
}

#[sealed_test]
fn plugin_install_is_idempotent() -> Result<()> {
    let root = std::env::current_dir()?;
    let remote = RepoFixture::new(root.join("remote/zsh-autosuggestions"))?;
    remote.stage_and_commit("zsh-autosuggestions.zsh", "# suggest\n")?;

    let plugins = [PluginSpec {
        name: "zsh-autosuggestions".into(),
        url: Some(remote.url()),
        branch: Some("main".into()),
        dest: root.join("home/.oh-my-zsh/custom/plugins/zsh-autosuggestions"),
        ..Default::default()
    }];

    let installer = PluginInstaller::new(&SystemShell);
    let mut report = Report::new();
    block_on(installer.install_all(&plugins, &mut report));
    assert_eq!(report.count(Outcome::Done), 1);
    assert!(plugins[0].dest.join("zsh-autosuggestions.zsh").exists());

    let mut report = Report::new();
    block_on(installer.install_all(&plugins, &mut report));
    assert_eq!(report.count(Outcome::Skipped), 1);
    assert!(report.is_success());

    Ok(())
}

#[sealed_test]
fn bootstrap_links_and_plugins_then_unlinks() -> Result<()> {
    let root = std::env::current_dir()?;
    let home = root.join("home");
    std::fs::create_dir_all(&home)?;
    write(home.join(".vimrc"), "\" distro default\n")?;

    let remote = RepoFixture::new(root.join("remote/tpm"))?;
    remote.stage_and_commit("tpm", "#!/usr/bin/env bash\n")?;

    let manifest = Manifest {
        settings: Settings::default(),
        packages: Vec::new(),
        plugins: vec![PluginSpec {
            name: "tpm".into(),
            url: Some(remote.url()),
            dest: home.join(".tmux/plugins/tpm"),
            ..Default::default()
        }],
        links: vec![
            LinkSpec::new(".vimrc", home.join(".vimrc")),
            LinkSpec::new(".tmux.conf", home.join(".tmux.conf")),
            LinkSpec::new("nvim", home.join(".config/nvim")),
        ],
    };

    let bootstrap = Bootstrap::new(manifest, payload_dir(), SystemShell);
    let steps = Steps {
        packages: false,
        shell: false,
        ..Steps::all()
    };
    let report = block_on(bootstrap.run(steps));
    assert!(report.is_success(), "{report}");
    assert_eq!(report.count(Outcome::Done), 4);

    assert_eq!(read_link(home.join(".tmux.conf"))?, payload_dir().join(".tmux.conf"));
    assert!(home.join(".config/nvim/lua/keymaps.lua").exists());
    assert!(bootstrap.doctor().iter().all(|check| check.ok));

    let report = bootstrap.unlink_all();
    assert_eq!(report.count(Outcome::Done), 3);
    assert_eq!(read_to_string(home.join(".vimrc"))?, "\" distro default\n");
    assert!(!home.join(".tmux.conf").exists());

    Ok(())
}

#[test]
fn bundled_manifest_matches_payload() -> Result<()> {
    let manifest = Manifest::load(payload_dir().join("dotstrap.toml"))?;
    assert_eq!(manifest, Manifest::builtin()?);

    for link in &manifest.links {
        assert!(
            payload_dir().join(&link.source).exists(),
            "missing payload file {}",
            link.source.display()
        );
    }

    Ok(())
}
