//! `delta` subcommand

use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};
use tracing::debug;

use composer_core::declcfg::DeclarativeConfig;
use composer_core::delta::{BundleVersions, Delta};

/// Compare two declarative configs by bundle name and version
///
/// Meant for human reading only; the output format may change.
#[derive(Args, Debug)]
pub struct DeltaArgs {
    /// First declarative config file or directory
    pub left: PathBuf,

    /// Second declarative config file or directory
    pub right: PathBuf,
}

impl DeltaArgs {
    pub fn execute(&self) -> Result<()> {
        let left = load(&self.left)?;
        let right = load(&self.right)?;

        let delta = Delta::between(&left, &right)?;
        print_unique(&self.left, &delta.left);
        print_unique(&self.right, &delta.right);
        Ok(())
    }
}

fn load(path: &Path) -> Result<DeclarativeConfig> {
    let cfg = DeclarativeConfig::load_path(path)
        .with_context(|| format!("Failed to load declarative config: {}", path.display()))?;
    debug!("{} holds {} bundles", path.display(), cfg.bundles.len());
    Ok(cfg)
}

fn print_unique(path: &Path, unique: &BundleVersions) {
    println!("unique entries for {:?}", path.display().to_string());
    for (name, version) in unique {
        println!("--> {name} / {version}");
    }
}
