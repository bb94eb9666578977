//! Built-in builder strategies
//!
//! | Schema               | Builder           | Input                          |
//! |----------------------|-------------------|--------------------------------|
//! | `olm.builder.raw`    | [`RawBuilder`]    | declarative config, copied     |
//! | `olm.builder.basic`  | [`BasicBuilder`]  | declarative config, normalised |
//! | `olm.builder.semver` | [`SemverBuilder`] | `olm.semver` bundle list       |
//! | `olm.builder.custom` | [`CustomBuilder`] | external command stdout        |
//!
//! Inputs resolve under the catalog working directory; outputs are written
//! under the component directory and may not escape it.

mod basic;
mod custom;
mod raw;
mod semver;

pub use basic::{BasicBuilder, BasicConfig};
pub use custom::{CustomBuilder, CustomConfig};
pub use raw::{RawBuilder, RawConfig};
pub use semver::{SemverBuilder, SemverTemplate, Stability, SEMVER_TEMPLATE_SCHEMA};

use serde::de::DeserializeOwned;
use std::path::{Component, Path, PathBuf};

use crate::declcfg::DeclarativeConfig;
use crate::error::BuildError;

/// Reject a template whose schema belongs to another builder
fn check_schema(kind: &'static str, got: &str, expected: &'static str) -> Result<(), BuildError> {
    if got != expected {
        return Err(BuildError::SchemaMismatch {
            kind,
            got: got.to_string(),
            expected,
        });
    }
    Ok(())
}

/// Decode a builder's opaque configuration into its typed form
fn decode_config<T: DeserializeOwned>(
    schema: &'static str,
    config: &serde_json::Value,
) -> Result<T, BuildError> {
    serde_json::from_value(config.clone())
        .map_err(|source| BuildError::InvalidConfig { schema, source })
}

fn require(kind: &'static str, field: &str, value: &str) -> Result<(), BuildError> {
    if value.trim().is_empty() {
        return Err(BuildError::MissingField {
            kind,
            reason: format!("{field} must not be empty"),
        });
    }
    Ok(())
}

/// Resolve `output` under `dir`, refusing paths that leave it
fn output_path(dir: &Path, output: &str) -> Result<PathBuf, BuildError> {
    let relative = Path::new(output);
    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(BuildError::OutputEscapes(output.to_string()));
    }
    Ok(dir.join(relative))
}

async fn read_input(path: &Path) -> Result<Vec<u8>, BuildError> {
    tokio::fs::read(path)
        .await
        .map_err(|source| BuildError::ReadInput {
            path: path.to_path_buf(),
            source,
        })
}

async fn write_output(path: &Path, content: &[u8]) -> Result<(), BuildError> {
    let write_err = |source| BuildError::WriteOutput {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }
    tokio::fs::write(path, content).await.map_err(write_err)?;

    tracing::debug!("Wrote {} bytes to {}", content.len(), path.display());
    Ok(())
}

/// Re-parse everything under `dir` and run the model checks
fn validate_dir(dir: &Path) -> Result<DeclarativeConfig, BuildError> {
    let cfg = DeclarativeConfig::load_path(dir)?;
    cfg.validate()?;
    Ok(cfg)
}
