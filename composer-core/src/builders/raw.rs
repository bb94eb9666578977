//! Raw builder: copies a declarative config file verbatim

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use super::{check_schema, decode_config, output_path, read_input, require, validate_dir, write_output};
use crate::composite::{Builder, BuilderConfig, TemplateDefinition, RAW_BUILDER_SCHEMA};
use crate::context::Context;
use crate::error::BuildError;
use crate::image::Registry;

/// `config` block of an `olm.builder.raw` template
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawConfig {
    /// Input file, relative to the catalog working directory
    #[serde(default)]
    pub input: String,

    /// Output file, relative to the component directory
    #[serde(default)]
    pub output: String,
}

#[derive(Debug, Clone)]
pub struct RawBuilder {
    config: BuilderConfig,
}

impl RawBuilder {
    pub fn new(config: BuilderConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Builder for RawBuilder {
    async fn build(
        &self,
        _ctx: &Context,
        _registry: &dyn Registry,
        dir: &Path,
        template: &TemplateDefinition,
    ) -> Result<(), BuildError> {
        check_schema("raw", &template.schema, RAW_BUILDER_SCHEMA)?;
        let raw: RawConfig = decode_config(RAW_BUILDER_SCHEMA, &template.config)?;
        require("raw", "input", &raw.input)?;
        require("raw", "output", &raw.output)?;

        let destination = output_path(dir, &raw.output)?;
        let content = read_input(&self.config.working_dir.join(&raw.input)).await?;
        write_output(&destination, &content).await?;

        info!("Copied {} to {}", raw.input, destination.display());
        Ok(())
    }

    fn validate(&self, dir: &Path) -> Result<(), BuildError> {
        validate_dir(dir).map(|_| ())
    }
}
