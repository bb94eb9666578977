//! Basic builder: author-composed declarative config, re-serialized

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use super::{check_schema, decode_config, output_path, read_input, require, validate_dir, write_output};
use crate::composite::{Builder, BuilderConfig, TemplateDefinition, BASIC_BUILDER_SCHEMA};
use crate::context::Context;
use crate::declcfg::DeclarativeConfig;
use crate::error::BuildError;
use crate::image::Registry;

/// `config` block of an `olm.builder.basic` template
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BasicConfig {
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub output: String,
}

#[derive(Debug, Clone)]
pub struct BasicBuilder {
    config: BuilderConfig,
}

impl BasicBuilder {
    pub fn new(config: BuilderConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Builder for BasicBuilder {
    async fn build(
        &self,
        _ctx: &Context,
        _registry: &dyn Registry,
        dir: &Path,
        template: &TemplateDefinition,
    ) -> Result<(), BuildError> {
        check_schema("basic", &template.schema, BASIC_BUILDER_SCHEMA)?;
        let basic: BasicConfig = decode_config(BASIC_BUILDER_SCHEMA, &template.config)?;
        require("basic", "input", &basic.input)?;
        require("basic", "output", &basic.output)?;

        let destination = output_path(dir, &basic.output)?;
        let input = self.config.working_dir.join(&basic.input);
        let content =
            String::from_utf8(read_input(&input).await?).map_err(|e| BuildError::ReadInput {
                path: input.clone(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            })?;
        let cfg = DeclarativeConfig::from_str_detect(&content, &input.display().to_string())?;

        let rendered = cfg.render(self.config.output_type)?;
        write_output(&destination, rendered.as_bytes()).await?;

        info!(
            "Wrote {} packages, {} channels, {} bundles to {}",
            cfg.packages.len(),
            cfg.channels.len(),
            cfg.bundles.len(),
            destination.display()
        );
        Ok(())
    }

    fn validate(&self, dir: &Path) -> Result<(), BuildError> {
        validate_dir(dir).map(|_| ())
    }
}
