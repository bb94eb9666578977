//! Custom builder: runs an external command and captures its stdout
//!
//! The command runs once per build, in the catalog working directory, with
//! the process's default environment. Validation only re-reads the captured
//! output.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

use super::{check_schema, decode_config, output_path, require, validate_dir, write_output};
use crate::composite::{Builder, BuilderConfig, TemplateDefinition, CUSTOM_BUILDER_SCHEMA};
use crate::context::Context;
use crate::error::BuildError;
use crate::image::Registry;

/// `config` block of an `olm.builder.custom` template
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomConfig {
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub output: String,
}

impl CustomConfig {
    /// The command line, shell-quoted for messages
    pub fn command_line(&self) -> String {
        shell_words::join(std::iter::once(&self.command).chain(self.args.iter()))
    }
}

#[derive(Debug, Clone)]
pub struct CustomBuilder {
    config: BuilderConfig,
}

impl CustomBuilder {
    pub fn new(config: BuilderConfig) -> Self {
        Self { config }
    }

    async fn run(&self, ctx: &Context, custom: &CustomConfig) -> Result<Vec<u8>, BuildError> {
        let command_line = custom.command_line();
        let command_err = |reason: String| BuildError::ExternalCommand {
            command: command_line.clone(),
            reason,
        };

        debug!(
            "Running {} in {}",
            command_line,
            self.config.working_dir.display()
        );

        let child = Command::new(&custom.command)
            .args(&custom.args)
            .current_dir(&self.config.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| command_err(e.to_string()))?;

        let output = ctx
            .run(child.wait_with_output())
            .await?
            .map_err(|e| command_err(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            let reason = if stderr.is_empty() {
                output.status.to_string()
            } else {
                format!("{}: {}", output.status, stderr)
            };
            return Err(command_err(reason));
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl Builder for CustomBuilder {
    async fn build(
        &self,
        ctx: &Context,
        _registry: &dyn Registry,
        dir: &Path,
        template: &TemplateDefinition,
    ) -> Result<(), BuildError> {
        check_schema("custom", &template.schema, CUSTOM_BUILDER_SCHEMA)?;
        let custom: CustomConfig = decode_config(CUSTOM_BUILDER_SCHEMA, &template.config)?;
        require("custom", "command", &custom.command)?;
        require("custom", "output", &custom.output)?;

        let destination = output_path(dir, &custom.output)?;
        let stdout = self.run(ctx, &custom).await?;
        write_output(&destination, &stdout).await?;

        info!(
            "Captured {} bytes from {} into {}",
            stdout.len(),
            custom.command,
            destination.display()
        );
        Ok(())
    }

    fn validate(&self, dir: &Path) -> Result<(), BuildError> {
        validate_dir(dir).map(|_| ())
    }
}
