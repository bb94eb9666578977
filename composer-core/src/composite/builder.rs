//! Builder strategies and the schema-keyed builder registry

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::config::TemplateDefinition;
use crate::builders::{BasicBuilder, CustomBuilder, RawBuilder, SemverBuilder};
use crate::context::Context;
use crate::declcfg::OutputFormat;
use crate::error::{BuildError, CompositeError};
use crate::image::Registry;

pub const BASIC_BUILDER_SCHEMA: &str = "olm.builder.basic";
pub const SEMVER_BUILDER_SCHEMA: &str = "olm.builder.semver";
pub const RAW_BUILDER_SCHEMA: &str = "olm.builder.raw";
pub const CUSTOM_BUILDER_SCHEMA: &str = "olm.builder.custom";

/// Schemas every registry starts with
pub const BUILTIN_BUILDER_SCHEMAS: [&str; 4] = [
    BASIC_BUILDER_SCHEMA,
    SEMVER_BUILDER_SCHEMA,
    RAW_BUILDER_SCHEMA,
    CUSTOM_BUILDER_SCHEMA,
];

/// Catalog-specific context handed to a builder at construction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuilderConfig {
    /// Catalog working directory; contribution inputs resolve under it
    pub working_dir: PathBuf,

    /// Format of emitted declarative config
    pub output_type: OutputFormat,
}

impl BuilderConfig {
    pub fn new(working_dir: impl Into<PathBuf>, output_type: OutputFormat) -> Self {
        Self {
            working_dir: working_dir.into(),
            output_type,
        }
    }
}

/// Build and validate one component's declarative config
#[async_trait]
pub trait Builder: Send + Sync {
    /// Produce output for `template` under `dir`
    async fn build(
        &self,
        ctx: &Context,
        registry: &dyn Registry,
        dir: &Path,
        template: &TemplateDefinition,
    ) -> Result<(), BuildError>;

    /// Check the output previously written under `dir`
    fn validate(&self, dir: &Path) -> Result<(), BuildError>;
}

/// Every builder a catalog can hold
pub enum CatalogBuilder {
    Raw(RawBuilder),
    Basic(BasicBuilder),
    Semver(SemverBuilder),
    Custom(CustomBuilder),
    /// Dynamically registered builder, used for tests and extensions
    Extension(Box<dyn Builder>),
}

impl CatalogBuilder {
    pub fn kind(&self) -> &'static str {
        match self {
            CatalogBuilder::Raw(_) => "raw",
            CatalogBuilder::Basic(_) => "basic",
            CatalogBuilder::Semver(_) => "semver",
            CatalogBuilder::Custom(_) => "custom",
            CatalogBuilder::Extension(_) => "extension",
        }
    }
}

impl fmt::Debug for CatalogBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CatalogBuilder").field(&self.kind()).finish()
    }
}

#[async_trait]
impl Builder for CatalogBuilder {
    async fn build(
        &self,
        ctx: &Context,
        registry: &dyn Registry,
        dir: &Path,
        template: &TemplateDefinition,
    ) -> Result<(), BuildError> {
        match self {
            CatalogBuilder::Raw(b) => b.build(ctx, registry, dir, template).await,
            CatalogBuilder::Basic(b) => b.build(ctx, registry, dir, template).await,
            CatalogBuilder::Semver(b) => b.build(ctx, registry, dir, template).await,
            CatalogBuilder::Custom(b) => b.build(ctx, registry, dir, template).await,
            CatalogBuilder::Extension(b) => b.build(ctx, registry, dir, template).await,
        }
    }

    fn validate(&self, dir: &Path) -> Result<(), BuildError> {
        match self {
            CatalogBuilder::Raw(b) => b.validate(dir),
            CatalogBuilder::Basic(b) => b.validate(dir),
            CatalogBuilder::Semver(b) => b.validate(dir),
            CatalogBuilder::Custom(b) => b.validate(dir),
            CatalogBuilder::Extension(b) => b.validate(dir),
        }
    }
}

/// Constructor for a builder, given its catalog's configuration
pub type BuilderFactory = Arc<dyn Fn(&BuilderConfig) -> CatalogBuilder + Send + Sync>;

/// Maps builder schemas to constructors
///
/// Resolution performs no I/O; builders touch the filesystem or network only
/// inside `build` and `validate`.
#[derive(Clone)]
pub struct BuilderRegistry {
    factories: HashMap<String, BuilderFactory>,
}

impl Default for BuilderRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for BuilderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuilderRegistry")
            .field("schemas", &self.schemas())
            .finish()
    }
}

impl BuilderRegistry {
    /// A registry with no schemas at all
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// A registry holding the four built-in builders
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(RAW_BUILDER_SCHEMA, |cfg| {
            CatalogBuilder::Raw(RawBuilder::new(cfg.clone()))
        });
        registry.register(BASIC_BUILDER_SCHEMA, |cfg| {
            CatalogBuilder::Basic(BasicBuilder::new(cfg.clone()))
        });
        registry.register(SEMVER_BUILDER_SCHEMA, |cfg| {
            CatalogBuilder::Semver(SemverBuilder::new(cfg.clone()))
        });
        registry.register(CUSTOM_BUILDER_SCHEMA, |cfg| {
            CatalogBuilder::Custom(CustomBuilder::new(cfg.clone()))
        });
        registry
    }

    /// Add or replace the factory for `schema`
    pub fn register<F>(&mut self, schema: &str, factory: F)
    where
        F: Fn(&BuilderConfig) -> CatalogBuilder + Send + Sync + 'static,
    {
        self.factories.insert(schema.to_string(), Arc::new(factory));
    }

    /// Construct the builder registered for `schema`
    pub fn resolve(
        &self,
        schema: &str,
        config: &BuilderConfig,
    ) -> Result<CatalogBuilder, CompositeError> {
        let factory = self
            .factories
            .get(schema)
            .ok_or_else(|| CompositeError::UnknownSchema(schema.to_string()))?;
        Ok(factory(config))
    }

    pub fn contains(&self, schema: &str) -> bool {
        self.factories.contains_key(schema)
    }

    /// Registered schemas, sorted
    pub fn schemas(&self) -> Vec<&str> {
        let mut schemas: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        schemas.sort_unstable();
        schemas
    }
}
