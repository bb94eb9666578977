//! Composite catalog orchestration
//!
//! A render joins two documents: the catalog configuration names each output
//! catalog, its working directory and the builder schemas it allows; the
//! contribution configuration lists components, each naming its catalog and a
//! build strategy. Components are built one at a time, in document order, and
//! the first failure aborts the render.
//!
//! ```no_run
//! use composer_core::composite::{fetch_catalog_config, fetch_composite_config, Template};
//! use composer_core::composite::ReqwestGetter;
//! use composer_core::context::Context;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let ctx = Context::background();
//! let getter = ReqwestGetter::new()?;
//! let catalogs = fetch_catalog_config(&ctx, "catalogs.yaml", &getter).await?;
//! let contributions = fetch_composite_config(&ctx, "contributions.yaml", &getter).await?;
//!
//! Template::new()
//!     .with_catalog_file(catalogs)
//!     .with_contribution_file(contributions)
//!     .render(&ctx, true)
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod builder;
mod config;
mod fetch;
mod template;

pub use builder::{
    Builder, BuilderConfig, BuilderFactory, BuilderRegistry, CatalogBuilder, BASIC_BUILDER_SCHEMA,
    BUILTIN_BUILDER_SCHEMAS, CUSTOM_BUILDER_SCHEMA, RAW_BUILDER_SCHEMA, SEMVER_BUILDER_SCHEMA,
};
pub use config::{
    parse_catalog_config, parse_composite_config, BuildStrategy, Catalog, CatalogConfig,
    CatalogDestination, Component, ComponentDestination, CompositeConfig, TemplateDefinition,
    CATALOG_SCHEMA, COMPOSITE_SCHEMA,
};
pub use fetch::{fetch_catalog_config, fetch_composite_config, is_remote, HttpGetter, ReqwestGetter};
pub use template::{CatalogBuilderMap, CatalogBuilders, Template};
