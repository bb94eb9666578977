//! The render entry point and its catalog builder map

use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::builder::{Builder, BuilderConfig, BuilderRegistry, CatalogBuilder};
use super::config::{
    parse_catalog_config, parse_composite_config, Catalog, CatalogConfig, CompositeConfig,
};
use crate::context::Context;
use crate::declcfg::OutputFormat;
use crate::error::{CompositeError, FieldValidationErrors, Result};
use crate::image::{Registry, UnconfiguredRegistry};

/// Builders resolved for one catalog
#[derive(Debug)]
pub struct CatalogBuilders {
    working_dir: PathBuf,
    builders: HashMap<String, CatalogBuilder>,
}

impl CatalogBuilders {
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn get(&self, schema: &str) -> Option<&CatalogBuilder> {
        self.builders.get(schema)
    }

    /// Schemas this catalog accepts, sorted
    pub fn schemas(&self) -> Vec<&str> {
        let mut schemas: Vec<&str> = self.builders.keys().map(String::as_str).collect();
        schemas.sort_unstable();
        schemas
    }
}

/// Catalog name to its resolved builders
#[derive(Debug, Default)]
pub struct CatalogBuilderMap {
    catalogs: HashMap<String, CatalogBuilders>,
}

impl CatalogBuilderMap {
    pub fn get(&self, catalog: &str) -> Option<&CatalogBuilders> {
        self.catalogs.get(catalog)
    }

    pub fn contains(&self, catalog: &str) -> bool {
        self.catalogs.contains_key(catalog)
    }

    /// Catalog names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.catalogs.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.catalogs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalogs.is_empty()
    }
}

/// A composite render: two root documents plus the collaborators needed to
/// build their components
pub struct Template {
    catalog_file: Option<Box<dyn Read + Send>>,
    contribution_file: Option<Box<dyn Read + Send>>,
    output_type: OutputFormat,
    registry: Arc<dyn Registry>,
    builder_registry: BuilderRegistry,
}

impl Default for Template {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("catalog_file", &self.catalog_file.is_some())
            .field("contribution_file", &self.contribution_file.is_some())
            .field("output_type", &self.output_type)
            .field("registry", &self.registry.name())
            .field("builder_registry", &self.builder_registry)
            .finish()
    }
}

impl Template {
    pub fn new() -> Self {
        Self {
            catalog_file: None,
            contribution_file: None,
            output_type: OutputFormat::default(),
            registry: Arc::new(UnconfiguredRegistry),
            builder_registry: BuilderRegistry::with_builtins(),
        }
    }

    pub fn with_catalog_file(mut self, reader: impl Read + Send + 'static) -> Self {
        self.catalog_file = Some(Box::new(reader));
        self
    }

    pub fn with_contribution_file(mut self, reader: impl Read + Send + 'static) -> Self {
        self.contribution_file = Some(Box::new(reader));
        self
    }

    pub fn with_registry(mut self, registry: Arc<dyn Registry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_output_type(mut self, output_type: OutputFormat) -> Self {
        self.output_type = output_type;
        self
    }

    pub fn with_builder_registry(mut self, builder_registry: BuilderRegistry) -> Self {
        self.builder_registry = builder_registry;
        self
    }

    /// Decode the catalog configuration. The reader is consumed.
    pub fn parse_catalogs_spec(&mut self) -> Result<CatalogConfig> {
        let reader = self
            .catalog_file
            .take()
            .ok_or(CompositeError::MissingConfig("catalog config"))?;
        parse_catalog_config(reader)
    }

    /// Decode the contribution configuration. The reader is consumed.
    pub fn parse_contribution_spec(&mut self) -> Result<CompositeConfig> {
        let reader = self
            .contribution_file
            .take()
            .ok_or(CompositeError::MissingConfig("composite config"))?;
        parse_composite_config(reader)
    }

    pub fn builder_for_schema(&self, schema: &str, config: &BuilderConfig) -> Result<CatalogBuilder> {
        self.builder_registry.resolve(schema, config)
    }

    /// Resolve every catalog's builders
    ///
    /// Destination field problems are collected across all catalogs and
    /// reported together; a schema that fails to resolve aborts immediately.
    pub fn new_catalog_builder_map(
        &self,
        catalogs: &[Catalog],
        output_type: OutputFormat,
    ) -> Result<CatalogBuilderMap> {
        let mut field_errors = FieldValidationErrors::new();
        let mut map = CatalogBuilderMap::default();

        for catalog in catalogs {
            let problems = catalog.field_errors();
            if !problems.is_empty() {
                field_errors.push(&catalog.name, problems);
                continue;
            }

            if map.contains(&catalog.name) {
                warn!(
                    "Catalog {} is declared more than once, keeping the first declaration",
                    catalog.name
                );
                continue;
            }

            let config = BuilderConfig::new(&catalog.destination.working_dir, output_type);
            let mut builders = HashMap::new();
            for schema in &catalog.builders {
                let builder = self.builder_for_schema(schema, &config).map_err(|source| {
                    CompositeError::BuilderResolution {
                        schema: schema.clone(),
                        catalog: catalog.name.clone(),
                        source: Box::new(source),
                    }
                })?;
                builders.insert(schema.clone(), builder);
            }

            debug!(
                "Catalog {} resolved {} builders in {}",
                catalog.name,
                builders.len(),
                catalog.destination.working_dir
            );
            map.catalogs.insert(
                catalog.name.clone(),
                CatalogBuilders {
                    working_dir: config.working_dir,
                    builders,
                },
            );
        }

        if !field_errors.is_empty() {
            return Err(CompositeError::FieldValidation(field_errors));
        }
        Ok(map)
    }

    /// Build, and optionally validate, every component
    pub async fn render(&mut self, ctx: &Context, validate: bool) -> Result<()> {
        ctx.check()?;

        let catalog_config = self.parse_catalogs_spec()?;
        let builder_map = self.new_catalog_builder_map(&catalog_config.catalogs, self.output_type)?;
        let composite_config = self.parse_contribution_spec()?;

        info!(
            "Rendering {} components into {} catalogs",
            composite_config.components.len(),
            builder_map.len()
        );

        for component in &composite_config.components {
            ctx.check()?;

            let catalog = builder_map
                .get(&component.name)
                .ok_or_else(|| CompositeError::ComponentNotFound {
                    component: component.name.clone(),
                    available: builder_map.names(),
                })?;

            let template = &component.strategy.template;
            let builder =
                catalog
                    .get(&template.schema)
                    .ok_or_else(|| CompositeError::NoBuilderForSchema {
                        component: component.name.clone(),
                        schema: template.schema.clone(),
                    })?;

            let dir = catalog.working_dir().join(&component.destination.path);
            debug!(
                "Building component {} with {} builder into {}",
                component.name,
                builder.kind(),
                dir.display()
            );

            builder
                .build(ctx, self.registry.as_ref(), &dir, template)
                .await
                .map_err(|source| CompositeError::Build {
                    component: component.name.clone(),
                    source,
                })?;

            if validate {
                builder
                    .validate(&dir)
                    .map_err(|source| CompositeError::Validate {
                        component: component.name.clone(),
                        source,
                    })?;
            }

            info!("Rendered component {} ({})", component.name, component.strategy.name);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composite::{
        CatalogDestination, TemplateDefinition, BASIC_BUILDER_SCHEMA, CUSTOM_BUILDER_SCHEMA,
        RAW_BUILDER_SCHEMA, SEMVER_BUILDER_SCHEMA,
    };
    use crate::error::BuildError;
    use async_trait::async_trait;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TEST_BUILDER_SCHEMA: &str = "olm.builder.test";

    #[derive(Default, Clone)]
    struct TestBuilder {
        build_should_error: bool,
        validate_should_error: bool,
        validations: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Builder for TestBuilder {
        async fn build(
            &self,
            _ctx: &Context,
            _registry: &dyn Registry,
            _dir: &Path,
            _template: &TemplateDefinition,
        ) -> std::result::Result<(), BuildError> {
            if self.build_should_error {
                return Err(anyhow::anyhow!("build error!").into());
            }
            Ok(())
        }

        fn validate(&self, _dir: &Path) -> std::result::Result<(), BuildError> {
            self.validations.fetch_add(1, Ordering::SeqCst);
            if self.validate_should_error {
                return Err(anyhow::anyhow!("validate error!").into());
            }
            Ok(())
        }
    }

    const RENDER_VALID_CATALOG: &str = r#"
schema: olm.composite.catalogs
catalogs:
  - name: first-catalog
    destination:
      baseImage: quay.io/operator-framework/opm:latest
      workingDir: contributions/first-catalog
    builders:
      - olm.builder.test
"#;

    const RENDER_VALID_COMPOSITE: &str = r#"
schema: olm.composite
components:
  - name: first-catalog
    destination:
      path: my-operator
    strategy:
      name: test
      template:
        schema: olm.builder.test
        config:
          input: components/contribution1.yaml
          output: catalog.yaml
"#;

    fn test_template(builder: TestBuilder, composite: &str) -> Template {
        let mut registry = BuilderRegistry::empty();
        registry.register(TEST_BUILDER_SCHEMA, move |_| {
            CatalogBuilder::Extension(Box::new(builder.clone()))
        });

        Template::new()
            .with_catalog_file(Cursor::new(RENDER_VALID_CATALOG.to_string()))
            .with_contribution_file(Cursor::new(composite.to_string()))
            .with_builder_registry(registry)
    }

    #[tokio::test]
    async fn test_render_success() {
        let builder = TestBuilder::default();
        let validations = builder.validations.clone();

        let mut template = test_template(builder, RENDER_VALID_COMPOSITE);
        template.render(&Context::background(), true).await.unwrap();
        assert_eq!(validations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_render_build_failure() {
        let builder = TestBuilder {
            build_should_error: true,
            ..Default::default()
        };
        let validations = builder.validations.clone();
        let mut template = test_template(builder, RENDER_VALID_COMPOSITE);

        let err = template.render(&Context::background(), true).await.unwrap_err();
        assert_eq!(err.to_string(), "building component \"first-catalog\": build error!");
        assert_eq!(validations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_render_validate_failure() {
        let builder = TestBuilder {
            validate_should_error: true,
            ..Default::default()
        };
        let mut template = test_template(builder, RENDER_VALID_COMPOSITE);

        let err = template.render(&Context::background(), true).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "validating component \"first-catalog\": validate error!"
        );
    }

    #[tokio::test]
    async fn test_render_skips_validation_when_disabled() {
        let builder = TestBuilder {
            validate_should_error: true,
            ..Default::default()
        };
        let validations = builder.validations.clone();
        let mut template = test_template(builder, RENDER_VALID_COMPOSITE);

        template.render(&Context::background(), false).await.unwrap();
        assert_eq!(validations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_render_unknown_component() {
        let composite = RENDER_VALID_COMPOSITE.replace("- name: first-catalog", "- name: invalid");
        let mut template = test_template(TestBuilder::default(), &composite);

        let err = template.render(&Context::background(), true).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "building component \"invalid\": component does not exist in the catalog configuration. \
             Available components are: [first-catalog]"
        );
    }

    #[tokio::test]
    async fn test_render_unknown_template_schema() {
        let composite =
            RENDER_VALID_COMPOSITE.replace("schema: olm.builder.test", "schema: olm.builder.invalid");
        let mut template = test_template(TestBuilder::default(), &composite);

        let err = template.render(&Context::background(), true).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "building component \"first-catalog\": no builder found for template schema \"olm.builder.invalid\""
        );
    }

    #[tokio::test]
    async fn test_render_requires_both_documents() {
        let mut template = Template::new();
        let err = template.render(&Context::background(), true).await.unwrap_err();
        assert_eq!(err.to_string(), "no catalog config file provided");

        let mut template = Template::new().with_catalog_file(Cursor::new(RENDER_VALID_CATALOG));
        let err = template.render(&Context::background(), true).await.unwrap_err();
        assert!(matches!(err, CompositeError::BuilderResolution { .. }));

        let mut template = test_template(TestBuilder::default(), RENDER_VALID_COMPOSITE);
        template.contribution_file = None;
        let err = template.render(&Context::background(), true).await.unwrap_err();
        assert_eq!(err.to_string(), "no composite config file provided");
    }

    #[tokio::test]
    async fn test_render_honours_cancellation() {
        let builder = TestBuilder::default();
        let validations = builder.validations.clone();
        let mut template = test_template(builder, RENDER_VALID_COMPOSITE);

        let ctx = Context::background();
        ctx.cancel();
        let err = template.render(&ctx, true).await.unwrap_err();
        assert_eq!(err.to_string(), "operation cancelled");
        assert_eq!(validations.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_builder_for_schema() {
        let template = Template::new();
        let cfg = BuilderConfig::default();

        for (schema, kind) in [
            (BASIC_BUILDER_SCHEMA, "basic"),
            (SEMVER_BUILDER_SCHEMA, "semver"),
            (RAW_BUILDER_SCHEMA, "raw"),
            (CUSTOM_BUILDER_SCHEMA, "custom"),
        ] {
            assert_eq!(template.builder_for_schema(schema, &cfg).unwrap().kind(), kind);
        }

        let err = template.builder_for_schema("invalid", &cfg).unwrap_err();
        assert_eq!(err.to_string(), "unknown schema \"invalid\"");
    }

    fn catalog(name: &str, destination: CatalogDestination, builders: &[&str]) -> Catalog {
        Catalog {
            name: name.to_string(),
            destination,
            builders: builders.iter().map(|b| b.to_string()).collect(),
        }
    }

    fn destination(working_dir: &str) -> CatalogDestination {
        CatalogDestination {
            base_image: "base".to_string(),
            working_dir: working_dir.to_string(),
        }
    }

    #[test]
    fn test_catalog_builder_map_valid() {
        let template = Template::new();
        let map = template
            .new_catalog_builder_map(
                &[catalog("test-catalog", destination("/"), &[BASIC_BUILDER_SCHEMA])],
                OutputFormat::Yaml,
            )
            .unwrap();

        let builders = map.get("test-catalog").unwrap();
        assert_eq!(builders.working_dir(), Path::new("/"));
        assert_eq!(builders.schemas(), [BASIC_BUILDER_SCHEMA]);
        assert_eq!(builders.get(BASIC_BUILDER_SCHEMA).unwrap().kind(), "basic");
    }

    #[test]
    fn test_catalog_builder_map_invalid_builder() {
        let template = Template::new();
        let err = template
            .new_catalog_builder_map(
                &[catalog("test-catalog", destination("/"), &["invalid"])],
                OutputFormat::Yaml,
            )
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "getting builder \"invalid\" for catalog \"test-catalog\": unknown schema \"invalid\""
        );
    }

    #[test]
    fn test_catalog_builder_map_field_errors() {
        let template = Template::new();
        let err = template
            .new_catalog_builder_map(
                &[catalog(
                    "test-catalog",
                    CatalogDestination::default(),
                    &[BASIC_BUILDER_SCHEMA],
                )],
                OutputFormat::Yaml,
            )
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "catalog configuration file field validation failed: \nCatalog test-catalog:\n  \
             - destination.baseImage must not be an empty string\n  \
             - destination.workingDir must not be an empty string\n"
        );
    }

    #[test]
    fn test_catalog_builder_map_aggregates_field_errors() {
        let template = Template::new();
        let err = template
            .new_catalog_builder_map(
                &[
                    catalog(
                        "first",
                        CatalogDestination {
                            base_image: String::new(),
                            working_dir: "first".to_string(),
                        },
                        &[],
                    ),
                    catalog("fine", destination("fine"), &[BASIC_BUILDER_SCHEMA]),
                    catalog(
                        "second",
                        CatalogDestination {
                            base_image: "base".to_string(),
                            working_dir: String::new(),
                        },
                        &[],
                    ),
                ],
                OutputFormat::Yaml,
            )
            .unwrap_err();

        match err {
            CompositeError::FieldValidation(errors) => {
                assert_eq!(errors.catalogs().collect::<Vec<_>>(), ["first", "second"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_catalog_builder_map_keeps_first_duplicate() {
        let template = Template::new();
        let map = template
            .new_catalog_builder_map(
                &[
                    catalog("dup", destination("first"), &[BASIC_BUILDER_SCHEMA]),
                    catalog("dup", destination("second"), &[RAW_BUILDER_SCHEMA]),
                ],
                OutputFormat::Json,
            )
            .unwrap();

        assert_eq!(map.len(), 1);
        let builders = map.get("dup").unwrap();
        assert_eq!(builders.working_dir(), Path::new("first"));
        assert_eq!(builders.schemas(), [BASIC_BUILDER_SCHEMA]);
    }
}
