//! End-to-end renders over a scratch working directory

mod common;

use std::io::Cursor;
use std::time::Duration;

use composer_core::composite::{
    fetch_catalog_config, fetch_composite_config, HttpGetter, Template, BASIC_BUILDER_SCHEMA,
    CUSTOM_BUILDER_SCHEMA, RAW_BUILDER_SCHEMA, SEMVER_BUILDER_SCHEMA,
};
use composer_core::context::Context;
use composer_core::declcfg::{DeclarativeConfig, OutputFormat};
use composer_core::error::CompositeError;
use pretty_assertions::assert_eq;

use common::{bundle_index, catalog_config, component, composite_config, create_working_dir};

const ALL_BUILDERS: [&str; 4] = [
    RAW_BUILDER_SCHEMA,
    BASIC_BUILDER_SCHEMA,
    SEMVER_BUILDER_SCHEMA,
    CUSTOM_BUILDER_SCHEMA,
];

fn template(catalogs: String, composite: String) -> Template {
    Template::new()
        .with_catalog_file(Cursor::new(catalogs))
        .with_contribution_file(Cursor::new(composite))
        .with_registry(bundle_index())
}

#[tokio::test]
async fn test_render_raw_basic_and_semver_components() {
    common::init_test_logging();
    let work = create_working_dir();

    let catalogs = catalog_config("my-catalog", work.path(), &ALL_BUILDERS);
    let composite = composite_config(&[
        component(
            "my-catalog",
            "raw-operator",
            RAW_BUILDER_SCHEMA,
            "input: components/raw.yaml\noutput: catalog.yaml",
        ),
        component(
            "my-catalog",
            "basic-operator",
            BASIC_BUILDER_SCHEMA,
            "input: components/basic.yaml\noutput: catalog.yaml",
        ),
        component(
            "my-catalog",
            "example-operator",
            SEMVER_BUILDER_SCHEMA,
            "input: components/semver.yaml\noutput: catalog.yaml",
        ),
    ]);

    template(catalogs, composite)
        .render(&Context::background(), true)
        .await
        .unwrap();

    let raw = std::fs::read_to_string(work.path().join("raw-operator/catalog.yaml")).unwrap();
    let raw_input = std::fs::read_to_string(work.path().join("components/raw.yaml")).unwrap();
    assert_eq!(raw, raw_input);

    let basic = DeclarativeConfig::load_path(&work.path().join("basic-operator")).unwrap();
    assert_eq!(basic.packages[0].name, "basic-operator");
    assert_eq!(basic.channels[0].entries.len(), 2);
    assert_eq!(basic.bundles.len(), 2);

    let semver = DeclarativeConfig::load_path(&work.path().join("example-operator")).unwrap();
    assert_eq!(semver.packages[0].name, "example-operator");
    assert_eq!(semver.packages[0].default_channel.as_deref(), Some("stable"));
    let channels: Vec<&str> = semver.channels.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(channels, vec!["stable", "candidate"]);
    assert_eq!(
        semver.channels[0].entries[1].replaces.as_deref(),
        Some("example-operator.v1.0.0")
    );
    assert_eq!(semver.bundles.len(), 3);
    assert_eq!(semver.bundles[1].properties[1].kind, "olm.gvk");
}

#[tokio::test]
async fn test_render_writes_json_when_requested() {
    common::init_test_logging();
    let work = create_working_dir();

    let catalogs = catalog_config("my-catalog", work.path(), &[BASIC_BUILDER_SCHEMA]);
    let composite = composite_config(&[component(
        "my-catalog",
        "basic-operator",
        BASIC_BUILDER_SCHEMA,
        "input: components/basic.yaml\noutput: catalog.json",
    )]);

    template(catalogs, composite)
        .with_output_type(OutputFormat::Json)
        .render(&Context::background(), true)
        .await
        .unwrap();

    let written = std::fs::read_to_string(work.path().join("basic-operator/catalog.json")).unwrap();
    let first: serde_json::Value = serde_json::Deserializer::from_str(&written)
        .into_iter()
        .next()
        .unwrap()
        .unwrap();
    assert_eq!(first["schema"], "olm.package");
    assert_eq!(first["defaultChannel"], "fast");
}

#[tokio::test]
async fn test_render_json_output_under_yaml_names_validates() {
    common::init_test_logging();
    let work = create_working_dir();

    let catalogs = catalog_config("my-catalog", work.path(), &ALL_BUILDERS);
    let composite = composite_config(&[
        component(
            "my-catalog",
            "basic-operator",
            BASIC_BUILDER_SCHEMA,
            "input: components/basic.yaml\noutput: catalog.yaml",
        ),
        component(
            "my-catalog",
            "example-operator",
            SEMVER_BUILDER_SCHEMA,
            "input: components/semver.yaml\noutput: catalog.yaml",
        ),
    ]);

    template(catalogs, composite)
        .with_output_type(OutputFormat::Json)
        .render(&Context::background(), true)
        .await
        .unwrap();

    let written = std::fs::read_to_string(work.path().join("example-operator/catalog.yaml")).unwrap();
    assert!(written.starts_with('{'));

    let semver = DeclarativeConfig::load_path(&work.path().join("example-operator")).unwrap();
    assert_eq!(semver.packages[0].default_channel.as_deref(), Some("stable"));
    assert_eq!(semver.bundles.len(), 3);

    let basic = DeclarativeConfig::load_path(&work.path().join("basic-operator")).unwrap();
    assert_eq!(basic.packages[0].name, "basic-operator");
}

#[tokio::test]
async fn test_render_reports_invalid_output() {
    common::init_test_logging();
    let work = create_working_dir();

    let catalogs = catalog_config("my-catalog", work.path(), &[RAW_BUILDER_SCHEMA]);
    let composite = composite_config(&[component(
        "my-catalog",
        "ghost-operator",
        RAW_BUILDER_SCHEMA,
        "input: components/broken.yaml\noutput: catalog.yaml",
    )]);

    let err = template(catalogs.clone(), composite.clone())
        .render(&Context::background(), true)
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "validating component \"my-catalog\": channel \"stable\" references unknown package \"ghost-operator\""
    );

    // The same contribution passes when validation is disabled
    template(catalogs, composite)
        .render(&Context::background(), false)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_render_stops_at_first_failure() {
    common::init_test_logging();
    let work = create_working_dir();

    let catalogs = catalog_config("my-catalog", work.path(), &[RAW_BUILDER_SCHEMA]);
    let composite = composite_config(&[
        component(
            "my-catalog",
            "missing-operator",
            RAW_BUILDER_SCHEMA,
            "input: components/missing.yaml\noutput: catalog.yaml",
        ),
        component(
            "my-catalog",
            "raw-operator",
            RAW_BUILDER_SCHEMA,
            "input: components/raw.yaml\noutput: catalog.yaml",
        ),
    ]);

    let err = template(catalogs, composite)
        .render(&Context::background(), true)
        .await
        .unwrap_err();
    assert!(matches!(err, CompositeError::Build { .. }));
    assert!(err
        .to_string()
        .starts_with("building component \"my-catalog\": reading "));
    assert!(!work.path().join("raw-operator").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_render_custom_component() {
    common::init_test_logging();
    let work = create_working_dir();

    let catalogs = catalog_config("my-catalog", work.path(), &ALL_BUILDERS);
    let composite = composite_config(&[component(
        "my-catalog",
        "basic-operator",
        CUSTOM_BUILDER_SCHEMA,
        "command: cat\nargs:\n  - components/basic.yaml\noutput: catalog.yaml",
    )]);

    template(catalogs, composite)
        .render(&Context::background(), true)
        .await
        .unwrap();

    let cfg = DeclarativeConfig::load_path(&work.path().join("basic-operator")).unwrap();
    assert_eq!(cfg.packages[0].name, "basic-operator");
}

#[cfg(unix)]
#[tokio::test]
async fn test_render_custom_component_deadline() {
    common::init_test_logging();
    let work = create_working_dir();

    let catalogs = catalog_config("my-catalog", work.path(), &[CUSTOM_BUILDER_SCHEMA]);
    let composite = composite_config(&[component(
        "my-catalog",
        "slow-operator",
        CUSTOM_BUILDER_SCHEMA,
        "command: sleep\nargs:\n  - \"10\"\noutput: catalog.yaml",
    )]);

    let ctx = Context::background().with_timeout(Duration::from_millis(200));
    let err = template(catalogs, composite).render(&ctx, true).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "building component \"my-catalog\": deadline exceeded"
    );
}

struct StaticGetter(String);

#[async_trait::async_trait]
impl HttpGetter for StaticGetter {
    async fn get(&self, _url: &str) -> anyhow::Result<Vec<u8>> {
        Ok(self.0.clone().into_bytes())
    }
}

#[tokio::test]
async fn test_render_from_fetched_configs() {
    common::init_test_logging();
    let work = create_working_dir();
    let ctx = Context::background();

    let catalogs_path = work.path().join("catalogs.yaml");
    std::fs::write(
        &catalogs_path,
        catalog_config("my-catalog", work.path(), &[RAW_BUILDER_SCHEMA]),
    )
    .unwrap();
    let getter = StaticGetter(composite_config(&[component(
        "my-catalog",
        "raw-operator",
        RAW_BUILDER_SCHEMA,
        "input: components/raw.yaml\noutput: catalog.yaml",
    )]));

    let catalogs = fetch_catalog_config(&ctx, catalogs_path.to_str().unwrap(), &getter)
        .await
        .unwrap();
    let contributions =
        fetch_composite_config(&ctx, "https://example.com/contributions.yaml", &getter)
            .await
            .unwrap();

    Template::new()
        .with_catalog_file(catalogs)
        .with_contribution_file(contributions)
        .render(&ctx, true)
        .await
        .unwrap();

    assert!(work.path().join("raw-operator/catalog.yaml").exists());
}
