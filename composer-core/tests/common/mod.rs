//! Shared helpers for integration tests

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};

use composer_core::image::BundleIndexRegistry;
use tempfile::TempDir;

static INIT: Once = Once::new();

/// Initialize logging for tests (only once per test run)
pub fn init_test_logging() {
    INIT.call_once(|| {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_target(true)
                    .with_level(true),
            )
            .with(tracing_subscriber::filter::EnvFilter::from_default_env())
            .try_init();
    });
}

pub fn fixtures_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

/// A scratch catalog working directory with the fixture contributions
/// copied under `components/`
pub fn create_working_dir() -> TempDir {
    let work = TempDir::new().expect("create temp dir");
    let components = work.path().join("components");
    fs::create_dir_all(&components).expect("create components dir");

    for entry in fs::read_dir(fixtures_dir().join("contributions")).expect("read fixtures") {
        let entry = entry.expect("fixture entry");
        fs::copy(entry.path(), components.join(entry.file_name())).expect("copy fixture");
    }
    work
}

pub fn bundle_index() -> Arc<BundleIndexRegistry> {
    Arc::new(
        BundleIndexRegistry::from_file(&fixtures_dir().join("bundle-index.yaml"))
            .expect("load bundle index"),
    )
}

/// Catalog configuration with a single catalog rooted at `working_dir`
pub fn catalog_config(name: &str, working_dir: &Path, builders: &[&str]) -> String {
    let mut out = format!(
        "schema: olm.composite.catalogs\ncatalogs:\n  - name: {name}\n    destination:\n      \
         baseImage: quay.io/operator-framework/opm:latest\n      workingDir: {}\n    builders:\n",
        working_dir.display()
    );
    for builder in builders {
        out.push_str(&format!("      - {builder}\n"));
    }
    out
}

/// One contribution entry for a composite configuration
pub fn component(catalog: &str, path: &str, schema: &str, config: &str) -> String {
    let mut out = format!(
        "  - name: {catalog}\n    destination:\n      path: {path}\n    strategy:\n      \
         name: {path}\n      template:\n        schema: {schema}\n        config:\n"
    );
    for line in config.lines() {
        out.push_str(&format!("          {line}\n"));
    }
    out
}

pub fn composite_config(components: &[String]) -> String {
    format!("schema: olm.composite\ncomponents:\n{}", components.concat())
}
