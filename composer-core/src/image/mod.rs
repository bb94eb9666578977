//! Image registry collaborator
//!
//! Builders pull bundle images through the [`Registry`] trait. Transport is
//! out of scope here: the crate ships an offline [`BundleIndexRegistry`] that
//! answers pulls from a bundle index file, and an [`UnconfiguredRegistry`]
//! that refuses every pull.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::declcfg::{Bundle, Property, SCHEMA_BUNDLE};

/// Metadata extracted from a pulled bundle image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleImage {
    /// Image reference the bundle was pulled from
    pub image: String,

    /// Bundle name (e.g. `example-operator.v1.2.0`)
    pub name: String,

    /// Owning package
    pub package: String,

    /// Semantic version string
    pub version: String,

    /// Additional properties beyond `olm.package`
    #[serde(default)]
    pub properties: Vec<Property>,
}

impl BundleImage {
    /// Convert to an `olm.bundle` object, prepending the `olm.package` property
    pub fn to_bundle(&self) -> Bundle {
        let mut properties = vec![Property::package(&self.package, &self.version)];
        properties.extend(self.properties.iter().cloned());

        Bundle {
            schema: SCHEMA_BUNDLE.to_string(),
            name: self.name.clone(),
            package: self.package.clone(),
            image: self.image.clone(),
            properties,
        }
    }
}

/// Capability to pull bundle images
#[async_trait]
pub trait Registry: Send + Sync {
    /// Pull `image` and return its bundle metadata
    async fn pull(&self, image: &str) -> Result<BundleImage>;

    /// Registry identifier for logging
    fn name(&self) -> &'static str;
}

/// Registry used when none has been configured
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredRegistry;

#[async_trait]
impl Registry for UnconfiguredRegistry {
    async fn pull(&self, image: &str) -> Result<BundleImage> {
        anyhow::bail!("no image registry configured, cannot pull {image:?}")
    }

    fn name(&self) -> &'static str {
        "unconfigured"
    }
}

/// Offline registry backed by a list of known bundles
///
/// The index file is a YAML or JSON list of [`BundleImage`] entries:
///
/// ```yaml
/// - image: quay.io/example/operator-bundle:v1.0.0
///   name: example-operator.v1.0.0
///   package: example-operator
///   version: 1.0.0
/// ```
#[derive(Debug, Default, Clone)]
pub struct BundleIndexRegistry {
    bundles: HashMap<String, BundleImage>,
}

impl BundleIndexRegistry {
    pub fn from_entries(entries: impl IntoIterator<Item = BundleImage>) -> Self {
        Self {
            bundles: entries
                .into_iter()
                .map(|bundle| (bundle.image.clone(), bundle))
                .collect(),
        }
    }

    /// Parse an index from YAML (JSON is accepted as a YAML subset)
    pub fn from_yaml(content: &str) -> Result<Self> {
        let entries: Vec<BundleImage> =
            serde_yaml_ng::from_str(content).context("Invalid bundle index")?;
        Ok(Self::from_entries(entries))
    }

    /// Load an index file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read bundle index: {}", path.display()))?;

        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse bundle index: {}", path.display()))
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }
}

#[async_trait]
impl Registry for BundleIndexRegistry {
    async fn pull(&self, image: &str) -> Result<BundleImage> {
        tracing::debug!("Resolving {} from bundle index", image);
        self.bundles
            .get(image)
            .cloned()
            .with_context(|| format!("image {image:?} not found in bundle index"))
    }

    fn name(&self) -> &'static str {
        "bundle-index"
    }
}
