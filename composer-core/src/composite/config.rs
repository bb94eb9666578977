//! Catalog and contribution configuration documents
//!
//! Two root documents drive a render: the catalog configuration
//! (`olm.composite.catalogs`) declares output catalogs and the builders they
//! may use, the contribution configuration (`olm.composite`) lists the
//! components to build into them.

use serde::{Deserialize, Serialize};
use std::io::Read;

use crate::error::{CompositeError, Result};

/// Schema tag of the catalog configuration document
pub const CATALOG_SCHEMA: &str = "olm.composite.catalogs";

/// Schema tag of the contribution configuration document
pub const COMPOSITE_SCHEMA: &str = "olm.composite";

/// Root catalog configuration document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub schema: String,
    #[serde(default)]
    pub catalogs: Vec<Catalog>,
}

/// A named output catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub name: String,
    #[serde(default)]
    pub destination: CatalogDestination,
    #[serde(default)]
    pub builders: Vec<String>,
}

/// Where a catalog is assembled
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogDestination {
    /// Runtime base image for the catalog
    #[serde(default)]
    pub base_image: String,

    /// Root under which contribution inputs resolve
    #[serde(default)]
    pub working_dir: String,
}

impl Catalog {
    /// Destination problems, in a stable order
    pub fn field_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.destination.base_image.is_empty() {
            errors.push("destination.baseImage must not be an empty string".to_string());
        }
        if self.destination.working_dir.is_empty() {
            errors.push("destination.workingDir must not be an empty string".to_string());
        }
        errors
    }
}

/// Root contribution configuration document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeConfig {
    pub schema: String,
    #[serde(default)]
    pub components: Vec<Component>,
}

/// One contribution, joined to a catalog by name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    #[serde(default)]
    pub destination: ComponentDestination,
    pub strategy: BuildStrategy,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentDestination {
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildStrategy {
    pub name: String,
    pub template: TemplateDefinition,
}

/// Builder selector plus its opaque configuration
///
/// `config` is decoded lazily by the builder that owns `schema`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateDefinition {
    pub schema: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

/// Decode and schema-check a catalog configuration document
pub fn parse_catalog_config(reader: impl Read) -> Result<CatalogConfig> {
    let config: CatalogConfig =
        serde_yaml_ng::from_reader(reader).map_err(|source| CompositeError::Unmarshal {
            document: "catalog config",
            source,
        })?;

    if config.schema != CATALOG_SCHEMA {
        return Err(CompositeError::UnknownDocumentSchema {
            document: "catalog configuration",
            expected: CATALOG_SCHEMA,
        });
    }

    Ok(config)
}

/// Decode and schema-check a contribution configuration document
pub fn parse_composite_config(reader: impl Read) -> Result<CompositeConfig> {
    let config: CompositeConfig =
        serde_yaml_ng::from_reader(reader).map_err(|source| CompositeError::Unmarshal {
            document: "composite config",
            source,
        })?;

    if config.schema != COMPOSITE_SCHEMA {
        return Err(CompositeError::UnknownDocumentSchema {
            document: "composite configuration",
            expected: COMPOSITE_SCHEMA,
        });
    }

    Ok(config)
}
