//! Error types for composite catalog rendering
//!
//! Every error message here is part of the user-facing contract: wrapping
//! variants only prefix context and render their inner error verbatim.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::context::Interrupted;
use crate::declcfg::DeclcfgError;

/// Boxed error used where the underlying cause comes from a collaborator
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while loading configuration and orchestrating a render
#[derive(Error, Debug)]
pub enum CompositeError {
    #[error("opening {document} file {path:?}: {source}")]
    OpenConfig {
        document: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("fetching remote {document} file {url:?}: {source}")]
    FetchRemoteConfig {
        document: &'static str,
        url: String,
        #[source]
        source: BoxError,
    },

    #[error("reading {document}: {source}")]
    ReadConfig {
        document: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("no {0} file provided")]
    MissingConfig(&'static str),

    #[error("unmarshalling {document}: {source}")]
    Unmarshal {
        document: &'static str,
        #[source]
        source: serde_yaml_ng::Error,
    },

    #[error("{document} file has unknown schema, should be {expected:?}")]
    UnknownDocumentSchema {
        document: &'static str,
        expected: &'static str,
    },

    #[error("unknown schema {0:?}")]
    UnknownSchema(String),

    #[error("getting builder {schema:?} for catalog {catalog:?}: {source}")]
    BuilderResolution {
        schema: String,
        catalog: String,
        #[source]
        source: Box<CompositeError>,
    },

    #[error("catalog configuration file field validation failed: \n{0}")]
    FieldValidation(FieldValidationErrors),

    #[error("building component {component:?}: component does not exist in the catalog configuration. Available components are: [{}]", .available.join(" "))]
    ComponentNotFound {
        component: String,
        available: Vec<String>,
    },

    #[error("building component {component:?}: no builder found for template schema {schema:?}")]
    NoBuilderForSchema { component: String, schema: String },

    #[error("building component {component:?}: {source}")]
    Build {
        component: String,
        #[source]
        source: BuildError,
    },

    #[error("validating component {component:?}: {source}")]
    Validate {
        component: String,
        #[source]
        source: BuildError,
    },

    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

/// Field problems for every offending catalog, reported together
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FieldValidationErrors {
    catalogs: Vec<(String, Vec<String>)>,
}

impl FieldValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the problems found for one catalog. Empty lists are ignored.
    pub fn push(&mut self, catalog: &str, problems: Vec<String>) {
        if !problems.is_empty() {
            self.catalogs.push((catalog.to_string(), problems));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.catalogs.is_empty()
    }

    /// Names of the catalogs that failed validation, in document order
    pub fn catalogs(&self) -> impl Iterator<Item = &str> {
        self.catalogs.iter().map(|(name, _)| name.as_str())
    }
}

impl fmt::Display for FieldValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (catalog, problems) in &self.catalogs {
            writeln!(f, "Catalog {catalog}:")?;
            for problem in problems {
                writeln!(f, "  - {problem}")?;
            }
        }
        Ok(())
    }
}

/// Errors returned by a builder's build or validate step
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("schema {got:?} does not match the {kind} template builder schema {expected:?}")]
    SchemaMismatch {
        kind: &'static str,
        got: String,
        expected: &'static str,
    },

    #[error("decoding {schema} configuration: {source}")]
    InvalidConfig {
        schema: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("{kind} template configuration is invalid: {reason}")]
    MissingField { kind: &'static str, reason: String },

    #[error("output path {0:?} escapes the component directory")]
    OutputEscapes(String),

    #[error("reading {}: {source}", .path.display())]
    ReadInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("writing {}: {source}", .path.display())]
    WriteOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing semver template {}: {source}", .path.display())]
    SemverInput {
        path: PathBuf,
        #[source]
        source: serde_yaml_ng::Error,
    },

    #[error("semver template has unknown schema {got:?}, should be {expected:?}")]
    SemverSchema { got: String, expected: &'static str },

    #[error("running command {command:?}: {reason}")]
    ExternalCommand { command: String, reason: String },

    #[error("pulling bundle {image:?}: {source}")]
    Pull {
        image: String,
        #[source]
        source: BoxError,
    },

    #[error("bundle {image:?} has invalid version {version:?}: {source}")]
    InvalidVersion {
        image: String,
        version: String,
        #[source]
        source: semver::Error,
    },

    #[error(transparent)]
    VersionConflict(#[from] VersionConflict),

    #[error("channel {channel:?} is invalid: {reason}")]
    InvalidChannel { channel: String, reason: String },

    #[error(transparent)]
    Declcfg(#[from] DeclcfgError),

    #[error(transparent)]
    Interrupted(#[from] Interrupted),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Conflicts between bundle versions or packages in the semver strategy
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionConflict {
    #[error("semver template contains bundles from multiple packages: {first:?} and {second:?}")]
    MultiplePackages { first: String, second: String },

    #[error("duplicate version {version:?} in channel {channel:?}: bundles {first:?} and {second:?}")]
    DuplicateVersion {
        channel: String,
        version: String,
        first: String,
        second: String,
    },

    #[error("semver template contains no bundles")]
    NoBundles,
}

pub type Result<T> = std::result::Result<T, CompositeError>;
