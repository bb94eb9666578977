//! Declarative config (FBC) document model
//!
//! A declarative config is a stream of typed objects keyed by their `schema`
//! field. Packages, channels and bundles are decoded into typed structs; any
//! other schema is carried through untouched as JSON.
//!
//! ```text
//! ---
//! schema: olm.package
//! name: example-operator
//! defaultChannel: stable
//! ---
//! schema: olm.channel
//! package: example-operator
//! name: stable
//! entries:
//!   - name: example-operator.v1.0.0
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

pub const SCHEMA_PACKAGE: &str = "olm.package";
pub const SCHEMA_CHANNEL: &str = "olm.channel";
pub const SCHEMA_BUNDLE: &str = "olm.bundle";

/// Property type carrying a bundle's package name and version
pub const PROPERTY_PACKAGE: &str = "olm.package";

/// Errors loading, writing or checking declarative config
#[derive(Error, Debug)]
pub enum DeclcfgError {
    #[error("reading {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("walking {}: {source}", .path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("parsing {origin}: {source}")]
    ParseYaml {
        origin: String,
        #[source]
        source: serde_yaml_ng::Error,
    },

    #[error("parsing {origin}: {source}")]
    ParseJson {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("parsing {origin}: object {index} has no string \"schema\" field")]
    MissingSchema { origin: String, index: usize },

    #[error("parsing {origin}: decoding {schema} object {index}: {source}")]
    Decode {
        origin: String,
        schema: String,
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("serializing declarative config: {0}")]
    SerializeYaml(#[from] serde_yaml_ng::Error),

    #[error("serializing declarative config: {0}")]
    SerializeJson(#[from] serde_json::Error),

    #[error("duplicate package {0:?}")]
    DuplicatePackage(String),

    #[error("{kind} {name:?} references unknown package {package:?}")]
    UnknownPackage {
        kind: &'static str,
        name: String,
        package: String,
    },

    #[error("package {package:?} default channel {channel:?} not found")]
    DefaultChannelMissing { package: String, channel: String },

    #[error("unknown output type {0:?}, should be \"yaml\" or \"json\"")]
    UnknownOutputType(String),
}

pub type Result<T> = std::result::Result<T, DeclcfgError>;

/// Serialization format for emitted declarative config
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Yaml,
    Json,
}

impl FromStr for OutputFormat {
    type Err = DeclcfgError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Ok(OutputFormat::Yaml),
            "json" => Ok(OutputFormat::Json),
            _ => Err(DeclcfgError::UnknownOutputType(s.to_string())),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Yaml => f.write_str("yaml"),
            OutputFormat::Json => f.write_str("json"),
        }
    }
}

/// An `olm.package` object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    pub schema: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// An `olm.channel` object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub schema: String,
    pub package: String,
    pub name: String,
    #[serde(default)]
    pub entries: Vec<ChannelEntry>,
}

/// One upgrade edge inside a channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaces: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skips: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_range: Option<String>,
}

/// An `olm.bundle` object
///
/// Author-composed contributions may list bundles by image only, so name and
/// package are optional on input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub schema: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub package: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<Property>,
}

/// A typed bundle property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: Value,
}

/// Value of an `olm.package` property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageProperty {
    pub package_name: String,
    pub version: String,
}

impl Property {
    pub fn package(package_name: &str, version: &str) -> Self {
        Self {
            kind: PROPERTY_PACKAGE.to_string(),
            value: serde_json::json!({
                "packageName": package_name,
                "version": version,
            }),
        }
    }
}

impl Bundle {
    /// Decode every `olm.package` property on this bundle
    pub fn package_properties(&self) -> std::result::Result<Vec<PackageProperty>, serde_json::Error> {
        self.properties
            .iter()
            .filter(|p| p.kind == PROPERTY_PACKAGE)
            .map(|p| serde_json::from_value(p.value.clone()))
            .collect()
    }
}

/// A full declarative config, objects grouped by schema
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeclarativeConfig {
    pub packages: Vec<Package>,
    pub channels: Vec<Channel>,
    pub bundles: Vec<Bundle>,
    pub others: Vec<Value>,
}

impl DeclarativeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a file, or every `.yaml`, `.yml` and `.json` file under a directory
    pub fn load_path(path: &Path) -> Result<Self> {
        if !path.is_dir() {
            return Self::load_file(path);
        }

        let mut cfg = Self::new();
        for entry in walkdir::WalkDir::new(path).sort_by_file_name() {
            let entry = entry.map_err(|source| DeclcfgError::Walk {
                path: path.to_path_buf(),
                source,
            })?;
            if entry.file_type().is_file() && is_config_file(entry.path()) {
                cfg.merge(Self::load_file(entry.path())?);
            }
        }

        debug!(
            "Loaded declarative config from {}: {} packages, {} channels, {} bundles",
            path.display(),
            cfg.packages.len(),
            cfg.channels.len(),
            cfg.bundles.len()
        );
        Ok(cfg)
    }

    /// Load a single file, choosing the decoder from its content
    pub fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| DeclcfgError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_str_detect(&content, &path.display().to_string())
    }

    /// Parse a JSON or YAML stream
    ///
    /// Builders write in the configured output format whatever the output
    /// file is called, so the extension says nothing reliable. A stream whose
    /// first non-whitespace character is `{` is read as JSON.
    pub fn from_str_detect(content: &str, origin: &str) -> Result<Self> {
        if content.trim_start().starts_with('{') {
            Self::from_json_str(content, origin)
        } else {
            Self::from_yaml_str(content, origin)
        }
    }

    /// Parse a (possibly multi-document) YAML stream
    pub fn from_yaml_str(content: &str, origin: &str) -> Result<Self> {
        let mut cfg = Self::new();
        let mut index = 0;
        for document in serde_yaml_ng::Deserializer::from_str(content) {
            let value = Value::deserialize(document).map_err(|source| DeclcfgError::ParseYaml {
                origin: origin.to_string(),
                source,
            })?;
            if value.is_null() {
                continue;
            }
            cfg.push_object(value, origin, index)?;
            index += 1;
        }
        Ok(cfg)
    }

    /// Parse a stream of concatenated JSON objects
    pub fn from_json_str(content: &str, origin: &str) -> Result<Self> {
        let mut cfg = Self::new();
        let stream = serde_json::Deserializer::from_str(content).into_iter::<Value>();
        for (index, value) in stream.enumerate() {
            let value = value.map_err(|source| DeclcfgError::ParseJson {
                origin: origin.to_string(),
                source,
            })?;
            cfg.push_object(value, origin, index)?;
        }
        Ok(cfg)
    }

    fn push_object(&mut self, value: Value, origin: &str, index: usize) -> Result<()> {
        let schema = value
            .get("schema")
            .and_then(Value::as_str)
            .ok_or_else(|| DeclcfgError::MissingSchema {
                origin: origin.to_string(),
                index,
            })?
            .to_string();

        let decode_err = |source| DeclcfgError::Decode {
            origin: origin.to_string(),
            schema: schema.clone(),
            index,
            source,
        };

        match schema.as_str() {
            SCHEMA_PACKAGE => self
                .packages
                .push(serde_json::from_value(value).map_err(decode_err)?),
            SCHEMA_CHANNEL => self
                .channels
                .push(serde_json::from_value(value).map_err(decode_err)?),
            SCHEMA_BUNDLE => self
                .bundles
                .push(serde_json::from_value(value).map_err(decode_err)?),
            _ => self.others.push(value),
        }
        Ok(())
    }

    /// Append all objects of `other`
    pub fn merge(&mut self, other: DeclarativeConfig) {
        self.packages.extend(other.packages);
        self.channels.extend(other.channels);
        self.bundles.extend(other.bundles);
        self.others.extend(other.others);
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
            && self.channels.is_empty()
            && self.bundles.is_empty()
            && self.others.is_empty()
    }

    /// All objects in emission order: packages, channels, bundles, others
    fn objects(&self) -> Result<Vec<Value>> {
        let mut objects = Vec::new();
        for package in &self.packages {
            objects.push(serde_json::to_value(package)?);
        }
        for channel in &self.channels {
            objects.push(serde_json::to_value(channel)?);
        }
        for bundle in &self.bundles {
            objects.push(serde_json::to_value(bundle)?);
        }
        objects.extend(self.others.iter().cloned());
        Ok(objects)
    }

    /// Serialize as a `---`-separated YAML stream
    pub fn to_yaml(&self) -> Result<String> {
        let mut out = String::new();
        for object in self.objects()? {
            out.push_str("---\n");
            out.push_str(&serde_yaml_ng::to_string(&object)?);
        }
        Ok(out)
    }

    /// Serialize as a stream of pretty-printed JSON objects
    pub fn to_json(&self) -> Result<String> {
        let mut out = String::new();
        for object in self.objects()? {
            out.push_str(&serde_json::to_string_pretty(&object)?);
            out.push('\n');
        }
        Ok(out)
    }

    pub fn render(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Yaml => self.to_yaml(),
            OutputFormat::Json => self.to_json(),
        }
    }

    /// Cross-object consistency checks
    ///
    /// Every channel, and every bundle that names a package, must reference a
    /// declared package; a package's default channel must be one of its own.
    pub fn validate(&self) -> Result<()> {
        let mut packages = HashSet::new();
        for package in &self.packages {
            if !packages.insert(package.name.as_str()) {
                return Err(DeclcfgError::DuplicatePackage(package.name.clone()));
            }
        }

        let mut channels = BTreeSet::new();
        for channel in &self.channels {
            if !packages.contains(channel.package.as_str()) {
                return Err(DeclcfgError::UnknownPackage {
                    kind: "channel",
                    name: channel.name.clone(),
                    package: channel.package.clone(),
                });
            }
            channels.insert((channel.package.as_str(), channel.name.as_str()));
        }

        for bundle in &self.bundles {
            if !bundle.package.is_empty() && !packages.contains(bundle.package.as_str()) {
                return Err(DeclcfgError::UnknownPackage {
                    kind: "bundle",
                    name: bundle.name.clone(),
                    package: bundle.package.clone(),
                });
            }
        }

        for package in &self.packages {
            if let Some(default_channel) = &package.default_channel {
                if !channels.contains(&(package.name.as_str(), default_channel.as_str())) {
                    return Err(DeclcfgError::DefaultChannelMissing {
                        package: package.name.clone(),
                        channel: default_channel.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

fn is_config_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml" | "json")
    )
}
