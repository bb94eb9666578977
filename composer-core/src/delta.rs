//! Bundle-level difference between two declarative configs
//!
//! Human-oriented reporting only: bundles are compared by name and the
//! version carried in their `olm.package` property.

use semver::Version;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::declcfg::{DeclarativeConfig, PROPERTY_PACKAGE};

#[derive(Error, Debug)]
pub enum DeltaError {
    #[error("parse properties for bundle {bundle:?}: {source}")]
    ParseProperties {
        bundle: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("bundle {bundle:?} has multiple {property:?} properties, expected exactly 1")]
    PackageCount {
        bundle: String,
        property: &'static str,
    },

    #[error("bundle {bundle:?} has invalid version {version:?}: {source}")]
    InvalidVersion {
        bundle: String,
        version: String,
        #[source]
        source: semver::Error,
    },
}

pub type Result<T> = std::result::Result<T, DeltaError>;

/// Bundle name to version
pub type BundleVersions = BTreeMap<String, Version>;

/// Version of every bundle in `cfg`, keyed by bundle name
pub fn bundle_versions(cfg: &DeclarativeConfig) -> Result<BundleVersions> {
    let mut versions = BundleVersions::new();

    for bundle in &cfg.bundles {
        let packages = bundle
            .package_properties()
            .map_err(|source| DeltaError::ParseProperties {
                bundle: bundle.name.clone(),
                source,
            })?;

        let [package] = packages.as_slice() else {
            return Err(DeltaError::PackageCount {
                bundle: bundle.name.clone(),
                property: PROPERTY_PACKAGE,
            });
        };

        let version = Version::parse(&package.version).map_err(|source| DeltaError::InvalidVersion {
            bundle: bundle.name.clone(),
            version: package.version.clone(),
            source,
        })?;
        versions.insert(bundle.name.clone(), version);
    }

    Ok(versions)
}

/// Entries of `a` that are absent from `b` or carry a different version
pub fn unique(a: &BundleVersions, b: &BundleVersions) -> BundleVersions {
    a.iter()
        .filter(|(name, version)| {
            b.get(*name)
                .map_or(true, |other| other.cmp_precedence(version) != Ordering::Equal)
        })
        .map(|(name, version)| (name.clone(), version.clone()))
        .collect()
}

/// Bundles unique to each side of a comparison
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delta {
    pub left: BundleVersions,
    pub right: BundleVersions,
}

impl Delta {
    pub fn between(left: &DeclarativeConfig, right: &DeclarativeConfig) -> Result<Self> {
        let left = bundle_versions(left)?;
        let right = bundle_versions(right)?;

        Ok(Self {
            left: unique(&left, &right),
            right: unique(&right, &left),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty() && self.right.is_empty()
    }
}
