//! Semver builder: synthesizes channels from versioned bundle images
//!
//! Input is an `olm.semver` document listing bundle images per stability
//! tier. Every image is pulled once; each tier becomes one channel (or one
//! channel per major/minor line when requested) whose entries form a strict
//! replaces chain in ascending version order.
//!
//! ```yaml
//! schema: olm.semver
//! stable:
//!   bundles:
//!     - image: quay.io/example/operator-bundle:v1.0.0
//!     - image: quay.io/example/operator-bundle:v1.1.0
//! candidate:
//!   bundles:
//!     - image: quay.io/example/operator-bundle:v1.2.0-rc.1
//! ```

use ::semver::Version;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

use super::{check_schema, decode_config, output_path, read_input, require, validate_dir, write_output};
use crate::composite::{Builder, BuilderConfig, TemplateDefinition, SEMVER_BUILDER_SCHEMA};
use crate::context::Context;
use crate::declcfg::{Channel, ChannelEntry, DeclarativeConfig, Package, SCHEMA_CHANNEL, SCHEMA_PACKAGE};
use crate::error::{BuildError, VersionConflict};
use crate::image::{BundleImage, Registry};

/// Schema tag of the semver input document
pub const SEMVER_TEMPLATE_SCHEMA: &str = "olm.semver";

/// Stability tiers, ordered from lowest to highest default-channel priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stability {
    Candidate,
    Fast,
    Stable,
}

impl Stability {
    /// Highest priority first
    pub const BY_PRIORITY: [Stability; 3] = [Stability::Stable, Stability::Fast, Stability::Candidate];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stability::Candidate => "candidate",
            Stability::Fast => "fast",
            Stability::Stable => "stable",
        }
    }
}

impl fmt::Display for Stability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `config` block of an `olm.builder.semver` template
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct SemverConfig {
    #[serde(default)]
    input: String,
    #[serde(default)]
    output: String,
}

/// The `olm.semver` input document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemverTemplate {
    pub schema: String,

    /// Split each tier into `<tier>-v<major>` channels
    #[serde(default, alias = "generatemajorchannels")]
    pub generate_major_channels: bool,

    /// Split each tier into `<tier>-v<major>.<minor>` channels
    #[serde(default, alias = "generateminorchannels")]
    pub generate_minor_channels: bool,

    #[serde(default)]
    pub candidate: Tier,

    #[serde(default)]
    pub fast: Tier,

    #[serde(default)]
    pub stable: Tier,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    #[serde(default)]
    pub bundles: Vec<BundleRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleRef {
    pub image: String,
}

impl SemverTemplate {
    pub fn tier(&self, stability: Stability) -> &Tier {
        match stability {
            Stability::Candidate => &self.candidate,
            Stability::Fast => &self.fast,
            Stability::Stable => &self.stable,
        }
    }
}

/// A pulled bundle with its parsed version
#[derive(Debug, Clone)]
struct VersionedBundle {
    bundle: BundleImage,
    version: Version,
}

/// Which line of a tier a channel covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelLine {
    All,
    Major(u64),
    Minor(u64, u64),
}

impl Ord for ChannelLine {
    /// Ascending by version; a major channel sorts after its own minors
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialOrd for ChannelLine {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl ChannelLine {
    fn sort_key(&self) -> (u64, u64) {
        match self {
            ChannelLine::All => (u64::MAX, u64::MAX),
            ChannelLine::Major(major) => (*major, u64::MAX),
            ChannelLine::Minor(major, minor) => (*major, *minor),
        }
    }

    fn name(&self, stability: Stability) -> String {
        match self {
            ChannelLine::All => stability.to_string(),
            ChannelLine::Major(major) => format!("{stability}-v{major}"),
            ChannelLine::Minor(major, minor) => format!("{stability}-v{major}.{minor}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SemverBuilder {
    config: BuilderConfig,
}

impl SemverBuilder {
    pub fn new(config: BuilderConfig) -> Self {
        Self { config }
    }

    fn lines(&self, template: &SemverTemplate, version: &Version) -> Vec<ChannelLine> {
        let mut lines = Vec::new();
        if template.generate_major_channels {
            lines.push(ChannelLine::Major(version.major));
        }
        if template.generate_minor_channels {
            lines.push(ChannelLine::Minor(version.major, version.minor));
        }
        if lines.is_empty() {
            lines.push(ChannelLine::All);
        }
        lines
    }

    /// Pull every distinct image once, in document order
    async fn pull_all(
        &self,
        ctx: &Context,
        registry: &dyn Registry,
        template: &SemverTemplate,
    ) -> Result<HashMap<String, VersionedBundle>, BuildError> {
        let mut pulled: HashMap<String, VersionedBundle> = HashMap::new();
        let mut package: Option<String> = None;

        for stability in [Stability::Candidate, Stability::Fast, Stability::Stable] {
            for reference in &template.tier(stability).bundles {
                if pulled.contains_key(&reference.image) {
                    continue;
                }

                debug!("Pulling {} for {} tier", reference.image, stability);
                let bundle = ctx
                    .run(registry.pull(&reference.image))
                    .await?
                    .map_err(|e| BuildError::Pull {
                        image: reference.image.clone(),
                        source: e.into(),
                    })?;

                match &package {
                    None => package = Some(bundle.package.clone()),
                    Some(first) if *first != bundle.package => {
                        return Err(VersionConflict::MultiplePackages {
                            first: first.clone(),
                            second: bundle.package.clone(),
                        }
                        .into());
                    }
                    Some(_) => {}
                }

                let version = Version::parse(&bundle.version).map_err(|source| {
                    BuildError::InvalidVersion {
                        image: reference.image.clone(),
                        version: bundle.version.clone(),
                        source,
                    }
                })?;

                pulled.insert(reference.image.clone(), VersionedBundle { bundle, version });
            }
        }

        Ok(pulled)
    }

    /// Assemble the declarative config for a fully pulled template
    fn synthesize(
        &self,
        template: &SemverTemplate,
        pulled: &HashMap<String, VersionedBundle>,
    ) -> Result<DeclarativeConfig, BuildError> {
        let package = pulled
            .values()
            .next()
            .map(|b| b.bundle.package.clone())
            .ok_or(VersionConflict::NoBundles)?;

        let mut cfg = DeclarativeConfig::new();
        let mut default_channel = None;

        for stability in Stability::BY_PRIORITY {
            let mut lines: BTreeMap<ChannelLine, Vec<&VersionedBundle>> = BTreeMap::new();
            for reference in &template.tier(stability).bundles {
                let bundle = &pulled[&reference.image];
                for line in self.lines(template, &bundle.version) {
                    let members = lines.entry(line).or_default();
                    if !members.iter().any(|m| m.bundle.image == bundle.bundle.image) {
                        members.push(bundle);
                    }
                }
            }

            // Highest line first so the tier's newest channel leads
            for (line, mut members) in lines.into_iter().rev() {
                let name = line.name(stability);
                members.sort_by(|a, b| by_precedence(a, b));

                for pair in members.windows(2) {
                    if pair[0].version.cmp_precedence(&pair[1].version) == Ordering::Equal {
                        return Err(VersionConflict::DuplicateVersion {
                            channel: name,
                            version: pair[0].version.to_string(),
                            first: pair[0].bundle.image.clone(),
                            second: pair[1].bundle.image.clone(),
                        }
                        .into());
                    }
                }

                let entries = replaces_chain(&members);
                if default_channel.is_none() {
                    default_channel = Some(name.clone());
                }
                cfg.channels.push(Channel {
                    schema: SCHEMA_CHANNEL.to_string(),
                    package: package.clone(),
                    name,
                    entries,
                });
            }
        }

        cfg.packages.push(Package {
            schema: SCHEMA_PACKAGE.to_string(),
            name: package,
            default_channel,
            description: None,
        });

        let mut bundles: Vec<&VersionedBundle> = pulled.values().collect();
        bundles.sort_by(|a, b| by_precedence(a, b));
        cfg.bundles = bundles.iter().map(|b| b.bundle.to_bundle()).collect();

        Ok(cfg)
    }
}

/// Semantic version precedence, ignoring build metadata, then image
fn by_precedence(a: &VersionedBundle, b: &VersionedBundle) -> Ordering {
    a.version
        .cmp_precedence(&b.version)
        .then_with(|| a.bundle.image.cmp(&b.bundle.image))
}

/// Entry `i` replaces entry `i - 1`; the first entry replaces nothing
fn replaces_chain(members: &[&VersionedBundle]) -> Vec<ChannelEntry> {
    let mut previous: Option<&str> = None;
    members
        .iter()
        .map(|member| {
            let entry = ChannelEntry {
                name: member.bundle.name.clone(),
                replaces: previous.map(str::to_string),
                skips: Vec::new(),
                skip_range: None,
            };
            previous = Some(member.bundle.name.as_str());
            entry
        })
        .collect()
}

/// Check a channel's replaces chain has no cycles and exactly one head
fn check_channel(channel: &Channel) -> Result<(), BuildError> {
    let invalid = |reason: String| BuildError::InvalidChannel {
        channel: channel.name.clone(),
        reason,
    };

    let mut replaces: HashMap<&str, Option<&str>> = HashMap::new();
    for entry in &channel.entries {
        if replaces
            .insert(entry.name.as_str(), entry.replaces.as_deref())
            .is_some()
        {
            return Err(invalid(format!("duplicate entry {:?}", entry.name)));
        }
    }

    for start in replaces.keys() {
        let mut seen = HashSet::new();
        let mut current = Some(*start);
        while let Some(name) = current {
            if !seen.insert(name) {
                return Err(invalid(format!("replaces chain contains a cycle through {name:?}")));
            }
            current = replaces.get(name).copied().flatten();
        }
    }

    let replaced: HashSet<&str> = replaces.values().filter_map(|r| *r).collect();
    let mut heads: Vec<&str> = replaces
        .keys()
        .copied()
        .filter(|name| !replaced.contains(name))
        .collect();
    heads.sort_unstable();

    if heads.len() != 1 {
        return Err(invalid(format!(
            "expected exactly one channel head, found {}: {:?}",
            heads.len(),
            heads
        )));
    }
    Ok(())
}

#[async_trait]
impl Builder for SemverBuilder {
    async fn build(
        &self,
        ctx: &Context,
        registry: &dyn Registry,
        dir: &Path,
        template: &TemplateDefinition,
    ) -> Result<(), BuildError> {
        check_schema("semver", &template.schema, SEMVER_BUILDER_SCHEMA)?;
        let semver: SemverConfig = decode_config(SEMVER_BUILDER_SCHEMA, &template.config)?;
        require("semver", "input", &semver.input)?;
        require("semver", "output", &semver.output)?;

        let destination = output_path(dir, &semver.output)?;
        let input = self.config.working_dir.join(&semver.input);
        let content = read_input(&input).await?;
        let document: SemverTemplate =
            serde_yaml_ng::from_slice(&content).map_err(|source| BuildError::SemverInput {
                path: input.clone(),
                source,
            })?;
        if document.schema != SEMVER_TEMPLATE_SCHEMA {
            return Err(BuildError::SemverSchema {
                got: document.schema,
                expected: SEMVER_TEMPLATE_SCHEMA,
            });
        }

        let pulled = self.pull_all(ctx, registry, &document).await?;
        let cfg = self.synthesize(&document, &pulled)?;
        let rendered = cfg.render(self.config.output_type)?;
        write_output(&destination, rendered.as_bytes()).await?;

        info!(
            "Synthesized {} channels over {} bundles into {}",
            cfg.channels.len(),
            cfg.bundles.len(),
            destination.display()
        );
        Ok(())
    }

    fn validate(&self, dir: &Path) -> Result<(), BuildError> {
        let cfg = validate_dir(dir)?;
        for channel in &cfg.channels {
            check_channel(channel)?;
        }
        Ok(())
    }
}
