//! Project configuration file (`maintcov.yaml`).
//!
//! Everything is optional: an empty file means the default dimensions, the
//! default threshold and the built-in extractors.

use anyhow::Context;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::coverage::{TierWeights, DEFAULT_THRESHOLD};
use crate::dimension::{self, default_dimensions, validate_threshold, DimensionSpec};
use crate::extract::{ExtractorRegistry, PatternExtractor, PatternSet};

/// Config file names looked for in the project root, in order.
pub const DEFAULT_CONFIG_NAMES: &[&str] = &["maintcov.yaml", ".maintcov.yaml"];

/// A project-specific pattern set and the files it applies to.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CustomPatterns {
    #[serde(flatten)]
    pub set: PatternSet,
    /// File extensions (without the dot) the set runs on.
    pub extensions: Vec<String>,
    #[serde(default = "default_comment_prefixes")]
    pub comment_prefixes: Vec<String>,
}

fn default_comment_prefixes() -> Vec<String> {
    vec!["#".to_string(), "//".to_string()]
}

/// Risk factor weights.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct RiskWeights {
    pub undocumented: f64,
    pub sensitive: f64,
    pub production: f64,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Pass/fail threshold for the overall score (default 0.85)
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub tier_weights: Option<TierWeights>,
    /// Glob patterns for paths to skip (e.g. "**/fixtures/**")
    #[serde(default)]
    pub excluded_paths: Vec<String>,
    /// Inline dimensions; replaces the defaults when non-empty.
    #[serde(default)]
    pub dimensions: Vec<DimensionSpec>,
    /// Dimension file, relative to the config file.
    #[serde(default)]
    pub dimensions_file: Option<PathBuf>,
    #[serde(default)]
    pub custom_patterns: Vec<CustomPatterns>,
    #[serde(default)]
    pub risk_weights: Option<RiskWeights>,
    /// Directory the config was loaded from.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl Config {
    /// Parse configuration from YAML text.
    pub fn parse(yaml: &str) -> anyhow::Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Parse a configuration file.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let mut config =
            Self::parse(&content).with_context(|| format!("parsing config {}", path.display()))?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    /// Find a config file in `root`, if there is one.
    pub fn discover(root: &Path) -> Option<PathBuf> {
        DEFAULT_CONFIG_NAMES
            .iter()
            .map(|name| root.join(name))
            .find(|path| path.is_file())
    }

    /// Effective threshold.
    pub fn threshold(&self) -> f64 {
        self.threshold.unwrap_or(DEFAULT_THRESHOLD)
    }

    pub fn tier_weights(&self) -> TierWeights {
        self.tier_weights.unwrap_or_default()
    }

    /// Effective dimension set: inline dimensions, then the dimension file,
    /// then the built-in defaults.
    pub fn dimensions(&self) -> anyhow::Result<Vec<DimensionSpec>> {
        if !self.dimensions.is_empty() {
            return Ok(self.dimensions.clone());
        }
        match &self.dimensions_file {
            Some(file) => {
                let path = match &self.base_dir {
                    Some(base) if file.is_relative() => base.join(file),
                    _ => file.clone(),
                };
                dimension::load_file(path)
            }
            None => Ok(default_dimensions()),
        }
    }

    /// Matcher for `excluded_paths`.
    pub fn exclusions(&self) -> anyhow::Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.excluded_paths {
            let glob = Glob::new(pattern)
                .with_context(|| format!("invalid excluded_paths pattern {:?}", pattern))?;
            builder.add(glob);
        }
        Ok(builder.build()?)
    }

    /// Built-in extractors with the custom pattern sets ahead of them.
    pub fn registry(&self) -> anyhow::Result<ExtractorRegistry> {
        let mut registry = ExtractorRegistry::with_defaults()?;
        for custom in self.custom_patterns.iter().rev() {
            let extensions: Vec<&str> = custom.extensions.iter().map(String::as_str).collect();
            let prefixes: Vec<&str> = custom.comment_prefixes.iter().map(String::as_str).collect();
            let extractor = PatternExtractor::new(&custom.set.name, &extensions, &prefixes, &custom.set)
                .with_context(|| format!("compiling custom patterns {:?}", custom.set.name))?;
            registry.register_first(Box::new(extractor));
        }
        Ok(registry)
    }
}

/// Check a configuration before use.
pub fn validate(config: &Config) -> anyhow::Result<()> {
    if let Some(threshold) = config.threshold {
        validate_threshold(threshold)?;
    }
    if let Some(tiers) = &config.tier_weights {
        tiers.validate()?;
    }
    if !config.dimensions.is_empty() && config.dimensions_file.is_some() {
        anyhow::bail!("set either dimensions or dimensions_file, not both");
    }
    dimension::validate(&config.dimensions)?;
    for custom in &config.custom_patterns {
        if custom.extensions.is_empty() {
            anyhow::bail!("custom pattern set {:?} has no extensions", custom.set.name);
        }
    }
    config.exclusions()?;
    Ok(())
}
