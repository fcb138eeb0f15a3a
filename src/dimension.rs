//! Documentation dimensions.
//!
//! A dimension names one documentation concern (permissions, error handling,
//! configuration, ...), the element categories that must exist for it, the
//! fields each matching artifact should carry, and its weight in the overall
//! score.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::artifact::{ArtifactKind, DOC_FIELD};

/// Errors in caller-supplied dimension specifications.
///
/// These are configuration bugs and are reported before any scoring happens.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpecError {
    #[error("dimension #{index} has an empty name")]
    EmptyName { index: usize },

    #[error("dimension {0:?} is defined more than once")]
    DuplicateName(String),

    #[error("dimension {dimension:?} has invalid weight {weight} (must be finite and >= 0)")]
    InvalidWeight { dimension: String, weight: f64 },

    #[error("dimension {dimension:?} has minimum_coverage {value} outside [0, 1]")]
    InvalidMinimum { dimension: String, value: f64 },

    #[error("dimension {dimension:?} requires fields on {element:?}, which is not a required element")]
    UndefinedElement { dimension: String, element: String },

    #[error("invalid tier weights: {0}")]
    InvalidTierWeights(String),

    #[error("threshold {0} is outside [0, 1]")]
    InvalidThreshold(f64),
}

fn default_weight() -> f64 {
    1.0
}

/// One documentation dimension.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DimensionSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Element categories expected to appear at least once.
    #[serde(default)]
    pub required_elements: BTreeSet<String>,
    /// Fields expected on every artifact of a category.
    #[serde(default)]
    pub required_fields: BTreeMap<String, BTreeSet<String>>,
    /// Per-dimension gate; 0 means scored but never gating.
    #[serde(default)]
    pub minimum_coverage: f64,
    /// Relative weight; normalized by the calculator.
    #[serde(default = "default_weight")]
    pub weight: f64,
}

impl DimensionSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            required_elements: BTreeSet::new(),
            required_fields: BTreeMap::new(),
            minimum_coverage: 0.0,
            weight: default_weight(),
        }
    }

    /// Require an element category.
    pub fn require(mut self, element: impl Into<String>) -> Self {
        self.required_elements.insert(element.into());
        self
    }

    /// Require an element category and fields on each of its artifacts.
    pub fn require_fields(mut self, element: impl Into<String>, fields: &[&str]) -> Self {
        let element = element.into();
        self.required_elements.insert(element.clone());
        self.required_fields
            .entry(element)
            .or_default()
            .extend(fields.iter().map(|f| f.to_string()));
        self
    }

    pub fn weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn minimum(mut self, minimum: f64) -> Self {
        self.minimum_coverage = minimum;
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Fields required on a category (empty when none are declared).
    pub fn fields_for(&self, element: &str) -> Vec<&str> {
        self.required_fields
            .get(element)
            .map(|fields| fields.iter().map(|f| f.as_str()).collect())
            .unwrap_or_default()
    }

    /// Whether the dimension takes part in the weighted score.
    pub fn is_scored(&self) -> bool {
        !self.required_elements.is_empty()
    }
}

/// Check a dimension set before scoring.
pub fn validate(specs: &[DimensionSpec]) -> Result<(), SpecError> {
    let mut seen = HashSet::new();
    for (index, spec) in specs.iter().enumerate() {
        let name = spec.name.trim();
        if name.is_empty() {
            return Err(SpecError::EmptyName { index });
        }
        if !seen.insert(name) {
            return Err(SpecError::DuplicateName(name.to_string()));
        }
        if !spec.weight.is_finite() || spec.weight < 0.0 {
            return Err(SpecError::InvalidWeight {
                dimension: spec.name.clone(),
                weight: spec.weight,
            });
        }
        if !(0.0..=1.0).contains(&spec.minimum_coverage) {
            return Err(SpecError::InvalidMinimum {
                dimension: spec.name.clone(),
                value: spec.minimum_coverage,
            });
        }
        if let Some(element) = spec
            .required_fields
            .keys()
            .find(|e| !spec.required_elements.contains(*e))
        {
            return Err(SpecError::UndefinedElement {
                dimension: spec.name.clone(),
                element: element.clone(),
            });
        }
    }
    Ok(())
}

/// Check a pass/fail threshold.
pub fn validate_threshold(threshold: f64) -> Result<(), SpecError> {
    if threshold.is_finite() && (0.0..=1.0).contains(&threshold) {
        Ok(())
    } else {
        Err(SpecError::InvalidThreshold(threshold))
    }
}

/// The built-in dimension set: one dimension per artifact kind.
pub fn default_dimensions() -> Vec<DimensionSpec> {
    vec![
        DimensionSpec::new("permissions")
            .describe("Cloud permissions the system needs and why")
            .require_fields(ArtifactKind::Permission.as_str(), &["service", "action", DOC_FIELD])
            .weight(1.5),
        DimensionSpec::new("error-handling")
            .describe("Failure modes, retries and recovery behavior")
            .require_fields(ArtifactKind::ErrorPattern.as_str(), &[DOC_FIELD]),
        DimensionSpec::new("state-management")
            .describe("Where state lives and how it is protected")
            .require_fields(ArtifactKind::StateIndicator.as_str(), &[DOC_FIELD]),
        DimensionSpec::new("dependencies")
            .describe("External packages, modules and services")
            .require_fields(ArtifactKind::Dependency.as_str(), &[DOC_FIELD]),
        DimensionSpec::new("configuration")
            .describe("Configuration parameters, their types and defaults")
            .require_fields(
                ArtifactKind::ConfigParameter.as_str(),
                &["type", "default", DOC_FIELD],
            )
            .weight(1.5),
    ]
}

/// On-disk shape of a dimension file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DimensionFile {
    pub dimensions: Vec<DimensionSpec>,
}

/// Parse and validate dimensions from YAML text.
pub fn parse(yaml: &str) -> anyhow::Result<Vec<DimensionSpec>> {
    let file: DimensionFile = serde_yaml::from_str(yaml)?;
    validate(&file.dimensions)?;
    Ok(file.dimensions)
}

/// Load and validate dimensions from a YAML file.
pub fn load_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<DimensionSpec>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading dimension file {}", path.display()))?;
    parse(&content).with_context(|| format!("loading dimensions from {}", path.display()))
}

/// Serialize a dimension set as YAML.
pub fn to_yaml(specs: &[DimensionSpec]) -> anyhow::Result<String> {
    let file = DimensionFile {
        dimensions: specs.to_vec(),
    };
    Ok(serde_yaml::to_string(&file)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_dimensions_are_valid() {
        let specs = default_dimensions();
        assert_eq!(specs.len(), 5);
        validate(&specs).unwrap();
        assert!(specs.iter().all(|s| s.is_scored()));
    }

    #[test]
    fn test_require_fields_implies_element() {
        let spec = DimensionSpec::new("config").require_fields("config-parameter", &["type", "default"]);
        assert!(spec.required_elements.contains("config-parameter"));
        assert_eq!(spec.fields_for("config-parameter"), vec!["default", "type"]);
        assert!(spec.fields_for("permission").is_empty());
    }

    #[test]
    fn test_negative_weight_rejected() {
        let specs = vec![DimensionSpec::new("a").require("permission").weight(-1.0)];
        assert!(matches!(validate(&specs), Err(SpecError::InvalidWeight { .. })));

        let specs = vec![DimensionSpec::new("a").weight(f64::NAN)];
        assert!(matches!(validate(&specs), Err(SpecError::InvalidWeight { .. })));
    }

    #[test]
    fn test_fields_on_undefined_element_rejected() {
        let mut spec = DimensionSpec::new("a").require("permission");
        spec.required_fields
            .insert("dependency".to_string(), ["doc".to_string()].into_iter().collect());
        let err = validate(&[spec]).unwrap_err();
        assert_eq!(
            err,
            SpecError::UndefinedElement {
                dimension: "a".to_string(),
                element: "dependency".to_string()
            }
        );
    }

    #[test]
    fn test_names_must_be_unique_and_present() {
        let specs = vec![DimensionSpec::new("a"), DimensionSpec::new("a")];
        assert_eq!(validate(&specs), Err(SpecError::DuplicateName("a".to_string())));
        assert_eq!(
            validate(&[DimensionSpec::new("  ")]),
            Err(SpecError::EmptyName { index: 0 })
        );
    }

    #[test]
    fn test_minimum_out_of_range_rejected() {
        let specs = vec![DimensionSpec::new("a").minimum(1.5)];
        assert!(matches!(validate(&specs), Err(SpecError::InvalidMinimum { .. })));
    }

    #[test]
    fn test_threshold_bounds() {
        assert!(validate_threshold(0.0).is_ok());
        assert!(validate_threshold(1.0).is_ok());
        assert!(validate_threshold(1.01).is_err());
        assert!(validate_threshold(f64::INFINITY).is_err());
    }

    #[test]
    fn test_parse_yaml_defaults() {
        let yaml = r#"
dimensions:
  - name: runbook
    required_elements: [config-parameter, retry]
    required_fields:
      config-parameter: [type, default]
  - name: secrets
    weight: 3
    minimum_coverage: 0.5
    required_elements: [config-parameter]
"#;
        let specs = parse(yaml).unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].weight, 1.0);
        assert_eq!(specs[0].minimum_coverage, 0.0);
        assert!(specs[0].required_elements.contains("retry"));
        assert_eq!(specs[1].weight, 3.0);
    }

    #[test]
    fn test_load_file_reports_path() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "dimensions:\n  - name: x\n    weight: -2").unwrap();
        let err = load_file(file.path()).unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("invalid weight"), "{}", message);
    }

    #[test]
    fn test_yaml_round_trip_of_defaults() {
        let yaml = to_yaml(&default_dimensions()).unwrap();
        assert_eq!(parse(&yaml).unwrap(), default_dimensions());
    }
}
