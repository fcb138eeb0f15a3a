//! Three-tier documentation coverage.
//!
//! For every dimension:
//!
//! 1. **Element coverage**: share of required element categories with at
//!    least one matching artifact anywhere in the project.
//! 2. **Completeness coverage**: for matched artifacts, share of the
//!    category's required fields that are present and non-empty. Averaged
//!    within a category, then across all required categories; a category with
//!    no matches contributes 0.
//! 3. **Usefulness coverage**: heuristic score of the documentation text on
//!    matched artifacts, averaged the same way.
//!
//! The dimension score blends the tiers (default 0.3 / 0.4 / 0.3) and the
//! overall score is the weighted mean of dimension scores. Dimensions without
//! required elements are reported but not scored.

mod usefulness;

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::artifact::{Artifact, ExtractionResult};
use crate::dimension::{validate, validate_threshold, DimensionSpec, SpecError};

pub use usefulness::{Signals, SignalHeuristic, UsefulnessHeuristic, SUBSTANTIVE_CHARS};

/// Default pass/fail threshold for the overall score.
pub const DEFAULT_THRESHOLD: f64 = 0.85;

/// Grade thresholds on the overall score.
pub mod grades {
    pub const A_MIN: f64 = 0.90;
    pub const B_MIN: f64 = 0.80;
    pub const C_MIN: f64 = 0.70;
    pub const D_MIN: f64 = 0.60;
}

/// Relative weights of the three tiers in a dimension score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierWeights {
    pub element: f64,
    pub completeness: f64,
    pub usefulness: f64,
}

impl Default for TierWeights {
    fn default() -> Self {
        Self {
            element: 0.3,
            completeness: 0.4,
            usefulness: 0.3,
        }
    }
}

impl TierWeights {
    pub fn new(element: f64, completeness: f64, usefulness: f64) -> Self {
        Self {
            element,
            completeness,
            usefulness,
        }
    }

    pub fn validate(&self) -> Result<(), SpecError> {
        let weights = [self.element, self.completeness, self.usefulness];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(SpecError::InvalidTierWeights(format!(
                "weights must be finite and >= 0, got {}/{}/{}",
                self.element, self.completeness, self.usefulness
            )));
        }
        if weights.iter().sum::<f64>() <= 0.0 {
            return Err(SpecError::InvalidTierWeights(
                "at least one tier weight must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Blend tier values, normalizing the weights to sum to 1.
    pub fn blend(&self, element: f64, completeness: f64, usefulness: f64) -> f64 {
        let total = self.element + self.completeness + self.usefulness;
        if total <= 0.0 {
            return 0.0;
        }
        let blended = (self.element * element
            + self.completeness * completeness
            + self.usefulness * usefulness)
            / total;
        clamp_unit(blended)
    }
}

/// Coverage of one required element category within a dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementCoverage {
    pub element: String,
    /// Number of artifacts matching the category.
    pub matched: usize,
    /// Number of fields required on each matched artifact.
    pub required_fields: usize,
    pub completeness: f64,
    pub usefulness: f64,
}

/// A required field absent on some matched artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingField {
    pub element: String,
    pub field: String,
    /// Matched artifacts lacking the field.
    pub missing: usize,
    /// Matched artifacts in the category.
    pub matched: usize,
}

/// Coverage of one dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionCoverage {
    pub name: String,
    /// False when the dimension has no required elements.
    pub scored: bool,
    pub element_coverage: f64,
    pub completeness_coverage: f64,
    pub usefulness_coverage: f64,
    pub dimension_score: f64,
    /// Weight after normalization over scored dimensions.
    pub weight: f64,
    pub minimum_coverage: f64,
    pub meets_minimum: bool,
    pub elements: Vec<ElementCoverage>,
    pub missing_elements: Vec<String>,
    pub missing_fields: Vec<MissingField>,
}

impl DimensionCoverage {
    /// Per-category coverage by name.
    pub fn element(&self, name: &str) -> Option<&ElementCoverage> {
        self.elements.iter().find(|e| e.element == name)
    }
}

/// Kind of documentation gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapKind {
    MissingElement,
    MissingField,
}

impl GapKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GapKind::MissingElement => "missing_element",
            GapKind::MissingField => "missing_field",
        }
    }
}

/// One actionable documentation gap with its estimated score impact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gap {
    pub dimension: String,
    pub kind: GapKind,
    pub element: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Estimated gain in overall score if the gap were closed.
    pub impact: f64,
}

impl std::fmt::Display for Gap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{}: {} lacks {}", self.dimension, self.element, field),
            None => write!(f, "{}: no {} found", self.dimension, self.element),
        }
    }
}

/// Project-level coverage result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageResult {
    pub dimensions: Vec<DimensionCoverage>,
    pub overall_score: f64,
    pub grade: String,
    pub threshold: f64,
    pub passed: bool,
    pub tier_weights: TierWeights,
    pub artifact_count: usize,
    pub extraction_error_count: usize,
}

impl CoverageResult {
    pub fn dimension(&self, name: &str) -> Option<&DimensionCoverage> {
        self.dimensions.iter().find(|d| d.name == name)
    }

    /// Scored dimensions below their own minimum.
    pub fn failing_dimensions(&self) -> Vec<&DimensionCoverage> {
        self.dimensions
            .iter()
            .filter(|d| d.scored && !d.meets_minimum)
            .collect()
    }

    /// Gaps ranked by estimated impact, highest first.
    ///
    /// A missing element is worth its dimension's normalized weight divided by
    /// the number of required elements. A missing field is worth the
    /// completeness share of one field, scaled by the fraction of matched
    /// artifacts that lack it.
    pub fn gaps(&self) -> Vec<Gap> {
        let tiers = self.tier_weights;
        let tier_total = tiers.element + tiers.completeness + tiers.usefulness;
        let completeness_share = if tier_total > 0.0 {
            tiers.completeness / tier_total
        } else {
            0.0
        };

        let mut gaps = Vec::new();
        for dim in self.dimensions.iter().filter(|d| d.scored) {
            let n = dim.elements.len().max(1) as f64;
            for element in &dim.missing_elements {
                gaps.push(Gap {
                    dimension: dim.name.clone(),
                    kind: GapKind::MissingElement,
                    element: element.clone(),
                    field: None,
                    impact: dim.weight / n,
                });
            }
            for missing in &dim.missing_fields {
                let declared = dim
                    .element(&missing.element)
                    .map(|e| e.required_fields)
                    .unwrap_or(1)
                    .max(1) as f64;
                let fraction = missing.missing as f64 / missing.matched.max(1) as f64;
                gaps.push(Gap {
                    dimension: dim.name.clone(),
                    kind: GapKind::MissingField,
                    element: missing.element.clone(),
                    field: Some(missing.field.clone()),
                    impact: dim.weight * completeness_share / n / declared * fraction,
                });
            }
        }

        gaps.sort_by(|a, b| {
            b.impact
                .partial_cmp(&a.impact)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.dimension.cmp(&b.dimension))
                .then_with(|| a.element.cmp(&b.element))
                .then_with(|| a.field.cmp(&b.field))
        });
        gaps
    }
}

/// Letter grade for an overall score.
pub fn grade(score: f64) -> String {
    let g = match score {
        s if s >= grades::A_MIN => "A",
        s if s >= grades::B_MIN => "B",
        s if s >= grades::C_MIN => "C",
        s if s >= grades::D_MIN => "D",
        _ => "F",
    };
    g.to_string()
}

/// Weighted mean of `(weight, score)` pairs, 0 when the weights sum to 0.
pub fn weighted_mean(pairs: &[(f64, f64)]) -> f64 {
    let total: f64 = pairs.iter().map(|(w, _)| w).sum();
    if total <= 0.0 {
        return 0.0;
    }
    clamp_unit(pairs.iter().map(|(w, s)| w / total * s).sum())
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Coverage calculator with configurable tier weights and usefulness heuristic.
pub struct Calculator {
    tiers: TierWeights,
    heuristic: Box<dyn UsefulnessHeuristic>,
}

impl Default for Calculator {
    fn default() -> Self {
        Self::new()
    }
}

impl Calculator {
    pub fn new() -> Self {
        Self {
            tiers: TierWeights::default(),
            heuristic: Box::new(SignalHeuristic),
        }
    }

    pub fn with_tier_weights(mut self, tiers: TierWeights) -> Self {
        self.tiers = tiers;
        self
    }

    pub fn with_heuristic(mut self, heuristic: Box<dyn UsefulnessHeuristic>) -> Self {
        self.heuristic = heuristic;
        self
    }

    pub fn tier_weights(&self) -> TierWeights {
        self.tiers
    }

    /// Score a project's extraction against a dimension set.
    ///
    /// Invalid dimension sets are reported before any scoring. Sparse or
    /// empty extraction never fails; it scores zero where nothing matched.
    pub fn measure(
        &self,
        extraction: &ExtractionResult,
        specs: &[DimensionSpec],
        threshold: f64,
    ) -> Result<CoverageResult, SpecError> {
        validate(specs)?;
        validate_threshold(threshold)?;
        self.tiers.validate()?;

        let mut dimensions: Vec<DimensionCoverage> = specs
            .iter()
            .map(|spec| self.measure_dimension(&extraction.artifacts, spec))
            .collect();

        let total_weight: f64 = specs
            .iter()
            .filter(|s| s.is_scored())
            .map(|s| s.weight)
            .sum();
        for (dim, spec) in dimensions.iter_mut().zip(specs) {
            dim.weight = if dim.scored && total_weight > 0.0 {
                spec.weight / total_weight
            } else {
                0.0
            };
        }

        let pairs: Vec<(f64, f64)> = specs
            .iter()
            .zip(&dimensions)
            .filter(|(_, d)| d.scored)
            .map(|(s, d)| (s.weight, d.dimension_score))
            .collect();
        let overall_score = weighted_mean(&pairs);
        let passed = overall_score >= threshold
            && dimensions.iter().all(|d| !d.scored || d.meets_minimum);

        tracing::debug!(
            "overall coverage {:.3} over {} scored dimensions (threshold {:.2}, passed {})",
            overall_score,
            pairs.len(),
            threshold,
            passed
        );

        Ok(CoverageResult {
            dimensions,
            overall_score,
            grade: grade(overall_score),
            threshold,
            passed,
            tier_weights: self.tiers,
            artifact_count: extraction.artifacts.len(),
            extraction_error_count: extraction.errors.len(),
        })
    }

    fn measure_dimension(&self, artifacts: &[Artifact], spec: &DimensionSpec) -> DimensionCoverage {
        let mut coverage = DimensionCoverage {
            name: spec.name.clone(),
            scored: spec.is_scored(),
            element_coverage: 0.0,
            completeness_coverage: 0.0,
            usefulness_coverage: 0.0,
            dimension_score: 0.0,
            weight: 0.0,
            minimum_coverage: spec.minimum_coverage,
            meets_minimum: true,
            elements: Vec::new(),
            missing_elements: Vec::new(),
            missing_fields: Vec::new(),
        };
        if !coverage.scored {
            tracing::debug!("dimension {} has no required elements, not scored", spec.name);
            return coverage;
        }

        for element in &spec.required_elements {
            let matched: Vec<&Artifact> = artifacts
                .iter()
                .filter(|a| a.matches_category(element))
                .collect();
            let fields = spec.fields_for(element);

            if matched.is_empty() {
                coverage.missing_elements.push(element.clone());
                coverage.elements.push(ElementCoverage {
                    element: element.clone(),
                    matched: 0,
                    required_fields: fields.len(),
                    completeness: 0.0,
                    usefulness: 0.0,
                });
                continue;
            }

            let completeness = if fields.is_empty() {
                1.0
            } else {
                mean(matched.iter().map(|a| {
                    let present = fields.iter().filter(|f| a.field(f).is_some()).count();
                    present as f64 / fields.len() as f64
                }))
            };
            for field in &fields {
                let missing = matched.iter().filter(|a| a.field(field).is_none()).count();
                if missing > 0 {
                    coverage.missing_fields.push(MissingField {
                        element: element.clone(),
                        field: field.to_string(),
                        missing,
                        matched: matched.len(),
                    });
                }
            }
            let usefulness = mean(
                matched
                    .iter()
                    .map(|a| clamp_unit(self.heuristic.score(a))),
            );

            coverage.elements.push(ElementCoverage {
                element: element.clone(),
                matched: matched.len(),
                required_fields: fields.len(),
                completeness: clamp_unit(completeness),
                usefulness,
            });
        }

        let n = spec.required_elements.len() as f64;
        let present = coverage.elements.iter().filter(|e| e.matched > 0).count() as f64;
        coverage.element_coverage = clamp_unit(present / n);
        coverage.completeness_coverage =
            clamp_unit(coverage.elements.iter().map(|e| e.completeness).sum::<f64>() / n);
        coverage.usefulness_coverage =
            clamp_unit(coverage.elements.iter().map(|e| e.usefulness).sum::<f64>() / n);
        coverage.dimension_score = self.tiers.blend(
            coverage.element_coverage,
            coverage.completeness_coverage,
            coverage.usefulness_coverage,
        );
        coverage.meets_minimum = coverage.dimension_score >= spec.minimum_coverage;

        tracing::debug!(
            "dimension {}: element {:.2} completeness {:.2} usefulness {:.2} -> {:.3}",
            spec.name,
            coverage.element_coverage,
            coverage.completeness_coverage,
            coverage.usefulness_coverage,
            coverage.dimension_score
        );
        coverage
    }
}

/// Score with the default calculator.
pub fn measure(
    extraction: &ExtractionResult,
    specs: &[DimensionSpec],
    threshold: f64,
) -> Result<CoverageResult, SpecError> {
    Calculator::new().measure(extraction, specs, threshold)
}
