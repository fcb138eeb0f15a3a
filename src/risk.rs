//! Maintenance risk of configuration parameters.
//!
//! Independent of the dimension-weighted score: a project can list its
//! riskiest undocumented secrets without running the coverage calculator.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::artifact::{Artifact, ArtifactKind, CONTEXT_FIELD};

/// Default weight of each risk factor.
pub mod weights {
    pub const UNDOCUMENTED: f64 = 0.40;
    pub const SENSITIVE: f64 = 0.35;
    pub const PRODUCTION: f64 = 0.25;
}

/// Tokens that mark a production environment.
static PRODUCTION_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:^|[^a-z0-9])(prod|production|prd|live)(?:[^a-z0-9]|$)").unwrap());

/// A condition that raised an artifact's risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFactor {
    Undocumented,
    Sensitive,
    Production,
}

impl RiskFactor {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskFactor::Undocumented => "undocumented",
            RiskFactor::Sensitive => "sensitive",
            RiskFactor::Production => "production",
        }
    }
}

impl std::fmt::Display for RiskFactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A configuration artifact with its risk score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskedArtifact {
    pub artifact: Artifact,
    /// Score in [0, 1].
    pub score: f64,
    pub factors: Vec<RiskFactor>,
}

/// Additive risk scorer with saturation at 1.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskScorer {
    undocumented: f64,
    sensitive: f64,
    production: f64,
}

impl Default for RiskScorer {
    fn default() -> Self {
        Self {
            undocumented: weights::UNDOCUMENTED,
            sensitive: weights::SENSITIVE,
            production: weights::PRODUCTION,
        }
    }
}

impl RiskScorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the factor weights. Negative or non-finite weights count as 0.
    pub fn with_weights(undocumented: f64, sensitive: f64, production: f64) -> Self {
        let sane = |w: f64| if w.is_finite() && w > 0.0 { w } else { 0.0 };
        Self {
            undocumented: sane(undocumented),
            sensitive: sane(sensitive),
            production: sane(production),
        }
    }

    /// Factors that apply to one artifact.
    pub fn factors(&self, artifact: &Artifact) -> Vec<RiskFactor> {
        let mut factors = Vec::new();
        if !artifact.is_documented() {
            factors.push(RiskFactor::Undocumented);
        }
        if artifact.is_sensitive() {
            factors.push(RiskFactor::Sensitive);
        }
        if has_production_indicator(artifact) {
            factors.push(RiskFactor::Production);
        }
        factors
    }

    fn weight(&self, factor: RiskFactor) -> f64 {
        match factor {
            RiskFactor::Undocumented => self.undocumented,
            RiskFactor::Sensitive => self.sensitive,
            RiskFactor::Production => self.production,
        }
    }

    /// Score configuration artifacts, riskiest first.
    ///
    /// Non-configuration artifacts are skipped. Ties are broken by file, line
    /// and name so the order is stable.
    pub fn score(&self, artifacts: &[Artifact]) -> Vec<RiskedArtifact> {
        let mut risked: Vec<RiskedArtifact> = artifacts
            .iter()
            .filter(|a| a.kind() == ArtifactKind::ConfigParameter)
            .map(|a| {
                let factors = self.factors(a);
                let total: f64 = factors.iter().map(|f| self.weight(*f)).sum();
                RiskedArtifact {
                    artifact: a.clone(),
                    score: total.min(1.0),
                    factors,
                }
            })
            .collect();

        risked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.artifact.file().cmp(b.artifact.file()))
                .then_with(|| a.artifact.line().cmp(&b.artifact.line()))
                .then_with(|| a.artifact.name().cmp(b.artifact.name()))
        });
        risked
    }

    /// The `n` riskiest configuration artifacts.
    pub fn top(&self, artifacts: &[Artifact], n: usize) -> Vec<RiskedArtifact> {
        let mut risked = self.score(artifacts);
        risked.truncate(n);
        risked
    }
}

/// Whether the name, surrounding context or file path names a production
/// environment.
pub fn has_production_indicator(artifact: &Artifact) -> bool {
    PRODUCTION_TOKEN.is_match(artifact.name())
        || PRODUCTION_TOKEN.is_match(artifact.file())
        || artifact
            .field(CONTEXT_FIELD)
            .map(|c| PRODUCTION_TOKEN.is_match(c))
            .unwrap_or(false)
}

/// Score with the default weights.
pub fn score(artifacts: &[Artifact]) -> Vec<RiskedArtifact> {
    RiskScorer::default().score(artifacts)
}

/// The `n` riskiest configuration artifacts with the default weights.
pub fn top(artifacts: &[Artifact], n: usize) -> Vec<RiskedArtifact> {
    RiskScorer::default().top(artifacts, n)
}
