//! Integration tests for coverage and risk over the fixture project.

use globset::GlobSet;
use std::path::PathBuf;

use maintcov::cli::collect_sources;
use maintcov::coverage::{weighted_mean, Calculator, TierWeights};
use maintcov::dimension::{self, DimensionSpec};
use maintcov::extract::{ExtractorRegistry, Project};
use maintcov::risk::{self, RiskFactor};
use maintcov::{measure, Artifact, ArtifactKind, ExtractionResult};

fn testdata(path: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata").join(path)
}

fn extract_fixture() -> ExtractionResult {
    let registry = ExtractorRegistry::with_defaults().unwrap();
    let files = collect_sources(&testdata("project"), &registry, &GlobSet::empty()).unwrap();
    Project::new(&registry).extract_sources(&files)
}

fn fixture_dimensions() -> Vec<DimensionSpec> {
    dimension::load_file(testdata("dimensions.yaml")).expect("load dimensions")
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn test_fixture_scores_are_bounded() {
    let extraction = extract_fixture();
    let result = measure(&extraction, &fixture_dimensions(), 0.85).unwrap();

    assert!((0.0..=1.0).contains(&result.overall_score));
    for dim in &result.dimensions {
        for value in [
            dim.element_coverage,
            dim.completeness_coverage,
            dim.usefulness_coverage,
            dim.dimension_score,
        ] {
            assert!((0.0..=1.0).contains(&value), "{} out of range", dim.name);
        }
    }

    let notes = result.dimension("notes").unwrap();
    assert!(!notes.scored);
    assert_eq!(notes.weight, 0.0);

    let permissions = result.dimension("permissions").unwrap();
    assert_eq!(permissions.element_coverage, 1.0);

    // Nothing in the fixture takes a lock
    let resilience = result.dimension("resilience").unwrap();
    assert!(resilience.missing_elements.contains(&"lock".to_string()));
    assert!(!resilience.meets_minimum || resilience.dimension_score >= 0.2);
    assert!(result
        .gaps()
        .iter()
        .any(|g| g.dimension == "resilience" && g.element == "lock"));
}

#[test]
fn test_fixture_result_is_reproducible() {
    let first = measure(&extract_fixture(), &fixture_dimensions(), 0.85).unwrap();
    let second = measure(&extract_fixture(), &fixture_dimensions(), 0.85).unwrap();
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn test_empty_extraction_has_zero_element_coverage() {
    let result = measure(&ExtractionResult::new(), &fixture_dimensions(), 0.85).unwrap();
    assert_eq!(result.overall_score, 0.0);
    for dim in result.dimensions.iter().filter(|d| d.scored) {
        assert_eq!(dim.element_coverage, 0.0);
        assert_eq!(dim.missing_elements.len(), dim.elements.len());
    }
}

#[test]
fn test_threshold_equal_to_score_passes() {
    let extraction = extract_fixture();
    let specs = vec![DimensionSpec::new("configuration").require_fields("config-parameter", &["type"])];
    let probe = measure(&extraction, &specs, 0.0).unwrap();
    let exact = measure(&extraction, &specs, probe.overall_score).unwrap();
    assert!(exact.passed);
}

#[test]
fn test_half_complete_fields() {
    let mut extraction = ExtractionResult::new();
    extraction.push(
        Artifact::builder(ArtifactKind::ConfigParameter, "PORT", ".env", 1)
            .field("type", "int")
            .build(),
    );
    extraction.finalize();

    let specs = vec![DimensionSpec::new("configuration")
        .require_fields("config-parameter", &["type", "default"])];
    let result = measure(&extraction, &specs, 0.5).unwrap();
    let dim = result.dimension("configuration").unwrap();
    assert!(approx(dim.completeness_coverage, 0.5));
    assert_eq!(dim.missing_fields.len(), 1);
    assert_eq!(dim.missing_fields[0].field, "default");
}

#[test]
fn test_dimension_weights_three_to_one() {
    assert!(approx(weighted_mean(&[(3.0, 0.9), (1.0, 0.1)]), 0.70));

    // Same numbers through the calculator, element tier only
    let mut extraction = ExtractionResult::new();
    let mut high = DimensionSpec::new("high").weight(3.0);
    let mut low = DimensionSpec::new("low").weight(1.0);
    for i in 0..10 {
        let label = format!("h{}", i);
        high = high.require(label.as_str());
        low = low.require(format!("l{}", i));
        if i < 9 {
            extraction.push(
                Artifact::builder(ArtifactKind::ErrorPattern, label.as_str(), "a.go", i + 1)
                    .label(label.as_str())
                    .build(),
            );
        }
    }
    extraction.push(
        Artifact::builder(ArtifactKind::ErrorPattern, "l0", "a.go", 50)
            .label("l0")
            .build(),
    );
    extraction.finalize();

    let result = Calculator::new()
        .with_tier_weights(TierWeights::new(1.0, 0.0, 0.0))
        .measure(&extraction, &[high, low], 0.7)
        .unwrap();
    assert!(approx(result.overall_score, 0.70));
}

#[test]
fn test_invalid_dimension_file_is_rejected() {
    let err = dimension::parse(
        "dimensions:\n  - name: a\n    required_elements: [permission]\n    required_fields:\n      dependency: [doc]\n",
    )
    .unwrap_err();
    assert!(format!("{:#}", err).contains("not a required element"));
}

#[test]
fn test_fixture_risks() {
    let extraction = extract_fixture();
    let risks = risk::top(&extraction.artifacts, 3);
    assert_eq!(risks.len(), 3);
    assert_eq!(risks[0].artifact.name(), "STRIPE_SECRET_KEY");
    assert_eq!(
        risks[0].factors,
        vec![RiskFactor::Undocumented, RiskFactor::Sensitive]
    );
    assert!(risks.windows(2).all(|w| w[0].score >= w[1].score));
    assert!(risks
        .iter()
        .all(|r| r.artifact.kind() == ArtifactKind::ConfigParameter));
}
