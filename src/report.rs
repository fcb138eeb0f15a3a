//! Output formatting for coverage results.
//!
//! Supports two output formats:
//! - Pretty: colored terminal output for human readability
//! - JSON: structured output for programmatic consumption

use colored::*;
use serde::{Deserialize, Serialize};

use crate::artifact::{ExtractionError, ExtractionResult};
use crate::coverage::{CoverageResult, DimensionCoverage, Gap};
use crate::risk::RiskedArtifact;

/// Gaps shown in pretty output before eliding the rest.
const MAX_PRETTY_GAPS: usize = 10;

/// Extraction errors shown in pretty output before eliding the rest.
const MAX_PRETTY_ERRORS: usize = 5;

// =============================================================================
// JSON Format
// =============================================================================

/// Top-level JSON report.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonReport {
    pub version: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
    pub overall_score: f64,
    pub grade: String,
    pub threshold: f64,
    pub passed: bool,
    pub files_scanned: usize,
    pub artifact_count: usize,
    pub dimensions: Vec<JsonDimension>,
    pub gaps: Vec<Gap>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ExtractionError>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub risks: Vec<JsonRisk>,
}

/// One dimension in the JSON report.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonDimension {
    pub name: String,
    pub scored: bool,
    pub score: f64,
    pub element_coverage: f64,
    pub completeness_coverage: f64,
    pub usefulness_coverage: f64,
    pub weight: f64,
    pub meets_minimum: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_elements: Vec<String>,
}

/// One risky configuration parameter in the JSON report.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRisk {
    pub name: String,
    pub file: String,
    pub line: usize,
    pub score: f64,
    pub factors: Vec<String>,
}

/// Build the JSON report structure.
pub fn build_json(
    path: &str,
    config_path: Option<&str>,
    extraction: &ExtractionResult,
    coverage: &CoverageResult,
    risks: &[RiskedArtifact],
) -> JsonReport {
    let dimensions = coverage.dimensions.iter().map(dimension_to_json).collect();
    let risks = risks
        .iter()
        .map(|r| JsonRisk {
            name: r.artifact.name().to_string(),
            file: r.artifact.file().to_string(),
            line: r.artifact.line(),
            score: r.score,
            factors: r.factors.iter().map(|f| f.as_str().to_string()).collect(),
        })
        .collect();

    JsonReport {
        version: env!("CARGO_PKG_VERSION").to_string(),
        path: path.to_string(),
        config: config_path.map(|c| c.to_string()),
        overall_score: coverage.overall_score,
        grade: coverage.grade.clone(),
        threshold: coverage.threshold,
        passed: coverage.passed,
        files_scanned: extraction.scanned,
        artifact_count: coverage.artifact_count,
        dimensions,
        gaps: coverage.gaps(),
        errors: extraction.errors.clone(),
        risks,
    }
}

/// Write results in JSON format.
pub fn write_json(
    path: &str,
    config_path: Option<&str>,
    extraction: &ExtractionResult,
    coverage: &CoverageResult,
    risks: &[RiskedArtifact],
) -> anyhow::Result<()> {
    let report = build_json(path, config_path, extraction, coverage, risks);
    let json = serde_json::to_string_pretty(&report)?;
    println!("{}", json);
    Ok(())
}

fn dimension_to_json(d: &DimensionCoverage) -> JsonDimension {
    JsonDimension {
        name: d.name.clone(),
        scored: d.scored,
        score: d.dimension_score,
        element_coverage: d.element_coverage,
        completeness_coverage: d.completeness_coverage,
        usefulness_coverage: d.usefulness_coverage,
        weight: d.weight,
        meets_minimum: d.meets_minimum,
        missing_elements: d.missing_elements.clone(),
    }
}

// =============================================================================
// Pretty Format
// =============================================================================

/// Write results in pretty (human-readable) format.
pub fn write_pretty(
    path: &str,
    config_path: Option<&str>,
    extraction: &ExtractionResult,
    coverage: &CoverageResult,
    risks: &[RiskedArtifact],
) {
    // Header
    println!();
    print!("  ");
    print!("{}", "maintcov".cyan().bold());
    println!(" v{}", env!("CARGO_PKG_VERSION"));
    println!();

    print!("  {}", "Scanning: ".dimmed());
    println!("{}", path);
    print!("  {}", "Config:   ".dimmed());
    println!("{}", config_path.unwrap_or("(defaults)"));
    print!("  {}", "Files:    ".dimmed());
    println!("{} scanned, {} artifacts", extraction.scanned, coverage.artifact_count);
    println!();

    write_result_summary(coverage);
    println!();

    write_dimensions(&coverage.dimensions);
    println!();

    let gaps = coverage.gaps();
    if !gaps.is_empty() {
        write_gaps(&gaps);
        println!();
    }

    if !risks.is_empty() {
        write_risks(risks);
        println!();
    }

    if !extraction.errors.is_empty() {
        write_errors(&extraction.errors);
        println!();
    }

    write_final_status(coverage);
    println!();
}

fn write_result_summary(coverage: &CoverageResult) {
    if coverage.passed {
        print!("  {}", "✓ PASS".green());
    } else {
        print!("  {}", "✗ FAIL".red());
    }

    print!("  Coverage: ");
    write_colored_score(coverage.overall_score);
    print!("  Grade: ");
    write_colored_grade(&coverage.grade);
    println!();
}

fn percent(score: f64) -> String {
    format!("{:.1}%", score * 100.0)
}

fn write_colored_score(score: f64) {
    let text = percent(score);
    match score {
        s if s >= 0.9 => print!("{}", text.green().bold()),
        s if s >= 0.8 => print!("{}", text.green()),
        s if s >= 0.7 => print!("{}", text.yellow()),
        s if s >= 0.6 => print!("{}", text.yellow().bold()),
        _ => print!("{}", text.red()),
    }
}

fn write_colored_grade(grade: &str) {
    match grade {
        "A" => print!("{}", grade.green().bold()),
        "B" => print!("{}", grade.green()),
        "C" => print!("{}", grade.yellow()),
        "D" => print!("{}", grade.yellow().bold()),
        _ => print!("{}", grade.red()),
    }
}

fn write_dimensions(dimensions: &[DimensionCoverage]) {
    println!("  {}", "Dimensions:".bold());
    println!(
        "    {:<20} {:>8} {:>9} {:>13} {:>11}",
        "".dimmed(),
        "score".dimmed(),
        "elements".dimmed(),
        "completeness".dimmed(),
        "usefulness".dimmed()
    );

    for d in dimensions {
        if !d.scored {
            println!("    {:<20} {}", d.name, "not scored".dimmed());
            continue;
        }
        print!("    {:<20} ", d.name);
        print!("{:>8} ", percent(d.dimension_score));
        print!("{:>9} ", percent(d.element_coverage));
        print!("{:>13} ", percent(d.completeness_coverage));
        print!("{:>11}", percent(d.usefulness_coverage));
        if !d.meets_minimum {
            print!(
                "  {}",
                format!("below minimum {}", percent(d.minimum_coverage)).red()
            );
        }
        println!();
    }
}

fn write_gaps(gaps: &[Gap]) {
    println!("  {} ({}):", "Gaps".bold(), gaps.len());
    for gap in gaps.iter().take(MAX_PRETTY_GAPS) {
        print!("    {:>6}  ", format!("+{:.1}", gap.impact * 100.0).yellow());
        print!("{:<16}", gap.kind.as_str().dimmed());
        println!("{}", gap);
    }
    if gaps.len() > MAX_PRETTY_GAPS {
        println!(
            "    {}",
            format!("... and {} more", gaps.len() - MAX_PRETTY_GAPS).dimmed()
        );
    }
}

fn write_risks(risks: &[RiskedArtifact]) {
    println!("  {} ({}):", "Riskiest configuration".bold(), risks.len());
    for r in risks {
        let factors: Vec<&str> = r.factors.iter().map(|f| f.as_str()).collect();
        print!("    {:>5}  ", format!("{:.2}", r.score).red());
        print!("{:<28}", r.artifact.name());
        print!("{}", r.artifact.file().blue());
        print!("{}", format!(":{}", r.artifact.line()).dimmed());
        if !factors.is_empty() {
            print!("  {}", factors.join(", ").dimmed());
        }
        println!();
    }
}

fn write_errors(errors: &[ExtractionError]) {
    println!("  {} ({}):", "Extraction errors".dimmed(), errors.len());
    for e in errors.iter().take(MAX_PRETTY_ERRORS) {
        println!("    {} {}", "WARN ".yellow(), e);
    }
    if errors.len() > MAX_PRETTY_ERRORS {
        println!(
            "    {}",
            format!("... and {} more (set MAINTCOV_LOG=warn to see all)", errors.len() - MAX_PRETTY_ERRORS)
                .dimmed()
        );
    }
}

fn write_final_status(coverage: &CoverageResult) {
    print!(
        "  {}",
        format!("Threshold: {}", percent(coverage.threshold)).dimmed()
    );
    print!("  Coverage: ");
    write_colored_score(coverage.overall_score);
    print!("  ");

    if coverage.passed {
        print!("{}", "PASSED".green());
    } else {
        print!("{}", "FAILED".red());
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{Artifact, ArtifactKind};
    use crate::coverage::measure;
    use crate::dimension::default_dimensions;
    use crate::risk;

    #[test]
    fn test_json_report_shape() {
        let mut extraction = ExtractionResult::new();
        extraction.push(
            Artifact::builder(ArtifactKind::ConfigParameter, "API_TOKEN", ".env", 3)
                .sensitive(true)
                .build(),
        );
        extraction.error(".env", Some(7), "unterminated quote");
        extraction.scanned = 1;
        extraction.finalize();

        let coverage = measure(&extraction, &default_dimensions(), 0.85).unwrap();
        let risks = risk::top(&extraction.artifacts, 5);
        let report = build_json(".", None, &extraction, &coverage, &risks);

        assert_eq!(report.files_scanned, 1);
        assert_eq!(report.dimensions.len(), 5);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.risks[0].factors, vec!["undocumented", "sensitive"]);
        assert!(!report.passed);

        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("config").is_none());
        assert_eq!(json["gaps"][0]["kind"], "missing_element");
    }
}
