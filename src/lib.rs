//! Maintcov - maintenance documentation coverage.
//!
//! Maintcov extracts operational facts from a project (cloud permissions,
//! failure handling, state, external dependencies, configuration parameters)
//! and scores how well they are documented.
//!
//! # Architecture
//!
//! - `artifact`: Extracted facts and per-project extraction results
//! - `extract`: Extractor trait, registry, built-in extractors and the
//!   parallel project driver
//! - `dimension`: Dimension specifications and their validation
//! - `coverage`: Three-tier coverage calculator and ranked gaps
//! - `risk`: Risk ranking of configuration parameters
//! - `config`: `maintcov.yaml` schema
//! - `report`: Output formatting (text, JSON)
//!
//! # Adding a New Dialect
//!
//! Pattern-only dialects need a YAML pattern set (see
//! `src/extract/library/`) and a [`PatternExtractor`]. Dialects with a parse
//! tree implement [`Extractor`] directly and register it in
//! [`ExtractorRegistry::with_defaults`].

pub mod artifact;
pub mod cli;
pub mod config;
pub mod coverage;
pub mod dimension;
pub mod extract;
pub mod report;
pub mod risk;

pub use artifact::{Artifact, ArtifactKind, ExtractionError, ExtractionResult};
pub use config::Config;
pub use coverage::{measure, Calculator, CoverageResult, Gap, TierWeights};
pub use dimension::{default_dimensions, DimensionSpec, SpecError};
pub use extract::{Extractor, ExtractorRegistry, PatternExtractor, Project, SourceFile};
pub use risk::{RiskScorer, RiskedArtifact};
