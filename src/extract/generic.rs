//! Pattern-driven extractor for dialects without a parse tree.

use crate::artifact::{ArtifactKind, ExtractionResult};

use super::patterns::{builtin_pattern_set, CompiledPatternSet, PatternSet};
use super::{file_extension, Extractor, SourceText};

/// Extensions handled by the built-in application source extractor.
const APP_SOURCE_EXTENSIONS: &[&str] = &[
    "js", "jsx", "mjs", "cjs", "ts", "tsx", "go", "java", "kt", "rb", "scala",
];

/// Runs one compiled [`PatternSet`] over files with the given extensions.
pub struct PatternExtractor {
    name: String,
    extensions: Vec<String>,
    comment_prefixes: Vec<String>,
    patterns: CompiledPatternSet,
}

impl PatternExtractor {
    /// Build an extractor from a pattern set.
    pub fn new(
        name: impl Into<String>,
        extensions: &[&str],
        comment_prefixes: &[&str],
        set: &PatternSet,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            name: name.into(),
            extensions: extensions.iter().map(|e| e.to_lowercase()).collect(),
            comment_prefixes: comment_prefixes.iter().map(|p| p.to_string()).collect(),
            patterns: set.compile()?,
        })
    }

    /// The built-in extractor for JavaScript, TypeScript, Go, Java and Ruby.
    pub fn app_source() -> anyhow::Result<Self> {
        let set = builtin_pattern_set("app-source")?;
        Self::new("app-source", APP_SOURCE_EXTENSIONS, &["//", "#", "*", "/*"], &set)
    }

    pub fn patterns(&self) -> &CompiledPatternSet {
        &self.patterns
    }

    fn scan(&self, src: &SourceText, kind: ArtifactKind, out: &mut ExtractionResult) {
        self.patterns.scan(src, kind, &self.comment_prefixes, out);
    }
}

impl Extractor for PatternExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    fn handles(&self, file_id: &str) -> bool {
        file_extension(file_id)
            .map(|ext| self.extensions.iter().any(|e| *e == ext))
            .unwrap_or(false)
    }

    fn extract_permissions(&self, src: &SourceText, out: &mut ExtractionResult) {
        self.scan(src, ArtifactKind::Permission, out);
    }

    fn extract_error_patterns(&self, src: &SourceText, out: &mut ExtractionResult) {
        self.scan(src, ArtifactKind::ErrorPattern, out);
    }

    fn extract_state_management(&self, src: &SourceText, out: &mut ExtractionResult) {
        self.scan(src, ArtifactKind::StateIndicator, out);
    }

    fn extract_dependencies(&self, src: &SourceText, out: &mut ExtractionResult) {
        self.scan(src, ArtifactKind::Dependency, out);
    }

    fn extract_config(&self, src: &SourceText, out: &mut ExtractionResult) {
        self.scan(src, ArtifactKind::ConfigParameter, out);
    }
}
