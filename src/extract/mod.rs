//! Artifact extraction.
//!
//! Every extractor implements [`Extractor`]: a fixed capability set
//! (permissions, error patterns, state management, dependencies, plus
//! configuration parameters) over in-memory source text. Extractors never
//! touch the filesystem and never fail: anything they cannot make sense of is
//! recorded as an [`ExtractionError`](crate::artifact::ExtractionError) and the
//! rest of the file is still extracted.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────────┐
//! │ SourceFile   │────▶│ ExtractorRegistry │────▶│ Extractor        │
//! │ (id, text)   │     │ (file type lookup)│     │ Python (AST)     │
//! └──────────────┘     └───────────────────┘     │ Terraform, Config│
//!                                                │ App source (regex│
//!                                                └──────────────────┘
//!                                                         │ per file
//!                                                         ▼
//!                                               ┌───────────────────┐
//!                                               │ Project (rayon    │
//!                                               │ fan-out + merge)  │
//!                                               └───────────────────┘
//! ```
//!
//! # Adding a New Dialect
//!
//! Most dialects need no code: write a pattern set (see `library/*.yaml`) and
//! register a [`PatternExtractor`] for the file extensions. Languages with a
//! tree-sitter grammar can implement [`Extractor`] directly (see `python.rs`).

mod blocks;
mod config_file;
mod generic;
mod patterns;
mod project;
#[cfg(feature = "tree-sitter")]
mod python;
pub mod sdk;
mod terraform;

use lazy_static::lazy_static;
use regex::Regex;
use std::path::Path;

use crate::artifact::{is_sensitive_name, ExtractionResult};

pub use config_file::ConfigFileExtractor;
pub use generic::PatternExtractor;
pub use patterns::{builtin_pattern_set, CompiledPatternSet, NameStyle, PatternRule, PatternSet};
pub use project::{Project, SourceFile};
#[cfg(feature = "tree-sitter")]
pub use python::PythonExtractor;
pub use terraform::TerraformExtractor;

/// Inputs larger than this are truncated before scanning.
pub const MAX_SCAN_BYTES: usize = 2 * 1024 * 1024;

/// Maximum length of matched text quoted into descriptions and context.
pub const MAX_EXCERPT_CHARS: usize = 80;

/// Source text being extracted, with a line index for offset lookups.
pub struct SourceText<'a> {
    file_id: &'a str,
    content: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> SourceText<'a> {
    pub fn new(content: &'a str, file_id: &'a str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(content.match_indices('\n').map(|(i, _)| i + 1));
        Self {
            file_id,
            content,
            line_starts,
        }
    }

    pub fn file_id(&self) -> &'a str {
        self.file_id
    }

    pub fn content(&self) -> &'a str {
        self.content
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Line number (1-indexed) containing a byte offset.
    pub fn line_of(&self, byte: usize) -> usize {
        match self.line_starts.binary_search(&byte) {
            Ok(i) => i + 1,
            Err(i) => i,
        }
    }

    /// Text of a line (1-indexed), without the line terminator.
    pub fn line_text(&self, line: usize) -> &'a str {
        if line == 0 || line > self.line_starts.len() {
            return "";
        }
        let start = self.line_starts[line - 1];
        let end = self
            .line_starts
            .get(line)
            .map(|next| next - 1)
            .unwrap_or(self.content.len());
        self.content[start..end].trim_end_matches('\r')
    }

    /// Comment block immediately above a line, joined into one string.
    ///
    /// Stops at the first blank or non-comment line.
    pub fn leading_comment<S: AsRef<str>>(&self, line: usize, prefixes: &[S]) -> Option<String> {
        let mut collected = Vec::new();
        let mut current = line;
        while current > 1 {
            current -= 1;
            let text = self.line_text(current).trim();
            let stripped = prefixes
                .iter()
                .map(|p| p.as_ref())
                .find(|p| text.starts_with(p))
                .map(|p| comment_body(text, p));
            match stripped {
                Some(s) if !text.starts_with("#!") => collected.push(s),
                _ => break,
            }
        }
        collected.reverse();
        let joined = collected
            .into_iter()
            .filter(|s| !s.is_empty() && !s.chars().all(|c| c == '/' || c == '*'))
            .collect::<Vec<_>>()
            .join(" ");
        if joined.is_empty() {
            None
        } else {
            Some(joined)
        }
    }

    /// Redacted, bounded excerpt of a line for the `context` field.
    pub fn context(&self, line: usize) -> String {
        excerpt(&redact(self.line_text(line).trim()))
    }
}

/// Text of one comment line with its markers removed.
///
/// Slash and star prefixes are block-comment style: `/**`, ` * ` and `*/`
/// all reduce to the enclosed text.
fn comment_body<'t>(text: &'t str, prefix: &str) -> &'t str {
    let body = text[prefix.len()..].trim_start_matches(prefix);
    if prefix.starts_with('/') || prefix.starts_with('*') {
        let body = body.trim_start_matches(|c| c == '/' || c == '*').trim_end();
        body.strip_suffix("*/").unwrap_or(body).trim()
    } else {
        body.trim()
    }
}

/// Contract shared by all extractors.
///
/// `extract` is a template method: it bounds the input, runs each capability
/// in turn and sorts/deduplicates the result. Implementations override the
/// capabilities, and may override `extract` when they can share work (e.g. a
/// single parse) across capabilities.
pub trait Extractor: Send + Sync {
    /// Extractor name for logs and reports (e.g. "python", "terraform").
    fn name(&self) -> &str;

    /// Whether this extractor handles the given file identifier.
    fn handles(&self, file_id: &str) -> bool;

    fn extract_permissions(&self, src: &SourceText, out: &mut ExtractionResult);

    fn extract_error_patterns(&self, src: &SourceText, out: &mut ExtractionResult);

    fn extract_state_management(&self, src: &SourceText, out: &mut ExtractionResult);

    fn extract_dependencies(&self, src: &SourceText, out: &mut ExtractionResult);

    /// Configuration parameters. Most source dialects have none.
    fn extract_config(&self, _src: &SourceText, _out: &mut ExtractionResult) {}

    /// Extract all artifacts from one file's content.
    fn extract(&self, content: &str, file_id: &str) -> ExtractionResult {
        let mut out = ExtractionResult::new();
        let content = bounded(content, file_id, &mut out);
        let src = SourceText::new(content, file_id);

        self.extract_permissions(&src, &mut out);
        self.extract_error_patterns(&src, &mut out);
        self.extract_state_management(&src, &mut out);
        self.extract_dependencies(&src, &mut out);
        self.extract_config(&src, &mut out);

        out.scanned = 1;
        out.finalize();
        out
    }
}

/// Ordered set of extractors; the first one that handles a file wins.
#[derive(Default)]
pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn Extractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in extractor.
    pub fn with_defaults() -> anyhow::Result<Self> {
        let mut registry = Self::new();
        #[cfg(feature = "tree-sitter")]
        registry.register(Box::new(PythonExtractor::new()));
        registry.register(Box::new(TerraformExtractor::new()?));
        registry.register(Box::new(ConfigFileExtractor::new()?));
        registry.register(Box::new(PatternExtractor::app_source()?));
        Ok(registry)
    }

    pub fn register(&mut self, extractor: Box<dyn Extractor>) {
        tracing::debug!("registered extractor {}", extractor.name());
        self.extractors.push(extractor);
    }

    /// Register ahead of everything already present.
    pub fn register_first(&mut self, extractor: Box<dyn Extractor>) {
        tracing::debug!("registered extractor {} (priority)", extractor.name());
        self.extractors.insert(0, extractor);
    }

    pub fn for_file(&self, file_id: &str) -> Option<&dyn Extractor> {
        self.extractors
            .iter()
            .find(|e| e.handles(file_id))
            .map(|e| e.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.extractors.iter().map(|e| e.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }
}

/// Lowercased extension of a file identifier, without the dot.
pub fn file_extension(file_id: &str) -> Option<String> {
    Path::new(file_id)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

/// Final path component of a file identifier.
pub fn file_name(file_id: &str) -> &str {
    Path::new(file_id)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(file_id)
}

/// Truncate oversized input at a char boundary, recording an extraction error.
fn bounded<'a>(content: &'a str, file_id: &str, out: &mut ExtractionResult) -> &'a str {
    if content.len() <= MAX_SCAN_BYTES {
        return content;
    }
    let mut end = MAX_SCAN_BYTES;
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    out.error(
        file_id,
        None,
        format!(
            "file is {} bytes, only the first {} were scanned",
            content.len(),
            end
        ),
    );
    &content[..end]
}

/// Bound text to [`MAX_EXCERPT_CHARS`], collapsing whitespace.
pub fn excerpt(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= MAX_EXCERPT_CHARS {
        return collapsed;
    }
    let mut cut: String = collapsed.chars().take(MAX_EXCERPT_CHARS - 3).collect();
    cut.push_str("...");
    cut
}

lazy_static! {
    static ref URL_CREDENTIALS: Regex = Regex::new(r"(://[^:@/\s]+:)[^@\s]+@").unwrap();
    static ref ASSIGNMENT: Regex =
        Regex::new(r#"^(\s*(?:export\s+)?["']?([A-Za-z_][\w.\-]*)["']?\s*[=:]\s*)(.+)$"#).unwrap();
}

/// Mask credentials embedded in URLs and values of secret-looking assignments.
pub fn redact(line: &str) -> String {
    let masked = URL_CREDENTIALS.replace_all(line, "${1}****@");
    if let Some(caps) = ASSIGNMENT.captures(&masked) {
        if is_sensitive_name(&caps[2]) {
            return format!("{}****", &caps[1]);
        }
    }
    masked.into_owned()
}

/// Remove surrounding quotes from a literal (`"x"`, `'x'`, `"""x"""`, `r"x"`).
pub fn unquote(text: &str) -> &str {
    let text = text.trim();
    let body = match text.find(|c| c == '"' || c == '\'') {
        Some(i) if i <= 2 && text[..i].chars().all(|c| "rRbBuUfF".contains(c)) => &text[i..],
        _ => text,
    };
    for q in ["\"\"\"", "'''", "\"", "'", "`"] {
        if body.len() >= 2 * q.len() && body.starts_with(q) && body.ends_with(q) {
            return &body[q.len()..body.len() - q.len()];
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{Artifact, ArtifactKind};

    #[test]
    fn test_line_of() {
        let src = SourceText::new("a\nbb\n\nccc", "f");
        assert_eq!(src.line_of(0), 1);
        assert_eq!(src.line_of(2), 2);
        assert_eq!(src.line_of(3), 2);
        assert_eq!(src.line_of(5), 3);
        assert_eq!(src.line_of(6), 4);
        assert_eq!(src.line_count(), 4);
        assert_eq!(src.line_text(2), "bb");
        assert_eq!(src.line_text(4), "ccc");
        assert_eq!(src.line_text(9), "");
    }

    #[test]
    fn test_leading_comment() {
        let text = "# unrelated\n\n# Port the API listens on.\n# Change with care.\nPORT=8080\n";
        let src = SourceText::new(text, ".env");
        assert_eq!(
            src.leading_comment(5, &["#"]).as_deref(),
            Some("Port the API listens on. Change with care.")
        );
        assert_eq!(src.leading_comment(1, &["#"]), None);
    }

    #[test]
    fn test_leading_comment_strips_block_markers() {
        let text = "/**\n * Uploads the invoice.\n * Retry with `make upload`.\n */\nasync function upload() {}\n";
        let src = SourceText::new(text, "web/upload.js");
        assert_eq!(
            src.leading_comment(5, &["//", "#", "*", "/*"]).as_deref(),
            Some("Uploads the invoice. Retry with `make upload`.")
        );

        let src = SourceText::new("/** Single line. */\nconst a = 1;\n/// Triple slash.\nconst b = 2;\n", "a.ts");
        assert_eq!(src.leading_comment(2, &["//", "*", "/*"]).as_deref(), Some("Single line."));
        assert_eq!(src.leading_comment(4, &["//", "*", "/*"]).as_deref(), Some("Triple slash."));
    }

    #[test]
    fn test_excerpt_bounds_length() {
        let long = "x".repeat(500);
        let e = excerpt(&long);
        assert_eq!(e.chars().count(), MAX_EXCERPT_CHARS);
        assert!(e.ends_with("..."));
        assert_eq!(excerpt("a   b\n c"), "a b c");
    }

    #[test]
    fn test_redact() {
        assert_eq!(
            redact("DATABASE_URL=postgres://app:hunter2@db:5432/app"),
            "DATABASE_URL=postgres://app:****@db:5432/app"
        );
        assert_eq!(redact("API_TOKEN=abc123"), "API_TOKEN=****");
        assert_eq!(redact("LOG_LEVEL=debug"), "LOG_LEVEL=debug");
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("\"ec2\""), "ec2");
        assert_eq!(unquote("'s3'"), "s3");
        assert_eq!(unquote("\"\"\"Doc.\"\"\""), "Doc.");
        assert_eq!(unquote("bare"), "bare");
        assert_eq!(unquote("r'raw'"), "raw");
    }

    #[test]
    fn test_oversized_input_is_truncated_with_error() {
        let mut out = ExtractionResult::new();
        let big = "é".repeat(MAX_SCAN_BYTES);
        let kept = bounded(&big, "big.env", &mut out);
        assert!(kept.len() <= MAX_SCAN_BYTES);
        assert_eq!(out.errors.len(), 1);
    }

    struct Fixed;

    impl Extractor for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn handles(&self, file_id: &str) -> bool {
            file_extension(file_id).as_deref() == Some("fx")
        }

        fn extract_permissions(&self, src: &SourceText, out: &mut ExtractionResult) {
            out.push(Artifact::builder(ArtifactKind::Permission, "s3:GetObject", src.file_id(), 2).build());
        }

        fn extract_error_patterns(&self, _src: &SourceText, _out: &mut ExtractionResult) {}

        fn extract_state_management(&self, _src: &SourceText, _out: &mut ExtractionResult) {}

        fn extract_dependencies(&self, src: &SourceText, out: &mut ExtractionResult) {
            out.push(Artifact::builder(ArtifactKind::Dependency, "boto3", src.file_id(), 1).build());
        }
    }

    #[test]
    fn test_template_extract_orders_output() {
        let result = Fixed.extract("", "a.fx");
        assert_eq!(result.scanned, 1);
        assert_eq!(result.artifacts.len(), 2);
        assert_eq!(result.artifacts[0].name(), "boto3");
        assert_eq!(result.artifacts[1].name(), "s3:GetObject");
    }

    #[test]
    fn test_registry_first_match_wins() {
        let mut registry = ExtractorRegistry::new();
        registry.register(Box::new(Fixed));
        assert!(registry.for_file("dir/a.FX").is_some());
        assert!(registry.for_file("dir/a.rs").is_none());
        assert_eq!(registry.names(), vec!["fixed"]);
    }

    #[test]
    fn test_default_registry_routes_by_type() {
        let registry = ExtractorRegistry::with_defaults().unwrap();
        assert_eq!(registry.for_file("infra/main.tf").unwrap().name(), "terraform");
        assert_eq!(registry.for_file(".env.production").unwrap().name(), "config");
        assert_eq!(registry.for_file("web/server.js").unwrap().name(), "app-source");
        #[cfg(feature = "tree-sitter")]
        assert_eq!(registry.for_file("svc/handler.py").unwrap().name(), "python");
        assert!(registry.for_file("README.md").is_none());
    }
}
