//! Core types for extraction results.
//!
//! An [`Artifact`] is one maintenance-relevant fact found in a source file.
//! Extractors collect artifacts and recoverable [`ExtractionError`]s into an
//! [`ExtractionResult`], which is also the per-project aggregate.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Field holding documentation text attached to an artifact.
pub const DOC_FIELD: &str = "doc";
/// Field holding the semantic label of the rule or node that produced an artifact.
pub const LABEL_FIELD: &str = "label";
/// Field holding a bounded excerpt of the source line.
pub const CONTEXT_FIELD: &str = "context";

/// Kind of extracted fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    Permission,
    ErrorPattern,
    StateIndicator,
    Dependency,
    ConfigParameter,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 5] = [
        ArtifactKind::Permission,
        ArtifactKind::ErrorPattern,
        ArtifactKind::StateIndicator,
        ArtifactKind::Dependency,
        ArtifactKind::ConfigParameter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Permission => "permission",
            ArtifactKind::ErrorPattern => "error-pattern",
            ArtifactKind::StateIndicator => "state-indicator",
            ArtifactKind::Dependency => "dependency",
            ArtifactKind::ConfigParameter => "config-parameter",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "permission" => Some(ArtifactKind::Permission),
            "error-pattern" => Some(ArtifactKind::ErrorPattern),
            "state-indicator" => Some(ArtifactKind::StateIndicator),
            "dependency" => Some(ArtifactKind::Dependency),
            "config-parameter" => Some(ArtifactKind::ConfigParameter),
            _ => None,
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ArtifactKind::parse(s).ok_or_else(|| format!("unknown artifact kind: {}", s))
    }
}

/// Identity of an artifact: two artifacts with the same id are duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactId {
    pub kind: ArtifactKind,
    pub name: String,
    pub file: String,
    pub line: usize,
}

/// One extracted maintenance fact.
///
/// Artifacts are immutable once built; use [`Artifact::builder`] to create one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    name: String,
    kind: ArtifactKind,
    file: String,
    line: usize,
    is_documented: bool,
    is_sensitive: bool,
    #[serde(default)]
    fields: BTreeMap<String, String>,
}

impl Artifact {
    /// Start building an artifact at the given location (line is 1-indexed).
    pub fn builder(
        kind: ArtifactKind,
        name: impl Into<String>,
        file: impl Into<String>,
        line: usize,
    ) -> ArtifactBuilder {
        ArtifactBuilder {
            artifact: Artifact {
                name: name.into(),
                kind,
                file: file.into(),
                line,
                is_documented: false,
                is_sensitive: false,
                fields: BTreeMap::new(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn is_documented(&self) -> bool {
        self.is_documented
    }

    pub fn is_sensitive(&self) -> bool {
        self.is_sensitive
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    /// Get a field value, treating blank values as absent.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .map(|v| v.as_str())
            .filter(|v| !v.trim().is_empty())
    }

    /// Documentation text attached to this artifact, if any.
    pub fn doc(&self) -> Option<&str> {
        self.field(DOC_FIELD)
    }

    pub fn label(&self) -> Option<&str> {
        self.field(LABEL_FIELD)
    }

    pub fn id(&self) -> ArtifactId {
        ArtifactId {
            kind: self.kind,
            name: self.name.clone(),
            file: self.file.clone(),
            line: self.line,
        }
    }

    /// Whether this artifact belongs to an element category.
    ///
    /// A category matches either the kind's canonical name (`permission`,
    /// `config-parameter`, ...) or the artifact's semantic label.
    pub fn matches_category(&self, category: &str) -> bool {
        self.kind.as_str() == category || self.label() == Some(category)
    }
}

/// Builder for [`Artifact`].
#[derive(Debug, Clone)]
pub struct ArtifactBuilder {
    artifact: Artifact,
}

impl ArtifactBuilder {
    /// Attach documentation text. Blank text leaves the artifact undocumented.
    pub fn doc(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        if !text.trim().is_empty() {
            self.artifact.is_documented = true;
            self.artifact.fields.insert(DOC_FIELD.to_string(), text);
        }
        self
    }

    /// Attach optional documentation text.
    pub fn maybe_doc(self, text: Option<String>) -> Self {
        match text {
            Some(t) => self.doc(t),
            None => self,
        }
    }

    /// Mark as documented without attaching text.
    pub fn documented(mut self, documented: bool) -> Self {
        self.artifact.is_documented = documented;
        self
    }

    pub fn sensitive(mut self, sensitive: bool) -> Self {
        self.artifact.is_sensitive = sensitive;
        self
    }

    /// Set a field. Empty values are skipped.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() {
            self.artifact.fields.insert(key.into(), value);
        }
        self
    }

    pub fn label(self, label: impl Into<String>) -> Self {
        self.field(LABEL_FIELD, label)
    }

    pub fn build(self) -> Artifact {
        self.artifact
    }
}

/// A recoverable problem encountered while extracting one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionError {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    pub reason: String,
}

impl std::fmt::Display for ExtractionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{}: {}", self.file, line, self.reason),
            None => write!(f, "{}: {}", self.file, self.reason),
        }
    }
}

/// Artifacts and errors from one file or a whole project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub artifacts: Vec<Artifact>,
    #[serde(default)]
    pub errors: Vec<ExtractionError>,
    /// Number of files extracted
    pub scanned: usize,
}

impl ExtractionResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, artifact: Artifact) {
        self.artifacts.push(artifact);
    }

    /// Record an extraction error.
    pub fn error(&mut self, file: &str, line: Option<usize>, reason: impl Into<String>) {
        self.errors.push(ExtractionError {
            file: file.to_string(),
            line,
            reason: reason.into(),
        });
    }

    /// Merge another result into this one.
    pub fn merge(&mut self, other: ExtractionResult) {
        self.artifacts.extend(other.artifacts);
        self.errors.extend(other.errors);
        self.scanned += other.scanned;
    }

    /// Sort into a deterministic order and drop duplicate artifacts.
    ///
    /// Artifacts are ordered by file then line; the sort is stable so
    /// artifacts on the same line keep their extraction order. For duplicate
    /// identities the first occurrence wins.
    pub fn finalize(&mut self) {
        self.artifacts
            .sort_by(|a, b| (a.file.as_str(), a.line).cmp(&(b.file.as_str(), b.line)));

        let mut seen = HashSet::new();
        self.artifacts.retain(|a| seen.insert(a.id()));

        self.errors
            .sort_by(|a, b| (a.file.as_str(), a.line).cmp(&(b.file.as_str(), b.line)));
        self.errors.dedup();
    }

    /// Artifacts of a given kind.
    pub fn by_kind(&self, kind: ArtifactKind) -> impl Iterator<Item = &Artifact> {
        self.artifacts.iter().filter(move |a| a.kind == kind)
    }

    /// Configuration artifacts, the input of the risk scorer.
    pub fn config_artifacts(&self) -> Vec<Artifact> {
        self.by_kind(ArtifactKind::ConfigParameter).cloned().collect()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

lazy_static! {
    /// Name tokens that mark a configuration value as a secret. Matched against
    /// the snake_case form of the name, on `_` boundaries.
    static ref SENSITIVE_NAME: Regex = Regex::new(
        r"(?:^|_)(?:password|passwd|pwd|passphrase|secret|token|api_?key|private_key|access_key|credential|auth|authorization|cert|certificate|dsn|connection_string)s?(?:_|$)"
    )
    .unwrap();
}

/// Check if a configuration name looks like it holds a secret.
pub fn is_sensitive_name(name: &str) -> bool {
    SENSITIVE_NAME.is_match(&snake_case_name(name))
}

/// `dbPassword`, `db-password` and `DB.PASSWORD` all become `db_password`.
fn snake_case_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_uppercase() && prev_lower {
            out.push('_');
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        match c {
            '-' | '.' | ' ' => out.push('_'),
            _ => out.extend(c.to_lowercase()),
        }
    }
    out
}
