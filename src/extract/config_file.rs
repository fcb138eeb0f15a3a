//! Key/value configuration files (`.env`, `.ini`, `.cfg`, `.properties`, `.conf`).

use lazy_static::lazy_static;
use regex::Regex;

use crate::artifact::{is_sensitive_name, Artifact, ArtifactKind, ExtractionResult, CONTEXT_FIELD};

use super::patterns::{builtin_pattern_set, CompiledPatternSet};
use super::{excerpt, file_extension, file_name, Extractor, SourceText};

const COMMENT_PREFIXES: &[&str] = &["#", ";", "!"];

const SETTINGS_EXTENSIONS: &[&str] = &["ini", "cfg", "properties", "conf"];

lazy_static! {
    static ref SECTION: Regex = Regex::new(r"^\[\s*(?P<name>[^\]]+?)\s*\]$").unwrap();
    static ref KEY: Regex = Regex::new(r"^[A-Za-z_][\w.\-]*$").unwrap();
    static ref SETTING_KEY: Regex = Regex::new(r"^[A-Za-z_][\w.\-]*(?: [\w.\-]+)*$").unwrap();
    static ref INT: Regex = Regex::new(r"^[+-]?\d+$").unwrap();
    static ref FLOAT: Regex = Regex::new(r"^[+-]?(?:\d+\.\d*|\.\d+)(?:[eE][+-]?\d+)?$").unwrap();
}

/// Inferred type of a configuration value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Bool,
    Int,
    Float,
    Url,
    Path,
    String,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Url => "url",
            ValueType::Path => "path",
            ValueType::String => "string",
        }
    }

    /// Infer the type of a literal value.
    pub fn infer(value: &str) -> Self {
        let lower = value.to_lowercase();
        if matches!(lower.as_str(), "true" | "false" | "yes" | "no" | "on" | "off") {
            ValueType::Bool
        } else if INT.is_match(value) {
            ValueType::Int
        } else if FLOAT.is_match(value) {
            ValueType::Float
        } else if value.contains("://") {
            ValueType::Url
        } else if value.starts_with('/') || value.starts_with("./") || value.starts_with("~/") {
            ValueType::Path
        } else {
            ValueType::String
        }
    }
}

/// Line grammar of a key/value file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dialect {
    /// `.env` files: every `KEY=value` line is an assignment.
    Env,
    /// `.ini`, `.cfg`, `.properties`, `.conf`: keys may contain spaces, and
    /// lines whose left side is not a key are directives, not assignments.
    Settings,
}

/// One `key = value` line.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    key: String,
    value: String,
}

/// Extractor for key/value configuration files.
pub struct ConfigFileExtractor {
    patterns: CompiledPatternSet,
}

impl ConfigFileExtractor {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            patterns: builtin_pattern_set("config")?.compile()?,
        })
    }

    fn is_env_file(file_id: &str) -> bool {
        let name = file_name(file_id);
        name.starts_with(".env") || file_extension(file_id).as_deref() == Some("env")
    }
}

/// Parse one line. `Ok(None)` for lines that carry no assignment.
fn parse_line(line: &str, dialect: Dialect) -> Result<Option<Entry>, String> {
    let line = line.trim();
    let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);

    let Some(sep) = line.find(|c| c == '=' || c == ':') else {
        return Ok(None);
    };
    let key = line[..sep].trim();
    if key.is_empty() {
        return Err("assignment without a key".to_string());
    }
    match dialect {
        Dialect::Env if !KEY.is_match(key) => {
            return Err(format!("invalid key {:?}", excerpt(key)));
        }
        // `add_header X-Frame-Options: DENY`, `proxy_pass http://...`
        Dialect::Settings if line[sep..].starts_with(':') && key.contains(char::is_whitespace) => {
            return Ok(None);
        }
        Dialect::Settings if !SETTING_KEY.is_match(key) => return Ok(None),
        _ => {}
    }

    let raw = line[sep + 1..].trim();
    let value = match raw.chars().next() {
        Some(q @ ('"' | '\'')) => {
            let rest = &raw[1..];
            match rest.find(q) {
                Some(end) => rest[..end].to_string(),
                None => return Err(format!("unterminated quote in value of {}", key)),
            }
        }
        _ => strip_inline_comment(raw).to_string(),
    };

    Ok(Some(Entry {
        key: key.to_string(),
        value,
    }))
}

/// Drop a trailing ` # comment` from an unquoted value.
fn strip_inline_comment(value: &str) -> &str {
    match value.find(" #") {
        Some(i) => value[..i].trim_end(),
        None => value,
    }
}

impl Extractor for ConfigFileExtractor {
    fn name(&self) -> &str {
        "config"
    }

    fn handles(&self, file_id: &str) -> bool {
        Self::is_env_file(file_id)
            || file_extension(file_id)
                .map(|ext| SETTINGS_EXTENSIONS.contains(&ext.as_str()))
                .unwrap_or(false)
    }

    fn extract_permissions(&self, src: &SourceText, out: &mut ExtractionResult) {
        self.patterns.scan(src, ArtifactKind::Permission, COMMENT_PREFIXES, out);
    }

    fn extract_error_patterns(&self, src: &SourceText, out: &mut ExtractionResult) {
        self.patterns.scan(src, ArtifactKind::ErrorPattern, COMMENT_PREFIXES, out);
    }

    fn extract_state_management(&self, src: &SourceText, out: &mut ExtractionResult) {
        self.patterns.scan(src, ArtifactKind::StateIndicator, COMMENT_PREFIXES, out);
    }

    fn extract_dependencies(&self, src: &SourceText, out: &mut ExtractionResult) {
        self.patterns.scan(src, ArtifactKind::Dependency, COMMENT_PREFIXES, out);
    }

    fn extract_config(&self, src: &SourceText, out: &mut ExtractionResult) {
        let label = if Self::is_env_file(src.file_id()) {
            "env_var"
        } else {
            "setting"
        };
        let dialect = if Self::is_env_file(src.file_id()) {
            Dialect::Env
        } else {
            Dialect::Settings
        };
        let mut section: Option<String> = None;

        for line in 1..=src.line_count() {
            let text = src.line_text(line).trim();
            if text.is_empty() || COMMENT_PREFIXES.iter().any(|p| text.starts_with(p)) {
                continue;
            }
            if let Some(caps) = SECTION.captures(text) {
                section = caps.name("name").map(|n| n.as_str().to_string());
                continue;
            }

            let entry = match parse_line(text, dialect) {
                Ok(Some(entry)) => entry,
                Ok(None) => continue,
                Err(reason) => {
                    out.error(src.file_id(), Some(line), reason);
                    continue;
                }
            };

            let name = match &section {
                Some(s) => format!("{}.{}", s, entry.key),
                None => entry.key,
            };
            let sensitive = is_sensitive_name(&name);
            let value_type = (!entry.value.is_empty()).then(|| ValueType::infer(&entry.value));
            let default = if sensitive && !entry.value.is_empty() {
                "<redacted>".to_string()
            } else {
                excerpt(&entry.value)
            };

            let artifact = Artifact::builder(ArtifactKind::ConfigParameter, name, src.file_id(), line)
                .label(label)
                .sensitive(sensitive)
                .maybe_doc(src.leading_comment(line, COMMENT_PREFIXES))
                .field("type", value_type.map(|t| t.as_str()).unwrap_or_default())
                .field("default", default)
                .field(CONTEXT_FIELD, src.context(line))
                .build();
            out.push(artifact);
        }
    }
}
