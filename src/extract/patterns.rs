//! Pattern libraries as data.
//!
//! A [`PatternSet`] is an ordered list of [`PatternRule`] records. Rules are
//! evaluated in declaration order so specific patterns can be listed ahead of
//! general fallbacks; when two rules match exactly the same span, the first
//! one claims it. Built-in sets live in `library/*.yaml` and are parsed at
//! startup; custom sets use the same YAML shape.

use regex::{Captures, Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::artifact::{is_sensitive_name, Artifact, ArtifactKind, CONTEXT_FIELD};

use super::sdk::permission_for_call;
use super::{excerpt, unquote, ExtractionResult, SourceText};

/// Upper bound on a compiled pattern's program size.
const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// Built-in pattern libraries, by name.
static BUILTIN_SETS: &[(&str, &str)] = &[
    ("terraform", include_str!("library/terraform.yaml")),
    ("app-source", include_str!("library/app_source.yaml")),
    ("config", include_str!("library/config.yaml")),
];

/// How a rule derives the artifact name from a match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameStyle {
    /// `name_template` if set, else the `name` group, else group 1, else the match.
    #[default]
    Capture,
    /// Groups `recv` and `method` form an SDK call mapped to `service:Action`.
    SdkCall,
    /// The rule label.
    Literal,
}

/// One pattern record.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PatternRule {
    /// Semantic label, copied to the artifact's `label` field.
    pub label: String,
    pub pattern: String,
    pub category: ArtifactKind,
    /// Description template: `{match}`, `{name}`, `{label}`, `{1}`.. and `{group}`.
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub name: NameStyle,
    /// Template for the artifact name, e.g. `"{type}.{ident}"`.
    #[serde(default)]
    pub name_template: Option<String>,
    #[serde(default)]
    pub weight: Option<f64>,
    /// Estimated minutes to document or resolve this fact.
    #[serde(default)]
    pub time_estimate_minutes: Option<u32>,
    /// Force the sensitive flag on matches.
    #[serde(default)]
    pub sensitive: bool,
}

/// An ordered pattern library.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PatternSet {
    pub name: String,
    #[serde(default)]
    pub rules: Vec<PatternRule>,
}

impl PatternSet {
    /// Parse a pattern set from YAML.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let set: PatternSet = serde_yaml::from_str(yaml)?;
        Ok(set)
    }

    /// Compile every rule. Fails on the first invalid pattern.
    pub fn compile(&self) -> anyhow::Result<CompiledPatternSet> {
        let rules = self
            .rules
            .iter()
            .map(|rule| {
                let regex = RegexBuilder::new(&rule.pattern)
                    .case_insensitive(true)
                    .multi_line(true)
                    .size_limit(REGEX_SIZE_LIMIT)
                    .build()
                    .map_err(|e| {
                        anyhow::anyhow!(
                            "compiling pattern {:?} ({}/{}): {}",
                            rule.pattern,
                            self.name,
                            rule.label,
                            e
                        )
                    })?;
                if rule.name == NameStyle::SdkCall {
                    let names: Vec<_> = regex.capture_names().flatten().collect();
                    if !names.contains(&"recv") || !names.contains(&"method") {
                        anyhow::bail!(
                            "rule {}/{} uses sdk_call naming but lacks `recv` and `method` groups",
                            self.name,
                            rule.label
                        );
                    }
                }
                Ok(CompiledRule {
                    regex,
                    rule: rule.clone(),
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(CompiledPatternSet {
            name: self.name.clone(),
            rules,
        })
    }
}

/// Look up a built-in pattern set by name.
pub fn builtin_pattern_set(name: &str) -> anyhow::Result<PatternSet> {
    let (_, yaml) = BUILTIN_SETS
        .iter()
        .find(|(n, _)| *n == name)
        .ok_or_else(|| anyhow::anyhow!("unknown built-in pattern set {:?}", name))?;
    PatternSet::from_yaml(yaml)
        .map_err(|e| anyhow::anyhow!("parsing built-in pattern set {:?}: {}", name, e))
}

struct CompiledRule {
    regex: Regex,
    rule: PatternRule,
}

/// A pattern set ready for scanning.
pub struct CompiledPatternSet {
    name: String,
    rules: Vec<CompiledRule>,
}

impl CompiledPatternSet {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Scan the text and emit artifacts of one kind.
    ///
    /// All rules run so that span claims are shared across kinds; only the
    /// rules of the requested kind produce artifacts.
    pub fn scan<S: AsRef<str>>(
        &self,
        src: &SourceText,
        kind: ArtifactKind,
        comment_prefixes: &[S],
        out: &mut ExtractionResult,
    ) {
        let text = src.content();
        let mut claimed: HashSet<(usize, usize)> = HashSet::new();

        for compiled in &self.rules {
            let rule = &compiled.rule;
            let mut seen: HashSet<(String, usize)> = HashSet::new();

            for caps in compiled.regex.captures_iter(text) {
                let Some(m) = caps.get(0) else { continue };
                if m.as_str().trim().is_empty() {
                    continue;
                }
                let Some(named) = artifact_name(compiled, &caps) else {
                    continue;
                };
                if !claimed.insert((m.start(), m.end())) {
                    continue;
                }
                if rule.category != kind {
                    continue;
                }

                let line = src.line_of(m.start());
                if !seen.insert((named.name.clone(), line)) {
                    continue;
                }

                out.push(build_artifact(compiled, &caps, named, src, line, comment_prefixes));
            }
        }
    }
}

struct NamedMatch {
    name: String,
    service: Option<String>,
    action: Option<String>,
}

fn artifact_name(compiled: &CompiledRule, caps: &Captures) -> Option<NamedMatch> {
    let rule = &compiled.rule;
    let plain = |name: String| {
        let name = name.trim().to_string();
        if name.is_empty() {
            None
        } else {
            Some(NamedMatch {
                name,
                service: None,
                action: None,
            })
        }
    };

    match rule.name {
        NameStyle::Literal => plain(rule.label.clone()),
        NameStyle::SdkCall => {
            let recv = caps.name("recv")?.as_str();
            let method = caps.name("method")?.as_str();
            let permission = permission_for_call(recv, method, None)?;
            Some(NamedMatch {
                name: permission.name(),
                service: Some(permission.service),
                action: Some(permission.action),
            })
        }
        NameStyle::Capture => {
            if let Some(template) = &rule.name_template {
                return plain(render(template, &compiled.regex, caps, rule, ""));
            }
            let has_name_group = compiled.regex.capture_names().flatten().any(|n| n == "name");
            if has_name_group {
                return match caps.name("name") {
                    Some(g) => plain(unquote(g.as_str()).to_string()),
                    None => plain(rule.label.clone()),
                };
            }
            match caps.get(1) {
                Some(g) => plain(unquote(g.as_str()).to_string()),
                None => plain(caps.get(0)?.as_str().to_string()),
            }
        }
    }
}

fn build_artifact<S: AsRef<str>>(
    compiled: &CompiledRule,
    caps: &Captures,
    named: NamedMatch,
    src: &SourceText,
    line: usize,
    comment_prefixes: &[S],
) -> Artifact {
    let rule = &compiled.rule;
    let summary = match &rule.description {
        Some(template) => render(template, &compiled.regex, caps, rule, &named.name),
        None => format!(
            "{}: {}",
            rule.label,
            excerpt(caps.get(0).map(|m| m.as_str()).unwrap_or(""))
        ),
    };
    let sensitive = rule.sensitive
        || (rule.category == ArtifactKind::ConfigParameter && is_sensitive_name(&named.name));

    let mut builder = Artifact::builder(rule.category, named.name, src.file_id(), line)
        .label(rule.label.clone())
        .field("summary", summary)
        .field(CONTEXT_FIELD, src.context(line))
        .sensitive(sensitive)
        .maybe_doc(src.leading_comment(line, comment_prefixes));

    for group in compiled.regex.capture_names().flatten() {
        if matches!(group, "name" | "recv" | "method") {
            continue;
        }
        if let Some(value) = caps.name(group) {
            let value = if sensitive && group == "default" {
                "****".to_string()
            } else {
                excerpt(unquote(value.as_str()))
            };
            builder = builder.field(group, value);
        }
    }
    if let Some(service) = named.service {
        builder = builder.field("service", service);
    }
    if let Some(action) = named.action {
        builder = builder.field("action", action);
    }
    if let Some(weight) = rule.weight {
        builder = builder.field("weight", weight.to_string());
    }
    if let Some(minutes) = rule.time_estimate_minutes {
        builder = builder.field("time_estimate", format!("{}m", minutes));
    }
    builder.build()
}

/// Substitute template placeholders with excerpts of the match.
fn render(template: &str, regex: &Regex, caps: &Captures, rule: &PatternRule, name: &str) -> String {
    let mut out = template.replace("{label}", &rule.label).replace("{name}", name);
    if out.contains("{match}") {
        let whole = caps.get(0).map(|m| m.as_str()).unwrap_or("");
        out = out.replace("{match}", &excerpt(whole));
    }
    for (i, group) in regex.capture_names().enumerate().skip(1) {
        let value = caps
            .get(i)
            .map(|m| excerpt(unquote(m.as_str())))
            .unwrap_or_default();
        out = out.replace(&format!("{{{}}}", i), &value);
        if let Some(group) = group {
            out = out.replace(&format!("{{{}}}", group), &value);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_all(set: &CompiledPatternSet, text: &str) -> ExtractionResult {
        let src = SourceText::new(text, "test.txt");
        let mut out = ExtractionResult::new();
        for kind in ArtifactKind::ALL {
            set.scan(&src, kind, &["#"], &mut out);
        }
        out
    }

    fn rule(label: &str, pattern: &str, category: ArtifactKind) -> PatternRule {
        PatternRule {
            label: label.to_string(),
            pattern: pattern.to_string(),
            category,
            description: None,
            name: NameStyle::Capture,
            name_template: None,
            weight: None,
            time_estimate_minutes: None,
            sensitive: false,
        }
    }

    #[test]
    fn test_builtin_sets_compile() {
        for (name, _) in BUILTIN_SETS {
            let set = builtin_pattern_set(name).unwrap();
            assert!(!set.rules.is_empty(), "{} has no rules", name);
            set.compile().unwrap();
        }
        assert!(builtin_pattern_set("cobol").is_err());
    }

    #[test]
    fn test_sdk_call_rule() {
        let set = PatternSet {
            name: "cloud-sdk".to_string(),
            rules: vec![PatternRule {
                name: NameStyle::SdkCall,
                ..rule(
                    "sdk_call",
                    r"\b(?P<recv>[A-Za-z_][\w.]*)\s*\.\s*(?P<method>[A-Za-z_]\w*)\s*\(",
                    ArtifactKind::Permission,
                )
            }],
        }
        .compile()
        .unwrap();

        let result = scan_all(&set, "client.describe_instances()");
        assert_eq!(result.artifacts.len(), 1);
        let a = &result.artifacts[0];
        assert_eq!(a.kind(), ArtifactKind::Permission);
        assert_eq!(a.name(), "ec2:DescribeInstances");
        assert_eq!(a.field("service"), Some("ec2"));
        assert_eq!(a.field("action"), Some("DescribeInstances"));
    }

    #[test]
    fn test_first_rule_claims_identical_span() {
        let set = PatternSet {
            name: "t".to_string(),
            rules: vec![
                rule("remote_state", r#"data\s+"terraform_remote_state"\s+"(?P<name>[^"]+)""#, ArtifactKind::StateIndicator),
                PatternRule {
                    name_template: Some("{type}.{ident}".to_string()),
                    ..rule("data_source", r#"data\s+"(?P<type>\w+)"\s+"(?P<ident>[^"]+)""#, ArtifactKind::Dependency)
                },
            ],
        }
        .compile()
        .unwrap();

        let text = "data \"terraform_remote_state\" \"network\" {}\ndata \"aws_ami\" \"ubuntu\" {}\n";
        let result = scan_all(&set, text);
        assert_eq!(result.artifacts.len(), 2);
        assert_eq!(result.artifacts[0].kind(), ArtifactKind::StateIndicator);
        assert_eq!(result.artifacts[0].name(), "network");
        assert_eq!(result.artifacts[1].kind(), ArtifactKind::Dependency);
        assert_eq!(result.artifacts[1].name(), "aws_ami.ubuntu");
    }

    #[test]
    fn test_overlapping_spans_of_different_kinds_are_kept() {
        let set = PatternSet {
            name: "t".to_string(),
            rules: vec![
                rule("datastore", r"(?P<name>redis)://", ArtifactKind::StateIndicator),
                PatternRule {
                    name_template: Some("{scheme}://{host}".to_string()),
                    ..rule("target", r"(?P<scheme>redis)://(?P<host>[\w.-]+)", ArtifactKind::Dependency)
                },
            ],
        }
        .compile()
        .unwrap();

        let result = scan_all(&set, "CACHE_URL=redis://cache.internal:6379\n");
        assert_eq!(result.artifacts.len(), 2);
        assert!(result.artifacts.iter().any(|a| a.name() == "redis"));
        assert!(result.artifacts.iter().any(|a| a.name() == "redis://cache.internal"));
    }

    #[test]
    fn test_matching_is_case_insensitive_and_multiline() {
        let set = PatternSet {
            name: "t".to_string(),
            rules: vec![PatternRule {
                name: NameStyle::Literal,
                ..rule("prevent_destroy", r"^\s*prevent_destroy\s*=\s*true", ArtifactKind::ErrorPattern)
            }],
        }
        .compile()
        .unwrap();

        let text = "lifecycle {\n  PREVENT_DESTROY = TRUE\n}\n";
        let result = scan_all(&set, text);
        assert_eq!(result.artifacts.len(), 1);
        assert_eq!(result.artifacts[0].line(), 2);
        assert_eq!(result.artifacts[0].name(), "prevent_destroy");
    }

    #[test]
    fn test_description_template_and_doc() {
        let set = PatternSet {
            name: "t".to_string(),
            rules: vec![PatternRule {
                description: Some("Retries up to {count} times ({match})".to_string()),
                name: NameStyle::Literal,
                time_estimate_minutes: Some(15),
                ..rule("retry", r"max_retries\s*=\s*(?P<count>\d+)", ArtifactKind::ErrorPattern)
            }],
        }
        .compile()
        .unwrap();

        let text = "# Retry transient API failures before paging on-call.\nmax_retries = 5\n";
        let result = scan_all(&set, text);
        let a = &result.artifacts[0];
        assert_eq!(a.field("summary"), Some("Retries up to 5 times (max_retries = 5)"));
        assert_eq!(a.field("count"), Some("5"));
        assert_eq!(a.field("time_estimate"), Some("15m"));
        assert_eq!(a.doc(), Some("Retry transient API failures before paging on-call."));
        assert!(a.is_documented());
    }

    #[test]
    fn test_repeated_scans_do_not_duplicate() {
        let set = builtin_pattern_set("app-source").unwrap().compile().unwrap();
        let text = "const x = process.env.API_URL;\nconst y = process.env.API_URL;\n";
        let src = SourceText::new(text, "a.js");
        let mut out = ExtractionResult::new();
        set.scan(&src, ArtifactKind::ConfigParameter, &["//"], &mut out);
        set.scan(&src, ArtifactKind::ConfigParameter, &["//"], &mut out);
        out.finalize();
        assert_eq!(out.artifacts.len(), 2);
        assert_eq!(out.artifacts[0].line(), 1);
        assert_eq!(out.artifacts[1].line(), 2);
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let set = PatternSet {
            name: "bad".to_string(),
            rules: vec![rule("broken", r"(unclosed", ArtifactKind::Dependency)],
        };
        let err = set.compile().err().unwrap();
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn test_pattern_set_from_yaml() {
        let yaml = r#"
name: custom
rules:
  - label: feature_flag
    category: config-parameter
    pattern: 'flags\.get\(\s*"(?P<name>[^"]+)"'
    time_estimate_minutes: 10
"#;
        let set = PatternSet::from_yaml(yaml).unwrap();
        assert_eq!(set.rules.len(), 1);
        assert_eq!(set.rules[0].category, ArtifactKind::ConfigParameter);
        assert_eq!(set.rules[0].name, NameStyle::Capture);
        let compiled = set.compile().unwrap();
        let result = scan_all(&compiled, "if flags.get(\"new_checkout\"):\n");
        assert_eq!(result.artifacts[0].name(), "new_checkout");
    }
}
