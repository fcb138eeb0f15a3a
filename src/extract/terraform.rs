//! Terraform (HCL) extractor.
//!
//! Most facts come from the `terraform` pattern set. Permissions and input
//! variables need structure, so they are parsed from the embedded blocks:
//! JSON policy heredocs, HCL `actions` lists and `variable` blocks.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use crate::artifact::{is_sensitive_name, Artifact, ArtifactKind, ExtractionResult, CONTEXT_FIELD};

use super::blocks::{heredocs, matching_block};
use super::patterns::{builtin_pattern_set, CompiledPatternSet};
use super::{excerpt, file_extension, unquote, Extractor, SourceText};

const COMMENT_PREFIXES: &[&str] = &["#", "//"];

lazy_static! {
    static ref HCL_ACTIONS: Regex = Regex::new(
        r"(?is)\b(?P<key>actions|Action|not_actions|NotAction)\s*=\s*\[(?P<list>[^\]]*)\]"
    )
    .unwrap();
    static ref QUOTED: Regex = Regex::new(r#""([^"\n]*)""#).unwrap();
    static ref IAM_ACTION: Regex = Regex::new(r"^[a-z0-9\-]+:[A-Za-z0-9*]+$").unwrap();
    static ref VARIABLE_HEADER: Regex =
        Regex::new(r#"(?m)^[ \t]*variable\s+"(?P<name>[^"]+)"\s*\{"#).unwrap();
    static ref ATTR_DESCRIPTION: Regex =
        Regex::new(r#"(?m)^\s*description\s*=\s*"(?P<v>(?:[^"\\\n]|\\.)*)""#).unwrap();
    static ref ATTR_TYPE: Regex = Regex::new(r"(?m)^\s*type\s*=\s*(?P<v>[^\n]+)$").unwrap();
    static ref ATTR_DEFAULT: Regex = Regex::new(r"(?m)^\s*default\s*=\s*(?P<v>[^\n]+)$").unwrap();
    static ref ATTR_SENSITIVE: Regex = Regex::new(r"(?m)^\s*sensitive\s*=\s*true\b").unwrap();
    static ref BLOCK_HEADER: Regex =
        Regex::new(r#"^\s*(resource|data|module)\s+"[^"]+""#).unwrap();
}

/// Extractor for `.tf` files.
pub struct TerraformExtractor {
    patterns: CompiledPatternSet,
}

impl TerraformExtractor {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            patterns: builtin_pattern_set("terraform")?.compile()?,
        })
    }

    /// Permissions from JSON policy documents in heredocs.
    fn policy_heredocs(&self, src: &SourceText, out: &mut ExtractionResult) {
        for heredoc in heredocs(src.content()) {
            let line = src.line_of(heredoc.start);
            if !heredoc.terminated {
                out.error(
                    src.file_id(),
                    Some(line),
                    format!("unterminated heredoc <<{}", heredoc.tag),
                );
                continue;
            }

            let body = heredoc.body.trim();
            if !(body.starts_with('{') || body.starts_with('[')) {
                continue;
            }
            let document: Value = match serde_json::from_str(body) {
                Ok(v) => v,
                Err(e) => {
                    out.error(
                        src.file_id(),
                        Some(line),
                        format!("invalid JSON in <<{} heredoc: {}", heredoc.tag, e),
                    );
                    continue;
                }
            };

            let doc = block_doc(src, line);
            for (action, statement) in policy_actions(&document) {
                let action_line = heredoc
                    .body
                    .find(&format!("\"{}\"", action))
                    .map(|i| src.line_of(heredoc.body_start + i))
                    .unwrap_or(line);
                let artifact = permission(src, &action, action_line, "iam_policy", &statement, doc.clone());
                out.push(artifact);
            }
        }
    }

    /// Permissions from HCL `actions = [...]` lists (policy documents, jsonencode).
    fn hcl_actions(&self, src: &SourceText, out: &mut ExtractionResult) {
        let text = src.content();
        for caps in HCL_ACTIONS.captures_iter(text) {
            let (Some(key), Some(list)) = (caps.name("key"), caps.name("list")) else {
                continue;
            };
            let statement = if key.as_str().to_lowercase().starts_with("not") {
                Statement::deny_all_but()
            } else {
                Statement::allow()
            };
            let doc = block_doc(src, src.line_of(key.start()));

            for item in QUOTED.captures_iter(list.as_str()) {
                let Some(m) = item.get(1) else { continue };
                let action = m.as_str().trim();
                if !IAM_ACTION.is_match(action) {
                    continue;
                }
                let line = src.line_of(list.start() + m.start());
                out.push(permission(src, action, line, "policy_document", &statement, doc.clone()));
            }
        }
    }

    /// Input variables as configuration parameters.
    fn variables(&self, src: &SourceText, out: &mut ExtractionResult) {
        let text = src.content();
        for caps in VARIABLE_HEADER.captures_iter(text) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.name("name")) else {
                continue;
            };
            let line = src.line_of(whole.start());
            let Some(block) = matching_block(text, whole.end() - 1) else {
                out.error(
                    src.file_id(),
                    Some(line),
                    format!("unterminated variable block \"{}\"", name.as_str()),
                );
                continue;
            };

            let body = block.body;
            let description = ATTR_DESCRIPTION
                .captures(body)
                .and_then(|c| c.name("v"))
                .map(|v| v.as_str().replace("\\\"", "\"").trim().to_string())
                .filter(|d| !d.is_empty());
            let var_type = ATTR_TYPE
                .captures(body)
                .and_then(|c| c.name("v"))
                .map(|v| excerpt(v.as_str()));
            let default = ATTR_DEFAULT
                .captures(body)
                .and_then(|c| c.name("v"))
                .map(|v| excerpt(unquote(v.as_str())));
            let sensitive = ATTR_SENSITIVE.is_match(body) || is_sensitive_name(name.as_str());

            let doc = description
                .clone()
                .or_else(|| src.leading_comment(line, COMMENT_PREFIXES));

            let mut builder = Artifact::builder(ArtifactKind::ConfigParameter, name.as_str(), src.file_id(), line)
                .label("variable")
                .sensitive(sensitive)
                .maybe_doc(doc)
                .field(CONTEXT_FIELD, src.context(line))
                .field("description", description.unwrap_or_default())
                .field("type", var_type.unwrap_or_default());
            if let Some(default) = default {
                let value = if sensitive { "<redacted>".to_string() } else { default };
                builder = builder.field("default", value);
            }
            out.push(builder.build());
        }
    }
}

#[derive(Debug, Clone)]
struct Statement {
    effect: String,
    not_action: bool,
}

impl Statement {
    fn allow() -> Self {
        Self {
            effect: "Allow".to_string(),
            not_action: false,
        }
    }

    fn deny_all_but() -> Self {
        Self {
            effect: "Allow".to_string(),
            not_action: true,
        }
    }
}

/// `(action, statement)` pairs of a policy document, in document order.
///
/// Documents without a `Statement` are not policies and yield nothing.
fn policy_actions(document: &Value) -> Vec<(String, Statement)> {
    let statements: Vec<&Value> = match document.get("Statement") {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(single @ Value::Object(_)) => vec![single],
        _ => return Vec::new(),
    };

    let mut actions = Vec::new();
    for statement in statements {
        let effect = statement
            .get("Effect")
            .and_then(|e| e.as_str())
            .unwrap_or("Allow")
            .to_string();
        for (key, not_action) in [("Action", false), ("NotAction", true)] {
            let values: Vec<&str> = match statement.get(key) {
                Some(Value::String(s)) => vec![s.as_str()],
                Some(Value::Array(items)) => items.iter().filter_map(|v| v.as_str()).collect(),
                _ => continue,
            };
            for value in values {
                if IAM_ACTION.is_match(value.trim()) {
                    actions.push((
                        value.trim().to_string(),
                        Statement {
                            effect: effect.clone(),
                            not_action,
                        },
                    ));
                }
            }
        }
    }
    actions
}

fn permission(
    src: &SourceText,
    action: &str,
    line: usize,
    label: &str,
    statement: &Statement,
    doc: Option<String>,
) -> Artifact {
    let (service, operation) = action.split_once(':').unwrap_or(("", action));
    let summary = if statement.not_action {
        format!("{} everything except {}", statement.effect, action)
    } else {
        format!("{} {}", statement.effect, action)
    };
    Artifact::builder(ArtifactKind::Permission, action, src.file_id(), line)
        .label(label)
        .field("service", service)
        .field("action", operation)
        .field("effect", statement.effect.clone())
        .field("summary", summary)
        .field(CONTEXT_FIELD, src.context(line))
        .maybe_doc(doc)
        .build()
}

/// Documentation for a construct nested in a block: its own leading comment,
/// else the comment above the enclosing `resource`/`data`/`module` header.
fn block_doc(src: &SourceText, line: usize) -> Option<String> {
    if let Some(doc) = src.leading_comment(line, COMMENT_PREFIXES) {
        return Some(doc);
    }
    (1..line)
        .rev()
        .find(|l| BLOCK_HEADER.is_match(src.line_text(*l)))
        .and_then(|header| src.leading_comment(header, COMMENT_PREFIXES))
}

impl Extractor for TerraformExtractor {
    fn name(&self) -> &str {
        "terraform"
    }

    fn handles(&self, file_id: &str) -> bool {
        matches!(file_extension(file_id).as_deref(), Some("tf") | Some("hcl"))
    }

    fn extract_permissions(&self, src: &SourceText, out: &mut ExtractionResult) {
        self.patterns.scan(src, ArtifactKind::Permission, COMMENT_PREFIXES, out);
        self.policy_heredocs(src, out);
        self.hcl_actions(src, out);
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
        self.variables(src, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(content: &str) -> ExtractionResult {
        TerraformExtractor::new().unwrap().extract(content, "infra/main.tf")
    }

    fn names(result: &ExtractionResult, kind: ArtifactKind) -> Vec<&str> {
        result.by_kind(kind).map(|a| a.name()).collect()
    }

    #[test]
    fn test_json_policy_heredoc() {
        let content = r#"# Lets the exporter read invoices and push them to the queue.
resource "aws_iam_role_policy" "exporter" {
  policy = <<EOF
{
  "Version": "2012-10-17",
  "Statement": [
    {
      "Effect": "Allow",
      "Action": ["s3:GetObject", "s3:ListBucket"],
      "Resource": "*"
    },
    {
      "Effect": "Allow",
      "Action": "sqs:SendMessage",
      "Resource": "*"
    }
  ]
}
EOF
}
"#;
        let result = extract(content);
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(
            names(&result, ArtifactKind::Permission),
            vec!["s3:GetObject", "s3:ListBucket", "sqs:SendMessage"]
        );
        let get = result.by_kind(ArtifactKind::Permission).next().unwrap();
        assert_eq!(get.line(), 9);
        assert_eq!(get.field("service"), Some("s3"));
        assert_eq!(get.field("action"), Some("GetObject"));
        assert_eq!(
            get.doc(),
            Some("Lets the exporter read invoices and push them to the queue.")
        );
    }

    #[test]
    fn test_invalid_policy_json_is_one_error() {
        let content = r#"resource "aws_iam_policy" "broken" {
  policy = <<EOF
{ "Statement": [ { "Action": "s3:GetObject", } ]
EOF
}

resource "aws_s3_bucket" "invoices" {
  bucket = "invoices"
}
"#;
        let result = extract(content);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].line, Some(2));
        assert!(result.by_kind(ArtifactKind::Permission).next().is_none());
        // The rest of the file still extracts
        assert_eq!(
            names(&result, ArtifactKind::StateIndicator),
            vec!["aws_s3_bucket.invoices"]
        );
    }

    #[test]
    fn test_non_policy_heredoc_is_ignored() {
        let content = "resource \"aws_instance\" \"web\" {\n  user_data = <<EOT\n#!/bin/bash\necho hi\nEOT\n}\n";
        let result = extract(content);
        assert!(result.errors.is_empty());
        assert!(result.by_kind(ArtifactKind::Permission).next().is_none());
    }

    #[test]
    fn test_hcl_policy_document_actions() {
        let content = r#"data "aws_iam_policy_document" "reader" {
  statement {
    actions = [
      "dynamodb:GetItem",
      "dynamodb:Query",
      var.extra_action,
    ]
    resources = ["*"]
  }
}
"#;
        let result = extract(content);
        assert_eq!(
            names(&result, ArtifactKind::Permission),
            vec!["dynamodb:GetItem", "dynamodb:Query"]
        );
        let query = result.by_kind(ArtifactKind::Permission).nth(1).unwrap();
        assert_eq!(query.line(), 5);
        assert_eq!(query.label(), Some("policy_document"));
        // The policy document data source is also a dependency
        assert_eq!(
            names(&result, ArtifactKind::Dependency),
            vec!["aws_iam_policy_document.reader"]
        );
    }

    #[test]
    fn test_variable_blocks() {
        let content = r#"variable "instance_type" {
  type        = string
  default     = "t3.micro"
  description = "EC2 instance size for the API tier."
}

# Password for the reporting database user
variable "db_password" {
  type      = string
  default   = "hunter2"
  sensitive = true
}

variable "region" {
  type = string
}
"#;
        let result = extract(content);
        let vars: Vec<_> = result.by_kind(ArtifactKind::ConfigParameter).collect();
        assert_eq!(vars.len(), 3);

        assert_eq!(vars[0].name(), "instance_type");
        assert_eq!(vars[0].field("type"), Some("string"));
        assert_eq!(vars[0].field("default"), Some("t3.micro"));
        assert_eq!(vars[0].doc(), Some("EC2 instance size for the API tier."));
        assert!(!vars[0].is_sensitive());

        assert_eq!(vars[1].name(), "db_password");
        assert!(vars[1].is_sensitive());
        assert_eq!(vars[1].field("default"), Some("<redacted>"));
        assert_eq!(vars[1].doc(), Some("Password for the reporting database user"));

        assert_eq!(vars[2].name(), "region");
        assert!(!vars[2].is_documented());
        assert_eq!(vars[2].field("default"), None);
    }

    #[test]
    fn test_unterminated_variable_block() {
        let content = "variable \"ok\" {\n  type = string\n}\n\nvariable \"broken\" {\n  type = string\n";
        let result = extract(content);
        assert_eq!(names(&result, ArtifactKind::ConfigParameter), vec!["ok"]);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].line, Some(5));
    }

    #[test]
    fn test_pattern_facts() {
        let content = r#"terraform {
  backend "s3" {
    bucket         = "tf-state"
    dynamodb_table = "tf-locks"
  }
}

module "vpc" {
  source = "terraform-aws-modules/vpc/aws"
}

data "terraform_remote_state" "network" {
  backend = "s3"
}

resource "aws_db_instance" "main" {
  deletion_protection = true
  lifecycle {
    prevent_destroy = true
  }
}

resource "aws_iam_role_policy_attachment" "ro" {
  policy_arn = "arn:aws:iam::aws:policy/ReadOnlyAccess"
}
"#;
        let result = extract(content);
        assert_eq!(
            names(&result, ArtifactKind::StateIndicator),
            vec!["s3", "tf-locks", "network", "aws_db_instance.main"]
        );
        assert_eq!(
            names(&result, ArtifactKind::ErrorPattern),
            vec!["deletion_protection", "prevent_destroy"]
        );
        assert_eq!(
            names(&result, ArtifactKind::Dependency),
            vec!["terraform-aws-modules/vpc/aws"]
        );
        assert_eq!(names(&result, ArtifactKind::Permission), vec!["ReadOnlyAccess"]);
    }
}
