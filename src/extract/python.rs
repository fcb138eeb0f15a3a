//! Python extractor using tree-sitter.
//!
//! One parse and one walk per file. SDK calls are collected while walking and
//! resolved afterwards, once every `boto3.client("svc")` binding in the file
//! is known.

use std::collections::HashMap;

use tree_sitter::{Language, Node, Parser};

use crate::artifact::{is_sensitive_name, Artifact, ArtifactKind, ExtractionResult, CONTEXT_FIELD};

use super::config_file::ValueType;
use super::sdk::permission_for_call;
use super::{bounded, excerpt, file_extension, unquote, Extractor, SourceText};

/// Nesting depth beyond which the walk stops descending.
const MAX_DEPTH: usize = 256;

const COMMENT_PREFIXES: &[&str] = &["#"];

const CACHE_DECORATORS: &[&str] = &["lru_cache", "cache", "cached_property", "cached", "memoize"];

const LOCK_TYPES: &[&str] = &["Lock", "RLock", "Semaphore", "BoundedSemaphore", "Condition"];

const MUTABLE_FACTORIES: &[&str] = &[
    "dict",
    "list",
    "set",
    "defaultdict",
    "OrderedDict",
    "deque",
    "Counter",
];

const ENV_GETTERS: &[&str] = &["os.getenv", "os.environ.get", "getenv", "environ.get"];

const CASTS: &[&str] = &["int", "float", "bool", "str"];

pub struct PythonExtractor {
    language: Language,
}

impl Default for PythonExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl PythonExtractor {
    pub fn new() -> Self {
        Self {
            language: tree_sitter_python::LANGUAGE.into(),
        }
    }

    fn create_parser(&self) -> anyhow::Result<Parser> {
        let mut parser = Parser::new();
        parser.set_language(&self.language)?;
        Ok(parser)
    }

    /// Parse and walk once, collecting every kind of artifact.
    fn analyze(&self, src: &SourceText) -> ExtractionResult {
        let mut out = ExtractionResult::new();

        let mut parser = match self.create_parser() {
            Ok(p) => p,
            Err(e) => {
                out.error(src.file_id(), None, format!("python parser unavailable: {}", e));
                return out;
            }
        };
        let Some(tree) = parser.parse(src.content(), None) else {
            out.error(src.file_id(), None, "python parse produced no tree");
            return out;
        };

        let root = tree.root_node();
        if root.has_error() {
            let line = first_error(root, 0).map(|n| n.start_position().row + 1);
            out.error(src.file_id(), line, "syntax error");
        }

        let mut walker = Walker {
            src,
            out,
            scopes: Vec::new(),
            bindings: HashMap::new(),
            pending: Vec::new(),
            too_deep: false,
        };
        walker.visit(root, 0);
        walker.finish()
    }

    fn extract_kind(&self, src: &SourceText, kind: ArtifactKind, out: &mut ExtractionResult) {
        let analyzed = self.analyze(src);
        out.artifacts
            .extend(analyzed.artifacts.into_iter().filter(|a| a.kind() == kind));
        out.errors.extend(analyzed.errors);
    }
}

/// Deepest-first search for the first ERROR or MISSING node.
fn first_error(node: Node, depth: usize) -> Option<Node> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if depth > MAX_DEPTH {
        return None;
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|c| c.has_error() || c.is_missing())
        .find_map(|c| first_error(c, depth + 1))
}

/// An SDK-looking call awaiting client binding resolution.
struct PendingCall {
    receiver: String,
    method: String,
    line: usize,
    inline_service: Option<String>,
    doc: Option<String>,
}

struct Walker<'s, 'a> {
    src: &'s SourceText<'a>,
    out: ExtractionResult,
    /// Docstrings of the enclosing function/class definitions.
    scopes: Vec<Option<String>>,
    /// Receiver text -> service, from `x = boto3.client("svc")`.
    bindings: HashMap<String, String>,
    pending: Vec<PendingCall>,
    too_deep: bool,
}

impl<'s, 'a> Walker<'s, 'a> {
    fn text(&self, node: Node) -> &'a str {
        node.utf8_text(self.src.content().as_bytes()).unwrap_or("")
    }

    fn line(node: Node) -> usize {
        node.start_position().row + 1
    }

    /// Leading comment, else the innermost enclosing docstring.
    fn doc_for(&self, line: usize) -> Option<String> {
        self.src
            .leading_comment(line, COMMENT_PREFIXES)
            .or_else(|| self.scopes.last().cloned().flatten())
    }

    fn artifact(&self, kind: ArtifactKind, name: &str, line: usize, label: &str) -> crate::artifact::ArtifactBuilder {
        Artifact::builder(kind, name, self.src.file_id(), line)
            .label(label)
            .field(CONTEXT_FIELD, self.src.context(line))
    }

    fn visit(&mut self, node: Node, depth: usize) {
        if depth > MAX_DEPTH {
            if !self.too_deep {
                self.too_deep = true;
                self.out.error(
                    self.src.file_id(),
                    Some(Self::line(node)),
                    format!("nesting deeper than {} levels, inner code skipped", MAX_DEPTH),
                );
            }
            return;
        }

        let mut scoped = false;
        match node.kind() {
            "import_statement" => self.import(node),
            "import_from_statement" => self.import_from(node),
            "function_definition" | "class_definition" => {
                let doc = self.docstring(node);
                self.scopes.push(doc);
                scoped = true;
            }
            "decorated_definition" => self.decorators(node),
            "except_clause" => self.except(node),
            "raise_statement" => self.raise(node),
            "call" => self.call(node),
            "subscript" => self.environ_subscript(node),
            "assignment" => self.assignment(node),
            "global_statement" => self.global(node),
            _ => {}
        }

        let mut cursor = node.walk();
        let children: Vec<Node> = node.named_children(&mut cursor).collect();
        for child in children {
            self.visit(child, depth + 1);
        }

        if scoped {
            self.scopes.pop();
        }
    }

    fn finish(mut self) -> ExtractionResult {
        let pending = std::mem::take(&mut self.pending);
        for call in pending {
            let bound = call
                .inline_service
                .clone()
                .or_else(|| self.bindings.get(&call.receiver).cloned());
            let Some(permission) = permission_for_call(&call.receiver, &call.method, bound.as_deref()) else {
                continue;
            };
            let artifact = self
                .artifact(ArtifactKind::Permission, &permission.name(), call.line, "sdk_call")
                .field("service", permission.service.clone())
                .field("action", permission.action.clone())
                .field("summary", format!("{}.{}()", call.receiver, call.method))
                .maybe_doc(call.doc)
                .build();
            self.out.push(artifact);
        }
        self.out
    }

    /// Docstring of a function or class definition.
    fn docstring(&self, definition: Node) -> Option<String> {
        let body = definition.child_by_field_name("body")?;
        let mut cursor = body.walk();
        let first = body
            .named_children(&mut cursor)
            .find(|n| n.kind() != "comment")?;
        if first.kind() != "expression_statement" {
            return None;
        }
        let expr = first.named_child(0)?;
        if !matches!(expr.kind(), "string" | "concatenated_string") {
            return None;
        }
        let doc = unquote(self.text(expr)).trim().to_string();
        if doc.is_empty() {
            None
        } else {
            Some(doc)
        }
    }

    fn import(&mut self, node: Node) {
        let mut cursor = node.walk();
        let names: Vec<Node> = node.children_by_field_name("name", &mut cursor).collect();
        for name in names {
            let module = match name.kind() {
                "aliased_import" => name.child_by_field_name("name").map(|n| self.text(n)),
                _ => Some(self.text(name)),
            };
            if let Some(module) = module {
                self.dependency(module, Self::line(node));
            }
        }
    }

    fn import_from(&mut self, node: Node) {
        let Some(module) = node.child_by_field_name("module_name") else {
            return;
        };
        if module.kind() == "relative_import" {
            return;
        }
        let text = self.text(module);
        if text == "__future__" {
            return;
        }
        self.dependency(text, Self::line(node));
    }

    fn dependency(&mut self, module: &str, line: usize) {
        let package = module.split('.').next().unwrap_or(module).trim();
        if package.is_empty() {
            return;
        }
        let artifact = self
            .artifact(ArtifactKind::Dependency, package, line, "import")
            .field("module", module)
            .maybe_doc(self.doc_for(line))
            .build();
        self.out.push(artifact);
    }

    fn decorators(&mut self, node: Node) {
        let doc = node
            .child_by_field_name("definition")
            .and_then(|d| self.docstring(d));

        let mut cursor = node.walk();
        let decorators: Vec<Node> = node
            .named_children(&mut cursor)
            .filter(|n| n.kind() == "decorator")
            .collect();
        for decorator in decorators {
            let Some(expr) = decorator.named_child(0) else { continue };
            let callee = if expr.kind() == "call" {
                expr.child_by_field_name("function").unwrap_or(expr)
            } else {
                expr
            };
            let base = self.text(callee);
            let last = base.rsplit('.').next().unwrap_or(base);
            let line = Self::line(decorator);
            let doc = doc
                .clone()
                .or_else(|| self.src.leading_comment(line, COMMENT_PREFIXES));

            let artifact = if last.to_lowercase().contains("retry") || base.starts_with("backoff.") {
                self.artifact(ArtifactKind::ErrorPattern, base, line, "retry")
                    .field("summary", format!("Retried via @{}", excerpt(self.text(expr))))
            } else if CACHE_DECORATORS.contains(&last) {
                self.artifact(ArtifactKind::StateIndicator, base, line, "cache")
                    .field("summary", format!("Cached via @{}", base))
            } else {
                continue;
            };
            self.out.push(artifact.maybe_doc(doc).build());
        }
    }

    fn except(&mut self, node: Node) {
        let line = Self::line(node);
        let mut cursor = node.walk();
        let caught = node
            .named_children(&mut cursor)
            .find(|n| !matches!(n.kind(), "block" | "comment"));

        let (names, label) = match caught {
            Some(expr) => (self.exception_names(expr), "except"),
            None => (vec!["BaseException".to_string()], "bare_except"),
        };
        let doc = self.doc_for(line);
        for name in names {
            let artifact = self
                .artifact(ArtifactKind::ErrorPattern, &name, line, label)
                .field("summary", format!("Handles {}", name))
                .maybe_doc(doc.clone())
                .build();
            self.out.push(artifact);
        }
    }

    fn exception_names(&self, expr: Node) -> Vec<String> {
        match expr.kind() {
            "as_pattern" => expr
                .named_child(0)
                .map(|n| self.exception_names(n))
                .unwrap_or_default(),
            "tuple" | "parenthesized_expression" | "expression_list" => {
                let mut cursor = expr.walk();
                let children: Vec<Node> = expr.named_children(&mut cursor).collect();
                children
                    .into_iter()
                    .flat_map(|c| self.exception_names(c))
                    .collect()
            }
            "identifier" | "attribute" => vec![self.text(expr).to_string()],
            _ => vec![excerpt(self.text(expr))],
        }
    }

    fn raise(&mut self, node: Node) {
        let line = Self::line(node);
        let name = match node.named_child(0) {
            Some(expr) if expr.kind() == "call" => expr
                .child_by_field_name("function")
                .map(|f| self.text(f).to_string())
                .unwrap_or_else(|| excerpt(self.text(expr))),
            Some(expr) => excerpt(self.text(expr)),
            None => "raise".to_string(),
        };
        let artifact = self
            .artifact(ArtifactKind::ErrorPattern, &name, line, "raise")
            .field("summary", format!("Raises {}", name))
            .maybe_doc(self.doc_for(line))
            .build();
        self.out.push(artifact);
    }

    fn call(&mut self, node: Node) {
        let Some(function) = node.child_by_field_name("function") else {
            return;
        };
        let callee = self.text(function);
        let last = callee.rsplit('.').next().unwrap_or(callee);
        let line = Self::line(node);

        if ENV_GETTERS.contains(&callee) {
            self.env_getter(node, line);
            return;
        }

        if LOCK_TYPES.contains(&last) {
            let target = assignment_target(node).map(|t| self.text(t)).unwrap_or(callee);
            let artifact = self
                .artifact(ArtifactKind::StateIndicator, target, line, "lock")
                .field("summary", format!("Synchronized with {}", callee))
                .maybe_doc(self.doc_for(line))
                .build();
            self.out.push(artifact);
            return;
        }

        if function.kind() != "attribute" {
            return;
        }
        let (Some(object), Some(attribute)) = (
            function.child_by_field_name("object"),
            function.child_by_field_name("attribute"),
        ) else {
            return;
        };

        let mut method = self.text(attribute).to_string();
        if method == "get_paginator" {
            match first_string_arg(node).map(|s| unquote(self.text(s)).to_string()) {
                Some(op) => method = op,
                None => return,
            }
        }

        let (receiver, inline_service) = if object.kind() == "call" {
            match self.client_service(object) {
                Some(service) => (service.clone(), Some(service)),
                None => return,
            }
        } else {
            (self.text(object).to_string(), None)
        };

        self.pending.push(PendingCall {
            receiver,
            method,
            line,
            inline_service,
            doc: self.doc_for(line),
        });
    }

    /// Service named by a `x.client("svc")` / `x.resource("svc")` call.
    fn client_service(&self, call: Node) -> Option<String> {
        let function = call.child_by_field_name("function")?;
        if function.kind() != "attribute" {
            return None;
        }
        let attribute = function.child_by_field_name("attribute")?;
        if !matches!(self.text(attribute), "client" | "resource") {
            return None;
        }
        let service = unquote(self.text(first_string_arg(call)?)).trim().to_lowercase();
        if service.is_empty() {
            None
        } else {
            Some(service)
        }
    }

    fn env_getter(&mut self, node: Node, line: usize) {
        let Some(args) = node.child_by_field_name("arguments") else {
            return;
        };
        let mut cursor = args.walk();
        let positional: Vec<Node> = args
            .named_children(&mut cursor)
            .filter(|n| !matches!(n.kind(), "keyword_argument" | "comment"))
            .collect();
        let Some(name) = positional.first().filter(|n| n.kind() == "string") else {
            return;
        };

        let mut cursor = args.walk();
        let default = positional.get(1).copied().or_else(|| {
            args.named_children(&mut cursor)
                .filter(|n| n.kind() == "keyword_argument")
                .find(|n| {
                    n.child_by_field_name("name")
                        .map(|k| self.text(k) == "default")
                        .unwrap_or(false)
                })
                .and_then(|n| n.child_by_field_name("value"))
        });

        let name = unquote(self.text(*name)).to_string();
        let value_type = self.cast_type(node).or_else(|| default.and_then(|d| self.literal_type(d)));
        self.config_parameter(&name, line, default.map(|d| unquote(self.text(d)).to_string()), value_type);
    }

    /// `os.environ["X"]` / `environ["X"]`.
    fn environ_subscript(&mut self, node: Node) {
        let Some(value) = node.child_by_field_name("value") else {
            return;
        };
        if !matches!(self.text(value), "os.environ" | "environ") {
            return;
        }
        let Some(key) = node.child_by_field_name("subscript").filter(|k| k.kind() == "string") else {
            return;
        };
        let name = unquote(self.text(key)).to_string();
        let value_type = self.cast_type(node);
        self.config_parameter(&name, Self::line(node), None, value_type);
    }

    fn config_parameter(&mut self, name: &str, line: usize, default: Option<String>, value_type: Option<ValueType>) {
        if name.trim().is_empty() {
            return;
        }
        let sensitive = is_sensitive_name(name);
        let mut builder = self
            .artifact(ArtifactKind::ConfigParameter, name, line, "env_var")
            .sensitive(sensitive)
            .maybe_doc(self.doc_for(line));
        if let Some(value_type) = value_type {
            builder = builder.field("type", value_type.as_str());
        }
        if let Some(default) = default {
            let value = if sensitive { "<redacted>".to_string() } else { excerpt(&default) };
            builder = builder.field("default", value);
        }
        self.out.push(builder.build());
    }

    /// Type from an enclosing `int(...)`-style cast.
    fn cast_type(&self, node: Node) -> Option<ValueType> {
        let args = node.parent().filter(|p| p.kind() == "argument_list")?;
        let call = args.parent().filter(|p| p.kind() == "call")?;
        let function = call.child_by_field_name("function")?;
        let name = self.text(function);
        if !CASTS.contains(&name) {
            return None;
        }
        Some(match name {
            "int" => ValueType::Int,
            "float" => ValueType::Float,
            "bool" => ValueType::Bool,
            _ => ValueType::String,
        })
    }

    fn literal_type(&self, node: Node) -> Option<ValueType> {
        match node.kind() {
            "integer" => Some(ValueType::Int),
            "float" => Some(ValueType::Float),
            "true" | "false" => Some(ValueType::Bool),
            "string" => Some(ValueType::infer(unquote(self.text(node)))),
            _ => None,
        }
    }

    fn assignment(&mut self, node: Node) {
        let (Some(left), Some(right)) = (
            node.child_by_field_name("left"),
            node.child_by_field_name("right"),
        ) else {
            return;
        };

        if right.kind() == "call" {
            if let Some(service) = self.client_service(right) {
                let receiver = self.text(left).to_string();
                self.bindings.insert(receiver, service);
            }
        }

        let module_level = node
            .parent()
            .filter(|p| p.kind() == "expression_statement")
            .and_then(|p| p.parent())
            .map(|p| p.kind() == "module")
            .unwrap_or(false);
        if !module_level || left.kind() != "identifier" {
            return;
        }
        let name = self.text(left);
        if name.starts_with("__") {
            return;
        }
        let mutable = match right.kind() {
            "list" | "dictionary" | "set" | "list_comprehension" | "dictionary_comprehension"
            | "set_comprehension" => true,
            "call" => right
                .child_by_field_name("function")
                .map(|f| {
                    let callee = self.text(f);
                    let last = callee.rsplit('.').next().unwrap_or(callee);
                    MUTABLE_FACTORIES.contains(&last)
                })
                .unwrap_or(false),
            _ => false,
        };
        if mutable {
            let line = Self::line(node);
            let artifact = self
                .artifact(ArtifactKind::StateIndicator, name, line, "global_state")
                .field("summary", format!("Module-level mutable {}", name))
                .maybe_doc(self.doc_for(line))
                .build();
            self.out.push(artifact);
        }
    }

    fn global(&mut self, node: Node) {
        let line = Self::line(node);
        let mut cursor = node.walk();
        let names: Vec<Node> = node
            .named_children(&mut cursor)
            .filter(|n| n.kind() == "identifier")
            .collect();
        let doc = self.doc_for(line);
        for name in names {
            let name = self.text(name);
            let artifact = self
                .artifact(ArtifactKind::StateIndicator, name, line, "global")
                .field("summary", format!("Rebinds module global {}", name))
                .maybe_doc(doc.clone())
                .build();
            self.out.push(artifact);
        }
    }
}

/// Left side of the assignment whose right side is this node.
fn assignment_target(node: Node) -> Option<Node> {
    let parent = node.parent().filter(|p| p.kind() == "assignment")?;
    let right = parent.child_by_field_name("right")?;
    if right.id() != node.id() {
        return None;
    }
    parent.child_by_field_name("left")
}

fn first_string_arg(call: Node) -> Option<Node> {
    let args = call.child_by_field_name("arguments")?;
    let first = args.named_child(0)?;
    (first.kind() == "string").then_some(first)
}

impl Extractor for PythonExtractor {
    fn name(&self) -> &str {
        "python"
    }

    fn handles(&self, file_id: &str) -> bool {
        matches!(file_extension(file_id).as_deref(), Some("py") | Some("pyi"))
    }

    fn extract_permissions(&self, src: &SourceText, out: &mut ExtractionResult) {
        self.extract_kind(src, ArtifactKind::Permission, out);
    }

    fn extract_error_patterns(&self, src: &SourceText, out: &mut ExtractionResult) {
        self.extract_kind(src, ArtifactKind::ErrorPattern, out);
    }

    fn extract_state_management(&self, src: &SourceText, out: &mut ExtractionResult) {
        self.extract_kind(src, ArtifactKind::StateIndicator, out);
    }

    fn extract_dependencies(&self, src: &SourceText, out: &mut ExtractionResult) {
        self.extract_kind(src, ArtifactKind::Dependency, out);
    }

    fn extract_config(&self, src: &SourceText, out: &mut ExtractionResult) {
        self.extract_kind(src, ArtifactKind::ConfigParameter, out);
    }

    /// Single parse shared by all capabilities.
    fn extract(&self, content: &str, file_id: &str) -> ExtractionResult {
        let mut out = ExtractionResult::new();
        let content = bounded(content, file_id, &mut out);
        let src = SourceText::new(content, file_id);
        out.merge(self.analyze(&src));
        out.scanned = 1;
        out.finalize();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORKER: &str = r#""""Invoice export worker."""
import os
import json as j
from concurrent.futures import ThreadPoolExecutor
from . import models

import boto3
from tenacity import retry

_CACHE = {}
lock = threading.Lock()

# Bucket holding rendered invoices, e.g. invoices-prod
BUCKET = os.environ.get("INVOICE_BUCKET", "invoices-dev")
TIMEOUT = int(os.getenv("EXPORT_TIMEOUT", "30"))
API_TOKEN = os.environ["API_TOKEN"]

s3 = boto3.client("s3")


class Exporter:
    """Pushes rendered invoices to S3."""

    def __init__(self):
        self.queue = boto3.client("sqs")

    @retry
    def upload(self, key, body):
        """Upload one invoice; retried on throttling."""
        try:
            s3.put_object(Bucket=BUCKET, Key=key, Body=body)
        except (ValueError, KeyError) as exc:
            raise ExportError(key) from exc
        self.queue.send_message(QueueUrl="q", MessageBody=key)

    def listing(self):
        paginator = s3.get_paginator("list_objects_v2")
        return paginator


def bump():
    global _CACHE
    _CACHE = {}
"#;

    fn extract(content: &str) -> ExtractionResult {
        PythonExtractor::new().extract(content, "svc/worker.py")
    }

    fn names(result: &ExtractionResult, kind: ArtifactKind) -> Vec<&str> {
        result.by_kind(kind).map(|a| a.name()).collect()
    }

    fn find<'r>(result: &'r ExtractionResult, kind: ArtifactKind, name: &str) -> &'r Artifact {
        result
            .by_kind(kind)
            .find(|a| a.name() == name)
            .unwrap_or_else(|| panic!("no {} artifact named {}", kind, name))
    }

    #[test]
    fn test_imports() {
        let result = extract(WORKER);
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(
            names(&result, ArtifactKind::Dependency),
            vec!["os", "json", "concurrent", "boto3", "tenacity"]
        );
        let concurrent = find(&result, ArtifactKind::Dependency, "concurrent");
        assert_eq!(concurrent.field("module"), Some("concurrent.futures"));
    }

    #[test]
    fn test_sdk_calls_resolve_bindings() {
        let result = extract(WORKER);
        assert_eq!(
            names(&result, ArtifactKind::Permission),
            vec!["s3:PutObject", "sqs:SendMessage", "s3:ListBucket"]
        );

        let put = find(&result, ArtifactKind::Permission, "s3:PutObject");
        assert_eq!(put.field("service"), Some("s3"));
        assert_eq!(put.field("action"), Some("PutObject"));
        assert_eq!(put.doc(), Some("Upload one invoice; retried on throttling."));

        let list = find(&result, ArtifactKind::Permission, "s3:ListBucket");
        assert!(!list.is_documented());
    }

    #[test]
    fn test_error_patterns() {
        let result = extract(WORKER);
        assert_eq!(
            names(&result, ArtifactKind::ErrorPattern),
            vec!["retry", "ValueError", "KeyError", "ExportError"]
        );
        let retry = find(&result, ArtifactKind::ErrorPattern, "retry");
        assert_eq!(retry.label(), Some("retry"));
        assert!(retry.is_documented());
        assert_eq!(
            find(&result, ArtifactKind::ErrorPattern, "ExportError").label(),
            Some("raise")
        );
    }

    #[test]
    fn test_state_indicators() {
        let result = extract(WORKER);
        let state: Vec<_> = result
            .by_kind(ArtifactKind::StateIndicator)
            .map(|a| (a.name(), a.label().unwrap_or("")))
            .collect();
        assert_eq!(
            state,
            vec![("_CACHE", "global_state"), ("lock", "lock"), ("_CACHE", "global")]
        );
    }

    #[test]
    fn test_config_parameters() {
        let result = extract(WORKER);
        assert_eq!(
            names(&result, ArtifactKind::ConfigParameter),
            vec!["INVOICE_BUCKET", "EXPORT_TIMEOUT", "API_TOKEN"]
        );

        let bucket = find(&result, ArtifactKind::ConfigParameter, "INVOICE_BUCKET");
        assert_eq!(bucket.field("default"), Some("invoices-dev"));
        assert_eq!(bucket.field("type"), Some("string"));
        assert_eq!(bucket.doc(), Some("Bucket holding rendered invoices, e.g. invoices-prod"));

        let timeout = find(&result, ArtifactKind::ConfigParameter, "EXPORT_TIMEOUT");
        assert_eq!(timeout.field("type"), Some("int"));
        assert_eq!(timeout.field("default"), Some("30"));
        assert!(!timeout.is_documented());

        let token = find(&result, ArtifactKind::ConfigParameter, "API_TOKEN");
        assert!(token.is_sensitive());
        assert_eq!(token.field("default"), None);
    }

    #[test]
    fn test_syntax_error_keeps_partial_results() {
        let content = "import os\n\ndef broken(:\n    pass\n";
        let result = extract(content);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].reason, "syntax error");
        assert!(result.by_kind(ArtifactKind::Dependency).any(|a| a.name() == "os"));
    }

    #[test]
    fn test_unknown_receivers_are_not_permissions() {
        let content = "import requests\nr = requests.get(url)\nlogger.info('x')\nitems.append(1)\n";
        let result = extract(content);
        assert!(result.by_kind(ArtifactKind::Permission).next().is_none());
    }

    #[test]
    fn test_chained_client_call() {
        let result = extract("import boto3\nboto3.client('ec2').describe_instances()\n");
        assert_eq!(names(&result, ArtifactKind::Permission), vec!["ec2:DescribeInstances"]);
    }

    #[test]
    fn test_extract_is_deterministic() {
        assert_eq!(extract(WORKER), extract(WORKER));
    }

    #[test]
    fn test_capabilities_match_single_pass() {
        let ex = PythonExtractor::new();
        let src = SourceText::new(WORKER, "svc/worker.py");
        let mut out = ExtractionResult::new();
        ex.extract_permissions(&src, &mut out);
        out.finalize();
        assert_eq!(out.artifacts.len(), 3);
        assert!(out.artifacts.iter().all(|a| a.kind() == ArtifactKind::Permission));
    }
}
