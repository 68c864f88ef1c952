//! Django-style template engine with Tailwind support.
//!
//! Workflow:
//! 1. `render_template` loads the child template from the configured directory.
//! 2. `tokenize_template` splits content into Text, Variable, and Tag tokens.
//! 3. `parse_tokens` and `parse_nodes` build an AST of `Node`.
//! 4. Child `Block` definitions and `Extends` tag are collected.
//! 5. `merge_blocks` merges child blocks into the base template, replacing all matching blocks by name.
//! 6. `render_nodes` walks the merged AST and outputs HTML, escaping variables, evaluating
//!    `if`/`if not` on truthiness, expanding `for` loops, and emitting the Tailwind CDN via `{% tailwind %}`.
//!
//! Runtime logging is controlled via `set_display_logs`.

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::AppError;
use crate::router::Response;
use crate::settings::TemplateSettings;

/// Global switch for enabling/disabling internal template logs
static DISPLAY_LOGS: Lazy<AtomicBool> = Lazy::new(|| AtomicBool::new(false));

static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)(\{\{.*?\}\}|\{%.*?%\})").expect("token pattern compiles"));

/// Enable or disable internal debug logs for the template engine
pub fn set_display_logs(enabled: bool) {
    DISPLAY_LOGS.store(enabled, Ordering::Relaxed);
}

/// Internal debug: logs only if DISPLAY_LOGS is true
macro_rules! tdebug {
    ($($arg:tt)+) => {
        if DISPLAY_LOGS.load(Ordering::Relaxed) {
            debug!($($arg)+);
        }
    }
}

/// Rendering context: top-level names to values.
pub type Context = HashMap<String, TemplateValue>;

/// Supported value types for template context
#[derive(Clone, Debug, PartialEq)]
pub enum TemplateValue {
    Null,
    String(String),
    Bool(bool),
    Number(f64),
    List(Vec<TemplateValue>),
    Object(HashMap<String, TemplateValue>),
}

impl TemplateValue {
    /// Convert the value to a string for rendering
    pub fn as_string(&self) -> String {
        match self {
            TemplateValue::Null => String::new(),
            TemplateValue::String(s) => s.clone(),
            TemplateValue::Bool(b) => b.to_string(),
            TemplateValue::Number(n) => n.to_string(),
            TemplateValue::List(_) | TemplateValue::Object(_) => String::new(),
        }
    }

    /// `false`, null, zero, and empty strings/lists/objects are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            TemplateValue::Null => false,
            TemplateValue::String(s) => !s.is_empty(),
            TemplateValue::Bool(b) => *b,
            TemplateValue::Number(n) => *n != 0.0,
            TemplateValue::List(items) => !items.is_empty(),
            TemplateValue::Object(map) => !map.is_empty(),
        }
    }

    /// Build a value from anything serde can serialize.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self, AppError> {
        serde_json::to_value(value)
            .map(TemplateValue::from)
            .map_err(|e| AppError::Template(e.to_string()))
    }

    /// Look up a key on an object value.
    pub fn get(&self, key: &str) -> Option<&TemplateValue> {
        match self {
            TemplateValue::Object(map) => map.get(key),
            _ => None,
        }
    }
}

impl From<serde_json::Value> for TemplateValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => TemplateValue::Null,
            serde_json::Value::Bool(b) => TemplateValue::Bool(b),
            serde_json::Value::Number(n) => TemplateValue::Number(n.as_f64().unwrap_or_default()),
            serde_json::Value::String(s) => TemplateValue::String(s),
            serde_json::Value::Array(items) => {
                TemplateValue::List(items.into_iter().map(TemplateValue::from).collect())
            }
            serde_json::Value::Object(map) => TemplateValue::Object(
                map.into_iter()
                    .map(|(k, v)| (k, TemplateValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for TemplateValue {
    fn from(value: &str) -> Self {
        TemplateValue::String(value.to_string())
    }
}

impl From<String> for TemplateValue {
    fn from(value: String) -> Self {
        TemplateValue::String(value)
    }
}

impl From<bool> for TemplateValue {
    fn from(value: bool) -> Self {
        TemplateValue::Bool(value)
    }
}

impl From<i64> for TemplateValue {
    fn from(value: i64) -> Self {
        TemplateValue::Number(value as f64)
    }
}

impl fmt::Display for TemplateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_string())
    }
}

/// Token types extracted from the template
#[derive(Debug, Clone)]
pub enum Token {
    Text(String),     // Plain text
    Variable(String), // {{ variable }}
    Tag(String),      // {% tag %}
}

/// AST node types for the template engine
#[derive(Debug, Clone)]
pub enum Node {
    Text(String),
    Variable(String),
    If {
        condition: String,
        then_body: Vec<Node>,
        else_body: Vec<Node>,
    },
    For {
        var_name: String,
        list_name: String,
        body: Vec<Node>,
    },
    Block {
        name: String,
        body: Vec<Node>,
    },
    Extends(String), // {% extends "base.html" %}
    Tailwind,        // {% tailwind %}
}

/// Tokenizes the template content into a Vec<Token>
pub fn tokenize_template(content: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut last_end = 0;
    for mat in TOKEN_RE.find_iter(content) {
        let start = mat.start();
        let end = mat.end();
        if start > last_end {
            tokens.push(Token::Text(content[last_end..start].to_string()));
        }
        let m = mat.as_str().trim();
        if m.starts_with("{{") {
            let inner = m
                .trim_start_matches("{{")
                .trim_end_matches("}}")
                .trim()
                .to_string();
            tdebug!("tokenize: Variable '{{ {{ {} }} }}'", inner);
            tokens.push(Token::Variable(inner));
        } else {
            let inner = m
                .trim_start_matches("{%")
                .trim_end_matches("%}")
                .trim()
                .to_string();
            tdebug!("tokenize: Tag '{{% {} %}}'", inner);
            tokens.push(Token::Tag(inner));
        }
        last_end = end;
    }
    if last_end < content.len() {
        tokens.push(Token::Text(content[last_end..].to_string()));
    }
    tokens
}

/// Parses a sequence of Token into an AST of Node
pub fn parse_tokens(tokens: &[Token]) -> Vec<Node> {
    let mut idx = 0;
    parse_nodes(tokens, &mut idx, &[])
}

/// Recursive parser: consumes tokens until an `end_tag` is found
fn parse_nodes(tokens: &[Token], idx: &mut usize, end_tags: &[&str]) -> Vec<Node> {
    let mut nodes = Vec::new();
    while *idx < tokens.len() {
        match &tokens[*idx] {
            Token::Text(t) => {
                nodes.push(Node::Text(t.clone()));
                *idx += 1;
            }
            Token::Variable(v) => {
                nodes.push(Node::Variable(v.clone()));
                *idx += 1;
            }
            Token::Tag(tag) => {
                let t = tag.trim();
                if end_tags.contains(&t) {
                    break;
                }
                if let Some(rest) = t.strip_prefix("extends ") {
                    nodes.push(Node::Extends(rest.trim().trim_matches('"').to_string()));
                    *idx += 1;
                    continue;
                }
                if let Some(name) = t.strip_prefix("block ") {
                    *idx += 1;
                    let body = parse_nodes(tokens, idx, &["endblock"]);
                    *idx += 1; // skip endblock
                    nodes.push(Node::Block {
                        name: name.trim().to_string(),
                        body,
                    });
                    continue;
                }
                if let Some(cond) = t.strip_prefix("if ") {
                    *idx += 1;
                    let then_body = parse_nodes(tokens, idx, &["else", "endif"]);
                    let mut else_body = Vec::new();
                    if let Some(Token::Tag(tt)) = tokens.get(*idx) {
                        if tt.trim() == "else" {
                            *idx += 1;
                            else_body = parse_nodes(tokens, idx, &["endif"]);
                        }
                    }
                    *idx += 1; // skip endif
                    nodes.push(Node::If {
                        condition: cond.trim().to_string(),
                        then_body,
                        else_body,
                    });
                    continue;
                }
                if let Some(rest) = t.strip_prefix("for ") {
                    let parts: Vec<&str> = rest.split_whitespace().collect();
                    if parts.len() == 3 && parts[1] == "in" {
                        *idx += 1;
                        let body = parse_nodes(tokens, idx, &["endfor"]);
                        *idx += 1; // skip endfor
                        nodes.push(Node::For {
                            var_name: parts[0].to_string(),
                            list_name: parts[2].to_string(),
                            body,
                        });
                        continue;
                    }
                }
                if t == "tailwind" {
                    nodes.push(Node::Tailwind);
                    *idx += 1;
                    continue;
                }
                tdebug!("parse: skipping unknown tag '{}'", t);
                *idx += 1;
            }
        }
    }
    nodes
}

/// Resolves a dotted variable path 'a.b.c' within the context
fn resolve_variable<'a>(name: &str, context: &'a Context) -> Option<&'a TemplateValue> {
    let mut parts = name.split('.');
    let mut current = context.get(parts.next()?)?;
    for key in parts {
        current = current.get(key)?;
    }
    Some(current)
}

/// Evaluates `name` or `not name` against the context.
fn evaluate_condition(condition: &str, context: &Context) -> bool {
    match condition.strip_prefix("not ") {
        Some(inner) => !evaluate_condition(inner.trim(), context),
        None => resolve_variable(condition, context)
            .map(TemplateValue::is_truthy)
            .unwrap_or(false),
    }
}

/// Escapes the five HTML-significant characters.
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Merges child blocks into base AST by matching block names
fn merge_blocks(nodes: &[Node], child_blocks: &HashMap<String, Vec<Node>>) -> Vec<Node> {
    nodes
        .iter()
        .map(|node| match node {
            Node::Block { name, body } => {
                if let Some(child) = child_blocks.get(name) {
                    Node::Block {
                        name: name.clone(),
                        body: child.clone(),
                    }
                } else {
                    Node::Block {
                        name: name.clone(),
                        body: merge_blocks(body, child_blocks),
                    }
                }
            }
            Node::If {
                condition,
                then_body,
                else_body,
            } => Node::If {
                condition: condition.clone(),
                then_body: merge_blocks(then_body, child_blocks),
                else_body: merge_blocks(else_body, child_blocks),
            },
            Node::For {
                var_name,
                list_name,
                body,
            } => Node::For {
                var_name: var_name.clone(),
                list_name: list_name.clone(),
                body: merge_blocks(body, child_blocks),
            },
            other => other.clone(),
        })
        .collect()
}

/// Renders the AST into HTML string using the context
pub fn render_nodes(nodes: &[Node], context: &Context) -> String {
    let mut out = String::new();
    for node in nodes {
        match node {
            Node::Text(t) => out.push_str(t),
            Node::Variable(name) => {
                if let Some(val) = resolve_variable(name, context) {
                    out.push_str(&escape_html(&val.as_string()));
                }
            }
            Node::If {
                condition,
                then_body,
                else_body,
            } => {
                if evaluate_condition(condition, context) {
                    out.push_str(&render_nodes(then_body, context));
                } else {
                    out.push_str(&render_nodes(else_body, context));
                }
            }
            Node::For {
                var_name,
                list_name,
                body,
            } => {
                if let Some(TemplateValue::List(items)) = resolve_variable(list_name, context) {
                    let mut local = context.clone();
                    for item in items {
                        local.insert(var_name.clone(), item.clone());
                        out.push_str(&render_nodes(body, &local));
                    }
                }
            }
            Node::Block { body, .. } => {
                out.push_str(&render_nodes(body, context));
            }
            Node::Extends(_) => {}
            Node::Tailwind => {
                tdebug!("Inserting Tailwind CDN link");
                out.push_str(r#"<script src="https://cdn.tailwindcss.com"></script>"#);
            }
        }
    }
    out
}

/// Loads `template_name` from `dir`, merges it into its base if it extends one, and renders it.
pub fn render_to_string(dir: &str, template_name: &str, context: &Context) -> Result<String, AppError> {
    let read = |name: &str| {
        std::fs::read_to_string(Path::new(dir).join(name))
            .map_err(|e| AppError::Template(format!("template '{}' not found: {}", name, e)))
    };

    let child = read(template_name)?;
    let child_nodes = parse_tokens(&tokenize_template(&child));
    tdebug!("Child AST: {:?}", child_nodes);

    // Collect child blocks and detect base
    let mut child_blocks = HashMap::new();
    let mut base_t: Option<String> = None;
    for node in &child_nodes {
        if let Node::Extends(b) = node {
            base_t = Some(b.clone());
        }
        if let Node::Block { name, body } = node {
            child_blocks.insert(name.clone(), body.clone());
        }
    }

    let html = if let Some(base) = base_t {
        let base_nodes = parse_tokens(&tokenize_template(&read(&base)?));
        tdebug!("Base AST: {:?}", base_nodes);
        let merged = merge_blocks(&base_nodes, &child_blocks);
        tdebug!("Merged AST: {:?}", merged);
        render_nodes(&merged, context)
    } else {
        render_nodes(&child_nodes, context)
    };
    Ok(html)
}

/// Main entry: renders a template into an HTML response; a missing template is a 500.
pub fn render_template(
    settings: &TemplateSettings,
    template_name: &str,
    context: &Context,
    status_code: u16,
) -> Response {
    match render_to_string(&settings.dir, template_name, context) {
        Ok(html) => {
            let mut response = Response::html(html);
            response.status_code = status_code;
            response
        }
        Err(e) => {
            log::error!("Rendering '{}' failed: {}", template_name, e);
            Response::server_error()
        }
    }
}
