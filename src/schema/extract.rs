//! Input-schema extraction from message templates.
//!
//! Message text may reference task-input variables with a small Jinja
//! subset. Every referenced path is collected into a tree and turned into a
//! JSON schema:
//!
//! - `{{ order.total }}` adds `order` as an object with a `total` property.
//! - `{{ items[0] }}` marks `items` as an array.
//! - `{% for item in order.items %}` marks `order.items` as an array and makes
//!   `item` an alias of its elements until `{% endfor %}`.
//! - `{% if cond %}` / `{% elif cond %}` mark every path in the condition.
//!
//! Leaves keep the definition found at the same path in the existing schema,
//! so already-typed variables do not drift.

use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::TemplateError;
use crate::types::{ContentPart, Message};

const WILDCARD: &str = "*";
const FILE_DEF_NAME: &str = "File";
const KEYWORDS: &[&str] = &[
    "and", "or", "not", "is", "in", "if", "else", "true", "false", "none", "True", "False", "None",
];

type Path = Vec<String>;

#[derive(Debug, Default)]
struct PathTree(BTreeMap<String, PathTree>);

impl PathTree {
    fn insert(&mut self, path: &[String]) {
        let mut node = self;
        for segment in path {
            node = node.0.entry(segment.clone()).or_default();
        }
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Loop/assignment scope: name -> aliased path, or `None` for a local.
type Scope = BTreeMap<String, Option<Path>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    For,
    If,
}

impl Block {
    fn tag(self) -> &'static str {
        match self {
            Block::For => "for",
            Block::If => "if",
        }
    }
}

struct TemplateScanner<'a> {
    message_index: usize,
    tree: &'a mut PathTree,
    scopes: Vec<Scope>,
    blocks: Vec<Block>,
}

impl<'a> TemplateScanner<'a> {
    fn new(message_index: usize, tree: &'a mut PathTree) -> Self {
        Self {
            message_index,
            tree,
            scopes: Vec::new(),
            blocks: Vec::new(),
        }
    }

    fn scan(mut self, text: &str) -> Result<bool, TemplateError> {
        let bytes = text.as_bytes();
        let mut templated = false;
        let mut i = 0;
        while i + 1 < bytes.len() {
            let close = match (bytes[i], bytes[i + 1]) {
                (b'{', b'{') => "}}",
                (b'{', b'%') => "%}",
                (b'{', b'#') => "#}",
                _ => {
                    i += 1;
                    continue;
                }
            };
            let open = bytes[i + 1];
            let Some(len) = text[i + 2..].find(close) else {
                return Err(TemplateError::Unclosed {
                    message_index: self.message_index,
                    offset: i,
                });
            };
            let inner = text[i + 2..i + 2 + len].trim_matches('-').trim();
            templated = true;
            match open {
                b'{' => self.expression(inner)?,
                b'%' => self.statement(inner)?,
                _ => {}
            }
            i += 2 + len + close.len();
        }
        if let Some(block) = self.blocks.last() {
            return Err(TemplateError::UnbalancedBlock {
                message_index: self.message_index,
                tag: block.tag().to_string(),
            });
        }
        Ok(templated)
    }

    fn expression(&mut self, expr: &str) -> Result<(), TemplateError> {
        for path in self.paths_in(expr)? {
            self.mark(path);
        }
        Ok(())
    }

    fn statement(&mut self, stmt: &str) -> Result<(), TemplateError> {
        let (keyword, rest) = stmt
            .split_once(char::is_whitespace)
            .map(|(k, r)| (k, r.trim()))
            .unwrap_or((stmt, ""));
        match keyword {
            "for" => self.enter_for(rest),
            "endfor" => self.leave(Block::For, keyword),
            "if" => {
                self.blocks.push(Block::If);
                self.expression(rest)
            }
            "elif" => self.expression(rest),
            "endif" => self.leave(Block::If, keyword),
            "set" => {
                let Some((name, value)) = rest.split_once('=') else {
                    return Ok(());
                };
                self.expression(value)?;
                let name = name.trim().to_string();
                if self.scopes.is_empty() {
                    self.scopes.push(Scope::new());
                }
                if let Some(scope) = self.scopes.last_mut() {
                    scope.insert(name, None);
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn enter_for(&mut self, rest: &str) -> Result<(), TemplateError> {
        self.blocks.push(Block::For);
        let mut scope = Scope::new();
        scope.insert("loop".to_string(), None);

        if let Some((targets, iterable)) = rest.split_once(" in ") {
            let iterable = iterable.split(" if ").next().unwrap_or(iterable);
            let iter_path = self
                .paths_in(iterable)?
                .into_iter()
                .next()
                .and_then(|path| self.resolve(path))
                .map(|mut path| {
                    if path.last().map(String::as_str) != Some(WILDCARD) {
                        path.push(WILDCARD.to_string());
                    }
                    path
                });
            if let Some(path) = &iter_path {
                self.tree.insert(path);
            }

            let names: Vec<&str> = targets
                .trim_matches(|c| c == '(' || c == ')')
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .collect();
            let tuple = names.len() > 1;
            for name in names {
                let alias = iter_path.clone().map(|mut path| {
                    if tuple {
                        path.push(WILDCARD.to_string());
                    }
                    path
                });
                scope.insert(name.to_string(), alias);
            }
        }
        self.scopes.push(scope);
        Ok(())
    }

    fn leave(&mut self, block: Block, tag: &str) -> Result<(), TemplateError> {
        if self.blocks.pop() != Some(block) {
            return Err(TemplateError::UnbalancedBlock {
                message_index: self.message_index,
                tag: tag.to_string(),
            });
        }
        if block == Block::For {
            self.scopes.pop();
        }
        Ok(())
    }

    /// Expand loop aliases. `None` means the root is a template-local name.
    fn resolve(&self, path: Path) -> Option<Path> {
        let root = path.first()?;
        for scope in self.scopes.iter().rev() {
            if let Some(alias) = scope.get(root) {
                let mut resolved = alias.clone()?;
                resolved.extend(path.into_iter().skip(1));
                return Some(resolved);
            }
        }
        Some(path)
    }

    fn mark(&mut self, path: Path) {
        if let Some(path) = self.resolve(path) {
            self.tree.insert(&path);
        }
    }

    /// Variable paths referenced by an expression, in order of appearance.
    fn paths_in(&self, expr: &str) -> Result<Vec<Path>, TemplateError> {
        let chars: Vec<char> = expr.chars().collect();
        let mut paths = Vec::new();
        let mut i = 0;
        let mut after_pipe = false;
        let mut after_is = false;
        while i < chars.len() {
            let c = chars[i];
            if c == '\'' || c == '"' {
                i = skip_string(&chars, i);
                continue;
            }
            if c == '|' {
                after_pipe = true;
                i += 1;
                continue;
            }
            if c.is_ascii_digit() {
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '.') {
                    i += 1;
                }
                continue;
            }
            if !(c.is_alphabetic() || c == '_') {
                i += 1;
                continue;
            }

            let (ident, next) = read_ident(&chars, i);
            i = next;
            let skip_ws = |mut j: usize| {
                while j < chars.len() && chars[j].is_whitespace() {
                    j += 1;
                }
                j
            };

            if after_pipe {
                // Filter name; its arguments are not variables we track.
                after_pipe = false;
                let j = skip_ws(i);
                if chars.get(j) == Some(&'(') {
                    i = skip_balanced(&chars, j, '(', ')');
                }
                continue;
            }
            if after_is {
                after_is = false;
                continue;
            }
            if KEYWORDS.contains(&ident.as_str()) {
                after_is = ident == "is";
                continue;
            }

            let mut path = vec![ident];
            loop {
                let j = skip_ws(i);
                match chars.get(j) {
                    Some('.') => {
                        let k = skip_ws(j + 1);
                        if chars.get(k).is_some_and(|c| c.is_alphabetic() || *c == '_') {
                            let (attr, next) = read_ident(&chars, k);
                            path.push(attr);
                            i = next;
                        } else {
                            i = k;
                            break;
                        }
                    }
                    Some('[') => {
                        path.push(WILDCARD.to_string());
                        i = skip_balanced(&chars, j, '[', ']');
                    }
                    Some('(') => {
                        let call: String = chars[..skip_balanced(&chars, j, '(', ')')]
                            .iter()
                            .collect();
                        return Err(TemplateError::UnsupportedFunction {
                            message_index: self.message_index,
                            expr: call.trim().to_string(),
                        });
                    }
                    _ => break,
                }
            }
            paths.push(path);
        }
        Ok(paths)
    }
}

fn read_ident(chars: &[char], start: usize) -> (String, usize) {
    let mut end = start;
    while end < chars.len() && (chars[end].is_alphanumeric() || chars[end] == '_') {
        end += 1;
    }
    (chars[start..end].iter().collect(), end)
}

fn skip_string(chars: &[char], start: usize) -> usize {
    let quote = chars[start];
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            c if c == quote => return i + 1,
            _ => i += 1,
        }
    }
    chars.len()
}

fn skip_balanced(chars: &[char], start: usize, open: char, close: char) -> usize {
    let mut depth = 0usize;
    let mut i = start;
    while i < chars.len() {
        match chars[i] {
            '\'' | '"' => {
                i = skip_string(chars, i);
                continue;
            }
            c if c == open => depth += 1,
            c if c == close => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i + 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    chars.len()
}

fn child_schema<'v>(existing: Option<&'v Value>, key: &str) -> Option<&'v Value> {
    let existing = existing?;
    if key == WILDCARD {
        existing.get("items")
    } else {
        existing.get("properties")?.get(key)
    }
}

fn build_node(
    tree: &PathTree,
    existing: Option<&Value>,
    path: &mut Path,
    file_paths: &BTreeSet<Path>,
) -> Value {
    if file_paths.contains(path) {
        return json!({"$ref": format!("#/$defs/{FILE_DEF_NAME}")});
    }
    if tree.is_empty() {
        return existing.cloned().unwrap_or_else(|| json!({}));
    }
    if tree.0.len() == 1 {
        if let Some(items) = tree.0.get(WILDCARD) {
            path.push(WILDCARD.to_string());
            let items = build_node(items, child_schema(existing, WILDCARD), path, file_paths);
            path.pop();
            return json!({"type": "array", "items": items});
        }
    }
    let mut properties = Map::new();
    for (key, child) in &tree.0 {
        path.push(key.clone());
        let schema = build_node(child, child_schema(existing, key), path, file_paths);
        path.pop();
        properties.insert(key.clone(), schema);
    }
    json!({"type": "object", "properties": properties})
}

fn file_definition(existing: Option<&Value>) -> Value {
    existing
        .and_then(|schema| schema.get("$defs"))
        .and_then(|defs| defs.get(FILE_DEF_NAME))
        .cloned()
        .unwrap_or_else(|| {
            json!({
                "type": "object",
                "properties": {
                    "url": {"type": "string"},
                    "data": {"type": "string"},
                    "content_type": {"type": "string"}
                }
            })
        })
}

/// Derive the input schema implied by the templates in `messages`.
///
/// Returns `None` when no message uses template syntax.
pub fn extract_input_schema(
    messages: &[Message],
    existing: Option<&Value>,
) -> Result<Option<Value>, TemplateError> {
    let mut tree = PathTree::default();
    let mut file_paths = BTreeSet::<Path>::new();
    let mut templated = false;

    for (message_index, message) in messages.iter().enumerate() {
        for text in message.texts() {
            templated |= TemplateScanner::new(message_index, &mut tree).scan(text)?;
        }
        for part in &message.content {
            let ContentPart::File(file) = part else {
                continue;
            };
            if let Some(key) = file.template_key() {
                let path: Path = key.split('.').map(|s| s.trim().to_string()).collect();
                tree.insert(&path);
                file_paths.insert(path);
                templated = true;
            }
        }
    }

    if !templated || tree.is_empty() {
        return Ok(None);
    }

    let mut schema = build_node(&tree, existing, &mut Vec::new(), &file_paths);
    if let Some(object) = schema.as_object_mut() {
        if let Some(format) = existing.and_then(|e| e.get("format")) {
            object.insert("format".to_string(), format.clone());
        }
        if !file_paths.is_empty() {
            object.insert(
                "$defs".to_string(),
                json!({ FILE_DEF_NAME: file_definition(existing) }),
            );
        }
    }
    Ok(Some(schema))
}
