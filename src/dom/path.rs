//! Node path lookup
//!
//! A small path language for locating nodes relative to a context node:
//!
//! - `/a/b` - child steps (a leading `/` starts at the context node)
//! - `//b` - any descendant named `b`, in document order
//! - `a[1]` - second child named `a` (indexes are 0-based)
//! - `a[@id]`, `a[@id='x']` - children named `a` with the attribute, or
//!   with the attribute equal to a value
//! - `@attr` - attribute node of the current element (last step only)
//! - `*` - any element name
//!
//! Paths are compiled once into a list of steps; the document keeps
//! compiled paths in an LRU cache. In the namespace-aware variant a name
//! `p:local` is matched through a prefix map, and either part may be `*`.

use std::collections::HashMap;

use super::document::Document;
use super::node::{NodeId, NodeKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Filter {
    Index(usize),
    HasAttribute(String),
    AttributeEquals(String, String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Step {
    Element {
        descendant: bool,
        name: String,
        filters: Vec<Filter>,
    },
    Attribute(String),
}

/// A parsed path, ready to be matched against any document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPath {
    steps: Vec<Step>,
}

impl CompiledPath {
    pub fn compile(path: &str) -> Result<CompiledPath, String> {
        let mut steps = Vec::new();
        let mut rest = path;
        let mut descendant = false;
        if let Some(r) = rest.strip_prefix("//") {
            descendant = true;
            rest = r;
        } else if let Some(r) = rest.strip_prefix('/') {
            rest = r;
        }

        while !rest.is_empty() {
            if let Some(attr) = rest.strip_prefix('@') {
                if attr.is_empty() || attr.contains(['/', '[', ']']) {
                    return Err(format!("invalid attribute step '{}'", rest));
                }
                steps.push(Step::Attribute(attr.to_string()));
                break;
            }

            let end = rest.find(['/', '[']).unwrap_or(rest.len());
            let name = &rest[..end];
            if name.is_empty() {
                return Err(format!("empty step in '{}'", path));
            }
            let mut after = &rest[end..];
            let mut filters = Vec::new();
            while after.starts_with('[') {
                let close = find_close(after).ok_or_else(|| format!("unterminated filter in '{}'", path))?;
                filters.push(parse_filter(&after[1..close])?);
                after = &after[close + 1..];
            }
            steps.push(Step::Element {
                descendant,
                name: name.to_string(),
                filters,
            });

            if let Some(r) = after.strip_prefix("//") {
                descendant = true;
                rest = r;
            } else if let Some(r) = after.strip_prefix('/') {
                descendant = false;
                rest = r;
            } else if after.is_empty() {
                rest = after;
            } else {
                return Err(format!("unexpected '{}' in '{}'", after, path));
            }
        }
        Ok(CompiledPath { steps })
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub(crate) fn find(&self, doc: &Document, start: NodeId, names: NameMatch<'_>) -> Option<NodeId> {
        find_from(doc, start, &self.steps, names)
    }
}

/// Offset of the `]` closing the filter that starts at `s[0]`
fn find_close(s: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in s.char_indices().skip(1) {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => quote = Some(c),
            None if c == ']' => return Some(i),
            None => {}
        }
    }
    None
}

fn parse_filter(body: &str) -> Result<Filter, String> {
    let body = body.trim();
    if let Some(attr) = body.strip_prefix('@') {
        return Ok(match attr.split_once('=') {
            Some((name, value)) => {
                let value = value.trim();
                let unquoted = value
                    .strip_prefix('\'')
                    .and_then(|v| v.strip_suffix('\''))
                    .or_else(|| value.strip_prefix('"').and_then(|v| v.strip_suffix('"')))
                    .unwrap_or(value);
                Filter::AttributeEquals(name.trim().to_string(), unquoted.to_string())
            }
            None => Filter::HasAttribute(attr.trim().to_string()),
        });
    }
    body.parse::<usize>()
        .map(Filter::Index)
        .map_err(|_| format!("invalid filter '[{}]'", body))
}

/// How step names are compared to node names
#[derive(Debug, Clone, Copy)]
pub(crate) enum NameMatch<'m> {
    /// Compare qualified names
    Plain,
    /// Resolve prefixes through a prefix to URI map
    Namespaced(&'m HashMap<String, String>),
}

impl NameMatch<'_> {
    fn element(self, doc: &Document, node: NodeId, pattern: &str) -> bool {
        if doc.kind(node) != Some(NodeKind::Element) {
            return false;
        }
        if pattern == "*" {
            return true;
        }
        match self {
            NameMatch::Plain => doc.node_name(node) == pattern,
            NameMatch::Namespaced(map) => {
                let (prefix, local) = pattern.split_once(':').unwrap_or(("", pattern));
                let uri_ok = match prefix {
                    "*" => true,
                    "" => map.get("").map_or("", String::as_str) == doc.namespace_uri(node),
                    p => map.get(p).is_some_and(|uri| uri == doc.namespace_uri(node)),
                };
                uri_ok && (local == "*" || local == doc.local_name(node))
            }
        }
    }

    fn attribute(self, doc: &Document, element: NodeId, pattern: &str) -> Option<NodeId> {
        doc.attributes(element).into_iter().find(|&attr| match self {
            NameMatch::Plain => pattern == "*" || doc.node_name(attr) == pattern,
            NameMatch::Namespaced(map) => {
                let (prefix, local) = pattern.split_once(':').unwrap_or(("", pattern));
                let uri_ok = match prefix {
                    "*" => true,
                    "" => doc.namespace_uri(attr).is_empty(),
                    p => map.get(p).is_some_and(|uri| uri == doc.namespace_uri(attr)),
                };
                uri_ok && (local == "*" || local == doc.local_name(attr))
            }
        })
    }
}

fn find_from(doc: &Document, node: NodeId, steps: &[Step], names: NameMatch<'_>) -> Option<NodeId> {
    let Some((step, rest)) = steps.split_first() else {
        return Some(node);
    };
    match step {
        Step::Attribute(name) => {
            if !rest.is_empty() || doc.kind(node) != Some(NodeKind::Element) {
                return None;
            }
            names.attribute(doc, node, name)
        }
        Step::Element {
            descendant,
            name,
            filters,
        } => {
            let pool = if *descendant {
                doc.descendants(node)
            } else {
                doc.child_nodes(node)
            };
            let mut candidates: Vec<NodeId> = pool.into_iter().filter(|&n| names.element(doc, n, name)).collect();
            for filter in filters {
                candidates = match filter {
                    Filter::Index(i) => candidates.get(*i).copied().into_iter().collect(),
                    Filter::HasAttribute(a) => candidates
                        .into_iter()
                        .filter(|&n| names.attribute(doc, n, a).is_some())
                        .collect(),
                    Filter::AttributeEquals(a, v) => candidates
                        .into_iter()
                        .filter(|&n| {
                            names
                                .attribute(doc, n, a)
                                .and_then(|attr| doc.node_value(attr))
                                .is_some_and(|value| value == v)
                        })
                        .collect(),
                };
            }
            candidates.into_iter().find_map(|c| find_from(doc, c, rest, names))
        }
    }
}
