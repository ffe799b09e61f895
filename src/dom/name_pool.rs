//! Name Interning Pool
//!
//! Qualified names (namespace URI, local name, qualified name) of elements,
//! attributes and other named nodes are interned here so that every node
//! with the same name shares one allocation.
//!
//! Uses hash-based lookup to avoid storing duplicate names. A pool belongs to
//! one document unless the caller explicitly hands the same pool to several
//! documents.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// An interned qualified name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Name {
    namespace_uri: String,
    local_name: String,
    qname: String,
}

impl Name {
    /// Build a name; the local name is the part of `qname` after the colon
    pub fn new(namespace_uri: &str, qname: &str) -> Self {
        Name {
            namespace_uri: namespace_uri.to_string(),
            local_name: local_part(qname).to_string(),
            qname: qname.to_string(),
        }
    }

    #[inline]
    pub fn qname(&self) -> &str {
        &self.qname
    }

    #[inline]
    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    #[inline]
    pub fn namespace_uri(&self) -> &str {
        &self.namespace_uri
    }

    pub fn prefix(&self) -> &str {
        self.qname.split_once(':').map_or("", |(p, _)| p)
    }

    /// True if this name matches `namespace_uri` and `local_name`
    pub fn equals_ns(&self, namespace_uri: &str, local_name: &str) -> bool {
        self.namespace_uri == namespace_uri && self.local_name == local_name
    }
}

fn local_part(qname: &str) -> &str {
    qname.split_once(':').map_or(qname, |(_, l)| l)
}

/// Name interning pool
///
/// Memory layout:
/// - `names`: interned names indexed by insertion order
/// - `hash_index`: hash -> list of indexes (handles rare collisions)
#[derive(Debug, Default)]
pub struct NamePool {
    names: Vec<Rc<Name>>,
    hash_index: HashMap<u64, Vec<u32>>,
}

impl NamePool {
    pub fn new() -> Self {
        NamePool {
            names: Vec::with_capacity(64),
            hash_index: HashMap::new(),
        }
    }

    #[inline]
    fn compute_hash(namespace_uri: &str, qname: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        namespace_uri.hash(&mut hasher);
        qname.hash(&mut hasher);
        hasher.finish()
    }

    /// Intern a namespaced name
    pub fn insert(&mut self, namespace_uri: &str, qname: &str) -> Rc<Name> {
        let hash = Self::compute_hash(namespace_uri, qname);
        if let Some(ids) = self.hash_index.get(&hash) {
            for &id in ids {
                let name = &self.names[id as usize];
                if name.namespace_uri == namespace_uri && name.qname == qname {
                    return name.clone();
                }
            }
        }
        let name = Rc::new(Name::new(namespace_uri, qname));
        let id = self.names.len() as u32;
        self.names.push(name.clone());
        self.hash_index.entry(hash).or_default().push(id);
        name
    }

    /// Intern a name without namespace
    pub fn insert_plain(&mut self, qname: &str) -> Rc<Name> {
        self.insert("", qname)
    }

    /// Number of distinct names
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
