//! Qualified name shared by the pull parser and the serializer.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Namespace URI plus local name, with an optional prefix hint.
///
/// Equality, ordering and hashing ignore the prefix.
#[derive(Debug, Clone, Default)]
pub struct QName {
    namespace: String,
    name: String,
    prefix: String,
}

impl QName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        QName {
            namespace: namespace.into(),
            name: name.into(),
            prefix: String::new(),
        }
    }

    pub fn with_prefix(namespace: impl Into<String>, name: impl Into<String>, prefix: impl Into<String>) -> Self {
        QName {
            namespace: namespace.into(),
            name: name.into(),
            prefix: prefix.into(),
        }
    }

    /// Name in no namespace
    pub fn local(name: impl Into<String>) -> Self {
        Self::new("", name)
    }

    #[inline]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.namespace.is_empty()
    }
}

impl PartialEq for QName {
    fn eq(&self, other: &Self) -> bool {
        self.namespace == other.namespace && self.name == other.name
    }
}

impl Eq for QName {}

impl Hash for QName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.namespace.hash(state);
        self.name.hash(state);
    }
}

impl PartialOrd for QName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.namespace
            .cmp(&other.namespace)
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}#{}", self.namespace, self.name)
        }
    }
}

impl From<&str> for QName {
    fn from(name: &str) -> Self {
        QName::local(name)
    }
}
