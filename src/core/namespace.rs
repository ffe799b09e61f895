//! Namespace Resolution
//!
//! Stack-based namespace resolver shared by the event engine and the pull
//! parser. The empty prefix stands for the default namespace; binding it to
//! the empty URI undeclares the default namespace for the scope.

/// Well-known namespace URIs
pub mod ns {
    pub const XML: &str = "http://www.w3.org/XML/1998/namespace";
    pub const XMLNS: &str = "http://www.w3.org/2000/xmlns/";
}

/// Namespace binding (prefix -> URI)
#[derive(Debug, Clone)]
struct NsBinding {
    prefix: String,
    uri: String,
    depth: u32,
}

/// Stack-based namespace resolver
#[derive(Debug, Clone)]
pub struct NamespaceResolver {
    bindings: Vec<NsBinding>,
    depth: u32,
}

impl Default for NamespaceResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl NamespaceResolver {
    /// Create a resolver with the `xml` and `xmlns` prefixes pre-bound
    pub fn new() -> Self {
        let mut bindings = Vec::with_capacity(16);
        bindings.push(NsBinding {
            prefix: "xml".into(),
            uri: ns::XML.into(),
            depth: 0,
        });
        bindings.push(NsBinding {
            prefix: "xmlns".into(),
            uri: ns::XMLNS.into(),
            depth: 0,
        });
        NamespaceResolver { bindings, depth: 0 }
    }

    /// Enter a new element scope
    pub fn push_scope(&mut self) {
        self.depth += 1;
    }

    /// Leave an element scope, returning the prefixes declared in it in
    /// declaration order
    pub fn pop_scope(&mut self) -> Vec<String> {
        let mut removed = Vec::new();
        while let Some(binding) = self.bindings.last() {
            if binding.depth < self.depth || binding.depth == 0 {
                break;
            }
            if let Some(binding) = self.bindings.pop() {
                removed.push(binding.prefix);
            }
        }
        removed.reverse();
        self.depth = self.depth.saturating_sub(1);
        removed
    }

    /// Declare a binding in the current scope
    pub fn declare(&mut self, prefix: &str, uri: &str) -> Result<(), String> {
        match prefix {
            "xmlns" => return Err("reserved prefix 'xmlns' must not be declared".into()),
            "xml" if uri != ns::XML => {
                return Err("reserved prefix 'xml' must not be bound to another namespace".into())
            }
            "xml" => return Ok(()),
            _ => {}
        }
        if uri == ns::XMLNS || (uri == ns::XML && prefix != "xml") {
            return Err(format!("reserved namespace '{}' must not be bound", uri));
        }
        if uri.is_empty() && !prefix.is_empty() {
            return Err(format!("prefix '{}' must not be undeclared", prefix));
        }
        self.bindings.push(NsBinding {
            prefix: prefix.to_string(),
            uri: uri.to_string(),
            depth: self.depth,
        });
        Ok(())
    }

    /// Resolve a prefix to a namespace URI. The default namespace resolves
    /// to `None` when undeclared.
    pub fn resolve(&self, prefix: &str) -> Option<&str> {
        self.bindings
            .iter()
            .rev()
            .find(|b| b.prefix == prefix)
            .map(|b| b.uri.as_str())
            .filter(|uri| !uri.is_empty())
    }

    /// Resolve the default namespace
    pub fn resolve_default(&self) -> Option<&str> {
        self.resolve("")
    }

    /// Get current depth
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Bindings declared in the current scope, in declaration order
    pub fn current_scope(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        let depth = self.depth;
        self.bindings
            .iter()
            .filter(move |b| b.depth == depth && depth > 0)
            .map(|b| (b.prefix.as_str(), b.uri.as_str()))
    }

    /// Most recent binding of every prefix in scope
    pub fn active_bindings(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        let mut seen_prefixes = std::collections::HashSet::new();
        self.bindings.iter().rev().filter_map(move |b| {
            if seen_prefixes.insert(b.prefix.as_str()) {
                Some((b.prefix.as_str(), b.uri.as_str()))
            } else {
                None
            }
        })
    }
}
