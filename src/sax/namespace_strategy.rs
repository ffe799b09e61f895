//! Namespace strategies
//!
//! Decides how element and attribute names are reported:
//! - [`NoNamespacesStrategy`]: names are reported as written, `xmlns`
//!   attributes are ordinary attributes and no prefix mappings are reported
//! - [`NoNamespacePrefixesStrategy`]: names are expanded to (URI, local
//!   name), `xmlns` attributes are consumed as declarations
//! - [`NamespacePrefixesStrategy`]: as above, but `xmlns` attributes are also
//!   reported, in the `http://www.w3.org/2000/xmlns/` namespace

use super::events::{Attribute, Attributes, QualifiedName};
use crate::core::attributes::split_name;
use crate::core::namespace::{ns, NamespaceResolver};
use std::collections::HashSet;

pub trait NamespaceStrategy {
    /// Whether `xmlns` attributes declare namespaces
    fn namespaces(&self) -> bool;

    /// Expanded name of an element
    fn element_name(&self, qname: &str, resolver: &NamespaceResolver) -> Result<QualifiedName, String>;

    /// Expand the attribute names of a start tag.
    ///
    /// `attributes` carry only their qualified name; the namespace URI and
    /// local name are filled in here.
    fn attributes(&self, attributes: Vec<Attribute>, resolver: &NamespaceResolver) -> Result<Attributes, String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoNamespacesStrategy;

impl NamespaceStrategy for NoNamespacesStrategy {
    fn namespaces(&self) -> bool {
        false
    }

    fn element_name(&self, qname: &str, _resolver: &NamespaceResolver) -> Result<QualifiedName, String> {
        Ok(QualifiedName::plain(qname))
    }

    fn attributes(&self, attributes: Vec<Attribute>, _resolver: &NamespaceResolver) -> Result<Attributes, String> {
        Ok(attributes.into_iter().collect())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoNamespacePrefixesStrategy;

impl NamespaceStrategy for NoNamespacePrefixesStrategy {
    fn namespaces(&self) -> bool {
        true
    }

    fn element_name(&self, qname: &str, resolver: &NamespaceResolver) -> Result<QualifiedName, String> {
        expand_element(qname, resolver)
    }

    fn attributes(&self, attributes: Vec<Attribute>, resolver: &NamespaceResolver) -> Result<Attributes, String> {
        expand_attributes(attributes, resolver, false)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NamespacePrefixesStrategy;

impl NamespaceStrategy for NamespacePrefixesStrategy {
    fn namespaces(&self) -> bool {
        true
    }

    fn element_name(&self, qname: &str, resolver: &NamespaceResolver) -> Result<QualifiedName, String> {
        expand_element(qname, resolver)
    }

    fn attributes(&self, attributes: Vec<Attribute>, resolver: &NamespaceResolver) -> Result<Attributes, String> {
        expand_attributes(attributes, resolver, true)
    }
}

fn expand_element(qname: &str, resolver: &NamespaceResolver) -> Result<QualifiedName, String> {
    match split_name(qname) {
        (Some(prefix), local) => {
            check_parts(qname, prefix, local)?;
            let uri = resolver
                .resolve(prefix)
                .ok_or_else(|| format!("unbound prefix '{}' in element '{}'", prefix, qname))?;
            Ok(QualifiedName::new(uri, local, qname))
        }
        (None, local) => {
            let uri = resolver.resolve_default().unwrap_or("");
            Ok(QualifiedName::new(uri, local, qname))
        }
    }
}

fn expand_attributes(
    attributes: Vec<Attribute>,
    resolver: &NamespaceResolver,
    keep_declarations: bool,
) -> Result<Attributes, String> {
    let mut seen = HashSet::new();
    let mut out = Attributes::new();
    for mut attribute in attributes {
        let is_declaration = attribute.qname == "xmlns" || attribute.qname.starts_with("xmlns:");
        if is_declaration {
            if !keep_declarations {
                continue;
            }
            attribute.namespace_uri = ns::XMLNS.to_string();
            attribute.local_name = split_name(&attribute.qname).1.to_string();
        } else {
            match split_name(&attribute.qname) {
                (Some(prefix), local) => {
                    check_parts(&attribute.qname, prefix, local)?;
                    let uri = resolver.resolve(prefix).ok_or_else(|| {
                        format!("unbound prefix '{}' in attribute '{}'", prefix, attribute.qname)
                    })?;
                    attribute.namespace_uri = uri.to_string();
                    attribute.local_name = local.to_string();
                }
                // Unprefixed attributes are in no namespace
                (None, local) => attribute.local_name = local.to_string(),
            }
        }
        if !seen.insert((attribute.namespace_uri.clone(), attribute.local_name.clone())) {
            return Err(format!("duplicate attribute '{}'", attribute.qname));
        }
        out.push(attribute);
    }
    Ok(out)
}

fn check_parts(qname: &str, prefix: &str, local: &str) -> Result<(), String> {
    if prefix.is_empty() || local.is_empty() || local.contains(':') {
        return Err(format!("malformed qualified name '{}'", qname));
    }
    Ok(())
}
