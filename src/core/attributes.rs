//! XML Attribute Parsing
//!
//! Parses the attribute list of a start tag (or the pseudo-attributes of an
//! XML declaration). Values are returned raw; normalization and entity
//! expansion happen in [`super::entities::decode_attribute_value`] once the
//! caller knows which entities are declared.

use super::scanner::Scanner;
use memchr::memchr;

/// An attribute as written in the start tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAttribute {
    /// Attribute name (may include namespace prefix)
    pub name: String,
    /// Value between the quotes, not yet normalized
    pub value: String,
}

impl RawAttribute {
    /// Namespace prefix (before colon), if any
    pub fn prefix(&self) -> Option<&str> {
        split_name(&self.name).0
    }

    /// Local name (after colon)
    pub fn local_name(&self) -> &str {
        split_name(&self.name).1
    }

    /// True for `xmlns` and `xmlns:*` declarations
    pub fn is_namespace_decl(&self) -> bool {
        self.name == "xmlns" || self.name.starts_with("xmlns:")
    }
}

/// Split a name into prefix and local name at the colon
pub fn split_name(name: &str) -> (Option<&str>, &str) {
    match memchr(b':', name.as_bytes()) {
        Some(colon_pos) => (Some(&name[..colon_pos]), &name[colon_pos + 1..]),
        None => (None, name),
    }
}

/// Parse attributes from raw tag content (after the element name)
///
/// Input should be the content between element name and '>' or '/>'.
/// Attributes must be separated by whitespace and names must be unique.
pub fn parse_attributes(input: &str) -> Result<Vec<RawAttribute>, String> {
    let mut scanner = Scanner::new(input);
    let mut attributes: Vec<RawAttribute> = Vec::new();

    loop {
        let ws = scanner.skip_whitespace();
        if scanner.is_eof() {
            break;
        }
        if ws == 0 && !attributes.is_empty() {
            return Err("missing whitespace between attributes".to_string());
        }
        if ws == 0 && scanner.position() == 0 && !input.is_empty() {
            return Err("missing whitespace before attribute".to_string());
        }

        let name = scanner
            .read_name()
            .ok_or_else(|| "invalid attribute name".to_string())?;
        scanner.skip_whitespace();
        if scanner.peek() != Some(b'=') {
            return Err(format!("attribute '{}' has no value", name));
        }
        scanner.advance(1);
        scanner.skip_whitespace();
        let value = scanner
            .read_quoted()
            .ok_or_else(|| format!("unquoted or unterminated value for attribute '{}'", name))?;
        if memchr(b'<', value.as_bytes()).is_some() {
            return Err(format!("'<' in value of attribute '{}'", name));
        }
        if attributes.iter().any(|a| a.name == name) {
            return Err(format!("duplicate attribute '{}'", name));
        }
        attributes.push(RawAttribute {
            name: name.to_string(),
            value: value.to_string(),
        });
    }

    Ok(attributes)
}

/// Look up a pseudo-attribute (XML declaration) by name
pub fn find<'a>(attributes: &'a [RawAttribute], name: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|a| a.name == name)
        .map(|a| a.value.as_str())
}
