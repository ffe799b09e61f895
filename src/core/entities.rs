//! XML Entity Decoding
//!
//! Handles decoding of XML references:
//! - Built-in entities: &lt; &gt; &amp; &quot; &apos;
//! - Numeric character references: &#123; &#x7B;
//! - General entities declared in a DTD (attribute values only; content
//!   references are expanded by the consumers of the tokenizer)
//!
//! Uses Cow for zero-copy when no references are present.

use super::dtd::{EntityTable, EntityValue};
use super::unicode::{is_name_char, is_name_start_char, is_xml_char};
use memchr::{memchr, memchr3};
use std::borrow::Cow;

/// A reference found at the start of some input (`&...;`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference<'a> {
    /// Character reference or predefined entity, already resolved
    Char(char),
    /// Any other named entity
    Named(&'a str),
}

/// Resolve one of the five predefined entities
#[inline]
pub fn predefined(name: &str) -> Option<char> {
    match name {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => None,
    }
}

/// Parse a reference at the start of `input` (which must begin with `&`).
///
/// Returns `Ok(None)` when the input ends before the terminating `;`, so
/// an incremental caller can wait for more data. On success the second
/// element is the number of bytes consumed, including `&` and `;`.
pub fn parse_reference(input: &str) -> Result<Option<(Reference<'_>, usize)>, &'static str> {
    let body = &input[1..];
    if let Some(num) = body.strip_prefix('#') {
        let (digits, radix) = match num.strip_prefix('x') {
            Some(hex) => (hex, 16),
            None => (num, 10),
        };
        let Some(end) = digits.find(|c: char| !c.is_ascii_alphanumeric()) else {
            return Ok(None);
        };
        if digits.as_bytes()[end] != b';' || end == 0 {
            return Err("malformed character reference");
        }
        let value = u32::from_str_radix(&digits[..end], radix)
            .map_err(|_| "malformed character reference")?;
        let c = char::from_u32(value)
            .filter(|&c| is_xml_char(c))
            .ok_or("reference to invalid character number")?;
        let consumed = input.len() - digits.len() + end + 1;
        return Ok(Some((Reference::Char(c), consumed)));
    }

    let mut chars = body.char_indices();
    match chars.next() {
        None => return Ok(None),
        Some((_, c)) if is_name_start_char(c) => {}
        Some(_) => return Err("malformed entity reference"),
    }
    for (i, c) in chars {
        if is_name_char(c) {
            continue;
        }
        if c != ';' {
            return Err("malformed entity reference");
        }
        let name = &body[..i];
        let reference = match predefined(name) {
            Some(c) => Reference::Char(c),
            None => Reference::Named(name),
        };
        return Ok(Some((reference, i + 2)));
    }
    Ok(None)
}

/// Expand character references and predefined entities in `input`.
///
/// Used for DTD entity values, where only character references are
/// expanded at declaration time; other references are kept verbatim.
pub fn expand_char_refs(input: &str) -> Result<Cow<'_, str>, &'static str> {
    if memchr(b'&', input.as_bytes()).is_none() {
        return Ok(Cow::Borrowed(input));
    }
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(amp) = memchr(b'&', rest.as_bytes()) {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        if rest.as_bytes().get(1) == Some(&b'#') {
            match parse_reference(rest)? {
                Some((Reference::Char(c), len)) => {
                    out.push(c);
                    rest = &rest[len..];
                }
                _ => return Err("malformed character reference"),
            }
        } else {
            out.push('&');
            rest = &rest[1..];
        }
    }
    out.push_str(rest);
    Ok(Cow::Owned(out))
}

/// Normalize and expand an attribute value.
///
/// Literal whitespace characters become spaces, character references and
/// predefined entities are resolved, and internal general entities from
/// `entities` are expanded recursively. External, unparsed, undeclared and
/// recursive entity references are errors.
pub fn decode_attribute_value<'a>(
    raw: &'a str,
    entities: Option<&EntityTable>,
) -> Result<Cow<'a, str>, String> {
    // Fast path: nothing to normalize
    if memchr3(b'&', b'<', b'\t', raw.as_bytes()).is_none()
        && memchr(b'\n', raw.as_bytes()).is_none()
        && memchr(b'\r', raw.as_bytes()).is_none()
    {
        return Ok(Cow::Borrowed(raw));
    }
    let mut out = String::with_capacity(raw.len());
    let mut open = Vec::new();
    decode_into(raw, entities, &mut open, &mut out)?;
    Ok(Cow::Owned(out))
}

fn decode_into<'t>(
    raw: &str,
    entities: Option<&'t EntityTable>,
    open: &mut Vec<&'t str>,
    out: &mut String,
) -> Result<(), String> {
    let mut pos = 0;
    while pos < raw.len() {
        let rest = &raw[pos..];
        let Some(c) = rest.chars().next() else { break };
        match c {
            '<' => return Err("'<' not allowed in attribute value".to_string()),
            '\t' | '\n' | '\r' => {
                out.push(' ');
                pos += 1;
            }
            '&' => {
                let (reference, len) = parse_reference(rest)
                    .map_err(str::to_string)?
                    .ok_or_else(|| "unterminated reference in attribute value".to_string())?;
                pos += len;
                match reference {
                    Reference::Char(c) => out.push(c),
                    Reference::Named(name) => expand_named(name, entities, open, out)?,
                }
            }
            c => {
                if !is_xml_char(c) {
                    return Err(format!("invalid character U+{:04X} in attribute value", c as u32));
                }
                out.push(c);
                pos += c.len_utf8();
            }
        }
    }
    Ok(())
}

fn expand_named<'t>(
    name: &str,
    entities: Option<&'t EntityTable>,
    open: &mut Vec<&'t str>,
    out: &mut String,
) -> Result<(), String> {
    let Some((key, decl)) = entities.and_then(|t| t.general_entry(name)) else {
        return Err(format!("undefined entity '{}'", name));
    };
    let EntityValue::Internal(value) = &decl.value else {
        return Err(format!("reference to external entity '{}' in attribute value", name));
    };
    if open.contains(&key) {
        return Err(format!("recursive entity reference '{}'", name));
    }
    open.push(key);
    decode_into(value, entities, open, out)?;
    open.pop();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dtd::{EntityDecl, EntityValue};

    fn table(entries: &[(&str, &str)]) -> EntityTable {
        let mut table = EntityTable::default();
        for (name, value) in entries {
            table.declare_general(EntityDecl {
                name: name.to_string(),
                value: EntityValue::Internal(value.to_string()),
            });
        }
        table
    }

    #[test]
    fn test_parse_char_refs() {
        assert_eq!(parse_reference("&#65;rest"), Ok(Some((Reference::Char('A'), 5))));
        assert_eq!(parse_reference("&#x41;"), Ok(Some((Reference::Char('A'), 6))));
        assert_eq!(parse_reference("&lt;"), Ok(Some((Reference::Char('<'), 4))));
        assert!(parse_reference("&#0;").is_err());
        assert!(parse_reference("&#;").is_err());
    }

    #[test]
    fn test_parse_named_and_incomplete() {
        assert_eq!(parse_reference("&ent;x"), Ok(Some((Reference::Named("ent"), 5))));
        assert_eq!(parse_reference("&en"), Ok(None));
        assert_eq!(parse_reference("&#12"), Ok(None));
        assert_eq!(parse_reference("&"), Ok(None));
        assert!(parse_reference("& x").is_err());
        assert!(parse_reference("&a b;").is_err());
    }

    #[test]
    fn test_expand_char_refs() {
        assert_eq!(expand_char_refs("a&#38;b &ent;").unwrap(), "a&b &ent;");
        assert!(matches!(expand_char_refs("plain").unwrap(), Cow::Borrowed(_)));
    }

    #[test]
    fn test_attribute_normalization() {
        let value = decode_attribute_value("a\tb\nc&#10;d", None).unwrap();
        assert_eq!(value, "a b c\nd");
        assert!(matches!(decode_attribute_value("simple", None).unwrap(), Cow::Borrowed(_)));
    }

    #[test]
    fn test_attribute_entities() {
        let t = table(&[("who", "wor&amp;ld"), ("greet", "hello &who;")]);
        assert_eq!(decode_attribute_value("&greet;!", Some(&t)).unwrap(), "hello wor&ld!");
        assert!(decode_attribute_value("&nope;", Some(&t)).is_err());
        assert!(decode_attribute_value("a<b", None).is_err());
    }

    #[test]
    fn test_attribute_recursion() {
        let t = table(&[("a", "&b;"), ("b", "&a;")]);
        let err = decode_attribute_value("&a;", Some(&t)).unwrap_err();
        assert!(err.contains("recursive"));
    }
}
