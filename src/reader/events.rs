//! Pull parser event types
//!
//! Events returned by [`StreamParser::next`](super::StreamParser::next),
//! the per-element content models, and the flags that select which
//! events are produced.

use std::fmt;

/// Report start and end element events
pub const RECEIVE_ELEMENTS: u32 = 0x0001;
/// Report character data
pub const RECEIVE_CHARACTERS: u32 = 0x0002;
/// Collect the attributes of each start tag into a map
pub const RECEIVE_ATTRIBUTE_MAP: u32 = 0x0004;
/// Report attributes as start attribute / characters / end attribute
pub const RECEIVE_ATTRIBUTES_EVENT: u32 = 0x0008;
/// Report namespace declarations
pub const RECEIVE_NAMESPACE_DECLS: u32 = 0x0010;

pub const RECEIVE_DEFAULT: u32 = RECEIVE_ELEMENTS | RECEIVE_CHARACTERS | RECEIVE_ATTRIBUTE_MAP;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    StartElement,
    EndElement,
    StartAttribute,
    EndAttribute,
    Characters,
    StartNamespaceDecl,
    EndNamespaceDecl,
    Eof,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::StartElement => "start element",
            EventType::EndElement => "end element",
            EventType::StartAttribute => "start attribute",
            EventType::EndAttribute => "end attribute",
            EventType::Characters => "characters",
            EventType::StartNamespaceDecl => "start namespace declaration",
            EventType::EndNamespaceDecl => "end namespace declaration",
            EventType::Eof => "end of file",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content model of one element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Content {
    /// No characters or child elements (whitespace is ignored)
    Empty,
    /// Characters only, reported as a single event
    Simple,
    /// Child elements only (whitespace is ignored)
    Complex,
    /// Anything; nothing is checked
    #[default]
    Mixed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        assert_eq!(EventType::StartElement.to_string(), "start element");
        assert_eq!(EventType::StartNamespaceDecl.to_string(), "start namespace declaration");
        assert_eq!(EventType::Eof.to_string(), "end of file");
    }

    #[test]
    fn test_default_flags() {
        assert_eq!(RECEIVE_DEFAULT, 7);
        assert_eq!(RECEIVE_DEFAULT & RECEIVE_ATTRIBUTES_EVENT, 0);
        assert_eq!(Content::default(), Content::Mixed);
    }
}
