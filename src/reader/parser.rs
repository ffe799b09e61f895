//! Pull parser
//!
//! [`StreamParser`] hands out one event per [`next`](StreamParser::next)
//! call. Input is read chunk by chunk and fed to the incremental tokenizer
//! only when the events produced so far have been consumed, so documents
//! of any size are processed in bounded memory.
//!
//! A start tag expands into a short run of events: the start element, its
//! namespace declarations and, when requested, its attributes as
//! start attribute / characters / end attribute triples. Namespace
//! declarations are closed again right before the matching end element.
//!
//! ## Content models
//!
//! After reading a start element the caller may declare the element's
//! [`Content`]. Violations are reported as parse errors at the offending
//! token:
//!
//! ```text
//! Empty    whitespace ignored, text or elements rejected
//! Simple   text only, delivered as one characters event
//! Complex  elements only, whitespace ignored
//! Mixed    anything (default)
//! ```
//!
//! ## Attribute map
//!
//! With [`RECEIVE_ATTRIBUTE_MAP`] the attributes of the current element are
//! kept from its start element until its end element has been consumed by
//! `next()` (a `peek()` at the end element keeps them available). Every
//! attribute must be looked up before then; the first one that was not is
//! reported as an "unexpected attribute" error.

use std::collections::{BTreeMap, VecDeque};
use std::io::Read;

use super::events::{
    Content, EventType, RECEIVE_ATTRIBUTES_EVENT, RECEIVE_ATTRIBUTE_MAP, RECEIVE_CHARACTERS, RECEIVE_DEFAULT,
    RECEIVE_ELEMENTS, RECEIVE_NAMESPACE_DECLS,
};
use crate::core::attributes::split_name;
use crate::core::dtd::{DtdItem, EntityTable, EntityValue};
use crate::core::encoding::{EncodingRegistry, InputDecoder};
use crate::core::entities::decode_attribute_value;
use crate::core::input::{SourceError, TextSource};
use crate::core::namespace::NamespaceResolver;
use crate::core::tokenizer::{Token, TokenKind, Tokenizer, TokenizerMode};
use crate::core::unicode::is_all_whitespace;
use crate::error::{StreamError, SyntaxError};
use crate::qname::QName;
use crate::value_traits::ValueTraits;

/// Value of an attribute in the attribute map
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeValue {
    value: String,
    handled: bool,
}

impl AttributeValue {
    pub fn value(&self) -> &str {
        &self.value
    }

    /// True once the attribute has been looked up
    pub fn is_handled(&self) -> bool {
        self.handled
    }
}

pub type AttributeMap = BTreeMap<QName, AttributeValue>;

static NO_ATTRIBUTES: AttributeMap = BTreeMap::new();

/// Per-element state: declared content model and attribute map
#[derive(Debug)]
struct ElementEntry {
    depth: usize,
    content: Content,
    attributes: AttributeMap,
    unhandled: usize,
}

impl ElementEntry {
    fn new(depth: usize, content: Content) -> Self {
        ElementEntry {
            depth,
            content,
            attributes: BTreeMap::new(),
            unhandled: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Event {
    kind: Option<EventType>,
    name: QName,
    value: String,
    line: usize,
    column: usize,
}

impl Event {
    fn new(kind: EventType, name: QName, value: String, line: usize, column: usize) -> Self {
        Event {
            kind: Some(kind),
            name,
            value,
            line,
            column,
        }
    }
}

/// An element whose end tag has not been read yet
#[derive(Debug)]
struct OpenElement {
    name: QName,
    /// (prefix, namespace) declared on the start tag
    bindings: Vec<(String, String)>,
}

/// Replacement text of an internal entity being read
struct EntityFrame {
    name: String,
    tokenizer: Tokenizer,
}

pub struct StreamParser<'a> {
    source: Option<TextSource<'a>>,
    tokenizer: Tokenizer,
    frames: Vec<EntityFrame>,
    /// Token read ahead while collecting character data
    stash: Option<Token>,
    input_name: String,
    feature: u32,
    io_errors: bool,
    namespaces: NamespaceResolver,
    entities: EntityTable,
    open: Vec<OpenElement>,
    queue: VecDeque<Event>,
    current: Event,
    peeked: bool,
    /// Number of start elements consumed and not yet closed
    depth: usize,
    elements: Vec<ElementEntry>,
    /// Character data of a simple-content element, with its position
    simple_text: Option<(String, usize, usize)>,
    /// Position of the last token read from the document
    line: usize,
    column: usize,
    eof: bool,
    done: bool,
}

impl std::fmt::Debug for StreamParser<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamParser")
            .field("input_name", &self.input_name)
            .field("feature", &self.feature)
            .field("depth", &self.depth)
            .field("event", &self.current.kind)
            .finish()
    }
}

impl<'a> StreamParser<'a> {
    /// Parser over a byte stream reporting [`RECEIVE_DEFAULT`] events
    pub fn new<R: Read + 'a>(reader: R, input_name: impl Into<String>) -> Self {
        Self::with_features(reader, input_name, RECEIVE_DEFAULT)
    }

    pub fn with_features<R: Read + 'a>(reader: R, input_name: impl Into<String>, feature: u32) -> Self {
        let decoder = InputDecoder::new(EncodingRegistry::new());
        Self::with_source(TextSource::from_reader(Box::new(reader), decoder, false), input_name, feature)
    }

    /// Parser over an in-memory document
    pub fn from_bytes(bytes: &'a [u8], input_name: impl Into<String>, feature: u32) -> Self {
        let decoder = InputDecoder::new(EncodingRegistry::new());
        Self::with_source(TextSource::from_memory(bytes, decoder), input_name, feature)
    }

    pub fn from_text(text: &'a str, input_name: impl Into<String>, feature: u32) -> Self {
        Self::from_bytes(text.as_bytes(), input_name, feature)
    }

    fn with_source(source: TextSource<'a>, input_name: impl Into<String>, feature: u32) -> Self {
        let input_name = input_name.into();
        tracing::debug!(input = %input_name, feature, "stream parse started");
        StreamParser {
            source: Some(source),
            tokenizer: Tokenizer::new(TokenizerMode::Document),
            frames: Vec::new(),
            stash: None,
            input_name,
            feature,
            io_errors: false,
            namespaces: NamespaceResolver::new(),
            entities: EntityTable::default(),
            open: Vec::new(),
            queue: VecDeque::new(),
            current: Event::default(),
            peeked: false,
            depth: 0,
            elements: Vec::new(),
            simple_text: None,
            line: 1,
            column: 1,
            eof: false,
            done: false,
        }
    }

    /// Report failures of the underlying stream as [`StreamError::Io`]
    /// instead of parse errors
    pub fn set_io_errors(&mut self, enabled: bool) {
        self.io_errors = enabled;
    }

    pub fn io_errors(&self) -> bool {
        self.io_errors
    }

    pub fn input_name(&self) -> &str {
        &self.input_name
    }

    pub fn feature(&self) -> u32 {
        self.feature
    }

    // ----- errors -----

    fn error_at(&self, line: usize, column: usize, description: impl Into<String>) -> StreamError {
        StreamError::Parsing {
            input_name: self.input_name.clone(),
            line: line as u64,
            column: column as u64,
            description: description.into(),
        }
    }

    /// Error at the last token read
    fn error(&self, description: impl Into<String>) -> StreamError {
        self.error_at(self.line, self.column, description)
    }

    /// Error at the current event
    fn event_error(&self, description: impl Into<String>) -> StreamError {
        self.error_at(self.current.line, self.current.column, description)
    }

    fn syntax_error(&self, error: SyntaxError) -> StreamError {
        self.error_at(error.line, error.column, error.message)
    }

    fn source_error(&self, error: SourceError) -> StreamError {
        match error {
            SourceError::Io(e) if self.io_errors => StreamError::Io(e),
            SourceError::Io(e) => self.error(e.to_string()),
            SourceError::Encoding(message) => self.error(message),
        }
    }

    // ----- event interface -----

    /// Consume and return the next event
    pub fn next(&mut self) -> Result<EventType, StreamError> {
        if self.peeked {
            self.peeked = false;
        } else {
            self.current = self.next_body()?;
        }
        let kind = self.event_type();
        match kind {
            EventType::StartElement => self.depth += 1,
            EventType::EndElement => {
                if self.elements.last().is_some_and(|e| e.depth == self.depth) {
                    self.pop_element()?;
                }
                self.depth = self.depth.saturating_sub(1);
            }
            _ => {}
        }
        Ok(kind)
    }

    /// Return the next event without consuming it. The accessors report
    /// the peeked event; element depth and attribute state are unchanged.
    pub fn peek(&mut self) -> Result<EventType, StreamError> {
        if !self.peeked {
            self.current = self.next_body()?;
            self.peeked = true;
        }
        Ok(self.event_type())
    }

    /// Type of the current event
    pub fn event_type(&self) -> EventType {
        self.current.kind.unwrap_or(EventType::Eof)
    }

    pub fn next_expect(&mut self, expected: EventType) -> Result<(), StreamError> {
        if self.next()? != expected {
            return Err(self.event_error(format!("{} expected", expected)));
        }
        Ok(())
    }

    pub fn next_expect_name(&mut self, expected: EventType, name: &QName) -> Result<(), StreamError> {
        if self.next()? != expected || self.current.name != *name {
            return Err(self.event_error(format!("{} '{}' expected", expected, name)));
        }
        Ok(())
    }

    /// Expect a start element and declare its content model
    pub fn next_expect_content(&mut self, name: &QName, content: Content) -> Result<(), StreamError> {
        self.next_expect_name(EventType::StartElement, name)?;
        self.content(content);
        Ok(())
    }

    /// Declare the content model of the current element
    pub fn content(&mut self, content: Content) {
        match self.elements.last_mut() {
            Some(entry) if entry.depth == self.depth => entry.content = content,
            _ => self.elements.push(ElementEntry::new(self.depth, content)),
        }
    }

    /// Content model of the current element
    pub fn current_content(&self) -> Content {
        self.element_index()
            .map_or(Content::Mixed, |i| self.elements[i].content)
    }

    pub fn qname(&self) -> &QName {
        &self.current.name
    }

    pub fn namespace(&self) -> &str {
        self.current.name.namespace()
    }

    pub fn name(&self) -> &str {
        self.current.name.name()
    }

    pub fn prefix(&self) -> &str {
        self.current.name.prefix()
    }

    /// Text of a characters event
    pub fn value(&self) -> &str {
        &self.current.value
    }

    pub fn value_as<T: ValueTraits>(&self) -> Result<T, StreamError> {
        T::parse(&self.current.value).map_err(|m| self.event_error(m))
    }

    /// Line of the current event (1-based)
    pub fn line(&self) -> u64 {
        self.current.line as u64
    }

    /// Column of the current event (1-based)
    pub fn column(&self) -> u64 {
        self.current.column as u64
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    // ----- attributes -----

    /// Entry of the element at the current depth. A start element that has
    /// been peeked but not consumed is skipped.
    fn element_index(&self) -> Option<usize> {
        let n = self.elements.len().checked_sub(1)?;
        if self.elements[n].depth == self.depth {
            return Some(n);
        }
        if n > 0 && self.elements[n].depth > self.depth && self.elements[n - 1].depth == self.depth {
            return Some(n - 1);
        }
        None
    }

    fn lookup_attribute(&mut self, name: &QName) -> Option<String> {
        let i = self.element_index()?;
        let entry = &mut self.elements[i];
        let attribute = entry.attributes.get_mut(name)?;
        if !attribute.handled {
            attribute.handled = true;
            entry.unhandled -= 1;
        }
        Some(attribute.value.clone())
    }

    /// All attributes of the current element; every one counts as handled
    pub fn attribute_map(&mut self) -> &AttributeMap {
        let Some(i) = self.element_index() else {
            return &NO_ATTRIBUTES;
        };
        let entry = &mut self.elements[i];
        entry.unhandled = 0;
        for attribute in entry.attributes.values_mut() {
            attribute.handled = true;
        }
        &entry.attributes
    }

    /// Required attribute
    pub fn attribute<T: ValueTraits>(&mut self, name: &QName) -> Result<T, StreamError> {
        match self.lookup_attribute(name) {
            Some(value) => T::parse(&value).map_err(|m| self.event_error(m)),
            None => Err(self.event_error(format!("attribute '{}' expected", name))),
        }
    }

    pub fn attribute_or<T: ValueTraits>(&mut self, name: &QName, default: T) -> Result<T, StreamError> {
        match self.lookup_attribute(name) {
            Some(value) => T::parse(&value).map_err(|m| self.event_error(m)),
            None => Ok(default),
        }
    }

    pub fn attribute_present(&mut self, name: &QName) -> bool {
        self.lookup_attribute(name).is_some()
    }

    fn pop_element(&mut self) -> Result<(), StreamError> {
        let Some(entry) = self.elements.pop() else {
            return Ok(());
        };
        if entry.unhandled != 0 {
            if let Some((name, _)) = entry.attributes.iter().find(|(_, a)| !a.handled) {
                return Err(self.event_error(format!("unexpected attribute '{}'", name)));
            }
        }
        Ok(())
    }

    // ----- element helpers -----

    /// Text of the current element, read up to and including its end element
    pub fn element<T: ValueTraits>(&mut self) -> Result<T, StreamError> {
        self.content(Content::Simple);
        let text = match self.next()? {
            EventType::Characters => {
                let text = std::mem::take(&mut self.current.value);
                self.next_expect(EventType::EndElement)?;
                text
            }
            EventType::EndElement => String::new(),
            _ => return Err(self.event_error("characters expected")),
        };
        T::parse(&text).map_err(|m| self.event_error(m))
    }

    /// Read `<name>text</name>`
    pub fn element_named<T: ValueTraits>(&mut self, name: &QName) -> Result<T, StreamError> {
        self.next_expect_name(EventType::StartElement, name)?;
        self.element()
    }

    /// Read `<name>text</name>` if it comes next, otherwise return `default`
    pub fn element_or<T: ValueTraits>(&mut self, name: &QName, default: T) -> Result<T, StreamError> {
        if self.peek()? == EventType::StartElement && self.current.name == *name {
            self.next()?;
            return self.element();
        }
        Ok(default)
    }

    // ----- event production -----

    fn next_body(&mut self) -> Result<Event, StreamError> {
        loop {
            if let Some(event) = self.queue.pop_front() {
                return Ok(event);
            }
            if self.eof {
                return Ok(Event::new(EventType::Eof, QName::default(), String::new(), self.line, self.column));
            }
            self.advance()?;
        }
    }

    /// Read input until the tokenizer has a token
    fn next_token(&mut self) -> Result<Option<Token>, StreamError> {
        if let Some(token) = self.stash.take() {
            return Ok(Some(token));
        }
        loop {
            if let Some(frame) = self.frames.last_mut() {
                match frame.tokenizer.next_token() {
                    Ok(Some(token)) => return Ok(Some(token)),
                    Ok(None) => {
                        self.frames.pop();
                        continue;
                    }
                    Err(e) => {
                        let message = format!("{} in entity '{}'", e.message, frame.name);
                        return Err(self.error(message));
                    }
                }
            }
            match self.tokenizer.next_token() {
                Ok(Some(token)) => {
                    self.line = token.line;
                    self.column = token.column;
                    return Ok(Some(token));
                }
                Ok(None) if self.tokenizer.is_finished() => return Ok(None),
                Ok(None) => self.feed()?,
                Err(e) => return Err(self.syntax_error(e)),
            }
        }
    }

    fn feed(&mut self) -> Result<(), StreamError> {
        let fed = match self.source.as_mut() {
            Some(source) => source.next_text(),
            None => Ok(None),
        };
        match fed {
            Ok(Some(text)) => {
                tracing::trace!(bytes = text.len(), "stream chunk");
                self.tokenizer.feed(&text);
            }
            Ok(None) => {
                self.source = None;
                self.tokenizer.finish();
            }
            Err(e) => return Err(self.source_error(e)),
        }
        Ok(())
    }

    /// Process the next token, queueing the events it produces
    fn advance(&mut self) -> Result<(), StreamError> {
        let Some(token) = self.next_token()? else {
            self.eof = true;
            tracing::debug!(input = %self.input_name, "stream parse finished");
            return Ok(());
        };
        match token.kind {
            TokenKind::XmlDecl | TokenKind::Comment | TokenKind::Pi => Ok(()),
            TokenKind::DocType => {
                if let Some(decl) = token.doctype {
                    for item in &decl.items {
                        if let DtdItem::Entity { parameter: false, decl } = item {
                            self.entities.declare_general(decl.clone());
                        }
                    }
                }
                Ok(())
            }
            TokenKind::StartTag | TokenKind::EmptyTag => self.start_element(token),
            TokenKind::EndTag => self.end_element(),
            TokenKind::Text | TokenKind::CData => self.characters(token.content),
            TokenKind::EntityRef => self.enter_entity(&token.name),
        }
    }

    fn enter_entity(&mut self, name: &str) -> Result<(), StreamError> {
        let value = match self.entities.general(name).map(|d| &d.value) {
            Some(EntityValue::Internal(value)) => value.clone(),
            Some(EntityValue::External { .. }) => {
                return Err(self.error(format!("reference to external entity '{}'", name)))
            }
            None => return Err(self.error(format!("undefined entity '{}'", name))),
        };
        if self.frames.iter().any(|f| f.name == name) {
            return Err(self.error(format!("recursive entity reference '{}'", name)));
        }
        self.frames.push(EntityFrame {
            name: name.to_string(),
            tokenizer: Tokenizer::from_text(TokenizerMode::Content, &value),
        });
        Ok(())
    }

    /// Collect a maximal run of character data and apply the content model
    fn characters(&mut self, first: String) -> Result<(), StreamError> {
        let (line, column) = (self.line, self.column);
        let mut text = first;
        while let Some(token) = self.next_token()? {
            match token.kind {
                TokenKind::Text | TokenKind::CData => text.push_str(&token.content),
                TokenKind::EntityRef => self.enter_entity(&token.name)?,
                _ => {
                    self.stash = Some(token);
                    break;
                }
            }
        }

        if self.feature & RECEIVE_CHARACTERS == 0 {
            return Ok(());
        }
        match self.current_content() {
            content @ (Content::Empty | Content::Complex) => {
                if is_all_whitespace(&text) {
                    return Ok(());
                }
                let model = if content == Content::Complex { "complex" } else { "empty" };
                Err(self.error_at(line, column, format!("characters in {} content", model)))
            }
            Content::Simple => {
                if let Some((acc, _, _)) = self.simple_text.as_mut() {
                    acc.push_str(&text);
                } else {
                    self.simple_text = Some((text, line, column));
                }
                Ok(())
            }
            Content::Mixed => {
                if !text.is_empty() {
                    self.queue
                        .push_back(Event::new(EventType::Characters, QName::default(), text, line, column));
                }
                Ok(())
            }
        }
    }

    fn resolve(&self, qname: &str, element: bool) -> Result<QName, String> {
        let (prefix, local) = split_name(qname);
        match prefix {
            Some(prefix) => match self.namespaces.resolve(prefix) {
                Some(uri) => Ok(QName::with_prefix(uri, local, prefix)),
                None => Err(format!("unbound namespace prefix '{}'", prefix)),
            },
            None if element => Ok(QName::new(self.namespaces.resolve_default().unwrap_or(""), local)),
            None => Ok(QName::local(local)),
        }
    }

    fn start_element(&mut self, token: Token) -> Result<(), StreamError> {
        let (line, column) = (self.line, self.column);
        let elements = self.feature & RECEIVE_ELEMENTS != 0;
        if elements {
            match self.current_content() {
                Content::Empty => return Err(self.error_at(line, column, "element in empty content")),
                Content::Simple => return Err(self.error_at(line, column, "element in simple content")),
                Content::Complex | Content::Mixed => {}
            }
        }

        self.namespaces.push_scope();
        let mut bindings = Vec::new();
        let mut raw_attributes = Vec::with_capacity(token.attributes.len());
        for raw in &token.attributes {
            let value = decode_attribute_value(&raw.value, Some(&self.entities))
                .map_err(|m| self.error_at(line, column, m))?
                .into_owned();
            if raw.is_namespace_decl() {
                let prefix = raw.name.strip_prefix("xmlns:").unwrap_or("");
                self.namespaces
                    .declare(prefix, &value)
                    .map_err(|m| self.error_at(line, column, m))?;
                if prefix != "xml" {
                    bindings.push((prefix.to_string(), value));
                }
            } else {
                raw_attributes.push((raw.name.as_str(), value));
            }
        }

        let name = self
            .resolve(&token.name, true)
            .map_err(|m| self.error_at(line, column, m))?;
        let mut attributes: Vec<(QName, String)> = Vec::with_capacity(raw_attributes.len());
        for (raw_name, value) in raw_attributes {
            let qname = self
                .resolve(raw_name, false)
                .map_err(|m| self.error_at(line, column, m))?;
            if attributes.iter().any(|(q, _)| *q == qname) {
                return Err(self.error_at(line, column, format!("duplicate attribute '{}'", qname)));
            }
            attributes.push((qname, value));
        }

        if elements {
            self.queue.push_back(Event::new(
                EventType::StartElement,
                name.clone(),
                String::new(),
                line,
                column,
            ));
        }
        if self.feature & RECEIVE_NAMESPACE_DECLS != 0 {
            for (prefix, uri) in &bindings {
                self.queue.push_back(Event::new(
                    EventType::StartNamespaceDecl,
                    QName::with_prefix(uri.as_str(), "", prefix.as_str()),
                    String::new(),
                    line,
                    column,
                ));
            }
        }
        if elements && self.feature & RECEIVE_ATTRIBUTE_MAP != 0 {
            if !attributes.is_empty() {
                let mut entry = ElementEntry::new(self.depth + 1, Content::Mixed);
                for (qname, value) in attributes {
                    entry.attributes.insert(qname, AttributeValue { value, handled: false });
                }
                entry.unhandled = entry.attributes.len();
                self.elements.push(entry);
            }
        } else if self.feature & RECEIVE_ATTRIBUTES_EVENT != 0 {
            for (qname, value) in attributes {
                self.queue.push_back(Event::new(
                    EventType::StartAttribute,
                    qname.clone(),
                    String::new(),
                    line,
                    column,
                ));
                self.queue
                    .push_back(Event::new(EventType::Characters, qname.clone(), value, line, column));
                self.queue
                    .push_back(Event::new(EventType::EndAttribute, qname, String::new(), line, column));
            }
        }

        self.open.push(OpenElement { name, bindings });
        if token.kind == TokenKind::EmptyTag {
            self.end_element()?;
        }
        Ok(())
    }

    fn end_element(&mut self) -> Result<(), StreamError> {
        let (line, column) = (self.line, self.column);
        let Some(element) = self.open.pop() else {
            return Err(self.error("unexpected end tag"));
        };
        if let Some((text, text_line, text_column)) = self.simple_text.take() {
            self.queue.push_back(Event::new(
                EventType::Characters,
                QName::default(),
                text,
                text_line,
                text_column,
            ));
        }
        self.namespaces.pop_scope();
        if self.feature & RECEIVE_NAMESPACE_DECLS != 0 {
            for (prefix, uri) in element.bindings {
                self.queue.push_back(Event::new(
                    EventType::EndNamespaceDecl,
                    QName::with_prefix(uri, "", prefix),
                    String::new(),
                    line,
                    column,
                ));
            }
        }
        if self.feature & RECEIVE_ELEMENTS != 0 {
            self.queue
                .push_back(Event::new(EventType::EndElement, element.name, String::new(), line, column));
        }
        Ok(())
    }
}

impl Iterator for StreamParser<'_> {
    type Item = Result<EventType, StreamError>;

    /// Events up to (not including) end of file; iteration stops after an error
    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match StreamParser::next(self) {
            Ok(EventType::Eof) => {
                self.done = true;
                None
            }
            Ok(event) => Some(Ok(event)),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn parser(xml: &str) -> StreamParser<'_> {
        StreamParser::from_text(xml, "test.xml", RECEIVE_DEFAULT)
    }

    fn description(err: StreamError) -> String {
        err.description()
    }

    #[test]
    fn test_namespace_decl_events() {
        let xml = "<a xmlns:p=\"urn:p\"><p:b/></a>";
        let mut p = StreamParser::from_text(xml, "in", RECEIVE_DEFAULT | RECEIVE_NAMESPACE_DECLS);

        assert_eq!(p.next().unwrap(), EventType::StartElement);
        assert_eq!(p.qname(), &QName::local("a"));
        assert_eq!(p.next().unwrap(), EventType::StartNamespaceDecl);
        assert_eq!((p.prefix(), p.namespace()), ("p", "urn:p"));
        assert_eq!(p.next().unwrap(), EventType::StartElement);
        assert_eq!(p.qname(), &QName::new("urn:p", "b"));
        assert_eq!(p.prefix(), "p");
        assert_eq!(p.next().unwrap(), EventType::EndElement);
        assert_eq!(p.name(), "b");
        assert_eq!(p.next().unwrap(), EventType::EndNamespaceDecl);
        assert_eq!(p.prefix(), "p");
        assert_eq!(p.next().unwrap(), EventType::EndElement);
        assert_eq!(p.name(), "a");
        assert_eq!(p.next().unwrap(), EventType::Eof);
        assert_eq!(p.next().unwrap(), EventType::Eof);
    }

    #[test]
    fn test_namespace_scope_restored() {
        let xml = "<r xmlns:p='urn:1'><p:a xmlns:p='urn:2'><p:b/></p:a><p:c/></r>";
        let names: Vec<QName> = {
            let mut p = parser(xml);
            let mut names = Vec::new();
            while p.next().unwrap() != EventType::Eof {
                if p.event_type() == EventType::StartElement {
                    names.push(p.qname().clone());
                }
            }
            names
        };
        assert_eq!(
            names,
            vec![
                QName::local("r"),
                QName::new("urn:2", "a"),
                QName::new("urn:2", "b"),
                QName::new("urn:1", "c"),
            ]
        );
    }

    #[test]
    fn test_unhandled_attribute() {
        let mut p = parser("<r a='1' b='2'/>");
        p.next_expect(EventType::StartElement).unwrap();
        assert_eq!(p.attribute::<u32>(&QName::local("a")).unwrap(), 1);
        let err = p.next().unwrap_err();
        assert_eq!(description(err), "unexpected attribute 'b'");
    }

    #[test]
    fn test_attributes_survive_peek_at_end() {
        let mut p = parser("<r a='1' b='x'/>");
        p.next_expect(EventType::StartElement).unwrap();
        assert_eq!(p.attribute::<u32>(&QName::local("a")).unwrap(), 1);
        assert_eq!(p.peek().unwrap(), EventType::EndElement);
        assert!(p.attribute_present(&QName::local("b")));
        assert_eq!(p.attribute_or(&QName::local("missing"), 5u8).unwrap(), 5);
        assert_eq!(p.next().unwrap(), EventType::EndElement);
        assert_eq!(p.next().unwrap(), EventType::Eof);
    }

    #[test]
    fn test_attribute_map_marks_all_handled() {
        let mut p = parser("<r z='1' a='2' xmlns:q='urn:q' q:m='3'/>");
        p.next_expect(EventType::StartElement).unwrap();
        let names: Vec<String> = p.attribute_map().keys().map(ToString::to_string).collect();
        assert_eq!(names, vec!["a", "z", "urn:q#m"]);
        p.next_expect(EventType::EndElement).unwrap();
        p.next_expect(EventType::Eof).unwrap();
    }

    #[test]
    fn test_required_attribute_missing() {
        let mut p = parser("<r/>");
        p.next().unwrap();
        let err = p.attribute::<String>(&QName::local("id")).unwrap_err();
        assert_eq!(description(err), "attribute 'id' expected");
        assert_eq!(p.attribute_map().len(), 0);
    }

    #[test]
    fn test_element_in_simple_content() {
        let mut p = parser("<x>a<y/>b</x>");
        p.next_expect(EventType::StartElement).unwrap();
        p.content(Content::Simple);
        let err = p.next().unwrap_err();
        assert_eq!(description(err), "element in simple content");
    }

    #[test]
    fn test_empty_content() {
        let mut p = parser("<x> </x>");
        p.next_expect(EventType::StartElement).unwrap();
        p.content(Content::Empty);
        assert_eq!(p.next().unwrap(), EventType::EndElement);

        let mut p = parser("<x>a</x>");
        p.next_expect(EventType::StartElement).unwrap();
        p.content(Content::Empty);
        assert_eq!(description(p.next().unwrap_err()), "characters in empty content");

        let mut p = parser("<x><y/></x>");
        p.next_expect(EventType::StartElement).unwrap();
        p.content(Content::Empty);
        assert_eq!(description(p.next().unwrap_err()), "element in empty content");
    }

    #[test]
    fn test_complex_content() {
        let mut p = parser("<x>\n  <y/>\n</x>");
        p.next_expect_content(&QName::local("x"), Content::Complex).unwrap();
        p.next_expect_name(EventType::StartElement, &QName::local("y")).unwrap();
        p.next_expect(EventType::EndElement).unwrap();
        p.next_expect(EventType::EndElement).unwrap();

        let mut p = parser("<x><y/>text</x>");
        p.next_expect_content(&QName::local("x"), Content::Complex).unwrap();
        p.next_expect(EventType::StartElement).unwrap();
        p.next_expect(EventType::EndElement).unwrap();
        assert_eq!(description(p.next().unwrap_err()), "characters in complex content");
    }

    #[test]
    fn test_simple_content_is_one_event() {
        let mut p = parser("<x>a &amp; b<![CDATA[<c>]]><!--skip-->d</x>");
        p.next_expect(EventType::StartElement).unwrap();
        p.content(Content::Simple);
        assert_eq!(p.next().unwrap(), EventType::Characters);
        assert_eq!(p.value(), "a & b<c>d");
        assert_eq!(p.next().unwrap(), EventType::EndElement);
    }

    #[test]
    fn test_typed_elements() {
        let xml = "<cfg><n>5</n><flag>true</flag><empty/></cfg>";
        let mut p = parser(xml);
        p.next_expect_content(&QName::local("cfg"), Content::Complex).unwrap();
        assert_eq!(p.element_named::<u32>(&QName::local("n")).unwrap(), 5);
        assert!(p.element_or(&QName::local("flag"), false).unwrap());
        assert_eq!(p.element_or(&QName::local("missing"), 7u32).unwrap(), 7);
        assert_eq!(p.element_named::<String>(&QName::local("empty")).unwrap(), "");
        p.next_expect(EventType::EndElement).unwrap();
        p.next_expect(EventType::Eof).unwrap();
    }

    #[test]
    fn test_invalid_value() {
        let mut p = parser("<n>five</n>");
        p.next().unwrap();
        let err = p.element::<u32>().unwrap_err();
        assert_eq!(description(err), "invalid u32 value 'five'");
    }

    #[test]
    fn test_next_expect_mismatch() {
        let mut p = parser("<a/>");
        let err = p
            .next_expect_name(EventType::StartElement, &QName::local("b"))
            .unwrap_err();
        assert_eq!(description(err), "start element 'b' expected");
        let err = p.next_expect(EventType::Characters).unwrap_err();
        assert_eq!(description(err), "characters expected");
    }

    #[test]
    fn test_attribute_events() {
        let features = RECEIVE_ELEMENTS | RECEIVE_CHARACTERS | RECEIVE_ATTRIBUTES_EVENT;
        let mut p = StreamParser::from_text("<r k='v'/>", "in", features);
        assert_eq!(p.next().unwrap(), EventType::StartElement);
        assert_eq!(p.next().unwrap(), EventType::StartAttribute);
        assert_eq!(p.name(), "k");
        assert_eq!(p.next().unwrap(), EventType::Characters);
        assert_eq!(p.value(), "v");
        assert_eq!(p.next().unwrap(), EventType::EndAttribute);
        assert_eq!(p.next().unwrap(), EventType::EndElement);
        assert_eq!(p.next().unwrap(), EventType::Eof);
    }

    #[test]
    fn test_internal_entities() {
        let xml = "<!DOCTYPE r [<!ENTITY e 'x<i/>y'>]><r>&e;</r>";
        let events: Vec<EventType> = parser(xml).map(Result::unwrap).collect();
        assert_eq!(
            events,
            vec![
                EventType::StartElement,
                EventType::Characters,
                EventType::StartElement,
                EventType::EndElement,
                EventType::Characters,
                EventType::EndElement,
            ]
        );

        let mut p = parser("<r>&nope;</r>");
        p.next().unwrap();
        assert_eq!(description(p.next().unwrap_err()), "undefined entity 'nope'");
    }

    #[test]
    fn test_syntax_error_location() {
        let mut p = parser("<a>\n<b></a>");
        let err = loop {
            match p.next() {
                Ok(EventType::Eof) => panic!("expected an error"),
                Ok(_) => continue,
                Err(e) => break e,
            }
        };
        match err {
            StreamError::Parsing { input_name, line, .. } => {
                assert_eq!(input_name, "test.xml");
                assert_eq!(line, 2);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    /// Hands out at most `step` bytes per read call
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        step: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.step.min(buf.len()).min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[test]
    fn test_chunked_reader() {
        let reader = Trickle {
            data: b"<r a='1'>hello world<c/></r>".to_vec(),
            pos: 0,
            step: 3,
        };
        let mut p = StreamParser::new(reader, "trickle");
        p.next_expect(EventType::StartElement).unwrap();
        assert_eq!(p.attribute::<i32>(&QName::local("a")).unwrap(), 1);
        assert_eq!(p.next().unwrap(), EventType::Characters);
        assert_eq!(p.value(), "hello world");
        assert_eq!(p.line(), 1);
        assert_eq!(p.column(), 10);
        p.next_expect(EventType::StartElement).unwrap();
        p.next_expect(EventType::EndElement).unwrap();
        p.next_expect(EventType::EndElement).unwrap();
        p.next_expect(EventType::Eof).unwrap();
    }

    struct Failing;

    impl Read for Failing {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "device gone"))
        }
    }

    #[test]
    fn test_io_errors() {
        let mut p = StreamParser::new(Failing, "dev");
        let err = p.next().unwrap_err();
        assert!(matches!(err, StreamError::Parsing { .. }));
        assert_eq!(err.description(), "device gone");

        let mut p = StreamParser::new(Failing, "dev");
        p.set_io_errors(true);
        assert!(matches!(p.next().unwrap_err(), StreamError::Io(_)));
    }
}
