//! Handler interfaces
//!
//! [`EventSink`] is the single-callback consumer interface of the engine.
//! The classic capability sets (content, DTD, lexical, declaration, error
//! handlers and the entity resolver) are traits with no-op defaults, so an
//! implementor only overrides what it needs; [`HandlerSet`] adapts any
//! combination of them into an `EventSink`.

use super::events::{Attributes, HandlerKind, ParseEvent, QualifiedName};
use super::input_source::InputSource;
use crate::error::{Location, XmlError};
use std::cell::RefCell;
use std::rc::Rc;

/// Consumer of parse events
pub trait EventSink {
    fn event(&mut self, event: ParseEvent) -> Result<(), XmlError>;

    /// Called once before `StartDocument`
    fn set_locator(&mut self, _locator: Locator) {}
}

impl<F> EventSink for F
where
    F: FnMut(ParseEvent) -> Result<(), XmlError>,
{
    fn event(&mut self, event: ParseEvent) -> Result<(), XmlError> {
        self(event)
    }
}

/// Shared view of the parser's current position.
///
/// Always reflects the innermost entity being read.
#[derive(Debug, Clone, Default)]
pub struct Locator(Rc<RefCell<Location>>);

impl Locator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line_number(&self) -> usize {
        self.0.borrow().line
    }

    pub fn column_number(&self) -> usize {
        self.0.borrow().column
    }

    pub fn system_id(&self) -> Option<String> {
        self.0.borrow().system_id.clone()
    }

    pub fn public_id(&self) -> Option<String> {
        self.0.borrow().public_id.clone()
    }

    /// Snapshot of the current location
    pub fn location(&self) -> Location {
        self.0.borrow().clone()
    }

    pub(crate) fn update(
        &self,
        line: usize,
        column: usize,
        system_id: Option<&str>,
        public_id: Option<&str>,
    ) {
        let mut location = self.0.borrow_mut();
        location.line = line;
        location.column = column;
        if location.system_id.as_deref() != system_id {
            location.system_id = system_id.map(str::to_string);
        }
        if location.public_id.as_deref() != public_id {
            location.public_id = public_id.map(str::to_string);
        }
    }
}

/// Receives the logical content of a document
pub trait ContentHandler {
    fn set_document_locator(&mut self, _locator: Locator) {}

    fn start_document(&mut self) -> Result<(), XmlError> {
        Ok(())
    }

    fn end_document(&mut self) -> Result<(), XmlError> {
        Ok(())
    }

    fn start_prefix_mapping(&mut self, _prefix: &str, _uri: &str) -> Result<(), XmlError> {
        Ok(())
    }

    fn end_prefix_mapping(&mut self, _prefix: &str) -> Result<(), XmlError> {
        Ok(())
    }

    fn start_element(&mut self, _name: &QualifiedName, _attributes: &Attributes) -> Result<(), XmlError> {
        Ok(())
    }

    fn end_element(&mut self, _name: &QualifiedName) -> Result<(), XmlError> {
        Ok(())
    }

    fn characters(&mut self, _text: &str) -> Result<(), XmlError> {
        Ok(())
    }

    fn ignorable_whitespace(&mut self, _text: &str) -> Result<(), XmlError> {
        Ok(())
    }

    fn processing_instruction(&mut self, _target: &str, _data: &str) -> Result<(), XmlError> {
        Ok(())
    }

    fn skipped_entity(&mut self, _name: &str) -> Result<(), XmlError> {
        Ok(())
    }
}

/// Receives notation and unparsed entity declarations
pub trait DtdHandler {
    fn notation_decl(
        &mut self,
        _name: &str,
        _public_id: Option<&str>,
        _system_id: Option<&str>,
    ) -> Result<(), XmlError> {
        Ok(())
    }

    fn unparsed_entity_decl(
        &mut self,
        _name: &str,
        _public_id: Option<&str>,
        _system_id: &str,
        _notation: &str,
    ) -> Result<(), XmlError> {
        Ok(())
    }
}

/// Receives lexical details: DTD boundaries, entity boundaries, CDATA
/// section boundaries and comments
pub trait LexicalHandler {
    fn start_dtd(
        &mut self,
        _name: &str,
        _public_id: Option<&str>,
        _system_id: Option<&str>,
    ) -> Result<(), XmlError> {
        Ok(())
    }

    fn end_dtd(&mut self) -> Result<(), XmlError> {
        Ok(())
    }

    fn start_entity(&mut self, _name: &str) -> Result<(), XmlError> {
        Ok(())
    }

    fn end_entity(&mut self, _name: &str) -> Result<(), XmlError> {
        Ok(())
    }

    fn start_cdata(&mut self) -> Result<(), XmlError> {
        Ok(())
    }

    fn end_cdata(&mut self) -> Result<(), XmlError> {
        Ok(())
    }

    fn comment(&mut self, _text: &str) -> Result<(), XmlError> {
        Ok(())
    }
}

/// Receives element, attribute and entity declarations
pub trait DeclHandler {
    fn element_decl(&mut self, _name: &str, _model: &str) -> Result<(), XmlError> {
        Ok(())
    }

    fn attribute_decl(
        &mut self,
        _element: &str,
        _attribute: &str,
        _attr_type: &str,
        _mode: Option<&str>,
        _value: Option<&str>,
    ) -> Result<(), XmlError> {
        Ok(())
    }

    fn internal_entity_decl(&mut self, _name: &str, _value: &str) -> Result<(), XmlError> {
        Ok(())
    }

    fn external_entity_decl(
        &mut self,
        _name: &str,
        _public_id: Option<&str>,
        _system_id: &str,
    ) -> Result<(), XmlError> {
        Ok(())
    }
}

/// Told about errors before the parser returns them
pub trait ErrorHandler {
    fn warning(&mut self, _error: &XmlError) {}

    fn error(&mut self, _error: &XmlError) {}

    fn fatal_error(&mut self, _error: &XmlError) {}
}

/// Maps external entity identifiers to inputs
pub trait EntityResolver {
    /// Returning `Ok(None)` makes the reference fail with an entity error
    fn resolve_entity(
        &mut self,
        public_id: Option<&str>,
        system_id: &str,
    ) -> Result<Option<InputSource<'static>>, XmlError>;
}

/// Route a content event to a content handler
pub fn deliver_content(handler: &mut dyn ContentHandler, event: &ParseEvent) -> Result<(), XmlError> {
    match event {
        ParseEvent::StartDocument => handler.start_document(),
        ParseEvent::EndDocument => handler.end_document(),
        ParseEvent::StartPrefixMapping { prefix, uri } => handler.start_prefix_mapping(prefix, uri),
        ParseEvent::EndPrefixMapping { prefix } => handler.end_prefix_mapping(prefix),
        ParseEvent::StartElement { name, attributes } => handler.start_element(name, attributes),
        ParseEvent::EndElement { name } => handler.end_element(name),
        ParseEvent::Characters(text) => handler.characters(text),
        ParseEvent::IgnorableWhitespace(text) => handler.ignorable_whitespace(text),
        ParseEvent::ProcessingInstruction { target, data } => handler.processing_instruction(target, data),
        ParseEvent::SkippedEntity(name) => handler.skipped_entity(name),
        _ => Ok(()),
    }
}

/// Route a DTD event to a DTD handler
pub fn deliver_dtd(handler: &mut dyn DtdHandler, event: &ParseEvent) -> Result<(), XmlError> {
    match event {
        ParseEvent::NotationDecl {
            name,
            public_id,
            system_id,
        } => handler.notation_decl(name, public_id.as_deref(), system_id.as_deref()),
        ParseEvent::UnparsedEntityDecl {
            name,
            public_id,
            system_id,
            notation,
        } => handler.unparsed_entity_decl(name, public_id.as_deref(), system_id, notation),
        _ => Ok(()),
    }
}

/// Route a lexical event to a lexical handler
pub fn deliver_lexical(handler: &mut dyn LexicalHandler, event: &ParseEvent) -> Result<(), XmlError> {
    match event {
        ParseEvent::StartDtd {
            name,
            public_id,
            system_id,
        } => handler.start_dtd(name, public_id.as_deref(), system_id.as_deref()),
        ParseEvent::EndDtd => handler.end_dtd(),
        ParseEvent::StartEntity(name) => handler.start_entity(name),
        ParseEvent::EndEntity(name) => handler.end_entity(name),
        ParseEvent::StartCdata => handler.start_cdata(),
        ParseEvent::EndCdata => handler.end_cdata(),
        ParseEvent::Comment(text) => handler.comment(text),
        _ => Ok(()),
    }
}

/// Route a declaration event to a declaration handler
pub fn deliver_decl(handler: &mut dyn DeclHandler, event: &ParseEvent) -> Result<(), XmlError> {
    match event {
        ParseEvent::ElementDecl { name, model } => handler.element_decl(name, model),
        ParseEvent::AttributeDecl {
            element,
            attribute,
            attr_type,
            mode,
            value,
        } => handler.attribute_decl(element, attribute, attr_type, mode.as_deref(), value.as_deref()),
        ParseEvent::InternalEntityDecl { name, value } => handler.internal_entity_decl(name, value),
        ParseEvent::ExternalEntityDecl {
            name,
            public_id,
            system_id,
        } => handler.external_entity_decl(name, public_id.as_deref(), system_id),
        _ => Ok(()),
    }
}

/// A set of optional handlers acting as one event sink
#[derive(Default, Clone)]
pub struct HandlerSet {
    pub content: Option<Rc<RefCell<dyn ContentHandler>>>,
    pub dtd: Option<Rc<RefCell<dyn DtdHandler>>>,
    pub lexical: Option<Rc<RefCell<dyn LexicalHandler>>>,
    pub decl: Option<Rc<RefCell<dyn DeclHandler>>>,
}

impl EventSink for HandlerSet {
    fn event(&mut self, event: ParseEvent) -> Result<(), XmlError> {
        match event.handler_kind() {
            HandlerKind::Content => match &self.content {
                Some(handler) => deliver_content(&mut *handler.borrow_mut(), &event),
                None => Ok(()),
            },
            HandlerKind::Dtd => match &self.dtd {
                Some(handler) => deliver_dtd(&mut *handler.borrow_mut(), &event),
                None => Ok(()),
            },
            HandlerKind::Lexical => match &self.lexical {
                Some(handler) => deliver_lexical(&mut *handler.borrow_mut(), &event),
                None => Ok(()),
            },
            HandlerKind::Decl => match &self.decl {
                Some(handler) => deliver_decl(&mut *handler.borrow_mut(), &event),
                None => Ok(()),
            },
        }
    }

    fn set_locator(&mut self, locator: Locator) {
        if let Some(handler) = &self.content {
            handler.borrow_mut().set_document_locator(locator);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        log: Vec<String>,
    }

    impl ContentHandler for Recorder {
        fn start_element(&mut self, name: &QualifiedName, _attributes: &Attributes) -> Result<(), XmlError> {
            self.log.push(format!("start {}", name.qname));
            Ok(())
        }

        fn characters(&mut self, text: &str) -> Result<(), XmlError> {
            self.log.push(format!("text {}", text));
            Ok(())
        }
    }

    impl LexicalHandler for Recorder {
        fn comment(&mut self, text: &str) -> Result<(), XmlError> {
            self.log.push(format!("comment {}", text));
            Ok(())
        }
    }

    #[test]
    fn test_handler_set_routing() {
        let recorder = Rc::new(RefCell::new(Recorder::default()));
        let mut set = HandlerSet {
            content: Some(recorder.clone()),
            ..Default::default()
        };
        set.event(ParseEvent::StartElement {
            name: QualifiedName::plain("a"),
            attributes: Attributes::new(),
        })
        .unwrap();
        // No lexical handler installed yet
        set.event(ParseEvent::Comment("dropped".into())).unwrap();
        set.lexical = Some(recorder.clone());
        set.event(ParseEvent::Comment("kept".into())).unwrap();
        set.event(ParseEvent::Characters("hi".into())).unwrap();
        assert_eq!(recorder.borrow().log, vec!["start a", "comment kept", "text hi"]);
    }

    #[test]
    fn test_closure_sink() {
        let mut seen = Vec::new();
        let mut sink = |event: ParseEvent| -> Result<(), XmlError> {
            seen.push(event);
            Ok(())
        };
        sink.event(ParseEvent::StartDocument).unwrap();
        assert_eq!(seen, vec![ParseEvent::StartDocument]);
    }

    #[test]
    fn test_locator_updates() {
        let locator = Locator::new();
        let view = locator.clone();
        locator.update(3, 9, Some("doc.xml"), None);
        assert_eq!(view.line_number(), 3);
        assert_eq!(view.column_number(), 9);
        assert_eq!(view.system_id().as_deref(), Some("doc.xml"));
    }
}
