//! SAX parser
//!
//! XMLReader-style front end over the [`Engine`]: string-keyed feature and
//! property negotiation, handler registration and the parse entry points.
//! Unknown keys fail with [`SaxError::NotRecognized`]; known keys with a
//! value that cannot be honored fail with [`SaxError::NotSupported`].

use super::engine::Engine;
use super::events::ParseEvent;
use super::handlers::{
    ContentHandler, DeclHandler, DtdHandler, EntityResolver, ErrorHandler, EventSink, HandlerSet, LexicalHandler,
    Locator,
};
use super::input_source::InputSource;
use super::namespace_strategy::{NamespacePrefixesStrategy, NoNamespacePrefixesStrategy, NoNamespacesStrategy};
use crate::error::{SaxError, XmlError};
use encoding_rs::Encoding;
use std::cell::RefCell;
use std::rc::Rc;

/// Feature names
pub mod features {
    pub const VALIDATION: &str = "http://xml.org/sax/features/validation";
    pub const NAMESPACES: &str = "http://xml.org/sax/features/namespaces";
    pub const NAMESPACE_PREFIXES: &str = "http://xml.org/sax/features/namespace-prefixes";
    pub const EXTERNAL_GENERAL_ENTITIES: &str = "http://xml.org/sax/features/external-general-entities";
    pub const EXTERNAL_PARAMETER_ENTITIES: &str = "http://xml.org/sax/features/external-parameter-entities";
    pub const STRING_INTERNING: &str = "http://xml.org/sax/features/string-interning";
    pub const PARTIAL_READS: &str = "http://www.appinf.com/features/enable-partial-reads";
}

/// Property names
pub mod properties {
    pub const LEXICAL_HANDLER: &str = "http://xml.org/sax/properties/lexical-handler";
    pub const DECLARATION_HANDLER: &str = "http://xml.org/sax/properties/declaration-handler";
    pub const DOM_NODE: &str = "http://xml.org/sax/properties/dom-node";
}

/// Value of a property
#[derive(Clone)]
pub enum PropertyValue {
    Text(String),
    LexicalHandler(Rc<RefCell<dyn LexicalHandler>>),
    DeclHandler(Rc<RefCell<dyn DeclHandler>>),
}

pub struct SaxParser {
    engine: Engine,
    namespaces: bool,
    namespace_prefixes: bool,
    handlers: HandlerSet,
    error_handler: Option<Rc<RefCell<dyn ErrorHandler>>>,
}

impl Default for SaxParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SaxParser {
    /// Namespace processing on, namespace prefixes off
    pub fn new() -> Self {
        SaxParser {
            engine: Engine::new(),
            namespaces: true,
            namespace_prefixes: false,
            handlers: HandlerSet::default(),
            error_handler: None,
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    pub fn set_encoding(&mut self, name: impl Into<String>) {
        self.engine.set_encoding(name);
    }

    pub fn encoding(&self) -> Option<&str> {
        self.engine.encoding()
    }

    pub fn add_encoding(&mut self, name: &str, encoding: &'static Encoding) {
        self.engine.add_encoding(name, encoding);
    }

    pub fn set_feature(&mut self, name: &str, value: bool) -> Result<(), SaxError> {
        match name {
            features::VALIDATION | features::STRING_INTERNING => {
                // Validation is never performed and names are always interned
                let supported = if name == features::VALIDATION { !value } else { value };
                if !supported {
                    return Err(SaxError::NotSupported(name.to_string()));
                }
            }
            features::NAMESPACES => self.set_namespaces(value),
            features::NAMESPACE_PREFIXES => self.set_namespace_prefixes(value),
            features::EXTERNAL_GENERAL_ENTITIES => self.engine.set_external_general_entities(value),
            features::EXTERNAL_PARAMETER_ENTITIES => self.engine.set_external_parameter_entities(value),
            features::PARTIAL_READS => self.engine.set_enable_partial_reads(value),
            _ => return Err(SaxError::NotRecognized(name.to_string())),
        }
        Ok(())
    }

    pub fn get_feature(&self, name: &str) -> Result<bool, SaxError> {
        match name {
            features::VALIDATION => Ok(false),
            features::STRING_INTERNING => Ok(true),
            features::NAMESPACES => Ok(self.namespaces),
            features::NAMESPACE_PREFIXES => Ok(self.namespace_prefixes),
            features::EXTERNAL_GENERAL_ENTITIES => Ok(self.engine.external_general_entities()),
            features::EXTERNAL_PARAMETER_ENTITIES => Ok(self.engine.external_parameter_entities()),
            features::PARTIAL_READS => Ok(self.engine.enable_partial_reads()),
            _ => Err(SaxError::NotRecognized(name.to_string())),
        }
    }

    pub fn set_namespaces(&mut self, value: bool) {
        self.namespaces = value;
        self.update_strategy();
    }

    /// Report `xmlns` attributes and qualified names alongside namespace URIs
    pub fn set_namespace_prefixes(&mut self, value: bool) {
        self.namespace_prefixes = value;
        self.update_strategy();
    }

    fn update_strategy(&mut self) {
        match (self.namespaces, self.namespace_prefixes) {
            (false, _) => self.engine.set_namespace_strategy(Box::new(NoNamespacesStrategy)),
            (true, false) => self.engine.set_namespace_strategy(Box::new(NoNamespacePrefixesStrategy)),
            (true, true) => self.engine.set_namespace_strategy(Box::new(NamespacePrefixesStrategy)),
        }
    }

    pub fn set_property(&mut self, name: &str, value: PropertyValue) -> Result<(), SaxError> {
        match (name, value) {
            (properties::LEXICAL_HANDLER, PropertyValue::LexicalHandler(handler)) => {
                self.handlers.lexical = Some(handler);
                Ok(())
            }
            (properties::DECLARATION_HANDLER, PropertyValue::DeclHandler(handler)) => {
                self.handlers.decl = Some(handler);
                Ok(())
            }
            (properties::LEXICAL_HANDLER | properties::DECLARATION_HANDLER | properties::DOM_NODE, _) => {
                Err(SaxError::NotSupported(name.to_string()))
            }
            _ => Err(SaxError::NotRecognized(name.to_string())),
        }
    }

    pub fn get_property(&self, name: &str) -> Result<Option<PropertyValue>, SaxError> {
        match name {
            properties::LEXICAL_HANDLER => Ok(self.handlers.lexical.clone().map(PropertyValue::LexicalHandler)),
            properties::DECLARATION_HANDLER => Ok(self.handlers.decl.clone().map(PropertyValue::DeclHandler)),
            properties::DOM_NODE => Err(SaxError::NotSupported(name.to_string())),
            _ => Err(SaxError::NotRecognized(name.to_string())),
        }
    }

    pub fn set_content_handler(&mut self, handler: Option<Rc<RefCell<dyn ContentHandler>>>) {
        self.handlers.content = handler;
    }

    pub fn content_handler(&self) -> Option<Rc<RefCell<dyn ContentHandler>>> {
        self.handlers.content.clone()
    }

    pub fn set_dtd_handler(&mut self, handler: Option<Rc<RefCell<dyn DtdHandler>>>) {
        self.handlers.dtd = handler;
    }

    pub fn dtd_handler(&self) -> Option<Rc<RefCell<dyn DtdHandler>>> {
        self.handlers.dtd.clone()
    }

    pub fn set_lexical_handler(&mut self, handler: Option<Rc<RefCell<dyn LexicalHandler>>>) {
        self.handlers.lexical = handler;
    }

    pub fn set_decl_handler(&mut self, handler: Option<Rc<RefCell<dyn DeclHandler>>>) {
        self.handlers.decl = handler;
    }

    pub fn set_error_handler(&mut self, handler: Option<Rc<RefCell<dyn ErrorHandler>>>) {
        self.error_handler = handler;
    }

    pub fn error_handler(&self) -> Option<Rc<RefCell<dyn ErrorHandler>>> {
        self.error_handler.clone()
    }

    pub fn set_entity_resolver(&mut self, resolver: Option<Rc<RefCell<dyn EntityResolver>>>) {
        self.engine.set_entity_resolver(resolver);
    }

    pub fn entity_resolver(&self) -> Option<Rc<RefCell<dyn EntityResolver>>> {
        self.engine.entity_resolver()
    }

    pub fn locator(&self) -> Locator {
        self.engine.locator()
    }

    /// Parse, delivering events to the registered handlers
    pub fn parse(&mut self, input: InputSource<'_>) -> Result<(), XmlError> {
        let mut handlers = self.handlers.clone();
        self.parse_events(input, &mut handlers)
    }

    pub fn parse_str(&mut self, xml: &str) -> Result<(), XmlError> {
        self.parse(InputSource::from_text(xml))
    }

    pub fn parse_memory(&mut self, bytes: &[u8]) -> Result<(), XmlError> {
        self.parse(InputSource::from_memory(bytes))
    }

    /// Parse with this parser's configuration, delivering events to `sink`
    /// instead of the registered handlers.
    ///
    /// A failure is reported to the error handler before it is returned.
    pub fn parse_events(&mut self, input: InputSource<'_>, sink: &mut dyn EventSink) -> Result<(), XmlError> {
        let result = self.engine.parse(input, sink);
        if let (Err(error), Some(handler)) = (&result, &self.error_handler) {
            handler.borrow_mut().fatal_error(error);
        }
        result
    }

    /// Collect all events of a parse
    pub fn events_of(&mut self, input: InputSource<'_>) -> Result<Vec<ParseEvent>, XmlError> {
        let mut collector = super::collector::EventCollector::new();
        self.parse_events(input, &mut collector)?;
        Ok(collector.into_events())
    }
}
