//! DOM parser
//!
//! Runs a [`SaxParser`] into a [`DomBuilder`]. Namespace prefixes are
//! reported by default so that `xmlns` attributes survive in the tree and
//! a written document declares the same namespaces as its source.

use std::cell::RefCell;
use std::rc::Rc;

use encoding_rs::Encoding;

use super::builder::DomBuilder;
use super::document::Document;
use super::name_pool::NamePool;
use crate::error::{SaxError, XmlError};
use crate::sax::filter::WhitespaceFilter;
use crate::sax::handlers::{EntityResolver, ErrorHandler};
use crate::sax::input_source::InputSource;
use crate::sax::parser::SaxParser;

/// Drop whitespace-only text between elements while building
pub const FEATURE_FILTER_WHITESPACE: &str = "http://www.appinf.com/features/no-whitespace-in-element-content";

pub struct DomParser {
    sax: SaxParser,
    filter_whitespace: bool,
    names: Option<Rc<RefCell<NamePool>>>,
}

impl Default for DomParser {
    fn default() -> Self {
        Self::new()
    }
}

impl DomParser {
    pub fn new() -> Self {
        let mut sax = SaxParser::new();
        sax.set_namespace_prefixes(true);
        DomParser {
            sax,
            filter_whitespace: false,
            names: None,
        }
    }

    /// Parse every document into the given name pool
    pub fn with_name_pool(names: Rc<RefCell<NamePool>>) -> Self {
        DomParser {
            names: Some(names),
            ..Self::new()
        }
    }

    pub fn set_feature(&mut self, name: &str, value: bool) -> Result<(), SaxError> {
        if name == FEATURE_FILTER_WHITESPACE {
            self.filter_whitespace = value;
            return Ok(());
        }
        self.sax.set_feature(name, value)
    }

    pub fn get_feature(&self, name: &str) -> Result<bool, SaxError> {
        if name == FEATURE_FILTER_WHITESPACE {
            return Ok(self.filter_whitespace);
        }
        self.sax.get_feature(name)
    }

    pub fn set_encoding(&mut self, name: impl Into<String>) {
        self.sax.set_encoding(name);
    }

    pub fn encoding(&self) -> Option<&str> {
        self.sax.encoding()
    }

    pub fn add_encoding(&mut self, name: &str, encoding: &'static Encoding) {
        self.sax.add_encoding(name, encoding);
    }

    pub fn set_entity_resolver(&mut self, resolver: Option<Rc<RefCell<dyn EntityResolver>>>) {
        self.sax.set_entity_resolver(resolver);
    }

    pub fn entity_resolver(&self) -> Option<Rc<RefCell<dyn EntityResolver>>> {
        self.sax.entity_resolver()
    }

    pub fn set_error_handler(&mut self, handler: Option<Rc<RefCell<dyn ErrorHandler>>>) {
        self.sax.set_error_handler(handler);
    }

    /// The underlying event parser
    pub fn sax_parser(&mut self) -> &mut SaxParser {
        &mut self.sax
    }

    pub fn parse(&mut self, input: InputSource<'_>) -> Result<Document, XmlError> {
        let mut builder = match &self.names {
            Some(names) => DomBuilder::with_name_pool(names.clone()),
            None => DomBuilder::new(),
        };
        if self.filter_whitespace {
            let mut filter = WhitespaceFilter::new(&mut builder);
            self.sax.parse_events(input, &mut filter)?;
        } else {
            self.sax.parse_events(input, &mut builder)?;
        }
        Ok(builder.into_document())
    }

    pub fn parse_str(&mut self, xml: &str) -> Result<Document, XmlError> {
        self.parse(InputSource::from_text(xml))
    }

    pub fn parse_memory(&mut self, bytes: &[u8]) -> Result<Document, XmlError> {
        self.parse(InputSource::from_memory(bytes))
    }
}
