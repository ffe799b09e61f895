//! Parsing engine
//!
//! Drives the incremental tokenizer over an [`InputSource`] and turns its
//! tokens into [`ParseEvent`]s for an [`EventSink`]. The engine owns the
//! parts of XML processing that sit above tokenization:
//! - Input decoding with a configurable fallback encoding and custom tables
//! - Namespace processing through a pluggable [`NamespaceStrategy`]
//! - DTD declarations: entity tables, attribute defaults, external subset
//! - Entity expansion policy (internal, external general, external parameter)
//! - A context stack with one tokenizer per entity being read, so the
//!   [`Locator`] always reports the innermost external entity

use super::events::{Attribute, ParseEvent, QualifiedName};
use super::handlers::{EntityResolver, EventSink, Locator};
use super::input_source::InputSource;
use super::namespace_strategy::{NamespaceStrategy, NoNamespacePrefixesStrategy};
use crate::core::dtd::{parse_subset, AttType, DocTypeDecl, DtdDeclarations, DtdItem, EntityValue};
use crate::core::encoding::EncodingRegistry;
use crate::core::entities::decode_attribute_value;
use crate::core::input::{SourceError, TextSource};
use crate::core::namespace::NamespaceResolver;
use crate::core::tokenizer::{Token, TokenKind, Tokenizer, TokenizerMode};
use crate::error::{Location, SyntaxError, XmlError};
use encoding_rs::Encoding;
use std::cell::RefCell;
use std::rc::Rc;

/// Name reported in `StartEntity`/`EndEntity` for the external DTD subset
pub const DTD_ENTITY_NAME: &str = "[dtd]";

/// The tokenizer adapter
pub struct Engine {
    encoding: Option<String>,
    registry: EncodingRegistry,
    expand_internal: bool,
    external_general: bool,
    external_parameter: bool,
    partial_reads: bool,
    strategy: Box<dyn NamespaceStrategy>,
    resolver: Option<Rc<RefCell<dyn EntityResolver>>>,
    locator: Locator,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Engine {
            encoding: None,
            registry: EncodingRegistry::new(),
            expand_internal: true,
            external_general: false,
            external_parameter: false,
            partial_reads: false,
            strategy: Box::new(NoNamespacePrefixesStrategy),
            resolver: None,
            locator: Locator::new(),
        }
    }

    /// Encoding assumed for byte input that neither has a BOM nor declares
    /// an encoding
    pub fn set_encoding(&mut self, name: impl Into<String>) {
        self.encoding = Some(name.into());
    }

    pub fn encoding(&self) -> Option<&str> {
        self.encoding.as_deref()
    }

    /// Register an encoding under a custom name
    pub fn add_encoding(&mut self, name: &str, encoding: &'static Encoding) {
        self.registry.add_encoding(name, encoding);
    }

    pub fn set_namespace_strategy(&mut self, strategy: Box<dyn NamespaceStrategy>) {
        self.strategy = strategy;
    }

    pub fn namespace_strategy(&self) -> &dyn NamespaceStrategy {
        self.strategy.as_ref()
    }

    pub fn set_expand_internal_entities(&mut self, flag: bool) {
        self.expand_internal = flag;
    }

    pub fn expand_internal_entities(&self) -> bool {
        self.expand_internal
    }

    pub fn set_external_general_entities(&mut self, flag: bool) {
        self.external_general = flag;
    }

    pub fn external_general_entities(&self) -> bool {
        self.external_general
    }

    /// Also governs loading of the external DTD subset
    pub fn set_external_parameter_entities(&mut self, flag: bool) {
        self.external_parameter = flag;
    }

    pub fn external_parameter_entities(&self) -> bool {
        self.external_parameter
    }

    pub fn set_entity_resolver(&mut self, resolver: Option<Rc<RefCell<dyn EntityResolver>>>) {
        self.resolver = resolver;
    }

    pub fn entity_resolver(&self) -> Option<Rc<RefCell<dyn EntityResolver>>> {
        self.resolver.clone()
    }

    /// Deliver events as soon as any input arrives instead of waiting for a
    /// full buffer
    pub fn set_enable_partial_reads(&mut self, flag: bool) {
        self.partial_reads = flag;
    }

    pub fn enable_partial_reads(&self) -> bool {
        self.partial_reads
    }

    pub fn locator(&self) -> Locator {
        self.locator.clone()
    }

    pub fn line_number(&self) -> usize {
        self.locator.line_number()
    }

    pub fn column_number(&self) -> usize {
        self.locator.column_number()
    }

    pub fn system_id(&self) -> Option<String> {
        self.locator.system_id()
    }

    pub fn public_id(&self) -> Option<String> {
        self.locator.public_id()
    }

    /// Parse a complete document, delivering events to `sink`.
    ///
    /// Events already delivered stay delivered when the parse fails.
    pub fn parse(&mut self, input: InputSource<'_>, sink: &mut dyn EventSink) -> Result<(), XmlError> {
        let system_id = input.system_id().map(str::to_string);
        let public_id = input.public_id().map(str::to_string);
        self.locator.update(1, 1, system_id.as_deref(), public_id.as_deref());
        tracing::debug!(
            system_id = system_id.as_deref().unwrap_or("<input>"),
            partial_reads = self.partial_reads,
            "parse started"
        );

        let fallback = match &self.encoding {
            Some(name) => Some(self.registry.lookup(name).ok_or_else(|| XmlError::Encoding {
                message: format!("unknown encoding '{}'", name),
                location: self.locator.location(),
            })?),
            None => None,
        };
        let (source, system_id, public_id) = input
            .open(&self.registry, fallback, self.partial_reads)
            .map_err(|message| XmlError::Encoding {
                message,
                location: self.locator.location(),
            })?;

        let mut run = Run {
            engine: self,
            sink,
            contexts: vec![EntityContext {
                tokenizer: Tokenizer::new(TokenizerMode::Document),
                source: Some(source),
                entity: None,
                system_id,
                public_id,
                internal: false,
            }],
            dtd: DtdDeclarations::new(),
            namespaces: NamespaceResolver::new(),
            elements: Vec::new(),
            open_parameter_entities: Vec::new(),
        };
        let result = run.run();
        match &result {
            Ok(()) => tracing::debug!("parse finished"),
            Err(e) => tracing::debug!(error = %e, "parse failed"),
        }
        result
    }
}

/// One entity being read
struct EntityContext<'i> {
    tokenizer: Tokenizer,
    /// `None` for replacement text fed up front
    source: Option<TextSource<'i>>,
    /// Name reported in `StartEntity`/`EndEntity`; `None` for the document
    entity: Option<String>,
    system_id: Option<String>,
    public_id: Option<String>,
    /// Internal entity: positions are reported at the reference
    internal: bool,
}

/// State of a single parse
struct Run<'e, 's, 'i> {
    engine: &'e Engine,
    sink: &'s mut dyn EventSink,
    contexts: Vec<EntityContext<'i>>,
    dtd: DtdDeclarations,
    namespaces: NamespaceResolver,
    elements: Vec<QualifiedName>,
    open_parameter_entities: Vec<String>,
}

impl<'e, 's, 'i> Run<'e, 's, 'i> {
    fn run(&mut self) -> Result<(), XmlError> {
        self.sink.set_locator(self.engine.locator.clone());
        self.emit(ParseEvent::StartDocument)?;
        while let Some(token) = self.next_token()? {
            self.handle(token)?;
        }
        self.emit(ParseEvent::EndDocument)
    }

    #[inline]
    fn emit(&mut self, event: ParseEvent) -> Result<(), XmlError> {
        self.sink.event(event)
    }

    fn location(&self) -> Location {
        self.engine.locator.location()
    }

    fn syntax(&self, message: impl Into<String>) -> XmlError {
        XmlError::Syntax {
            message: message.into(),
            location: self.location(),
        }
    }

    fn entity_error(&self, message: impl Into<String>) -> XmlError {
        XmlError::Entity {
            message: message.into(),
            location: self.location(),
        }
    }

    fn tokenizer_error(&self, error: SyntaxError) -> XmlError {
        match self.contexts.last() {
            Some(ctx) if ctx.internal => {
                let name = ctx.entity.as_deref().unwrap_or("");
                self.syntax(format!("{} in entity '{}'", error.message, name))
            }
            Some(ctx) => XmlError::Syntax {
                message: error.message,
                location: Location {
                    system_id: ctx.system_id.clone(),
                    public_id: ctx.public_id.clone(),
                    line: error.line,
                    column: error.column,
                },
            },
            None => self.syntax(error.message),
        }
    }

    fn source_error(&self, error: SourceError) -> XmlError {
        match error {
            SourceError::Io(e) => XmlError::Io(e),
            SourceError::Encoding(message) => XmlError::Encoding {
                message,
                location: self.location(),
            },
        }
    }

    /// Next token of the innermost context, feeding input and leaving
    /// exhausted entities as needed
    fn next_token(&mut self) -> Result<Option<Token>, XmlError> {
        loop {
            let Some(ctx) = self.contexts.last_mut() else {
                return Ok(None);
            };
            let result = ctx.tokenizer.next_token();
            match result {
                Err(e) => return Err(self.tokenizer_error(e)),
                Ok(Some(token)) => {
                    if !ctx.internal {
                        self.engine.locator.update(
                            token.line,
                            token.column,
                            ctx.system_id.as_deref(),
                            ctx.public_id.as_deref(),
                        );
                    }
                    return Ok(Some(token));
                }
                Ok(None) if ctx.tokenizer.is_finished() => {
                    let finished = self.contexts.pop();
                    if let Some(name) = finished.and_then(|ctx| ctx.entity) {
                        tracing::debug!(entity = %name, "leaving entity");
                        self.emit(ParseEvent::EndEntity(name))?;
                    }
                }
                Ok(None) => {
                    let fed = match &mut ctx.source {
                        Some(source) => source.next_text(),
                        None => Ok(None),
                    };
                    match fed {
                        Ok(Some(text)) => ctx.tokenizer.feed(&text),
                        Ok(None) => ctx.tokenizer.finish(),
                        Err(e) => return Err(self.source_error(e)),
                    }
                }
            }
        }
    }

    fn handle(&mut self, token: Token) -> Result<(), XmlError> {
        match token.kind {
            // Encoding was settled by the decoder
            TokenKind::XmlDecl => Ok(()),
            TokenKind::DocType => match token.doctype {
                Some(decl) => self.doctype(*decl),
                None => Ok(()),
            },
            TokenKind::StartTag | TokenKind::EmptyTag => self.start_element(token),
            TokenKind::EndTag => self.end_element(),
            TokenKind::Text => {
                if token.content.is_empty() {
                    return Ok(());
                }
                self.emit(ParseEvent::Characters(token.content))
            }
            TokenKind::EntityRef => self.entity_reference(token.name),
            TokenKind::CData => {
                self.emit(ParseEvent::StartCdata)?;
                if !token.content.is_empty() {
                    self.emit(ParseEvent::Characters(token.content))?;
                }
                self.emit(ParseEvent::EndCdata)
            }
            TokenKind::Comment => self.emit(ParseEvent::Comment(token.content)),
            TokenKind::Pi => self.emit(ParseEvent::ProcessingInstruction {
                target: token.name,
                data: token.content,
            }),
        }
    }

    fn decode_value(&self, raw: &str, att_type: Option<&AttType>) -> Result<String, XmlError> {
        let value = decode_attribute_value(raw, Some(&self.dtd.entities)).map_err(|message| {
            if message.contains("entity") {
                self.entity_error(message)
            } else {
                self.syntax(message)
            }
        })?;
        Ok(match att_type {
            Some(t) if *t != AttType::CData => value.split(' ').filter(|s| !s.is_empty()).collect::<Vec<_>>().join(" "),
            _ => value.into_owned(),
        })
    }

    fn start_element(&mut self, token: Token) -> Result<(), XmlError> {
        let empty = token.kind == TokenKind::EmptyTag;
        let defs = self.dtd.attributes_of(&token.name);

        let mut attributes = Vec::with_capacity(token.attributes.len());
        for raw in &token.attributes {
            let def = defs.iter().find(|d| d.name == raw.name);
            let mut attribute = Attribute::new(
                QualifiedName::plain(&*raw.name),
                self.decode_value(&raw.value, def.map(|d| &d.att_type))?,
            );
            if let Some(def) = def {
                attribute.attr_type = def.att_type.sax_name().to_string();
            }
            attributes.push(attribute);
        }
        for def in defs {
            let Some(default) = def.default.value() else { continue };
            if token.attributes.iter().any(|a| a.name == def.name) {
                continue;
            }
            let mut attribute = Attribute::new(
                QualifiedName::plain(&*def.name),
                self.decode_value(default, Some(&def.att_type))?,
            );
            attribute.attr_type = def.att_type.sax_name().to_string();
            attribute.specified = false;
            attributes.push(attribute);
        }

        let strategy = self.engine.strategy.as_ref();
        let mut mappings = Vec::new();
        if strategy.namespaces() {
            self.namespaces.push_scope();
            for attribute in &attributes {
                let prefix = match attribute.qname.strip_prefix("xmlns") {
                    Some("") => "",
                    Some(rest) => match rest.strip_prefix(':') {
                        Some(prefix) => prefix,
                        None => continue,
                    },
                    None => continue,
                };
                self.namespaces
                    .declare(prefix, &attribute.value)
                    .map_err(|m| self.syntax(m))?;
                if prefix != "xml" {
                    mappings.push((prefix.to_string(), attribute.value.clone()));
                }
            }
        }
        let name = strategy
            .element_name(&token.name, &self.namespaces)
            .map_err(|m| self.syntax(m))?;
        let attributes = strategy
            .attributes(attributes, &self.namespaces)
            .map_err(|m| self.syntax(m))?;

        for (prefix, uri) in mappings {
            self.emit(ParseEvent::StartPrefixMapping { prefix, uri })?;
        }
        self.emit(ParseEvent::StartElement {
            name: name.clone(),
            attributes,
        })?;
        if empty {
            self.close_element(name)
        } else {
            self.elements.push(name);
            Ok(())
        }
    }

    fn end_element(&mut self) -> Result<(), XmlError> {
        match self.elements.pop() {
            Some(name) => self.close_element(name),
            None => Err(self.syntax("unexpected end tag")),
        }
    }

    fn close_element(&mut self, name: QualifiedName) -> Result<(), XmlError> {
        self.emit(ParseEvent::EndElement { name })?;
        if self.engine.strategy.namespaces() {
            for prefix in self.namespaces.pop_scope() {
                self.emit(ParseEvent::EndPrefixMapping { prefix })?;
            }
        }
        Ok(())
    }

    fn skip_entity(&mut self, name: String, reason: &str) -> Result<(), XmlError> {
        tracing::warn!(entity = %name, reason, "skipping entity reference");
        self.emit(ParseEvent::SkippedEntity(name))
    }

    fn entity_reference(&mut self, name: String) -> Result<(), XmlError> {
        let Some(decl) = self.dtd.entities.general(&name).cloned() else {
            if self.dtd.incomplete {
                return self.skip_entity(name, "undeclared in a partially read DTD");
            }
            return Err(self.entity_error(format!("undefined entity '{}'", name)));
        };
        if self.contexts.iter().any(|ctx| ctx.entity.as_deref() == Some(name.as_str())) {
            return Err(self.entity_error(format!("recursive entity reference '{}'", name)));
        }

        match decl.value {
            EntityValue::Internal(text) => {
                if !self.engine.expand_internal {
                    return self.emit(ParseEvent::SkippedEntity(name));
                }
                let system_id = self.contexts.last().and_then(|c| c.system_id.clone());
                let public_id = self.contexts.last().and_then(|c| c.public_id.clone());
                self.emit(ParseEvent::StartEntity(name.clone()))?;
                self.contexts.push(EntityContext {
                    tokenizer: Tokenizer::from_text(TokenizerMode::Content, &text),
                    source: None,
                    entity: Some(name),
                    system_id,
                    public_id,
                    internal: true,
                });
                Ok(())
            }
            EntityValue::External { notation: Some(_), .. } => {
                Err(self.entity_error(format!("reference to unparsed entity '{}'", name)))
            }
            EntityValue::External {
                public_id,
                system_id,
                notation: None,
            } => {
                if !self.engine.external_general {
                    return self.skip_entity(name, "external general entities disabled");
                }
                if self.engine.resolver.is_none() {
                    return self.skip_entity(name, "no entity resolver");
                }
                let input = self.resolve(public_id.as_deref(), &system_id)?;
                let system_id = input.system_id().map(str::to_string).unwrap_or(system_id);
                let public_id = input.public_id().map(str::to_string).or(public_id);
                let (source, _, _) = input
                    .open(&self.engine.registry, None, self.engine.partial_reads)
                    .map_err(|m| self.entity_error(m))?;
                tracing::debug!(entity = %name, system_id = %system_id, "entering external entity");
                self.emit(ParseEvent::StartEntity(name.clone()))?;
                self.contexts.push(EntityContext {
                    tokenizer: Tokenizer::new(TokenizerMode::Content),
                    source: Some(source),
                    entity: Some(name),
                    system_id: Some(system_id),
                    public_id,
                    internal: false,
                });
                Ok(())
            }
        }
    }

    /// Ask the resolver for an external entity; a missing source is an error
    fn resolve(&self, public_id: Option<&str>, system_id: &str) -> Result<InputSource<'static>, XmlError> {
        tracing::debug!(system_id, public_id = public_id.unwrap_or(""), "resolving external entity");
        let resolved = match &self.engine.resolver {
            Some(resolver) => resolver.borrow_mut().resolve_entity(public_id, system_id)?,
            None => None,
        };
        resolved.ok_or_else(|| self.entity_error(format!("cannot resolve external entity '{}'", system_id)))
    }

    /// Read a whole external subset or parameter entity
    fn read_external(&self, input: InputSource<'static>) -> Result<String, XmlError> {
        let (mut source, _, _) = input
            .open(&self.engine.registry, None, false)
            .map_err(|m| self.entity_error(m))?;
        source.read_to_string().map_err(|e| self.source_error(e))
    }

    fn doctype(&mut self, decl: DocTypeDecl) -> Result<(), XmlError> {
        self.emit(ParseEvent::StartDtd {
            name: decl.name.clone(),
            public_id: decl.public_id.clone(),
            system_id: decl.system_id.clone(),
        })?;
        self.declarations(&decl.items)?;

        if let Some(system_id) = &decl.system_id {
            if self.engine.external_parameter && self.engine.resolver.is_some() {
                let input = self.resolve(decl.public_id.as_deref(), system_id)?;
                let text = self.read_external(input)?;
                let items = parse_subset(&text).map_err(|m| self.syntax(format!("{} in external subset", m)))?;
                self.emit(ParseEvent::StartEntity(DTD_ENTITY_NAME.to_string()))?;
                self.declarations(&items)?;
                self.emit(ParseEvent::EndEntity(DTD_ENTITY_NAME.to_string()))?;
            } else {
                tracing::debug!(system_id = %system_id, "external subset not read");
                self.dtd.incomplete = true;
            }
        }
        self.emit(ParseEvent::EndDtd)
    }

    fn declarations(&mut self, items: &[DtdItem]) -> Result<(), XmlError> {
        for item in items {
            match item {
                DtdItem::PeReference(name) => self.parameter_entity(name)?,
                DtdItem::Comment(text) => self.emit(ParseEvent::Comment(text.clone()))?,
                DtdItem::Pi { target, data } => self.emit(ParseEvent::ProcessingInstruction {
                    target: target.clone(),
                    data: data.clone(),
                })?,
                DtdItem::Element { name, model } => self.emit(ParseEvent::ElementDecl {
                    name: name.clone(),
                    model: model.clone(),
                })?,
                _ => {
                    if self.dtd.add(item) {
                        self.report_declaration(item)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn report_declaration(&mut self, item: &DtdItem) -> Result<(), XmlError> {
        match item {
            DtdItem::Entity { parameter, decl } => {
                let name = if *parameter {
                    format!("%{}", decl.name)
                } else {
                    decl.name.clone()
                };
                match &decl.value {
                    EntityValue::Internal(value) => self.emit(ParseEvent::InternalEntityDecl {
                        name,
                        value: value.clone(),
                    }),
                    EntityValue::External {
                        public_id,
                        system_id,
                        notation: Some(notation),
                    } => self.emit(ParseEvent::UnparsedEntityDecl {
                        name,
                        public_id: public_id.clone(),
                        system_id: system_id.clone(),
                        notation: notation.clone(),
                    }),
                    EntityValue::External {
                        public_id, system_id, ..
                    } => self.emit(ParseEvent::ExternalEntityDecl {
                        name,
                        public_id: public_id.clone(),
                        system_id: system_id.clone(),
                    }),
                }
            }
            DtdItem::Notation(decl) => self.emit(ParseEvent::NotationDecl {
                name: decl.name.clone(),
                public_id: decl.public_id.clone(),
                system_id: decl.system_id.clone(),
            }),
            DtdItem::AttList { element, defs } => {
                for def in defs {
                    self.emit(ParseEvent::AttributeDecl {
                        element: element.clone(),
                        attribute: def.name.clone(),
                        attr_type: def.att_type.as_declared(),
                        mode: def.default.mode().map(str::to_string),
                        value: def.default.value().map(str::to_string),
                    })?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn parameter_entity(&mut self, name: &str) -> Result<(), XmlError> {
        let Some(decl) = self.dtd.entities.parameter(name).cloned() else {
            tracing::warn!(entity = %name, "undeclared parameter entity");
            self.dtd.incomplete = true;
            return Ok(());
        };
        if self.open_parameter_entities.iter().any(|n| n == name) {
            return Err(self.entity_error(format!("recursive parameter entity reference '%{}'", name)));
        }
        let text = match decl.value {
            EntityValue::Internal(text) => text,
            EntityValue::External { public_id, system_id, .. } => {
                if !self.engine.external_parameter || self.engine.resolver.is_none() {
                    tracing::debug!(entity = %name, "external parameter entity not read");
                    self.dtd.incomplete = true;
                    return Ok(());
                }
                let input = self.resolve(public_id.as_deref(), &system_id)?;
                self.read_external(input)?
            }
        };
        let items = parse_subset(&text).map_err(|m| self.syntax(format!("{} in parameter entity '%{}'", m, name)))?;
        let reported = format!("%{}", name);
        self.emit(ParseEvent::StartEntity(reported.clone()))?;
        self.open_parameter_entities.push(name.to_string());
        let result = self.declarations(&items);
        self.open_parameter_entities.pop();
        result?;
        self.emit(ParseEvent::EndEntity(reported))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sax::collector::EventCollector;
    use crate::sax::namespace_strategy::{NamespacePrefixesStrategy, NoNamespacesStrategy};
    use std::io::Cursor;

    fn parse_with(engine: &mut Engine, xml: &str) -> Result<Vec<ParseEvent>, XmlError> {
        let mut collector = EventCollector::new();
        engine.parse(InputSource::from_text(xml), &mut collector)?;
        Ok(collector.into_events())
    }

    fn parse(xml: &str) -> Result<Vec<ParseEvent>, XmlError> {
        parse_with(&mut Engine::new(), xml)
    }

    fn text_of(events: &[ParseEvent]) -> String {
        events
            .iter()
            .filter_map(|e| match e {
                ParseEvent::Characters(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    struct MapResolver(Vec<(&'static str, &'static str)>);

    impl EntityResolver for MapResolver {
        fn resolve_entity(
            &mut self,
            _public_id: Option<&str>,
            system_id: &str,
        ) -> Result<Option<InputSource<'static>>, XmlError> {
            Ok(self
                .0
                .iter()
                .find(|(id, _)| *id == system_id)
                .map(|(id, text)| InputSource::from_text(*text).with_system_id(*id)))
        }
    }

    #[test]
    fn test_basic_event_sequence() {
        let events = parse("<a><b x=\"1\">hi</b><!--c--><?p d?></a>").unwrap();
        assert_eq!(events.first(), Some(&ParseEvent::StartDocument));
        assert_eq!(events.last(), Some(&ParseEvent::EndDocument));
        match &events[2] {
            ParseEvent::StartElement { name, attributes } => {
                assert_eq!(name.local_name, "b");
                assert_eq!(attributes.value("x"), Some("1"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(events.contains(&ParseEvent::Comment("c".into())));
        assert!(events.contains(&ParseEvent::ProcessingInstruction {
            target: "p".into(),
            data: "d".into()
        }));
    }

    #[test]
    fn test_prefix_mappings() {
        let events = parse("<a xmlns:p=\"urn:p\"><p:b/></a>").unwrap();
        let expected_start = ParseEvent::StartPrefixMapping {
            prefix: "p".into(),
            uri: "urn:p".into(),
        };
        assert_eq!(events[1], expected_start);
        match &events[3] {
            ParseEvent::StartElement { name, attributes } => {
                assert_eq!(name, &QualifiedName::new("urn:p", "b", "p:b"));
                assert!(attributes.is_empty());
            }
            other => panic!("unexpected {:?}", other),
        }
        let n = events.len();
        assert!(events[n - 3].is_end_element());
        assert_eq!(events[n - 2], ParseEvent::EndPrefixMapping { prefix: "p".into() });
    }

    #[test]
    fn test_strategies() {
        let mut engine = Engine::new();
        engine.set_namespace_strategy(Box::new(NoNamespacesStrategy));
        let events = parse_with(&mut engine, "<p:a xmlns:p='urn:p'/>").unwrap();
        match &events[1] {
            ParseEvent::StartElement { name, attributes } => {
                assert_eq!(name, &QualifiedName::plain("p:a"));
                assert_eq!(attributes.value("xmlns:p"), Some("urn:p"));
            }
            other => panic!("unexpected {:?}", other),
        }

        engine.set_namespace_strategy(Box::new(NamespacePrefixesStrategy));
        let events = parse_with(&mut engine, "<p:a xmlns:p='urn:p'/>").unwrap();
        assert!(matches!(&events[1], ParseEvent::StartPrefixMapping { .. }));
        match &events[2] {
            ParseEvent::StartElement { attributes, .. } => assert_eq!(attributes.len(), 1),
            other => panic!("unexpected {:?}", other),
        }

        engine.set_namespace_strategy(Box::new(NoNamespacePrefixesStrategy));
        assert!(parse_with(&mut engine, "<q:a/>").is_err());
    }

    #[test]
    fn test_internal_entity_expansion() {
        let xml = "<!DOCTYPE r [<!ENTITY who \"<b>world</b>\"><!ENTITY greet \"hello &who;\">]><r>&greet;!</r>";
        let events = parse(xml).unwrap();
        assert!(events.contains(&ParseEvent::StartEntity("greet".into())));
        assert!(events.contains(&ParseEvent::EndEntity("who".into())));
        assert_eq!(text_of(&events), "hello world!");
        assert!(events.iter().any(|e| matches!(e, ParseEvent::StartElement { name, .. } if name.local_name == "b")));

        let mut engine = Engine::new();
        engine.set_expand_internal_entities(false);
        let events = parse_with(&mut engine, xml).unwrap();
        assert!(events.contains(&ParseEvent::SkippedEntity("greet".into())));
    }

    #[test]
    fn test_entity_errors() {
        let err = parse("<!DOCTYPE r [<!ENTITY a \"&b;\"><!ENTITY b \"&a;\">]><r>&a;</r>").unwrap_err();
        assert!(matches!(err, XmlError::Entity { .. }));
        assert!(err.to_string().contains("recursive"));

        let err = parse("<r>&nope;</r>").unwrap_err();
        assert!(err.to_string().contains("undefined entity"));

        // Undeclared entities are skipped when the external subset was not read
        let events = parse("<!DOCTYPE r SYSTEM \"r.dtd\"><r>&nope;</r>").unwrap();
        assert!(events.contains(&ParseEvent::SkippedEntity("nope".into())));
    }

    #[test]
    fn test_external_entities() {
        let xml = "<!DOCTYPE r [<!ENTITY ext SYSTEM \"ext.xml\">]><r>&ext;</r>";
        let events = parse(xml).unwrap();
        assert!(events.contains(&ParseEvent::SkippedEntity("ext".into())));

        let mut engine = Engine::new();
        engine.set_external_general_entities(true);
        engine.set_entity_resolver(Some(Rc::new(RefCell::new(MapResolver(vec![(
            "ext.xml",
            "<?xml version='1.0' encoding='UTF-8'?><e>external</e>",
        )])))));
        let events = parse_with(&mut engine, xml).unwrap();
        assert_eq!(text_of(&events), "external");
        assert!(events.contains(&ParseEvent::EndEntity("ext".into())));

        engine.set_entity_resolver(Some(Rc::new(RefCell::new(MapResolver(Vec::new())))));
        let err = parse_with(&mut engine, xml).unwrap_err();
        assert!(matches!(err, XmlError::Entity { .. }));
    }

    #[test]
    fn test_external_subset_and_defaults() {
        let mut engine = Engine::new();
        engine.set_external_parameter_entities(true);
        engine.set_entity_resolver(Some(Rc::new(RefCell::new(MapResolver(vec![(
            "r.dtd",
            "<!ATTLIST r kind CDATA \"plain\" id ID #IMPLIED><!ENTITY e \"from dtd\">",
        )])))));
        let xml = "<!DOCTYPE r SYSTEM \"r.dtd\"><r id=\"  x1 \">&e;</r>";
        let events = parse_with(&mut engine, xml).unwrap();
        assert!(events.contains(&ParseEvent::StartEntity(DTD_ENTITY_NAME.into())));
        assert_eq!(text_of(&events), "from dtd");
        let start = events.iter().find(|e| e.is_start_element()).unwrap();
        match start {
            ParseEvent::StartElement { attributes, .. } => {
                assert_eq!(attributes.value("id"), Some("x1"));
                let kind = &attributes.get(attributes.index_of("kind").unwrap()).unwrap();
                assert_eq!(kind.value, "plain");
                assert!(!kind.specified);
                assert_eq!(attributes.get(0).unwrap().attr_type, "ID");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_declaration_events() {
        let xml = "<!DOCTYPE r [<!NOTATION gif SYSTEM \"viewer\"><!ENTITY pic SYSTEM \"p.gif\" NDATA gif>\
                   <!ELEMENT r ANY><!ATTLIST r a (x|y) #REQUIRED>]><r/>";
        let events = parse(xml).unwrap();
        assert!(events.contains(&ParseEvent::StartDtd {
            name: "r".into(),
            public_id: None,
            system_id: None
        }));
        assert!(events.iter().any(|e| matches!(e, ParseEvent::NotationDecl { name, .. } if name == "gif")));
        assert!(events.iter().any(|e| matches!(e, ParseEvent::UnparsedEntityDecl { notation, .. } if notation == "gif")));
        assert!(events.contains(&ParseEvent::ElementDecl {
            name: "r".into(),
            model: "ANY".into()
        }));
        assert!(events.contains(&ParseEvent::AttributeDecl {
            element: "r".into(),
            attribute: "a".into(),
            attr_type: "(x|y)".into(),
            mode: Some("#REQUIRED".into()),
            value: None,
        }));
        assert!(events.contains(&ParseEvent::EndDtd));
    }

    #[test]
    fn test_cdata_events() {
        let events = parse("<r><![CDATA[a<b]]></r>").unwrap();
        assert_eq!(
            &events[2..5],
            &[
                ParseEvent::StartCdata,
                ParseEvent::Characters("a<b".into()),
                ParseEvent::EndCdata
            ]
        );
    }

    #[test]
    fn test_syntax_error_location() {
        let mut engine = Engine::new();
        let mut collector = EventCollector::new();
        let input = InputSource::from_text("<a>\n  <b></c>\n</a>").with_system_id("doc.xml");
        let err = engine.parse(input, &mut collector).unwrap_err();
        let location = err.location().unwrap();
        assert_eq!(location.system_id.as_deref(), Some("doc.xml"));
        assert_eq!(location.line, 2);
        // Events before the failure stay delivered
        assert!(collector.events().iter().any(|e| e.is_start_element()));
    }

    #[test]
    fn test_byte_stream_and_encoding() {
        let mut engine = Engine::new();
        engine.set_encoding("ISO-8859-1");
        let mut collector = EventCollector::new();
        let bytes: Vec<u8> = b"<r>caf\xE9</r>".to_vec();
        engine.parse(InputSource::from_reader(Cursor::new(bytes)), &mut collector).unwrap();
        assert_eq!(text_of(collector.events()), "caf\u{e9}");

        engine.set_encoding("no-such-encoding");
        let err = parse_with(&mut engine, "<r/>").unwrap_err();
        assert!(matches!(err, XmlError::Encoding { .. }));
    }

    #[test]
    fn test_partial_reads_stream() {
        struct OneByte(Vec<u8>, usize);
        impl std::io::Read for OneByte {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                if self.1 >= self.0.len() || buf.is_empty() {
                    return Ok(0);
                }
                buf[0] = self.0[self.1];
                self.1 += 1;
                Ok(1)
            }
        }
        let mut engine = Engine::new();
        engine.set_enable_partial_reads(true);
        let mut collector = EventCollector::new();
        let input = InputSource::from_reader(OneByte(b"<r a='1'>x&amp;y</r>".to_vec(), 0));
        engine.parse(input, &mut collector).unwrap();
        assert_eq!(text_of(collector.events()), "x&y");
    }

    #[test]
    fn test_locator_tracks_position() {
        let mut engine = Engine::new();
        let locator = engine.locator();
        let mut lines = Vec::new();
        let mut sink = |event: ParseEvent| -> Result<(), XmlError> {
            if event.is_start_element() {
                lines.push((locator.line_number(), locator.column_number()));
            }
            Ok(())
        };
        engine.parse(InputSource::from_text("<a>\n <b/>\n</a>"), &mut sink).unwrap();
        assert_eq!(lines, vec![(1, 1), (2, 2)]);
    }
}
