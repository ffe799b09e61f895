//! DOM builder
//!
//! Event sink that assembles a [`Document`] from a parse. Adjacent
//! character data is coalesced into one text node (or one CDATA section
//! while inside CDATA), skipped entities become entity reference nodes,
//! and notation and unparsed entity declarations are attached to the
//! document type node before it joins the document.
//!
//! Nodes are linked through the document's container operations, so the
//! usual hierarchy and attribute checks apply. Mutation events are
//! suspended for the whole build.

use std::cell::RefCell;
use std::rc::Rc;

use super::document::Document;
use super::name_pool::NamePool;
use super::node::{NodeId, NodeKind};
use crate::error::XmlError;
use crate::sax::events::{Attributes, ParseEvent, QualifiedName};
use crate::sax::handlers::EventSink;

#[derive(Debug)]
pub struct DomBuilder {
    document: Document,
    parent: NodeId,
    /// Character data not yet turned into a node, with the kind it becomes
    text: Option<(NodeKind, String)>,
    /// Document type node, attached once the DTD has been read
    doctype: Option<NodeId>,
    in_cdata: bool,
    in_dtd: bool,
    finished: bool,
}

impl Default for DomBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DomBuilder {
    pub fn new() -> Self {
        Self::with_document(Document::new())
    }

    /// Build into a document sharing `names`
    pub fn with_name_pool(names: Rc<RefCell<NamePool>>) -> Self {
        Self::with_document(Document::with_name_pool(names))
    }

    fn with_document(mut document: Document) -> Self {
        document.suspend_events();
        let parent = document.root();
        DomBuilder {
            document,
            parent,
            text: None,
            doctype: None,
            in_cdata: false,
            in_dtd: false,
            finished: false,
        }
    }

    /// The document built so far; events are re-enabled
    pub fn into_document(mut self) -> Document {
        if let Err(e) = self.flush_text() {
            tracing::warn!(error = %e, "pending character data dropped");
        }
        if !self.finished {
            self.document.resume_events();
        }
        self.document
    }

    /// Turn buffered character data into a text or CDATA node
    fn flush_text(&mut self) -> Result<(), XmlError> {
        let Some((kind, data)) = self.text.take() else {
            return Ok(());
        };
        let node = if kind == NodeKind::CData {
            self.document.create_cdata_section(&data)
        } else {
            self.document.create_text_node(&data)
        };
        self.document.append_child(self.parent, node)?;
        Ok(())
    }

    fn append(&mut self, node: NodeId) -> Result<(), XmlError> {
        self.flush_text()?;
        self.document.append_child(self.parent, node)?;
        Ok(())
    }

    fn start_element(&mut self, name: &QualifiedName, attributes: &Attributes) -> Result<(), XmlError> {
        let element = if name.local_name.is_empty() {
            self.document.create_element(&name.qname)?
        } else {
            self.document.create_element_ns(&name.namespace_uri, &name.qname)?
        };
        for attribute in attributes {
            let attr = if attribute.local_name.is_empty() {
                self.document.create_attribute(&attribute.qname)?
            } else {
                self.document
                    .create_attribute_ns(&attribute.namespace_uri, &attribute.qname)?
            };
            self.document.set_node_value(attr, &attribute.value)?;
            self.document.set_specified(attr, attribute.specified)?;
            self.document.set_attribute_node(element, attr)?;
        }
        self.append(element)?;
        self.parent = element;
        Ok(())
    }

    fn end_element(&mut self) -> Result<(), XmlError> {
        self.flush_text()?;
        if let Some(parent) = self.document.parent(self.parent) {
            self.parent = parent;
        }
        Ok(())
    }

    fn characters(&mut self, data: &str) -> Result<(), XmlError> {
        let kind = if self.in_cdata { NodeKind::CData } else { NodeKind::Text };
        match &mut self.text {
            Some((pending, buffer)) if *pending == kind => buffer.push_str(data),
            _ => {
                self.flush_text()?;
                self.text = Some((kind, data.to_string()));
            }
        }
        Ok(())
    }

    /// Attach a notation or entity declaration to the document type
    fn declare(&mut self, node: NodeId) -> Result<(), XmlError> {
        if let Some(doctype) = self.doctype {
            self.document.append_child(doctype, node)?;
        }
        Ok(())
    }
}

impl EventSink for DomBuilder {
    fn event(&mut self, event: ParseEvent) -> Result<(), XmlError> {
        match event {
            ParseEvent::StartElement { name, attributes } => self.start_element(&name, &attributes)?,
            ParseEvent::EndElement { .. } => self.end_element()?,
            ParseEvent::Characters(text) | ParseEvent::IgnorableWhitespace(text) => self.characters(&text)?,
            ParseEvent::StartCdata => self.in_cdata = true,
            ParseEvent::EndCdata => self.in_cdata = false,
            ParseEvent::Comment(text) => {
                if !self.in_dtd {
                    let node = self.document.create_comment(&text);
                    self.append(node)?;
                }
            }
            ParseEvent::ProcessingInstruction { target, data } => {
                if !self.in_dtd {
                    let node = self.document.create_processing_instruction(&target, &data)?;
                    self.append(node)?;
                }
            }
            ParseEvent::SkippedEntity(name) => {
                if !name.starts_with('%') && name != crate::sax::engine::DTD_ENTITY_NAME {
                    let node = self.document.create_entity_reference(&name)?;
                    self.append(node)?;
                }
            }
            ParseEvent::StartDtd {
                name,
                public_id,
                system_id,
            } => {
                self.flush_text()?;
                let doctype = self.document.create_document_type(
                    &name,
                    public_id.as_deref().unwrap_or(""),
                    system_id.as_deref().unwrap_or(""),
                    "",
                )?;
                self.doctype = Some(doctype);
                self.in_dtd = true;
            }
            ParseEvent::EndDtd => {
                self.in_dtd = false;
                if let Some(doctype) = self.doctype {
                    self.append(doctype)?;
                }
            }
            ParseEvent::NotationDecl {
                name,
                public_id,
                system_id,
            } => {
                if self.doctype.is_some() {
                    let node = self.document.create_notation(
                        &name,
                        public_id.as_deref().unwrap_or(""),
                        system_id.as_deref().unwrap_or(""),
                    )?;
                    self.declare(node)?;
                }
            }
            ParseEvent::UnparsedEntityDecl {
                name,
                public_id,
                system_id,
                notation,
            } => {
                if self.doctype.is_some() {
                    let node = self.document.create_entity(
                        &name,
                        public_id.as_deref().unwrap_or(""),
                        &system_id,
                        &notation,
                    )?;
                    self.declare(node)?;
                }
            }
            ParseEvent::EndDocument => {
                self.flush_text()?;
                if !self.finished {
                    self.document.resume_events();
                    self.finished = true;
                }
                tracing::debug!(nodes = self.document.node_count(), "document built");
            }
            _ => {}
        }
        Ok(())
    }
}
