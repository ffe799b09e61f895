//! DOM Serialization
//!
//! Walks a node and drives a [`Serializer`]. `xmlns` attributes are written
//! as namespace declarations, and the prefixes of element and attribute
//! names are re-declared where needed so that a written document reads
//! back into the same names.

use std::io::Write;

use super::document::Document;
use super::node::{NodeId, NodeKind};
use crate::core::namespace::ns;
use crate::error::SerializerError;
use crate::qname::QName;
use crate::writer::{Serializer, Writer};

/// Indent nested elements
pub const PRETTY_PRINT: u32 = 0x01;
/// Canonical attribute order and explicit end tags
pub const CANONICAL: u32 = 0x02;
/// Start the output with `<?xml version="1.0" encoding="UTF-8"?>`
pub const WRITE_XML_DECLARATION: u32 = 0x04;

#[derive(Debug, Clone)]
pub struct DomWriter {
    options: u32,
    indent: usize,
    output_name: String,
}

impl Default for DomWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl DomWriter {
    pub fn new() -> Self {
        DomWriter {
            options: 0,
            indent: 2,
            output_name: "<output>".to_string(),
        }
    }

    pub fn set_options(&mut self, options: u32) {
        self.options = options;
    }

    pub fn options(&self) -> u32 {
        self.options
    }

    /// Spaces per level when [`PRETTY_PRINT`] is set
    pub fn set_indent(&mut self, indent: usize) {
        self.indent = indent;
    }

    /// Name used in error messages
    pub fn set_output_name(&mut self, name: impl Into<String>) {
        self.output_name = name.into();
    }

    pub fn write_node<W: Write>(&self, out: W, doc: &Document, node: NodeId) -> Result<(), SerializerError> {
        let mut writer = Writer::new(out, self.options & CANONICAL != 0);
        if self.options & PRETTY_PRINT != 0 {
            writer.set_pretty_print(self.indent);
        }
        let mut ser = Serializer::from_writer(writer, self.output_name.clone());
        if self.options & WRITE_XML_DECLARATION != 0 {
            ser.xml_decl("1.0", Some("UTF-8"), None)?;
        }
        write_tree(&mut ser, doc, node)
    }

    pub fn to_string(&self, doc: &Document, node: NodeId) -> Result<String, SerializerError> {
        let mut buf = Vec::new();
        self.write_node(&mut buf, doc, node)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Prefix declared by an `xmlns` attribute, `None` for other attributes
fn declared_prefix<'a>(doc: &'a Document, attr: NodeId) -> Option<&'a str> {
    let qname = doc.node_name(attr);
    if qname == "xmlns" {
        Some("")
    } else if doc.namespace_uri(attr) == ns::XMLNS || qname.starts_with("xmlns:") {
        Some(doc.local_name(attr))
    } else {
        None
    }
}

fn write_tree<W: Write>(ser: &mut Serializer<W>, doc: &Document, node: NodeId) -> Result<(), SerializerError> {
    let Some(kind) = doc.kind(node) else {
        return Ok(());
    };
    match kind {
        NodeKind::Document | NodeKind::DocumentFragment => {
            for child in doc.child_nodes(node) {
                write_tree(ser, doc, child)?;
            }
        }
        NodeKind::Element => write_element(ser, doc, node)?,
        NodeKind::Text => ser.characters(doc.data(node).unwrap_or(""))?,
        NodeKind::CData => ser.cdata(doc.data(node).unwrap_or(""))?,
        NodeKind::Comment => ser.comment(doc.data(node).unwrap_or(""))?,
        NodeKind::ProcessingInstruction => ser.pi(doc.node_name(node), doc.data(node).unwrap_or(""))?,
        NodeKind::EntityReference => ser.entity_reference(doc.node_name(node))?,
        NodeKind::DocumentType => ser.doctype_decl(
            doc.node_name(node),
            non_empty(doc.public_id(node)),
            non_empty(doc.system_id(node)),
            non_empty(doc.internal_subset(node)),
        )?,
        NodeKind::Attribute | NodeKind::Entity | NodeKind::Notation => {}
    }
    Ok(())
}

fn write_element<W: Write>(ser: &mut Serializer<W>, doc: &Document, element: NodeId) -> Result<(), SerializerError> {
    let uri = doc.namespace_uri(element);
    ser.start_element(&QName::new(uri, doc.local_name(element)))?;

    let attributes = doc.attributes(element);
    for &attr in &attributes {
        if let Some(prefix) = declared_prefix(doc, attr) {
            ser.namespace_decl(doc.node_value(attr).unwrap_or(""), prefix)?;
        }
    }
    if !uri.is_empty() {
        ser.namespace_decl(uri, doc.prefix(element))?;
    }
    for &attr in &attributes {
        if declared_prefix(doc, attr).is_some() {
            continue;
        }
        let attr_uri = doc.namespace_uri(attr);
        let prefix = doc.prefix(attr);
        if !attr_uri.is_empty() && !prefix.is_empty() && attr_uri != ns::XML {
            ser.namespace_decl(attr_uri, prefix)?;
        }
        ser.attribute(
            &QName::new(attr_uri, doc.local_name(attr)),
            &doc.node_value(attr).unwrap_or("").to_string(),
        )?;
    }

    for child in doc.child_nodes(element) {
        write_tree(ser, doc, child)?;
    }
    ser.end_element()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parser::DomParser;

    fn round_trip(xml: &str) -> String {
        let doc = DomParser::new().parse_str(xml).unwrap();
        DomWriter::new().to_string(&doc, doc.root()).unwrap()
    }

    #[test]
    fn test_writes_parsed_document() {
        let xml = "<p:a xmlns:p=\"urn:p\" p:k=\"v\"><p:b>t &amp; u</p:b><!--c--><?go now?></p:a>";
        assert_eq!(round_trip(xml), xml);
    }

    #[test]
    fn test_round_trip_is_structural() {
        let xml = "<r xmlns='urn:d'><x:i xmlns:x='urn:x' x:n='1'/><plain xmlns=''>t</plain></r>";
        let first = DomParser::new().parse_str(xml).unwrap();
        let written = DomWriter::new().to_string(&first, first.root()).unwrap();
        let second = DomParser::new().parse_str(&written).unwrap();

        let r1 = first.document_element().unwrap();
        let r2 = second.document_element().unwrap();
        assert_eq!(second.namespace_uri(r2), "urn:d");
        let elements1 = first.get_elements_by_tag_name(r1, "*");
        let elements2 = second.get_elements_by_tag_name(r2, "*");
        assert_eq!(elements1.len(), elements2.len());
        for (a, b) in elements1.iter().zip(&elements2) {
            assert_eq!(first.namespace_uri(*a), second.namespace_uri(*b));
            assert_eq!(first.local_name(*a), second.local_name(*b));
            assert_eq!(first.text_content(*a), second.text_content(*b));
        }
        let i = second.get_child_element_ns(r2, "urn:x", "i").unwrap();
        assert_eq!(second.get_attribute_ns(i, "urn:x", "n"), Some("1"));
    }

    #[test]
    fn test_built_tree_gets_declarations() {
        let mut doc = Document::new();
        let root = doc.root();
        let a = doc.create_element_ns("urn:a", "a:root").unwrap();
        doc.append_child(root, a).unwrap();
        doc.set_attribute_ns(a, "urn:b", "b:flag", "yes").unwrap();
        let child = doc.create_element("item").unwrap();
        doc.append_child(a, child).unwrap();

        let out = DomWriter::new().to_string(&doc, root).unwrap();
        assert_eq!(out, "<a:root xmlns:a=\"urn:a\" xmlns:b=\"urn:b\" b:flag=\"yes\"><item/></a:root>");
    }

    #[test]
    fn test_options() {
        let doc = DomParser::new().parse_str("<r b='2' a='1'><c/></r>").unwrap();
        let mut writer = DomWriter::new();
        writer.set_options(CANONICAL | WRITE_XML_DECLARATION | PRETTY_PRINT);
        assert_eq!(
            writer.to_string(&doc, doc.root()).unwrap(),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<r a=\"1\" b=\"2\">\n  <c></c>\n</r>"
        );
    }

    #[test]
    fn test_element_subtree_and_doctype() {
        let doc = DomParser::new()
            .parse_str("<!DOCTYPE r SYSTEM 'r.dtd'><r><s>x</s></r>")
            .unwrap();
        let s = doc.get_node_by_path(doc.root(), "/r/s").unwrap();
        let writer = DomWriter::new();
        assert_eq!(writer.to_string(&doc, s).unwrap(), "<s>x</s>");
        assert_eq!(
            writer.to_string(&doc, doc.root()).unwrap(),
            "<!DOCTYPE r SYSTEM \"r.dtd\">\n<r><s>x</s></r>"
        );
    }
}
