//! Stream serializer
//!
//! A convenience layer over the genx [`Writer`]: names are [`QName`]s,
//! typed values go through [`ValueTraits`], the document is started on the
//! first call and ended when the root element closes, and status codes
//! become [`SerializerError`]s naming the output.

use std::io::Write;

use super::genx::{Sequence, Status, Writer};
use crate::error::SerializerError;
use crate::qname::QName;
use crate::value_traits::ValueTraits;

pub struct Serializer<W: Write> {
    writer: Writer<W>,
    output_name: String,
}

impl<W: Write> std::fmt::Debug for Serializer<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Serializer")
            .field("output_name", &self.output_name)
            .field("writer", &self.writer)
            .finish()
    }
}

impl<W: Write> Serializer<W> {
    /// Serializer writing to `out`; `indentation` > 0 turns on pretty printing
    pub fn new(out: W, output_name: impl Into<String>, indentation: usize) -> Self {
        let mut writer = Writer::new(out, false);
        writer.set_pretty_print(indentation);
        Self::from_writer(writer, output_name)
    }

    /// Wrap a configured writer (canonical mode, preferred prefixes)
    pub fn from_writer(writer: Writer<W>, output_name: impl Into<String>) -> Self {
        Serializer {
            writer,
            output_name: output_name.into(),
        }
    }

    pub fn output_name(&self) -> &str {
        &self.output_name
    }

    /// Current element nesting depth
    pub fn depth(&self) -> usize {
        self.writer.depth()
    }

    pub fn writer(&mut self) -> &mut Writer<W> {
        &mut self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    fn fail(&self, status: Status) -> SerializerError {
        SerializerError {
            output_name: self.output_name.clone(),
            description: status.to_string(),
        }
    }

    fn check(&self, result: Result<(), Status>) -> Result<(), SerializerError> {
        result.map_err(|s| self.fail(s))
    }

    fn begin(&mut self) -> Result<(), SerializerError> {
        if self.writer.sequence() == Sequence::NoDoc {
            let r = self.writer.start_document();
            self.check(r)?;
        }
        Ok(())
    }

    pub fn start_element(&mut self, name: &QName) -> Result<(), SerializerError> {
        self.begin()?;
        let r = self.writer.start_element(name.namespace(), name.name());
        self.check(r)
    }

    pub fn end_element(&mut self) -> Result<(), SerializerError> {
        let r = self.writer.end_element();
        self.check(r)?;
        if self.writer.depth() == 0 {
            let r = self.writer.end_document();
            self.check(r)?;
        }
        Ok(())
    }

    /// Write `<name>value</name>`
    pub fn element<T: ValueTraits>(&mut self, name: &QName, value: &T) -> Result<(), SerializerError> {
        self.start_element(name)?;
        self.characters(&value.serialize())?;
        self.end_element()
    }

    pub fn start_attribute(&mut self, name: &QName) -> Result<(), SerializerError> {
        let r = self.writer.start_attribute(name.namespace(), name.name());
        self.check(r)
    }

    pub fn end_attribute(&mut self) -> Result<(), SerializerError> {
        let r = self.writer.end_attribute();
        self.check(r)
    }

    pub fn attribute<T: ValueTraits>(&mut self, name: &QName, value: &T) -> Result<(), SerializerError> {
        let r = self
            .writer
            .add_attribute(name.namespace(), name.name(), &value.serialize());
        self.check(r)
    }

    /// Element content, or the value of an attribute between
    /// `start_attribute` and `end_attribute`
    pub fn characters(&mut self, text: &str) -> Result<(), SerializerError> {
        let r = self.writer.add_text(text);
        self.check(r)
    }

    /// Declare `namespace` with `prefix` on the current start tag. An empty
    /// prefix declares the default namespace; an empty namespace and prefix
    /// unset it.
    pub fn namespace_decl(&mut self, namespace: &str, prefix: &str) -> Result<(), SerializerError> {
        let r = self.writer.add_namespace(namespace, Some(prefix));
        self.check(r)
    }

    pub fn xml_decl(
        &mut self,
        version: &str,
        encoding: Option<&str>,
        standalone: Option<bool>,
    ) -> Result<(), SerializerError> {
        self.begin()?;
        let r = self.writer.xml_declaration(version, encoding, standalone);
        self.check(r)
    }

    pub fn doctype_decl(
        &mut self,
        root: &str,
        public_id: Option<&str>,
        system_id: Option<&str>,
        internal_subset: Option<&str>,
    ) -> Result<(), SerializerError> {
        self.begin()?;
        let r = self
            .writer
            .doctype(root, public_id, system_id, internal_subset);
        self.check(r)
    }

    pub fn comment(&mut self, text: &str) -> Result<(), SerializerError> {
        self.begin()?;
        let r = self.writer.add_comment(text);
        self.check(r)
    }

    pub fn pi(&mut self, target: &str, data: &str) -> Result<(), SerializerError> {
        self.begin()?;
        let r = self.writer.add_pi(target, data);
        self.check(r)
    }

    pub fn cdata(&mut self, text: &str) -> Result<(), SerializerError> {
        let r = self.writer.add_cdata(text);
        self.check(r)
    }

    pub fn entity_reference(&mut self, name: &str) -> Result<(), SerializerError> {
        let r = self.writer.add_entity_reference(name);
        self.check(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: Serializer<Vec<u8>>) -> String {
        String::from_utf8(s.into_inner()).unwrap()
    }

    #[test]
    fn test_attribute_from_characters() {
        let root = QName::local("root");
        let k = QName::local("k");

        let mut s = Serializer::new(Vec::new(), "out", 0);
        s.start_element(&root).unwrap();
        s.start_attribute(&k).unwrap();
        s.characters("v\"v").unwrap();
        s.end_attribute().unwrap();
        s.end_element().unwrap();
        assert_eq!(text(s), "<root k=\"v&quot;v\"/>");

        let mut s = Serializer::from_writer(Writer::new(Vec::new(), true), "out");
        s.start_element(&root).unwrap();
        s.start_attribute(&k).unwrap();
        s.characters("v\"v").unwrap();
        s.end_attribute().unwrap();
        s.end_element().unwrap();
        assert_eq!(text(s), "<root k=\"v&quot;v\"></root>");
    }

    #[test]
    fn test_typed_values_and_namespaces() {
        let mut s = Serializer::new(Vec::new(), "out", 0);
        s.start_element(&QName::new("urn:cfg", "config")).unwrap();
        s.namespace_decl("urn:cfg", "").unwrap();
        s.attribute(&QName::local("version"), &2u32).unwrap();
        s.element(&QName::new("urn:cfg", "enabled"), &true).unwrap();
        s.element(&QName::new("urn:cfg", "name"), &"a<b".to_string()).unwrap();
        s.end_element().unwrap();
        assert_eq!(
            text(s),
            "<config xmlns=\"urn:cfg\" version=\"2\"><enabled>true</enabled><name>a&lt;b</name></config>"
        );
    }

    #[test]
    fn test_prolog_and_document_end() {
        let mut s = Serializer::new(Vec::new(), "out", 2);
        s.xml_decl("1.0", Some("UTF-8"), None).unwrap();
        s.comment("generated").unwrap();
        s.start_element(&QName::local("r")).unwrap();
        s.start_element(&QName::local("c")).unwrap();
        s.end_element().unwrap();
        s.end_element().unwrap();
        assert_eq!(s.depth(), 0);
        assert_eq!(
            text(s),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<!--generated-->\n<r>\n  <c/>\n</r>"
        );
    }

    #[test]
    fn test_errors_carry_output_name() {
        let mut s = Serializer::new(Vec::new(), "report.xml", 0);
        let err = s.characters("text").unwrap_err();
        assert_eq!(err.output_name, "report.xml");
        assert_eq!(err.to_string(), "report.xml: error: call out of sequence");

        s.start_element(&QName::local("r")).unwrap();
        s.attribute(&QName::local("a"), &1i32).unwrap();
        let err = s.attribute(&QName::local("a"), &2i32).unwrap_err();
        assert_eq!(err.description, "duplicate attribute");
    }
}
