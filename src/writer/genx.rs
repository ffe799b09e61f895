//! Low-level XML writer
//!
//! Turns a sequence of structured calls into well-formed XML text. Every
//! call returns a [`Status`] on failure instead of panicking; nothing is
//! written for a failed call.
//!
//! ## Sequencing
//!
//! ```text
//! NoDoc -> PreDoc -> StartTag <-> Attributes <-> StartAttribute
//!                       |
//!                    Content -> PostDoc -> NoDoc
//! ```
//!
//! The start tag of an element is held back until its content begins, so
//! attributes and namespace declarations can be added after
//! [`Writer::start_element`]. Prefixes are resolved when the tag is
//! written: the innermost in-scope declaration of a namespace wins, and a
//! namespace with no usable declaration is declared on the spot with its
//! preferred prefix or a generated `gN` one.

use std::borrow::Cow;
use std::io::Write;

use thiserror::Error;

use crate::core::namespace::ns;
use crate::core::unicode::{find_invalid_char, is_name, is_ncname, is_xml_char};

/// Failure of a writer call
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    #[error("non-XML character")]
    NonXmlCharacter,
    #[error("bad name")]
    BadName,
    #[error("bad namespace name")]
    BadNamespaceName,
    #[error("prefix bound to two namespaces in one start tag")]
    DuplicatePrefix,
    #[error("call out of sequence")]
    SequenceError,
    #[error("no start tag for end element call")]
    NoStartTag,
    #[error("I/O error")]
    IoError,
    #[error("malformed comment body")]
    MalformedComment,
    #[error("'xml' as PI target")]
    XmlPiTarget,
    #[error("malformed processing instruction")]
    MalformedPi,
    #[error("duplicate attribute")]
    DuplicateAttribute,
    #[error("attribute is default namespace")]
    AttributeInDefaultNamespace,
    #[error("default namespace declared on an element which is not in a namespace")]
    BadDefaultDeclaration,
    #[error("malformed document type declaration")]
    MalformedDocType,
}

impl Status {
    /// Numeric status code (0 is success)
    pub fn code(self) -> u8 {
        match self {
            Status::NonXmlCharacter => 2,
            Status::BadName => 3,
            Status::BadNamespaceName => 5,
            Status::DuplicatePrefix => 7,
            Status::SequenceError => 8,
            Status::NoStartTag => 9,
            Status::IoError => 10,
            Status::MalformedComment => 12,
            Status::XmlPiTarget => 13,
            Status::MalformedPi => 14,
            Status::DuplicateAttribute => 15,
            Status::AttributeInDefaultNamespace => 16,
            Status::BadDefaultDeclaration => 18,
            Status::MalformedDocType => 19,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sequence {
    NoDoc,
    PreDoc,
    StartTag,
    Attributes,
    StartAttribute,
    Content,
    PostDoc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Binding {
    prefix: String,
    uri: String,
}

#[derive(Debug, Default)]
struct PendingAttribute {
    namespace_uri: String,
    local: String,
    value: String,
}

#[derive(Debug, Default)]
struct PendingTag {
    namespace_uri: String,
    local: String,
    declarations: Vec<Binding>,
    attributes: Vec<PendingAttribute>,
}

/// Prefixes chosen for a start tag about to be written
#[derive(Debug)]
struct ResolvedTag {
    prefix: String,
    declarations: Vec<Binding>,
    attribute_prefixes: Vec<String>,
}

#[derive(Debug)]
struct OpenElement {
    qname: String,
    /// Scope entries pushed by this element's start tag
    bindings: usize,
    has_children: bool,
}

/// Check that `text` only holds characters allowed in XML
pub fn check_text(text: &str) -> Result<(), Status> {
    match find_invalid_char(text) {
        Some(_) => Err(Status::NonXmlCharacter),
        None => Ok(()),
    }
}

/// Strip characters that are not allowed in XML
pub fn scrub_text(text: &str) -> Cow<'_, str> {
    if find_invalid_char(text).is_none() {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(text.chars().filter(|&c| is_xml_char(c)).collect())
    }
}

fn escape_text(text: &str) -> Cow<'_, str> {
    if !text.contains(['<', '>', '&', '\r']) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 16);
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '\r' => out.push_str("&#xD;"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

fn escape_attribute(value: &str) -> Cow<'_, str> {
    if !value.contains(['<', '>', '&', '"', '\t', '\n', '\r']) {
        return Cow::Borrowed(value);
    }
    let mut out = String::with_capacity(value.len() + 16);
    for c in value.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Characters allowed in a public identifier
fn is_pubid_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, ' ' | '\r' | '\n') || "-'()+,./:=?;!*#@$_%".contains(c)
}

/// System literal in whichever quotes it does not contain
fn quote_system_id(id: &str) -> Result<String, Status> {
    check_text(id)?;
    match (id.contains('"'), id.contains('\'')) {
        (false, _) => Ok(format!("\"{}\"", id)),
        (true, false) => Ok(format!("'{}'", id)),
        (true, true) => Err(Status::MalformedDocType),
    }
}

fn check_prefix(uri: &str, prefix: &str) -> Result<(), Status> {
    if !prefix.is_empty() && !is_ncname(prefix) {
        return Err(Status::BadName);
    }
    if (prefix == "xml") != (uri == ns::XML) || prefix == "xmlns" || uri == ns::XMLNS {
        return Err(Status::BadNamespaceName);
    }
    Ok(())
}

pub struct Writer<W: Write> {
    out: W,
    sequence: Sequence,
    canonical: bool,
    indent: usize,
    /// Preferred prefix per namespace
    preferred: Vec<Binding>,
    generated: u32,
    /// In-scope declarations, outermost first
    scope: Vec<Binding>,
    open: Vec<OpenElement>,
    pending: Option<PendingTag>,
    attribute: Option<PendingAttribute>,
    /// Depth of the element whose text switched indentation off
    mixed_at: Option<usize>,
    written: bool,
}

impl<W: Write> std::fmt::Debug for Writer<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Writer")
            .field("sequence", &self.sequence)
            .field("canonical", &self.canonical)
            .field("depth", &self.open.len())
            .finish()
    }
}

impl<W: Write> Writer<W> {
    pub fn new(out: W, canonical: bool) -> Self {
        Writer {
            out,
            sequence: Sequence::NoDoc,
            canonical,
            indent: 0,
            preferred: Vec::new(),
            generated: 0,
            scope: Vec::new(),
            open: Vec::new(),
            pending: None,
            attribute: None,
            mixed_at: None,
            written: false,
        }
    }

    /// Indent nested elements by `indent` spaces; 0 turns pretty printing off
    pub fn set_pretty_print(&mut self, indent: usize) {
        self.indent = indent;
    }

    pub fn pretty_print(&self) -> usize {
        self.indent
    }

    pub fn canonical(&self) -> bool {
        self.canonical
    }

    pub fn sequence(&self) -> Sequence {
        self.sequence
    }

    /// Number of open elements
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_str(&mut self, s: &str) -> Result<(), Status> {
        self.written = true;
        self.out.write_all(s.as_bytes()).map_err(|e| {
            tracing::debug!(error = %e, "xml output failed");
            Status::IoError
        })
    }

    fn write_indent(&mut self, depth: usize) -> Result<(), Status> {
        let mut s = String::with_capacity(1 + depth * self.indent);
        s.push('\n');
        s.extend(std::iter::repeat(' ').take(depth * self.indent));
        self.write_str(&s)
    }

    fn generate_prefix(&mut self) -> String {
        loop {
            self.generated += 1;
            let prefix = format!("g{}", self.generated);
            let taken = self.preferred.iter().any(|b| b.prefix == prefix)
                || self.scope.iter().any(|b| b.prefix == prefix);
            if !taken {
                return prefix;
            }
        }
    }

    /// Register a namespace with its preferred prefix, generating one when
    /// `prefix` is `None`. Returns the preferred prefix.
    pub fn declare_namespace(&mut self, uri: &str, prefix: Option<&str>) -> Result<String, Status> {
        if uri.is_empty() {
            return Err(Status::BadNamespaceName);
        }
        if uri == ns::XML {
            return match prefix {
                None | Some("xml") => Ok("xml".to_string()),
                Some(_) => Err(Status::BadNamespaceName),
            };
        }
        let prefix = match prefix {
            Some(p) => {
                check_prefix(uri, p)?;
                p.to_string()
            }
            None => match self.preferred.iter().find(|b| b.uri == uri) {
                Some(b) => return Ok(b.prefix.clone()),
                None => self.generate_prefix(),
            },
        };
        match self.preferred.iter_mut().find(|b| b.uri == uri) {
            Some(b) => b.prefix = prefix.clone(),
            None => self.preferred.push(Binding {
                prefix: prefix.clone(),
                uri: uri.to_string(),
            }),
        }
        Ok(prefix)
    }

    /// Namespace bound to `prefix`; `""` when unbound
    fn lookup(&self, prefix: &str) -> &str {
        if prefix == "xml" {
            return ns::XML;
        }
        self.scope
            .iter()
            .rev()
            .find(|b| b.prefix == prefix)
            .map_or("", |b| b.uri.as_str())
    }

    /// Innermost prefix currently bound to `uri` that is not shadowed
    fn effective_prefix(&self, uri: &str, allow_default: bool) -> Option<String> {
        let mut shadowed: Vec<&str> = Vec::new();
        for b in self.scope.iter().rev() {
            if shadowed.contains(&b.prefix.as_str()) {
                continue;
            }
            if b.uri == uri && (allow_default || !b.prefix.is_empty()) {
                return Some(b.prefix.clone());
            }
            shadowed.push(&b.prefix);
        }
        None
    }

    /// Prefix to declare for `uri` in the tag being written
    fn new_prefix(&mut self, uri: &str, allow_default: bool) -> Result<String, Status> {
        let preferred = self.preferred.iter().find(|b| b.uri == uri).map(|b| b.prefix.clone());
        match preferred {
            Some(p) if p.is_empty() && !allow_default => Err(Status::AttributeInDefaultNamespace),
            Some(p) if !self.scope.iter().any(|b| b.prefix == p) => Ok(p),
            Some(_) => Ok(self.generate_prefix()),
            None => {
                let p = self.generate_prefix();
                self.preferred.push(Binding {
                    prefix: p.clone(),
                    uri: uri.to_string(),
                });
                Ok(p)
            }
        }
    }

    pub fn start_document(&mut self) -> Result<(), Status> {
        if self.sequence != Sequence::NoDoc {
            return Err(Status::SequenceError);
        }
        self.sequence = Sequence::PreDoc;
        self.written = false;
        self.mixed_at = None;
        Ok(())
    }

    pub fn end_document(&mut self) -> Result<(), Status> {
        if self.sequence != Sequence::PostDoc {
            return Err(Status::SequenceError);
        }
        self.out.flush().map_err(|_| Status::IoError)?;
        self.sequence = Sequence::NoDoc;
        Ok(())
    }

    pub fn xml_declaration(
        &mut self,
        version: &str,
        encoding: Option<&str>,
        standalone: Option<bool>,
    ) -> Result<(), Status> {
        if self.sequence != Sequence::PreDoc || self.written {
            return Err(Status::SequenceError);
        }
        let mut s = format!("<?xml version=\"{}\"", escape_attribute(version));
        if let Some(enc) = encoding {
            s.push_str(&format!(" encoding=\"{}\"", escape_attribute(enc)));
        }
        if let Some(sa) = standalone {
            s.push_str(if sa { " standalone=\"yes\"" } else { " standalone=\"no\"" });
        }
        s.push_str("?>\n");
        self.write_str(&s)
    }

    pub fn doctype(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        system_id: Option<&str>,
        internal_subset: Option<&str>,
    ) -> Result<(), Status> {
        if self.sequence != Sequence::PreDoc {
            return Err(Status::SequenceError);
        }
        if !is_name(name) {
            return Err(Status::BadName);
        }
        if public_id.is_some_and(|p| !p.chars().all(is_pubid_char)) {
            return Err(Status::MalformedDocType);
        }
        let system = system_id.map(quote_system_id).transpose()?;
        if let Some(subset) = internal_subset {
            check_text(subset)?;
        }
        let mut s = format!("<!DOCTYPE {}", name);
        match (public_id, system) {
            (Some(p), system) => s.push_str(&format!(
                " PUBLIC \"{}\" {}",
                p,
                system.unwrap_or_else(|| "\"\"".to_string())
            )),
            (None, Some(system)) => s.push_str(&format!(" SYSTEM {}", system)),
            (None, None) => {}
        }
        if let Some(subset) = internal_subset.filter(|s| !s.is_empty()) {
            s.push_str(&format!(" [{}]", subset));
        }
        s.push_str(">\n");
        self.write_str(&s)
    }

    pub fn start_element(&mut self, namespace_uri: &str, local: &str) -> Result<(), Status> {
        if !is_ncname(local) {
            return Err(Status::BadName);
        }
        match self.sequence {
            Sequence::PreDoc | Sequence::Content => {}
            Sequence::StartTag | Sequence::Attributes => self.flush_start_tag(false)?,
            _ => return Err(Status::SequenceError),
        }
        self.pending = Some(PendingTag {
            namespace_uri: namespace_uri.to_string(),
            local: local.to_string(),
            ..Default::default()
        });
        self.sequence = Sequence::StartTag;
        Ok(())
    }

    fn pending_tag(&mut self) -> Result<&mut PendingTag, Status> {
        match self.sequence {
            Sequence::StartTag | Sequence::Attributes => self.pending.as_mut().ok_or(Status::SequenceError),
            _ => Err(Status::SequenceError),
        }
    }

    /// Declare a namespace on the pending start tag. `None` uses the
    /// namespace's preferred prefix; `Some("")` declares the default
    /// namespace, and an empty `uri` with `Some("")` unsets it.
    pub fn add_namespace(&mut self, uri: &str, prefix: Option<&str>) -> Result<(), Status> {
        self.pending_tag()?;
        if uri.is_empty() {
            return match prefix {
                Some("") => self.unset_default_namespace(),
                _ => Err(Status::BadNamespaceName),
            };
        }
        let prefix = match prefix {
            Some(p) => {
                if uri == ns::XML && p == "xml" {
                    return Ok(());
                }
                check_prefix(uri, p)?;
                p.to_string()
            }
            None => self.declare_namespace(uri, None)?,
        };
        if prefix == "xml" {
            return Ok(());
        }
        let tag = self.pending_tag()?;
        if prefix.is_empty() && tag.namespace_uri.is_empty() {
            return Err(Status::BadDefaultDeclaration);
        }
        if let Some(existing) = tag.declarations.iter().find(|b| b.prefix == prefix) {
            return if existing.uri == uri {
                Ok(())
            } else {
                Err(Status::DuplicatePrefix)
            };
        }
        tag.declarations.push(Binding {
            prefix,
            uri: uri.to_string(),
        });
        self.sequence = Sequence::Attributes;
        Ok(())
    }

    /// Emit `xmlns=""` on the pending start tag if a default namespace is in force
    pub fn unset_default_namespace(&mut self) -> Result<(), Status> {
        let tag = self.pending_tag()?;
        if let Some(existing) = tag.declarations.iter().find(|b| b.prefix.is_empty()) {
            return if existing.uri.is_empty() {
                Ok(())
            } else {
                Err(Status::DuplicatePrefix)
            };
        }
        tag.declarations.push(Binding {
            prefix: String::new(),
            uri: String::new(),
        });
        self.sequence = Sequence::Attributes;
        Ok(())
    }

    fn check_attribute(&mut self, namespace_uri: &str, local: &str) -> Result<(), Status> {
        if !is_ncname(local) {
            return Err(Status::BadName);
        }
        if namespace_uri == ns::XMLNS {
            return Err(Status::BadNamespaceName);
        }
        let tag = self.pending_tag()?;
        if tag
            .attributes
            .iter()
            .any(|a| a.namespace_uri == namespace_uri && a.local == local)
        {
            return Err(Status::DuplicateAttribute);
        }
        Ok(())
    }

    pub fn add_attribute(&mut self, namespace_uri: &str, local: &str, value: &str) -> Result<(), Status> {
        self.check_attribute(namespace_uri, local)?;
        check_text(value)?;
        let tag = self.pending_tag()?;
        tag.attributes.push(PendingAttribute {
            namespace_uri: namespace_uri.to_string(),
            local: local.to_string(),
            value: value.to_string(),
        });
        self.sequence = Sequence::Attributes;
        Ok(())
    }

    /// Begin an attribute whose value is supplied by following text calls
    pub fn start_attribute(&mut self, namespace_uri: &str, local: &str) -> Result<(), Status> {
        self.check_attribute(namespace_uri, local)?;
        self.attribute = Some(PendingAttribute {
            namespace_uri: namespace_uri.to_string(),
            local: local.to_string(),
            value: String::new(),
        });
        self.sequence = Sequence::StartAttribute;
        Ok(())
    }

    pub fn end_attribute(&mut self) -> Result<(), Status> {
        if self.sequence != Sequence::StartAttribute {
            return Err(Status::SequenceError);
        }
        let attribute = self.attribute.take().ok_or(Status::SequenceError)?;
        self.sequence = Sequence::Attributes;
        self.pending_tag()?.attributes.push(attribute);
        Ok(())
    }

    /// Prepare for content: write a pending start tag, reject calls outside
    /// the root element
    fn enter_content(&mut self) -> Result<(), Status> {
        match self.sequence {
            Sequence::StartTag | Sequence::Attributes => self.flush_start_tag(false),
            Sequence::Content => Ok(()),
            _ => Err(Status::SequenceError),
        }
    }

    fn note_text(&mut self) {
        if self.mixed_at.is_none() {
            self.mixed_at = Some(self.open.len());
        }
    }

    /// Indentation before a child node of the current element
    fn indent_child(&mut self) -> Result<(), Status> {
        let depth = self.open.len();
        if let Some(parent) = self.open.last_mut() {
            parent.has_children = true;
        }
        if self.indent > 0 && depth > 0 && self.mixed_at.is_none() {
            self.write_indent(depth)?;
        }
        Ok(())
    }

    pub fn add_text(&mut self, text: &str) -> Result<(), Status> {
        check_text(text)?;
        if self.sequence == Sequence::StartAttribute {
            if let Some(attribute) = self.attribute.as_mut() {
                attribute.value.push_str(text);
            }
            return Ok(());
        }
        self.enter_content()?;
        if text.is_empty() {
            return Ok(());
        }
        self.note_text();
        self.write_str(&escape_text(text))
    }

    pub fn add_character(&mut self, c: char) -> Result<(), Status> {
        let mut buf = [0u8; 4];
        self.add_text(c.encode_utf8(&mut buf))
    }

    /// Write a CDATA section; `]]>` inside the text splits the section
    pub fn add_cdata(&mut self, text: &str) -> Result<(), Status> {
        check_text(text)?;
        self.enter_content()?;
        self.note_text();
        let body = text.replace("]]>", "]]]]><![CDATA[>");
        self.write_str(&format!("<![CDATA[{}]]>", body))
    }

    /// Write `&name;` as is
    pub fn add_entity_reference(&mut self, name: &str) -> Result<(), Status> {
        if !is_name(name) {
            return Err(Status::BadName);
        }
        self.enter_content()?;
        self.note_text();
        self.write_str(&format!("&{};", name))
    }

    /// Write markup that sits outside the root or between children
    fn write_misc(&mut self, markup: &str) -> Result<(), Status> {
        match self.sequence {
            Sequence::PreDoc => self.write_str(&format!("{}\n", markup)),
            Sequence::PostDoc => self.write_str(&format!("\n{}", markup)),
            Sequence::StartTag | Sequence::Attributes | Sequence::Content => {
                self.enter_content()?;
                self.indent_child()?;
                self.write_str(markup)
            }
            _ => Err(Status::SequenceError),
        }
    }

    pub fn add_comment(&mut self, text: &str) -> Result<(), Status> {
        if text.contains("--") || text.ends_with('-') {
            return Err(Status::MalformedComment);
        }
        check_text(text)?;
        self.write_misc(&format!("<!--{}-->", text))
    }

    pub fn add_pi(&mut self, target: &str, text: &str) -> Result<(), Status> {
        if !is_name(target) {
            return Err(Status::BadName);
        }
        if target.eq_ignore_ascii_case("xml") {
            return Err(Status::XmlPiTarget);
        }
        if text.contains("?>") {
            return Err(Status::MalformedPi);
        }
        check_text(text)?;
        let markup = if text.is_empty() {
            format!("<?{}?>", target)
        } else {
            format!("<?{} {}?>", target, text)
        };
        self.write_misc(&markup)
    }

    pub fn end_element(&mut self) -> Result<(), Status> {
        match self.sequence {
            Sequence::StartTag | Sequence::Attributes => self.flush_start_tag(true)?,
            Sequence::Content => {
                let element = self.open.pop().ok_or(Status::NoStartTag)?;
                let depth = self.open.len();
                if self.indent > 0 && element.has_children && self.mixed_at.is_none() {
                    self.write_indent(depth)?;
                }
                self.write_str(&format!("</{}>", element.qname))?;
                self.scope.truncate(self.scope.len() - element.bindings);
                if self.mixed_at == Some(depth + 1) {
                    self.mixed_at = None;
                }
            }
            _ => return Err(Status::SequenceError),
        }
        self.sequence = if self.open.is_empty() {
            Sequence::PostDoc
        } else {
            Sequence::Content
        };
        Ok(())
    }

    /// Bindings the start tag must declare and the prefixes of the element
    /// and its attributes. Pushes the new bindings onto `scope`.
    fn resolve_tag(&mut self, tag: &PendingTag) -> Result<ResolvedTag, Status> {
        let mut declarations: Vec<Binding> = Vec::new();
        for b in &tag.declarations {
            if self.lookup(&b.prefix) != b.uri {
                declarations.push(b.clone());
            }
        }
        if tag.namespace_uri.is_empty() && declarations.iter().any(|b| b.prefix.is_empty() && !b.uri.is_empty()) {
            return Err(Status::BadDefaultDeclaration);
        }
        self.scope.extend(declarations.iter().cloned());

        let prefix = if tag.namespace_uri.is_empty() {
            if !self.lookup("").is_empty() {
                let unset = Binding {
                    prefix: String::new(),
                    uri: String::new(),
                };
                self.scope.push(unset.clone());
                declarations.push(unset);
            }
            String::new()
        } else if tag.namespace_uri == ns::XML {
            "xml".to_string()
        } else {
            match self.effective_prefix(&tag.namespace_uri, true) {
                Some(p) => p,
                None => {
                    let p = self.new_prefix(&tag.namespace_uri, true)?;
                    let b = Binding {
                        prefix: p.clone(),
                        uri: tag.namespace_uri.clone(),
                    };
                    self.scope.push(b.clone());
                    declarations.push(b);
                    p
                }
            }
        };

        let mut attribute_prefixes = Vec::with_capacity(tag.attributes.len());
        for a in &tag.attributes {
            let prefix = if a.namespace_uri.is_empty() {
                String::new()
            } else if a.namespace_uri == ns::XML {
                "xml".to_string()
            } else {
                match self.effective_prefix(&a.namespace_uri, false) {
                    Some(p) => p,
                    None => {
                        let p = self.new_prefix(&a.namespace_uri, false)?;
                        let b = Binding {
                            prefix: p.clone(),
                            uri: a.namespace_uri.clone(),
                        };
                        self.scope.push(b.clone());
                        declarations.push(b);
                        p
                    }
                }
            };
            attribute_prefixes.push(prefix);
        }

        Ok(ResolvedTag {
            prefix,
            declarations,
            attribute_prefixes,
        })
    }

    /// Resolve prefixes and write the pending start tag; an empty element
    /// is closed at once. On failure the tag stays pending and the writer
    /// state is left as it was.
    fn flush_start_tag(&mut self, empty: bool) -> Result<(), Status> {
        let tag = self.pending.take().ok_or(Status::SequenceError)?;
        let mark = self.scope.len();
        let (preferred, generated) = (self.preferred.len(), self.generated);
        let resolved = match self.resolve_tag(&tag) {
            Ok(resolved) => resolved,
            Err(status) => {
                self.scope.truncate(mark);
                self.preferred.truncate(preferred);
                self.generated = generated;
                self.pending = Some(tag);
                return Err(status);
            }
        };
        self.indent_child()?;

        let ResolvedTag {
            prefix,
            mut declarations,
            attribute_prefixes,
        } = resolved;
        let mut attributes: Vec<(String, &PendingAttribute)> =
            attribute_prefixes.into_iter().zip(tag.attributes.iter()).collect();

        if self.canonical {
            declarations.sort_by(|a, b| a.prefix.cmp(&b.prefix));
            attributes.sort_by(|(_, a), (_, b)| {
                (!a.namespace_uri.is_empty(), &a.namespace_uri, &a.local).cmp(&(
                    !b.namespace_uri.is_empty(),
                    &b.namespace_uri,
                    &b.local,
                ))
            });
        }

        let qname = if prefix.is_empty() {
            tag.local.clone()
        } else {
            format!("{}:{}", prefix, tag.local)
        };
        let mut s = String::with_capacity(64);
        s.push('<');
        s.push_str(&qname);
        for d in &declarations {
            if d.prefix.is_empty() {
                s.push_str(" xmlns=\"");
            } else {
                s.push_str(" xmlns:");
                s.push_str(&d.prefix);
                s.push_str("=\"");
            }
            s.push_str(&escape_attribute(&d.uri));
            s.push('"');
        }
        for (p, a) in &attributes {
            s.push(' ');
            if !p.is_empty() {
                s.push_str(p);
                s.push(':');
            }
            s.push_str(&a.local);
            s.push_str("=\"");
            s.push_str(&escape_attribute(&a.value));
            s.push('"');
        }

        if empty {
            if self.canonical {
                s.push_str("></");
                s.push_str(&qname);
                s.push('>');
            } else {
                s.push_str("/>");
            }
            self.scope.truncate(mark);
        } else {
            s.push('>');
            self.open.push(OpenElement {
                qname,
                bindings: self.scope.len() - mark,
                has_children: false,
            });
            self.sequence = Sequence::Content;
        }
        self.write_str(&s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(w: Writer<Vec<u8>>) -> String {
        String::from_utf8(w.into_inner()).unwrap()
    }

    fn doc(canonical: bool, body: impl FnOnce(&mut Writer<Vec<u8>>) -> Result<(), Status>) -> String {
        let mut w = Writer::new(Vec::new(), canonical);
        w.start_document().unwrap();
        body(&mut w).unwrap();
        w.end_document().unwrap();
        output(w)
    }

    #[test]
    fn test_attribute_via_text_self_closes() {
        let write = |w: &mut Writer<Vec<u8>>| {
            w.start_element("", "root")?;
            w.start_attribute("", "k")?;
            w.add_text("v\"v")?;
            w.end_attribute()?;
            w.end_element()
        };
        assert_eq!(doc(false, write), "<root k=\"v&quot;v\"/>");
        assert_eq!(doc(true, write), "<root k=\"v&quot;v\"></root>");
    }

    #[test]
    fn test_escaping() {
        let out = doc(false, |w| {
            w.start_element("", "a")?;
            w.add_attribute("", "v", "x\ty\nz\"<&")?;
            w.add_text("a<b&c>d\r")?;
            w.end_element()
        });
        assert_eq!(out, "<a v=\"x&#x9;y&#xA;z&quot;&lt;&amp;\">a&lt;b&amp;c&gt;d&#xD;</a>");
    }

    #[test]
    fn test_invalid_characters() {
        let mut w = Writer::new(Vec::new(), false);
        w.start_document().unwrap();
        w.start_element("", "a").unwrap();
        assert_eq!(w.add_text("bad\u{1}"), Err(Status::NonXmlCharacter));
        assert_eq!(scrub_text("a\u{1}b"), "ab");
        assert!(matches!(scrub_text("ok"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_generated_prefix() {
        let out = doc(false, |w| {
            w.start_element("urn:x", "a")?;
            w.start_element("urn:x", "b")?;
            w.end_element()?;
            w.end_element()
        });
        assert_eq!(out, "<g1:a xmlns:g1=\"urn:x\"><g1:b/></g1:a>");
    }

    #[test]
    fn test_preferred_prefix_and_elision() {
        let out = doc(false, |w| {
            w.declare_namespace("urn:x", Some("x"))?;
            w.start_element("urn:x", "a")?;
            w.start_element("urn:x", "b")?;
            w.add_namespace("urn:x", Some("x"))?;
            w.add_attribute("urn:x", "k", "1")?;
            w.end_element()?;
            w.end_element()
        });
        assert_eq!(out, "<x:a xmlns:x=\"urn:x\"><x:b x:k=\"1\"/></x:a>");
    }

    #[test]
    fn test_innermost_declaration_wins() {
        let out = doc(false, |w| {
            w.start_element("", "root")?;
            w.add_namespace("urn:1", Some("p"))?;
            w.start_element("", "mid")?;
            w.add_namespace("urn:2", Some("p"))?;
            w.start_element("urn:2", "leaf")?;
            w.add_attribute("urn:1", "k", "v")?;
            w.end_element()?;
            w.end_element()?;
            w.start_element("urn:1", "after")?;
            w.end_element()?;
            w.end_element()
        });
        assert_eq!(
            out,
            "<root xmlns:p=\"urn:1\"><mid xmlns:p=\"urn:2\">\
             <p:leaf xmlns:g1=\"urn:1\" g1:k=\"v\"/></mid><p:after/></root>"
        );
    }

    #[test]
    fn test_default_namespace_unset() {
        let out = doc(false, |w| {
            w.start_element("urn:d", "root")?;
            w.add_namespace("urn:d", Some(""))?;
            w.start_element("", "plain")?;
            w.end_element()?;
            w.start_element("urn:d", "inner")?;
            w.end_element()?;
            w.end_element()
        });
        assert_eq!(out, "<root xmlns=\"urn:d\"><plain xmlns=\"\"/><inner/></root>");
    }

    #[test]
    fn test_bad_default_declaration() {
        let mut w = Writer::new(Vec::new(), false);
        w.start_document().unwrap();
        w.start_element("", "root").unwrap();
        w.start_element("", "c").unwrap();
        w.add_namespace("urn:x", Some("p")).unwrap();
        assert_eq!(w.add_namespace("urn:d", Some("")), Err(Status::BadDefaultDeclaration));
        w.end_element().unwrap();
        w.start_element("", "z").unwrap();
        w.end_element().unwrap();
        w.end_element().unwrap();
        w.end_document().unwrap();
        assert_eq!(output(w), "<root><c xmlns:p=\"urn:x\"/><z/></root>");
    }

    #[test]
    fn test_attribute_in_default_namespace() {
        let mut w = Writer::new(Vec::new(), false);
        w.declare_namespace("urn:d", Some("")).unwrap();
        w.start_document().unwrap();
        w.start_element("", "root").unwrap();
        w.start_element("", "a").unwrap();
        w.add_namespace("urn:x", Some("p")).unwrap();
        w.add_attribute("urn:d", "k", "v").unwrap();
        assert_eq!(w.end_element(), Err(Status::AttributeInDefaultNamespace));
        assert_eq!(w.sequence(), Sequence::Attributes);
        assert_eq!(w.depth(), 1);

        // the tag is still pending and can be repaired
        w.add_namespace("urn:d", Some("d")).unwrap();
        w.end_element().unwrap();
        w.start_element("urn:x", "b").unwrap();
        w.end_element().unwrap();
        w.end_element().unwrap();
        w.end_document().unwrap();
        assert_eq!(
            output(w),
            "<root><a xmlns:p=\"urn:x\" xmlns:d=\"urn:d\" d:k=\"v\"/>\
             <g1:b xmlns:g1=\"urn:x\"/></root>"
        );
    }

    #[test]
    fn test_doctype_identifiers() {
        let mut w = Writer::new(Vec::new(), false);
        w.start_document().unwrap();
        assert_eq!(w.doctype("r", Some("bad\"id"), Some("r.dtd"), None), Err(Status::MalformedDocType));
        assert_eq!(w.doctype("r", Some("-//X//{Y}"), None, None), Err(Status::MalformedDocType));
        assert_eq!(w.doctype("r", None, Some("a'b\"c"), None), Err(Status::MalformedDocType));
        assert_eq!(w.doctype("r", None, Some("bad\u{1}"), None), Err(Status::NonXmlCharacter));
        w.doctype("r", Some("-//X//DTD r//EN"), Some("say \"hi\".dtd"), None).unwrap();
        w.start_element("", "r").unwrap();
        w.end_element().unwrap();
        w.end_document().unwrap();
        assert_eq!(
            output(w),
            "<!DOCTYPE r PUBLIC \"-//X//DTD r//EN\" 'say \"hi\".dtd'>\n<r/>"
        );
    }

    #[test]
    fn test_canonical_attribute_order() {
        let write = |w: &mut Writer<Vec<u8>>| {
            w.start_element("", "e")?;
            w.add_attribute("urn:z", "b", "1")?;
            w.add_attribute("", "z", "2")?;
            w.add_attribute("", "a", "3")?;
            w.add_namespace("urn:z", Some("n"))?;
            w.add_namespace("urn:y", Some("m"))?;
            w.end_element()
        };
        assert_eq!(
            doc(true, write),
            "<e xmlns:m=\"urn:y\" xmlns:n=\"urn:z\" a=\"3\" z=\"2\" n:b=\"1\"></e>"
        );
        assert_eq!(
            doc(false, write),
            "<e xmlns:n=\"urn:z\" xmlns:m=\"urn:y\" n:b=\"1\" z=\"2\" a=\"3\"/>"
        );
    }

    #[test]
    fn test_pretty_print() {
        let mut w = Writer::new(Vec::new(), false);
        w.set_pretty_print(2);
        w.start_document().unwrap();
        w.start_element("", "a").unwrap();
        w.start_element("", "b").unwrap();
        w.add_text("x").unwrap();
        w.end_element().unwrap();
        w.start_element("", "c").unwrap();
        w.end_element().unwrap();
        w.end_element().unwrap();
        w.end_document().unwrap();
        assert_eq!(output(w), "<a>\n  <b>x</b>\n  <c/>\n</a>");
    }

    #[test]
    fn test_pretty_print_keeps_mixed_content() {
        let mut w = Writer::new(Vec::new(), false);
        w.set_pretty_print(4);
        w.start_document().unwrap();
        w.start_element("", "p").unwrap();
        w.add_text("t").unwrap();
        w.start_element("", "b").unwrap();
        w.start_element("", "i").unwrap();
        w.end_element().unwrap();
        w.end_element().unwrap();
        w.end_element().unwrap();
        w.end_document().unwrap();
        assert_eq!(output(w), "<p>t<b><i/></b></p>");
    }

    #[test]
    fn test_sequence_errors() {
        let mut w = Writer::new(Vec::new(), false);
        assert_eq!(w.add_text("x"), Err(Status::SequenceError));
        w.start_document().unwrap();
        assert_eq!(w.add_text("x"), Err(Status::SequenceError));
        assert_eq!(w.add_attribute("", "a", "1"), Err(Status::SequenceError));
        w.start_element("", "r").unwrap();
        w.add_text("body").unwrap();
        assert_eq!(w.add_attribute("", "a", "1"), Err(Status::SequenceError));
        assert_eq!(w.end_document(), Err(Status::SequenceError));
        w.end_element().unwrap();
        assert_eq!(w.start_element("", "second"), Err(Status::SequenceError));
        assert_eq!(w.end_element(), Err(Status::SequenceError));
        w.end_document().unwrap();
    }

    #[test]
    fn test_duplicate_attribute_and_prefix() {
        let mut w = Writer::new(Vec::new(), false);
        w.start_document().unwrap();
        w.start_element("", "r").unwrap();
        w.add_attribute("", "a", "1").unwrap();
        assert_eq!(w.add_attribute("", "a", "2"), Err(Status::DuplicateAttribute));
        w.add_namespace("urn:1", Some("p")).unwrap();
        assert_eq!(w.add_namespace("urn:2", Some("p")), Err(Status::DuplicatePrefix));
        assert_eq!(w.add_namespace("urn:1", Some("xml")), Err(Status::BadNamespaceName));
        assert_eq!(w.start_element("", "1bad"), Err(Status::BadName));
    }

    #[test]
    fn test_prolog_and_misc() {
        let out = doc(false, |w| {
            w.xml_declaration("1.0", Some("UTF-8"), None)?;
            w.doctype("r", None, Some("r.dtd"), None)?;
            w.add_comment(" head ")?;
            w.start_element("", "r")?;
            w.add_pi("app", "go")?;
            w.add_cdata("a]]>b")?;
            w.add_entity_reference("ent")?;
            w.end_element()?;
            w.add_comment("tail")
        });
        assert_eq!(
            out,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<!DOCTYPE r SYSTEM \"r.dtd\">\n<!-- head -->\n\
             <r><?app go?><![CDATA[a]]]]><![CDATA[>b]]>&ent;</r>\n<!--tail-->"
        );
    }

    #[test]
    fn test_comment_and_pi_validation() {
        let mut w = Writer::new(Vec::new(), false);
        w.start_document().unwrap();
        assert_eq!(w.add_comment("a--b"), Err(Status::MalformedComment));
        assert_eq!(w.add_comment("ends-"), Err(Status::MalformedComment));
        assert_eq!(w.add_pi("XML", ""), Err(Status::XmlPiTarget));
        assert_eq!(w.add_pi("t", "a?>b"), Err(Status::MalformedPi));
        w.add_comment("fine").unwrap();
        assert_eq!(w.xml_declaration("1.0", None, None), Err(Status::SequenceError));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(Status::SequenceError.code(), 8);
        assert_eq!(Status::DuplicateAttribute.code(), 15);
        assert_eq!(Status::MalformedDocType.code(), 19);
        assert_eq!(Status::SequenceError.to_string(), "call out of sequence");
    }
}
