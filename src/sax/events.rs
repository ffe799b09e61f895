//! SAX Event Types
//!
//! Defines the events emitted by the parsing engine. A single sum type
//! carries every callback of the content, DTD, lexical and declaration
//! handler interfaces; [`ParseEvent::handler_kind`] tells which of those
//! interfaces an event belongs to.

/// Expanded element or attribute name
///
/// With namespace processing off, `namespace_uri` and `local_name` are
/// empty and only `qname` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct QualifiedName {
    pub namespace_uri: String,
    pub local_name: String,
    pub qname: String,
}

impl QualifiedName {
    pub fn new(
        namespace_uri: impl Into<String>,
        local_name: impl Into<String>,
        qname: impl Into<String>,
    ) -> Self {
        QualifiedName {
            namespace_uri: namespace_uri.into(),
            local_name: local_name.into(),
            qname: qname.into(),
        }
    }

    /// Name without namespace information
    pub fn plain(qname: impl Into<String>) -> Self {
        QualifiedName {
            qname: qname.into(),
            ..Default::default()
        }
    }

    /// Prefix part of the qualified name
    pub fn prefix(&self) -> &str {
        self.qname.split_once(':').map_or("", |(p, _)| p)
    }

    /// Local name, falling back to the local part of `qname`
    pub fn local(&self) -> &str {
        if self.local_name.is_empty() {
            self.qname.split_once(':').map_or(self.qname.as_str(), |(_, l)| l)
        } else {
            &self.local_name
        }
    }
}

/// One attribute of a start tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub namespace_uri: String,
    pub local_name: String,
    pub qname: String,
    pub value: String,
    /// Declared type (`CDATA` when undeclared)
    pub attr_type: String,
    /// False when the value was supplied by an ATTLIST default
    pub specified: bool,
}

impl Attribute {
    pub fn new(name: QualifiedName, value: impl Into<String>) -> Self {
        Attribute {
            namespace_uri: name.namespace_uri,
            local_name: name.local_name,
            qname: name.qname,
            value: value.into(),
            attr_type: "CDATA".to_string(),
            specified: true,
        }
    }

    pub fn name(&self) -> QualifiedName {
        QualifiedName::new(&*self.namespace_uri, &*self.local_name, &*self.qname)
    }
}

/// Ordered attribute list of a start tag
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    items: Vec<Attribute>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, attribute: Attribute) {
        self.items.push(attribute);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Attribute> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Attribute> {
        self.items.iter()
    }

    /// Index of the attribute with the given qualified name
    pub fn index_of(&self, qname: &str) -> Option<usize> {
        self.items.iter().position(|a| a.qname == qname)
    }

    /// Index of the attribute with the given namespace and local name
    pub fn index_of_ns(&self, namespace_uri: &str, local_name: &str) -> Option<usize> {
        self.items
            .iter()
            .position(|a| a.namespace_uri == namespace_uri && a.local_name == local_name)
    }

    pub fn value(&self, qname: &str) -> Option<&str> {
        self.index_of(qname).map(|i| self.items[i].value.as_str())
    }

    pub fn value_ns(&self, namespace_uri: &str, local_name: &str) -> Option<&str> {
        self.index_of_ns(namespace_uri, local_name)
            .map(|i| self.items[i].value.as_str())
    }
}

impl<'a> IntoIterator for &'a Attributes {
    type Item = &'a Attribute;
    type IntoIter = std::slice::Iter<'a, Attribute>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl FromIterator<Attribute> for Attributes {
    fn from_iter<I: IntoIterator<Item = Attribute>>(iter: I) -> Self {
        Attributes {
            items: iter.into_iter().collect(),
        }
    }
}

/// Handler interface an event is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Content,
    Dtd,
    Lexical,
    Decl,
}

/// A parsing event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseEvent {
    StartDocument,
    EndDocument,
    StartPrefixMapping {
        prefix: String,
        uri: String,
    },
    EndPrefixMapping {
        prefix: String,
    },
    StartElement {
        name: QualifiedName,
        attributes: Attributes,
    },
    EndElement {
        name: QualifiedName,
    },
    Characters(String),
    IgnorableWhitespace(String),
    ProcessingInstruction {
        target: String,
        data: String,
    },
    /// Entity reference that was not expanded
    SkippedEntity(String),

    NotationDecl {
        name: String,
        public_id: Option<String>,
        system_id: Option<String>,
    },
    UnparsedEntityDecl {
        name: String,
        public_id: Option<String>,
        system_id: String,
        notation: String,
    },

    StartDtd {
        name: String,
        public_id: Option<String>,
        system_id: Option<String>,
    },
    EndDtd,
    /// Start of an expanded entity (`[dtd]` for the external subset,
    /// `%name` for parameter entities)
    StartEntity(String),
    EndEntity(String),
    StartCdata,
    EndCdata,
    Comment(String),

    ElementDecl {
        name: String,
        model: String,
    },
    AttributeDecl {
        element: String,
        attribute: String,
        attr_type: String,
        mode: Option<String>,
        value: Option<String>,
    },
    InternalEntityDecl {
        name: String,
        value: String,
    },
    ExternalEntityDecl {
        name: String,
        public_id: Option<String>,
        system_id: String,
    },
}

impl ParseEvent {
    /// The handler interface this event belongs to
    pub fn handler_kind(&self) -> HandlerKind {
        match self {
            ParseEvent::NotationDecl { .. } | ParseEvent::UnparsedEntityDecl { .. } => HandlerKind::Dtd,
            ParseEvent::StartDtd { .. }
            | ParseEvent::EndDtd
            | ParseEvent::StartEntity(_)
            | ParseEvent::EndEntity(_)
            | ParseEvent::StartCdata
            | ParseEvent::EndCdata
            | ParseEvent::Comment(_) => HandlerKind::Lexical,
            ParseEvent::ElementDecl { .. }
            | ParseEvent::AttributeDecl { .. }
            | ParseEvent::InternalEntityDecl { .. }
            | ParseEvent::ExternalEntityDecl { .. } => HandlerKind::Decl,
            _ => HandlerKind::Content,
        }
    }

    /// Check if this is a start element event
    #[inline]
    pub fn is_start_element(&self) -> bool {
        matches!(self, ParseEvent::StartElement { .. })
    }

    /// Check if this is an end element event
    #[inline]
    pub fn is_end_element(&self) -> bool {
        matches!(self, ParseEvent::EndElement { .. })
    }

    /// Character content carried by the event, if any
    pub fn text(&self) -> Option<&str> {
        match self {
            ParseEvent::Characters(t) | ParseEvent::IgnorableWhitespace(t) | ParseEvent::Comment(t) => Some(t),
            _ => None,
        }
    }
}
