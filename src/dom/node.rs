//! DOM node representation
//!
//! Nodes live in the arena of their [`Document`](super::Document) and are
//! addressed by [`NodeId`]. Children and attributes are singly linked; the
//! container keeps its last child so appending is constant time, and the
//! previous sibling is found by walking the parent's child list.

use std::rc::Rc;

use super::name_pool::Name;

/// Handle to a node: the owning document's id plus the arena slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    doc: u32,
    index: u32,
}

impl NodeId {
    #[inline]
    pub(crate) fn new(doc: u32, index: u32) -> Self {
        NodeId { doc, index }
    }

    /// Id of the document that owns this node
    #[inline]
    pub fn document_id(self) -> u32 {
        self.doc
    }

    /// Arena slot within the owning document
    #[inline]
    pub fn index(self) -> usize {
        self.index as usize
    }
}

/// Type of DOM node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Element,
    Attribute,
    Text,
    CData,
    EntityReference,
    Entity,
    ProcessingInstruction,
    Comment,
    Document,
    DocumentType,
    DocumentFragment,
    Notation,
}

impl NodeKind {
    /// W3C `nodeType` code
    pub fn code(self) -> u16 {
        match self {
            NodeKind::Element => 1,
            NodeKind::Attribute => 2,
            NodeKind::Text => 3,
            NodeKind::CData => 4,
            NodeKind::EntityReference => 5,
            NodeKind::Entity => 6,
            NodeKind::ProcessingInstruction => 7,
            NodeKind::Comment => 8,
            NodeKind::Document => 9,
            NodeKind::DocumentType => 10,
            NodeKind::DocumentFragment => 11,
            NodeKind::Notation => 12,
        }
    }

    /// Node kinds that hold children
    #[inline]
    pub fn is_container(self) -> bool {
        matches!(
            self,
            NodeKind::Document | NodeKind::Element | NodeKind::DocumentFragment | NodeKind::DocumentType
        )
    }

    /// Text, CDATA section and comment
    #[inline]
    pub fn is_character_data(self) -> bool {
        matches!(self, NodeKind::Text | NodeKind::CData | NodeKind::Comment)
    }

    /// Text and CDATA section
    #[inline]
    pub fn is_text(self) -> bool {
        matches!(self, NodeKind::Text | NodeKind::CData)
    }
}

/// External identifiers of document types, entities and notations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalIds {
    pub public_id: String,
    pub system_id: String,
    /// Internal subset of a document type, notation name of an entity
    pub extra: String,
}

/// One arena slot
#[derive(Debug, Clone)]
pub(crate) struct NodeData {
    pub kind: NodeKind,
    /// Elements, attributes, PI targets, entity references, document types,
    /// entities and notations
    pub name: Option<Rc<Name>>,
    /// Character data, attribute value or PI data
    pub value: String,
    /// Parent container (never set for attributes)
    pub parent: Option<u32>,
    /// Element an attribute is attached to
    pub owner_element: Option<u32>,
    pub first_child: Option<u32>,
    pub last_child: Option<u32>,
    /// Next child of the parent, or next attribute of the owner element
    pub next_sibling: Option<u32>,
    pub first_attribute: Option<u32>,
    /// Attribute present in the source (false for defaulted values)
    pub specified: bool,
    pub ids: Option<Box<ExternalIds>>,
}

impl NodeData {
    pub fn new(kind: NodeKind, name: Option<Rc<Name>>, value: String) -> Self {
        NodeData {
            kind,
            name,
            value,
            parent: None,
            owner_element: None,
            first_child: None,
            last_child: None,
            next_sibling: None,
            first_attribute: None,
            specified: true,
            ids: None,
        }
    }

    #[inline]
    pub fn qname(&self) -> &str {
        self.name.as_deref().map_or("", Name::qname)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_type_codes() {
        assert_eq!(NodeKind::Element.code(), 1);
        assert_eq!(NodeKind::Document.code(), 9);
        assert_eq!(NodeKind::Notation.code(), 12);
    }

    #[test]
    fn test_kind_classes() {
        assert!(NodeKind::DocumentFragment.is_container());
        assert!(!NodeKind::Text.is_container());
        assert!(NodeKind::Comment.is_character_data());
        assert!(!NodeKind::Comment.is_text());
        assert!(NodeKind::CData.is_text());
    }

    #[test]
    fn test_node_id_parts() {
        let id = NodeId::new(3, 7);
        assert_eq!(id.document_id(), 3);
        assert_eq!(id.index(), 7);
    }
}
