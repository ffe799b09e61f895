//! Arena-backed DOM document
//!
//! A [`Document`] owns every node created through it. Nodes are addressed
//! by [`NodeId`]; an id from another document is rejected with
//! `WrongDocument`, and nodes move between documents only through
//! [`Document::import_node`].
//!
//! ## Tree shape
//!
//! - slot 0 is the document node
//! - children form a singly linked list (`first_child` / `next_sibling`),
//!   the container also records its `last_child`
//! - attributes form a second list hanging off `first_attribute`, each
//!   attribute pointing back at its owner element
//! - removed nodes stay in the arena, detached, until the document drops
//!
//! Mutations dispatch DOM Level 2 mutation events unless events are
//! suspended; see [`Document::suspend_events`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};

use lru::LruCache;

use super::events::{event_types, AttrChange, EventDispatcher, ListenerRef, MutationEvent, Phase};
use super::name_pool::{Name, NamePool};
use super::node::{ExternalIds, NodeData, NodeId, NodeKind};
use super::path::{CompiledPath, NameMatch};
use crate::core::namespace::ns;
use crate::core::unicode::{is_name, is_qname};
use crate::error::DomException;

static NEXT_DOCUMENT_ID: AtomicU32 = AtomicU32::new(1);

const PATH_CACHE_SIZE: NonZeroUsize = match NonZeroUsize::new(64) {
    Some(n) => n,
    None => unreachable!(),
};

const DOCUMENT_INDEX: u32 = 0;

/// Subtree copied out of an arena, used by clone and import
struct Detached {
    data: NodeData,
    attributes: Vec<NodeData>,
    children: Vec<Detached>,
}

pub struct Document {
    id: u32,
    nodes: Vec<NodeData>,
    names: Rc<RefCell<NamePool>>,
    suspended: u32,
    dispatchers: HashMap<u32, Rc<RefCell<EventDispatcher>>>,
    path_cache: RefCell<LruCache<String, Rc<CompiledPath>>>,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.id)
            .field("nodes", &self.nodes.len())
            .field("suspended", &self.suspended)
            .finish()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self::with_name_pool(Rc::new(RefCell::new(NamePool::new())))
    }

    /// Create a document interning its names into a shared pool
    pub fn with_name_pool(names: Rc<RefCell<NamePool>>) -> Self {
        let mut nodes = Vec::with_capacity(256);
        nodes.push(NodeData::new(NodeKind::Document, None, String::new()));
        Document {
            id: NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed),
            nodes,
            names,
            suspended: 0,
            dispatchers: HashMap::new(),
            path_cache: RefCell::new(LruCache::new(PATH_CACHE_SIZE)),
        }
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The document node
    #[inline]
    pub fn root(&self) -> NodeId {
        NodeId::new(self.id, DOCUMENT_INDEX)
    }

    pub fn name_pool(&self) -> Rc<RefCell<NamePool>> {
        self.names.clone()
    }

    /// Number of arena slots, detached nodes included
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    // ----- arena plumbing -----

    #[inline]
    fn node_id(&self, index: u32) -> NodeId {
        NodeId::new(self.id, index)
    }

    #[inline]
    fn slot(&self, id: NodeId) -> Option<&NodeData> {
        if id.document_id() != self.id {
            return None;
        }
        self.nodes.get(id.index())
    }

    fn check(&self, id: NodeId) -> Result<&NodeData, DomException> {
        if id.document_id() != self.id {
            return Err(DomException::WrongDocument);
        }
        self.nodes.get(id.index()).ok_or(DomException::NotFound)
    }

    #[inline]
    fn at(&self, index: u32) -> &NodeData {
        &self.nodes[index as usize]
    }

    #[inline]
    fn at_mut(&mut self, index: u32) -> &mut NodeData {
        &mut self.nodes[index as usize]
    }

    fn alloc(&mut self, data: NodeData) -> NodeId {
        let index = self.nodes.len() as u32;
        self.nodes.push(data);
        self.node_id(index)
    }

    fn intern(&self, namespace_uri: &str, qname: &str) -> Rc<Name> {
        self.names.borrow_mut().insert(namespace_uri, qname)
    }

    fn child_indexes(&self, index: u32) -> Vec<u32> {
        let mut out = Vec::new();
        let mut cur = self.at(index).first_child;
        while let Some(c) = cur {
            out.push(c);
            cur = self.at(c).next_sibling;
        }
        out
    }

    fn attribute_indexes(&self, index: u32) -> Vec<u32> {
        let mut out = Vec::new();
        let mut cur = self.at(index).first_attribute;
        while let Some(a) = cur {
            out.push(a);
            cur = self.at(a).next_sibling;
        }
        out
    }

    /// Pre-order descendants, the node itself excluded
    fn descendant_indexes(&self, index: u32) -> Vec<u32> {
        let mut out = Vec::new();
        let mut stack: Vec<u32> = self.child_indexes(index).into_iter().rev().collect();
        while let Some(n) = stack.pop() {
            out.push(n);
            stack.extend(self.child_indexes(n).into_iter().rev());
        }
        out
    }

    fn previous_index(&self, index: u32) -> Option<u32> {
        let parent = self.at(index).parent?;
        let mut cur = self.at(parent).first_child;
        let mut prev = None;
        while let Some(c) = cur {
            if c == index {
                return prev;
            }
            prev = Some(c);
            cur = self.at(c).next_sibling;
        }
        None
    }

    fn link(&mut self, parent: u32, child: u32, before: Option<u32>) {
        self.at_mut(child).parent = Some(parent);
        match before {
            None => {
                self.at_mut(child).next_sibling = None;
                match self.at(parent).last_child {
                    Some(last) => self.at_mut(last).next_sibling = Some(child),
                    None => self.at_mut(parent).first_child = Some(child),
                }
                self.at_mut(parent).last_child = Some(child);
            }
            Some(reference) => {
                self.at_mut(child).next_sibling = Some(reference);
                if self.at(parent).first_child == Some(reference) {
                    self.at_mut(parent).first_child = Some(child);
                } else if let Some(prev) = self.previous_index(reference) {
                    self.at_mut(prev).next_sibling = Some(child);
                }
            }
        }
    }

    fn unlink(&mut self, child: u32) {
        let Some(parent) = self.at(child).parent else {
            return;
        };
        let next = self.at(child).next_sibling;
        let prev = self.previous_index(child);
        match prev {
            Some(p) => self.at_mut(p).next_sibling = next,
            None => self.at_mut(parent).first_child = next,
        }
        if self.at(parent).last_child == Some(child) {
            self.at_mut(parent).last_child = prev;
        }
        let node = self.at_mut(child);
        node.parent = None;
        node.next_sibling = None;
    }

    fn in_document(&self, index: u32) -> bool {
        let mut cur = Some(index);
        while let Some(n) = cur {
            if n == DOCUMENT_INDEX {
                return true;
            }
            cur = self.at(n).parent;
        }
        false
    }

    // ----- node properties -----

    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.slot(id).map(|n| n.kind)
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.kind(id) == Some(NodeKind::Element)
    }

    /// DOM `nodeName`
    pub fn node_name(&self, id: NodeId) -> &str {
        let Some(node) = self.slot(id) else {
            return "";
        };
        match node.kind {
            NodeKind::Document => "#document",
            NodeKind::DocumentFragment => "#document-fragment",
            NodeKind::Text => "#text",
            NodeKind::CData => "#cdata-section",
            NodeKind::Comment => "#comment",
            _ => node.qname(),
        }
    }

    pub fn local_name(&self, id: NodeId) -> &str {
        self.slot(id)
            .and_then(|n| n.name.as_deref())
            .map_or("", Name::local_name)
    }

    pub fn namespace_uri(&self, id: NodeId) -> &str {
        self.slot(id)
            .and_then(|n| n.name.as_deref())
            .map_or("", Name::namespace_uri)
    }

    pub fn prefix(&self, id: NodeId) -> &str {
        self.slot(id).and_then(|n| n.name.as_deref()).map_or("", Name::prefix)
    }

    /// DOM `nodeValue`: attribute value, character data or PI data
    pub fn node_value(&self, id: NodeId) -> Option<&str> {
        let node = self.slot(id)?;
        match node.kind {
            NodeKind::Attribute
            | NodeKind::Text
            | NodeKind::CData
            | NodeKind::Comment
            | NodeKind::ProcessingInstruction => Some(&node.value),
            _ => None,
        }
    }

    pub fn set_node_value(&mut self, id: NodeId, value: &str) -> Result<(), DomException> {
        match self.check(id)?.kind {
            NodeKind::Attribute => {
                let owner = self.at(id.index() as u32).owner_element;
                let prev = std::mem::replace(&mut self.at_mut(id.index() as u32).value, value.to_string());
                if let Some(el) = owner {
                    let name = self.node_name(id).to_string();
                    self.fire_attr_modified(el, id.index() as u32, &name, prev, value, AttrChange::Modification);
                }
                Ok(())
            }
            NodeKind::Text | NodeKind::CData | NodeKind::Comment | NodeKind::ProcessingInstruction => {
                self.update_data(id.index() as u32, value.to_string());
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Concatenated text of a subtree
    pub fn text_content(&self, id: NodeId) -> String {
        let Some(node) = self.slot(id) else {
            return String::new();
        };
        match node.kind {
            NodeKind::Document | NodeKind::Element | NodeKind::DocumentFragment => self
                .descendant_indexes(id.index() as u32)
                .into_iter()
                .filter(|&i| self.at(i).kind.is_text())
                .map(|i| self.at(i).value.as_str())
                .collect(),
            NodeKind::DocumentType | NodeKind::Entity | NodeKind::Notation | NodeKind::EntityReference => {
                String::new()
            }
            _ => node.value.clone(),
        }
    }

    /// Public identifier of a document type, entity or notation
    pub fn public_id(&self, id: NodeId) -> &str {
        self.slot(id).and_then(|n| n.ids.as_deref()).map_or("", |i| &i.public_id)
    }

    pub fn system_id(&self, id: NodeId) -> &str {
        self.slot(id).and_then(|n| n.ids.as_deref()).map_or("", |i| &i.system_id)
    }

    /// Internal subset of a document type
    pub fn internal_subset(&self, id: NodeId) -> &str {
        match self.slot(id) {
            Some(n) if n.kind == NodeKind::DocumentType => n.ids.as_deref().map_or("", |i| &i.extra),
            _ => "",
        }
    }

    /// Notation name of an unparsed entity
    pub fn notation_name(&self, id: NodeId) -> &str {
        match self.slot(id) {
            Some(n) if n.kind == NodeKind::Entity => n.ids.as_deref().map_or("", |i| &i.extra),
            _ => "",
        }
    }

    /// False for attributes whose value came from a DTD default
    pub fn specified(&self, id: NodeId) -> bool {
        self.slot(id).is_some_and(|n| n.specified)
    }

    /// Mark an attribute as defaulted from the DTD
    pub(crate) fn set_specified(&mut self, attr: NodeId, specified: bool) -> Result<(), DomException> {
        if self.check(attr)?.kind != NodeKind::Attribute {
            return Err(DomException::NotSupported);
        }
        self.at_mut(attr.index() as u32).specified = specified;
        Ok(())
    }

    // ----- navigation -----

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slot(id)?.parent.map(|p| self.node_id(p))
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.slot(id)?.first_child.map(|c| self.node_id(c))
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.slot(id)?.last_child.map(|c| self.node_id(c))
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let node = self.slot(id)?;
        if node.kind == NodeKind::Attribute {
            return None;
        }
        node.next_sibling.map(|n| self.node_id(n))
    }

    /// Found by scanning the parent's child list
    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.slot(id)?;
        self.previous_index(id.index() as u32).map(|p| self.node_id(p))
    }

    pub fn has_child_nodes(&self, id: NodeId) -> bool {
        self.slot(id).is_some_and(|n| n.first_child.is_some())
    }

    pub fn child_nodes(&self, id: NodeId) -> Vec<NodeId> {
        if self.slot(id).is_none() {
            return Vec::new();
        }
        self.child_indexes(id.index() as u32)
            .into_iter()
            .map(|c| self.node_id(c))
            .collect()
    }

    pub fn child_count(&self, id: NodeId) -> usize {
        self.child_nodes(id).len()
    }

    /// Child at `index`, counting from the first child
    pub fn child_at(&self, id: NodeId, index: usize) -> Option<NodeId> {
        let mut cur = self.first_child(id);
        for _ in 0..index {
            cur = self.next_sibling(cur?);
        }
        cur
    }

    /// All descendants in document order
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        if self.slot(id).is_none() {
            return Vec::new();
        }
        self.descendant_indexes(id.index() as u32)
            .into_iter()
            .map(|n| self.node_id(n))
            .collect()
    }

    pub fn owner_element(&self, attr: NodeId) -> Option<NodeId> {
        self.slot(attr)?.owner_element.map(|e| self.node_id(e))
    }

    /// Attribute nodes of an element, in document order
    pub fn attributes(&self, element: NodeId) -> Vec<NodeId> {
        if self.slot(element).is_none() {
            return Vec::new();
        }
        self.attribute_indexes(element.index() as u32)
            .into_iter()
            .map(|a| self.node_id(a))
            .collect()
    }

    pub fn has_attributes(&self, id: NodeId) -> bool {
        self.slot(id).is_some_and(|n| n.first_attribute.is_some())
    }

    /// True if `ancestor` is `node` or one of its ancestors
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> bool {
        if self.slot(ancestor).is_none() || self.slot(node).is_none() {
            return false;
        }
        let target = ancestor.index() as u32;
        let mut cur = Some(node.index() as u32);
        while let Some(n) = cur {
            if n == target {
                return true;
            }
            cur = self.at(n).parent;
        }
        false
    }

    /// The single element child of the document node
    pub fn document_element(&self) -> Option<NodeId> {
        self.child_indexes(DOCUMENT_INDEX)
            .into_iter()
            .find(|&c| self.at(c).kind == NodeKind::Element)
            .map(|c| self.node_id(c))
    }

    pub fn doctype(&self) -> Option<NodeId> {
        self.child_indexes(DOCUMENT_INDEX)
            .into_iter()
            .find(|&c| self.at(c).kind == NodeKind::DocumentType)
            .map(|c| self.node_id(c))
    }

    /// Notation children of a document type
    pub fn notations(&self, doctype: NodeId) -> Vec<NodeId> {
        self.child_nodes(doctype)
            .into_iter()
            .filter(|&n| self.kind(n) == Some(NodeKind::Notation))
            .collect()
    }

    /// Entity children of a document type
    pub fn entities(&self, doctype: NodeId) -> Vec<NodeId> {
        self.child_nodes(doctype)
            .into_iter()
            .filter(|&n| self.kind(n) == Some(NodeKind::Entity))
            .collect()
    }

    // ----- factories -----

    fn check_qualified_name(namespace_uri: &str, qname: &str) -> Result<(), DomException> {
        if !is_name(qname) {
            return Err(DomException::InvalidCharacter(qname.to_string()));
        }
        if !is_qname(qname) {
            return Err(DomException::Namespace(format!("malformed qualified name '{}'", qname)));
        }
        let prefix = qname.split_once(':').map_or("", |(p, _)| p);
        if !prefix.is_empty() && namespace_uri.is_empty() {
            return Err(DomException::Namespace(format!("prefix '{}' without namespace", prefix)));
        }
        if prefix == "xml" && namespace_uri != ns::XML {
            return Err(DomException::Namespace("prefix 'xml' bound to wrong namespace".to_string()));
        }
        if (prefix == "xmlns" || qname == "xmlns") && namespace_uri != ns::XMLNS {
            return Err(DomException::Namespace("'xmlns' bound to wrong namespace".to_string()));
        }
        Ok(())
    }

    fn check_name(name: &str) -> Result<(), DomException> {
        if is_name(name) {
            Ok(())
        } else {
            Err(DomException::InvalidCharacter(name.to_string()))
        }
    }

    pub fn create_element(&mut self, name: &str) -> Result<NodeId, DomException> {
        Self::check_name(name)?;
        let name = self.intern("", name);
        Ok(self.alloc(NodeData::new(NodeKind::Element, Some(name), String::new())))
    }

    pub fn create_element_ns(&mut self, namespace_uri: &str, qname: &str) -> Result<NodeId, DomException> {
        Self::check_qualified_name(namespace_uri, qname)?;
        let name = self.intern(namespace_uri, qname);
        Ok(self.alloc(NodeData::new(NodeKind::Element, Some(name), String::new())))
    }

    pub fn create_attribute(&mut self, name: &str) -> Result<NodeId, DomException> {
        Self::check_name(name)?;
        let name = self.intern("", name);
        Ok(self.alloc(NodeData::new(NodeKind::Attribute, Some(name), String::new())))
    }

    pub fn create_attribute_ns(&mut self, namespace_uri: &str, qname: &str) -> Result<NodeId, DomException> {
        Self::check_qualified_name(namespace_uri, qname)?;
        let name = self.intern(namespace_uri, qname);
        Ok(self.alloc(NodeData::new(NodeKind::Attribute, Some(name), String::new())))
    }

    pub fn create_text_node(&mut self, data: &str) -> NodeId {
        self.alloc(NodeData::new(NodeKind::Text, None, data.to_string()))
    }

    pub fn create_cdata_section(&mut self, data: &str) -> NodeId {
        self.alloc(NodeData::new(NodeKind::CData, None, data.to_string()))
    }

    pub fn create_comment(&mut self, data: &str) -> NodeId {
        self.alloc(NodeData::new(NodeKind::Comment, None, data.to_string()))
    }

    pub fn create_processing_instruction(&mut self, target: &str, data: &str) -> Result<NodeId, DomException> {
        Self::check_name(target)?;
        let name = self.intern("", target);
        Ok(self.alloc(NodeData::new(NodeKind::ProcessingInstruction, Some(name), data.to_string())))
    }

    pub fn create_entity_reference(&mut self, name: &str) -> Result<NodeId, DomException> {
        Self::check_name(name)?;
        let name = self.intern("", name);
        Ok(self.alloc(NodeData::new(NodeKind::EntityReference, Some(name), String::new())))
    }

    pub fn create_document_fragment(&mut self) -> NodeId {
        self.alloc(NodeData::new(NodeKind::DocumentFragment, None, String::new()))
    }

    fn alloc_with_ids(
        &mut self,
        kind: NodeKind,
        name: &str,
        public_id: &str,
        system_id: &str,
        extra: &str,
    ) -> Result<NodeId, DomException> {
        Self::check_name(name)?;
        let mut data = NodeData::new(kind, Some(self.intern("", name)), String::new());
        data.ids = Some(Box::new(ExternalIds {
            public_id: public_id.to_string(),
            system_id: system_id.to_string(),
            extra: extra.to_string(),
        }));
        Ok(self.alloc(data))
    }

    pub fn create_document_type(
        &mut self,
        name: &str,
        public_id: &str,
        system_id: &str,
        internal_subset: &str,
    ) -> Result<NodeId, DomException> {
        self.alloc_with_ids(NodeKind::DocumentType, name, public_id, system_id, internal_subset)
    }

    pub fn create_notation(&mut self, name: &str, public_id: &str, system_id: &str) -> Result<NodeId, DomException> {
        self.alloc_with_ids(NodeKind::Notation, name, public_id, system_id, "")
    }

    pub fn create_entity(
        &mut self,
        name: &str,
        public_id: &str,
        system_id: &str,
        notation_name: &str,
    ) -> Result<NodeId, DomException> {
        self.alloc_with_ids(NodeKind::Entity, name, public_id, system_id, notation_name)
    }

    // ----- container operations -----

    fn allowed_child(parent: NodeKind, child: NodeKind) -> bool {
        match parent {
            NodeKind::Document => matches!(
                child,
                NodeKind::Element | NodeKind::ProcessingInstruction | NodeKind::Comment | NodeKind::DocumentType
            ),
            NodeKind::Element | NodeKind::DocumentFragment => matches!(
                child,
                NodeKind::Element
                    | NodeKind::Text
                    | NodeKind::CData
                    | NodeKind::Comment
                    | NodeKind::ProcessingInstruction
                    | NodeKind::EntityReference
            ),
            NodeKind::DocumentType => matches!(child, NodeKind::Entity | NodeKind::Notation),
            _ => false,
        }
    }

    /// Hierarchy checks shared by insert and replace; `replacing` is left
    /// out of the single-element and single-doctype counts
    fn check_insertion(&self, parent: NodeId, child: NodeId, replacing: Option<NodeId>) -> Result<(), DomException> {
        let parent_kind = self.check(parent)?.kind;
        let child_kind = self.check(child)?.kind;
        if !parent_kind.is_container() {
            return Err(DomException::HierarchyRequest);
        }
        if parent_kind == NodeKind::DocumentType && self.check(parent)?.parent.is_some() {
            return Err(DomException::NoModificationAllowed);
        }
        if self.is_ancestor_or_self(child, parent) {
            return Err(DomException::HierarchyRequest);
        }

        let incoming: Vec<u32> = if child_kind == NodeKind::DocumentFragment {
            self.child_indexes(child.index() as u32)
        } else {
            vec![child.index() as u32]
        };
        if !incoming.iter().all(|&i| Self::allowed_child(parent_kind, self.at(i).kind)) {
            return Err(DomException::HierarchyRequest);
        }

        if parent_kind == NodeKind::Document {
            for single in [NodeKind::Element, NodeKind::DocumentType] {
                let added = incoming.iter().filter(|&&i| self.at(i).kind == single).count();
                if added == 0 {
                    continue;
                }
                let existing = self
                    .child_indexes(parent.index() as u32)
                    .into_iter()
                    .filter(|&c| self.at(c).kind == single)
                    .filter(|&c| Some(self.node_id(c)) != replacing && c != child.index() as u32)
                    .count();
                if existing + added > 1 {
                    return Err(DomException::HierarchyRequest);
                }
            }
        }
        Ok(())
    }

    /// Detach the nodes that are about to be inserted: the children of a
    /// fragment, or the node itself from its current parent
    fn take_incoming(&mut self, child: NodeId) -> Vec<u32> {
        let index = child.index() as u32;
        if self.at(index).kind == NodeKind::DocumentFragment {
            let children = self.child_indexes(index);
            for &c in &children {
                self.unlink(c);
            }
            return children;
        }
        if let Some(old_parent) = self.at(index).parent {
            self.fire_removed(index);
            self.unlink(index);
            self.fire_subtree_modified(old_parent);
        }
        vec![index]
    }

    pub fn insert_before(
        &mut self,
        parent: NodeId,
        new_child: NodeId,
        ref_child: Option<NodeId>,
    ) -> Result<NodeId, DomException> {
        self.check_insertion(parent, new_child, None)?;
        if let Some(reference) = ref_child {
            if self.check(reference)?.parent != Some(parent.index() as u32) {
                return Err(DomException::NotFound);
            }
            if reference == new_child {
                return Ok(new_child);
            }
        }
        let parent_index = parent.index() as u32;
        let incoming = self.take_incoming(new_child);
        let before = ref_child.map(|r| r.index() as u32);
        for child in incoming {
            self.link(parent_index, child, before);
            self.fire_inserted(child);
        }
        self.fire_subtree_modified(parent_index);
        Ok(new_child)
    }

    pub fn append_child(&mut self, parent: NodeId, new_child: NodeId) -> Result<NodeId, DomException> {
        self.insert_before(parent, new_child, None)
    }

    /// Replace `old_child` with `new_child`, returning the old child
    pub fn replace_child(
        &mut self,
        parent: NodeId,
        new_child: NodeId,
        old_child: NodeId,
    ) -> Result<NodeId, DomException> {
        self.check_insertion(parent, new_child, Some(old_child))?;
        if self.check(old_child)?.parent != Some(parent.index() as u32) {
            return Err(DomException::NotFound);
        }
        if new_child == old_child {
            return Ok(old_child);
        }
        let parent_index = parent.index() as u32;
        let old_index = old_child.index() as u32;
        let incoming = self.take_incoming(new_child);
        for child in incoming {
            self.link(parent_index, child, Some(old_index));
            self.fire_inserted(child);
        }
        self.fire_removed(old_index);
        self.unlink(old_index);
        self.fire_subtree_modified(parent_index);
        Ok(old_child)
    }

    pub fn remove_child(&mut self, parent: NodeId, old_child: NodeId) -> Result<NodeId, DomException> {
        let parent_kind = self.check(parent)?.kind;
        if self.check(old_child)?.parent != Some(parent.index() as u32) {
            return Err(DomException::NotFound);
        }
        if parent_kind == NodeKind::DocumentType && self.check(parent)?.parent.is_some() {
            return Err(DomException::NoModificationAllowed);
        }
        let index = old_child.index() as u32;
        self.fire_removed(index);
        self.unlink(index);
        self.fire_subtree_modified(parent.index() as u32);
        Ok(old_child)
    }

    // ----- attributes -----

    fn check_element(&self, id: NodeId) -> Result<u32, DomException> {
        if self.check(id)?.kind != NodeKind::Element {
            return Err(DomException::NotSupported);
        }
        Ok(id.index() as u32)
    }

    fn find_attribute(&self, element: u32, qname: &str) -> Option<u32> {
        self.attribute_indexes(element)
            .into_iter()
            .find(|&a| self.at(a).qname() == qname)
    }

    fn find_attribute_ns(&self, element: u32, namespace_uri: &str, local_name: &str) -> Option<u32> {
        self.attribute_indexes(element).into_iter().find(|&a| {
            self.at(a)
                .name
                .as_deref()
                .is_some_and(|n| n.equals_ns(namespace_uri, local_name))
        })
    }

    fn attach_attribute(&mut self, element: u32, attr: u32) {
        self.at_mut(attr).owner_element = Some(element);
        self.at_mut(attr).next_sibling = None;
        match self.attribute_indexes(element).last() {
            Some(&last) => self.at_mut(last).next_sibling = Some(attr),
            None => self.at_mut(element).first_attribute = Some(attr),
        }
    }

    fn detach_attribute(&mut self, element: u32, attr: u32) {
        let next = self.at(attr).next_sibling;
        if self.at(element).first_attribute == Some(attr) {
            self.at_mut(element).first_attribute = next;
        } else if let Some(prev) = self
            .attribute_indexes(element)
            .into_iter()
            .find(|&a| self.at(a).next_sibling == Some(attr))
        {
            self.at_mut(prev).next_sibling = next;
        }
        let node = self.at_mut(attr);
        node.owner_element = None;
        node.next_sibling = None;
    }

    pub fn get_attribute(&self, element: NodeId, name: &str) -> Option<&str> {
        self.slot(element)?;
        self.find_attribute(element.index() as u32, name)
            .map(|a| self.at(a).value.as_str())
    }

    pub fn get_attribute_node(&self, element: NodeId, name: &str) -> Option<NodeId> {
        self.slot(element)?;
        self.find_attribute(element.index() as u32, name)
            .map(|a| self.node_id(a))
    }

    pub fn has_attribute(&self, element: NodeId, name: &str) -> bool {
        self.get_attribute_node(element, name).is_some()
    }

    pub fn set_attribute(&mut self, element: NodeId, name: &str, value: &str) -> Result<(), DomException> {
        let el = self.check_element(element)?;
        match self.find_attribute(el, name) {
            Some(attr) => {
                let prev = std::mem::replace(&mut self.at_mut(attr).value, value.to_string());
                self.at_mut(attr).specified = true;
                self.fire_attr_modified(el, attr, name, prev, value, AttrChange::Modification);
            }
            None => {
                let attr = self.create_attribute(name)?;
                let index = attr.index() as u32;
                self.at_mut(index).value = value.to_string();
                self.attach_attribute(el, index);
                self.fire_attr_modified(el, index, name, String::new(), value, AttrChange::Addition);
            }
        }
        Ok(())
    }

    pub fn remove_attribute(&mut self, element: NodeId, name: &str) -> Result<(), DomException> {
        let el = self.check_element(element)?;
        if let Some(attr) = self.find_attribute(el, name) {
            self.remove_attribute_index(el, attr);
        }
        Ok(())
    }

    fn remove_attribute_index(&mut self, el: u32, attr: u32) {
        self.detach_attribute(el, attr);
        let name = self.at(attr).qname().to_string();
        let prev = self.at(attr).value.clone();
        self.fire_attr_modified(el, attr, &name, prev, "", AttrChange::Removal);
    }

    /// Attach an attribute node, returning the attribute it replaced
    pub fn set_attribute_node(&mut self, element: NodeId, attr: NodeId) -> Result<Option<NodeId>, DomException> {
        let el = self.check_element(element)?;
        let attr_node = self.check(attr)?;
        if attr_node.kind != NodeKind::Attribute {
            return Err(DomException::HierarchyRequest);
        }
        let index = attr.index() as u32;
        match attr_node.owner_element {
            Some(owner) if owner == el => return Ok(Some(attr)),
            Some(_) => return Err(DomException::InuseAttribute),
            None => {}
        }
        let existing = match attr_node.name.as_deref() {
            Some(name) if !name.namespace_uri().is_empty() => {
                self.find_attribute_ns(el, name.namespace_uri(), name.local_name())
            }
            Some(name) => self.find_attribute(el, name.qname()),
            None => None,
        };
        if let Some(old) = existing {
            self.remove_attribute_index(el, old);
        }
        self.attach_attribute(el, index);
        let name = self.at(index).qname().to_string();
        let value = self.at(index).value.clone();
        self.fire_attr_modified(el, index, &name, String::new(), &value, AttrChange::Addition);
        Ok(existing.map(|o| self.node_id(o)))
    }

    pub fn remove_attribute_node(&mut self, element: NodeId, attr: NodeId) -> Result<NodeId, DomException> {
        let el = self.check_element(element)?;
        if self.check(attr)?.owner_element != Some(el) {
            return Err(DomException::NotFound);
        }
        self.remove_attribute_index(el, attr.index() as u32);
        Ok(attr)
    }

    pub fn get_attribute_ns(&self, element: NodeId, namespace_uri: &str, local_name: &str) -> Option<&str> {
        self.slot(element)?;
        self.find_attribute_ns(element.index() as u32, namespace_uri, local_name)
            .map(|a| self.at(a).value.as_str())
    }

    pub fn get_attribute_node_ns(&self, element: NodeId, namespace_uri: &str, local_name: &str) -> Option<NodeId> {
        self.slot(element)?;
        self.find_attribute_ns(element.index() as u32, namespace_uri, local_name)
            .map(|a| self.node_id(a))
    }

    pub fn has_attribute_ns(&self, element: NodeId, namespace_uri: &str, local_name: &str) -> bool {
        self.get_attribute_node_ns(element, namespace_uri, local_name).is_some()
    }

    pub fn set_attribute_ns(
        &mut self,
        element: NodeId,
        namespace_uri: &str,
        qname: &str,
        value: &str,
    ) -> Result<(), DomException> {
        let el = self.check_element(element)?;
        Self::check_qualified_name(namespace_uri, qname)?;
        let local = qname.split_once(':').map_or(qname, |(_, l)| l);
        match self.find_attribute_ns(el, namespace_uri, local) {
            Some(attr) => {
                if self.at(attr).qname() != qname {
                    let name = self.intern(namespace_uri, qname);
                    self.at_mut(attr).name = Some(name);
                }
                let prev = std::mem::replace(&mut self.at_mut(attr).value, value.to_string());
                self.at_mut(attr).specified = true;
                self.fire_attr_modified(el, attr, qname, prev, value, AttrChange::Modification);
            }
            None => {
                let attr = self.create_attribute_ns(namespace_uri, qname)?;
                let index = attr.index() as u32;
                self.at_mut(index).value = value.to_string();
                self.attach_attribute(el, index);
                self.fire_attr_modified(el, index, qname, String::new(), value, AttrChange::Addition);
            }
        }
        Ok(())
    }

    pub fn remove_attribute_ns(
        &mut self,
        element: NodeId,
        namespace_uri: &str,
        local_name: &str,
    ) -> Result<(), DomException> {
        let el = self.check_element(element)?;
        if let Some(attr) = self.find_attribute_ns(el, namespace_uri, local_name) {
            self.remove_attribute_index(el, attr);
        }
        Ok(())
    }

    // ----- element lookup -----

    /// Descendant elements with the given qualified name (`*` matches all)
    pub fn get_elements_by_tag_name(&self, id: NodeId, name: &str) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|&n| self.is_element(n) && (name == "*" || self.node_name(n) == name))
            .collect()
    }

    /// Descendant elements by namespace and local name; either may be `*`
    pub fn get_elements_by_tag_name_ns(&self, id: NodeId, namespace_uri: &str, local_name: &str) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|&n| {
                self.is_element(n)
                    && (namespace_uri == "*" || self.namespace_uri(n) == namespace_uri)
                    && (local_name == "*" || self.local_name(n) == local_name)
            })
            .collect()
    }

    /// First child element with the given qualified name
    pub fn get_child_element(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.child_nodes(id)
            .into_iter()
            .find(|&n| self.is_element(n) && self.node_name(n) == name)
    }

    pub fn get_child_element_ns(&self, id: NodeId, namespace_uri: &str, local_name: &str) -> Option<NodeId> {
        self.child_nodes(id).into_iter().find(|&n| {
            self.is_element(n) && self.namespace_uri(n) == namespace_uri && self.local_name(n) == local_name
        })
    }

    fn compiled_path(&self, path: &str) -> Option<Rc<CompiledPath>> {
        let mut cache = self.path_cache.borrow_mut();
        if let Some(compiled) = cache.get(path) {
            return Some(compiled.clone());
        }
        tracing::trace!(path, "compiling node path");
        match CompiledPath::compile(path) {
            Ok(compiled) => {
                let compiled = Rc::new(compiled);
                cache.put(path.to_string(), compiled.clone());
                Some(compiled)
            }
            Err(e) => {
                tracing::debug!(path, error = %e, "invalid node path");
                None
            }
        }
    }

    /// Locate a node by path relative to `start`
    pub fn get_node_by_path(&self, start: NodeId, path: &str) -> Option<NodeId> {
        self.slot(start)?;
        self.compiled_path(path)?.find(self, start, NameMatch::Plain)
    }

    /// Locate a node by path, resolving name prefixes through `prefixes`
    pub fn get_node_by_path_ns(
        &self,
        start: NodeId,
        path: &str,
        prefixes: &HashMap<String, String>,
    ) -> Option<NodeId> {
        self.slot(start)?;
        self.compiled_path(path)?
            .find(self, start, NameMatch::Namespaced(prefixes))
    }

    // ----- character data -----

    fn check_character_data(&self, id: NodeId) -> Result<u32, DomException> {
        match self.check(id)?.kind {
            NodeKind::Text | NodeKind::CData | NodeKind::Comment | NodeKind::ProcessingInstruction => {
                Ok(id.index() as u32)
            }
            _ => Err(DomException::NotSupported),
        }
    }

    /// Byte offset of the `chars`-th character, `None` when past the end
    fn byte_offset(s: &str, chars: usize) -> Option<usize> {
        s.char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(s.len()))
            .nth(chars)
    }

    fn update_data(&mut self, index: u32, data: String) {
        let prev = std::mem::replace(&mut self.at_mut(index).value, data);
        if self.events_enabled() {
            let event = MutationEvent::new(event_types::CHARACTER_DATA_MODIFIED, self.node_id(index), true)
                .with_values(prev, self.at(index).value.clone());
            self.dispatch_event(event);
        }
    }

    pub fn data(&self, id: NodeId) -> Option<&str> {
        let node = self.slot(id)?;
        (node.kind.is_character_data() || node.kind == NodeKind::ProcessingInstruction).then_some(node.value.as_str())
    }

    /// Length in characters
    pub fn length(&self, id: NodeId) -> usize {
        self.data(id).map_or(0, |d| d.chars().count())
    }

    pub fn set_data(&mut self, id: NodeId, data: &str) -> Result<(), DomException> {
        let index = self.check_character_data(id)?;
        self.update_data(index, data.to_string());
        Ok(())
    }

    pub fn append_data(&mut self, id: NodeId, arg: &str) -> Result<(), DomException> {
        let index = self.check_character_data(id)?;
        let mut data = self.at(index).value.clone();
        data.push_str(arg);
        self.update_data(index, data);
        Ok(())
    }

    pub fn insert_data(&mut self, id: NodeId, offset: usize, arg: &str) -> Result<(), DomException> {
        let index = self.check_character_data(id)?;
        let mut data = self.at(index).value.clone();
        let at = Self::byte_offset(&data, offset).ok_or(DomException::IndexSize)?;
        data.insert_str(at, arg);
        self.update_data(index, data);
        Ok(())
    }

    /// Delete up to `count` characters starting at `offset`
    pub fn delete_data(&mut self, id: NodeId, offset: usize, count: usize) -> Result<(), DomException> {
        self.replace_data(id, offset, count, "")
    }

    pub fn replace_data(&mut self, id: NodeId, offset: usize, count: usize, arg: &str) -> Result<(), DomException> {
        let index = self.check_character_data(id)?;
        let mut data = self.at(index).value.clone();
        let start = Self::byte_offset(&data, offset).ok_or(DomException::IndexSize)?;
        let end = Self::byte_offset(&data, offset.saturating_add(count)).unwrap_or(data.len());
        data.replace_range(start..end, arg);
        self.update_data(index, data);
        Ok(())
    }

    pub fn substring_data(&self, id: NodeId, offset: usize, count: usize) -> Result<String, DomException> {
        let index = self.check_character_data(id)?;
        let data = &self.at(index).value;
        let start = Self::byte_offset(data, offset).ok_or(DomException::IndexSize)?;
        let end = Self::byte_offset(data, offset.saturating_add(count)).unwrap_or(data.len());
        Ok(data[start..end].to_string())
    }

    /// Split a text node at `offset`; the tail becomes a new sibling
    pub fn split_text(&mut self, id: NodeId, offset: usize) -> Result<NodeId, DomException> {
        let kind = self.check(id)?.kind;
        if !kind.is_text() {
            return Err(DomException::NotSupported);
        }
        let index = id.index() as u32;
        let data = self.at(index).value.clone();
        let at = Self::byte_offset(&data, offset).ok_or(DomException::IndexSize)?;
        let tail = self.alloc(NodeData::new(kind, None, data[at..].to_string()));
        self.update_data(index, data[..at].to_string());
        if let Some(parent) = self.at(index).parent {
            let next = self.at(index).next_sibling;
            let tail_index = tail.index() as u32;
            self.link(parent, tail_index, next);
            self.fire_inserted(tail_index);
            self.fire_subtree_modified(parent);
        }
        Ok(tail)
    }

    /// Merge adjacent text nodes and drop empty ones throughout a subtree
    pub fn normalize(&mut self, id: NodeId) -> Result<(), DomException> {
        self.check(id)?;
        let mut stack = vec![id.index() as u32];
        while let Some(n) = stack.pop() {
            let mut cur = self.at(n).first_child;
            while let Some(c) = cur {
                let next = self.at(c).next_sibling;
                if self.at(c).kind != NodeKind::Text {
                    stack.push(c);
                    cur = next;
                    continue;
                }
                if let Some(following) = next.filter(|&f| self.at(f).kind == NodeKind::Text) {
                    let mut merged = self.at(c).value.clone();
                    merged.push_str(&self.at(following).value);
                    self.update_data(c, merged);
                    self.fire_removed(following);
                    self.unlink(following);
                    self.fire_subtree_modified(n);
                    continue;
                }
                if self.at(c).value.is_empty() {
                    self.fire_removed(c);
                    self.unlink(c);
                    self.fire_subtree_modified(n);
                }
                cur = next;
            }
        }
        Ok(())
    }

    // ----- clone and import -----

    fn fresh_copy(data: &NodeData) -> NodeData {
        let mut copy = NodeData::new(data.kind, data.name.clone(), data.value.clone());
        copy.ids = data.ids.clone();
        copy
    }

    fn extract(&self, index: u32, deep: bool) -> Detached {
        let node = self.at(index);
        let attributes = self
            .attribute_indexes(index)
            .into_iter()
            .map(|a| {
                let mut copy = Self::fresh_copy(self.at(a));
                copy.specified = self.at(a).specified;
                copy
            })
            .collect();
        let children = if deep {
            self.child_indexes(index)
                .into_iter()
                .map(|c| self.extract(c, true))
                .collect()
        } else {
            Vec::new()
        };
        Detached {
            data: Self::fresh_copy(node),
            attributes,
            children,
        }
    }

    fn materialize(&mut self, mut detached: Detached, reintern: bool) -> u32 {
        if reintern {
            detached.data.name = detached.data.name.map(|n| self.intern(n.namespace_uri(), n.qname()));
        }
        let index = self.alloc(detached.data).index() as u32;
        for mut attr in detached.attributes {
            if reintern {
                attr.name = attr.name.map(|n| self.intern(n.namespace_uri(), n.qname()));
            }
            let a = self.alloc(attr).index() as u32;
            self.attach_attribute(index, a);
        }
        for child in detached.children {
            let c = self.materialize(child, reintern);
            self.link(index, c, None);
        }
        index
    }

    /// Copy a node (and its subtree if `deep`) into a new detached node
    pub fn clone_node(&mut self, id: NodeId, deep: bool) -> Result<NodeId, DomException> {
        if self.check(id)?.kind == NodeKind::Document {
            return Err(DomException::NotSupported);
        }
        let detached = self.extract(id.index() as u32, deep);
        let index = self.materialize(detached, false);
        Ok(self.node_id(index))
    }

    /// Copy a node of another document into this one
    pub fn import_node(&mut self, source: &Document, id: NodeId, deep: bool) -> Result<NodeId, DomException> {
        match source.check(id)?.kind {
            NodeKind::Document | NodeKind::DocumentType => return Err(DomException::NotSupported),
            _ => {}
        }
        let mut detached = source.extract(id.index() as u32, deep);
        detached.data.specified = true;
        let reintern = !Rc::ptr_eq(&self.names, &source.names);
        let index = self.materialize(detached, reintern);
        Ok(self.node_id(index))
    }

    // ----- events -----

    /// Stop dispatching mutation events; calls nest
    pub fn suspend_events(&mut self) {
        self.suspended += 1;
    }

    pub fn resume_events(&mut self) {
        self.suspended = self.suspended.saturating_sub(1);
    }

    pub fn events_suspended(&self) -> bool {
        self.suspended > 0
    }

    #[inline]
    fn events_enabled(&self) -> bool {
        self.suspended == 0 && !self.dispatchers.is_empty()
    }

    pub fn add_event_listener(
        &mut self,
        node: NodeId,
        event_type: &str,
        listener: ListenerRef,
        use_capture: bool,
    ) -> Result<(), DomException> {
        self.check(node)?;
        self.dispatchers
            .entry(node.index() as u32)
            .or_default()
            .borrow_mut()
            .add_event_listener(event_type, listener, use_capture);
        Ok(())
    }

    pub fn remove_event_listener(
        &mut self,
        node: NodeId,
        event_type: &str,
        listener: &ListenerRef,
        use_capture: bool,
    ) -> Result<(), DomException> {
        self.check(node)?;
        let index = node.index() as u32;
        let empty = match self.dispatchers.get(&index) {
            Some(d) => {
                let mut d = d.borrow_mut();
                d.remove_event_listener(event_type, listener, use_capture);
                d.listener_count() == 0
            }
            None => false,
        };
        if empty {
            self.dispatchers.remove(&index);
        }
        Ok(())
    }

    /// Drop every listener registered on a detached subtree, attribute
    /// nodes included. The nodes stay usable.
    pub fn release_listeners(&mut self, node: NodeId) -> Result<(), DomException> {
        let data = self.check(node)?;
        let index = node.index() as u32;
        if index == DOCUMENT_INDEX || data.parent.is_some() || data.owner_element.is_some() {
            return Err(DomException::InvalidState);
        }
        for n in std::iter::once(index).chain(self.descendant_indexes(index)) {
            for a in self.attribute_indexes(n) {
                self.dispatchers.remove(&a);
            }
            self.dispatchers.remove(&n);
        }
        Ok(())
    }

    /// Number of nodes with registered listeners
    pub fn listener_node_count(&self) -> usize {
        self.dispatchers.len()
    }

    /// Listener list of a node, for listeners that register or remove
    /// other listeners while an event is being dispatched
    pub fn event_dispatcher(&self, node: NodeId) -> Option<Rc<RefCell<EventDispatcher>>> {
        self.slot(node)?;
        self.dispatchers.get(&(node.index() as u32)).cloned()
    }

    /// Dispatch an event through capture, target and bubble phases.
    /// Returns false if a listener canceled it.
    pub fn dispatch_event(&self, mut event: MutationEvent) -> bool {
        if self.suspended > 0 || self.slot(event.target).is_none() {
            return true;
        }
        let mut path = Vec::new();
        let mut cur = self.at(event.target.index() as u32).parent;
        while let Some(p) = cur {
            path.push(p);
            cur = self.at(p).parent;
        }
        path.reverse();

        let run = |index: u32, event: &mut MutationEvent| {
            if let Some(d) = self.dispatchers.get(&index) {
                event.current_target = self.node_id(index);
                EventDispatcher::dispatch(d, event);
            }
        };

        event.phase = Phase::Capturing;
        for &p in &path {
            if event.is_stopped() {
                break;
            }
            run(p, &mut event);
        }
        if !event.is_stopped() {
            event.phase = Phase::AtTarget;
            run(event.target.index() as u32, &mut event);
        }
        if event.bubbles {
            event.phase = Phase::Bubbling;
            for &p in path.iter().rev() {
                if event.is_stopped() {
                    break;
                }
                run(p, &mut event);
            }
        }
        !event.is_canceled()
    }

    fn fire_inserted(&mut self, child: u32) {
        if !self.events_enabled() {
            return;
        }
        if let Some(parent) = self.at(child).parent {
            let event =
                MutationEvent::new(event_types::NODE_INSERTED, self.node_id(child), true).with_related(self.node_id(parent));
            self.dispatch_event(event);
        }
        if self.in_document(child) {
            for n in std::iter::once(child).chain(self.descendant_indexes(child)) {
                self.dispatch_event(MutationEvent::new(
                    event_types::NODE_INSERTED_INTO_DOCUMENT,
                    self.node_id(n),
                    false,
                ));
            }
        }
    }

    fn fire_removed(&mut self, child: u32) {
        if !self.events_enabled() {
            return;
        }
        if let Some(parent) = self.at(child).parent {
            let event =
                MutationEvent::new(event_types::NODE_REMOVED, self.node_id(child), true).with_related(self.node_id(parent));
            self.dispatch_event(event);
        }
        if self.in_document(child) {
            for n in std::iter::once(child).chain(self.descendant_indexes(child)) {
                self.dispatch_event(MutationEvent::new(
                    event_types::NODE_REMOVED_FROM_DOCUMENT,
                    self.node_id(n),
                    false,
                ));
            }
        }
    }

    fn fire_subtree_modified(&mut self, node: u32) {
        if !self.events_enabled() {
            return;
        }
        self.dispatch_event(MutationEvent::new(event_types::SUBTREE_MODIFIED, self.node_id(node), true));
    }

    fn fire_attr_modified(&mut self, element: u32, attr: u32, name: &str, prev: String, new: &str, change: AttrChange) {
        if !self.events_enabled() {
            return;
        }
        let mut event = MutationEvent::new(event_types::ATTR_MODIFIED, self.node_id(element), true)
            .with_related(self.node_id(attr))
            .with_values(prev, new);
        event.attr_name = name.to_string();
        event.attr_change = Some(change);
        self.dispatch_event(event);
        self.fire_subtree_modified(element);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Document, NodeId) {
        let mut doc = Document::new();
        let root = doc.create_element("root").unwrap();
        doc.append_child(doc.root(), root).unwrap();
        (doc, root)
    }

    fn names(doc: &Document, ids: &[NodeId]) -> Vec<String> {
        ids.iter().map(|&n| doc.node_name(n).to_string()).collect()
    }

    /// Every child lists its parent, and the parent's child list contains it
    fn assert_tree_consistent(doc: &Document, node: NodeId) {
        for child in doc.child_nodes(node) {
            assert_eq!(doc.parent(child), Some(node));
            assert_tree_consistent(doc, child);
        }
        assert_eq!(doc.last_child(node), doc.child_nodes(node).last().copied());
    }

    #[test]
    fn test_append_and_navigate() {
        let (mut doc, root) = sample();
        let a = doc.create_element("a").unwrap();
        let b = doc.create_element("b").unwrap();
        let c = doc.create_element("c").unwrap();
        doc.append_child(root, a).unwrap();
        doc.append_child(root, c).unwrap();
        doc.insert_before(root, b, Some(c)).unwrap();

        assert_eq!(names(&doc, &doc.child_nodes(root)), vec!["a", "b", "c"]);
        assert_eq!(doc.previous_sibling(c), Some(b));
        assert_eq!(doc.next_sibling(a), Some(b));
        assert_eq!(doc.child_at(root, 2), Some(c));
        assert_eq!(doc.child_count(root), 3);
        assert_eq!(doc.document_element(), Some(root));
        assert_tree_consistent(&doc, doc.root());
    }

    #[test]
    fn test_reparenting_detaches_first() {
        let (mut doc, root) = sample();
        let a = doc.create_element("a").unwrap();
        let b = doc.create_element("b").unwrap();
        let x = doc.create_text_node("x");
        doc.append_child(root, a).unwrap();
        doc.append_child(root, b).unwrap();
        doc.append_child(a, x).unwrap();
        doc.append_child(b, x).unwrap();
        assert!(doc.child_nodes(a).is_empty());
        assert_eq!(doc.child_nodes(b), vec![x]);
        assert_tree_consistent(&doc, doc.root());
    }

    #[test]
    fn test_hierarchy_errors() {
        let (mut doc, root) = sample();
        let a = doc.create_element("a").unwrap();
        doc.append_child(root, a).unwrap();
        assert_eq!(doc.append_child(a, root), Err(DomException::HierarchyRequest));
        assert_eq!(doc.append_child(a, a), Err(DomException::HierarchyRequest));

        let second = doc.create_element("second").unwrap();
        assert_eq!(doc.append_child(doc.root(), second), Err(DomException::HierarchyRequest));
        let text = doc.create_text_node("t");
        assert_eq!(doc.append_child(doc.root(), text), Err(DomException::HierarchyRequest));
        assert_eq!(doc.append_child(text, a), Err(DomException::HierarchyRequest));
        let attr = doc.create_attribute("k").unwrap();
        assert_eq!(doc.append_child(root, attr), Err(DomException::HierarchyRequest));

        let stray = doc.create_element("stray").unwrap();
        assert_eq!(doc.remove_child(root, stray), Err(DomException::NotFound));
        assert_eq!(doc.insert_before(root, stray, Some(text)), Err(DomException::NotFound));
    }

    #[test]
    fn test_wrong_document() {
        let (mut doc, root) = sample();
        let mut other = Document::new();
        let foreign = other.create_element("x").unwrap();
        assert_eq!(doc.append_child(root, foreign), Err(DomException::WrongDocument));
        let imported = doc.import_node(&other, foreign, true).unwrap();
        doc.append_child(root, imported).unwrap();
        assert_eq!(doc.node_name(imported), "x");
    }

    #[test]
    fn test_replace_document_element() {
        let (mut doc, root) = sample();
        let other = doc.create_element("other").unwrap();
        assert_eq!(doc.replace_child(doc.root(), other, root), Ok(root));
        assert_eq!(doc.document_element(), Some(other));
        assert_eq!(doc.parent(root), None);
    }

    #[test]
    fn test_fragment_is_spliced() {
        let (mut doc, root) = sample();
        let last = doc.create_element("last").unwrap();
        doc.append_child(root, last).unwrap();
        let frag = doc.create_document_fragment();
        for name in ["f1", "f2"] {
            let e = doc.create_element(name).unwrap();
            doc.append_child(frag, e).unwrap();
        }
        doc.insert_before(root, frag, Some(last)).unwrap();
        assert_eq!(names(&doc, &doc.child_nodes(root)), vec!["f1", "f2", "last"]);
        assert!(!doc.has_child_nodes(frag));
        assert_tree_consistent(&doc, doc.root());
    }

    #[test]
    fn test_remove_last_child_updates_tail() {
        let (mut doc, root) = sample();
        let a = doc.create_element("a").unwrap();
        let b = doc.create_element("b").unwrap();
        doc.append_child(root, a).unwrap();
        doc.append_child(root, b).unwrap();
        doc.remove_child(root, b).unwrap();
        assert_eq!(doc.last_child(root), Some(a));
        let c = doc.create_element("c").unwrap();
        doc.append_child(root, c).unwrap();
        assert_eq!(names(&doc, &doc.child_nodes(root)), vec!["a", "c"]);
    }

    #[test]
    fn test_attributes() {
        let (mut doc, root) = sample();
        doc.set_attribute(root, "a", "1").unwrap();
        doc.set_attribute(root, "b", "2").unwrap();
        doc.set_attribute(root, "a", "3").unwrap();
        assert_eq!(doc.get_attribute(root, "a"), Some("3"));
        assert_eq!(names(&doc, &doc.attributes(root)), vec!["a", "b"]);
        let attr = doc.get_attribute_node(root, "b").unwrap();
        assert_eq!(doc.owner_element(attr), Some(root));
        assert_eq!(doc.parent(attr), None);

        doc.remove_attribute(root, "a").unwrap();
        assert!(!doc.has_attribute(root, "a"));
        doc.remove_attribute(root, "missing").unwrap();

        let other = doc.create_element("other").unwrap();
        assert_eq!(doc.set_attribute_node(other, attr), Err(DomException::InuseAttribute));
        assert_eq!(doc.remove_attribute_node(root, attr), Ok(attr));
        assert_eq!(doc.set_attribute_node(other, attr), Ok(None));
        assert_eq!(doc.get_attribute(other, "b"), Some("2"));
    }

    #[test]
    fn test_namespaced_attributes() {
        let (mut doc, root) = sample();
        doc.set_attribute_ns(root, "urn:x", "x:k", "1").unwrap();
        doc.set_attribute_ns(root, "urn:x", "y:k", "2").unwrap();
        assert_eq!(doc.attributes(root).len(), 1);
        assert_eq!(doc.get_attribute_ns(root, "urn:x", "k"), Some("2"));
        assert_eq!(doc.get_attribute(root, "y:k"), Some("2"));
        doc.remove_attribute_ns(root, "urn:x", "k").unwrap();
        assert!(!doc.has_attributes(root));
    }

    #[test]
    fn test_name_validation() {
        let mut doc = Document::new();
        assert!(matches!(doc.create_element("1x"), Err(DomException::InvalidCharacter(_))));
        assert!(matches!(doc.create_element_ns("", "p:x"), Err(DomException::Namespace(_))));
        assert!(matches!(doc.create_element_ns("urn:x", "xml:x"), Err(DomException::Namespace(_))));
        assert!(matches!(doc.create_element_ns("urn:x", "a:b:c"), Err(DomException::Namespace(_))));
        let e = doc.create_element_ns("urn:x", "p:item").unwrap();
        assert_eq!(doc.prefix(e), "p");
        assert_eq!(doc.local_name(e), "item");
        assert_eq!(doc.namespace_uri(e), "urn:x");
    }

    #[test]
    fn test_character_data() {
        let mut doc = Document::new();
        let t = doc.create_text_node("hello");
        doc.append_data(t, " world").unwrap();
        doc.insert_data(t, 0, ">").unwrap();
        assert_eq!(doc.data(t), Some(">hello world"));
        doc.delete_data(t, 0, 1).unwrap();
        doc.replace_data(t, 0, 5, "HELLO").unwrap();
        assert_eq!(doc.substring_data(t, 6, 100).unwrap(), "world");
        assert_eq!(doc.length(t), 11);
        assert_eq!(doc.insert_data(t, 12, "x"), Err(DomException::IndexSize));
        assert_eq!(doc.delete_data(t, 11, 5), Ok(()));
    }

    #[test]
    fn test_character_offsets_count_chars() {
        let mut doc = Document::new();
        let t = doc.create_text_node("héllo");
        assert_eq!(doc.substring_data(t, 1, 1).unwrap(), "é");
        assert_eq!(doc.length(t), 5);
    }

    #[test]
    fn test_split_text() {
        let (mut doc, root) = sample();
        let t = doc.create_text_node("abcdef");
        let tail_sibling = doc.create_element("end").unwrap();
        doc.append_child(root, t).unwrap();
        doc.append_child(root, tail_sibling).unwrap();
        let tail = doc.split_text(t, 2).unwrap();
        assert_eq!(doc.data(t), Some("ab"));
        assert_eq!(doc.data(tail), Some("cdef"));
        assert_eq!(doc.child_nodes(root), vec![t, tail, tail_sibling]);
        assert_eq!(doc.split_text(t, 9), Err(DomException::IndexSize));
    }

    #[test]
    fn test_normalize() {
        let (mut doc, root) = sample();
        for s in ["a", "", "b"] {
            let t = doc.create_text_node(s);
            doc.append_child(root, t).unwrap();
        }
        let e = doc.create_element("e").unwrap();
        doc.append_child(root, e).unwrap();
        let empty = doc.create_text_node("");
        doc.append_child(e, empty).unwrap();
        doc.normalize(doc.root()).unwrap();
        let children = doc.child_nodes(root);
        assert_eq!(children.len(), 2);
        assert_eq!(doc.data(children[0]), Some("ab"));
        assert!(!doc.has_child_nodes(e));
    }

    #[test]
    fn test_clone_node() {
        let (mut doc, root) = sample();
        doc.set_attribute(root, "k", "v").unwrap();
        let child = doc.create_text_node("t");
        doc.append_child(root, child).unwrap();

        let shallow = doc.clone_node(root, false).unwrap();
        assert_eq!(doc.get_attribute(shallow, "k"), Some("v"));
        assert!(!doc.has_child_nodes(shallow));
        assert_eq!(doc.parent(shallow), None);

        let deep = doc.clone_node(root, true).unwrap();
        assert_eq!(doc.text_content(deep), "t");
        assert_eq!(doc.clone_node(doc.root(), true), Err(DomException::NotSupported));
    }

    #[test]
    fn test_elements_by_tag_name() {
        let (mut doc, root) = sample();
        let a1 = doc.create_element("a").unwrap();
        let b = doc.create_element("b").unwrap();
        let a2 = doc.create_element("a").unwrap();
        doc.append_child(root, a1).unwrap();
        doc.append_child(a1, b).unwrap();
        doc.append_child(b, a2).unwrap();
        assert_eq!(doc.get_elements_by_tag_name(doc.root(), "a"), vec![a1, a2]);
        assert_eq!(doc.get_elements_by_tag_name(root, "*"), vec![a1, b, a2]);
        assert_eq!(doc.get_child_element(root, "a"), Some(a1));
        assert_eq!(doc.get_child_element(root, "b"), None);
    }

    #[test]
    fn test_node_by_path() {
        let (mut doc, root) = sample();
        for (name, id) in [("item", "a"), ("item", "b"), ("other", "c")] {
            let e = doc.create_element(name).unwrap();
            doc.set_attribute(e, "id", id).unwrap();
            doc.append_child(root, e).unwrap();
        }
        let items = doc.get_elements_by_tag_name(root, "item");
        let top = doc.root();
        assert_eq!(doc.get_node_by_path(top, "/root/item"), Some(items[0]));
        assert_eq!(doc.get_node_by_path(top, "/root/item[1]"), Some(items[1]));
        assert_eq!(doc.get_node_by_path(top, "/root/item[@id='b']"), Some(items[1]));
        assert_eq!(doc.get_node_by_path(top, "/root/item[2]"), None);
        let attr = doc.get_node_by_path(top, "//other/@id").unwrap();
        assert_eq!(doc.node_value(attr), Some("c"));
        assert_eq!(doc.get_node_by_path(root, "item[@id]"), Some(items[0]));
        assert_eq!(doc.get_node_by_path(top, "/root/item[x]"), None);
    }

    #[test]
    fn test_node_by_path_ns() {
        let mut doc = Document::new();
        let root = doc.create_element_ns("urn:a", "a:root").unwrap();
        doc.append_child(doc.root(), root).unwrap();
        let child = doc.create_element_ns("urn:b", "b:child").unwrap();
        doc.append_child(root, child).unwrap();
        doc.set_attribute_ns(child, "urn:b", "b:k", "v").unwrap();

        let mut map = HashMap::new();
        map.insert("x".to_string(), "urn:a".to_string());
        map.insert("y".to_string(), "urn:b".to_string());
        let top = doc.root();
        assert_eq!(doc.get_node_by_path_ns(top, "/x:root/y:child", &map), Some(child));
        assert_eq!(doc.get_node_by_path_ns(top, "/x:root/*:child", &map), Some(child));
        assert_eq!(doc.get_node_by_path_ns(top, "/y:root", &map), None);
        let attr = doc.get_node_by_path_ns(top, "//y:child/@y:k", &map).unwrap();
        assert_eq!(doc.node_value(attr), Some("v"));
    }

    #[test]
    fn test_mutation_events() {
        let (mut doc, root) = sample();
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = log.clone();
        let listener: ListenerRef = Rc::new(RefCell::new(move |e: &mut MutationEvent| {
            l.borrow_mut().push((e.event_type, e.phase));
        }));
        let top = doc.root();
        for ty in [event_types::NODE_INSERTED, event_types::SUBTREE_MODIFIED, event_types::ATTR_MODIFIED] {
            doc.add_event_listener(top, ty, listener.clone(), false).unwrap();
        }

        let child = doc.create_element("child").unwrap();
        doc.append_child(root, child).unwrap();
        assert_eq!(
            *log.borrow(),
            vec![
                (event_types::NODE_INSERTED, Phase::Bubbling),
                (event_types::SUBTREE_MODIFIED, Phase::Bubbling),
            ]
        );

        log.borrow_mut().clear();
        doc.set_attribute(child, "k", "v").unwrap();
        assert_eq!(log.borrow()[0].0, event_types::ATTR_MODIFIED);

        log.borrow_mut().clear();
        doc.suspend_events();
        let more = doc.create_element("more").unwrap();
        doc.append_child(root, more).unwrap();
        doc.resume_events();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_capture_and_stop_propagation() {
        let (mut doc, root) = sample();
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = log.clone();
        let capture: ListenerRef = Rc::new(RefCell::new(move |e: &mut MutationEvent| {
            l.borrow_mut().push("capture");
            e.stop_propagation();
        }));
        let l = log.clone();
        let target: ListenerRef = Rc::new(RefCell::new(move |_: &mut MutationEvent| l.borrow_mut().push("target")));
        let top = doc.root();
        doc.add_event_listener(top, event_types::CHARACTER_DATA_MODIFIED, capture, true).unwrap();
        let text = doc.create_text_node("x");
        doc.append_child(root, text).unwrap();
        doc.add_event_listener(text, event_types::CHARACTER_DATA_MODIFIED, target, false).unwrap();
        doc.set_data(text, "y").unwrap();
        assert_eq!(*log.borrow(), vec!["capture"]);
    }

    #[test]
    fn test_removed_from_document_events() {
        let (mut doc, root) = sample();
        let a = doc.create_element("a").unwrap();
        let b = doc.create_element("b").unwrap();
        doc.append_child(root, a).unwrap();
        doc.append_child(a, b).unwrap();
        let count = Rc::new(RefCell::new(0));
        let c = count.clone();
        let listener: ListenerRef = Rc::new(RefCell::new(move |_: &mut MutationEvent| *c.borrow_mut() += 1));
        doc.add_event_listener(b, event_types::NODE_REMOVED_FROM_DOCUMENT, listener, false).unwrap();
        doc.remove_child(root, a).unwrap();
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn test_doctype_children_read_only() {
        let mut doc = Document::new();
        let dt = doc.create_document_type("root", "", "root.dtd", "").unwrap();
        doc.append_child(doc.root(), dt).unwrap();
        let n = doc.create_notation("gif", "", "image/gif").unwrap();
        assert_eq!(doc.append_child(dt, n), Err(DomException::NoModificationAllowed));
        assert_eq!(doc.doctype(), Some(dt));

        let mut doc = Document::new();
        let dt = doc.create_document_type("root", "", "root.dtd", "").unwrap();
        let n = doc.create_notation("gif", "", "image/gif").unwrap();
        doc.append_child(dt, n).unwrap();
        let e = doc.create_element("x").unwrap();
        assert_eq!(doc.append_child(dt, e), Err(DomException::HierarchyRequest));
        doc.append_child(doc.root(), dt).unwrap();
        assert_eq!(doc.notations(dt), vec![n]);
        assert_eq!(doc.system_id(n), "image/gif");
        assert_eq!(doc.remove_child(dt, n), Err(DomException::NoModificationAllowed));
    }

    #[test]
    fn test_release_listeners() {
        let mut doc = Document::new();
        let root = doc.root();
        let a = doc.create_element("a").unwrap();
        let b = doc.create_element("b").unwrap();
        doc.append_child(root, a).unwrap();
        doc.append_child(a, b).unwrap();
        doc.set_attribute(b, "k", "v").unwrap();
        let k = doc.get_attribute_node(b, "k").unwrap();
        let listener: ListenerRef = Rc::new(RefCell::new(|_: &mut MutationEvent| {}));
        for node in [a, b, k] {
            doc.add_event_listener(node, event_types::SUBTREE_MODIFIED, listener.clone(), false)
                .unwrap();
        }
        assert_eq!(doc.listener_node_count(), 3);

        assert_eq!(doc.release_listeners(a), Err(DomException::InvalidState));
        doc.remove_child(root, a).unwrap();
        doc.release_listeners(a).unwrap();
        assert_eq!(doc.listener_node_count(), 0);
        assert_eq!(doc.get_attribute(b, "k"), Some("v"));

        doc.add_event_listener(b, event_types::SUBTREE_MODIFIED, listener.clone(), false)
            .unwrap();
        doc.remove_event_listener(b, event_types::SUBTREE_MODIFIED, &listener, false)
            .unwrap();
        assert_eq!(doc.listener_node_count(), 0);
    }
}
