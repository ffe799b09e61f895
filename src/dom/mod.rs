//! DOM Module - Arena-based XML Document
//!
//! Implements the W3C DOM node model on top of a per-document arena:
//! - Every node lives in the [`Document`] that created it and is addressed
//!   by a [`NodeId`]; parent, child and sibling links are ids into the arena
//! - Children and attributes are singly linked lists (O(1) append, O(n)
//!   length and previous-sibling)
//! - Names are interned in a [`NamePool`] that documents may share
//! - Mutation events with capture and bubble phases
//! - `/a/b[1]/@x` style path lookup with a per-document compiled path cache
//!
//! [`DomParser`] builds documents from XML input through [`DomBuilder`];
//! [`DomWriter`] writes them back out.

pub mod builder;
pub mod document;
pub mod events;
pub mod name_pool;
pub mod node;
pub mod parser;
pub mod path;
pub mod writer;

pub use builder::DomBuilder;
pub use document::Document;
pub use events::{event_types, AttrChange, EventDispatcher, EventListener, ListenerRef, MutationEvent, Phase};
pub use name_pool::{Name, NamePool};
pub use node::{NodeId, NodeKind};
pub use parser::{DomParser, FEATURE_FILTER_WHITESPACE};
pub use writer::DomWriter;
