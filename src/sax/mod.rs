//! SAX (Simple API for XML) Module
//!
//! Event-based parsing on top of the incremental tokenizer.
//!
//! ## Architecture
//!
//! ```text
//! InputSource ---> Engine ---> ParseEvent ---> EventSink
//!                    |                            |
//!              context stack              HandlerSet / DomBuilder /
//!           (one per entity read)          EventCollector / closures
//! ```
//!
//! [`ParseEvent`] is the primary representation; the classic handler traits
//! are adapted onto it by [`HandlerSet`]. [`SaxParser`] adds XMLReader-style
//! feature and property negotiation.

pub mod collector;
pub mod engine;
pub mod events;
pub mod filter;
pub mod handlers;
pub mod input_source;
pub mod namespace_strategy;
pub mod parser;

pub use collector::EventCollector;
pub use engine::Engine;
pub use events::{Attribute, Attributes, HandlerKind, ParseEvent, QualifiedName};
pub use filter::WhitespaceFilter;
pub use handlers::{
    ContentHandler, DeclHandler, DtdHandler, EntityResolver, ErrorHandler, EventSink, HandlerSet, LexicalHandler,
    Locator,
};
pub use input_source::InputSource;
pub use namespace_strategy::{
    NamespacePrefixesStrategy, NamespaceStrategy, NoNamespacePrefixesStrategy, NoNamespacesStrategy,
};
pub use parser::{features, properties, PropertyValue, SaxParser};
