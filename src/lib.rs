//! xmlweave - XML parsing, trees and serialization
//!
//! Layers:
//! - [`core`]: incremental tokenizer, DTD parsing, encodings, namespaces
//! - [`sax`]: event engine with SAX-style handlers and feature negotiation
//! - [`dom`]: arena DOM built from engine events, with mutation events,
//!   path lookup and a writer back to XML
//! - [`reader`]: pull parser with content models and typed values
//! - [`writer`]: genx-style status writer and a serializer on top of it
//!
//! All parsers share the tokenizer in [`core::tokenizer`], so they accept
//! exactly the same documents and report positions the same way (1-based
//! line and column).

pub mod core;
pub mod dom;
pub mod error;
pub mod qname;
pub mod reader;
pub mod sax;
pub mod value_traits;
pub mod writer;

pub use dom::{Document, DomBuilder, DomParser, DomWriter, NodeId, NodeKind};
pub use error::{DomException, Location, SaxError, SerializerError, StreamError, XmlError};
pub use qname::QName;
pub use reader::{Content, EventType, StreamParser};
pub use sax::{EventSink, InputSource, ParseEvent, SaxParser};
pub use value_traits::ValueTraits;
pub use writer::{Serializer, Writer};
