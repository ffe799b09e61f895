//! Pull parsing
//!
//! [`StreamParser`] reads a document one event at a time, with optional
//! per-element content models and typed access to attributes and simple
//! element content through [`ValueTraits`](crate::value_traits::ValueTraits).

pub mod events;
pub mod parser;

pub use crate::qname::QName;
pub use events::{
    Content, EventType, RECEIVE_ATTRIBUTES_EVENT, RECEIVE_ATTRIBUTE_MAP, RECEIVE_CHARACTERS, RECEIVE_DEFAULT,
    RECEIVE_ELEMENTS, RECEIVE_NAMESPACE_DECLS,
};
pub use parser::{AttributeMap, AttributeValue, StreamParser};
