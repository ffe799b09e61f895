//! XML output
//!
//! - [`genx`]: status-returning writer with namespace and layout handling
//! - [`serializer`]: error-returning convenience layer over it

pub mod genx;
pub mod serializer;

pub use crate::qname::QName;
pub use genx::{check_text, scrub_text, Sequence, Status, Writer};
pub use serializer::Serializer;
