//! Core XML parsing primitives
//!
//! This module contains the fundamental building blocks shared by the event
//! engine and the pull parser:
//! - Scanner: SIMD-accelerated delimiter detection using memchr
//! - Tokenizer: incremental state machine for XML token extraction
//! - Entities: reference parsing and attribute value normalization
//! - Attributes: attribute list parsing
//! - Encoding: encoding detection and conversion to UTF-8
//! - Unicode: XML 1.0 character class validation
//! - DTD: DOCTYPE and subset declarations
//! - Namespace: scoped prefix bindings
//! - Input: chunked reading and decoding of byte streams

pub mod attributes;
pub mod dtd;
pub mod encoding;
pub mod entities;
pub mod input;
pub mod namespace;
pub mod scanner;
pub mod tokenizer;
pub mod unicode;
