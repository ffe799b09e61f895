//! XML Encoding Detection and Conversion
//!
//! Detects the input encoding from the byte order mark, the UTF-16 byte
//! pattern of `<?`, or the `encoding` pseudo-attribute of the XML
//! declaration, and converts the input to UTF-8 text with `encoding_rs`.
//!
//! Custom encoding tables registered with [`EncodingRegistry::add_encoding`]
//! are consulted before the standard label lookup.

use super::attributes::{find, parse_attributes};
use encoding_rs::{Decoder, DecoderResult, Encoding, UTF_16BE, UTF_16LE, UTF_8};
use std::collections::HashMap;

/// Bytes inspected before an encoding is chosen
const SNIFF_LIMIT: usize = 1024;

/// Encoding detected from the first bytes of the input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlEncoding {
    Utf8,
    Utf16Le,
    Utf16Be,
    /// No BOM and no UTF-16 pattern: an ASCII-compatible encoding
    AsciiCompatible,
}

impl XmlEncoding {
    /// Detect encoding from byte order mark or initial bytes
    pub fn detect(input: &[u8]) -> Self {
        match input {
            [0xEF, 0xBB, 0xBF, ..] => XmlEncoding::Utf8,
            [0xFF, 0xFE, ..] => XmlEncoding::Utf16Le,
            [0xFE, 0xFF, ..] => XmlEncoding::Utf16Be,
            [b'<', 0x00, b'?', 0x00, ..] => XmlEncoding::Utf16Le,
            [0x00, b'<', 0x00, b'?', ..] => XmlEncoding::Utf16Be,
            _ => XmlEncoding::AsciiCompatible,
        }
    }
}

/// Name to encoding table
#[derive(Debug, Clone, Default)]
pub struct EncodingRegistry {
    custom: HashMap<String, &'static Encoding>,
}

impl EncodingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `encoding` under `name` (matched case-insensitively)
    pub fn add_encoding(&mut self, name: &str, encoding: &'static Encoding) {
        self.custom.insert(name.to_ascii_uppercase(), encoding);
    }

    /// Resolve an encoding name: custom tables first, then the standard labels
    pub fn lookup(&self, name: &str) -> Option<&'static Encoding> {
        self.custom
            .get(&name.to_ascii_uppercase())
            .copied()
            .or_else(|| Encoding::for_label(name.trim().as_bytes()))
    }
}

/// Incremental byte to text converter for one input
pub struct InputDecoder {
    registry: EncodingRegistry,
    /// Encoding forced by the caller (overrides the declaration)
    forced: Option<&'static Encoding>,
    /// Encoding used when the document declares none
    fallback: Option<&'static Encoding>,
    decoder: Option<Decoder>,
    encoding: Option<&'static Encoding>,
    pending: Vec<u8>,
}

impl InputDecoder {
    pub fn new(registry: EncodingRegistry) -> Self {
        InputDecoder {
            registry,
            forced: None,
            fallback: None,
            decoder: None,
            encoding: None,
            pending: Vec::new(),
        }
    }

    pub fn with_forced(mut self, encoding: Option<&'static Encoding>) -> Self {
        self.forced = encoding;
        self
    }

    pub fn with_fallback(mut self, encoding: Option<&'static Encoding>) -> Self {
        self.fallback = encoding;
        self
    }

    /// Encoding in use, once detected
    pub fn encoding(&self) -> Option<&'static Encoding> {
        self.encoding
    }

    /// Convert the next chunk of bytes. `last` marks the end of the input.
    ///
    /// Until enough bytes are seen to choose an encoding the chunk is held
    /// back and an empty string is returned.
    pub fn decode(&mut self, bytes: &[u8], last: bool) -> Result<String, String> {
        if self.decoder.is_none() {
            self.pending.extend_from_slice(bytes);
            if !last && !self.ready_to_sniff() {
                return Ok(String::new());
            }
            let encoding = self.choose_encoding()?;
            tracing::debug!(encoding = encoding.name(), "input encoding selected");
            self.encoding = Some(encoding);
            self.decoder = Some(encoding.new_decoder());
            let pending = std::mem::take(&mut self.pending);
            return self.convert(&pending, last);
        }
        self.convert(bytes, last)
    }

    fn ready_to_sniff(&self) -> bool {
        let head = &self.pending;
        if head.len() < 4 {
            return false;
        }
        if XmlEncoding::detect(head) != XmlEncoding::AsciiCompatible || !head.starts_with(b"<?xml") {
            return true;
        }
        head.len() >= SNIFF_LIMIT || memchr::memmem::find(head, b"?>").is_some()
    }

    fn choose_encoding(&self) -> Result<&'static Encoding, String> {
        if let Some(forced) = self.forced {
            return Ok(forced);
        }
        match XmlEncoding::detect(&self.pending) {
            XmlEncoding::Utf8 => Ok(UTF_8),
            XmlEncoding::Utf16Le => Ok(UTF_16LE),
            XmlEncoding::Utf16Be => Ok(UTF_16BE),
            XmlEncoding::AsciiCompatible => match declared_encoding(&self.pending) {
                Some(name) => {
                    let encoding = self
                        .registry
                        .lookup(&name)
                        .ok_or_else(|| format!("unknown encoding '{}'", name))?;
                    // A UTF-16 declaration read through an ASCII-compatible
                    // byte pattern can only be UTF-8 text
                    if encoding == UTF_16LE || encoding == UTF_16BE {
                        Ok(UTF_8)
                    } else {
                        Ok(encoding)
                    }
                }
                None => Ok(self.fallback.unwrap_or(UTF_8)),
            },
        }
    }

    fn convert(&mut self, mut src: &[u8], last: bool) -> Result<String, String> {
        let Some(decoder) = self.decoder.as_mut() else {
            return Ok(String::new());
        };
        let capacity = decoder
            .max_utf8_buffer_length_without_replacement(src.len())
            .unwrap_or(src.len() * 3 + 16);
        let mut out = String::with_capacity(capacity);
        loop {
            let (result, read) = decoder.decode_to_string_without_replacement(src, &mut out, last);
            src = &src[read..];
            match result {
                DecoderResult::InputEmpty => return Ok(out),
                DecoderResult::OutputFull => {
                    let more = decoder
                        .max_utf8_buffer_length_without_replacement(src.len())
                        .unwrap_or(src.len() * 3 + 16);
                    out.reserve(more.max(16));
                }
                DecoderResult::Malformed(_, _) => {
                    let name = self.encoding.map_or("unknown", |e| e.name());
                    return Err(format!("malformed input for encoding {}", name));
                }
            }
        }
    }
}

/// The `encoding` pseudo-attribute of a leading XML declaration
fn declared_encoding(head: &[u8]) -> Option<String> {
    let end = memchr::memmem::find(head, b"?>")?;
    let decl = std::str::from_utf8(head.get(5..end)?).ok()?;
    let attrs = parse_attributes(decl).ok()?;
    find(&attrs, "encoding").map(str::to_string)
}
