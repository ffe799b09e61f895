//! Parser input
//!
//! An [`InputSource`] names where a document or external entity comes from:
//! a byte stream (encoding detected), a character stream (UTF-8 text, any
//! declared encoding ignored) or an in-memory buffer. The system and public
//! identifiers are used for diagnostics and entity resolution.

use crate::core::encoding::{EncodingRegistry, InputDecoder};
use crate::core::input::TextSource;
use encoding_rs::{Encoding, UTF_8};
use std::borrow::Cow;
use std::io::Read;

pub enum InputData<'a> {
    Bytes(Box<dyn Read + 'a>),
    Characters(Box<dyn Read + 'a>),
    Memory(Cow<'a, [u8]>),
    Text(Cow<'a, str>),
}

pub struct InputSource<'a> {
    data: InputData<'a>,
    system_id: Option<String>,
    public_id: Option<String>,
    encoding: Option<String>,
}

impl<'a> InputSource<'a> {
    fn with_data(data: InputData<'a>) -> Self {
        InputSource {
            data,
            system_id: None,
            public_id: None,
            encoding: None,
        }
    }

    /// Byte stream; the encoding is detected from the content
    pub fn from_reader(reader: impl Read + 'a) -> Self {
        Self::with_data(InputData::Bytes(Box::new(reader)))
    }

    /// Stream of UTF-8 encoded characters
    pub fn from_characters(reader: impl Read + 'a) -> Self {
        Self::with_data(InputData::Characters(Box::new(reader)))
    }

    /// In-memory bytes, decoded in one pass
    pub fn from_memory(bytes: impl Into<Cow<'a, [u8]>>) -> Self {
        Self::with_data(InputData::Memory(bytes.into()))
    }

    /// In-memory text
    pub fn from_text(text: impl Into<Cow<'a, str>>) -> Self {
        Self::with_data(InputData::Text(text.into()))
    }

    pub fn with_system_id(mut self, system_id: impl Into<String>) -> Self {
        self.system_id = Some(system_id.into());
        self
    }

    pub fn with_public_id(mut self, public_id: impl Into<String>) -> Self {
        self.public_id = Some(public_id.into());
        self
    }

    /// Force an encoding, overriding detection and declaration
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    pub fn system_id(&self) -> Option<&str> {
        self.system_id.as_deref()
    }

    pub fn public_id(&self) -> Option<&str> {
        self.public_id.as_deref()
    }

    pub fn encoding(&self) -> Option<&str> {
        self.encoding.as_deref()
    }

    pub fn is_character_stream(&self) -> bool {
        matches!(self.data, InputData::Characters(_) | InputData::Text(_))
    }

    /// Split into a text producer and the identifiers.
    ///
    /// `fallback` is the encoding used when a byte input declares none.
    pub(crate) fn open(
        self,
        registry: &EncodingRegistry,
        fallback: Option<&'static Encoding>,
        partial: bool,
    ) -> Result<(TextSource<'a>, Option<String>, Option<String>), String> {
        let forced = match &self.encoding {
            Some(name) => Some(
                registry
                    .lookup(name)
                    .ok_or_else(|| format!("unknown encoding '{}'", name))?,
            ),
            None => None,
        };
        let decoder = InputDecoder::new(registry.clone()).with_fallback(fallback);
        let source = match self.data {
            InputData::Bytes(reader) => TextSource::from_reader(reader, decoder.with_forced(forced), partial),
            InputData::Characters(reader) => {
                TextSource::from_reader(reader, decoder.with_forced(Some(UTF_8)), partial)
            }
            InputData::Memory(bytes) => TextSource::from_memory(bytes, decoder.with_forced(forced)),
            InputData::Text(text) => {
                let bytes = match text {
                    Cow::Borrowed(s) => Cow::Borrowed(s.as_bytes()),
                    Cow::Owned(s) => Cow::Owned(s.into_bytes()),
                };
                TextSource::from_memory(bytes, decoder.with_forced(Some(UTF_8)))
            }
        };
        Ok((source, self.system_id, self.public_id))
    }
}

impl std::fmt::Debug for InputSource<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.data {
            InputData::Bytes(_) => "bytes",
            InputData::Characters(_) => "characters",
            InputData::Memory(_) => "memory",
            InputData::Text(_) => "text",
        };
        f.debug_struct("InputSource")
            .field("kind", &kind)
            .field("system_id", &self.system_id)
            .field("public_id", &self.public_id)
            .field("encoding", &self.encoding)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_text() {
        let source = InputSource::from_text("<a/>").with_system_id("mem.xml");
        assert!(source.is_character_stream());
        let (mut text, system_id, _) = source.open(&EncodingRegistry::new(), None, false).unwrap();
        assert_eq!(system_id.as_deref(), Some("mem.xml"));
        assert_eq!(text.read_to_string().unwrap(), "<a/>");
    }

    #[test]
    fn test_forced_encoding() {
        let bytes: &[u8] = b"<a>\xE9</a>";
        let source = InputSource::from_memory(bytes).with_encoding("latin1");
        let (mut text, _, _) = source.open(&EncodingRegistry::new(), None, false).unwrap();
        assert_eq!(text.read_to_string().unwrap(), "<a>\u{e9}</a>");

        let source = InputSource::from_memory(bytes).with_encoding("nonsense");
        assert!(source.open(&EncodingRegistry::new(), None, false).is_err());
    }
}
