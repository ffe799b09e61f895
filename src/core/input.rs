//! Chunked Input
//!
//! Reads XML from any source implementing `Read`, reusing one fixed-size
//! buffer, and converts the bytes to text through an [`InputDecoder`].
//! In-memory buffers are decoded in a single pass without the chunk loop.

use super::encoding::InputDecoder;
use std::borrow::Cow;
use std::io::{self, Read};
use thiserror::Error;

/// Buffer size for reading chunks
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Failure while producing text from an input
#[derive(Error, Debug)]
pub enum SourceError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("{0}")]
    Encoding(String),
}

/// Chunk reader over a byte stream
pub struct ChunkReader<R: Read> {
    reader: R,
    buffer: Vec<u8>,
    eof: bool,
    partial: bool,
}

impl<R: Read> ChunkReader<R> {
    /// Create a new chunk reader
    pub fn new(reader: R) -> Self {
        Self::with_capacity(reader, DEFAULT_BUFFER_SIZE)
    }

    /// Create a new chunk reader with specified buffer capacity
    pub fn with_capacity(reader: R, capacity: usize) -> Self {
        ChunkReader {
            reader,
            buffer: vec![0u8; capacity.max(1)],
            eof: false,
            partial: false,
        }
    }

    /// In partial mode a chunk is returned after a single successful read
    /// instead of waiting for the buffer to fill
    pub fn set_partial(&mut self, partial: bool) {
        self.partial = partial;
    }

    /// Check if we've reached end of input
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Read the next chunk; an empty slice signals end of input
    pub fn read_chunk(&mut self) -> io::Result<&[u8]> {
        let mut filled = 0;
        while !self.eof && filled < self.buffer.len() {
            match self.reader.read(&mut self.buffer[filled..]) {
                Ok(0) => self.eof = true,
                Ok(n) => {
                    filled += n;
                    if self.partial {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        tracing::trace!(bytes = filled, "read input chunk");
        Ok(&self.buffer[..filled])
    }
}

enum Feed<'a> {
    Stream(ChunkReader<Box<dyn Read + 'a>>),
    Memory(Cow<'a, [u8]>),
    Done,
}

/// Text producer for one input
pub struct TextSource<'a> {
    feed: Feed<'a>,
    decoder: InputDecoder,
}

impl<'a> TextSource<'a> {
    pub fn from_reader(reader: Box<dyn Read + 'a>, decoder: InputDecoder, partial: bool) -> Self {
        let mut chunks = ChunkReader::new(reader);
        chunks.set_partial(partial);
        TextSource {
            feed: Feed::Stream(chunks),
            decoder,
        }
    }

    pub fn from_memory(bytes: impl Into<Cow<'a, [u8]>>, decoder: InputDecoder) -> Self {
        TextSource {
            feed: Feed::Memory(bytes.into()),
            decoder,
        }
    }

    /// Name of the detected encoding, once known
    pub fn encoding_name(&self) -> Option<&'static str> {
        self.decoder.encoding().map(|e| e.name())
    }

    /// Next piece of text, `None` once the input is exhausted.
    ///
    /// A returned string may be empty while the decoder is still sniffing
    /// the encoding.
    pub fn next_text(&mut self) -> Result<Option<String>, SourceError> {
        match &mut self.feed {
            Feed::Done => Ok(None),
            Feed::Memory(bytes) => {
                let text = self.decoder.decode(bytes.as_ref(), true).map_err(SourceError::Encoding)?;
                self.feed = Feed::Done;
                Ok(Some(text))
            }
            Feed::Stream(chunks) => {
                let chunk = chunks.read_chunk()?;
                let last = chunk.is_empty();
                let text = self.decoder.decode(chunk, last).map_err(SourceError::Encoding)?;
                if last {
                    self.feed = Feed::Done;
                }
                Ok(Some(text))
            }
        }
    }

    /// Read and decode everything that is left
    pub fn read_to_string(&mut self) -> Result<String, SourceError> {
        let mut out = String::new();
        while let Some(text) = self.next_text()? {
            out.push_str(&text);
        }
        Ok(out)
    }
}
