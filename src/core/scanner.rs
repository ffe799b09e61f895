//! SIMD-accelerated XML scanning using memchr
//!
//! The scanner walks a `&str` buffer by byte offset. Every delimiter it
//! searches for is ASCII, so the offsets it produces always fall on
//! character boundaries.

use super::unicode::{is_name_char, is_name_start_char};
use memchr::{memchr, memchr2, memmem};

/// Scanner for XML delimiter detection
pub struct Scanner<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    /// Create a new scanner for the given input
    #[inline]
    pub fn new(input: &'a str) -> Self {
        Scanner { input, pos: 0 }
    }

    /// Create a scanner starting at `pos`
    #[inline]
    pub fn at(input: &'a str, pos: usize) -> Self {
        Scanner { input, pos }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos;
    }

    #[inline]
    pub fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    /// Remaining input from the current position
    #[inline]
    pub fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    #[inline]
    pub fn slice(&self, start: usize, end: usize) -> &'a str {
        &self.input[start..end]
    }

    /// Peek at current byte without advancing
    #[inline]
    pub fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    /// Peek at byte at offset from current position
    #[inline]
    pub fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.as_bytes().get(self.pos + offset).copied()
    }

    #[inline]
    pub fn advance(&mut self, n: usize) {
        self.pos += n;
    }

    /// Skip whitespace characters (space, tab, newline, carriage return)
    #[inline]
    pub fn skip_whitespace(&mut self) -> usize {
        let start = self.pos;
        let bytes = self.input.as_bytes();
        while self.pos < bytes.len() {
            match bytes[self.pos] {
                b' ' | b'\t' | b'\n' | b'\r' => self.pos += 1,
                _ => break,
            }
        }
        self.pos - start
    }

    /// Find next occurrence of a specific byte
    #[inline]
    pub fn find_byte(&self, byte: u8) -> Option<usize> {
        memchr(byte, &self.input.as_bytes()[self.pos..]).map(|i| self.pos + i)
    }

    /// Find next '<' or '&' (text content boundaries)
    #[inline]
    pub fn find_text_boundary(&self) -> Option<usize> {
        memchr2(b'<', b'&', &self.input.as_bytes()[self.pos..]).map(|i| self.pos + i)
    }

    /// Find a multi-byte terminator such as `-->` or `]]>`
    #[inline]
    pub fn find_seq(&self, needle: &[u8]) -> Option<usize> {
        memmem::find(&self.input.as_bytes()[self.pos..], needle).map(|i| self.pos + i)
    }

    /// Find tag end while handling quotes properly
    /// Returns the position of '>' that is not inside quotes
    pub fn find_tag_end_quoted(&self) -> Option<usize> {
        let bytes = self.input.as_bytes();
        let mut pos = self.pos;
        let mut quote: Option<u8> = None;

        while pos < bytes.len() {
            match (bytes[pos], quote) {
                (b'"', None) => quote = Some(b'"'),
                (b'\'', None) => quote = Some(b'\''),
                (q, Some(open)) if q == open => quote = None,
                (b'>', None) => return Some(pos),
                _ => {}
            }
            pos += 1;
        }
        None
    }

    /// Check if input starts with a byte sequence at current position
    #[inline]
    pub fn starts_with(&self, needle: &str) -> bool {
        self.input[self.pos..].starts_with(needle)
    }

    /// Read an XML name, advancing past it
    pub fn read_name(&mut self) -> Option<&'a str> {
        let start = self.pos;
        let mut chars = self.input[start..].char_indices();
        match chars.next() {
            Some((_, c)) if is_name_start_char(c) => {}
            _ => return None,
        }
        let mut end = self.input.len();
        for (i, c) in chars {
            if !is_name_char(c) {
                end = start + i;
                break;
            }
        }
        self.pos = end;
        Some(&self.input[start..end])
    }

    /// Read a quoted literal (`"..."` or `'...'`), returning its content
    pub fn read_quoted(&mut self) -> Option<&'a str> {
        let quote = self.peek()?;
        if quote != b'"' && quote != b'\'' {
            return None;
        }
        let start = self.pos + 1;
        let end = memchr(quote, &self.input.as_bytes()[start..])? + start;
        self.pos = end + 1;
        Some(&self.input[start..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_text_boundary() {
        let scanner = Scanner::new("hello &amp; <world>");
        assert_eq!(scanner.find_text_boundary(), Some(6));
    }

    #[test]
    fn test_find_tag_end_quoted() {
        let scanner = Scanner::new("<a attr=\">test\">content");
        assert_eq!(scanner.find_tag_end_quoted(), Some(15));
        let scanner = Scanner::new("<a b='\">'>");
        assert_eq!(scanner.find_tag_end_quoted(), Some(9));
    }

    #[test]
    fn test_read_name() {
        let mut scanner = Scanner::new("element-name>");
        assert_eq!(scanner.read_name(), Some("element-name"));
        assert_eq!(scanner.position(), 12);

        let mut scanner = Scanner::new("9bad");
        assert_eq!(scanner.read_name(), None);
        assert_eq!(scanner.position(), 0);
    }

    #[test]
    fn test_read_name_to_end() {
        let mut scanner = Scanner::new("p:local");
        assert_eq!(scanner.read_name(), Some("p:local"));
        assert!(scanner.is_eof());
    }

    #[test]
    fn test_find_seq() {
        let scanner = Scanner::new("<!-- a - b -->");
        assert_eq!(scanner.find_seq(b"-->"), Some(11));
    }

    #[test]
    fn test_read_quoted() {
        let mut scanner = Scanner::new("'one' rest");
        assert_eq!(scanner.read_quoted(), Some("one"));
        assert_eq!(scanner.skip_whitespace(), 1);
        assert_eq!(scanner.remaining(), "rest");
    }
}
