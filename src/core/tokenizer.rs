//! XML Tokenizer - Incremental state machine for XML token extraction
//!
//! The tokenizer owns a text buffer that is fed in chunks. `next_token`
//! returns the next complete token, or `Ok(None)` when the buffer ends in
//! the middle of a construct (more input is needed) or after `finish` once
//! the input is exhausted. Extracted tokens:
//! - Element start/end tags (with raw attributes)
//! - Text content (character and predefined references decoded)
//! - General entity references
//! - CDATA sections
//! - Comments
//! - Processing instructions and the XML/text declaration
//! - DOCTYPE declarations (with the parsed internal subset)
//!
//! Line ends are normalized to LF as text is fed, including CR LF pairs
//! split across chunks. Well-formedness constraints on the document
//! structure (tag nesting, single root element, misplaced declarations,
//! comment and PI syntax, duplicate attributes) are enforced here.

use super::attributes::{parse_attributes, RawAttribute};
use super::dtd::{find_doctype_end, parse_doctype, DocTypeDecl};
use super::entities::{parse_reference, Reference};
use super::scanner::Scanner;
use super::unicode::{find_invalid_char, is_all_whitespace};
use crate::error::SyntaxError;
use memchr::{memchr, memchr2, memchr_iter, memmem};

/// Consumed text is dropped from the buffer once this many bytes are dead
const COMPACT_THRESHOLD: usize = 4096;

/// What the token stream is expected to form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenizerMode {
    /// A document entity: prolog, exactly one root element, misc
    Document,
    /// Replacement text of an entity or an external parsed entity:
    /// any balanced content, optionally preceded by a text declaration
    Content,
}

/// Type of XML token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// XML declaration or text declaration: <?xml ...?>
    XmlDecl,
    /// DOCTYPE declaration
    DocType,
    /// Element start tag: <element>
    StartTag,
    /// Empty element: <element/>
    EmptyTag,
    /// Element end tag: </element>
    EndTag,
    /// Text content
    Text,
    /// Reference to a general entity other than the predefined ones
    EntityRef,
    /// CDATA section: <![CDATA[...]]>
    CData,
    /// Comment: <!--...-->
    Comment,
    /// Processing instruction: <?target ...?>
    Pi,
}

/// A parsed XML token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Tag name, PI target or entity name
    pub name: String,
    /// Text, CDATA, comment or PI data
    pub content: String,
    /// Start tag attributes or XML declaration pseudo-attributes
    pub attributes: Vec<RawAttribute>,
    pub doctype: Option<Box<DocTypeDecl>>,
    /// Position of the first character of the token (1-based)
    pub line: usize,
    pub column: usize,
}

impl Token {
    fn new(kind: TokenKind, line: usize, column: usize) -> Self {
        Token {
            kind,
            name: String::new(),
            content: String::new(),
            attributes: Vec::new(),
            doctype: None,
            line,
            column,
        }
    }

    fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }
}

/// Outcome of one scanning step
enum Step {
    Token(Token),
    /// Construct consumed without producing a token
    Skip,
    NeedMore,
}

/// Incremental XML tokenizer
pub struct Tokenizer {
    buf: String,
    pos: usize,
    mode: TokenizerMode,
    finished: bool,
    pending_cr: bool,
    line: usize,
    column: usize,
    /// Names of the open elements
    stack: Vec<String>,
    seen_root: bool,
    seen_doctype: bool,
    /// Nothing consumed yet (the XML declaration is only allowed here)
    at_start: bool,
}

impl Tokenizer {
    pub fn new(mode: TokenizerMode) -> Self {
        Tokenizer {
            buf: String::new(),
            pos: 0,
            mode,
            finished: false,
            pending_cr: false,
            line: 1,
            column: 1,
            stack: Vec::new(),
            seen_root: false,
            seen_doctype: false,
            at_start: true,
        }
    }

    /// Tokenizer over a complete text, already finished
    pub fn from_text(mode: TokenizerMode, text: &str) -> Self {
        let mut tokenizer = Tokenizer::new(mode);
        tokenizer.feed(text);
        tokenizer.finish();
        tokenizer
    }

    pub fn mode(&self) -> TokenizerMode {
        self.mode
    }

    /// Append text, normalizing CR LF and lone CR to LF
    pub fn feed(&mut self, text: &str) {
        if self.pos > COMPACT_THRESHOLD {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }
        self.buf.reserve(text.len());

        let mut rest = text;
        if self.pending_cr && !rest.is_empty() {
            rest = rest.strip_prefix('\n').unwrap_or(rest);
            self.pending_cr = false;
        }
        while let Some(i) = memchr(b'\r', rest.as_bytes()) {
            self.buf.push_str(&rest[..i]);
            self.buf.push('\n');
            rest = &rest[i + 1..];
            if rest.is_empty() {
                self.pending_cr = true;
            } else {
                rest = rest.strip_prefix('\n').unwrap_or(rest);
            }
        }
        self.buf.push_str(rest);
    }

    /// Mark the end of input
    pub fn finish(&mut self) {
        self.finished = true;
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// True once finished and every token has been returned
    pub fn is_exhausted(&self) -> bool {
        self.finished && self.pos >= self.buf.len()
    }

    /// Current line (1-based)
    pub fn line(&self) -> usize {
        self.line
    }

    /// Current column (1-based)
    pub fn column(&self) -> usize {
        self.column
    }

    /// Number of open elements
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Name of the innermost open element
    pub fn current_element(&self) -> Option<&str> {
        self.stack.last().map(String::as_str)
    }

    /// Get the next token. `Ok(None)` means more input is needed, or the
    /// end of input when the tokenizer is finished.
    pub fn next_token(&mut self) -> Result<Option<Token>, SyntaxError> {
        loop {
            if self.pos >= self.buf.len() {
                if self.finished {
                    self.check_end()?;
                }
                return Ok(None);
            }
            let step = if self.buf.as_bytes()[self.pos] == b'<' {
                self.markup()?
            } else {
                self.text()?
            };
            match step {
                Step::Token(token) => return Ok(Some(token)),
                Step::Skip => continue,
                Step::NeedMore => return Ok(None),
            }
        }
    }

    fn error(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError::new(message, self.line, self.column)
    }

    fn error_at(&self, message: impl Into<String>, line: usize, column: usize) -> SyntaxError {
        SyntaxError::new(message, line, column)
    }

    /// Advance to `new_pos`, keeping line and column current
    fn consume_to(&mut self, new_pos: usize) {
        let segment = &self.buf[self.pos..new_pos];
        let mut newlines = 0;
        let mut last_newline = None;
        for i in memchr_iter(b'\n', segment.as_bytes()) {
            newlines += 1;
            last_newline = Some(i);
        }
        match last_newline {
            Some(i) => {
                self.line += newlines;
                self.column = segment[i + 1..].chars().count() + 1;
            }
            None => self.column += segment.chars().count(),
        }
        self.pos = new_pos;
        self.at_start = false;
    }

    /// End of input: the open constructs must be closed
    fn check_end(&self) -> Result<(), SyntaxError> {
        if let Some(open) = self.stack.last() {
            return Err(self.error(format!("unclosed element '{}'", open)));
        }
        if self.mode == TokenizerMode::Document && !self.seen_root {
            return Err(self.error("no element found"));
        }
        Ok(())
    }

    /// Either wait for more input or fail if there is none
    fn incomplete(&self, what: &str) -> Result<Step, SyntaxError> {
        if self.finished {
            Err(self.error(format!("unclosed {}", what)))
        } else {
            Ok(Step::NeedMore)
        }
    }

    fn in_document_prolog_or_epilog(&self) -> bool {
        self.mode == TokenizerMode::Document && self.stack.is_empty()
    }

    fn text(&mut self) -> Result<Step, SyntaxError> {
        let (line, column) = (self.line, self.column);
        let mut content = String::new();
        let mut pos = self.pos;

        loop {
            let rest = &self.buf[pos..];
            let boundary = memchr2(b'<', b'&', rest.as_bytes());
            let raw = &rest[..boundary.unwrap_or(rest.len())];
            if let Some(i) = find_invalid_char(raw) {
                let message = format!("invalid character U+{:04X} in content", raw[i..].chars().next().map_or(0, |c| c as u32));
                return Err(self.error_at(message, line, column));
            }
            if memmem::find(raw.as_bytes(), b"]]>").is_some() {
                return Err(self.error_at("']]>' not allowed in content", line, column));
            }
            content.push_str(raw);
            pos += raw.len();

            let Some(i) = boundary else { break };
            if rest.as_bytes()[i] == b'<' {
                break;
            }
            match parse_reference(&self.buf[pos..]) {
                Err(message) => return Err(self.error(message)),
                Ok(None) => {
                    if self.finished {
                        return Err(self.error("unterminated reference"));
                    }
                    if pos == self.pos {
                        return Ok(Step::NeedMore);
                    }
                    break;
                }
                Ok(Some((Reference::Char(c), len))) => {
                    content.push(c);
                    pos += len;
                }
                Ok(Some((Reference::Named(name), len))) => {
                    if pos > self.pos {
                        break;
                    }
                    if self.in_document_prolog_or_epilog() {
                        return Err(self.error("entity reference outside the root element"));
                    }
                    let token = Token::new(TokenKind::EntityRef, line, column).with_name(name);
                    self.consume_to(pos + len);
                    return Ok(Step::Token(token));
                }
            }
        }

        if self.in_document_prolog_or_epilog() {
            if !is_all_whitespace(&content) {
                let message = if self.seen_root {
                    "junk after document element"
                } else {
                    "text before the root element"
                };
                return Err(self.error_at(message, line, column));
            }
            self.consume_to(pos);
            return Ok(Step::Skip);
        }

        self.consume_to(pos);
        Ok(Step::Token(Token::new(TokenKind::Text, line, column).with_content(content)))
    }

    fn markup(&mut self) -> Result<Step, SyntaxError> {
        let rest = &self.buf[self.pos..];
        let next = rest.as_bytes().get(1).copied();
        match next {
            None => self.incomplete("markup"),
            Some(b'/') => self.end_tag(),
            Some(b'?') => self.processing_instruction(),
            Some(b'!') => {
                if rest.starts_with("<!--") {
                    self.comment()
                } else if rest.starts_with("<![CDATA[") {
                    self.cdata()
                } else if rest.starts_with("<!DOCTYPE") {
                    self.doctype()
                } else if !self.finished
                    && ["<!--", "<![CDATA[", "<!DOCTYPE"].iter().any(|p| p.starts_with(rest))
                {
                    Ok(Step::NeedMore)
                } else {
                    Err(self.error("invalid markup declaration"))
                }
            }
            Some(_) => self.start_tag(),
        }
    }

    fn start_tag(&mut self) -> Result<Step, SyntaxError> {
        let (line, column) = (self.line, self.column);
        let Some(end) = Scanner::at(&self.buf, self.pos).find_tag_end_quoted() else {
            return self.incomplete("start tag");
        };
        let inner = &self.buf[self.pos + 1..end];
        let (inner, empty) = match inner.strip_suffix('/') {
            Some(stripped) => (stripped, true),
            None => (inner, false),
        };
        let mut scanner = Scanner::new(inner);
        let name = scanner
            .read_name()
            .ok_or_else(|| self.error("invalid element name"))?
            .to_string();
        let attributes = parse_attributes(scanner.remaining()).map_err(|m| self.error(m))?;
        for attribute in &attributes {
            if let Some(i) = find_invalid_char(&attribute.value) {
                let c = attribute.value[i..].chars().next().map_or(0, |c| c as u32);
                return Err(self.error(format!("invalid character U+{:04X} in attribute value", c)));
            }
        }

        if self.in_document_prolog_or_epilog() && self.seen_root {
            return Err(self.error("junk after document element"));
        }
        self.seen_root = true;

        let kind = if empty {
            TokenKind::EmptyTag
        } else {
            self.stack.push(name.clone());
            TokenKind::StartTag
        };
        let mut token = Token::new(kind, line, column).with_name(name);
        token.attributes = attributes;
        self.consume_to(end + 1);
        Ok(Step::Token(token))
    }

    fn end_tag(&mut self) -> Result<Step, SyntaxError> {
        let (line, column) = (self.line, self.column);
        let Some(end) = Scanner::at(&self.buf, self.pos).find_byte(b'>') else {
            return self.incomplete("end tag");
        };
        let mut scanner = Scanner::new(&self.buf[self.pos + 2..end]);
        let name = scanner
            .read_name()
            .ok_or_else(|| self.error("invalid end tag name"))?
            .to_string();
        scanner.skip_whitespace();
        if !scanner.is_eof() {
            return Err(self.error(format!("malformed end tag '{}'", name)));
        }
        match self.stack.last() {
            Some(open) if *open == name => {}
            Some(open) => {
                return Err(self.error(format!("mismatched tag: expected </{}>, found </{}>", open, name)))
            }
            None => return Err(self.error(format!("unexpected end tag </{}>", name))),
        }
        self.stack.pop();
        self.consume_to(end + 1);
        Ok(Step::Token(Token::new(TokenKind::EndTag, line, column).with_name(name)))
    }

    fn comment(&mut self) -> Result<Step, SyntaxError> {
        let (line, column) = (self.line, self.column);
        let start = self.pos + 4;
        let Some(end) = Scanner::at(&self.buf, start).find_seq(b"-->") else {
            return self.incomplete("comment");
        };
        let content = &self.buf[start..end];
        if content.contains("--") || content.ends_with('-') {
            return Err(self.error("'--' not allowed in comment"));
        }
        if find_invalid_char(content).is_some() {
            return Err(self.error("invalid character in comment"));
        }
        let token = Token::new(TokenKind::Comment, line, column).with_content(content);
        self.consume_to(end + 3);
        Ok(Step::Token(token))
    }

    fn cdata(&mut self) -> Result<Step, SyntaxError> {
        let (line, column) = (self.line, self.column);
        if self.in_document_prolog_or_epilog() {
            return Err(self.error("CDATA section outside the root element"));
        }
        let start = self.pos + 9;
        let Some(end) = Scanner::at(&self.buf, start).find_seq(b"]]>") else {
            return self.incomplete("CDATA section");
        };
        let content = &self.buf[start..end];
        if find_invalid_char(content).is_some() {
            return Err(self.error("invalid character in CDATA section"));
        }
        let token = Token::new(TokenKind::CData, line, column).with_content(content);
        self.consume_to(end + 3);
        Ok(Step::Token(token))
    }

    fn processing_instruction(&mut self) -> Result<Step, SyntaxError> {
        let (line, column) = (self.line, self.column);
        let start = self.pos + 2;
        let Some(end) = Scanner::at(&self.buf, start).find_seq(b"?>") else {
            return self.incomplete("processing instruction");
        };
        let body = &self.buf[start..end];
        let mut scanner = Scanner::new(body);
        let target = scanner
            .read_name()
            .ok_or_else(|| self.error("invalid processing instruction target"))?;
        let after_target = scanner.remaining();
        if !after_target.is_empty() && scanner.skip_whitespace() == 0 {
            return Err(self.error("missing whitespace after processing instruction target"));
        }

        if target == "xml" {
            if !self.at_start {
                return Err(self.error("XML declaration not at start of entity"));
            }
            let attributes = parse_attributes(after_target).map_err(|m| self.error(m))?;
            self.check_xml_decl(&attributes)?;
            let mut token = Token::new(TokenKind::XmlDecl, line, column).with_name(target);
            token.attributes = attributes;
            self.consume_to(end + 2);
            return Ok(Step::Token(token));
        }
        if target.eq_ignore_ascii_case("xml") {
            return Err(self.error(format!("reserved processing instruction target '{}'", target)));
        }
        let data = scanner.remaining();
        if find_invalid_char(data).is_some() {
            return Err(self.error("invalid character in processing instruction"));
        }
        let token = Token::new(TokenKind::Pi, line, column)
            .with_name(target)
            .with_content(data);
        self.consume_to(end + 2);
        Ok(Step::Token(token))
    }

    fn check_xml_decl(&self, attributes: &[RawAttribute]) -> Result<(), SyntaxError> {
        let mut names = attributes.iter().map(|a| a.name.as_str());
        let allowed: &[&str] = match self.mode {
            TokenizerMode::Document => {
                if names.next() != Some("version") {
                    return Err(self.error("XML declaration must start with version"));
                }
                &["encoding", "standalone"]
            }
            TokenizerMode::Content => &["version", "encoding"],
        };
        for name in names {
            if !allowed.contains(&name) {
                return Err(self.error(format!("unexpected '{}' in XML declaration", name)));
            }
        }
        for attribute in attributes {
            let ok = match attribute.name.as_str() {
                "version" => attribute.value.starts_with("1.") && attribute.value.len() > 2,
                "standalone" => matches!(attribute.value.as_str(), "yes" | "no"),
                "encoding" => attribute
                    .value
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_ascii_alphabetic()),
                _ => true,
            };
            if !ok {
                return Err(self.error(format!("invalid {} in XML declaration", attribute.name)));
            }
        }
        if self.mode == TokenizerMode::Content && !attributes.iter().any(|a| a.name == "encoding") {
            return Err(self.error("text declaration requires an encoding"));
        }
        Ok(())
    }

    fn doctype(&mut self) -> Result<Step, SyntaxError> {
        let (line, column) = (self.line, self.column);
        if self.mode != TokenizerMode::Document || self.seen_doctype || self.seen_root {
            return Err(self.error("misplaced DOCTYPE declaration"));
        }
        let Some(end) = find_doctype_end(&self.buf[self.pos..]) else {
            return self.incomplete("DOCTYPE declaration");
        };
        let end = self.pos + end;
        let decl = parse_doctype(&self.buf[self.pos..end]).map_err(|m| self.error(m))?;
        self.seen_doctype = true;
        let mut token = Token::new(TokenKind::DocType, line, column).with_name(decl.name.clone());
        token.doctype = Some(Box::new(decl));
        self.consume_to(end + 1);
        Ok(Step::Token(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenize(input: &str) -> Result<Vec<Token>, SyntaxError> {
        let mut tok = Tokenizer::from_text(TokenizerMode::Document, input);
        let mut tokens = Vec::new();
        while let Some(token) = tok.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn push(token: Token, tokens: &mut Vec<(TokenKind, String, String)>) {
        if token.kind == TokenKind::Text {
            if let Some(last) = tokens.last_mut() {
                if last.0 == TokenKind::Text {
                    last.2.push_str(&token.content);
                    return;
                }
            }
        }
        tokens.push((token.kind, token.name, token.content));
    }

    /// Feeds one character at a time and merges adjacent text tokens
    fn tokenize_trickled(input: &str) -> Result<Vec<(TokenKind, String, String)>, SyntaxError> {
        let mut tok = Tokenizer::new(TokenizerMode::Document);
        let mut tokens: Vec<(TokenKind, String, String)> = Vec::new();
        for c in input.chars() {
            tok.feed(c.encode_utf8(&mut [0; 4]));
            while let Some(token) = tok.next_token()? {
                push(token, &mut tokens);
            }
        }
        tok.finish();
        while let Some(token) = tok.next_token()? {
            push(token, &mut tokens);
        }
        Ok(tokens)
    }

    fn kinds(tokens: &[Token]) -> Vec<TokenKind> {
        tokens.iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_simple_element() {
        let tokens = tokenize("<root>content</root>").unwrap();
        assert_eq!(kinds(&tokens), vec![TokenKind::StartTag, TokenKind::Text, TokenKind::EndTag]);
        assert_eq!(tokens[0].name, "root");
        assert_eq!(tokens[1].content, "content");
        assert_eq!(tokens[2].name, "root");
    }

    #[test]
    fn test_empty_element_with_attributes() {
        let tokens = tokenize("<br a='1' b=\"x&amp;y\"/>").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::EmptyTag);
        assert_eq!(tokens[0].attributes.len(), 2);
        assert_eq!(tokens[0].attributes[1].value, "x&amp;y");
    }

    #[test]
    fn test_cdata_comment_pi() {
        let tokens = tokenize("<?xml version=\"1.0\"?><!-- c --><r><![CDATA[<script>]]><?app do it?></r>").unwrap();
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::XmlDecl,
                TokenKind::Comment,
                TokenKind::StartTag,
                TokenKind::CData,
                TokenKind::Pi,
                TokenKind::EndTag
            ]
        );
        assert_eq!(tokens[1].content, " c ");
        assert_eq!(tokens[3].content, "<script>");
        assert_eq!(tokens[4].name, "app");
        assert_eq!(tokens[4].content, "do it");
    }

    #[test]
    fn test_references_in_text() {
        let tokens = tokenize("<r>a&lt;b&#x41;&custom;c</r>").unwrap();
        assert_eq!(tokens[1].kind, TokenKind::Text);
        assert_eq!(tokens[1].content, "a<bA");
        assert_eq!(tokens[2].kind, TokenKind::EntityRef);
        assert_eq!(tokens[2].name, "custom");
        assert_eq!(tokens[3].content, "c");
    }

    #[test]
    fn test_line_end_normalization() {
        let tokens = tokenize("<r>a\r\nb\rc</r>").unwrap();
        assert_eq!(tokens[1].content, "a\nb\nc");

        let mut tok = Tokenizer::new(TokenizerMode::Document);
        tok.feed("<r>a\r");
        tok.feed("\nb</r>");
        tok.finish();
        let mut text = String::new();
        while let Some(token) = tok.next_token().unwrap() {
            if token.kind == TokenKind::Text {
                text.push_str(&token.content);
            }
        }
        assert_eq!(text, "a\nb");
    }

    #[test]
    fn test_positions() {
        let tokens = tokenize("<r>\n  <c/>\n</r>").unwrap();
        let child = tokens.iter().find(|t| t.kind == TokenKind::EmptyTag).unwrap();
        assert_eq!((child.line, child.column), (2, 3));
    }

    #[test]
    fn test_prolog_whitespace_and_doctype() {
        let tokens = tokenize("<!DOCTYPE r [<!ENTITY e 'x'>]>\n<r/>\n").unwrap();
        assert_eq!(kinds(&tokens), vec![TokenKind::DocType, TokenKind::EmptyTag]);
        let doctype = tokens[0].doctype.as_ref().unwrap();
        assert_eq!(doctype.name, "r");
        assert_eq!(doctype.items.len(), 1);
    }

    #[test]
    fn test_incremental_matches_whole() {
        let input = "<?xml version='1.0'?>\n<!DOCTYPE d>\n<d a='1'><!--x--><e>t&amp;u&ent;</e><![CDATA[c]]><?p q?></d>";
        let whole: Vec<(TokenKind, String, String)> = tokenize(input)
            .unwrap()
            .into_iter()
            .map(|t| (t.kind, t.name, t.content))
            .collect();
        assert_eq!(tokenize_trickled(input).unwrap(), whole);
    }

    #[test]
    fn test_need_more_input() {
        let mut tok = Tokenizer::new(TokenizerMode::Document);
        tok.feed("<root attr='va");
        assert_eq!(tok.next_token().unwrap(), None);
        tok.feed("lue'>");
        let token = tok.next_token().unwrap().unwrap();
        assert_eq!(token.attributes[0].value, "value");
        assert_eq!(tok.depth(), 1);
    }

    #[test]
    fn test_well_formedness_errors() {
        assert!(tokenize("<a></b>").is_err());
        assert!(tokenize("<a>").is_err());
        assert!(tokenize("").is_err());
        assert!(tokenize("<a/><b/>").is_err());
        assert!(tokenize("<a/>text").is_err());
        assert!(tokenize(" <?xml version='1.0'?><a/>").is_err());
        assert!(tokenize("<a><!-- a -- b --></a>").is_err());
        assert!(tokenize("<a><?XML x?></a>").is_err());
        assert!(tokenize("<a x='1' x='2'/>").is_err());
        assert!(tokenize("<a>]]></a>").is_err());
        assert!(tokenize("<a>&bad</a>").is_err());
        assert!(tokenize("<a/><!DOCTYPE a>").is_err());
        assert!(tokenize("<![CDATA[x]]><a/>").is_err());
    }

    #[test]
    fn test_error_location() {
        let err = tokenize("<a>\n<b></c></a>").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.column, 4);
        assert!(err.message.contains("mismatched tag"));
    }

    #[test]
    fn test_content_mode() {
        let mut tok = Tokenizer::from_text(TokenizerMode::Content, "text <b>bold</b> more");
        let mut kinds = Vec::new();
        while let Some(token) = tok.next_token().unwrap() {
            kinds.push(token.kind);
        }
        assert_eq!(
            kinds,
            vec![TokenKind::Text, TokenKind::StartTag, TokenKind::Text, TokenKind::EndTag, TokenKind::Text]
        );

        let mut tok = Tokenizer::from_text(TokenizerMode::Content, "<b>");
        assert!(tok.next_token().is_ok());
        assert!(tok.next_token().is_err());
    }

    #[test]
    fn test_compaction_keeps_positions() {
        let mut tok = Tokenizer::new(TokenizerMode::Document);
        tok.feed("<r>");
        let body = "x".repeat(5000);
        tok.feed(&body);
        let mut count = 0;
        while let Some(token) = tok.next_token().unwrap() {
            if token.kind == TokenKind::Text {
                count += token.content.len();
            }
        }
        tok.feed("</r>");
        tok.finish();
        while let Some(token) = tok.next_token().unwrap() {
            if token.kind == TokenKind::Text {
                count += token.content.len();
            }
        }
        assert_eq!(count, 5000);
        assert_eq!(tok.column(), 5008);
    }
}
