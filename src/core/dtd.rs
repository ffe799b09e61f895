//! DTD Declarations
//!
//! Parses the DOCTYPE declaration, the internal subset and external subsets
//! into a list of [`DtdItem`]s, and collects them into a declaration store
//! used for entity expansion and attribute defaulting. Declarations are not
//! validated against the document.

use super::entities::expand_char_refs;
use super::scanner::Scanner;
use std::collections::HashMap;

/// A parsed `<!DOCTYPE ...>` declaration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocTypeDecl {
    pub name: String,
    pub public_id: Option<String>,
    pub system_id: Option<String>,
    /// Raw text between `[` and `]`
    pub internal_subset: Option<String>,
    /// Declarations of the internal subset, in document order
    pub items: Vec<DtdItem>,
}

/// One markup declaration of a DTD subset
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DtdItem {
    Entity { parameter: bool, decl: EntityDecl },
    Notation(NotationDecl),
    AttList { element: String, defs: Vec<AttDef> },
    Element { name: String, model: String },
    /// `%name;` between declarations
    PeReference(String),
    Comment(String),
    Pi { target: String, data: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDecl {
    pub name: String,
    pub value: EntityValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityValue {
    /// Replacement text, with character references already expanded
    Internal(String),
    External {
        public_id: Option<String>,
        system_id: String,
        /// `NDATA` notation for unparsed entities
        notation: Option<String>,
    },
}

impl EntityDecl {
    pub fn is_unparsed(&self) -> bool {
        matches!(&self.value, EntityValue::External { notation: Some(_), .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotationDecl {
    pub name: String,
    pub public_id: Option<String>,
    pub system_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttDef {
    pub name: String,
    pub att_type: AttType,
    pub default: AttDefault,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttType {
    CData,
    Id,
    IdRef,
    IdRefs,
    Entity,
    Entities,
    NmToken,
    NmTokens,
    Notation(Vec<String>),
    Enumeration(Vec<String>),
}

impl AttType {
    /// Declared type as reported to declaration handlers
    pub fn as_declared(&self) -> String {
        match self {
            AttType::CData => "CDATA".into(),
            AttType::Id => "ID".into(),
            AttType::IdRef => "IDREF".into(),
            AttType::IdRefs => "IDREFS".into(),
            AttType::Entity => "ENTITY".into(),
            AttType::Entities => "ENTITIES".into(),
            AttType::NmToken => "NMTOKEN".into(),
            AttType::NmTokens => "NMTOKENS".into(),
            AttType::Notation(names) => format!("NOTATION ({})", names.join("|")),
            AttType::Enumeration(names) => format!("({})", names.join("|")),
        }
    }

    /// Type name used in SAX attribute lists (enumerations report NMTOKEN)
    pub fn sax_name(&self) -> &'static str {
        match self {
            AttType::CData => "CDATA",
            AttType::Id => "ID",
            AttType::IdRef => "IDREF",
            AttType::IdRefs => "IDREFS",
            AttType::Entity => "ENTITY",
            AttType::Entities => "ENTITIES",
            AttType::NmToken | AttType::Enumeration(_) => "NMTOKEN",
            AttType::NmTokens => "NMTOKENS",
            AttType::Notation(_) => "NOTATION",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttDefault {
    Required,
    Implied,
    Fixed(String),
    Default(String),
}

impl AttDefault {
    /// Default mode keyword, if any
    pub fn mode(&self) -> Option<&'static str> {
        match self {
            AttDefault::Required => Some("#REQUIRED"),
            AttDefault::Implied => Some("#IMPLIED"),
            AttDefault::Fixed(_) => Some("#FIXED"),
            AttDefault::Default(_) => None,
        }
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            AttDefault::Fixed(v) | AttDefault::Default(v) => Some(v),
            _ => None,
        }
    }
}

/// General and parameter entity declarations. The first declaration of a
/// name is binding; later ones are ignored.
#[derive(Debug, Clone, Default)]
pub struct EntityTable {
    general: HashMap<String, EntityDecl>,
    parameter: HashMap<String, EntityDecl>,
}

impl EntityTable {
    /// Returns false if the name was already declared
    pub fn declare_general(&mut self, decl: EntityDecl) -> bool {
        if self.general.contains_key(&decl.name) {
            return false;
        }
        self.general.insert(decl.name.clone(), decl);
        true
    }

    pub fn declare_parameter(&mut self, decl: EntityDecl) -> bool {
        if self.parameter.contains_key(&decl.name) {
            return false;
        }
        self.parameter.insert(decl.name.clone(), decl);
        true
    }

    pub fn general(&self, name: &str) -> Option<&EntityDecl> {
        self.general.get(name)
    }

    /// Entry lookup that also hands out the stored key
    pub fn general_entry(&self, name: &str) -> Option<(&str, &EntityDecl)> {
        self.general.get_key_value(name).map(|(k, v)| (k.as_str(), v))
    }

    pub fn parameter(&self, name: &str) -> Option<&EntityDecl> {
        self.parameter.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.general.is_empty() && self.parameter.is_empty()
    }
}

/// Collected DTD declarations
#[derive(Debug, Clone, Default)]
pub struct DtdDeclarations {
    pub entities: EntityTable,
    /// Attribute lists: element name -> attribute definitions
    pub attlists: HashMap<String, Vec<AttDef>>,
    pub notations: HashMap<String, NotationDecl>,
    /// Set when some declarations could not be read (external subset or
    /// parameter entity not processed); undeclared entities are then
    /// skipped instead of rejected.
    pub incomplete: bool,
}

impl DtdDeclarations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a declaration. Returns false if it was a redeclaration that
    /// has no effect.
    pub fn add(&mut self, item: &DtdItem) -> bool {
        match item {
            DtdItem::Entity { parameter: false, decl } => self.entities.declare_general(decl.clone()),
            DtdItem::Entity { parameter: true, decl } => self.entities.declare_parameter(decl.clone()),
            DtdItem::Notation(decl) => {
                if self.notations.contains_key(&decl.name) {
                    return false;
                }
                self.notations.insert(decl.name.clone(), decl.clone());
                true
            }
            DtdItem::AttList { element, defs } => {
                let list = self.attlists.entry(element.clone()).or_default();
                let mut added = false;
                for def in defs {
                    // First definition of an attribute is binding
                    if !list.iter().any(|d| d.name == def.name) {
                        list.push(def.clone());
                        added = true;
                    }
                }
                added
            }
            _ => true,
        }
    }

    /// Attribute definitions for `element`
    pub fn attributes_of(&self, element: &str) -> &[AttDef] {
        self.attlists.get(element).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Find the `>` closing a DOCTYPE declaration.
///
/// `input` starts at `<!DOCTYPE`. Quotes, the bracketed internal subset,
/// comments and processing instructions inside it are skipped. Returns
/// `None` if the declaration is not complete yet.
pub fn find_doctype_end(input: &str) -> Option<usize> {
    let mut scanner = Scanner::at(input, "<!DOCTYPE".len().min(input.len()));
    let mut in_subset = false;
    loop {
        match scanner.peek()? {
            b'"' | b'\'' => {
                scanner.read_quoted()?;
            }
            b'[' if !in_subset => {
                in_subset = true;
                scanner.advance(1);
            }
            b']' if in_subset => {
                in_subset = false;
                scanner.advance(1);
            }
            b'<' if in_subset && scanner.starts_with("<!--") => {
                let end = scanner.find_seq(b"-->")?;
                scanner.set_position(end + 3);
            }
            b'<' if in_subset && scanner.starts_with("<?") => {
                let end = scanner.find_seq(b"?>")?;
                scanner.set_position(end + 2);
            }
            b'>' if !in_subset => return Some(scanner.position()),
            _ => scanner.advance(1),
        }
    }
}

/// Parse the body of a DOCTYPE declaration (`input` is everything from
/// `<!DOCTYPE` to, but excluding, the closing `>`).
pub fn parse_doctype(input: &str) -> Result<DocTypeDecl, String> {
    let body = input
        .strip_prefix("<!DOCTYPE")
        .ok_or_else(|| "malformed DOCTYPE declaration".to_string())?;
    let mut scanner = Scanner::new(body);
    if scanner.skip_whitespace() == 0 {
        return Err("missing whitespace after DOCTYPE".to_string());
    }
    let name = scanner
        .read_name()
        .ok_or_else(|| "invalid DOCTYPE name".to_string())?
        .to_string();
    scanner.skip_whitespace();
    let (public_id, system_id) = read_external_id(&mut scanner, false)?;
    scanner.skip_whitespace();

    let mut decl = DocTypeDecl {
        name,
        public_id,
        system_id,
        ..Default::default()
    };

    if scanner.peek() == Some(b'[') {
        let start = scanner.position() + 1;
        let end = body
            .rfind(']')
            .filter(|&end| end >= start)
            .ok_or_else(|| "unterminated internal subset".to_string())?;
        let subset = &body[start..end];
        decl.items = parse_subset(subset)?;
        decl.internal_subset = Some(subset.to_string());
        scanner.set_position(end + 1);
        scanner.skip_whitespace();
    }
    if !scanner.is_eof() {
        return Err("unexpected content in DOCTYPE declaration".to_string());
    }
    Ok(decl)
}

/// Parse a sequence of markup declarations (internal or external subset)
pub fn parse_subset(input: &str) -> Result<Vec<DtdItem>, String> {
    let mut items = Vec::new();
    parse_subset_into(input, &mut items)?;
    Ok(items)
}

fn parse_subset_into(input: &str, items: &mut Vec<DtdItem>) -> Result<(), String> {
    let mut scanner = Scanner::new(input);
    loop {
        scanner.skip_whitespace();
        if scanner.is_eof() {
            return Ok(());
        }
        if scanner.starts_with("<?xml") && scanner.position() == 0 {
            // Text declaration of an external subset
            let end = scanner.find_seq(b"?>").ok_or("unterminated text declaration")?;
            scanner.set_position(end + 2);
        } else if scanner.starts_with("<!--") {
            let start = scanner.position() + 4;
            let end = scanner.find_seq(b"-->").ok_or("unterminated comment")?;
            items.push(DtdItem::Comment(input[start..end].to_string()));
            scanner.set_position(end + 3);
        } else if scanner.starts_with("<?") {
            let start = scanner.position() + 2;
            let end = scanner.find_seq(b"?>").ok_or("unterminated processing instruction")?;
            let (target, data) = split_pi(&input[start..end]);
            items.push(DtdItem::Pi { target, data });
            scanner.set_position(end + 2);
        } else if scanner.starts_with("<![") {
            let end = conditional_section_end(&input[scanner.position()..])
                .ok_or("unterminated conditional section")?
                + scanner.position();
            let section = &input[scanner.position() + 3..end];
            let section = section.trim_start();
            if let Some(rest) = section.strip_prefix("INCLUDE") {
                let body = rest.trim_start().strip_prefix('[').ok_or("malformed conditional section")?;
                parse_subset_into(body, items)?;
            } else if !section.starts_with("IGNORE") {
                return Err("malformed conditional section".to_string());
            }
            scanner.set_position(end + 3);
        } else if scanner.peek() == Some(b'%') {
            scanner.advance(1);
            let name = scanner.read_name().ok_or("malformed parameter entity reference")?;
            if scanner.peek() != Some(b';') {
                return Err("malformed parameter entity reference".to_string());
            }
            scanner.advance(1);
            items.push(DtdItem::PeReference(name.to_string()));
        } else if scanner.starts_with("<!") {
            let start = scanner.position();
            let end = scanner
                .find_tag_end_quoted()
                .ok_or("unterminated markup declaration")?;
            items.push(parse_markup_decl(&input[start + 2..end])?);
            scanner.set_position(end + 1);
        } else {
            return Err("syntax error in DTD".to_string());
        }
    }
}

/// End of a `<![ ... ]]>` section (position of the final `]]>`), honoring
/// nested sections
fn conditional_section_end(input: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut pos = 0;
    while pos < input.len() {
        let rest = &input[pos..];
        if rest.starts_with("<![") {
            depth += 1;
            pos += 3;
        } else if rest.starts_with("]]>") {
            depth = depth.checked_sub(1)?;
            if depth == 0 {
                return Some(pos);
            }
            pos += 3;
        } else {
            pos += rest.chars().next().map_or(1, char::len_utf8);
        }
    }
    None
}

fn parse_markup_decl(decl: &str) -> Result<DtdItem, String> {
    let mut scanner = Scanner::new(decl);
    let keyword = scanner.read_name().ok_or("malformed markup declaration")?;
    if scanner.skip_whitespace() == 0 {
        return Err(format!("missing whitespace after {}", keyword));
    }
    match keyword {
        "ENTITY" => parse_entity_decl(&mut scanner),
        "NOTATION" => parse_notation_decl(&mut scanner),
        "ATTLIST" => parse_attlist_decl(&mut scanner),
        "ELEMENT" => {
            let name = scanner.read_name().ok_or("invalid element type name")?;
            let model = scanner.remaining().trim();
            if model.is_empty() {
                return Err(format!("missing content model for element '{}'", name));
            }
            Ok(DtdItem::Element {
                name: name.to_string(),
                model: model.to_string(),
            })
        }
        other => Err(format!("unknown markup declaration '{}'", other)),
    }
}

fn parse_entity_decl(scanner: &mut Scanner<'_>) -> Result<DtdItem, String> {
    let parameter = scanner.peek() == Some(b'%');
    if parameter {
        scanner.advance(1);
        if scanner.skip_whitespace() == 0 {
            return Err("missing whitespace after '%'".to_string());
        }
    }
    let name = scanner.read_name().ok_or("invalid entity name")?.to_string();
    if name.contains(':') {
        return Err(format!("colon in entity name '{}'", name));
    }
    scanner.skip_whitespace();

    let value = if matches!(scanner.peek(), Some(b'"') | Some(b'\'')) {
        let literal = scanner.read_quoted().ok_or("unterminated entity value")?;
        EntityValue::Internal(expand_char_refs(literal).map_err(str::to_string)?.into_owned())
    } else {
        let (public_id, system_id) = read_external_id(scanner, false)?;
        let system_id = system_id.ok_or("missing system identifier")?;
        let ws = scanner.skip_whitespace();
        let notation = if scanner.starts_with("NDATA") {
            if parameter {
                return Err("NDATA on parameter entity".to_string());
            }
            if ws == 0 {
                return Err("missing whitespace before NDATA".to_string());
            }
            scanner.advance(5);
            scanner.skip_whitespace();
            Some(scanner.read_name().ok_or("invalid notation name")?.to_string())
        } else {
            None
        };
        EntityValue::External {
            public_id,
            system_id,
            notation,
        }
    };
    scanner.skip_whitespace();
    if !scanner.is_eof() {
        return Err(format!("unexpected content in declaration of entity '{}'", name));
    }
    Ok(DtdItem::Entity {
        parameter,
        decl: EntityDecl { name, value },
    })
}

fn parse_notation_decl(scanner: &mut Scanner<'_>) -> Result<DtdItem, String> {
    let name = scanner.read_name().ok_or("invalid notation name")?.to_string();
    scanner.skip_whitespace();
    let (public_id, system_id) = read_external_id(scanner, true)?;
    if public_id.is_none() && system_id.is_none() {
        return Err(format!("missing identifier for notation '{}'", name));
    }
    scanner.skip_whitespace();
    if !scanner.is_eof() {
        return Err(format!("unexpected content in declaration of notation '{}'", name));
    }
    Ok(DtdItem::Notation(NotationDecl {
        name,
        public_id,
        system_id,
    }))
}

fn parse_attlist_decl(scanner: &mut Scanner<'_>) -> Result<DtdItem, String> {
    let element = scanner.read_name().ok_or("invalid element name in ATTLIST")?.to_string();
    let mut defs = Vec::new();
    loop {
        scanner.skip_whitespace();
        if scanner.is_eof() {
            break;
        }
        let name = scanner.read_name().ok_or("invalid attribute name in ATTLIST")?.to_string();
        scanner.skip_whitespace();
        let att_type = if scanner.peek() == Some(b'(') {
            AttType::Enumeration(read_name_group(scanner)?)
        } else {
            let keyword = scanner.read_name().ok_or("missing attribute type")?;
            match keyword {
                "CDATA" => AttType::CData,
                "ID" => AttType::Id,
                "IDREF" => AttType::IdRef,
                "IDREFS" => AttType::IdRefs,
                "ENTITY" => AttType::Entity,
                "ENTITIES" => AttType::Entities,
                "NMTOKEN" => AttType::NmToken,
                "NMTOKENS" => AttType::NmTokens,
                "NOTATION" => {
                    scanner.skip_whitespace();
                    AttType::Notation(read_name_group(scanner)?)
                }
                other => return Err(format!("unknown attribute type '{}'", other)),
            }
        };
        scanner.skip_whitespace();
        let default = if scanner.starts_with("#REQUIRED") {
            scanner.advance(9);
            AttDefault::Required
        } else if scanner.starts_with("#IMPLIED") {
            scanner.advance(8);
            AttDefault::Implied
        } else if scanner.starts_with("#FIXED") {
            scanner.advance(6);
            scanner.skip_whitespace();
            AttDefault::Fixed(read_default_value(scanner)?)
        } else {
            AttDefault::Default(read_default_value(scanner)?)
        };
        defs.push(AttDef {
            name,
            att_type,
            default,
        });
    }
    Ok(DtdItem::AttList { element, defs })
}

fn read_default_value(scanner: &mut Scanner<'_>) -> Result<String, String> {
    let raw = scanner.read_quoted().ok_or("missing attribute default value")?;
    if raw.contains('<') {
        return Err("'<' in attribute default value".to_string());
    }
    Ok(raw.to_string())
}

fn read_name_group(scanner: &mut Scanner<'_>) -> Result<Vec<String>, String> {
    if scanner.peek() != Some(b'(') {
        return Err("expected '('".to_string());
    }
    let end = scanner.find_byte(b')').ok_or("unterminated enumeration")?;
    let group = scanner.slice(scanner.position() + 1, end);
    scanner.set_position(end + 1);
    let names: Vec<String> = group
        .split('|')
        .map(|s| s.trim().to_string())
        .collect();
    if names.iter().any(String::is_empty) {
        return Err("empty name in enumeration".to_string());
    }
    Ok(names)
}

/// Reads `SYSTEM "uri"` or `PUBLIC "pubid" "uri"`. With `public_only_ok`
/// (notations) the system literal after PUBLIC is optional.
fn read_external_id(
    scanner: &mut Scanner<'_>,
    public_only_ok: bool,
) -> Result<(Option<String>, Option<String>), String> {
    if scanner.starts_with("SYSTEM") {
        scanner.advance(6);
        scanner.skip_whitespace();
        let system = scanner.read_quoted().ok_or("missing system literal")?;
        Ok((None, Some(system.to_string())))
    } else if scanner.starts_with("PUBLIC") {
        scanner.advance(6);
        scanner.skip_whitespace();
        let public = scanner.read_quoted().ok_or("missing public identifier")?;
        if !public.chars().all(is_pubid_char) {
            return Err("invalid character in public identifier".to_string());
        }
        let ws = scanner.skip_whitespace();
        let system = if matches!(scanner.peek(), Some(b'"') | Some(b'\'')) {
            if ws == 0 {
                return Err("missing whitespace before system literal".to_string());
            }
            scanner.read_quoted().map(str::to_string)
        } else if public_only_ok {
            None
        } else {
            return Err("missing system literal".to_string());
        };
        let public = public.split_whitespace().collect::<Vec<_>>().join(" ");
        Ok((Some(public), system))
    } else {
        Ok((None, None))
    }
}

fn is_pubid_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || " \r\n-'()+,./:=?;!*#@$_%".contains(c)
}

/// Split PI content into target and data
pub fn split_pi(content: &str) -> (String, String) {
    let trimmed = content.trim_start();
    match trimmed.find(|c: char| c.is_ascii_whitespace()) {
        Some(ws) => (
            trimmed[..ws].to_string(),
            trimmed[ws..].trim_start().to_string(),
        ),
        None => (trimmed.to_string(), String::new()),
    }
}
