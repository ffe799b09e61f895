//! XML 1.0 (Fifth Edition) character classes
//!
//! `Char`, `NameStartChar` and `NameChar` productions, plus the helpers the
//! tokenizer, DOM factories and serializer use to validate names.

/// XML 1.0 `Char` production.
#[inline]
pub fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\u{9}' | '\u{A}' | '\u{D}' |
        '\u{20}'..='\u{D7FF}' |
        '\u{E000}'..='\u{FFFD}' |
        '\u{10000}'..='\u{10FFFF}'
    )
}

/// XML 1.0 `NameStartChar` production.
#[inline]
pub fn is_name_start_char(c: char) -> bool {
    matches!(c,
        ':' | 'A'..='Z' | '_' | 'a'..='z' |
        '\u{C0}'..='\u{D6}' | '\u{D8}'..='\u{F6}' | '\u{F8}'..='\u{2FF}' |
        '\u{370}'..='\u{37D}' | '\u{37F}'..='\u{1FFF}' | '\u{200C}'..='\u{200D}' |
        '\u{2070}'..='\u{218F}' | '\u{2C00}'..='\u{2FEF}' | '\u{3001}'..='\u{D7FF}' |
        '\u{F900}'..='\u{FDCF}' | '\u{FDF0}'..='\u{FFFD}' | '\u{10000}'..='\u{EFFFF}'
    )
}

/// XML 1.0 `NameChar` production.
#[inline]
pub fn is_name_char(c: char) -> bool {
    is_name_start_char(c)
        || matches!(c,
            '-' | '.' | '0'..='9' | '\u{B7}' |
            '\u{300}'..='\u{36F}' | '\u{203F}'..='\u{2040}'
        )
}

/// XML whitespace (`S` production).
#[inline]
pub fn is_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r')
}

/// True if every character of `s` is XML whitespace (empty counts).
pub fn is_all_whitespace(s: &str) -> bool {
    s.chars().all(is_whitespace)
}

/// Check that `name` matches the `Name` production.
pub fn is_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if is_name_start_char(c) => chars.all(is_name_char),
        _ => false,
    }
}

/// Check that `name` is a non-colonized name.
pub fn is_ncname(name: &str) -> bool {
    is_name(name) && !name.contains(':')
}

/// Check that `name` is a valid qualified name (`prefix:local` or `local`).
pub fn is_qname(name: &str) -> bool {
    match name.split_once(':') {
        Some((prefix, local)) => is_ncname(prefix) && is_ncname(local),
        None => is_ncname(name),
    }
}

/// Position of the first character not allowed in XML text.
pub fn find_invalid_char(s: &str) -> Option<usize> {
    s.char_indices().find(|&(_, c)| !is_xml_char(c)).map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xml_chars() {
        assert!(is_xml_char('a'));
        assert!(is_xml_char('\t'));
        assert!(!is_xml_char('\u{0}'));
        assert!(!is_xml_char('\u{B}'));
        assert!(!is_xml_char('\u{FFFE}'));
    }

    #[test]
    fn test_names() {
        assert!(is_name("element-name"));
        assert!(is_name("_x.y"));
        assert!(is_name("p:local"));
        assert!(!is_name("1abc"));
        assert!(!is_name(""));
        assert!(is_name("\u{00E9}l\u{00E8}ve"));
    }

    #[test]
    fn test_qnames() {
        assert!(is_qname("p:local"));
        assert!(is_qname("local"));
        assert!(!is_qname("p:"));
        assert!(!is_qname("a:b:c"));
        assert!(is_ncname("abc"));
        assert!(!is_ncname("a:b"));
    }

    #[test]
    fn test_find_invalid_char() {
        assert_eq!(find_invalid_char("abc"), None);
        assert_eq!(find_invalid_char("ab\u{1}c"), Some(2));
    }
}
