//! XML name productions
//!
//! Character classes follow XML 1.0 (fifth edition). The schema validator
//! uses these for the name-like built-in types; the namespace code uses
//! `split_qname` on raw tag and attribute names.

fn is_name_start_char(c: char) -> bool {
    matches!(c,
        ':' | 'A'..='Z' | '_' | 'a'..='z'
        | '\u{C0}'..='\u{D6}' | '\u{D8}'..='\u{F6}' | '\u{F8}'..='\u{2FF}'
        | '\u{370}'..='\u{37D}' | '\u{37F}'..='\u{1FFF}' | '\u{200C}'..='\u{200D}'
        | '\u{2070}'..='\u{218F}' | '\u{2C00}'..='\u{2FEF}' | '\u{3001}'..='\u{D7FF}'
        | '\u{F900}'..='\u{FDCF}' | '\u{FDF0}'..='\u{FFFD}' | '\u{10000}'..='\u{EFFFF}')
}

fn is_name_char(c: char) -> bool {
    is_name_start_char(c)
        || matches!(c,
            '-' | '.' | '0'..='9' | '\u{B7}' | '\u{300}'..='\u{36F}' | '\u{203F}'..='\u{2040}')
}

/// `Name` production
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => is_name_start_char(first) && chars.all(is_name_char),
        None => false,
    }
}

/// `NCName`: a Name without colons
pub fn is_valid_ncname(name: &str) -> bool {
    !name.contains(':') && is_valid_name(name)
}

/// `QName`: an NCName, or two joined by one colon
pub fn is_valid_qname(name: &str) -> bool {
    match name.split_once(':') {
        Some((prefix, local)) => is_valid_ncname(prefix) && is_valid_ncname(local),
        None => is_valid_ncname(name),
    }
}

/// `Nmtoken` production
pub fn is_valid_nmtoken(token: &str) -> bool {
    !token.is_empty() && token.chars().all(is_name_char)
}

/// Split `prefix:local`; names without a colon have no prefix
pub fn split_qname(qname: &str) -> (Option<&str>, &str) {
    match qname.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, qname),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names() {
        assert!(is_valid_name("order"));
        assert!(is_valid_name("_x-1.2"));
        assert!(is_valid_name("élément"));
        assert!(is_valid_name("a:b"));

        assert!(!is_valid_name(""));
        assert!(!is_valid_name("1st"));
        assert!(!is_valid_name(".hidden"));
    }

    #[test]
    fn test_qnames() {
        assert!(is_valid_qname("xsi:noNamespaceSchemaLocation"));
        assert!(is_valid_qname("local"));

        assert!(!is_valid_qname(":local"));
        assert!(!is_valid_qname("prefix:"));
        assert!(!is_valid_qname("a:b:c"));
        assert!(!is_valid_ncname("a:b"));
    }

    #[test]
    fn test_nmtokens() {
        assert!(is_valid_nmtoken("2024-01"));
        assert!(!is_valid_nmtoken("two words"));
        assert!(!is_valid_nmtoken(""));
    }

    #[test]
    fn test_split_qname() {
        assert_eq!(split_qname("order"), (None, "order"));
        assert_eq!(split_qname("xsi:type"), (Some("xsi"), "type"));
    }
}
