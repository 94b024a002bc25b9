//! DOCTYPE scanning
//!
//! The reader does not validate against DTDs. It extracts the external
//! subset identifiers and the notation and entity declarations: notations
//! and unparsed entities are reported to a `DtdHandler`, internal general
//! entities are expanded in text and attribute values.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static NOTATION_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"<!NOTATION\s+([^\s>]+)\s+(?:SYSTEM\s+(?:"([^"]*)"|'([^']*)')|PUBLIC\s+(?:"([^"]*)"|'([^']*)')(?:\s+(?:"([^"]*)"|'([^']*)'))?)\s*>"#,
    )
    .unwrap()
});

static UNPARSED_ENTITY_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"<!ENTITY\s+([^\s%>]+)\s+(?:SYSTEM\s+(?:"([^"]*)"|'([^']*)')|PUBLIC\s+(?:"([^"]*)"|'([^']*)')\s+(?:"([^"]*)"|'([^']*)'))\s+NDATA\s+([^\s>]+)\s*>"#,
    )
    .unwrap()
});

static INTERNAL_ENTITY_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<!ENTITY\s+([^\s%>]+)\s+(?:"([^"]*)"|'([^']*)')\s*>"#).unwrap()
});

static COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());

/// Parsed `<!DOCTYPE ...>` header
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Doctype {
    /// Declared root element name
    pub root_name: String,
    /// Public identifier of the external subset
    pub public_id: Option<String>,
    /// System identifier of the external subset
    pub system_id: Option<String>,
    /// Text between `[` and `]`
    pub internal_subset: Option<String>,
}

/// Declaration reported to a `DtdHandler`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DtdDeclaration {
    /// `<!NOTATION name ...>`
    Notation {
        /// Notation name
        name: String,
        /// Public identifier
        public_id: Option<String>,
        /// System identifier
        system_id: Option<String>,
    },
    /// `<!ENTITY name ... NDATA notation>`
    UnparsedEntity {
        /// Entity name
        name: String,
        /// Public identifier
        public_id: Option<String>,
        /// System identifier
        system_id: String,
        /// Notation name
        notation: String,
    },
    /// `<!ENTITY name "replacement text">`
    InternalEntity {
        /// Entity name
        name: String,
        /// Literal value as declared
        value: String,
    },
}

/// Internal general entities in scope for one document
#[derive(Debug, Clone, Default)]
pub struct EntityTable {
    entities: HashMap<String, String>,
}

impl EntityTable {
    /// Create a table holding only the predefined entities
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an entity. The first declaration of a name is binding, and
    /// references in the literal are expanded against earlier declarations.
    pub fn declare(&mut self, name: &str, literal: &str) {
        if self.entities.contains_key(name) || predefined(name).is_some() {
            return;
        }
        let value = quick_xml::escape::unescape_with(literal, |n| self.resolve(n))
            .map(|v| v.into_owned())
            .unwrap_or_else(|_| literal.to_string());
        self.entities.insert(name.to_string(), value);
    }

    /// Replacement text for `&name;`
    pub fn resolve(&self, name: &str) -> Option<&str> {
        predefined(name).or_else(|| self.entities.get(name).map(String::as_str))
    }

    /// Number of declared entities
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// True when nothing beyond the predefined entities is declared
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

fn predefined(name: &str) -> Option<&'static str> {
    match name {
        "lt" => Some("<"),
        "gt" => Some(">"),
        "amp" => Some("&"),
        "apos" => Some("'"),
        "quot" => Some("\""),
        _ => None,
    }
}

/// Parse the content of a DOCTYPE token (the text after `<!DOCTYPE`)
pub fn parse_doctype(content: &str) -> Doctype {
    let mut rest = content.trim_start();
    let name_end = rest
        .find(|c: char| c.is_whitespace() || c == '[')
        .unwrap_or(rest.len());
    let mut doctype = Doctype {
        root_name: rest[..name_end].to_string(),
        ..Doctype::default()
    };
    rest = rest[name_end..].trim_start();

    if let Some(after) = rest.strip_prefix("SYSTEM") {
        if let Some((system, tail)) = quoted(after) {
            doctype.system_id = Some(system.to_string());
            rest = tail;
        }
    } else if let Some(after) = rest.strip_prefix("PUBLIC") {
        if let Some((public, tail)) = quoted(after) {
            doctype.public_id = Some(public.to_string());
            rest = tail;
            if let Some((system, tail)) = quoted(rest) {
                doctype.system_id = Some(system.to_string());
                rest = tail;
            }
        }
    }

    let rest = rest.trim_start();
    if let Some(subset) = rest.strip_prefix('[') {
        let end = subset.rfind(']').unwrap_or(subset.len());
        doctype.internal_subset = Some(subset[..end].to_string());
    }
    doctype
}

/// Read one quoted literal, returning it and the remaining text
fn quoted(text: &str) -> Option<(&str, &str)> {
    let text = text.trim_start();
    let quote = text.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let body = &text[1..];
    let end = body.find(quote)?;
    Some((&body[..end], &body[end + 1..]))
}

/// Collect notation and entity declarations in document order
pub fn scan_declarations(subset: &str) -> Vec<DtdDeclaration> {
    let subset = COMMENT.replace_all(subset, "");
    let mut found: Vec<(usize, DtdDeclaration)> = Vec::new();

    for caps in NOTATION_DECL.captures_iter(&subset) {
        let text = |i: usize| caps.get(i).map(|m| m.as_str().to_string());
        let start = caps.get(0).map_or(0, |m| m.start());
        let (public_id, system_id) = match text(2).or_else(|| text(3)) {
            Some(system) => (None, Some(system)),
            None => (text(4).or_else(|| text(5)), text(6).or_else(|| text(7))),
        };
        found.push((
            start,
            DtdDeclaration::Notation {
                name: text(1).unwrap_or_default(),
                public_id,
                system_id,
            },
        ));
    }

    for caps in UNPARSED_ENTITY_DECL.captures_iter(&subset) {
        let text = |i: usize| caps.get(i).map(|m| m.as_str().to_string());
        let start = caps.get(0).map_or(0, |m| m.start());
        let (public_id, system_id) = match text(2).or_else(|| text(3)) {
            Some(system) => (None, system),
            None => (
                text(4).or_else(|| text(5)),
                text(6).or_else(|| text(7)).unwrap_or_default(),
            ),
        };
        found.push((
            start,
            DtdDeclaration::UnparsedEntity {
                name: text(1).unwrap_or_default(),
                public_id,
                system_id,
                notation: text(8).unwrap_or_default(),
            },
        ));
    }

    for caps in INTERNAL_ENTITY_DECL.captures_iter(&subset) {
        let start = caps.get(0).map_or(0, |m| m.start());
        let value = caps.get(2).or_else(|| caps.get(3)).map_or("", |m| m.as_str());
        found.push((
            start,
            DtdDeclaration::InternalEntity {
                name: caps[1].to_string(),
                value: value.to_string(),
            },
        ));
    }

    found.sort_by_key(|(start, _)| *start);
    found.into_iter().map(|(_, decl)| decl).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_doctype_system() {
        let doctype = parse_doctype(r#" book SYSTEM "book.dtd""#);
        assert_eq!(doctype.root_name, "book");
        assert_eq!(doctype.system_id.as_deref(), Some("book.dtd"));
        assert_eq!(doctype.public_id, None);
        assert_eq!(doctype.internal_subset, None);
    }

    #[test]
    fn test_parse_doctype_public_with_subset() {
        let doctype = parse_doctype(
            r#" html PUBLIC "-//W3C//DTD XHTML 1.0//EN" 'x.dtd' [ <!NOTATION gif SYSTEM "image/gif"> ]"#,
        );
        assert_eq!(doctype.root_name, "html");
        assert_eq!(doctype.public_id.as_deref(), Some("-//W3C//DTD XHTML 1.0//EN"));
        assert_eq!(doctype.system_id.as_deref(), Some("x.dtd"));
        assert!(doctype.internal_subset.unwrap().contains("NOTATION"));
    }

    #[test]
    fn test_parse_doctype_internal_only() {
        let doctype = parse_doctype("doc[<!ELEMENT doc ANY>]");
        assert_eq!(doctype.root_name, "doc");
        assert_eq!(doctype.internal_subset.as_deref(), Some("<!ELEMENT doc ANY>"));
    }

    #[test]
    fn test_scan_declarations() {
        let subset = r#"
            <!NOTATION gif SYSTEM "image/gif">
            <!-- <!NOTATION hidden SYSTEM "x"> -->
            <!ENTITY logo SYSTEM "logo.gif" NDATA gif>
            <!ENTITY text "plain internal entity">
            <!NOTATION png PUBLIC "-//PNG//EN">
            <!ENTITY pic PUBLIC "-//PIC//EN" 'pic.png' NDATA png>
        "#;
        let decls = scan_declarations(subset);
        assert_eq!(
            decls,
            vec![
                DtdDeclaration::Notation {
                    name: "gif".into(),
                    public_id: None,
                    system_id: Some("image/gif".into()),
                },
                DtdDeclaration::UnparsedEntity {
                    name: "logo".into(),
                    public_id: None,
                    system_id: "logo.gif".into(),
                    notation: "gif".into(),
                },
                DtdDeclaration::InternalEntity {
                    name: "text".into(),
                    value: "plain internal entity".into(),
                },
                DtdDeclaration::Notation {
                    name: "png".into(),
                    public_id: Some("-//PNG//EN".into()),
                    system_id: None,
                },
                DtdDeclaration::UnparsedEntity {
                    name: "pic".into(),
                    public_id: Some("-//PIC//EN".into()),
                    system_id: "pic.png".into(),
                    notation: "png".into(),
                },
            ]
        );
    }

    #[test]
    fn test_parameter_entities_are_not_general() {
        let decls = scan_declarations(r#"<!ENTITY % common "x"><!ENTITY who 'world'>"#);
        assert_eq!(
            decls,
            vec![DtdDeclaration::InternalEntity {
                name: "who".into(),
                value: "world".into(),
            }]
        );
    }

    #[test]
    fn test_entity_table() {
        let mut table = EntityTable::new();
        table.declare("who", "world");
        table.declare("greeting", "hello &who; &amp; bye");
        table.declare("who", "ignored");
        table.declare("lt", "ignored");

        assert_eq!(table.resolve("who"), Some("world"));
        assert_eq!(table.resolve("greeting"), Some("hello world & bye"));
        assert_eq!(table.resolve("lt"), Some("<"));
        assert_eq!(table.resolve("nobody"), None);
        assert_eq!(table.len(), 2);
    }
}
