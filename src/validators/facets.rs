//! Constraining facets of simple type restrictions

use crate::error::{Error, ParseError, Result};
use regex::Regex;

/// White space handling of a simple type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhiteSpace {
    /// Preserve all white space
    Preserve,
    /// Replace tabs and newlines with spaces
    Replace,
    /// Replace and collapse multiple spaces
    Collapse,
}

impl WhiteSpace {
    /// Parse the value of a `whiteSpace` facet
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "preserve" => Ok(WhiteSpace::Preserve),
            "replace" => Ok(WhiteSpace::Replace),
            "collapse" => Ok(WhiteSpace::Collapse),
            _ => Err(Error::SchemaCompile(ParseError::new(format!(
                "invalid whiteSpace value '{}'",
                s
            )))),
        }
    }

    /// Normalize a string according to this white space mode
    pub fn normalize(&self, s: &str) -> String {
        match self {
            WhiteSpace::Preserve => s.to_string(),
            WhiteSpace::Replace => s.replace(['\t', '\n', '\r'], " "),
            WhiteSpace::Collapse => s.split_whitespace().collect::<Vec<_>>().join(" "),
        }
    }
}

/// Facets declared by one restriction step.
///
/// Bounds are kept lexical and compared through the primitive type of the
/// restricted base when a value is checked.
#[derive(Debug, Clone, Default)]
pub struct Facets {
    /// Allowed values
    pub enumeration: Vec<String>,
    /// Pattern facets of this step, joined into one anchored alternation
    pub pattern: Option<Regex>,
    /// Exact length
    pub length: Option<usize>,
    /// Minimum length
    pub min_length: Option<usize>,
    /// Maximum length
    pub max_length: Option<usize>,
    /// Inclusive lower bound
    pub min_inclusive: Option<String>,
    /// Inclusive upper bound
    pub max_inclusive: Option<String>,
    /// Exclusive lower bound
    pub min_exclusive: Option<String>,
    /// Exclusive upper bound
    pub max_exclusive: Option<String>,
    /// Maximum number of digits
    pub total_digits: Option<u32>,
    /// Maximum number of fraction digits
    pub fraction_digits: Option<u32>,
    /// White space handling override
    pub white_space: Option<WhiteSpace>,
}

impl Facets {
    /// Build the pattern facet from the `value` attributes of one step
    pub fn set_patterns(&mut self, patterns: &[String]) -> Result<()> {
        if patterns.is_empty() {
            return Ok(());
        }
        let alternatives: Vec<String> = patterns
            .iter()
            .map(|p| format!("(?:{})", translate_pattern(p)))
            .collect();
        let source = format!("^(?:{})$", alternatives.join("|"));
        let regex = Regex::new(&source).map_err(|e| {
            Error::SchemaCompile(
                ParseError::new(format!("unsupported pattern facet: {}", e))
                    .with_source(patterns.join(" | ")),
            )
        })?;
        self.pattern = Some(regex);
        Ok(())
    }

    /// Check the facets that do not depend on the base type's value space
    pub fn check_lexical(&self, value: &str, length: usize) -> std::result::Result<(), String> {
        if let Some(pattern) = &self.pattern {
            if !pattern.is_match(value) {
                return Err(format!(
                    "value '{}' does not match pattern '{}'",
                    value,
                    pattern.as_str()
                ));
            }
        }
        if let Some(expected) = self.length {
            if length != expected {
                return Err(format!("length {} of '{}' is not {}", length, value, expected));
            }
        }
        if let Some(min) = self.min_length {
            if length < min {
                return Err(format!("length {} of '{}' is below minLength {}", length, value, min));
            }
        }
        if let Some(max) = self.max_length {
            if length > max {
                return Err(format!("length {} of '{}' exceeds maxLength {}", length, value, max));
            }
        }
        if self.total_digits.is_some() || self.fraction_digits.is_some() {
            let digits = value.trim_start_matches(['+', '-']);
            let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
            let frac = frac_part.trim_end_matches('0');
            let int = int_part.trim_start_matches('0');
            if let Some(total) = self.total_digits {
                if (int.len() + frac.len()) as u32 > total {
                    return Err(format!("'{}' has more than {} digits", value, total));
                }
            }
            if let Some(fraction) = self.fraction_digits {
                if frac.len() as u32 > fraction {
                    return Err(format!(
                        "'{}' has more than {} fraction digits",
                        value, fraction
                    ));
                }
            }
        }
        Ok(())
    }

    /// True when any bound facet is set
    pub fn has_bounds(&self) -> bool {
        self.min_inclusive.is_some()
            || self.max_inclusive.is_some()
            || self.min_exclusive.is_some()
            || self.max_exclusive.is_some()
    }
}

/// Rewrite the XSD regex dialect into `regex` syntax.
///
/// XSD patterns are implicitly anchored and add the `\i` and `\c` name
/// character classes; everything else used in practice is shared.
pub fn translate_pattern(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars().peekable();
    let mut in_class = false;
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('i') => out.push_str(if in_class { "_:A-Za-z" } else { "[_:A-Za-z]" }),
                Some('I') => out.push_str("[^_:A-Za-z]"),
                Some('c') => out.push_str(if in_class {
                    "\\-._:A-Za-z0-9"
                } else {
                    "[\\-._:A-Za-z0-9]"
                }),
                Some('C') => out.push_str("[^\\-._:A-Za-z0-9]"),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push_str("\\\\"),
            },
            '[' if !in_class => {
                in_class = true;
                out.push(c);
            }
            ']' if in_class => {
                in_class = false;
                out.push(c);
            }
            // `^` and `$` are ordinary characters outside classes in XSD
            '^' if !in_class => out.push_str("\\^"),
            '$' => out.push_str("\\$"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_white_space_normalize() {
        assert_eq!(WhiteSpace::Preserve.normalize(" a\tb "), " a\tb ");
        assert_eq!(WhiteSpace::Replace.normalize(" a\tb\n"), " a b ");
        assert_eq!(WhiteSpace::Collapse.normalize("  a \t\n b  "), "a b");
        assert!(WhiteSpace::parse("squash").is_err());
    }

    #[test]
    fn test_patterns_are_anchored_alternatives() {
        let mut facets = Facets::default();
        facets
            .set_patterns(&["[A-Z]{2}".to_string(), "\\d{3}".to_string()])
            .unwrap();
        assert!(facets.check_lexical("AB", 2).is_ok());
        assert!(facets.check_lexical("123", 3).is_ok());
        assert!(facets.check_lexical("ABC", 3).is_err());
        assert!(facets.check_lexical("x123", 4).is_err());
    }

    #[test]
    fn test_name_class_escapes() {
        let mut facets = Facets::default();
        facets.set_patterns(&["\\i\\c*".to_string()]).unwrap();
        assert!(facets.check_lexical("_a-1.b", 6).is_ok());
        assert!(facets.check_lexical("1abc", 4).is_err());
    }

    #[test]
    fn test_length_and_digits() {
        let facets = Facets {
            min_length: Some(2),
            max_length: Some(4),
            total_digits: Some(4),
            fraction_digits: Some(2),
            ..Facets::default()
        };
        assert!(facets.check_lexical("12.50", 3).is_ok());
        assert!(facets.check_lexical("x", 1).is_err());
        assert!(facets.check_lexical("12.345", 3).is_err());
        assert!(facets.check_lexical("123.45", 3).is_err());
    }
}
