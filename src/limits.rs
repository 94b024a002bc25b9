//! Resource limits
//!
//! One `Limits` value travels with every reader configuration. The reader
//! checks element depth, attribute count and document size against it, and
//! the schema compiler checks include/import nesting.

use crate::error::{Error, Result};

/// Resource limits for one reader and the schemas it compiles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum element nesting depth (`maxElementDepth` property)
    pub max_element_depth: usize,

    /// Maximum attributes on one element (`elementAttributeLimit` property)
    pub max_attributes: usize,

    /// Maximum document or schema size in bytes
    pub max_document_size: usize,

    /// Maximum include/import nesting while compiling a schema
    pub max_schema_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_element_depth: 1000,
            max_attributes: 1000,
            max_document_size: 64 * 1024 * 1024,
            max_schema_depth: 64,
        }
    }
}

impl Limits {
    /// Create the default limits
    pub fn new() -> Self {
        Self::default()
    }

    /// Tighter limits for documents from untrusted sources
    pub fn strict() -> Self {
        Self {
            max_element_depth: 100,
            max_attributes: 100,
            max_document_size: 4 * 1024 * 1024,
            max_schema_depth: 16,
        }
    }

    /// Element nesting of `depth` (the root is depth 1)
    pub fn check_element_depth(&self, depth: usize) -> Result<()> {
        within("element depth", depth, self.max_element_depth)
    }

    /// `count` attributes on one start tag
    pub fn check_attributes(&self, count: usize) -> Result<()> {
        within("attribute count", count, self.max_attributes)
    }

    /// Document of `size` bytes
    pub fn check_document_size(&self, size: usize) -> Result<()> {
        within("document size in bytes", size, self.max_document_size)
    }

    /// Schema document reached through `depth` includes or imports
    pub fn check_schema_depth(&self, depth: usize) -> Result<()> {
        within("schema include depth", depth, self.max_schema_depth)
    }
}

fn within(what: &str, value: usize, max: usize) -> Result<()> {
    if value > max {
        return Err(Error::LimitExceeded(format!("{} {} exceeds maximum {}", what, value, max)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = Limits::default();
        assert!(limits.check_element_depth(1000).is_ok());
        assert!(limits.check_element_depth(1001).is_err());
        assert!(limits.check_document_size(1024).is_ok());
    }

    #[test]
    fn test_strict_is_tighter() {
        let strict = Limits::strict();
        let default = Limits::default();
        assert!(strict.max_element_depth < default.max_element_depth);
        assert!(strict.max_schema_depth < default.max_schema_depth);
        assert!(strict.check_attributes(101).is_err());
    }

    #[test]
    fn test_message_names_the_limit() {
        let limits = Limits {
            max_schema_depth: 2,
            ..Limits::default()
        };
        match limits.check_schema_depth(3) {
            Err(Error::LimitExceeded(message)) => {
                assert_eq!(message, "schema include depth 3 exceeds maximum 2")
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
