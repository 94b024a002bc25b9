//! XML Schema support
//!
//! Compilation turns schema documents into a `CompiledSchema`; the
//! `Validator` checks a stream of SAX events against it.

pub mod builtins;
pub mod compiler;
pub mod facets;
pub mod schema;
pub mod validation;

pub use builtins::{BuiltinType, XsdValue};
pub use compiler::XsdCompiler;
pub use schema::CompiledSchema;
pub use validation::Validator;

use crate::error::Result;

/// Where a schema comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaSource {
    /// System identifier (URL or path); relative includes resolve against it
    pub system_id: String,
    /// Schema text, when it is already in memory
    pub content: Option<String>,
}

impl SchemaSource {
    /// Schema to be loaded from a system identifier
    pub fn from_system_id(system_id: impl Into<String>) -> Self {
        Self {
            system_id: system_id.into(),
            content: None,
        }
    }

    /// Schema text held in memory, identified by `system_id`
    pub fn from_string(system_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            system_id: system_id.into(),
            content: Some(content.into()),
        }
    }
}

impl From<url::Url> for SchemaSource {
    fn from(url: url::Url) -> Self {
        Self::from_system_id(url.to_string())
    }
}

/// Compiles a schema source into a validation-ready schema
pub trait SchemaCompiler {
    /// Load and compile the schema, failing with `Error::SchemaCompile`
    fn compile(&self, source: &SchemaSource) -> Result<CompiledSchema>;
}
