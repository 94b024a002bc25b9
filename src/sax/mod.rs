//! SAX-style event interfaces
//!
//! This module defines the four callback sinks a reader reports to
//! (content, errors, external entities, DTD declarations), the attribute
//! list handed to `start_element`, and the feature/property names readers
//! and factories understand.
//!
//! Handlers are shared between the caller and the reader as
//! `Rc<RefCell<dyn Trait>>`, so a caller keeps access to its handler's
//! state after a parse and a reader can hand the same registrations over to
//! another reader.

pub mod dtd;
pub mod input;
pub mod reader;

use crate::error::{Result, SaxParseError, ValidationError};
use crate::namespaces::QName;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

pub use input::InputSource;
pub use reader::{StdXmlReader, XmlReader};

/// Standard feature names
pub mod features {
    /// Report namespace URIs and prefix mappings
    pub const NAMESPACES: &str = "http://xml.org/sax/features/namespaces";
    /// Report `xmlns` attributes in attribute lists
    pub const NAMESPACE_PREFIXES: &str = "http://xml.org/sax/features/namespace-prefixes";
    /// Validation requested by the caller
    pub const VALIDATION: &str = "http://xml.org/sax/features/validation";
    /// Load the external DTD subset when no entity resolver supplies it
    pub const LOAD_EXTERNAL_DTD: &str =
        "http://apache.org/xml/features/nonvalidating/load-external-dtd";
}

/// Standard property names
pub mod properties {
    /// Maximum element nesting depth (integer)
    pub const MAX_ELEMENT_DEPTH: &str =
        "http://www.oracle.com/xml/jaxp/properties/maxElementDepth";
    /// Maximum attributes per element (integer)
    pub const ELEMENT_ATTRIBUTE_LIMIT: &str =
        "http://www.oracle.com/xml/jaxp/properties/elementAttributeLimit";
}

/// Value of a reader or factory property
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Text value
    Text(String),
}

impl PropertyValue {
    /// Integer view of the value
    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(i) => Some(*i),
            PropertyValue::Text(s) => s.trim().parse().ok(),
            PropertyValue::Bool(_) => None,
        }
    }
}

/// One attribute of a start tag
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    /// Resolved name (namespace is only set when namespaces are processed)
    pub name: QName,
    /// Name as written in the document
    pub raw_name: String,
    /// Unescaped value
    pub value: String,
}

/// Attributes of a start tag, in document order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes {
    items: Vec<Attribute>,
}

impl Attributes {
    /// Create an empty attribute list
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an attribute
    pub fn push(&mut self, attribute: Attribute) {
        self.items.push(attribute);
    }

    /// Number of attributes
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when there are no attributes
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Attribute at `index`
    pub fn get(&self, index: usize) -> Option<&Attribute> {
        self.items.get(index)
    }

    /// Iterate in document order
    pub fn iter(&self) -> std::slice::Iter<'_, Attribute> {
        self.items.iter()
    }

    /// Value by name as written
    pub fn value(&self, raw_name: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|a| a.raw_name == raw_name)
            .map(|a| a.value.as_str())
    }

    /// Value by namespace and local name
    pub fn value_ns(&self, namespace: Option<&str>, local_name: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|a| a.name.matches(namespace, local_name))
            .map(|a| a.value.as_str())
    }
}

impl<'a> IntoIterator for &'a Attributes {
    type Item = &'a Attribute;
    type IntoIter = std::slice::Iter<'a, Attribute>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Receives the logical content of a document
pub trait ContentHandler {
    /// Called once before any other content event
    fn start_document(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called once after the root element has ended
    fn end_document(&mut self) -> Result<()> {
        Ok(())
    }

    /// A prefix comes into scope; precedes the element declaring it
    fn start_prefix_mapping(&mut self, _prefix: &str, _uri: &str) -> Result<()> {
        Ok(())
    }

    /// A prefix goes out of scope; follows the end of the declaring element
    fn end_prefix_mapping(&mut self, _prefix: &str) -> Result<()> {
        Ok(())
    }

    /// Start tag
    fn start_element(&mut self, _name: &QName, _attributes: &Attributes) -> Result<()> {
        Ok(())
    }

    /// End tag
    fn end_element(&mut self, _name: &QName) -> Result<()> {
        Ok(())
    }

    /// Character data, including CDATA sections
    fn characters(&mut self, _text: &str) -> Result<()> {
        Ok(())
    }

    /// Processing instruction
    fn processing_instruction(&mut self, _target: &str, _data: &str) -> Result<()> {
        Ok(())
    }
}

/// Receives warnings, validation errors and fatal errors.
///
/// Returning `Err` from any method aborts the parse with that error.
pub trait ErrorHandler {
    /// Recoverable condition the reader chose to ignore
    fn warning(&mut self, _warning: &SaxParseError) -> Result<()> {
        Ok(())
    }

    /// Schema validation error; the parse continues when this returns `Ok`
    fn error(&mut self, _error: &ValidationError) -> Result<()> {
        Ok(())
    }

    /// Well-formedness error; the parse stops regardless of the return value
    fn fatal_error(&mut self, _error: &SaxParseError) -> Result<()> {
        Ok(())
    }
}

/// Supplies external entities (the external DTD subset) to the reader
pub trait EntityResolver {
    /// `None` lets the reader apply its default behaviour
    fn resolve_entity(
        &mut self,
        _public_id: Option<&str>,
        _system_id: &str,
    ) -> Result<Option<InputSource>> {
        Ok(None)
    }
}

/// Receives the DTD declarations that matter to applications
pub trait DtdHandler {
    /// `<!NOTATION ...>`
    fn notation_decl(
        &mut self,
        _name: &str,
        _public_id: Option<&str>,
        _system_id: Option<&str>,
    ) -> Result<()> {
        Ok(())
    }

    /// `<!ENTITY name ... NDATA notation>`
    fn unparsed_entity_decl(
        &mut self,
        _name: &str,
        _public_id: Option<&str>,
        _system_id: &str,
        _notation_name: &str,
    ) -> Result<()> {
        Ok(())
    }
}

/// Shared content handler
pub type SharedContentHandler = Rc<RefCell<dyn ContentHandler>>;
/// Shared error handler
pub type SharedErrorHandler = Rc<RefCell<dyn ErrorHandler>>;
/// Shared entity resolver
pub type SharedEntityResolver = Rc<RefCell<dyn EntityResolver>>;
/// Shared DTD handler
pub type SharedDtdHandler = Rc<RefCell<dyn DtdHandler>>;

/// The four callback registrations of a reader.
///
/// Cloning copies the registrations, not the handlers: both copies point at
/// the same handler objects.
#[derive(Clone, Default)]
pub struct Handlers {
    /// Content events
    pub content: Option<SharedContentHandler>,
    /// Warnings and errors
    pub error: Option<SharedErrorHandler>,
    /// External entity resolution
    pub entity_resolver: Option<SharedEntityResolver>,
    /// DTD declarations
    pub dtd: Option<SharedDtdHandler>,
}

impl Handlers {
    /// No handlers registered
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one object for all four roles
    pub fn from_handler<H>(handler: &Rc<RefCell<H>>) -> Self
    where
        H: ContentHandler + ErrorHandler + EntityResolver + DtdHandler + 'static,
    {
        let content: SharedContentHandler = handler.clone();
        let error: SharedErrorHandler = handler.clone();
        let entity_resolver: SharedEntityResolver = handler.clone();
        let dtd: SharedDtdHandler = handler.clone();
        Self {
            content: Some(content),
            error: Some(error),
            entity_resolver: Some(entity_resolver),
            dtd: Some(dtd),
        }
    }

    /// True when no role is registered
    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.error.is_none()
            && self.entity_resolver.is_none()
            && self.dtd.is_none()
    }
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handlers")
            .field("content", &self.content.is_some())
            .field("error", &self.error.is_some())
            .field("entity_resolver", &self.entity_resolver.is_some())
            .field("dtd", &self.dtd.is_some())
            .finish()
    }
}
