//! Error types for xsi-discovery
//!
//! Readers, the discovery pass and the schema compiler all report through
//! `Error`. Well-formedness errors, validation errors and schema compilation
//! errors each carry their own context struct.

use std::fmt;
use thiserror::Error;

/// Result type alias using the xsi-discovery Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for xsi-discovery operations
#[derive(Error, Debug)]
pub enum Error {
    /// Well-formedness error raised by the reader
    #[error("parse error: {0}")]
    Sax(#[from] SaxParseError),

    /// Schema validation error raised while parsing a bound document
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Schema could not be loaded or compiled
    #[error("schema compile error: {0}")]
    SchemaCompile(#[from] ParseError),

    /// A namespace prefix was used without being declared
    #[error("unbound prefix: '{0}'")]
    UnboundPrefix(String),

    /// Namespace bookkeeping error (unbalanced prefix scopes)
    #[error("namespace error: {0}")]
    Namespace(String),

    /// Feature or property name not known to the reader or factory
    #[error("not recognized: {0}")]
    NotRecognized(String),

    /// Feature, property or configuration known but not supported
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Resource loading error
    #[error("resource error: {0}")]
    Resource(String),

    /// Limit exceeded error
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Low-level XML error not tied to a document position
    #[error("XML error: {0}")]
    Xml(String),

    /// URL parsing error
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

impl Error {
    /// True for errors raised because the document broke its schema
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    /// True for well-formedness errors
    pub fn is_fatal_parse(&self) -> bool {
        matches!(self, Error::Sax(_))
    }
}

/// Well-formedness error with document position
#[derive(Debug, Clone)]
pub struct SaxParseError {
    /// Error message
    pub message: String,
    /// System identifier of the document
    pub system_id: Option<String>,
    /// 1-based line number
    pub line: Option<usize>,
    /// 1-based column number
    pub column: Option<usize>,
}

impl SaxParseError {
    /// Create a new parse error without position
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            system_id: None,
            line: None,
            column: None,
        }
    }

    /// Set the system identifier
    pub fn with_system_id(mut self, system_id: Option<&str>) -> Self {
        self.system_id = system_id.map(str::to_string);
        self
    }

    /// Set the position
    pub fn with_position(mut self, line: usize, column: usize) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }
}

impl fmt::Display for SaxParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref system_id) = self.system_id {
            write!(f, "{}:", system_id)?;
        }
        if let (Some(line), Some(column)) = (self.line, self.column) {
            write!(f, "{}:{}: ", line, column)?;
        } else if self.system_id.is_some() {
            write!(f, " ")?;
        }
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for SaxParseError {}

/// XML Schema validation error with context
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Error message
    pub message: String,
    /// Path to the element that failed validation
    pub path: Option<String>,
    /// Schema component that caused the error
    pub schema_component: Option<String>,
    /// Original reason
    pub reason: Option<String>,
    /// 1-based line number in the instance document
    pub line: Option<usize>,
}

impl ValidationError {
    /// Create a new validation error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
            schema_component: None,
            reason: None,
            line: None,
        }
    }

    /// Set the path where validation failed
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the schema component
    pub fn with_schema_component(mut self, component: impl Into<String>) -> Self {
        self.schema_component = Some(component.into());
        self
    }

    /// Set the reason
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Set the instance line
    pub fn with_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(line) = self.line {
            write!(f, "line {}: ", line)?;
        }
        write!(f, "{}", self.message)?;
        if let Some(ref reason) = self.reason {
            write!(f, " ({})", reason)?;
        }
        if let Some(ref path) = self.path {
            write!(f, " at {}", path)?;
        }
        if let Some(ref component) = self.schema_component {
            write!(f, " [{}]", component)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Schema loading/compilation error
#[derive(Debug, Clone)]
pub struct ParseError {
    /// Error message
    pub message: String,
    /// Location of the schema document
    pub location: Option<String>,
    /// Schema source snippet that caused the error
    pub source: Option<String>,
}

impl ParseError {
    /// Create a new parse error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
            source: None,
        }
    }

    /// Set the location
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Set the source
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(ref location) => write!(f, "{}: {}", location, self.message)?,
            None => write!(f, "{}", self.message)?,
        }
        if let Some(ref source) = self.source {
            write!(f, "\n    {}", source.trim())?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}
