//! # xsi-discovery
//!
//! Schema-discovering SAX-style readers.
//!
//! A `SchemaAwareReader` looks at a document before parsing it. When an
//! element carries `xsi:noNamespaceSchemaLocation` or `xsi:schemaLocation`,
//! the named schema is resolved against the document's base URI, compiled,
//! and the parse runs on a validating reader bound to it. Documents without
//! a hint are parsed by the plain reader.
//!
//! ## Features
//!
//! - SAX-style event reader over `quick-xml` with namespace processing
//! - Discovery pass that honours any prefix bound to the XSI namespace
//! - XSD 1.0 subset compiler and streaming validator
//! - Handler registrations carried over when the reader is rebound
//! - Identity copier writing the event stream back out as XML
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use xsi_discovery::{InputSource, SchemaAwareParserFactory, XmlCopier};
//!
//! let factory = SchemaAwareParserFactory::new();
//! let mut parser = factory.new_parser()?;
//! let copier = Rc::new(RefCell::new(XmlCopier::new(std::io::stdout())));
//! parser.parse_with(InputSource::from_system_id("doc.xml"), &copier)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Foundation
pub mod error;
pub mod limits;

// Names and locations
pub mod namespaces;
pub mod names;
pub mod locations;

// Resource loading
pub mod loaders;

// Event reader
pub mod config;
pub mod sax;

// Schemas
pub mod validators;

// Discovery and rebinding
pub mod discovery;
pub mod rebinder;
pub mod factory;

// Transform
pub mod copier;

// Re-exports for convenience
pub use config::FactoryConfig;
pub use copier::XmlCopier;
pub use discovery::{discover, Discovery, SchemaHint, SchemaLocatorHandler};
pub use error::{Error, Result};
pub use factory::{ParserFactory, SaxParser, SchemaAwareParserFactory, StdParserFactory};
pub use limits::Limits;
pub use rebinder::{RebindState, SchemaAwareReader};
pub use sax::{InputSource, XmlReader};
pub use validators::{CompiledSchema, SchemaCompiler, SchemaSource, XsdCompiler};

/// Version of the xsi-discovery library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
