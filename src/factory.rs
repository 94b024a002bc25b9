//! Parser factories
//!
//! `StdParserFactory` builds plain `StdXmlReader`s from its configuration.
//! `SchemaAwareParserFactory` keeps the same configuration surface (it
//! delegates every call to an inner `StdParserFactory`) but hands out readers
//! that discover their schema from the document.

pub use crate::config::FactoryConfig;

use crate::error::Result;
use crate::locations::{DefaultUriResolver, UriResolver};
use crate::rebinder::SchemaAwareReader;
use crate::sax::{
    ContentHandler, DtdHandler, EntityResolver, ErrorHandler, Handlers, InputSource,
    PropertyValue, StdXmlReader, XmlReader,
};
use crate::validators::{CompiledSchema, SchemaCompiler, XsdCompiler};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

/// Configuration surface and reader construction of a parser factory
pub trait ParserFactory {
    /// Read a feature by its standard name
    fn feature(&self, name: &str) -> Result<bool>;

    /// Set a feature by its standard name
    fn set_feature(&mut self, name: &str, value: bool) -> Result<()>;

    /// Namespace processing of created readers
    fn is_namespace_aware(&self) -> bool;

    /// Turn namespace processing on or off
    fn set_namespace_aware(&mut self, aware: bool);

    /// Validation requested
    fn is_validating(&self) -> bool;

    /// Request validation
    fn set_validating(&mut self, validating: bool);

    /// XInclude processing requested
    fn is_xinclude_aware(&self) -> bool;

    /// Request XInclude processing; readers then fail to build
    fn set_xinclude_aware(&mut self, aware: bool);

    /// Schema created readers validate against
    fn schema(&self) -> Option<Arc<CompiledSchema>>;

    /// Set or clear the schema
    fn set_schema(&mut self, schema: Option<Arc<CompiledSchema>>);

    /// Build a reader from the current configuration
    fn new_reader(&self) -> Result<Box<dyn XmlReader>>;
}

/// Factory for plain `StdXmlReader`s
#[derive(Debug, Clone, Default)]
pub struct StdParserFactory {
    config: FactoryConfig,
}

impl StdParserFactory {
    /// Create a factory with the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a factory from a configuration snapshot
    pub fn from_config(config: FactoryConfig) -> Self {
        Self { config }
    }

    /// Current configuration
    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }

    /// Mutable configuration
    pub fn config_mut(&mut self) -> &mut FactoryConfig {
        &mut self.config
    }

    /// Build a concrete reader
    pub fn new_std_reader(&self) -> Result<StdXmlReader> {
        StdXmlReader::new(self.config.clone())
    }
}

impl ParserFactory for StdParserFactory {
    fn feature(&self, name: &str) -> Result<bool> {
        self.config.feature(name)
    }

    fn set_feature(&mut self, name: &str, value: bool) -> Result<()> {
        self.config.set_feature(name, value)
    }

    fn is_namespace_aware(&self) -> bool {
        self.config.namespace_aware
    }

    fn set_namespace_aware(&mut self, aware: bool) {
        self.config.namespace_aware = aware;
    }

    fn is_validating(&self) -> bool {
        self.config.validating
    }

    fn set_validating(&mut self, validating: bool) {
        self.config.validating = validating;
    }

    fn is_xinclude_aware(&self) -> bool {
        self.config.xinclude_aware
    }

    fn set_xinclude_aware(&mut self, aware: bool) {
        self.config.xinclude_aware = aware;
    }

    fn schema(&self) -> Option<Arc<CompiledSchema>> {
        self.config.schema.clone()
    }

    fn set_schema(&mut self, schema: Option<Arc<CompiledSchema>>) {
        self.config.schema = schema;
    }

    fn new_reader(&self) -> Result<Box<dyn XmlReader>> {
        Ok(Box::new(self.new_std_reader()?))
    }
}

/// Factory whose readers find and bind the document's own schema
#[derive(Clone)]
pub struct SchemaAwareParserFactory {
    inner: StdParserFactory,
    compiler: Arc<dyn SchemaCompiler>,
    resolver: Arc<dyn UriResolver>,
}

impl Default for SchemaAwareParserFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaAwareParserFactory {
    /// Create a factory with the default compiler and URI resolver
    pub fn new() -> Self {
        Self::from_config(FactoryConfig::default())
    }

    /// Create a factory from a configuration snapshot
    pub fn from_config(config: FactoryConfig) -> Self {
        let compiler = XsdCompiler::new().with_limits(config.limits);
        Self {
            inner: StdParserFactory::from_config(config),
            compiler: Arc::new(compiler),
            resolver: Arc::new(DefaultUriResolver),
        }
    }

    /// Use another schema compiler
    pub fn with_compiler(mut self, compiler: Arc<dyn SchemaCompiler>) -> Self {
        self.compiler = compiler;
        self
    }

    /// Use another URI resolver for schema hints
    pub fn with_resolver(mut self, resolver: Arc<dyn UriResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Current configuration
    pub fn config(&self) -> &FactoryConfig {
        self.inner.config()
    }

    /// Build a schema-aware reader
    pub fn new_schema_aware_reader(&self) -> Result<SchemaAwareReader> {
        SchemaAwareReader::new(
            self.inner.config().clone(),
            self.compiler.clone(),
            self.resolver.clone(),
        )
    }

    /// Build a parser owning a schema-aware reader
    pub fn new_parser(&self) -> Result<SaxParser> {
        Ok(SaxParser {
            config: self.inner.config().clone(),
            reader: self.new_schema_aware_reader()?,
        })
    }
}

impl ParserFactory for SchemaAwareParserFactory {
    fn feature(&self, name: &str) -> Result<bool> {
        self.inner.feature(name)
    }

    fn set_feature(&mut self, name: &str, value: bool) -> Result<()> {
        self.inner.set_feature(name, value)
    }

    fn is_namespace_aware(&self) -> bool {
        self.inner.is_namespace_aware()
    }

    fn set_namespace_aware(&mut self, aware: bool) {
        self.inner.set_namespace_aware(aware)
    }

    fn is_validating(&self) -> bool {
        self.inner.is_validating()
    }

    fn set_validating(&mut self, validating: bool) {
        self.inner.set_validating(validating)
    }

    fn is_xinclude_aware(&self) -> bool {
        self.inner.is_xinclude_aware()
    }

    fn set_xinclude_aware(&mut self, aware: bool) {
        self.inner.set_xinclude_aware(aware)
    }

    fn schema(&self) -> Option<Arc<CompiledSchema>> {
        self.inner.schema()
    }

    fn set_schema(&mut self, schema: Option<Arc<CompiledSchema>>) {
        self.inner.set_schema(schema)
    }

    fn new_reader(&self) -> Result<Box<dyn XmlReader>> {
        Ok(Box::new(self.new_schema_aware_reader()?))
    }
}

/// Parser facade over one schema-aware reader
#[derive(Debug)]
pub struct SaxParser {
    config: FactoryConfig,
    reader: SchemaAwareReader,
}

impl SaxParser {
    /// The underlying reader
    pub fn xml_reader(&mut self) -> &mut SchemaAwareReader {
        &mut self.reader
    }

    /// Namespace processing as configured by the factory
    pub fn is_namespace_aware(&self) -> bool {
        self.config.namespace_aware
    }

    /// Validation as configured by the factory
    pub fn is_validating(&self) -> bool {
        self.config.validating
    }

    /// Schema configured on the factory (not the one a parse discovered)
    pub fn schema(&self) -> Option<Arc<CompiledSchema>> {
        self.config.schema.clone()
    }

    /// Read a reader property
    pub fn property(&self, name: &str) -> Result<PropertyValue> {
        self.reader.property(name)
    }

    /// Set a reader property
    pub fn set_property(&mut self, name: &str, value: PropertyValue) -> Result<()> {
        self.reader.set_property(name, value)
    }

    /// Parse with the reader's current handler registrations
    pub fn parse(&mut self, input: InputSource) -> Result<()> {
        self.reader.parse(input)
    }

    /// Register `handler` in all four roles, then parse
    pub fn parse_with<H>(&mut self, input: InputSource, handler: &Rc<RefCell<H>>) -> Result<()>
    where
        H: ContentHandler + ErrorHandler + EntityResolver + DtdHandler + 'static,
    {
        self.reader.set_handlers(Handlers::from_handler(handler));
        self.reader.parse(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::sax::{features, properties};

    #[test]
    fn test_configuration_is_delegated() {
        let mut factory = SchemaAwareParserFactory::new();
        assert!(factory.is_namespace_aware());
        assert!(!factory.is_validating());

        factory.set_validating(true);
        factory.set_namespace_aware(false);
        factory.set_feature(features::LOAD_EXTERNAL_DTD, true).unwrap();
        assert!(factory.is_validating());
        assert!(!factory.feature(features::NAMESPACES).unwrap());
        assert!(factory.config().load_external_dtd);

        let parser = factory.new_parser().unwrap();
        assert!(parser.is_validating());
        assert!(!parser.is_namespace_aware());
        assert!(parser.schema().is_none());
    }

    #[test]
    fn test_unknown_names_are_not_recognized() {
        let mut factory = SchemaAwareParserFactory::new();
        assert!(matches!(
            factory.set_feature("urn:example:no-such-feature", true),
            Err(Error::NotRecognized(_))
        ));
        let mut parser = factory.new_parser().unwrap();
        assert!(matches!(
            parser.property("urn:example:no-such-property"),
            Err(Error::NotRecognized(_))
        ));
        assert!(matches!(
            parser.set_property("urn:example:no-such-property", PropertyValue::Int(1)),
            Err(Error::NotRecognized(_))
        ));
    }

    #[test]
    fn test_xinclude_is_recorded_but_unsupported() {
        let mut factory = SchemaAwareParserFactory::new();
        factory.set_xinclude_aware(true);
        assert!(factory.is_xinclude_aware());
        assert!(matches!(factory.new_reader(), Err(Error::NotSupported(_))));
        assert!(matches!(factory.new_parser(), Err(Error::NotSupported(_))));
        assert!(matches!(
            StdParserFactory::from_config(factory.config().clone()).new_reader(),
            Err(Error::NotSupported(_))
        ));
    }

    #[test]
    fn test_properties_reach_the_reader() {
        let factory = SchemaAwareParserFactory::new();
        let mut parser = factory.new_parser().unwrap();
        parser
            .set_property(properties::MAX_ELEMENT_DEPTH, PropertyValue::Int(2))
            .unwrap();
        assert_eq!(
            parser.property(properties::MAX_ELEMENT_DEPTH).unwrap().as_int(),
            Some(2)
        );
        assert!(parser
            .parse(InputSource::from_bytes(b"<a><b><c/></b></a>".to_vec()))
            .is_err());
    }

    #[test]
    fn test_std_factory_reader_validates_with_configured_schema() {
        let schema = XsdCompiler::new()
            .compile(&crate::validators::SchemaSource::from_string(
                "memory:a.xsd",
                r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                     <xs:element name="a" type="xs:int"/>
                   </xs:schema>"#,
            ))
            .unwrap();
        let mut factory = StdParserFactory::new();
        factory.set_schema(Some(Arc::new(schema)));
        let mut reader = factory.new_reader().unwrap();
        assert!(reader.schema().is_some());
        assert!(reader.parse(InputSource::from_bytes(b"<a>12</a>".to_vec())).is_ok());
        assert!(matches!(
            reader.parse(InputSource::from_bytes(b"<a>twelve</a>".to_vec())),
            Err(Error::Validation(_))
        ));
    }
}
