//! Reader interface and the default quick-xml based reader

use super::dtd::{self, DtdDeclaration, EntityTable};
use super::{
    Attribute, Attributes, ContentHandler, Handlers, InputSource, PropertyValue,
    SharedContentHandler, SharedDtdHandler, SharedEntityResolver, SharedErrorHandler,
};
use crate::config::FactoryConfig;
use crate::error::{Error, Result, SaxParseError, ValidationError};
use crate::loaders::Loader;
use crate::locations::{DefaultUriResolver, UriResolver};
use crate::namespaces::{NamespaceStack, QName, XMLNS_NAMESPACE, XML_NAMESPACE};
use crate::validators::{CompiledSchema, Validator};
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::Reader;
use std::sync::Arc;

/// A SAX-style reader: configuration, four handler registrations, parse.
pub trait XmlReader {
    /// Read a feature
    fn feature(&self, name: &str) -> Result<bool>;

    /// Set a feature
    fn set_feature(&mut self, name: &str, value: bool) -> Result<()>;

    /// Read a property
    fn property(&self, name: &str) -> Result<PropertyValue>;

    /// Set a property
    fn set_property(&mut self, name: &str, value: PropertyValue) -> Result<()>;

    /// Current handler registrations
    fn handlers(&self) -> &Handlers;

    /// Mutable handler registrations
    fn handlers_mut(&mut self) -> &mut Handlers;

    /// Schema the reader validates against, if any
    fn schema(&self) -> Option<Arc<CompiledSchema>>;

    /// Parse a document, reporting to the registered handlers
    fn parse(&mut self, input: InputSource) -> Result<()>;

    /// Parse the document named by a URL or file path
    fn parse_system_id(&mut self, system_id: &str) -> Result<()> {
        self.parse(InputSource::from_system_id(system_id))
    }

    /// Replace all four registrations at once
    fn set_handlers(&mut self, handlers: Handlers) {
        *self.handlers_mut() = handlers;
    }

    /// Registered content handler
    fn content_handler(&self) -> Option<SharedContentHandler> {
        self.handlers().content.clone()
    }

    /// Register the content handler
    fn set_content_handler(&mut self, handler: SharedContentHandler) {
        self.handlers_mut().content = Some(handler);
    }

    /// Registered error handler
    fn error_handler(&self) -> Option<SharedErrorHandler> {
        self.handlers().error.clone()
    }

    /// Register the error handler
    fn set_error_handler(&mut self, handler: SharedErrorHandler) {
        self.handlers_mut().error = Some(handler);
    }

    /// Registered entity resolver
    fn entity_resolver(&self) -> Option<SharedEntityResolver> {
        self.handlers().entity_resolver.clone()
    }

    /// Register the entity resolver
    fn set_entity_resolver(&mut self, resolver: SharedEntityResolver) {
        self.handlers_mut().entity_resolver = Some(resolver);
    }

    /// Registered DTD handler
    fn dtd_handler(&self) -> Option<SharedDtdHandler> {
        self.handlers().dtd.clone()
    }

    /// Register the DTD handler
    fn set_dtd_handler(&mut self, handler: SharedDtdHandler) {
        self.handlers_mut().dtd = Some(handler);
    }
}

/// Namespace-aware streaming reader built on quick-xml.
///
/// When its configuration carries a schema, every document is validated
/// while it is read and validation errors go to the error handler.
#[derive(Debug)]
pub struct StdXmlReader {
    config: FactoryConfig,
    handlers: Handlers,
    loader: Loader,
}

impl StdXmlReader {
    /// Create a reader from a configuration snapshot
    pub fn new(config: FactoryConfig) -> Result<Self> {
        if config.xinclude_aware {
            return Err(Error::NotSupported(
                "XInclude processing is not available".to_string(),
            ));
        }
        let loader = Loader::new().with_limits(config.limits);
        Ok(Self {
            config,
            handlers: Handlers::new(),
            loader,
        })
    }

    /// The reader's configuration
    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }
}

impl XmlReader for StdXmlReader {
    fn feature(&self, name: &str) -> Result<bool> {
        self.config.feature(name)
    }

    fn set_feature(&mut self, name: &str, value: bool) -> Result<()> {
        self.config.set_feature(name, value)
    }

    fn property(&self, name: &str) -> Result<PropertyValue> {
        self.config.property(name)
    }

    fn set_property(&mut self, name: &str, value: PropertyValue) -> Result<()> {
        self.config.set_property(name, value)?;
        self.loader = Loader::new().with_limits(self.config.limits);
        Ok(())
    }

    fn handlers(&self) -> &Handlers {
        &self.handlers
    }

    fn handlers_mut(&mut self) -> &mut Handlers {
        &mut self.handlers
    }

    fn schema(&self) -> Option<Arc<CompiledSchema>> {
        self.config.schema.clone()
    }

    fn parse(&mut self, input: InputSource) -> Result<()> {
        let system_id = input.system_id().map(str::to_string);
        let bytes = input.read_all(&self.loader, &self.config.limits)?;
        log::trace!(
            "parsing {} ({} bytes, schema: {})",
            system_id.as_deref().unwrap_or("<anonymous>"),
            bytes.len(),
            self.config.schema.is_some()
        );
        ParseRun::new(
            &self.config,
            self.handlers.clone(),
            &self.loader,
            system_id.as_deref(),
            &bytes,
        )
        .run()
    }
}

struct OpenElement {
    name: QName,
    declared: Vec<String>,
}

/// State of one parse over an in-memory document
struct ParseRun<'a> {
    config: &'a FactoryConfig,
    handlers: Handlers,
    loader: &'a Loader,
    system_id: Option<&'a str>,
    bytes: &'a [u8],
    namespaces: NamespaceStack,
    open: Vec<OpenElement>,
    validator: Option<Validator>,
    entities: EntityTable,
    root_seen: bool,
}

impl<'a> ParseRun<'a> {
    fn new(
        config: &'a FactoryConfig,
        handlers: Handlers,
        loader: &'a Loader,
        system_id: Option<&'a str>,
        bytes: &'a [u8],
    ) -> Self {
        if config.validating && config.schema.is_none() {
            log::debug!("validation requested without a schema; DTD validation is not performed");
        }
        Self {
            config,
            handlers,
            loader,
            system_id,
            bytes,
            namespaces: NamespaceStack::new(),
            open: Vec::new(),
            validator: config.schema.clone().map(Validator::new),
            entities: EntityTable::new(),
            root_seen: false,
        }
    }

    fn run(&mut self) -> Result<()> {
        let bytes = self.bytes;
        let mut reader = Reader::from_reader(bytes);
        reader.expand_empty_elements(true);

        self.content(|h| h.start_document())?;
        loop {
            let position = reader.buffer_position();
            let event = match reader.read_event() {
                Ok(event) => event,
                Err(e) => return Err(self.fatal(e.to_string(), reader.buffer_position())),
            };
            match event {
                Event::Start(start) => self.start_element(&start, position)?,
                Event::Empty(start) => {
                    self.start_element(&start, position)?;
                    self.end_element(position)?;
                }
                Event::End(_) => self.end_element(position)?,
                Event::Text(text) => {
                    let text = text
                        .unescape_with(|name| self.entities.resolve(name))
                        .map_err(|e| self.fatal(e.to_string(), position))?;
                    self.characters(&text, position)?;
                }
                Event::CData(cdata) => {
                    let raw = cdata.into_inner();
                    let text = std::str::from_utf8(&raw)
                        .map_err(|e| self.fatal(format!("invalid UTF-8 in CDATA: {}", e), position))?;
                    self.characters(text, position)?;
                }
                Event::PI(pi) => self.processing_instruction(&pi, position)?,
                Event::DocType(doctype) => self.doctype(&doctype, position)?,
                Event::Decl(_) | Event::Comment(_) => {}
                Event::Eof => break,
            }
        }

        if let Some(open) = self.open.last() {
            let message = format!(
                "unexpected end of document: element '{}' is not closed",
                open.name.qualified()
            );
            return Err(self.fatal(message, bytes.len()));
        }
        if !self.root_seen {
            return Err(self.fatal("document has no root element", bytes.len()));
        }

        let errors = match self.validator.as_mut() {
            Some(validator) => validator.end_document(),
            None => Vec::new(),
        };
        self.report(errors)?;
        self.content(|h| h.end_document())
    }

    fn start_element(&mut self, start: &BytesStart<'_>, position: usize) -> Result<()> {
        if self.open.is_empty() && self.root_seen {
            return Err(self.fatal("content after the root element", position));
        }
        self.config.limits.check_element_depth(self.open.len() + 1)?;

        let raw_name = self.utf8(start.name().as_ref(), position)?;
        let mut raw_attributes: Vec<(String, String)> = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| self.fatal(format!("malformed attribute: {}", e), position))?;
            let key = self.utf8(attr.key.as_ref(), position)?;
            let value = attr
                .unescape_value_with(|name| self.entities.resolve(name))
                .map_err(|e| self.fatal(e.to_string(), position))?
                .into_owned();
            raw_attributes.push((key, value));
        }
        self.config.limits.check_attributes(raw_attributes.len())?;

        let (name, attributes, declared) = if self.config.namespace_aware {
            self.resolve_names(&raw_name, raw_attributes, position)?
        } else {
            let mut attributes = Attributes::new();
            for (key, value) in raw_attributes {
                attributes.push(Attribute {
                    name: QName::local(key.clone()),
                    raw_name: key,
                    value,
                });
            }
            (QName::local(raw_name), attributes, Vec::new())
        };
        self.root_seen = true;

        let line = self.line_column(position).0;
        let errors = match self.validator.as_mut() {
            Some(validator) => validator.start_element(&name, &attributes, &self.namespaces, line),
            None => Vec::new(),
        };
        self.report(errors)?;

        self.content(|h| h.start_element(&name, &attributes))?;
        self.open.push(OpenElement { name, declared });
        Ok(())
    }

    /// Push the element's namespace declarations, report them, and resolve
    /// the element and attribute names in the new scope.
    fn resolve_names(
        &mut self,
        raw_name: &str,
        raw_attributes: Vec<(String, String)>,
        position: usize,
    ) -> Result<(QName, Attributes, Vec<String>)> {
        let mut declared = Vec::new();
        for (key, value) in &raw_attributes {
            let prefix = if key == "xmlns" {
                Some("")
            } else {
                key.strip_prefix("xmlns:")
            };
            let Some(prefix) = prefix else { continue };
            if prefix == "xmlns" || (prefix == "xml" && value != XML_NAMESPACE) {
                return Err(self.fatal(format!("reserved prefix '{}' cannot be declared", prefix), position));
            }
            if !prefix.is_empty() && value.is_empty() {
                return Err(self.fatal(format!("prefix '{}' cannot be undeclared", prefix), position));
            }
            self.namespaces.push(prefix, value);
            declared.push(prefix.to_string());
        }

        for prefix in &declared {
            let uri = self.namespaces.lookup(prefix).unwrap_or_default();
            self.content(|h| h.start_prefix_mapping(prefix, uri))?;
        }

        let name = self
            .namespaces
            .resolve_element_name(raw_name)
            .map_err(|e| self.fatal(e.to_string(), position))?;

        let mut attributes = Attributes::new();
        for (key, value) in raw_attributes {
            if key == "xmlns" || key.starts_with("xmlns:") {
                if self.config.namespace_prefixes {
                    let local = key.strip_prefix("xmlns:").unwrap_or("xmlns").to_string();
                    attributes.push(Attribute {
                        name: QName::namespaced(XMLNS_NAMESPACE, local),
                        raw_name: key,
                        value,
                    });
                }
                continue;
            }
            let attr_name = self
                .namespaces
                .resolve_attribute_name(&key)
                .map_err(|e| self.fatal(e.to_string(), position))?;
            if attributes.iter().any(|a| a.name == attr_name) {
                return Err(self.fatal(format!("attribute '{}' is specified twice", attr_name), position));
            }
            attributes.push(Attribute {
                name: attr_name,
                raw_name: key,
                value,
            });
        }
        Ok((name, attributes, declared))
    }

    fn end_element(&mut self, position: usize) -> Result<()> {
        let Some(element) = self.open.pop() else {
            return Err(self.fatal("end tag without a matching start tag", position));
        };

        let line = self.line_column(position).0;
        let errors = match self.validator.as_mut() {
            Some(validator) => validator.end_element(line),
            None => Vec::new(),
        };
        self.report(errors)?;

        self.content(|h| h.end_element(&element.name))?;
        for prefix in element.declared.iter().rev() {
            self.namespaces.pop(prefix)?;
            self.content(|h| h.end_prefix_mapping(prefix))?;
        }
        Ok(())
    }

    fn characters(&mut self, text: &str, position: usize) -> Result<()> {
        if self.open.is_empty() {
            if text.trim().is_empty() {
                return Ok(());
            }
            return Err(self.fatal("text outside the root element", position));
        }
        if let Some(validator) = self.validator.as_mut() {
            validator.characters(text);
        }
        self.content(|h| h.characters(text))
    }

    fn processing_instruction(&mut self, pi: &BytesText<'_>, position: usize) -> Result<()> {
        let raw = self.utf8(pi, position)?;
        let (target, data) = match raw.find(char::is_whitespace) {
            Some(split) => (&raw[..split], raw[split..].trim_start()),
            None => (raw.as_str(), ""),
        };
        self.content(|h| h.processing_instruction(target, data))
    }

    fn doctype(&mut self, content: &BytesText<'_>, position: usize) -> Result<()> {
        if self.root_seen {
            return Err(self.fatal("DOCTYPE after the root element", position));
        }
        let raw = self.utf8(content, position)?;
        let doctype = dtd::parse_doctype(&raw);

        let mut declarations = doctype
            .internal_subset
            .as_deref()
            .map(dtd::scan_declarations)
            .unwrap_or_default();
        if let Some(system_id) = doctype.system_id.as_deref() {
            declarations.extend(self.external_subset(
                doctype.public_id.as_deref(),
                system_id,
                position,
            )?);
        }

        for declaration in &declarations {
            if let DtdDeclaration::InternalEntity { name, value } = declaration {
                self.entities.declare(name, value);
            }
        }
        if !self.entities.is_empty() {
            log::trace!("{} internal entities declared", self.entities.len());
        }

        let Some(handler) = self.handlers.dtd.clone() else {
            return Ok(());
        };
        let mut handler = handler.borrow_mut();
        for declaration in declarations {
            match declaration {
                DtdDeclaration::Notation {
                    name,
                    public_id,
                    system_id,
                } => handler.notation_decl(&name, public_id.as_deref(), system_id.as_deref())?,
                DtdDeclaration::UnparsedEntity {
                    name,
                    public_id,
                    system_id,
                    notation,
                } => handler.unparsed_entity_decl(
                    &name,
                    public_id.as_deref(),
                    &system_id,
                    &notation,
                )?,
                DtdDeclaration::InternalEntity { .. } => {}
            }
        }
        Ok(())
    }

    /// Declarations of the external subset, when it can be obtained
    fn external_subset(
        &self,
        public_id: Option<&str>,
        system_id: &str,
        position: usize,
    ) -> Result<Vec<DtdDeclaration>> {
        let resolved = match &self.handlers.entity_resolver {
            Some(resolver) => resolver.borrow_mut().resolve_entity(public_id, system_id)?,
            None => None,
        };
        let source = match resolved {
            Some(source) => source,
            None if self.config.load_external_dtd => {
                let url = DefaultUriResolver.resolve(system_id, self.system_id)?;
                InputSource::from_system_id(url.to_string())
            }
            None => {
                self.warning(
                    format!("external DTD subset '{}' was not loaded", system_id),
                    position,
                )?;
                return Ok(Vec::new());
            }
        };
        let bytes = source.read_all(self.loader, &self.config.limits)?;
        Ok(dtd::scan_declarations(&String::from_utf8_lossy(&bytes)))
    }

    fn content<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut dyn ContentHandler) -> Result<()>,
    {
        match &self.handlers.content {
            Some(handler) => f(&mut *handler.borrow_mut()),
            None => Ok(()),
        }
    }

    fn report(&self, errors: Vec<ValidationError>) -> Result<()> {
        for error in errors {
            log::debug!("validation error: {}", error.message);
            match &self.handlers.error {
                Some(handler) => handler.borrow_mut().error(&error)?,
                None => return Err(Error::Validation(error)),
            }
        }
        Ok(())
    }

    fn warning(&self, message: String, position: usize) -> Result<()> {
        let warning = self.located(message, position);
        log::debug!("warning: {}", warning);
        match &self.handlers.error {
            Some(handler) => handler.borrow_mut().warning(&warning),
            None => Ok(()),
        }
    }

    /// Report a well-formedness error and turn it into the parse result
    fn fatal(&self, message: impl Into<String>, position: usize) -> Error {
        let error = self.located(message.into(), position);
        log::debug!("fatal error: {}", error);
        if let Some(handler) = &self.handlers.error {
            if let Err(e) = handler.borrow_mut().fatal_error(&error) {
                return e;
            }
        }
        Error::Sax(error)
    }

    fn located(&self, message: String, position: usize) -> SaxParseError {
        let (line, column) = self.line_column(position);
        SaxParseError::new(message)
            .with_system_id(self.system_id)
            .with_position(line, column)
    }

    fn line_column(&self, position: usize) -> (usize, usize) {
        let before = &self.bytes[..position.min(self.bytes.len())];
        let line = before.iter().filter(|b| **b == b'\n').count() + 1;
        let column = match before.iter().rposition(|b| *b == b'\n') {
            Some(newline) => before.len() - newline,
            None => before.len() + 1,
        };
        (line, column)
    }

    fn utf8(&self, bytes: &[u8], position: usize) -> Result<String> {
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|e| self.fatal(format!("invalid UTF-8: {}", e), position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sax::{DtdHandler, EntityResolver, ErrorHandler};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
        warnings: usize,
        fatal: usize,
    }

    impl ContentHandler for Recorder {
        fn start_document(&mut self) -> Result<()> {
            self.events.push("start-doc".into());
            Ok(())
        }
        fn end_document(&mut self) -> Result<()> {
            self.events.push("end-doc".into());
            Ok(())
        }
        fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) -> Result<()> {
            self.events.push(format!("map {}={}", prefix, uri));
            Ok(())
        }
        fn end_prefix_mapping(&mut self, prefix: &str) -> Result<()> {
            self.events.push(format!("unmap {}", prefix));
            Ok(())
        }
        fn start_element(&mut self, name: &QName, attributes: &Attributes) -> Result<()> {
            let attrs: Vec<String> = attributes
                .iter()
                .map(|a| format!("{}={}", a.name, a.value))
                .collect();
            self.events.push(format!("<{} [{}]", name, attrs.join(",")));
            Ok(())
        }
        fn end_element(&mut self, name: &QName) -> Result<()> {
            self.events.push(format!("</{}", name));
            Ok(())
        }
        fn characters(&mut self, text: &str) -> Result<()> {
            if !text.trim().is_empty() {
                self.events.push(format!("text {}", text));
            }
            Ok(())
        }
        fn processing_instruction(&mut self, target: &str, data: &str) -> Result<()> {
            self.events.push(format!("pi {} {}", target, data));
            Ok(())
        }
    }

    impl ErrorHandler for Recorder {
        fn warning(&mut self, _warning: &SaxParseError) -> Result<()> {
            self.warnings += 1;
            Ok(())
        }
        fn fatal_error(&mut self, _error: &SaxParseError) -> Result<()> {
            self.fatal += 1;
            Ok(())
        }
    }

    impl EntityResolver for Recorder {
        fn resolve_entity(
            &mut self,
            _public_id: Option<&str>,
            system_id: &str,
        ) -> Result<Option<InputSource>> {
            self.events.push(format!("resolve {}", system_id));
            Ok(Some(InputSource::from_bytes(
                r#"<!NOTATION ext SYSTEM "ext/type">"#,
            )))
        }
    }

    impl DtdHandler for Recorder {
        fn notation_decl(
            &mut self,
            name: &str,
            _public_id: Option<&str>,
            _system_id: Option<&str>,
        ) -> Result<()> {
            self.events.push(format!("notation {}", name));
            Ok(())
        }
    }

    fn parse_with_recorder(config: FactoryConfig, xml: &str) -> (Result<()>, Rc<RefCell<Recorder>>) {
        let recorder = Rc::new(RefCell::new(Recorder::default()));
        let mut reader = StdXmlReader::new(config).unwrap();
        reader.set_handlers(Handlers::from_handler(&recorder));
        let result = reader.parse(InputSource::from_bytes(xml));
        (result, recorder)
    }

    #[test]
    fn test_namespace_events_in_order() {
        let xml = r#"<a:root xmlns:a="urn:a" x="1"><a:child xmlns:a="urn:b" a:y="2"/>text</a:root>"#;
        let (result, recorder) = parse_with_recorder(FactoryConfig::default(), xml);
        result.unwrap();

        assert_eq!(
            recorder.borrow().events,
            vec![
                "start-doc",
                "map a=urn:a",
                "<{urn:a}root [x=1]",
                "map a=urn:b",
                "<{urn:b}child [{urn:b}y=2]",
                "</{urn:b}child",
                "unmap a",
                "text text",
                "</{urn:a}root",
                "unmap a",
                "end-doc",
            ]
        );
    }

    #[test]
    fn test_namespace_prefixes_feature() {
        let mut config = FactoryConfig::default();
        config.namespace_prefixes = true;
        let (result, recorder) = parse_with_recorder(config, r#"<r xmlns="urn:d"/>"#);
        result.unwrap();
        assert!(recorder
            .borrow()
            .events
            .contains(&"<{urn:d}r [{http://www.w3.org/2000/xmlns/}xmlns=urn:d]".to_string()));
    }

    #[test]
    fn test_without_namespaces() {
        let config = FactoryConfig::default().with_namespace_aware(false);
        let (result, recorder) = parse_with_recorder(config, r#"<p:r xmlns:p="urn:p" p:a="v"/>"#);
        result.unwrap();
        let events = &recorder.borrow().events;
        assert!(!events.iter().any(|e| e.starts_with("map")));
        assert!(events.contains(&"<p:r [xmlns:p=urn:p,p:a=v]".to_string()));
    }

    #[test]
    fn test_unclosed_element_is_fatal() {
        let (result, recorder) = parse_with_recorder(FactoryConfig::default(), "<a><b></b>");
        match result {
            Err(Error::Sax(e)) => assert!(e.message.contains("'a' is not closed")),
            other => panic!("expected fatal error, got {:?}", other),
        }
        assert_eq!(recorder.borrow().fatal, 1);
    }

    #[test]
    fn test_unbound_prefix_is_fatal() {
        let (result, _) = parse_with_recorder(FactoryConfig::default(), "<x:a/>");
        assert!(matches!(result, Err(Error::Sax(e)) if e.message.contains("unbound prefix")));
    }

    #[test]
    fn test_mismatched_end_tag() {
        let (result, _) = parse_with_recorder(FactoryConfig::default(), "<a>\n<b></c></a>");
        let Err(Error::Sax(e)) = result else {
            panic!("expected fatal error");
        };
        assert_eq!(e.line, Some(2));
    }

    #[test]
    fn test_empty_and_trailing_content() {
        let (result, _) = parse_with_recorder(FactoryConfig::default(), "  ");
        assert!(matches!(result, Err(Error::Sax(e)) if e.message.contains("no root")));

        let (result, _) = parse_with_recorder(FactoryConfig::default(), "<a/><b/>");
        assert!(matches!(result, Err(Error::Sax(e)) if e.message.contains("after the root")));
    }

    #[test]
    fn test_processing_instruction() {
        let (result, recorder) =
            parse_with_recorder(FactoryConfig::default(), "<?xml version='1.0'?><?style href='a'?><r/>");
        result.unwrap();
        assert!(recorder
            .borrow()
            .events
            .contains(&"pi style href='a'".to_string()));
    }

    #[test]
    fn test_doctype_reports_declarations() {
        let xml = r#"<!DOCTYPE r SYSTEM "r.dtd" [<!NOTATION gif SYSTEM "image/gif">]><r/>"#;
        let (result, recorder) = parse_with_recorder(FactoryConfig::default(), xml);
        result.unwrap();
        let events = &recorder.borrow().events;
        assert!(events.contains(&"resolve r.dtd".to_string()));
        let gif = events.iter().position(|e| e == "notation gif").unwrap();
        let ext = events.iter().position(|e| e == "notation ext").unwrap();
        assert!(gif < ext);
    }

    #[test]
    fn test_internal_entities_are_expanded() {
        let xml = r#"<!DOCTYPE a [
            <!ENTITY who "world">
            <!ENTITY greeting "hello &who;">
        ]><a title="&greeting;!">hello &who; &amp; &greeting;</a>"#;
        let (result, recorder) = parse_with_recorder(FactoryConfig::default(), xml);
        result.unwrap();
        let events = &recorder.borrow().events;
        assert!(events.contains(&"<a [title=hello world!]".to_string()));
        assert!(events.contains(&"text hello world & hello world".to_string()));
    }

    #[test]
    fn test_undeclared_entity_is_fatal() {
        let (result, _) = parse_with_recorder(FactoryConfig::default(), "<a>&nobody;</a>");
        assert!(matches!(result, Err(Error::Sax(_))));
    }

    #[test]
    fn test_external_subset_skipped_without_resolver() {
        struct Warnings(usize);
        impl ErrorHandler for Warnings {
            fn warning(&mut self, _warning: &SaxParseError) -> Result<()> {
                self.0 += 1;
                Ok(())
            }
        }
        let warnings = Rc::new(RefCell::new(Warnings(0)));
        let mut reader = StdXmlReader::new(FactoryConfig::default()).unwrap();
        reader.set_error_handler(warnings.clone());
        reader
            .parse(InputSource::from_bytes(r#"<!DOCTYPE r SYSTEM "missing.dtd"><r/>"#))
            .unwrap();
        assert_eq!(warnings.borrow().0, 1);
    }

    #[test]
    fn test_depth_limit_property() {
        let mut reader = StdXmlReader::new(FactoryConfig::default()).unwrap();
        reader
            .set_property(
                crate::sax::properties::MAX_ELEMENT_DEPTH,
                PropertyValue::Int(2),
            )
            .unwrap();
        assert!(reader.parse(InputSource::from_bytes("<a><b/></a>")).is_ok());
        assert!(matches!(
            reader.parse(InputSource::from_bytes("<a><b><c/></b></a>")),
            Err(Error::LimitExceeded(_))
        ));
    }

    #[test]
    fn test_xinclude_not_supported() {
        let mut config = FactoryConfig::default();
        config.xinclude_aware = true;
        assert!(matches!(
            StdXmlReader::new(config),
            Err(Error::NotSupported(_))
        ));
    }
}
