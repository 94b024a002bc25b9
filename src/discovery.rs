//! Schema hint discovery
//!
//! The discovery pass runs a plain reader over the document with a
//! `SchemaLocatorHandler` attached and reports the `xsi:schemaLocation` or
//! `xsi:noNamespaceSchemaLocation` hint it saw, resolved against the
//! document's system identifier.

use crate::config::FactoryConfig;
use crate::error::{Error, Result};
use crate::locations::UriResolver;
use crate::namespaces::{NamespaceStack, QName, XSI_NAMESPACE};
use crate::sax::{Attributes, ContentHandler, InputSource, StdXmlReader, XmlReader};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use url::Url;

/// A resolved schema location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaHint {
    /// Absolute location of the schema
    pub url: Url,
    /// Location as written in the attribute
    pub raw: String,
}

/// Content handler that records the last schema hint of a document.
///
/// Attribute prefixes are resolved through the handler's own namespace
/// stack, fed from the prefix mapping events.
pub struct SchemaLocatorHandler {
    base: Option<String>,
    resolver: Arc<dyn UriResolver>,
    namespaces: NamespaceStack,
    hint: Option<SchemaHint>,
}

impl SchemaLocatorHandler {
    /// Create a handler resolving hints against `base`
    pub fn new(base: Option<String>, resolver: Arc<dyn UriResolver>) -> Self {
        Self {
            base,
            resolver,
            namespaces: NamespaceStack::new(),
            hint: None,
        }
    }

    /// The most recent hint
    pub fn hint(&self) -> Option<&SchemaHint> {
        self.hint.as_ref()
    }

    /// Take the most recent hint out of the handler
    pub fn take_hint(&mut self) -> Option<SchemaHint> {
        self.hint.take()
    }

    fn attribute_name(&self, raw: &str) -> Result<Option<QName>> {
        if raw == "xmlns" || raw.starts_with("xmlns:") {
            return Ok(None);
        }
        self.namespaces.resolve_qname(raw, true).map(Some)
    }
}

impl ContentHandler for SchemaLocatorHandler {
    fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) -> Result<()> {
        self.namespaces.push(prefix, uri);
        Ok(())
    }

    fn end_prefix_mapping(&mut self, prefix: &str) -> Result<()> {
        self.namespaces.pop(prefix).map(|_| ())
    }

    fn start_element(&mut self, _name: &QName, attributes: &Attributes) -> Result<()> {
        let mut candidate = None;
        for attribute in attributes {
            let Some(name) = self.attribute_name(&attribute.raw_name)? else {
                continue;
            };
            if name.namespace.as_deref() != Some(XSI_NAMESPACE) {
                continue;
            }
            match name.local_name.as_str() {
                "noNamespaceSchemaLocation" => candidate = Some(attribute.value.trim().to_string()),
                "schemaLocation" => {
                    // only the first namespace/location pair is honoured
                    if let Some(location) = attribute.value.split_whitespace().nth(1) {
                        candidate = Some(location.to_string());
                    }
                }
                _ => {}
            }
        }

        if let Some(raw) = candidate {
            let url = self.resolver.resolve(&raw, self.base.as_deref())?;
            log::trace!("schema hint '{}' resolved to {}", raw, url);
            self.hint = Some(SchemaHint { url, raw });
        }
        Ok(())
    }
}

/// Outcome of a discovery pass
#[derive(Debug, Default)]
pub struct Discovery {
    /// Last hint seen before the pass ended
    pub hint: Option<SchemaHint>,
    /// Error that ended the pass early, if any
    pub error: Option<Error>,
}

/// Run a discovery pass over `input`.
///
/// The reader is built from `config` with namespaces on, no schema and no
/// validation. A failing pass still returns the hint captured before the
/// failure.
pub fn discover(
    config: &FactoryConfig,
    resolver: Arc<dyn UriResolver>,
    input: InputSource,
) -> Discovery {
    let config = FactoryConfig {
        namespace_aware: true,
        namespace_prefixes: false,
        validating: false,
        xinclude_aware: false,
        schema: None,
        ..config.clone()
    };
    let handler = Rc::new(RefCell::new(SchemaLocatorHandler::new(
        input.system_id().map(str::to_string),
        resolver,
    )));

    let error = match StdXmlReader::new(config) {
        Ok(mut reader) => {
            reader.set_content_handler(handler.clone());
            reader.parse(input).err()
        }
        Err(e) => Some(e),
    };
    let hint = handler.borrow_mut().take_hint();
    Discovery { hint, error }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locations::DefaultUriResolver;
    use crate::sax::Attribute;

    fn handler() -> SchemaLocatorHandler {
        SchemaLocatorHandler::new(
            Some("file:///data/docs/doc.xml".to_string()),
            Arc::new(DefaultUriResolver),
        )
    }

    fn attributes(pairs: &[(&str, &str)]) -> Attributes {
        let mut attributes = Attributes::new();
        for (raw, value) in pairs {
            attributes.push(Attribute {
                name: QName::local(*raw),
                raw_name: raw.to_string(),
                value: value.to_string(),
            });
        }
        attributes
    }

    #[test]
    fn test_no_namespace_location() {
        let mut h = handler();
        h.start_prefix_mapping("xsi", XSI_NAMESPACE).unwrap();
        h.start_element(
            &QName::local("doc"),
            &attributes(&[("xsi:noNamespaceSchemaLocation", "../schemas/doc.xsd")]),
        )
        .unwrap();
        let hint = h.hint().unwrap();
        assert_eq!(hint.url.as_str(), "file:///data/schemas/doc.xsd");
        assert_eq!(hint.raw, "../schemas/doc.xsd");
    }

    #[test]
    fn test_schema_location_first_pair() {
        let mut h = handler();
        h.start_prefix_mapping("i", XSI_NAMESPACE).unwrap();
        h.start_element(
            &QName::local("doc"),
            &attributes(&[("i:schemaLocation", "urn:a  a.xsd\n urn:b b.xsd")]),
        )
        .unwrap();
        assert_eq!(h.hint().unwrap().url.as_str(), "file:///data/docs/a.xsd");
    }

    #[test]
    fn test_single_token_schema_location_yields_nothing() {
        let mut h = handler();
        h.start_prefix_mapping("xsi", XSI_NAMESPACE).unwrap();
        h.start_element(
            &QName::local("doc"),
            &attributes(&[
                ("xsi:noNamespaceSchemaLocation", "kept.xsd"),
                ("xsi:schemaLocation", "urn:only-namespace"),
            ]),
        )
        .unwrap();
        assert_eq!(h.hint().unwrap().raw, "kept.xsd");
    }

    #[test]
    fn test_last_attribute_and_later_element_win() {
        let mut h = handler();
        h.start_prefix_mapping("xsi", XSI_NAMESPACE).unwrap();
        h.start_element(
            &QName::local("doc"),
            &attributes(&[
                ("xsi:schemaLocation", "urn:a first.xsd"),
                ("xsi:noNamespaceSchemaLocation", "second.xsd"),
            ]),
        )
        .unwrap();
        assert_eq!(h.hint().unwrap().raw, "second.xsd");

        h.start_element(
            &QName::local("child"),
            &attributes(&[("xsi:noNamespaceSchemaLocation", "third.xsd")]),
        )
        .unwrap();
        assert_eq!(h.hint().unwrap().raw, "third.xsd");
    }

    #[test]
    fn test_other_namespace_is_ignored() {
        let mut h = handler();
        h.start_prefix_mapping("xsi", "urn:not-the-instance-namespace").unwrap();
        h.start_element(
            &QName::local("doc"),
            &attributes(&[("xsi:noNamespaceSchemaLocation", "doc.xsd"), ("schemaLocation", "x y")]),
        )
        .unwrap();
        assert!(h.hint().is_none());
    }

    #[test]
    fn test_prefix_scope_is_restored() {
        let mut h = handler();
        h.start_prefix_mapping("p", XSI_NAMESPACE).unwrap();
        h.start_prefix_mapping("p", "urn:other").unwrap();
        h.start_element(
            &QName::local("inner"),
            &attributes(&[("p:noNamespaceSchemaLocation", "inner.xsd")]),
        )
        .unwrap();
        assert!(h.hint().is_none());

        h.end_prefix_mapping("p").unwrap();
        h.start_element(
            &QName::local("sibling"),
            &attributes(&[("p:noNamespaceSchemaLocation", "outer.xsd")]),
        )
        .unwrap();
        assert_eq!(h.hint().unwrap().raw, "outer.xsd");
    }

    #[test]
    fn test_unbound_prefix_is_an_error() {
        let mut h = handler();
        let err = h
            .start_element(
                &QName::local("doc"),
                &attributes(&[("q:noNamespaceSchemaLocation", "doc.xsd")]),
            )
            .unwrap_err();
        assert!(matches!(err, Error::UnboundPrefix(p) if p == "q"));
        assert!(h.end_prefix_mapping("q").is_err());
    }

    #[test]
    fn test_discover_keeps_hint_before_error() {
        let xml = br#"<doc xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
                          xsi:noNamespaceSchemaLocation="doc.xsd"><open></doc>"#;
        let input = InputSource::from_bytes(xml.to_vec()).with_system_id("file:///tmp/doc.xml");
        let discovery = discover(&FactoryConfig::new(), Arc::new(DefaultUriResolver), input);
        assert!(discovery.error.is_some());
        assert_eq!(discovery.hint.unwrap().url.as_str(), "file:///tmp/doc.xsd");
    }

    #[test]
    fn test_discover_ignores_namespace_settings() {
        let xml = br#"<doc xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
                          xsi:noNamespaceSchemaLocation="doc.xsd"/>"#;
        let config = FactoryConfig::new().with_namespace_aware(false);
        let input = InputSource::from_bytes(xml.to_vec()).with_system_id("file:///tmp/doc.xml");
        let discovery = discover(&config, Arc::new(DefaultUriResolver), input);
        assert!(discovery.error.is_none());
        assert!(discovery.hint.is_some());
    }
}
