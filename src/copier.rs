//! Identity copy of a parsed document
//!
//! `XmlCopier` is a handler that writes the events it receives back out as
//! XML. Namespace declarations are written on the element that brought them
//! into scope. Validation errors are collected rather than raised, so a
//! document is copied in full even when it breaks its schema.

use crate::error::{Error, Result, ValidationError};
use crate::namespaces::{QName, XMLNS_NAMESPACE};
use crate::sax::{Attributes, ContentHandler, DtdHandler, EntityResolver, ErrorHandler};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Write;

/// Handler that serializes the event stream to a writer
pub struct XmlCopier<W: Write> {
    writer: Writer<W>,
    pending: Vec<(String, String)>,
    errors: Vec<ValidationError>,
}

impl<W: Write> XmlCopier<W> {
    /// Copy to `inner`
    pub fn new(inner: W) -> Self {
        Self {
            writer: Writer::new(inner),
            pending: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Validation errors reported while copying
    pub fn validation_errors(&self) -> &[ValidationError] {
        &self.errors
    }

    /// Give back the writer
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    fn write(&mut self, event: Event<'_>) -> Result<()> {
        self.writer
            .write_event(event)
            .map_err(|e| Error::Xml(format!("cannot write output: {}", e)))
    }
}

impl<W: Write> ContentHandler for XmlCopier<W> {
    fn start_document(&mut self) -> Result<()> {
        self.write(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
    }

    fn end_document(&mut self) -> Result<()> {
        self.writer.get_mut().flush()?;
        Ok(())
    }

    fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) -> Result<()> {
        self.pending.push((prefix.to_string(), uri.to_string()));
        Ok(())
    }

    fn start_element(&mut self, name: &QName, attributes: &Attributes) -> Result<()> {
        let qualified = name.qualified();
        let mut start = BytesStart::new(qualified.as_str());
        for (prefix, uri) in self.pending.drain(..) {
            let key = if prefix.is_empty() {
                "xmlns".to_string()
            } else {
                format!("xmlns:{}", prefix)
            };
            start.push_attribute((key.as_str(), uri.as_str()));
        }
        for attribute in attributes {
            // declarations reported as attributes were already written above
            if attribute.name.namespace.as_deref() == Some(XMLNS_NAMESPACE) {
                continue;
            }
            start.push_attribute((attribute.raw_name.as_str(), attribute.value.as_str()));
        }
        self.write(Event::Start(start))
    }

    fn end_element(&mut self, name: &QName) -> Result<()> {
        let qualified = name.qualified();
        self.write(Event::End(BytesEnd::new(qualified.as_str())))
    }

    fn characters(&mut self, text: &str) -> Result<()> {
        self.write(Event::Text(BytesText::new(text)))
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<()> {
        let content = if data.is_empty() {
            target.to_string()
        } else {
            format!("{} {}", target, data)
        };
        self.write(Event::PI(BytesText::from_escaped(content)))
    }
}

impl<W: Write> ErrorHandler for XmlCopier<W> {
    fn error(&mut self, error: &ValidationError) -> Result<()> {
        log::warn!("{}", error.message);
        self.errors.push(error.clone());
        Ok(())
    }
}

impl<W: Write> EntityResolver for XmlCopier<W> {}

impl<W: Write> DtdHandler for XmlCopier<W> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::SchemaAwareParserFactory;
    use crate::sax::InputSource;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn copy(xml: &str) -> String {
        let copier = Rc::new(RefCell::new(XmlCopier::new(Vec::new())));
        let mut parser = SchemaAwareParserFactory::new().new_parser().unwrap();
        parser
            .parse_with(InputSource::from_bytes(xml.as_bytes().to_vec()), &copier)
            .unwrap();
        // the parser holds the other registrations
        drop(parser);
        let copier = Rc::try_unwrap(copier).ok().unwrap().into_inner();
        String::from_utf8(copier.into_inner()).unwrap()
    }

    #[test]
    fn test_copy_keeps_namespaces_and_escapes() {
        let out = copy(r#"<p:doc xmlns:p="urn:p" xmlns="urn:d"><item n="a&amp;b">1 &lt; 2</item><?go now?></p:doc>"#);
        assert_eq!(
            out,
            r#"<?xml version="1.0" encoding="UTF-8"?><p:doc xmlns:p="urn:p" xmlns="urn:d"><item n="a&amp;b">1 &lt; 2</item><?go now?></p:doc>"#
        );
    }

    #[test]
    fn test_empty_elements_are_expanded() {
        assert_eq!(
            copy("<a><b/></a>"),
            r#"<?xml version="1.0" encoding="UTF-8"?><a><b></b></a>"#
        );
    }
}
