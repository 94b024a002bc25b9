//! XML namespace handling
//!
//! This module provides qualified names and the prefix binding stack used
//! while walking a document's events. Each prefix maps to a stack of URIs so
//! that nested re-declarations are restored when their scope ends.

use crate::error::{Error, Result};
use crate::names::split_qname;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// XML Schema namespace
pub const XSD_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";

/// XML Schema instance namespace (`xsi:` attributes)
pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// XML namespace, implicitly bound to the `xml` prefix
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// XMLNS namespace
pub const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";

/// Qualified name: namespace, local name and the prefix the author used.
///
/// Equality and hashing only consider the namespace and the local name.
#[derive(Debug, Clone, Eq)]
pub struct QName {
    /// Namespace URI (None for no namespace)
    pub namespace: Option<String>,
    /// Local name
    pub local_name: String,
    /// Prefix as written in the document
    pub prefix: Option<String>,
}

impl QName {
    /// Create a new QName
    pub fn new(namespace: Option<impl Into<String>>, local_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.map(|s| s.into()),
            local_name: local_name.into(),
            prefix: None,
        }
    }

    /// Create a QName without a namespace
    pub fn local(local_name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            local_name: local_name.into(),
            prefix: None,
        }
    }

    /// Create a QName with a namespace
    pub fn namespaced(namespace: impl Into<String>, local_name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            local_name: local_name.into(),
            prefix: None,
        }
    }

    /// Attach the prefix the name was written with
    pub fn with_prefix(mut self, prefix: Option<impl Into<String>>) -> Self {
        self.prefix = prefix.map(|p| p.into());
        self
    }

    /// Name as written in the document (`prefix:local` or `local`)
    pub fn qualified(&self) -> String {
        match &self.prefix {
            Some(p) if !p.is_empty() => format!("{}:{}", p, self.local_name),
            _ => self.local_name.clone(),
        }
    }

    /// Check namespace and local name at once
    pub fn matches(&self, namespace: Option<&str>, local_name: &str) -> bool {
        self.namespace.as_deref() == namespace && self.local_name == local_name
    }
}

impl PartialEq for QName {
    fn eq(&self, other: &Self) -> bool {
        self.namespace == other.namespace && self.local_name == other.local_name
    }
}

impl Hash for QName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.namespace.hash(state);
        self.local_name.hash(state);
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{{{}}}{}", ns, self.local_name),
            None => write!(f, "{}", self.local_name),
        }
    }
}

/// Prefix bindings in scope during a streaming element walk.
///
/// Each `push` must be matched by exactly one `pop` for the same prefix.
/// The empty prefix is the default namespace.
#[derive(Debug, Clone, Default)]
pub struct NamespaceStack {
    bindings: HashMap<String, Vec<String>>,
}

impl NamespaceStack {
    /// Create an empty stack
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `prefix` to `uri` until the matching `pop`
    pub fn push(&mut self, prefix: &str, uri: &str) {
        self.bindings
            .entry(prefix.to_string())
            .or_default()
            .push(uri.to_string());
    }

    /// End the innermost binding of `prefix`, returning its URI
    pub fn pop(&mut self, prefix: &str) -> Result<String> {
        self.bindings
            .get_mut(prefix)
            .and_then(Vec::pop)
            .ok_or_else(|| {
                Error::Namespace(format!("end of scope for prefix '{}' that is not bound", prefix))
            })
    }

    /// Current binding of `prefix`, if any
    pub fn lookup(&self, prefix: &str) -> Option<&str> {
        if prefix == "xml" {
            return Some(XML_NAMESPACE);
        }
        self.bindings
            .get(prefix)
            .and_then(|stack| stack.last())
            .map(String::as_str)
    }

    /// Current binding of `prefix`, failing when it is unbound
    pub fn resolve(&self, prefix: &str) -> Result<&str> {
        self.lookup(prefix)
            .ok_or_else(|| Error::UnboundPrefix(prefix.to_string()))
    }

    /// Number of bindings stacked for `prefix`
    pub fn depth(&self, prefix: &str) -> usize {
        self.bindings.get(prefix).map_or(0, Vec::len)
    }

    /// Resolve an element name; unprefixed names take the default namespace
    pub fn resolve_element_name(&self, raw: &str) -> Result<QName> {
        match split_qname(raw) {
            (Some(prefix), local) => {
                let uri = self.resolve(prefix)?;
                Ok(QName::namespaced(uri, local).with_prefix(Some(prefix)))
            }
            (None, local) => {
                // xmlns="" undeclares the default namespace
                let namespace = self.lookup("").filter(|uri| !uri.is_empty());
                Ok(QName::new(namespace, local))
            }
        }
    }

    /// Resolve an attribute name; unprefixed attributes are in no namespace
    pub fn resolve_attribute_name(&self, raw: &str) -> Result<QName> {
        match split_qname(raw) {
            (Some(prefix), local) => {
                let uri = self.resolve(prefix)?;
                Ok(QName::namespaced(uri, local).with_prefix(Some(prefix)))
            }
            (None, local) => Ok(QName::local(local)),
        }
    }

    /// Resolve a raw `prefix:local` name in element or attribute position
    pub fn resolve_qname(&self, raw: &str, is_attribute: bool) -> Result<QName> {
        if is_attribute {
            self.resolve_attribute_name(raw)
        } else {
            self.resolve_element_name(raw)
        }
    }

    /// Drop every binding
    pub fn clear(&mut self) {
        self.bindings.clear();
    }
}
