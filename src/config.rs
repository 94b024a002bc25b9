//! Reader configuration
//!
//! `FactoryConfig` is the snapshot a factory hands to every reader it builds.
//! Readers own their copy: changing a reader's features never reaches the
//! factory, and binding a schema for one parse never reaches other readers.

use crate::error::{Error, Result};
use crate::limits::Limits;
use crate::sax::{features, properties, PropertyValue};
use crate::validators::CompiledSchema;
use std::sync::Arc;

/// Configuration shared by a factory and the readers it creates
#[derive(Debug, Clone)]
pub struct FactoryConfig {
    /// Process namespaces and report prefix mappings
    pub namespace_aware: bool,
    /// Report `xmlns` attributes alongside ordinary attributes
    pub namespace_prefixes: bool,
    /// Validation requested (DTD validation itself is not performed)
    pub validating: bool,
    /// XInclude processing requested
    pub xinclude_aware: bool,
    /// Load the external DTD subset when no resolver supplies it
    pub load_external_dtd: bool,
    /// Resource limits
    pub limits: Limits,
    /// Schema the reader validates against
    pub schema: Option<Arc<CompiledSchema>>,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            namespace_aware: true,
            namespace_prefixes: false,
            validating: false,
            xinclude_aware: false,
            load_external_dtd: false,
            limits: Limits::default(),
            schema: None,
        }
    }
}

impl FactoryConfig {
    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set namespace processing
    pub fn with_namespace_aware(mut self, aware: bool) -> Self {
        self.namespace_aware = aware;
        self
    }

    /// Set the limits
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set or clear the bound schema
    pub fn with_schema(mut self, schema: Option<Arc<CompiledSchema>>) -> Self {
        self.schema = schema;
        self
    }

    /// Read a feature by its standard name
    pub fn feature(&self, name: &str) -> Result<bool> {
        match name {
            features::NAMESPACES => Ok(self.namespace_aware),
            features::NAMESPACE_PREFIXES => Ok(self.namespace_prefixes),
            features::VALIDATION => Ok(self.validating),
            features::LOAD_EXTERNAL_DTD => Ok(self.load_external_dtd),
            _ => Err(Error::NotRecognized(format!("feature '{}'", name))),
        }
    }

    /// Set a feature by its standard name
    pub fn set_feature(&mut self, name: &str, value: bool) -> Result<()> {
        match name {
            features::NAMESPACES => self.namespace_aware = value,
            features::NAMESPACE_PREFIXES => self.namespace_prefixes = value,
            features::VALIDATION => self.validating = value,
            features::LOAD_EXTERNAL_DTD => self.load_external_dtd = value,
            _ => return Err(Error::NotRecognized(format!("feature '{}'", name))),
        }
        Ok(())
    }

    /// Read a property by its standard name
    pub fn property(&self, name: &str) -> Result<PropertyValue> {
        match name {
            properties::MAX_ELEMENT_DEPTH => Ok(PropertyValue::Int(self.limits.max_element_depth as i64)),
            properties::ELEMENT_ATTRIBUTE_LIMIT => {
                Ok(PropertyValue::Int(self.limits.max_attributes as i64))
            }
            _ => Err(Error::NotRecognized(format!("property '{}'", name))),
        }
    }

    /// Set a property by its standard name
    pub fn set_property(&mut self, name: &str, value: PropertyValue) -> Result<()> {
        let slot = match name {
            properties::MAX_ELEMENT_DEPTH => &mut self.limits.max_element_depth,
            properties::ELEMENT_ATTRIBUTE_LIMIT => &mut self.limits.max_attributes,
            _ => return Err(Error::NotRecognized(format!("property '{}'", name))),
        };
        let limit = value
            .as_int()
            .filter(|v| *v > 0)
            .ok_or_else(|| {
                Error::NotSupported(format!("property '{}' needs a positive integer", name))
            })?;
        *slot = limit as usize;
        Ok(())
    }
}
