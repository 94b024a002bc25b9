//! Document input sources

use crate::error::{Error, Result};
use crate::limits::Limits;
use crate::loaders::Loader;
use std::fmt;
use std::io::Read;

enum Payload {
    None,
    Bytes(Vec<u8>),
    Stream(Box<dyn Read>),
}

/// A document to parse: a system identifier, a payload, or both.
///
/// The system identifier doubles as the base URI for relative references.
/// Without a payload the document is loaded from the system identifier.
pub struct InputSource {
    system_id: Option<String>,
    public_id: Option<String>,
    payload: Payload,
}

impl InputSource {
    /// Source loaded from a URL or file path
    pub fn from_system_id(system_id: impl Into<String>) -> Self {
        Self {
            system_id: Some(system_id.into()),
            public_id: None,
            payload: Payload::None,
        }
    }

    /// Source backed by an in-memory document
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            system_id: None,
            public_id: None,
            payload: Payload::Bytes(bytes.into()),
        }
    }

    /// Source backed by a single-use stream
    pub fn from_reader(reader: impl Read + 'static) -> Self {
        Self {
            system_id: None,
            public_id: None,
            payload: Payload::Stream(Box::new(reader)),
        }
    }

    /// Set the system identifier
    pub fn with_system_id(mut self, system_id: impl Into<String>) -> Self {
        self.system_id = Some(system_id.into());
        self
    }

    /// Set the public identifier
    pub fn with_public_id(mut self, public_id: impl Into<String>) -> Self {
        self.public_id = Some(public_id.into());
        self
    }

    /// System identifier (base URI)
    pub fn system_id(&self) -> Option<&str> {
        self.system_id.as_deref()
    }

    /// Public identifier
    pub fn public_id(&self) -> Option<&str> {
        self.public_id.as_deref()
    }

    /// True when the payload is a single-use stream
    pub fn is_stream(&self) -> bool {
        matches!(self.payload, Payload::Stream(_))
    }

    /// Copy of the source, unless it wraps a single-use stream
    pub fn duplicate(&self) -> Option<InputSource> {
        let payload = match &self.payload {
            Payload::None => Payload::None,
            Payload::Bytes(bytes) => Payload::Bytes(bytes.clone()),
            Payload::Stream(_) => return None,
        };
        Some(Self {
            system_id: self.system_id.clone(),
            public_id: self.public_id.clone(),
            payload,
        })
    }

    /// Read the whole document into memory so it can be parsed repeatedly
    pub fn into_buffered(self, loader: &Loader, limits: &Limits) -> Result<InputSource> {
        if let Payload::Bytes(_) = self.payload {
            return Ok(self);
        }
        let system_id = self.system_id.clone();
        let public_id = self.public_id.clone();
        let bytes = self.read_all(loader, limits)?;
        Ok(Self {
            system_id,
            public_id,
            payload: Payload::Bytes(bytes),
        })
    }

    /// Consume the source, returning the document bytes
    pub fn read_all(self, loader: &Loader, limits: &Limits) -> Result<Vec<u8>> {
        let bytes = match self.payload {
            Payload::Bytes(bytes) => bytes,
            Payload::Stream(mut reader) => {
                let mut bytes = Vec::new();
                reader.read_to_end(&mut bytes)?;
                bytes
            }
            Payload::None => {
                let system_id = self.system_id.as_deref().ok_or_else(|| {
                    Error::Resource("input source has neither content nor system id".to_string())
                })?;
                loader.load_system_id(system_id)?
            }
        };
        limits.check_document_size(bytes.len())?;
        Ok(bytes)
    }
}

impl fmt::Debug for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let payload = match &self.payload {
            Payload::None => "none".to_string(),
            Payload::Bytes(b) => format!("{} bytes", b.len()),
            Payload::Stream(_) => "stream".to_string(),
        };
        f.debug_struct("InputSource")
            .field("system_id", &self.system_id)
            .field("public_id", &self.public_id)
            .field("payload", &payload)
            .finish()
    }
}
