//! Schema-aware reader
//!
//! `SchemaAwareReader` looks like any other `XmlReader`. Each `parse` first
//! runs a discovery pass over the document; when a schema hint turns up, the
//! schema is compiled and the inner reader is replaced by a validating one
//! carrying the same handler registrations. The real parse then runs on
//! whichever reader is current.

use crate::config::FactoryConfig;
use crate::discovery::{self, SchemaHint};
use crate::error::{Error, ParseError, Result};
use crate::factory::{ParserFactory, StdParserFactory};
use crate::loaders::Loader;
use crate::locations::UriResolver;
use crate::sax::{Handlers, InputSource, PropertyValue, StdXmlReader, XmlReader};
use crate::validators::{CompiledSchema, SchemaCompiler, SchemaSource};
use std::fmt;
use std::sync::Arc;

/// Where a `SchemaAwareReader` is in its parse cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebindState {
    /// Created, nothing parsed yet
    Initial,
    /// Running the discovery pass
    Discovering,
    /// Discovery found no hint; the base reader stays in place
    NoSchemaFound,
    /// Discovery found a hint; the schema is being bound
    SchemaFound,
    /// Running the caller-visible parse
    Parsing,
    /// Last parse finished, successfully or not
    Done,
}

/// Reader that discovers and binds the document's schema before parsing
pub struct SchemaAwareReader {
    base: FactoryConfig,
    compiler: Arc<dyn SchemaCompiler>,
    resolver: Arc<dyn UriResolver>,
    inner: Box<dyn XmlReader>,
    /// Base reader put aside while a rebound reader is active
    stashed: Option<Box<dyn XmlReader>>,
    state: RebindState,
    last_hint: Option<SchemaHint>,
}

impl SchemaAwareReader {
    /// Create a reader over the base configuration `config`
    pub fn new(
        config: FactoryConfig,
        compiler: Arc<dyn SchemaCompiler>,
        resolver: Arc<dyn UriResolver>,
    ) -> Result<Self> {
        let inner: Box<dyn XmlReader> = Box::new(StdXmlReader::new(config.clone())?);
        Ok(Self {
            base: config,
            compiler,
            resolver,
            inner,
            stashed: None,
            state: RebindState::Initial,
            last_hint: None,
        })
    }

    /// Current state
    pub fn state(&self) -> RebindState {
        self.state
    }

    /// Schema bound to the current inner reader
    pub fn active_schema(&self) -> Option<Arc<CompiledSchema>> {
        self.inner.schema()
    }

    /// Hint found by the most recent discovery pass
    pub fn last_hint(&self) -> Option<&SchemaHint> {
        self.last_hint.as_ref()
    }

    /// True while a rebound reader replaces the base reader
    pub fn is_rebound(&self) -> bool {
        self.stashed.is_some()
    }

    /// Put the base reader back, carrying the current registrations over
    fn restore_base(&mut self) {
        if let Some(mut base) = self.stashed.take() {
            base.set_handlers(self.inner.handlers().clone());
            self.inner = base;
            log::trace!("restored the base reader");
        }
    }

    fn rebind(&mut self, schema: Arc<CompiledSchema>) -> Result<()> {
        let config = FactoryConfig {
            validating: true,
            ..self.base.clone()
        }
        .with_schema(Some(schema));
        let mut reader = StdParserFactory::from_config(config).new_reader()?;
        reader.set_handlers(self.inner.handlers().clone());

        let previous = std::mem::replace(&mut self.inner, reader);
        if self.stashed.is_none() {
            self.stashed = Some(previous);
        }
        Ok(())
    }

    fn compile(&self, hint: &SchemaHint) -> Result<Arc<CompiledSchema>> {
        let schema = self
            .compiler
            .compile(&SchemaSource::from(hint.url.clone()))
            .map_err(|e| match e {
                Error::SchemaCompile(_) => e,
                other => Error::SchemaCompile(
                    ParseError::new(other.to_string()).with_location(hint.url.to_string()),
                ),
            })?;
        Ok(Arc::new(schema))
    }

    fn run(&mut self, input: InputSource) -> Result<()> {
        self.restore_base();
        self.state = RebindState::Discovering;

        let loader = Loader::new().with_limits(self.base.limits);
        let input = input.into_buffered(&loader, &self.base.limits)?;
        let system_id = input.system_id().unwrap_or("<anonymous>").to_string();

        let found = match input.duplicate() {
            Some(copy) => {
                let outcome = discovery::discover(&self.base, self.resolver.clone(), copy);
                if let Some(e) = outcome.error {
                    log::debug!("schema discovery for {} stopped early: {}", system_id, e);
                }
                outcome.hint
            }
            None => None,
        };
        self.last_hint = found.clone();

        match found {
            Some(hint) => {
                self.state = RebindState::SchemaFound;
                log::debug!("{} names schema {}", system_id, hint.url);
                let schema = self.compile(&hint)?;
                self.rebind(schema)?;
            }
            None => {
                self.state = RebindState::NoSchemaFound;
                log::debug!("no schema hint in {}", system_id);
            }
        }

        self.state = RebindState::Parsing;
        self.inner.parse(input)
    }
}

impl XmlReader for SchemaAwareReader {
    fn feature(&self, name: &str) -> Result<bool> {
        self.inner.feature(name)
    }

    fn set_feature(&mut self, name: &str, value: bool) -> Result<()> {
        self.inner.set_feature(name, value)
    }

    fn property(&self, name: &str) -> Result<PropertyValue> {
        self.inner.property(name)
    }

    fn set_property(&mut self, name: &str, value: PropertyValue) -> Result<()> {
        self.inner.set_property(name, value)
    }

    fn handlers(&self) -> &Handlers {
        self.inner.handlers()
    }

    fn handlers_mut(&mut self) -> &mut Handlers {
        self.inner.handlers_mut()
    }

    fn schema(&self) -> Option<Arc<CompiledSchema>> {
        self.inner.schema()
    }

    fn parse(&mut self, input: InputSource) -> Result<()> {
        let result = self.run(input);
        self.state = RebindState::Done;
        result
    }
}

impl fmt::Debug for SchemaAwareReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaAwareReader")
            .field("state", &self.state)
            .field("rebound", &self.stashed.is_some())
            .field("last_hint", &self.last_hint)
            .field("handlers", self.inner.handlers())
            .finish()
    }
}
