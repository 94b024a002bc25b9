//! Command-line interface for xsi-discovery

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};

#[cfg(feature = "cli")]
use std::cell::RefCell;
#[cfg(feature = "cli")]
use std::fs::File;
#[cfg(feature = "cli")]
use std::io::{self, BufWriter, Write};
#[cfg(feature = "cli")]
use std::path::{Path, PathBuf};
#[cfg(feature = "cli")]
use std::rc::Rc;
#[cfg(feature = "cli")]
use std::sync::Arc;

#[cfg(feature = "cli")]
use xsi_discovery::error::ValidationError;
#[cfg(feature = "cli")]
use xsi_discovery::locations::DefaultUriResolver;
#[cfg(feature = "cli")]
use xsi_discovery::sax::{ContentHandler, DtdHandler, EntityResolver, ErrorHandler};
#[cfg(feature = "cli")]
use xsi_discovery::{discover, FactoryConfig, InputSource, SchemaAwareParserFactory, XmlCopier};

#[cfg(feature = "cli")]
#[derive(Parser, Debug)]
#[command(name = "xsi-discovery")]
#[command(author, version, about = "Parse XML documents against the schema they name", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[cfg(feature = "cli")]
#[derive(Subcommand, Debug)]
enum Commands {
    /// Parse a document (validating when it names a schema) and copy it out
    Copy {
        /// Path to the XML file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the schema hint a document carries
    Discover {
        /// Path to the XML file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Validate a document against the schema it names
    Validate {
        /// Path to the XML file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

#[cfg(feature = "cli")]
fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Copy { file, output } => cmd_copy(file, output),
        Commands::Discover { file, json } => cmd_discover(file, json),
        Commands::Validate { file } => cmd_validate(file),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(feature = "cli")]
fn input_for(file: &Path) -> InputSource {
    InputSource::from_system_id(file.to_string_lossy().to_string())
}

#[cfg(feature = "cli")]
fn cmd_copy(file: PathBuf, output: Option<PathBuf>) -> Result<bool, Box<dyn std::error::Error>> {
    let sink: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout())),
    };
    let copier = Rc::new(RefCell::new(XmlCopier::new(sink)));

    let mut parser = SchemaAwareParserFactory::new().new_parser()?;
    parser.parse_with(input_for(&file), &copier)?;

    let copier = copier.borrow();
    for error in copier.validation_errors() {
        eprintln!("  - {}", error);
    }
    Ok(copier.validation_errors().is_empty())
}

#[cfg(feature = "cli")]
#[derive(serde::Serialize)]
struct HintReport {
    file: String,
    schema: Option<String>,
    attribute_value: Option<String>,
    error: Option<String>,
}

#[cfg(feature = "cli")]
fn cmd_discover(file: PathBuf, json_output: bool) -> Result<bool, Box<dyn std::error::Error>> {
    let outcome = discover(&FactoryConfig::new(), Arc::new(DefaultUriResolver), input_for(&file));

    let report = HintReport {
        file: file.display().to_string(),
        schema: outcome.hint.as_ref().map(|h| h.url.to_string()),
        attribute_value: outcome.hint.as_ref().map(|h| h.raw.clone()),
        error: outcome.error.as_ref().map(|e| e.to_string()),
    };

    if json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        match (&report.schema, &report.attribute_value) {
            (Some(schema), Some(raw)) => {
                println!("Schema: {}", schema);
                println!("  Attribute value: {}", raw);
            }
            _ => println!("No schema hint found"),
        }
        if let Some(error) = &report.error {
            println!("  Discovery stopped early: {}", error);
        }
    }
    Ok(true)
}

/// Handler that only collects validation errors
#[cfg(feature = "cli")]
#[derive(Default)]
struct ErrorCollector {
    errors: Vec<ValidationError>,
}

#[cfg(feature = "cli")]
impl ContentHandler for ErrorCollector {}

#[cfg(feature = "cli")]
impl ErrorHandler for ErrorCollector {
    fn error(&mut self, error: &ValidationError) -> xsi_discovery::Result<()> {
        self.errors.push(error.clone());
        Ok(())
    }
}

#[cfg(feature = "cli")]
impl EntityResolver for ErrorCollector {}

#[cfg(feature = "cli")]
impl DtdHandler for ErrorCollector {}

#[cfg(feature = "cli")]
fn cmd_validate(file: PathBuf) -> Result<bool, Box<dyn std::error::Error>> {
    let collector = Rc::new(RefCell::new(ErrorCollector::default()));
    let mut parser = SchemaAwareParserFactory::new().new_parser()?;
    parser.parse_with(input_for(&file), &collector)?;

    let schema = parser.xml_reader().last_hint().map(|h| h.url.to_string());
    let collector = collector.borrow();
    let errors = &collector.errors;

    match schema {
        Some(url) => println!("Schema: {}", url),
        None => println!("No schema hint found; checked well-formedness only"),
    }
    if errors.is_empty() {
        println!("✓ Document is valid");
        Ok(true)
    } else {
        println!("✗ Document is invalid");
        println!();
        println!("Errors:");
        for error in errors {
            println!("  - {}", error);
        }
        Ok(false)
    }
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Rebuild with --features cli");
    std::process::exit(1);
}
