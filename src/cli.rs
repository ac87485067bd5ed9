//! Command-line front end
//!
//! `compile` turns a JSON type universe into a metadata blob, `dump` lists
//! a blob's descriptors as JSON, `check` loads a blob and synthesizes every
//! class and protocol in it against an empty native runtime.

use crate::config::{BridgeConfig, ConfigError};
use crate::errors::{BridgeError, LoadError, SchemaError};
use crate::logging::{init_logging, LogFormat};
use crate::metadata::{Descriptor, DescriptorId, DescriptorKind, MetaFile, MethodMeta, PropertyMeta, TypeUniverse};
use crate::synth::TypeSynthesizer;
use clap::{Parser, Subcommand};
use metabridge_runtime::NativeRuntime;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "metabridge")]
#[command(about = "Metadata tooling for the metabridge scripting bridge", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Configuration file (defaults to the nearest .metabridge.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level override
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format override
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile a JSON type universe into a metadata blob
    Compile {
        /// Universe description (JSON)
        input: PathBuf,
        /// Output blob (defaults to the configured metadata path)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the descriptors of a metadata blob as JSON
    Dump {
        /// Metadata blob (defaults to the configured metadata path)
        blob: Option<PathBuf>,
        /// Pretty-print the listing
        #[arg(short, long)]
        pretty: bool,
    },

    /// Validate a blob and synthesize every class and protocol in it
    Check {
        /// Metadata blob (defaults to the configured metadata path)
        blob: Option<PathBuf>,
    },
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("cannot render listing: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{failed} of {total} descriptor(s) failed to synthesize")]
    CheckFailed { failed: usize, total: usize },
}

impl CliError {
    /// Split off errors that must end the process through `errors::terminate`
    pub fn into_fatal(self) -> Result<BridgeError, Self> {
        match self {
            Self::Load(err) => Ok(BridgeError::FatalLoad(err)),
            other => Err(other),
        }
    }
}

/// Parse arguments, set up logging, and run the command
pub fn cli_main() -> Result<(), CliError> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    let mut log_config = config.logging.to_log_config();
    if let Some(format) = cli.log_format {
        log_config = log_config.with_format(format);
    }
    let _guard = init_logging(log_config);

    run(&cli.command, &config)
}

fn resolve_config(cli: &Cli) -> Result<BridgeConfig, CliError> {
    let config = match &cli.config {
        Some(path) => BridgeConfig::load(path)?,
        None => BridgeConfig::discover(),
    };
    Ok(config
        .with_env_overrides()
        .with_overrides(None, cli.log_level.clone()))
}

/// Execute one command against a resolved configuration
pub fn run(command: &Command, config: &BridgeConfig) -> Result<(), CliError> {
    match command {
        Command::Compile { input, output } => {
            let output = output.clone().unwrap_or_else(|| config.metadata_path());
            let size = compile(input, &output)?;
            println!("wrote {} ({} bytes)", output.display(), size);
        }
        Command::Dump { blob, pretty } => {
            let meta = load(blob.as_deref(), config)?;
            println!("{}", dump(&meta, *pretty)?);
        }
        Command::Check { blob } => {
            let meta = load(blob.as_deref(), config)?;
            let total = check(Arc::new(meta))?;
            println!("ok: {} class(es) and protocol(s) synthesized", total);
        }
    }
    Ok(())
}

fn load(blob: Option<&Path>, config: &BridgeConfig) -> Result<MetaFile, CliError> {
    let path = blob.map_or_else(|| config.metadata_path(), Path::to_path_buf);
    Ok(MetaFile::load(path)?)
}

/// Compile `input` into a blob at `output`; returns the blob size
pub fn compile(input: &Path, output: &Path) -> Result<usize, CliError> {
    let text = fs::read_to_string(input).map_err(|source| CliError::Read {
        path: input.to_path_buf(),
        source,
    })?;
    let bytes = TypeUniverse::from_json(&text)?.encode()?;

    // A blob that does not load back is never written
    MetaFile::from_bytes(bytes.clone())?;
    fs::write(output, &bytes).map_err(|source| CliError::Write {
        path: output.to_path_buf(),
        source,
    })?;
    info!(
        event = "metadata_compiled",
        input = %input.display(),
        output = %output.display(),
        bytes = bytes.len(),
        "compiled"
    );
    Ok(bytes.len())
}

#[derive(Serialize)]
struct DescriptorListing {
    id: String,
    name: String,
    kind: DescriptorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    base: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    protocols: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    methods: Vec<MemberListing>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    properties: Vec<MemberListing>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<MemberListing>,
    #[serde(skip_serializing_if = "Option::is_none")]
    signature: Option<String>,
}

#[derive(Serialize)]
struct MemberListing {
    name: String,
    #[serde(rename = "type")]
    ty: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    flags: Vec<&'static str>,
}

fn method_listing(meta: &MetaFile, method: &MethodMeta<'_>) -> MemberListing {
    let flags = [
        (method.is_static(), "static"),
        (method.is_initializer(), "initializer"),
        (method.owns_return(), "owning"),
        (method.is_optional(), "optional"),
    ];
    MemberListing {
        name: format!("{} ({})", method.name(), method.selector()),
        ty: meta.signature_text(&method.signature()),
        flags: flags.iter().filter(|(on, _)| *on).map(|(_, flag)| *flag).collect(),
    }
}

fn property_listing(meta: &MetaFile, property: &PropertyMeta<'_>) -> MemberListing {
    let flags = [(property.is_static(), "static"), (property.is_readonly(), "readonly")];
    MemberListing {
        name: property.name().to_string(),
        ty: meta.type_name(&property.ty()),
        flags: flags.iter().filter(|(on, _)| *on).map(|(_, flag)| *flag).collect(),
    }
}

/// JSON listing of every descriptor, in name order
pub fn dump(meta: &MetaFile, pretty: bool) -> Result<String, CliError> {
    let name_of = |id: DescriptorId| meta.descriptor(id).map_or_else(|| id.to_string(), |d| d.name().to_string());

    let listing: Vec<DescriptorListing> = meta
        .descriptors()
        .map(|descriptor| {
            let mut entry = DescriptorListing {
                id: descriptor.id().to_string(),
                name: descriptor.name().to_string(),
                kind: descriptor.kind(),
                base: None,
                protocols: Vec::new(),
                methods: meta
                    .methods_of(&descriptor)
                    .iter()
                    .map(|m| method_listing(meta, m))
                    .collect(),
                properties: meta
                    .properties_of(&descriptor)
                    .iter()
                    .map(|p| property_listing(meta, p))
                    .collect(),
                fields: Vec::new(),
                signature: None,
            };
            match descriptor {
                Descriptor::Interface(interface) => {
                    entry.base = interface.base().map(name_of);
                    entry.protocols = interface.protocols().map(name_of).collect();
                }
                Descriptor::Protocol(protocol) => {
                    entry.protocols = protocol.protocols().map(name_of).collect();
                }
                Descriptor::Struct(layout) => {
                    entry.fields = layout
                        .fields()
                        .iter()
                        .map(|field| MemberListing {
                            name: field.name.to_string(),
                            ty: meta.type_name(&field.ty),
                            flags: Vec::new(),
                        })
                        .collect();
                }
                Descriptor::Function(function) => {
                    entry.signature = Some(meta.signature_text(&function.signature()));
                }
            }
            entry
        })
        .collect();

    Ok(if pretty {
        serde_json::to_string_pretty(&listing)?
    } else {
        serde_json::to_string(&listing)?
    })
}

/// Synthesize every class and protocol; returns how many were built
pub fn check(meta: Arc<MetaFile>) -> Result<usize, CliError> {
    let synthesizer = TypeSynthesizer::new(Arc::clone(&meta), Arc::new(NativeRuntime::new()));

    let mut total = 0;
    let mut failed = 0;
    for descriptor in meta.descriptors() {
        if !matches!(descriptor, Descriptor::Interface(_) | Descriptor::Protocol(_)) {
            continue;
        }
        total += 1;
        if let Err(err) = synthesizer.synthesize(descriptor.id()) {
            failed += 1;
            report(descriptor.name(), &err);
        }
    }

    if failed > 0 {
        return Err(CliError::CheckFailed { failed, total });
    }
    Ok(total)
}

fn report(name: &str, err: &BridgeError) {
    error!(event = "check_failed", descriptor = name, error = %err, "synthesis failed");
    eprintln!("{}: {}", name, err);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{metafile, universe};

    fn write_universe(dir: &Path) -> PathBuf {
        let path = dir.join("universe.json");
        fs::write(&path, serde_json::to_string(&universe()).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_compile_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_universe(dir.path());
        let output = dir.path().join("metadata.bin");

        let size = compile(&input, &output).unwrap();
        assert_eq!(fs::metadata(&output).unwrap().len() as usize, size);

        let meta = MetaFile::load(&output).unwrap();
        assert!(meta.resolve("Circle").is_some());
        assert!(meta.resolve("hypot").is_some());
    }

    #[test]
    fn test_compile_rejects_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("broken.json");
        fs::write(&input, "{ \"interfaces\": [").unwrap();

        let err = compile(&input, &dir.path().join("out.bin")).unwrap_err();
        assert!(matches!(err, CliError::Schema(_)));
        assert!(!dir.path().join("out.bin").exists());
    }

    #[test]
    fn test_dump_lists_members() {
        let listing: serde_json::Value =
            serde_json::from_str(&dump(&metafile(), false).unwrap()).unwrap();
        let entries = listing.as_array().unwrap();
        assert_eq!(entries.len(), 6);

        let circle = entries.iter().find(|e| e["name"] == "Circle").unwrap();
        assert_eq!(circle["kind"], "interface");
        assert_eq!(circle["base"], "Shape");

        let point = entries.iter().find(|e| e["name"] == "Point").unwrap();
        assert_eq!(point["fields"][1]["name"], "y");

        let hypot = entries.iter().find(|e| e["name"] == "hypot").unwrap();
        assert_eq!(hypot["signature"], "f64(f64, f64)");
    }

    #[test]
    fn test_check_synthesizes_everything() {
        assert_eq!(check(metafile()).unwrap(), 4);
    }

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["metabridge", "--log-format", "json", "dump", "x.bin", "-p"]).unwrap();
        assert_eq!(cli.log_format, Some(LogFormat::Json));
        assert!(matches!(cli.command, Command::Dump { pretty: true, .. }));

        assert!(Cli::try_parse_from(["metabridge", "--log-format", "xml", "check"]).is_err());

        let cli = Cli::try_parse_from(["metabridge", "check", "x.bin", "--log-format", "compact"]).unwrap();
        assert_eq!(cli.log_format, Some(LogFormat::Compact));
    }

    #[test]
    fn test_load_errors_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = CliError::from(MetaFile::load(dir.path().join("absent.bin")).unwrap_err());
        let fatal = err.into_fatal().unwrap();
        assert!(fatal.is_fatal());

        let err = CliError::CheckFailed { failed: 1, total: 2 };
        assert!(matches!(err.into_fatal(), Err(CliError::CheckFailed { .. })));
    }
}
