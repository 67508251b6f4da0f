// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use measure_engine::{
    AggregationRequest, Compiler, Error, ErrorCode, ErrorKind, FunctionCatalog, RegistrationSet,
    Result, ScopeDef, ScopeDescriptor, TableSchema,
};

const VERSION: &str = "1.0";
const EXIT_FAILURE: i32 = 1;
const LOG_ENV: &str = "MEASUREC_LOG";

macro_rules! die(
    ($($arg:tt)*) => { {
        error!($($arg)*);
        std::process::exit(EXIT_FAILURE)
    } }
);

#[derive(Parser, Debug)]
#[command(name = "measurec", version = VERSION)]
#[command(about = "Lower measure definitions into aggregation registration records")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile every measure in a definition file into registration records
    Compile {
        /// Definition file (reads stdin when omitted)
        input: Option<PathBuf>,
        /// Where to write the records (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate the scopes in a definition file and print their descriptors
    Scopes {
        input: Option<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the JSON Schema of a registration record
    Schema {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// The on-disk form of a set of measures: the tables they read, the
/// aggregations to lower and the scopes they're evaluated over.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct Definition {
    schema: TableSchema,
    #[serde(default)]
    measures: Vec<AggregationRequest>,
    #[serde(default)]
    scopes: Vec<ScopeDef>,
}

fn config_error(details: String) -> Error {
    Error::new(ErrorKind::Config, ErrorCode::Generic, Some(details))
}

fn load_definition(input: Option<&Path>) -> Result<Definition> {
    let mut contents = String::new();
    match input {
        Some(path) => {
            let file = File::open(path)
                .map_err(|err| config_error(format!("{}: {err}", path.display())))?;
            BufReader::new(file)
                .read_to_string(&mut contents)
                .map_err(|err| config_error(format!("{}: {err}", path.display())))?;
        }
        None => {
            io::stdin()
                .read_to_string(&mut contents)
                .map_err(|err| config_error(format!("<stdin>: {err}")))?;
        }
    }
    serde_json::from_str(&contents).map_err(|err| config_error(format!("bad definition: {err}")))
}

/// compile lowers every measure and registers the results.  All
/// failures are logged; the first one is returned.
fn compile(definition: &Definition) -> Result<RegistrationSet> {
    let catalog = FunctionCatalog::new();
    let compiler = Compiler::new(&definition.schema, &catalog);

    let mut registry = RegistrationSet::new();
    let mut first_err = None;
    let results = compiler.compile_batch(&definition.measures);
    for (request, result) in definition.measures.iter().zip(results) {
        let registered = result.and_then(|artifact| registry.register(artifact.to_record()));
        match registered {
            Ok(fingerprint) => debug!(measure = %request.display_name(), %fingerprint, "registered"),
            Err(err) => {
                error!(measure = %request.display_name(), "{err}");
                if first_err.is_none() {
                    first_err = Some(err);
                }
            }
        }
    }

    match first_err {
        Some(err) => Err(err),
        None => Ok(registry),
    }
}

fn describe_scopes(definition: &Definition) -> Result<Vec<ScopeDescriptor>> {
    definition
        .scopes
        .iter()
        .cloned()
        .map(|def| def.into_scope().map(|scope| scope.descriptor()))
        .collect()
}

fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(|err| config_error(err.to_string()))?;
    let mut writer: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).map_err(|err| config_error(format!("{}: {err}", path.display())))?,
        )),
        None => Box::new(io::stdout().lock()),
    };
    writeln!(writer, "{json}")
        .and_then(|_| writer.flush())
        .map_err(|err| config_error(err.to_string()))
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Compile { input, output } => {
            let definition = load_definition(input.as_deref())?;
            let registry = compile(&definition)?;
            info!(
                measures = definition.measures.len(),
                records = registry.len(),
                "compiled"
            );
            write_json(&registry.records(), output.as_deref())
        }
        Command::Scopes { input, output } => {
            let definition = load_definition(input.as_deref())?;
            write_json(&describe_scopes(&definition)?, output.as_deref())
        }
        Command::Schema { output } => {
            let json = measure_engine::registration::generate_schema_json()
                .map_err(|err| config_error(err.to_string()))?;
            match output {
                Some(path) => std::fs::write(&path, json + "\n")
                    .map_err(|err| config_error(format!("{}: {err}", path.display()))),
                None => {
                    println!("{json}");
                    Ok(())
                }
            }
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli.command) {
        die!("{err}");
    }
}
