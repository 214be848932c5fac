//! Motif CLI - run pattern queries against TOML fixtures.
//!
//! Usage:
//!   motif plan <file>            # Show the compiled query plan
//!   motif run <file>             # Print deduplicated results
//!   motif run <file> --json      # Results as JSON

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use motif::fixture::{Fixture, LoadedFixture};
use motif::{CompiledQuery, Config, QueryOutput};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "motif")]
#[command(about = "Motif - pattern queries over a typed graph", long_about = None)]
struct Cli {
    /// Config file overriding the fixture's [config] table
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show how a fixture's query will be evaluated
    Plan {
        /// Fixture file (TOML)
        file: PathBuf,
    },

    /// Run a fixture's query and print each distinct result
    Run {
        /// Fixture file (TOML)
        file: PathBuf,

        /// Print results as a JSON array
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn setup_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("motif=debug")
        } else {
            EnvFilter::new("motif=warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Plan { file } => {
            let loaded = load(&file, cli.config.as_deref())?;
            let query = compile(&loaded)?;
            let plan = query.plan(&loaded.graph);

            println!(
                "{} slots, {} links, {} steps",
                query.slots().len(),
                query.slots().links().len(),
                plan.step_count()
            );
            print!("{}", plan.describe(query.slots()));
        }

        Commands::Run { file, json } => {
            let loaded = load(&file, cli.config.as_deref())?;
            let query = compile(&loaded)?;
            let outputs: Vec<QueryOutput> = query.outputs(&loaded.graph).collect();

            if json {
                println!("{}", serde_json::to_string_pretty(&outputs)?);
            } else {
                for output in &outputs {
                    println!("{}", render(&loaded, output));
                }
                println!("({} results)", outputs.len());
            }
        }
    }

    Ok(())
}

fn load(file: &Path, config: Option<&Path>) -> Result<LoadedFixture> {
    let mut fixture =
        Fixture::load(file).with_context(|| format!("reading fixture {}", file.display()))?;
    if let Some(path) = config {
        fixture.config =
            Config::load(path).with_context(|| format!("reading config {}", path.display()))?;
    }
    Ok(fixture.build()?)
}

fn compile(loaded: &LoadedFixture) -> Result<CompiledQuery> {
    let Some(input) = &loaded.input else {
        bail!("fixture has no query");
    };
    Ok(CompiledQuery::compile(input, loaded.graph.types())?)
}

fn render(loaded: &LoadedFixture, output: &QueryOutput) -> String {
    match output {
        QueryOutput::Single(entity) => loaded.label(entity),
        QueryOutput::List(entities) => {
            let labels: Vec<String> = entities.iter().map(|e| loaded.label(e)).collect();
            format!("[{}]", labels.join(", "))
        }
        QueryOutput::Map(entries) => {
            let labels: Vec<String> = entries
                .iter()
                .map(|(key, e)| format!("{}: {}", key, loaded.label(e)))
                .collect();
            format!("{{{}}}", labels.join(", "))
        }
    }
}
