//! Prop Shapes CLI
//!
//! Match schemas against a catalog, suggest bindings for a component,
//! evaluate expressions against records, and check expression round-trips.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use prop_shapes::{
    DefinitionResolver, EvalContext, Evaluator, Expression, InMemoryCatalog, InMemoryRecords,
    MemoryCacheStore, ShapeMatcher, ShapesConfig, StaticAdapters, StaticComponents,
    SuggestionRanker,
};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "prop-shapes")]
#[command(about = "Bind component props to structured content")]
struct Cli {
    /// Configuration file
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List expressions that can satisfy a JSON-Schema
    Match {
        /// Catalog JSON file or directory of catalog files
        #[arg(short, long)]
        catalog: PathBuf,
        /// Prop schema (JSON file)
        #[arg(short, long)]
        schema: PathBuf,
        /// Treat the prop as required
        #[arg(long)]
        required: bool,
        /// Restrict to one record type
        #[arg(long)]
        host: Option<String>,
        /// Restrict to one bundle of the host type
        #[arg(long, requires = "host")]
        bundle: Option<String>,
    },

    /// Suggest bindings for every prop of a component
    Suggest {
        #[arg(short, long)]
        catalog: PathBuf,
        /// Components (JSON array)
        #[arg(long)]
        components: PathBuf,
        /// Adapters (JSON array)
        #[arg(long)]
        adapters: Option<PathBuf>,
        /// Component id
        component: String,
        /// Only suggest fields of this record type
        #[arg(long)]
        host: Option<String>,
    },

    /// Evaluate an expression against a record
    Eval {
        #[arg(short, long)]
        catalog: PathBuf,
        /// Records (JSON array)
        #[arg(short, long)]
        records: PathBuf,
        /// Record type of the record to read
        #[arg(long)]
        record_type: String,
        /// Record id
        #[arg(long)]
        id: String,
        /// Expression string
        expression: String,
        /// Fail when the value is absent
        #[arg(long)]
        required: bool,
    },

    /// Parse an expression and print it back
    Roundtrip {
        expression: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = ShapesConfig::load_from(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Match {
            catalog,
            schema,
            required,
            host,
            bundle,
        } => {
            let catalog = load_catalog(&catalog)?;
            let document = read_json(&schema)?;
            let resolver = DefinitionResolver::from_document(&document);
            let cache = MemoryCacheStore::new();
            let mut matcher =
                ShapeMatcher::new(&catalog, &resolver).with_config(config.matching.clone());
            if config.cache.enabled {
                matcher = matcher.with_cache(&cache);
            }

            let primitive = matcher.schema_type(&document)?;
            let matches = matcher.find_matches(
                primitive,
                required,
                &document,
                host.as_deref(),
                bundle.as_deref(),
            )?;
            if matches.is_empty() {
                println!("No matches");
            }
            for expr in matches {
                println!("{}", expr);
            }
            Ok(())
        }

        Commands::Suggest {
            catalog,
            components,
            adapters,
            component,
            host,
        } => {
            let catalog = load_catalog(&catalog)?;
            let components = StaticComponents::load_from_file(&components)?;
            let adapters = match adapters {
                Some(path) => StaticAdapters::load_from_file(&path)?,
                None => StaticAdapters::default(),
            };
            let resolver = DefinitionResolver::new();
            let cache = MemoryCacheStore::new();
            let mut matcher =
                ShapeMatcher::new(&catalog, &resolver).with_config(config.matching.clone());
            if config.cache.enabled {
                matcher = matcher.with_cache(&cache);
            }

            let ranker = SuggestionRanker::new(matcher, &components, &adapters);
            let suggestions = ranker.suggest(&component, host.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&suggestions)?);
            Ok(())
        }

        Commands::Eval {
            catalog,
            records,
            record_type,
            id,
            expression,
            required,
        } => {
            let catalog = load_catalog(&catalog)?;
            let records = InMemoryRecords::load_from_file(&records)?;
            let record = records
                .get(&record_type, &id)
                .ok_or_else(|| anyhow!("no {} record with id '{}'", record_type, id))?;
            let expr: Expression = expression.parse()?;

            let evaluator = Evaluator::with_config(&catalog, &records, config.evaluation.clone());
            let value = evaluator.evaluate(Some(EvalContext::Record(record)), &expr, required)?;
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }

        Commands::Roundtrip { expression } => {
            let expr: Expression = expression.parse()?;
            let printed = expr.to_string();
            println!("{}", printed);
            if printed != expression {
                bail!("round-trip changed the expression");
            }
            Ok(())
        }
    }
}

fn load_catalog(path: &Path) -> Result<InMemoryCatalog> {
    let catalog = if path.is_dir() {
        InMemoryCatalog::load_from_directory(path)
    } else {
        InMemoryCatalog::load_from_file(path)
    };
    catalog.with_context(|| format!("loading catalog from {}", path.display()))
}

fn read_json(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(serde_json::from_str(&content)?)
}
