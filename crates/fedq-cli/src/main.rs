//! fedq command-line client
//!
//! Builds a connector from a configuration file and runs one query against it.

mod formatter;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use fedq_core::ops::SortByConnector;
use fedq_core::proto::{OrderSpec, Predicate, Query};
use fedq_core::{storage_cache, CacheBackend, Config, Connector, ConnectorRegistry};
use formatter::OutputFormat;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// fedq command-line client
#[derive(Parser, Debug)]
#[command(name = "fedq")]
#[command(version, about = "Query configured connectors")]
pub struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "fedq.json")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a READ query
    Query {
        /// Configured connector name
        connector: String,

        /// Object (collection) to query
        #[arg(long, default_value = "")]
        object: String,

        /// Comma-separated attributes to return (all when omitted)
        #[arg(long, value_delimiter = ',')]
        attributes: Vec<String>,

        /// Filter, e.g. "age >= 18 AND name != \"bob\""
        #[arg(long)]
        filter: Option<String>,

        /// Comma-separated sort attributes; prefix with '-' for descending
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        sort: Vec<String>,

        #[arg(long)]
        offset: Option<usize>,

        #[arg(long)]
        limit: Option<usize>,

        /// Output format
        #[arg(long, default_value = "table", value_enum)]
        format: OutputFormat,
    },

    /// List the attributes a connector exposes
    Attributes {
        connector: String,

        #[arg(long, default_value = "")]
        object: String,

        /// Output format
        #[arg(long, default_value = "table", value_enum)]
        format: OutputFormat,
    },

    /// Remove every cached result of a connector
    ClearCache { connector: String },
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fedq=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_file(&args.config)?;
    let registry = ConnectorRegistry::with_builtins();

    match args.command {
        Command::Query {
            connector,
            object,
            attributes,
            filter,
            sort,
            offset,
            limit,
            format,
        } => {
            let mut query = Query::read(object).with_attributes(attributes);
            if let Some(filter) = filter {
                query = query.with_filter(filter.parse::<Predicate>()?);
            }
            if let Some(offset) = offset {
                query = query.with_offset(offset);
            }
            if let Some(limit) = limit {
                query = query.with_limit(limit);
            }
            let order = parse_order(&sort);
            for spec in &order {
                query = query.with_order(spec.clone());
            }

            let mut root = registry.build(&config, &connector)?;
            if !order.is_empty() {
                root = Arc::new(SortByConnector::with_order(root, order));
            }

            let result = root.query(&query)?;
            println!("{}", formatter::create_formatter(format).format_result(&result));
        }
        Command::Attributes {
            connector,
            object,
            format,
        } => {
            let root = registry.build(&config, &connector)?;
            let attributes = root.attributes(&object);
            println!("{}", formatter::create_formatter(format).format_attributes(&attributes));
        }
        Command::ClearCache { connector } => match storage_cache(&config, &connector)? {
            Some(cache) => {
                cache.clear_cache()?;
                info!(connector = %connector, dir = %cache.base_dir().display(), "Cache cleared");
            }
            None => info!(connector = %connector, "Connector is not cached"),
        },
    }

    Ok(())
}

/// Parse `a,-b` into ascending `a` then descending `b`.
fn parse_order(specs: &[String]) -> Vec<OrderSpec> {
    specs
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| match s.strip_prefix('-') {
            Some(field) => OrderSpec::desc(field),
            None => OrderSpec::asc(s.strip_prefix('+').unwrap_or(s)),
        })
        .collect()
}
