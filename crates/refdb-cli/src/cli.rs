use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "refdb",
    about = "refdb — reference-resolving JSON document store",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Content root, overriding the configuration
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// JSON arguments are given inline or as `@path` to read a file.
#[derive(Subcommand)]
pub enum Command {
    /// Find entries matching a query
    Find(FindArgs),
    /// Find the first entry matching a query
    FindOne(QueryArgs),
    /// Count entries matching a query
    Count(QueryArgs),
    /// Insert a new entry
    Insert(WriteArgs),
    /// Insert or replace an entry
    Upsert(WriteArgs),
    /// Replace a whole collection
    BulkInsert(BulkArgs),
    /// Remove an entry or a whole collection
    Remove(QueryArgs),
    /// Print the effective configuration
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct QueryArgs {
    /// Query object, e.g. '{"locale":"en-us","_content_type_uid":"blog"}'
    pub query: String,
}

#[derive(Args)]
pub struct FindArgs {
    pub query: String,
    /// Options object: {"sort": {"<path>": 1|-1}, "skip": n, "limit": n}
    #[arg(long)]
    pub options: Option<String>,
    /// Sort key as `<path>` or `<path>:asc|desc`; repeatable
    #[arg(long)]
    pub sort: Vec<String>,
    /// Keep stored order
    #[arg(long, conflicts_with = "sort")]
    pub unsorted: bool,
    #[arg(long)]
    pub skip: Option<usize>,
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Args)]
pub struct WriteArgs {
    /// Entry document: {locale, _uid, _content_type_uid, _data}
    pub document: String,
    /// Rewrite raw uids into reference fields using the content type's
    /// stored reference index
    #[arg(long)]
    pub shape_references: bool,
}

#[derive(Args)]
pub struct BulkArgs {
    /// Array of payloads, each carrying a `uid`
    pub entries: String,
    #[arg(short, long)]
    pub locale: String,
    #[arg(long = "content-type")]
    pub content_type: String,
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Print as JSON instead of TOML
    #[arg(long)]
    pub json: bool,
}
