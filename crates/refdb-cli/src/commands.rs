use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use colored::Colorize;
use serde_json::Value;
use tracing::{debug, warn};

use refdb_store::{
    BulkInsert, Entry, EntryDocument, Find, FindOne, FindOptions, Query, SortOrder, Store, StoreConfig,
};

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref(), cli.root).await?;
    let store = Store::new(config);
    let format = cli.format;

    match cli.command {
        Command::Find(args) => cmd_find(&store, args, &format).await,
        Command::FindOne(args) => cmd_find_one(&store, args, &format).await,
        Command::Count(args) => cmd_count(&store, args, &format).await,
        Command::Insert(args) => cmd_write(&store, args, false, &format).await,
        Command::Upsert(args) => cmd_write(&store, args, true, &format).await,
        Command::BulkInsert(args) => cmd_bulk_insert(&store, args, &format).await,
        Command::Remove(args) => cmd_remove(&store, args, &format).await,
        Command::Config(args) => cmd_config(store.config(), args),
    }
}

async fn load_config(path: Option<&Path>, root: Option<PathBuf>) -> anyhow::Result<StoreConfig> {
    let mut config = match path {
        Some(path) => StoreConfig::load(path).await?,
        None => StoreConfig::default(),
    };
    if let Some(root) = root {
        config.content_root = root;
    }
    debug!(root = %config.content_root.display(), locales = config.locales.len(), "configuration loaded");
    Ok(config)
}

/// Parse an inline JSON argument, or the file it names with a leading `@`.
async fn read_json(input: &str) -> anyhow::Result<Value> {
    let text = match input.strip_prefix('@') {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {path}"))?,
        None => input.to_string(),
    };
    serde_json::from_str(&text).context("parsing JSON argument")
}

async fn read_query(input: &str) -> anyhow::Result<Query> {
    Ok(Query::from_value(read_json(input).await?)?)
}

fn parse_sort(spec: &str) -> anyhow::Result<(String, SortOrder)> {
    let (path, order) = match spec.rsplit_once(':') {
        Some((path, "asc")) => (path, SortOrder::Asc),
        Some((path, "desc")) => (path, SortOrder::Desc),
        Some((_, other)) => bail!("unknown sort direction `{other}` (expected asc or desc)"),
        None => (spec, SortOrder::Asc),
    };
    if path.is_empty() {
        bail!("empty sort path in `{spec}`");
    }
    Ok((path.to_string(), order))
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn describe(payload: &Value) -> String {
    let uid = payload.get("uid").and_then(Value::as_str).unwrap_or("-");
    match payload.get("title").and_then(Value::as_str) {
        Some(title) => format!("{} {}", uid.yellow(), title),
        None => uid.yellow().to_string(),
    }
}

async fn cmd_find(store: &Store, args: FindArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let query = read_query(&args.query).await?;
    let mut options = match &args.options {
        Some(input) => FindOptions::from_value(&read_json(input).await?)?,
        None => FindOptions::new(),
    };
    if args.unsorted {
        options = options.unsorted();
    }
    for spec in &args.sort {
        let (path, order) = parse_sort(spec)?;
        options = options.with_sort(path, order);
    }
    if let Some(skip) = args.skip {
        options = options.with_skip(skip);
    }
    if let Some(limit) = args.limit {
        options = options.with_limit(limit);
    }

    let found = store.find(&query, &options).await?;
    match format {
        OutputFormat::Json => print_json(&found),
        OutputFormat::Text => {
            let label = match &found {
                Find::Raw(_) => "records",
                Find::Entries { .. } => "entries",
            };
            println!("{} {} {}", "✓".green().bold(), found.len().to_string().bold(), label);
            for payload in found.payloads() {
                println!("  {}", describe(payload));
            }
            Ok(())
        }
    }
}

async fn cmd_find_one(store: &Store, args: QueryArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let query = read_query(&args.query).await?;
    let found = store.find_one(&query).await?;
    match (format, &found) {
        (OutputFormat::Json, _) => print_json(&found),
        (OutputFormat::Text, FindOne::Raw(Some(Entry { uid, content_type_uid, .. }))) => {
            println!("{} {}/{}", "✓".green().bold(), content_type_uid.cyan(), uid.yellow());
            print_json(&found)
        }
        (OutputFormat::Text, _) => match found.payload() {
            Some(payload) => {
                println!("{} {}", "✓".green().bold(), describe(payload));
                print_json(payload)
            }
            None => {
                println!("{}", "No matching entry.".dimmed());
                Ok(())
            }
        },
    }
}

async fn cmd_count(store: &Store, args: QueryArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let query = read_query(&args.query).await?;
    let count = store.count(&query).await?;
    match format {
        OutputFormat::Json => print_json(&count),
        OutputFormat::Text => {
            println!("{} entries", count.entries.to_string().bold());
            Ok(())
        }
    }
}

async fn cmd_write(store: &Store, args: WriteArgs, replace: bool, format: &OutputFormat) -> anyhow::Result<()> {
    let mut doc = EntryDocument::from_value(read_json(&args.document).await?)?;

    if args.shape_references {
        let entry = &mut doc.entry;
        match store.reference_index(&doc.locale, &entry.content_type_uid).await? {
            Some(index) => {
                let shaped = index.shape_entry(&mut entry.data);
                debug!(content_type = %entry.content_type_uid, shaped, "reference fields shaped");
            }
            None => warn!(content_type = %entry.content_type_uid, "no reference index stored"),
        }
    }

    let uid = doc.entry.uid.clone();
    let content_type = doc.entry.content_type_uid.clone();
    let written = if replace {
        store.upsert(doc).await?
    } else {
        store.insert(doc).await?
    };

    match format {
        OutputFormat::Json => print_json(&written),
        OutputFormat::Text => {
            let verb = if replace { "Upserted" } else { "Inserted" };
            println!("{} {} {}/{}", "✓".green().bold(), verb, content_type.cyan(), uid.yellow());
            Ok(())
        }
    }
}

async fn cmd_bulk_insert(store: &Store, args: BulkArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let Value::Array(entries) = read_json(&args.entries).await? else {
        bail!("bulk insert expects a JSON array of entries");
    };
    let count = entries.len();
    let written = store
        .bulk_insert(BulkInsert {
            content_type_uid: args.content_type.clone(),
            locale: args.locale.clone(),
            entries,
        })
        .await?;

    match format {
        OutputFormat::Json => print_json(&written),
        OutputFormat::Text => {
            println!(
                "{} Replaced {} ({}) with {} entries",
                "✓".green().bold(),
                args.content_type.cyan(),
                args.locale,
                count.to_string().bold()
            );
            Ok(())
        }
    }
}

async fn cmd_remove(store: &Store, args: QueryArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let query = read_query(&args.query).await?;
    let removed = store.remove(&query).await?;
    match format {
        OutputFormat::Json => print_json(&removed),
        OutputFormat::Text if removed == 0 => {
            println!("{}", "Nothing removed: query names no content type.".dimmed());
            Ok(())
        }
        OutputFormat::Text => {
            println!("{} Removed.", "✓".green().bold());
            Ok(())
        }
    }
}

fn cmd_config(config: &StoreConfig, args: ConfigArgs) -> anyhow::Result<()> {
    if args.json {
        print_json(config)
    } else {
        print!("{}", config.to_toml_string()?);
        Ok(())
    }
}
