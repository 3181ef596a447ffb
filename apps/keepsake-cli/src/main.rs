use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use keepsake_persist::json::JsonStore;
use keepsake_persist::{
    ContainerConfig, LockedAccess, PersistentData, PersistentList, PersistentMap,
};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "keepsake", about = "Inspect and edit keepsake JSON documents")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and crate info
    Info,
    /// Pretty-print a document
    Show { file: PathBuf },
    /// Print one entry of an object document
    Get { file: PathBuf, key: String },
    /// Set one entry of an object document to a JSON value
    Put {
        file: PathBuf,
        key: String,
        /// JSON text, e.g. '42' or '"text"' or '[1, 2]'
        json: String,
    },
    /// Remove one entry of an object document
    Remove { file: PathBuf, key: String },
    /// Append a JSON value to an array document
    Append { file: PathBuf, json: String },
}

/// One-shot edits write explicitly; no writer thread is needed.
fn store(file: &Path) -> JsonStore {
    JsonStore::new(file).config(ContainerConfig {
        background_writer: false,
        ..ContainerConfig::default()
    })
}

fn open_object(file: &Path) -> anyhow::Result<PersistentMap<String, Value>> {
    store(file)
        .map()
        .with_context(|| format!("{} is not a JSON object document", file.display()))
}

fn open_array(file: &Path) -> anyhow::Result<PersistentList<Value>> {
    store(file)
        .list()
        .with_context(|| format!("{} is not a JSON array document", file.display()))
}

fn parse(json: &str) -> anyhow::Result<Value> {
    serde_json::from_str(json).with_context(|| format!("invalid JSON value: {json}"))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    // Anything still dirty when main returns is written here.
    let _flush_on_exit = keepsake_persist::shutdown_guard();

    match cli.command {
        Commands::Info => {
            println!("keepsake v{}", env!("CARGO_PKG_VERSION"));
            println!("persist: {}", keepsake_persist::crate_info());
            println!("schema: {}", keepsake_schema::crate_info());
        }
        Commands::Show { file } => {
            let doc = store(&file)
                .collection::<Value>()
                .with_context(|| format!("failed to read {}", file.display()))?;
            let text = doc.read_locked(serde_json::to_string_pretty)?;
            println!("{text}");
        }
        Commands::Get { file, key } => {
            let object = open_object(&file)?;
            match object.get(&key) {
                Some(value) => println!("{value}"),
                None => anyhow::bail!("no key {key:?} in {}", file.display()),
            }
        }
        Commands::Put { file, key, json } => {
            let value = parse(&json)?;
            let object = open_object(&file)?;
            let previous = object.insert(key.clone(), value);
            object.flush()?;
            tracing::info!(key = %key, replaced = previous.is_some(), "stored");
        }
        Commands::Remove { file, key } => {
            let object = open_object(&file)?;
            match object.remove(&key) {
                Some(_) => {
                    object.flush()?;
                    tracing::info!(key = %key, "removed");
                }
                None => println!("no key {key:?}; nothing to do"),
            }
        }
        Commands::Append { file, json } => {
            let value = parse(&json)?;
            let array = open_array(&file)?;
            array.push(value);
            array.flush()?;
            tracing::info!(len = array.len(), "appended");
        }
    }

    Ok(())
}
