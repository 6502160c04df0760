use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use devcamper_core::{Fields, Filter, BOOTCAMPS, COURSES};
use devcamper_storage::snapshot::SnapshotWriter;
use devcamper_storage::{DocumentStore, PersistentStore};
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "devcamper")]
#[command(about = "DevCamper admin CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Load bootcamps and courses from JSON array files.
    Import {
        #[arg(long)]
        data_dir: PathBuf,
        #[arg(long)]
        bootcamps: Option<PathBuf>,
        #[arg(long)]
        courses: Option<PathBuf>,
    },
    /// Delete every bootcamp and course.
    Destroy {
        #[arg(long)]
        data_dir: PathBuf,
    },
    /// Write all documents to a zstd-compressed NDJSON file.
    Export {
        #[arg(long)]
        data_dir: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
}

fn read_array(path: &Path) -> Result<Vec<Fields>> {
    let raw = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let value: JsonValue =
        serde_json::from_slice(&raw).with_context(|| format!("parsing {}", path.display()))?;
    let JsonValue::Array(items) = value else {
        bail!("{} must contain a JSON array", path.display());
    };
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            JsonValue::Object(fields) => Ok(fields),
            _ => bail!("{} item {i} is not an object", path.display()),
        })
        .collect()
}

async fn import(store: &PersistentStore, collection: &str, path: &Path) -> Result<usize> {
    let docs = read_array(path)?;
    let n = docs.len();
    for fields in docs {
        store.create(collection, fields).await?;
    }
    info!(collection, count = n, file = %path.display(), "imported");
    Ok(n)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Import {
            data_dir,
            bootcamps,
            courses,
        } => {
            let store = PersistentStore::open(&data_dir)?;
            // courses reference bootcamps, so bootcamps go first
            if let Some(path) = &bootcamps {
                import(&store, BOOTCAMPS, path).await?;
            }
            if let Some(path) = &courses {
                import(&store, COURSES, path).await?;
            }
            store.snapshot()?;
            println!("Data imported");
        }
        Cmd::Destroy { data_dir } => {
            let store = PersistentStore::open(&data_dir)?;
            let bootcamps = store.delete_many(BOOTCAMPS, &Filter::all()).await?;
            let courses = store.delete_many(COURSES, &Filter::all()).await?;
            store.snapshot()?;
            info!(bootcamps, courses, "destroyed");
            println!("Data destroyed");
        }
        Cmd::Export { data_dir, out } => {
            let store = PersistentStore::open(&data_dir)?;
            let mut w = SnapshotWriter::create(&out)?;
            for doc in store.all_documents() {
                w.write_doc(&doc)?;
            }
            let n = w.finish()?;
            println!("Exported {n} documents to {}", out.display());
        }
    }
    Ok(())
}
