use anyhow::{Context, Result, anyhow, bail};
use archivedb::{
    ArchiveStorage, FileByteStore, PersistenceMode, SchedulerPhase, StorageConfig, TableName,
};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "archive-tool")]
#[command(about = "Inspect and maintain an archivedb snapshot store")]
struct Cli {
    /// Directory holding the byte store
    #[arg(long, default_value = ".archivedb")]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a JSON backup of every table
    Export {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Restore tables from a JSON backup
    Import { file: PathBuf },
    /// Row count per table
    Tables,
    /// Print the records of one table
    Show { table: String },
    /// Replace a table with the records of a JSON array file
    Replace { table: String, file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("archivedb=warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = StorageConfig::from_env().context("invalid ARCHIVEDB_* configuration")?;
    let store = FileByteStore::new(&cli.root, &config.identity);
    let storage = ArchiveStorage::new(store, config);

    storage.ensure_ready().await;
    if let PersistenceMode::MemoryOnly { reason } = storage.mode().await {
        bail!(
            "store at '{}' is unusable: {}",
            cli.root.display(),
            reason
        );
    }

    match cli.command {
        Command::Export { out } => export(&storage, out.as_deref()).await?,
        Command::Import { file } => import(&storage, &file).await?,
        Command::Tables => tables(&storage).await?,
        Command::Show { table } => show(&storage, &table).await?,
        Command::Replace { table, file } => replace(&storage, &table, &file).await?,
    }

    // A write still inside its debounce window would be lost on exit
    if storage.scheduler().await.phase() != SchedulerPhase::Idle {
        storage
            .flush_now()
            .await
            .context("snapshot write failed")?;
    }
    Ok(())
}

async fn export(storage: &ArchiveStorage, out: Option<&Path>) -> Result<()> {
    let json = storage.export_backup().await?;
    match out {
        Some(path) => {
            fs::write(path, &json)
                .with_context(|| format!("failed to write '{}'", path.display()))?;
            println!("Backup written to {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

async fn import(storage: &ArchiveStorage, file: &Path) -> Result<()> {
    let json = fs::read_to_string(file)
        .with_context(|| format!("failed to read '{}'", file.display()))?;
    let report = storage.restore_backup(&json).await?;

    for table in &report.restored {
        println!("restored  {}", table);
    }
    for table in &report.skipped {
        println!("skipped   {}", table);
    }
    for (table, error) in &report.failed {
        println!("failed    {}: {}", table, error);
    }

    if !report.persisted {
        bail!("restored data could not be written to the store");
    }
    if !report.is_success() {
        bail!("{} table(s) failed to restore", report.failed.len());
    }
    Ok(())
}

async fn tables(storage: &ArchiveStorage) -> Result<()> {
    let engine = storage.ensure_ready().await;
    let counts = engine
        .with_engine(|db| {
            db.list_tables()
                .into_iter()
                .map(|name| db.row_count(&name).map(|count| (name, count)))
                .collect::<archivedb::Result<Vec<_>>>()
        })
        .await?;

    for (name, count) in counts {
        println!("{:<20} {}", name, count);
    }
    Ok(())
}

async fn show(storage: &ArchiveStorage, table: &str) -> Result<()> {
    let records = storage.load_table(table).await?;
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

async fn replace(storage: &ArchiveStorage, table: &str, file: &Path) -> Result<()> {
    let name: TableName = table.parse()?;
    let json = fs::read_to_string(file)
        .with_context(|| format!("failed to read '{}'", file.display()))?;
    let records: Vec<serde_json::Value> = serde_json::from_str(&json)
        .map_err(|err| anyhow!("'{}' is not a JSON array of records: {}", file.display(), err))?;

    let written = storage.replace_table(name.as_str(), &records, None).await?;
    storage
        .flush_now()
        .await
        .context("snapshot write failed")?;
    println!("{} row(s) written to {}", written, name);
    Ok(())
}
