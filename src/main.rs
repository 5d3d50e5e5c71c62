//! pagestore - inspect and edit a page file

use anyhow::{bail, Context, Result};
use clap::{Parser as ClapParser, Subcommand};
use pagestore::storage::{FileBackend, FileBackendConfig, PageId, PageRef, StorageBackend};
use pagestore::{Session, SessionConfig};
use std::io::Write;
use std::path::PathBuf;

/// pagestore - inspect and edit a page file
#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Page file to operate on
    #[arg(short, long, default_value = "pagestore.db")]
    file: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Skip fsync after every record
    #[arg(long)]
    no_sync: bool,

    /// Number of pages kept in the page buffer (0 disables buffering)
    #[arg(short, long, default_value = "10")]
    capacity: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show page count and file size
    Info,
    /// List every page with its payload size
    List,
    /// Print a page
    Get {
        id: u64,
        /// Write the payload to stdout as-is instead of a hex dump
        #[arg(long)]
        raw: bool,
    },
    /// Store text as a page, allocating a new id unless --id is given
    Put {
        text: String,
        #[arg(long)]
        id: Option<u64>,
    },
    /// Delete a page
    Delete { id: u64 },
    /// Rewrite the file keeping only live pages
    Compact,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let backend = FileBackend::new(FileBackendConfig {
        path: args.file.clone(),
        sync_on_write: !args.no_sync,
    });
    let config = SessionConfig::default().with_capacity(args.capacity);

    match args.command {
        Command::Info => {
            let session = open(backend, config, false)?;
            if let Some(backend) = session.backend() {
                println!("file:  {}", backend.path().display());
                println!("pages: {}", backend.page_count());
                println!("bytes: {}", backend.file_len());
            }
            println!("buffer: {} pages", session.config().buffering_capacity);
            session.close()?;
        }
        Command::List => {
            let mut session = open(backend, config, false)?;
            let ids = session.backend().map(FileBackend::page_ids).unwrap_or_default();
            for page_id in ids {
                let data = session.load(page_id)?;
                println!("{:>10}  {} bytes", page_id.0, data.len());
            }
            session.close()?;
        }
        Command::Get { id, raw } => {
            let mut session = open(backend, config, false)?;
            let data = session
                .load(PageId(id))
                .with_context(|| format!("Failed to load page {}", id))?;
            if raw {
                std::io::stdout().write_all(&data)?;
            } else {
                print!("{}", hex_dump(&data));
            }
            session.close()?;
        }
        Command::Put { text, id } => {
            let mut session = open(backend, config, id.is_none())?;
            let page = id.map_or(PageRef::New, |id| PageRef::Existing(PageId(id)));
            let page_id = session
                .store(page, text.into_bytes())
                .context("Failed to store page")?;
            session.close()?;
            println!("{}", page_id.0);
        }
        Command::Delete { id } => {
            let mut session = open(backend, config, false)?;
            session
                .delete(PageId(id))
                .with_context(|| format!("Failed to delete page {}", id))?;
            session.close()?;
        }
        Command::Compact => {
            let mut backend = backend;
            backend.create().context("Failed to open page file")?;
            let reclaimed = backend.compact().context("Failed to compact page file")?;
            backend.destroy()?;
            println!("Reclaimed {} bytes", reclaimed);
        }
    }

    Ok(())
}

fn open(
    backend: FileBackend,
    config: SessionConfig,
    create_missing: bool,
) -> Result<Session<FileBackend>> {
    if !create_missing && !backend.path().exists() {
        bail!("Page file does not exist at {:?}", backend.path());
    }
    Session::open(backend, config).context("Failed to open page file")
}

fn hex_dump(data: &[u8]) -> String {
    let mut out = String::new();
    for (row, chunk) in data.chunks(16).enumerate() {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{:02x}", b)).collect();
        let ascii: String = chunk
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
            .collect();
        out.push_str(&format!("{:08x}  {:<47}  |{}|\n", row * 16, hex.join(" "), ascii));
    }
    out
}
