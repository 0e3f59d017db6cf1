//! slotstore CLI
//!
//! Inspect and edit a storage file from the command line.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use slotstore::codec::is_deflated;
use slotstore::{Config, Store, StoreError};
use tracing_subscriber::{fmt, EnvFilter};

/// slotstore CLI
#[derive(Parser, Debug)]
#[command(name = "slotstore-cli")]
#[command(about = "Inspect and edit slotstore files")]
#[command(version)]
struct Args {
    /// Storage file
    #[arg(short, long, default_value = "./slotstore.db")]
    file: PathBuf,

    /// Take advisory byte-range locks while accessing the file
    #[arg(long)]
    lock: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the header and the layout of every record
    Info,

    /// List keys in index order
    Keys,

    /// Print a string value
    Get {
        /// The key to get
        key: String,
    },

    /// Store a string value
    Put {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// Set the user version number in the header
    SetVersion {
        /// New version
        version: i32,
    },
}

impl Commands {
    fn is_read_only(&self) -> bool {
        matches!(self, Commands::Info | Commands::Keys | Commands::Get { .. })
    }
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,slotstore=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> slotstore::Result<()> {
    let read_only = args.command.is_read_only();
    if read_only && !args.file.exists() {
        return Err(StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} does not exist", args.file.display()),
        )));
    }

    // Mutations write through so the file is complete on exit
    let config = Config::builder()
        .path(&args.file)
        .read_only(read_only)
        .file_locking(args.lock)
        .save_delay_ms(0)
        .build();
    let store = Store::open(config)?;

    match args.command {
        Commands::Info => print_info(&store)?,
        Commands::Keys => {
            let keys = store.with_engine(|engine| engine.keys().cloned().collect::<Vec<_>>())?;
            for key in keys {
                println!("{}", key);
            }
        }
        Commands::Get { key } => match store.get::<String>(&key) {
            Ok(Some(value)) => println!("{}", value),
            Ok(None) => {
                eprintln!("(not found)");
                process::exit(2);
            }
            Err(StoreError::TypeMismatch { .. }) => {
                println!("<non-string value>");
            }
            Err(e) => return Err(e),
        },
        Commands::Put { key, value } => {
            store.put(&key, value)?;
            println!("OK");
        }
        Commands::Del { key } => {
            let existed = store.delete(&key)?;
            println!("{}", if existed { "(deleted)" } else { "(not found)" });
        }
        Commands::SetVersion { version } => {
            store.set_version(version)?;
            println!("OK");
        }
    }

    store.close()
}

fn print_info(store: &Store) -> slotstore::Result<()> {
    let (records, data_start) = store.with_engine(|engine| {
        let records: Vec<_> = engine.records().cloned().collect();
        (records, engine.data_start())
    })?;

    println!("file:        {}", store.path().display());
    println!("version:     {}", store.version()?);
    println!("records:     {}", records.len());
    println!("data start:  {}", data_start);
    println!("file size:   {}", store.file_size()?);

    if records.is_empty() {
        return Ok(());
    }

    println!();
    println!(
        "{:>5}  {:<34} {:>12} {:>10} {:>10}  {}",
        "slot", "key", "pointer", "capacity", "count", "body"
    );
    for meta in records {
        let body = match store.get_raw(&meta.key)?.map(|payload| is_deflated(&payload)) {
            Some(Ok(true)) => "deflate",
            Some(Ok(false)) => "plain",
            Some(Err(_)) => "?",
            None => "-",
        };
        println!(
            "{:>5}  {:<34} {:>12} {:>10} {:>10}  {}",
            meta.index_position,
            meta.key.to_string(),
            meta.data_pointer,
            meta.data_capacity,
            meta.data_count,
            body
        );
    }
    Ok(())
}
