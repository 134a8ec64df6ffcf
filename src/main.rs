mod document;
mod ranking;
mod mutation;
mod sync;
mod display;
mod web;

use std::path::{Path, PathBuf};
use clap::{Parser, Subcommand};
use document::Status;
use mutation::Mutation;
use ranking::DEFAULT_CAPACITY;
use sync::{SyncBroadcaster, DEFAULT_BROADCAST_CAPACITY};
use display::{print_document, write_document_to_file};

#[derive(Parser)]
#[command(name = "training-attendance", about = "Training sign-ups with a capped roster and a waitlist")]
struct Cli {
    /// JSON file holding the attendance document
    #[arg(long, env = "DATA_FILE", default_value = "data.json", global = true)]
    data_file: PathBuf,

    /// Confirmed places per training
    #[arg(long, env = "CAPACITY", default_value_t = DEFAULT_CAPACITY, global = true)]
    capacity: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API and the push channel
    Web {
        #[arg(long, env = "PORT", default_value_t = 3000)]
        port: u16,
        #[arg(long, env = "BIND", default_value = "0.0.0.0")]
        bind: String,
        #[arg(long, env = "ADMIN_NAME", default_value = "admin")]
        admin_name: String,
        #[arg(long, env = "ADMIN_PASSWORD", default_value = "admin")]
        admin_password: String,
        #[arg(long, env = "PUBLIC_DIR", default_value = "public")]
        public_dir: PathBuf,
        #[arg(long, env = "BROADCAST_CAPACITY", default_value_t = DEFAULT_BROADCAST_CAPACITY)]
        broadcast_capacity: usize,
    },
    /// Print every training's confirmed list and waitlist
    Show {
        /// Also write the report to this file
        #[arg(long)]
        output: Option<String>,
    },
    /// Add a player to the roster
    AddPlayer { name: String },
    /// Add a training (e.g. "2025-02-03 19:30")
    AddEvent { event: String },
    /// Set a player's status (jdu/going or nejdu/not_going) for a training
    Set { event: String, player: String, status: Status },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mutation = match cli.command {
        Command::Web { port, bind, admin_name, admin_password, public_dir, broadcast_capacity } => {
            log::info!("Starting web server on {}:{} (capacity {})", bind, port, cli.capacity);
            web::start_server(web::ServerConfig {
                bind,
                port,
                data_file: cli.data_file,
                capacity: cli.capacity,
                admin_name,
                admin_password,
                public_dir,
                broadcast_capacity,
            })
            .await?;
            return Ok(());
        }
        Command::Show { output } => {
            let document = document::load_document(&cli.data_file)?;
            print_document(&document, cli.capacity);
            if let Some(output) = output {
                write_document_to_file(&document, cli.capacity, &output)?;
                println!("Report saved to {}", output);
            }
            return Ok(());
        }
        Command::AddPlayer { name } => Mutation::AddPlayer { name },
        Command::AddEvent { event } => Mutation::AddEvent { event },
        Command::Set { event, player, status } => Mutation::SetAttendance { event, player, status },
    };

    commit_offline(&cli.data_file, &mutation).await?;
    Ok(())
}

/// Offline admin edits go through the same commit path as the server. A
/// running server picks the rewritten file up on its next read.
async fn commit_offline(data_file: &Path, mutation: &Mutation) -> anyhow::Result<u64> {
    let store = SyncBroadcaster::open(data_file, DEFAULT_BROADCAST_CAPACITY)?;
    let current = store.current().await;
    let next = mutation.apply(&current)?;
    let revision = store.replace_document(next).await?;
    log::info!("Applied {:?} to {} (revision {})", mutation, store.path().display(), revision);
    Ok(revision)
}
