use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use cmd::commands;
use cmd::common::StoreContext;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "kvfs")]
struct Cli {
    /// Store directory (defaults to $KVFS_STORE)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the root directory if needed and print its id
    Init,
    /// List a directory
    Ls {
        /// Directory to list
        #[arg(default_value = "/")]
        path: String,
    },
    /// Create a directory
    Mkdir {
        /// Absolute path of the new directory
        path: String,
    },
    /// Remove a file or an empty directory
    Rm {
        /// Absolute path to remove
        path: String,
    },
    /// Show the attributes of a node
    Stat {
        /// Absolute path to inspect
        path: String,
    },
    /// Copy a file from the host filesystem into the store
    Put {
        /// Source file path on host filesystem
        source: PathBuf,
        /// Destination path in the store
        dest: String,
    },
    /// Write a file's contents to stdout
    Cat {
        /// File path to read
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    diagnostics::init_diagnostics();

    let cli = Cli::parse();
    let ctx = StoreContext::new(cli.store);
    let mut stdout = std::io::stdout();

    match &cli.command {
        Commands::Init => commands::init_command(&ctx, &mut stdout).await,
        Commands::Ls { path } => commands::list_command(&ctx, path, &mut stdout).await,
        Commands::Mkdir { path } => commands::mkdir_command(&ctx, path).await,
        Commands::Rm { path } => commands::rm_command(&ctx, path).await,
        Commands::Stat { path } => commands::stat_command(&ctx, path, &mut stdout).await,
        Commands::Put { source, dest } => {
            commands::put_command(&ctx, source, dest, &mut stdout).await
        }
        Commands::Cat { path } => commands::cat_command(&ctx, path, &mut stdout).await,
    }
}
