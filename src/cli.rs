//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use blockdrive_core::{FileAddress, TransferKind};
use clap::{Parser, Subcommand};

/// Move files between this machine and a block-addressed remote store.
///
/// Remote paths are written `NODE:LOCATION:PATH`.
#[derive(Parser, Debug)]
#[command(name = "blockdrive")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Remote store RPC endpoint (overrides config file)
    #[arg(long, env = "BLOCKDRIVE_ENDPOINT", global = true)]
    pub endpoint: Option<String>,

    /// Bearer token forwarded to the remote store
    #[arg(long, env = "BLOCKDRIVE_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Directory holding the transfer database and preferences
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,

    /// Disable the progress spinner
    #[arg(long, global = true)]
    pub no_progress: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Upload a local file into a remote directory
    Upload {
        /// Local file to upload
        local: PathBuf,
        /// Remote destination directory
        dest_dir: FileAddress,
    },

    /// Download a remote file or directory
    Download {
        /// Remote source
        src: FileAddress,
        /// Local output path (defaults to the download directory preference)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Parallel block fetchers per file (1-64, defaults to preference)
        #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=64))]
        threads: Option<u8>,
    },

    /// Copy a remote file or directory
    Copy {
        /// Remote source
        src: FileAddress,
        /// Remote destination
        dest: FileAddress,
    },

    /// Move a remote file or directory (copy, then remove the source)
    Move {
        /// Remote source
        src: FileAddress,
        /// Remote destination
        dest: FileAddress,
    },

    /// Rename a remote entry in place
    Rename {
        /// Current address
        src: FileAddress,
        /// New address
        dest: FileAddress,
    },

    /// List a remote directory
    Ls {
        /// Remote directory
        address: FileAddress,
    },

    /// Show metadata of a remote entry
    Stat {
        /// Remote entry
        address: FileAddress,
    },

    /// Create a remote directory
    Mkdir {
        /// Remote directory to create
        address: FileAddress,
    },

    /// Remove a remote entry recursively
    Rm {
        /// Remote entry
        address: FileAddress,
    },

    /// Print the streaming playback URL of a media file
    StreamUrl {
        /// Remote media file
        address: FileAddress,
    },

    /// List transfer records of one kind, newest first
    Records {
        /// upload, download or copy
        kind: TransferKind,
        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete one transfer record
    DeleteRecord {
        /// Record id
        id: i64,
    },

    /// Delete every transfer record of one kind
    ClearRecords {
        /// upload, download or copy
        kind: TransferKind,
    },

    /// Show or change preferences
    Prefs {
        /// Set the default download directory (must exist)
        #[arg(long)]
        download_dir: Option<PathBuf>,
        /// Set the default download thread count (1-64)
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=64))]
        threads: Option<u8>,
    },
}

impl Command {
    /// Whether the command needs a remote endpoint.
    #[must_use]
    pub fn needs_remote(&self) -> bool {
        !matches!(
            self,
            Self::Records { .. } | Self::DeleteRecord { .. } | Self::ClearRecords { .. } | Self::Prefs { .. }
        )
    }
}
