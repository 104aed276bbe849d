use clap::{Parser, Subcommand};

/// The `Cli` struct provides the command-line interface for the `repere` library.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// The `command` field specifies the build step for the program to run.
    #[command(subcommand)]
    pub command: Command,
    /// The `data` field specifies the directory holding the `raw/` and `database/`
    /// subdirectories.
    #[arg(
        short = 'd',
        long,
        default_value = "data",
        help = "Path to the data directory."
    )]
    pub data: std::path::PathBuf,
}

/// The `Command` enum lists the steps producing the database, in the order `update` runs
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Fetch the per-department archives of the national address base.
    Download,
    /// Unpack the downloaded gzip archives.
    Decompress,
    /// Build the content and sort-index tables from the raw csv files.
    Index,
    /// Build the k-d tree table that answers reverse queries.
    Reverse,
    /// Run download, decompress, index and reverse, stopping at the first failure.
    Update,
}
