use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Debug, Parser)]
#[command(
    name = "wb-grep",
    about = "Semantic code search over a local repository"
)]
pub struct Cli {
    /// Repository root (defaults to the current directory)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Index the repository into the local vector store
    Index(IndexArgs),
    /// Watch for changes and keep the index in sync
    Watch,
    /// Search the index with a natural-language query
    Search(SearchArgs),
    /// Show index statistics and backend status
    Status(StatusArgs),
    /// Delete all indexed data for this repository
    Clear,
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Index --

#[derive(Debug, Parser)]
pub struct IndexArgs {
    /// Truncate the store and journal before indexing
    #[arg(long)]
    pub clear: bool,

    /// Re-embed files even when their content hash is unchanged
    #[arg(long)]
    pub force: bool,
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The search query
    pub query: String,

    /// Number of results to return
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,

    /// Only return results under this path (relative to the root)
    #[arg(short = 'p', long = "path")]
    pub path: Option<String>,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,

    /// Include chunk content in the output
    #[arg(long)]
    pub content: bool,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(self.shell, &mut cmd, "wb-grep", &mut std::io::stdout());
    }
}
