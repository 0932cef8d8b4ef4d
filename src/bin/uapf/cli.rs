//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

/// uapf - move process packages between git repositories
#[derive(Parser)]
#[command(name = "uapf")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Export the package at a ref as a .uapf archive
    Export(ExportArgs),

    /// Import a .uapf archive as a single commit
    Import(ImportArgs),

    /// Check a package directory's manifest and references
    Validate(ValidateArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args)]
pub struct ExportArgs {
    /// Repository to export from
    #[arg(long, default_value = ".")]
    pub repo: PathBuf,

    /// Branch, tag or commit (defaults to the default branch)
    #[arg(long = "ref")]
    pub reference: Option<String>,

    /// Output file or directory (defaults to the derived file name)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Only include files the manifest references
    #[arg(long)]
    pub referenced_only: bool,
}

#[derive(Args)]
pub struct ImportArgs {
    /// Archive to import
    pub archive: PathBuf,

    /// Repository to import into
    #[arg(long, default_value = ".")]
    pub repo: PathBuf,

    /// Directory inside the repository to import under
    #[arg(long, default_value = "")]
    pub prefix: String,

    /// Branch to commit to (defaults to the default branch)
    #[arg(long)]
    pub branch: Option<String>,

    /// Commit message
    #[arg(short, long)]
    pub message: Option<String>,

    /// Commit author name
    #[arg(long, env = "UAPF_AUTHOR_NAME")]
    pub author_name: Option<String>,

    /// Commit author email
    #[arg(long, env = "UAPF_AUTHOR_EMAIL")]
    pub author_email: Option<String>,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Package directory
    #[arg(default_value = ".")]
    pub dir: PathBuf,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: Shell,
}
