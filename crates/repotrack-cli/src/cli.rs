use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "repotrack",
    about = "Inspect and maintain a repotrack catalog",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file. Defaults to ./repotrack.toml when present.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// List tracked repositories
    List(ListArgs),
    /// Show one repository and its ownership history
    Show(ShowArgs),
    /// Show tracking health per repository
    Status(StatusArgs),
    /// Check whether a name is still available
    Check(CheckArgs),
    /// Digest a local directory laid out as <name>/<version>/
    Digest(DigestArgs),
    /// Rewrite the journal as a single snapshot
    Compact(CompactArgs),
}

#[derive(Args)]
pub struct ListArgs {
    /// Only repositories of this kind (e.g. helm, falco, olm)
    #[arg(short, long)]
    pub kind: Option<String>,
}

#[derive(Args)]
pub struct ShowArgs {
    pub name: String,
    /// Include stored credentials in the output
    #[arg(long)]
    pub credentials: bool,
}

#[derive(Args)]
pub struct StatusArgs {
    /// Only list repositories whose last cycle failed
    #[arg(long)]
    pub errors: bool,
}

#[derive(Args)]
pub struct CheckArgs {
    /// repositoryName or repositoryURL
    pub resource: String,
    pub value: String,
}

#[derive(Args)]
pub struct DigestArgs {
    pub path: PathBuf,
}

#[derive(Args)]
pub struct CompactArgs {}
