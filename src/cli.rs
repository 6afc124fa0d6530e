use std::path::PathBuf;

use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::{Args, CommandFactory, Parser, Subcommand};

fn cli_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::BrightCyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::BrightYellow.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightGreen.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::BrightMagenta.on_default())
}

pub fn styled_command() -> clap::Command {
    Cli::command()
}

#[derive(Debug, Parser)]
#[command(name = "arb")]
#[command(bin_name = "arb")]
#[command(version)]
#[command(about = "A closure-table account tree manager")]
#[command(styles = cli_styles())]
pub struct Cli {
    #[arg(
        short = 'd',
        long,
        env = "ARBOR_DB_PATH",
        default_value = ".arbor/tree.sqlite",
        help = "Path to the SQLite store."
    )]
    pub db: String,

    #[arg(
        short = 'c',
        long,
        env = "ARBOR_CONFIG_PATH",
        default_value = "arbor.toml",
        help = "Path to the optional arbor.toml config."
    )]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(about = "Create or migrate the SQLite store.")]
    Init,
    #[command(about = "Add a node under a parent.")]
    Add(AddArgs),
    #[command(about = "Delete a node, promoting its children to its parent.")]
    Rm(RmArgs),
    #[command(about = "Move one or more subtrees under a new parent.")]
    Mv(MvArgs),
    #[command(about = "Rename a node.")]
    Rename(RenameArgs),
    #[command(about = "Set a node's description.")]
    Describe(DescribeArgs),
    #[command(about = "Show one node.")]
    Show(ShowArgs),
    #[command(about = "Print the tree in pre-order.")]
    Tree(OutputArgs),
    #[command(about = "Print the leaf path map.")]
    Paths(OutputArgs),
    #[command(about = "Resolve a leaf path to its node id.")]
    Resolve(ResolveArgs),
    #[command(about = "Recursively sort sibling lists by an attribute.")]
    Sort(SortArgs),
    #[command(about = "Audit closure rows against the in-memory tree.")]
    Check(OutputArgs),
    #[command(about = "Generate or install shell completions.")]
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct AddArgs {
    #[arg(long = "under", help = "Parent node id (omit to add at the top level).")]
    pub under: Option<i64>,

    #[arg(help = "Node name.")]
    pub name: String,

    #[arg(
        short = 'a',
        long = "at",
        help = "Sibling position to splice at (defaults to the end)."
    )]
    pub at: Option<usize>,

    #[arg(long = "desc", help = "Optional description text.")]
    pub desc: Option<String>,

    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct RmArgs {
    #[arg(help = "Node id to delete.")]
    pub id: i64,
}

#[derive(Debug, Args)]
pub struct MvArgs {
    #[arg(required = true, help = "Node ids to move (each with its subtree).")]
    pub ids: Vec<i64>,

    #[arg(
        short = 't',
        long = "to",
        help = "New parent id (omit to move to the top level)."
    )]
    pub to: Option<i64>,

    #[arg(
        short = 'a',
        long = "at",
        help = "Sibling position to splice at (defaults to the end)."
    )]
    pub at: Option<usize>,

    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct RenameArgs {
    #[arg(help = "Node id.")]
    pub id: i64,
    #[arg(help = "New name.")]
    pub name: String,
}

#[derive(Debug, Args)]
pub struct DescribeArgs {
    #[arg(help = "Node id.")]
    pub id: i64,
    #[arg(help = "Description text.")]
    pub text: String,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    #[arg(help = "Node id.")]
    pub id: i64,

    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct OutputArgs {
    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ResolveArgs {
    #[arg(help = "Leaf path, ancestor names joined by the separator.")]
    pub path: String,
}

#[derive(Debug, Args)]
pub struct SortArgs {
    #[arg(help = "Sort key: name, id, or description.")]
    pub key: String,

    #[arg(long = "desc", help = "Sort descending instead of ascending.")]
    pub descending: bool,

    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    #[arg(help = "Shell name (bash, zsh, fish). Auto-detected if omitted.")]
    pub shell: Option<String>,

    #[arg(
        short = 'i',
        long = "install",
        help = "Write completions to the canonical path for the shell."
    )]
    pub install: bool,
}
