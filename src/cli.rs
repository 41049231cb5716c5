use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "acctest")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Run resource lifecycle acceptance tests", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run every case in the given suite files or directories
    Run(RunArgs),

    /// Parse and check suites without creating anything
    Validate {
        /// Suite files or directories containing them
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Show how a provider error code is classified
    Classify(ClassifyArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser)]
pub struct RunArgs {
    /// Suite files or directories containing them
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Number of cases to run in parallel
    #[arg(short, long, default_value = "4", env = "ACCTEST_JOBS")]
    pub jobs: usize,

    /// Only run cases whose name contains this string
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Print reports as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser)]
pub struct ClassifyArgs {
    /// Provider error code, e.g. InvalidLaunchConfiguration.NotFound
    pub code: String,

    /// Provider whose table to use
    #[arg(short, long, default_value = "aws")]
    pub provider: String,

    /// Take classifier tables from this suite file
    #[arg(short, long)]
    pub suite: Option<PathBuf>,
}
