use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "jre-prestarter",
    version,
    about = "Downloads a Java runtime and JavaFX on first start, then runs the launcher"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub options: Options,
}

#[derive(Args, Debug, Clone)]
pub struct Options {
    /// Directory holding downloads, the java directory and the log file
    #[arg(long, global = true)]
    pub base_dir: Option<PathBuf>,

    /// Platform to provision: linux-x64, linux-aarch64, macos-x64, macos-aarch64
    #[arg(long, global = true)]
    pub target: Option<String>,

    /// URL of the launcher jar
    #[arg(long, global = true)]
    pub launcher_url: Option<String>,

    /// User-Agent header sent with every download
    #[arg(long, global = true)]
    pub user_agent: Option<String>,

    /// How many times a download is tried before giving up
    #[arg(long, global = true, default_value_t = 3)]
    pub fetch_attempts: u32,

    /// Skip the first-run greeting prompt
    #[arg(short, long, global = true)]
    pub yes: bool,

    /// Extra argument passed to java before -jar (repeatable)
    #[arg(long = "jvm-arg", global = true, allow_hyphen_values = true)]
    pub jvm_args: Vec<String>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Prepare everything and start the launcher (default)
    Run,
    /// Prepare the runtime without starting the launcher
    Prepare,
    /// Remove downloaded files and the extracted java directory
    Clean,
    /// Show where things live and what is already prepared
    Info,
}
