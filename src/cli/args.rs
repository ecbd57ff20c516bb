use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::sandbox::{parse_bind_arg, BindSpec};

#[derive(Parser, Debug)]
#[clap(name = "bwrapper")]
#[clap(version, about = "Run commands inside a bubblewrap sandbox")]
#[clap(propagate_version = true)]
pub struct Cli {
    #[clap(flatten)]
    pub global_opts: GlobalOpts,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug)]
pub struct GlobalOpts {
    /// Configuration file path
    #[clap(short, long, global = true, env = "BWRAPPER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[clap(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output format
    #[clap(long, global = true, default_value = "text", value_enum)]
    pub format: OutputFormat,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a command inside the sandbox
    Run(RunArgs),

    /// Print the bwrap invocation for a command without running it
    Command(CommandArgs),

    /// Check that the configured bwrap binary is available
    Check,

    /// Manage configuration
    Config(ConfigArgs),
}

// ============================================================================
// Sandbox Commands
// ============================================================================

#[derive(Args, Debug)]
pub struct BindOpts {
    /// Extra bind mount (src, src:dst or src:dst:ro|rw); read-only unless rw
    #[clap(long = "bind", short = 'b', value_parser = parse_bind_arg)]
    pub binds: Vec<BindSpec>,

    /// Reject malformed bind entries instead of dropping them
    #[clap(long)]
    pub strict_binds: bool,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[clap(flatten)]
    pub bind_opts: BindOpts,

    /// Working directory of the bwrap process on the host
    #[clap(long, short = 'w')]
    pub workdir: Option<PathBuf>,

    /// Environment variables to add (KEY=VALUE)
    #[clap(long = "env", short = 'e', value_parser = parse_env_var)]
    pub env_vars: Vec<(String, String)>,

    /// Timeout in seconds (defaults to the configured timeout)
    #[clap(long, short = 't', conflicts_with = "no_timeout")]
    pub timeout: Option<u64>,

    /// Run without a timeout
    #[clap(long)]
    pub no_timeout: bool,

    /// Command to run inside the sandbox
    #[clap(last = true, required = true)]
    pub command: Vec<String>,
}

#[derive(Args, Debug)]
pub struct CommandArgs {
    #[clap(flatten)]
    pub bind_opts: BindOpts,

    /// Command to run inside the sandbox
    #[clap(last = true, required = true)]
    pub command: Vec<String>,
}

// ============================================================================
// Config Commands
// ============================================================================

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[clap(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Show configuration file path
    Path,
}

// ============================================================================
// Common Types
// ============================================================================

fn parse_env_var(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| "Environment variable format: KEY=VALUE".to_string())
}

#[derive(Debug, Clone, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}
