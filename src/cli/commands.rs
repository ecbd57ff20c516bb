use std::time::Duration;

use tracing::info;

use crate::cli::args::{BindOpts, CommandArgs, ConfigAction, ConfigArgs, OutputFormat, RunArgs};
use crate::config::loader::get_config_path;
use crate::config::types::BwrapperConfig;
use crate::error::{BwrapperError, Result};
use crate::sandbox::{
    BindMode, BindSpec, CommandRequest, CommandResult, SandboxProfile, SandboxRunner,
};

// ============================================================================
// Sandbox Commands
// ============================================================================

/// Run a command inside the sandbox
pub async fn run(args: RunArgs, config: BwrapperConfig, format: OutputFormat) -> Result<()> {
    info!(command = ?args.command, "Running sandboxed command");

    let runner = build_runner(&config, &args.bind_opts);

    let mut request = CommandRequest::new(args.command)
        .with_binds(merged_binds(&config, args.bind_opts.binds));
    request.timeout = resolve_timeout(&config, args.timeout, args.no_timeout);
    if let Some(dir) = args.workdir {
        request = request.with_working_directory(dir);
    }
    for (key, value) in args.env_vars {
        request = request.with_env(key, value);
    }

    match runner.run(&request).await {
        Ok(result) => {
            output_command_result(&result, format);
            Ok(())
        }
        Err(err) => {
            if let Some((stdout, stderr)) = err.captured_output() {
                output_captured(stdout, stderr, &format);
            }
            Err(err)
        }
    }
}

/// Print the invocation for a command without running it
pub async fn command(args: CommandArgs, config: BwrapperConfig, format: OutputFormat) -> Result<()> {
    let runner = build_runner(&config, &args.bind_opts);
    let binds = merged_binds(&config, args.bind_opts.binds);
    let invocation = runner.build_command(&args.command, &binds)?;

    match format {
        OutputFormat::Text => {
            for part in invocation.as_slice() {
                println!("{}", part);
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string(&invocation)?);
        }
    }

    Ok(())
}

/// Report whether the configured bwrap binary can be executed
pub async fn check(config: BwrapperConfig, format: OutputFormat) -> Result<()> {
    let runner = SandboxRunner::new(SandboxProfile::from_settings(&config.sandbox));
    let binary = runner.profile().binary().to_string();
    let available = runner.is_available();

    match format {
        OutputFormat::Text => println!("{}", availability_line(&binary, available)),
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "binary": binary,
                    "available": available,
                })
            );
        }
    }

    if available {
        Ok(())
    } else {
        Err(BwrapperError::ToolUnavailable { binary })
    }
}

// ============================================================================
// Config Commands
// ============================================================================

pub async fn config(args: ConfigArgs, config: BwrapperConfig) -> Result<()> {
    match args.action {
        ConfigAction::Show => {
            let toml_str = toml::to_string_pretty(&config)
                .map_err(|e| BwrapperError::Config(e.to_string()))?;
            println!("{}", toml_str);
        }
        ConfigAction::Path => {
            println!("{}", get_config_path().display());
        }
    }
    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

fn build_runner(config: &BwrapperConfig, opts: &BindOpts) -> SandboxRunner {
    let mode = if opts.strict_binds {
        BindMode::Strict
    } else {
        config.sandbox.bind_mode
    };

    SandboxRunner::new(SandboxProfile::from_settings(&config.sandbox)).with_bind_mode(mode)
}

/// Configured binds first, so the command line wins on the same destination.
fn merged_binds(config: &BwrapperConfig, cli_binds: Vec<BindSpec>) -> Vec<BindSpec> {
    let mut binds = config.run.binds.clone();
    binds.extend(cli_binds);
    binds
}

fn availability_line(binary: &str, available: bool) -> String {
    if available {
        format!("{} is available", binary)
    } else {
        format!("{} is not available", binary)
    }
}

fn resolve_timeout(config: &BwrapperConfig, timeout: Option<u64>, no_timeout: bool) -> Option<Duration> {
    if no_timeout {
        return None;
    }
    match timeout {
        Some(0) => None,
        Some(secs) => Some(Duration::from_secs(secs)),
        None => config.run.timeout(),
    }
}

fn output_command_result(result: &CommandResult, format: OutputFormat) {
    match format {
        OutputFormat::Text => output_captured(&result.stdout, &result.stderr, &format),
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "stdout": result.stdout,
                    "stderr": result.stderr,
                    "exit_code": result.exit_code,
                })
            );
        }
    }
}

fn output_captured(stdout: &str, stderr: &str, format: &OutputFormat) {
    match format {
        OutputFormat::Text => {
            if !stdout.is_empty() {
                print!("{}", stdout);
            }
            if !stderr.is_empty() {
                eprint!("{}", stderr);
            }
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "stdout": stdout,
                    "stderr": stderr,
                })
            );
        }
    }
}
