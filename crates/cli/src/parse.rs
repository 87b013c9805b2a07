//! ArgMatches → CliAction conversion.

use std::path::PathBuf;

use clap::ArgMatches;
use piilop_runner::RunOptions;

use crate::state::default_state_path;

/// The command the user asked for.
#[derive(Debug)]
pub enum CliAction {
    /// Delete every active resource.
    Clean,
    /// Forget saved state.
    Clear,
    /// Dump saved state.
    Info,
    /// Show the plan.
    Status,
    /// Run the plan.
    Test(RunOptions),
}

impl CliAction {
    /// Check if the command reads and writes the state file
    pub fn uses_state_file(&self) -> bool {
        !matches!(self, CliAction::Status)
    }
}

/// Convert clap ArgMatches into a CliAction.
pub fn matches_to_action(matches: &ArgMatches) -> Result<CliAction, String> {
    let (sub_name, sub_matches) = matches
        .subcommand()
        .ok_or_else(|| "No command provided".to_string())?;

    match sub_name {
        "clean" => Ok(CliAction::Clean),
        "clear" => Ok(CliAction::Clear),
        "info" => Ok(CliAction::Info),
        "status" => Ok(CliAction::Status),
        "test" => Ok(CliAction::Test(parse_test(sub_matches))),
        other => Err(format!("Unknown command: {}", other)),
    }
}

fn parse_test(matches: &ArgMatches) -> RunOptions {
    let mut options = RunOptions::new()
        .workers(matches.get_one::<usize>("workers").copied().unwrap_or(1))
        .fail_fast(matches.get_flag("fail-fast"));
    if let Some(prefix) = matches.get_one::<String>("test-name") {
        options = options.name_prefix(prefix.clone());
    }
    options
}

/// State file named by `--file`, or the default location.
pub fn state_file(matches: &ArgMatches) -> PathBuf {
    matches
        .get_one::<String>("file")
        .map(PathBuf::from)
        .unwrap_or_else(default_state_path)
}

/// Verbosity requested with `-v`.
pub fn verbosity(matches: &ArgMatches) -> u8 {
    matches.get_count("verbose")
}
