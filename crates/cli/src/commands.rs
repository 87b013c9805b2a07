//! Clap command tree.

use clap::{Arg, ArgAction, Command};

/// Build the full `piilop` command.
pub fn build_cli() -> Command {
    Command::new("piilop")
        .about("Integration-test orchestrator with cached, dependency-ordered resources")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("file")
                .short('f')
                .long("file")
                .global(true)
                .value_name("PATH")
                .help("State file to load before and save after the command"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::Count)
                .help("Increase log verbosity (repeatable)"),
        )
        .subcommand(Command::new("clean").about("Delete every resource still recorded as active"))
        .subcommand(Command::new("clear").about("Forget saved resource state without deleting anything"))
        .subcommand(Command::new("info").about("Print the saved resource state"))
        .subcommand(Command::new("status").about("Print the test plan in execution order"))
        .subcommand(
            Command::new("test")
                .about("Run the test plan")
                .arg(
                    Arg::new("test-name")
                        .short('t')
                        .long("test-name")
                        .value_name("PREFIX")
                        .help("Only run tests whose name starts with PREFIX (\"all\" runs everything)"),
                )
                .arg(
                    Arg::new("workers")
                        .short('w')
                        .long("workers")
                        .value_name("N")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("1")
                        .help("Number of concurrent workers"),
                )
                .arg(
                    Arg::new("fail-fast")
                        .long("fail-fast")
                        .action(ArgAction::SetTrue)
                        .help("Stop taking tests after the first failure"),
                ),
        )
}
