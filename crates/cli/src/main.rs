//! Piilop CLI: run, inspect and clean up the demo test suite.
//!
//! Every command except `status` loads the saved resource state first and
//! writes it back afterwards, so resources created by one run can be reused
//! or cleaned by the next.

mod commands;
mod demo;
mod parse;
mod state;

use std::path::Path;
use std::process;
use std::sync::Arc;

use piilop_runner::{ConsoleObserver, RunOptions, TestMain};
use tracing::Level;

use commands::build_cli;
use parse::{matches_to_action, state_file, verbosity, CliAction};

#[tokio::main]
async fn main() {
    let matches = build_cli().get_matches();
    init_tracing(verbosity(&matches));

    let action = match matches_to_action(&matches) {
        Ok(action) => action,
        Err(e) => {
            eprintln!("(error) {}", e);
            process::exit(2);
        }
    };

    let exit_code = run(action, &state_file(&matches)).await;
    process::exit(exit_code);
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(action: CliAction, path: &Path) -> i32 {
    let registry = match demo::build_registry() {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            eprintln!("(error) {}", e);
            return 1;
        }
    };
    let main = TestMain::new(registry.clone(), Arc::new(ConsoleObserver::stdout()));

    if !action.uses_state_file() {
        return exit_code(main.show_test_list(&mut |name: &str| println!("{}", name)));
    }

    let resources = registry.resources();
    if let Err(e) = state::load(path, &resources) {
        println!("Failed to load data from {}: {}", path.display(), e);
    }

    let mut code = match action {
        CliAction::Clean => exit_code(resources.clean(main.root()).await),
        CliAction::Clear => {
            resources.clear();
            0
        }
        CliAction::Info => exit_code(resources.info(&mut |line: &str| println!("{}", line))),
        CliAction::Test(options) => run_tests(&main, options).await,
        CliAction::Status => 0,
    };

    println!("Saving test data to {}...", path.display());
    if let Err(e) = state::save(path, &resources) {
        eprintln!("(error) {}", e);
        code = code.max(1);
    }
    code
}

async fn run_tests(main: &TestMain, options: RunOptions) -> i32 {
    match main.run_test(options).await {
        Ok(report) => {
            println!(
                "{} passed, {} failed, {} skipped",
                report.passed(),
                report.failed(),
                report.skipped()
            );
            if report.is_success() {
                0
            } else {
                1
            }
        }
        Err(e) => {
            eprintln!("(error) {}", e);
            1
        }
    }
}

fn exit_code(result: piilop_core::Result<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("(error) {}", e);
            1
        }
    }
}
