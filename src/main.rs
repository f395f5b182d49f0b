use pipesh::io_adapters::{Source, Streams};
use pipesh::{Config, Interpreter};
use std::io::{self, IsTerminal};
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let mut config: Config = argh::from_env();
    config.history_file = config.history_path();

    let interactive = config.command.is_none() && io::stdin().is_terminal();
    let streams = if interactive || config.command.is_some() {
        Streams::default()
    } else {
        // Lines come from stdin, so commands must not read it too.
        Streams {
            stdin: Source::Null,
            ..Streams::default()
        }
    };

    let mut shell = match Interpreter::with_streams(&config, streams) {
        Ok(shell) => shell,
        Err(e) => {
            eprintln!("pipesh: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = match &config.command {
        Some(line) => Ok(shell.run(line)),
        None if interactive => shell.repl().map(|()| true),
        None => shell.run_script(io::stdin().lock()),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("pipesh: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
