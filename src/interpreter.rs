use crate::config::Config;
use crate::editor::LineEditor;
use crate::env::Environment;
use crate::error::ShellError;
use crate::executor::Executor;
use crate::history::{History, SharedHistory};
use crate::io_adapters::Streams;
use crate::parser::parse;
use crate::terminal;
use crate::registry::CommandTable;
use crate::trie::Trie;
use anyhow::Result;
use std::ffi::OsStr;
use std::io::{BufRead, Write};
use std::sync::Arc;

/// The shell: reads lines, runs them as pipelines and reports failures.
///
/// Nothing a line does is fatal to the interpreter except the `exit` builtin.
///
/// Example
/// ```no_run
/// use pipesh::{Config, Interpreter};
/// let mut sh = Interpreter::new(&Config::default()).unwrap();
/// assert!(sh.run("echo hello world | cat"));
/// ```
pub struct Interpreter {
    env: Environment,
    executor: Executor,
    streams: Streams,
    editor: LineEditor,
}

impl Interpreter {
    /// Shell attached to the process's own terminal streams.
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_streams(config, Streams::default())
    }

    /// Shell whose commands read and write `streams`.
    ///
    /// History is persisted only when `config.history_file` is set. The
    /// search path is scanned once, and the completion trie is built from the
    /// builtin and executable names.
    pub fn with_streams(config: &Config, streams: Streams) -> Result<Self> {
        let history = match config.history_file.clone() {
            Some(path) => History::open(path)?,
            None => History::in_memory(),
        };
        let history = SharedHistory::new(history);

        let executor = Executor::default();
        let env = Environment::new();
        let search_paths = env.get_var("PATH").unwrap_or_default();
        let commands = CommandTable::scan(OsStr::new(&search_paths), executor.builtin_names());
        let trie: Trie = commands.names().collect();
        log::debug!("completion trie built from {} names", commands.names().count());

        let editor = LineEditor::new(Arc::new(trie), history.clone(), config.prompt.as_str());
        Ok(Self {
            env: env.with_commands(commands).with_history(history),
            executor,
            streams,
            editor,
        })
    }

    /// Parse and execute one line without touching history.
    pub fn run_line(&mut self, line: &str) -> Result<(), ShellError> {
        let Some(pipeline) = parse(line)? else {
            return Ok(());
        };
        self.executor.execute(&pipeline, &mut self.env, &self.streams)
    }

    /// Record `line` in history, run it and report any failure.
    ///
    /// Returns whether the line succeeded.
    pub fn run(&mut self, line: &str) -> bool {
        if line.trim().is_empty() {
            return true;
        }
        if let Err(e) = self.env.history.lock().write(line) {
            log::warn!("{:#}", e);
        }
        match self.run_line(line) {
            Ok(()) => true,
            Err(e) => {
                if !e.is_reported() {
                    self.report(&e);
                }
                false
            }
        }
    }

    fn report(&self, error: &ShellError) {
        let mut sink = self.streams.stderr.open();
        let _ = writeln!(sink, "{}", error);
        let _ = sink.flush();
    }

    /// Interactive loop on the terminal until end of input.
    ///
    /// Ctrl-C while a pipeline runs interrupts its processes, not the shell.
    pub fn repl(&mut self) -> Result<()> {
        if let Err(e) = terminal::catch_interrupts() {
            log::warn!("{:#}", e);
        }
        while let Some(line) = self.editor.read_line()? {
            self.run(&line);
        }
        self.env.history.lock().close()
    }

    /// Run every line of `input`. Returns whether the last non-empty line succeeded.
    pub fn run_script(&mut self, input: impl BufRead) -> Result<bool> {
        let mut status = true;
        for line in input.lines() {
            let line = line?;
            if !line.trim().is_empty() {
                status = self.run(&line);
            }
        }
        self.env.history.lock().close()?;
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io_adapters::SharedBuffer;
    use crate::test_util::{make_unique_temp_dir, process_lock};
    use std::fs;
    use std::io::Cursor;

    fn shell() -> (Interpreter, SharedBuffer, SharedBuffer) {
        let (streams, out, err) = Streams::captured();
        let sh = Interpreter::with_streams(&Config::default(), streams).unwrap();
        (sh, out, err)
    }

    #[test]
    fn test_builtins_are_in_command_table() {
        let (sh, _, _) = shell();
        for name in ["echo", "pwd", "cd", "type", "exit", "history"] {
            assert!(sh.env.commands.is_builtin(name), "{name}");
        }
        assert!(sh.env.commands.names().any(|name| name == "history"));
    }

    #[test]
    fn test_pipeline_output_reaches_stdout_sink() {
        let _lock = process_lock();
        let (mut sh, out, err) = shell();
        assert!(sh.run("echo 'a  b' \"c\" | cat"));
        assert_eq!(out.to_string_lossy(), "a  b c\n");
        assert!(err.contents().is_empty());
    }

    #[test]
    fn test_failures_are_reported_and_shell_continues() {
        let (mut sh, out, err) = shell();
        assert!(!sh.run("definitely-not-a-command-42"));
        assert!(!sh.run("echo hi |"));
        assert!(sh.run("echo still here"));

        assert_eq!(
            err.to_string_lossy(),
            "definitely-not-a-command-42: command not found\nsyntax error near unexpected token `|'\n"
        );
        assert_eq!(out.to_string_lossy(), "still here\n");
    }

    #[test]
    fn test_builtin_failure_is_printed_once() {
        let (mut sh, _, err) = shell();
        assert!(!sh.run("cd /definitely/not/here"));
        let printed = err.to_string_lossy();
        assert!(printed.starts_with("cd: can't change to /definitely/not/here"), "{printed}");
        assert_eq!(printed.lines().count(), 1);
    }

    #[test]
    fn test_cd_persists_between_lines() {
        let (mut sh, out, _) = shell();
        assert!(sh.run("cd /"));
        assert!(sh.run("pwd"));
        assert_eq!(out.to_string_lossy(), "/\n");
    }

    #[test]
    fn test_history_records_lines_but_not_blanks() {
        let (mut sh, out, _) = shell();
        sh.run("echo one");
        sh.run("   ");
        sh.run("history");
        assert_eq!(out.to_string_lossy(), "one\n    1  echo one\n    2  history\n");
    }

    #[test]
    fn test_run_script_and_history_file() {
        let dir = make_unique_temp_dir("interpreter_script");
        let history_file = dir.join("history");
        let config = Config {
            history_file: Some(history_file.clone()),
            ..Config::default()
        };
        let (streams, out, _) = Streams::captured();
        let mut sh = Interpreter::with_streams(&config, streams).unwrap();

        let script = Cursor::new("echo first\n\ncd /\npwd\n");
        assert!(sh.run_script(script).unwrap());
        assert_eq!(out.to_string_lossy(), "first\n/\n");

        let saved = fs::read_to_string(&history_file).unwrap();
        assert!(saved.contains("echo first"));
        assert!(saved.contains("pwd"));

        let failing = Cursor::new("echo ok\ncd /definitely/not/here\n");
        assert!(!sh.run_script(failing).unwrap());

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_redirect_relative_to_shell_dir() {
        let dir = make_unique_temp_dir("interpreter_redirect");
        let (mut sh, out, _) = shell();
        assert!(sh.run(&format!("cd {}", dir.display())));
        assert!(sh.run("echo saved > note.txt"));
        assert!(out.contents().is_empty());
        assert_eq!(
            fs::read_to_string(dir.join("note.txt")).unwrap(),
            "saved\n"
        );
        let _ = fs::remove_dir_all(dir);
    }
}
