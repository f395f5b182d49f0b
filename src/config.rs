use argh::FromArgs;
use std::path::PathBuf;

#[derive(FromArgs, Debug, Clone, PartialEq, Eq)]
/// An interactive shell with pipelines, redirection and command-name completion.
pub struct Config {
    #[argh(option, short = 'c')]
    /// run a single command line and exit.
    pub command: Option<String>,

    #[argh(option)]
    /// file to load history from and append new lines to. Defaults to $HISTFILE.
    pub history_file: Option<PathBuf>,

    #[argh(option, default = "String::from(\"$ \")")]
    /// prompt shown before each line.
    pub prompt: String,
}

impl Config {
    /// History file from the command line, else from `HISTFILE`.
    pub fn history_path(&self) -> Option<PathBuf> {
        self.history_file.clone().or_else(|| {
            std::env::var_os("HISTFILE")
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            command: None,
            history_file: None,
            prompt: String::from("$ "),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_args(&["pipesh"], &[]).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_all_options() {
        let config = Config::from_args(
            &["pipesh"],
            &["-c", "echo hi | cat", "--history-file", "/tmp/h", "--prompt", "> "],
        )
        .unwrap();
        assert_eq!(config.command.as_deref(), Some("echo hi | cat"));
        assert_eq!(config.history_path(), Some(PathBuf::from("/tmp/h")));
        assert_eq!(config.prompt, "> ");
    }

    #[test]
    fn test_unknown_flag_is_rejected() {
        assert!(Config::from_args(&["pipesh"], &["--nope"]).is_err());
    }
}
