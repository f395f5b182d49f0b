use crate::history::SharedHistory;
use crate::registry::CommandTable;
use std::collections::HashMap;
use std::env as stdenv;
use std::path::PathBuf;
use std::sync::Arc;

/// Per-shell view of the process environment.
///
/// The environment contains:
/// - `vars`: variables that will be visible to executed commands.
/// - `current_dir`: the working directory commands run in. Only `cd` changes
///   it; the shell process itself never leaves its starting directory.
/// - `commands`: the read-only name lookup table built at startup.
/// - `history`: the shared history collaborator.
///
/// Cloning is cheap for the shared tables, so every stage of a multi-stage
/// pipeline runs against its own copy.
#[derive(Debug, Clone)]
pub struct Environment {
    pub vars: HashMap<String, String>,
    pub current_dir: PathBuf,
    pub commands: Arc<CommandTable>,
    pub history: SharedHistory,
}

impl Environment {
    /// Capture the current process state.
    ///
    /// Variables come from `std::env::vars()`, the working directory from
    /// `std::env::current_dir()`. The command table starts empty.
    pub fn new() -> Self {
        let vars = stdenv::vars().collect();
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            vars,
            current_dir,
            commands: Arc::default(),
            history: SharedHistory::default(),
        }
    }

    /// Replace the command table.
    pub fn with_commands(mut self, commands: CommandTable) -> Self {
        self.commands = Arc::new(commands);
        self
    }

    pub fn with_history(mut self, history: SharedHistory) -> Self {
        self.history = history;
        self
    }

    /// Get the value of a variable.
    ///
    /// Looks up the key in `self.vars` first, falling back to `std::env::var`.
    pub fn get_var(&self, key: &str) -> Option<String> {
        self.vars
            .get(key)
            .cloned()
            .or_else(|| stdenv::var(key).ok())
    }

    /// Set or override a variable in `self.vars`.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_env() -> Environment {
        Environment {
            vars: HashMap::new(),
            current_dir: stdenv::temp_dir(),
            commands: Arc::default(),
            history: SharedHistory::default(),
        }
    }

    #[test]
    fn test_env_set_and_get_var() {
        let mut env = bare_env();

        // initially absent
        assert_eq!(env.get_var("SOME_RANDOM_ENV_VAR_12345"), None);

        env.set_var("KEY", "VALUE");

        assert_eq!(env.get_var("KEY"), Some("VALUE".to_string()));
    }

    #[test]
    fn test_env_reads_from_process_env() {
        let env = Environment::new();
        assert!(env.get_var("PATH").is_some());
    }

    #[test]
    fn test_clone_shares_tables_but_not_dir() {
        let env = bare_env().with_commands(CommandTable::scan(std::ffi::OsStr::new(""), ["echo"]));
        let mut copy = env.clone();
        copy.current_dir = PathBuf::from("/");
        copy.history.lock().write("echo hi").unwrap();

        assert_eq!(env.current_dir, stdenv::temp_dir());
        assert!(Arc::ptr_eq(&env.commands, &copy.commands));
        assert_eq!(env.history.lock().len(), 1);
    }
}
