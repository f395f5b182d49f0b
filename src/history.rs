//! Command history: storage, persistence and Up/Down navigation.

use anyhow::{Context, Result};
use rustyline::history::{FileHistory, History as _, SearchDirection};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Entries kept in memory and in the history file.
pub const MAX_ENTRIES: usize = 50_000;

/// Every line is kept, repeats included, up to [`MAX_ENTRIES`].
fn log_storage() -> Result<FileHistory> {
    let config = rustyline::Config::builder()
        .max_history_size(MAX_ENTRIES)?
        .history_ignore_dups(false)?
        .history_ignore_space(false)
        .build();
    Ok(FileHistory::with_config(&config))
}

/// Lines entered at the prompt, optionally persisted to a file.
///
/// Entries are stored in a [`rustyline`] `FileHistory`. When a file is
/// configured, previous entries are loaded on open and every new line is
/// appended as soon as it is written.
pub struct History {
    entries: FileHistory,
    file: Option<PathBuf>,
    /// Index of the entry shown by the editor, `None` while editing a fresh line.
    position: Option<usize>,
}

impl History {
    /// History that lives only as long as the shell.
    pub fn in_memory() -> Self {
        let entries = log_storage().unwrap_or_else(|e| {
            log::warn!("history: {:#}, falling back to defaults", e);
            FileHistory::new()
        });
        Self {
            entries,
            file: None,
            position: None,
        }
    }

    /// History backed by `file`. A missing file is created on first write.
    pub fn open(file: PathBuf) -> Result<Self> {
        let mut entries = log_storage()?;
        if file.exists() {
            entries
                .load(&file)
                .with_context(|| format!("can't load history from {}", file.display()))?;
        }
        log::debug!("history: {} entries from {}", entries.len(), file.display());
        Ok(Self {
            entries,
            file: Some(file),
            position: None,
        })
    }

    /// Record a completed line and reset navigation.
    pub fn write(&mut self, line: &str) -> Result<()> {
        self.position = None;
        let added = self.entries.add(line).context("can't record history entry")?;
        if let (true, Some(file)) = (added, &self.file) {
            self.entries
                .append(file)
                .with_context(|| format!("can't append history to {}", file.display()))?;
        }
        Ok(())
    }

    /// Flush pending entries to the history file, if any.
    pub fn close(&mut self) -> Result<()> {
        if let Some(file) = &self.file {
            self.entries
                .append(file)
                .with_context(|| format!("can't save history to {}", file.display()))?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry at `index`, oldest first.
    pub fn get(&self, index: usize) -> Option<String> {
        self.entries
            .get(index, SearchDirection::Forward)
            .ok()
            .flatten()
            .map(|found| found.entry.into_owned())
    }

    /// Leave navigation; the next step back starts from the newest entry.
    pub fn reset_navigation(&mut self) {
        self.position = None;
    }

    /// Step to the next older entry. Stays on the oldest one once reached.
    pub fn navigate_previous(&mut self) -> Option<String> {
        if self.entries.is_empty() {
            return None;
        }
        let index = match self.position {
            None => self.entries.len() - 1,
            Some(index) => index.saturating_sub(1),
        };
        self.position = Some(index);
        self.get(index)
    }

    /// Step to the next newer entry.
    ///
    /// Moving past the newest entry returns an empty line and leaves navigation.
    pub fn navigate_next(&mut self) -> Option<String> {
        let index = self.position? + 1;
        if index < self.entries.len() {
            self.position = Some(index);
            self.get(index)
        } else {
            self.position = None;
            Some(String::new())
        }
    }
}

/// History shared between the line editor, the REPL loop and builtins.
#[derive(Clone)]
pub struct SharedHistory(Arc<Mutex<History>>);

impl SharedHistory {
    pub fn new(history: History) -> Self {
        Self(Arc::new(Mutex::new(history)))
    }

    pub fn lock(&self) -> MutexGuard<'_, History> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SharedHistory {
    fn default() -> Self {
        Self::new(History::in_memory())
    }
}

impl std::fmt::Debug for SharedHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedHistory")
            .field("len", &self.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn filled(lines: &[&str]) -> History {
        let mut history = History::in_memory();
        for line in lines {
            history.write(line).unwrap();
        }
        history
    }

    #[test]
    fn test_navigate_previous_walks_back_and_stops() {
        let mut history = filled(&["one", "two", "three"]);
        assert_eq!(history.navigate_previous().as_deref(), Some("three"));
        assert_eq!(history.navigate_previous().as_deref(), Some("two"));
        assert_eq!(history.navigate_previous().as_deref(), Some("one"));
        assert_eq!(history.navigate_previous().as_deref(), Some("one"));
    }

    #[test]
    fn test_navigate_next_returns_to_empty_line() {
        let mut history = filled(&["one", "two"]);
        assert_eq!(history.navigate_next(), None);
        history.navigate_previous();
        history.navigate_previous();
        assert_eq!(history.navigate_next().as_deref(), Some("two"));
        assert_eq!(history.navigate_next().as_deref(), Some(""));
        assert_eq!(history.navigate_next(), None);
    }

    #[test]
    fn test_write_resets_navigation() {
        let mut history = filled(&["one", "two"]);
        history.navigate_previous();
        history.navigate_previous();
        history.write("three").unwrap();
        assert_eq!(history.navigate_previous().as_deref(), Some("three"));
    }

    #[test]
    fn test_empty_history_navigation() {
        let mut history = History::in_memory();
        assert!(history.is_empty());
        assert_eq!(history.navigate_previous(), None);
        assert_eq!(history.navigate_next(), None);
    }

    #[test]
    fn test_long_history_keeps_every_line() {
        let mut history = History::in_memory();
        for i in 0..150 {
            history.write(&format!("echo {i}")).unwrap();
        }
        history.write("pwd").unwrap();
        history.write("pwd").unwrap();

        assert_eq!(history.len(), 152);
        assert_eq!(history.get(0).as_deref(), Some("echo 0"));
        assert_eq!(history.get(150).as_deref(), Some("pwd"));
        assert_eq!(history.get(151).as_deref(), Some("pwd"));
    }

    #[test]
    fn test_long_history_survives_reload() {
        let path = std::env::temp_dir().join(format!("history_long_{}", std::process::id()));
        let _ = fs::remove_file(&path);

        let mut history = History::open(path.clone()).unwrap();
        for i in 0..120 {
            history.write(&format!("echo {i}")).unwrap();
        }
        history.write("ls").unwrap();
        history.write("ls").unwrap();
        history.close().unwrap();

        let reopened = History::open(path.clone()).unwrap();
        assert_eq!(reopened.len(), 122);
        assert_eq!(reopened.get(0).as_deref(), Some("echo 0"));

        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_persisted_history_is_reloaded() {
        let path = std::env::temp_dir().join(format!("history_test_{}", std::process::id()));
        let _ = fs::remove_file(&path);

        let mut history = History::open(path.clone()).unwrap();
        history.write("echo first").unwrap();
        history.write("pwd").unwrap();
        history.close().unwrap();

        let reopened = History::open(path.clone()).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.get(0).as_deref(), Some("echo first"));
        assert_eq!(reopened.get(1).as_deref(), Some("pwd"));

        let _ = fs::remove_file(path);
    }
}
