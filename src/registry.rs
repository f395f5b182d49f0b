//! Lookup table from command names to executables on the search path.

use std::collections::{BTreeSet, HashMap};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

/// Builtin names plus every executable found on the search path.
///
/// Built once at startup and read-only afterwards, so pipeline stages share it
/// without locking.
#[derive(Debug, Default, Clone)]
pub struct CommandTable {
    builtins: BTreeSet<String>,
    executables: HashMap<String, PathBuf>,
}

impl CommandTable {
    /// Scan each directory of `search_paths` (a `PATH`-style list).
    ///
    /// The first directory that provides a name wins. Unreadable directories
    /// are skipped.
    pub fn scan<'a>(search_paths: &OsStr, builtins: impl IntoIterator<Item = &'a str>) -> Self {
        let mut executables = HashMap::new();
        for dir in std::env::split_paths(search_paths) {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    log::debug!("skipping search path entry {}: {}", dir.display(), e);
                    continue;
                }
            };
            for entry in entries.flatten() {
                let Ok(name) = entry.file_name().into_string() else {
                    continue;
                };
                if executables.contains_key(&name) {
                    continue;
                }
                let path = entry.path();
                if is_executable(&path) {
                    executables.insert(name, path);
                }
            }
        }
        let table = Self {
            builtins: builtins.into_iter().map(str::to_string).collect(),
            executables,
        };
        log::debug!(
            "command table: {} builtins, {} executables",
            table.builtins.len(),
            table.executables.len()
        );
        table
    }

    pub fn is_builtin(&self, name: &str) -> bool {
        self.builtins.contains(name)
    }

    /// Path of the executable registered under `name`.
    pub fn resolve(&self, name: &str) -> Option<&Path> {
        self.executables.get(name).map(PathBuf::as_path)
    }

    /// Every name known to the table, builtins first.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.builtins
            .iter()
            .chain(self.executables.keys())
            .map(String::as_str)
    }
}

/// Resolve a command name that contains a path separator.
///
/// - Absolute path: returned if it exists.
/// - Relative path (`./tool`, `bin/tool`): resolved against `cwd`.
/// - Bare names and the empty string: `None`, those go through [`CommandTable`].
pub fn resolve_path(cwd: &Path, name: &str) -> Option<PathBuf> {
    if !name.contains(std::path::MAIN_SEPARATOR) {
        return None;
    }
    let path = Path::new(name);
    let candidate = if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    };
    is_executable(&candidate).then_some(candidate)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
