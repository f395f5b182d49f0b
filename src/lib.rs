//! An interactive command shell with pipelines, redirection and completion.
//!
//! A line typed at the prompt goes through three stages:
//!
//! - [`editor`] collects keystrokes in raw terminal mode and completes command
//!   names from a [`trie`] of builtins and executables.
//! - [`parser`] splits the line into a [`parser::Pipeline`] of stages, honouring
//!   quotes and backslash escapes.
//! - [`executor`] runs every stage concurrently, builtins in-process and other
//!   commands as child processes, connected by OS pipes.
//!
//! [`Interpreter`] ties these together into a read-eval-print loop. The
//! [`command`] and [`env`] modules expose the traits and types for
//! implementing additional commands.

mod builtin;
pub mod cancel;
pub mod command;
mod config;
pub mod editor;
pub mod env;
pub mod error;
pub mod executor;
mod external;
pub mod history;
mod interpreter;
pub mod io_adapters;
pub mod parser;
pub mod redirect;
pub mod registry;
mod terminal;
pub mod trie;

#[cfg(test)]
mod test_util;

pub use config::Config;
pub use error::ShellError;
pub use interpreter::Interpreter;
