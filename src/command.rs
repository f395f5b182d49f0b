use crate::cancel::CancellationToken;
use crate::env::Environment;
use crate::error::ShellError;
use std::fs::File;
use std::io::{PipeReader, PipeWriter, Read, Write};
use std::marker::PhantomData;
use std::process::Stdio;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// This mirrors the convention used by POSIX shells and many command-line tools.
pub type ExitCode = i32;

/// Abstraction over a readable input stream that an external process may also
/// read from directly.
///
/// Implementors wrap the terminal, a pipe, a file or an in-memory buffer.
pub trait Stdin: Read + Send {
    /// Convert this input into a [`Stdio`] handle suitable for `std::process::Command`.
    ///
    /// Inputs that only exist inside this process hand themselves back, and the
    /// caller has to feed them to the child through a pipe.
    fn into_stdio(self: Box<Self>) -> Result<Stdio, Box<dyn Stdin>>;
}

/// Abstraction over a writable output stream that an external process may also
/// write to directly.
pub trait Stdout: Write + Send {
    /// Convert this output into a [`Stdio`] handle suitable for `std::process::Command`.
    ///
    /// Outputs that only exist inside this process hand themselves back, and the
    /// caller has to relay the child's output into them.
    fn into_stdio(self: Box<Self>) -> Result<Stdio, Box<dyn Stdout>>;
}

impl Stdin for PipeReader {
    fn into_stdio(self: Box<Self>) -> Result<Stdio, Box<dyn Stdin>> {
        Ok((*self).into())
    }
}

impl Stdin for File {
    fn into_stdio(self: Box<Self>) -> Result<Stdio, Box<dyn Stdin>> {
        Ok((*self).into())
    }
}

impl Stdout for PipeWriter {
    fn into_stdio(self: Box<Self>) -> Result<Stdio, Box<dyn Stdout>> {
        Ok((*self).into())
    }
}

impl Stdout for File {
    fn into_stdio(self: Box<Self>) -> Result<Stdio, Box<dyn Stdout>> {
        Ok((*self).into())
    }
}

/// Everything one pipeline stage runs against.
///
/// Output routing is passed in explicitly rather than read from shared shell
/// state, so concurrently running stages never see each other's sinks.
pub struct Invocation<'a> {
    pub stdin: Box<dyn Stdin>,
    pub stdout: Box<dyn Stdout>,
    pub stderr: Box<dyn Stdout>,
    pub env: &'a mut Environment,
    pub cancel: &'a CancellationToken,
}

/// Object-safe trait for any command that can be executed by the shell.
///
/// This is implemented by built-ins via a blanket impl and by external commands.
pub trait ExecutableCommand: Send {
    /// Executes the command, consuming its streams.
    ///
    /// Every stream is dropped (and so closed) by the time this returns.
    fn execute(self: Box<Self>, invocation: Invocation<'_>) -> Result<ExitCode, ShellError>;
}

/// Factory that tries to create a command from a name and its arguments.
///
/// Returns `None` when the factory doesn't recognize the `name`.
/// Implementations can use the environment to resolve executables.
pub trait CommandFactory: Send + Sync {
    /// Attempt to create a command instance for the provided name and arguments.
    fn try_create(
        &self,
        env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>>;

    /// The builtin name this factory answers to, if it is a builtin.
    fn builtin_name(&self) -> Option<&'static str> {
        None
    }
}

/// Factory allows creating instances of ExecutableCommand.
///
/// Only supports commands defined in this crate: builtins and `ExternalCommand`.
pub(crate) struct Factory<T> {
    _phantom: PhantomData<fn() -> T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}
