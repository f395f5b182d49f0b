use crate::command::{CommandFactory, ExecutableCommand, ExitCode, Factory, Invocation};
use crate::env::Environment;
use crate::error::ShellError;
use crate::registry::resolve_path;
use anyhow::{Context, Result, bail};
use argh::{EarlyExit, FromArgs};
use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
/// in-process without spawning a child process.
pub(crate) trait BuiltinCommand: Sized + FromArgs + Send {
    /// Canonical name of the command, e.g. "echo" or "cd".
    fn name() -> &'static str;

    /// Executes the command using provided IO streams and environment.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    fn execute(
        self,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode>;
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn execute(self: Box<Self>, invocation: Invocation<'_>) -> Result<ExitCode, ShellError> {
        let Invocation {
            mut stdin,
            mut stdout,
            mut stderr,
            env,
            ..
        } = invocation;
        let result = <T as BuiltinCommand>::execute(*self, &mut stdin, &mut stdout, env)
            .and_then(|code| stdout.flush().map(|()| code).map_err(Into::into));
        match result {
            Ok(code) => Ok(code),
            Err(error) if is_broken_pipe(&error) => {
                log::debug!("{}: downstream closed, treating as success", T::name());
                Ok(0)
            }
            Err(error) => {
                report(&mut stderr, T::name(), &error);
                Err(ShellError::Builtin {
                    name: T::name().to_string(),
                    error,
                })
            }
        }
    }
}

/// Write a builtin's failure to its own stderr, which may be redirected.
fn report(stderr: &mut dyn Write, name: &str, error: &anyhow::Error) {
    if let Err(e) = writeln!(stderr, "{}: {:#}", name, error).and_then(|()| stderr.flush()) {
        log::warn!("{}: can't report error: {}", name, e);
    }
}

/// Builtin analogue of SIGPIPE: the reader of our output went away.
fn is_broken_pipe(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        cause
            .downcast_ref::<io::Error>()
            .is_some_and(|e| e.kind() == io::ErrorKind::BrokenPipe)
    })
}

/// Outcome of argument parsing that didn't produce a command: `--help` or a usage error.
struct InvalidArgs {
    name: &'static str,
    output: String,
    is_error: bool,
}

impl ExecutableCommand for InvalidArgs {
    fn execute(self: Box<Self>, invocation: Invocation<'_>) -> Result<ExitCode, ShellError> {
        if self.is_error {
            let error = anyhow::anyhow!(self.output.trim_end().to_string());
            let mut stderr = invocation.stderr;
            report(&mut stderr, self.name, &error);
            return Err(ShellError::Builtin {
                name: self.name.to_string(),
                error,
            });
        }
        let mut stdout = invocation.stdout;
        stdout
            .write_all(self.output.as_bytes())
            .and_then(|()| stdout.flush())
            .map_err(|e| ShellError::io(self.name, e))?;
        Ok(0)
    }
}

impl<T: BuiltinCommand + 'static> CommandFactory for Factory<T> {
    fn try_create(
        &self,
        _env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>> {
        if name == T::name() {
            Some(match T::from_args(&[name], args) {
                Ok(cmd) => Box::new(cmd),
                Err(EarlyExit { output, status }) => Box::new(InvalidArgs {
                    name: T::name(),
                    output,
                    is_error: status.is_err(),
                }),
            })
        } else {
            None
        }
    }

    fn builtin_name(&self) -> Option<&'static str> {
        Some(T::name())
    }
}

/// Factories for every builtin, in lookup order.
pub(crate) fn factories() -> Vec<Box<dyn CommandFactory>> {
    vec![
        Box::new(Factory::<Echo>::default()),
        Box::new(Factory::<Pwd>::default()),
        Box::new(Factory::<Cd>::default()),
        Box::new(Factory::<Type>::default()),
        Box::new(Factory::<Exit>::default()),
        Box::new(Factory::<History>::default()),
    ]
}

#[derive(FromArgs)]
/// Print the current working directory to standard output.
pub struct Pwd {}

impl BuiltinCommand for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        writeln!(stdout, "{}", env.current_dir.to_string_lossy())?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
/// If no target is provided, changes to the directory specified by the HOME environment variable.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to: absolute, relative to the current directory,
    /// or starting with ~. Defaults to $HOME when omitted.
    pub target: Option<String>,
}

impl Cd {
    fn home(env: &Environment) -> Result<PathBuf> {
        env.get_var("HOME")
            .map(PathBuf::from)
            .context("HOME not set")
    }
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        let target = match self.target.as_deref() {
            None | Some("") | Some("~") => Cd::home(env)?,
            Some(t) => match t.strip_prefix("~/") {
                Some(rest) => Cd::home(env)?.join(rest),
                None => PathBuf::from(t),
            },
        };

        let new_dir = if target.is_absolute() {
            target
        } else {
            env.current_dir.join(target)
        };

        let canonical = fs::canonicalize(&new_dir)
            .with_context(|| format!("can't change to {}", new_dir.display()))?;
        if !canonical.is_dir() {
            bail!("can't change to {}: Not a directory", new_dir.display());
        }

        env.set_var("PWD", canonical.to_string_lossy());
        env.current_dir = canonical;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Tell how each name would be interpreted if used as a command.
pub struct Type {
    #[argh(positional, greedy)]
    /// command names to look up.
    pub names: Vec<String>,
}

impl BuiltinCommand for Type {
    fn name() -> &'static str {
        "type"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        for name in &self.names {
            if env.commands.is_builtin(name) {
                writeln!(stdout, "{} is a shell builtin", name)?;
                continue;
            }
            let found = resolve_path(&env.current_dir, name)
                .or_else(|| env.commands.resolve(name).map(PathBuf::from));
            match found {
                Some(path) => writeln!(stdout, "{} is {}", name, path.display())?,
                None => writeln!(stdout, "{}: not found", name)?,
            }
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Exit the shell process.
pub struct Exit {
    #[argh(positional, default = "0")]
    /// exit status, 0 when omitted.
    pub code: i32,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        if let Err(e) = env.history.lock().close() {
            log::warn!("{:#}", e);
        }
        let _ = stdout.flush();
        std::process::exit(self.code)
    }
}

#[derive(FromArgs)]
/// List previously entered lines, oldest first.
pub struct History {
    #[argh(positional)]
    /// only show the last N entries.
    pub limit: Option<usize>,
}

impl BuiltinCommand for History {
    fn name() -> &'static str {
        "history"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        // Copy out first so a slow reader downstream doesn't hold the lock.
        let entries: Vec<String> = {
            let history = env.history.lock();
            let start = self
                .limit
                .map_or(0, |limit| history.len().saturating_sub(limit));
            (start..history.len())
                .filter_map(|index| {
                    history
                        .get(index)
                        .map(|line| format!("{:>5}  {}", index + 1, line))
                })
                .collect()
        };
        for entry in entries {
            writeln!(stdout, "{}", entry)?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// write the arguments to standard output, separated by spaces.
/// by default, a trailing newline is printed.
pub struct Echo {
    #[argh(switch, short = 'n')]
    /// do not output the trailing newline.
    pub no_newline: bool,

    #[argh(positional, greedy)]
    /// values to print as-is, separated by spaces.
    pub args: Vec<String>,
}

impl BuiltinCommand for Echo {
    fn name() -> &'static str {
        "echo"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        let s = self.args.join(" ");
        if self.no_newline {
            write!(stdout, "{}", s)?;
        } else {
            writeln!(stdout, "{}", s)?;
        }
        Ok(0)
    }
}
