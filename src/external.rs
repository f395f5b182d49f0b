use crate::cancel::CancellationToken;
use crate::command::{CommandFactory, ExecutableCommand, ExitCode, Factory, Invocation};
use crate::env::Environment;
use crate::error::ShellError;
use crate::registry::resolve_path;
use std::ffi::OsString;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

/// How often a waiting stage re-checks whether its child has exited.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Command that is not a builtin.
pub struct ExternalCommand {
    name: String,
    path: PathBuf,
    args: Vec<OsString>,
}

impl ExternalCommand {
    pub fn new(name: impl Into<String>, path: PathBuf, args: Vec<OsString>) -> Self {
        Self {
            name: name.into(),
            path,
            args,
        }
    }
}

impl CommandFactory for Factory<ExternalCommand> {
    fn try_create(
        &self,
        env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>> {
        let path = resolve_path(&env.current_dir, name)
            .or_else(|| env.commands.resolve(name).map(Path::to_path_buf))?;
        Some(Box::new(ExternalCommand::new(
            name,
            path,
            args.iter().map(OsString::from).collect(),
        )))
    }
}

impl ExecutableCommand for ExternalCommand {
    fn execute(self: Box<Self>, invocation: Invocation<'_>) -> Result<ExitCode, ShellError> {
        let Invocation {
            stdin,
            stdout,
            stderr,
            env,
            cancel,
        } = invocation;
        let ExternalCommand { name, path, args } = *self;

        let mut command = Command::new(&path);
        command
            .args(&args)
            .envs(env.vars.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(&env.current_dir);

        // In-process streams can't be handed to the child; pump them through pipes.
        let feed = match stdin.into_stdio() {
            Ok(stdio) => {
                command.stdin(stdio);
                None
            }
            Err(source) => {
                command.stdin(Stdio::piped());
                Some(source)
            }
        };
        let out_sink = match stdout.into_stdio() {
            Ok(stdio) => {
                command.stdout(stdio);
                None
            }
            Err(sink) => {
                command.stdout(Stdio::piped());
                Some(sink)
            }
        };
        let err_sink = match stderr.into_stdio() {
            Ok(stdio) => {
                command.stderr(stdio);
                None
            }
            Err(sink) => {
                command.stderr(Stdio::piped());
                Some(sink)
            }
        };

        let spawned = command.spawn();
        // The command still owns our copies of the conduit ends; close them now
        // or the downstream stage never sees end of file.
        drop(command);
        let mut child = spawned.map_err(|source| ShellError::Launch {
            name: name.clone(),
            source,
        })?;
        log::debug!("spawned {} (pid {})", name, child.id());

        thread::scope(|scope| {
            let pumps = [
                feed.zip(child.stdin.take())
                    .map(|(source, pipe)| scope.spawn(move || pump(source, pipe))),
                out_sink
                    .zip(child.stdout.take())
                    .map(|(sink, pipe)| scope.spawn(move || pump(pipe, sink))),
                err_sink
                    .zip(child.stderr.take())
                    .map(|(sink, pipe)| scope.spawn(move || pump(pipe, sink))),
            ];

            let status = wait_or_cancel(&mut child, cancel, &name);

            let mut relay_error = None;
            for handle in pumps.into_iter().flatten() {
                match handle.join() {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        relay_error.get_or_insert(e);
                    }
                    Err(panic) => std::panic::resume_unwind(panic),
                }
            }

            let status = status?;
            if let Some(e) = relay_error {
                return Err(ShellError::io(name, e));
            }
            Ok(exit_code(&name, status))
        })
    }
}

/// Block until the child exits or the pipeline is cancelled.
///
/// On cancellation the child is killed and reaped before returning.
fn wait_or_cancel(
    child: &mut Child,
    cancel: &CancellationToken,
    name: &str,
) -> Result<ExitStatus, ShellError> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {}
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ShellError::io(name, e));
            }
        }
        if cancel.wait_timeout(POLL_INTERVAL) {
            log::debug!("cancelling {} (pid {})", name, child.id());
            let _ = child.kill();
            let _ = child.wait();
            return Err(ShellError::Cancelled(name.to_string()));
        }
    }
}

/// Copy until end of file. A reader that went away is not an error.
fn pump(mut from: impl Read, mut to: impl Write) -> io::Result<()> {
    match io::copy(&mut from, &mut to).and_then(|_| to.flush()) {
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        other => other,
    }
}

fn exit_code(name: &str, status: ExitStatus) -> ExitCode {
    match status.code() {
        Some(code) => code,
        None if killed_by_sigpipe(status) => {
            log::debug!("{} stopped by SIGPIPE, treating as success", name);
            0
        }
        None => terminated_by_signal(status),
    }
}

#[cfg(unix)]
fn killed_by_sigpipe(exit_status: ExitStatus) -> bool {
    use nix::sys::signal::Signal;
    use std::os::unix::process::ExitStatusExt;
    exit_status.signal() == Some(Signal::SIGPIPE as i32)
}

#[cfg(not(unix))]
fn killed_by_sigpipe(_exit_status: ExitStatus) -> bool {
    false
}

#[cfg(unix)]
fn terminated_by_signal(exit_status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = ExitStatusExt::signal(&exit_status) {
        128 + signal
    } else if ExitStatusExt::core_dumped(&exit_status) {
        255
    } else {
        -1
    }
}

#[cfg(not(unix))]
fn terminated_by_signal(_exit_status: ExitStatus) -> i32 {
    -1
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::command::{Stdin, Stdout};
    use crate::io_adapters::{MemReader, MemWriter, SharedBuffer};
    use crate::test_util::{make_unique_temp_dir, path_env, process_lock};
    use std::fs;
    use std::time::Instant;

    struct Run {
        result: Result<ExitCode, ShellError>,
        out: SharedBuffer,
        err: SharedBuffer,
    }

    fn run_with(
        env: &mut Environment,
        cancel: &CancellationToken,
        name: &str,
        args: &[&str],
        input: &[u8],
    ) -> Run {
        let factory = Factory::<ExternalCommand>::default();
        let command = factory
            .try_create(env, name, args)
            .unwrap_or_else(|| panic!("{name} should resolve"));
        let (stdout, out) = MemWriter::with_handle();
        let (stderr, err) = MemWriter::with_handle();
        let stdin: Box<dyn Stdin> = Box::new(MemReader::new(input.to_vec()));
        let stdout: Box<dyn Stdout> = Box::new(stdout);
        let stderr: Box<dyn Stdout> = Box::new(stderr);
        let result = command.execute(Invocation {
            stdin,
            stdout,
            stderr,
            env,
            cancel,
        });
        Run { result, out, err }
    }

    fn run(name: &str, args: &[&str], input: &[u8]) -> Run {
        let mut env = path_env([]);
        run_with(&mut env, &CancellationToken::new(), name, args, input)
    }

    #[test]
    fn test_output_is_relayed_into_memory_sinks() {
        let _lock = process_lock();
        let r = run("sh", &["-c", "printf out; printf err >&2"], b"");
        assert_eq!(r.result.unwrap(), 0);
        assert_eq!(r.out.to_string_lossy(), "out");
        assert_eq!(r.err.to_string_lossy(), "err");
    }

    #[test]
    fn test_memory_input_is_fed_to_child() {
        let _lock = process_lock();
        let r = run("cat", &[], b"line one\nline two\n");
        assert_eq!(r.result.unwrap(), 0);
        assert_eq!(r.out.to_string_lossy(), "line one\nline two\n");
    }

    #[test]
    fn test_unread_input_is_not_an_error() {
        let _lock = process_lock();
        let input = vec![b'x'; 1 << 20];
        let r = run("true", &[], &input);
        assert_eq!(r.result.unwrap(), 0);
    }

    #[test]
    fn test_exit_codes_and_signals() {
        let _lock = process_lock();
        assert_eq!(run("sh", &["-c", "exit 3"], b"").result.unwrap(), 3);
        assert_eq!(run("sh", &["-c", "kill -TERM $$"], b"").result.unwrap(), 128 + 15);
        // SIGPIPE counts as success
        assert_eq!(run("sh", &["-c", "kill -PIPE $$"], b"").result.unwrap(), 0);
    }

    #[test]
    fn test_child_sees_shell_vars_and_dir() {
        let _lock = process_lock();
        let dir = make_unique_temp_dir("external_env");
        let mut env = path_env([]);
        env.set_var("PIPESH_TEST_VAR", "hello");
        env.current_dir = fs::canonicalize(&dir).unwrap();

        let r = run_with(
            &mut env,
            &CancellationToken::new(),
            "sh",
            &["-c", "echo $PIPESH_TEST_VAR; pwd"],
            b"",
        );
        assert_eq!(r.result.unwrap(), 0);
        assert_eq!(
            r.out.to_string_lossy(),
            format!("hello\n{}\n", env.current_dir.display())
        );
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_cancellation_kills_and_reaps_child() {
        let _lock = process_lock();
        let mut env = path_env([]);
        let cancel = CancellationToken::new();
        let started = Instant::now();
        let r = thread::scope(|scope| {
            scope.spawn(|| {
                thread::sleep(Duration::from_millis(50));
                cancel.cancel();
            });
            run_with(&mut env, &cancel, "sleep", &["5"], b"")
        });
        assert!(matches!(r.result, Err(ShellError::Cancelled(ref name)) if name == "sleep"));
        assert!(started.elapsed() < Duration::from_secs(4));
        assert!(crate::test_util::no_children_left());
    }

    #[test]
    fn test_factory_resolution() {
        let env = path_env([]);
        let factory = Factory::<ExternalCommand>::default();
        assert!(factory.try_create(&env, "sh", &[]).is_some());
        assert!(factory.try_create(&env, "/bin/sh", &["-c", "true"]).is_some());
        assert!(factory.try_create(&env, "definitely-not-a-command-42", &[]).is_none());
        assert!(factory.try_create(&env, "./definitely-not-here", &[]).is_none());
    }

    #[test]
    fn test_relative_path_runs_from_shell_dir() {
        let _lock = process_lock();
        use std::os::unix::fs::PermissionsExt;
        let dir = make_unique_temp_dir("external_rel");
        let script = dir.join("hello.sh");
        fs::write(&script, "#!/bin/sh\necho from script\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let mut env = path_env([]);
        env.current_dir = dir.clone();
        let r = run_with(&mut env, &CancellationToken::new(), "./hello.sh", &[], b"");
        assert_eq!(r.result.unwrap(), 0);
        assert_eq!(r.out.to_string_lossy(), "from script\n");
        let _ = fs::remove_dir_all(dir);
    }
}
