//! Pipeline execution engine.
//!
//! Every stage of a multi-stage pipeline runs on its own scoped thread. Stage
//! `i` writes into an OS pipe whose read end is stage `i + 1`'s input; each
//! end is moved into exactly one stage and closed when that stage drops it.
//! The first stage to fail cancels the rest, and the engine only returns once
//! every stage has finished and every child has been reaped.

use crate::builtin;
use crate::cancel::CancellationToken;
use crate::command::{CommandFactory, Factory, Invocation, Stdin, Stdout};
use crate::env::Environment;
use crate::error::ShellError;
use crate::external::ExternalCommand;
use crate::io_adapters::Streams;
use crate::parser::{Pipeline, Stage};
use crate::redirect::{Redirect, RedirectTarget};
use std::fs::File;
use std::io::{self, PipeReader};
use std::sync::{Mutex, PoisonError};
use std::thread;

/// The three endpoints one stage runs against.
struct Wiring {
    stdin: Box<dyn Stdin>,
    stdout: Box<dyn Stdout>,
    stderr: Box<dyn Stdout>,
}

/// Resolves stages to commands and runs pipelines.
///
/// Factories are queried in order; the first one that recognises a name wins.
pub struct Executor {
    factories: Vec<Box<dyn CommandFactory>>,
}

impl Executor {
    /// Create an executor with a custom set of command factories.
    pub fn new(factories: Vec<Box<dyn CommandFactory>>) -> Self {
        Self { factories }
    }

    /// Names answered by builtin factories.
    pub fn builtin_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.iter().filter_map(|f| f.builtin_name())
    }

    /// Run `pipeline` to completion.
    ///
    /// A single stage runs on the calling thread against `env` itself, so `cd`
    /// sticks. Stages of a longer pipeline each get a copy of `env`.
    ///
    /// Returns the first error any stage reported. Output already written is
    /// left as is.
    pub fn execute(
        &self,
        pipeline: &Pipeline,
        env: &mut Environment,
        streams: &Streams,
    ) -> Result<(), ShellError> {
        if pipeline.stages.is_empty() {
            return Ok(());
        }
        let mut wirings =
            wire(pipeline, env, streams).map_err(|(name, e)| ShellError::io(name, e))?;
        let cancel = CancellationToken::new();

        if let [stage] = pipeline.stages.as_slice() {
            return match wirings.pop() {
                Some(wiring) => self.run_stage(stage, wiring, env, &cancel),
                None => Ok(()),
            };
        }

        log::debug!("launching pipeline of {} stages", pipeline.stages.len());
        let first_error: Mutex<Option<ShellError>> = Mutex::new(None);
        thread::scope(|scope| {
            for (stage, wiring) in pipeline.stages.iter().zip(wirings) {
                let mut stage_env = env.clone();
                let cancel = &cancel;
                let first_error = &first_error;
                scope.spawn(move || {
                    if let Err(e) = self.run_stage(stage, wiring, &mut stage_env, cancel) {
                        record_failure(first_error, cancel, e);
                    }
                });
            }
        });

        match first_error
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
        {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Resolve and run one stage. Its endpoints are closed on every return path.
    fn run_stage(
        &self,
        stage: &Stage,
        wiring: Wiring,
        env: &mut Environment,
        cancel: &CancellationToken,
    ) -> Result<(), ShellError> {
        if cancel.is_cancelled() {
            return Err(ShellError::Cancelled(stage.command.clone()));
        }
        let args: Vec<&str> = stage.args.iter().map(String::as_str).collect();
        let command = self
            .factories
            .iter()
            .find_map(|factory| factory.try_create(env, &stage.command, &args))
            .ok_or_else(|| ShellError::CommandNotFound(stage.command.clone()))?;

        let Wiring {
            stdin,
            stdout,
            stderr,
        } = wiring;
        let code = command.execute(Invocation {
            stdin,
            stdout,
            stderr,
            env,
            cancel,
        })?;
        if code != 0 {
            return Err(ShellError::StageFailed {
                name: stage.command.clone(),
                code,
            });
        }
        Ok(())
    }
}

impl Default for Executor {
    /// Builtins first, then executables.
    fn default() -> Self {
        let mut factories = builtin::factories();
        factories.push(Box::new(Factory::<ExternalCommand>::default()));
        Self::new(factories)
    }
}

/// Keep the first real failure and stop everything else.
fn record_failure(
    first_error: &Mutex<Option<ShellError>>,
    cancel: &CancellationToken,
    error: ShellError,
) {
    if error.is_cancelled() {
        return;
    }
    let mut slot = first_error.lock().unwrap_or_else(PoisonError::into_inner);
    if slot.is_none() {
        log::debug!("pipeline failed: {}; cancelling remaining stages", error);
        *slot = Some(error);
    }
    cancel.cancel();
}

/// Allocate every conduit and the redirect file up front, one [`Wiring`] per stage.
///
/// Stderr always goes straight to the shell's error sink, except where the
/// redirect claims it for the last stage.
fn wire(
    pipeline: &Pipeline,
    env: &Environment,
    streams: &Streams,
) -> Result<Vec<Wiring>, (String, io::Error)> {
    let count = pipeline.stages.len();
    let (mut last_stdout, mut last_stderr): RedirectSinks = (None, None);
    if let Some(redirect) = &pipeline.redirect {
        (last_stdout, last_stderr) =
            open_redirect(redirect, env).map_err(|e| (redirect.path.clone(), e))?;
    }

    let mut wirings = Vec::with_capacity(count);
    let mut upstream: Option<PipeReader> = None;
    for (index, stage) in pipeline.stages.iter().enumerate() {
        let stdin: Box<dyn Stdin> = match upstream.take() {
            Some(reader) => Box::new(reader),
            None => streams.stdin.open(),
        };
        let is_last = index + 1 == count;
        let stdout: Box<dyn Stdout> = if is_last {
            last_stdout.take().unwrap_or_else(|| streams.stdout.open())
        } else {
            let (reader, writer) = io::pipe().map_err(|e| (stage.command.clone(), e))?;
            upstream = Some(reader);
            Box::new(writer)
        };
        let stderr = if is_last { last_stderr.take() } else { None }
            .unwrap_or_else(|| streams.stderr.open());
        wirings.push(Wiring {
            stdin,
            stdout,
            stderr,
        });
    }
    Ok(wirings)
}

type RedirectSinks = (Option<Box<dyn Stdout>>, Option<Box<dyn Stdout>>);

fn open_redirect(redirect: &Redirect, env: &Environment) -> io::Result<RedirectSinks> {
    fn sink(file: File) -> Option<Box<dyn Stdout>> {
        Some(Box::new(file))
    }
    let file = redirect.open(&env.current_dir)?;
    Ok(match redirect.target {
        RedirectTarget::Stdout => (sink(file), None),
        RedirectTarget::Stderr => (None, sink(file)),
        RedirectTarget::Both => {
            let err = file.try_clone()?;
            (sink(file), sink(err))
        }
    })
}
