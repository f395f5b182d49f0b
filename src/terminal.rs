//! Scoped raw mode and interrupt handling for the controlling terminal.

use anyhow::{Context, Result};
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use nix::sys::termios::{SetArg, Termios, cfmakeraw, tcgetattr, tcsetattr};
use std::ffi::c_int;
use std::io;
use std::os::fd::AsFd;

/// Puts standard input into raw mode for as long as it lives.
///
/// The previous settings are captured before anything is changed and put
/// back on drop, so every exit path (including `?` and panics) leaves the
/// terminal as it was found.
pub struct RawMode {
    original: Termios,
}

impl RawMode {
    pub fn enable() -> Result<Self> {
        let stdin = io::stdin();
        let original = tcgetattr(stdin.as_fd()).context("failed to get terminal state")?;
        let mut raw = original.clone();
        cfmakeraw(&mut raw);
        tcsetattr(stdin.as_fd(), SetArg::TCSANOW, &raw)
            .context("failed to set terminal to raw mode")?;
        Ok(Self { original })
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        if let Err(e) = tcsetattr(io::stdin().as_fd(), SetArg::TCSANOW, &self.original) {
            log::warn!("failed to restore terminal state: {}", e);
        }
    }
}

extern "C" fn on_interrupt(_: c_int) {}

/// Keep the shell alive when Ctrl-C reaches the foreground process group.
///
/// SIGINT is caught by a handler that does nothing, and interrupted system
/// calls are restarted. Caught signals revert to their default action on
/// `exec`, so child processes are still interrupted as usual.
pub fn catch_interrupts() -> Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(on_interrupt),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    // SAFETY: the handler is empty, so it is async-signal-safe.
    let previous = unsafe { sigaction(Signal::SIGINT, &action) };
    previous.context("failed to install SIGINT handler")?;
    Ok(())
}
