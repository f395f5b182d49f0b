use crate::command::{Stdin, Stdout};
use std::io::{self, Cursor, Read, Result as IoResult, Write};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};

/// Input served from a byte buffer. External commands get it through a pipe.
pub struct MemReader {
    cursor: Cursor<Vec<u8>>,
}

impl MemReader {
    pub fn new(buf: Vec<u8>) -> Self {
        Self {
            cursor: Cursor::new(buf),
        }
    }
}

impl Read for MemReader {
    fn read(&mut self, out: &mut [u8]) -> IoResult<usize> {
        self.cursor.read(out)
    }
}

impl Stdin for MemReader {
    fn into_stdio(self: Box<Self>) -> Result<Stdio, Box<dyn Stdin>> {
        Err(self)
    }
}

/// Byte buffer that several writers can share.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything written so far.
    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Everything written so far, lossily decoded.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }
}

/// Output collected into a [`SharedBuffer`].
pub struct MemWriter {
    buf: SharedBuffer,
}

impl MemWriter {
    pub fn new() -> Self {
        Self {
            buf: SharedBuffer::new(),
        }
    }

    /// A writer plus a handle for reading what it collected.
    pub fn with_handle() -> (Self, SharedBuffer) {
        let mw = MemWriter::new();
        let handle = mw.buf.clone();
        (mw, handle)
    }
}

impl Default for MemWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for MemWriter {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        self.buf
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }
}

impl Stdout for MemWriter {
    fn into_stdio(self: Box<Self>) -> Result<Stdio, Box<dyn Stdout>> {
        Err(self)
    }
}

/// The shell's own standard input, inherited by external processes.
pub struct InheritedStdin(io::Stdin);

impl Read for InheritedStdin {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        self.0.read(buf)
    }
}

impl Stdin for InheritedStdin {
    fn into_stdio(self: Box<Self>) -> Result<Stdio, Box<dyn Stdin>> {
        Ok(Stdio::inherit())
    }
}

/// Input that is always at end of file.
pub struct NullStdin;

impl Read for NullStdin {
    fn read(&mut self, _buf: &mut [u8]) -> IoResult<usize> {
        Ok(0)
    }
}

impl Stdin for NullStdin {
    fn into_stdio(self: Box<Self>) -> Result<Stdio, Box<dyn Stdin>> {
        Ok(Stdio::null())
    }
}

/// The shell's own standard output, inherited by external processes.
pub struct InheritedStdout(io::Stdout);

impl Write for InheritedStdout {
    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> IoResult<()> {
        self.0.flush()
    }
}

impl Stdout for InheritedStdout {
    fn into_stdio(self: Box<Self>) -> Result<Stdio, Box<dyn Stdout>> {
        let mut out = self.0;
        let _ = out.flush();
        Ok(out.into())
    }
}

/// The shell's own standard error, inherited by external processes.
pub struct InheritedStderr(io::Stderr);

impl Write for InheritedStderr {
    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> IoResult<()> {
        self.0.flush()
    }
}

impl Stdout for InheritedStderr {
    fn into_stdio(self: Box<Self>) -> Result<Stdio, Box<dyn Stdout>> {
        Ok(self.0.into())
    }
}

/// Where the first stage of a pipeline reads from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Source {
    #[default]
    Terminal,
    Null,
}

impl Source {
    pub fn open(&self) -> Box<dyn Stdin> {
        match self {
            Source::Terminal => Box::new(InheritedStdin(io::stdin())),
            Source::Null => Box::new(NullStdin),
        }
    }
}

/// A destination for the shell's output or error stream.
#[derive(Debug, Clone)]
pub enum Sink {
    Stdout,
    Stderr,
    Memory(SharedBuffer),
}

impl Sink {
    /// A fresh writer for this sink; each stage gets its own.
    pub fn open(&self) -> Box<dyn Stdout> {
        match self {
            Sink::Stdout => Box::new(InheritedStdout(io::stdout())),
            Sink::Stderr => Box::new(InheritedStderr(io::stderr())),
            Sink::Memory(buf) => Box::new(MemWriter { buf: buf.clone() }),
        }
    }
}

/// The shell's normal input, output and error streams.
#[derive(Debug, Clone)]
pub struct Streams {
    pub stdin: Source,
    pub stdout: Sink,
    pub stderr: Sink,
}

impl Streams {
    /// Streams that capture output in memory, for embedding and tests.
    pub fn captured() -> (Self, SharedBuffer, SharedBuffer) {
        let out = SharedBuffer::new();
        let err = SharedBuffer::new();
        let streams = Self {
            stdin: Source::Null,
            stdout: Sink::Memory(out.clone()),
            stderr: Sink::Memory(err.clone()),
        };
        (streams, out, err)
    }
}

impl Default for Streams {
    fn default() -> Self {
        Self {
            stdin: Source::Terminal,
            stdout: Sink::Stdout,
            stderr: Sink::Stderr,
        }
    }
}
