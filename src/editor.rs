//! Raw-mode line editor with command-name completion.
//!
//! Input is processed one byte at a time by [`LineEditor::feed`], which keeps
//! the line buffer and the screen in step using plain ANSI writes. Reading
//! from the real terminal only adds the raw-mode guard around that loop.

use crate::history::SharedHistory;
use crate::terminal::RawMode;
use crate::trie::{Completions, Trie};
use std::io::{self, Read, Write};
use std::sync::Arc;

const KEY_CTRL_C: u8 = 3;
const KEY_CTRL_D: u8 = 4;
const KEY_BELL: u8 = 7;
const KEY_CTRL_H: u8 = 8;
const KEY_TAB: u8 = 9;
const KEY_CTRL_J: u8 = 10;
const KEY_ENTER: u8 = 13;
const KEY_ESC: u8 = 27;
const KEY_BACKSPACE: u8 = 127;

const CLEAR_TO_EOL: &str = "\x1b[K";

/// What the caller should do after a byte was fed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Continue,
    /// A complete line, without the terminator.
    Submit(String),
    /// End of input requested on an empty line.
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Collecting,
    /// Saw ESC, waiting for `[` or `O`.
    Escape,
    /// Inside a control sequence. `parameters` is set once a parameter byte was seen.
    Sequence { parameters: bool },
}

/// Keystroke state machine for one prompt line at a time.
pub struct LineEditor {
    trie: Arc<Trie>,
    history: SharedHistory,
    prompt: String,
    buffer: Vec<char>,
    cursor: usize,
    state: State,
    /// Line contents when the last Tab rang the bell over several candidates.
    ambiguous: Option<String>,
}

impl LineEditor {
    pub fn new(trie: Arc<Trie>, history: SharedHistory, prompt: impl Into<String>) -> Self {
        Self {
            trie,
            history,
            prompt: prompt.into(),
            buffer: Vec::new(),
            cursor: 0,
            state: State::Collecting,
            ambiguous: None,
        }
    }

    /// Read one line from the terminal in raw mode.
    ///
    /// Returns `None` at end of input. The terminal is restored before returning.
    pub fn read_line(&mut self) -> anyhow::Result<Option<String>> {
        let _raw = RawMode::enable()?;
        let line = self.read_from(&mut io::stdin().lock(), &mut io::stdout().lock())?;
        Ok(line)
    }

    /// Print the prompt and feed bytes from `input` until a line is complete.
    pub fn read_from(
        &mut self,
        input: &mut dyn Read,
        out: &mut dyn Write,
    ) -> io::Result<Option<String>> {
        self.reset();
        write!(out, "{}", self.prompt)?;
        out.flush()?;

        let mut byte = [0u8; 1];
        loop {
            match input.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
            match self.feed(byte[0], out)? {
                Event::Continue => {}
                Event::Submit(line) => return Ok(Some(line)),
                Event::Eof => return Ok(None),
            }
        }
    }

    /// Process one input byte, echoing whatever the screen needs to `out`.
    pub fn feed(&mut self, byte: u8, out: &mut dyn Write) -> io::Result<Event> {
        let event = match self.state {
            State::Escape => {
                self.state = match byte {
                    b'[' | b'O' => State::Sequence { parameters: false },
                    _ => State::Collecting,
                };
                Event::Continue
            }
            State::Sequence { parameters } => {
                match byte {
                    0x20..=0x3f => self.state = State::Sequence { parameters: true },
                    0x40..=0x7e => {
                        self.state = State::Collecting;
                        // `ESC [ 3 ~` and friends are swallowed
                        if !parameters {
                            self.arrow(byte, out)?;
                        }
                    }
                    _ => self.state = State::Collecting,
                }
                Event::Continue
            }
            State::Collecting => self.key(byte, out)?,
        };
        out.flush()?;
        Ok(event)
    }

    fn key(&mut self, byte: u8, out: &mut dyn Write) -> io::Result<Event> {
        if byte != KEY_TAB {
            self.ambiguous = None;
        }
        match byte {
            KEY_TAB => self.complete(out)?,
            KEY_ENTER | KEY_CTRL_J => {
                out.write_all(b"\r\n")?;
                let line = self.buffer.iter().collect();
                self.reset();
                return Ok(Event::Submit(line));
            }
            KEY_BACKSPACE | KEY_CTRL_H => self.backspace(out)?,
            KEY_ESC => self.state = State::Escape,
            KEY_CTRL_C => {
                out.write_all(b"^C\r\n")?;
                self.reset();
                return Ok(Event::Submit(String::new()));
            }
            KEY_CTRL_D if self.buffer.is_empty() => {
                out.write_all(b"\r\n")?;
                return Ok(Event::Eof);
            }
            0x20..=0x7e => self.insert(char::from(byte), out)?,
            _ => {}
        }
        Ok(Event::Continue)
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.cursor = 0;
        self.state = State::Collecting;
        self.ambiguous = None;
        self.history.lock().reset_navigation();
    }

    fn line(&self) -> String {
        self.buffer.iter().collect()
    }

    fn tail(&self) -> String {
        self.buffer[self.cursor..].iter().collect()
    }

    fn insert(&mut self, ch: char, out: &mut dyn Write) -> io::Result<()> {
        self.buffer.insert(self.cursor, ch);
        self.cursor += 1;
        let tail = self.tail();
        write!(out, "{}{}", ch, tail)?;
        move_back(out, self.buffer.len() - self.cursor)
    }

    fn backspace(&mut self, out: &mut dyn Write) -> io::Result<()> {
        if self.cursor == 0 {
            return Ok(());
        }
        self.cursor -= 1;
        self.buffer.remove(self.cursor);
        let tail = self.tail();
        write!(out, "\x08{}{}", CLEAR_TO_EOL, tail)?;
        move_back(out, self.buffer.len() - self.cursor)
    }

    fn arrow(&mut self, byte: u8, out: &mut dyn Write) -> io::Result<()> {
        match byte {
            b'A' => {
                let entry = self.history.lock().navigate_previous();
                if let Some(line) = entry {
                    self.replace_line(&line, out)?;
                }
            }
            b'B' => {
                let entry = self.history.lock().navigate_next();
                if let Some(line) = entry {
                    self.replace_line(&line, out)?;
                }
            }
            b'C' if self.cursor < self.buffer.len() => {
                self.cursor += 1;
                out.write_all(b"\x1b[C")?;
            }
            b'D' if self.cursor > 0 => {
                self.cursor -= 1;
                out.write_all(b"\x1b[D")?;
            }
            _ => {}
        }
        Ok(())
    }

    fn replace_line(&mut self, line: &str, out: &mut dyn Write) -> io::Result<()> {
        self.buffer = line.chars().collect();
        self.cursor = self.buffer.len();
        self.redraw(out)
    }

    /// Repaint prompt and buffer on the current row, then place the cursor.
    fn redraw(&self, out: &mut dyn Write) -> io::Result<()> {
        write!(out, "\r{}{}{}", self.prompt, self.line(), CLEAR_TO_EOL)?;
        move_back(out, self.buffer.len() - self.cursor)
    }

    fn complete(&mut self, out: &mut dyn Write) -> io::Result<()> {
        let line = self.line();
        let mut words = line.split_whitespace();
        let token = match (words.next(), words.next()) {
            (None, _) => "",
            (Some(first), None) if !line.ends_with(char::is_whitespace) => first,
            _ => {
                write!(out, "\r\n(file completion not implemented)\r\n")?;
                return self.redraw(out);
            }
        };

        let Completions { words, common } = self.trie.all_words(token);
        match words.as_slice() {
            [] => out.write_all(&[KEY_BELL]),
            [only] => {
                let completed = format!("{} ", only);
                self.replace_token(&line, token, &completed, out)
            }
            _ if common.len() > token.len() => self.replace_token(&line, token, &common, out),
            _ if self.ambiguous.as_deref() == Some(line.as_str()) => {
                write!(out, "\r\n{}\r\n", words.join("  "))?;
                self.redraw(out)
            }
            _ => {
                self.ambiguous = Some(line);
                out.write_all(&[KEY_BELL])
            }
        }
    }

    /// Swap the trailing `token` of `line` for `replacement`, cursor at the end.
    fn replace_token(
        &mut self,
        line: &str,
        token: &str,
        replacement: &str,
        out: &mut dyn Write,
    ) -> io::Result<()> {
        let kept = line.trim_end()[..line.trim_end().len() - token.len()].to_string();
        self.replace_line(&(kept + replacement), out)
    }
}

fn move_back(out: &mut dyn Write, count: usize) -> io::Result<()> {
    for _ in 0..count {
        out.write_all(b"\x08")?;
    }
    Ok(())
}
