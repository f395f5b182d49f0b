//! Tokenizer and pipeline splitter for one command line.
//!
//! The tokenizer is a single left-to-right scan that honours single quotes,
//! double quotes and backslash escapes. The resulting token stream is sliced at
//! unquoted `|` separators into pipeline stages. Redirection operators are
//! recognised only when written without quotes or backslashes.

use crate::redirect::Redirect;
use thiserror::Error;

/// One command (with its arguments) within a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub command: String,
    pub args: Vec<String>,
}

impl Stage {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }
}

/// An ordered, non-empty list of stages connected by pipes.
///
/// `redirect`, when present, applies to the last stage only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub stages: Vec<Stage>,
    pub redirect: Option<Redirect>,
}

impl Pipeline {
    /// The stage whose output reaches the shell's own sinks.
    pub fn last_stage_mut(&mut self) -> &mut Stage {
        let last = self.stages.len() - 1;
        &mut self.stages[last]
    }
}

/// Errors that can occur while turning a line into a [`Pipeline`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// A `|` with no command on one of its sides.
    #[error("syntax error near unexpected token `|'")]
    EmptyStage,
    /// A redirection operator with no target after it.
    #[error("syntax error near unexpected token `newline' after `{0}'")]
    MissingRedirectTarget(String),
}

/// A token produced by the tokenizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Word(String),
    /// Unquoted, unescaped `|`.
    Pipe,
    /// Unquoted, unescaped redirection operator such as `>` or `2>>`.
    Redirect(String),
}

impl Token {
    /// The token as an argument, for stages where redirection does not apply.
    fn into_argument(self) -> Option<String> {
        match self {
            Token::Word(text) | Token::Redirect(text) => Some(text),
            Token::Pipe => None,
        }
    }
}

struct Tokenizer {
    input: Vec<char>,
    pos: usize,
    in_single_quotes: bool,
    in_double_quotes: bool,
    pending_escape: bool,
    current: String,
    /// The current token contains a quote or backslash.
    literal: bool,
    tokens: Vec<Token>,
}

impl Tokenizer {
    fn new(line: &str) -> Self {
        Tokenizer {
            input: line.chars().collect(),
            pos: 0,
            in_single_quotes: false,
            in_double_quotes: false,
            pending_escape: false,
            current: String::new(),
            literal: false,
            tokens: Vec::new(),
        }
    }

    fn read_char(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn run(mut self) -> Vec<Token> {
        while let Some(ch) = self.read_char() {
            if self.in_single_quotes {
                self.handle_single_quote(ch);
            } else if self.pending_escape {
                self.handle_double_quote_escape(ch);
            } else {
                self.handle_char(ch);
            }
        }

        if self.in_single_quotes || self.in_double_quotes {
            // An unterminated quote keeps whatever was collected.
            log::debug!("unterminated quote at end of line, keeping partial token");
        }
        self.flush();
        self.tokens
    }

    fn handle_single_quote(&mut self, ch: char) {
        match ch {
            '\'' => self.in_single_quotes = false,
            c => self.current.push(c),
        }
    }

    fn handle_double_quote_escape(&mut self, ch: char) {
        self.pending_escape = false;
        if !matches!(ch, '"' | '$' | '\\') {
            self.current.push('\\');
        }
        self.current.push(ch);
    }

    fn handle_char(&mut self, ch: char) {
        match ch {
            '\\' if self.in_double_quotes => self.pending_escape = true,
            '\\' => {
                self.literal = true;
                if let Some(next) = self.read_char() {
                    self.current.push(next);
                }
            }
            '"' => {
                self.literal = true;
                self.in_double_quotes = !self.in_double_quotes;
            }
            '\'' if !self.in_double_quotes => {
                self.literal = true;
                self.in_single_quotes = true;
            }
            c if self.in_double_quotes => self.current.push(c),
            c if c.is_ascii_whitespace() => self.flush(),
            '|' => {
                self.flush();
                self.tokens.push(Token::Pipe);
            }
            c => self.current.push(c),
        }
    }

    fn flush(&mut self) {
        let literal = std::mem::take(&mut self.literal);
        if self.current.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.current);
        if !literal && Redirect::parse_operator(&text).is_some() {
            self.tokens.push(Token::Redirect(text));
        } else {
            self.tokens.push(Token::Word(text));
        }
    }
}

/// Split `line` into tokens.
///
/// Empty tokens (including `""` and `''`) are dropped.
pub fn tokenize(line: &str) -> Vec<Token> {
    Tokenizer::new(line).run()
}

/// Parse one line into a pipeline.
///
/// An unquoted redirection operator in the last stage is taken out together
/// with its target and attached to the pipeline; in earlier stages it is an
/// ordinary argument. Returns `Ok(None)` for a line without any tokens.
pub fn parse(line: &str) -> Result<Option<Pipeline>, ParseError> {
    let tokens = tokenize(line);
    if tokens.is_empty() {
        return Ok(None);
    }

    let segments: Vec<&[Token]> = tokens.split(|token| *token == Token::Pipe).collect();
    let last = segments.len() - 1;
    let mut stages = Vec::with_capacity(segments.len());
    let mut redirect = None;
    for (index, segment) in segments.into_iter().enumerate() {
        let mut segment = segment.to_vec();
        if index == last {
            redirect = Redirect::take_from(&mut segment)?;
        }
        let mut words = segment.into_iter().filter_map(Token::into_argument);
        let command = words.next().ok_or(ParseError::EmptyStage)?;
        stages.push(Stage::new(command, words.collect()));
    }

    Ok(Some(Pipeline { stages, redirect }))
}
