//! Output redirection directives (`>`, `>>`, `2>`, `&>` ...).
//!
//! The tokenizer marks bare operator tokens as [`Token::Redirect`]; quoted or
//! escaped operator text stays an ordinary word. Once a line has been split
//! into stages, the operator and its target are taken out of the last stage's
//! tokens and attached to the pipeline as a [`Redirect`].

use crate::parser::{ParseError, Token};
use regex::Regex;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::OnceLock;

/// Which of the last stage's streams goes to the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectTarget {
    Stdout,
    Stderr,
    /// `&>`: both streams share the file.
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectMode {
    Truncate,
    Append,
}

/// A parsed redirection for the last stage of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub target: RedirectTarget,
    pub mode: RedirectMode,
    pub path: String,
}

fn operator_regex() -> &'static Regex {
    static OPERATOR: OnceLock<Regex> = OnceLock::new();
    OPERATOR.get_or_init(|| Regex::new(r"^(1|2|&)?(>>?)$").expect("valid redirect regex"))
}

impl Redirect {
    /// Recognise a redirection operator token.
    pub fn parse_operator(token: &str) -> Option<(RedirectTarget, RedirectMode)> {
        let caps = operator_regex().captures(token)?;
        let target = match caps.get(1).map(|m| m.as_str()) {
            None | Some("1") => RedirectTarget::Stdout,
            Some("2") => RedirectTarget::Stderr,
            _ => RedirectTarget::Both,
        };
        let mode = if &caps[2] == ">>" {
            RedirectMode::Append
        } else {
            RedirectMode::Truncate
        };
        Some((target, mode))
    }

    /// Remove the first operator token and its target from `tokens`.
    ///
    /// Tokens after the target stay in place, so `echo a > f b` writes `a b`
    /// into `f`, as POSIX shells do.
    pub fn take_from(tokens: &mut Vec<Token>) -> Result<Option<Redirect>, ParseError> {
        let Some((index, operator)) = tokens
            .iter()
            .enumerate()
            .find_map(|(i, token)| match token {
                Token::Redirect(operator) => Some((i, operator.clone())),
                _ => None,
            })
        else {
            return Ok(None);
        };
        let (target, mode) = Redirect::parse_operator(&operator)
            .ok_or_else(|| ParseError::MissingRedirectTarget(operator.clone()))?;

        let path = match tokens.get(index + 1) {
            Some(Token::Word(path)) => path.clone(),
            _ => return Err(ParseError::MissingRedirectTarget(operator)),
        };
        tokens.drain(index..=index + 1);
        Ok(Some(Redirect { target, mode, path }))
    }

    /// Open the target file, relative paths being resolved against `cwd`.
    pub fn open(&self, cwd: &Path) -> io::Result<File> {
        let mut options = OpenOptions::new();
        options.create(true);
        match self.mode {
            RedirectMode::Truncate => options.write(true).truncate(true),
            RedirectMode::Append => options.append(true),
        };
        options.open(cwd.join(&self.path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;

    fn words(list: &[&str]) -> Vec<Token> {
        list.iter().map(|s| Token::Word(s.to_string())).collect()
    }

    #[test]
    fn test_parse_operator() {
        use RedirectMode::*;
        use RedirectTarget::*;
        assert_eq!(Redirect::parse_operator(">"), Some((Stdout, Truncate)));
        assert_eq!(Redirect::parse_operator("1>"), Some((Stdout, Truncate)));
        assert_eq!(Redirect::parse_operator(">>"), Some((Stdout, Append)));
        assert_eq!(Redirect::parse_operator("1>>"), Some((Stdout, Append)));
        assert_eq!(Redirect::parse_operator("2>"), Some((Stderr, Truncate)));
        assert_eq!(Redirect::parse_operator("2>>"), Some((Stderr, Append)));
        assert_eq!(Redirect::parse_operator("&>"), Some((Both, Truncate)));
        assert_eq!(Redirect::parse_operator("&>>"), Some((Both, Append)));
        assert_eq!(Redirect::parse_operator(">>>"), None);
        assert_eq!(Redirect::parse_operator("3>"), None);
        assert_eq!(Redirect::parse_operator("a>"), None);
    }

    #[test]
    fn test_take_from_removes_operator_and_target() {
        let mut list = vec![
            Token::Word("hello".into()),
            Token::Redirect("2>>".into()),
            Token::Word("err.log".into()),
            Token::Word("world".into()),
        ];
        let redirect = Redirect::take_from(&mut list).unwrap().unwrap();
        assert_eq!(
            redirect,
            Redirect {
                target: RedirectTarget::Stderr,
                mode: RedirectMode::Append,
                path: "err.log".into(),
            }
        );
        assert_eq!(list, words(&["hello", "world"]));
    }

    #[test]
    fn test_take_from_ignores_operator_text_in_words() {
        let mut list = words(&["a", ">", "b"]);
        assert_eq!(Redirect::take_from(&mut list), Ok(None));
        assert_eq!(list, words(&["a", ">", "b"]));
    }

    #[test]
    fn test_take_from_missing_target() {
        let mut list = vec![Token::Word("a".into()), Token::Redirect(">".into())];
        assert_eq!(
            Redirect::take_from(&mut list),
            Err(ParseError::MissingRedirectTarget(">".into()))
        );

        let mut list = vec![Token::Redirect(">".into()), Token::Redirect("2>".into())];
        assert_eq!(
            Redirect::take_from(&mut list),
            Err(ParseError::MissingRedirectTarget(">".into()))
        );
    }

    #[test]
    fn test_open_truncate_and_append() {
        let dir = std::env::temp_dir().join(format!("redirect_test_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();

        let mut redirect = Redirect {
            target: RedirectTarget::Stdout,
            mode: RedirectMode::Truncate,
            path: "out.txt".into(),
        };
        redirect.open(&dir).unwrap().write_all(b"first\n").unwrap();
        redirect.open(&dir).unwrap().write_all(b"second\n").unwrap();
        assert_eq!(fs::read_to_string(dir.join("out.txt")).unwrap(), "second\n");

        redirect.mode = RedirectMode::Append;
        redirect.open(&dir).unwrap().write_all(b"third\n").unwrap();
        assert_eq!(
            fs::read_to_string(dir.join("out.txt")).unwrap(),
            "second\nthird\n"
        );

        let _ = fs::remove_dir_all(dir);
    }
}
