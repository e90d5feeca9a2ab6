//! Interactive selection of previews to destroy.

use std::io::{BufRead, Write};

use crate::error::{PreviewError, Result};

pub trait Prompter: Send + Sync {
    /// Pick a subset of `options`. With `select_all`, an empty answer picks everything.
    fn select(&self, message: &str, options: &[String], select_all: bool) -> Result<Vec<String>>;
}

/// Numbered list on stderr, answer read from stdin.
#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn select(&self, message: &str, options: &[String], select_all: bool) -> Result<Vec<String>> {
        let mut err = std::io::stderr().lock();
        let io_err = |e| PreviewError::io("failed to prompt", e);
        writeln!(err, "{message}").map_err(io_err)?;
        for (i, option) in options.iter().enumerate() {
            writeln!(err, "  {}) {option}", i + 1).map_err(io_err)?;
        }
        let hint = if select_all { "[all]" } else { "[none]" };
        write!(err, "numbers or names, comma separated, 'all' for everything {hint}: ").map_err(io_err)?;
        err.flush().map_err(io_err)?;

        let mut answer = String::new();
        std::io::stdin().lock().read_line(&mut answer).map_err(io_err)?;
        parse_selection(&answer, options, select_all)
    }
}

pub fn parse_selection(answer: &str, options: &[String], select_all: bool) -> Result<Vec<String>> {
    let answer = answer.trim();
    if answer.eq_ignore_ascii_case("all") || (answer.is_empty() && select_all) {
        return Ok(options.to_vec());
    }
    let mut picked = Vec::new();
    for token in answer.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let choice = match token.parse::<usize>() {
            Ok(n) if (1..=options.len()).contains(&n) => options[n - 1].clone(),
            _ if options.iter().any(|o| o == token) => token.to_string(),
            _ => {
                return Err(PreviewError::Validation(format!(
                    "invalid selection {token:?}"
                )))
            }
        };
        if !picked.contains(&choice) {
            picked.push(choice);
        }
    }
    Ok(picked)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> Vec<String> {
        vec!["jx-a-b-pr-1".into(), "jx-a-b-pr-2".into(), "jx-c-d-pr-3".into()]
    }

    #[test]
    fn numbers_and_names_select() {
        let picked = parse_selection("1, jx-c-d-pr-3, 1", &options(), false).unwrap();
        assert_eq!(picked, vec!["jx-a-b-pr-1", "jx-c-d-pr-3"]);
    }

    #[test]
    fn empty_answer_respects_select_all() {
        assert_eq!(parse_selection("\n", &options(), true).unwrap().len(), 3);
        assert!(parse_selection("\n", &options(), false).unwrap().is_empty());
        assert_eq!(parse_selection("ALL", &options(), false).unwrap().len(), 3);
    }

    #[test]
    fn unknown_tokens_are_rejected() {
        assert!(parse_selection("9", &options(), false).is_err());
        assert!(parse_selection("nope", &options(), false).is_err());
    }
}
