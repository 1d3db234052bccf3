//! Splits a source file into logical lines: strips `;` comments, peels
//! `label:` prefixes, recognizes `#line "file"` directives, and splits the
//! remaining text into a command token and its arguments.
//!
//! Ported from `picasso_assembler.cpp`'s `AssembleString` line loop and its
//! `trim_whitespace`/`remove_comment`/`mystrtok` primitives, re-expressed as
//! an iterator instead of a `strtok`-style global cursor.

use crate::error::{AssembleError, Result};
use crate::symbols::is_valid_identifier;

/// One logical source line, with any labels it defined and its location.
#[derive(Debug, Clone)]
pub struct Line {
    pub file: String,
    pub line: u32,
    pub labels: Vec<String>,
    pub text: String,
}

fn lex_err(file: &str, line: u32, message: impl Into<String>) -> AssembleError {
    AssembleError::Lex {
        file: file.to_string(),
        line,
        message: message.into(),
    }
}

fn strip_comment(raw: &str) -> &str {
    match raw.find(';') {
        Some(idx) => &raw[..idx],
        None => raw,
    }
}

/// Peel `label:` prefixes off the front of a line. Each label name must be a
/// valid identifier.
fn peel_labels<'a>(mut text: &'a str, file: &str, line: u32) -> Result<(Vec<String>, &'a str)> {
    let mut labels = Vec::new();
    loop {
        let trimmed = text.trim_start();
        let Some(colon) = trimmed.find(':') else { break };
        let candidate = &trimmed[..colon];
        if candidate.is_empty() || candidate.contains(char::is_whitespace) {
            break;
        }
        if !is_valid_identifier(candidate) {
            return Err(lex_err(file, line, format!("invalid label: {candidate}")));
        }
        labels.push(candidate.to_string());
        text = &trimmed[colon + 1..];
    }
    Ok((labels, text))
}

/// A `#line <number> "file"` directive's parsed fields.
struct LineDirective {
    line: u32,
    file: String,
}

fn parse_line_directive(text: &str, file: &str, line: u32) -> Result<LineDirective> {
    let rest = text.trim_start_matches('#').trim();
    let mut parts = rest.splitn(2, char::is_whitespace);
    let num = parts
        .next()
        .ok_or_else(|| lex_err(file, line, "malformed #line directive"))?;
    let new_line: u32 = num
        .parse()
        .map_err(|_| lex_err(file, line, format!("malformed #line number: {num}")))?;
    let rest = parts.next().unwrap_or("").trim();
    let new_file = rest.trim_matches('"').to_string();
    Ok(LineDirective {
        line: new_line,
        file: new_file,
    })
}

/// Splits a single file's text into logical [`Line`]s, tracking `#line`
/// state across the whole file.
pub struct Scanner<'a> {
    lines: std::str::Lines<'a>,
    cur_file: String,
    cur_line: u32,
}

impl<'a> Scanner<'a> {
    #[must_use]
    pub fn new(text: &'a str, initial_file: &str) -> Self {
        Self {
            lines: text.lines(),
            cur_file: initial_file.to_string(),
            cur_line: 1,
        }
    }
}

impl Iterator for Scanner<'_> {
    type Item = Result<Line>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let raw = self.lines.next()?;
            let reported_line = self.cur_line;
            let reported_file = self.cur_file.clone();
            self.cur_line += 1;

            let without_comment = strip_comment(raw);
            let trimmed = without_comment.trim();
            if trimmed.is_empty() {
                continue;
            }
            if let Some(rest) = trimmed.strip_prefix('#') {
                match parse_line_directive(rest, &reported_file, reported_line) {
                    Ok(directive) => {
                        self.cur_line = directive.line;
                        self.cur_file = directive.file;
                        continue;
                    }
                    Err(e) => return Some(Err(e)),
                }
            }

            let (labels, rest) = match peel_labels(trimmed, &reported_file, reported_line) {
                Ok(v) => v,
                Err(e) => return Some(Err(e)),
            };
            let text = rest.trim().to_string();
            if text.is_empty() && labels.is_empty() {
                continue;
            }
            return Some(Ok(Line {
                file: reported_file,
                line: reported_line,
                labels,
                text,
            }));
        }
    }
}

/// Split a line's body into its command token and an unparsed argument tail.
#[must_use]
pub fn split_command(text: &str) -> (&str, &str) {
    match text.find(char::is_whitespace) {
        Some(idx) => (&text[..idx], text[idx..].trim_start()),
        None => (text, ""),
    }
}

/// Comma-split arguments, trimming whitespace from each, matching
/// `mystrtok`'s comma-delimited behavior.
#[must_use]
pub fn split_args_comma(tail: &str) -> Vec<&str> {
    if tail.is_empty() {
        return Vec::new();
    }
    tail.split(',').map(str::trim).collect()
}

/// Space-split arguments, collapsing whitespace runs, matching
/// `mystrtok_spc`'s behavior.
#[must_use]
pub fn split_args_space(tail: &str) -> Vec<&str> {
    tail.split_whitespace().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_all(text: &str) -> Vec<Line> {
        Scanner::new(text, "test.vsh")
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn strips_comments_and_blank_lines() {
        let lines = scan_all("nop ; a comment\n\n  \nend");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "nop");
        assert_eq!(lines[1].text, "end");
    }

    #[test]
    fn peels_single_and_multiple_labels() {
        let lines = scan_all("foo: bar: nop");
        assert_eq!(lines[0].labels, vec!["foo".to_string(), "bar".to_string()]);
        assert_eq!(lines[0].text, "nop");
    }

    #[test]
    fn line_directive_updates_file_and_line_without_emitting() {
        let lines = scan_all("nop\n#10 \"other.vsh\"\nend");
        assert_eq!(lines[0].line, 1);
        assert_eq!(lines[1].file, "other.vsh");
        assert_eq!(lines[1].line, 10);
    }

    #[test]
    fn rejects_invalid_label_identifier() {
        let mut scanner = Scanner::new("1bad: nop", "t");
        assert!(matches!(scanner.next(), Some(Err(AssembleError::Lex { .. }))));
    }

    #[test]
    fn splits_command_and_comma_args() {
        let (cmd, tail) = split_command(".fvec myu, other");
        assert_eq!(cmd, ".fvec");
        assert_eq!(split_args_comma(tail), vec!["myu", "other"]);
    }
}
