//! Shell-style tokenizer and the per-line `ParsedInvocation`.

use indexmap::IndexMap;
use serde::Serialize;

use crate::error::ShellError;

/// One parsed input line. Keyword keys are upper-cased; a repeated key keeps
/// the last value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedInvocation {
    pub command: String,
    pub positional: Vec<String>,
    pub keyword: IndexMap<String, String>,
}

impl ParsedInvocation {
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.positional.get(index).map(String::as_str)
    }

    pub fn kw(&self, key: &str) -> Option<&str> {
        self.keyword.get(key).map(String::as_str)
    }
}

/// A token with its byte span in the source line. Completion needs spans to
/// know which token the cursor sits in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// Split a line into tokens. Single quotes are literal; double quotes allow
/// `\"` and `\\` escapes; a bare backslash escapes the next character.
pub fn tokenize(input: &str) -> Result<Vec<String>, ShellError> {
    Ok(tokenize_spans(input)?.into_iter().map(|t| t.text).collect())
}

pub fn tokenize_spans(input: &str) -> Result<Vec<Token>, ShellError> {
    let lexed = lex(input);
    match lexed.open_quote {
        Some('\'') => Err(ShellError::parse("unterminated single quote")),
        Some(_) => Err(ShellError::parse("unterminated double quote")),
        None => Ok(lexed.tokens),
    }
}

/// Lexer output. `open_quote` is set when the line ends inside a quote; the
/// last token is then the partial quoted text. Completion uses this lenient
/// form, `parse` rejects it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lexed {
    pub tokens: Vec<Token>,
    pub open_quote: Option<char>,
}

pub fn lex(input: &str) -> Lexed {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut start: Option<usize> = None;
    let mut chars = input.char_indices().peekable();
    let mut in_single = false;
    let mut in_double = false;

    while let Some((idx, ch)) = chars.next() {
        if in_single {
            if ch == '\'' {
                in_single = false;
            } else {
                current.push(ch);
            }
        } else if in_double {
            if ch == '"' {
                in_double = false;
            } else if ch == '\\' {
                match chars.peek() {
                    Some(&(_, next @ ('"' | '\\'))) => {
                        current.push(next);
                        chars.next();
                    }
                    _ => current.push('\\'),
                }
            } else {
                current.push(ch);
            }
        } else {
            match ch {
                '\'' => {
                    start.get_or_insert(idx);
                    in_single = true;
                }
                '"' => {
                    start.get_or_insert(idx);
                    in_double = true;
                }
                '\\' => {
                    start.get_or_insert(idx);
                    if let Some((_, next)) = chars.next() {
                        current.push(next);
                    }
                }
                c if c.is_whitespace() => {
                    if let Some(s) = start.take() {
                        tokens.push(Token {
                            text: std::mem::take(&mut current),
                            start: s,
                            end: idx,
                        });
                    }
                }
                c => {
                    start.get_or_insert(idx);
                    current.push(c);
                }
            }
        }
    }

    if let Some(s) = start {
        tokens.push(Token {
            text: current,
            start: s,
            end: input.len(),
        });
    }

    let open_quote = if in_single {
        Some('\'')
    } else if in_double {
        Some('"')
    } else {
        None
    };
    Lexed { tokens, open_quote }
}

/// Split `KEY=VALUE` when the key is an identifier (`[A-Za-z_][A-Za-z0-9_]*`).
pub fn split_keyword(token: &str) -> Option<(&str, &str)> {
    let (key, value) = token.split_once('=')?;
    let mut chars = key.chars();
    let first = chars.next()?;
    if !(first.is_ascii_alphabetic() || first == '_') {
        return None;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some((key, value))
}

/// Parse one input line. Returns `Ok(None)` for blank lines.
pub fn parse(line: &str) -> Result<Option<ParsedInvocation>, ShellError> {
    let tokens = tokenize(line)?;
    let mut iter = tokens.into_iter();
    let Some(command) = iter.next() else {
        return Ok(None);
    };

    let mut positional = Vec::new();
    let mut keyword = IndexMap::new();
    for token in iter {
        match split_keyword(&token) {
            Some((key, value)) => {
                let key = key.to_ascii_uppercase();
                // Last write wins, but the key moves to its latest position.
                keyword.shift_remove(&key);
                keyword.insert(key, value.to_string());
            }
            None => positional.push(token),
        }
    }

    Ok(Some(ParsedInvocation {
        command,
        positional,
        keyword,
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn splits_command_positional_and_keywords() {
        let inv = parse("set_led chamber RED=1 green=0.5 BLUE=0").unwrap().unwrap();
        assert_eq!(inv.command, "set_led");
        assert_eq!(inv.positional, vec!["chamber"]);
        assert_eq!(inv.kw("RED"), Some("1"));
        assert_eq!(inv.kw("GREEN"), Some("0.5"));
        assert_eq!(inv.kw("BLUE"), Some("0"));
    }

    #[test]
    fn quotes_preserve_whitespace() {
        let inv = parse(r#"get_fan "bed fans" 'nozzle fan'"#).unwrap().unwrap();
        assert_eq!(inv.positional, vec!["bed fans", "nozzle fan"]);
    }

    #[test]
    fn quoted_keyword_value() {
        let inv = parse(r#"run PRINT_START MSG="hello world""#).unwrap().unwrap();
        assert_eq!(inv.positional, vec!["PRINT_START"]);
        assert_eq!(inv.kw("MSG"), Some("hello world"));
    }

    #[test]
    fn unterminated_quote_is_parse_error() {
        assert!(matches!(
            parse("get_fan \"bed"),
            Err(ShellError::Parse { .. })
        ));
        assert!(matches!(parse("get_fan 'bed"), Err(ShellError::Parse { .. })));
    }

    #[test]
    fn blank_line_is_none() {
        assert_eq!(parse("").unwrap(), None);
        assert_eq!(parse("   \t ").unwrap(), None);
    }

    #[test]
    fn last_keyword_wins() {
        let inv = parse("set_fan f SPEED=0.2 speed=0.8").unwrap().unwrap();
        assert_eq!(inv.keyword.len(), 1);
        assert_eq!(inv.kw("SPEED"), Some("0.8"));
    }

    #[test]
    fn non_identifier_keys_stay_positional() {
        let inv = parse("run_gcode M117 1=2 =x a-b=c").unwrap().unwrap();
        assert_eq!(inv.positional, vec!["M117", "1=2", "=x", "a-b=c"]);
        assert!(inv.keyword.is_empty());
    }

    #[test]
    fn parse_is_pure() {
        let line = r#"set_pin "case light" VALUE=1"#;
        let a = parse(line).unwrap();
        let _ = parse("something else entirely").unwrap();
        let b = parse(line).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn escapes() {
        let toks = tokenize(r#"a\ b "c\"d" 'e\f'"#).unwrap();
        assert_eq!(toks, vec!["a b", "c\"d", "e\\f"]);
    }

    #[test]
    fn spans_track_byte_offsets() {
        let lexed = lex("get_fan  bed");
        assert_eq!(lexed.tokens.len(), 2);
        assert_eq!((lexed.tokens[0].start, lexed.tokens[0].end), (0, 7));
        assert_eq!((lexed.tokens[1].start, lexed.tokens[1].end), (9, 12));
        assert_eq!(lexed.open_quote, None);
    }

    #[test]
    fn lenient_lex_reports_open_quote() {
        let lexed = lex("get_fan \"bed f");
        assert_eq!(lexed.open_quote, Some('"'));
        assert_eq!(lexed.tokens[1].text, "bed f");
        assert_eq!(lexed.tokens[1].start, 8);
    }
}
