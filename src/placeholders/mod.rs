mod parsers;
mod scanner;

use parsers::{
    is_block_comment_end, is_block_comment_start, is_line_comment_start, is_named_placeholder_start,
    matches_tag, try_start_dollar_quote,
};
use scanner::{State, scan_digits, scan_ident};

use crate::error::CrudMiddlewareError;

/// A placeholder found in a statement expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Placeholder {
    /// `:name`; every occurrence of the same name shares one value.
    Named(String),
    /// `?`; each occurrence takes the next value left to right.
    Positional,
}

impl std::fmt::Display for Placeholder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Placeholder::Named(name) => write!(f, ":{name}"),
            Placeholder::Positional => f.write_str("?"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Piece {
    Text(String),
    Placeholder(Placeholder),
}

/// An expression split into literal text and placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedExpr {
    source: String,
    pub(crate) pieces: Vec<Piece>,
}

impl ParsedExpr {
    /// The expression exactly as supplied.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Placeholders in textual order, repeats included.
    pub fn placeholders(&self) -> impl Iterator<Item = &Placeholder> {
        self.pieces.iter().filter_map(|piece| match piece {
            Piece::Placeholder(p) => Some(p),
            Piece::Text(_) => None,
        })
    }
}

/// Split an expression into text and `:name` / `?` placeholders.
///
/// Quoted strings, comments and dollar-quoted blocks are copied through untouched. Numbered
/// `$N` placeholders are rejected because slot numbering belongs to the rendered statement.
///
/// # Errors
/// Returns `ValidationError` for an empty expression, a `$N` placeholder, or an unterminated
/// quote or comment.
pub fn parse_expression(expr: &str) -> Result<ParsedExpr, CrudMiddlewareError> {
    if expr.trim().is_empty() {
        return Err(CrudMiddlewareError::ValidationError(
            "expression must not be empty".into(),
        ));
    }

    let bytes = expr.as_bytes();
    let mut pieces = Vec::new();
    let mut state = State::Normal;
    let mut text_start = 0;
    let mut idx = 0;

    let flush = |pieces: &mut Vec<Piece>, from: usize, to: usize| {
        if to > from {
            pieces.push(Piece::Text(expr[from..to].to_string()));
        }
    };

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            State::Normal => match b {
                b'\'' => state = State::SingleQuoted,
                b'"' => state = State::DoubleQuoted,
                _ if is_line_comment_start(bytes, idx) => state = State::LineComment,
                _ if is_block_comment_start(bytes, idx) => {
                    state = State::BlockComment(1);
                    idx += 1;
                }
                b'$' => {
                    if let Some((tag, close)) = try_start_dollar_quote(bytes, idx) {
                        state = State::DollarQuoted(tag);
                        idx = close;
                    } else if scan_digits(bytes, idx + 1).is_some() {
                        return Err(CrudMiddlewareError::ValidationError(format!(
                            "numbered placeholder at offset {idx} in `{expr}`; use :name or ?"
                        )));
                    }
                }
                b'?' => {
                    flush(&mut pieces, text_start, idx);
                    pieces.push(Piece::Placeholder(Placeholder::Positional));
                    text_start = idx + 1;
                }
                b':' if is_named_placeholder_start(bytes, idx) => {
                    if let Some((end, name)) = scan_ident(bytes, idx + 1) {
                        flush(&mut pieces, text_start, idx);
                        pieces.push(Piece::Placeholder(Placeholder::Named(name.to_string())));
                        text_start = end;
                        idx = end - 1;
                    }
                }
                _ => {}
            },
            State::SingleQuoted => {
                if b == b'\'' {
                    if bytes.get(idx + 1) == Some(&b'\'') {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::DoubleQuoted => {
                if b == b'"' {
                    if bytes.get(idx + 1) == Some(&b'"') {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment(depth) => {
                if is_block_comment_start(bytes, idx) {
                    state = State::BlockComment(depth + 1);
                    idx += 1;
                } else if is_block_comment_end(bytes, idx) {
                    state = if depth == 1 {
                        State::Normal
                    } else {
                        State::BlockComment(depth - 1)
                    };
                    idx += 1;
                }
            }
            State::DollarQuoted(ref tag) => {
                if b == b'$' && matches_tag(bytes, idx, tag) {
                    idx += tag.len() + 1;
                    state = State::Normal;
                }
            }
        }
        idx += 1;
    }

    match state {
        State::Normal | State::LineComment => {}
        _ => {
            return Err(CrudMiddlewareError::ValidationError(format!(
                "unterminated quote or comment in `{expr}`"
            )));
        }
    }

    flush(&mut pieces, text_start, bytes.len());
    Ok(ParsedExpr {
        source: expr.to_string(),
        pieces,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(parsed: &ParsedExpr) -> Vec<String> {
        parsed.placeholders().map(ToString::to_string).collect()
    }

    #[test]
    fn finds_named_and_positional() {
        let parsed = parse_expression("a = :x and b > ? or c = :x").unwrap();
        assert_eq!(names(&parsed), vec![":x", "?", ":x"]);
    }

    #[test]
    fn skips_casts_literals_and_comments() {
        let parsed =
            parse_expression("a::text = ':no' and b = '?' -- :gone\n/* ? */ and c = :yes").unwrap();
        assert_eq!(names(&parsed), vec![":yes"]);
    }

    #[test]
    fn skips_dollar_quoted_blocks() {
        let parsed = parse_expression("$q$ ? :x $q$ = :y").unwrap();
        assert_eq!(names(&parsed), vec![":y"]);
    }

    #[test]
    fn keeps_text_between_placeholders() {
        let parsed = parse_expression("ord * :factor").unwrap();
        assert_eq!(
            parsed.pieces,
            vec![
                Piece::Text("ord * ".into()),
                Piece::Placeholder(Placeholder::Named("factor".into())),
            ]
        );
        assert_eq!(parsed.source(), "ord * :factor");
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_expression("   ").unwrap_err().is_validation());
        assert!(parse_expression("a = $1").unwrap_err().is_validation());
        assert!(parse_expression("a = 'open").unwrap_err().is_validation());
        assert!(parse_expression("true").unwrap().placeholders().next().is_none());
    }
}
