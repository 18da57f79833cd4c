//! Rewriting of `@name` bind markers into positional `$N` placeholders.
//!
//! `tokio-postgres` only understands positional parameters, so named markers are
//! numbered in order of first appearance; a name used twice reuses its number.

use std::borrow::Cow;

mod scanner;

use scanner::{
    State, is_block_comment_end, is_block_comment_start, is_line_comment_start, matches_tag,
    scan_identifier, try_start_dollar_quote,
};

use crate::params::canonical_name_with;

/// SQL text with named markers replaced, plus the canonical marker name bound to
/// each position (`names[0]` is `$1`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionalSql<'a> {
    pub sql: Cow<'a, str>,
    pub names: Vec<String>,
    /// Number of non-empty statements separated by top-level `;`.
    pub statements: usize,
}

/// Replace `marker`-prefixed identifiers with `$N`.
///
/// Quoted strings, quoted identifiers, comments and dollar-quoted blocks are left
/// untouched, as are operators that merely start with the marker (`@>`, `@@`):
/// ```rust
/// use sql_session::translation::to_positional;
///
/// let out = to_positional("SELECT * FROM t WHERE a = @a AND b = @b OR a2 = @a", '@');
/// assert_eq!(out.sql, "SELECT * FROM t WHERE a = $1 AND b = $2 OR a2 = $1");
/// assert_eq!(out.names, vec!["@a".to_string(), "@b".to_string()]);
/// ```
/// Returns a borrowed `Cow` when no markers are present.
#[must_use]
pub fn to_positional(sql: &str, marker: char) -> PositionalSql<'_> {
    let mut marker_buf = [0u8; 4];
    let marker_bytes = marker.encode_utf8(&mut marker_buf).as_bytes();

    let mut out: Option<String> = None;
    let mut names: Vec<String> = Vec::new();
    let mut state = State::Normal;
    let mut statements = 0;
    // the current statement has content past whitespace and comments
    let mut pending = false;
    // start of the input not yet copied into `out`
    let mut copied = 0;
    let mut idx = 0;
    let bytes = sql.as_bytes();

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            State::Normal => match b {
                b';' => {
                    if pending {
                        statements += 1;
                        pending = false;
                    }
                }
                _ if is_line_comment_start(bytes, idx) => state = State::LineComment,
                _ if is_block_comment_start(bytes, idx) => {
                    state = State::BlockComment(1);
                    idx += 1;
                }
                _ if b.is_ascii_whitespace() => {}
                b'\'' => {
                    pending = true;
                    state = State::SingleQuoted;
                }
                b'"' => {
                    pending = true;
                    state = State::DoubleQuoted;
                }
                b'$' => {
                    pending = true;
                    if let Some((tag, advance)) = try_start_dollar_quote(bytes, idx) {
                        state = State::DollarQuoted(tag);
                        idx = advance;
                    }
                }
                _ if bytes[idx..].starts_with(marker_bytes) => {
                    pending = true;
                    let name_start = idx + marker_bytes.len();
                    if let Some((name_end, name)) = scan_identifier(bytes, name_start) {
                        let canonical = canonical_name_with(name, marker);
                        let position = match names.iter().position(|n| *n == canonical) {
                            Some(pos) => pos + 1,
                            None => {
                                names.push(canonical);
                                names.len()
                            }
                        };
                        let buf = out.get_or_insert_with(|| String::with_capacity(sql.len()));
                        buf.push_str(&sql[copied..idx]);
                        buf.push('$');
                        buf.push_str(&position.to_string());
                        copied = name_end;
                        idx = name_end;
                        continue;
                    }
                }
                _ => pending = true,
            },
            State::SingleQuoted => {
                if b == b'\'' {
                    if bytes.get(idx + 1) == Some(&b'\'') {
                        idx += 1; // skip escaped quote
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::DoubleQuoted => {
                if b == b'"' {
                    if bytes.get(idx + 1) == Some(&b'"') {
                        idx += 1; // skip escaped quote
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
                    let tag_len = tag.len();
                    state = State::Normal;
                    idx += tag_len + 1;
                }
            }
        }
        idx += 1;
    }

    let sql = match out {
        Some(mut buf) => {
            buf.push_str(&sql[copied..]);
            Cow::Owned(buf)
        }
        None => Cow::Borrowed(sql),
    };
    if pending {
        statements += 1;
    }
    PositionalSql {
        sql,
        names,
        statements,
    }
}
