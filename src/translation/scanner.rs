//! Lexical helpers for skipping the parts of SQL text that never hold markers.

#[derive(Clone)]
pub(super) enum State {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    LineComment,
    BlockComment(u32),
    DollarQuoted(String),
}

fn pair_at(bytes: &[u8], idx: usize, first: u8, second: u8) -> bool {
    bytes.get(idx) == Some(&first) && bytes.get(idx + 1) == Some(&second)
}

pub(super) fn is_line_comment_start(bytes: &[u8], idx: usize) -> bool {
    pair_at(bytes, idx, b'-', b'-')
}

pub(super) fn is_block_comment_start(bytes: &[u8], idx: usize) -> bool {
    pair_at(bytes, idx, b'/', b'*')
}

pub(super) fn is_block_comment_end(bytes: &[u8], idx: usize) -> bool {
    pair_at(bytes, idx, b'*', b'/')
}

/// If a dollar-quote opener (`$tag$` or `$$`) starts at `start`, return its tag and
/// the index of the opener's closing `$`.
pub(super) fn try_start_dollar_quote(bytes: &[u8], start: usize) -> Option<(String, usize)> {
    let tag_len = bytes[start + 1..]
        .iter()
        .position(|b| !(b.is_ascii_alphanumeric() || *b == b'_'))?;
    let close = start + 1 + tag_len;
    if bytes.get(close) != Some(&b'$') {
        return None;
    }
    // `$1` style placeholders are not tags
    if bytes.get(start + 1).is_some_and(u8::is_ascii_digit) {
        return None;
    }
    let tag = std::str::from_utf8(&bytes[start + 1..close]).ok()?;
    Some((tag.to_owned(), close))
}

/// Whether the `$` at `idx` opens the closing `$tag$` delimiter.
pub(super) fn matches_tag(bytes: &[u8], idx: usize, tag: &str) -> bool {
    let end = idx + 1 + tag.len();
    bytes.get(idx + 1..end) == Some(tag.as_bytes()) && bytes.get(end) == Some(&b'$')
}

/// Scan an identifier (`[A-Za-z_][A-Za-z0-9_]*`) starting at `start`.
pub(super) fn scan_identifier(bytes: &[u8], start: usize) -> Option<(usize, &str)> {
    match bytes.get(start) {
        Some(b) if b.is_ascii_alphabetic() || *b == b'_' => {}
        _ => return None,
    }
    let len = bytes[start..]
        .iter()
        .position(|b| !(b.is_ascii_alphanumeric() || *b == b'_'))
        .unwrap_or(bytes.len() - start);
    std::str::from_utf8(&bytes[start..start + len])
        .ok()
        .map(|name| (start + len, name))
}
