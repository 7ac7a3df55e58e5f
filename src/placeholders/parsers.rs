pub(super) fn is_line_comment_start(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx) == Some(&b'-') && bytes.get(idx + 1) == Some(&b'-')
}

pub(super) fn is_block_comment_start(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx) == Some(&b'/') && bytes.get(idx + 1) == Some(&b'*')
}

pub(super) fn is_block_comment_end(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx) == Some(&b'*') && bytes.get(idx + 1) == Some(&b'/')
}

/// `$tag$` opener at `start`; returns the tag and the index of the closing `$`.
pub(super) fn try_start_dollar_quote(bytes: &[u8], start: usize) -> Option<(String, usize)> {
    let mut idx = start + 1;
    while idx < bytes.len() && bytes[idx] != b'$' {
        let b = bytes[idx];
        if !(b.is_ascii_alphabetic() || b == b'_' || (idx > start + 1 && b.is_ascii_digit())) {
            return None;
        }
        idx += 1;
    }

    if idx < bytes.len() && bytes[idx] == b'$' {
        let tag = String::from_utf8(bytes[start + 1..idx].to_vec()).ok()?;
        Some((tag, idx))
    } else {
        None
    }
}

/// Whether `$tag$` closes at `idx` (which points at the first `$`).
pub(super) fn matches_tag(bytes: &[u8], idx: usize, tag: &str) -> bool {
    let end = idx + 1 + tag.len();
    end < bytes.len()
        && bytes[idx + 1..end] == *tag.as_bytes()
        && bytes.get(end) == Some(&b'$')
}

/// A `:name` placeholder must not be part of a `::cast`.
pub(super) fn is_named_placeholder_start(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx) == Some(&b':')
        && (idx == 0 || bytes[idx - 1] != b':')
        && bytes
            .get(idx + 1)
            .is_some_and(|b| b.is_ascii_alphabetic() || *b == b'_')
}
