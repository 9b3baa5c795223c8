//! Balanced bracket scanning over partially received JSON text.
//!
//! Brackets and quotes are ASCII, so scanning bytes of a UTF-8 string never
//! lands inside a multi-byte character.

/// Byte offsets of every `needle` in `bytes`, in order.
pub(super) fn positions(bytes: &[u8], needle: u8) -> impl Iterator<Item = usize> + '_ {
    bytes
        .iter()
        .enumerate()
        .filter_map(move |(idx, &byte)| (byte == needle).then_some(idx))
}

/// Exclusive end of the balanced span opening at `start`, or `None` while the
/// span is still open.
///
/// Only the bracket kind found at `start` is counted. Characters inside
/// double-quoted strings (with backslash escapes) never open or close a span.
pub(super) fn span_end(bytes: &[u8], start: usize) -> Option<usize> {
    let open = *bytes.get(start)?;
    let close = match open {
        b'[' => b']',
        b'{' => b'}',
        _ => return None,
    };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }

        if byte == b'"' {
            in_string = true;
        } else if byte == open {
            depth += 1;
        } else if byte == close {
            depth -= 1;
            if depth == 0 {
                return Some(start + offset + 1);
            }
        }
    }

    None
}

/// Whether the bytes after an unclosed `[` can still grow into a JSON array.
///
/// Nothing but whitespace so far counts as possible.
pub(super) fn may_open_array(rest: &[u8]) -> bool {
    let Some(first) = rest.iter().position(|b| !b.is_ascii_whitespace()) else {
        return true;
    };
    let rest = &rest[first..];
    match rest[0] {
        b'{' | b'[' | b']' | b'"' | b'-' | b'0'..=b'9' => true,
        b't' => literal_prefix(rest, b"true"),
        b'f' => literal_prefix(rest, b"false"),
        b'n' => literal_prefix(rest, b"null"),
        _ => false,
    }
}

/// Whether the bytes after an unclosed `{` can still grow into a JSON object.
pub(super) fn may_open_object(rest: &[u8]) -> bool {
    match rest.iter().find(|b| !b.is_ascii_whitespace()) {
        None => true,
        Some(byte) => matches!(byte, b'"' | b'}'),
    }
}

fn literal_prefix(rest: &[u8], literal: &[u8]) -> bool {
    let n = rest.len().min(literal.len());
    if rest[..n] != literal[..n] {
        return false;
    }
    rest.get(literal.len())
        .map_or(true, |byte| !byte.is_ascii_alphanumeric())
}
