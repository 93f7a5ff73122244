//! Text chunking for Telegram's message size limit
//!
//! Telegram rejects messages over 4096 UTF-16 code units. Long replies are
//! split on paragraph breaks, then line breaks, then hard character
//! boundaries.

/// Chunk size limit, in UTF-16 code units, with a margin below the 4096 cap
pub const DEFAULT_LIMIT: usize = 4000;

/// Length as Telegram counts it
#[must_use]
pub fn utf16_len(text: &str) -> usize {
    text.chars().map(char::len_utf16).sum()
}

/// Split `text` into non-empty chunks of at most `limit` UTF-16 code units
///
/// Text that already fits is returned as a single chunk, untouched.
#[must_use]
pub fn chunk_text(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut rest = text;

    while utf16_len(rest) > limit {
        let split = split_point(rest, limit);
        let (head, tail) = rest.split_at(split);

        let head = head.trim_end();
        if !head.is_empty() {
            chunks.push(head.to_string());
        }
        rest = tail.trim_start_matches('\n');
    }

    if !rest.trim().is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}

/// Byte offset at which to cut `text` so the head fits in `limit` units
///
/// Always advances by at least one character, even one wider than `limit`.
fn split_point(text: &str, limit: usize) -> usize {
    let mut units = 0;
    let mut hard = text.len();
    for (idx, c) in text.char_indices() {
        units += c.len_utf16();
        if units > limit {
            hard = if idx == 0 { c.len_utf8() } else { idx };
            break;
        }
    }
    let window = &text[..hard];

    // Prefer a break at least halfway into the window
    let min = hard / 2;
    for sep in ["\n\n", "\n"] {
        if let Some(pos) = window.rfind(sep)
            && pos >= min
        {
            return pos + sep.len();
        }
    }
    if let Some(pos) = window.rfind(' ')
        && pos >= min
    {
        return pos + 1;
    }
    hard
}
