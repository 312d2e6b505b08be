//! Per-file line truncation.
//!
//! Keeps the head of a file, where imports, signatures and headers live, and
//! drops the rest so one large file cannot take over a batch.

use crate::file::FileEntry;

/// Returns the prefix of `content` holding at most `max_lines` lines.
///
/// Line endings of the kept lines are preserved, so content with `max_lines`
/// lines or fewer is returned untouched and truncating twice is a no-op.
#[must_use]
pub fn truncate_content(content: &str, max_lines: usize) -> &str {
    if max_lines == 0 {
        return "";
    }

    match memchr::memchr_iter(b'\n', content.as_bytes()).nth(max_lines - 1) {
        Some(newline) => &content[..=newline],
        None => content,
    }
}

/// Limits a file entry to its first `max_lines` lines.
///
/// The path is never changed. Entries that already fit are returned as is
/// without reallocating.
#[must_use]
pub fn truncate(entry: FileEntry, max_lines: usize) -> FileEntry {
    let kept = truncate_content(&entry.content, max_lines).len();
    if kept == entry.content.len() {
        return entry;
    }

    let FileEntry { path, mut content } = entry;
    content.truncate(kept);
    FileEntry { path, content }
}
