//! Unified-diff parsing for the per-file patches returned by the
//! pull-request files endpoint.
//!
//! GitHub positions comments and edits by a zero-based index into the
//! patch's line stream, spanning hunks. Hunk headers therefore stay in the
//! output (tagged [`DiffTag::Context`]) so positions remain aligned.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffTag {
    Added,
    Removed,
    Context,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine {
    pub tag: DiffTag,
    /// Line content with the leading `+`/`-` marker stripped.
    pub text: String,
    /// Zero-based index into the patch's hunk-spanning line stream.
    pub position: usize,
}

/// Parse a unified-diff patch into an ordered line stream.
///
/// `+` lines (but not `+++` file headers) are Added, `-` lines (but not
/// `---`) are Removed, everything else — hunk headers included — is
/// Context. An empty or absent patch is a valid "no changes" state and
/// parses to an empty vec, never an error.
pub fn parse_patch(patch: &str) -> Vec<DiffLine> {
    patch
        .lines()
        .enumerate()
        .map(|(position, raw)| {
            let (tag, text) = if raw.starts_with('+') && !raw.starts_with("+++") {
                (DiffTag::Added, &raw[1..])
            } else if raw.starts_with('-') && !raw.starts_with("---") {
                (DiffTag::Removed, &raw[1..])
            } else {
                (DiffTag::Context, raw)
            };
            DiffLine {
                tag,
                text: text.to_string(),
                position,
            }
        })
        .collect()
}
