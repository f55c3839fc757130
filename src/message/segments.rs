//! Helpers for writing encoded segment lists with vectored I/O.
//!
//! `Message::encode` hands back borrowed segments; the engine may need
//! several writes to drain them. These helpers resume from a byte offset
//! and report which bytes a write covered.

use std::io::IoSlice;

/// Total bytes across all segments.
pub fn total_len(segments: &[&[u8]]) -> usize {
    segments.iter().map(|s| s.len()).sum()
}

/// Create IoSlice views for scatter-gather I/O.
///
/// Returns slices starting from the given byte offset (for resuming partial
/// writes). Empty segments are skipped.
pub fn io_slices<'a>(segments: &[&'a [u8]], start_offset: usize) -> Vec<IoSlice<'a>> {
    let mut slices = Vec::with_capacity(segments.len());
    let mut skip = start_offset;

    for segment in segments {
        if skip >= segment.len() {
            skip -= segment.len();
            continue;
        }
        slices.push(IoSlice::new(&segment[skip..]));
        skip = 0;
    }

    slices
}

/// Sub-slices covering `len` bytes starting at `start_offset`.
///
/// Used to report drained bytes after a write of `len` bytes.
pub fn spans<'a>(segments: &[&'a [u8]], start_offset: usize, len: usize) -> Vec<&'a [u8]> {
    let mut spans = Vec::new();
    let mut skip = start_offset;
    let mut remaining = len;

    for segment in segments {
        if remaining == 0 {
            break;
        }
        if skip >= segment.len() {
            skip -= segment.len();
            continue;
        }
        let take = remaining.min(segment.len() - skip);
        spans.push(&segment[skip..skip + take]);
        remaining -= take;
        skip = 0;
    }

    spans
}
