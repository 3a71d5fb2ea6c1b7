//! Order-preserving address partitioning
//!
//! Used twice on the way out: once to cut a message into work items sized
//! to the per-second budget, and once to cut a work item into batches sized
//! to the transport's per-call limit. Retry accounting relies on the chunks
//! concatenating back to the input exactly.

use std::num::NonZeroUsize;

/// Split `items` into contiguous chunks of at most `chunk_size` elements.
///
/// Every chunk is non-empty, the chunks concatenate back to `items` in order,
/// and there are `ceil(items.len() / chunk_size)` of them. An empty input
/// yields no chunks.
pub fn partition<T>(items: &[T], chunk_size: NonZeroUsize) -> std::slice::Chunks<'_, T> {
    items.chunks(chunk_size.get())
}

/// Number of transport calls needed for `recipients` addresses.
pub const fn call_units(recipients: usize, max_recipients_per_call: NonZeroUsize) -> usize {
    recipients.div_ceil(max_recipients_per_call.get())
}
