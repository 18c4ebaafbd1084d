//! Streaming filter contract and the shared output buffer core.
//!
//! A filter consumes one chunk of bytes per [`Filter::step`] call and
//! produces a transformed chunk without ever seeing the whole stream.
//! State that cannot be resolved inside a chunk (a split multi-byte
//! character, a partial marker line) is either held in the filter's own
//! transform state or carried over as raw bytes to be prefixed onto the
//! next chunk.

use std::borrow::Cow;

/// Output of one filter step.
///
/// The data slice borrows from the filter (or, on a passthrough, from the
/// caller's input) and is valid only until the next call on the same
/// filter instance.
#[derive(Debug)]
pub struct FilterOutput<'a> {
    /// Transformed bytes.
    pub data: &'a [u8],
    /// Bytes of reserved space logically preceding `data`, available for
    /// an adjacent filter to prepend into without copying.
    pub prespace: usize,
}

/// A streaming byte-transform filter.
///
/// The driver feeds each chunk to [`Filter::step`], calls
/// [`Filter::finish`] exactly once at end of stream, and may call
/// [`Filter::reset`] between independent logical streams. A pipeline holds
/// filters as trait objects:
///
/// ```ignore
/// let mut pipeline: Vec<Box<dyn Filter>> = vec![
///     Box::new(CharsetFilter::new("iso-8859-1", "utf-8")?),
///     Box::new(YencFilter::new(YencMode::Encode)),
/// ];
/// ```
pub trait Filter {
    /// Transforms one chunk of the stream.
    ///
    /// Never fails: documented fallback paths return the input unchanged.
    /// `prespace` describes the reserved space preceding the caller's
    /// input buffer and is echoed back on passthrough.
    fn step<'a>(&'a mut self, input: &'a [u8], prespace: usize) -> FilterOutput<'a>;

    /// Transforms the final chunk and flushes any transform state that
    /// only becomes determinate at end of stream.
    ///
    /// Called exactly once, after the last [`Filter::step`].
    fn finish<'a>(&'a mut self, input: &'a [u8], prespace: usize) -> FilterOutput<'a>;

    /// Reinitializes transform state (not configuration) so the instance
    /// can process a new, independent logical stream.
    fn reset(&mut self);

    /// Returns a new filter with the same configuration and freshly
    /// initialized transform state.
    fn copy(&self) -> Box<dyn Filter>;
}

/// Owned output and carry-over storage shared by every concrete filter.
///
/// The output buffer is a growable byte container logically split into
/// `[prespace][data]`: the first `prespace` bytes are reserved and never
/// written by the owning filter. The backup buffer holds bytes deferred
/// from the previous chunk; they are copied into filter-owned storage
/// immediately because the caller's input buffer is only valid for the
/// duration of one call.
#[derive(Debug, Default, Clone)]
pub struct FilterBuffer {
    out: Vec<u8>,
    prespace: usize,
    len: usize,
    backup: Vec<u8>,
}

impl FilterBuffer {
    /// Creates an empty buffer with no prespace.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Guarantees at least `min` writable bytes after the prespace region.
    ///
    /// When `preserve_existing` is true any bytes already written this
    /// step are kept; otherwise the data region is considered empty and
    /// the allocation may be replaced outright.
    pub fn ensure_capacity(&mut self, min: usize, preserve_existing: bool) {
        let want = self.prespace + min;
        if self.out.len() >= want {
            return;
        }
        if preserve_existing || self.out.capacity() >= want {
            self.out.resize(want, 0);
        } else {
            self.out = vec![0; want];
            self.len = 0;
        }
    }

    /// Guarantees at least `n` bytes of untouched space before the data
    /// region, shifting any written data forward as needed.
    pub fn set_prespace(&mut self, n: usize) {
        if n <= self.prespace {
            return;
        }
        let old = self.prespace;
        self.out.resize(self.out.len() + (n - old), 0);
        self.out.copy_within(old..old + self.len, n);
        self.prespace = n;
    }

    /// Current prespace reservation.
    #[must_use]
    pub const fn prespace(&self) -> usize {
        self.prespace
    }

    /// Bytes written so far this step.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether no bytes have been written this step.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The data region written so far.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.out[self.prespace..self.prespace + self.len]
    }

    /// The writable window following the data region.
    pub fn space(&mut self) -> &mut [u8] {
        let start = self.prespace + self.len;
        &mut self.out[start..]
    }

    /// Marks `n` bytes of the writable window as written.
    pub fn advance(&mut self, n: usize) {
        debug_assert!(self.prespace + self.len + n <= self.out.len());
        self.len += n;
    }

    /// Discards the data region at the start of a step.
    pub fn clear_data(&mut self) {
        self.len = 0;
    }

    /// Stores trailing bytes that could not be completed this step; they
    /// are prefixed onto the next chunk by [`FilterBuffer::splice_backup`].
    ///
    /// Replaces any previous backup: a step either resolves the carried
    /// bytes or re-backs-up a possibly different remainder.
    pub fn carry_over(&mut self, bytes: &[u8]) {
        self.backup.clear();
        self.backup.extend_from_slice(bytes);
    }

    /// Whether bytes are pending from the previous step.
    #[must_use]
    pub fn has_backup(&self) -> bool {
        !self.backup.is_empty()
    }

    /// Consumes any pending backup, returning it with `input` appended.
    ///
    /// Borrows `input` directly when nothing is pending, so the common
    /// path is copy-free.
    pub fn splice_backup<'a>(&mut self, input: &'a [u8]) -> Cow<'a, [u8]> {
        if self.backup.is_empty() {
            Cow::Borrowed(input)
        } else {
            let mut merged = std::mem::take(&mut self.backup);
            merged.extend_from_slice(input);
            Cow::Owned(merged)
        }
    }

    /// Drops written data and pending backup without releasing
    /// allocations, ready for a new logical stream.
    pub fn reset(&mut self) {
        self.len = 0;
        self.backup.clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_capacity_preserves_data() {
        let mut buf = FilterBuffer::new();
        buf.ensure_capacity(4, false);
        buf.space()[..4].copy_from_slice(b"abcd");
        buf.advance(4);

        buf.ensure_capacity(1024, true);
        assert_eq!(buf.data(), b"abcd");
        assert!(buf.space().len() >= 1020);
    }

    #[test]
    fn test_ensure_capacity_without_preserve_discards() {
        let mut buf = FilterBuffer::new();
        buf.ensure_capacity(4, false);
        buf.space()[..4].copy_from_slice(b"abcd");
        buf.advance(4);

        buf.ensure_capacity(1024, false);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_set_prespace_shifts_data() {
        let mut buf = FilterBuffer::new();
        buf.ensure_capacity(3, false);
        buf.space()[..3].copy_from_slice(b"xyz");
        buf.advance(3);

        buf.set_prespace(8);
        assert_eq!(buf.prespace(), 8);
        assert_eq!(buf.data(), b"xyz");

        // Shrinking is never required; the reservation only grows.
        buf.set_prespace(2);
        assert_eq!(buf.prespace(), 8);
    }

    #[test]
    fn test_carry_over_and_splice() {
        let mut buf = FilterBuffer::new();
        assert!(matches!(buf.splice_backup(b"abc"), Cow::Borrowed(_)));

        buf.carry_over(b"=yb");
        assert!(buf.has_backup());
        let merged = buf.splice_backup(b"egin ");
        assert_eq!(merged.as_ref(), b"=ybegin ");
        assert!(!buf.has_backup());
    }

    #[test]
    fn test_carry_over_replaces_previous() {
        let mut buf = FilterBuffer::new();
        buf.carry_over(b"old");
        buf.carry_over(b"new");
        assert_eq!(buf.splice_backup(b"").as_ref(), b"new");
    }

    #[test]
    fn test_reset_clears_state() {
        let mut buf = FilterBuffer::new();
        buf.ensure_capacity(16, false);
        buf.space()[..2].copy_from_slice(b"hi");
        buf.advance(2);
        buf.carry_over(b"tail");

        buf.reset();
        assert!(buf.is_empty());
        assert!(!buf.has_backup());
        // Allocation survives for the next stream.
        assert!(buf.space().len() >= 16);
    }
}
