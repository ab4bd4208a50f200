//! Scatter/gather byte buffers — zero-copy I/O primitive (spec §3).
//!
//! `IpBufRef` is a borrowed, read-only view over a chain of byte slices.
//! Unlike the source's intrusive `(ptr, len, next)` node chain, we model
//! the chain as a borrowed slice of slices: the same O(1) "consume a
//! header, hand the rest downstream" walk, without pointer chasing. The
//! producer of a buffer chain always outlives the call that borrows it
//! (spec §3: "Buffers are borrowed, never owned, by stack operations").

/// A read-only scatter/gather view over `total_len` bytes spread across
/// zero or more backing slices.
#[derive(Clone, Copy)]
pub struct IpBufRef<'a> {
    chunks: &'a [&'a [u8]],
    /// Byte offset into `chunks[0]` where this view begins.
    offset: usize,
    total_len: usize,
}

impl<'a> IpBufRef<'a> {
    /// Builds a view over a single contiguous slice.
    pub fn single(chunk: &'a [u8]) -> IpBufRefOwned<'a> {
        IpBufRefOwned {
            storage: [chunk],
        }
    }

    /// Builds a view over a pre-chained set of chunks.
    pub fn from_chunks(chunks: &'a [&'a [u8]]) -> Self {
        let total_len = chunks.iter().map(|c| c.len()).sum();
        IpBufRef {
            chunks,
            offset: 0,
            total_len,
        }
    }

    pub fn len(&self) -> usize {
        self.total_len
    }

    pub fn is_empty(&self) -> bool {
        self.total_len == 0
    }

    /// Copies the first `n` bytes into `dst` (`dst.len() >= n` required).
    /// Returns `false` if fewer than `n` bytes are available.
    pub fn peek_into(&self, dst: &mut [u8]) -> bool {
        let n = dst.len();
        if n > self.total_len {
            return false;
        }
        let mut remaining = n;
        let mut dst_pos = 0;
        let mut chunk_idx = 0;
        let mut chunk_off = self.offset;
        while remaining > 0 {
            let chunk = self.chunks[chunk_idx];
            let avail = chunk.len() - chunk_off;
            let take = avail.min(remaining);
            dst[dst_pos..dst_pos + take].copy_from_slice(&chunk[chunk_off..chunk_off + take]);
            dst_pos += take;
            remaining -= take;
            chunk_off = 0;
            chunk_idx += 1;
        }
        true
    }

    /// Returns a new view with the first `n` bytes skipped.
    pub fn skip(&self, n: usize) -> IpBufRef<'a> {
        assert!(n <= self.total_len, "IpBufRef::skip beyond end");
        let mut remaining = n;
        let mut chunk_idx = 0;
        let mut chunk_off = self.offset;
        while remaining > 0 {
            let chunk_len = self.chunks[chunk_idx].len() - chunk_off;
            if remaining < chunk_len {
                chunk_off += remaining;
                remaining = 0;
            } else {
                remaining -= chunk_len;
                chunk_off = 0;
                chunk_idx += 1;
            }
        }
        IpBufRef {
            chunks: &self.chunks[chunk_idx..],
            offset: chunk_off,
            total_len: self.total_len - n,
        }
    }

    /// Truncates the view to at most `n` bytes.
    pub fn take(&self, n: usize) -> IpBufRef<'a> {
        IpBufRef {
            chunks: self.chunks,
            offset: self.offset,
            total_len: self.total_len.min(n),
        }
    }

    /// Copies the whole view out into a contiguous destination slice.
    /// `dst.len()` must be exactly `self.len()`.
    pub fn copy_to_slice(&self, dst: &mut [u8]) {
        assert_eq!(dst.len(), self.total_len);
        self.peek_into(dst);
    }
}

/// Owns the one-element chunk array backing [`IpBufRef::single`]; keeping
/// this separate avoids returning a reference to a function-local array.
pub struct IpBufRefOwned<'a> {
    storage: [&'a [u8]; 1],
}

impl<'a> IpBufRefOwned<'a> {
    pub fn as_ref(&self) -> IpBufRef<'_> {
        IpBufRef::from_chunks(&self.storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_chunk_roundtrip() {
        let data = [1u8, 2, 3, 4, 5];
        let owned = IpBufRef::single(&data);
        let buf = owned.as_ref();
        assert_eq!(buf.len(), 5);
        let mut out = [0u8; 5];
        buf.copy_to_slice(&mut out);
        assert_eq!(out, data);
    }

    #[test]
    fn skip_and_take_across_chunks() {
        let a = [1u8, 2, 3];
        let b = [4u8, 5, 6, 7];
        let chunks: [&[u8]; 2] = [&a, &b];
        let buf = IpBufRef::from_chunks(&chunks);
        assert_eq!(buf.len(), 7);

        let tail = buf.skip(2);
        let mut out = [0u8; 5];
        tail.copy_to_slice(&mut out);
        assert_eq!(out, [3, 4, 5, 6, 7]);

        let head = buf.take(4);
        let mut out2 = [0u8; 4];
        head.copy_to_slice(&mut out2);
        assert_eq!(out2, [1, 2, 3, 4]);
    }

    #[test]
    fn peek_into_reports_insufficient_length() {
        let data = [1u8, 2];
        let owned = IpBufRef::single(&data);
        let buf = owned.as_ref();
        let mut out = [0u8; 4];
        assert!(!buf.peek_into(&mut out));
    }
}
