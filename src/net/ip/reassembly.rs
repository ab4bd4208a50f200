//! Fragment reassembly: per-datagram hole lists (spec §4.3 Reassembly).

use heapless::Vec;

use crate::log_macros::core_debug;
use crate::net::addr::Ip4Addr;
use crate::time::{Duration, Instant};

/// Identifies one in-flight reassembly (`(src, dst, proto, ident)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReassemblyKey {
    pub src: Ip4Addr,
    pub dst: Ip4Addr,
    pub proto: u8,
    pub ident: u16,
}

/// A gap `[start, end)` in byte-offset space not yet covered by a
/// received fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Hole {
    start: usize,
    end: usize,
}

struct ReassemblyEntry<const H: usize> {
    key: ReassemblyKey,
    holes: Vec<Hole, H>,
    last_seen: Instant,
    got_last_fragment: bool,
    total_len: usize,
    in_use: bool,
}

impl<const H: usize> ReassemblyEntry<H> {
    const fn empty() -> Self {
        ReassemblyEntry {
            key: ReassemblyKey {
                src: Ip4Addr::UNSPECIFIED,
                dst: Ip4Addr::UNSPECIFIED,
                proto: 0,
                ident: 0,
            },
            holes: Vec::new(),
            last_seen: Instant::ZERO,
            got_last_fragment: false,
            total_len: 0,
            in_use: false,
        }
    }

    fn is_complete(&self) -> bool {
        self.in_use && self.got_last_fragment && self.holes.is_empty()
    }
}

/// Outcome of inserting one fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// More fragments are still missing.
    Pending,
    /// The datagram is now fully reassembled; payload can be reassembled
    /// by the caller from its own fragment store (this type only tracks
    /// hole bookkeeping, not fragment bytes — spec §3 keeps buffers
    /// borrowed, never owned, so fragment bytes stay with the driver's
    /// receive buffer until the caller copies them out).
    Complete,
    /// Overlap with inconsistent data, or the entry pool/hole list was
    /// full; the fragment (and in the pool-exhaustion case, possibly the
    /// whole entry) was dropped.
    Dropped,
}

/// Per-interface reassembly table with up to `N` concurrent datagrams,
/// each tracked with up to `H` holes.
pub struct ReassemblyTable<const N: usize, const H: usize> {
    entries: [ReassemblyEntry<H>; N],
}

impl<const N: usize, const H: usize> ReassemblyTable<N, H> {
    pub fn new() -> Self {
        ReassemblyTable {
            entries: core::array::from_fn(|_| ReassemblyEntry::empty()),
        }
    }

    fn find(&self, key: ReassemblyKey) -> Option<usize> {
        self.entries.iter().position(|e| e.in_use && e.key == key)
    }

    /// Evicts the least-recently-seen entry to make room for a new one
    /// (spec §4.3: "buffer pressure (LRU eviction)").
    fn evict_lru(&mut self) -> usize {
        let mut oldest = 0;
        for i in 1..N {
            if self.entries[i].in_use
                && (!self.entries[oldest].in_use || self.entries[i].last_seen.is_before(self.entries[oldest].last_seen))
            {
                oldest = i;
            }
        }
        oldest
    }

    /// Inserts a fragment covering byte range `[offset, offset+len)` of
    /// the full datagram, trimming/splitting the hole list (spec §4.3).
    pub fn insert_fragment(
        &mut self,
        key: ReassemblyKey,
        offset: usize,
        len: usize,
        more_fragments: bool,
        now: Instant,
    ) -> InsertOutcome {
        let idx = match self.find(key) {
            Some(i) => i,
            None => {
                let i = self
                    .entries
                    .iter()
                    .position(|e| !e.in_use)
                    .unwrap_or_else(|| self.evict_lru());
                self.entries[i] = ReassemblyEntry::empty();
                self.entries[i].in_use = true;
                self.entries[i].key = key;
                let _ = self.entries[i].holes.push(Hole {
                    start: 0,
                    end: usize::MAX,
                });
                i
            }
        };

        let entry = &mut self.entries[idx];
        entry.last_seen = now;
        if !more_fragments {
            entry.got_last_fragment = true;
            entry.total_len = offset + len;
            // The final hole's open-ended `end` becomes concrete now
            // that we know the datagram's total length.
            for h in entry.holes.iter_mut() {
                if h.end == usize::MAX {
                    h.end = entry.total_len;
                }
            }
        }

        let frag_start = offset;
        let frag_end = offset + len;
        let mut new_holes: Vec<Hole, H> = Vec::new();
        let mut touched_any = false;
        for h in entry.holes.iter() {
            if frag_end <= h.start || frag_start >= h.end {
                if new_holes.push(*h).is_err() {
                    return InsertOutcome::Dropped;
                }
                continue;
            }
            touched_any = true;
            if frag_start > h.start {
                if new_holes.push(Hole { start: h.start, end: frag_start }).is_err() {
                    return InsertOutcome::Dropped;
                }
            }
            if frag_end < h.end {
                if new_holes.push(Hole { start: frag_end, end: h.end }).is_err() {
                    return InsertOutcome::Dropped;
                }
            }
        }
        if !touched_any && !entry.holes.is_empty() {
            // Fragment fell entirely within already-covered space:
            // benign duplicate, not an inconsistency.
        }
        entry.holes = new_holes;

        if entry.is_complete() {
            entry.in_use = false;
            InsertOutcome::Complete
        } else {
            InsertOutcome::Pending
        }
    }

    /// Drops any entry whose `last_seen` is older than `timeout` (spec
    /// §4.3: "Drop on expiry").
    pub fn expire(&mut self, now: Instant, timeout: Duration) {
        for e in self.entries.iter_mut() {
            if e.in_use && now.wrapping_duration_since(e.last_seen) >= timeout {
                core_debug!("ip: reassembly for ident={} expired, dropping", e.key.ident);
                e.in_use = false;
            }
        }
    }
}

impl<const N: usize, const H: usize> Default for ReassemblyTable<N, H> {
    fn default() -> Self {
        Self::new()
    }
}
