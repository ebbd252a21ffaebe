//! Scratch storage for transient values.
//!
//! The allocator hands out byte intervals of a bounded region. Each interval
//! is tracked by a reference-counted record in an arena; the `Temporary`
//! handle given to callers is just an index plus the interval it names. The
//! free list is the authoritative view of what is available.

use std::ops::Range;

/// Handle to a reserved interval `[address, address + size)`.
///
/// Handles are cheap to copy. A handle stays valid (its address and size
/// remain readable) after its interval is released, but it is never handed
/// out again: a later allocation at the same address gets a fresh handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Temporary {
    id: usize,
    address: u16,
    size: u16,
}

impl Temporary {
    pub fn address(&self) -> u16 {
        self.address
    }

    pub fn size(&self) -> u16 {
        self.size
    }

    /// Address of the byte at `offset` inside the interval.
    pub fn at(&self, offset: u16) -> u16 {
        debug_assert!(offset < self.size);
        self.address + offset
    }
}

#[derive(Debug, Clone)]
struct Record {
    address: u16,
    size: u16,
    ref_count: u32,
}

/// First-fit allocator over `[base, limit)` with a coalescing free list.
#[derive(Debug, Clone)]
pub struct TemporariesAllocator {
    base: u16,
    limit: u16,
    /// Ascending, disjoint, never two adjacent spans.
    free: Vec<Range<u16>>,
    records: Vec<Record>,
}

impl TemporariesAllocator {
    pub fn new(base: u16, limit: u16) -> Self {
        let free = if base < limit { vec![base..limit] } else { Vec::new() };
        Self {
            base,
            limit,
            free,
            records: Vec::new(),
        }
    }

    pub fn base(&self) -> u16 {
        self.base
    }

    pub fn limit(&self) -> u16 {
        self.limit
    }

    /// Reserve `size` contiguous bytes, or `None` if no free run is large
    /// enough.
    pub fn allocate(&mut self, size: u16) -> Option<Temporary> {
        debug_assert!(size > 0, "zero-sized temporary");
        let slot = self
            .free
            .iter()
            .position(|span| span.end - span.start >= size)?;

        let address = self.free[slot].start;
        if self.free[slot].end - address == size {
            self.free.remove(slot);
        } else {
            self.free[slot].start += size;
        }

        let id = self.records.len();
        self.records.push(Record {
            address,
            size,
            ref_count: 1,
        });
        Some(Temporary { id, address, size })
    }

    /// Register an additional user of `temp`.
    pub fn retain(&mut self, temp: &Temporary) {
        let record = &mut self.records[temp.id];
        debug_assert!(record.ref_count > 0, "retain of a released temporary");
        record.ref_count += 1;
    }

    /// Drop one user of `temp`. The interval returns to the free list when
    /// the last user is gone.
    pub fn consume(&mut self, temp: &Temporary) {
        let record = &mut self.records[temp.id];
        debug_assert!(record.ref_count > 0, "double release of a temporary");
        if record.ref_count == 0 {
            return;
        }
        record.ref_count -= 1;
        if record.ref_count == 0 {
            let span = record.address..record.address + record.size;
            self.release_span(span);
        }
    }

    pub fn ref_count(&self, temp: &Temporary) -> u32 {
        self.records[temp.id].ref_count
    }

    fn release_span(&mut self, span: Range<u16>) {
        let slot = self
            .free
            .iter()
            .position(|f| f.start > span.start)
            .unwrap_or(self.free.len());
        self.free.insert(slot, span);

        // Merge with the right neighbour, then the left one.
        if slot + 1 < self.free.len() && self.free[slot].end == self.free[slot + 1].start {
            let right = self.free.remove(slot + 1);
            self.free[slot].end = right.end;
        }
        if slot > 0 && self.free[slot - 1].end == self.free[slot].start {
            let merged = self.free.remove(slot);
            self.free[slot - 1].end = merged.end;
        }
    }

    /// Free intervals in ascending order.
    pub fn free_spans(&self) -> &[Range<u16>] {
        &self.free
    }

    /// Intervals currently owned by at least one user, in ascending order.
    pub fn allocated_spans(&self) -> Vec<Range<u16>> {
        let mut spans: Vec<Range<u16>> = self
            .records
            .iter()
            .filter(|r| r.ref_count > 0)
            .map(|r| r.address..r.address + r.size)
            .collect();
        spans.sort_by_key(|s| s.start);
        spans
    }

    /// `true` when every temporary has been released.
    pub fn is_quiescent(&self) -> bool {
        self.records.iter().all(|r| r.ref_count == 0)
    }
}
