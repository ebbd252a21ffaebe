use proptest::prelude::*;
use std::ops::Range;
use ucode_compiler::backend::temporaries::{TemporariesAllocator, Temporary};

// ── Basic allocation ─────────────────────────────────────────────────────

#[test]
fn first_allocation_starts_at_base() {
    let mut alloc = TemporariesAllocator::new(0x0010, 0x0110);
    let a = alloc.allocate(2).unwrap();
    let b = alloc.allocate(2).unwrap();
    assert_eq!(a.address(), 0x0010);
    assert_eq!(b.address(), 0x0012);
    assert_eq!(a.size(), 2);
}

#[test]
fn allocation_fails_when_region_is_full() {
    let mut alloc = TemporariesAllocator::new(0, 2);
    assert!(alloc.allocate(2).is_some());
    assert!(alloc.allocate(1).is_none());
}

#[test]
fn oversized_request_fails() {
    let mut alloc = TemporariesAllocator::new(0, 4);
    assert!(alloc.allocate(5).is_none());
    assert!(alloc.is_quiescent());
}

#[test]
fn empty_region_has_nothing_to_give() {
    let mut alloc = TemporariesAllocator::new(8, 8);
    assert!(alloc.free_spans().is_empty());
    assert!(alloc.allocate(1).is_none());
}

#[test]
fn release_makes_space_reusable() {
    let mut alloc = TemporariesAllocator::new(0, 1);
    let a = alloc.allocate(1).unwrap();
    alloc.consume(&a);
    let b = alloc.allocate(1).unwrap();
    assert_eq!(b.address(), a.address());
    assert_ne!(a, b, "a released handle is never handed out again");
}

// ── Coalescing and fragmentation ─────────────────────────────────────────

#[test]
fn adjacent_releases_coalesce() {
    let mut alloc = TemporariesAllocator::new(0, 2);
    let a = alloc.allocate(1).unwrap();
    let b = alloc.allocate(1).unwrap();

    alloc.consume(&a);
    assert!(alloc.allocate(2).is_none());

    alloc.consume(&b);
    let both = alloc.allocate(2).unwrap();
    assert_eq!(both.address(), 0);
}

#[test]
fn releasing_middle_block_fragments() {
    let mut alloc = TemporariesAllocator::new(0, 3);
    let _a = alloc.allocate(1).unwrap();
    let b = alloc.allocate(1).unwrap();
    let _c = alloc.allocate(1).unwrap();
    alloc.consume(&b);
    assert!(alloc.allocate(2).is_none());
    assert_eq!(alloc.allocate(1).map(|t| t.address()), Some(1));
}

#[test]
fn release_order_does_not_matter() {
    let mut alloc = TemporariesAllocator::new(0, 6);
    let temps: Vec<Temporary> = (0..3).map(|_| alloc.allocate(2).unwrap()).collect();
    alloc.consume(&temps[2]);
    alloc.consume(&temps[0]);
    alloc.consume(&temps[1]);
    assert_eq!(alloc.free_spans(), &[0..6]);
    assert!(alloc.is_quiescent());
}

// ── Reference counting ───────────────────────────────────────────────────

#[test]
fn retained_temporary_needs_two_releases() {
    let mut alloc = TemporariesAllocator::new(0, 4);
    let t = alloc.allocate(4).unwrap();
    alloc.retain(&t);
    assert_eq!(alloc.ref_count(&t), 2);

    alloc.consume(&t);
    assert_eq!(alloc.ref_count(&t), 1);
    assert_eq!(alloc.allocated_spans(), vec![0..4]);

    alloc.consume(&t);
    assert_eq!(alloc.ref_count(&t), 0);
    assert!(alloc.allocated_spans().is_empty());
}

// ── Coverage invariant ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Op {
    Allocate(u16),
    Release(usize),
    Retain(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (1u16..6).prop_map(Op::Allocate),
        2 => any::<usize>().prop_map(Op::Release),
        1 => any::<usize>().prop_map(Op::Retain),
    ]
}

/// Free and allocated spans tile `[base, limit)` exactly.
fn assert_tiles(alloc: &TemporariesAllocator) -> Result<(), TestCaseError> {
    let mut spans: Vec<Range<u16>> = alloc.free_spans().to_vec();
    spans.extend(alloc.allocated_spans());
    spans.sort_by_key(|s| s.start);

    let mut cursor = alloc.base();
    for span in &spans {
        prop_assert!(span.start < span.end, "empty span {:?}", span);
        prop_assert_eq!(span.start, cursor, "gap or overlap at {:?}", span);
        cursor = span.end;
    }
    prop_assert_eq!(cursor, alloc.limit());

    let free = alloc.free_spans();
    for pair in free.windows(2) {
        prop_assert!(pair[0].end < pair[1].start, "uncoalesced {:?}", pair);
    }
    Ok(())
}

proptest! {
    #[test]
    fn free_and_allocated_cover_region(ops in prop::collection::vec(op(), 0..64)) {
        let mut alloc = TemporariesAllocator::new(0x0010, 0x0030);
        let mut live: Vec<Temporary> = Vec::new();

        for op in ops {
            match op {
                Op::Allocate(size) => {
                    if let Some(t) = alloc.allocate(size) {
                        live.push(t);
                    }
                }
                Op::Release(i) if !live.is_empty() => {
                    let t = live.remove(i % live.len());
                    alloc.consume(&t);
                }
                Op::Retain(i) if !live.is_empty() => {
                    let t = live[i % live.len()];
                    alloc.retain(&t);
                    live.push(t);
                }
                Op::Release(_) | Op::Retain(_) => {}
            }
            assert_tiles(&alloc)?;
        }

        for t in live.drain(..) {
            alloc.consume(&t);
        }
        prop_assert!(alloc.is_quiescent());
        prop_assert_eq!(alloc.free_spans(), &[0x0010..0x0030]);
    }

    #[test]
    fn fresh_allocations_are_contiguous(size in 1u16..16, base in 0u16..0x1000) {
        let mut alloc = TemporariesAllocator::new(base, base + 64);
        let a = alloc.allocate(size).unwrap();
        let b = alloc.allocate(size).unwrap();
        prop_assert_eq!(a.address(), base);
        prop_assert_eq!(b.address(), base + size);
    }
}
