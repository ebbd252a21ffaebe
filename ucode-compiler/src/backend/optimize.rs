//! Micro-op level optimization passes.
//!
//! Each pass implements the `AsmPass` trait and operates on a
//! `Vec<MicroOp>`. Passes are composed via the `PassManager` and run after
//! label resolution, so they must never change the length of the list:
//! absolute addresses are already baked into jump placeholders.

use super::instruction::MicroOp;
use super::liveness::{Boundary, LivenessMap};
use tracing::{debug, trace};

// ============================================================================
// Pass infrastructure
// ============================================================================

/// A single optimization pass over lowered micro-ops.
pub trait AsmPass {
    fn name(&self) -> &'static str;
    fn run(&self, items: &mut Vec<MicroOp>);
}

/// Runs a sequence of `AsmPass`es in order.
pub struct PassManager {
    passes: Vec<Box<dyn AsmPass>>,
}

impl PassManager {
    pub fn new() -> Self {
        Self { passes: Vec::new() }
    }

    pub fn add(&mut self, pass: Box<dyn AsmPass>) {
        self.passes.push(pass);
    }

    pub fn run_all(&self, items: &mut Vec<MicroOp>) {
        for pass in &self.passes {
            let before = items.len();
            pass.run(items);
            debug_assert_eq!(before, items.len(), "{} changed program length", pass.name());
        }
    }
}

impl Default for PassManager {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Dead-store elimination
// ============================================================================

/// Replaces register writes that are never read with `NOP`.
///
/// A single backward scan: an instruction without side effects whose every
/// written register is not needed is dead. Otherwise its written registers
/// become not-needed and the registers it reads become needed.
pub struct DeadStoreElimination {
    boundary: Boundary,
}

impl DeadStoreElimination {
    pub fn new(boundary: Boundary) -> Self {
        Self { boundary }
    }

    /// Optimize a copy of `program`.
    pub fn optimize(&self, program: &[MicroOp]) -> Vec<MicroOp> {
        let mut out = program.to_vec();
        self.run(&mut out);
        out
    }

    fn is_dead(instr: &MicroOp, live: &LivenessMap) -> bool {
        if instr.has_side_effects() {
            return false;
        }
        let written = instr.dependents();
        !written.is_empty() && written.iter().all(|r| !live.is_needed(*r))
    }
}

impl AsmPass for DeadStoreElimination {
    fn name(&self) -> &'static str {
        "dead-store-elimination"
    }

    fn run(&self, items: &mut Vec<MicroOp>) {
        let mut live = LivenessMap::new(self.boundary);
        let mut eliminated = 0usize;

        for (index, instr) in items.iter_mut().enumerate().rev() {
            if Self::is_dead(instr, &live) {
                trace!(index, %instr, "dead store");
                *instr = MicroOp::Nop;
                eliminated += 1;
                continue;
            }
            for reg in instr.dependents() {
                live.mark_not_needed(reg);
            }
            for reg in instr.dependencies() {
                live.mark_needed(reg);
            }
        }

        debug!(eliminated, total = items.len(), "dead-store elimination finished");
    }
}

// ============================================================================
// Entry point
// ============================================================================

/// Run the default pass pipeline over `items`.
pub fn optimize(items: &mut Vec<MicroOp>, boundary: Boundary) {
    let mut pm = PassManager::new();
    pm.add(Box::new(DeadStoreElimination::new(boundary)));
    pm.run_all(items);
}
