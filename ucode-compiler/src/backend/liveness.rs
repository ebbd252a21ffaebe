//! Register liveness for the backward dead-store scan.
//!
//! Unlike a full dataflow framework this is a single map over the closed
//! set of tracked registers, updated in place while the optimizer walks a
//! flat instruction list from the end. Branches and labels are not modelled:
//! the list is treated as straight-line code.

use super::abi::RegisterName;
use serde::{Deserialize, Serialize};

/// Where the analysed region ends, which decides the starting liveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Boundary {
    /// A true program exit: every register may be observed afterwards.
    #[default]
    ProgramExit,
    /// A sub-sequence analysed in isolation: nothing is needed afterwards.
    Local,
}

/// Needed / not-needed state for each tracked register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LivenessMap {
    needed: [bool; RegisterName::TRACKED.len()],
}

impl LivenessMap {
    pub fn new(boundary: Boundary) -> Self {
        let all = boundary == Boundary::ProgramExit;
        Self {
            needed: [all; RegisterName::TRACKED.len()],
        }
    }

    fn slot(reg: RegisterName) -> Option<usize> {
        RegisterName::TRACKED.iter().position(|r| *r == reg)
    }

    /// Whether the current value of `reg` may still be read. Untracked
    /// names (pseudo-registers, `NONE`) are never "needed" here; their
    /// observability comes from the side-effect rule instead.
    pub fn is_needed(&self, reg: RegisterName) -> bool {
        reg.halves()
            .iter()
            .filter_map(|r| Self::slot(*r))
            .any(|i| self.needed[i])
    }

    pub fn mark_needed(&mut self, reg: RegisterName) {
        for half in reg.halves() {
            if let Some(i) = Self::slot(*half) {
                self.needed[i] = true;
            }
        }
    }

    pub fn mark_not_needed(&mut self, reg: RegisterName) {
        for half in reg.halves() {
            if let Some(i) = Self::slot(*half) {
                self.needed[i] = false;
            }
        }
    }

    /// Registers currently marked needed, in `TRACKED` order.
    pub fn needed(&self) -> Vec<RegisterName> {
        RegisterName::TRACKED
            .iter()
            .zip(self.needed.iter())
            .filter(|(_, n)| **n)
            .map(|(r, _)| *r)
            .collect()
    }
}
