//! Register names and the fixed runtime memory map.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An operand of a machine micro-operation.
///
/// `UV` and `XY` are synthetic sixteen-bit views over their halves. `M` and
/// `P` are not storage at all: they read or write RAM at the address in UV
/// and the peripheral bus at the address in XY respectively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RegisterName {
    A,
    B,
    D,
    G,
    H,
    U,
    V,
    X,
    Y,
    UV,
    XY,
    M,
    P,
    #[serde(rename = "NONE")]
    None,
}

impl RegisterName {
    /// Registers whose liveness is tracked by dead-store elimination.
    pub const TRACKED: [RegisterName; 9] = [
        RegisterName::A, RegisterName::B, RegisterName::D,
        RegisterName::G, RegisterName::H,
        RegisterName::U, RegisterName::V,
        RegisterName::X, RegisterName::Y,
    ];

    /// Return address register pair written by `JALR`.
    pub const LINK_HI: RegisterName = RegisterName::G;
    pub const LINK_LO: RegisterName = RegisterName::H;

    /// Memory-mapped pseudo-registers.
    pub fn is_pseudo(&self) -> bool {
        matches!(self, RegisterName::M | RegisterName::P)
    }

    /// Expand a register name into the tracked registers it physically
    /// occupies. Pseudo-registers and `NONE` occupy nothing.
    pub fn halves(&self) -> &'static [RegisterName] {
        match self {
            RegisterName::A => &[RegisterName::A],
            RegisterName::B => &[RegisterName::B],
            RegisterName::D => &[RegisterName::D],
            RegisterName::G => &[RegisterName::G],
            RegisterName::H => &[RegisterName::H],
            RegisterName::U => &[RegisterName::U],
            RegisterName::V => &[RegisterName::V],
            RegisterName::X => &[RegisterName::X],
            RegisterName::Y => &[RegisterName::Y],
            RegisterName::UV => &[RegisterName::U, RegisterName::V],
            RegisterName::XY => &[RegisterName::X, RegisterName::Y],
            RegisterName::M | RegisterName::P | RegisterName::None => &[],
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "A" => Some(RegisterName::A),
            "B" => Some(RegisterName::B),
            "D" => Some(RegisterName::D),
            "G" => Some(RegisterName::G),
            "H" => Some(RegisterName::H),
            "U" => Some(RegisterName::U),
            "V" => Some(RegisterName::V),
            "X" => Some(RegisterName::X),
            "Y" => Some(RegisterName::Y),
            "UV" => Some(RegisterName::UV),
            "XY" => Some(RegisterName::XY),
            "M" => Some(RegisterName::M),
            "P" => Some(RegisterName::P),
            "NONE" => Some(RegisterName::None),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RegisterName::A => "A",
            RegisterName::B => "B",
            RegisterName::D => "D",
            RegisterName::G => "G",
            RegisterName::H => "H",
            RegisterName::U => "U",
            RegisterName::V => "V",
            RegisterName::X => "X",
            RegisterName::Y => "Y",
            RegisterName::UV => "UV",
            RegisterName::XY => "XY",
            RegisterName::M => "M",
            RegisterName::P => "P",
            RegisterName::None => "NONE",
        }
    }
}

impl fmt::Display for RegisterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Memory map
// ============================================================================

/// Address of the high byte of the sixteen-bit stack pointer.
pub const STACK_POINTER_HI: u16 = 0x0000;
/// Address of the low byte of the sixteen-bit stack pointer.
pub const STACK_POINTER_LO: u16 = 0x0001;
/// The stack grows downward; the first push lands at `0xffff`.
pub const STACK_POINTER_INITIAL: u16 = 0x0000;

pub const FRAME_POINTER_HI: u16 = 0x0002;
pub const FRAME_POINTER_LO: u16 = 0x0003;
pub const FRAME_POINTER_INITIAL: u16 = 0x0000;

/// Scratch bytes used by the lowering compiler within a single IR instruction.
pub const SCRATCH_BASE: u16 = 0x0004;
pub const SCRATCH_LIMIT: u16 = 0x0010;

/// Temporaries used by declaration lowering; they live across IR instructions.
pub const TEMPORARIES_BASE: u16 = 0x0010;
pub const TEMPORARIES_LIMIT: u16 = 0x0110;

/// First address handed out to statically allocated variables.
pub const STATIC_STORAGE_BASE: u16 = 0x0110;

/// Topmost instruction address. Unpatched jump placeholders point here and
/// the ROM image always holds `HLT` at this address.
pub const HALT_VECTOR: u16 = 0xffff;

/// Split a sixteen-bit value into `(hi, lo)` bytes.
pub fn split16(value: u16) -> (u8, u8) {
    ((value >> 8) as u8, (value & 0xff) as u8)
}
