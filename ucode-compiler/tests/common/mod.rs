#![allow(dead_code)]

// A small reference machine for executing lowered programs in tests.

use std::cmp::Ordering;
use std::collections::HashMap;
use ucode_compiler::backend::abi::RegisterName as R;
use ucode_compiler::backend::instruction::{AluOp, Cond, MicroOp};
use ucode_compiler::ir::Instr;
use ucode_compiler::{compile_ir, CompileOptions, Program, ProgramIR, Symbol};

pub struct Machine {
    regs: HashMap<R, u8>,
    pub ram: Vec<u8>,
    /// Values served on peripheral reads, keyed by (device, address).
    pub peripherals: HashMap<(u8, u16), u8>,
    /// Every peripheral write, in order.
    pub peripheral_writes: Vec<(u8, u16, u8)>,
    carry: bool,
    flags: Ordering,
    pub steps: usize,
}

impl Machine {
    pub fn new() -> Self {
        Self {
            regs: HashMap::new(),
            ram: vec![0; 1 << 16],
            peripherals: HashMap::new(),
            peripheral_writes: Vec::new(),
            carry: false,
            flags: Ordering::Equal,
            steps: 0,
        }
    }

    pub fn reg(&self, r: R) -> u8 {
        self.regs.get(&r).copied().unwrap_or(0)
    }

    fn pair(&self, hi: R, lo: R) -> u16 {
        ((self.reg(hi) as u16) << 8) | self.reg(lo) as u16
    }

    fn set_pair(&mut self, hi: R, lo: R, value: u16) {
        self.regs.insert(hi, (value >> 8) as u8);
        self.regs.insert(lo, value as u8);
    }

    pub fn read16(&self, addr: u16) -> u16 {
        ((self.ram[addr as usize] as u16) << 8) | self.ram[addr.wrapping_add(1) as usize] as u16
    }

    pub fn stack_pointer(&self) -> u16 {
        self.read16(0x0000)
    }

    /// Byte `depth` below the top of the stack.
    pub fn stack(&self, depth: u16) -> u8 {
        self.ram[self.stack_pointer().wrapping_add(depth) as usize]
    }

    fn read(&mut self, r: R) -> u8 {
        match r {
            R::M => self.ram[self.pair(R::U, R::V) as usize],
            R::P => {
                let key = (self.reg(R::D), self.pair(R::X, R::Y));
                self.peripherals.get(&key).copied().unwrap_or(0)
            }
            R::None => 0,
            R::UV | R::XY => panic!("cannot read pair {r} as a byte"),
            _ => self.reg(r),
        }
    }

    fn write(&mut self, r: R, value: u8) {
        match r {
            R::M => {
                let addr = self.pair(R::U, R::V);
                self.ram[addr as usize] = value;
            }
            R::P => {
                let write = (self.reg(R::D), self.pair(R::X, R::Y), value);
                self.peripheral_writes.push(write);
            }
            R::None => {}
            R::UV => {
                self.regs.insert(R::U, value);
                self.regs.insert(R::V, value);
            }
            R::XY => {
                self.regs.insert(R::X, value);
                self.regs.insert(R::Y, value);
            }
            _ => {
                self.regs.insert(r, value);
            }
        }
    }

    fn alu(&mut self, op: AluOp) -> u8 {
        let a = self.reg(R::A);
        let b = self.reg(R::B);
        let (result, carry) = match op {
            AluOp::Add => a.overflowing_add(b),
            AluOp::Sub => a.overflowing_sub(b),
            AluOp::Adc => {
                let wide = a as u16 + b as u16 + self.carry as u16;
                (wide as u8, wide > 0xff)
            }
            AluOp::Sbc => {
                let wide = a as i16 - b as i16 - self.carry as i16;
                (wide as u8, wide < 0)
            }
            AluOp::Dea => a.overflowing_sub(1),
            AluOp::Dca => {
                if self.carry {
                    a.overflowing_sub(1)
                } else {
                    (a, false)
                }
            }
        };
        self.carry = carry;
        result
    }

    fn taken(&self, cond: Cond) -> bool {
        match cond {
            Cond::Eq => self.flags == Ordering::Equal,
            Cond::Ne => self.flags != Ordering::Equal,
            Cond::Lt => self.flags == Ordering::Less,
            Cond::Gt => self.flags == Ordering::Greater,
            Cond::Le => self.flags != Ordering::Greater,
            Cond::Ge => self.flags != Ordering::Less,
        }
    }

    /// Run from the program's base until `HLT`.
    pub fn run(&mut self, program: &Program, max_steps: usize) {
        let rom = program.rom_image().expect("program fits in ROM");
        let mut pc = program.base;
        loop {
            assert!(self.steps < max_steps, "no HLT within {max_steps} steps");
            self.steps += 1;
            let op = rom[pc as usize];
            let mut next = pc.wrapping_add(1);
            match op {
                MicroOp::Nop => {}
                MicroOp::Hlt => return,
                MicroOp::Inuv => {
                    let uv = self.pair(R::U, R::V).wrapping_add(1);
                    self.set_pair(R::U, R::V, uv);
                }
                MicroOp::Inxy => {
                    let xy = self.pair(R::X, R::Y).wrapping_add(1);
                    self.set_pair(R::X, R::Y, xy);
                }
                MicroOp::Mov { dst, src } => {
                    let value = self.read(src);
                    self.write(dst, value);
                }
                MicroOp::Li { dst, imm } => self.write(dst, imm),
                MicroOp::Alu { op, dst } => {
                    let value = self.alu(op);
                    self.write(dst, value);
                }
                MicroOp::Cmp => self.flags = self.reg(R::A).cmp(&self.reg(R::B)),
                MicroOp::Jmp => next = self.pair(R::X, R::Y),
                MicroOp::Branch(cond) => {
                    if self.taken(cond) {
                        next = self.pair(R::X, R::Y);
                    }
                }
                MicroOp::Jalr => {
                    self.set_pair(R::G, R::H, next);
                    next = self.pair(R::X, R::Y);
                }
            }
            pc = next;
        }
    }
}

pub const MAX_STEPS: usize = 5_000_000;

pub fn options(optimize: bool) -> CompileOptions {
    CompileOptions {
        optimize,
        ..CompileOptions::default()
    }
}

pub fn lower(instrs: Vec<Instr>, optimize: bool) -> Program {
    let symbols: HashMap<String, Symbol> = HashMap::new();
    compile_ir(&ProgramIR::from(instrs), &symbols, &options(optimize)).expect("lowering succeeds")
}

/// Lower with dead-store elimination and run to completion.
pub fn run(instrs: Vec<Instr>) -> Machine {
    let program = lower(instrs, true);
    let mut machine = Machine::new();
    machine.run(&program, MAX_STEPS);
    machine
}
