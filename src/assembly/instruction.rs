//! Instruction set model.
//!
//! The engine executes a small load/store register machine with ten 64-bit registers
//! and byte-addressed little-endian memory. The instruction set is closed: every
//! effect the stepper knows about is one variant of [`Opcode`].
//!
//! # Calling Convention
//!
//! | Register | Role |
//! |----------|------|
//! | `r0` | first argument, return value |
//! | `r1`..`r3` | further arguments |
//! | `r4`..`r7` | scratch |
//! | `sp` | stack pointer |
//! | `lr` | return address, written by `call`, consumed by `ret` |

use std::fmt;

use strum::{Display, EnumCount, EnumIter, EnumString, FromRepr};

use crate::symbolic::SymbolicOp;

/// A machine register.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    EnumIter,
    EnumCount,
    FromRepr,
)]
#[strum(serialize_all = "lowercase")]
#[repr(u8)]
pub enum Register {
    /// General purpose register 0, return value
    R0,
    /// General purpose register 1
    R1,
    /// General purpose register 2
    R2,
    /// General purpose register 3
    R3,
    /// General purpose register 4
    R4,
    /// General purpose register 5
    R5,
    /// General purpose register 6
    R6,
    /// General purpose register 7
    R7,
    /// Stack pointer
    Sp,
    /// Link register holding the return address
    Lr,
}

impl Register {
    /// Slot of this register in a register file.
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// A source operand, either a register or a 64-bit immediate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    /// Value of a register
    Reg(Register),
    /// Constant value
    Imm(u64),
}

impl From<Register> for Operand {
    fn from(reg: Register) -> Self {
        Operand::Reg(reg)
    }
}

impl From<u64> for Operand {
    fn from(value: u64) -> Self {
        Operand::Imm(value)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(reg) => write!(f, "{reg}"),
            Operand::Imm(value) => write!(f, "{value:#x}"),
        }
    }
}

/// Arithmetic and bitwise operators of the `alu` instruction.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, EnumCount, FromRepr,
)]
#[strum(serialize_all = "lowercase")]
#[repr(u8)]
pub enum AluOp {
    /// Wrapping addition
    Add,
    /// Wrapping subtraction
    Sub,
    /// Wrapping multiplication
    Mul,
    /// Unsigned division
    UDiv,
    /// Signed division
    SDiv,
    /// Unsigned remainder
    URem,
    /// Signed remainder
    SRem,
    /// Bitwise and
    And,
    /// Bitwise or
    Or,
    /// Bitwise exclusive or
    Xor,
    /// Shift left
    Shl,
    /// Logical shift right
    LShr,
    /// Arithmetic shift right
    AShr,
}

impl AluOp {
    /// The expression operator implementing this ALU operation.
    #[must_use]
    pub fn symbolic_op(self) -> SymbolicOp {
        match self {
            AluOp::Add => SymbolicOp::Add,
            AluOp::Sub => SymbolicOp::Sub,
            AluOp::Mul => SymbolicOp::Mul,
            AluOp::UDiv => SymbolicOp::DivU,
            AluOp::SDiv => SymbolicOp::DivS,
            AluOp::URem => SymbolicOp::RemU,
            AluOp::SRem => SymbolicOp::RemS,
            AluOp::And => SymbolicOp::And,
            AluOp::Or => SymbolicOp::Or,
            AluOp::Xor => SymbolicOp::Xor,
            AluOp::Shl => SymbolicOp::Shl,
            AluOp::LShr => SymbolicOp::ShrU,
            AluOp::AShr => SymbolicOp::ShrS,
        }
    }
}

/// Comparison operators for `set` and conditional branches.
///
/// Signedness is part of the operator; registers carry no type.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, EnumCount, FromRepr,
)]
#[strum(serialize_all = "lowercase")]
#[repr(u8)]
pub enum CmpOp {
    /// Equal
    Eq,
    /// Not equal
    Ne,
    /// Unsigned less than
    Ult,
    /// Unsigned less or equal
    Ule,
    /// Unsigned greater than
    Ugt,
    /// Unsigned greater or equal
    Uge,
    /// Signed less than
    Slt,
    /// Signed less or equal
    Sle,
    /// Signed greater than
    Sgt,
    /// Signed greater or equal
    Sge,
}

impl CmpOp {
    /// The expression operator implementing this comparison.
    #[must_use]
    pub fn symbolic_op(self) -> SymbolicOp {
        match self {
            CmpOp::Eq => SymbolicOp::Eq,
            CmpOp::Ne => SymbolicOp::Ne,
            CmpOp::Ult => SymbolicOp::LtU,
            CmpOp::Ule => SymbolicOp::LeU,
            CmpOp::Ugt => SymbolicOp::GtU,
            CmpOp::Uge => SymbolicOp::GeU,
            CmpOp::Slt => SymbolicOp::LtS,
            CmpOp::Sle => SymbolicOp::LeS,
            CmpOp::Sgt => SymbolicOp::GtS,
            CmpOp::Sge => SymbolicOp::GeS,
        }
    }
}

/// Valid memory access sizes in bytes.
pub const ACCESS_SIZES: [u8; 4] = [1, 2, 4, 8];

/// The operation and operands of one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Does nothing.
    Nop,
    /// `dst = src`
    Mov {
        /// Destination register
        dst: Register,
        /// Source value
        src: Operand,
    },
    /// `dst = lhs <op> rhs`
    Alu {
        /// Operation to perform
        op: AluOp,
        /// Destination register
        dst: Register,
        /// Left operand
        lhs: Register,
        /// Right operand
        rhs: Operand,
    },
    /// `dst = !src`
    Not {
        /// Destination register
        dst: Register,
        /// Source register
        src: Register,
    },
    /// `dst = -src`
    Neg {
        /// Destination register
        dst: Register,
        /// Source register
        src: Register,
    },
    /// `dst = (lhs <cond> rhs) ? 1 : 0`
    SetCond {
        /// Comparison
        cond: CmpOp,
        /// Destination register
        dst: Register,
        /// Left operand
        lhs: Register,
        /// Right operand
        rhs: Operand,
    },
    /// Zero-extending load of `size` bytes from `base + offset`.
    Load {
        /// Destination register
        dst: Register,
        /// Base address
        base: Operand,
        /// Signed displacement
        offset: i32,
        /// Access size in bytes
        size: u8,
    },
    /// Store of the low `size` bytes of `src` to `base + offset`.
    Store {
        /// Value to store
        src: Operand,
        /// Base address
        base: Operand,
        /// Signed displacement
        offset: i32,
        /// Access size in bytes
        size: u8,
    },
    /// Unconditional transfer to a possibly computed target.
    Jump {
        /// Destination address
        target: Operand,
    },
    /// Transfer to `target` when `lhs <cond> rhs`, otherwise fall through.
    Branch {
        /// Comparison
        cond: CmpOp,
        /// Left operand
        lhs: Register,
        /// Right operand
        rhs: Operand,
        /// Taken target
        target: u64,
    },
    /// Writes the fallthrough address to `lr` and transfers to `target`.
    Call {
        /// Callee address
        target: Operand,
    },
    /// Transfers to the address in `lr`.
    Ret,
    /// Terminates the path normally.
    Halt,
}

impl Opcode {
    /// Assembly mnemonic.
    #[must_use]
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Opcode::Nop => "nop",
            Opcode::Mov { .. } => "mov",
            Opcode::Alu { .. } => "alu",
            Opcode::Not { .. } => "not",
            Opcode::Neg { .. } => "neg",
            Opcode::SetCond { .. } => "set",
            Opcode::Load { .. } => "ld",
            Opcode::Store { .. } => "st",
            Opcode::Jump { .. } => "jmp",
            Opcode::Branch { .. } => "br",
            Opcode::Call { .. } => "call",
            Opcode::Ret => "ret",
            Opcode::Halt => "halt",
        }
    }

    /// Checks if execution never falls through to the next instruction.
    #[must_use]
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Opcode::Jump { .. } | Opcode::Call { .. } | Opcode::Ret | Opcode::Halt
        )
    }
}

/// A decoded instruction with its location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    /// Address of the first byte
    pub address: u64,
    /// Encoded length in bytes
    pub length: u64,
    /// Operation and operands
    pub opcode: Opcode,
}

impl Instruction {
    /// Address of the instruction that follows in memory.
    #[must_use]
    pub fn fallthrough(&self) -> u64 {
        self.address.wrapping_add(self.length)
    }
}

fn displacement(offset: i32) -> String {
    if offset < 0 {
        format!("-{:#x}", offset.unsigned_abs())
    } else {
        format!("+{offset:#x}")
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}: ", self.address)?;
        match self.opcode {
            Opcode::Nop | Opcode::Ret | Opcode::Halt => write!(f, "{}", self.opcode.mnemonic()),
            Opcode::Mov { dst, src } => write!(f, "mov {dst}, {src}"),
            Opcode::Alu { op, dst, lhs, rhs } => write!(f, "{op} {dst}, {lhs}, {rhs}"),
            Opcode::Not { dst, src } => write!(f, "not {dst}, {src}"),
            Opcode::Neg { dst, src } => write!(f, "neg {dst}, {src}"),
            Opcode::SetCond {
                cond,
                dst,
                lhs,
                rhs,
            } => write!(f, "set.{cond} {dst}, {lhs}, {rhs}"),
            Opcode::Load {
                dst,
                base,
                offset,
                size,
            } => write!(f, "ld{size} {dst}, [{base}{}]", displacement(offset)),
            Opcode::Store {
                src,
                base,
                offset,
                size,
            } => write!(f, "st{size} [{base}{}], {src}", displacement(offset)),
            Opcode::Jump { target } => write!(f, "jmp {target}"),
            Opcode::Branch {
                cond,
                lhs,
                rhs,
                target,
            } => write!(f, "br.{cond} {lhs}, {rhs}, {target:#x}"),
            Opcode::Call { target } => write!(f, "call {target}"),
        }
    }
}
