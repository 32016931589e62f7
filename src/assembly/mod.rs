//! Instruction set, binary encoding and assembler.
//!
//! The engine executes a fixed register machine. This module defines its instructions
//! ([`Opcode`], [`Instruction`]), the byte encoding consumed through
//! [`crate::image::BinaryImage::decode`], and a label-aware [`ProgramAssembler`] for
//! building test and benchmark programs.
//!
//! # Key Components
//!
//! - [`Opcode`] - Closed set of instruction effects
//! - [`Register`], [`Operand`], [`AluOp`], [`CmpOp`] - Operand vocabulary
//! - [`encode`] / [`decode`] - Byte encoding
//! - [`DecodeError`] - Decoding failures
//! - [`ProgramAssembler`] - Fluent assembler with labels

mod assembler;
mod codec;
mod instruction;

pub use assembler::ProgramAssembler;
pub use codec::{decode, encode, encoded_len, DecodeError, MAX_INSTRUCTION_LEN};
pub use instruction::{
    AluOp, CmpOp, Instruction, Opcode, Operand, Register, ACCESS_SIZES,
};
