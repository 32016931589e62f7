//! Binary encoding of the instruction set.
//!
//! Instructions are variable length. The first byte selects the opcode, followed by
//! fixed fields per opcode. Operands carry a one byte tag (`0` register, `1` immediate)
//! followed by a register index or a little-endian `u64`. Displacements are
//! little-endian `i32`, branch targets little-endian `u64`.
//!
//! | Byte | Opcode | Layout after the opcode byte |
//! |------|--------|------------------------------|
//! | `0x00` | `nop` | |
//! | `0x01` | `mov` | dst, operand |
//! | `0x02` | `alu` | op, dst, lhs, operand |
//! | `0x03` | `not` | dst, src |
//! | `0x04` | `neg` | dst, src |
//! | `0x05` | `set` | cmp, dst, lhs, operand |
//! | `0x06` | `ld` | size, dst, base operand, i32 |
//! | `0x07` | `st` | size, src operand, base operand, i32 |
//! | `0x08` | `jmp` | operand |
//! | `0x09` | `br` | cmp, lhs, operand, u64 target |
//! | `0x0A` | `call` | operand |
//! | `0x0B` | `ret` | |
//! | `0x0C` | `halt` | |

use thiserror::Error;

use crate::{
    assembly::instruction::{AluOp, CmpOp, Instruction, Opcode, Operand, Register, ACCESS_SIZES},
    image::{io::write_le, ByteIO, Parser},
};

const OP_NOP: u8 = 0x00;
const OP_MOV: u8 = 0x01;
const OP_ALU: u8 = 0x02;
const OP_NOT: u8 = 0x03;
const OP_NEG: u8 = 0x04;
const OP_SET: u8 = 0x05;
const OP_LOAD: u8 = 0x06;
const OP_STORE: u8 = 0x07;
const OP_JUMP: u8 = 0x08;
const OP_BRANCH: u8 = 0x09;
const OP_CALL: u8 = 0x0A;
const OP_RET: u8 = 0x0B;
const OP_HALT: u8 = 0x0C;

const TAG_REG: u8 = 0;
const TAG_IMM: u8 = 1;

/// Longest possible encoding, a `st` with two immediate operands.
pub const MAX_INSTRUCTION_LEN: usize = 1 + 1 + 9 + 9 + 4;

/// Failure to turn bytes at an address into an instruction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The address is not inside any code region of the image.
    #[error("Address {address:#x} is outside any code region")]
    OutsideCode {
        /// The fetch address
        address: u64,
    },

    /// The opcode byte does not name an instruction.
    #[error("Unknown opcode {byte:#04x} at {address:#x}")]
    UnknownOpcode {
        /// Instruction address
        address: u64,
        /// The offending byte
        byte: u8,
    },

    /// A register field is out of range.
    #[error("Invalid register index {byte} at {address:#x}")]
    InvalidRegister {
        /// Instruction address
        address: u64,
        /// The offending byte
        byte: u8,
    },

    /// An ALU or comparison operator field is out of range.
    #[error("Invalid operator {byte} at {address:#x}")]
    InvalidOperator {
        /// Instruction address
        address: u64,
        /// The offending byte
        byte: u8,
    },

    /// An operand tag is neither register nor immediate.
    #[error("Invalid operand tag {tag} at {address:#x}")]
    InvalidOperand {
        /// Instruction address
        address: u64,
        /// The offending tag
        tag: u8,
    },

    /// A memory access size other than 1, 2, 4 or 8.
    #[error("Invalid access size {size} at {address:#x}")]
    InvalidSize {
        /// Instruction address
        address: u64,
        /// The offending size
        size: u8,
    },

    /// The instruction runs past the end of its code region.
    #[error("Truncated instruction at {address:#x}")]
    Truncated {
        /// Instruction address
        address: u64,
    },
}

impl DecodeError {
    /// Address of the instruction that failed to decode.
    #[must_use]
    pub fn address(&self) -> u64 {
        match self {
            DecodeError::OutsideCode { address }
            | DecodeError::UnknownOpcode { address, .. }
            | DecodeError::InvalidRegister { address, .. }
            | DecodeError::InvalidOperator { address, .. }
            | DecodeError::InvalidOperand { address, .. }
            | DecodeError::InvalidSize { address, .. }
            | DecodeError::Truncated { address } => *address,
        }
    }
}

fn encode_operand(buffer: &mut Vec<u8>, operand: Operand) {
    match operand {
        Operand::Reg(reg) => {
            buffer.push(TAG_REG);
            buffer.push(reg as u8);
        }
        Operand::Imm(value) => {
            buffer.push(TAG_IMM);
            write_le(buffer, value);
        }
    }
}

/// Appends the encoding of `opcode` to `buffer`.
pub fn encode(opcode: &Opcode, buffer: &mut Vec<u8>) {
    match *opcode {
        Opcode::Nop => buffer.push(OP_NOP),
        Opcode::Mov { dst, src } => {
            buffer.extend_from_slice(&[OP_MOV, dst as u8]);
            encode_operand(buffer, src);
        }
        Opcode::Alu { op, dst, lhs, rhs } => {
            buffer.extend_from_slice(&[OP_ALU, op as u8, dst as u8, lhs as u8]);
            encode_operand(buffer, rhs);
        }
        Opcode::Not { dst, src } => buffer.extend_from_slice(&[OP_NOT, dst as u8, src as u8]),
        Opcode::Neg { dst, src } => buffer.extend_from_slice(&[OP_NEG, dst as u8, src as u8]),
        Opcode::SetCond {
            cond,
            dst,
            lhs,
            rhs,
        } => {
            buffer.extend_from_slice(&[OP_SET, cond as u8, dst as u8, lhs as u8]);
            encode_operand(buffer, rhs);
        }
        Opcode::Load {
            dst,
            base,
            offset,
            size,
        } => {
            buffer.extend_from_slice(&[OP_LOAD, size, dst as u8]);
            encode_operand(buffer, base);
            write_le(buffer, offset);
        }
        Opcode::Store {
            src,
            base,
            offset,
            size,
        } => {
            buffer.extend_from_slice(&[OP_STORE, size]);
            encode_operand(buffer, src);
            encode_operand(buffer, base);
            write_le(buffer, offset);
        }
        Opcode::Jump { target } => {
            buffer.push(OP_JUMP);
            encode_operand(buffer, target);
        }
        Opcode::Branch {
            cond,
            lhs,
            rhs,
            target,
        } => {
            buffer.extend_from_slice(&[OP_BRANCH, cond as u8, lhs as u8]);
            encode_operand(buffer, rhs);
            write_le(buffer, target);
        }
        Opcode::Call { target } => {
            buffer.push(OP_CALL);
            encode_operand(buffer, target);
        }
        Opcode::Ret => buffer.push(OP_RET),
        Opcode::Halt => buffer.push(OP_HALT),
    }
}

/// Number of bytes `opcode` occupies once encoded.
///
/// The length only depends on the operand kinds, never on their values.
#[must_use]
pub fn encoded_len(opcode: &Opcode) -> usize {
    let mut buffer = Vec::with_capacity(MAX_INSTRUCTION_LEN);
    encode(opcode, &mut buffer);
    buffer.len()
}

struct Reader<'a> {
    parser: Parser<'a>,
    address: u64,
}

impl Reader<'_> {
    fn read<T: ByteIO>(&mut self) -> Result<T, DecodeError> {
        self.parser
            .read_le::<T>()
            .map_err(|_| DecodeError::Truncated {
                address: self.address,
            })
    }

    fn register(&mut self) -> Result<Register, DecodeError> {
        let byte = self.read::<u8>()?;
        Register::from_repr(byte).ok_or(DecodeError::InvalidRegister {
            address: self.address,
            byte,
        })
    }

    fn alu_op(&mut self) -> Result<AluOp, DecodeError> {
        let byte = self.read::<u8>()?;
        AluOp::from_repr(byte).ok_or(DecodeError::InvalidOperator {
            address: self.address,
            byte,
        })
    }

    fn cmp_op(&mut self) -> Result<CmpOp, DecodeError> {
        let byte = self.read::<u8>()?;
        CmpOp::from_repr(byte).ok_or(DecodeError::InvalidOperator {
            address: self.address,
            byte,
        })
    }

    fn operand(&mut self) -> Result<Operand, DecodeError> {
        match self.read::<u8>()? {
            TAG_REG => Ok(Operand::Reg(self.register()?)),
            TAG_IMM => Ok(Operand::Imm(self.read::<u64>()?)),
            tag => Err(DecodeError::InvalidOperand {
                address: self.address,
                tag,
            }),
        }
    }

    fn size(&mut self) -> Result<u8, DecodeError> {
        let size = self.read::<u8>()?;
        if ACCESS_SIZES.contains(&size) {
            Ok(size)
        } else {
            Err(DecodeError::InvalidSize {
                address: self.address,
                size,
            })
        }
    }
}

/// Decodes one instruction from the start of `bytes`, which live at `address`.
///
/// # Errors
///
/// Returns a [`DecodeError`] describing the first malformed field.
pub fn decode(bytes: &[u8], address: u64) -> Result<Instruction, DecodeError> {
    let mut reader = Reader {
        parser: Parser::new(bytes),
        address,
    };

    let byte = reader.read::<u8>()?;
    let opcode = match byte {
        OP_NOP => Opcode::Nop,
        OP_MOV => Opcode::Mov {
            dst: reader.register()?,
            src: reader.operand()?,
        },
        OP_ALU => Opcode::Alu {
            op: reader.alu_op()?,
            dst: reader.register()?,
            lhs: reader.register()?,
            rhs: reader.operand()?,
        },
        OP_NOT => Opcode::Not {
            dst: reader.register()?,
            src: reader.register()?,
        },
        OP_NEG => Opcode::Neg {
            dst: reader.register()?,
            src: reader.register()?,
        },
        OP_SET => Opcode::SetCond {
            cond: reader.cmp_op()?,
            dst: reader.register()?,
            lhs: reader.register()?,
            rhs: reader.operand()?,
        },
        OP_LOAD => {
            let size = reader.size()?;
            Opcode::Load {
                size,
                dst: reader.register()?,
                base: reader.operand()?,
                offset: reader.read::<i32>()?,
            }
        }
        OP_STORE => {
            let size = reader.size()?;
            Opcode::Store {
                size,
                src: reader.operand()?,
                base: reader.operand()?,
                offset: reader.read::<i32>()?,
            }
        }
        OP_JUMP => Opcode::Jump {
            target: reader.operand()?,
        },
        OP_BRANCH => Opcode::Branch {
            cond: reader.cmp_op()?,
            lhs: reader.register()?,
            rhs: reader.operand()?,
            target: reader.read::<u64>()?,
        },
        OP_CALL => Opcode::Call {
            target: reader.operand()?,
        },
        OP_RET => Opcode::Ret,
        OP_HALT => Opcode::Halt,
        byte => return Err(DecodeError::UnknownOpcode { address, byte }),
    };

    Ok(Instruction {
        address,
        length: reader.parser.pos() as u64,
        opcode,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assemble(opcode: Opcode) -> Vec<u8> {
        let mut buffer = Vec::new();
        encode(&opcode, &mut buffer);
        buffer
    }

    #[test]
    fn test_decode_branch_layout() -> Result<(), DecodeError> {
        let bytes = assemble(Opcode::Branch {
            cond: CmpOp::Eq,
            lhs: Register::R1,
            rhs: Operand::Imm(0x41),
            target: 0x1234,
        });
        assert_eq!(bytes.len(), 20);
        assert_eq!(&bytes[..4], &[OP_BRANCH, CmpOp::Eq as u8, 1, TAG_IMM]);

        let insn = decode(&bytes, 0x400)?;
        assert_eq!(insn.length, 20);
        assert_eq!(insn.fallthrough(), 0x414);
        assert!(matches!(
            insn.opcode,
            Opcode::Branch {
                target: 0x1234,
                rhs: Operand::Imm(0x41),
                ..
            }
        ));
        Ok(())
    }

    #[test]
    fn test_decode_store_negative_offset() -> Result<(), DecodeError> {
        let opcode = Opcode::Store {
            src: Operand::Reg(Register::R2),
            base: Operand::Reg(Register::Sp),
            offset: -16,
            size: 8,
        };
        let bytes = assemble(opcode);
        assert_eq!(bytes.len(), encoded_len(&opcode));
        assert_eq!(decode(&bytes, 0)?.opcode, opcode);
        Ok(())
    }

    #[test]
    fn test_decode_trailing_bytes_ignored() -> Result<(), DecodeError> {
        let mut bytes = assemble(Opcode::Ret);
        bytes.extend_from_slice(&[0xFF, 0xFF]);
        let insn = decode(&bytes, 0x10)?;
        assert_eq!(insn.opcode, Opcode::Ret);
        assert_eq!(insn.length, 1);
        Ok(())
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(
            decode(&[0xEE], 0x20),
            Err(DecodeError::UnknownOpcode {
                address: 0x20,
                byte: 0xEE
            })
        );
        assert_eq!(
            decode(&[OP_MOV, 0x0F, TAG_REG, 0], 0),
            Err(DecodeError::InvalidRegister {
                address: 0,
                byte: 0x0F
            })
        );
        assert_eq!(
            decode(&[OP_ALU, 0x40, 0, 0, TAG_REG, 0], 0),
            Err(DecodeError::InvalidOperator {
                address: 0,
                byte: 0x40
            })
        );
        assert_eq!(
            decode(&[OP_JUMP, 7], 0),
            Err(DecodeError::InvalidOperand { address: 0, tag: 7 })
        );
        assert_eq!(
            decode(&[OP_LOAD, 3, 0, TAG_REG, 0, 0, 0, 0, 0], 0),
            Err(DecodeError::InvalidSize {
                address: 0,
                size: 3
            })
        );
        assert_eq!(
            decode(&[OP_JUMP, TAG_IMM, 0x00, 0x10], 0x30),
            Err(DecodeError::Truncated { address: 0x30 })
        );
        assert_eq!(decode(&[], 0x8), Err(DecodeError::Truncated { address: 0x8 }));
    }

    #[test]
    fn test_max_len() {
        let widest = Opcode::Store {
            src: Operand::Imm(u64::MAX),
            base: Operand::Imm(0),
            offset: 0,
            size: 1,
        };
        assert_eq!(encoded_len(&widest), MAX_INSTRUCTION_LEN);
    }
}
