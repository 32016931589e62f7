//! Fluent assembler producing [`Program`] images.
//!
//! [`ProgramAssembler`] emits instructions sequentially from a base address. Control
//! transfers name their destination by label; labels may be defined before or after
//! they are referenced and are resolved when the program is finished. Every label also
//! becomes a symbol of the resulting program, so callers can look up find and avoid
//! addresses by name.
//!
//! # Examples
//!
//! ```rust
//! use symscope::assembly::{CmpOp, ProgramAssembler, Register};
//! use symscope::image::BinaryImage;
//!
//! let mut asm = ProgramAssembler::new(0x1000);
//! asm.branch(CmpOp::Eq, Register::R0, 0x41_u64, "success")
//!     .mov(Register::R0, 0_u64)
//!     .halt();
//! asm.label("success")?.mov(Register::R0, 1_u64).halt();
//!
//! let program = asm.finish()?;
//! assert!(program.symbol("success").is_some());
//! # Ok::<(), symscope::Error>(())
//! ```

use std::collections::HashMap;

use crate::{
    assembly::{
        codec::{encode, encoded_len},
        instruction::{AluOp, CmpOp, Opcode, Operand, Register, ACCESS_SIZES},
        DecodeError,
    },
    image::Program,
    Error, Result,
};

enum Item {
    Instruction {
        opcode: Opcode,
        label: Option<String>,
    },
    Raw(Vec<u8>),
}

/// Sequential assembler with forward and backward label references.
pub struct ProgramAssembler {
    base: u64,
    position: u64,
    items: Vec<(u64, Item)>,
    labels: HashMap<String, u64>,
    data: Vec<(u64, Vec<u8>)>,
    entry: Option<String>,
}

impl ProgramAssembler {
    /// Creates an assembler that places the first instruction at `base`.
    #[must_use]
    pub fn new(base: u64) -> Self {
        ProgramAssembler {
            base,
            position: base,
            items: Vec::new(),
            labels: HashMap::new(),
            data: Vec::new(),
            entry: None,
        }
    }

    /// Address the next instruction will be placed at.
    #[must_use]
    pub fn current_address(&self) -> u64 {
        self.position
    }

    /// Address of an already defined label.
    #[must_use]
    pub fn label_address(&self, name: &str) -> Option<u64> {
        self.labels.get(name).copied()
    }

    /// Binds `name` to the current address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateLabel`] if `name` is already bound.
    pub fn label(&mut self, name: &str) -> Result<&mut Self> {
        if self.labels.contains_key(name) {
            return Err(Error::DuplicateLabel(name.to_string()));
        }
        self.labels.insert(name.to_string(), self.position);
        Ok(self)
    }

    /// Starts execution at `label` instead of the base address.
    pub fn entry(&mut self, label: &str) -> &mut Self {
        self.entry = Some(label.to_string());
        self
    }

    /// Maps a data region at `base` in the finished program.
    pub fn data(&mut self, base: u64, bytes: impl Into<Vec<u8>>) -> &mut Self {
        self.data.push((base, bytes.into()));
        self
    }

    fn emit(&mut self, opcode: Opcode, label: Option<&str>) -> &mut Self {
        let address = self.position;
        self.position += encoded_len(&opcode) as u64;
        self.items.push((
            address,
            Item::Instruction {
                opcode,
                label: label.map(str::to_string),
            },
        ));
        self
    }

    /// Emits raw bytes, typically to plant invalid encodings.
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        let address = self.position;
        self.position += bytes.len() as u64;
        self.items.push((address, Item::Raw(bytes.to_vec())));
        self
    }

    /// `nop`
    pub fn nop(&mut self) -> &mut Self {
        self.emit(Opcode::Nop, None)
    }

    /// `dst = src`
    pub fn mov(&mut self, dst: Register, src: impl Into<Operand>) -> &mut Self {
        self.emit(
            Opcode::Mov {
                dst,
                src: src.into(),
            },
            None,
        )
    }

    /// `dst = lhs <op> rhs`
    pub fn alu(
        &mut self,
        op: AluOp,
        dst: Register,
        lhs: Register,
        rhs: impl Into<Operand>,
    ) -> &mut Self {
        self.emit(
            Opcode::Alu {
                op,
                dst,
                lhs,
                rhs: rhs.into(),
            },
            None,
        )
    }

    /// `dst = !src`
    pub fn not(&mut self, dst: Register, src: Register) -> &mut Self {
        self.emit(Opcode::Not { dst, src }, None)
    }

    /// `dst = -src`
    pub fn neg(&mut self, dst: Register, src: Register) -> &mut Self {
        self.emit(Opcode::Neg { dst, src }, None)
    }

    /// `dst = lhs <cond> rhs`
    pub fn set(
        &mut self,
        cond: CmpOp,
        dst: Register,
        lhs: Register,
        rhs: impl Into<Operand>,
    ) -> &mut Self {
        self.emit(
            Opcode::SetCond {
                cond,
                dst,
                lhs,
                rhs: rhs.into(),
            },
            None,
        )
    }

    /// Loads `size` bytes from `base + offset` into `dst`.
    pub fn load(
        &mut self,
        dst: Register,
        base: impl Into<Operand>,
        offset: i32,
        size: u8,
    ) -> &mut Self {
        self.emit(
            Opcode::Load {
                dst,
                base: base.into(),
                offset,
                size,
            },
            None,
        )
    }

    /// Stores the low `size` bytes of `src` to `base + offset`.
    pub fn store(
        &mut self,
        src: impl Into<Operand>,
        base: impl Into<Operand>,
        offset: i32,
        size: u8,
    ) -> &mut Self {
        self.emit(
            Opcode::Store {
                src: src.into(),
                base: base.into(),
                offset,
                size,
            },
            None,
        )
    }

    /// Jumps to `label`.
    pub fn jump(&mut self, label: &str) -> &mut Self {
        self.emit(
            Opcode::Jump {
                target: Operand::Imm(0),
            },
            Some(label),
        )
    }

    /// Jumps to a computed address.
    pub fn jump_to(&mut self, target: impl Into<Operand>) -> &mut Self {
        self.emit(
            Opcode::Jump {
                target: target.into(),
            },
            None,
        )
    }

    /// Branches to `label` when `lhs <cond> rhs`.
    pub fn branch(
        &mut self,
        cond: CmpOp,
        lhs: Register,
        rhs: impl Into<Operand>,
        label: &str,
    ) -> &mut Self {
        self.emit(
            Opcode::Branch {
                cond,
                lhs,
                rhs: rhs.into(),
                target: 0,
            },
            Some(label),
        )
    }

    /// Calls the subroutine at `label`.
    pub fn call(&mut self, label: &str) -> &mut Self {
        self.emit(
            Opcode::Call {
                target: Operand::Imm(0),
            },
            Some(label),
        )
    }

    /// Calls a computed address.
    pub fn call_to(&mut self, target: impl Into<Operand>) -> &mut Self {
        self.emit(
            Opcode::Call {
                target: target.into(),
            },
            None,
        )
    }

    /// `ret`
    pub fn ret(&mut self) -> &mut Self {
        self.emit(Opcode::Ret, None)
    }

    /// `halt`
    pub fn halt(&mut self) -> &mut Self {
        self.emit(Opcode::Halt, None)
    }

    fn resolve(&self, name: &str) -> Result<u64> {
        self.labels
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownLabel(name.to_string()))
    }

    /// Resolves all labels and builds the program image.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownLabel`] for references to undefined labels,
    /// [`Error::Decode`] for invalid access sizes, and [`Error::InvalidConfig`] when no
    /// code was emitted or a data region overlaps the code.
    pub fn finish(self) -> Result<Program> {
        let mut code = Vec::with_capacity(usize::try_from(self.position - self.base).unwrap_or(0));

        for (address, item) in &self.items {
            match item {
                Item::Raw(bytes) => code.extend_from_slice(bytes),
                Item::Instruction { opcode, label } => {
                    let mut opcode = *opcode;
                    if let Some(name) = label {
                        let resolved = self.resolve(name)?;
                        match &mut opcode {
                            Opcode::Jump { target } | Opcode::Call { target } => {
                                *target = Operand::Imm(resolved);
                            }
                            Opcode::Branch { target, .. } => *target = resolved,
                            _ => {}
                        }
                    }
                    if let Opcode::Load { size, .. } | Opcode::Store { size, .. } = opcode {
                        if !ACCESS_SIZES.contains(&size) {
                            return Err(DecodeError::InvalidSize {
                                address: *address,
                                size,
                            }
                            .into());
                        }
                    }
                    encode(&opcode, &mut code);
                }
            }
        }

        let entry = match &self.entry {
            Some(name) => self.resolve(name)?,
            None => self.base,
        };

        let mut program = Program::new(entry).with_code(self.base, code)?;
        for (base, bytes) in self.data {
            program = program.with_data(base, bytes)?;
        }
        for (name, address) in self.labels {
            program.add_symbol(name, address);
        }
        Ok(program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::BinaryImage;

    #[test]
    fn test_forward_and_backward_labels() -> Result<()> {
        let mut asm = ProgramAssembler::new(0x100);
        asm.label("top")?
            .branch(CmpOp::Ne, Register::R0, 0_u64, "done")
            .jump("top");
        asm.label("done")?.halt();
        let program = asm.finish()?;

        let branch = program.decode(0x100)?;
        let done = program.symbol("done").unwrap_or_default();
        assert!(matches!(branch.opcode, Opcode::Branch { target, .. } if target == done));

        let jump = program.decode(branch.fallthrough())?;
        assert_eq!(
            jump.opcode,
            Opcode::Jump {
                target: Operand::Imm(0x100)
            }
        );
        assert_eq!(program.decode(done)?.opcode, Opcode::Halt);
        Ok(())
    }

    #[test]
    fn test_label_errors() -> Result<()> {
        let mut asm = ProgramAssembler::new(0);
        asm.label("a")?;
        assert!(matches!(asm.label("a"), Err(Error::DuplicateLabel(_))));

        let mut asm = ProgramAssembler::new(0);
        asm.call("missing").halt();
        assert!(matches!(asm.finish(), Err(Error::UnknownLabel(name)) if name == "missing"));
        Ok(())
    }

    #[test]
    fn test_invalid_size_rejected() {
        let mut asm = ProgramAssembler::new(0);
        asm.load(Register::R0, 0x10_u64, 0, 3).halt();
        assert!(matches!(
            asm.finish(),
            Err(Error::Decode(DecodeError::InvalidSize { size: 3, .. }))
        ));
    }

    #[test]
    fn test_entry_and_data() -> Result<()> {
        let mut asm = ProgramAssembler::new(0x10);
        asm.halt();
        asm.label("main")?.nop().halt();
        asm.entry("main").data(0x80, b"hi".as_slice());
        let program = asm.finish()?;

        assert_eq!(program.entry(), 0x11);
        assert_eq!(program.read_byte(0x81), Some(b'i'));
        assert!(!program.is_code(0x80));
        Ok(())
    }

    #[test]
    fn test_raw_bytes() -> Result<()> {
        let mut asm = ProgramAssembler::new(0);
        asm.raw(&[0xEE]).halt();
        let program = asm.finish()?;
        assert!(matches!(
            program.decode(0),
            Err(DecodeError::UnknownOpcode { byte: 0xEE, .. })
        ));
        assert_eq!(program.decode(1)?.opcode, Opcode::Halt);
        Ok(())
    }
}
