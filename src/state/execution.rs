//! The per-path execution state.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use imbl::{OrdMap, Vector};

use crate::{
    assembly::Register,
    engine::ErrorReason,
    image::BinaryImage,
    solver::Solver,
    state::{
        constraints::ConstraintSet,
        history::History,
        memory::{Memory, UninitializedMemory},
        registers::RegisterFile,
        streams::SymbolicStream,
    },
    symbolic::SymExpr,
    Error, Result,
};

static NEXT_STATE_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_STATE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Snapshot of one execution path: machine context plus path metadata.
///
/// States are value-like. [`ExecutionState::fork`] is O(1): registers, memory,
/// constraints, streams and history are persistent structures that the fork shares
/// with its parent until either side writes.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use symscope::assembly::Register;
/// use symscope::image::Program;
/// use symscope::state::{ExecutionState, UninitializedMemory};
/// use symscope::symbolic::SymExpr;
///
/// let image = Arc::new(Program::new(0x1000).with_code(0x1000, vec![0x0C])?);
/// let mut state = ExecutionState::new(image, UninitializedMemory::Zero);
///
/// let input = state.make_symbolic_register(Register::R0, "input")?;
/// let child = state.fork();
/// state.write_register(Register::R0, SymExpr::word(5));
///
/// assert_eq!(child.read_register(Register::R0), input);
/// assert_eq!(child.parent(), Some(state.id()));
/// # Ok::<(), symscope::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct ExecutionState {
    id: u64,
    parent: Option<u64>,
    ip: u64,
    steps: u64,
    registers: RegisterFile,
    memory: Memory,
    constraints: ConstraintSet,
    streams: OrdMap<u32, SymbolicStream>,
    inputs: Vector<(Arc<str>, SymExpr)>,
    history: History,
}

impl ExecutionState {
    /// Creates the initial state at the image entry point with zeroed registers.
    #[must_use]
    pub fn new(image: Arc<dyn BinaryImage>, uninitialized: UninitializedMemory) -> Self {
        let ip = image.entry();
        ExecutionState {
            id: next_id(),
            parent: None,
            ip,
            steps: 0,
            registers: RegisterFile::new(),
            memory: Memory::new(image, uninitialized),
            constraints: ConstraintSet::new(),
            streams: OrdMap::new(),
            inputs: Vector::new(),
            history: History::new(),
        }
    }

    /// Copy-on-write duplicate with a fresh identifier.
    #[must_use]
    pub fn fork(&self) -> Self {
        let mut child = self.clone();
        child.id = next_id();
        child.parent = Some(self.id);
        child
    }

    /// Unique identifier of this state.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Identifier of the state this one was forked from.
    #[must_use]
    pub fn parent(&self) -> Option<u64> {
        self.parent
    }

    /// Address of the next instruction.
    #[must_use]
    pub fn ip(&self) -> u64 {
        self.ip
    }

    /// Moves the instruction pointer.
    pub fn set_ip(&mut self, ip: u64) {
        self.ip = ip;
    }

    /// Builder form of [`ExecutionState::set_ip`].
    #[must_use]
    pub fn with_ip(mut self, ip: u64) -> Self {
        self.ip = ip;
        self
    }

    /// Number of steps taken along this path.
    #[must_use]
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Addresses visited along this path.
    #[must_use]
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Counts one step at the current address and returns its visit count.
    pub(crate) fn record_step(&mut self) -> u32 {
        self.steps += 1;
        self.history.record(self.ip)
    }

    /// Current value of a register.
    #[must_use]
    pub fn read_register(&self, reg: Register) -> SymExpr {
        self.registers.get(reg).clone()
    }

    /// Replaces the value of a register; narrower values are zero-extended.
    pub fn write_register(&mut self, reg: Register, value: SymExpr) {
        self.registers.set(reg, value);
    }

    /// The register file.
    #[must_use]
    pub fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    /// The memory model.
    #[must_use]
    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub(crate) fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    /// Reads `size` bytes at a concrete address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidWidth`] if `size` is not in `1..=8`.
    pub fn read_memory(&self, address: u64, size: u8) -> Result<SymExpr> {
        self.memory.read(address, size)
    }

    /// Writes `value` at a concrete address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidWidth`] if `value` is not a whole number of bytes.
    pub fn write_memory(&mut self, address: u64, value: &SymExpr) -> Result<()> {
        self.memory.write(address, value)
    }

    /// Enumerates the concrete values a symbolic address can take on this path.
    ///
    /// A constant address resolves to itself without consulting the solver. Otherwise
    /// up to `cap` feasible values are enumerated, and for each one a fork constrained to
    /// `address == value` is returned. An empty result means the path itself is
    /// infeasible.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorReason::UnconstrainedMemoryAccess`] when more than `cap` values
    /// are feasible, or the solver reason if enumeration timed out or failed.
    pub fn resolve_address(
        &self,
        address: &SymExpr,
        solver: &Solver,
        cap: usize,
    ) -> std::result::Result<Vec<(ExecutionState, u64)>, ErrorReason> {
        if let Some(value) = address.as_const() {
            return Ok(vec![(self.clone(), value)]);
        }

        let values = match solver.evaluate_many(address, &self.constraints, cap.saturating_add(1)) {
            Ok(values) => values,
            Err(err) => {
                return match ErrorReason::from_solver(&err) {
                    Some(reason) => Err(reason),
                    None => Ok(Vec::new()),
                }
            }
        };
        if values.len() > cap {
            return Err(ErrorReason::UnconstrainedMemoryAccess {
                address: address.to_string(),
                cap,
            });
        }

        let mut out = Vec::with_capacity(values.len());
        for value in values {
            let mut fork = self.fork();
            let pinned = SymExpr::constant(value, address.width())
                .and_then(|c| address.equals(&c))
                .and_then(|eq| fork.add_constraint(eq));
            if let Err(err) = pinned {
                return Err(ErrorReason::ExecutionFault(err.to_string()));
            }
            out.push((fork, value));
        }
        Ok(out)
    }

    /// Reads memory at a possibly symbolic address, forking once per feasible address.
    ///
    /// # Errors
    ///
    /// Same as [`ExecutionState::resolve_address`].
    pub fn read_memory_symbolic(
        &self,
        address: &SymExpr,
        size: u8,
        solver: &Solver,
        cap: usize,
    ) -> std::result::Result<Vec<(ExecutionState, SymExpr)>, ErrorReason> {
        self.resolve_address(address, solver, cap)?
            .into_iter()
            .map(|(state, concrete)| {
                state
                    .read_memory(concrete, size)
                    .map(|value| (state, value))
                    .map_err(|e| ErrorReason::ExecutionFault(e.to_string()))
            })
            .collect()
    }

    /// Writes memory at a possibly symbolic address, forking once per feasible address.
    ///
    /// # Errors
    ///
    /// Same as [`ExecutionState::resolve_address`].
    pub fn write_memory_symbolic(
        &self,
        address: &SymExpr,
        value: &SymExpr,
        solver: &Solver,
        cap: usize,
    ) -> std::result::Result<Vec<ExecutionState>, ErrorReason> {
        self.resolve_address(address, solver, cap)?
            .into_iter()
            .map(|(mut state, concrete)| {
                state
                    .write_memory(concrete, value)
                    .map(|()| state)
                    .map_err(|e| ErrorReason::ExecutionFault(e.to_string()))
            })
            .collect()
    }

    /// The accumulated path constraints.
    #[must_use]
    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    /// Appends a path constraint.
    ///
    /// Satisfiability is not checked here; the caller must confirm it with the solver
    /// before the state is queued.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WidthMismatch`] if `constraint` is not 1 bit wide.
    pub fn add_constraint(&mut self, constraint: SymExpr) -> Result<()> {
        self.constraints.push(constraint)
    }

    pub(crate) fn replace_constraints(&mut self, constraints: ConstraintSet) {
        self.constraints = constraints;
    }

    /// Places a fresh 64-bit variable in a register and records it as an input.
    ///
    /// # Errors
    ///
    /// Never fails for word-sized variables; the `Result` mirrors [`SymExpr::variable`].
    pub fn make_symbolic_register(&mut self, reg: Register, name: &str) -> Result<SymExpr> {
        let var = SymExpr::variable(name, 64)?;
        self.registers.set(reg, var.clone());
        self.record_input(name, var.clone());
        Ok(var)
    }

    /// Fills `len` bytes at `address` with fresh variables `name[0]`, `name[1]`, ...
    ///
    /// # Errors
    ///
    /// Never fails for byte-sized variables; the `Result` mirrors [`SymExpr::variable`].
    pub fn make_symbolic_memory(
        &mut self,
        address: u64,
        len: usize,
        name: &str,
    ) -> Result<Vec<SymExpr>> {
        let mut bytes = Vec::with_capacity(len);
        for i in 0..len {
            let byte_name = super::streams::stream_byte_name(name, i);
            let var = SymExpr::variable(&byte_name, 8)?;
            self.memory
                .write_byte(address.wrapping_add(i as u64), var.clone())?;
            self.record_input(&byte_name, var.clone());
            bytes.push(var);
        }
        Ok(bytes)
    }

    /// Opens file descriptor `fd` with `len` symbolic bytes named `name[i]`.
    ///
    /// # Errors
    ///
    /// Never fails for byte-sized variables; the `Result` mirrors [`SymExpr::variable`].
    pub fn add_symbolic_stream(&mut self, fd: u32, name: &str, len: usize) -> Result<Vec<SymExpr>> {
        let stream = SymbolicStream::symbolic(name, len)?;
        let bytes = stream.bytes();
        for (i, byte) in bytes.iter().enumerate() {
            self.record_input(&super::streams::stream_byte_name(name, i), byte.clone());
        }
        self.streams.insert(fd, stream);
        Ok(bytes)
    }

    /// Opens file descriptor `fd` with known contents.
    pub fn add_concrete_stream(&mut self, fd: u32, data: &[u8]) {
        self.streams.insert(fd, SymbolicStream::concrete(data));
    }

    /// The stream open on `fd`.
    #[must_use]
    pub fn stream(&self, fd: u32) -> Option<&SymbolicStream> {
        self.streams.get(&fd)
    }

    /// All open streams by descriptor.
    pub fn streams(&self) -> impl Iterator<Item = (u32, &SymbolicStream)> {
        self.streams.iter().map(|(fd, s)| (*fd, s))
    }

    /// Consumes up to `count` bytes from the stream on `fd`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Hook`] if no stream is open on `fd`.
    pub fn read_stream(&mut self, fd: u32, count: usize) -> Result<Vec<SymExpr>> {
        match self.streams.get_mut(&fd) {
            Some(stream) => Ok(stream.read(count)),
            None => Err(Error::Hook(format!("no stream open on fd {fd}"))),
        }
    }

    /// Records a named input so callers can extract witnesses later.
    pub fn record_input(&mut self, name: &str, value: SymExpr) {
        self.inputs.push_back((Arc::from(name), value));
    }

    /// Named inputs in creation order.
    pub fn inputs(&self) -> impl Iterator<Item = (&str, &SymExpr)> {
        self.inputs.iter().map(|(n, v)| (n.as_ref(), v))
    }

    /// Looks up a named input.
    #[must_use]
    pub fn input(&self, name: &str) -> Option<&SymExpr> {
        self.inputs
            .iter()
            .find(|(n, _)| n.as_ref() == name)
            .map(|(_, v)| v)
    }

    /// Reads a register that must hold a constant.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SymbolicValue`] if the register is symbolic.
    pub fn concrete_register(&self, reg: Register) -> Result<u64> {
        let value = self.registers.get(reg);
        value.as_const().ok_or_else(|| Error::SymbolicValue {
            what: "register",
            expr: value.to_string(),
        })
    }

    pub(crate) fn merge_parts(
        &mut self,
        steps: u64,
        registers: RegisterFile,
        constraints: ConstraintSet,
        inputs: Vector<(Arc<str>, SymExpr)>,
    ) {
        self.steps = steps;
        self.registers = registers;
        self.constraints = constraints;
        self.inputs = inputs;
    }

    pub(crate) fn inputs_raw(&self) -> &Vector<(Arc<str>, SymExpr)> {
        &self.inputs
    }
}
