//! Frame runtime that executes the opcode stream

use std::{collections::HashSet, time::Instant};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::{bytecode::Opcode, options::RuntimeOptions};

/// Name of the frame every runtime starts with
pub const ROOT_FRAME: &str = "__root__";

/// Reason an instruction failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    #[error("stack holds {found} values, {needed} needed")]
    StackUnderflow { needed: usize, found: usize },
    #[error("immediate at {pc} runs past the end of the stream")]
    Truncated { pc: usize },
    #[error("4-byte write at address {address} exceeds memory of {size} bytes")]
    OutOfBounds { address: u32, size: usize },
    #[error("byte {0:#04x} is not an executable opcode")]
    UnknownOpcode(u8),
}

/// Index of a frame in the runtime's frame table
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct FrameId(usize);

/// Saved program counter and stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub pc: usize,
    pub stack: Vec<u32>,
}

/// Inclusive bounds the program counter must stay within
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionRange {
    pub start: u32,
    pub end: u32,
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub name: String,
    /// Unique, increasing from 1
    pub id: u64,
    /// Creation time in microseconds since the Unix epoch
    pub timestamp: i64,
    pub checkpoint: Option<Checkpoint>,
    pub can_recover: bool,
    pub range: Option<ExecutionRange>,
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// Program counter ran off the end of the stream
    Completed,
    /// Program counter left the current frame's execution range
    OutOfRange,
    /// An instruction failed and could not be recovered
    Failed { pc: usize, fault: Fault },
}

impl Status {
    pub fn is_success(&self) -> bool {
        !matches!(self, Status::Failed { .. })
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }
}

/// Result of one recovery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Checkpoint restored, execution resumes at `pc`
    Restored { pc: usize },
    /// The current frame has no usable checkpoint
    Unavailable,
    /// This checkpoint was already used for a failure at the same place
    NoProgress,
    /// The per-run recovery budget is spent
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Fault,
    Heal,
}

/// Virtual machine representation
pub struct Runtime {
    options: RuntimeOptions,
    bytecode: Vec<u8>,
    pc: usize,

    stack: Vec<u32>,
    memory: Vec<u8>,

    frames: Vec<Frame>,        // every frame ever created
    frame_stack: Vec<FrameId>, // live frames, root at the bottom
    current: FrameId,
    next_frame_id: u64,

    recoveries: u32,
    heals: u32,
    recovered_from: HashSet<(usize, usize)>, // (checkpoint pc, failure pc)
    error_log: Vec<String>,
    events: Vec<String>,

    instruction_count: u64,
    execution_time_us: u64,
    uptime_percentage: f32,
}

impl Runtime {
    pub fn new(options: RuntimeOptions) -> Self {
        let memory = vec![0; options.memory_size];
        let mut runtime = Runtime {
            options,
            bytecode: Vec::new(),
            pc: 0,
            stack: Vec::new(),
            memory,
            frames: Vec::new(),
            frame_stack: Vec::new(),
            current: FrameId(0),
            next_frame_id: 1,
            recoveries: 0,
            heals: 0,
            recovered_from: HashSet::new(),
            error_log: Vec::new(),
            events: Vec::new(),
            instruction_count: 0,
            execution_time_us: 0,
            uptime_percentage: 100.0,
        };
        runtime.current = runtime.create_frame(ROOT_FRAME);
        runtime
    }

    pub fn load(&mut self, bytecode: Vec<u8>) {
        self.log_event(format!("Bytecode loaded: {} bytes", bytecode.len()));
        self.bytecode = bytecode;
        self.pc = 0;
        self.recoveries = 0;
        self.heals = 0;
        self.recovered_from.clear();
    }

    /// Run until the stream ends, the execution range is left, or an instruction
    /// fails for good.
    ///
    /// A failed instruction is retried from the current frame's checkpoint when
    /// self-healing is on. Each (checkpoint, failure site) pair is recovered at
    /// most once and the total number of recoveries is capped, so a failure that
    /// keeps coming back ends the run instead of looping.
    pub fn execute(&mut self) -> Status {
        let started = Instant::now();
        self.log_event("Execution started");

        let status = loop {
            if self.pc >= self.bytecode.len() {
                self.log_event("Execution completed successfully");
                break Status::Completed;
            }

            let at = self.pc;
            match self.step() {
                Ok(()) => {
                    self.instruction_count += 1;
                    if !self.in_range(self.pc) {
                        self.log_event("Execution out of range");
                        break Status::OutOfRange;
                    }
                }
                Err(fault) => {
                    self.handle_execution_error(&fault);
                    if self.options.self_healing {
                        if let Recovery::Restored { .. } = self.recover_from(at, Trigger::Fault) {
                            self.log_event("Self-healing recovery successful");
                            continue;
                        }
                    }
                    warn!(target: "framevm::vm", pc = at, %fault, "execution failed");
                    break Status::Failed { pc: at, fault };
                }
            }
        };

        self.execution_time_us += started.elapsed().as_micros() as u64;
        status
    }

    /// Fetch, decode and execute one instruction
    pub fn step(&mut self) -> Result<(), Fault> {
        let byte = *self
            .bytecode
            .get(self.pc)
            .ok_or(Fault::Truncated { pc: self.pc })?;
        self.pc += 1;

        let opcode = Opcode::from_u8(byte).ok_or(Fault::UnknownOpcode(byte))?;
        trace!(target: "framevm::vm", pc = self.pc - 1, op = opcode.mnemonic(), "step");

        match opcode {
            Opcode::Nop => {}
            Opcode::Load => {
                let value = self.read_immediate()?;
                self.stack.push(value);
            }
            Opcode::Store => {
                let value = self.pop()?;
                let address = self.read_immediate()?;
                self.write_word(address, value)?;
            }
            Opcode::Add => self.binary_op(u32::wrapping_add)?,
            Opcode::Sub => self.binary_op(u32::wrapping_sub)?,
            Opcode::Mul => self.binary_op(u32::wrapping_mul)?,
            Opcode::Call => {
                let target = self.read_immediate()?;
                self.stack.push(self.pc as u32);
                self.pc = target as usize;
            }
            Opcode::Ret => self.pc = self.pop()? as usize,
            Opcode::Jmp => self.pc = self.read_immediate()? as usize,
            Opcode::Push => self.require(1)?,
            Opcode::Pop => {
                self.pop()?;
            }
            Opcode::FrameCreate => {
                self.create_checkpoint();
                self.log_event("Frame created");
            }
            Opcode::FrameExit => self.log_event("Frame exited"),
            Opcode::HelpLearn => self.log_event("HELP learning invoked"),
            Opcode::HelpHeal => {
                self.log_event("HELP self-healing triggered");
                let _ = self.recover_from(self.pc - 1, Trigger::Heal);
            }
            Opcode::OverlayExpand => self.log_event("Overlay expanded"),
            _ => return Err(Fault::UnknownOpcode(byte)),
        }

        Ok(())
    }

    /// Push a new frame and return its id. The current frame does not change.
    pub fn create_frame(&mut self, name: &str) -> FrameId {
        let id = FrameId(self.frames.len());
        self.frames.push(Frame {
            name: name.to_string(),
            id: self.next_frame_id,
            timestamp: chrono::Utc::now().timestamp_micros(),
            checkpoint: None,
            can_recover: true,
            range: None,
        });
        self.next_frame_id += 1;
        self.frame_stack.push(id);
        id
    }

    pub fn enter_frame(&mut self, id: FrameId) {
        self.current = id;
        self.log_event(format!("Entered frame: {}", self.frames[id.0].name));
    }

    /// Pop the top frame and make the new top current. The root frame stays.
    pub fn exit_frame(&mut self) {
        if self.frame_stack.len() > 1 {
            self.frame_stack.pop();
        }
        if let Some(&top) = self.frame_stack.last() {
            self.current = top;
        }
        self.log_event("Exited frame");
    }

    pub fn current_frame(&self) -> &Frame {
        &self.frames[self.current.0]
    }

    pub fn frame(&self, id: FrameId) -> &Frame {
        &self.frames[id.0]
    }

    pub fn frame_depth(&self) -> usize {
        self.frame_stack.len()
    }

    pub fn set_recoverable(&mut self, can_recover: bool) {
        self.frames[self.current.0].can_recover = can_recover;
    }

    /// Snapshot program counter and stack into the current frame
    pub fn save_state(&mut self) {
        let checkpoint = Checkpoint {
            pc: self.pc,
            stack: self.stack.clone(),
        };
        self.frames[self.current.0].checkpoint = Some(checkpoint);
    }

    /// Bring back the current frame's snapshot, if there is one
    pub fn restore_state(&mut self) {
        if let Some(checkpoint) = &self.frames[self.current.0].checkpoint {
            self.pc = checkpoint.pc;
            self.stack = checkpoint.stack.clone();
            self.log_event("State restored from checkpoint");
        }
    }

    pub fn create_checkpoint(&mut self) {
        self.save_state();
        self.log_event("Checkpoint created");
    }

    /// Try to recover at the current program counter. Counts against the
    /// `max_recoveries` budget.
    pub fn attempt_recovery(&mut self) -> Recovery {
        self.recover_from(self.pc, Trigger::Fault)
    }

    /// Recover from a failure at `at`.
    ///
    /// The error log is cleared whatever the outcome. Only fault recoveries are
    /// budgeted; `HELP_HEAL` restores are counted separately and bounded by the
    /// (checkpoint, site) set alone.
    fn recover_from(&mut self, at: usize, trigger: Trigger) -> Recovery {
        self.log_event("Attempting self-healing recovery");
        self.error_log.clear();

        if trigger == Trigger::Fault && self.recoveries >= self.options.max_recoveries {
            return Recovery::Exhausted;
        }

        let frame = &self.frames[self.current.0];
        let checkpoint_pc = match &frame.checkpoint {
            Some(checkpoint) if frame.can_recover => checkpoint.pc,
            _ => return Recovery::Unavailable,
        };

        if !self.recovered_from.insert((checkpoint_pc, at)) {
            debug!(target: "framevm::vm", checkpoint_pc, at, "recovery would repeat itself");
            return Recovery::NoProgress;
        }

        self.restore_state();
        match trigger {
            Trigger::Fault => self.recoveries += 1,
            Trigger::Heal => self.heals += 1,
        }
        Recovery::Restored { pc: checkpoint_pc }
    }

    pub fn set_execution_range(&mut self, start: u32, end: u32) {
        self.frames[self.current.0].range = Some(ExecutionRange { start, end });
    }

    pub fn in_range(&self, position: usize) -> bool {
        match self.current_frame().range {
            Some(range) => (range.start as usize..=range.end as usize).contains(&position),
            None => true,
        }
    }

    /// Checkpoint restores after faults in this run
    pub fn recoveries(&self) -> u32 {
        self.recoveries
    }

    /// Checkpoint restores done by `HELP_HEAL` in this run
    pub fn heals(&self) -> u32 {
        self.heals
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn stack(&self) -> &[u32] {
        &self.stack
    }

    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    /// Forensic ledger of runtime events
    pub fn events(&self) -> &[String] {
        &self.events
    }

    pub fn instruction_count(&self) -> u64 {
        self.instruction_count
    }

    pub fn execution_time_us(&self) -> u64 {
        self.execution_time_us
    }

    pub fn uptime_percentage(&self) -> f32 {
        self.uptime_percentage
    }

    fn handle_execution_error(&mut self, fault: &Fault) {
        self.error_log.push(fault.to_string());

        let error_rate = self.error_log.len() as f32 / (self.instruction_count + 1) as f32;
        self.uptime_percentage = (1.0 - error_rate) * 100.0;
    }

    fn log_event(&mut self, event: impl Into<String>) {
        let event = event.into();
        debug!(target: "framevm::vm", "{}", event);
        self.events.push(event);
    }

    /// Read a 4-byte big-endian immediate and move past it
    fn read_immediate(&mut self) -> Result<u32, Fault> {
        let bytes = self
            .bytecode
            .get(self.pc..self.pc + 4)
            .ok_or(Fault::Truncated { pc: self.pc })?;
        let value = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        self.pc += 4;
        Ok(value)
    }

    fn write_word(&mut self, address: u32, value: u32) -> Result<(), Fault> {
        let start = address as usize;
        let size = self.memory.len();
        let cell = start
            .checked_add(4)
            .and_then(|end| self.memory.get_mut(start..end))
            .ok_or(Fault::OutOfBounds { address, size })?;
        cell.copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    fn binary_op(&mut self, op: fn(u32, u32) -> u32) -> Result<(), Fault> {
        self.require(2)?;
        let rhs = self.pop()?;
        let lhs = self.pop()?;
        self.stack.push(op(lhs, rhs));
        Ok(())
    }

    fn require(&self, needed: usize) -> Result<(), Fault> {
        if self.stack.len() < needed {
            Err(Fault::StackUnderflow {
                needed,
                found: self.stack.len(),
            })
        } else {
            Ok(())
        }
    }

    fn pop(&mut self) -> Result<u32, Fault> {
        self.require(1)?;
        self.stack.pop().ok_or(Fault::StackUnderflow { needed: 1, found: 0 })
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Runtime::new(RuntimeOptions::default())
    }
}
