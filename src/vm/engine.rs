use crate::vm::memory::Tape;
use crate::vm::op::{Node, Op, Program};
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// How many instruction units run between two wall-clock deadline checks.
const DEADLINE_POLL_INTERVAL: u64 = 1024;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VmError {
    #[error("Instruction budget of {limit} exhausted")]
    BudgetExceeded { limit: u64 },
    #[error("Execution cancelled")]
    Cancelled,
    #[error("Program read input byte {position} but the input is exhausted")]
    InputExhausted { position: usize },
    #[error("Program finished with {remaining} unread input byte(s)")]
    UnusedInput { remaining: usize },
}

impl VmError {
    /// True for the errors produced by time-boxing rather than by the
    /// program's own input handling.
    pub fn is_timeout(&self) -> bool {
        matches!(self, VmError::BudgetExceeded { .. } | VmError::Cancelled)
    }
}

/// What to do when a program terminates without reading all of its input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnusedInputPolicy {
    /// Fail the run with `VmError::UnusedInput`.
    #[default]
    Reject,
    /// Return the output as if the input had been consumed.
    Allow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionLimits {
    /// Maximum instruction units per run. Each leaf instruction and each loop
    /// condition check costs one unit.
    pub max_instructions: u64,
    /// Wall-clock limit applied by `VirtualMachine::execute`.
    pub timeout: Option<Duration>,
    pub unused_input: UnusedInputPolicy,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_instructions: 100_000,
            timeout: None,
            unused_input: UnusedInputPolicy::Reject,
        }
    }
}

/// Cooperative cancellation shared between a caller and any number of runs.
///
/// Runs poll the flag on every instruction unit and the deadline, if any,
/// every `DEADLINE_POLL_INTERVAL` units.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: timeout.map(|t| Instant::now() + t),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.cancelled.load(Ordering::Acquire) {
            return true;
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                self.cancelled.store(true, Ordering::Release);
                return true;
            }
        }
        false
    }

    #[inline]
    fn poll(&self, instructions: u64) -> bool {
        if self.deadline.is_some() && instructions % DEADLINE_POLL_INTERVAL == 0 {
            self.is_cancelled()
        } else {
            self.cancelled.load(Ordering::Relaxed)
        }
    }
}

/// Result of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Execution {
    pub output: Vec<u8>,
    /// Instruction units consumed by the run.
    pub instructions: u64,
}

/// Mutable state of one run. Borrowing the tape keeps the interpreter itself
/// stateless, so any number of runs can proceed in parallel on their own tapes.
struct Run<'t, 'i, 's> {
    tape: &'t mut Tape,
    input: &'i [u8],
    input_pos: usize,
    output: Vec<u8>,
    instructions: u64,
    limit: u64,
    signal: &'s StopSignal,
}

impl Run<'_, '_, '_> {
    #[inline]
    fn tick(&mut self) -> Result<(), VmError> {
        if self.instructions >= self.limit {
            return Err(VmError::BudgetExceeded { limit: self.limit });
        }
        self.instructions += 1;
        if self.signal.poll(self.instructions) {
            return Err(VmError::Cancelled);
        }
        Ok(())
    }

    #[inline]
    fn apply(&mut self, op: Op) -> Result<(), VmError> {
        match op {
            Op::MoveRight => self.tape.move_right(),
            Op::MoveLeft => self.tape.move_left(),
            Op::Increment => self.tape.increment(),
            Op::Decrement => self.tape.decrement(),
            Op::Input => {
                let value = *self
                    .input
                    .get(self.input_pos)
                    .ok_or(VmError::InputExhausted {
                        position: self.input_pos,
                    })?;
                self.input_pos += 1;
                self.tape.set(value);
            }
            Op::Output => self.output.push(self.tape.get()),
        }
        Ok(())
    }
}

/// Tree-walking interpreter with an instruction budget and cooperative
/// cancellation.
#[derive(Debug, Clone, Copy, Default)]
pub struct VirtualMachine {
    limits: ExecutionLimits,
}

impl VirtualMachine {
    pub fn new(limits: ExecutionLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &ExecutionLimits {
        &self.limits
    }

    /// Runs `program` on `tape`, feeding it `input`, under the configured
    /// instruction budget and timeout.
    ///
    /// The tape is used as found; callers reset it between independent runs.
    pub fn execute(
        &self,
        program: &Program,
        tape: &mut Tape,
        input: &[u8],
    ) -> Result<Execution, VmError> {
        let signal = StopSignal::with_timeout(self.limits.timeout);
        self.execute_with_signal(program, tape, input, &signal)
    }

    /// Same as `execute`, but polls an external `StopSignal` instead of
    /// starting a fresh timeout. Several runs may share one signal so that a
    /// single deadline covers all of them.
    pub fn execute_with_signal(
        &self,
        program: &Program,
        tape: &mut Tape,
        input: &[u8],
        signal: &StopSignal,
    ) -> Result<Execution, VmError> {
        if signal.is_cancelled() {
            return Err(VmError::Cancelled);
        }
        let mut run = Run {
            tape,
            input,
            input_pos: 0,
            output: Vec::new(),
            instructions: 0,
            limit: self.limits.max_instructions,
            signal,
        };

        // Explicit walk: each frame is a block and the index of its next child.
        // The bottom frame is the root, which runs once; every frame above it
        // is a loop body that repeats while the current cell is non-zero.
        let mut frames: Vec<(&[Node], usize)> = vec![(program.root().children.as_slice(), 0)];
        loop {
            let depth = frames.len();
            let (nodes, next) = frames[depth - 1];
            if let Some(node) = nodes.get(next) {
                frames[depth - 1].1 += 1;
                run.tick()?;
                match node {
                    Node::Op(op) => run.apply(*op)?,
                    Node::Loop(body) => {
                        if run.tape.get() != 0 {
                            frames.push((body.children.as_slice(), 0));
                        }
                    }
                }
            } else if depth == 1 {
                break;
            } else {
                run.tick()?;
                if run.tape.get() != 0 {
                    frames[depth - 1].1 = 0;
                } else {
                    frames.pop();
                }
            }
        }

        let remaining = input.len() - run.input_pos;
        if remaining > 0 && self.limits.unused_input == UnusedInputPolicy::Reject {
            return Err(VmError::UnusedInput { remaining });
        }

        Ok(Execution {
            output: run.output,
            instructions: run.instructions,
        })
    }
}
