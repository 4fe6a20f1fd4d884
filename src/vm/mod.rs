pub mod engine;
pub mod memory;
pub mod op;
pub mod parser;

pub use engine::{Execution, ExecutionLimits, StopSignal, UnusedInputPolicy, VirtualMachine, VmError};
pub use memory::Tape;
pub use op::{Gene, LoopNode, Node, Op, Program};
pub use parser::{parse, ParseError};
