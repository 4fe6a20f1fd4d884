use crate::vm::op::{LoopNode, Node, Op, Program};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Loop opened at symbol {opened_at} is never closed")]
    UnterminatedLoop { opened_at: usize },
    #[error("Loop end at symbol {position} has no matching loop begin")]
    UnmatchedLoopEnd { position: usize },
}

impl ParseError {
    /// An unterminated loop may still be closed by a later mutation, so the
    /// individual is merely invalid for now. A stray loop end is structural.
    pub fn is_retriable(&self) -> bool {
        matches!(self, ParseError::UnterminatedLoop { .. })
    }
}

/// Parses program text into a `Program` tree.
///
/// Instruction symbols become leaf nodes, `[` ... `]` become nested loops and
/// every other character is skipped. Positions in errors count characters,
/// not bytes.
///
/// # Arguments
/// * `source` - The program text.
///
/// # Returns
/// * `Result<Program, ParseError>` - The program tree, whose root runs its
///   children once.
pub fn parse(source: &str) -> Result<Program, ParseError> {
    // Each open loop keeps its start position and the children collected so far.
    let mut open_loops: Vec<(usize, Vec<Node>)> = Vec::new();
    let mut current: Vec<Node> = Vec::new();

    for (position, symbol) in source.chars().enumerate() {
        let op = match symbol {
            '>' => Op::MoveRight,
            '<' => Op::MoveLeft,
            '+' => Op::Increment,
            '-' => Op::Decrement,
            ',' => Op::Input,
            '.' => Op::Output,
            '[' => {
                open_loops.push((position, std::mem::take(&mut current)));
                continue;
            }
            ']' => {
                let (_, parent) = open_loops
                    .pop()
                    .ok_or(ParseError::UnmatchedLoopEnd { position })?;
                let body = std::mem::replace(&mut current, parent);
                current.push(Node::Loop(LoopNode::new(body)));
                continue;
            }
            _ => continue,
        };
        current.push(Node::Op(op));
    }

    // Report the innermost unclosed loop.
    if let Some((opened_at, _)) = open_loops.pop() {
        return Err(ParseError::UnterminatedLoop { opened_at });
    }

    Ok(Program::from_root(LoopNode::new(current)))
}
