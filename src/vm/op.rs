use rand::Rng;

/// A single gene of an evolved program.
///
/// The first eight variants map one-to-one onto the Brainfuck instruction
/// symbols. `Null` is the placeholder used by the aligned genome layout: it
/// renders as a symbol the parser skips, so a genome carrying it still reads
/// as a valid program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Gene {
    MoveRight = 0,
    MoveLeft = 1,
    Increment = 2,
    Decrement = 3,
    Input = 4,
    Output = 5,
    LoopBegin = 6,
    LoopEnd = 7,
    Null = 8,
}

/// Symbol a `Gene::Null` renders as. Anything outside the instruction set works.
pub const NULL_SYMBOL: char = '_';

impl Gene {
    /// Every real instruction, in symbol order. Never contains `Null`.
    pub const ALPHABET: [Gene; 8] = [
        Gene::MoveRight,
        Gene::MoveLeft,
        Gene::Increment,
        Gene::Decrement,
        Gene::Input,
        Gene::Output,
        Gene::LoopBegin,
        Gene::LoopEnd,
    ];

    /// Uniformly draws one instruction gene. This is the default gene factory.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::ALPHABET[rng.random_range(0..Self::ALPHABET.len())]
    }

    pub fn symbol(self) -> char {
        match self {
            Gene::MoveRight => '>',
            Gene::MoveLeft => '<',
            Gene::Increment => '+',
            Gene::Decrement => '-',
            Gene::Input => ',',
            Gene::Output => '.',
            Gene::LoopBegin => '[',
            Gene::LoopEnd => ']',
            Gene::Null => NULL_SYMBOL,
        }
    }

    pub fn from_symbol(symbol: char) -> Option<Self> {
        Self::ALPHABET
            .iter()
            .copied()
            .find(|gene| gene.symbol() == symbol)
    }

    pub fn is_null(self) -> bool {
        self == Gene::Null
    }
}

/// Renders a genome as program text, one symbol per gene.
pub fn to_source(genes: &[Gene]) -> String {
    genes.iter().map(|gene| gene.symbol()).collect()
}

/// Reads program text back into genes, dropping every non-instruction symbol.
pub fn from_source(source: &str) -> Vec<Gene> {
    source.chars().filter_map(Gene::from_symbol).collect()
}

/// Leaf instructions of a parsed program. Loop brackets never appear here,
/// they become `Node::Loop` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    MoveRight,
    MoveLeft,
    Increment,
    Decrement,
    Input,
    Output,
}

impl Op {
    pub fn symbol(self) -> char {
        match self {
            Op::MoveRight => '>',
            Op::MoveLeft => '<',
            Op::Increment => '+',
            Op::Decrement => '-',
            Op::Input => ',',
            Op::Output => '.',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Op(Op),
    Loop(LoopNode),
}

/// An ordered block of nodes. Nested inside a program it repeats while the
/// current cell is non-zero; as a program root it runs exactly once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopNode {
    pub children: Vec<Node>,
}

impl LoopNode {
    pub fn new(children: Vec<Node>) -> Self {
        Self { children }
    }

    fn write_source(&self, out: &mut String) {
        for child in &self.children {
            match child {
                Node::Op(op) => out.push(op.symbol()),
                Node::Loop(inner) => {
                    out.push('[');
                    inner.write_source(out);
                    out.push(']');
                }
            }
        }
    }
}

/// A parsed, immutable program tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    root: LoopNode,
}

impl Program {
    pub(crate) fn from_root(root: LoopNode) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &LoopNode {
        &self.root
    }

    /// Unparses the tree into canonical program text (instruction symbols only).
    pub fn to_source(&self) -> String {
        let mut out = String::new();
        self.root.write_source(&mut out);
        out
    }
}

impl std::fmt::Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_source())
    }
}
