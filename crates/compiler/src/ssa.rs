//! The SSA form consumed by backends
//!
//! Lowering turns fully-resolved tree modules into a flat map of
//! [`SsaSymbol`]s keyed by mangled-qualified name. A symbol is either a
//! global (a type, maybe a constant value, maybe an initializer block) or a
//! function (an entry block plus parameter and local slots). Blocks hold an
//! ordered list of [`SsaStep`]s ending in exactly one terminator; a step
//! produces at most one virtual register which later steps reference as
//! [`SsaOperand::Reg`].
//!
//! Everything here is immutable once lowering returns; the verifier and the
//! backends only read.

pub mod emit;
pub mod lower;
pub mod verify;

use crate::ops::{BinaryOp, CompareOp, UnaryOp};
use crate::types::{Sign, Width, digit_name};
use num_bigint::BigInt;
use std::collections::BTreeMap;
use std::fmt;

/// Lowered symbols keyed by qualified name
pub type SsaModule = BTreeMap<String, SsaSymbol>;

/// Types at the SSA tier
///
/// Mirrors the tree types without nominal structure: aggregates, pointers
/// and opaque aliases flatten to a [`SsaType::Qualify`] reference that the
/// backend resolves by name. `Void` results lower to `Unit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SsaType {
    Empty,
    Unit,
    Bool,
    Digit { sign: Sign, width: Width },
    String,
    Closure {
        params: Vec<SsaType>,
        result: Box<SsaType>,
        variadic: bool,
    },
    /// Named reference resolved by the backend
    Qualify { name: String },
}

impl fmt::Display for SsaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SsaType::Empty => f.write_str("empty"),
            SsaType::Unit => f.write_str("unit"),
            SsaType::Bool => f.write_str("bool"),
            SsaType::Digit { sign, width } => f.write_str(digit_name(*sign, *width)),
            SsaType::String => f.write_str("str"),
            SsaType::Closure {
                params,
                result,
                variadic,
            } => {
                f.write_str("def(")?;
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", param)?;
                }
                if *variadic {
                    if !params.is_empty() {
                        f.write_str(", ")?;
                    }
                    f.write_str("...")?;
                }
                write!(f, ") -> {}", result)
            }
            SsaType::Qualify { name } => f.write_str(name),
        }
    }
}

/// A constant literal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SsaConst {
    Digit(BigInt),
    Bool(bool),
    String(Vec<u8>),
}

/// A constant with its type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsaValue {
    pub ty: SsaType,
    pub value: SsaConst,
}

impl fmt::Display for SsaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            SsaConst::Digit(digit) => write!(f, "${}", digit),
            SsaConst::Bool(b) => write!(f, "${}", b),
            SsaConst::String(bytes) => write!(f, "${:?}", String::from_utf8_lossy(bytes)),
        }
    }
}

/// Index of a block within its symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

/// Reference to the step that produced a virtual register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StepRef {
    pub block: BlockId,
    pub index: usize,
}

/// An operand of a step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SsaOperand {
    /// No value (void call results, bare returns)
    Empty,
    Imm(SsaValue),
    Block(BlockId),
    /// A global symbol, by qualified name
    Global(String),
    /// A function symbol, by qualified name
    Function(String),
    /// A local slot of the enclosing function
    Local(usize),
    /// A parameter slot of the enclosing function
    Param(usize),
    /// The virtual register produced by an earlier step
    Reg(StepRef),
}

/// Step payloads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SsaOp {
    Store { dst: SsaOperand, src: SsaOperand },
    Load { src: SsaOperand },
    /// Address of a storage slot
    Address { symbol: SsaOperand },
    Unary { op: UnaryOp, operand: SsaOperand },
    Binary {
        op: BinaryOp,
        lhs: SsaOperand,
        rhs: SsaOperand,
    },
    Compare {
        op: CompareOp,
        lhs: SsaOperand,
        rhs: SsaOperand,
    },
    /// Conversion; the target type is the step's type
    Cast { operand: SsaOperand },
    Call {
        callee: SsaOperand,
        args: Vec<SsaOperand>,
    },
    /// Address of an element of an array or indexable pointer
    Index {
        array: SsaOperand,
        index: SsaOperand,
    },
    /// Address of a field of a record or union
    Member { object: SsaOperand, field: String },

    // terminators
    Return { value: SsaOperand },
    Branch {
        cond: SsaOperand,
        then: BlockId,
        other: BlockId,
    },
    Jump { target: BlockId },
}

impl SsaOp {
    pub fn name(&self) -> &'static str {
        match self {
            SsaOp::Store { .. } => "store",
            SsaOp::Load { .. } => "load",
            SsaOp::Address { .. } => "addr",
            SsaOp::Unary { .. } => "unary",
            SsaOp::Binary { .. } => "binary",
            SsaOp::Compare { .. } => "compare",
            SsaOp::Cast { .. } => "cast",
            SsaOp::Call { .. } => "call",
            SsaOp::Index { .. } => "index",
            SsaOp::Member { .. } => "member",
            SsaOp::Return { .. } => "ret",
            SsaOp::Branch { .. } => "branch",
            SsaOp::Jump { .. } => "jump",
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            SsaOp::Return { .. } | SsaOp::Branch { .. } | SsaOp::Jump { .. }
        )
    }

    /// Does this step define a virtual register?
    pub fn produces_value(&self) -> bool {
        !matches!(
            self,
            SsaOp::Store { .. } | SsaOp::Return { .. } | SsaOp::Branch { .. } | SsaOp::Jump { .. }
        )
    }

    /// Every operand of this step
    pub fn operands(&self) -> Vec<&SsaOperand> {
        match self {
            SsaOp::Store { dst, src } => vec![dst, src],
            SsaOp::Load { src } => vec![src],
            SsaOp::Address { symbol } => vec![symbol],
            SsaOp::Unary { operand, .. } => vec![operand],
            SsaOp::Binary { lhs, rhs, .. } => vec![lhs, rhs],
            SsaOp::Compare { lhs, rhs, .. } => vec![lhs, rhs],
            SsaOp::Cast { operand } => vec![operand],
            SsaOp::Call { callee, args } => {
                let mut all = vec![callee];
                all.extend(args.iter());
                all
            }
            SsaOp::Index { array, index } => vec![array, index],
            SsaOp::Member { object, .. } => vec![object],
            SsaOp::Return { value } => vec![value],
            SsaOp::Branch { cond, .. } => vec![cond],
            SsaOp::Jump { .. } => vec![],
        }
    }

    /// Blocks this step can transfer control to
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            SsaOp::Branch { then, other, .. } => vec![*then, *other],
            SsaOp::Jump { target } => vec![*target],
            _ => vec![],
        }
    }
}

/// One step: an opcode payload plus the type of the value it produces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsaStep {
    pub op: SsaOp,
    pub ty: SsaType,
}

/// A named, ordered list of steps ending in one terminator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsaBlock {
    pub name: String,
    pub steps: Vec<SsaStep>,
}

impl SsaBlock {
    pub fn is_terminated(&self) -> bool {
        self.steps.last().is_some_and(|step| step.op.is_terminator())
    }
}

/// A lowered global or function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsaSymbol {
    pub name: String,
    pub ty: SsaType,
    /// Constant value; globals with pure immediate initializers
    pub value: Option<SsaValue>,
    /// Entry block; functions and globals with non-trivial initializers
    pub entry: Option<BlockId>,
    pub blocks: Vec<SsaBlock>,
    pub locals: Vec<(String, SsaType)>,
    pub params: Vec<(String, SsaType)>,
}

impl SsaSymbol {
    pub fn block(&self, id: BlockId) -> &SsaBlock {
        &self.blocks[id.0 as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminator_classification() {
        let ret = SsaOp::Return {
            value: SsaOperand::Empty,
        };
        assert!(ret.is_terminator());
        assert!(!ret.produces_value());

        let load = SsaOp::Load {
            src: SsaOperand::Local(0),
        };
        assert!(!load.is_terminator());
        assert!(load.produces_value());

        let store = SsaOp::Store {
            dst: SsaOperand::Local(0),
            src: SsaOperand::Empty,
        };
        assert!(!store.produces_value());
    }

    #[test]
    fn test_successors() {
        let branch = SsaOp::Branch {
            cond: SsaOperand::Empty,
            then: BlockId(1),
            other: BlockId(2),
        };
        assert_eq!(branch.successors(), vec![BlockId(1), BlockId(2)]);
        let jump = SsaOp::Jump { target: BlockId(3) };
        assert_eq!(jump.successors(), vec![BlockId(3)]);
    }

    #[test]
    fn test_type_display() {
        let sig = SsaType::Closure {
            params: vec![SsaType::Digit {
                sign: Sign::Signed,
                width: Width::Int,
            }],
            result: Box::new(SsaType::Bool),
            variadic: false,
        };
        assert_eq!(sig.to_string(), "def(int) -> bool");
    }
}
