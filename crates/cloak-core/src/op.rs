//! Homomorphic operators understood by the co-processor boundary.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An operator the co-processor can evaluate over handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FheOp {
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Min,
    Max,
    Select,
    Not,
    Neg,
    Cast,
    TrivialEncrypt,
}

impl FheOp {
    /// Stable name, also used as derivation input for result handles.
    pub const fn name(self) -> &'static str {
        match self {
            FheOp::Add => "add",
            FheOp::Sub => "sub",
            FheOp::Mul => "mul",
            FheOp::And => "and",
            FheOp::Or => "or",
            FheOp::Xor => "xor",
            FheOp::Eq => "eq",
            FheOp::Ne => "ne",
            FheOp::Lt => "lt",
            FheOp::Le => "le",
            FheOp::Gt => "gt",
            FheOp::Ge => "ge",
            FheOp::Min => "min",
            FheOp::Max => "max",
            FheOp::Select => "select",
            FheOp::Not => "not",
            FheOp::Neg => "neg",
            FheOp::Cast => "cast",
            FheOp::TrivialEncrypt => "trivial_encrypt",
        }
    }

    /// Whether the result is an encrypted boolean.
    pub const fn is_comparison(self) -> bool {
        matches!(
            self,
            FheOp::Eq | FheOp::Ne | FheOp::Lt | FheOp::Le | FheOp::Gt | FheOp::Ge
        )
    }

    /// Whether the operator is defined on booleans as well as integers.
    pub const fn is_bitwise(self) -> bool {
        matches!(self, FheOp::And | FheOp::Or | FheOp::Xor | FheOp::Not)
    }
}

impl fmt::Display for FheOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
