//! Computation over encrypted handles.
//!
//! Every operator follows the same path:
//! 1. the executing context must be allowed on each operand,
//! 2. operand types are checked,
//! 3. the HCU cost is charged against both budgets,
//! 4. the result handle is registered (owned by the caller, transiently
//!    allowed to it) and the co-processor evaluates into it.
//!
//! Arithmetic wraps. [`Tx::try_add`] and [`Tx::try_sub`] report overflow as
//! an encrypted boolean instead, with the first operand as the result when
//! the operation did not fit.

use tracing::debug;

use cloak_acl::AclError;
use cloak_core::{ClearValue, EncryptedType, FheOp, HandleId};
use cloak_store::Store;

use crate::coprocessor::Coprocessor;
use crate::error::Result;
use crate::tx::Tx;

/// Which operand types an operator accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OperandKind {
    /// Unsigned integers only.
    Numeric,
    /// Unsigned integers and booleans.
    Bitwise,
    /// Every type.
    Any,
}

impl OperandKind {
    fn of(op: FheOp) -> Self {
        match op {
            FheOp::Eq | FheOp::Ne | FheOp::Select | FheOp::TrivialEncrypt => OperandKind::Any,
            op if op.is_bitwise() => OperandKind::Bitwise,
            FheOp::Cast => OperandKind::Bitwise,
            _ => OperandKind::Numeric,
        }
    }

    fn accepts(self, ty: EncryptedType) -> bool {
        match self {
            OperandKind::Numeric => ty.is_numeric(),
            OperandKind::Bitwise => ty.is_numeric() || ty == EncryptedType::Bool,
            OperandKind::Any => true,
        }
    }
}

impl<S: Store, C: Coprocessor> Tx<'_, '_, S, C> {
    // ─────────────────────────────────────────────────────────────────────────
    // Arithmetic
    // ─────────────────────────────────────────────────────────────────────────

    pub fn add(&mut self, a: HandleId, b: HandleId) -> Result<HandleId> {
        self.binary(FheOp::Add, a, b)
    }

    pub fn sub(&mut self, a: HandleId, b: HandleId) -> Result<HandleId> {
        self.binary(FheOp::Sub, a, b)
    }

    pub fn mul(&mut self, a: HandleId, b: HandleId) -> Result<HandleId> {
        self.binary(FheOp::Mul, a, b)
    }

    pub fn min(&mut self, a: HandleId, b: HandleId) -> Result<HandleId> {
        self.binary(FheOp::Min, a, b)
    }

    pub fn max(&mut self, a: HandleId, b: HandleId) -> Result<HandleId> {
        self.binary(FheOp::Max, a, b)
    }

    /// Two's-complement negation modulo `2^bits`.
    pub fn neg(&mut self, a: HandleId) -> Result<HandleId> {
        let ty = self.operand_type(FheOp::Neg, &a)?;
        self.apply(FheOp::Neg, &[a], ty, ty)
    }

    /// `a + b`, with an encrypted success flag. On overflow the result is `a`.
    pub fn try_add(&mut self, a: HandleId, b: HandleId) -> Result<(HandleId, HandleId)> {
        let sum = self.add(a, b)?;
        // a wrapped sum is smaller than either operand
        let success = self.ge(sum, a)?;
        let result = self.select(success, sum, a)?;
        Ok((success, result))
    }

    /// `a - b`, with an encrypted success flag. On underflow the result is `a`.
    pub fn try_sub(&mut self, a: HandleId, b: HandleId) -> Result<(HandleId, HandleId)> {
        let success = self.ge(a, b)?;
        let difference = self.sub(a, b)?;
        let result = self.select(success, difference, a)?;
        Ok((success, result))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Bitwise
    // ─────────────────────────────────────────────────────────────────────────

    pub fn and(&mut self, a: HandleId, b: HandleId) -> Result<HandleId> {
        self.binary(FheOp::And, a, b)
    }

    pub fn or(&mut self, a: HandleId, b: HandleId) -> Result<HandleId> {
        self.binary(FheOp::Or, a, b)
    }

    pub fn xor(&mut self, a: HandleId, b: HandleId) -> Result<HandleId> {
        self.binary(FheOp::Xor, a, b)
    }

    pub fn not(&mut self, a: HandleId) -> Result<HandleId> {
        let ty = self.operand_type(FheOp::Not, &a)?;
        self.apply(FheOp::Not, &[a], ty, ty)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Comparison
    // ─────────────────────────────────────────────────────────────────────────

    pub fn eq(&mut self, a: HandleId, b: HandleId) -> Result<HandleId> {
        self.binary(FheOp::Eq, a, b)
    }

    pub fn ne(&mut self, a: HandleId, b: HandleId) -> Result<HandleId> {
        self.binary(FheOp::Ne, a, b)
    }

    pub fn lt(&mut self, a: HandleId, b: HandleId) -> Result<HandleId> {
        self.binary(FheOp::Lt, a, b)
    }

    pub fn le(&mut self, a: HandleId, b: HandleId) -> Result<HandleId> {
        self.binary(FheOp::Le, a, b)
    }

    pub fn gt(&mut self, a: HandleId, b: HandleId) -> Result<HandleId> {
        self.binary(FheOp::Gt, a, b)
    }

    pub fn ge(&mut self, a: HandleId, b: HandleId) -> Result<HandleId> {
        self.binary(FheOp::Ge, a, b)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Selection, Casts, Constants
    // ─────────────────────────────────────────────────────────────────────────

    /// `if cond { a } else { b }` without revealing `cond`.
    pub fn select(&mut self, cond: HandleId, a: HandleId, b: HandleId) -> Result<HandleId> {
        let cond_ty = self.operand_type(FheOp::Select, &cond)?;
        if cond_ty != EncryptedType::Bool {
            return Err(type_mismatch(format!("select condition is {cond_ty}")));
        }
        let ty = self.same_types(FheOp::Select, &a, &b)?;
        self.apply(FheOp::Select, &[cond, a, b], ty, ty)
    }

    /// Convert to another type, truncating when narrowing.
    pub fn cast(&mut self, a: HandleId, to: EncryptedType) -> Result<HandleId> {
        let from = self.operand_type(FheOp::Cast, &a)?;
        if from == to || !OperandKind::of(FheOp::Cast).accepts(to) {
            return Err(type_mismatch(format!("cannot cast {from} to {to}")));
        }
        self.apply(FheOp::Cast, &[a], from, to)
    }

    /// Encrypt a public constant. The handle is owned by and transiently
    /// allowed to the executing context.
    pub fn trivial_encrypt(&mut self, value: ClearValue) -> Result<HandleId> {
        let ty = value.ty();
        let handle = self.produce(FheOp::TrivialEncrypt, ty, &[], ty, &value.to_be_bytes32())?;
        self.coprocessor().trivial_encrypt(handle, &value)?;
        Ok(handle)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    fn binary(&mut self, op: FheOp, a: HandleId, b: HandleId) -> Result<HandleId> {
        let ty = self.same_types(op, &a, &b)?;
        let result_ty = if op.is_comparison() {
            EncryptedType::Bool
        } else {
            ty
        };
        self.apply(op, &[a, b], ty, result_ty)
    }

    /// Type of an operand the caller may use, checked against the operator.
    fn operand_type(&self, op: FheOp, handle: &HandleId) -> Result<EncryptedType> {
        self.require_allowed(handle)?;
        let ty = self.metadata(handle)?.ty;
        if !OperandKind::of(op).accepts(ty) {
            return Err(type_mismatch(format!("{op} is not defined on {ty}")));
        }
        Ok(ty)
    }

    fn same_types(&self, op: FheOp, a: &HandleId, b: &HandleId) -> Result<EncryptedType> {
        let ta = self.operand_type(op, a)?;
        let tb = self.operand_type(op, b)?;
        if ta != tb {
            return Err(type_mismatch(format!("{op} on {ta} and {tb}")));
        }
        Ok(ta)
    }

    /// Charge, register and evaluate. `ty` prices the op.
    fn apply(
        &mut self,
        op: FheOp,
        operands: &[HandleId],
        ty: EncryptedType,
        result_ty: EncryptedType,
    ) -> Result<HandleId> {
        let result = self.produce(op, ty, operands, result_ty, &[])?;
        self.coprocessor().compute(op, operands, result)?;
        debug!(%op, %result, depth = self.depth_of(&result), "computed");
        Ok(result)
    }
}

fn type_mismatch(message: String) -> crate::error::LedgerError {
    AclError::TypeMismatch(message).into()
}
