//! Homomorphic computation unit (HCU) metering.
//!
//! Every handle-producing operation is charged against two ceilings:
//! - **Global**: total HCU spent in the transaction.
//! - **Sequential**: depth of the dependency chain behind a handle. A result's
//!   depth is the maximum depth of its operands plus the cost of the op.
//!   Handles created before the transaction have depth 0.
//!
//! Crossing either ceiling exhausts the meter: every later charge in the
//! transaction fails with the same error, however cheap.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use cloak_core::{EncryptedType, FheOp, HandleId};

use cloak_store::StateView;

use crate::context::TxContext;
use crate::error::{AclError, Result};

/// Per-transaction HCU ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HcuLimits {
    pub global_limit: u64,
    pub depth_limit: u64,
}

impl Default for HcuLimits {
    fn default() -> Self {
        Self {
            global_limit: 20_000_000,
            depth_limit: 5_000_000,
        }
    }
}

/// Which ceiling was crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BudgetKind {
    Global,
    Sequential,
}

impl fmt::Display for BudgetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BudgetKind::Global => write!(f, "global"),
            BudgetKind::Sequential => write!(f, "sequential"),
        }
    }
}

/// HCU price of one operation on operands of type `ty`.
///
/// Linear in the bit width, with a per-class base.
pub fn op_cost(op: FheOp, ty: EncryptedType) -> u64 {
    let bits = u64::from(ty.bits());
    match op {
        FheOp::And | FheOp::Or | FheOp::Xor | FheOp::Not => 25_000 + bits * 400,
        FheOp::Add | FheOp::Sub | FheOp::Neg => 65_000 + bits * 1_500,
        FheOp::Mul => 150_000 + bits * 7_500,
        FheOp::Eq | FheOp::Ne => 50_000 + bits * 900,
        FheOp::Lt | FheOp::Le | FheOp::Gt | FheOp::Ge => 70_000 + bits * 1_400,
        FheOp::Min | FheOp::Max => 110_000 + bits * 2_000,
        FheOp::Select => 40_000 + bits * 350,
        FheOp::Cast => 30_000,
        FheOp::TrivialEncrypt => 20_000 + bits * 50,
    }
}

/// Transaction-scoped HCU meter.
#[derive(Debug, Clone)]
pub struct BudgetMeter {
    limits: HcuLimits,
    used: u64,
    depth: HashMap<HandleId, u64>,
    exhausted: Option<(BudgetKind, u64, u64)>,
}

impl BudgetMeter {
    pub fn new(limits: HcuLimits) -> Self {
        Self {
            limits,
            used: 0,
            depth: HashMap::new(),
            exhausted: None,
        }
    }

    /// HCU spent so far.
    pub fn used(&self) -> u64 {
        self.used
    }

    pub fn limits(&self) -> HcuLimits {
        self.limits
    }

    /// Depth of a handle; 0 for handles not produced in this transaction.
    pub fn depth_of(&self, handle: &HandleId) -> u64 {
        self.depth.get(handle).copied().unwrap_or(0)
    }

    /// Whether a ceiling has been crossed.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted.is_some()
    }

    /// Charge `cost` for an op over `operands`, returning the result depth.
    ///
    /// A failed charge spends nothing but exhausts the meter.
    pub fn charge(&mut self, operands: &[HandleId], cost: u64) -> Result<u64> {
        if let Some((kind, needed, limit)) = self.exhausted {
            return Err(AclError::BudgetExceeded {
                kind,
                needed,
                limit,
            });
        }

        let needed = self.used.saturating_add(cost);
        if needed > self.limits.global_limit {
            return Err(self.exhaust(BudgetKind::Global, needed, self.limits.global_limit));
        }

        let base = operands.iter().map(|h| self.depth_of(h)).max().unwrap_or(0);
        let depth = base.saturating_add(cost);
        if depth > self.limits.depth_limit {
            return Err(self.exhaust(BudgetKind::Sequential, depth, self.limits.depth_limit));
        }

        self.used = needed;
        Ok(depth)
    }

    fn exhaust(&mut self, kind: BudgetKind, needed: u64, limit: u64) -> AclError {
        self.exhausted = Some((kind, needed, limit));
        AclError::BudgetExceeded {
            kind,
            needed,
            limit,
        }
    }

    /// Record the depth of a freshly produced handle.
    pub fn record(&mut self, handle: HandleId, depth: u64) {
        self.depth.insert(handle, depth);
    }
}

impl<S: StateView + ?Sized> TxContext<'_, S> {
    /// Charge `op` over `operands` of type `ty`; returns the result depth.
    pub(crate) fn charge(
        &mut self,
        op: FheOp,
        ty: EncryptedType,
        operands: &[HandleId],
    ) -> Result<u64> {
        self.ensure_live()?;
        self.meter
            .charge(operands, op_cost(op, ty))
            .map_err(|e| self.abort(e))
    }

    /// Depth of a handle in this transaction.
    pub fn depth_of(&self, handle: &HandleId) -> u64 {
        self.meter.depth_of(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;
    use cloak_core::Address;
    use cloak_store::HandleOrigin;

    fn h(b: u8) -> HandleId {
        HandleId::compose(&[b; 32], 0xff, 1, EncryptedType::Uint64)
    }

    #[test]
    fn test_costs_grow_with_width() {
        for op in [FheOp::Add, FheOp::Mul, FheOp::Lt, FheOp::And] {
            assert!(op_cost(op, EncryptedType::Uint8) < op_cost(op, EncryptedType::Uint64));
            assert!(op_cost(op, EncryptedType::Uint64) < op_cost(op, EncryptedType::Uint256));
        }
    }

    #[test]
    fn test_global_ceiling() {
        let mut meter = BudgetMeter::new(HcuLimits {
            global_limit: 100,
            depth_limit: 100,
        });
        meter.charge(&[], 60).unwrap();
        let err = meter.charge(&[], 41).unwrap_err();
        assert!(matches!(
            err,
            AclError::BudgetExceeded {
                kind: BudgetKind::Global,
                needed: 101,
                limit: 100
            }
        ));
        // failed charge is not recorded, and nothing fits afterwards
        assert_eq!(meter.used(), 60);
        assert!(meter.is_exhausted());
        let err = meter.charge(&[], 1).unwrap_err();
        assert_eq!(err.reason_code(), "BudgetExceeded(Global)");
        assert_eq!(meter.used(), 60);
    }

    #[test]
    fn test_sequential_depth_accumulates_along_chain() {
        let mut meter = BudgetMeter::new(HcuLimits {
            global_limit: 1_000,
            depth_limit: 250,
        });

        let d1 = meter.charge(&[h(1)], 100).unwrap();
        meter.record(h(2), d1);
        let d2 = meter.charge(&[h(2)], 100).unwrap();
        meter.record(h(3), d2);
        assert_eq!(d2, 200);

        // independent branch stays shallow
        assert_eq!(meter.charge(&[h(1)], 100).unwrap(), 100);

        let err = meter.charge(&[h(3), h(1)], 100).unwrap_err();
        assert!(matches!(
            err,
            AclError::BudgetExceeded {
                kind: BudgetKind::Sequential,
                ..
            }
        ));
        // a shallow independent op no longer fits either
        let err = meter.charge(&[h(1)], 10).unwrap_err();
        assert_eq!(err.reason_code(), "BudgetExceeded(Sequential)");
    }

    #[test]
    fn test_exceeded_budget_aborts_context() {
        let h = Harness::new();
        let app = Address::contract("app");
        let mut tx = h.tx(app);
        tx.meter = BudgetMeter::new(HcuLimits {
            global_limit: op_cost(FheOp::Mul, EncryptedType::Uint64),
            depth_limit: u64::MAX,
        });

        tx.charge(FheOp::Mul, EncryptedType::Uint64, &[]).unwrap();
        let err = tx
            .charge(FheOp::Add, EncryptedType::Uint8, &[])
            .unwrap_err();
        assert_eq!(err.reason_code(), "BudgetExceeded(Global)");
        assert_eq!(
            tx.aborted().map(AclError::reason_code),
            Some("BudgetExceeded(Global)")
        );

        // later writes are refused and nothing can be committed
        let err = tx
            .create(app, EncryptedType::Bool, HandleOrigin::Trivial)
            .unwrap_err();
        assert_eq!(err.reason_code(), "BudgetExceeded(Global)");
        assert!(tx.into_effects().is_err());
    }
}
