//! Transfer-check pipeline.
//!
//! Confidential transfers pass through an explicit, ordered list of named
//! checks. Each check returns `Allow` or `Block(reason)`; the first block
//! aborts the transfer. Checks may also name observers, who receive ACL
//! access to the transferred amount.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use cloak_core::Address;

use crate::error::{AclError, Result};

/// The parties of a transfer as seen by the checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub token: Address,
    pub from: Address,
    pub to: Address,
    /// Principal moving the funds (the holder or an operator).
    pub spender: Address,
}

/// Outcome of a single check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Block(String),
}

/// A named transfer restriction.
pub trait TransferCheck: Send + Sync {
    fn name(&self) -> &str;

    fn evaluate(&self, request: &TransferRequest) -> Verdict;

    /// Principals to be granted access to the transferred amount.
    fn observers(&self, _request: &TransferRequest) -> Vec<Address> {
        Vec::new()
    }
}

/// Blocks transfers touching frozen accounts.
#[derive(Debug, Default, Clone)]
pub struct FreezeCheck {
    frozen: BTreeSet<Address>,
}

impl FreezeCheck {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn freeze(&mut self, account: Address) {
        self.frozen.insert(account);
    }

    pub fn unfreeze(&mut self, account: &Address) {
        self.frozen.remove(account);
    }

    pub fn is_frozen(&self, account: &Address) -> bool {
        self.frozen.contains(account)
    }
}

impl TransferCheck for FreezeCheck {
    fn name(&self) -> &str {
        "freeze"
    }

    fn evaluate(&self, request: &TransferRequest) -> Verdict {
        for account in [&request.from, &request.to] {
            if self.is_frozen(account) {
                return Verdict::Block(format!("{account} is frozen"));
            }
        }
        Verdict::Allow
    }
}

/// Allowlist or blocklist over both parties.
#[derive(Debug, Clone)]
pub enum RestrictionCheck {
    /// Only listed accounts may send or receive.
    Allowlist(BTreeSet<Address>),
    /// Listed accounts may not send or receive.
    Blocklist(BTreeSet<Address>),
}

impl RestrictionCheck {
    pub fn allowlist(accounts: impl IntoIterator<Item = Address>) -> Self {
        RestrictionCheck::Allowlist(accounts.into_iter().collect())
    }

    pub fn blocklist(accounts: impl IntoIterator<Item = Address>) -> Self {
        RestrictionCheck::Blocklist(accounts.into_iter().collect())
    }

    fn permits(&self, account: &Address) -> bool {
        match self {
            RestrictionCheck::Allowlist(set) => set.contains(account),
            RestrictionCheck::Blocklist(set) => !set.contains(account),
        }
    }
}

impl TransferCheck for RestrictionCheck {
    fn name(&self) -> &str {
        match self {
            RestrictionCheck::Allowlist(_) => "allowlist",
            RestrictionCheck::Blocklist(_) => "blocklist",
        }
    }

    fn evaluate(&self, request: &TransferRequest) -> Verdict {
        for account in [&request.from, &request.to] {
            if !self.permits(account) {
                return Verdict::Block(format!("{account} is restricted"));
            }
        }
        Verdict::Allow
    }
}

/// Always allows; maps accounts to their observers.
#[derive(Debug, Default, Clone)]
pub struct ObserverCheck {
    observers: BTreeMap<Address, Address>,
}

impl ObserverCheck {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_observer(&mut self, account: Address, observer: Address) {
        self.observers.insert(account, observer);
    }

    pub fn observer_of(&self, account: &Address) -> Option<Address> {
        self.observers.get(account).copied()
    }
}

impl TransferCheck for ObserverCheck {
    fn name(&self) -> &str {
        "observer"
    }

    fn evaluate(&self, _request: &TransferRequest) -> Verdict {
        Verdict::Allow
    }

    fn observers(&self, request: &TransferRequest) -> Vec<Address> {
        [&request.from, &request.to]
            .into_iter()
            .filter_map(|a| self.observer_of(a))
            .collect()
    }
}

/// What a successful pipeline run reports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferReport {
    /// Names of the checks that ran, in order.
    pub evaluated: Vec<String>,
    /// Deduplicated observers, sorted.
    pub observers: Vec<Address>,
}

/// Ordered list of transfer checks.
#[derive(Default)]
pub struct TransferPipeline {
    checks: Vec<Box<dyn TransferCheck>>,
}

impl TransferPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a check; checks run in insertion order.
    pub fn with(mut self, check: impl TransferCheck + 'static) -> Self {
        self.checks.push(Box::new(check));
        self
    }

    pub fn push(&mut self, check: Box<dyn TransferCheck>) {
        self.checks.push(check);
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Run every check, stopping at the first block.
    pub fn run(&self, request: &TransferRequest) -> Result<TransferReport> {
        let mut report = TransferReport::default();
        let mut observers = BTreeSet::new();

        for check in &self.checks {
            match check.evaluate(request) {
                Verdict::Allow => {
                    report.evaluated.push(check.name().to_string());
                    observers.extend(check.observers(request));
                }
                Verdict::Block(reason) => {
                    debug!(check = check.name(), %reason, "transfer blocked");
                    return Err(AclError::TransferBlocked {
                        check: check.name().to_string(),
                        reason,
                    });
                }
            }
        }

        report.observers = observers.into_iter().collect();
        Ok(report)
    }
}

impl std::fmt::Debug for TransferPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.checks.iter().map(|c| c.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(from: &str, to: &str) -> TransferRequest {
        TransferRequest {
            token: Address::contract("token"),
            from: Address::contract(from),
            to: Address::contract(to),
            spender: Address::contract(from),
        }
    }

    #[test]
    fn test_empty_pipeline_allows() {
        let report = TransferPipeline::new().run(&request("a", "b")).unwrap();
        assert!(report.evaluated.is_empty());
        assert!(report.observers.is_empty());
    }

    #[test]
    fn test_first_block_wins() {
        let mut freeze = FreezeCheck::new();
        freeze.freeze(Address::contract("b"));

        let pipeline = TransferPipeline::new()
            .with(freeze)
            .with(RestrictionCheck::blocklist([Address::contract("b")]));

        match pipeline.run(&request("a", "b")).unwrap_err() {
            AclError::TransferBlocked { check, .. } => assert_eq!(check, "freeze"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_allowlist() {
        let pipeline = TransferPipeline::new().with(RestrictionCheck::allowlist([
            Address::contract("a"),
            Address::contract("b"),
        ]));
        pipeline.run(&request("a", "b")).unwrap();
        assert!(pipeline.run(&request("a", "c")).is_err());
    }

    #[test]
    fn test_observers_collected() {
        let mut observer = ObserverCheck::new();
        let auditor = Address::contract("auditor");
        observer.set_observer(Address::contract("a"), auditor);
        observer.set_observer(Address::contract("b"), auditor);

        let pipeline = TransferPipeline::new().with(FreezeCheck::new()).with(observer);
        let report = pipeline.run(&request("a", "b")).unwrap();
        assert_eq!(report.evaluated, vec!["freeze".to_string(), "observer".to_string()]);
        assert_eq!(report.observers, vec![auditor]);
    }
}
