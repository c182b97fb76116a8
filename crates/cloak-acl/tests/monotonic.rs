//! Permanent grants and public flags only grow, whatever the caller does.

use proptest::prelude::*;

use cloak_acl::{AclConfig, TxContext};
use cloak_core::{Address, EncryptedType, HandleId};
use cloak_store::{HandleOrigin, MemoryStore, Store};

#[derive(Debug, Clone)]
enum Step {
    Allow { caller: u8, principal: u8 },
    Transient { caller: u8, principal: u8 },
    Public { caller: u8 },
}

fn principal(i: u8) -> Address {
    Address::contract(&format!("p{i}"))
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (0..4u8, 0..4u8).prop_map(|(caller, principal)| Step::Allow { caller, principal }),
        (0..4u8, 0..4u8).prop_map(|(caller, principal)| Step::Transient { caller, principal }),
        (0..4u8).prop_map(|caller| Step::Public { caller }),
    ]
}

fn snapshot(store: &MemoryStore, config: &AclConfig, handle: &HandleId) -> (Vec<Address>, bool) {
    let tx = TxContext::new(store, config, 0, 0, principal(0));
    (
        tx.allowed_principals(handle).unwrap(),
        tx.is_publicly_decryptable(handle).unwrap(),
    )
}

proptest! {
    #[test]
    fn grants_and_public_flag_never_shrink(steps in prop::collection::vec(step(), 1..24)) {
        let store = MemoryStore::new();
        let config = AclConfig::default();

        let mut tx = TxContext::new(&store, &config, 1, 100, principal(0));
        let handle = tx.create(principal(0), EncryptedType::Uint32, HandleOrigin::Trivial).unwrap();
        store.commit(&tx.into_effects().unwrap().changes).unwrap();

        let mut before = snapshot(&store, &config, &handle);
        for (i, s) in steps.into_iter().enumerate() {
            let caller = match &s {
                Step::Allow { caller, .. } | Step::Transient { caller, .. } | Step::Public { caller } => *caller,
            };
            let mut tx = TxContext::new(&store, &config, i as u64 + 2, 100 + i as u64, principal(caller));
            // denials are expected and abort the transaction; only what lands matters
            let _ = match s {
                Step::Allow { principal: p, .. } => tx.allow(&handle, principal(p)),
                Step::Transient { principal: p, .. } => tx.allow_transient(&handle, principal(p)),
                Step::Public { .. } => tx.make_publicly_decryptable(&handle),
            };
            if let Ok(effects) = tx.into_effects() {
                store.commit(&effects.changes).unwrap();
            }

            let after = snapshot(&store, &config, &handle);
            prop_assert!(before.0.iter().all(|p| after.0.contains(p)));
            prop_assert!(!before.1 || after.1);
            before = after;
        }
    }
}
