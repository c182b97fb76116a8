#![allow(dead_code, unused_imports)]

pub use cloak_testkit::fixtures::{euint64, principals, LedgerFixture, TestLedger};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
