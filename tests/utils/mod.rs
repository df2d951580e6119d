pub mod setup;

// Re-export main utilities for use by test files
#[allow(unused_imports)]
pub use setup::{
    default_tiers, stored_row, wait_for_active, wait_until, TestSetup, TestSetupBuilder,
};
