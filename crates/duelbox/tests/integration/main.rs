//! Integration tests for duelbox
//!
//! These tests require a `python3` interpreter on PATH.
//! Run with: cargo test -p duelbox --features integration-tests

#![cfg(feature = "integration-tests")]

use duelbox::Config;

mod battle_flow;
mod execution;
mod resource_limits;

/// Test configuration with tight wall clocks so nothing drags
pub(crate) fn test_config() -> Config {
    Config::default()
}
