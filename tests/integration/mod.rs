//! Integration tests for action-trace
//!
//! These tests drive action scopes through a real trace file and read the
//! file back with the typed reader.

#[path = "../common/mod.rs"]
pub mod common;

pub mod action_lifecycle;
pub mod generic_logging;
pub mod roundtrip;
