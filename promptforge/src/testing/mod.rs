//! Testing utilities.
//!
//! This module provides:
//! - A scripted text generator with per-key failure scripts and call tracking
//! - Record and source-file fixtures

mod fixtures;
mod mocks;

pub use fixtures::{numbered_records, record_key, write_source_csv};
pub use mocks::{ScriptedGenerator, DEFAULT_REPLY};
