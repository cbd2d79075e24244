//! Core data types shared by every stage.
//!
//! This module provides:
//! - Source records and derived results (the persisted row shape)
//! - Instruction/output training samples
//! - Typed outcomes of a single external call

mod outcome;
mod record;
mod sample;

pub use outcome::{CallFailure, CallOutcome};
pub use record::{detect_prompt_type, DerivedResult, SourceRecord};
pub use sample::TrainingSample;
