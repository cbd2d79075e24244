//! Checkpointing for resumable runs.
//!
//! The output file is the only persisted state. At startup it is read back
//! twice over: as the prefix of the new result sequence ([`ResultSink`]) and
//! as the set of already completed indices ([`ProgressLedger`]). Writes
//! replace the whole file atomically, so a crash between flushes loses at
//! most the unflushed part of the current run.

mod ledger;
mod sink;

pub use ledger::{load_results, ProgressLedger};
pub use sink::{write_json_atomic, ResultSink};
