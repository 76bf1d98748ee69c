//! Pure data types for chainsh — parsed pipelines and stage results.
//!
//! This crate is a leaf dependency with no async runtime, no parser, no I/O.
//! Callers that only need to inspect a parsed pipeline or a finished run can
//! depend on it without pulling in tokio.

pub mod outcome;
pub mod spec;

// Flat re-exports for convenience
pub use outcome::*;
pub use spec::*;
