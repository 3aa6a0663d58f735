//! Data model shared by every controller crate.
//!
//! Everything here is plain data plus pure functions: no I/O, no process spawning.
//! The task identifier grammar and the progress-file line format are the two
//! wire-level contracts other services depend on.

mod error;
pub use error::ModelError;

mod domain;
pub use domain::*;

mod kind;
pub use kind::*;
