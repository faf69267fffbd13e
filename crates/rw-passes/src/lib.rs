//! The four rewrite-ir passes and the fixed pipeline that composes them.
//!
//! One module per pass, in pipeline order: local-function lifting, exit
//! simplification, let simplification, tail-modulo-cons.
//! `pipeline` wires them together; each pass module is also usable on its
//! own for targeted testing or single-stage inspection (`rw-cli`).

pub mod exit_simpl;
pub mod let_simpl;
pub mod lift_static;
pub mod pipeline;
pub mod tmc;

#[cfg(test)]
mod diagnostics_snapshot_tests;
#[cfg(test)]
mod exit_simpl_tests;
#[cfg(test)]
mod let_simpl_tests;

pub use pipeline::{run, run_pass, Pass};
