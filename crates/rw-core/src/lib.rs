//! IR definition, identifiers, and traversal helpers shared by the
//! rewrite-ir optimization passes.
//!
//! This crate owns the vocabulary the passes speak: the `Expr` tree
//! (`ir`), identifier handles and the fresh-identifier generator (`ident`),
//! the one-level traversal helper every pass recurses through (`traversal`),
//! the alpha-renaming utility duplication relies on (`rename`), the
//! warning sink (`diagnostics`), the fatal error type (`error`), and the
//! read-only pipeline configuration (`config`). It does not run any pass
//! itself — see `rw-passes`.

pub mod config;
pub mod contract;
pub mod diagnostics;
pub mod error;
pub mod ident;
pub mod ir;
pub mod rename;
pub mod traversal;

#[cfg(test)]
pub mod interp;

pub use config::Config;
pub use diagnostics::{Diagnostic, Diagnostics, Severity, WarningKind};
pub use error::{RewriteError, RewriteResult};
pub use ident::{Ident, IdentGen};
pub use ir::{Expr, Term};
