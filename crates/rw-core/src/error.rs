//! Fatal error type.
//!
//! Only one condition is fatal per the error taxonomy: TMC's ambiguous
//! constructor arguments. Internal invariant violations (try-depth balance,
//! exit-table bookkeeping, the TMC ambiguity cross-check) are
//! `debug_assert!`s along the happy path, but the public pipeline entry
//! point surfaces them as `InternalInvariant` instead of panicking, so an
//! embedding host gets a `Result` rather than an abort.

use crate::ir::Loc;

#[derive(Debug, Clone, thiserror::Error)]
pub enum RewriteError {
    #[error(
        "ambiguous constructor arguments at {0:?}: more than one argument carries a \
         tail-modulo-cons call; disambiguate with @tailcall"
    )]
    AmbiguousConstructorArguments(Loc),

    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),
}

pub type RewriteResult<T> = Result<T, RewriteError>;
