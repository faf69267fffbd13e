//! Read-only pipeline configuration.
//!
//! All four fields must be supplied by the host; there is deliberately no
//! `Default` impl that would silently pick a behavior the surface compiler
//! never chose. Flag lookup itself (reading a command-line option or a
//! module attribute) is the host's concern, not this crate's.

#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Enables the more aggressive pass-2 rewrites and enables pass 3
    /// (local-function lifting).
    pub native_code: bool,
    /// When true and `native_code` is false, disables local-fn lifting and
    /// most let-simplification rewrites.
    pub debug: bool,
    /// Enables emission of tail-call annotation records for call sites
    /// (consumed by the out-of-scope annotation emitter; this crate only
    /// tracks the `tail_hint` bit passes would feed it).
    pub annotations: bool,
    /// Treat every function in a `Letrec` as a TMC candidate.
    pub force_tmc: bool,
}

impl Config {
    /// Pass 2's `optimize` flag: `native_code || !debug`.
    pub fn optimize(&self) -> bool {
        self.native_code || !self.debug
    }

    /// Whether local-function lifting (pass 3) runs at all.
    pub fn run_local_fn_lifting(&self) -> bool {
        self.native_code
    }
}
