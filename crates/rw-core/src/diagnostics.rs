//! Warning collection.
//!
//! A plain append-only sink, passed by `&mut` into whatever is producing
//! diagnostics rather than reached for as global state.

use crate::ir::Loc;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, serde::Serialize)]
pub enum Severity {
    #[default]
    Warning,
}

/// The non-fatal diagnostics a pass may emit. The one fatal condition,
/// `Ambiguous_constructor_arguments`, is not here — it aborts the pass via
/// `RewriteError` instead of being collected.
#[derive(Clone, PartialEq, Eq, Debug, serde::Serialize)]
pub enum WarningKind {
    /// A TMC-annotated function has no TMC-eligible call sites in its body.
    UnusedTmcAttribute,
    /// TMC rewriting moved a tail call to a non-TMC-eligible callee into
    /// non-tail position.
    TmcBreaksTailcall,
    /// An `@tailcall`-hinted call site is not in tail position after all
    /// rewrites.
    ExpectTailcall,
    /// A function annotated `Always_local` could not be lifted to a static
    /// continuation.
    InliningImpossible,
}

#[derive(Clone, PartialEq, Eq, Debug, serde::Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: WarningKind,
    pub loc: Loc,
}

#[derive(Clone, Debug, Default)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn warn(&mut self, kind: WarningKind, loc: Loc) {
        self.0.push(Diagnostic {
            severity: Severity::Warning,
            kind,
            loc,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }

    pub fn of_kind(&self, kind: &WarningKind) -> usize {
        self.0.iter().filter(|d| &d.kind == kind).count()
    }
}
