//! The mid-level IR operated on by the rewrite-ir passes.
//!
//! One enum, `Expr`, covering every node shape the passes need. Every pass
//! matches on it exhaustively; adding a variant here is expected to break
//! every pass's `match` until handled, which is the point.

use std::rc::Rc;

use crate::ident::Ident;

/// Shared, immutable subterm. Passes rebuild nodes rather than mutate
/// through this handle; sharing lets an output term reuse the parts of its
/// input that a given pass left untouched instead of deep-cloning them.
pub type Term = Rc<Expr>;

/// Opaque source location token. The concrete representation (file table,
/// byte offsets, ...) is the host's concern; this crate only threads it
/// through for warnings and the one fatal diagnostic.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, serde::Serialize)]
pub struct Loc(pub u32);

impl Loc {
    pub const UNKNOWN: Loc = Loc(u32::MAX);
}

/// Compile-time constant. `Block` models a statically-known immutable
/// block, e.g. the folded result of `Obj_with_tag` on a constant tuple.
#[derive(Clone, PartialEq, Debug)]
pub enum Constant {
    Int(i64),
    Block(u32, Vec<Constant>),
    Str(String),
}

/// Binding kind on a `Let`. Semantics are pass-visible, not cosmetic.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BindingKind {
    /// Must be evaluated for effect; kept even if the body never uses it.
    Strict,
    /// Pure; may be duplicated, inlined, or dropped freely.
    Alias,
    /// Like `Strict`, but droppable if unused.
    StrictOpt,
    /// A mutable cell, introduced only by ref-to-variable promotion.
    Variable,
}

/// Opaque scalar/shape hint. Passes preserve it except when promotion
/// (`Strict` block -> `Variable`) must pick a single scalar kind.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ValueKind {
    Pgenval,
    Pintval,
    Pfloatval,
    Pblockval,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CallingConvention {
    Curried,
    Tupled,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Locality {
    AlwaysLocal,
    DefaultLocal,
    NeverLocal,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Inline {
    NeverInline,
    DefaultInline,
    AlwaysInline,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct FunctionAttrs {
    pub local: Option<Locality>,
    pub inline: Inline,
    /// Set by the front end (or by `force_tmc`) to mark a TMC candidate.
    pub tmc_candidate: bool,
}

impl Default for Locality {
    fn default() -> Self {
        Locality::DefaultLocal
    }
}

impl Default for Inline {
    fn default() -> Self {
        Inline::DefaultInline
    }
}

/// How a particular `Apply` site relates to tail-call expectations. Read
/// and, for TMC rewrites, set by the passes; the actual annotation-record
/// emission is an out-of-scope downstream traversal.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum TailcallAnnotation {
    #[default]
    None,
    /// User wrote `@tailcall true` at this call site.
    ExplicitRequest,
    /// User wrote `@tailcall false` / `Tailcall_expectation false`: this
    /// call is not eligible for TMC's tail-call rewriting.
    Disabled,
}

#[derive(Clone, PartialEq, Debug)]
pub struct ApplyNode {
    pub func: Term,
    pub args: Vec<Term>,
    pub loc: Loc,
    /// Whether this call is believed to sit in tail position. Read by
    /// local-fn lifting's analysis and updated by TMC when it rewrites a
    /// call into DPS form.
    pub tail_hint: bool,
    pub inline_hint: Inline,
    pub tailcall: TailcallAnnotation,
}

#[derive(Clone, PartialEq, Debug)]
pub struct FunctionNode {
    pub calling_convention: CallingConvention,
    pub params: Vec<(Ident, ValueKind)>,
    pub return_kind: ValueKind,
    pub body: Term,
    pub attrs: FunctionAttrs,
    pub loc: Loc,
}

#[derive(Clone, PartialEq, Debug)]
pub struct LetNode {
    pub binding_kind: BindingKind,
    pub value_kind: ValueKind,
    pub id: Ident,
    pub value: Term,
    pub body: Term,
}

#[derive(Clone, PartialEq, Debug)]
pub struct LetrecNode {
    pub bindings: Vec<(Ident, Term)>,
    pub body: Term,
}

/// The primitives the passes care about. Anything else the front end emits
/// is opaque to this core and carried in `Other`.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Primitive {
    Makeblock { tag: u32, mutable: bool },
    Field(u32),
    Setfield(u32),
    SetfieldComputed,
    Offsetref(i64),
    Offsetint(i64),
    Revapply,
    Dirapply,
    Identity,
    BytesToString,
    BytesOfString,
    /// `args = [tag_expr, block_expr]`; contracted when `tag_expr` is a
    /// constant and `block_expr` is a `Makeblock` (or constant block).
    ObjWithTag,
    Add,
    Other(String),
}

#[derive(Clone, PartialEq, Debug)]
pub struct PrimNode {
    pub prim: Primitive,
    pub args: Vec<Term>,
    pub loc: Loc,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SwitchTotals {
    pub num_consts: u32,
    pub num_blocks: u32,
}

#[derive(Clone, PartialEq, Debug)]
pub struct SwitchNode {
    pub scrutinee: Term,
    pub const_arms: Vec<(i64, Term)>,
    pub block_arms: Vec<(u32, Term)>,
    pub default: Option<Term>,
    pub totals: SwitchTotals,
}

impl SwitchNode {
    /// True when both const and block coverage are strictly partial, the
    /// condition under which the default action counts as duplicated.
    pub fn default_is_duplicated(&self) -> bool {
        let consts_partial = (self.const_arms.len() as u32) < self.totals.num_consts;
        let blocks_partial = (self.block_arms.len() as u32) < self.totals.num_blocks;
        self.default.is_some() && consts_partial && blocks_partial
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct StringswitchNode {
    pub scrutinee: Term,
    pub cases: Vec<(String, Term)>,
    pub default: Option<Term>,
    pub loc: Loc,
}

/// An exit label tying a `Staticraise` to its `Staticcatch`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct ExitLabel(pub u32);

#[derive(Clone, PartialEq, Debug)]
pub struct StaticraiseNode {
    pub label: ExitLabel,
    pub args: Vec<Term>,
}

#[derive(Clone, PartialEq, Debug)]
pub struct StaticcatchNode {
    pub body: Term,
    pub label: ExitLabel,
    pub params: Vec<(Ident, ValueKind)>,
    pub handler: Term,
}

#[derive(Clone, PartialEq, Debug)]
pub struct TrywithNode {
    pub body: Term,
    pub exn_var: Ident,
    pub handler: Term,
}

#[derive(Clone, PartialEq, Debug)]
pub struct IfthenelseNode {
    pub cond: Term,
    pub then_branch: Term,
    pub else_branch: Term,
}

#[derive(Clone, PartialEq, Debug)]
pub struct WhileNode {
    pub cond: Term,
    pub body: Term,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ForDirection {
    Upto,
    Downto,
}

#[derive(Clone, PartialEq, Debug)]
pub struct ForNode {
    pub var: Ident,
    pub low: Term,
    pub high: Term,
    pub direction: ForDirection,
    pub body: Term,
}

/// Method dispatch, opaque to these passes beyond its argument subterms.
#[derive(Clone, PartialEq, Debug)]
pub struct SendNode {
    pub obj: Term,
    pub method: String,
    pub args: Vec<Term>,
    pub loc: Loc,
}

/// A transparent debug annotation wrapping a subterm.
#[derive(Clone, PartialEq, Debug)]
pub struct EventNode {
    pub term: Term,
    pub loc: Loc,
}

#[derive(Clone, PartialEq, Debug)]
pub enum Expr {
    Var(Ident),
    Const(Constant),
    Apply(ApplyNode),
    Function(FunctionNode),
    Let(LetNode),
    Letrec(LetrecNode),
    Prim(PrimNode),
    Switch(SwitchNode),
    Stringswitch(StringswitchNode),
    Staticraise(StaticraiseNode),
    Staticcatch(StaticcatchNode),
    Trywith(TrywithNode),
    Ifthenelse(IfthenelseNode),
    Sequence(Term, Term),
    While(WhileNode),
    For(ForNode),
    Assign(Ident, Term),
    Send(SendNode),
    Event(EventNode),
    Ifused(Ident, Term),
}

impl Expr {
    pub fn into_term(self) -> Term {
        Rc::new(self)
    }
}

/// Convenience constructor: wrap a chain of `Let(Strict, ...)` bindings
/// around `body`, innermost binding last — used by beta-reduction and by
/// exit-simplification's handler materialization. `bindings` are applied
/// so that the first pair becomes the outermost `Let`, preserving
/// left-to-right evaluation order.
pub fn let_chain(bindings: Vec<(Ident, ValueKind, Term)>, body: Term) -> Term {
    bindings.into_iter().rev().fold(body, |acc, (id, vk, value)| {
        Expr::Let(LetNode {
            binding_kind: BindingKind::Strict,
            value_kind: vk,
            id,
            value,
            body: acc,
        })
        .into_term()
    })
}
