//! Local-function lifting: promote a first-order, non-escaping, locally
//! let-bound function whose every call site is a fully-applied tail call
//! within one common tail scope into a `Staticcatch` continuation, turning
//! its calls into `Staticraise`.
//!
//! Two phases, mirroring the other passes. Phase A (`analyze_tail`/
//! `analyze_nontail`) threads a "current tail scope" — identified by the
//! pointer identity of the outermost node the current position is tail
//! with respect to — through the tree, recording for each eligible
//! candidate the single scope its call sites agree on (or invalidating it
//! the moment two call sites disagree, an escape occurs, or an arity
//! mismatch is seen). Phase B wraps each surviving candidate's recorded
//! scope node in a `Staticcatch`, drops its `Let`, and rewrites its call
//! sites to `Staticraise`.

use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;

use rw_core::diagnostics::{Diagnostics, WarningKind};
use rw_core::ident::Ident;
use rw_core::ir::*;
use rw_core::traversal::shallow_for_each;
use rw_core::traversal::shallow_map;

fn ptr_key(term: &Term) -> usize {
    Rc::as_ptr(term) as usize
}

fn is_eligible(attrs: &FunctionAttrs) -> bool {
    match attrs.local {
        Some(Locality::AlwaysLocal) => true,
        Some(Locality::NeverLocal) => false,
        Some(Locality::DefaultLocal) | None => {
            matches!(attrs.inline, Inline::NeverInline | Inline::DefaultInline)
        }
    }
}

struct CandidateSlot {
    lf: FunctionNode,
    scope: Option<usize>,
    invalid: bool,
    always_local: bool,
}

pub fn run(term: &Term, diags: &mut Diagnostics) -> Term {
    let mut slots: IndexMap<Ident, CandidateSlot> = IndexMap::new();
    analyze_tail(term, term, &mut slots);

    let mut next_label = max_label(term) + 1;
    let mut surviving: IndexMap<Ident, Candidate> = IndexMap::new();
    for (id, slot) in slots.into_iter() {
        let Some(scope) = slot.scope.filter(|_| !slot.invalid) else {
            if slot.always_local {
                diags.warn(WarningKind::InliningImpossible, slot.lf.loc);
            }
            continue;
        };
        let label = ExitLabel(next_label);
        next_label += 1;
        surviving.insert(
            id,
            Candidate {
                label,
                params: slot.lf.params.clone(),
                scope,
                original_body: slot.lf.body,
            },
        );
    }

    let mut scope_groups: HashMap<usize, Vec<Ident>> = HashMap::new();
    for (id, cand) in &surviving {
        scope_groups.entry(cand.scope).or_default().push(id.clone());
    }

    // Rewrite each candidate's own body innermost-first, so a nested
    // candidate's finished handler is already available by the time the
    // enclosing candidate's body is walked.
    let mut bodies: HashMap<Ident, Term> = HashMap::new();
    for (id, cand) in surviving.iter().rev() {
        let body = rewrite_node(&cand.original_body, &surviving, &scope_groups, &bodies);
        bodies.insert(id.clone(), body);
    }

    rewrite_node(term, &surviving, &scope_groups, &bodies)
}

struct Candidate {
    label: ExitLabel,
    params: Vec<(Ident, ValueKind)>,
    scope: usize,
    original_body: Term,
}

fn analyze_tail(term: &Term, scope: &Term, slots: &mut IndexMap<Ident, CandidateSlot>) {
    match &**term {
        Expr::Let(l) => {
            if let Expr::Function(fun) = &*l.value {
                if is_eligible(&fun.attrs) {
                    slots.entry(l.id.clone()).or_insert_with(|| CandidateSlot {
                        lf: fun.clone(),
                        scope: None,
                        invalid: false,
                        always_local: fun.attrs.local == Some(Locality::AlwaysLocal),
                    });
                    analyze_tail(&l.body, term, slots);
                    return;
                }
            }
            analyze_nontail(&l.value, slots);
            analyze_tail(&l.body, term, slots);
        }
        Expr::Apply(a) => {
            if let Expr::Var(id) = &*a.func {
                if let Some(slot) = slots.get_mut(id) {
                    if !slot.invalid {
                        if a.args.len() != slot.lf.params.len() {
                            slot.invalid = true;
                        } else {
                            let sid = ptr_key(scope);
                            match slot.scope {
                                None => slot.scope = Some(sid),
                                Some(s) if s != sid => slot.invalid = true,
                                _ => {}
                            }
                        }
                    }
                    for arg in &a.args {
                        analyze_nontail(arg, slots);
                    }
                    return;
                }
            }
            analyze_nontail(&a.func, slots);
            for arg in &a.args {
                analyze_nontail(arg, slots);
            }
        }
        Expr::Var(id) => {
            if let Some(slot) = slots.get_mut(id) {
                slot.invalid = true;
            }
        }
        Expr::Function(fun) => {
            analyze_tail(&fun.body, &fun.body, slots);
        }
        Expr::Ifthenelse(i) => {
            analyze_nontail(&i.cond, slots);
            analyze_tail(&i.then_branch, scope, slots);
            analyze_tail(&i.else_branch, scope, slots);
        }
        Expr::Switch(s) => {
            analyze_nontail(&s.scrutinee, slots);
            for (_, v) in &s.const_arms {
                analyze_tail(v, scope, slots);
            }
            for (_, v) in &s.block_arms {
                analyze_tail(v, scope, slots);
            }
            if let Some(d) = &s.default {
                analyze_tail(d, scope, slots);
                if s.default_is_duplicated() {
                    analyze_tail(d, scope, slots);
                }
            }
        }
        Expr::Stringswitch(s) => {
            analyze_nontail(&s.scrutinee, slots);
            for (_, v) in &s.cases {
                analyze_tail(v, scope, slots);
            }
            if let Some(d) = &s.default {
                analyze_tail(d, scope, slots);
            }
        }
        Expr::Sequence(l1, l2) => {
            analyze_nontail(l1, slots);
            analyze_tail(l2, scope, slots);
        }
        Expr::Letrec(lr) => {
            for (_, v) in &lr.bindings {
                analyze_nontail(v, slots);
            }
            analyze_tail(&lr.body, scope, slots);
        }
        Expr::Staticcatch(sc) => {
            analyze_tail(&sc.body, scope, slots);
            analyze_tail(&sc.handler, scope, slots);
        }
        Expr::Trywith(t) => {
            analyze_nontail(&t.body, slots);
            analyze_tail(&t.handler, scope, slots);
        }
        Expr::Event(e) => analyze_tail(&e.term, scope, slots),
        Expr::Ifused(_, e) => analyze_tail(e, scope, slots),
        Expr::Staticraise(r) => {
            for a in &r.args {
                analyze_nontail(a, slots);
            }
        }
        other => shallow_for_each(other, |c| analyze_nontail(c, slots)),
    }
}

/// Entering a non-tail position installs the subterm itself as the new
/// tail scope for whatever is tail-positioned within it.
fn analyze_nontail(term: &Term, slots: &mut IndexMap<Ident, CandidateSlot>) {
    analyze_tail(term, term, slots)
}

fn max_label(term: &Term) -> u32 {
    fn go(term: &Term, max: &mut u32) {
        match &**term {
            Expr::Staticraise(r) => {
                *max = (*max).max(r.label.0);
                for a in &r.args {
                    go(a, max);
                }
            }
            Expr::Staticcatch(sc) => {
                *max = (*max).max(sc.label.0);
                go(&sc.body, max);
                go(&sc.handler, max);
            }
            other => shallow_for_each(other, |c| go(c, max)),
        }
    }
    let mut max = 0;
    go(term, &mut max);
    max
}

fn rewrite_node(
    term: &Term,
    surviving: &IndexMap<Ident, Candidate>,
    scope_groups: &HashMap<usize, Vec<Ident>>,
    bodies: &HashMap<Ident, Term>,
) -> Term {
    let key = ptr_key(term);
    let content = match &**term {
        Expr::Let(l) if surviving.contains_key(&l.id) => {
            rewrite_node(&l.body, surviving, scope_groups, bodies)
        }
        Expr::Apply(a) => {
            let target = match &*a.func {
                Expr::Var(id) => surviving.get(id),
                _ => None,
            };
            if let Some(cand) = target {
                let args = a
                    .args
                    .iter()
                    .map(|x| rewrite_node(x, surviving, scope_groups, bodies))
                    .collect();
                Expr::Staticraise(StaticraiseNode {
                    label: cand.label,
                    args,
                })
                .into_term()
            } else {
                Expr::Apply(ApplyNode {
                    func: rewrite_node(&a.func, surviving, scope_groups, bodies),
                    args: a
                        .args
                        .iter()
                        .map(|x| rewrite_node(x, surviving, scope_groups, bodies))
                        .collect(),
                    loc: a.loc,
                    tail_hint: a.tail_hint,
                    inline_hint: a.inline_hint,
                    tailcall: a.tailcall,
                })
                .into_term()
            }
        }
        other => shallow_map(other, |c| rewrite_node(c, surviving, scope_groups, bodies)).into_term(),
    };
    wrap_scopes(key, content, surviving, scope_groups, bodies)
}

fn wrap_scopes(
    key: usize,
    content: Term,
    surviving: &IndexMap<Ident, Candidate>,
    scope_groups: &HashMap<usize, Vec<Ident>>,
    bodies: &HashMap<Ident, Term>,
) -> Term {
    let Some(ids) = scope_groups.get(&key) else {
        return content;
    };
    let mut current = content;
    for id in ids.iter().rev() {
        let cand = &surviving[id];
        current = Expr::Staticcatch(StaticcatchNode {
            body: current,
            label: cand.label,
            params: cand.params.clone(),
            handler: bodies[id].clone(),
        })
        .into_term();
    }
    current
}
