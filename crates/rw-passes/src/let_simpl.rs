//! Let simplification: occurrence-counted dead-code elimination, copy
//! propagation, beta-reduction, curry-merging, and mutable-ref-to-variable
//! promotion.
//!
//! Two phases, like exit simplification, but occurrence counting here is
//! lexical-depth aware: a reference to a name bound in the current
//! function/loop frame counts once, a reference crossing into an enclosing
//! frame (through a `Function`, `While`, or `For` boundary) counts twice,
//! conservatively standing in for "could run more than once". Only
//! `Let`/`Letrec`-bound identifiers are tracked at all — function
//! parameters and similar binders are never substitution candidates, so
//! they're simply not in the `occ` table.

use std::collections::{HashMap, HashSet};

use rw_core::config::Config;
use rw_core::contract::try_beta_reduce;
use rw_core::diagnostics::Diagnostics;
use rw_core::ident::{Ident, IdentGen};
use rw_core::ir::*;
use rw_core::traversal::{shallow_for_each, shallow_map};

pub fn run(term: &Term, config: &Config, gen: &mut IdentGen, diags: &mut Diagnostics) -> Term {
    let optimize = config.optimize();
    let mut occ: HashMap<Ident, u32> = HashMap::new();
    let mut frame = HashSet::new();
    count(term, &mut frame, &mut occ, optimize);
    let mut subst: HashMap<Ident, Term> = HashMap::new();
    rewrite(term, &occ, &mut subst, optimize, gen, diags)
}

fn bump(v: &Ident, frame: &HashSet<Ident>, occ: &mut HashMap<Ident, u32>) {
    if frame.contains(v) {
        *occ.entry(v.clone()).or_insert(0) += 1;
    } else if occ.contains_key(v) {
        *occ.entry(v.clone()).or_insert(0) += 2;
    }
}

fn count(term: &Term, frame: &mut HashSet<Ident>, occ: &mut HashMap<Ident, u32>, optimize: bool) {
    match &**term {
        Expr::Var(v) => bump(v, frame, occ),
        Expr::Assign(_, e) => count(e, frame, occ, optimize),
        Expr::Ifused(v, e) => {
            if occ.get(v).copied().unwrap_or(0) > 0 {
                count(e, frame, occ, optimize);
            }
        }
        Expr::Let(l) => {
            if optimize {
                if let Expr::Var(w) = &*l.value {
                    frame.insert(l.id.clone());
                    occ.entry(l.id.clone()).or_insert(0);
                    count(&l.body, frame, occ, optimize);
                    let cv = occ.get(&l.id).copied().unwrap_or(0);
                    *occ.entry(w.clone()).or_insert(0) += cv;
                    return;
                }
            }
            frame.insert(l.id.clone());
            occ.entry(l.id.clone()).or_insert(0);
            match l.binding_kind {
                BindingKind::Strict | BindingKind::Variable => {
                    count(&l.value, frame, occ, optimize);
                    count(&l.body, frame, occ, optimize);
                }
                BindingKind::Alias | BindingKind::StrictOpt => {
                    count(&l.body, frame, occ, optimize);
                    let cv = occ.get(&l.id).copied().unwrap_or(0);
                    if cv > 0 {
                        count(&l.value, frame, occ, optimize);
                    }
                }
            }
        }
        Expr::Letrec(lr) => {
            for (id, _) in &lr.bindings {
                frame.insert(id.clone());
                occ.entry(id.clone()).or_insert(0);
            }
            for (_, v) in &lr.bindings {
                count(v, frame, occ, optimize);
            }
            count(&lr.body, frame, occ, optimize);
        }
        Expr::Function(fun) => {
            let mut inner = HashSet::new();
            count(&fun.body, &mut inner, occ, optimize);
        }
        Expr::While(w) => {
            let mut cond_frame = HashSet::new();
            count(&w.cond, &mut cond_frame, occ, optimize);
            let mut body_frame = HashSet::new();
            count(&w.body, &mut body_frame, occ, optimize);
        }
        Expr::For(fo) => {
            count(&fo.low, frame, occ, optimize);
            count(&fo.high, frame, occ, optimize);
            let mut body_frame = HashSet::new();
            count(&fo.body, &mut body_frame, occ, optimize);
        }
        Expr::Apply(a) => {
            if optimize {
                if let Some(reduced) = try_beta_reduce(&a.func, &a.args) {
                    count(&reduced, frame, occ, optimize);
                    return;
                }
            }
            count(&a.func, frame, occ, optimize);
            for arg in &a.args {
                count(arg, frame, occ, optimize);
            }
        }
        Expr::Switch(s) => {
            count(&s.scrutinee, frame, occ, optimize);
            for (_, v) in &s.const_arms {
                count(v, frame, occ, optimize);
            }
            for (_, v) in &s.block_arms {
                count(v, frame, occ, optimize);
            }
            if let Some(d) = &s.default {
                count(d, frame, occ, optimize);
                if s.default_is_duplicated() {
                    count(d, frame, occ, optimize);
                }
            }
        }
        other => shallow_for_each(other, |c| count(c, frame, occ, optimize)),
    }
}

fn rewrite(
    term: &Term,
    occ: &HashMap<Ident, u32>,
    subst: &mut HashMap<Ident, Term>,
    optimize: bool,
    gen: &mut IdentGen,
    diags: &mut Diagnostics,
) -> Term {
    match &**term {
        Expr::Var(v) => subst.get(v).cloned().unwrap_or_else(|| term.clone()),
        Expr::Let(l) => rewrite_let(l, occ, subst, optimize, gen, diags),
        Expr::Apply(a) => {
            let func = rewrite(&a.func, occ, subst, optimize, gen, diags);
            let args: Vec<Term> = a
                .args
                .iter()
                .map(|x| rewrite(x, occ, subst, optimize, gen, diags))
                .collect();
            if optimize {
                if let Some(reduced) = try_beta_reduce(&func, &args) {
                    return rewrite(&reduced, occ, subst, optimize, gen, diags);
                }
            }
            Expr::Apply(ApplyNode {
                func,
                args,
                loc: a.loc,
                tail_hint: a.tail_hint,
                inline_hint: a.inline_hint,
                tailcall: a.tailcall,
            })
            .into_term()
        }
        Expr::Function(fun) => {
            let body = rewrite(&fun.body, occ, subst, optimize, gen, diags);
            if optimize && fun.calling_convention == CallingConvention::Curried {
                if let Expr::Function(inner) = &*body {
                    if inner.calling_convention == CallingConvention::Curried {
                        let mut params = fun.params.clone();
                        params.extend(inner.params.clone());
                        return Expr::Function(FunctionNode {
                            calling_convention: CallingConvention::Curried,
                            params,
                            return_kind: inner.return_kind,
                            body: inner.body.clone(),
                            attrs: fun.attrs,
                            loc: fun.loc,
                        })
                        .into_term();
                    }
                }
            }
            Expr::Function(FunctionNode {
                calling_convention: fun.calling_convention,
                params: fun.params.clone(),
                return_kind: fun.return_kind,
                body,
                attrs: fun.attrs,
                loc: fun.loc,
            })
            .into_term()
        }
        Expr::Sequence(l1, l2) => {
            if let Expr::Ifused(v, e1) = &**l1 {
                let l2r = rewrite(l2, occ, subst, optimize, gen, diags);
                if occ.get(v).copied().unwrap_or(0) > 0 {
                    let e1r = rewrite(e1, occ, subst, optimize, gen, diags);
                    return Expr::Sequence(e1r, l2r).into_term();
                }
                return l2r;
            }
            let a = rewrite(l1, occ, subst, optimize, gen, diags);
            let b = rewrite(l2, occ, subst, optimize, gen, diags);
            Expr::Sequence(a, b).into_term()
        }
        other => shallow_map(other, |c| rewrite(c, occ, subst, optimize, gen, diags)).into_term(),
    }
}

fn rewrite_let(
    l: &LetNode,
    occ: &HashMap<Ident, u32>,
    subst: &mut HashMap<Ident, Term>,
    optimize: bool,
    gen: &mut IdentGen,
    diags: &mut Diagnostics,
) -> Term {
    if optimize {
        if let Expr::Var(w) = &*l.value {
            let simplified = rewrite(&Expr::Var(w.clone()).into_term(), occ, subst, optimize, gen, diags);
            subst.insert(l.id.clone(), simplified);
            return rewrite(&l.body, occ, subst, optimize, gen, diags);
        }
    }
    match l.binding_kind {
        BindingKind::Alias => {
            let cv = occ.get(&l.id).copied().unwrap_or(0);
            if cv == 0 {
                return rewrite(&l.body, occ, subst, optimize, gen, diags);
            }
            if cv == 1 && optimize {
                let simplified = rewrite(&l.value, occ, subst, optimize, gen, diags);
                subst.insert(l.id.clone(), simplified);
                return rewrite(&l.body, occ, subst, optimize, gen, diags);
            }
            let value = rewrite(&l.value, occ, subst, optimize, gen, diags);
            let body = rewrite(&l.body, occ, subst, optimize, gen, diags);
            finish_let(optimize, l.binding_kind, l.value_kind, l.id.clone(), value, body)
        }
        BindingKind::StrictOpt => {
            let cv = occ.get(&l.id).copied().unwrap_or(0);
            if cv == 0 {
                return rewrite(&l.body, occ, subst, optimize, gen, diags);
            }
            let value = rewrite(&l.value, occ, subst, optimize, gen, diags);
            let body = rewrite(&l.body, occ, subst, optimize, gen, diags);
            finish_let(optimize, l.binding_kind, l.value_kind, l.id.clone(), value, body)
        }
        BindingKind::Strict => {
            if optimize {
                if let Some(promoted) = try_ref_promotion(l, occ, subst, optimize, gen, diags) {
                    return promoted;
                }
            }
            let value = rewrite(&l.value, occ, subst, optimize, gen, diags);
            let body = rewrite(&l.body, occ, subst, optimize, gen, diags);
            finish_let(optimize, l.binding_kind, l.value_kind, l.id.clone(), value, body)
        }
        BindingKind::Variable => {
            let value = rewrite(&l.value, occ, subst, optimize, gen, diags);
            let body = rewrite(&l.body, occ, subst, optimize, gen, diags);
            finish_let(optimize, l.binding_kind, l.value_kind, l.id.clone(), value, body)
        }
    }
}

fn finish_let(
    optimize: bool,
    binding_kind: BindingKind,
    value_kind: ValueKind,
    id: Ident,
    value: Term,
    body: Term,
) -> Term {
    if optimize {
        if let Expr::Var(v) = &*body {
            if *v == id {
                return value;
            }
        }
    }
    Expr::Let(LetNode {
        binding_kind,
        value_kind,
        id,
        value,
        body,
    })
    .into_term()
}

/// A freshly allocated one-field mutable block bound by a `Strict` let is a
/// candidate for rewriting into a scalar `Variable` cell. Returns `None`
/// when `l` isn't shaped like a candidate at all (so the caller falls back
/// to ordinary `Strict` handling); returns `Some` either with the promoted
/// `Variable` let, or with the Makeblock rebuilt unchanged if the body
/// turned out to use the binder somewhere promotion can't account for.
fn try_ref_promotion(
    l: &LetNode,
    occ: &HashMap<Ident, u32>,
    subst: &mut HashMap<Ident, Term>,
    optimize: bool,
    gen: &mut IdentGen,
    diags: &mut Diagnostics,
) -> Option<Term> {
    let Expr::Prim(p) = &*l.value else {
        return None;
    };
    let Primitive::Makeblock { tag: 0, mutable: true } = p.prim else {
        return None;
    };
    if p.args.len() != 1 {
        return None;
    }
    let init = rewrite(&p.args[0], occ, subst, optimize, gen, diags);
    let body = rewrite(&l.body, occ, subst, optimize, gen, diags);
    match promote_refs(&body, &l.id) {
        Some(promoted_body) => {
            let scalar = scalar_kind_of(&init);
            Some(finish_let(
                optimize,
                BindingKind::Variable,
                scalar,
                l.id.clone(),
                init,
                promoted_body,
            ))
        }
        None => {
            let rebuilt_value = Expr::Prim(PrimNode {
                prim: Primitive::Makeblock {
                    tag: 0,
                    mutable: true,
                },
                args: vec![init],
                loc: p.loc,
            })
            .into_term();
            Some(finish_let(
                optimize,
                l.binding_kind,
                l.value_kind,
                l.id.clone(),
                rebuilt_value,
                body,
            ))
        }
    }
}

fn is_var(t: &Term, v: &Ident) -> bool {
    matches!(&**t, Expr::Var(w) if w == v)
}

/// Scalar kind a promoted cell should carry. Our `Makeblock` primitive
/// doesn't carry a per-field shape array, so the kind is inferred from the
/// initializer's own shape rather than read off the allocation.
fn scalar_kind_of(init: &Term) -> ValueKind {
    match &**init {
        Expr::Const(Constant::Int(_)) => ValueKind::Pintval,
        Expr::Const(Constant::Block(..)) => ValueKind::Pblockval,
        _ => ValueKind::Pgenval,
    }
}

/// Try to rewrite every occurrence of `v` in `body` into the scalar-cell
/// equivalent of its block-field use. Any occurrence of `v` that isn't one
/// of the three recognized shapes aborts the whole attempt (`None`).
fn promote_refs(term: &Term, v: &Ident) -> Option<Term> {
    match &**term {
        Expr::Var(w) if w == v => None,
        Expr::Prim(p) => {
            match &p.prim {
                Primitive::Field(0) if p.args.len() == 1 && is_var(&p.args[0], v) => {
                    return Some(Expr::Var(v.clone()).into_term());
                }
                Primitive::Setfield(0) if p.args.len() == 2 && is_var(&p.args[0], v) => {
                    let rhs = promote_refs(&p.args[1], v)?;
                    return Some(Expr::Assign(v.clone(), rhs).into_term());
                }
                Primitive::Offsetref(delta) if p.args.len() == 1 && is_var(&p.args[0], v) => {
                    let delta = *delta;
                    let read = Expr::Prim(PrimNode {
                        prim: Primitive::Offsetint(delta),
                        args: vec![Expr::Var(v.clone()).into_term()],
                        loc: p.loc,
                    })
                    .into_term();
                    return Some(Expr::Assign(v.clone(), read).into_term());
                }
                _ => {}
            }
            let mut args = Vec::with_capacity(p.args.len());
            for a in &p.args {
                args.push(promote_refs(a, v)?);
            }
            Some(
                Expr::Prim(PrimNode {
                    prim: p.prim.clone(),
                    args,
                    loc: p.loc,
                })
                .into_term(),
            )
        }
        Expr::Assign(w, e) => {
            if w == v {
                return None;
            }
            Some(Expr::Assign(w.clone(), promote_refs(e, v)?).into_term())
        }
        _ => rebuild_fallible(term, v),
    }
}

/// Generic one-level rebuild for `promote_refs`, mirroring
/// `traversal::shallow_map` but propagating failure through `Option`
/// instead of always succeeding.
fn rebuild_fallible(term: &Term, v: &Ident) -> Option<Term> {
    let expr: &Expr = term;
    let rebuilt = match expr {
        Expr::Var(_) | Expr::Const(_) => expr.clone(),
        Expr::Staticraise(r) => Expr::Staticraise(StaticraiseNode {
            label: r.label,
            args: map_fallible(&r.args, v)?,
        }),
        Expr::Apply(a) => Expr::Apply(ApplyNode {
            func: promote_refs(&a.func, v)?,
            args: map_fallible(&a.args, v)?,
            loc: a.loc,
            tail_hint: a.tail_hint,
            inline_hint: a.inline_hint,
            tailcall: a.tailcall,
        }),
        Expr::Function(fun) => Expr::Function(FunctionNode {
            calling_convention: fun.calling_convention,
            params: fun.params.clone(),
            return_kind: fun.return_kind,
            body: promote_refs(&fun.body, v)?,
            attrs: fun.attrs,
            loc: fun.loc,
        }),
        Expr::Let(l) => Expr::Let(LetNode {
            binding_kind: l.binding_kind,
            value_kind: l.value_kind,
            id: l.id.clone(),
            value: promote_refs(&l.value, v)?,
            body: promote_refs(&l.body, v)?,
        }),
        Expr::Letrec(lr) => {
            let mut bindings = Vec::with_capacity(lr.bindings.len());
            for (id, value) in &lr.bindings {
                bindings.push((id.clone(), promote_refs(value, v)?));
            }
            Expr::Letrec(LetrecNode {
                bindings,
                body: promote_refs(&lr.body, v)?,
            })
        }
        Expr::Prim(p) => Expr::Prim(PrimNode {
            prim: p.prim.clone(),
            args: map_fallible(&p.args, v)?,
            loc: p.loc,
        }),
        Expr::Switch(s) => Expr::Switch(SwitchNode {
            scrutinee: promote_refs(&s.scrutinee, v)?,
            const_arms: map_pairs_fallible(&s.const_arms, v)?,
            block_arms: map_pairs_fallible(&s.block_arms, v)?,
            default: s.default.as_ref().map(|d| promote_refs(d, v)).transpose()?,
            totals: s.totals,
        }),
        Expr::Stringswitch(s) => Expr::Stringswitch(StringswitchNode {
            scrutinee: promote_refs(&s.scrutinee, v)?,
            cases: {
                let mut out = Vec::with_capacity(s.cases.len());
                for (k, e) in &s.cases {
                    out.push((k.clone(), promote_refs(e, v)?));
                }
                out
            },
            default: s.default.as_ref().map(|d| promote_refs(d, v)).transpose()?,
            loc: s.loc,
        }),
        Expr::Staticcatch(sc) => Expr::Staticcatch(StaticcatchNode {
            body: promote_refs(&sc.body, v)?,
            label: sc.label,
            params: sc.params.clone(),
            handler: promote_refs(&sc.handler, v)?,
        }),
        Expr::Trywith(t) => Expr::Trywith(TrywithNode {
            body: promote_refs(&t.body, v)?,
            exn_var: t.exn_var.clone(),
            handler: promote_refs(&t.handler, v)?,
        }),
        Expr::Ifthenelse(i) => Expr::Ifthenelse(IfthenelseNode {
            cond: promote_refs(&i.cond, v)?,
            then_branch: promote_refs(&i.then_branch, v)?,
            else_branch: promote_refs(&i.else_branch, v)?,
        }),
        Expr::Sequence(l1, l2) => {
            Expr::Sequence(promote_refs(l1, v)?, promote_refs(l2, v)?)
        }
        Expr::While(w) => Expr::While(WhileNode {
            cond: promote_refs(&w.cond, v)?,
            body: promote_refs(&w.body, v)?,
        }),
        Expr::For(fo) => Expr::For(ForNode {
            var: fo.var.clone(),
            low: promote_refs(&fo.low, v)?,
            high: promote_refs(&fo.high, v)?,
            direction: fo.direction,
            body: promote_refs(&fo.body, v)?,
        }),
        Expr::Assign(w, e) => {
            if w == v {
                return None;
            }
            Expr::Assign(w.clone(), promote_refs(e, v)?)
        }
        Expr::Send(s) => Expr::Send(SendNode {
            obj: promote_refs(&s.obj, v)?,
            method: s.method.clone(),
            args: map_fallible(&s.args, v)?,
            loc: s.loc,
        }),
        Expr::Event(e) => Expr::Event(EventNode {
            term: promote_refs(&e.term, v)?,
            loc: e.loc,
        }),
        Expr::Ifused(w, e) => Expr::Ifused(w.clone(), promote_refs(e, v)?),
    };
    Some(rebuilt.into_term())
}

fn map_fallible(items: &[Term], v: &Ident) -> Option<Vec<Term>> {
    items.iter().map(|t| promote_refs(t, v)).collect()
}

fn map_pairs_fallible<K: Clone>(items: &[(K, Term)], v: &Ident) -> Option<Vec<(K, Term)>> {
    items
        .iter()
        .map(|(k, t)| promote_refs(t, v).map(|t| (k.clone(), t)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(native_code: bool, debug: bool) -> Config {
        Config {
            native_code,
            debug,
            annotations: false,
            force_tmc: false,
        }
    }

    #[test]
    fn unused_alias_binding_is_dropped_even_without_optimize() {
        let mut gen = IdentGen::new();
        let mut diags = Diagnostics::new();
        let x = gen.fresh("x");
        let body = Expr::Const(Constant::Int(9)).into_term();
        let term = Expr::Let(LetNode {
            binding_kind: BindingKind::Alias,
            value_kind: ValueKind::Pintval,
            id: x,
            value: Expr::Const(Constant::Int(1)).into_term(),
            body: body.clone(),
        })
        .into_term();
        let out = run(&term, &cfg(false, true), &mut gen, &mut diags);
        assert_eq!(out, body);
    }

    #[test]
    fn single_use_alias_is_inlined_when_optimize() {
        let mut gen = IdentGen::new();
        let mut diags = Diagnostics::new();
        let x = gen.fresh("x");
        let term = Expr::Let(LetNode {
            binding_kind: BindingKind::Alias,
            value_kind: ValueKind::Pintval,
            id: x.clone(),
            value: Expr::Const(Constant::Int(7)).into_term(),
            body: Expr::Var(x).into_term(),
        })
        .into_term();
        let out = run(&term, &cfg(true, false), &mut gen, &mut diags);
        assert_eq!(out, Expr::Const(Constant::Int(7)).into_term());
    }

    #[test]
    fn identity_preserved_without_optimize() {
        let mut gen = IdentGen::new();
        let mut diags = Diagnostics::new();
        let x = gen.fresh("x");
        let term = Expr::Let(LetNode {
            binding_kind: BindingKind::Alias,
            value_kind: ValueKind::Pintval,
            id: x.clone(),
            value: Expr::Const(Constant::Int(7)).into_term(),
            body: Expr::Var(x).into_term(),
        })
        .into_term();
        let out = run(&term, &cfg(false, true), &mut gen, &mut diags);
        // Debug/unoptimized: copy-propagation is skipped, binding is kept.
        assert!(matches!(&*out, Expr::Let(_)));
    }
}
