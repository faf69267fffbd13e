//! Generic one-level traversal helpers shared by the passes.
//!
//! `shallow_map` rebuilds a node by applying a closure to each of its
//! direct child subterms, without recursing further — the caller supplies
//! the recursion (usually post-order: simplify children first, then
//! reconsider the rebuilt node), reused here instead of every pass
//! hand-rolling its own one-level descent.

use crate::ir::*;

/// Rebuild `expr`, replacing every direct child subterm `c` with `f(c)`.
/// Identifier fields, constants, and other non-`Term` data are copied
/// as-is.
pub fn shallow_map(expr: &Expr, mut f: impl FnMut(&Term) -> Term) -> Expr {
    match expr {
        Expr::Var(_) | Expr::Const(_) => clone_leaf(expr, &mut f),
        Expr::Staticraise(r) => Expr::Staticraise(StaticraiseNode {
            label: r.label,
            args: r.args.iter().map(&mut f).collect(),
        }),
        Expr::Apply(a) => Expr::Apply(ApplyNode {
            func: f(&a.func),
            args: a.args.iter().map(&mut f).collect(),
            loc: a.loc,
            tail_hint: a.tail_hint,
            inline_hint: a.inline_hint,
            tailcall: a.tailcall,
        }),
        Expr::Function(fun) => Expr::Function(FunctionNode {
            calling_convention: fun.calling_convention,
            params: fun.params.clone(),
            return_kind: fun.return_kind,
            body: f(&fun.body),
            attrs: fun.attrs,
            loc: fun.loc,
        }),
        Expr::Let(l) => Expr::Let(LetNode {
            binding_kind: l.binding_kind,
            value_kind: l.value_kind,
            id: l.id.clone(),
            value: f(&l.value),
            body: f(&l.body),
        }),
        Expr::Letrec(lr) => Expr::Letrec(LetrecNode {
            bindings: lr
                .bindings
                .iter()
                .map(|(id, v)| (id.clone(), f(v)))
                .collect(),
            body: f(&lr.body),
        }),
        Expr::Prim(p) => Expr::Prim(PrimNode {
            prim: p.prim.clone(),
            args: p.args.iter().map(&mut f).collect(),
            loc: p.loc,
        }),
        Expr::Switch(s) => Expr::Switch(SwitchNode {
            scrutinee: f(&s.scrutinee),
            const_arms: s.const_arms.iter().map(|(k, v)| (*k, f(v))).collect(),
            block_arms: s.block_arms.iter().map(|(k, v)| (*k, f(v))).collect(),
            default: s.default.as_ref().map(&mut f),
            totals: s.totals,
        }),
        Expr::Stringswitch(s) => Expr::Stringswitch(StringswitchNode {
            scrutinee: f(&s.scrutinee),
            cases: s
                .cases
                .iter()
                .map(|(k, v)| (k.clone(), f(v)))
                .collect(),
            default: s.default.as_ref().map(&mut f),
            loc: s.loc,
        }),
        Expr::Staticcatch(sc) => Expr::Staticcatch(StaticcatchNode {
            body: f(&sc.body),
            label: sc.label,
            params: sc.params.clone(),
            handler: f(&sc.handler),
        }),
        Expr::Trywith(t) => Expr::Trywith(TrywithNode {
            body: f(&t.body),
            exn_var: t.exn_var.clone(),
            handler: f(&t.handler),
        }),
        Expr::Ifthenelse(i) => Expr::Ifthenelse(IfthenelseNode {
            cond: f(&i.cond),
            then_branch: f(&i.then_branch),
            else_branch: f(&i.else_branch),
        }),
        Expr::Sequence(l1, l2) => Expr::Sequence(f(l1), f(l2)),
        Expr::While(w) => Expr::While(WhileNode {
            cond: f(&w.cond),
            body: f(&w.body),
        }),
        Expr::For(fo) => Expr::For(ForNode {
            var: fo.var.clone(),
            low: f(&fo.low),
            high: f(&fo.high),
            direction: fo.direction,
            body: f(&fo.body),
        }),
        Expr::Assign(v, e) => Expr::Assign(v.clone(), f(e)),
        Expr::Send(s) => Expr::Send(SendNode {
            obj: f(&s.obj),
            method: s.method.clone(),
            args: s.args.iter().map(&mut f).collect(),
            loc: s.loc,
        }),
        Expr::Event(e) => Expr::Event(EventNode {
            term: f(&e.term),
            loc: e.loc,
        }),
        Expr::Ifused(v, e) => Expr::Ifused(v.clone(), f(e)),
    }
}

fn clone_leaf(expr: &Expr, _f: &mut impl FnMut(&Term) -> Term) -> Expr {
    expr.clone()
}

/// Free variables of `term` (variables referenced but not bound within it).
/// Used only by tests to check the "free_vars(P(t)) subset free_vars(t)"
/// property; not needed by any pass, which never need to compute this for
/// correctness.
pub fn free_vars(term: &Term) -> std::collections::HashSet<crate::ident::Ident> {
    use std::collections::HashSet;

    fn go(expr: &Expr, bound: &mut Vec<crate::ident::Ident>, out: &mut HashSet<crate::ident::Ident>) {
        match expr {
            Expr::Var(v) => {
                if !bound.contains(v) {
                    out.insert(v.clone());
                }
            }
            Expr::Assign(v, e) => {
                if !bound.contains(v) {
                    out.insert(v.clone());
                }
                go(e, bound, out);
            }
            Expr::Ifused(v, e) => {
                if !bound.contains(v) {
                    out.insert(v.clone());
                }
                go(e, bound, out);
            }
            Expr::Function(fun) => {
                let depth = bound.len();
                bound.extend(fun.params.iter().map(|(id, _)| id.clone()));
                go(&fun.body, bound, out);
                bound.truncate(depth);
            }
            Expr::Let(l) => {
                go(&l.value, bound, out);
                let depth = bound.len();
                bound.push(l.id.clone());
                go(&l.body, bound, out);
                bound.truncate(depth);
            }
            Expr::Letrec(lr) => {
                let depth = bound.len();
                bound.extend(lr.bindings.iter().map(|(id, _)| id.clone()));
                for (_, v) in &lr.bindings {
                    go(v, bound, out);
                }
                go(&lr.body, bound, out);
                bound.truncate(depth);
            }
            Expr::Staticcatch(sc) => {
                go(&sc.body, bound, out);
                let depth = bound.len();
                bound.extend(sc.params.iter().map(|(id, _)| id.clone()));
                go(&sc.handler, bound, out);
                bound.truncate(depth);
            }
            Expr::Trywith(t) => {
                go(&t.body, bound, out);
                let depth = bound.len();
                bound.push(t.exn_var.clone());
                go(&t.handler, bound, out);
                bound.truncate(depth);
            }
            Expr::For(fo) => {
                go(&fo.low, bound, out);
                go(&fo.high, bound, out);
                let depth = bound.len();
                bound.push(fo.var.clone());
                go(&fo.body, bound, out);
                bound.truncate(depth);
            }
            other => {
                shallow_for_each(other, |child| go(child, bound, out));
            }
        }
    }

    let mut bound = Vec::new();
    let mut out = HashSet::new();
    go(term, &mut bound, &mut out);
    out
}

/// Visit every direct child subterm, consts-then-blocks for `Switch` and
/// declared order for `Stringswitch`/`Letrec`.
pub fn shallow_for_each<'a>(expr: &'a Expr, mut f: impl FnMut(&'a Term)) {
    match expr {
        Expr::Var(_) | Expr::Const(_) => {}
        Expr::Staticraise(r) => r.args.iter().for_each(&mut f),
        Expr::Apply(a) => {
            f(&a.func);
            a.args.iter().for_each(&mut f);
        }
        Expr::Function(fun) => f(&fun.body),
        Expr::Let(l) => {
            f(&l.value);
            f(&l.body);
        }
        Expr::Letrec(lr) => {
            for (_, v) in &lr.bindings {
                f(v);
            }
            f(&lr.body);
        }
        Expr::Prim(p) => p.args.iter().for_each(&mut f),
        Expr::Switch(s) => {
            f(&s.scrutinee);
            for (_, v) in &s.const_arms {
                f(v);
            }
            for (_, v) in &s.block_arms {
                f(v);
            }
            if let Some(d) = &s.default {
                f(d);
            }
        }
        Expr::Stringswitch(s) => {
            f(&s.scrutinee);
            for (_, v) in &s.cases {
                f(v);
            }
            if let Some(d) = &s.default {
                f(d);
            }
        }
        Expr::Staticcatch(sc) => {
            f(&sc.body);
            f(&sc.handler);
        }
        Expr::Trywith(t) => {
            f(&t.body);
            f(&t.handler);
        }
        Expr::Ifthenelse(i) => {
            f(&i.cond);
            f(&i.then_branch);
            f(&i.else_branch);
        }
        Expr::Sequence(l1, l2) => {
            f(l1);
            f(l2);
        }
        Expr::While(w) => {
            f(&w.cond);
            f(&w.body);
        }
        Expr::For(fo) => {
            f(&fo.low);
            f(&fo.high);
            f(&fo.body);
        }
        Expr::Assign(_, e) => f(e),
        Expr::Send(s) => {
            f(&s.obj);
            s.args.iter().for_each(&mut f);
        }
        Expr::Event(e) => f(&e.term),
        Expr::Ifused(_, e) => f(e),
    }
}
