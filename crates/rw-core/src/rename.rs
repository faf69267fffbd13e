//! Alpha-renaming: total identifier substitution over a term.
//!
//! Used whenever a pass duplicates a subtree (exit-simplification's
//! handler inlining, TMC's direct/DPS duplication): the caller first mints
//! one fresh `Ident` per identifier *bound* in the duplicated region, then
//! calls `rename` with the old->new map covering every one of them. Because
//! the map already covers every bound name in the region, renaming both
//! binding occurrences and use occurrences uniformly is capture-avoiding
//! without needing a capture-avoiding substitution algorithm.

use std::collections::HashMap;

use crate::ident::Ident;
use crate::ir::*;

fn sub(map: &HashMap<Ident, Ident>, id: &Ident) -> Ident {
    map.get(id).cloned().unwrap_or_else(|| id.clone())
}

/// Rename every occurrence (binding or use) of an identifier present in
/// `subst`, leaving identifiers absent from `subst` untouched.
pub fn rename(subst: &HashMap<Ident, Ident>, term: &Term) -> Term {
    let expr: &Expr = term;
    let renamed = match expr {
        Expr::Var(v) => Expr::Var(sub(subst, v)),
        Expr::Const(c) => Expr::Const(c.clone()),
        Expr::Apply(a) => Expr::Apply(ApplyNode {
            func: rename(subst, &a.func),
            args: a.args.iter().map(|t| rename(subst, t)).collect(),
            loc: a.loc,
            tail_hint: a.tail_hint,
            inline_hint: a.inline_hint,
            tailcall: a.tailcall,
        }),
        Expr::Function(fun) => Expr::Function(FunctionNode {
            calling_convention: fun.calling_convention,
            params: fun
                .params
                .iter()
                .map(|(id, vk)| (sub(subst, id), *vk))
                .collect(),
            return_kind: fun.return_kind,
            body: rename(subst, &fun.body),
            attrs: fun.attrs,
            loc: fun.loc,
        }),
        Expr::Let(l) => Expr::Let(LetNode {
            binding_kind: l.binding_kind,
            value_kind: l.value_kind,
            id: sub(subst, &l.id),
            value: rename(subst, &l.value),
            body: rename(subst, &l.body),
        }),
        Expr::Letrec(lr) => Expr::Letrec(LetrecNode {
            bindings: lr
                .bindings
                .iter()
                .map(|(id, v)| (sub(subst, id), rename(subst, v)))
                .collect(),
            body: rename(subst, &lr.body),
        }),
        Expr::Prim(p) => Expr::Prim(PrimNode {
            prim: p.prim.clone(),
            args: p.args.iter().map(|t| rename(subst, t)).collect(),
            loc: p.loc,
        }),
        Expr::Switch(s) => Expr::Switch(SwitchNode {
            scrutinee: rename(subst, &s.scrutinee),
            const_arms: s
                .const_arms
                .iter()
                .map(|(k, v)| (*k, rename(subst, v)))
                .collect(),
            block_arms: s
                .block_arms
                .iter()
                .map(|(k, v)| (*k, rename(subst, v)))
                .collect(),
            default: s.default.as_ref().map(|t| rename(subst, t)),
            totals: s.totals,
        }),
        Expr::Stringswitch(s) => Expr::Stringswitch(StringswitchNode {
            scrutinee: rename(subst, &s.scrutinee),
            cases: s
                .cases
                .iter()
                .map(|(k, v)| (k.clone(), rename(subst, v)))
                .collect(),
            default: s.default.as_ref().map(|t| rename(subst, t)),
            loc: s.loc,
        }),
        Expr::Staticraise(r) => Expr::Staticraise(StaticraiseNode {
            label: r.label,
            args: r.args.iter().map(|t| rename(subst, t)).collect(),
        }),
        Expr::Staticcatch(sc) => Expr::Staticcatch(StaticcatchNode {
            body: rename(subst, &sc.body),
            label: sc.label,
            params: sc
                .params
                .iter()
                .map(|(id, vk)| (sub(subst, id), *vk))
                .collect(),
            handler: rename(subst, &sc.handler),
        }),
        Expr::Trywith(t) => Expr::Trywith(TrywithNode {
            body: rename(subst, &t.body),
            exn_var: sub(subst, &t.exn_var),
            handler: rename(subst, &t.handler),
        }),
        Expr::Ifthenelse(i) => Expr::Ifthenelse(IfthenelseNode {
            cond: rename(subst, &i.cond),
            then_branch: rename(subst, &i.then_branch),
            else_branch: rename(subst, &i.else_branch),
        }),
        Expr::Sequence(l1, l2) => Expr::Sequence(rename(subst, l1), rename(subst, l2)),
        Expr::While(w) => Expr::While(WhileNode {
            cond: rename(subst, &w.cond),
            body: rename(subst, &w.body),
        }),
        Expr::For(fo) => Expr::For(ForNode {
            var: sub(subst, &fo.var),
            low: rename(subst, &fo.low),
            high: rename(subst, &fo.high),
            direction: fo.direction,
            body: rename(subst, &fo.body),
        }),
        Expr::Assign(v, e) => Expr::Assign(sub(subst, v), rename(subst, e)),
        Expr::Send(s) => Expr::Send(SendNode {
            obj: rename(subst, &s.obj),
            method: s.method.clone(),
            args: s.args.iter().map(|t| rename(subst, t)).collect(),
            loc: s.loc,
        }),
        Expr::Event(e) => Expr::Event(EventNode {
            term: rename(subst, &e.term),
            loc: e.loc,
        }),
        Expr::Ifused(v, e) => Expr::Ifused(sub(subst, v), rename(subst, e)),
    };
    renamed.into_term()
}
