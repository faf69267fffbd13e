//! Exit simplification: contract `Staticcatch` nodes whose handler is
//! unreachable, singly-used, or a bare alias of another label.
//!
//! Two phases. Phase A (`count_raises`) is a single traversal that builds,
//! per `ExitLabel`, the number of syntactic `Staticraise` occurrences and
//! the deepest `Trywith` nesting any of them sits under. Phase B
//! (`rewrite`) walks the tree again, deciding at each `Staticcatch` whether
//! to drop it, record it as an alias, record it for inlining, or rebuild
//! it, consulting the phase A counts; `Staticraise` sites consult whatever
//! has been recorded so far for their label. Because a catch's decision is
//! recorded before its body is walked, a raise nested inside that body
//! always sees the decision already in the substitution table.

use std::collections::HashMap;

use rw_core::contract::try_beta_reduce;
use rw_core::diagnostics::Diagnostics;
use rw_core::ident::IdentGen;
use rw_core::ir::*;
use rw_core::rename::rename;
use rw_core::traversal::shallow_map;

#[derive(Clone, Copy, Default)]
struct RaiseInfo {
    count: u32,
    max_try_depth: u32,
}

enum ExitAction {
    Alias(ExitLabel),
    Inline {
        params: Vec<(rw_core::ident::Ident, ValueKind)>,
        handler: Term,
    },
}

/// Run exit simplification over `term`. `gen` mints the fresh formal-param
/// copies used when materializing an inlined handler at a raise site.
pub fn run(term: &Term, gen: &mut IdentGen, diags: &mut Diagnostics) -> Term {
    let mut counts: HashMap<ExitLabel, RaiseInfo> = HashMap::new();
    count_raises(term, 0, &mut counts);
    let mut subst: HashMap<ExitLabel, ExitAction> = HashMap::new();
    rewrite(term, 0, &counts, &mut subst, gen, diags)
}

fn alias_target(sc: &StaticcatchNode) -> Option<ExitLabel> {
    if !sc.params.is_empty() {
        return None;
    }
    match &*sc.handler {
        Expr::Staticraise(r) if r.args.is_empty() => Some(r.label),
        _ => None,
    }
}

fn count_raises(term: &Term, depth: u32, counts: &mut HashMap<ExitLabel, RaiseInfo>) {
    match &**term {
        Expr::Staticraise(r) => {
            let entry = counts.entry(r.label).or_default();
            entry.count += 1;
            entry.max_try_depth = entry.max_try_depth.max(depth);
            for a in &r.args {
                count_raises(a, depth, counts);
            }
        }
        Expr::Staticcatch(sc) => {
            count_raises(&sc.body, depth, counts);
            if let Some(j) = alias_target(sc) {
                let (i_count, i_depth) = counts
                    .get(&sc.label)
                    .map(|e| (e.count, e.max_try_depth))
                    .unwrap_or_default();
                let entry = counts.entry(j).or_default();
                entry.count += i_count;
                entry.max_try_depth = entry.max_try_depth.max(i_depth).max(depth);
            } else {
                count_raises(&sc.handler, depth, counts);
            }
        }
        Expr::Trywith(t) => {
            count_raises(&t.body, depth + 1, counts);
            count_raises(&t.handler, depth, counts);
        }
        Expr::Switch(s) => {
            count_raises(&s.scrutinee, depth, counts);
            for (_, v) in &s.const_arms {
                count_raises(v, depth, counts);
            }
            for (_, v) in &s.block_arms {
                count_raises(v, depth, counts);
            }
            if let Some(d) = &s.default {
                count_raises(d, depth, counts);
                if s.default_is_duplicated() {
                    count_raises(d, depth, counts);
                }
            }
        }
        other => rw_core::traversal::shallow_for_each(other, |c| count_raises(c, depth, counts)),
    }
}

fn rewrite(
    term: &Term,
    depth: u32,
    counts: &HashMap<ExitLabel, RaiseInfo>,
    subst: &mut HashMap<ExitLabel, ExitAction>,
    gen: &mut IdentGen,
    diags: &mut Diagnostics,
) -> Term {
    match &**term {
        Expr::Staticcatch(sc) => {
            let info = counts.get(&sc.label).copied().unwrap_or_default();
            if info.count == 0 {
                return rewrite(&sc.body, depth, counts, subst, gen, diags);
            }
            if let Some(j) = alias_target(sc) {
                subst.insert(sc.label, ExitAction::Alias(j));
                return rewrite(&sc.body, depth, counts, subst, gen, diags);
            }
            if info.count == 1 && info.max_try_depth <= depth {
                let handler = rewrite(&sc.handler, depth, counts, subst, gen, diags);
                subst.insert(
                    sc.label,
                    ExitAction::Inline {
                        params: sc.params.clone(),
                        handler,
                    },
                );
                return rewrite(&sc.body, depth, counts, subst, gen, diags);
            }
            let body = rewrite(&sc.body, depth, counts, subst, gen, diags);
            let handler = rewrite(&sc.handler, depth, counts, subst, gen, diags);
            Expr::Staticcatch(StaticcatchNode {
                body,
                label: sc.label,
                params: sc.params.clone(),
                handler,
            })
            .into_term()
        }
        Expr::Staticraise(r) => {
            let args: Vec<Term> = r
                .args
                .iter()
                .map(|a| rewrite(a, depth, counts, subst, gen, diags))
                .collect();
            let mut label = r.label;
            while let Some(ExitAction::Alias(j)) = subst.get(&label) {
                label = *j;
            }
            match subst.get(&label) {
                Some(ExitAction::Inline { params, handler }) => {
                    materialize(params, handler, args, gen)
                }
                _ => Expr::Staticraise(StaticraiseNode { label, args }).into_term(),
            }
        }
        Expr::Trywith(t) => {
            let body = rewrite(&t.body, depth + 1, counts, subst, gen, diags);
            let handler = rewrite(&t.handler, depth, counts, subst, gen, diags);
            Expr::Trywith(TrywithNode {
                body,
                exn_var: t.exn_var.clone(),
                handler,
            })
            .into_term()
        }
        Expr::Apply(a) => {
            let func = rewrite(&a.func, depth, counts, subst, gen, diags);
            let args: Vec<Term> = a
                .args
                .iter()
                .map(|x| rewrite(x, depth, counts, subst, gen, diags))
                .collect();
            if let Some(reduced) = try_beta_reduce(&func, &args) {
                return rewrite(&reduced, depth, counts, subst, gen, diags);
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
        Expr::Prim(p) => {
            let args: Vec<Term> = p
                .args
                .iter()
                .map(|x| rewrite(x, depth, counts, subst, gen, diags))
                .collect();
            match &p.prim {
                Primitive::Revapply => {
                    // args = [x, f]; Revapply(x, f) == Apply(f, [x]).
                    return merge_apply(args[1].clone(), vec![args[0].clone()], p.loc);
                }
                Primitive::Dirapply => {
                    // args = [f, x]; Dirapply(f, x) == Apply(f, [x]).
                    return merge_apply(args[0].clone(), vec![args[1].clone()], p.loc);
                }
                Primitive::Identity => return args[0].clone(),
                Primitive::ObjWithTag => {
                    if let Expr::Const(Constant::Int(tag)) = &*args[0] {
                        match &*args[1] {
                            Expr::Prim(inner) => {
                                if let Primitive::Makeblock { mutable, .. } = inner.prim {
                                    return Expr::Prim(PrimNode {
                                        prim: Primitive::Makeblock {
                                            tag: *tag as u32,
                                            mutable,
                                        },
                                        args: inner.args.clone(),
                                        loc: p.loc,
                                    })
                                    .into_term();
                                }
                            }
                            Expr::Const(Constant::Block(_, fields)) => {
                                return Expr::Const(Constant::Block(*tag as u32, fields.clone()))
                                    .into_term();
                            }
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
            Expr::Prim(PrimNode {
                prim: p.prim.clone(),
                args,
                loc: p.loc,
            })
            .into_term()
        }
        other => {
            shallow_map(other, |c| rewrite(c, depth, counts, subst, gen, diags)).into_term()
        }
    }
}

/// Fold `new_args` onto `f`'s argument list if `f` is itself an `Apply`
/// (the "folding into an existing Apply" clause of `Revapply`/`Dirapply`
/// contraction); otherwise build a fresh single-argument `Apply`.
fn merge_apply(f: Term, new_args: Vec<Term>, loc: Loc) -> Term {
    if let Expr::Apply(inner) = &*f {
        let mut args = inner.args.clone();
        args.extend(new_args);
        Expr::Apply(ApplyNode {
            func: inner.func.clone(),
            args,
            loc,
            tail_hint: inner.tail_hint,
            inline_hint: inner.inline_hint,
            tailcall: inner.tailcall,
        })
        .into_term()
    } else {
        Expr::Apply(ApplyNode {
            func: f,
            args: new_args,
            loc,
            tail_hint: false,
            inline_hint: Inline::default(),
            tailcall: TailcallAnnotation::default(),
        })
        .into_term()
    }
}

/// Materialize an inlined handler at a raise site: fresh copies of the
/// formals, bound in argument order, wrapping an alpha-renamed handler.
/// Every materialization mints its own fresh names, so a handler inlined
/// at two raise sites via an alias chain is duplicated safely.
fn materialize(
    params: &[(rw_core::ident::Ident, ValueKind)],
    handler: &Term,
    args: Vec<Term>,
    gen: &mut IdentGen,
) -> Term {
    let mut id_subst = HashMap::new();
    let mut fresh_params = Vec::with_capacity(params.len());
    for (id, vk) in params {
        let fresh = gen.rename_of(id);
        id_subst.insert(id.clone(), fresh.clone());
        fresh_params.push((fresh, *vk));
    }
    let renamed_handler = rename(&id_subst, handler);
    let bindings = fresh_params
        .into_iter()
        .zip(args)
        .map(|((id, vk), arg)| (id, vk, arg))
        .collect();
    let_chain(bindings, renamed_handler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rw_core::ident::IdentGen;

    fn raise0(label: u32) -> Term {
        Expr::Staticraise(StaticraiseNode {
            label: ExitLabel(label),
            args: vec![],
        })
        .into_term()
    }

    #[test]
    fn unreachable_catch_is_dropped() {
        let mut gen = IdentGen::new();
        let mut diags = Diagnostics::new();
        let body = Expr::Const(Constant::Int(1)).into_term();
        let term = Expr::Staticcatch(StaticcatchNode {
            body: body.clone(),
            label: ExitLabel(0),
            params: vec![],
            handler: Expr::Const(Constant::Int(2)).into_term(),
        })
        .into_term();
        let out = run(&term, &mut gen, &mut diags);
        assert_eq!(out, body);
    }

    #[test]
    fn alias_chain_is_collapsed_to_final_target() {
        let mut gen = IdentGen::new();
        let mut diags = Diagnostics::new();
        // catch 0 { raise 0 } with { raise 1 }   -- alias 0 -> 1
        // catch 1 { <above> } with { 42 }
        let inner = Expr::Staticcatch(StaticcatchNode {
            body: raise0(0),
            label: ExitLabel(0),
            params: vec![],
            handler: raise0(1),
        })
        .into_term();
        let outer = Expr::Staticcatch(StaticcatchNode {
            body: inner,
            label: ExitLabel(1),
            params: vec![],
            handler: Expr::Const(Constant::Int(42)).into_term(),
        })
        .into_term();
        let out = run(&outer, &mut gen, &mut diags);
        assert_eq!(out, Expr::Const(Constant::Int(42)).into_term());
    }

    #[test]
    fn identity_primitive_is_removed() {
        let mut gen = IdentGen::new();
        let mut diags = Diagnostics::new();
        let inner = Expr::Const(Constant::Int(7)).into_term();
        let term = Expr::Prim(PrimNode {
            prim: Primitive::Identity,
            args: vec![inner.clone()],
            loc: Loc::UNKNOWN,
        })
        .into_term();
        assert_eq!(run(&term, &mut gen, &mut diags), inner);
    }

    #[test]
    fn obj_with_tag_on_makeblock_contracts() {
        let mut gen = IdentGen::new();
        let mut diags = Diagnostics::new();
        let block = Expr::Prim(PrimNode {
            prim: Primitive::Makeblock {
                tag: 0,
                mutable: false,
            },
            args: vec![Expr::Const(Constant::Int(9)).into_term()],
            loc: Loc::UNKNOWN,
        })
        .into_term();
        let term = Expr::Prim(PrimNode {
            prim: Primitive::ObjWithTag,
            args: vec![Expr::Const(Constant::Int(3)).into_term(), block],
            loc: Loc::UNKNOWN,
        })
        .into_term();
        let out = run(&term, &mut gen, &mut diags);
        match &*out {
            Expr::Prim(p) => assert_eq!(
                p.prim,
                Primitive::Makeblock {
                    tag: 3,
                    mutable: false
                }
            ),
            other => panic!("expected Prim(Makeblock), got {other:?}"),
        }
    }
}
