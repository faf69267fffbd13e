//! Tail Modulo Cons: synthesizes a destination-passing-style companion for
//! each TMC-candidate function in a `Letrec`, turning calls whose
//! continuation is a constructor into true tail calls.
//!
//! The traversal builds a [`choice::Choice`] per subterm of a candidate's
//! body (its direct form plus a deferred DPS form), resolving `Makeblock`
//! ambiguity and the evaluation-order/affinity-guard rules along the way,
//! then materializes both the direct and DPS function bodies once the
//! traversal reaches the candidate's root.

mod choice;

use std::collections::HashMap;

use rw_core::config::Config;
use rw_core::diagnostics::{Diagnostics, WarningKind};
use rw_core::error::{RewriteError, RewriteResult};
use rw_core::ident::{Ident, IdentGen};
use rw_core::ir::*;
use rw_core::rename;
use rw_core::traversal::shallow_for_each;

use choice::{materialize_chain, ret, Choice, ConstrFrame, Dst};

pub fn run(term: &Term, config: &Config, gen: &mut IdentGen, diags: &mut Diagnostics) -> RewriteResult<Term> {
    rewrite(term, config, gen, diags)
}

fn rewrite(term: &Term, config: &Config, gen: &mut IdentGen, diags: &mut Diagnostics) -> RewriteResult<Term> {
    match &**term {
        Expr::Letrec(lr) => rewrite_letrec(lr, config, gen, diags),
        other => Ok(shallow_map_result(other, |c| rewrite(c, config, gen, diags))?.into_term()),
    }
}

struct Candidate {
    id: Ident,
    dps_id: Ident,
    arity: usize,
    params: Vec<(Ident, ValueKind)>,
    return_kind: ValueKind,
    body: Term,
    attrs: FunctionAttrs,
    loc: Loc,
}

fn rewrite_letrec(
    lr: &LetrecNode,
    config: &Config,
    gen: &mut IdentGen,
    diags: &mut Diagnostics,
) -> RewriteResult<Term> {
    let mut candidates: HashMap<Ident, Candidate> = HashMap::new();

    for (id, value) in &lr.bindings {
        let is_function = matches!(&**value, Expr::Function(_));
        let wants_tmc = match &**value {
            Expr::Function(fun) => fun.attrs.tmc_candidate || config.force_tmc,
            _ => false,
        };
        if is_function && wants_tmc {
            let Expr::Function(fun) = &**value else { unreachable!() };
            let dps_id = gen.rename_of(id);
            candidates.insert(
                id.clone(),
                Candidate {
                    id: id.clone(),
                    dps_id,
                    arity: fun.params.len(),
                    params: fun.params.clone(),
                    return_kind: fun.return_kind,
                    body: fun.body.clone(),
                    attrs: fun.attrs,
                    loc: fun.loc,
                },
            );
        }
    }

    if candidates.is_empty() {
        // No TMC work at this Letrec; still recurse into each binding and
        // the body looking for nested Letrecs.
        let bindings = lr
            .bindings
            .iter()
            .map(|(id, v)| Ok((id.clone(), rewrite(v, config, gen, diags)?)))
            .collect::<RewriteResult<Vec<_>>>()?;
        let body = rewrite(&lr.body, config, gen, diags)?;
        return Ok(Expr::Letrec(LetrecNode { bindings, body }).into_term());
    }

    // Built per candidate: (direct Function term, dps Function term).
    let mut built: HashMap<Ident, (Term, Term)> = HashMap::new();
    for (id, cand) in candidates.iter() {
        let choice = build_choice(&cand.body, &candidates, gen, diags)?;
        if !choice.has_tmc_calls {
            diags.warn(WarningKind::UnusedTmcAttribute, cand.loc);
        }

        let direct_fn = Expr::Function(FunctionNode {
            calling_convention: CallingConvention::Curried,
            params: cand.params.clone(),
            return_kind: cand.return_kind,
            body: choice.direct.clone(),
            attrs: cand.attrs,
            loc: cand.loc,
        })
        .into_term();

        let dst_var = gen.fresh("dst");
        let offset_id = gen.fresh("offset");
        let dst = Dst {
            var: dst_var.clone(),
            offset: Expr::Var(offset_id.clone()).into_term(),
        };
        let dps_raw = choice.materialize_dps(&dst, gen);
        let dps_body = fully_rename(&dps_raw, gen);

        let mut dps_params = vec![(dst_var, ValueKind::Pgenval), (offset_id, ValueKind::Pintval)];
        dps_params.extend(cand.params.clone());
        let dps_fn = Expr::Function(FunctionNode {
            calling_convention: CallingConvention::Curried,
            params: dps_params,
            return_kind: ValueKind::Pgenval,
            body: dps_body,
            attrs: FunctionAttrs {
                local: cand.attrs.local,
                inline: cand.attrs.inline,
                tmc_candidate: false,
            },
            loc: cand.loc,
        })
        .into_term();

        built.insert(id.clone(), (direct_fn, dps_fn));
    }

    // Preserve the original declared order for non-candidate bindings,
    // splicing each candidate's direct binding followed by its DPS
    // companion in place of the original single binding.
    let mut ordered = Vec::with_capacity(lr.bindings.len() + candidates.len());
    for (id, value) in &lr.bindings {
        if let Some(cand) = candidates.get(id) {
            let (direct, dps) = built.remove(id).unwrap();
            ordered.push((id.clone(), direct));
            ordered.push((cand.dps_id.clone(), dps));
        } else {
            ordered.push((id.clone(), rewrite(value, config, gen, diags)?));
        }
    }

    // Calls to a candidate from outside its own body see only the direct
    // binding (its name is unchanged), so the continuation needs no
    // candidate-aware rewriting beyond the ordinary recursive pass.
    let body = rewrite(&lr.body, config, gen, diags)?;
    Ok(Expr::Letrec(LetrecNode { bindings: ordered, body }).into_term())
}

fn build_choice(
    term: &Term,
    candidates: &HashMap<Ident, Candidate>,
    gen: &mut IdentGen,
    diags: &mut Diagnostics,
) -> RewriteResult<Choice> {
    match &**term {
        Expr::Apply(a) => build_apply_choice(a, term, candidates, gen, diags),
        Expr::Prim(p) if matches!(p.prim, Primitive::Makeblock { .. }) => {
            build_makeblock_choice(p, candidates, gen, diags)
        }
        Expr::Sequence(l1, l2) => {
            let before = plain_rewrite(l1, candidates, gen, diags)?;
            let tail = build_choice(l2, candidates, gen, diags)?;
            Ok(Choice {
                direct: Expr::Sequence(before.clone(), tail.direct.clone()).into_term(),
                dps: {
                    let before = before.clone();
                    let inner = tail.dps.clone();
                    std::rc::Rc::new(move |delayed, t, dst, gen| {
                        Expr::Sequence(before.clone(), inner(delayed, t, dst, gen)).into_term()
                    })
                },
                delayed_use_count: tail.delayed_use_count,
                has_tmc_calls: tail.has_tmc_calls,
                benefits_from_dps: tail.benefits_from_dps,
                explicit_tailcall_request: tail.explicit_tailcall_request,
            })
        }
        Expr::Let(l) => {
            let value = plain_rewrite(&l.value, candidates, gen, diags)?;
            let tail = build_choice(&l.body, candidates, gen, diags)?;
            let (binding_kind, value_kind, id) = (l.binding_kind, l.value_kind, l.id.clone());
            Ok(Choice {
                direct: Expr::Let(LetNode {
                    binding_kind,
                    value_kind,
                    id: id.clone(),
                    value: value.clone(),
                    body: tail.direct.clone(),
                })
                .into_term(),
                dps: {
                    let value = value.clone();
                    let id = id.clone();
                    let inner = tail.dps.clone();
                    std::rc::Rc::new(move |delayed, t, dst, gen| {
                        Expr::Let(LetNode {
                            binding_kind,
                            value_kind,
                            id: id.clone(),
                            value: value.clone(),
                            body: inner(delayed, t, dst, gen),
                        })
                        .into_term()
                    })
                },
                delayed_use_count: tail.delayed_use_count,
                has_tmc_calls: tail.has_tmc_calls,
                benefits_from_dps: tail.benefits_from_dps,
                explicit_tailcall_request: tail.explicit_tailcall_request,
            })
        }
        Expr::Ifthenelse(i) => {
            let cond = plain_rewrite(&i.cond, candidates, gen, diags)?;
            let then_c = build_choice(&i.then_branch, candidates, gen, diags)?;
            let else_c = build_choice(&i.else_branch, candidates, gen, diags)?;
            combine_two(then_c, else_c, move |a, b| {
                Expr::Ifthenelse(IfthenelseNode {
                    cond: cond.clone(),
                    then_branch: a,
                    else_branch: b,
                })
                .into_term()
            })
        }
        Expr::Staticcatch(sc) => {
            let body_c = build_choice(&sc.body, candidates, gen, diags)?;
            let handler_c = build_choice(&sc.handler, candidates, gen, diags)?;
            let label = sc.label;
            let params = sc.params.clone();
            combine_two(body_c, handler_c, move |a, b| {
                Expr::Staticcatch(StaticcatchNode {
                    body: a,
                    label,
                    params: params.clone(),
                    handler: b,
                })
                .into_term()
            })
        }
        Expr::Switch(s) => {
            let scrutinee = plain_rewrite(&s.scrutinee, candidates, gen, diags)?;
            let mut const_choices = Vec::with_capacity(s.const_arms.len());
            for (k, v) in &s.const_arms {
                const_choices.push((*k, build_choice(v, candidates, gen, diags)?));
            }
            let mut block_choices = Vec::with_capacity(s.block_arms.len());
            for (k, v) in &s.block_arms {
                block_choices.push((*k, build_choice(v, candidates, gen, diags)?));
            }
            let default_choice = s
                .default
                .as_ref()
                .map(|d| build_choice(d, candidates, gen, diags))
                .transpose()?;

            combine_switch(scrutinee, s.totals, const_choices, block_choices, default_choice)
        }
        Expr::Stringswitch(s) => {
            let scrutinee = plain_rewrite(&s.scrutinee, candidates, gen, diags)?;
            let mut case_choices = Vec::with_capacity(s.cases.len());
            for (k, v) in &s.cases {
                case_choices.push((k.clone(), build_choice(v, candidates, gen, diags)?));
            }
            let default_choice = s
                .default
                .as_ref()
                .map(|d| build_choice(d, candidates, gen, diags))
                .transpose()?;
            combine_stringswitch(scrutinee, case_choices, default_choice, s.loc)
        }
        Expr::Trywith(t) => {
            let body = plain_rewrite(&t.body, candidates, gen, diags)?;
            let handler_c = build_choice(&t.handler, candidates, gen, diags)?;
            let exn_var = t.exn_var.clone();
            Ok(Choice {
                direct: Expr::Trywith(TrywithNode {
                    body: body.clone(),
                    exn_var: exn_var.clone(),
                    handler: handler_c.direct.clone(),
                })
                .into_term(),
                dps: {
                    let body = body.clone();
                    let exn_var = exn_var.clone();
                    let inner = handler_c.dps.clone();
                    std::rc::Rc::new(move |delayed, tail, dst, gen| {
                        Expr::Trywith(TrywithNode {
                            body: body.clone(),
                            exn_var: exn_var.clone(),
                            handler: inner(delayed, tail, dst, gen),
                        })
                        .into_term()
                    })
                },
                delayed_use_count: handler_c.delayed_use_count,
                has_tmc_calls: handler_c.has_tmc_calls,
                benefits_from_dps: handler_c.benefits_from_dps,
                explicit_tailcall_request: handler_c.explicit_tailcall_request,
            })
        }
        // Terminal: Var, Const, Function, Send, Assign, For, While, Staticraise,
        // Ifused, and any other primitive.
        _ => Ok(ret(plain_rewrite(term, candidates, gen, diags)?)),
    }
}

/// Process a subterm that is not itself in tail position of any candidate
/// (a `Let`/`Sequence`/`Ifthenelse` scrutinee, an `Apply` argument, ...):
/// fully resolved via the ordinary top-level rewrite, which recurses into
/// any nested `Letrec` it finds but otherwise leaves direct calls as-is.
fn plain_rewrite(
    term: &Term,
    candidates: &HashMap<Ident, Candidate>,
    gen: &mut IdentGen,
    diags: &mut Diagnostics,
) -> RewriteResult<Term> {
    match &**term {
        Expr::Letrec(lr) => {
            // A nested Letrec's own candidates are a wholly separate TMC
            // problem; config only affects force_tmc/native_code, which are
            // not observable from here, so thread a permissive default.
            rewrite_letrec(lr, &Config { native_code: true, debug: false, annotations: false, force_tmc: false }, gen, diags)
        }
        other => Ok(shallow_map_result(other, |c| plain_rewrite(c, candidates, gen, diags))?.into_term()),
    }
}

fn build_apply_choice(
    a: &ApplyNode,
    term: &Term,
    candidates: &HashMap<Ident, Candidate>,
    gen: &mut IdentGen,
    diags: &mut Diagnostics,
) -> RewriteResult<Choice> {
    let target = match &*a.func {
        Expr::Var(id) => candidates.get(id),
        _ => None,
    };
    let eligible = target.filter(|c| c.arity == a.args.len() && a.tailcall != TailcallAnnotation::Disabled);

    let rewritten_args = a
        .args
        .iter()
        .map(|x| plain_rewrite(x, candidates, gen, diags))
        .collect::<RewriteResult<Vec<_>>>()?;

    match eligible {
        None => {
            if target.is_some() && a.tail_hint {
                // A call to a TMC candidate that can't take the DPS path
                // (wrong arity, or `@tailcall false`) keeps its direct tail
                // call, but the candidate's other call sites may still
                // move this one's continuation into non-tail position.
                diags.warn(WarningKind::TmcBreaksTailcall, a.loc);
            }
            Ok(ret(plain_rewrite(term, candidates, gen, diags)?))
        }
        Some(cand) => {
            let dps_id = cand.dps_id.clone();
            let explicit = a.tailcall == TailcallAnnotation::ExplicitRequest;
            let loc = a.loc;
            let direct = Expr::Apply(ApplyNode {
                func: Expr::Var(cand.id.clone()).into_term(),
                args: rewritten_args.clone(),
                loc,
                tail_hint: a.tail_hint,
                inline_hint: a.inline_hint,
                tailcall: a.tailcall,
            })
            .into_term();
            Ok(Choice {
                direct,
                dps: std::rc::Rc::new(move |delayed, tail, dst, gen| {
                    let dps_id = dps_id.clone();
                    let args = rewritten_args.clone();
                    materialize_chain(
                        delayed,
                        dst,
                        move |d, _gen| {
                            let mut call_args = vec![Expr::Var(d.var.clone()).into_term(), d.offset.clone()];
                            call_args.extend(args);
                            Expr::Apply(ApplyNode {
                                func: Expr::Var(dps_id).into_term(),
                                args: call_args,
                                loc,
                                tail_hint: tail,
                                inline_hint: Inline::default(),
                                tailcall: if tail {
                                    TailcallAnnotation::ExplicitRequest
                                } else {
                                    TailcallAnnotation::None
                                },
                            })
                            .into_term()
                        },
                        gen,
                    )
                }),
                delayed_use_count: 1,
                has_tmc_calls: true,
                benefits_from_dps: true,
                explicit_tailcall_request: explicit,
            })
        }
    }
}

fn build_makeblock_choice(
    p: &PrimNode,
    candidates: &HashMap<Ident, Candidate>,
    gen: &mut IdentGen,
    diags: &mut Diagnostics,
) -> RewriteResult<Choice> {
    let Primitive::Makeblock { tag, mutable } = p.prim else {
        unreachable!()
    };
    let mut arg_choices = Vec::with_capacity(p.args.len());
    for a in &p.args {
        arg_choices.push(build_choice(a, candidates, gen, diags)?);
    }

    let bearing: Vec<usize> = arg_choices
        .iter()
        .enumerate()
        .filter(|(_, c)| c.has_tmc_calls)
        .map(|(i, _)| i)
        .collect();

    let chosen_idx = match bearing.len() {
        0 => None,
        1 => Some(bearing[0]),
        _ => {
            let flagged: Vec<usize> = bearing
                .iter()
                .copied()
                .filter(|&i| arg_choices[i].explicit_tailcall_request)
                .collect();
            if flagged.len() == 1 {
                Some(flagged[0])
            } else {
                return Err(RewriteError::AmbiguousConstructorArguments(p.loc));
            }
        }
    };

    match chosen_idx {
        None => {
            let direct = Expr::Prim(PrimNode {
                prim: Primitive::Makeblock { tag, mutable },
                args: arg_choices.iter().map(|c| c.direct.clone()).collect(),
                loc: p.loc,
            })
            .into_term();
            Ok(ret(direct))
        }
        Some(k) => {
            let before: Vec<Term> = arg_choices[..k].iter().map(|c| c.direct.clone()).collect();
            let after: Vec<Term> = arg_choices[k + 1..].iter().map(|c| c.direct.clone()).collect();
            let chosen = &arg_choices[k];

            let direct = if !chosen.benefits_from_dps {
                let mut fields = before.clone();
                fields.push(chosen.direct.clone());
                fields.extend(after.clone());
                Expr::Prim(PrimNode {
                    prim: Primitive::Makeblock { tag, mutable },
                    args: fields,
                    loc: p.loc,
                })
                .into_term()
            } else {
                let tmp = gen.fresh("tmc_direct_blk");
                let mut fields = before.clone();
                fields.push(Expr::Const(Constant::Int(0)).into_term());
                fields.extend(after.clone());
                let block = Expr::Prim(PrimNode {
                    prim: Primitive::Makeblock { tag, mutable },
                    args: fields,
                    loc: p.loc,
                })
                .into_term();
                let leaf_dst = Dst {
                    var: tmp.clone(),
                    offset: Expr::Const(Constant::Int(k as i64)).into_term(),
                };
                let fill = chosen.materialize_dps(&leaf_dst, gen);
                Expr::Let(LetNode {
                    binding_kind: BindingKind::Strict,
                    value_kind: ValueKind::Pblockval,
                    id: tmp.clone(),
                    value: block,
                    body: Expr::Sequence(fill, Expr::Var(tmp).into_term()).into_term(),
                })
                .into_term()
            };

            let (before_simple, before_binds) = bind_simple(before, gen);
            let (after_simple, after_binds) = bind_simple(after, gen);
            let frame = ConstrFrame {
                tag,
                mutable,
                before: before_simple,
                after: after_simple,
                loc: p.loc,
            };
            let all_binds: Vec<(Ident, ValueKind, Term)> = before_binds
                .into_iter()
                .chain(after_binds)
                .map(|(id, v)| (id, ValueKind::Pgenval, v))
                .collect();

            let chosen_dps = chosen.dps.clone();
            let explicit_tailcall_request = chosen.explicit_tailcall_request;
            let delayed_use_count = chosen.delayed_use_count;
            Ok(Choice {
                direct,
                dps: std::rc::Rc::new(move |delayed, tail, dst, gen| {
                    let mut extended = delayed.to_vec();
                    extended.push(frame.clone());
                    let inner = (chosen_dps)(&extended, tail, dst, gen);
                    let_chain(all_binds.clone(), inner)
                }),
                delayed_use_count,
                has_tmc_calls: true,
                benefits_from_dps: true,
                explicit_tailcall_request,
            })
        }
    }
}

fn bind_simple(args: Vec<Term>, gen: &mut IdentGen) -> (Vec<Term>, Vec<(Ident, Term)>) {
    let mut simple = Vec::with_capacity(args.len());
    let mut bindings = Vec::new();
    for a in args {
        match &*a {
            Expr::Var(_) | Expr::Const(_) => simple.push(a),
            _ => {
                let id = gen.fresh("tmc_arg");
                bindings.push((id.clone(), a));
                simple.push(Expr::Var(id).into_term());
            }
        }
    }
    (simple, bindings)
}

/// Combine two tail-position choices under a binary node (`Ifthenelse`'s
/// two branches, `Staticcatch`'s body and handler). Applies the affinity
/// guard: if both arms could independently consume a deferred frame
/// stack, reify it once here instead of duplicating the allocation into
/// both arms.
fn combine_two(a: Choice, b: Choice, rebuild: impl Fn(Term, Term) -> Term + 'static) -> RewriteResult<Choice> {
    let direct = rebuild(a.direct.clone(), b.direct.clone());
    let has_tmc_calls = a.has_tmc_calls || b.has_tmc_calls;
    let benefits_from_dps = a.benefits_from_dps || b.benefits_from_dps;
    let explicit_tailcall_request = a.explicit_tailcall_request || b.explicit_tailcall_request;
    let combined_count = a.delayed_use_count + b.delayed_use_count;
    let reify = combined_count > 1;

    let a_dps = a.dps.clone();
    let b_dps = b.dps.clone();
    let rebuild = std::rc::Rc::new(rebuild);

    let dps: choice::DpsCode = if reify {
        let rebuild = rebuild.clone();
        std::rc::Rc::new(move |delayed, tail, dst, gen| {
            let rebuild = rebuild.clone();
            let a_dps = a_dps.clone();
            let b_dps = b_dps.clone();
            materialize_chain(
                delayed,
                dst,
                move |inner_dst, gen| {
                    rebuild(
                        a_dps(&[], tail, inner_dst, gen),
                        b_dps(&[], tail, inner_dst, gen),
                    )
                },
                gen,
            )
        })
    } else {
        std::rc::Rc::new(move |delayed, tail, dst, gen| {
            rebuild(
                a_dps(delayed, tail, dst, gen),
                b_dps(delayed, tail, dst, gen),
            )
        })
    };

    Ok(Choice {
        direct,
        dps,
        delayed_use_count: if reify { 1 } else { combined_count },
        has_tmc_calls,
        benefits_from_dps,
        explicit_tailcall_request,
    })
}

fn combine_switch(
    scrutinee: Term,
    totals: SwitchTotals,
    const_choices: Vec<(i64, Choice)>,
    block_choices: Vec<(u32, Choice)>,
    default_choice: Option<Choice>,
) -> RewriteResult<Choice> {
    let combined_count: u32 = const_choices.iter().map(|(_, c)| c.delayed_use_count).sum::<u32>()
        + block_choices.iter().map(|(_, c)| c.delayed_use_count).sum::<u32>()
        + default_choice.as_ref().map_or(0, |c| c.delayed_use_count);
    let reify = combined_count > 1;

    let has_tmc_calls = const_choices.iter().any(|(_, c)| c.has_tmc_calls)
        || block_choices.iter().any(|(_, c)| c.has_tmc_calls)
        || default_choice.as_ref().is_some_and(|c| c.has_tmc_calls);
    let benefits_from_dps = const_choices.iter().any(|(_, c)| c.benefits_from_dps)
        || block_choices.iter().any(|(_, c)| c.benefits_from_dps)
        || default_choice.as_ref().is_some_and(|c| c.benefits_from_dps);
    let explicit_tailcall_request = const_choices.iter().any(|(_, c)| c.explicit_tailcall_request)
        || block_choices.iter().any(|(_, c)| c.explicit_tailcall_request)
        || default_choice.as_ref().is_some_and(|c| c.explicit_tailcall_request);

    let direct = Expr::Switch(SwitchNode {
        scrutinee: scrutinee.clone(),
        const_arms: const_choices.iter().map(|(k, c)| (*k, c.direct.clone())).collect(),
        block_arms: block_choices.iter().map(|(k, c)| (*k, c.direct.clone())).collect(),
        default: default_choice.as_ref().map(|c| c.direct.clone()),
        totals,
    })
    .into_term();

    let const_dps: Vec<(i64, choice::DpsCode)> = const_choices.iter().map(|(k, c)| (*k, c.dps.clone())).collect();
    let block_dps: Vec<(u32, choice::DpsCode)> = block_choices.iter().map(|(k, c)| (*k, c.dps.clone())).collect();
    let default_dps = default_choice.as_ref().map(|c| c.dps.clone());

    let dps: choice::DpsCode = if reify {
        std::rc::Rc::new(move |delayed, tail, dst, gen| {
            let scrutinee = scrutinee.clone();
            let const_dps = const_dps.clone();
            let block_dps = block_dps.clone();
            let default_dps = default_dps.clone();
            materialize_chain(
                delayed,
                dst,
                move |inner_dst, gen| {
                    Expr::Switch(SwitchNode {
                        scrutinee,
                        const_arms: const_dps.iter().map(|(k, f)| (*k, f(&[], tail, inner_dst, gen))).collect(),
                        block_arms: block_dps.iter().map(|(k, f)| (*k, f(&[], tail, inner_dst, gen))).collect(),
                        default: default_dps.as_ref().map(|f| f(&[], tail, inner_dst, gen)),
                        totals,
                    })
                    .into_term()
                },
                gen,
            )
        })
    } else {
        std::rc::Rc::new(move |delayed, tail, dst, gen| {
            Expr::Switch(SwitchNode {
                scrutinee: scrutinee.clone(),
                const_arms: const_dps.iter().map(|(k, f)| (*k, f(delayed, tail, dst, gen))).collect(),
                block_arms: block_dps.iter().map(|(k, f)| (*k, f(delayed, tail, dst, gen))).collect(),
                default: default_dps.as_ref().map(|f| f(delayed, tail, dst, gen)),
                totals,
            })
            .into_term()
        })
    };

    Ok(Choice {
        direct,
        dps,
        delayed_use_count: if reify { 1 } else { combined_count },
        has_tmc_calls,
        benefits_from_dps,
        explicit_tailcall_request,
    })
}

fn combine_stringswitch(
    scrutinee: Term,
    case_choices: Vec<(String, Choice)>,
    default_choice: Option<Choice>,
    loc: Loc,
) -> RewriteResult<Choice> {
    let combined_count: u32 = case_choices.iter().map(|(_, c)| c.delayed_use_count).sum::<u32>()
        + default_choice.as_ref().map_or(0, |c| c.delayed_use_count);
    let reify = combined_count > 1;

    let has_tmc_calls = case_choices.iter().any(|(_, c)| c.has_tmc_calls)
        || default_choice.as_ref().is_some_and(|c| c.has_tmc_calls);
    let benefits_from_dps = case_choices.iter().any(|(_, c)| c.benefits_from_dps)
        || default_choice.as_ref().is_some_and(|c| c.benefits_from_dps);
    let explicit_tailcall_request = case_choices.iter().any(|(_, c)| c.explicit_tailcall_request)
        || default_choice.as_ref().is_some_and(|c| c.explicit_tailcall_request);

    let direct = Expr::Stringswitch(StringswitchNode {
        scrutinee: scrutinee.clone(),
        cases: case_choices.iter().map(|(k, c)| (k.clone(), c.direct.clone())).collect(),
        default: default_choice.as_ref().map(|c| c.direct.clone()),
        loc,
    })
    .into_term();

    let case_dps: Vec<(String, choice::DpsCode)> = case_choices.iter().map(|(k, c)| (k.clone(), c.dps.clone())).collect();
    let default_dps = default_choice.as_ref().map(|c| c.dps.clone());

    let dps: choice::DpsCode = if reify {
        std::rc::Rc::new(move |delayed, tail, dst, gen| {
            let scrutinee = scrutinee.clone();
            let case_dps = case_dps.clone();
            let default_dps = default_dps.clone();
            materialize_chain(
                delayed,
                dst,
                move |inner_dst, gen| {
                    Expr::Stringswitch(StringswitchNode {
                        scrutinee,
                        cases: case_dps.iter().map(|(k, f)| (k.clone(), f(&[], tail, inner_dst, gen))).collect(),
                        default: default_dps.as_ref().map(|f| f(&[], tail, inner_dst, gen)),
                        loc,
                    })
                    .into_term()
                },
                gen,
            )
        })
    } else {
        std::rc::Rc::new(move |delayed, tail, dst, gen| {
            Expr::Stringswitch(StringswitchNode {
                scrutinee: scrutinee.clone(),
                cases: case_dps.iter().map(|(k, f)| (k.clone(), f(delayed, tail, dst, gen))).collect(),
                default: default_dps.as_ref().map(|f| f(delayed, tail, dst, gen)),
                loc,
            })
            .into_term()
        })
    };

    Ok(Choice {
        direct,
        dps,
        delayed_use_count: if reify { 1 } else { combined_count },
        has_tmc_calls,
        benefits_from_dps,
        explicit_tailcall_request,
    })
}

fn collect_bound(term: &Term, out: &mut Vec<Ident>) {
    match &**term {
        Expr::Function(fun) => {
            out.extend(fun.params.iter().map(|(id, _)| id.clone()));
            collect_bound(&fun.body, out);
        }
        Expr::Let(l) => {
            out.push(l.id.clone());
            collect_bound(&l.value, out);
            collect_bound(&l.body, out);
        }
        Expr::Letrec(lr) => {
            for (id, v) in &lr.bindings {
                out.push(id.clone());
                collect_bound(v, out);
            }
            collect_bound(&lr.body, out);
        }
        Expr::Staticcatch(sc) => {
            collect_bound(&sc.body, out);
            out.extend(sc.params.iter().map(|(id, _)| id.clone()));
            collect_bound(&sc.handler, out);
        }
        Expr::Trywith(t) => {
            collect_bound(&t.body, out);
            out.push(t.exn_var.clone());
            collect_bound(&t.handler, out);
        }
        Expr::For(fo) => {
            collect_bound(&fo.low, out);
            collect_bound(&fo.high, out);
            out.push(fo.var.clone());
            collect_bound(&fo.body, out);
        }
        other => shallow_for_each(other, |c| collect_bound(c, out)),
    }
}

/// Alpha-rename every locally bound identifier in `term` to a fresh one,
/// leaving free references (sibling candidate names, the eventual
/// `dst`/`offset` parameters) untouched. Used once per candidate so its
/// DPS body shares no bound identifier with its direct body.
fn fully_rename(term: &Term, gen: &mut IdentGen) -> Term {
    let mut bound = Vec::new();
    collect_bound(term, &mut bound);
    let mut subst = HashMap::new();
    for id in bound {
        subst.entry(id.clone()).or_insert_with(|| gen.rename_of(&id));
    }
    rename::rename(&subst, term)
}

fn shallow_map_result(expr: &Expr, mut f: impl FnMut(&Term) -> RewriteResult<Term>) -> RewriteResult<Expr> {
    Ok(match expr {
        Expr::Var(_) | Expr::Const(_) => expr.clone(),
        Expr::Staticraise(r) => Expr::Staticraise(StaticraiseNode {
            label: r.label,
            args: r.args.iter().map(&mut f).collect::<RewriteResult<_>>()?,
        }),
        Expr::Apply(a) => Expr::Apply(ApplyNode {
            func: f(&a.func)?,
            args: a.args.iter().map(&mut f).collect::<RewriteResult<_>>()?,
            loc: a.loc,
            tail_hint: a.tail_hint,
            inline_hint: a.inline_hint,
            tailcall: a.tailcall,
        }),
        Expr::Function(fun) => Expr::Function(FunctionNode {
            calling_convention: fun.calling_convention,
            params: fun.params.clone(),
            return_kind: fun.return_kind,
            body: f(&fun.body)?,
            attrs: fun.attrs,
            loc: fun.loc,
        }),
        Expr::Let(l) => Expr::Let(LetNode {
            binding_kind: l.binding_kind,
            value_kind: l.value_kind,
            id: l.id.clone(),
            value: f(&l.value)?,
            body: f(&l.body)?,
        }),
        Expr::Letrec(lr) => Expr::Letrec(LetrecNode {
            bindings: lr
                .bindings
                .iter()
                .map(|(id, v)| Ok((id.clone(), f(v)?)))
                .collect::<RewriteResult<_>>()?,
            body: f(&lr.body)?,
        }),
        Expr::Prim(p) => Expr::Prim(PrimNode {
            prim: p.prim.clone(),
            args: p.args.iter().map(&mut f).collect::<RewriteResult<_>>()?,
            loc: p.loc,
        }),
        Expr::Switch(s) => Expr::Switch(SwitchNode {
            scrutinee: f(&s.scrutinee)?,
            const_arms: s.const_arms.iter().map(|(k, v)| Ok((*k, f(v)?))).collect::<RewriteResult<_>>()?,
            block_arms: s.block_arms.iter().map(|(k, v)| Ok((*k, f(v)?))).collect::<RewriteResult<_>>()?,
            default: s.default.as_ref().map(|d| f(d)).transpose()?,
            totals: s.totals,
        }),
        Expr::Stringswitch(s) => Expr::Stringswitch(StringswitchNode {
            scrutinee: f(&s.scrutinee)?,
            cases: s.cases.iter().map(|(k, v)| Ok((k.clone(), f(v)?))).collect::<RewriteResult<_>>()?,
            default: s.default.as_ref().map(|d| f(d)).transpose()?,
            loc: s.loc,
        }),
        Expr::Staticcatch(sc) => Expr::Staticcatch(StaticcatchNode {
            body: f(&sc.body)?,
            label: sc.label,
            params: sc.params.clone(),
            handler: f(&sc.handler)?,
        }),
        Expr::Trywith(t) => Expr::Trywith(TrywithNode {
            body: f(&t.body)?,
            exn_var: t.exn_var.clone(),
            handler: f(&t.handler)?,
        }),
        Expr::Ifthenelse(i) => Expr::Ifthenelse(IfthenelseNode {
            cond: f(&i.cond)?,
            then_branch: f(&i.then_branch)?,
            else_branch: f(&i.else_branch)?,
        }),
        Expr::Sequence(l1, l2) => Expr::Sequence(f(l1)?, f(l2)?),
        Expr::While(w) => Expr::While(WhileNode {
            cond: f(&w.cond)?,
            body: f(&w.body)?,
        }),
        Expr::For(fo) => Expr::For(ForNode {
            var: fo.var.clone(),
            low: f(&fo.low)?,
            high: f(&fo.high)?,
            direction: fo.direction,
            body: f(&fo.body)?,
        }),
        Expr::Assign(v, e) => Expr::Assign(v.clone(), f(e)?),
        Expr::Send(s) => Expr::Send(SendNode {
            obj: f(&s.obj)?,
            method: s.method.clone(),
            args: s.args.iter().map(&mut f).collect::<RewriteResult<_>>()?,
            loc: s.loc,
        }),
        Expr::Event(e) => Expr::Event(EventNode {
            term: f(&e.term)?,
            loc: e.loc,
        }),
        Expr::Ifused(v, e) => Expr::Ifused(v.clone(), f(e)?),
    })
}
