//! Scenario-level tests for exit simplification, drawn from the concrete
//! worked examples: exit inlining with alpha-renamed formals, and the
//! universal free-vars/idempotence properties restricted to this pass.

use std::collections::HashSet;

use rw_core::diagnostics::Diagnostics;
use rw_core::ident::IdentGen;
use rw_core::ir::*;
use rw_core::traversal::free_vars;

use crate::exit_simpl;

/// `Staticcatch(Staticraise(7, [Const 42]), (7, [(a, Pintval)]), Prim(Add, [Var a; Const 1]))`
/// should become `Let(Strict, Pintval, a', Const 42, Prim(Add, [Var a'; Const 1]))`
/// with `a` alpha-renamed to a fresh `a'`.
#[test]
fn exit_inlining_materializes_fresh_binding() {
    let mut gen = IdentGen::new();
    let a = gen.fresh("a");
    let label = ExitLabel(7);

    let handler = Expr::Prim(PrimNode {
        prim: Primitive::Add,
        args: vec![
            Expr::Var(a.clone()).into_term(),
            Expr::Const(Constant::Int(1)).into_term(),
        ],
        loc: Loc::UNKNOWN,
    })
    .into_term();

    let term = Expr::Staticcatch(StaticcatchNode {
        body: Expr::Staticraise(StaticraiseNode {
            label,
            args: vec![Expr::Const(Constant::Int(42)).into_term()],
        })
        .into_term(),
        label,
        params: vec![(a.clone(), ValueKind::Pintval)],
        handler,
    })
    .into_term();

    let mut diags = Diagnostics::new();
    let out = exit_simpl::run(&term, &mut gen, &mut diags);

    match &*out {
        Expr::Let(l) => {
            assert_eq!(l.binding_kind, BindingKind::Strict);
            assert_eq!(l.value_kind, ValueKind::Pintval);
            assert_ne!(l.id, a, "formal must be alpha-renamed, not reused");
            assert_eq!(l.value, Expr::Const(Constant::Int(42)).into_term());
            match &*l.body {
                Expr::Prim(p) => {
                    assert_eq!(p.prim, Primitive::Add);
                    assert!(matches!(&*p.args[0], Expr::Var(v) if *v == l.id));
                }
                other => panic!("expected Prim(Add), got {other:?}"),
            }
        }
        other => panic!("expected Let, got {other:?}"),
    }
    assert!(diags.is_empty());
}

#[test]
fn free_vars_does_not_grow_across_the_pass() {
    let mut gen = IdentGen::new();
    let mut diags = Diagnostics::new();
    let label = ExitLabel(1);
    let x = gen.fresh("x");

    // catch 1 { raise 1 (Var x) } with (p) { Var p }  -- single use, inlines.
    let term = Expr::Staticcatch(StaticcatchNode {
        body: Expr::Staticraise(StaticraiseNode {
            label,
            args: vec![Expr::Var(x.clone()).into_term()],
        })
        .into_term(),
        label,
        params: vec![(gen.fresh("p"), ValueKind::Pgenval)],
        handler: Expr::Var(x.clone()).into_term(), // placeholder, replaced below
    })
    .into_term();
    // Rebuild handler referencing the actual bound param so the example is
    // well-scoped (handler must reference its own param, not `x`).
    let Expr::Staticcatch(sc) = &*term else { unreachable!() };
    let p = sc.params[0].0.clone();
    let term = Expr::Staticcatch(StaticcatchNode {
        body: sc.body.clone(),
        label,
        params: sc.params.clone(),
        handler: Expr::Var(p).into_term(),
    })
    .into_term();

    let before: HashSet<_> = free_vars(&term);
    let out = exit_simpl::run(&term, &mut gen, &mut diags);
    let after = free_vars(&out);
    assert!(after.is_subset(&before));
    assert!(after.contains(&x));
}

#[test]
fn running_the_pass_twice_is_idempotent() {
    let mut gen = IdentGen::new();
    let mut diags = Diagnostics::new();
    let label = ExitLabel(3);
    let term = Expr::Staticcatch(StaticcatchNode {
        body: Expr::Const(Constant::Int(1)).into_term(),
        label,
        params: vec![],
        handler: Expr::Const(Constant::Int(2)).into_term(),
    })
    .into_term();

    let once = exit_simpl::run(&term, &mut gen, &mut diags);
    let twice = exit_simpl::run(&once, &mut gen, &mut diags);
    assert_eq!(once, twice);
}
