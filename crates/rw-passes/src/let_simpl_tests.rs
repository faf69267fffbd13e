//! Scenario-level tests for let simplification: ref promotion and
//! beta+curry, as worked through concretely.

use rw_core::config::Config;
use rw_core::diagnostics::Diagnostics;
use rw_core::ident::IdentGen;
use rw_core::ir::*;

use crate::let_simpl;

fn optimized() -> Config {
    Config {
        native_code: true,
        debug: false,
        annotations: false,
        force_tmc: false,
    }
}

/// `Let(Strict, Pgenval, r, Makeblock(0, Mutable, [Const 0]),
///   Sequence(Setfield(0)(Var r, Offsetint(1, Field(0, Var r))), Field(0, Var r)))`
/// becomes `Let(Variable, Pintval, r, Const 0,
///   Sequence(Assign(r, Offsetint(1, Var r)), Var r))`.
#[test]
fn ref_promotion_turns_mutable_block_into_scalar_cell() {
    let mut gen = IdentGen::new();
    let mut diags = Diagnostics::new();
    let r = gen.fresh("r");

    let field_read = Expr::Prim(PrimNode {
        prim: Primitive::Field(0),
        args: vec![Expr::Var(r.clone()).into_term()],
        loc: Loc::UNKNOWN,
    })
    .into_term();
    let offset = Expr::Prim(PrimNode {
        prim: Primitive::Offsetint(1),
        args: vec![field_read.clone()],
        loc: Loc::UNKNOWN,
    })
    .into_term();
    let setfield = Expr::Prim(PrimNode {
        prim: Primitive::Setfield(0),
        args: vec![Expr::Var(r.clone()).into_term(), offset],
        loc: Loc::UNKNOWN,
    })
    .into_term();
    let second_read = Expr::Prim(PrimNode {
        prim: Primitive::Field(0),
        args: vec![Expr::Var(r.clone()).into_term()],
        loc: Loc::UNKNOWN,
    })
    .into_term();
    let body = Expr::Sequence(setfield, second_read).into_term();

    let makeblock = Expr::Prim(PrimNode {
        prim: Primitive::Makeblock {
            tag: 0,
            mutable: true,
        },
        args: vec![Expr::Const(Constant::Int(0)).into_term()],
        loc: Loc::UNKNOWN,
    })
    .into_term();
    let term = Expr::Let(LetNode {
        binding_kind: BindingKind::Strict,
        value_kind: ValueKind::Pgenval,
        id: r.clone(),
        value: makeblock,
        body,
    })
    .into_term();

    let out = let_simpl::run(&term, &optimized(), &mut gen, &mut diags);
    match &*out {
        Expr::Let(l) => {
            assert_eq!(l.binding_kind, BindingKind::Variable);
            assert_eq!(l.value_kind, ValueKind::Pintval);
            assert_eq!(l.id, r);
            assert_eq!(l.value, Expr::Const(Constant::Int(0)).into_term());
            match &*l.body {
                Expr::Sequence(assign, tail) => {
                    match &**assign {
                        Expr::Assign(v, rhs) => {
                            assert_eq!(*v, r);
                            match &**rhs {
                                Expr::Prim(p) => {
                                    assert_eq!(p.prim, Primitive::Offsetint(1));
                                    assert!(matches!(&*p.args[0], Expr::Var(vv) if *vv == r));
                                }
                                other => panic!("expected Offsetint, got {other:?}"),
                            }
                        }
                        other => panic!("expected Assign, got {other:?}"),
                    }
                    assert!(matches!(&**tail, Expr::Var(v) if *v == r));
                }
                other => panic!("expected Sequence, got {other:?}"),
            }
        }
        other => panic!("expected Let(Variable), got {other:?}"),
    }
}

/// `Apply(Function(Curried, [x,y], Function(Curried, [z], Add[x,y,z])), [1,2,3])`
/// becomes a three-deep `Let(Strict, ...)` chain binding x, y, z in order.
#[test]
fn beta_reduction_and_curry_merging_produce_left_to_right_let_chain() {
    let mut gen = IdentGen::new();
    let mut diags = Diagnostics::new();
    let x = gen.fresh("x");
    let y = gen.fresh("y");
    let z = gen.fresh("z");

    let inner = Expr::Function(FunctionNode {
        calling_convention: CallingConvention::Curried,
        params: vec![(z.clone(), ValueKind::Pintval)],
        return_kind: ValueKind::Pintval,
        body: Expr::Prim(PrimNode {
            prim: Primitive::Add,
            args: vec![
                Expr::Var(x.clone()).into_term(),
                Expr::Var(y.clone()).into_term(),
                Expr::Var(z.clone()).into_term(),
            ],
            loc: Loc::UNKNOWN,
        })
        .into_term(),
        attrs: FunctionAttrs::default(),
        loc: Loc::UNKNOWN,
    })
    .into_term();
    let outer = Expr::Function(FunctionNode {
        calling_convention: CallingConvention::Curried,
        params: vec![(x.clone(), ValueKind::Pintval), (y.clone(), ValueKind::Pintval)],
        return_kind: ValueKind::Pgenval,
        body: inner,
        attrs: FunctionAttrs::default(),
        loc: Loc::UNKNOWN,
    })
    .into_term();
    let term = Expr::Apply(ApplyNode {
        func: outer,
        args: vec![
            Expr::Const(Constant::Int(1)).into_term(),
            Expr::Const(Constant::Int(2)).into_term(),
            Expr::Const(Constant::Int(3)).into_term(),
        ],
        loc: Loc::UNKNOWN,
        tail_hint: false,
        inline_hint: Inline::default(),
        tailcall: TailcallAnnotation::default(),
    })
    .into_term();

    let out = let_simpl::run(&term, &optimized(), &mut gen, &mut diags);
    // Expect Let(x=1, Let(y=2, Let(z=3, Add[x,y,z])))
    let Expr::Let(l1) = &*out else { panic!("expected outer Let") };
    assert_eq!(l1.value, Expr::Const(Constant::Int(1)).into_term());
    let Expr::Let(l2) = &*l1.body else { panic!("expected middle Let") };
    assert_eq!(l2.value, Expr::Const(Constant::Int(2)).into_term());
    let Expr::Let(l3) = &*l2.body else { panic!("expected inner Let") };
    assert_eq!(l3.value, Expr::Const(Constant::Int(3)).into_term());
    match &*l3.body {
        Expr::Prim(p) => assert_eq!(p.prim, Primitive::Add),
        other => panic!("expected Prim(Add), got {other:?}"),
    }
}

#[test]
fn curry_merging_is_skipped_without_optimize() {
    let mut gen = IdentGen::new();
    let mut diags = Diagnostics::new();
    let x = gen.fresh("x");
    let y = gen.fresh("y");
    let inner = Expr::Function(FunctionNode {
        calling_convention: CallingConvention::Curried,
        params: vec![(y.clone(), ValueKind::Pintval)],
        return_kind: ValueKind::Pintval,
        body: Expr::Var(y.clone()).into_term(),
        attrs: FunctionAttrs::default(),
        loc: Loc::UNKNOWN,
    })
    .into_term();
    let outer = Expr::Function(FunctionNode {
        calling_convention: CallingConvention::Curried,
        params: vec![(x, ValueKind::Pintval)],
        return_kind: ValueKind::Pgenval,
        body: inner,
        attrs: FunctionAttrs::default(),
        loc: Loc::UNKNOWN,
    })
    .into_term();
    let debug_cfg = Config {
        native_code: false,
        debug: true,
        annotations: false,
        force_tmc: false,
    };
    let out = let_simpl::run(&outer, &debug_cfg, &mut gen, &mut diags);
    match &*out {
        Expr::Function(fun) => {
            assert_eq!(fun.params.len(), 1);
            assert!(matches!(&*fun.body, Expr::Function(_)));
        }
        other => panic!("expected un-merged outer Function, got {other:?}"),
    }
}
