//! The `Choice`/`Dps` applicative used by tail-modulo-cons.
//!
//! A `Choice` packages the two ways a subterm of a TMC candidate's body can
//! be expressed: its ordinary *direct* form, and a *DPS* form that, given a
//! destination `(block, offset)`, writes its result there instead of
//! returning it. The DPS form is a closure rather than a plain `Term`
//! because it is only fully determined once the destination and the
//! surrounding deferred-constructor stack are known — both of which are
//! only available at the point a candidate's root choice is materialized.

use std::rc::Rc;

use rw_core::ident::IdentGen;
use rw_core::ir::*;

/// Where a DPS computation's result is ultimately written.
#[derive(Clone)]
pub struct Dst {
    pub var: Ident,
    pub offset: Term,
}

/// A constructor frame whose allocation has been deferred past a TMC call
/// so that nested constructors fold into one combined `Makeblock`.
#[derive(Clone)]
pub struct ConstrFrame {
    pub tag: u32,
    pub mutable: bool,
    pub before: Vec<Term>,
    pub after: Vec<Term>,
    pub loc: Loc,
}

pub type DpsCode = Rc<dyn Fn(&[ConstrFrame], bool, &Dst, &mut IdentGen) -> Term>;

pub struct Choice {
    pub direct: Term,
    pub dps: DpsCode,
    /// Conservative count of how many syntactic copies of an incoming
    /// `delayed` stack this choice's `dps` would emit; used by the
    /// affinity guard at branching nodes.
    pub delayed_use_count: u32,
    pub has_tmc_calls: bool,
    pub benefits_from_dps: bool,
    pub explicit_tailcall_request: bool,
}

impl Choice {
    pub fn materialize_dps(&self, dst: &Dst, gen: &mut IdentGen) -> Term {
        (self.dps)(&[], true, dst, gen)
    }
}

pub fn assign_to_dst(dst: &Dst, value: Term) -> Term {
    Expr::Prim(PrimNode {
        prim: Primitive::SetfieldComputed,
        args: vec![Expr::Var(dst.var.clone()).into_term(), dst.offset.clone(), value],
        loc: Loc::UNKNOWN,
    })
    .into_term()
}

/// Fold a stack of deferred constructor frames (outermost first, as
/// accumulated while descending into nested `Makeblock`s) into one
/// combined allocation, binding the innermost block to a fresh temporary
/// so `make_leaf` can target its placeholder slot directly.
///
/// `make_leaf` receives `gen` as a parameter rather than capturing it, so
/// callers that also need a generator inside the closure body (to
/// materialize a nested choice) don't fight this function's own use of it.
pub fn materialize_chain(
    delayed: &[ConstrFrame],
    dst: &Dst,
    make_leaf: impl FnOnce(&Dst, &mut IdentGen) -> Term,
    gen: &mut IdentGen,
) -> Term {
    let Some((innermost, outer)) = delayed.split_last() else {
        return make_leaf(dst, gen);
    };

    let tmp = gen.fresh("tmc_blk");
    let offset = innermost.before.len() as u32;
    let mut fields = innermost.before.clone();
    fields.push(Expr::Const(Constant::Int(0)).into_term());
    fields.extend(innermost.after.clone());
    let inner_block = Expr::Prim(PrimNode {
        prim: Primitive::Makeblock {
            tag: innermost.tag,
            mutable: innermost.mutable,
        },
        args: fields,
        loc: innermost.loc,
    })
    .into_term();

    let mut combined = Expr::Var(tmp.clone()).into_term();
    for frame in outer.iter().rev() {
        let mut fields = frame.before.clone();
        fields.push(combined);
        fields.extend(frame.after.clone());
        combined = Expr::Prim(PrimNode {
            prim: Primitive::Makeblock {
                tag: frame.tag,
                mutable: frame.mutable,
            },
            args: fields,
            loc: frame.loc,
        })
        .into_term();
    }

    let write_outer = assign_to_dst(dst, combined);
    let leaf_dst = Dst {
        var: tmp.clone(),
        offset: Expr::Const(Constant::Int(offset as i64)).into_term(),
    };
    let fill = make_leaf(&leaf_dst, gen);

    Expr::Let(LetNode {
        binding_kind: BindingKind::Strict,
        value_kind: ValueKind::Pblockval,
        id: tmp,
        value: inner_block,
        body: Expr::Sequence(write_outer, fill).into_term(),
    })
    .into_term()
}

/// A terminal choice: the same value in both styles, no deferred frames of
/// its own.
pub fn ret(value: Term) -> Choice {
    let for_dps = value.clone();
    Choice {
        direct: value,
        dps: Rc::new(move |delayed, _tail, dst, gen| {
            let v = for_dps.clone();
            materialize_chain(delayed, dst, move |d, _gen| assign_to_dst(d, v), gen)
        }),
        delayed_use_count: 1,
        has_tmc_calls: false,
        benefits_from_dps: false,
        explicit_tailcall_request: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rw_core::ident::IdentGen;

    #[test]
    fn materialize_chain_with_no_frames_is_just_the_leaf() {
        let mut gen = IdentGen::new();
        let dst = Dst {
            var: gen.fresh("dst"),
            offset: Expr::Const(Constant::Int(0)).into_term(),
        };
        let out = materialize_chain(&[], &dst, |d, _gen| assign_to_dst(d, Expr::Const(Constant::Int(1)).into_term()), &mut gen);
        match &*out {
            Expr::Prim(p) => assert_eq!(p.prim, Primitive::SetfieldComputed),
            other => panic!("expected SetfieldComputed, got {other:?}"),
        }
    }

    #[test]
    fn materialize_chain_with_one_frame_binds_an_innermost_block() {
        let mut gen = IdentGen::new();
        let dst = Dst {
            var: gen.fresh("dst"),
            offset: Expr::Const(Constant::Int(0)).into_term(),
        };
        let frame = ConstrFrame {
            tag: 0,
            mutable: false,
            before: vec![Expr::Const(Constant::Int(7)).into_term()],
            after: vec![],
            loc: Loc::UNKNOWN,
        };
        let out = materialize_chain(
            &[frame],
            &dst,
            |d, _gen| assign_to_dst(d, Expr::Const(Constant::Int(9)).into_term()),
            &mut gen,
        );
        match &*out {
            Expr::Let(l) => {
                assert_eq!(l.value_kind, ValueKind::Pblockval);
                assert!(matches!(&*l.value, Expr::Prim(p) if p.prim == Primitive::Makeblock { tag: 0, mutable: false }));
            }
            other => panic!("expected Let binding the innermost block, got {other:?}"),
        }
    }
}
