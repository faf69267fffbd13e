//! Exact-application beta-reduction.
//!
//! Both exit-simplification (opportunistically, while rebuilding) and
//! let-simplification (as part of its own rewrite, and again during
//! occurrence counting) contract a fully-applied `Apply` of an immediate
//! `Function` literal into a chain of `Let(Strict, ...)` bindings. The
//! micro-rewrite is identical in both passes, so it lives here once rather
//! than being copied.

use crate::ident::Ident;
use crate::ir::*;

/// If `func` is a `Function` literal whose calling convention admits this
/// exact argument list, return the beta-reduced `Let` chain. Bindings are
/// laid out outermost-first in argument order, so evaluation stays
/// left-to-right.
pub fn try_beta_reduce(func: &Term, args: &[Term]) -> Option<Term> {
    let Expr::Function(fun) = &**func else {
        return None;
    };
    match fun.calling_convention {
        CallingConvention::Curried => {
            if fun.params.len() != args.len() {
                return None;
            }
            Some(build_chain(&fun.params, args, &fun.body))
        }
        CallingConvention::Tupled => {
            // A tupled call must supply exactly one argument, itself a
            // `Makeblock` construction whose field count matches arity.
            let [single] = args else { return None };
            let fields = match &**single {
                Expr::Prim(p) if matches!(p.prim, Primitive::Makeblock { .. }) => &p.args,
                _ => return None,
            };
            if fields.len() != fun.params.len() {
                return None;
            }
            Some(build_chain(&fun.params, fields, &fun.body))
        }
    }
}

fn build_chain(params: &[(Ident, ValueKind)], args: &[Term], body: &Term) -> Term {
    let bindings: Vec<_> = params
        .iter()
        .zip(args.iter())
        .map(|((id, vk), arg)| (id.clone(), *vk, arg.clone()))
        .collect();
    let_chain(bindings, body.clone())
}
