//! Snapshot tests over the diagnostics a pass run collects, not over the
//! rewritten term itself — `Diagnostic` derives `Serialize` for exactly
//! this purpose.

use rw_core::config::Config;
use rw_core::diagnostics::Diagnostics;
use rw_core::ident::IdentGen;
use rw_core::ir::*;

use crate::tmc;

fn optimized() -> Config {
    Config {
        native_code: true,
        debug: false,
        annotations: false,
        force_tmc: false,
    }
}

/// `map` is marked a TMC candidate but its body makes no recursive call at
/// all, so there is nothing for TMC to rewrite: the one diagnostic this
/// run produces is `UnusedTmcAttribute` at the binding's own location.
#[test]
fn tmc_candidate_with_no_tail_calls_warns_unused() {
    let mut gen = IdentGen::new();
    let map = gen.fresh("map");
    let f = gen.fresh("f");
    let xs = gen.fresh("xs");

    let map_fn = Expr::Function(FunctionNode {
        calling_convention: CallingConvention::Curried,
        params: vec![(f, ValueKind::Pgenval), (xs, ValueKind::Pgenval)],
        return_kind: ValueKind::Pgenval,
        body: Expr::Const(Constant::Int(0)).into_term(),
        attrs: FunctionAttrs {
            local: None,
            inline: Inline::default(),
            tmc_candidate: true,
        },
        loc: Loc(42),
    })
    .into_term();
    let term = Expr::Letrec(LetrecNode {
        bindings: vec![(map.clone(), map_fn)],
        body: Expr::Var(map).into_term(),
    })
    .into_term();

    let mut diags = Diagnostics::new();
    tmc::run(&term, &optimized(), &mut gen, &mut diags).expect("no constructor ambiguity to trip on");

    let collected: Vec<_> = diags.iter().collect();
    insta::assert_yaml_snapshot!(collected, @r#"
    - severity: Warning
      kind: UnusedTmcAttribute
      loc: 42
    "#);
}
