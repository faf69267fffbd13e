//! Wires the four passes into the fixed order: local-function lifting (if
//! the configuration enables it), exit simplification, let simplification,
//! tail-modulo-cons.
//!
//! Each stage gets its own `IdentGen`, seeded past the highest index the
//! previous stage minted, so no two stages' fresh identifiers can collide
//! even though they never share a generator.

use rw_core::config::Config;
use rw_core::diagnostics::Diagnostics;
use rw_core::error::RewriteResult;
use rw_core::ident::IdentGen;
use rw_core::ir::Term;

use crate::{exit_simpl, let_simpl, lift_static, tmc};

/// One named stage of the pipeline, for running in isolation (`rw-cli`'s
/// single-pass inspection mode uses this).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pass {
    LiftStatic,
    ExitSimpl,
    LetSimpl,
    Tmc,
}

impl Pass {
    pub const ALL: [Pass; 4] = [Pass::LiftStatic, Pass::ExitSimpl, Pass::LetSimpl, Pass::Tmc];

    pub fn name(self) -> &'static str {
        match self {
            Pass::LiftStatic => "lift_static",
            Pass::ExitSimpl => "exit_simpl",
            Pass::LetSimpl => "let_simpl",
            Pass::Tmc => "tmc",
        }
    }
}

/// Run a single named stage, starting its `IdentGen` past `floor`. Returns
/// the rewritten term and the generator's resulting high-water mark, so
/// callers can thread it into the next stage.
pub fn run_pass(
    pass: Pass,
    term: &Term,
    config: &Config,
    floor: u32,
    diags: &mut Diagnostics,
) -> RewriteResult<(Term, u32)> {
    let mut gen = IdentGen::starting_after(floor);
    let out = match pass {
        Pass::LiftStatic => lift_static::run(term, diags),
        Pass::ExitSimpl => exit_simpl::run(term, &mut gen, diags),
        Pass::LetSimpl => let_simpl::run(term, config, &mut gen, diags),
        Pass::Tmc => tmc::run(term, config, &mut gen, diags)?,
    };
    Ok((out, gen.high_water_mark()))
}

/// Run the full pipeline in its fixed order: local-function lifting only
/// when `config.run_local_fn_lifting()`, then exit simplification, let
/// simplification, and tail-modulo-cons.
pub fn run(term: &Term, config: &Config) -> RewriteResult<(Term, Diagnostics)> {
    let mut diags = Diagnostics::new();
    let mut current = term.clone();
    let mut floor = 0;

    if config.run_local_fn_lifting() {
        let (next, mark) = run_pass(Pass::LiftStatic, &current, config, floor, &mut diags)?;
        current = next;
        floor = mark;
    }

    for pass in [Pass::ExitSimpl, Pass::LetSimpl, Pass::Tmc] {
        let (next, mark) = run_pass(pass, &current, config, floor, &mut diags)?;
        current = next;
        floor = mark;
    }

    Ok((current, diags))
}
