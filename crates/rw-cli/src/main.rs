//! `rw-dump`: read an IR term from the s-expression notation in `sexpr`,
//! run the rewrite-ir pipeline (or a single named pass) over it, and print
//! the term before and after plus any diagnostics raised along the way.
//!
//! This is a thin inspection tool, not a front end — it performs no parsing
//! of any surface language and its only job is to make the passes'
//! behavior visible on a hand-written sample term.

mod printer;
mod sexpr;

use std::fs;
use std::path::PathBuf;

use clap::Parser;

use rw_core::config::Config;
use rw_core::error::RewriteError;
use rw_core::ident::IdentGen;
use rw_passes::{pipeline, Pass};

#[derive(Parser, Debug)]
#[command(name = "rw-dump", about = "Inspect the rewrite-ir pipeline on a sample term")]
struct Args {
    /// Path to a file containing one s-expression term.
    file: PathBuf,

    /// Run only this pass instead of the full pipeline.
    #[arg(long, value_enum)]
    pass: Option<PassArg>,

    /// Set `Config::native_code`.
    #[arg(long)]
    native_code: bool,

    /// Set `Config::debug`.
    #[arg(long)]
    debug: bool,

    /// Set `Config::annotations`.
    #[arg(long)]
    annotations: bool,

    /// Set `Config::force_tmc`.
    #[arg(long)]
    force_tmc: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum PassArg {
    LiftStatic,
    ExitSimpl,
    LetSimpl,
    Tmc,
}

impl From<PassArg> for Pass {
    fn from(p: PassArg) -> Self {
        match p {
            PassArg::LiftStatic => Pass::LiftStatic,
            PassArg::ExitSimpl => Pass::ExitSimpl,
            PassArg::LetSimpl => Pass::LetSimpl,
            PassArg::Tmc => Pass::Tmc,
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum DumpError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Parse(#[from] sexpr::ParseError),
    #[error(transparent)]
    Rewrite(#[from] RewriteError),
}

fn main() {
    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("rw-dump: {e}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), DumpError> {
    let src = fs::read_to_string(&args.file)?;
    let mut gen = IdentGen::new();
    let term = sexpr::parse(&src, &mut gen)?;

    println!("-- before --");
    println!("{}", printer::print(&term));

    let config = Config {
        native_code: args.native_code,
        debug: args.debug,
        annotations: args.annotations,
        force_tmc: args.force_tmc,
    };

    let (out, diags) = match args.pass {
        Some(pass) => {
            let mut diags = rw_core::diagnostics::Diagnostics::new();
            let floor = gen.high_water_mark();
            let (out, _) = pipeline::run_pass(pass.into(), &term, &config, floor, &mut diags)?;
            (out, diags)
        }
        None => pipeline::run(&term, &config)?,
    };

    println!("-- after --");
    println!("{}", printer::print(&out));

    if !diags.is_empty() {
        println!("-- diagnostics --");
        for d in diags.iter() {
            println!("{:?} at {:?}", d.kind, d.loc);
        }
    }

    Ok(())
}
