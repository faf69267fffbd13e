//! Pretty-prints any `Term` as s-expression text, for before/after dumps.
//! Covers all nineteen `Expr` variants; unlike `sexpr::parse`, this side
//! never needs to round-trip, so it is exhaustive where the reader is not.

use std::fmt::Write;

use rw_core::ir::*;

pub fn print(term: &Term) -> String {
    let mut out = String::new();
    write_term(term, 0, &mut out);
    out
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}

fn write_term(term: &Term, depth: usize, out: &mut String) {
    match &**term {
        Expr::Var(id) => {
            let _ = write!(out, "{id}");
        }
        Expr::Const(c) => write_const(c, out),
        Expr::Apply(a) => {
            out.push_str("(apply ");
            write_term(&a.func, depth, out);
            for arg in &a.args {
                out.push(' ');
                write_term(arg, depth, out);
            }
            out.push(')');
        }
        Expr::Function(fun) => {
            out.push_str("(fn (");
            for (i, (id, _)) in fun.params.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                let _ = write!(out, "{id}");
            }
            out.push_str(")\n");
            indent(out, depth + 1);
            write_term(&fun.body, depth + 1, out);
            out.push(')');
        }
        Expr::Let(l) => {
            let _ = write!(out, "(let {} ", l.id);
            write_term(&l.value, depth, out);
            out.push('\n');
            indent(out, depth + 1);
            write_term(&l.body, depth + 1, out);
            out.push(')');
        }
        Expr::Letrec(lr) => {
            out.push_str("(letrec (");
            for (id, v) in &lr.bindings {
                let _ = write!(out, "\n");
                indent(out, depth + 2);
                let _ = write!(out, "({id} ");
                write_term(v, depth + 2, out);
                out.push(')');
            }
            out.push_str(")\n");
            indent(out, depth + 1);
            write_term(&lr.body, depth + 1, out);
            out.push(')');
        }
        Expr::Prim(p) => {
            let _ = write!(out, "(prim {} ", prim_name(&p.prim));
            for (i, a) in p.args.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                write_term(a, depth, out);
            }
            out.push(')');
        }
        Expr::Switch(s) => {
            out.push_str("(switch ");
            write_term(&s.scrutinee, depth, out);
            for (k, v) in &s.const_arms {
                out.push('\n');
                indent(out, depth + 1);
                let _ = write!(out, "(const {k} ");
                write_term(v, depth + 1, out);
                out.push(')');
            }
            for (k, v) in &s.block_arms {
                out.push('\n');
                indent(out, depth + 1);
                let _ = write!(out, "(block {k} ");
                write_term(v, depth + 1, out);
                out.push(')');
            }
            if let Some(d) = &s.default {
                out.push('\n');
                indent(out, depth + 1);
                out.push_str("(default ");
                write_term(d, depth + 1, out);
                out.push(')');
            }
            out.push(')');
        }
        Expr::Stringswitch(s) => {
            out.push_str("(stringswitch ");
            write_term(&s.scrutinee, depth, out);
            for (k, v) in &s.cases {
                out.push('\n');
                indent(out, depth + 1);
                let _ = write!(out, "(case {k:?} ");
                write_term(v, depth + 1, out);
                out.push(')');
            }
            if let Some(d) = &s.default {
                out.push('\n');
                indent(out, depth + 1);
                out.push_str("(default ");
                write_term(d, depth + 1, out);
                out.push(')');
            }
            out.push(')');
        }
        Expr::Staticraise(r) => {
            let _ = write!(out, "(exit {}", r.label.0);
            for a in &r.args {
                out.push(' ');
                write_term(a, depth, out);
            }
            out.push(')');
        }
        Expr::Staticcatch(sc) => {
            let _ = write!(out, "(catch {}\n", sc.label.0);
            indent(out, depth + 1);
            write_term(&sc.body, depth + 1, out);
            out.push('\n');
            indent(out, depth);
            out.push_str("with (");
            for (i, (id, _)) in sc.params.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                let _ = write!(out, "{id}");
            }
            out.push_str(")\n");
            indent(out, depth + 1);
            write_term(&sc.handler, depth + 1, out);
            out.push(')');
        }
        Expr::Trywith(t) => {
            out.push_str("(trywith\n");
            indent(out, depth + 1);
            write_term(&t.body, depth + 1, out);
            out.push('\n');
            indent(out, depth);
            let _ = write!(out, "with {}\n", t.exn_var);
            indent(out, depth + 1);
            write_term(&t.handler, depth + 1, out);
            out.push(')');
        }
        Expr::Ifthenelse(i) => {
            out.push_str("(if ");
            write_term(&i.cond, depth, out);
            out.push('\n');
            indent(out, depth + 1);
            write_term(&i.then_branch, depth + 1, out);
            out.push('\n');
            indent(out, depth + 1);
            write_term(&i.else_branch, depth + 1, out);
            out.push(')');
        }
        Expr::Sequence(a, b) => {
            out.push_str("(seq\n");
            indent(out, depth + 1);
            write_term(a, depth + 1, out);
            out.push('\n');
            indent(out, depth + 1);
            write_term(b, depth + 1, out);
            out.push(')');
        }
        Expr::While(w) => {
            out.push_str("(while ");
            write_term(&w.cond, depth, out);
            out.push('\n');
            indent(out, depth + 1);
            write_term(&w.body, depth + 1, out);
            out.push(')');
        }
        Expr::For(fo) => {
            let dir = match fo.direction {
                ForDirection::Upto => "to",
                ForDirection::Downto => "downto",
            };
            let _ = write!(out, "(for {} ", fo.var);
            write_term(&fo.low, depth, out);
            let _ = write!(out, " {dir} ");
            write_term(&fo.high, depth, out);
            out.push('\n');
            indent(out, depth + 1);
            write_term(&fo.body, depth + 1, out);
            out.push(')');
        }
        Expr::Assign(id, e) => {
            let _ = write!(out, "(assign {id} ");
            write_term(e, depth, out);
            out.push(')');
        }
        Expr::Send(s) => {
            let _ = write!(out, "(send {} ", s.method);
            write_term(&s.obj, depth, out);
            for a in &s.args {
                out.push(' ');
                write_term(a, depth, out);
            }
            out.push(')');
        }
        Expr::Event(e) => {
            out.push_str("(event ");
            write_term(&e.term, depth, out);
            out.push(')');
        }
        Expr::Ifused(id, e) => {
            let _ = write!(out, "(ifused {id} ");
            write_term(e, depth, out);
            out.push(')');
        }
    }
}

fn write_const(c: &Constant, out: &mut String) {
    match c {
        Constant::Int(n) => {
            let _ = write!(out, "{n}");
        }
        Constant::Str(s) => {
            let _ = write!(out, "{s:?}");
        }
        Constant::Block(tag, fields) => {
            let _ = write!(out, "(block {tag}");
            for f in fields {
                out.push(' ');
                write_const(f, out);
            }
            out.push(')');
        }
    }
}

fn prim_name(p: &Primitive) -> String {
    match p {
        Primitive::Makeblock { tag, mutable } => format!("makeblock[{tag}{}]", if *mutable { ",mut" } else { "" }),
        Primitive::Field(n) => format!("field[{n}]"),
        Primitive::Setfield(n) => format!("setfield[{n}]"),
        Primitive::SetfieldComputed => "setfield_computed".to_string(),
        Primitive::Offsetref(n) => format!("offsetref[{n}]"),
        Primitive::Offsetint(n) => format!("offsetint[{n}]"),
        Primitive::Revapply => "revapply".to_string(),
        Primitive::Dirapply => "dirapply".to_string(),
        Primitive::Identity => "identity".to_string(),
        Primitive::BytesToString => "bytes_to_string".to_string(),
        Primitive::BytesOfString => "bytes_of_string".to_string(),
        Primitive::ObjWithTag => "obj_with_tag".to_string(),
        Primitive::Add => "+".to_string(),
        Primitive::Other(name) => name.clone(),
    }
}
