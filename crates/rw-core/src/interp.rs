//! Small big-step interpreter used only by tests to check that a pass
//! preserves observable semantics. Not part of the crate's public surface
//! — restricted to integers, strings, mutable blocks, and closures, which
//! is all the scenario programs in the test suite need.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::ident::Ident;
use crate::ir::*;

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Unit,
    Int(i64),
    Str(String),
    Block(u32, Rc<RefCell<Vec<Value>>>),
    Closure(Rc<FunctionNode>, Env),
}

impl Value {
    fn truthy(&self) -> bool {
        match self {
            Value::Int(0) => false,
            Value::Int(_) => true,
            _ => true,
        }
    }

    fn as_int(&self) -> i64 {
        match self {
            Value::Int(n) => *n,
            other => panic!("expected int, found {other:?}"),
        }
    }

    fn as_block(&self) -> (u32, Rc<RefCell<Vec<Value>>>) {
        match self {
            Value::Block(tag, cells) => (*tag, cells.clone()),
            other => panic!("expected block, found {other:?}"),
        }
    }
}

#[derive(Debug)]
enum EnvNode {
    Empty,
    Cons(Ident, Rc<RefCell<Value>>, Env),
}

/// Persistent environment: cheap to clone (an `Rc` bump), shared between a
/// closure and the scope that created it.
#[derive(Clone, Debug)]
pub struct Env(Rc<EnvNode>);

impl Env {
    pub fn empty() -> Self {
        Env(Rc::new(EnvNode::Empty))
    }

    fn extend(&self, id: Ident, cell: Rc<RefCell<Value>>) -> Self {
        Env(Rc::new(EnvNode::Cons(id, cell, self.clone())))
    }

    fn bind(&self, id: Ident, value: Value) -> Self {
        self.extend(id, Rc::new(RefCell::new(value)))
    }

    fn cell(&self, id: &Ident) -> Rc<RefCell<Value>> {
        let mut node = &self.0;
        loop {
            match &**node {
                EnvNode::Empty => panic!("unbound identifier {id} in interpreter"),
                EnvNode::Cons(bound, cell, rest) => {
                    if bound == id {
                        return cell.clone();
                    }
                    node = &rest.0;
                }
            }
        }
    }

    fn get(&self, id: &Ident) -> Value {
        self.cell(id).borrow().clone()
    }
}

impl PartialEq for Env {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// Non-local control-flow signal: a static exception or a dynamic one.
enum Signal {
    Raise(ExitLabel, Vec<Value>),
    Exn(Value),
}

type EvalResult = Result<Value, Signal>;

pub fn eval(term: &Term, env: &Env) -> Value {
    match run(term, env) {
        Ok(v) => v,
        Err(Signal::Raise(l, _)) => panic!("unhandled static raise to label {}", l.0),
        Err(Signal::Exn(v)) => panic!("unhandled exception: {v:?}"),
    }
}

fn run(term: &Term, env: &Env) -> EvalResult {
    match &**term {
        Expr::Var(v) => Ok(env.get(v)),
        Expr::Const(c) => Ok(eval_const(c)),
        Expr::Apply(a) => {
            let func = run(&a.func, env)?;
            let mut args = Vec::with_capacity(a.args.len());
            for arg in &a.args {
                args.push(run(arg, env)?);
            }
            apply(func, args)
        }
        Expr::Function(fun) => Ok(Value::Closure(Rc::new(fun.clone()), env.clone())),
        Expr::Let(l) => {
            let v = run(&l.value, env)?;
            let inner = env.bind(l.id.clone(), v);
            run(&l.body, &inner)
        }
        Expr::Letrec(lr) => {
            let mut inner = env.clone();
            let cells: Vec<_> = lr
                .bindings
                .iter()
                .map(|(id, _)| {
                    let cell = Rc::new(RefCell::new(Value::Unit));
                    inner = inner.extend(id.clone(), cell.clone());
                    cell
                })
                .collect();
            for ((_, value_expr), cell) in lr.bindings.iter().zip(cells) {
                let v = run(value_expr, &inner)?;
                *cell.borrow_mut() = v;
            }
            run(&lr.body, &inner)
        }
        Expr::Prim(p) => eval_prim(p, env),
        Expr::Switch(s) => {
            let scrutinee = run(&s.scrutinee, env)?;
            match &scrutinee {
                Value::Int(n) => {
                    if let Some((_, arm)) = s.const_arms.iter().find(|(k, _)| *k == *n) {
                        run(arm, env)
                    } else {
                        run_default(&s.default, env)
                    }
                }
                Value::Block(tag, _) => {
                    if let Some((_, arm)) = s.block_arms.iter().find(|(k, _)| *k == *tag) {
                        run(arm, env)
                    } else {
                        run_default(&s.default, env)
                    }
                }
                other => panic!("switch on non-scrutable value {other:?}"),
            }
        }
        Expr::Stringswitch(s) => {
            let scrutinee = run(&s.scrutinee, env)?;
            let key = match &scrutinee {
                Value::Str(s) => s.clone(),
                other => panic!("stringswitch on non-string value {other:?}"),
            };
            if let Some((_, arm)) = s.cases.iter().find(|(k, _)| *k == key) {
                run(arm, env)
            } else {
                run_default(&s.default, env)
            }
        }
        Expr::Staticraise(r) => {
            let mut args = Vec::with_capacity(r.args.len());
            for a in &r.args {
                args.push(run(a, env)?);
            }
            Err(Signal::Raise(r.label, args))
        }
        Expr::Staticcatch(sc) => match run(&sc.body, env) {
            Err(Signal::Raise(l, vals)) if l == sc.label => {
                let mut inner = env.clone();
                for ((id, _), v) in sc.params.iter().zip(vals) {
                    inner = inner.bind(id.clone(), v);
                }
                run(&sc.handler, &inner)
            }
            other => other,
        },
        Expr::Trywith(t) => match run(&t.body, env) {
            Err(Signal::Exn(v)) => {
                let inner = env.bind(t.exn_var.clone(), v);
                run(&t.handler, &inner)
            }
            other => other,
        },
        Expr::Ifthenelse(i) => {
            if run(&i.cond, env)?.truthy() {
                run(&i.then_branch, env)
            } else {
                run(&i.else_branch, env)
            }
        }
        Expr::Sequence(l1, l2) => {
            run(l1, env)?;
            run(l2, env)
        }
        Expr::While(w) => {
            while run(&w.cond, env)?.truthy() {
                run(&w.body, env)?;
            }
            Ok(Value::Unit)
        }
        Expr::For(fo) => {
            let low = run(&fo.low, env)?.as_int();
            let high = run(&fo.high, env)?.as_int();
            let range: Box<dyn Iterator<Item = i64>> = match fo.direction {
                ForDirection::Upto => Box::new(low..=high),
                ForDirection::Downto => Box::new((high..=low).rev()),
            };
            for i in range {
                let inner = env.bind(fo.var.clone(), Value::Int(i));
                run(&fo.body, &inner)?;
            }
            Ok(Value::Unit)
        }
        Expr::Assign(v, e) => {
            let value = run(e, env)?;
            *env.cell(v).borrow_mut() = value;
            Ok(Value::Unit)
        }
        Expr::Send(s) => {
            run(&s.obj, env)?;
            for a in &s.args {
                run(a, env)?;
            }
            Ok(Value::Unit)
        }
        Expr::Event(e) => run(&e.term, env),
        Expr::Ifused(_, e) => run(e, env),
    }
}

fn run_default(default: &Option<Term>, env: &Env) -> EvalResult {
    match default {
        Some(d) => run(d, env),
        None => panic!("switch fell through with no matching arm and no default"),
    }
}

fn eval_const(c: &Constant) -> Value {
    match c {
        Constant::Int(n) => Value::Int(*n),
        Constant::Str(s) => Value::Str(s.clone()),
        Constant::Block(tag, fields) => {
            let vals = fields.iter().map(eval_const).collect();
            Value::Block(*tag, Rc::new(RefCell::new(vals)))
        }
    }
}

fn apply(func: Value, args: Vec<Value>) -> EvalResult {
    let (fun, closure_env) = match func {
        Value::Closure(fun, env) => (fun, env),
        other => panic!("apply on non-function value {other:?}"),
    };
    assert_eq!(
        fun.params.len(),
        args.len(),
        "arity mismatch calling closure"
    );
    let mut inner = closure_env;
    for ((id, _), v) in fun.params.iter().zip(args) {
        inner = inner.bind(id.clone(), v);
    }
    run(&fun.body, &inner)
}

fn eval_prim(p: &PrimNode, env: &Env) -> EvalResult {
    let mut vals = Vec::with_capacity(p.args.len());
    for a in &p.args {
        vals.push(run(a, env)?);
    }
    Ok(match &p.prim {
        Primitive::Makeblock { tag, .. } => Value::Block(*tag, Rc::new(RefCell::new(vals))),
        Primitive::Field(i) => {
            let (_, cells) = vals[0].as_block();
            let v = cells.borrow()[*i as usize].clone();
            v
        }
        Primitive::Setfield(i) => {
            let (_, cells) = vals[0].as_block();
            cells.borrow_mut()[*i as usize] = vals[1].clone();
            Value::Unit
        }
        Primitive::SetfieldComputed => {
            let (_, cells) = vals[0].as_block();
            let idx = vals[1].as_int() as usize;
            cells.borrow_mut()[idx] = vals[2].clone();
            Value::Unit
        }
        Primitive::Offsetref(delta) => {
            let (_, cells) = vals[0].as_block();
            let mut cells = cells.borrow_mut();
            let cur = cells[0].as_int();
            cells[0] = Value::Int(cur + delta);
            Value::Unit
        }
        Primitive::Offsetint(delta) => Value::Int(vals[0].as_int() + delta),
        Primitive::Revapply => return apply(vals[1].clone(), vec![vals[0].clone()]),
        Primitive::Dirapply => return apply(vals[0].clone(), vec![vals[1].clone()]),
        Primitive::Identity => vals[0].clone(),
        Primitive::BytesToString | Primitive::BytesOfString => vals[0].clone(),
        Primitive::ObjWithTag => {
            let tag = vals[0].as_int();
            let (_, cells) = vals[1].as_block();
            Value::Block(tag as u32, cells)
        }
        Primitive::Add => Value::Int(vals.iter().map(Value::as_int).sum()),
        Primitive::Other(name) => panic!("interpreter has no semantics for primitive {name}"),
    })
}

/// Table of labelled values a handler receives, exposed for assembling
/// handler parameter bindings in tests that want to poke at intermediate
/// state rather than only the final value.
pub fn bindings(env: &Env, ids: &[Ident]) -> HashMap<Ident, Value> {
    ids.iter().map(|id| (id.clone(), env.get(id))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::IdentGen;

    #[test]
    fn evaluates_arithmetic_and_let() {
        let mut gen = IdentGen::new();
        let x = gen.fresh("x");
        let term = Expr::Let(LetNode {
            binding_kind: BindingKind::Strict,
            value_kind: ValueKind::Pintval,
            id: x.clone(),
            value: Expr::Const(Constant::Int(40)).into_term(),
            body: Expr::Prim(PrimNode {
                prim: Primitive::Add,
                args: vec![Expr::Var(x).into_term(), Expr::Const(Constant::Int(2)).into_term()],
                loc: Loc::UNKNOWN,
            })
            .into_term(),
        })
        .into_term();
        assert_eq!(eval(&term, &Env::empty()), Value::Int(42));
    }

    #[test]
    fn staticcatch_handles_matching_raise() {
        let label = ExitLabel(0);
        let mut gen = IdentGen::new();
        let a = gen.fresh("a");
        let term = Expr::Staticcatch(StaticcatchNode {
            body: Expr::Staticraise(StaticraiseNode {
                label,
                args: vec![Expr::Const(Constant::Int(41)).into_term()],
            })
            .into_term(),
            label,
            params: vec![(a.clone(), ValueKind::Pintval)],
            handler: Expr::Prim(PrimNode {
                prim: Primitive::Add,
                args: vec![Expr::Var(a).into_term(), Expr::Const(Constant::Int(1)).into_term()],
                loc: Loc::UNKNOWN,
            })
            .into_term(),
        })
        .into_term();
        assert_eq!(eval(&term, &Env::empty()), Value::Int(42));
    }

    #[test]
    fn mutable_block_field_roundtrips_through_offsetref() {
        let mut gen = IdentGen::new();
        let r = gen.fresh("r");
        let term = Expr::Let(LetNode {
            binding_kind: BindingKind::Strict,
            value_kind: ValueKind::Pgenval,
            id: r.clone(),
            value: Expr::Prim(PrimNode {
                prim: Primitive::Makeblock {
                    tag: 0,
                    mutable: true,
                },
                args: vec![Expr::Const(Constant::Int(0)).into_term()],
                loc: Loc::UNKNOWN,
            })
            .into_term(),
            body: Expr::Sequence(
                Expr::Prim(PrimNode {
                    prim: Primitive::Offsetref(1),
                    args: vec![Expr::Var(r.clone()).into_term()],
                    loc: Loc::UNKNOWN,
                })
                .into_term(),
                Expr::Prim(PrimNode {
                    prim: Primitive::Field(0),
                    args: vec![Expr::Var(r).into_term()],
                    loc: Loc::UNKNOWN,
                })
                .into_term(),
            )
            .into_term(),
        })
        .into_term();
        assert_eq!(eval(&term, &Env::empty()), Value::Int(1));
    }
}
