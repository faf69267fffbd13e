//! A minimal s-expression reader for driving the pipeline from a text file.
//!
//! This is a debugging convenience, not a front end (the core performs no
//! surface parsing of its own). It covers the IR forms useful for hand-
//! written sample programs — variables, constants, application, curried
//! functions, `let`/`letrec`, primitives (including `makeblock`), and
//! `if`/`seq` — not the full nineteen-variant IR the printer can display;
//! `Switch`, `Staticcatch`, and friends only ever appear as *output* of a
//! pass, never as hand-authored input.

use std::collections::HashMap;
use std::fmt;

use rw_core::ident::{Ident, IdentGen};
use rw_core::ir::*;

#[derive(Debug)]
pub struct ParseError(pub String);

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parse error: {}", self.0)
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug, Clone)]
enum Sexpr {
    Atom(String),
    Str(String),
    List(Vec<Sexpr>),
}

struct Tokenizer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> Tokenizer<'a> {
    fn new(src: &'a str) -> Self {
        Self { chars: src.chars().peekable() }
    }

    fn parse_all(mut self) -> Result<Vec<Sexpr>, ParseError> {
        let mut out = Vec::new();
        loop {
            self.skip_ws();
            if self.chars.peek().is_none() {
                break;
            }
            out.push(self.parse_one()?);
        }
        Ok(out)
    }

    fn skip_ws(&mut self) {
        while let Some(&c) = self.chars.peek() {
            if c == ';' {
                while let Some(&c) = self.chars.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.chars.next();
                }
            } else if c.is_whitespace() {
                self.chars.next();
            } else {
                break;
            }
        }
    }

    fn parse_one(&mut self) -> Result<Sexpr, ParseError> {
        self.skip_ws();
        match self.chars.peek() {
            None => Err(ParseError("unexpected end of input".to_string())),
            Some('(') => {
                self.chars.next();
                let mut items = Vec::new();
                loop {
                    self.skip_ws();
                    match self.chars.peek() {
                        Some(')') => {
                            self.chars.next();
                            break;
                        }
                        None => return Err(ParseError("unclosed '('".to_string())),
                        _ => items.push(self.parse_one()?),
                    }
                }
                Ok(Sexpr::List(items))
            }
            Some(')') => Err(ParseError("unexpected ')'".to_string())),
            Some('"') => {
                self.chars.next();
                let mut s = String::new();
                loop {
                    match self.chars.next() {
                        Some('"') => break,
                        Some('\\') => {
                            if let Some(escaped) = self.chars.next() {
                                s.push(escaped);
                            }
                        }
                        Some(c) => s.push(c),
                        None => return Err(ParseError("unclosed string literal".to_string())),
                    }
                }
                Ok(Sexpr::Str(s))
            }
            Some(_) => {
                let mut s = String::new();
                while let Some(&c) = self.chars.peek() {
                    if c.is_whitespace() || c == '(' || c == ')' {
                        break;
                    }
                    s.push(c);
                    self.chars.next();
                }
                Ok(Sexpr::Atom(s))
            }
        }
    }
}

struct Builder<'g> {
    gen: &'g mut IdentGen,
    env: HashMap<String, Ident>,
}

/// Parse `src` into a `Term`, minting fresh identifiers for every binder it
/// encounters through `gen`.
pub fn parse(src: &str, gen: &mut IdentGen) -> Result<Term, ParseError> {
    let mut forms = Tokenizer::new(src).parse_all()?;
    if forms.len() != 1 {
        return Err(ParseError(format!("expected exactly one top-level form, found {}", forms.len())));
    }
    let mut builder = Builder { gen, env: HashMap::new() };
    builder.build(&forms.remove(0))
}

impl<'g> Builder<'g> {
    fn resolve(&self, name: &str) -> Result<Ident, ParseError> {
        self.env.get(name).cloned().ok_or_else(|| ParseError(format!("unbound identifier `{name}`")))
    }

    fn bind(&mut self, name: &str) -> Ident {
        let id = self.gen.fresh(name.to_string());
        self.env.insert(name.to_string(), id.clone());
        id
    }

    fn build(&mut self, s: &Sexpr) -> Result<Term, ParseError> {
        match s {
            Sexpr::Atom(a) => {
                if let Ok(n) = a.parse::<i64>() {
                    return Ok(Expr::Const(Constant::Int(n)).into_term());
                }
                Ok(Expr::Var(self.resolve(a)?).into_term())
            }
            Sexpr::Str(s) => Ok(Expr::Const(Constant::Str(s.clone())).into_term()),
            Sexpr::List(items) => self.build_list(items),
        }
    }

    fn build_list(&mut self, items: &[Sexpr]) -> Result<Term, ParseError> {
        let Some(Sexpr::Atom(head)) = items.first() else {
            return Err(ParseError("expected a form keyword in head position".to_string()));
        };
        let rest = &items[1..];
        match head.as_str() {
            "var" => {
                let [Sexpr::Atom(name)] = rest else {
                    return Err(ParseError("(var NAME) takes exactly one symbol".to_string()));
                };
                Ok(Expr::Var(self.resolve(name)?).into_term())
            }
            "apply" => {
                let [func, args @ ..] = rest else {
                    return Err(ParseError("(apply FUNC ARG...) needs a function".to_string()));
                };
                let func = self.build(func)?;
                let args = args.iter().map(|a| self.build(a)).collect::<Result<_, _>>()?;
                Ok(Expr::Apply(ApplyNode {
                    func,
                    args,
                    loc: Loc::UNKNOWN,
                    tail_hint: false,
                    inline_hint: Inline::default(),
                    tailcall: TailcallAnnotation::default(),
                })
                .into_term())
            }
            "fn" => {
                let [Sexpr::List(params), body] = rest else {
                    return Err(ParseError("(fn (PARAM...) BODY) malformed".to_string()));
                };
                let saved = self.env.clone();
                let mut param_ids = Vec::with_capacity(params.len());
                for p in params {
                    let Sexpr::Atom(name) = p else {
                        return Err(ParseError("function parameters must be symbols".to_string()));
                    };
                    param_ids.push((self.bind(name), ValueKind::Pgenval));
                }
                let body = self.build(body)?;
                self.env = saved;
                Ok(Expr::Function(FunctionNode {
                    calling_convention: CallingConvention::Curried,
                    params: param_ids,
                    return_kind: ValueKind::Pgenval,
                    body,
                    attrs: FunctionAttrs::default(),
                    loc: Loc::UNKNOWN,
                })
                .into_term())
            }
            "let" => {
                let [Sexpr::Atom(name), value, body] = rest else {
                    return Err(ParseError("(let NAME VALUE BODY) malformed".to_string()));
                };
                let value = self.build(value)?;
                let id = self.bind(name);
                let body = self.build(body)?;
                Ok(Expr::Let(LetNode {
                    binding_kind: BindingKind::Strict,
                    value_kind: ValueKind::Pgenval,
                    id,
                    value,
                    body,
                })
                .into_term())
            }
            "letrec" => {
                let [Sexpr::List(decls), body] = rest else {
                    return Err(ParseError("(letrec ((NAME VALUE)...) BODY) malformed".to_string()));
                };
                let mut names = Vec::with_capacity(decls.len());
                for d in decls {
                    let Sexpr::List(pair) = d else {
                        return Err(ParseError("each letrec binding must be (NAME VALUE)".to_string()));
                    };
                    let [Sexpr::Atom(name), _] = pair.as_slice() else {
                        return Err(ParseError("each letrec binding must be (NAME VALUE)".to_string()));
                    };
                    names.push(self.bind(name));
                }
                let mut bindings = Vec::with_capacity(decls.len());
                for (id, d) in names.into_iter().zip(decls) {
                    let Sexpr::List(pair) = d else { unreachable!() };
                    bindings.push((id, self.build(&pair[1])?));
                }
                let body = self.build(body)?;
                Ok(Expr::Letrec(LetrecNode { bindings, body }).into_term())
            }
            "if" => {
                let [cond, then_branch, else_branch] = rest else {
                    return Err(ParseError("(if COND THEN ELSE) malformed".to_string()));
                };
                Ok(Expr::Ifthenelse(IfthenelseNode {
                    cond: self.build(cond)?,
                    then_branch: self.build(then_branch)?,
                    else_branch: self.build(else_branch)?,
                })
                .into_term())
            }
            "seq" => {
                let [a, b] = rest else {
                    return Err(ParseError("(seq A B) malformed".to_string()));
                };
                Ok(Expr::Sequence(self.build(a)?, self.build(b)?).into_term())
            }
            "prim" => {
                let [Sexpr::Atom(name), args @ ..] = rest else {
                    return Err(ParseError("(prim NAME ARG...) malformed".to_string()));
                };
                let prim = parse_primitive(name)?;
                let args = args.iter().map(|a| self.build(a)).collect::<Result<_, _>>()?;
                Ok(Expr::Prim(PrimNode { prim, args, loc: Loc::UNKNOWN }).into_term())
            }
            other => Err(ParseError(format!("unknown form `{other}`"))),
        }
    }
}

fn parse_primitive(name: &str) -> Result<Primitive, ParseError> {
    if let Some(inner) = name.strip_prefix("makeblock[").and_then(|s| s.strip_suffix(']')) {
        let mutable = inner.ends_with(",mut");
        let tag_str = inner.strip_suffix(",mut").unwrap_or(inner);
        let tag = tag_str.parse::<u32>().map_err(|_| ParseError(format!("bad makeblock tag `{tag_str}`")))?;
        return Ok(Primitive::Makeblock { tag, mutable });
    }
    if let Some(inner) = name.strip_prefix("field[").and_then(|s| s.strip_suffix(']')) {
        let n = inner.parse::<u32>().map_err(|_| ParseError(format!("bad field index `{inner}`")))?;
        return Ok(Primitive::Field(n));
    }
    if let Some(inner) = name.strip_prefix("setfield[").and_then(|s| s.strip_suffix(']')) {
        let n = inner.parse::<u32>().map_err(|_| ParseError(format!("bad setfield index `{inner}`")))?;
        return Ok(Primitive::Setfield(n));
    }
    if let Some(inner) = name.strip_prefix("offsetref[").and_then(|s| s.strip_suffix(']')) {
        let n = inner.parse::<i64>().map_err(|_| ParseError(format!("bad offsetref `{inner}`")))?;
        return Ok(Primitive::Offsetref(n));
    }
    if let Some(inner) = name.strip_prefix("offsetint[").and_then(|s| s.strip_suffix(']')) {
        let n = inner.parse::<i64>().map_err(|_| ParseError(format!("bad offsetint `{inner}`")))?;
        return Ok(Primitive::Offsetint(n));
    }
    Ok(match name {
        "setfield_computed" => Primitive::SetfieldComputed,
        "revapply" => Primitive::Revapply,
        "dirapply" => Primitive::Dirapply,
        "identity" => Primitive::Identity,
        "bytes_to_string" => Primitive::BytesToString,
        "bytes_of_string" => Primitive::BytesOfString,
        "obj_with_tag" => Primitive::ObjWithTag,
        "+" => Primitive::Add,
        other => Primitive::Other(other.to_string()),
    })
}
