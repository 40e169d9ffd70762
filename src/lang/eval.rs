//! RB-023: Tree-walking evaluator.
//!
//! One [`Thread`] runs one script invocation: module top levels, function
//! bodies and entrypoints. Recursion is rejected at call time, so the call
//! stack is bounded by the static call graph.

use super::ast::*;
use super::value::*;
use crate::core::error::{Error, Result};
use indexmap::IndexMap;
use std::cell::RefCell;
use std::rc::Rc;

/// Resolves `load()` statements to executed modules.
pub trait ModuleLoader {
    fn load(&self, name: &str) -> Result<Rc<Module>>;
}

/// Control-flow outcome of a statement.
enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

struct Frame {
    module: Rc<Module>,
    /// `None` at module top level, where bindings are globals.
    locals: Option<IndexMap<String, Value>>,
}

impl Frame {
    fn file(&self) -> &str {
        &self.module.name
    }
}

/// Bound on nested expression evaluation, counted across calls.
const MAX_EVAL_DEPTH: usize = 256;

pub struct Thread<'a> {
    loader: Option<&'a dyn ModuleLoader>,
    stack: Vec<Rc<FuncDef>>,
    depth: usize,
}

impl<'a> Thread<'a> {
    pub fn new(loader: Option<&'a dyn ModuleLoader>) -> Self {
        Self {
            loader,
            stack: Vec::new(),
            depth: 0,
        }
    }

    /// Run a program's top level, binding its globals into `module`.
    pub fn exec_module(&mut self, module: &Rc<Module>, program: &Program) -> Result<()> {
        let mut frame = Frame {
            module: module.clone(),
            locals: None,
        };
        for stmt in &program.stmts {
            match self.exec(&mut frame, stmt)? {
                Flow::Normal => {}
                _ => return Err(pos_err(frame.file(), stmt.line, "control flow outside of a function")),
            }
        }
        Ok(())
    }

    /// Call any callable value.
    pub fn call(&mut self, callee: &Value, args: Arguments) -> Result<Value> {
        match callee {
            Value::Function(f) => self.call_function(f, args),
            Value::Builtin(b) => (b.func)(args),
            other => Err(Error::eval(format!(
                "invalid call of non-function ({})",
                other.type_name()
            ))),
        }
    }

    fn call_function(&mut self, f: &Rc<Function>, args: Arguments) -> Result<Value> {
        let def = &f.def;
        if self.stack.iter().any(|d| Rc::ptr_eq(d, def)) {
            return Err(Error::eval(format!("function {} called recursively", def.name)));
        }
        let locals = bind_params(f, args)?;
        let mut frame = Frame {
            module: f.module.clone(),
            locals: Some(locals),
        };
        self.stack.push(def.clone());
        let result = self.exec_block(&mut frame, &def.body);
        self.stack.pop();
        match result? {
            Flow::Return(v) => Ok(v),
            _ => Ok(Value::None),
        }
    }

    fn exec_block(&mut self, frame: &mut Frame, stmts: &[Stmt]) -> Result<Flow> {
        for stmt in stmts {
            match self.exec(frame, stmt)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, frame: &mut Frame, stmt: &Stmt) -> Result<Flow> {
        let line = stmt.line;
        match &stmt.kind {
            StmtKind::Expr(e) => {
                self.eval(frame, e)?;
            }
            StmtKind::Assign(target, rhs) => {
                let v = self.eval(frame, rhs)?;
                self.assign(frame, target, v)?;
            }
            StmtKind::AugAssign(target, op, rhs) => self.aug_assign(frame, target, *op, rhs)?,
            StmtKind::Def(def) => {
                let mut defaults = Vec::with_capacity(def.params.len());
                for p in &def.params {
                    defaults.push(match &p.default {
                        Some(e) => Some(self.eval(frame, e)?),
                        None => None,
                    });
                }
                let f = Value::Function(Rc::new(Function {
                    def: def.clone(),
                    defaults,
                    module: frame.module.clone(),
                }));
                bind_name(frame, &def.name, f);
            }
            StmtKind::Return(e) => {
                let v = match e {
                    Some(e) => self.eval(frame, e)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(v));
            }
            StmtKind::If(arms, otherwise) => {
                for (cond, body) in arms {
                    if self.eval(frame, cond)?.truth() {
                        return self.exec_block(frame, body);
                    }
                }
                if let Some(body) = otherwise {
                    return self.exec_block(frame, body);
                }
            }
            StmtKind::For(target, iter, body) => {
                let items = self.eval(frame, iter)?.iterate()
                    .map_err(|e| at(frame.file(), line, e))?;
                for item in items {
                    self.assign(frame, target, item)?;
                    match self.exec_block(frame, body)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
            StmtKind::Pass => {}
            StmtKind::Load { module, symbols } => self.load(frame, line, module, symbols)?,
        }
        Ok(Flow::Normal)
    }

    fn load(
        &mut self,
        frame: &mut Frame,
        line: usize,
        module: &str,
        symbols: &[(String, String)],
    ) -> Result<()> {
        let Some(loader) = self.loader else {
            return Err(pos_err(frame.file(), line, "load not implemented by this application"));
        };
        let loaded = loader.load(module)?;
        for (local, exported) in symbols {
            if exported.starts_with('_') {
                return Err(pos_err(
                    frame.file(),
                    line,
                    format!("load: symbol {} is private", exported),
                ));
            }
            let Some(v) = loaded.global(exported) else {
                return Err(pos_err(
                    frame.file(),
                    line,
                    format!("load: name {} not found in module {}", exported, module),
                ));
            };
            bind_name(frame, local, v);
        }
        Ok(())
    }

    fn assign(&mut self, frame: &mut Frame, target: &Expr, v: Value) -> Result<()> {
        match &target.kind {
            ExprKind::Name(name) => {
                bind_name(frame, name, v);
                Ok(())
            }
            ExprKind::Attr(obj, name) => {
                let obj = self.eval(frame, obj)?;
                set_attr(&obj, name, v)
            }
            ExprKind::Index(obj, key) => {
                let obj = self.eval(frame, obj)?;
                let key = self.eval(frame, key)?;
                set_index(&obj, &key, v).map_err(|e| at(frame.file(), target.line, e))
            }
            ExprKind::Tuple(items) | ExprKind::List(items) => {
                let values = v.iterate().map_err(|e| at(frame.file(), target.line, e))?;
                if values.len() != items.len() {
                    return Err(pos_err(
                        frame.file(),
                        target.line,
                        format!(
                            "too {} values to unpack (got {}, want {})",
                            if values.len() > items.len() { "many" } else { "few" },
                            values.len(),
                            items.len()
                        ),
                    ));
                }
                for (t, v) in items.iter().zip(values) {
                    self.assign(frame, t, v)?;
                }
                Ok(())
            }
            _ => Err(pos_err(frame.file(), target.line, "cannot assign to this expression")),
        }
    }

    fn aug_assign(&mut self, frame: &mut Frame, target: &Expr, op: BinOp, rhs: &Expr) -> Result<()> {
        let line = target.line;
        match &target.kind {
            ExprKind::Name(name) => {
                let cur = lookup(frame, name).ok_or_else(|| {
                    pos_err(frame.file(), line, format!("undefined: {}", name))
                })?;
                let r = self.eval(frame, rhs)?;
                let v = aug_value(&cur, op, &r).map_err(|e| at(frame.file(), line, e))?;
                bind_name(frame, name, v);
                Ok(())
            }
            ExprKind::Attr(obj, name) => {
                let obj = self.eval(frame, obj)?;
                let cur = get_attr(&obj, name)?;
                let r = self.eval(frame, rhs)?;
                let v = aug_value(&cur, op, &r).map_err(|e| at(frame.file(), line, e))?;
                set_attr(&obj, name, v)
            }
            ExprKind::Index(obj, key) => {
                let obj = self.eval(frame, obj)?;
                let key = self.eval(frame, key)?;
                let cur = index(&obj, &key).map_err(|e| at(frame.file(), line, e))?;
                let r = self.eval(frame, rhs)?;
                let v = aug_value(&cur, op, &r).map_err(|e| at(frame.file(), line, e))?;
                set_index(&obj, &key, v).map_err(|e| at(frame.file(), line, e))
            }
            _ => Err(pos_err(frame.file(), line, "cannot assign to this expression")),
        }
    }

    fn eval(&mut self, frame: &mut Frame, e: &Expr) -> Result<Value> {
        if self.depth >= MAX_EVAL_DEPTH {
            return Err(pos_err(frame.file(), e.line, "expression nested too deeply"));
        }
        self.depth += 1;
        let result = self.eval_expr(frame, e);
        self.depth -= 1;
        result
    }

    fn eval_expr(&mut self, frame: &mut Frame, e: &Expr) -> Result<Value> {
        let line = e.line;
        Ok(match &e.kind {
            ExprKind::None => Value::None,
            ExprKind::Bool(b) => Value::Bool(*b),
            ExprKind::Int(i) => Value::Int(*i),
            ExprKind::Str(s) => Value::Str(s.clone()),
            ExprKind::Name(name) => lookup(frame, name)
                .ok_or_else(|| pos_err(frame.file(), line, format!("undefined: {}", name)))?,
            ExprKind::List(items) => Value::list(self.eval_all(frame, items)?),
            ExprKind::Tuple(items) => Value::tuple(self.eval_all(frame, items)?),
            ExprKind::Dict(entries) => {
                let mut map = DictMap::new();
                for (k, v) in entries {
                    let k = self.eval(frame, k)?;
                    let v = self.eval(frame, v)?;
                    let key = k.dict_key().map_err(|e| at(frame.file(), line, e))?;
                    map.insert(key, (k, v));
                }
                Value::Dict(Rc::new(RefCell::new(map)))
            }
            ExprKind::Comprehension { elt, clauses } => {
                let mut inner = Frame {
                    module: frame.module.clone(),
                    locals: Some(frame.locals.clone().unwrap_or_default()),
                };
                let mut out = Vec::new();
                self.comprehension(&mut inner, elt, clauses, &mut out)?;
                Value::list(out)
            }
            ExprKind::Unary(op, operand) => {
                let v = self.eval(frame, operand)?;
                unary(*op, &v).map_err(|e| at(frame.file(), line, e))?
            }
            ExprKind::Binary(l, op, r) => {
                let l = self.eval(frame, l)?;
                let r = self.eval(frame, r)?;
                binary(&l, *op, &r).map_err(|e| at(frame.file(), line, e))?
            }
            ExprKind::And(l, r) => {
                let l = self.eval(frame, l)?;
                if !l.truth() {
                    l
                } else {
                    self.eval(frame, r)?
                }
            }
            ExprKind::Or(l, r) => {
                let l = self.eval(frame, l)?;
                if l.truth() {
                    l
                } else {
                    self.eval(frame, r)?
                }
            }
            ExprKind::Cond {
                cond,
                then,
                otherwise,
            } => {
                if self.eval(frame, cond)?.truth() {
                    self.eval(frame, then)?
                } else {
                    self.eval(frame, otherwise)?
                }
            }
            ExprKind::Call { func, args } => {
                let callee = self.eval(frame, func)?;
                let args = self.eval_args(frame, args, line)?;
                match &callee {
                    Value::Function(f) => self.call_function(f, args)?,
                    Value::Builtin(b) => (b.func)(args).map_err(|e| at(frame.file(), line, e))?,
                    other => {
                        return Err(pos_err(
                            frame.file(),
                            line,
                            format!("invalid call of non-function ({})", other.type_name()),
                        ))
                    }
                }
            }
            ExprKind::Attr(obj, name) => {
                let obj = self.eval(frame, obj)?;
                get_attr(&obj, name)?
            }
            ExprKind::Index(obj, key) => {
                let obj = self.eval(frame, obj)?;
                let key = self.eval(frame, key)?;
                index(&obj, &key).map_err(|e| at(frame.file(), line, e))?
            }
            ExprKind::Slice { obj, lo, hi } => {
                let obj = self.eval(frame, obj)?;
                let lo = match lo {
                    Some(e) => Some(self.eval(frame, e)?.expect_int("slice")?),
                    None => None,
                };
                let hi = match hi {
                    Some(e) => Some(self.eval(frame, e)?.expect_int("slice")?),
                    None => None,
                };
                slice(&obj, lo, hi).map_err(|e| at(frame.file(), line, e))?
            }
        })
    }

    fn eval_all(&mut self, frame: &mut Frame, items: &[Expr]) -> Result<Vec<Value>> {
        items.iter().map(|e| self.eval(frame, e)).collect()
    }

    fn eval_args(&mut self, frame: &mut Frame, args: &[Arg], line: usize) -> Result<Arguments> {
        let mut out = Arguments::default();
        for arg in args {
            match arg {
                Arg::Positional(e) => out.positional.push(self.eval(frame, e)?),
                Arg::Named(name, e) => {
                    let v = self.eval(frame, e)?;
                    out.named.push((name.clone(), v));
                }
                Arg::Star(e) => {
                    let v = self.eval(frame, e)?;
                    out.positional
                        .extend(v.iterate().map_err(|e| at(frame.file(), line, e))?);
                }
                Arg::StarStar(e) => {
                    let Value::Dict(d) = self.eval(frame, e)? else {
                        return Err(pos_err(frame.file(), line, "argument after ** must be a dict"));
                    };
                    for (k, v) in d.borrow().values() {
                        let k = k.expect_str("keyword argument name")?;
                        out.named.push((k, v.clone()));
                    }
                }
            }
        }
        Ok(out)
    }

    fn comprehension(
        &mut self,
        frame: &mut Frame,
        elt: &Expr,
        clauses: &[Clause],
        out: &mut Vec<Value>,
    ) -> Result<()> {
        let Some((first, rest)) = clauses.split_first() else {
            out.push(self.eval(frame, elt)?);
            return Ok(());
        };
        match first {
            Clause::For(target, iter) => {
                let items = self.eval(frame, iter)?.iterate()
                    .map_err(|e| at(frame.file(), iter.line, e))?;
                for item in items {
                    self.assign(frame, target, item)?;
                    self.comprehension(frame, elt, rest, out)?;
                }
            }
            Clause::If(cond) => {
                if self.eval(frame, cond)?.truth() {
                    self.comprehension(frame, elt, rest, out)?;
                }
            }
        }
        Ok(())
    }
}

fn lookup(frame: &Frame, name: &str) -> Option<Value> {
    if let Some(v) = frame.locals.as_ref().and_then(|l| l.get(name)) {
        return Some(v.clone());
    }
    if let Some(v) = frame.module.global(name) {
        return Some(v);
    }
    frame.module.predeclared.get(name).cloned()
}

fn bind_name(frame: &mut Frame, name: &str, v: Value) {
    match &mut frame.locals {
        Some(locals) => {
            locals.insert(name.to_string(), v);
        }
        None => {
            frame.module.globals.borrow_mut().insert(name.to_string(), v);
        }
    }
}

fn bind_params(f: &Function, args: Arguments) -> Result<IndexMap<String, Value>> {
    let def = &f.def;
    let mut slots: Vec<Option<Value>> = vec![None; def.params.len()];
    if args.positional.len() > def.params.len() {
        return Err(Error::eval(format!(
            "function {} accepts at most {} positional arguments ({} given)",
            def.name,
            def.params.len(),
            args.positional.len()
        )));
    }
    for (slot, v) in slots.iter_mut().zip(args.positional) {
        *slot = Some(v);
    }
    for (name, v) in args.named {
        let Some(i) = def.params.iter().position(|p| p.name == name) else {
            return Err(Error::eval(format!(
                "function {} got an unexpected keyword argument {}",
                def.name, name
            )));
        };
        if slots[i].is_some() {
            return Err(Error::eval(format!(
                "function {} got multiple values for parameter {}",
                def.name, name
            )));
        }
        slots[i] = Some(v);
    }
    let mut locals = IndexMap::with_capacity(slots.len());
    for (i, slot) in slots.into_iter().enumerate() {
        let v = match slot.or_else(|| f.defaults[i].clone()) {
            Some(v) => v,
            None => {
                return Err(Error::eval(format!(
                    "function {} missing argument for {}",
                    def.name, def.params[i].name
                )))
            }
        };
        locals.insert(def.params[i].name.clone(), v);
    }
    Ok(locals)
}

fn pos_err(file: &str, line: usize, msg: impl std::fmt::Display) -> Error {
    Error::Eval(format!("{}:{}: {}", file, line, msg))
}

/// Attach a source position to a bare evaluation error.
fn at(file: &str, line: usize, e: Error) -> Error {
    match e {
        Error::Eval(msg) => pos_err(file, line, msg),
        other => other,
    }
}

fn unary(op: UnaryOp, v: &Value) -> Result<Value> {
    match (op, v) {
        (UnaryOp::Not, v) => Ok(Value::Bool(!v.truth())),
        (UnaryOp::Pos, Value::Int(i)) => Ok(Value::Int(*i)),
        (UnaryOp::Neg, Value::Int(i)) => i
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| Error::eval("integer overflow")),
        (op, v) => Err(Error::eval(format!(
            "unknown unary op: {}{}",
            if op == UnaryOp::Neg { "-" } else { "+" },
            v.type_name()
        ))),
    }
}

fn aug_value(cur: &Value, op: BinOp, rhs: &Value) -> Result<Value> {
    if let (Value::List(l), BinOp::Add) = (cur, op) {
        let extra = rhs.iterate()?;
        l.borrow_mut().extend(extra);
        return Ok(cur.clone());
    }
    binary(cur, op, rhs)
}

pub fn binary(l: &Value, op: BinOp, r: &Value) -> Result<Value> {
    use BinOp::*;
    let overflow = || Error::eval("integer overflow");
    Ok(match (op, l, r) {
        (Eq, _, _) => Value::Bool(l.equals(r)),
        (Ne, _, _) => Value::Bool(!l.equals(r)),
        (Lt, _, _) => Value::Bool(l.compare(r)?.is_lt()),
        (Le, _, _) => Value::Bool(l.compare(r)?.is_le()),
        (Gt, _, _) => Value::Bool(l.compare(r)?.is_gt()),
        (Ge, _, _) => Value::Bool(l.compare(r)?.is_ge()),
        (In, _, _) => Value::Bool(contains(r, l)?),
        (NotIn, _, _) => Value::Bool(!contains(r, l)?),

        (Add, Value::Int(a), Value::Int(b)) => Value::Int(a.checked_add(*b).ok_or_else(overflow)?),
        (Sub, Value::Int(a), Value::Int(b)) => Value::Int(a.checked_sub(*b).ok_or_else(overflow)?),
        (Mul, Value::Int(a), Value::Int(b)) => Value::Int(a.checked_mul(*b).ok_or_else(overflow)?),
        (FloorDiv, Value::Int(a), Value::Int(b)) => Value::Int(floor_div(*a, *b)?),
        (Mod, Value::Int(a), Value::Int(b)) => {
            if *b == 0 {
                return Err(Error::eval("integer modulo by zero"));
            }
            let m = a.checked_rem(*b).ok_or_else(overflow)?;
            Value::Int(if m != 0 && ((m < 0) != (*b < 0)) { m + b } else { m })
        }

        (Add, Value::Str(a), Value::Str(b)) => Value::from(format!("{}{}", a, b)),
        (Add, Value::List(a), Value::List(b)) => {
            let mut items = a.borrow().clone();
            items.extend(b.borrow().iter().cloned());
            Value::list(items)
        }
        (Add, Value::Tuple(a), Value::Tuple(b)) => {
            Value::tuple(a.iter().chain(b.iter()).cloned().collect())
        }
        (Mul, Value::Str(s), Value::Int(n)) | (Mul, Value::Int(n), Value::Str(s)) => {
            Value::from(s.repeat(repeat_count(*n)?))
        }
        (Mul, Value::List(items), Value::Int(n)) | (Mul, Value::Int(n), Value::List(items)) => {
            let items = items.borrow();
            Value::list(repeat_items(&items, *n)?)
        }
        (Mul, Value::Tuple(items), Value::Int(n)) | (Mul, Value::Int(n), Value::Tuple(items)) => {
            Value::tuple(repeat_items(items, *n)?)
        }
        (Mod, Value::Str(fmt), arg) => Value::from(percent_format(fmt, arg)?),

        (op, l, r) => {
            return Err(Error::eval(format!(
                "unknown binary op: {} {} {}",
                l.type_name(),
                op.symbol(),
                r.type_name()
            )))
        }
    })
}

fn floor_div(a: i128, b: i128) -> Result<i128> {
    if b == 0 {
        return Err(Error::eval("integer division by zero"));
    }
    let q = a.checked_div(b).ok_or_else(|| Error::eval("integer overflow"))?;
    if (a % b != 0) && ((a < 0) != (b < 0)) {
        Ok(q - 1)
    } else {
        Ok(q)
    }
}

fn repeat_count(n: i128) -> Result<usize> {
    if n <= 0 {
        return Ok(0);
    }
    usize::try_from(n)
        .ok()
        .filter(|n| *n <= 1 << 20)
        .ok_or_else(|| Error::eval("repeat count too large"))
}

fn repeat_items(items: &[Value], n: i128) -> Result<Vec<Value>> {
    let n = repeat_count(n)?;
    let mut out = Vec::with_capacity(items.len() * n);
    for _ in 0..n {
        out.extend(items.iter().cloned());
    }
    Ok(out)
}

fn contains(container: &Value, needle: &Value) -> Result<bool> {
    match container {
        Value::List(l) => Ok(l.borrow().iter().any(|v| v.equals(needle))),
        Value::Tuple(t) => Ok(t.iter().any(|v| v.equals(needle))),
        Value::Dict(d) => Ok(d.borrow().contains_key(&needle.dict_key()?)),
        Value::Str(s) => match needle {
            Value::Str(n) => Ok(s.contains(&**n)),
            other => Err(Error::eval(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        other => Err(Error::eval(format!(
            "unknown binary op: {} in {}",
            needle.type_name(),
            other.type_name()
        ))),
    }
}

/// `fmt % arg` with the `%s`, `%d`, `%r` and `%%` directives.
pub fn percent_format(fmt: &str, arg: &Value) -> Result<String> {
    let args: Vec<Value> = match arg {
        Value::Tuple(t) => t.to_vec(),
        other => vec![other.clone()],
    };
    let mut next = args.iter();
    let mut out = String::with_capacity(fmt.len());
    let mut chars = fmt.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let directive = chars
            .next()
            .ok_or_else(|| Error::eval("incomplete format"))?;
        if directive == '%' {
            out.push('%');
            continue;
        }
        let v = next
            .next()
            .ok_or_else(|| Error::eval("not enough arguments for format string"))?;
        match directive {
            's' => out.push_str(&v.to_str()),
            'r' => out.push_str(&v.repr()),
            'd' => out.push_str(&v.expect_int("%d format")?.to_string()),
            other => {
                return Err(Error::eval(format!(
                    "unsupported format character '{}'",
                    other
                )))
            }
        }
    }
    if next.next().is_some() {
        return Err(Error::eval("too many arguments for format string"));
    }
    Ok(out)
}

fn norm_index(i: i128, len: usize) -> Result<usize> {
    let len_i = len as i128;
    let idx = if i < 0 { i + len_i } else { i };
    if idx < 0 || idx >= len_i {
        return Err(Error::eval(format!(
            "index {} out of range: length is {}",
            i, len
        )));
    }
    Ok(idx as usize)
}

pub fn index(obj: &Value, key: &Value) -> Result<Value> {
    match obj {
        Value::List(l) => {
            let l = l.borrow();
            Ok(l[norm_index(key.expect_int("list index")?, l.len())?].clone())
        }
        Value::Tuple(t) => Ok(t[norm_index(key.expect_int("tuple index")?, t.len())?].clone()),
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let i = norm_index(key.expect_int("string index")?, chars.len())?;
            Ok(Value::from(chars[i].to_string()))
        }
        Value::Dict(d) => d
            .borrow()
            .get(&key.dict_key()?)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| Error::eval(format!("key {} not in dict", key.repr()))),
        other => Err(Error::eval(format!(
            "unhandled index operation {}[{}]",
            other.type_name(),
            key.type_name()
        ))),
    }
}

fn set_index(obj: &Value, key: &Value, v: Value) -> Result<()> {
    match obj {
        Value::List(l) => {
            let mut l = l.borrow_mut();
            let i = norm_index(key.expect_int("list index")?, l.len())?;
            l[i] = v;
            Ok(())
        }
        Value::Dict(d) => {
            d.borrow_mut().insert(key.dict_key()?, (key.clone(), v));
            Ok(())
        }
        other => Err(Error::eval(format!(
            "{} value does not support item assignment",
            other.type_name()
        ))),
    }
}

fn slice_bounds(lo: Option<i128>, hi: Option<i128>, len: usize) -> (usize, usize) {
    let len_i = len as i128;
    let clamp = |i: i128| -> usize {
        let i = if i < 0 { i + len_i } else { i };
        i.clamp(0, len_i) as usize
    };
    let lo = lo.map(clamp).unwrap_or(0);
    let hi = hi.map(clamp).unwrap_or(len);
    (lo, hi.max(lo))
}

fn slice(obj: &Value, lo: Option<i128>, hi: Option<i128>) -> Result<Value> {
    match obj {
        Value::List(l) => {
            let l = l.borrow();
            let (a, b) = slice_bounds(lo, hi, l.len());
            Ok(Value::list(l[a..b].to_vec()))
        }
        Value::Tuple(t) => {
            let (a, b) = slice_bounds(lo, hi, t.len());
            Ok(Value::tuple(t[a..b].to_vec()))
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let (a, b) = slice_bounds(lo, hi, chars.len());
            Ok(Value::from(chars[a..b].iter().collect::<String>()))
        }
        other => Err(Error::eval(format!("invalid slice operand {}", other.type_name()))),
    }
}
