//! RB-022: Script value model and the native-object contract.
//!
//! Mutable aggregates (`list`, `dict`) are shared by reference, the way
//! script code expects: `a = b; a.append(1)` is visible through `b`.
//! Host records cross the boundary as `Value::Native`, which dispatches
//! attribute reads, writes and method calls through [`NativeObject`].

use super::ast::FuncDef;
use crate::core::error::{Error, Result};
use crate::core::hasher;
use indexmap::IndexMap;
use std::any::Any;
use std::cell::RefCell;
use std::fmt::Write as _;
use std::rc::Rc;

/// Ordered name → value bindings (module globals, predeclared namespaces).
pub type Namespace = IndexMap<String, Value>;

pub type DictMap = IndexMap<DictKey, (Value, Value)>;

#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i128),
    Str(Rc<str>),
    List(Rc<RefCell<Vec<Value>>>),
    Tuple(Rc<Vec<Value>>),
    Dict(Rc<RefCell<DictMap>>),
    Struct(Rc<Struct>),
    Function(Rc<Function>),
    Builtin(Rc<Builtin>),
    Native(Rc<dyn NativeObject>),
}

/// Host-side object exposed to scripts through uniform attribute dispatch.
pub trait NativeObject {
    /// Script-visible type name, e.g. `systemd.Unit`.
    fn type_name(&self) -> String;

    fn truth(&self) -> bool {
        true
    }

    /// Rendered configuration text; also what `str()` returns.
    fn render(&self) -> String;

    /// Identity for hashing and equality, derived from rendered content.
    fn content_hash(&self) -> String {
        hasher::composite_hash(&[&self.type_name(), &self.render()])
    }

    /// Every readable attribute and method name, in a fixed order.
    fn attr_names(&self) -> Vec<String>;

    /// Field read. `Ok(None)` means `name` is not a field (it may be a method).
    fn get_attr(&self, name: &str) -> Result<Option<Value>>;

    fn has_method(&self, name: &str) -> bool;

    fn call_method(&self, name: &str, args: Arguments) -> Result<Value>;

    /// Field assignment (`obj.name = value`).
    fn set_attr(&self, name: &str, value: Value) -> Result<()>;

    fn as_any(&self) -> &dyn Any;
}

/// Immutable attribute record produced by `struct()` and used for namespaces.
#[derive(Clone, Default)]
pub struct Struct {
    pub fields: Namespace,
}

impl Struct {
    pub fn new(fields: Namespace) -> Self {
        Self { fields }
    }

    pub fn value(fields: Namespace) -> Value {
        Value::Struct(Rc::new(Self::new(fields)))
    }
}

/// A module whose top-level statements have been (or are being) executed.
pub struct Module {
    pub name: String,
    pub globals: RefCell<Namespace>,
    pub predeclared: Rc<Namespace>,
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("globals", &self.globals.borrow().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Module {
    pub fn new(name: &str, predeclared: Rc<Namespace>) -> Self {
        Self {
            name: name.to_string(),
            globals: RefCell::new(Namespace::new()),
            predeclared,
        }
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.borrow().get(name).cloned()
    }
}

/// A script-defined function.
pub struct Function {
    pub def: Rc<FuncDef>,
    pub defaults: Vec<Option<Value>>,
    pub module: Rc<Module>,
}

pub type BuiltinFn = dyn Fn(Arguments) -> Result<Value>;

/// A host-implemented callable.
pub struct Builtin {
    pub name: String,
    pub func: Box<BuiltinFn>,
}

impl Builtin {
    pub fn value(name: &str, func: impl Fn(Arguments) -> Result<Value> + 'static) -> Value {
        Value::Builtin(Rc::new(Builtin {
            name: name.to_string(),
            func: Box::new(func),
        }))
    }
}

/// Hashable projection of a value used as a dict key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DictKey {
    None,
    Bool(bool),
    Int(i128),
    Str(Rc<str>),
    Tuple(Vec<DictKey>),
    Native(String),
}

/// Call arguments as written at the call site.
#[derive(Clone, Default)]
pub struct Arguments {
    pub positional: Vec<Value>,
    pub named: Vec<(String, Value)>,
}

impl Arguments {
    pub fn positional(values: Vec<Value>) -> Self {
        Self {
            positional: values,
            named: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.positional.len() + self.named.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Binds arguments to `params` by position, then by name.
    ///
    /// A parameter spelled `name?` is optional, and so is every parameter
    /// after it. Missing optional parameters bind to `None`.
    pub fn bind(&self, fname: &str, params: &[&str]) -> Result<Vec<Option<Value>>> {
        let mut out: Vec<Option<Value>> = vec![None; params.len()];
        let names: Vec<&str> = params.iter().map(|p| p.trim_end_matches('?')).collect();
        let first_optional = params
            .iter()
            .position(|p| p.ends_with('?'))
            .unwrap_or(params.len());

        if self.positional.len() > params.len() {
            return Err(Error::eval(format!(
                "{}: got {} arguments, want at most {}",
                fname,
                self.positional.len(),
                params.len()
            )));
        }
        for (i, v) in self.positional.iter().enumerate() {
            out[i] = Some(v.clone());
        }
        for (name, v) in &self.named {
            let Some(idx) = names.iter().position(|n| n == name) else {
                return Err(Error::eval(format!(
                    "{}: unexpected keyword argument {}",
                    fname, name
                )));
            };
            if out[idx].is_some() {
                return Err(Error::eval(format!(
                    "{}: got multiple values for parameter {}",
                    fname, name
                )));
            }
            out[idx] = Some(v.clone());
        }
        for (i, slot) in out.iter().enumerate().take(first_optional) {
            if slot.is_none() {
                return Err(Error::eval(format!(
                    "{}: missing argument for {}",
                    fname, names[i]
                )));
            }
        }
        Ok(out)
    }

    /// Requires exactly `n` positional arguments and no keywords.
    pub fn exact(&self, fname: &str, n: usize) -> Result<&[Value]> {
        if !self.named.is_empty() {
            return Err(Error::eval(format!(
                "{}: unexpected keyword argument {}",
                fname, self.named[0].0
            )));
        }
        if self.positional.len() != n {
            return Err(Error::eval(format!(
                "{}: got {} arguments, want {}",
                fname,
                self.positional.len(),
                n
            )));
        }
        Ok(&self.positional)
    }

    /// The single positional argument of a one-argument call.
    pub fn one(&self, fname: &str) -> Result<&Value> {
        Ok(&self.exact(fname, 1)?[0])
    }
}

impl Value {
    pub fn str(s: &str) -> Value {
        Value::Str(Rc::from(s))
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn tuple(items: Vec<Value>) -> Value {
        Value::Tuple(Rc::new(items))
    }

    pub fn native(obj: impl NativeObject + 'static) -> Value {
        Value::Native(Rc::new(obj))
    }

    pub fn str_list(items: &[String]) -> Value {
        Value::list(items.iter().map(|s| Value::str(s)).collect())
    }

    pub fn type_name(&self) -> String {
        match self {
            Value::None => "NoneType".into(),
            Value::Bool(_) => "bool".into(),
            Value::Int(_) => "int".into(),
            Value::Str(_) => "string".into(),
            Value::List(_) => "list".into(),
            Value::Tuple(_) => "tuple".into(),
            Value::Dict(_) => "dict".into(),
            Value::Struct(_) => "struct".into(),
            Value::Function(_) => "function".into(),
            Value::Builtin(_) => "builtin_function_or_method".into(),
            Value::Native(n) => n.type_name(),
        }
    }

    pub fn truth(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Str(s) => !s.is_empty(),
            Value::List(l) => !l.borrow().is_empty(),
            Value::Tuple(t) => !t.is_empty(),
            Value::Dict(d) => !d.borrow().is_empty(),
            Value::Struct(_) | Value::Function(_) | Value::Builtin(_) => true,
            Value::Native(n) => n.truth(),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_native<T: 'static>(&self) -> Option<&T> {
        match self {
            Value::Native(n) => n.as_any().downcast_ref::<T>(),
            _ => None,
        }
    }

    pub fn expect_str(&self, context: &str) -> Result<String> {
        match self {
            Value::Str(s) => Ok(s.to_string()),
            other => Err(Error::type_mismatch(context, "string", other.type_name())),
        }
    }

    pub fn expect_int(&self, context: &str) -> Result<i128> {
        match self {
            Value::Int(i) => Ok(*i),
            other => Err(Error::type_mismatch(context, "int", other.type_name())),
        }
    }

    pub fn expect_bool(&self, context: &str) -> Result<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(Error::type_mismatch(context, "bool", other.type_name())),
        }
    }

    /// Snapshot of a list's elements. Tuples are a different kind and are rejected.
    pub fn expect_list(&self, context: &str) -> Result<Vec<Value>> {
        match self {
            Value::List(l) => Ok(l.borrow().clone()),
            other => Err(Error::type_mismatch(context, "list", other.type_name())),
        }
    }

    /// A list whose every element is a string.
    pub fn expect_str_list(&self, context: &str) -> Result<Vec<String>> {
        self.expect_list(context)?
            .iter()
            .enumerate()
            .map(|(i, v)| v.expect_str(&format!("{}[{}]", context, i)))
            .collect()
    }

    pub fn expect_struct(&self, context: &str) -> Result<Rc<Struct>> {
        match self {
            Value::Struct(s) => Ok(s.clone()),
            other => Err(Error::type_mismatch(context, "struct", other.type_name())),
        }
    }

    /// Elements of an iterable, snapshotted so the body may mutate the source.
    pub fn iterate(&self) -> Result<Vec<Value>> {
        match self {
            Value::List(l) => Ok(l.borrow().clone()),
            Value::Tuple(t) => Ok(t.to_vec()),
            Value::Dict(d) => Ok(d.borrow().values().map(|(k, _)| k.clone()).collect()),
            other => Err(Error::eval(format!(
                "{} value is not iterable",
                other.type_name()
            ))),
        }
    }

    pub fn dict_key(&self) -> Result<DictKey> {
        Ok(match self {
            Value::None => DictKey::None,
            Value::Bool(b) => DictKey::Bool(*b),
            Value::Int(i) => DictKey::Int(*i),
            Value::Str(s) => DictKey::Str(s.clone()),
            Value::Tuple(t) => DictKey::Tuple(t.iter().map(|v| v.dict_key()).collect::<Result<_>>()?),
            Value::Native(n) => DictKey::Native(n.content_hash()),
            other => {
                return Err(Error::eval(format!(
                    "unhashable type: {}",
                    other.type_name()
                )))
            }
        })
    }

    /// `str(v)`: strings unquoted, everything else as `repr`.
    pub fn to_str(&self) -> String {
        match self {
            Value::Str(s) => s.to_string(),
            Value::Native(n) => n.render(),
            other => other.repr(),
        }
    }

    pub fn repr(&self) -> String {
        let mut out = String::new();
        self.write_repr(&mut out, 0);
        out
    }

    fn write_repr(&self, out: &mut String, depth: usize) {
        if depth > 32 {
            out.push_str("...");
            return;
        }
        match self {
            Value::None => out.push_str("None"),
            Value::Bool(true) => out.push_str("True"),
            Value::Bool(false) => out.push_str("False"),
            Value::Int(i) => {
                let _ = write!(out, "{}", i);
            }
            Value::Str(s) => {
                let _ = write!(out, "{:?}", s);
            }
            Value::List(l) => {
                out.push('[');
                write_items(out, &l.borrow(), depth);
                out.push(']');
            }
            Value::Tuple(t) => {
                out.push('(');
                write_items(out, t, depth);
                if t.len() == 1 {
                    out.push(',');
                }
                out.push(')');
            }
            Value::Dict(d) => {
                out.push('{');
                for (i, (k, v)) in d.borrow().values().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    k.write_repr(out, depth + 1);
                    out.push_str(": ");
                    v.write_repr(out, depth + 1);
                }
                out.push('}');
            }
            Value::Struct(s) => {
                out.push_str("struct(");
                for (i, (k, v)) in s.fields.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    let _ = write!(out, "{} = ", k);
                    v.write_repr(out, depth + 1);
                }
                out.push(')');
            }
            Value::Function(f) => {
                let _ = write!(out, "<function {}>", f.def.name);
            }
            Value::Builtin(b) => {
                let _ = write!(out, "<built-in function {}>", b.name);
            }
            Value::Native(n) => out.push_str(&n.render()),
        }
    }

    /// Structural equality; natives compare by type and rendered content.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                Rc::ptr_eq(a, b) || seq_equals(&a.borrow(), &b.borrow())
            }
            (Value::Tuple(a), Value::Tuple(b)) => seq_equals(a, b),
            (Value::Dict(a), Value::Dict(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len()
                    && a.iter().all(|(k, (_, v))| {
                        b.get(k).is_some_and(|(_, bv)| v.equals(bv))
                    })
            }
            (Value::Struct(a), Value::Struct(b)) => {
                a.fields.len() == b.fields.len()
                    && a.fields.iter().all(|(k, v)| {
                        b.fields.get(k).is_some_and(|bv| v.equals(bv))
                    })
            }
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => {
                a.type_name() == b.type_name() && a.render() == b.render()
            }
            _ => false,
        }
    }

    /// Ordering for `<`, `sorted`, `min`, `max`.
    pub fn compare(&self, other: &Value) -> Result<std::cmp::Ordering> {
        use std::cmp::Ordering;
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Ok(a.cmp(b)),
            (Value::List(a), Value::List(b)) => seq_compare(&a.borrow(), &b.borrow()),
            (Value::Tuple(a), Value::Tuple(b)) => seq_compare(a, b),
            (Value::None, Value::None) => Ok(Ordering::Equal),
            (a, b) => Err(Error::eval(format!(
                "unsupported comparison: {} < {}",
                a.type_name(),
                b.type_name()
            ))),
        }
    }
}

fn write_items(out: &mut String, items: &[Value], depth: usize) {
    for (i, v) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        v.write_repr(out, depth + 1);
    }
}

fn seq_equals(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equals(y))
}

fn seq_compare(a: &[Value], b: &[Value]) -> Result<std::cmp::Ordering> {
    for (x, y) in a.iter().zip(b) {
        let o = x.compare(y)?;
        if o != std::cmp::Ordering::Equal {
            return Ok(o);
        }
    }
    Ok(a.len().cmp(&b.len()))
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.repr())
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_str())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i128> for Value {
    fn from(i: i128) -> Self {
        Value::Int(i)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i as i128)
    }
}

impl From<u64> for Value {
    fn from(i: u64) -> Self {
        Value::Int(i as i128)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

/// Attribute read on any value.
pub fn get_attr(v: &Value, name: &str) -> Result<Value> {
    match v {
        Value::Struct(s) => s.fields.get(name).cloned().ok_or_else(|| Error::NoSuchAttribute {
            type_name: "struct".into(),
            name: name.into(),
        }),
        Value::Native(n) => {
            if let Some(field) = n.get_attr(name)? {
                return Ok(field);
            }
            if n.has_method(name) {
                let recv = n.clone();
                let method = name.to_string();
                return Ok(Builtin::value(name, move |args| recv.call_method(&method, args)));
            }
            Err(Error::NoSuchAttribute {
                type_name: n.type_name(),
                name: name.into(),
            })
        }
        other => super::methods::bound_method(other, name).ok_or_else(|| Error::NoSuchAttribute {
            type_name: other.type_name(),
            name: name.into(),
        }),
    }
}

/// Attribute assignment on any value.
pub fn set_attr(v: &Value, name: &str, value: Value) -> Result<()> {
    match v {
        Value::Native(n) => n.set_attr(name, value),
        other => Err(Error::NoSuchAssignableField {
            type_name: other.type_name(),
            name: name.into(),
        }),
    }
}

/// Names visible through `dir()`.
pub fn attr_names(v: &Value) -> Vec<String> {
    match v {
        Value::Struct(s) => s.fields.keys().cloned().collect(),
        Value::Native(n) => n.attr_names(),
        other => super::methods::method_names(other)
            .iter()
            .map(|s| s.to_string())
            .collect(),
    }
}
