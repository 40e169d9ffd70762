//! RB-050: Proxy layer. Exposes host records to scripts.
//!
//! Each adapter declares a fixed table of [`Field`]s. A field named `x`
//! is readable as `obj.x`; if it has a setter, it is also callable as
//! `obj.set_x(v)` and assignable as `obj.x = v`. Anything else an adapter
//! offers (`append_after`, `cat`, ...) is listed in [`Proxy::methods`].
//!
//! Setters validate their argument completely before touching the record,
//! so a rejected value never leaves a partial mutation behind.

pub mod fs;
pub mod net;
pub mod systemd;

use crate::conf::parse_duration;
use crate::core::error::{Error, Result};
use crate::lang::value::{Arguments, NativeObject, Value};
use std::any::Any;
use std::time::Duration;

pub type Getter<P> = fn(&P) -> Result<Value>;
/// Receives the proxy, the new value, and a context string for errors.
pub type Setter<P> = fn(&P, &Value, &str) -> Result<()>;

pub struct Field<P> {
    pub name: &'static str,
    pub get: Getter<P>,
    pub set: Option<Setter<P>>,
}

/// A script-visible adapter over one host record.
pub trait Proxy: Sized + 'static {
    /// Script type name, e.g. `systemd.Unit`.
    fn proxy_type(&self) -> String;

    fn rendered(&self) -> String;

    fn fields(&self) -> &'static [Field<Self>];

    /// Methods other than the generated `set_<field>` ones.
    fn methods(&self) -> &'static [&'static str] {
        &[]
    }

    fn call(&self, name: &str, _args: Arguments) -> Result<Value> {
        Err(Error::NoSuchAttribute {
            type_name: self.proxy_type(),
            name: name.into(),
        })
    }
}

fn field<'a, P>(fields: &'a [Field<P>], name: &str) -> Option<&'a Field<P>> {
    fields.iter().find(|f| f.name == name)
}

fn setter<P>(fields: &[Field<P>], method: &str) -> Option<Setter<P>> {
    let name = method.strip_prefix("set_")?;
    field(fields, name).and_then(|f| f.set)
}

impl<P: Proxy> NativeObject for P {
    fn type_name(&self) -> String {
        self.proxy_type()
    }

    fn render(&self) -> String {
        self.rendered()
    }

    fn attr_names(&self) -> Vec<String> {
        let mut out = Vec::new();
        for f in self.fields() {
            out.push(f.name.to_string());
            if f.set.is_some() {
                out.push(format!("set_{}", f.name));
            }
        }
        out.extend(self.methods().iter().map(|m| m.to_string()));
        out
    }

    fn get_attr(&self, name: &str) -> Result<Option<Value>> {
        match field(self.fields(), name) {
            Some(f) => (f.get)(self).map(Some),
            None => Ok(None),
        }
    }

    fn has_method(&self, name: &str) -> bool {
        setter(self.fields(), name).is_some() || self.methods().contains(&name)
    }

    fn call_method(&self, name: &str, args: Arguments) -> Result<Value> {
        if let Some(set) = setter(self.fields(), name) {
            set(self, args.one(name)?, name)?;
            return Ok(Value::None);
        }
        self.call(name, args)
    }

    fn set_attr(&self, name: &str, value: Value) -> Result<()> {
        match field(self.fields(), name).and_then(|f| f.set) {
            Some(set) => set(self, &value, &format!("set_{}", name)),
            None => Err(Error::NoSuchAssignableField {
                type_name: self.proxy_type(),
                name: name.into(),
            }),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Build a proxy by routing each constructor argument through a setter.
///
/// A parameter is written `kw`, `kw?` (optional, as are all after it), or
/// `kw=field` when the keyword differs from the field it sets.
pub fn construct<P: Proxy>(proxy: P, fname: &str, params: &[&str], args: &Arguments) -> Result<P> {
    let split: Vec<(&str, &str)> = params
        .iter()
        .map(|p| p.split_once('=').unwrap_or((*p, *p)))
        .collect();
    let keywords: Vec<&str> = split.iter().map(|(kw, _)| *kw).collect();
    let bound = args.bind(fname, &keywords)?;
    for ((kw, name), value) in split.iter().zip(bound) {
        let Some(value) = value else { continue };
        let name = name.trim_end_matches('?');
        let set = field(proxy.fields(), name)
            .and_then(|f| f.set)
            .ok_or_else(|| Error::NoSuchAssignableField {
                type_name: proxy.proxy_type(),
                name: name.into(),
            })?;
        set(&proxy, &value, &format!("{}: {}", fname, kw.trim_end_matches('?')))?;
    }
    Ok(proxy)
}

/// Borrow the adapter behind a native value, or report what was passed instead.
pub fn expect_proxy<'a, T: 'static>(v: &'a Value, ctx: &str, expected: &str) -> Result<&'a T> {
    v.as_native::<T>()
        .ok_or_else(|| Error::type_mismatch(ctx, expected, v.type_name()))
}

/// Arguments of a variadic append: bare strings and lists of strings, in order.
pub fn flatten_strings(ctx: &str, args: &Arguments) -> Result<Vec<String>> {
    if let Some((kw, _)) = args.named.first() {
        return Err(Error::eval(format!("{}: unexpected keyword argument {}", ctx, kw)));
    }
    let mut out = Vec::new();
    for (i, arg) in args.positional.iter().enumerate() {
        match arg {
            Value::Str(s) => out.push(s.to_string()),
            Value::List(_) => out.extend(arg.expect_str_list(&format!("{}: argument {}", ctx, i))?),
            other => {
                return Err(Error::type_mismatch(
                    format!("{}: argument {}", ctx, i),
                    "string or list",
                    other.type_name(),
                ))
            }
        }
    }
    Ok(out)
}

/// Durations are given as nanoseconds or as a string like `"1m30s"`.
pub fn duration_arg(v: &Value, ctx: &str) -> Result<Duration> {
    match v {
        Value::Int(ns) => u64::try_from(*ns)
            .map(Duration::from_nanos)
            .map_err(|_| Error::eval(format!("{}: duration {} out of range", ctx, ns))),
        Value::Str(s) => parse_duration(s).map_err(|e| Error::eval(format!("{}: {}", ctx, e))),
        other => Err(Error::type_mismatch(ctx, "int or duration string", other.type_name())),
    }
}

pub fn duration_value(d: Duration) -> Value {
    Value::Int(i128::try_from(d.as_nanos()).unwrap_or(i128::MAX))
}

/// Non-negative integer that fits in `T`.
pub fn uint_arg<T: TryFrom<i128>>(v: &Value, ctx: &str) -> Result<T> {
    let i = v.expect_int(ctx)?;
    T::try_from(i).map_err(|_| {
        Error::eval(format!(
            "{}: {} is out of range for {}",
            ctx,
            i,
            std::any::type_name::<T>()
        ))
    })
}
