//! RB-024: Predeclared builtins available to every module.

use super::value::*;
use crate::core::error::{Error, Result};
use std::rc::Rc;

/// Receives each line written by `print()`.
pub type PrintSink = Rc<dyn Fn(&str)>;

/// Build the universe namespace. `print` output goes to `sink`.
pub fn universe(sink: PrintSink) -> Namespace {
    let mut ns = Namespace::new();
    let mut add = |name: &str, f: fn(Arguments) -> Result<Value>| {
        ns.insert(name.to_string(), Builtin::value(name, f));
    };
    add("len", len);
    add("str", |a| Ok(Value::from(a.one("str")?.to_str())));
    add("repr", |a| Ok(Value::from(a.one("repr")?.repr())));
    add("bool", |a| {
        let a = a.bind("bool", &["x?"])?;
        Ok(Value::Bool(a[0].as_ref().is_some_and(Value::truth)))
    });
    add("int", int);
    add("type", |a| Ok(Value::from(a.one("type")?.type_name())));
    add("list", |a| {
        let a = a.bind("list", &["iterable?"])?;
        Ok(Value::list(match &a[0] {
            Some(v) => v.iterate()?,
            None => Vec::new(),
        }))
    });
    add("tuple", |a| {
        let a = a.bind("tuple", &["iterable?"])?;
        Ok(Value::tuple(match &a[0] {
            Some(v) => v.iterate()?,
            None => Vec::new(),
        }))
    });
    add("dict", dict);
    add("struct", make_struct);
    add("range", range);
    add("hasattr", |a| {
        let args = a.exact("hasattr", 2)?;
        let name = args[1].expect_str("hasattr")?;
        Ok(Value::Bool(get_attr(&args[0], &name).is_ok()))
    });
    add("getattr", |a| {
        let a = a.bind("getattr", &["x", "name", "default?"])?;
        let (Some(x), Some(name)) = (&a[0], &a[1]) else {
            return Err(Error::eval("getattr: missing argument"));
        };
        let name = name.expect_str("getattr")?;
        match (get_attr(x, &name), &a[2]) {
            (Ok(v), _) => Ok(v),
            (Err(Error::NoSuchAttribute { .. }), Some(default)) => Ok(default.clone()),
            (Err(e), _) => Err(e),
        }
    });
    add("dir", |a| {
        let mut names = attr_names(a.one("dir")?);
        names.sort();
        Ok(Value::str_list(&names))
    });
    add("sorted", sorted);
    add("reversed", |a| {
        let mut items = a.one("reversed")?.iterate()?;
        items.reverse();
        Ok(Value::list(items))
    });
    add("enumerate", |a| {
        let a = a.bind("enumerate", &["iterable", "start?"])?;
        let start = match &a[1] {
            Some(v) => v.expect_int("enumerate")?,
            None => 0,
        };
        let items = a[0].as_ref().map(Value::iterate).transpose()?.unwrap_or_default();
        Ok(Value::list(
            items
                .into_iter()
                .enumerate()
                .map(|(i, v)| Value::tuple(vec![Value::Int(start + i as i128), v]))
                .collect(),
        ))
    });
    add("zip", |a| {
        let seqs = a
            .positional
            .iter()
            .map(Value::iterate)
            .collect::<Result<Vec<_>>>()?;
        let n = seqs.iter().map(Vec::len).min().unwrap_or(0);
        Ok(Value::list(
            (0..n)
                .map(|i| Value::tuple(seqs.iter().map(|s| s[i].clone()).collect()))
                .collect(),
        ))
    });
    add("min", |a| extreme("min", a, std::cmp::Ordering::Less));
    add("max", |a| extreme("max", a, std::cmp::Ordering::Greater));
    add("any", |a| Ok(Value::Bool(a.one("any")?.iterate()?.iter().any(Value::truth))));
    add("all", |a| Ok(Value::Bool(a.one("all")?.iterate()?.iter().all(Value::truth))));
    add("fail", |a| {
        let msg: Vec<String> = a.positional.iter().map(Value::to_str).collect();
        Err(Error::Crash(msg.join(" ")))
    });

    ns.insert(
        "print".into(),
        Builtin::value("print", move |a| {
            let sep = match a.named.iter().find(|(k, _)| k == "sep") {
                Some((_, v)) => v.expect_str("print")?,
                None => " ".into(),
            };
            let line: Vec<String> = a.positional.iter().map(Value::to_str).collect();
            sink(&line.join(&sep));
            Ok(Value::None)
        }),
    );
    ns
}

fn len(a: Arguments) -> Result<Value> {
    let n = match a.one("len")? {
        Value::Str(s) => s.chars().count(),
        Value::List(l) => l.borrow().len(),
        Value::Tuple(t) => t.len(),
        Value::Dict(d) => d.borrow().len(),
        other => {
            return Err(Error::eval(format!(
                "len: value of type {} has no len",
                other.type_name()
            )))
        }
    };
    Ok(Value::Int(n as i128))
}

fn int(a: Arguments) -> Result<Value> {
    let a = a.bind("int", &["x", "base?"])?;
    let x = a[0].clone().unwrap_or(Value::Int(0));
    let base = match &a[1] {
        Some(b) => Some(b.expect_int("int")?),
        None => None,
    };
    match (&x, base) {
        (Value::Int(i), None) => Ok(Value::Int(*i)),
        (Value::Bool(b), None) => Ok(Value::Int(*b as i128)),
        (Value::Str(s), base) => parse_int(s.trim(), base.unwrap_or(10)).map(Value::Int),
        (other, _) => Err(Error::type_mismatch("int", "string or int", other.type_name())),
    }
}

fn parse_int(s: &str, base: i128) -> Result<i128> {
    let bad = || Error::eval(format!("int: invalid literal with base {}: {:?}", base, s));
    let (neg, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let (radix, digits) = match (base, digits.get(..2).map(str::to_ascii_lowercase).as_deref()) {
        (0 | 16, Some("0x")) => (16, &digits[2..]),
        (0 | 8, Some("0o")) => (8, &digits[2..]),
        (0 | 2, Some("0b")) => (2, &digits[2..]),
        (0, _) => (10, digits),
        (b @ 2..=36, _) => (b as u32, digits),
        _ => return Err(Error::eval(format!("int: base must be 0 or 2-36, got {}", base))),
    };
    let v = i128::from_str_radix(digits, radix).map_err(|_| bad())?;
    Ok(if neg { -v } else { v })
}

fn dict(a: Arguments) -> Result<Value> {
    let mut map = DictMap::new();
    match a.positional.as_slice() {
        [] => {}
        [Value::Dict(d)] => map.extend(d.borrow().iter().map(|(k, v)| (k.clone(), v.clone()))),
        [pairs] => {
            for (k, v) in pairs.iter_pairs("dict")? {
                map.insert(k.dict_key()?, (k, v));
            }
        }
        _ => return Err(Error::eval("dict: got more than 1 positional argument")),
    }
    for (k, v) in a.named {
        let key = Value::from(k);
        map.insert(key.dict_key()?, (key, v));
    }
    Ok(Value::Dict(Rc::new(std::cell::RefCell::new(map))))
}

fn make_struct(a: Arguments) -> Result<Value> {
    if !a.positional.is_empty() {
        return Err(Error::eval("struct: unexpected positional arguments"));
    }
    Ok(Struct::value(a.named.into_iter().collect()))
}

fn range(a: Arguments) -> Result<Value> {
    let ints = a
        .positional
        .iter()
        .map(|v| v.expect_int("range"))
        .collect::<Result<Vec<_>>>()?;
    let (start, stop, step) = match ints.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => return Err(Error::eval("range: got wrong number of arguments")),
    };
    if step == 0 {
        return Err(Error::eval("range: step argument must not be zero"));
    }
    let mut out = Vec::new();
    let mut i = start;
    while (step > 0 && i < stop) || (step < 0 && i > stop) {
        if out.len() >= 1 << 24 {
            return Err(Error::eval("range: too many elements"));
        }
        out.push(Value::Int(i));
        i += step;
    }
    Ok(Value::list(out))
}

fn sorted(a: Arguments) -> Result<Value> {
    let b = a.bind("sorted", &["iterable", "reverse?"])?;
    let mut items = b[0].as_ref().map(Value::iterate).transpose()?.unwrap_or_default();
    let reverse = b[1].as_ref().is_some_and(Value::truth);
    let mut err = None;
    items.sort_by(|x, y| match x.compare(y) {
        Ok(o) => o,
        Err(e) => {
            err.get_or_insert(e);
            std::cmp::Ordering::Equal
        }
    });
    if let Some(e) = err {
        return Err(e);
    }
    if reverse {
        items.reverse();
    }
    Ok(Value::list(items))
}

fn extreme(name: &str, a: Arguments, want: std::cmp::Ordering) -> Result<Value> {
    let items = match a.positional.as_slice() {
        [single] => single.iterate()?,
        many => many.to_vec(),
    };
    let mut best: Option<Value> = None;
    for v in items {
        let replace = match &best {
            Some(b) => v.compare(b)? == want,
            None => true,
        };
        if replace {
            best = Some(v);
        }
    }
    best.ok_or_else(|| Error::eval(format!("{}: empty sequence", name)))
}
