//! Built-in methods on strings, lists and dicts.

use super::value::*;
use crate::core::error::{Error, Result};
use std::cell::RefCell;
use std::rc::Rc;

const STRING_METHODS: &[&str] = &[
    "count",
    "endswith",
    "find",
    "format",
    "join",
    "lower",
    "lstrip",
    "replace",
    "rstrip",
    "split",
    "splitlines",
    "startswith",
    "strip",
    "upper",
];

const LIST_METHODS: &[&str] = &["append", "clear", "extend", "index", "insert", "pop", "remove"];

const DICT_METHODS: &[&str] = &["get", "items", "keys", "pop", "setdefault", "update", "values"];

pub fn method_names(v: &Value) -> &'static [&'static str] {
    match v {
        Value::Str(_) => STRING_METHODS,
        Value::List(_) => LIST_METHODS,
        Value::Dict(_) => DICT_METHODS,
        _ => &[],
    }
}

/// `recv.name` as a callable bound to `recv`, if the method exists.
pub fn bound_method(recv: &Value, name: &str) -> Option<Value> {
    if !method_names(recv).contains(&name) {
        return None;
    }
    let recv = recv.clone();
    let method = name.to_string();
    let qualified = format!("{}.{}", recv.type_name(), name);
    Some(Builtin::value(&qualified, move |args| {
        call(&recv, &method, args)
    }))
}

fn call(recv: &Value, name: &str, args: Arguments) -> Result<Value> {
    match recv {
        Value::Str(s) => string_method(s, name, args),
        Value::List(l) => list_method(l, name, args),
        Value::Dict(d) => dict_method(d, name, args),
        other => Err(Error::NoSuchAttribute {
            type_name: other.type_name(),
            name: name.into(),
        }),
    }
}

fn opt_str(v: &Option<Value>, ctx: &str) -> Result<Option<String>> {
    match v {
        None | Some(Value::None) => Ok(None),
        Some(v) => v.expect_str(ctx).map(Some),
    }
}

fn char_index(s: &str, byte: usize) -> i128 {
    s[..byte].chars().count() as i128
}

/// Accepts a string or a tuple of strings, as `startswith` and `endswith` do.
fn affixes(v: &Value, ctx: &str) -> Result<Vec<String>> {
    match v {
        Value::Tuple(t) => t.iter().map(|x| x.expect_str(ctx)).collect(),
        other => Ok(vec![other.expect_str(ctx)?]),
    }
}

fn string_method(s: &Rc<str>, name: &str, args: Arguments) -> Result<Value> {
    let ctx = format!("string.{}", name);
    match name {
        "strip" | "lstrip" | "rstrip" => {
            let a = args.bind(&ctx, &["chars?"])?;
            let chars = opt_str(&a[0], &ctx)?;
            let pat = |c: char| match &chars {
                Some(set) => set.contains(c),
                None => c.is_whitespace(),
            };
            let out = match name {
                "strip" => s.trim_matches(pat),
                "lstrip" => s.trim_start_matches(pat),
                _ => s.trim_end_matches(pat),
            };
            Ok(Value::str(out))
        }
        "lower" => {
            args.exact(&ctx, 0)?;
            Ok(Value::from(s.to_lowercase()))
        }
        "upper" => {
            args.exact(&ctx, 0)?;
            Ok(Value::from(s.to_uppercase()))
        }
        "replace" => {
            let a = args.bind(&ctx, &["old", "new", "count?"])?;
            let old = a[0].as_ref().map(|v| v.expect_str(&ctx)).transpose()?.unwrap_or_default();
            let new = a[1].as_ref().map(|v| v.expect_str(&ctx)).transpose()?.unwrap_or_default();
            match &a[2] {
                Some(n) => {
                    let n = n.expect_int(&ctx)?;
                    let n = if n < 0 { usize::MAX } else { clamp_count(n) };
                    Ok(Value::from(s.replacen(&old, &new, n)))
                }
                None => Ok(Value::from(s.replace(&old, &new))),
            }
        }
        "split" => {
            let a = args.bind(&ctx, &["sep?", "maxsplit"])?;
            let sep = opt_str(&a[0], &ctx)?;
            let max = match &a[1] {
                Some(v) => v.expect_int(&ctx)?,
                None => -1,
            };
            let parts: Vec<Value> = match sep {
                Some(sep) if sep.is_empty() => return Err(Error::eval("split: empty separator")),
                Some(sep) if max < 0 => s.split(sep.as_str()).map(Value::str).collect(),
                Some(sep) => s
                    .splitn(clamp_count(max).saturating_add(1), sep.as_str())
                    .map(Value::str)
                    .collect(),
                None if max < 0 => s.split_whitespace().map(Value::str).collect(),
                None => split_whitespace_n(s, clamp_count(max)),
            };
            Ok(Value::list(parts))
        }
        "splitlines" => {
            let a = args.bind(&ctx, &["keepends?"])?;
            let keep = match &a[0] {
                Some(v) => v.expect_bool(&ctx)?,
                None => false,
            };
            let lines = if keep {
                s.split_inclusive('\n').map(Value::str).collect()
            } else {
                s.lines().map(Value::str).collect()
            };
            Ok(Value::list(lines))
        }
        "startswith" | "endswith" => {
            let v = args.one(&ctx)?;
            let candidates = affixes(v, &ctx)?;
            let hit = candidates.iter().any(|a| {
                if name == "startswith" {
                    s.starts_with(a.as_str())
                } else {
                    s.ends_with(a.as_str())
                }
            });
            Ok(Value::Bool(hit))
        }
        "join" => {
            let v = args.one(&ctx)?;
            let parts = v
                .iterate()?
                .iter()
                .enumerate()
                .map(|(i, x)| x.expect_str(&format!("{}: element {}", ctx, i)))
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::from(parts.join(&**s)))
        }
        "find" => {
            let v = args.one(&ctx)?;
            let needle = v.expect_str(&ctx)?;
            Ok(Value::Int(
                s.find(needle.as_str()).map(|b| char_index(s, b)).unwrap_or(-1),
            ))
        }
        "count" => {
            let v = args.one(&ctx)?;
            let needle = v.expect_str(&ctx)?;
            if needle.is_empty() {
                return Ok(Value::Int(s.chars().count() as i128 + 1));
            }
            Ok(Value::Int(s.matches(needle.as_str()).count() as i128))
        }
        "format" => format(s, &args).map(Value::from),
        _ => Err(Error::NoSuchAttribute {
            type_name: "string".into(),
            name: name.into(),
        }),
    }
}

/// A non-negative script int as a count; values past `usize` mean unbounded.
fn clamp_count(n: i128) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

fn split_whitespace_n(s: &str, max: usize) -> Vec<Value> {
    let mut out = Vec::new();
    let mut rest = s.trim_start();
    while !rest.is_empty() {
        if out.len() == max {
            out.push(Value::str(rest));
            break;
        }
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        out.push(Value::str(&rest[..end]));
        rest = rest[end..].trim_start();
    }
    out
}

/// `"{} {name} {0}".format(...)`; `{{` and `}}` are literal braces.
fn format(template: &str, args: &Arguments) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut auto = 0usize;
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => field.push(c),
                        None => return Err(Error::eval("format: unmatched '{'")),
                    }
                }
                let v = if field.is_empty() {
                    let v = args.positional.get(auto);
                    auto += 1;
                    v.ok_or_else(|| Error::eval(format!("format: tuple index out of range ({})", auto - 1)))?
                } else if let Ok(i) = field.parse::<usize>() {
                    args.positional
                        .get(i)
                        .ok_or_else(|| Error::eval(format!("format: tuple index out of range ({})", i)))?
                } else {
                    args.named
                        .iter()
                        .find(|(k, _)| *k == field)
                        .map(|(_, v)| v)
                        .ok_or_else(|| Error::eval(format!("format: keyword {} not found", field)))?
                };
                out.push_str(&v.to_str());
            }
            '}' => return Err(Error::eval("format: single '}' in format")),
            c => out.push(c),
        }
    }
    Ok(out)
}

fn list_method(list: &RefCell<Vec<Value>>, name: &str, args: Arguments) -> Result<Value> {
    let ctx = format!("list.{}", name);
    match name {
        "append" => {
            let v = args.one(&ctx)?;
            list.borrow_mut().push(v.clone());
            Ok(Value::None)
        }
        "extend" => {
            let v = args.one(&ctx)?;
            let items = v.iterate()?;
            list.borrow_mut().extend(items);
            Ok(Value::None)
        }
        "insert" => {
            let pair = args.exact(&ctx, 2)?;
            let (i, v) = (&pair[0], &pair[1]);
            let mut l = list.borrow_mut();
            let len = l.len() as i128;
            let i = i.expect_int(&ctx)?;
            let i = if i < 0 { (i + len).max(0) } else { i.min(len) };
            l.insert(i as usize, v.clone());
            Ok(Value::None)
        }
        "pop" => {
            let a = args.bind(&ctx, &["index?"])?;
            let mut l = list.borrow_mut();
            if l.is_empty() {
                return Err(Error::eval("pop: list is empty"));
            }
            let len = l.len() as i128;
            let i = match &a[0] {
                Some(v) => v.expect_int(&ctx)?,
                None => len - 1,
            };
            let idx = if i < 0 { i + len } else { i };
            if idx < 0 || idx >= len {
                return Err(Error::eval(format!("pop: index {} out of range", i)));
            }
            Ok(l.remove(idx as usize))
        }
        "index" => {
            let v = args.one(&ctx)?;
            list.borrow()
                .iter()
                .position(|x| x.equals(v))
                .map(|i| Value::Int(i as i128))
                .ok_or_else(|| Error::eval(format!("index: value {} not in list", v.repr())))
        }
        "remove" => {
            let v = args.one(&ctx)?;
            let mut l = list.borrow_mut();
            let i = l
                .iter()
                .position(|x| x.equals(v))
                .ok_or_else(|| Error::eval(format!("remove: element {} not found", v.repr())))?;
            l.remove(i);
            Ok(Value::None)
        }
        "clear" => {
            args.exact(&ctx, 0)?;
            list.borrow_mut().clear();
            Ok(Value::None)
        }
        _ => Err(Error::NoSuchAttribute {
            type_name: "list".into(),
            name: name.into(),
        }),
    }
}

fn dict_method(dict: &RefCell<DictMap>, name: &str, args: Arguments) -> Result<Value> {
    let ctx = format!("dict.{}", name);
    match name {
        "get" => {
            let a = args.bind(&ctx, &["key", "default?"])?;
            let key = a[0].clone().unwrap_or(Value::None);
            Ok(dict
                .borrow()
                .get(&key.dict_key()?)
                .map(|(_, v)| v.clone())
                .or_else(|| a[1].clone())
                .unwrap_or(Value::None))
        }
        "keys" => {
            args.exact(&ctx, 0)?;
            Ok(Value::list(dict.borrow().values().map(|(k, _)| k.clone()).collect()))
        }
        "values" => {
            args.exact(&ctx, 0)?;
            Ok(Value::list(dict.borrow().values().map(|(_, v)| v.clone()).collect()))
        }
        "items" => {
            args.exact(&ctx, 0)?;
            Ok(Value::list(
                dict.borrow()
                    .values()
                    .map(|(k, v)| Value::tuple(vec![k.clone(), v.clone()]))
                    .collect(),
            ))
        }
        "setdefault" => {
            let a = args.bind(&ctx, &["key", "default?"])?;
            let key = a[0].clone().unwrap_or(Value::None);
            let dk = key.dict_key()?;
            let mut d = dict.borrow_mut();
            if let Some((_, v)) = d.get(&dk) {
                return Ok(v.clone());
            }
            let v = a[1].clone().unwrap_or(Value::None);
            d.insert(dk, (key, v.clone()));
            Ok(v)
        }
        "update" => {
            let mut entries = Vec::new();
            match args.positional.as_slice() {
                [] => {}
                [Value::Dict(other)] => {
                    entries.extend(other.borrow().values().cloned());
                }
                [pairs] => {
                    for p in pairs.iter_pairs(&ctx)? {
                        entries.push(p);
                    }
                }
                _ => return Err(Error::eval("update: got more than 1 positional argument")),
            }
            for (k, v) in &args.named {
                entries.push((Value::str(k), v.clone()));
            }
            let mut d = dict.borrow_mut();
            for (k, v) in entries {
                d.insert(k.dict_key()?, (k, v));
            }
            Ok(Value::None)
        }
        "pop" => {
            let a = args.bind(&ctx, &["key", "default?"])?;
            let key = a[0].clone().unwrap_or(Value::None);
            match dict.borrow_mut().shift_remove(&key.dict_key()?) {
                Some((_, v)) => Ok(v),
                None => a[1]
                    .clone()
                    .ok_or_else(|| Error::eval(format!("pop: missing key {}", key.repr()))),
            }
        }
        _ => Err(Error::NoSuchAttribute {
            type_name: "dict".into(),
            name: name.into(),
        }),
    }
}

impl Value {
    /// Elements of an iterable of 2-element sequences, as `(key, value)` pairs.
    pub fn iter_pairs(&self, ctx: &str) -> Result<Vec<(Value, Value)>> {
        self.iterate()?
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item.iterate()?.as_slice() {
                [k, v] => Ok((k.clone(), v.clone())),
                other => Err(Error::eval(format!(
                    "{}: element #{} has length {}, want 2",
                    ctx,
                    i,
                    other.len()
                ))),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call_on(recv: &Value, name: &str, args: Vec<Value>) -> Result<Value> {
        call(recv, name, Arguments::positional(args))
    }

    #[test]
    fn test_string_strip_split_join() {
        let s = Value::str("  a b  c ");
        assert_eq!(call_on(&s, "strip", vec![]).unwrap().to_str(), "a b  c");
        assert_eq!(call_on(&s, "split", vec![]).unwrap().repr(), r#"["a", "b", "c"]"#);
        let csv = Value::str("x,y,,z");
        assert_eq!(
            call_on(&csv, "split", vec![Value::str(",")]).unwrap().repr(),
            r#"["x", "y", "", "z"]"#
        );
        let sep = Value::str("-");
        let parts = Value::list(vec![Value::str("a"), Value::str("b")]);
        assert_eq!(call_on(&sep, "join", vec![parts]).unwrap().to_str(), "a-b");
        let bad = Value::list(vec![Value::Int(1)]);
        assert!(call_on(&sep, "join", vec![bad]).is_err());
    }

    #[test]
    fn test_string_split_huge_maxsplit() {
        let s = Value::str("a b c");
        for max in [i128::from(u64::MAX), i128::from(u64::MAX) + 1, i128::MAX] {
            let sep = call_on(&s, "split", vec![Value::str(" "), Value::Int(max)]).unwrap();
            assert_eq!(sep.repr(), r#"["a", "b", "c"]"#);
            let ws = call_on(&s, "split", vec![Value::None, Value::Int(max)]).unwrap();
            assert_eq!(ws.repr(), r#"["a", "b", "c"]"#);
        }
        let one = call_on(&s, "split", vec![Value::str(" "), Value::Int(1)]).unwrap();
        assert_eq!(one.repr(), r#"["a", "b c"]"#);
        let count = Value::Int(i128::from(u64::MAX) + 1);
        let r = call_on(&s, "replace", vec![Value::str(" "), Value::str("-"), count]).unwrap();
        assert_eq!(r.to_str(), "a-b-c");
    }

    #[test]
    fn test_string_format_fields() {
        let t = Value::str("{} is {name}, {0}{{}}");
        let args = Arguments {
            positional: vec![Value::str("x")],
            named: vec![("name".into(), Value::Int(3))],
        };
        assert_eq!(call(&t, "format", args).unwrap().to_str(), "x is 3, x{}");
    }

    #[test]
    fn test_string_find_counts_chars() {
        let s = Value::str("héllo");
        assert_eq!(call_on(&s, "find", vec![Value::str("l")]).unwrap().repr(), "2");
        assert_eq!(call_on(&s, "find", vec![Value::str("z")]).unwrap().repr(), "-1");
        assert_eq!(call_on(&s, "count", vec![Value::str("l")]).unwrap().repr(), "2");
    }

    #[test]
    fn test_string_affix_tuple() {
        let s = Value::str("/dev/sda1");
        let t = Value::tuple(vec![Value::str("/proc"), Value::str("/dev")]);
        assert!(call_on(&s, "startswith", vec![t]).unwrap().truth());
        assert!(!call_on(&s, "endswith", vec![Value::str("2")]).unwrap().truth());
    }

    #[test]
    fn test_list_mutators() {
        let l = Value::list(vec![Value::Int(1)]);
        call_on(&l, "append", vec![Value::Int(2)]).unwrap();
        call_on(&l, "insert", vec![Value::Int(0), Value::Int(0)]).unwrap();
        call_on(&l, "extend", vec![Value::tuple(vec![Value::Int(3)])]).unwrap();
        assert_eq!(l.repr(), "[0, 1, 2, 3]");
        assert_eq!(call_on(&l, "pop", vec![]).unwrap().repr(), "3");
        assert_eq!(call_on(&l, "index", vec![Value::Int(2)]).unwrap().repr(), "2");
        call_on(&l, "clear", vec![]).unwrap();
        assert!(call_on(&l, "pop", vec![]).is_err());
    }

    #[test]
    fn test_dict_methods() {
        let d = Value::Dict(Default::default());
        call_on(&d, "setdefault", vec![Value::str("a"), Value::Int(1)]).unwrap();
        let args = Arguments {
            positional: vec![],
            named: vec![("b".into(), Value::Int(2))],
        };
        call(&d, "update", args).unwrap();
        assert_eq!(call_on(&d, "keys", vec![]).unwrap().repr(), r#"["a", "b"]"#);
        assert_eq!(
            call_on(&d, "get", vec![Value::str("z"), Value::Int(9)]).unwrap().repr(),
            "9"
        );
        assert_eq!(call_on(&d, "pop", vec![Value::str("a")]).unwrap().repr(), "1");
        assert!(call_on(&d, "pop", vec![Value::str("a")]).is_err());
    }

    #[test]
    fn test_bound_method_unknown() {
        assert!(bound_method(&Value::str("x"), "nope").is_none());
        assert!(bound_method(&Value::Int(1), "append").is_none());
    }
}
