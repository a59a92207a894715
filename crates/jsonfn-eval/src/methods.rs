//! Method capability whitelist and dispatch.
//!
//! Programs may only call the methods named in [`ALLOWED_METHODS`]; the
//! check ignores the receiver type. Dispatch is a direct match per receiver
//! kind. A whitelisted name the receiver does not implement degrades to a
//! plain property read, which is how `length` works and why
//! `[1, 2].toUpperCase()` yields `undefined` instead of failing.

use jsonfn_types::{format_number, Array, EvalError, EvalResult, NativeFn, Object, Value};

/// Method names programs are permitted to call, on any receiver.
pub const ALLOWED_METHODS: &[&str] = &[
    // sequences
    "length",
    "push",
    "pop",
    "shift",
    "unshift",
    "slice",
    "concat",
    "map",
    "filter",
    "reduce",
    "join",
    "split",
    // search
    "indexOf",
    "includes",
    "find",
    "startsWith",
    "endsWith",
    // strings
    "toUpperCase",
    "toLowerCase",
    "trim",
    "substring",
    "charAt",
    // objects
    "keys",
    "values",
    "entries",
    "hasOwnProperty",
    // stringification
    "toString",
    "toFixed",
];

pub fn is_allowed(method: &str) -> bool {
    ALLOWED_METHODS.contains(&method)
}

/// Invoke a method on an evaluated, non-null receiver.
///
/// The caller has already checked the whitelist.
pub fn call_method(receiver: &Value, method: &str, args: &[Value]) -> EvalResult<Value> {
    match receiver {
        Value::Undefined | Value::Null => Err(EvalError::NullReceiver(method.to_string())),
        Value::Array(items) => dispatch_array(receiver, items, method, args),
        Value::String(s) => dispatch_string(s, method, args),
        Value::Number(n) => dispatch_number(*n, method, args),
        Value::Object(fields) => dispatch_object(fields, method, args),
        Value::Bool(_) | Value::Function(_) => match method {
            "toString" => Ok(Value::String(receiver.to_js_string())),
            _ => Ok(read_property(receiver, method)),
        },
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Property access
// ══════════════════════════════════════════════════════════════════════════════

/// `receiver.key` with no existence check: missing properties are `undefined`.
pub fn read_property(receiver: &Value, key: &str) -> Value {
    match receiver {
        Value::Array(items) => {
            let items = items.borrow();
            if key == "length" {
                return Value::Number(items.len() as f64);
            }
            array_index(key)
                .and_then(|i| items.get(i).cloned())
                .unwrap_or_default()
        }
        Value::String(s) => {
            if key == "length" {
                return Value::Number(s.chars().count() as f64);
            }
            array_index(key)
                .and_then(|i| s.chars().nth(i))
                .map(|c| Value::String(c.to_string()))
                .unwrap_or_default()
        }
        Value::Object(fields) => fields.borrow().get(key).cloned().unwrap_or_default(),
        _ => Value::Undefined,
    }
}

/// `receiver[index]`: numeric positions on sequences, string keys otherwise.
/// No bounds checking; out of range is `undefined`.
pub fn read_index(receiver: &Value, index: &Value) -> Value {
    match (receiver, index) {
        (Value::Array(items), Value::Number(n)) => position(*n)
            .and_then(|i| items.borrow().get(i).cloned())
            .unwrap_or_default(),
        (Value::String(s), Value::Number(n)) => position(*n)
            .and_then(|i| s.chars().nth(i))
            .map(|c| Value::String(c.to_string()))
            .unwrap_or_default(),
        _ => read_property(receiver, &index.to_js_string()),
    }
}

/// A non-negative integral number as a position.
fn position(n: f64) -> Option<usize> {
    (n >= 0.0 && n.fract() == 0.0 && n < usize::MAX as f64).then_some(n as usize)
}

/// A canonical array index string (`"0"`, `"12"`, not `"01"`).
fn array_index(key: &str) -> Option<usize> {
    key.parse::<usize>()
        .ok()
        .filter(|i| i.to_string() == key)
}

// ══════════════════════════════════════════════════════════════════════════════
// Arrays
// ══════════════════════════════════════════════════════════════════════════════

fn dispatch_array(
    receiver: &Value,
    items: &Array,
    method: &str,
    args: &[Value],
) -> EvalResult<Value> {
    match method {
        "push" => {
            let mut items = items.borrow_mut();
            items.extend(args.iter().cloned());
            Ok(Value::Number(items.len() as f64))
        }
        "pop" => Ok(items.borrow_mut().pop().unwrap_or_default()),
        "shift" => {
            let mut items = items.borrow_mut();
            Ok(if items.is_empty() {
                Value::Undefined
            } else {
                items.remove(0)
            })
        }
        "unshift" => {
            let mut items = items.borrow_mut();
            items.splice(0..0, args.iter().cloned());
            Ok(Value::Number(items.len() as f64))
        }
        "slice" => {
            let items = items.borrow();
            let (start, end) = slice_bounds(items.len(), &arg(args, 0), &arg(args, 1));
            Ok(Value::array(items[start..end].to_vec()))
        }
        "concat" => {
            let mut out = items.borrow().clone();
            for a in args {
                match a {
                    Value::Array(other) => out.extend(other.borrow().iter().cloned()),
                    other => out.push(other.clone()),
                }
            }
            Ok(Value::array(out))
        }
        "map" => {
            let f = callback(args, method)?;
            let snapshot = items.borrow().clone();
            let mut out = Vec::with_capacity(snapshot.len());
            for (i, item) in snapshot.into_iter().enumerate() {
                out.push(f.call(&[item, Value::Number(i as f64), receiver.clone()])?);
            }
            Ok(Value::array(out))
        }
        "filter" => {
            let f = callback(args, method)?;
            let snapshot = items.borrow().clone();
            let mut out = Vec::new();
            for (i, item) in snapshot.into_iter().enumerate() {
                let keep = f.call(&[item.clone(), Value::Number(i as f64), receiver.clone()])?;
                if keep.is_truthy() {
                    out.push(item);
                }
            }
            Ok(Value::array(out))
        }
        "find" => {
            let f = callback(args, method)?;
            let snapshot = items.borrow().clone();
            for (i, item) in snapshot.into_iter().enumerate() {
                let hit = f.call(&[item.clone(), Value::Number(i as f64), receiver.clone()])?;
                if hit.is_truthy() {
                    return Ok(item);
                }
            }
            Ok(Value::Undefined)
        }
        "reduce" => {
            let f = callback(args, method)?;
            let snapshot = items.borrow().clone();
            let mut iter = snapshot.into_iter().enumerate();
            let mut acc = match args.get(1) {
                Some(init) => init.clone(),
                None => match iter.next() {
                    Some((_, first)) => first,
                    None => {
                        return Err(EvalError::TypeError(
                            "reduce of empty array with no initial value".into(),
                        ))
                    }
                },
            };
            for (i, item) in iter {
                acc = f.call(&[acc, item, Value::Number(i as f64), receiver.clone()])?;
            }
            Ok(acc)
        }
        "join" => {
            let sep = match args.first() {
                None | Some(Value::Undefined) => ",".to_string(),
                Some(sep) => sep.to_js_string(),
            };
            Ok(Value::String(Value::join_array(items, &sep)))
        }
        "indexOf" => {
            let needle = arg(args, 0);
            let found = items.borrow().iter().position(|v| v.strict_equals(&needle));
            Ok(Value::Number(found.map_or(-1.0, |i| i as f64)))
        }
        "includes" => {
            let needle = arg(args, 0);
            let found = items.borrow().iter().any(|v| v.same_value_zero(&needle));
            Ok(Value::Bool(found))
        }
        "keys" => {
            let len = items.borrow().len();
            Ok(Value::array((0..len).map(|i| Value::Number(i as f64)).collect()))
        }
        "values" => Ok(Value::array(items.borrow().clone())),
        "entries" => {
            let entries = items
                .borrow()
                .iter()
                .enumerate()
                .map(|(i, v)| Value::array(vec![Value::Number(i as f64), v.clone()]))
                .collect();
            Ok(Value::array(entries))
        }
        "hasOwnProperty" => {
            let key = arg(args, 0).to_js_string();
            let len = items.borrow().len();
            Ok(Value::Bool(
                key == "length" || array_index(&key).is_some_and(|i| i < len),
            ))
        }
        "toString" => Ok(Value::String(receiver.to_js_string())),
        _ => Ok(read_property(receiver, method)),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Strings
// ══════════════════════════════════════════════════════════════════════════════

/// String positions count `char`s.
fn dispatch_string(s: &str, method: &str, args: &[Value]) -> EvalResult<Value> {
    let chars = || s.chars();
    match method {
        "slice" => {
            let len = chars().count();
            let (start, end) = slice_bounds(len, &arg(args, 0), &arg(args, 1));
            Ok(Value::String(chars().skip(start).take(end - start).collect()))
        }
        "substring" => {
            let len = chars().count();
            let clamp = |v: &Value, default: usize| match v {
                Value::Undefined => default,
                v => {
                    let n = v.to_number();
                    if n.is_nan() || n <= 0.0 {
                        0
                    } else {
                        (n.trunc() as usize).min(len)
                    }
                }
            };
            let a = clamp(&arg(args, 0), 0);
            let b = clamp(&arg(args, 1), len);
            let (start, end) = if a <= b { (a, b) } else { (b, a) };
            Ok(Value::String(chars().skip(start).take(end - start).collect()))
        }
        "charAt" => {
            let n = arg(args, 0).to_number();
            let n = if n.is_nan() { 0.0 } else { n.trunc() };
            Ok(Value::String(
                position(n)
                    .and_then(|i| chars().nth(i))
                    .map(String::from)
                    .unwrap_or_default(),
            ))
        }
        "concat" => {
            let mut out = s.to_string();
            for a in args {
                out.push_str(&a.to_js_string());
            }
            Ok(Value::String(out))
        }
        "split" => {
            let limit = match arg(args, 1) {
                Value::Undefined => usize::MAX,
                v => v.to_int32().max(0) as usize,
            };
            let parts: Vec<Value> = match args.first() {
                None | Some(Value::Undefined) => vec![Value::from(s)],
                Some(sep) => {
                    let sep = sep.to_js_string();
                    if sep.is_empty() {
                        chars().map(|c| Value::String(c.to_string())).collect()
                    } else {
                        s.split(sep.as_str()).map(Value::from).collect()
                    }
                }
            };
            Ok(Value::array(parts.into_iter().take(limit).collect()))
        }
        "indexOf" => {
            let needle = arg(args, 0).to_js_string();
            let found = s.find(&needle).map(|byte| s[..byte].chars().count());
            Ok(Value::Number(found.map_or(-1.0, |i| i as f64)))
        }
        "includes" => Ok(Value::Bool(s.contains(&arg(args, 0).to_js_string()))),
        "startsWith" => Ok(Value::Bool(s.starts_with(&arg(args, 0).to_js_string()))),
        "endsWith" => Ok(Value::Bool(s.ends_with(&arg(args, 0).to_js_string()))),
        "toUpperCase" => Ok(Value::String(s.to_uppercase())),
        "toLowerCase" => Ok(Value::String(s.to_lowercase())),
        "trim" => Ok(Value::from(s.trim())),
        "toString" => Ok(Value::from(s)),
        _ => Ok(read_property(&Value::from(s), method)),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Numbers
// ══════════════════════════════════════════════════════════════════════════════

fn dispatch_number(n: f64, method: &str, args: &[Value]) -> EvalResult<Value> {
    match method {
        "toFixed" => {
            let digits = arg(args, 0).to_number();
            let digits = if digits.is_nan() { 0.0 } else { digits.trunc() };
            if !(0.0..=100.0).contains(&digits) {
                return Err(EvalError::TypeError(format!(
                    "toFixed() digits argument must be between 0 and 100, got {digits}"
                )));
            }
            Ok(Value::String(to_fixed(n, digits as usize)))
        }
        "toString" => match arg(args, 0) {
            Value::Undefined => Ok(Value::String(format_number(n))),
            radix => {
                let radix = radix.to_number();
                if radix.fract() != 0.0 || !(2.0..=36.0).contains(&radix) {
                    return Err(EvalError::TypeError(format!(
                        "toString() radix must be between 2 and 36, got {}",
                        format_number(radix)
                    )));
                }
                Ok(Value::String(to_radix(n, radix as u32)))
            }
        },
        _ => Ok(read_property(&Value::Number(n), method)),
    }
}

/// Ties round away from zero, unlike Rust's formatter.
fn to_fixed(n: f64, digits: usize) -> String {
    if !n.is_finite() || n.abs() >= 1e21 {
        return format_number(n);
    }
    let scale = 10f64.powi(digits as i32);
    let scaled = n.abs() * scale;
    let magnitude = if scaled.fract() == 0.5 {
        scaled.ceil() / scale
    } else {
        n.abs()
    };
    let formatted = format!("{magnitude:.digits$}");
    let is_zero = formatted.chars().all(|c| c == '0' || c == '.');
    if n < 0.0 && !is_zero {
        format!("-{formatted}")
    } else {
        formatted
    }
}

/// Integral numbers in any radix; fractions fall back to base 10.
fn to_radix(n: f64, radix: u32) -> String {
    if radix == 10 || !n.is_finite() || n.fract() != 0.0 || n.abs() >= 9_007_199_254_740_992.0 {
        return format_number(n);
    }
    let mut magnitude = n.abs() as u64;
    if magnitude == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while magnitude > 0 {
        let d = (magnitude % u64::from(radix)) as u32;
        digits.push(std::char::from_digit(d, radix).unwrap_or('0'));
        magnitude /= u64::from(radix);
    }
    if n < 0.0 {
        digits.push('-');
    }
    digits.iter().rev().collect()
}

// ══════════════════════════════════════════════════════════════════════════════
// Objects
// ══════════════════════════════════════════════════════════════════════════════

fn dispatch_object(fields: &Object, method: &str, args: &[Value]) -> EvalResult<Value> {
    // An own property shadows the builtin method of the same name.
    let own = fields.borrow().get(method).cloned();
    if let Some(prop) = own {
        return match prop {
            Value::Function(f) => f.call(args),
            other => Ok(other),
        };
    }
    match method {
        "keys" => Ok(Value::array(
            fields.borrow().keys().map(|k| Value::from(k.as_str())).collect(),
        )),
        "values" => Ok(Value::array(fields.borrow().values().cloned().collect())),
        "entries" => Ok(Value::array(
            fields
                .borrow()
                .iter()
                .map(|(k, v)| Value::array(vec![Value::from(k.as_str()), v.clone()]))
                .collect(),
        )),
        "hasOwnProperty" => {
            let key = arg(args, 0).to_js_string();
            Ok(Value::Bool(fields.borrow().contains_key(&key)))
        }
        "toString" => Ok(Value::from("[object Object]")),
        _ => Ok(Value::Undefined),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

fn callback(args: &[Value], method: &str) -> EvalResult<NativeFn> {
    match args.first() {
        Some(Value::Function(f)) => Ok(f.clone()),
        other => Err(EvalError::TypeError(format!(
            "{method}() expects a function, got {}",
            other.map_or("nothing", Value::type_name)
        ))),
    }
}

/// `slice(start, end)` bounds: negatives count from the end, results clamp.
fn slice_bounds(len: usize, start: &Value, end: &Value) -> (usize, usize) {
    let resolve = |v: &Value, default: usize| -> usize {
        if matches!(v, Value::Undefined) {
            return default;
        }
        let n = v.to_number();
        let n = if n.is_nan() { 0.0 } else { n.trunc() };
        if n < 0.0 {
            (len as f64 + n).max(0.0) as usize
        } else {
            (n as usize).min(len)
        }
    };
    let start = resolve(start, 0);
    let end = resolve(end, len);
    (start, end.max(start))
}
