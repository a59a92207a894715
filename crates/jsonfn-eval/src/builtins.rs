//! Builtin function library.
//!
//! Native callables reachable by name from any program without being
//! declared: arithmetic, type predicates and conversions. The table is
//! extensible at runtime through [`Registry::add_builtin`](crate::Registry::add_builtin).

use jsonfn_types::{EvalError, EvalResult, NativeFn, Value};
use std::collections::HashMap;

/// Name → native callable.
#[derive(Debug, Clone, Default)]
pub struct Builtins {
    table: HashMap<String, NativeFn>,
}

impl Builtins {
    /// An empty table.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The standard library: arithmetic, type predicates, conversions.
    pub fn standard() -> Self {
        let mut builtins = Self::empty();
        builtins.register_math();
        builtins.register_predicates();
        builtins.register_conversions();
        builtins
    }

    pub fn get(&self, name: &str) -> Option<&NativeFn> {
        self.table.get(name)
    }

    /// Add or replace a builtin.
    pub fn insert(&mut self, name: impl Into<String>, f: NativeFn) {
        self.table.insert(name.into(), f);
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.table.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn add(&mut self, name: &str, f: fn(&[Value]) -> EvalResult<Value>) {
        self.insert(name, NativeFn::new(f));
    }

    fn add_unary(&mut self, name: &str, f: fn(f64) -> f64) {
        self.insert(name, NativeFn::new(move |args| Ok(Value::Number(f(num(args, 0))))));
    }

    fn add_predicate(&mut self, name: &str, f: fn(&Value) -> bool) {
        self.insert(name, NativeFn::new(move |args| Ok(Value::Bool(f(&arg(args, 0))))));
    }

    // ══════════════════════════════════════════════════════════════════════
    // Registration
    // ══════════════════════════════════════════════════════════════════════

    fn register_math(&mut self) {
        self.add_unary("abs", f64::abs);
        self.add_unary("ceil", f64::ceil);
        self.add_unary("floor", f64::floor);
        self.add_unary("trunc", f64::trunc);
        self.add_unary("sqrt", f64::sqrt);
        self.add_unary("round", js_round);
        self.add_unary("sign", js_sign);
        self.add("pow", |args| Ok(Value::Number(num(args, 0).powf(num(args, 1)))));
        self.add("min", |args| Ok(Value::Number(fold_numbers(args, f64::INFINITY, f64::min))));
        self.add("max", |args| {
            Ok(Value::Number(fold_numbers(args, f64::NEG_INFINITY, f64::max)))
        });
    }

    fn register_predicates(&mut self) {
        self.add_predicate("isNumber", |v| matches!(v, Value::Number(_)));
        self.add_predicate("isString", |v| matches!(v, Value::String(_)));
        self.add_predicate("isBoolean", |v| matches!(v, Value::Bool(_)));
        self.add_predicate("isArray", |v| matches!(v, Value::Array(_)));
        self.add_predicate("isObject", |v| matches!(v, Value::Object(_)));
        self.add_predicate("isFunction", |v| matches!(v, Value::Function(_)));
        self.add_predicate("isNull", |v| matches!(v, Value::Null));
        self.add_predicate("isUndefined", |v| matches!(v, Value::Undefined));
        self.add_predicate("isDefined", |v| !v.is_nullish());
        self.add_predicate("isNaN", |v| v.to_number().is_nan());
        self.add_predicate("isFinite", |v| v.to_number().is_finite());
        self.add("typeOf", |args| Ok(Value::from(arg(args, 0).type_of())));
    }

    fn register_conversions(&mut self) {
        self.add("toNumber", |args| Ok(Value::Number(num(args, 0))));
        self.add("toString", |args| Ok(Value::String(arg(args, 0).to_js_string())));
        self.add("toBoolean", |args| Ok(Value::Bool(arg(args, 0).is_truthy())));
        self.add("toInteger", |args| {
            let n = num(args, 0);
            Ok(Value::Number(if n.is_nan() { 0.0 } else { n.trunc() }))
        });
        self.add("parseInt", parse_int);
        self.add("parseFloat", |args| {
            Ok(Value::Number(parse_float(&arg(args, 0).to_js_string())))
        });
        self.add("toJson", |args| {
            let json = arg(args, 0).to_json()?;
            serde_json::to_string(&json)
                .map(Value::String)
                .map_err(|e| EvalError::TypeError(format!("toJson: {e}")))
        });
        self.add("fromJson", |args| {
            serde_json::from_str::<serde_json::Value>(&arg(args, 0).to_js_string())
                .map(Value::from)
                .map_err(|e| EvalError::TypeError(format!("fromJson: {e}")))
        });
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

/// Positional argument, `undefined` when missing.
fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

fn num(args: &[Value], index: usize) -> f64 {
    args.get(index).map_or(f64::NAN, Value::to_number)
}

/// `Math.min`/`Math.max`: any NaN argument poisons the result.
fn fold_numbers(args: &[Value], init: f64, pick: fn(f64, f64) -> f64) -> f64 {
    let mut acc = init;
    for n in args.iter().map(Value::to_number) {
        if n.is_nan() {
            return f64::NAN;
        }
        acc = pick(acc, n);
    }
    acc
}

/// Halves round toward positive infinity.
fn js_round(n: f64) -> f64 {
    if !n.is_finite() {
        return n;
    }
    let floor = n.floor();
    if n - floor >= 0.5 {
        floor + 1.0
    } else {
        floor
    }
}

fn js_sign(n: f64) -> f64 {
    if n.is_nan() || n == 0.0 {
        n
    } else {
        n.signum()
    }
}

fn parse_int(args: &[Value]) -> EvalResult<Value> {
    let text = arg(args, 0).to_js_string();
    let mut rest = text.trim_start();
    let negative = rest.starts_with('-');
    rest = rest.strip_prefix(|c: char| c == '-' || c == '+').unwrap_or(rest);

    let mut radix = arg(args, 1).to_int32();
    if radix != 0 && !(2..=36).contains(&radix) {
        return Ok(Value::Number(f64::NAN));
    }
    if radix == 0 || radix == 16 {
        if let Some(hex) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
            rest = hex;
            radix = 16;
        }
    }
    if radix == 0 {
        radix = 10;
    }
    let radix = radix.unsigned_abs();

    let digits: Vec<u32> = rest.chars().map_while(|c| c.to_digit(radix)).collect();
    if digits.is_empty() {
        return Ok(Value::Number(f64::NAN));
    }
    let value = digits
        .iter()
        .fold(0.0, |acc, d| acc * f64::from(radix) + f64::from(*d));
    Ok(Value::Number(if negative { -value } else { value }))
}

/// Longest leading decimal literal, as `parseFloat` reads it.
fn parse_float(text: &str) -> f64 {
    let t = text.trim_start();
    let bytes = t.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    if t[end..].starts_with("Infinity") {
        return if t.starts_with('-') {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        };
    }
    let int_start = end;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    let mut digits = end - int_start;
    if bytes.get(end) == Some(&b'.') {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while bytes.get(frac_end).is_some_and(u8::is_ascii_digit) {
            frac_end += 1;
        }
        digits += frac_end - frac_start;
        if digits > 0 {
            end = frac_end;
        }
    }
    if digits == 0 {
        return f64::NAN;
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while bytes.get(exp_end).is_some_and(u8::is_ascii_digit) {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }
    t[..end].parse::<f64>().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: &[Value]) -> Value {
        let builtins = Builtins::standard();
        match builtins.get(name) {
            Some(f) => f.call(args).unwrap_or_else(|e| panic!("{name} failed: {e}")),
            None => panic!("missing builtin {name}"),
        }
    }

    #[test]
    fn round_half_up() {
        assert_eq!(call("round", &[Value::from(2.5)]), Value::from(3));
        assert_eq!(call("round", &[Value::from(-2.5)]), Value::from(-2));
        assert_eq!(call("round", &[Value::from(1.4)]), Value::from(1));
    }

    #[test]
    fn min_max() {
        assert_eq!(call("min", &[Value::from(3), Value::from(1), Value::from(2)]), Value::from(1));
        assert_eq!(call("max", &[]), Value::from(f64::NEG_INFINITY));
        assert!(call("max", &[Value::from(1), Value::from("x")])
            .as_number()
            .is_some_and(f64::is_nan));
    }

    #[test]
    fn parse_int_variants() {
        assert_eq!(call("parseInt", &[Value::from("  42px")]), Value::from(42));
        assert_eq!(call("parseInt", &[Value::from("-0x1A")]), Value::from(-26));
        assert_eq!(call("parseInt", &[Value::from("101"), Value::from(2)]), Value::from(5));
        assert!(call("parseInt", &[Value::from("abc")])
            .as_number()
            .is_some_and(f64::is_nan));
    }

    #[test]
    fn parse_float_prefix() {
        assert_eq!(call("parseFloat", &[Value::from("3.25kg")]), Value::from(3.25));
        assert_eq!(call("parseFloat", &[Value::from(".5")]), Value::from(0.5));
        assert_eq!(call("parseFloat", &[Value::from("1e3x")]), Value::from(1000));
        assert_eq!(call("parseFloat", &[Value::from("2e")]), Value::from(2));
        assert!(call("parseFloat", &[Value::from("-.")])
            .as_number()
            .is_some_and(f64::is_nan));
    }

    #[test]
    fn type_predicates() {
        assert_eq!(call("isArray", &[Value::array(vec![])]), Value::from(true));
        assert_eq!(call("isObject", &[Value::array(vec![])]), Value::from(false));
        assert_eq!(call("isDefined", &[Value::Null]), Value::from(false));
        assert_eq!(call("typeOf", &[Value::Null]), Value::from("object"));
        assert_eq!(call("isNaN", &[Value::from("abc")]), Value::from(true));
    }

    #[test]
    fn json_conversions() {
        let parsed = call("fromJson", &[Value::from(r#"{"a":[1,2]}"#)]);
        assert_eq!(call("toJson", &[parsed]), Value::from(r#"{"a":[1,2]}"#));
    }
}
