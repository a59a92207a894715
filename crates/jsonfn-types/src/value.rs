//! Runtime values and their JavaScript-style coercions.
//!
//! Arrays and objects are shared references: cloning a [`Value`] clones the
//! handle, so in-place methods like `push` are visible through every alias.
//! Object keys are kept sorted (`BTreeMap`) for deterministic output.
//!
//! Shared handles let a program build a container that holds itself
//! (`a.push(a)`). Every recursive walk tracks the containers it is inside:
//! string conversion prints a repeat as `""`, JSON conversion rejects it,
//! and `PartialEq`/`Debug` stop at it.

use crate::error::{EvalError, EvalResult};
use serde::ser::{Serialize, Serializer};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Shared array storage.
pub type Array = Rc<RefCell<Vec<Value>>>;
/// Shared object storage.
pub type Object = Rc<RefCell<BTreeMap<String, Value>>>;

// ══════════════════════════════════════════════════════════════════════════════
// Native functions
// ══════════════════════════════════════════════════════════════════════════════

/// A host-native callable: builtins, context functions, hooks' callbacks.
#[derive(Clone)]
pub struct NativeFn(pub Rc<dyn Fn(&[Value]) -> EvalResult<Value>>);

impl NativeFn {
    pub fn new(f: impl Fn(&[Value]) -> EvalResult<Value> + 'static) -> Self {
        Self(Rc::new(f))
    }

    pub fn call(&self, args: &[Value]) -> EvalResult<Value> {
        (self.0)(args)
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &NativeFn) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<native fn>")
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Value
// ══════════════════════════════════════════════════════════════════════════════

/// A jsonfn runtime value.
#[derive(Clone, Default)]
pub enum Value {
    /// The absent value: missing arguments, missing properties, no return.
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Array),
    Object(Object),
    Function(NativeFn),
}

impl Value {
    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn object(fields: BTreeMap<String, Value>) -> Self {
        Value::Object(Rc::new(RefCell::new(fields)))
    }

    pub fn function(f: impl Fn(&[Value]) -> EvalResult<Value> + 'static) -> Self {
        Value::Function(NativeFn::new(f))
    }

    /// Descriptive type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
        }
    }

    /// The `typeof` answer: arrays and `null` report `"object"`.
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Null | Value::Array(_) => "object",
            other => other.type_name(),
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    // ── Coercions ────────────────────────────────────────────────────────

    /// `0`, `""`, `null`, `undefined`, `false` and `NaN` are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) | Value::Function(_) => true,
        }
    }

    /// Numeric coercion (unary `+`).
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::String(s) => parse_number(s),
            Value::Array(_) => parse_number(&self.to_js_string()),
            Value::Object(_) | Value::Function(_) => f64::NAN,
        }
    }

    /// 32-bit integer coercion used by the bitwise operators.
    pub fn to_int32(&self) -> i32 {
        let n = self.to_number();
        if !n.is_finite() {
            return 0;
        }
        let wrapped = n.trunc().rem_euclid(4_294_967_296.0);
        if wrapped >= 2_147_483_648.0 {
            (wrapped - 4_294_967_296.0) as i32
        } else {
            wrapped as i32
        }
    }

    /// String coercion (what `+` uses when concatenating).
    pub fn to_js_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.clone(),
            Value::Array(items) => Value::join_array(items, ","),
            Value::Object(_) => "[object Object]".to_string(),
            Value::Function(_) => "function () { [native code] }".to_string(),
        }
    }

    /// `Array.prototype.join`: nullish elements print empty, and so does an
    /// array already being joined further up.
    pub fn join_array(items: &Array, separator: &str) -> String {
        join_within(items, separator, &mut Visiting::default())
    }

    // ── Equality ─────────────────────────────────────────────────────────

    /// `===`: same type and value; arrays, objects and functions by identity.
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// `==`: abstract equality with JS coercion rules.
    pub fn loose_equals(&self, other: &Value) -> bool {
        use Value::*;
        match (self, other) {
            (Undefined | Null, Undefined | Null) => true,
            (Undefined | Null, _) | (_, Undefined | Null) => false,
            (Number(_), String(_)) | (String(_), Number(_)) => {
                self.to_number() == other.to_number()
            }
            (Bool(_), _) => Number(self.to_number()).loose_equals(other),
            (_, Bool(_)) => self.loose_equals(&Number(other.to_number())),
            (Array(_) | Object(_) | Function(_), Number(_) | String(_)) => {
                String(self.to_js_string()).loose_equals(other)
            }
            (Number(_) | String(_), Array(_) | Object(_) | Function(_)) => {
                self.loose_equals(&String(other.to_js_string()))
            }
            _ => self.strict_equals(other),
        }
    }

    /// `SameValueZero`, as used by `includes`: like `===` but `NaN` equals itself.
    pub fn same_value_zero(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan() => true,
            _ => self.strict_equals(other),
        }
    }

    // ── JSON interop ─────────────────────────────────────────────────────

    /// Convert to JSON. `undefined` and functions become `null`; a container
    /// that holds itself is a [`EvalError::TypeError`].
    pub fn to_json(&self) -> EvalResult<serde_json::Value> {
        self.json_within(&mut Visiting::default())
    }

    fn json_within(&self, visiting: &mut Visiting) -> EvalResult<serde_json::Value> {
        Ok(match self {
            Value::Undefined | Value::Null | Value::Function(_) => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => {
                if !visiting.enter(items) {
                    return Err(cyclic());
                }
                let converted = items
                    .borrow()
                    .iter()
                    .map(|v| v.json_within(visiting))
                    .collect::<EvalResult<Vec<_>>>();
                visiting.leave();
                serde_json::Value::Array(converted?)
            }
            Value::Object(fields) => {
                if !visiting.enter(fields) {
                    return Err(cyclic());
                }
                let converted = fields
                    .borrow()
                    .iter()
                    .map(|(k, v)| v.json_within(visiting).map(|json| (k.clone(), json)))
                    .collect::<EvalResult<serde_json::Map<_, _>>>();
                visiting.leave();
                serde_json::Value::Object(converted?)
            }
        })
    }
}

fn cyclic() -> EvalError {
    EvalError::TypeError("cannot convert a self-referencing structure to JSON".to_string())
}

// ── Cycle tracking ───────────────────────────────────────────────────────

/// Addresses of the containers a walk is currently inside.
#[derive(Default)]
struct Visiting(Vec<*const ()>);

impl Visiting {
    /// `false` if `handle` is already on the path.
    fn enter<T>(&mut self, handle: &Rc<T>) -> bool {
        let address = Rc::as_ptr(handle).cast::<()>();
        if self.0.contains(&address) {
            return false;
        }
        self.0.push(address);
        true
    }

    fn leave(&mut self) {
        self.0.pop();
    }
}

fn join_within(items: &Array, separator: &str, visiting: &mut Visiting) -> String {
    if !visiting.enter(items) {
        return String::new();
    }
    let joined = items
        .borrow()
        .iter()
        .map(|v| match v {
            Value::Undefined | Value::Null => String::new(),
            Value::Array(inner) => join_within(inner, ",", visiting),
            other => other.to_js_string(),
        })
        .collect::<Vec<_>>()
        .join(separator);
    visiting.leave();
    joined
}

/// Structural equality that treats a pair of containers already being
/// compared as equal.
fn deep_equals(a: &Value, b: &Value, pairs: &mut Vec<(*const (), *const ())>) -> bool {
    match (a, b) {
        (Value::Array(x), Value::Array(y)) => {
            if Rc::ptr_eq(x, y) {
                return true;
            }
            let pair = (Rc::as_ptr(x).cast::<()>(), Rc::as_ptr(y).cast::<()>());
            if pairs.contains(&pair) {
                return true;
            }
            pairs.push(pair);
            let (x, y) = (x.borrow(), y.borrow());
            let equal = x.len() == y.len()
                && x.iter().zip(y.iter()).all(|(l, r)| deep_equals(l, r, pairs));
            pairs.pop();
            equal
        }
        (Value::Object(x), Value::Object(y)) => {
            if Rc::ptr_eq(x, y) {
                return true;
            }
            let pair = (Rc::as_ptr(x).cast::<()>(), Rc::as_ptr(y).cast::<()>());
            if pairs.contains(&pair) {
                return true;
            }
            pairs.push(pair);
            let (x, y) = (x.borrow(), y.borrow());
            let equal = x.len() == y.len()
                && x.iter()
                    .zip(y.iter())
                    .all(|((lk, lv), (rk, rv))| lk == rk && deep_equals(lv, rv, pairs));
            pairs.pop();
            equal
        }
        _ => a.strict_equals(b),
    }
}

/// Integral numbers go out as JSON integers, non-finite ones as `null`.
fn number_to_json(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

/// String → number the way JS `Number(s)` does it.
fn parse_number(s: &str) -> f64 {
    let t = s.trim();
    if t.is_empty() {
        return 0.0;
    }
    match t {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    for (prefix, radix) in [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)] {
        if let Some(digits) = t.strip_prefix(prefix) {
            return u64::from_str_radix(digits, radix)
                .map(|v| v as f64)
                .unwrap_or(f64::NAN);
        }
    }
    // Rust accepts "inf"/"nan"; JS does not.
    if t.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
        return f64::NAN;
    }
    t.parse::<f64>().unwrap_or(f64::NAN)
}

/// Number → string the way JS `String(n)` does it.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let abs = n.abs();
    if abs >= 1e21 || abs < 1e-6 {
        let s = format!("{n:e}");
        return match s.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp}"),
            _ => s,
        };
    }
    if n.fract() == 0.0 {
        format!("{n:.0}")
    } else {
        format!("{n}")
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Trait impls
// ══════════════════════════════════════════════════════════════════════════════

/// Deep structural equality (host-side comparisons and tests).
/// Functions compare by identity; `NaN != NaN`.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        deep_equals(self, other, &mut Vec::new())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let visiting = RefCell::new(Visiting::default());
        fmt::Debug::fmt(&DebugValue { value: self, visiting: &visiting }, f)
    }
}

/// `Debug` view that prints a container it is already inside as `[..]`/`{..}`.
struct DebugValue<'a> {
    value: &'a Value,
    visiting: &'a RefCell<Visiting>,
}

impl fmt::Debug for DebugValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Value::Undefined => f.write_str("Undefined"),
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Value::Number(n) => f.debug_tuple("Number").field(n).finish(),
            Value::String(s) => f.debug_tuple("String").field(s).finish(),
            Value::Array(items) => {
                if !self.visiting.borrow_mut().enter(items) {
                    return f.write_str("[..]");
                }
                let result = f
                    .debug_list()
                    .entries(items.borrow().iter().map(|value| DebugValue {
                        value,
                        visiting: self.visiting,
                    }))
                    .finish();
                self.visiting.borrow_mut().leave();
                result
            }
            Value::Object(fields) => {
                if !self.visiting.borrow_mut().enter(fields) {
                    return f.write_str("{..}");
                }
                let result = f
                    .debug_map()
                    .entries(fields.borrow().iter().map(|(key, value)| {
                        (key, DebugValue { value, visiting: self.visiting })
                    }))
                    .finish();
                self.visiting.borrow_mut().leave();
                result
            }
            Value::Function(func) => fmt::Debug::fmt(func, f),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_js_string())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json()
            .map_err(<S::Error as serde::ser::Error>::custom)?
            .serialize(serializer)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(fields) => {
                Value::object(fields.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::array(items)
    }
}

impl From<NativeFn> for Value {
    fn from(f: NativeFn) -> Self {
        Value::Function(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_table() {
        for falsy in [
            Value::from(0),
            Value::from(""),
            Value::Null,
            Value::Undefined,
            Value::from(false),
            Value::from(f64::NAN),
        ] {
            assert!(!falsy.is_truthy(), "{falsy:?} should be falsy");
        }
        for truthy in [
            Value::from(-1),
            Value::from("0"),
            Value::from(" "),
            Value::array(vec![]),
            Value::object(BTreeMap::new()),
            Value::from(true),
        ] {
            assert!(truthy.is_truthy(), "{truthy:?} should be truthy");
        }
    }

    #[test]
    fn number_formatting_matches_js() {
        assert_eq!(format_number(5.0), "5");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(format_number(1e21), "1e+21");
        assert_eq!(format_number(1.5e-7), "1.5e-7");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn string_to_number() {
        assert_eq!(Value::from("  42 ").to_number(), 42.0);
        assert_eq!(Value::from("").to_number(), 0.0);
        assert_eq!(Value::from("0x1f").to_number(), 31.0);
        assert!(Value::from("inf").to_number().is_nan());
        assert!(Value::from("12px").to_number().is_nan());
    }

    #[test]
    fn loose_equality_coerces() {
        assert!(Value::Null.loose_equals(&Value::Undefined));
        assert!(Value::from("1").loose_equals(&Value::from(1)));
        assert!(Value::from(true).loose_equals(&Value::from(1)));
        assert!(!Value::Null.loose_equals(&Value::from(0)));
        assert!(Value::array(vec![Value::from(1), Value::from(2)]).loose_equals(&Value::from("1,2")));
    }

    #[test]
    fn strict_equality_uses_identity_for_arrays() {
        let a = Value::array(vec![Value::from(1)]);
        let b = Value::array(vec![Value::from(1)]);
        assert!(a.strict_equals(&a.clone()));
        assert!(!a.strict_equals(&b));
        assert_eq!(a, b);
    }

    #[test]
    fn int32_wraps() {
        assert_eq!(Value::from(4_294_967_297.0).to_int32(), 1);
        assert_eq!(Value::from(2_147_483_648.0).to_int32(), -2_147_483_648);
        assert_eq!(Value::from(-1.5).to_int32(), -1);
    }

    #[test]
    fn json_round_trip_keeps_integers() {
        let v = Value::from(serde_json::json!({"a": [1, 2.5, null], "b": "x"}));
        assert_eq!(v.to_json(), Ok(serde_json::json!({"a": [1, 2.5, null], "b": "x"})));
        assert_eq!(serde_json::to_string(&Value::from(3)).ok(), Some("3".to_string()));
    }

    fn self_referencing_object() -> Value {
        let obj = Value::object(BTreeMap::from([("n".to_string(), Value::from(1))]));
        if let Value::Object(fields) = &obj {
            fields.borrow_mut().insert("me".to_string(), obj.clone());
        }
        obj
    }

    #[test]
    fn cycles_stop_every_walk() {
        let obj = self_referencing_object();
        assert!(matches!(obj.to_json(), Err(EvalError::TypeError(_))));
        assert!(serde_json::to_string(&obj).is_err());
        assert_eq!(format!("{obj:?}"), r#"{"me": {..}, "n": Number(1.0)}"#);
        assert_eq!(obj, self_referencing_object());

        let list = Value::array(vec![Value::from(1)]);
        if let Value::Array(items) = &list {
            items.borrow_mut().push(list.clone());
        }
        assert_eq!(list.to_js_string(), "1,");
        let nested = Value::array(vec![list.clone(), list.clone()]);
        assert_eq!(nested.to_js_string(), "1,,1,");
    }

    #[test]
    fn shared_but_acyclic_containers_convert_fully() {
        let inner = Value::array(vec![Value::from(1)]);
        let outer = Value::array(vec![inner.clone(), inner]);
        assert_eq!(outer.to_json(), Ok(serde_json::json!([[1], [1]])));
        assert_eq!(outer.to_js_string(), "1,1");
    }
}
