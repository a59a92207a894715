//! Core expression and statement evaluator.

use crate::context::Context;
use crate::methods;
use crate::registry::{Function, RegistryState};
use crate::scope::Scope;
use jsonfn_types::ast::{BinOp, Expr, Literal, Stmt, UnaryOp};
use jsonfn_types::{EvalError, EvalResult, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Outcome of executing a statement or block.
///
/// `Return` propagates unchanged through every enclosing `if`/`for`/`while`
/// until it reaches the function boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Continue,
    Return(Value),
}

/// Walks AST nodes for one function invocation (or one host-level
/// `evaluate`/`execute` call).
///
/// The evaluator owns no bindings: expressions read a borrowed [`Scope`],
/// statements mutate it. Registry state and the bound context are shared.
pub(crate) struct Evaluator<'a> {
    state: &'a Rc<RegistryState>,
    context: &'a Context,
}

impl<'a> Evaluator<'a> {
    pub(crate) fn new(state: &'a Rc<RegistryState>, context: &'a Context) -> Self {
        Self { state, context }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Expression evaluation
    // ══════════════════════════════════════════════════════════════════════

    pub(crate) fn eval_expr(&self, expr: &Expr, scope: &Scope) -> EvalResult<Value> {
        match expr {
            Expr::Literal(lit) => Ok(eval_literal(lit)),
            Expr::Ref(name) => self.eval_ref(name, scope),
            Expr::Member { object, property } => self.eval_member(object, property, scope),
            Expr::Index { object, index } => self.eval_index(object, index, scope),
            Expr::Binary { op, left, right } => self.eval_binary(*op, left, right, scope),
            Expr::Unary { op, operand } => self.eval_unary(*op, operand, scope),
            Expr::Call { name, args } => self.eval_call(name, args, scope),
            Expr::Method { object, name, args } => self.eval_method_call(object, name, args, scope),
            Expr::Ternary {
                condition,
                then,
                otherwise,
            } => {
                if self.eval_expr(condition, scope)?.is_truthy() {
                    self.eval_expr(then, scope)
                } else {
                    self.eval_expr(otherwise, scope)
                }
            }
            Expr::Object(fields) => self.eval_object_literal(fields, scope),
            Expr::Array(elems) => Ok(Value::array(self.eval_args(elems, scope)?)),
        }
    }

    // ── Literals ──────────────────────────────────────────────────────────

    fn eval_object_literal(&self, fields: &[(String, Expr)], scope: &Scope) -> EvalResult<Value> {
        let mut object = BTreeMap::new();
        for (key, value) in fields {
            let value = self.eval_expr(value, scope)?;
            object.insert(key.clone(), value);
        }
        Ok(Value::object(object))
    }

    fn eval_args(&self, args: &[Expr], scope: &Scope) -> EvalResult<Vec<Value>> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval_expr(arg, scope)?);
        }
        Ok(values)
    }

    // ── References & Access ──────────────────────────────────────────────

    /// Scope, then context builtins, then registry builtins.
    fn eval_ref(&self, name: &str, scope: &Scope) -> EvalResult<Value> {
        if let Some(value) = scope.get(name) {
            return Ok(value.clone());
        }
        if let Some(f) = self.context.builtins.get(name) {
            return Ok(Value::Function(f.clone()));
        }
        if let Some(f) = self.state.builtin(name) {
            return Ok(Value::Function(f));
        }
        Err(EvalError::UndefinedVariable(name.to_string()))
    }

    fn eval_member(&self, object: &Expr, property: &str, scope: &Scope) -> EvalResult<Value> {
        let receiver = self.eval_expr(object, scope)?;
        if receiver.is_nullish() {
            return Ok(Value::Undefined);
        }
        Ok(methods::read_property(&receiver, property))
    }

    fn eval_index(&self, object: &Expr, index: &Expr, scope: &Scope) -> EvalResult<Value> {
        let receiver = self.eval_expr(object, scope)?;
        if receiver.is_nullish() {
            return Ok(Value::Undefined);
        }
        let index = self.eval_expr(index, scope)?;
        Ok(methods::read_index(&receiver, &index))
    }

    // ── Calls ────────────────────────────────────────────────────────────

    /// Resolve a call node: context builtins, registry builtins, context
    /// functions, compiled functions, then lazily compiled definitions.
    fn eval_call(&self, name: &str, args: &[Expr], scope: &Scope) -> EvalResult<Value> {
        let args = self.eval_args(args, scope)?;

        if let Some(f) = self.context.builtins.get(name) {
            return f.call(&args);
        }
        if let Some(f) = self.state.builtin(name) {
            return f.call(&args);
        }
        if let Some(f) = self.context.functions.get(name) {
            return f.call(&args);
        }
        if let Some(compiled) = self.state.cached(name) {
            return Function::bind(compiled, self.state).invoke(&args);
        }
        if let Some(compiled) = self.state.compile_lazily(name, self.context) {
            tracing::trace!(function = name, "compiled on first call");
            return Function::bind(compiled, self.state).invoke(&args);
        }
        Err(EvalError::UnknownFunction(name.to_string()))
    }

    /// Null receivers fail before the whitelist is consulted, and both
    /// checks happen before any argument is evaluated.
    fn eval_method_call(
        &self,
        object: &Expr,
        method: &str,
        args: &[Expr],
        scope: &Scope,
    ) -> EvalResult<Value> {
        let receiver = self.eval_expr(object, scope)?;
        if receiver.is_nullish() {
            return Err(EvalError::NullReceiver(method.to_string()));
        }
        if !methods::is_allowed(method) {
            return Err(EvalError::MethodNotAllowed(method.to_string()));
        }
        let args = self.eval_args(args, scope)?;
        methods::call_method(&receiver, method, &args)
    }

    // ── Operators ────────────────────────────────────────────────────────

    fn eval_binary(&self, op: BinOp, left: &Expr, right: &Expr, scope: &Scope) -> EvalResult<Value> {
        // Short-circuit: the right operand is only evaluated when it decides.
        if op == BinOp::And {
            let lv = self.eval_expr(left, scope)?;
            return if lv.is_truthy() {
                self.eval_expr(right, scope)
            } else {
                Ok(lv)
            };
        }
        if op == BinOp::Or {
            let lv = self.eval_expr(left, scope)?;
            return if lv.is_truthy() {
                Ok(lv)
            } else {
                self.eval_expr(right, scope)
            };
        }

        let lv = self.eval_expr(left, scope)?;
        let rv = self.eval_expr(right, scope)?;

        Ok(match op {
            BinOp::Add => eval_add(&lv, &rv),
            BinOp::Sub => Value::Number(lv.to_number() - rv.to_number()),
            BinOp::Mul => Value::Number(lv.to_number() * rv.to_number()),
            BinOp::Div => match &rv {
                Value::Number(b) if *b == 0.0 => Value::Number(0.0),
                _ => Value::Number(lv.to_number() / rv.to_number()),
            },
            BinOp::Mod => Value::Number(lv.to_number() % rv.to_number()),
            BinOp::LooseEq => Value::Bool(lv.loose_equals(&rv)),
            BinOp::LooseNotEq => Value::Bool(!lv.loose_equals(&rv)),
            BinOp::StrictEq => Value::Bool(lv.strict_equals(&rv)),
            BinOp::StrictNotEq => Value::Bool(!lv.strict_equals(&rv)),
            BinOp::Less => eval_comparison(&lv, &rv, Ordering::is_lt),
            BinOp::Greater => eval_comparison(&lv, &rv, Ordering::is_gt),
            BinOp::LessEq => eval_comparison(&lv, &rv, Ordering::is_le),
            BinOp::GreaterEq => eval_comparison(&lv, &rv, Ordering::is_ge),
            BinOp::BitAnd => Value::Number(f64::from(lv.to_int32() & rv.to_int32())),
            BinOp::BitOr => Value::Number(f64::from(lv.to_int32() | rv.to_int32())),
            BinOp::BitXor => Value::Number(f64::from(lv.to_int32() ^ rv.to_int32())),
            BinOp::And | BinOp::Or => unreachable!("handled above"),
        })
    }

    fn eval_unary(&self, op: UnaryOp, operand: &Expr, scope: &Scope) -> EvalResult<Value> {
        let val = self.eval_expr(operand, scope)?;
        Ok(match op {
            UnaryOp::Not => Value::Bool(!val.is_truthy()),
            UnaryOp::Neg => Value::Number(-val.to_number()),
            UnaryOp::Plus => Value::Number(val.to_number()),
            UnaryOp::BitNot => Value::Number(f64::from(!val.to_int32())),
        })
    }

    // ══════════════════════════════════════════════════════════════════════
    // Statement execution
    // ══════════════════════════════════════════════════════════════════════

    /// Run statements in order, stopping at the first `return`.
    pub(crate) fn exec_block(&self, stmts: &[Stmt], scope: &mut Scope) -> EvalResult<Flow> {
        for stmt in stmts {
            if let Flow::Return(value) = self.exec_stmt(stmt, scope)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Continue)
    }

    fn exec_stmt(&self, stmt: &Stmt, scope: &mut Scope) -> EvalResult<Flow> {
        match stmt {
            Stmt::Let { name, value } => {
                let value = self.eval_expr(value, scope)?;
                scope.define(name, value);
                Ok(Flow::Continue)
            }
            Stmt::Set { name, value } => {
                if !scope.contains(name) {
                    return Err(EvalError::UnboundAssignment(name.clone()));
                }
                let value = self.eval_expr(value, scope)?;
                scope.set(name, value);
                Ok(Flow::Continue)
            }
            Stmt::If {
                condition,
                then,
                otherwise,
            } => {
                if self.eval_expr(condition, scope)?.is_truthy() {
                    self.exec_block(then, scope)
                } else if let Some(otherwise) = otherwise {
                    self.exec_block(otherwise, scope)
                } else {
                    Ok(Flow::Continue)
                }
            }
            Stmt::For { item, source, body } => self.exec_for(item, source, body, scope),
            Stmt::While { condition, body } => self.exec_while(condition, body, scope),
            Stmt::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval_expr(expr, scope)?,
                    None => Value::Undefined,
                };
                Ok(Flow::Return(value))
            }
        }
    }

    /// Iterates a snapshot: mutating the source array in the body does not
    /// change the iteration.
    fn exec_for(&self, item: &str, source: &Expr, body: &[Stmt], scope: &mut Scope) -> EvalResult<Flow> {
        let source = self.eval_expr(source, scope)?;
        let items: Vec<Value> = match &source {
            Value::Array(items) => items.borrow().clone(),
            Value::String(s) => s.chars().map(|c| Value::String(c.to_string())).collect(),
            other => return Err(EvalError::NotIterable(other.type_name().to_string())),
        };
        for value in items {
            scope.define(item, value);
            if let Flow::Return(value) = self.exec_block(body, scope)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Continue)
    }

    fn exec_while(&self, condition: &Expr, body: &[Stmt], scope: &mut Scope) -> EvalResult<Flow> {
        let limit = self.state.config.max_loop_iterations;
        let mut iterations = 0usize;
        while self.eval_expr(condition, scope)?.is_truthy() {
            iterations += 1;
            if iterations > limit {
                return Err(EvalError::LoopLimitExceeded { limit });
            }
            if let Flow::Return(value) = self.exec_block(body, scope)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Continue)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Operator semantics
// ══════════════════════════════════════════════════════════════════════════════

fn eval_literal(lit: &Literal) -> Value {
    match lit {
        Literal::Null => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Number(n) => Value::Number(*n),
        Literal::String(s) => Value::String(s.clone()),
    }
}

/// Concatenates when either side is a string or converts to one.
fn eval_add(lv: &Value, rv: &Value) -> Value {
    let stringy = |v: &Value| {
        matches!(
            v,
            Value::String(_) | Value::Array(_) | Value::Object(_) | Value::Function(_)
        )
    };
    if stringy(lv) || stringy(rv) {
        Value::String(format!("{}{}", lv.to_js_string(), rv.to_js_string()))
    } else {
        Value::Number(lv.to_number() + rv.to_number())
    }
}

/// Two strings compare lexicographically; anything else numerically, with
/// NaN on either side comparing false.
fn eval_comparison(lv: &Value, rv: &Value, test: fn(Ordering) -> bool) -> Value {
    let ordering = match (lv, rv) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => lv.to_number().partial_cmp(&rv.to_number()),
    };
    Value::Bool(ordering.is_some_and(test))
}
