//! Canonical jsonfn programs, loaded from JSON text the way a host would
//! read them from disk.

use jsonfn_eval::{Context, EvalError, Registry, Value};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::cell::RefCell;
use std::rc::Rc;

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

fn load(source: &str) -> Registry {
    let mut registry = Registry::new();
    if let Err(e) = registry.load_str(source) {
        panic!("failed to load program: {e}");
    }
    registry
}

fn run(registry: &Registry, name: &str, context: Option<Context>, args: &[Value]) -> Value {
    let function = registry
        .compile(name, context)
        .unwrap_or_else(|e| panic!("compile {name}: {e}"));
    function
        .call(args)
        .unwrap_or_else(|e| panic!("call {name}: {e}"))
}

fn s(v: &str) -> Value {
    Value::from(v)
}

// ══════════════════════════════════════════════════════════════════════════════
// Canonical Example 1: Invoice (context-driven pricing)
// ══════════════════════════════════════════════════════════════════════════════

const INVOICE_SOURCE: &str = r#"
{
  "lineTotal": {
    "type": "function",
    "config": {
      "description": "Price times quantity for one line item",
      "params": ["item"],
      "body": [],
      "return": {
        "binary": {
          "op": "*",
          "left": { "member": { "object": "item", "property": "price" } },
          "right": { "member": { "object": "item", "property": "qty" } }
        }
      }
    }
  },
  "invoice": {
    "type": "function",
    "config": {
      "description": "Subtotal, tax and total for a list of line items",
      "params": [{ "name": "items", "type": "array", "required": true }],
      "body": [
        { "let": { "name": "subtotal", "value": 0 } },
        { "for": {
            "item": "item",
            "in": "items",
            "body": [
              { "set": {
                  "name": "subtotal",
                  "value": {
                    "binary": {
                      "op": "+",
                      "left": "subtotal",
                      "right": { "call": { "name": "lineTotal", "args": ["item"] } }
                    }
                  }
              } }
            ]
        } },
        { "let": {
            "name": "tax",
            "value": { "binary": { "op": "*", "left": "subtotal", "right": "taxRate" } }
        } },
        { "if": {
            "condition": { "binary": { "op": ">=", "left": "subtotal", "right": "freeShippingOver" } },
            "then": [ { "let": { "name": "shipping", "value": 0 } } ],
            "else": [ { "let": { "name": "shipping", "value": "flatShipping" } } ]
        } },
        { "return": {
            "object": {
              "subtotal": "subtotal",
              "tax": "tax",
              "shipping": "shipping",
              "total": {
                "binary": {
                  "op": "+",
                  "left": { "binary": { "op": "+", "left": "subtotal", "right": "tax" } },
                  "right": "shipping"
                }
              }
            }
        } }
      ]
    }
  }
}
"#;

fn store(tax_rate: f64) -> Context {
    Context::new()
        .with_variable("taxRate", tax_rate)
        .with_variable("freeShippingOver", 100)
        .with_variable("flatShipping", 5)
}

#[test]
fn invoice_lists_functions() {
    let registry = load(INVOICE_SOURCE);
    let names: Vec<String> = registry.list_functions().into_iter().map(|f| f.name).collect();
    assert_eq!(names, vec!["lineTotal", "invoice"]);
}

#[test]
fn invoice_small_order_pays_shipping() {
    let registry = load(INVOICE_SOURCE);
    let items = Value::from(json!([
        { "price": 10, "qty": 2 },
        { "price": 4, "qty": 5 }
    ]));
    let got = run(&registry, "invoice", Some(store(0.25)), &[items]);
    assert_eq!(
        got,
        Value::from(json!({ "subtotal": 40, "tax": 10, "shipping": 5, "total": 55 }))
    );
}

#[test]
fn invoice_large_order_ships_free() {
    let registry = load(INVOICE_SOURCE);
    let items = Value::from(json!([{ "price": 50, "qty": 4 }]));
    let got = run(&registry, "invoice", Some(store(0.5)), &[items]);
    assert_eq!(
        got,
        Value::from(json!({ "subtotal": 200, "tax": 100, "shipping": 0, "total": 300 }))
    );
}

#[test]
fn invoice_without_context_fails_on_tax_rate() {
    let registry = load(INVOICE_SOURCE);
    let invoice = registry.compile("invoice", None).unwrap();
    let got = invoice.call(&[Value::from(json!([]))]);
    assert_eq!(got, Err(EvalError::UndefinedVariable("taxRate".into())));
}

// ══════════════════════════════════════════════════════════════════════════════
// Canonical Example 2: FizzBuzz (while loop, nested conditionals, push)
// ══════════════════════════════════════════════════════════════════════════════

const FIZZBUZZ_SOURCE: &str = r#"
{
  "fizzbuzz": {
    "type": "function",
    "config": {
      "params": ["n"],
      "body": [
        { "let": { "name": "out", "value": { "array": [] } } },
        { "let": { "name": "i", "value": 1 } },
        { "while": {
            "condition": { "binary": { "op": "<=", "left": "i", "right": "n" } },
            "body": [
              { "let": {
                  "name": "word",
                  "value": {
                    "ternary": {
                      "condition": { "binary": { "op": "===", "left": { "binary": { "op": "%", "left": "i", "right": 15 } }, "right": 0 } },
                      "then": { "literal": "FizzBuzz" },
                      "else": {
                        "ternary": {
                          "condition": { "binary": { "op": "===", "left": { "binary": { "op": "%", "left": "i", "right": 3 } }, "right": 0 } },
                          "then": { "literal": "Fizz" },
                          "else": {
                            "ternary": {
                              "condition": { "binary": { "op": "===", "left": { "binary": { "op": "%", "left": "i", "right": 5 } }, "right": 0 } },
                              "then": { "literal": "Buzz" },
                              "else": { "call": { "name": "toString", "args": ["i"] } }
                            }
                          }
                        }
                      }
                    }
                  }
              } },
              { "let": { "name": "_", "value": { "method": { "object": "out", "name": "push", "args": ["word"] } } } },
              { "set": { "name": "i", "value": { "binary": { "op": "+", "left": "i", "right": 1 } } } }
            ]
        } }
      ],
      "return": { "method": { "object": "out", "name": "join", "args": [{ "literal": " " }] } }
    }
  }
}
"#;

#[test]
fn fizzbuzz_fifteen() {
    let registry = load(FIZZBUZZ_SOURCE);
    let got = run(&registry, "fizzbuzz", None, &[Value::from(15)]);
    assert_eq!(
        got,
        s("1 2 Fizz 4 Buzz Fizz 7 8 Fizz Buzz 11 Fizz 13 14 FizzBuzz")
    );
}

#[test]
fn fizzbuzz_zero_is_empty() {
    let registry = load(FIZZBUZZ_SOURCE);
    assert_eq!(run(&registry, "fizzbuzz", None, &[Value::from(0)]), s(""));
}

// ══════════════════════════════════════════════════════════════════════════════
// Canonical Example 3: Slugify (string method chains)
// ══════════════════════════════════════════════════════════════════════════════

const SLUGIFY_SOURCE: &str = r#"
{
  "slugify": {
    "type": "function",
    "config": {
      "description": "Lower-case, trim and hyphenate a title",
      "params": ["title"],
      "body": [
        { "let": {
            "name": "words",
            "value": {
              "method": {
                "object": {
                  "method": {
                    "object": {
                      "method": {
                        "object": { "method": { "object": "title", "name": "trim" } },
                        "name": "toLowerCase"
                      }
                    },
                    "name": "split",
                    "args": [{ "literal": " " }]
                  }
                },
                "name": "filter",
                "args": ["toBoolean"]
              }
            }
        } },
        { "if": {
            "condition": { "binary": { "op": "===", "left": { "member": { "object": "words", "property": "length" } }, "right": 0 } },
            "then": [ { "return": { "literal": "untitled" } } ]
        } },
        { "return": { "method": { "object": "words", "name": "join", "args": [{ "literal": "-" }] } } }
      ]
    }
  }
}
"#;

#[test]
fn slugify_titles() {
    let registry = load(SLUGIFY_SOURCE);
    let slugify = registry.compile("slugify", None).unwrap();
    assert_eq!(slugify.call(&[s("  Hello   World ")]), Ok(s("hello-world")));
    assert_eq!(slugify.call(&[s("Rust Is Fun")]), Ok(s("rust-is-fun")));
    assert_eq!(slugify.call(&[s("   ")]), Ok(s("untitled")));
}

#[test]
fn slugify_rejects_null_title() {
    let registry = load(SLUGIFY_SOURCE);
    let slugify = registry.compile("slugify", None).unwrap();
    assert_eq!(
        slugify.call(&[Value::Null]),
        Err(EvalError::NullReceiver("trim".into()))
    );
}

// ══════════════════════════════════════════════════════════════════════════════
// Canonical Example 4: Statistics (cross-function calls, compile_all)
// ══════════════════════════════════════════════════════════════════════════════

const STATS_SOURCE: &str = r#"
{
  "sum": {
    "type": "function",
    "config": {
      "params": ["xs"],
      "body": [
        { "let": { "name": "total", "value": 0 } },
        { "for": { "item": "x", "in": "xs", "body": [
            { "set": { "name": "total", "value": { "binary": { "op": "+", "left": "total", "right": "x" } } } }
        ] } }
      ],
      "return": "total"
    }
  },
  "mean": {
    "type": "function",
    "config": {
      "params": ["xs"],
      "body": [],
      "return": {
        "binary": {
          "op": "/",
          "left": { "call": { "name": "sum", "args": ["xs"] } },
          "right": { "member": { "object": "xs", "property": "length" } }
        }
      }
    }
  },
  "largest": {
    "type": "function",
    "config": {
      "params": ["xs"],
      "body": [
        { "let": { "name": "best", "value": { "index": { "object": "xs", "index": 0 } } } },
        { "for": { "item": "x", "in": "xs", "body": [
            { "if": {
                "condition": { "binary": { "op": ">", "left": "x", "right": "best" } },
                "then": [ { "set": { "name": "best", "value": "x" } } ]
            } }
        ] } }
      ],
      "return": "best"
    }
  },
  "summary": {
    "type": "function",
    "config": {
      "params": ["xs"],
      "body": [],
      "return": {
        "object": {
          "count": { "member": { "object": "xs", "property": "length" } },
          "sum": { "call": { "name": "sum", "args": ["xs"] } },
          "mean": { "call": { "name": "round", "args": [{ "call": { "name": "mean", "args": ["xs"] } }] } },
          "max": { "call": { "name": "largest", "args": ["xs"] } }
        }
      }
    }
  }
}
"#;

#[test]
fn stats_summary() {
    let registry = load(STATS_SOURCE);
    let all = registry.compile_all(None).unwrap();
    let data = Value::from(json!([3, 9, 4, 8]));
    assert_eq!(
        all["summary"].call(&[data]),
        Ok(Value::from(json!({ "count": 4, "sum": 24, "mean": 6, "max": 9 })))
    );
}

#[test]
fn stats_mean_of_empty_list_is_zero() {
    let registry = load(STATS_SOURCE);
    // 0 / 0 saturates to 0 instead of NaN.
    assert_eq!(run(&registry, "mean", None, &[Value::from(json!([]))]), Value::from(0));
    assert_eq!(
        run(&registry, "largest", None, &[Value::from(json!([]))]),
        Value::Undefined
    );
}

#[test]
fn stats_functions_reuse_across_calls() {
    let registry = load(STATS_SOURCE);
    let sum = registry.compile("sum", None).unwrap();
    for (input, expected) in [(json!([1, 2]), 3), (json!([]), 0), (json!([10, -10, 5]), 5)] {
        assert_eq!(sum.call(&[Value::from(input)]), Ok(Value::from(expected)));
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Canonical Example 5: Access policy (host functions and audit hooks)
// ══════════════════════════════════════════════════════════════════════════════

const POLICY_SOURCE: &str = r#"
{
  "canEdit": {
    "type": "function",
    "config": {
      "description": "Owners and admins may edit; everyone else needs a grant",
      "params": ["user", "doc"],
      "body": [
        { "if": {
            "condition": {
              "binary": {
                "op": "||",
                "left": { "binary": { "op": "===", "left": { "member": { "object": "user", "property": "id" } }, "right": { "member": { "object": "doc", "property": "owner" } } } },
                "right": { "method": { "object": { "member": { "object": "user", "property": "roles" } }, "name": "includes", "args": [{ "literal": "admin" }] } }
              }
            },
            "then": [ { "return": true } ]
        } },
        { "return": { "call": { "name": "hasGrant", "args": [{ "member": { "object": "user", "property": "id" } }, { "member": { "object": "doc", "property": "id" } }] } } }
      ]
    }
  }
}
"#;

fn policy_context(audit: Rc<RefCell<Vec<String>>>) -> Context {
    Context::new()
        .with_function("hasGrant", |args| {
            let user = args.first().cloned().unwrap_or_default();
            Ok(Value::Bool(user.as_str() == Some("carol")))
        })
        .on_return(move |name, result| audit.borrow_mut().push(format!("{name} -> {result}")))
}

#[test]
fn policy_decisions() {
    let registry = load(POLICY_SOURCE);
    let audit = Rc::new(RefCell::new(Vec::new()));
    let can_edit = registry
        .compile("canEdit", Some(policy_context(Rc::clone(&audit))))
        .unwrap();
    let doc = Value::from(json!({ "id": "d1", "owner": "alice" }));
    let user = |id: &str, roles: serde_json::Value| Value::from(json!({ "id": id, "roles": roles }));

    assert_eq!(can_edit.call(&[user("alice", json!([])), doc.clone()]), Ok(Value::from(true)));
    assert_eq!(can_edit.call(&[user("bob", json!(["admin"])), doc.clone()]), Ok(Value::from(true)));
    assert_eq!(can_edit.call(&[user("carol", json!([])), doc.clone()]), Ok(Value::from(true)));
    assert_eq!(can_edit.call(&[user("dave", json!(["viewer"])), doc]), Ok(Value::from(false)));
    assert_eq!(
        *audit.borrow(),
        vec![
            "canEdit -> true",
            "canEdit -> true",
            "canEdit -> true",
            "canEdit -> false"
        ]
    );
}

#[test]
fn policy_cannot_reach_host_methods() {
    let mut registry = load(POLICY_SOURCE);
    registry
        .load(&json!({
            "escape": {
                "type": "function",
                "config": {
                    "params": ["user"],
                    "body": [],
                    "return": { "method": { "object": "user", "name": "constructor" } }
                }
            }
        }))
        .unwrap();
    let escape = registry.compile("escape", None).unwrap();
    assert_eq!(
        escape.call(&[Value::from(json!({ "id": "mallory" }))]),
        Err(EvalError::MethodNotAllowed("constructor".into()))
    );
}
