//! AST node types for jsonfn programs.
//!
//! There is no text syntax: the JSON document *is* the AST. Every node is an
//! externally tagged object (`{"binary": {...}}`, `{"let": {...}}`) and is
//! deserialized once, at load time, into the closed enums below.
//! Large recursive types are boxed to keep enum sizes reasonable.
//! Object construction keeps declaration order (a `Vec`, not a map).

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use std::fmt;

// ══════════════════════════════════════════════════════════════════════════════
// Function Definitions
// ══════════════════════════════════════════════════════════════════════════════

/// Discriminator value every loaded function definition must carry in `type`.
pub const FUNCTION_MARKER: &str = "function";

/// A validated, immutable function definition.
///
/// Built from `{"type": "function", "config": {"params": [...], "body": [...],
/// "return"?: E, "description"?: "...", "debug"?: bool}}`.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub description: Option<String>,
    /// Normalized parameter names, in declaration order.
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
    /// Trailing return expression, used when the body never hits `return`.
    pub ret: Option<Expr>,
    pub debug: bool,
}

/// A declared parameter: either a bare name or a descriptor object.
///
/// Only `name` is honored; `type`, `required` and `default` are accepted
/// but never enforced at call time.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Param {
    Name(String),
    Descriptor {
        name: String,
        #[serde(default, rename = "type")]
        ty: Option<String>,
        #[serde(default)]
        required: Option<bool>,
        #[serde(default)]
        default: Option<serde_json::Value>,
    },
}

impl Param {
    pub fn name(&self) -> &str {
        match self {
            Param::Name(name) | Param::Descriptor { name, .. } => name,
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Statements
// ══════════════════════════════════════════════════════════════════════════════

/// A statement node.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stmt {
    /// `{"let": {"name": "x", "value": E}}`
    Let { name: String, value: Expr },
    /// `{"set": {"name": "x", "value": E}}`, the name must already be bound
    Set { name: String, value: Expr },
    /// `{"if": {"condition": E, "then": [...], "else"?: [...]}}`
    If {
        condition: Expr,
        then: Vec<Stmt>,
        #[serde(default, rename = "else")]
        otherwise: Option<Vec<Stmt>>,
    },
    /// `{"for": {"item": "x", "in": E, "body": [...]}}`
    For {
        item: String,
        #[serde(rename = "in")]
        source: Expr,
        body: Vec<Stmt>,
    },
    /// `{"while": {"condition": E, "body": [...]}}`
    While { condition: Expr, body: Vec<Stmt> },
    /// `{"return": E}`; `{"return": null}` returns the absent value.
    Return(Option<Expr>),
}

// ══════════════════════════════════════════════════════════════════════════════
// Expressions
// ══════════════════════════════════════════════════════════════════════════════

/// An expression node.
///
/// Wherever an expression is expected, two shorthands are accepted: a bare
/// string is a variable reference and a bare number or boolean is a literal.
/// The shorthand only applies to expression slots; the payload of
/// `{"literal": "x"}` stays a string and names stay names.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Ref(String),
    Member {
        object: Box<Expr>,
        property: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
    Method {
        object: Box<Expr>,
        name: String,
        args: Vec<Expr>,
    },
    Ternary {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    /// Property name → value expression, in declaration order.
    Object(Vec<(String, Expr)>),
    Array(Vec<Expr>),
}

/// A literal payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

// ── Binary Operators ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum BinOp {
    // Arithmetic
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Sub,
    #[serde(rename = "*")]
    Mul,
    #[serde(rename = "/")]
    Div,
    #[serde(rename = "%")]
    Mod,
    // Equality
    #[serde(rename = "==")]
    LooseEq,
    #[serde(rename = "!=")]
    LooseNotEq,
    #[serde(rename = "===")]
    StrictEq,
    #[serde(rename = "!==")]
    StrictNotEq,
    // Relational
    #[serde(rename = "<")]
    Less,
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = "<=")]
    LessEq,
    #[serde(rename = ">=")]
    GreaterEq,
    // Logical
    #[serde(rename = "&&")]
    And,
    #[serde(rename = "||")]
    Or,
    // Bitwise
    #[serde(rename = "&")]
    BitAnd,
    #[serde(rename = "|")]
    BitOr,
    #[serde(rename = "^")]
    BitXor,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum UnaryOp {
    /// `!x`
    #[serde(rename = "!")]
    Not,
    /// `-x`
    #[serde(rename = "-")]
    Neg,
    /// `+x`, numeric coercion
    #[serde(rename = "+")]
    Plus,
    /// `~x`
    #[serde(rename = "~")]
    BitNot,
}

// ══════════════════════════════════════════════════════════════════════════════
// Deserialization
// ══════════════════════════════════════════════════════════════════════════════

/// The tagged (non-shorthand) form of an expression node.
#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum TaggedExpr {
    Literal(Literal),
    Ref(String),
    Member {
        object: Box<Expr>,
        property: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Call {
        name: String,
        #[serde(default)]
        args: Vec<Expr>,
    },
    Method {
        object: Box<Expr>,
        name: String,
        #[serde(default)]
        args: Vec<Expr>,
    },
    Ternary {
        condition: Box<Expr>,
        then: Box<Expr>,
        #[serde(rename = "else")]
        otherwise: Box<Expr>,
    },
    #[serde(deserialize_with = "ordered_fields")]
    Object(Vec<(String, Expr)>),
    Array(Vec<Expr>),
}

impl From<TaggedExpr> for Expr {
    fn from(node: TaggedExpr) -> Self {
        match node {
            TaggedExpr::Literal(lit) => Expr::Literal(lit),
            TaggedExpr::Ref(name) => Expr::Ref(name),
            TaggedExpr::Member { object, property } => Expr::Member { object, property },
            TaggedExpr::Index { object, index } => Expr::Index { object, index },
            TaggedExpr::Binary { op, left, right } => Expr::Binary { op, left, right },
            TaggedExpr::Unary { op, operand } => Expr::Unary { op, operand },
            TaggedExpr::Call { name, args } => Expr::Call { name, args },
            TaggedExpr::Method { object, name, args } => Expr::Method { object, name, args },
            TaggedExpr::Ternary {
                condition,
                then,
                otherwise,
            } => Expr::Ternary {
                condition,
                then,
                otherwise,
            },
            TaggedExpr::Object(fields) => Expr::Object(fields),
            TaggedExpr::Array(elems) => Expr::Array(elems),
        }
    }
}

impl<'de> Deserialize<'de> for Expr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ExprVisitor)
    }
}

/// Accepts the shorthand forms, then hands objects to [`TaggedExpr`].
struct ExprVisitor;

impl<'de> Visitor<'de> for ExprVisitor {
    type Value = Expr;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an expression node, a variable name, a number or a boolean")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Expr, E> {
        Ok(Expr::Literal(Literal::Bool(v)))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Expr, E> {
        Ok(Expr::Literal(Literal::Number(v as f64)))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Expr, E> {
        Ok(Expr::Literal(Literal::Number(v as f64)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Expr, E> {
        Ok(Expr::Literal(Literal::Number(v)))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Expr, E> {
        Ok(Expr::Ref(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Expr, E> {
        Ok(Expr::Ref(v))
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Expr, A::Error> {
        if let Some(len) = map.size_hint().filter(|len| *len != 1) {
            return Err(de::Error::invalid_length(len, &"a node object with exactly one tag"));
        }
        TaggedExpr::deserialize(de::value::MapAccessDeserializer::new(map)).map(Expr::from)
    }
}

/// Reads an object-construction payload without losing declaration order.
fn ordered_fields<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<(String, Expr)>, D::Error> {
    struct FieldsVisitor;

    impl<'de> Visitor<'de> for FieldsVisitor {
        type Value = Vec<(String, Expr)>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("an object mapping property names to expressions")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut fields = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((key, value)) = map.next_entry::<String, Expr>()? {
                fields.push((key, value));
            }
            Ok(fields)
        }
    }

    deserializer.deserialize_map(FieldsVisitor)
}

/// Parse a single expression node from JSON.
pub fn parse_expr(node: &serde_json::Value) -> Result<Expr, serde_json::Error> {
    Expr::deserialize(node)
}

/// Parse a statement list from JSON.
pub fn parse_block(node: &serde_json::Value) -> Result<Vec<Stmt>, serde_json::Error> {
    Vec::<Stmt>::deserialize(node)
}
