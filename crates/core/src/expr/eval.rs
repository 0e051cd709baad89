//! Postfix VM for compiled filter expressions.
//!
//! Values are typed `number | string | null | tuple`. Selectors resolve
//! against a JSON attribute document supplied at evaluation time; a missing
//! key yields `null`. Arithmetic wants numbers and propagates `null`;
//! comparisons work within one type and yield `null` across types;
//! `and`/`or`/`not` operate on truthiness, where `null`, `0`, the empty
//! string, and the empty tuple are false.
//!
//! Evaluation never reports an error: anything that cannot be computed
//! becomes `null`, and a `null` result means "does not match".

use crate::expr::compile::{Instr, Program};
use crate::expr::token::{Lit, Op};

/// A runtime value on the VM stack.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Value {
    Num(f64),
    Str(String),
    Null,
    Tuple(Vec<Value>),
}

impl Value {
    fn truthy(&self) -> bool {
        match self {
            Value::Num(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Null => false,
            Value::Tuple(t) => !t.is_empty(),
        }
    }

    fn from_bool(b: bool) -> Value {
        Value::Num(if b { 1.0 } else { 0.0 })
    }

    fn from_json(v: &serde_json::Value) -> Value {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::from_bool(*b),
            serde_json::Value::Number(n) => n.as_f64().map_or(Value::Null, Value::Num),
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Array(items) => {
                Value::Tuple(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(_) => Value::Null,
        }
    }

    fn from_lit(lit: &Lit) -> Value {
        match lit {
            Lit::Num(n) => Value::Num(*n),
            Lit::Str(s) => Value::Str(s.clone()),
        }
    }
}

/// `==` across equal types; mixed types have no answer.
fn values_equal(a: &Value, b: &Value) -> Option<bool> {
    match (a, b) {
        (Value::Num(x), Value::Num(y)) => Some(x == y),
        (Value::Str(x), Value::Str(y)) => Some(x == y),
        _ => None,
    }
}

fn resolve(doc: &serde_json::Value, path: &[String]) -> Value {
    let mut current = doc;
    for segment in path {
        match current.get(segment) {
            Some(next) => current = next,
            None => return Value::Null,
        }
    }
    Value::from_json(current)
}

fn arith(op: Op, a: f64, b: f64) -> f64 {
    match op {
        Op::Add => a + b,
        Op::Sub => a - b,
        Op::Mul => a * b,
        Op::Div => a / b,
        Op::Mod => a % b,
        Op::Pow => a.powf(b),
        _ => unreachable!("not an arithmetic opcode"),
    }
}

fn compare(op: Op, a: &Value, b: &Value) -> Value {
    let ordering = match (a, b) {
        (Value::Num(x), Value::Num(y)) => x.partial_cmp(y),
        (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
        _ => return Value::Null,
    };
    let Some(ord) = ordering else {
        return Value::Null;
    };
    let result = match op {
        Op::Gt => ord.is_gt(),
        Op::Gte => ord.is_ge(),
        Op::Lt => ord.is_lt(),
        Op::Lte => ord.is_le(),
        _ => unreachable!("not a comparison opcode"),
    };
    Value::from_bool(result)
}

fn apply(op: Op, a: Value, b: Value) -> Value {
    match op {
        Op::Add | Op::Sub | Op::Mul | Op::Div | Op::Mod | Op::Pow => match (a, b) {
            (Value::Num(x), Value::Num(y)) => Value::Num(arith(op, x, y)),
            _ => Value::Null,
        },
        Op::Gt | Op::Gte | Op::Lt | Op::Lte => compare(op, &a, &b),
        Op::Eq => values_equal(&a, &b).map_or(Value::Null, Value::from_bool),
        Op::Neq => values_equal(&a, &b).map_or(Value::Null, |eq| Value::from_bool(!eq)),
        Op::In => match b {
            Value::Tuple(items) => {
                let found = items.iter().any(|i| values_equal(&a, i) == Some(true));
                Value::from_bool(found)
            }
            _ => Value::Null,
        },
        Op::And => Value::from_bool(a.truthy() && b.truthy()),
        Op::Or => Value::from_bool(a.truthy() || b.truthy()),
        Op::Not | Op::OParen | Op::CParen => {
            unreachable!("unary or marker opcode in binary apply")
        }
    }
}

impl Program {
    /// Run the program against a parsed attribute document and coerce the
    /// result to a boolean.
    pub fn eval(&self, doc: &serde_json::Value) -> bool {
        self.run(doc).is_some_and(|v| v.truthy())
    }

    /// Parse `attributes` as JSON and evaluate. Invalid JSON never matches.
    pub fn matches(&self, attributes: &str) -> bool {
        match serde_json::from_str::<serde_json::Value>(attributes) {
            Ok(doc) => self.eval(&doc),
            Err(_) => false,
        }
    }

    /// Execute the postfix program. `None` only on stack underflow, which a
    /// compiled program cannot produce; kept defensive because evaluation
    /// must never panic.
    pub(crate) fn run(&self, doc: &serde_json::Value) -> Option<Value> {
        let mut stack: Vec<Value> = Vec::with_capacity(8);
        for instr in &self.instrs {
            match instr {
                Instr::Num(n) => stack.push(Value::Num(*n)),
                Instr::Str(s) => stack.push(Value::Str(s.clone())),
                Instr::Tuple(items) => {
                    stack.push(Value::Tuple(items.iter().map(Value::from_lit).collect()))
                }
                Instr::Selector(path) => stack.push(resolve(doc, path)),
                Instr::Apply(Op::Not) => {
                    let v = stack.pop()?;
                    stack.push(Value::from_bool(!v.truthy()));
                }
                Instr::Apply(op) => {
                    let b = stack.pop()?;
                    let a = stack.pop()?;
                    stack.push(apply(*op, a, b));
                }
            }
        }
        stack.pop()
    }
}
