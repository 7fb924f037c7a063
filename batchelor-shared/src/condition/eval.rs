//! Evaluator for the condition language's function table, grounded in the
//! original `Compiler.cpp`'s `callFunction`/`toBool`/`toNumber`/`toString`
//! coercion chains.

use std::collections::HashMap;

use thiserror::Error;

use super::ast::{Node, Value};

#[derive(Debug, Error, PartialEq)]
pub enum ConditionError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("unknown variable '{0}'")]
    UnknownVariable(String),

    #[error("division by zero")]
    DivByZero,

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("function '{name}' expects {expected} argument(s), got {actual}")]
    Arity {
        name: String,
        expected: usize,
        actual: usize,
    },
}

const BOOL_TOLERANCE: f64 = 1e-9;

pub fn evaluate(node: &Node, variables: &HashMap<String, String>) -> Result<Value, ConditionError> {
    match node {
        Node::Literal(value) => Ok(value.clone()),
        Node::Variable(name) => variables
            .get(name)
            .map(|v| Value::String(v.clone()))
            .ok_or_else(|| ConditionError::UnknownVariable(name.clone())),
        Node::Function(name, args) => call_function(name, args, variables),
    }
}

fn call_function(name: &str, args: &[Node], variables: &HashMap<String, String>) -> Result<Value, ConditionError> {
    // AND/OR short-circuit: the second operand is only evaluated if needed.
    match name {
        "AND" => {
            expect_arity(name, args, 2)?;
            let left = to_bool(&evaluate(&args[0], variables)?)?;
            if !left {
                return Ok(Value::Bool(false));
            }
            let right = to_bool(&evaluate(&args[1], variables)?)?;
            return Ok(Value::Bool(right));
        }
        "OR" => {
            expect_arity(name, args, 2)?;
            let left = to_bool(&evaluate(&args[0], variables)?)?;
            if left {
                return Ok(Value::Bool(true));
            }
            let right = to_bool(&evaluate(&args[1], variables)?)?;
            return Ok(Value::Bool(right));
        }
        _ => {}
    }

    let values: Vec<Value> = args
        .iter()
        .map(|arg| evaluate(arg, variables))
        .collect::<Result<_, _>>()?;

    match name {
        "NOT" => {
            expect_arity(name, &values, 1)?;
            Ok(Value::Bool(!to_bool(&values[0])?))
        }
        "ADD_NUM" => binary_num(name, &values, |a, b| Ok(Value::Number(a + b))),
        "SUB" => binary_num(name, &values, |a, b| Ok(Value::Number(a - b))),
        "MUL" => binary_num(name, &values, |a, b| Ok(Value::Number(a * b))),
        "DIV" => binary_num(name, &values, |a, b| {
            if b == 0.0 {
                Err(ConditionError::DivByZero)
            } else {
                Ok(Value::Number(a / b))
            }
        }),
        "EQ_NUM" => binary_num(name, &values, |a, b| Ok(Value::Bool(a == b))),
        "NE_NUM" => binary_num(name, &values, |a, b| Ok(Value::Bool(a != b))),
        "LT" => binary_num(name, &values, |a, b| Ok(Value::Bool(a < b))),
        "LE" => binary_num(name, &values, |a, b| Ok(Value::Bool(a <= b))),
        "GT" => binary_num(name, &values, |a, b| Ok(Value::Bool(a > b))),
        "GE" => binary_num(name, &values, |a, b| Ok(Value::Bool(a >= b))),
        "ADD_STR" => binary_str(name, &values, |a, b| Ok(Value::String(format!("{a}{b}")))),
        "EQ_STR" => binary_str(name, &values, |a, b| Ok(Value::Bool(a == b))),
        "NE_STR" => binary_str(name, &values, |a, b| Ok(Value::Bool(a != b))),
        "EQ_BOOL" => binary_bool(name, &values, |a, b| Ok(Value::Bool(a == b))),
        "NE_BOOL" => binary_bool(name, &values, |a, b| Ok(Value::Bool(a != b))),
        other => Err(ConditionError::UnknownFunction(other.to_string())),
    }
}

fn expect_arity<T>(name: &str, args: &[T], expected: usize) -> Result<(), ConditionError> {
    if args.len() != expected {
        Err(ConditionError::Arity {
            name: name.to_string(),
            expected,
            actual: args.len(),
        })
    } else {
        Ok(())
    }
}

fn binary_num(
    name: &str,
    values: &[Value],
    f: impl Fn(f64, f64) -> Result<Value, ConditionError>,
) -> Result<Value, ConditionError> {
    expect_arity(name, values, 2)?;
    let a = to_number(&values[0])?;
    let b = to_number(&values[1])?;
    f(a, b)
}

fn binary_str(
    name: &str,
    values: &[Value],
    f: impl Fn(String, String) -> Result<Value, ConditionError>,
) -> Result<Value, ConditionError> {
    expect_arity(name, values, 2)?;
    let a = to_string_value(&values[0])?;
    let b = to_string_value(&values[1])?;
    f(a, b)
}

fn binary_bool(
    name: &str,
    values: &[Value],
    f: impl Fn(bool, bool) -> Result<Value, ConditionError>,
) -> Result<Value, ConditionError> {
    expect_arity(name, values, 2)?;
    let a = to_bool(&values[0])?;
    let b = to_bool(&values[1])?;
    f(a, b)
}

/// String coercion: `"true"`/`"1"` -> true, `"false"`/`"0"`/`""` -> false,
/// anything else is a type error. Numbers coerce within `BOOL_TOLERANCE` of
/// 0.0 or 1.0; anything else is a type error.
pub fn to_bool(value: &Value) -> Result<bool, ConditionError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) => match s.as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" | "" => Ok(false),
            other => Err(ConditionError::Type(format!("cannot coerce string '{other}' to bool"))),
        },
        Value::Number(n) => {
            if (n - 0.0).abs() < BOOL_TOLERANCE {
                Ok(false)
            } else if (n - 1.0).abs() < BOOL_TOLERANCE {
                Ok(true)
            } else {
                Err(ConditionError::Type(format!("cannot coerce number {n} to bool")))
            }
        }
    }
}

pub fn to_number(value: &Value) -> Result<f64, ConditionError> {
    match value {
        Value::Number(n) => Ok(*n),
        Value::String(s) => s
            .parse::<f64>()
            .map_err(|_| ConditionError::Type(format!("cannot coerce string '{s}' to number"))),
        Value::Bool(b) => Err(ConditionError::Type(format!("cannot coerce bool {b} to number"))),
    }
}

pub fn to_string_value(value: &Value) -> Result<String, ConditionError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(format_number(*n)),
        Value::Bool(b) => Ok(b.to_string()),
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}
