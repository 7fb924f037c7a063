//! The condition-expression admission language (C1).
//!
//! A condition is a boolexpr over `${VAR}` placeholders, literals, and a
//! fixed table of built-in functions. Surface syntax (`&&`, `||`, `!`, `==`,
//! `<>`, relational operators, parentheses) lowers onto that function table
//! during parsing; evaluation never sees the surface syntax again.

mod ast;
mod eval;
mod lexer;
mod parser;

pub use ast::{Node, Value};
pub use eval::{evaluate, ConditionError};
pub use parser::parse;

/// Parses and evaluates `condition` against `variables` in one call,
/// returning `true` for an empty condition (per spec: an empty/absent
/// condition always admits).
pub fn admits(condition: &str, variables: &std::collections::HashMap<String, String>) -> Result<bool, ConditionError> {
    if condition.trim().is_empty() {
        return Ok(true);
    }
    let ast = parse(condition)?;
    match evaluate(&ast, variables)? {
        Value::Bool(b) => Ok(b),
        other => Err(ConditionError::Type(format!(
            "condition must evaluate to a boolean, got {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_condition_admits() {
        let vars = HashMap::new();
        assert!(admits("", &vars).unwrap());
        assert!(admits("   ", &vars).unwrap());
    }

    #[test]
    fn simple_equality_admits() {
        let mut vars = HashMap::new();
        vars.insert("ENV".to_string(), "prod".to_string());
        assert!(admits("${ENV} == \"prod\"", &vars).unwrap());
        assert!(!admits("${ENV} == \"staging\"", &vars).unwrap());
    }

    #[test]
    fn and_or_not_short_circuit_and_compose() {
        let mut vars = HashMap::new();
        vars.insert("A".to_string(), "1".to_string());
        vars.insert("B".to_string(), "0".to_string());
        assert!(admits("${A} && !${B}", &vars).unwrap());
        assert!(admits("${A} || ${B}", &vars).unwrap());
        assert!(!admits("${A} && ${B}", &vars).unwrap());
    }
}
