//! Compiled filter terms: `[field, op, operand, ...]`, including `near[]`
//! for vector similarity (spec §4.7).

use crate::error::{QueryError, Result};
use protobase_atom::{Atom, AtomTag, Value};
use std::cmp::Ordering;

/// A comparison operator usable against a scalar field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// Set membership: field's value is one of the operands.
    In,
}

/// One token of a filter expression's compiled form, `[field, op, operand, ...]`.
#[derive(Debug, Clone)]
pub enum CompileToken {
    /// The field name a term reads off each record.
    Field(String),
    /// The operator, spelled as in the filter DSL (`"=="`, `"<"`, `"in"`, `"near[]"`, ...).
    Op(String),
    /// A scalar comparison operand.
    Scalar(Value),
    /// A query vector, for `near[]`.
    Vector(Vec<f32>),
    /// A similarity threshold, for `near[]`.
    Threshold(f32),
    /// A result cap, for `near[]`.
    K(usize),
}

/// A single compiled predicate term: either a scalar comparison or a
/// vector similarity search, both reading from a named field.
#[derive(Debug, Clone)]
pub enum Term {
    /// A scalar comparison against `field`.
    Cmp {
        /// Field name read from each record.
        field: String,
        /// The comparison operator.
        op: CmpOp,
        /// The value (or, for `In`, values) compared against.
        operand: Operand,
    },
    /// A `near[]` vector similarity term.
    Near {
        /// Field name read from each record.
        field: String,
        /// The query vector.
        query: Vec<f32>,
        /// Optional minimum similarity score.
        threshold: Option<f32>,
        /// Optional result cap.
        k: Option<usize>,
    },
}

impl Term {
    /// The field this term reads.
    pub fn field(&self) -> &str {
        match self {
            Term::Cmp { field, .. } => field,
            Term::Near { field, .. } => field,
        }
    }

    /// Whether this is a `near[]` term.
    pub fn is_near(&self) -> bool {
        matches!(self, Term::Near { .. })
    }
}

/// The operand of a [`Term::Cmp`].
#[derive(Debug, Clone)]
pub enum Operand {
    /// A single scalar value, for `==`, `!=`, `<`, `<=`, `>`, `>=`.
    One(Value),
    /// A set of scalar values, for `in`.
    Many(Vec<Value>),
}

/// Deterministically stage-free content id a [`Value`] would have if it
/// were written as a bare `Value` atom — the same id `dictionary::get` and
/// hash-lookup indexes key their records under, so operands can be matched
/// against stored field values without touching the transaction.
pub fn value_atom_id(value: &Value) -> protobase_atom::AtomId {
    let mut body = Vec::new();
    value.encode(&mut body);
    Atom { tag: AtomTag::Value, body, refs: Vec::new() }.id()
}

/// Decode a stored field atom back into a [`Value`] for ordered comparison.
/// Returns `None` for atoms that aren't a plain `Value` (e.g. nested
/// collections), which can only ever satisfy `Eq`/`Ne`/`In` via identity.
pub fn decode_value(atom: &Atom) -> Option<Value> {
    if atom.tag != AtomTag::Value {
        return None;
    }
    Value::decode(&atom.body).ok().map(|(v, _)| v)
}

/// Order two scalar values where possible. Numeric types compare across
/// `I64`/`F64`; everything else compares only within its own variant.
/// Returns `None` for operand pairs with no natural order (e.g. `AtomRef`).
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::I64(x), Value::I64(y)) => x.partial_cmp(y),
        (Value::F64(x), Value::F64(y)) => x.partial_cmp(y),
        (Value::I64(x), Value::F64(y)) => (*x as f64).partial_cmp(y),
        (Value::F64(x), Value::I64(y)) => x.partial_cmp(&(*y as f64)),
        (Value::Str(x), Value::Str(y)) => x.partial_cmp(y),
        (Value::Bytes(x), Value::Bytes(y)) => x.partial_cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.partial_cmp(y),
        _ => None,
    }
}

/// Compiles a predicate term from its wire-level token form.
pub struct Expression;

impl Expression {
    /// Parse `[field, op, operand, ...]` (or `[field, "near[]", vec, threshold?, k?]`)
    /// into an opaque [`Term`].
    pub fn compile(tokens: &[CompileToken]) -> Result<Term> {
        let field = match tokens.first() {
            Some(CompileToken::Field(f)) => f.clone(),
            _ => return Err(QueryError::MalformedExpression("expected a field name as token 0".into())),
        };
        let op = match tokens.get(1) {
            Some(CompileToken::Op(o)) => o.as_str(),
            _ => return Err(QueryError::MalformedExpression("expected an operator as token 1".into())),
        };

        if op == "near[]" {
            let query = match tokens.get(2) {
                Some(CompileToken::Vector(v)) => v.clone(),
                _ => return Err(QueryError::MalformedExpression("near[] expects a query vector as token 2".into())),
            };
            let threshold = match tokens.get(3) {
                Some(CompileToken::Threshold(t)) => Some(*t),
                None => None,
                _ => return Err(QueryError::MalformedExpression("near[] token 3 must be a threshold".into())),
            };
            let k = match tokens.get(4) {
                Some(CompileToken::K(k)) => Some(*k),
                None => None,
                _ => return Err(QueryError::MalformedExpression("near[] token 4 must be a result cap".into())),
            };
            return Ok(Term::Near { field, query, threshold, k });
        }

        let cmp_op = match op {
            "==" => CmpOp::Eq,
            "!=" => CmpOp::Ne,
            "<" => CmpOp::Lt,
            "<=" => CmpOp::Le,
            ">" => CmpOp::Gt,
            ">=" => CmpOp::Ge,
            "in" => CmpOp::In,
            other => return Err(QueryError::MalformedExpression(format!("unknown operator {other:?}"))),
        };

        let operand = if cmp_op == CmpOp::In {
            let values: Vec<Value> = tokens[2..]
                .iter()
                .map(|t| match t {
                    CompileToken::Scalar(v) => Ok(v.clone()),
                    _ => Err(QueryError::MalformedExpression("in expects scalar operands from token 2 onward".into())),
                })
                .collect::<Result<_>>()?;
            if values.is_empty() {
                return Err(QueryError::MalformedExpression("in requires at least one operand".into()));
            }
            Operand::Many(values)
        } else {
            match tokens.get(2) {
                Some(CompileToken::Scalar(v)) => Operand::One(v.clone()),
                _ => return Err(QueryError::MalformedExpression("expected a scalar operand as token 2".into())),
            }
        };

        Ok(Term::Cmp { field, op: cmp_op, operand })
    }

    /// Evaluate `term` against a single record's decoded field value.
    /// Fields with no natural order (e.g. nested collections) can only
    /// satisfy `Eq`/`Ne`/`In`, matched by content id rather than value.
    pub fn matches_scalar(term_op: CmpOp, operand: &Operand, field_id: protobase_atom::AtomId, field_value: Option<&Value>) -> bool {
        let equals = |v: &Value| field_value.map(|fv| fv == v).unwrap_or_else(|| field_id == value_atom_id(v));
        match (term_op, operand) {
            (CmpOp::Eq, Operand::One(v)) => equals(v),
            (CmpOp::Ne, Operand::One(v)) => !equals(v),
            (CmpOp::In, Operand::Many(values)) => values.iter().any(|v| equals(v)),
            (CmpOp::Lt, Operand::One(v)) => matches!(field_value.and_then(|fv| compare_values(fv, v)), Some(Ordering::Less)),
            (CmpOp::Le, Operand::One(v)) => {
                matches!(field_value.and_then(|fv| compare_values(fv, v)), Some(Ordering::Less) | Some(Ordering::Equal))
            }
            (CmpOp::Gt, Operand::One(v)) => matches!(field_value.and_then(|fv| compare_values(fv, v)), Some(Ordering::Greater)),
            (CmpOp::Ge, Operand::One(v)) => {
                matches!(field_value.and_then(|fv| compare_values(fv, v)), Some(Ordering::Greater) | Some(Ordering::Equal))
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_a_simple_equality_term() {
        let term = Expression::compile(&[
            CompileToken::Field("status".into()),
            CompileToken::Op("==".into()),
            CompileToken::Scalar(Value::Str("active".into())),
        ])
        .unwrap();
        match term {
            Term::Cmp { field, op, operand: Operand::One(Value::Str(s)) } => {
                assert_eq!(field, "status");
                assert_eq!(op, CmpOp::Eq);
                assert_eq!(s, "active");
            }
            other => panic!("unexpected term: {other:?}"),
        }
    }

    #[test]
    fn compiles_a_near_term() {
        let term = Expression::compile(&[
            CompileToken::Field("embedding".into()),
            CompileToken::Op("near[]".into()),
            CompileToken::Vector(vec![0.1, 0.2, 0.3]),
            CompileToken::Threshold(0.8),
            CompileToken::K(5),
        ])
        .unwrap();
        match term {
            Term::Near { field, query, threshold, k } => {
                assert_eq!(field, "embedding");
                assert_eq!(query, vec![0.1, 0.2, 0.3]);
                assert_eq!(threshold, Some(0.8));
                assert_eq!(k, Some(5));
            }
            other => panic!("unexpected term: {other:?}"),
        }
    }

    #[test]
    fn rejects_an_unknown_operator() {
        let err = Expression::compile(&[
            CompileToken::Field("x".into()),
            CompileToken::Op("~=".into()),
            CompileToken::Scalar(Value::I64(1)),
        ])
        .unwrap_err();
        assert!(matches!(err, QueryError::MalformedExpression(_)));
    }

    #[test]
    fn numeric_ordering_compares_across_int_and_float() {
        assert_eq!(compare_values(&Value::I64(3), &Value::F64(3.5)), Some(Ordering::Less));
    }
}
