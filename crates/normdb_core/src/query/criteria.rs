//! Declarative filter criteria.
//!
//! Criteria arrive as a `Value` map in the query language of the
//! store: implicit equality, per-field operator maps, `|`-prefixed OR
//! operators, and clause arrays interleaved with `"and"`/`"or"`.
//! Parsing turns that into a [`WhereNode`] tree which the query
//! pipeline evaluates per record.

use crate::error::{CoreError, CoreResult};
use crate::record::Record;
use normdb_value::Value;
use regex::RegexBuilder;
use std::cmp::Ordering;
use tracing::debug;

/// A filter operator applied to one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// Loose equality (`==`).
    Eq,
    /// Strict equality (`===`).
    EqStrict,
    /// Loose inequality (`!=`).
    Ne,
    /// Strict inequality (`!==`).
    NeStrict,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Field value is a member of the operand array (or a substring of
    /// operand text).
    In,
    /// Negation of `In`.
    NotIn,
    /// Field array/text contains the operand.
    Contains,
    /// Negation of `Contains`.
    NotContains,
    /// Field array and operand array have an empty intersection.
    IsectEmpty,
    /// Field array and operand array have a non-empty intersection.
    IsectNotEmpty,
    /// SQL-style pattern match (`%` any run, `_` one character).
    Like,
    /// Case-insensitive `Like`.
    Likei,
    /// Negation of `Like`.
    NotLike,
    /// Negation of `Likei`.
    NotLikei,
}

impl Operator {
    /// Parses an operator token, without its `|` prefix.
    fn parse(token: &str) -> Option<Self> {
        Some(match token {
            "==" => Self::Eq,
            "===" => Self::EqStrict,
            "!=" => Self::Ne,
            "!==" => Self::NeStrict,
            ">" => Self::Gt,
            ">=" => Self::Ge,
            "<" => Self::Lt,
            "<=" => Self::Le,
            "in" => Self::In,
            "notIn" => Self::NotIn,
            "contains" => Self::Contains,
            "notContains" => Self::NotContains,
            "isectEmpty" => Self::IsectEmpty,
            "isectNotEmpty" => Self::IsectNotEmpty,
            "like" => Self::Like,
            "likei" => Self::Likei,
            "notLike" => Self::NotLike,
            "notLikei" => Self::NotLikei,
            _ => return None,
        })
    }
}

/// One operator test against one field.
#[derive(Debug, Clone)]
pub struct FieldTest {
    /// Dotted field path.
    pub field: String,
    /// The operator.
    pub op: Operator,
    /// Right-hand operand.
    pub operand: Value,
    /// True when the test was written with a `|` prefix (OR-joined).
    pub or: bool,
}

/// Connective between adjacent clauses in a clause array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolJoin {
    /// Both sides must match (the default).
    And,
    /// Either side may match.
    Or,
}

/// A parsed `where` tree.
#[derive(Debug, Clone)]
pub enum WhereNode {
    /// One clause object: a set of field tests.
    Clause(Vec<FieldTest>),
    /// Composed clauses with explicit connectives.
    Group(Vec<(BoolJoin, WhereNode)>),
}

impl WhereNode {
    /// An empty clause that matches everything.
    #[must_use]
    pub fn empty() -> Self {
        WhereNode::Clause(Vec::new())
    }

    /// Parses a `where` value: a clause map, or an array of clause maps
    /// interleaved with `"and"` / `"or"`.
    pub fn parse(value: &Value) -> CoreResult<Self> {
        match value {
            Value::Map(_) => Ok(WhereNode::Clause(parse_clause(value)?)),
            Value::Array(items) => {
                let mut parts = Vec::new();
                let mut join = BoolJoin::And;
                for item in items {
                    match item {
                        Value::Text(s) if s.eq_ignore_ascii_case("and") => join = BoolJoin::And,
                        Value::Text(s) if s.eq_ignore_ascii_case("or") => join = BoolJoin::Or,
                        Value::Map(_) | Value::Array(_) => {
                            parts.push((join, WhereNode::parse(item)?));
                            join = BoolJoin::And;
                        }
                        other => {
                            return Err(CoreError::illegal_argument(format!(
                                "where clause array entries must be clause objects or \
                                 'and'/'or', got {other:?}"
                            )));
                        }
                    }
                }
                Ok(WhereNode::Group(parts))
            }
            Value::Undefined | Value::Null => Ok(WhereNode::empty()),
            other => Err(CoreError::illegal_argument(format!(
                "where must be an object or clause array, got {other:?}"
            ))),
        }
    }

    /// Evaluates the tree against a record.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            WhereNode::Clause(tests) => {
                if tests.is_empty() {
                    return true;
                }
                // AND-tests fold conjunctively, |-tests disjunctively.
                let mut keep = tests.iter().all(|t| t.or || eval_test(record, t));
                if tests.iter().any(|t| t.or) {
                    keep = keep && tests.iter().any(|t| !t.or) ||
                        tests.iter().filter(|t| t.or).any(|t| eval_test(record, t));
                }
                keep
            }
            WhereNode::Group(parts) => {
                if parts.is_empty() {
                    return true;
                }
                let mut keep = true;
                for (index, (join, node)) in parts.iter().enumerate() {
                    let hit = node.matches(record);
                    keep = if index == 0 {
                        hit
                    } else {
                        match join {
                            BoolJoin::And => keep && hit,
                            BoolJoin::Or => keep || hit,
                        }
                    };
                }
                keep
            }
        }
    }
}

/// Parses one clause map into field tests.
fn parse_clause(value: &Value) -> CoreResult<Vec<FieldTest>> {
    let Some(entries) = value.as_map() else {
        return Ok(Vec::new());
    };

    let mut tests = Vec::new();
    for (field, spec) in entries {
        match spec {
            Value::Map(ops) => {
                for (op_token, operand) in ops {
                    let (token, or) = match op_token.strip_prefix('|') {
                        Some(stripped) => (stripped, true),
                        None => (op_token.as_str(), false),
                    };
                    match Operator::parse(token) {
                        Some(op) => tests.push(FieldTest {
                            field: field.clone(),
                            op,
                            operand: operand.clone(),
                            or,
                        }),
                        None => {
                            // Unknown operators have no filtering effect.
                            debug!(
                                field = %field,
                                operator = %op_token,
                                "ignoring unknown filter operator"
                            );
                        }
                    }
                }
            }
            // Bare value: implicit loose equality.
            operand => tests.push(FieldTest {
                field: field.clone(),
                op: Operator::Eq,
                operand: operand.clone(),
                or: false,
            }),
        }
    }
    Ok(tests)
}

fn eval_test(record: &Record, test: &FieldTest) -> bool {
    let actual = record.get_path(&test.field);
    eval_op(&actual, test.op, &test.operand)
}

fn eval_op(actual: &Value, op: Operator, operand: &Value) -> bool {
    match op {
        Operator::Eq => actual.loose_eq(operand),
        Operator::Ne => !actual.loose_eq(operand),
        Operator::EqStrict => actual == operand,
        Operator::NeStrict => actual != operand,
        Operator::Gt | Operator::Ge | Operator::Lt | Operator::Le => {
            // Ordering against nothing is always false, as in the
            // source semantics (undefined > x is never true).
            if actual.is_nullish() || operand.is_nullish() {
                return false;
            }
            let ord = actual.cmp_ordered(operand);
            match op {
                Operator::Gt => ord == Ordering::Greater,
                Operator::Ge => ord != Ordering::Less,
                Operator::Lt => ord == Ordering::Less,
                Operator::Le => ord != Ordering::Greater,
                _ => unreachable!(),
            }
        }
        Operator::In => is_in(actual, operand),
        Operator::NotIn => !is_in(actual, operand),
        Operator::Contains => is_in(operand, actual),
        Operator::NotContains => !is_in(operand, actual),
        Operator::IsectEmpty => intersection_count(actual, operand) == 0,
        Operator::IsectNotEmpty => intersection_count(actual, operand) != 0,
        Operator::Like => matches_like(actual, operand, false),
        Operator::NotLike => !matches_like(actual, operand, false),
        Operator::Likei => matches_like(actual, operand, true),
        Operator::NotLikei => !matches_like(actual, operand, true),
    }
}

/// Is `needle` a member of `haystack` (array membership or substring)?
fn is_in(needle: &Value, haystack: &Value) -> bool {
    match haystack {
        Value::Array(items) => items.iter().any(|item| item == needle),
        Value::Text(text) => needle
            .as_text()
            .is_some_and(|sub| text.contains(sub)),
        _ => false,
    }
}

/// Number of shared elements between two array values.
///
/// Nullish values count as empty arrays.
fn intersection_count(left: &Value, right: &Value) -> usize {
    let empty: &[Value] = &[];
    let left_items = left.as_array().unwrap_or(empty);
    let right_items = right.as_array().unwrap_or(empty);
    left_items
        .iter()
        .filter(|item| right_items.contains(item))
        .count()
}

/// Translates a SQL-LIKE pattern and tests it against the field text.
///
/// Regex metacharacters in the literal portion are escaped before `%`
/// and `_` are mapped, so patterns like `50%_off` behave literally.
fn matches_like(actual: &Value, pattern: &Value, case_insensitive: bool) -> bool {
    let (Some(text), Some(pattern)) = (actual.as_text(), pattern.as_text()) else {
        return false;
    };

    let mut regex_source = String::with_capacity(pattern.len() + 2);
    regex_source.push('^');
    for ch in pattern.chars() {
        match ch {
            '%' => regex_source.push_str(".*"),
            '_' => regex_source.push('.'),
            other => regex_source.push_str(&regex::escape(&other.to_string())),
        }
    }
    regex_source.push('$');

    RegexBuilder::new(&regex_source)
        .case_insensitive(case_insensitive)
        .build()
        .map(|re| re.is_match(text))
        .unwrap_or(false)
}
