//! Condition node: multi-way branch over an ordered list of named
//! expressions.
//!
//! Each branch pairs a key with an `{ left, operator, right }` expression
//! whose operands are value descriptors. Evaluation stops at the first
//! branch whose expression holds; the branch key selects the outgoing
//! transition with the matching port label. No match terminates the path
//! cleanly (`next` stays `None`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Node, NodeContext};
use crate::document::ValueSource;
use crate::error::NodeError;
use crate::graph::PreparedNode;
use crate::utils::values::truthy;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
    Contains,
    NotContains,
    IsEmpty,
    IsNotEmpty,
    IsTrue,
    IsFalse,
}

impl Operator {
    fn is_numeric(self) -> bool {
        matches!(
            self,
            Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte
        )
    }

    fn is_string(self) -> bool {
        matches!(self, Operator::Contains | Operator::NotContains)
    }

    fn is_collection(self) -> bool {
        matches!(self, Operator::In | Operator::Nin)
    }
}

#[derive(Debug)]
struct Expression {
    left: Option<ValueSource>,
    operator: Option<Operator>,
    right: Option<ValueSource>,
}

#[derive(Debug)]
struct Branch {
    key: String,
    expression: Expression,
}

#[derive(Debug)]
pub struct ConditionNode {
    id: String,
    branches: Vec<Branch>,
    transitions: Vec<(String, String)>,
    next: Option<String>,
}

impl ConditionNode {
    pub fn new(record: &PreparedNode) -> Result<Self, NodeError> {
        let raw_branches = record
            .data
            .get("conditions")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                NodeError::Validation(format!("node {}: missing conditions list", record.id))
            })?;

        let mut branches = Vec::with_capacity(raw_branches.len());
        for raw in raw_branches {
            let key = raw
                .get("key")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    NodeError::Validation(format!("node {}: branch without a key", record.id))
                })?
                .to_string();
            let expression = parse_expression(&record.id, raw.get("value"))?;
            branches.push(Branch { key, expression });
        }

        Ok(Self {
            id: record.id.clone(),
            branches,
            transitions: record.transitions.clone(),
            next: None,
        })
    }

    fn evaluate(&self, ctx: &NodeContext<'_>, expression: &Expression) -> Result<bool, NodeError> {
        let left = expression
            .left
            .as_ref()
            .and_then(|source| ctx.resolve_optional(Some(source)));

        // Only the emptiness probes tolerate a missing or unresolved left
        // operand; every other form needs a value.
        match expression.operator {
            Some(Operator::IsEmpty) => return Ok(!truthy(&left.unwrap_or(Value::Null))),
            Some(Operator::IsNotEmpty) => return Ok(truthy(&left.unwrap_or(Value::Null))),
            _ => {}
        }

        let left = left.ok_or_else(|| NodeError::MissingInput {
            what: format!("left operand in condition {}", self.id),
        })?;

        let Some(operator) = expression.operator else {
            // No operator: the branch holds when the left value is truthy.
            return Ok(truthy(&left));
        };

        match operator {
            Operator::IsTrue => return Ok(truthy(&left)),
            Operator::IsFalse => return Ok(!truthy(&left)),
            _ => {}
        }

        let right = expression
            .right
            .as_ref()
            .and_then(|source| ctx.resolve_optional(Some(source)))
            .ok_or_else(|| NodeError::MissingInput {
                what: format!("right operand of `{operator:?}` in condition {}", self.id),
            })?;

        validate_operands(operator, &left, &right)?;

        Ok(match operator {
            Operator::Eq => values_equal(&left, &right),
            Operator::Neq => !values_equal(&left, &right),
            Operator::Gt => number(&left) > number(&right),
            Operator::Gte => number(&left) >= number(&right),
            Operator::Lt => number(&left) < number(&right),
            Operator::Lte => number(&left) <= number(&right),
            Operator::In => contains_member(&right, &left)?,
            Operator::Nin => !contains_member(&right, &left)?,
            Operator::Contains => string(&left).contains(string(&right)),
            Operator::NotContains => !string(&left).contains(string(&right)),
            _ => unreachable!("unary operators handled above"),
        })
    }
}

#[async_trait]
impl Node for ConditionNode {
    async fn run(&mut self, ctx: &mut NodeContext<'_>) -> Result<Value, NodeError> {
        let mut chosen: Option<String> = None;
        for branch in &self.branches {
            if self.evaluate(ctx, &branch.expression)? {
                chosen = Some(branch.key.clone());
                break;
            }
        }

        match &chosen {
            Some(key) => {
                self.next = self
                    .transitions
                    .iter()
                    .find(|(port, _)| port == key)
                    .map(|(_, target)| target.clone());
                ctx.info(format!("Choose branch: {key}"));
            }
            None => {
                self.next = None;
                ctx.warn("No branch selected");
            }
        }

        Ok(chosen.map(Value::String).unwrap_or(Value::Null))
    }

    fn next(&self) -> Option<&str> {
        self.next.as_deref()
    }
}

fn parse_expression(node_id: &str, raw: Option<&Value>) -> Result<Expression, NodeError> {
    let Some(raw) = raw else {
        return Err(NodeError::Condition {
            detail: format!("node {node_id}: branch without an expression"),
        });
    };
    let operator = match raw.get("operator") {
        None | Some(Value::Null) => None,
        Some(op) => Some(serde_json::from_value(op.clone()).map_err(|_| {
            NodeError::Condition {
                detail: format!("node {node_id}: unsupported operator {op}"),
            }
        })?),
    };
    let left = parse_operand(node_id, raw.get("left"))?;
    let right = parse_operand(node_id, raw.get("right"))?;
    Ok(Expression {
        left,
        operator,
        right,
    })
}

fn parse_operand(node_id: &str, raw: Option<&Value>) -> Result<Option<ValueSource>, NodeError> {
    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(raw) => ValueSource::from_json(raw)
            .map(Some)
            .map_err(|detail| NodeError::Condition {
                detail: format!("node {node_id}: {detail}"),
            }),
    }
}

fn validate_operands(operator: Operator, left: &Value, right: &Value) -> Result<(), NodeError> {
    if operator.is_numeric() && !(left.is_number() && right.is_number()) {
        return Err(NodeError::Condition {
            detail: format!("operator `{operator:?}` requires numeric operands"),
        });
    }
    if operator.is_string() && !(left.is_string() && right.is_string()) {
        return Err(NodeError::Condition {
            detail: format!("operator `{operator:?}` requires string operands"),
        });
    }
    if operator.is_collection()
        && !(right.is_array() || right.is_object() || right.is_string())
    {
        return Err(NodeError::Condition {
            detail: format!("operator `{operator:?}` requires an enumerable right operand"),
        });
    }
    Ok(())
}

/// Numeric equality crosses integer/float representations.
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(l), Some(r)) => l == r,
        _ => left == right,
    }
}

fn number(value: &Value) -> f64 {
    // Operand validation has already established both are numbers.
    value.as_f64().unwrap_or(f64::NAN)
}

fn string(value: &Value) -> &str {
    value.as_str().unwrap_or_default()
}

fn contains_member(container: &Value, member: &Value) -> Result<bool, NodeError> {
    match container {
        Value::Array(items) => Ok(items.iter().any(|item| values_equal(item, member))),
        Value::Object(map) => {
            let key = member.as_str().ok_or_else(|| NodeError::Condition {
                detail: "membership test against an object requires a string key".to_string(),
            })?;
            Ok(map.contains_key(key))
        }
        Value::String(haystack) => {
            let needle = member.as_str().ok_or_else(|| NodeError::Condition {
                detail: "membership test against a string requires a string operand".to_string(),
            })?;
            Ok(haystack.contains(needle))
        }
        _ => Err(NodeError::Condition {
            detail: "right operand is not enumerable".to_string(),
        }),
    }
}
