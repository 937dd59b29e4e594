//! Condition definition for the condition engine.
//!
//! A condition is a declarative rule `(trigger, operator, comparand) -> actions`
//! owned by exactly one ritual.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Action, Scalar, TriggerKind};
use crate::error::{ConditionError, ValidationError};

/// Comparison applied between a trigger value (left) and a comparand (right).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Operator {
    Eq,
    Neq,
    Gt,
    Lt,
    Gte,
    Lte,
    /// Anything unrecognised; never matches and is rejected at creation.
    Unknown(String),
}

impl Operator {
    pub fn as_str(&self) -> &str {
        match self {
            Operator::Eq => "==",
            Operator::Neq => "!=",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Gte => ">=",
            Operator::Lte => "<=",
            Operator::Unknown(raw) => raw,
        }
    }

    pub fn is_ordinal(&self) -> bool {
        matches!(self, Operator::Gt | Operator::Lt | Operator::Gte | Operator::Lte)
    }

    /// Apply the operator to `(lhs, rhs)`.
    ///
    /// Operands must be of the same kind; ordinal operators only accept
    /// numbers. Nothing is coerced.
    pub fn test(&self, lhs: &Scalar, rhs: &Scalar) -> Result<bool, ConditionError> {
        let incomparable = || ConditionError::Incomparable {
            operator: self.clone(),
            lhs: lhs.clone(),
            rhs: rhs.clone(),
        };

        match self {
            Operator::Unknown(raw) => Err(ConditionError::UnknownOperator(raw.clone())),
            Operator::Eq | Operator::Neq => {
                let equal = match (lhs, rhs) {
                    (Scalar::Number(a), Scalar::Number(b)) => a == b,
                    (Scalar::Text(a), Scalar::Text(b)) => a == b,
                    (Scalar::Flag(a), Scalar::Flag(b)) => a == b,
                    _ => return Err(incomparable()),
                };
                Ok(if *self == Operator::Eq { equal } else { !equal })
            }
            _ => {
                let (Scalar::Number(a), Scalar::Number(b)) = (lhs, rhs) else {
                    return Err(incomparable());
                };
                Ok(match self {
                    Operator::Gt => a > b,
                    Operator::Lt => a < b,
                    Operator::Gte => a >= b,
                    _ => a <= b,
                })
            }
        }
    }
}

impl From<String> for Operator {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "==" | "eq" => Operator::Eq,
            "!=" | "neq" => Operator::Neq,
            ">" | "gt" => Operator::Gt,
            "<" | "lt" => Operator::Lt,
            ">=" | "gte" => Operator::Gte,
            "<=" | "lte" => Operator::Lte,
            _ => Operator::Unknown(raw),
        }
    }
}

impl From<Operator> for String {
    fn from(op: Operator) -> Self {
        op.as_str().to_string()
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A declarative rule attached to a ritual.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Trigger this condition listens for
    pub trigger: TriggerKind,

    pub operator: Operator,

    /// Right-hand side of the comparison
    pub comparand: Scalar,

    /// Actions contributed when the test passes, in order
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Condition {
    /// Whether this condition is considered for `kind` at all.
    pub fn listens_for(&self, kind: &TriggerKind) -> bool {
        self.trigger == *kind
    }

    /// Test a trigger value against this condition.
    pub fn test(&self, trigger_value: &Scalar) -> Result<bool, ConditionError> {
        self.operator.test(trigger_value, &self.comparand)
    }

    /// Creation-time check. `index` is the condition's position in the
    /// ritual and `task_count` the number of tasks it governs.
    pub fn validate(&self, index: usize, task_count: usize) -> Result<(), ValidationError> {
        let reject = |message: String| ValidationError::InvalidCondition { index, message };

        if let Operator::Unknown(raw) = &self.operator {
            return Err(reject(format!("unknown operator '{raw}'")));
        }

        let expected = match &self.trigger {
            TriggerKind::Completion | TriggerKind::Streak => "number",
            TriggerKind::Mood => "text",
            TriggerKind::RitualCompletion => "boolean",
            TriggerKind::Other(raw) => return Err(reject(format!("unknown trigger '{raw}'"))),
        };
        if self.comparand.kind_name() != expected {
            return Err(reject(format!(
                "{} trigger needs a {expected} comparand, got {}",
                self.trigger,
                self.comparand.kind_name()
            )));
        }
        if self.operator.is_ordinal() && expected != "number" {
            return Err(reject(format!(
                "operator '{}' is not defined for {expected} values",
                self.operator
            )));
        }
        if let Scalar::Number(n) = self.comparand {
            if n < 0 {
                return Err(reject(format!("comparand {n} must not be negative")));
            }
        }
        if self.actions.is_empty() {
            return Err(reject("condition has no actions".into()));
        }

        for action in &self.actions {
            match action {
                Action::Reward { amount } | Action::Penalty { amount } if *amount == 0 => {
                    return Err(reject(format!("{} amount must be positive", action.type_name())));
                }
                Action::Reward { amount } | Action::Penalty { amount }
                    if i64::try_from(*amount).is_err() =>
                {
                    return Err(reject(format!("{} amount {amount} is too large", action.type_name())));
                }
                Action::UnlockTask { task_index } if *task_index >= task_count => {
                    return Err(reject(format!(
                        "unlock_task refers to task {task_index} but the ritual has {task_count}"
                    )));
                }
                Action::Notify { message } if message.trim().is_empty() => {
                    return Err(reject("notify message is empty".into()));
                }
                _ => {}
            }
        }

        Ok(())
    }
}
