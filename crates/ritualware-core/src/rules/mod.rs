//! Condition engine for ritual automation.
//!
//! A ritual carries conditions of the form "when this trigger fires with a
//! value that compares this way, run these actions". The evaluator matches
//! triggers to conditions; the executor applies the resulting actions.

pub mod action;
pub mod condition;
pub mod engine;
pub mod executor;
pub mod log;
pub mod trigger;

pub use action::Action;
pub use condition::{Condition, Operator};
pub use engine::ConditionEvaluator;
pub use executor::{ActionEffect, ActionExecutor, ExecutionContext};
pub use log::{ActionLog, ActionResult, ExecutionStatus};
pub use trigger::{Scalar, Trigger, TriggerKind};
