use thiserror::Error;

use crate::model::ChangeError;

/// Authoring errors, raised while loading a rule set. Each names the
/// declaration at fault.
#[derive(Debug, Error, PartialEq)]
pub enum RuleError {
    #[error("{name}: {reason}")]
    Invalid { name: String, reason: String },
    #[error("{name}: no {what} called {value}")]
    Unknown {
        name: String,
        what: &'static str,
        value: String,
    },
    #[error("{0}: declared more than once")]
    Duplicate(String),
    #[error("{0}: Cannot have a trigger activate itself!")]
    SelfActivation(String),
    #[error("condition cycle: {}", .0.join(" -> "))]
    ConditionCycle(Vec<String>),
}

impl RuleError {
    pub(crate) fn invalid(name: &str, reason: impl Into<String>) -> Self {
        RuleError::Invalid {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unknown(name: &str, what: &'static str, value: &str) -> Self {
        RuleError::Unknown {
            name: name.to_string(),
            what,
            value: value.to_string(),
        }
    }
}

/// Fatal errors while evaluating or firing. Effects applied before the error
/// stay in the journal.
#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("condition {0} was read before it was tested")]
    UntestedCondition(String),
    #[error("no property called {0}")]
    UnknownProperty(String),
    #[error("no trigger called {0}")]
    UnknownTrigger(String),
    #[error("trigger activation cycle: {}", .0.join(" -> "))]
    ActivationCycle(Vec<String>),
    #[error("{name} holds an unreadable chance: {source}")]
    CorruptChance { name: String, source: RuleError },
    #[error(transparent)]
    Change(#[from] ChangeError),
}
