//! Outcome of evaluating a condition once.

use std::fmt;

use crate::result::DriverError;

/// Prefix of reasons produced by conditions themselves, as opposed to
/// reasons carried over from a driver error.
pub const CONDITION_MISMATCH: &str = "ConditionMismatch";

/// A negative, non-terminal evaluation result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    /// Human-readable reason
    pub reason: String,
    /// Observed value at evaluation time
    pub actual: Option<String>,
}

impl Mismatch {
    /// Create a mismatch with a verbatim reason
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            actual: None,
        }
    }

    /// Mismatch reported by a condition: `ConditionMismatch: <detail>`
    #[must_use]
    pub fn condition(detail: impl fmt::Display) -> Self {
        Self::new(format!("{CONDITION_MISMATCH}: {detail}"))
    }

    /// Mismatch describing an observed value: `ConditionMismatch: actual <name>: <value>`
    #[must_use]
    pub fn actual(name: &str, value: impl fmt::Display) -> Self {
        let value = value.to_string();
        Self {
            reason: format!("{CONDITION_MISMATCH}: actual {name}: {value}"),
            actual: Some(value),
        }
    }

    /// Mismatch caused by a recoverable driver error
    #[must_use]
    pub fn from_driver(error: &DriverError) -> Self {
        Self::new(error.to_string())
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

/// Result of one condition evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Condition holds
    Matched,
    /// Condition does not hold (yet)
    Mismatched(Mismatch),
}

impl Outcome {
    /// Build an outcome from a boolean and a lazily built mismatch
    pub fn from_bool(holds: bool, mismatch: impl FnOnce() -> Mismatch) -> Self {
        if holds {
            Self::Matched
        } else {
            Self::Mismatched(mismatch())
        }
    }

    /// Check if the condition held
    #[must_use]
    pub const fn is_matched(&self) -> bool {
        matches!(self, Self::Matched)
    }

    /// Check if the condition did not hold
    #[must_use]
    pub const fn is_mismatched(&self) -> bool {
        matches!(self, Self::Mismatched(_))
    }

    /// Get the mismatch, if any
    #[must_use]
    pub const fn mismatch(&self) -> Option<&Mismatch> {
        match self {
            Self::Matched => None,
            Self::Mismatched(mismatch) => Some(mismatch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actual_mismatch_reason() {
        let mismatch = Mismatch::actual("size", 2);
        assert_eq!(mismatch.reason, "ConditionMismatch: actual size: 2");
        assert_eq!(mismatch.actual.as_deref(), Some("2"));
    }

    #[test]
    fn test_actual_keeps_whitespace() {
        let mismatch = Mismatch::actual("value", " One  !!!");
        assert_eq!(mismatch.reason, "ConditionMismatch: actual value:  One  !!!");
    }

    #[test]
    fn test_driver_mismatch_uses_error_text() {
        let mismatch = Mismatch::from_driver(&DriverError::command("boom"));
        assert_eq!(mismatch.reason, "WebDriverException: boom");
        assert!(mismatch.actual.is_none());
    }

    #[test]
    fn test_from_bool() {
        assert!(Outcome::from_bool(true, || Mismatch::new("unused")).is_matched());
        let outcome = Outcome::from_bool(false, || Mismatch::condition("nope"));
        assert!(outcome.is_mismatched());
        assert_eq!(outcome.mismatch().unwrap().reason, "ConditionMismatch: nope");
    }
}
