//! Conditions: named, immutable predicates over an entity.
//!
//! A [`Condition<E>`] is data. The same type serves single elements,
//! collections and the browser itself; only the entity type `E` changes.
//! Evaluation resolves the entity fresh, so a condition never caches what
//! it saw on a previous attempt.
//!
//! Negation inverts the truth value but keeps the description honest:
//! `is visible` negated twice renders as `is not (not (visible))`, never as
//! the original text.

use std::fmt;
use std::sync::Arc;

use crate::outcome::{Mismatch, Outcome, CONDITION_MISMATCH};
use crate::result::DriverResult;

/// Used when a caller supplies a blank description.
const FALLBACK_DESCRIPTION: &str = "satisfies condition";

/// What a condition saw on one evaluation, before negation is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    /// Whether the underlying predicate held
    pub holds: bool,
    /// Reason to report if the (possibly negated) condition fails
    pub reason: Option<String>,
    /// Observed value
    pub actual: Option<String>,
}

impl Observation {
    /// Observation carrying only a truth value
    #[must_use]
    pub const fn bare(holds: bool) -> Self {
        Self {
            holds,
            reason: None,
            actual: None,
        }
    }

    /// Observation of a named actual value
    #[must_use]
    pub fn of_actual(holds: bool, name: &str, value: impl fmt::Display) -> Self {
        let mismatch = Mismatch::actual(name, value);
        Self {
            holds,
            reason: Some(mismatch.reason),
            actual: mismatch.actual,
        }
    }

    fn inverted(self) -> Self {
        Self {
            holds: !self.holds,
            ..self
        }
    }

    fn into_outcome(self) -> Outcome {
        if self.holds {
            Outcome::Matched
        } else {
            Outcome::Mismatched(Mismatch {
                reason: self
                    .reason
                    .unwrap_or_else(|| CONDITION_MISMATCH.to_string()),
                actual: self.actual,
            })
        }
    }
}

impl From<Outcome> for Observation {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Matched => Self::bare(true),
            Outcome::Mismatched(mismatch) => Self {
                holds: false,
                reason: Some(mismatch.reason),
                actual: mismatch.actual,
            },
        }
    }
}

type Probe<E> = Arc<dyn Fn(&E) -> DriverResult<Observation> + Send + Sync>;

/// A named predicate over an entity of type `E`.
pub struct Condition<E> {
    description: String,
    inverted_description: Option<String>,
    probe: Probe<E>,
}

impl<E> Clone for Condition<E> {
    fn clone(&self) -> Self {
        Self {
            description: self.description.clone(),
            inverted_description: self.inverted_description.clone(),
            probe: Arc::clone(&self.probe),
        }
    }
}

impl<E> fmt::Debug for Condition<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("description", &self.description)
            .field("inverted_description", &self.inverted_description)
            .finish_non_exhaustive()
    }
}

impl<E> fmt::Display for Condition<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

impl<E: 'static> Condition<E> {
    /// Create a condition from a full observation probe
    pub fn new<F>(description: impl Into<String>, probe: F) -> Self
    where
        F: Fn(&E) -> DriverResult<Observation> + Send + Sync + 'static,
    {
        let description = description.into();
        let description = if description.trim().is_empty() {
            FALLBACK_DESCRIPTION.to_string()
        } else {
            description
        };
        Self {
            description,
            inverted_description: None,
            probe: Arc::new(probe),
        }
    }

    /// Create a condition from a plain predicate
    pub fn by<F>(description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&E) -> DriverResult<bool> + Send + Sync + 'static,
    {
        Self::new(description, move |entity| {
            predicate(entity).map(Observation::bare)
        })
    }

    /// Create a condition from a function that reports its own outcome
    pub fn from_fn<F>(description: impl Into<String>, test: F) -> Self
    where
        F: Fn(&E) -> DriverResult<Outcome> + Send + Sync + 'static,
    {
        Self::new(description, move |entity| test(entity).map(Observation::from))
    }

    /// Create a condition that compares an observed value.
    ///
    /// Mismatches read `ConditionMismatch: actual <name>: <value>`, for both
    /// the condition and its negation.
    pub fn matching<A, Q, P>(
        description: impl Into<String>,
        actual_name: impl Into<String>,
        actual: Q,
        by: P,
    ) -> Self
    where
        A: fmt::Display,
        Q: Fn(&E) -> DriverResult<A> + Send + Sync + 'static,
        P: Fn(&A) -> bool + Send + Sync + 'static,
    {
        let actual_name = actual_name.into();
        Self::new(description, move |entity| {
            let value = actual(entity)?;
            Ok(Observation::of_actual(by(&value), &actual_name, value))
        })
    }

    /// Set the description used when this condition is negated
    #[must_use]
    pub fn with_inverted_description(mut self, description: impl Into<String>) -> Self {
        self.inverted_description = Some(description.into());
        self
    }

    /// Human-readable description
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Evaluate against the entity once.
    ///
    /// Recoverable driver errors become a [`Outcome::Mismatched`]; only
    /// unrecoverable ones are returned as `Err`.
    pub fn evaluate(&self, entity: &E) -> DriverResult<Outcome> {
        match (self.probe)(entity) {
            Ok(observation) => Ok(observation.into_outcome()),
            Err(error) if error.is_recoverable() => {
                Ok(Outcome::Mismatched(Mismatch::from_driver(&error)))
            }
            Err(error) => Err(error),
        }
    }

    /// Condition with inverted truth and adjusted description.
    ///
    /// A recoverable driver error counts as "the original does not hold",
    /// so the negation passes on it: `present().negate()` holds for an
    /// element that cannot be found.
    #[must_use]
    pub fn negate(&self) -> Self {
        let description = self
            .inverted_description
            .clone()
            .unwrap_or_else(|| invert_description(&self.description));
        let inner = Arc::clone(&self.probe);
        Self {
            description,
            inverted_description: None,
            probe: Arc::new(move |entity: &E| match inner(entity) {
                Ok(observation) => Ok(observation.inverted()),
                Err(error) if error.is_recoverable() => Ok(Observation {
                    holds: true,
                    reason: Some(error.to_string()),
                    actual: None,
                }),
                Err(error) => Err(error),
            }),
        }
    }
}

impl<E: 'static> std::ops::Not for Condition<E> {
    type Output = Self;

    fn not(self) -> Self {
        self.negate()
    }
}

/// `is X` -> `is not (X)`, `has X` -> `has no (X)`, otherwise `not (X)`
fn invert_description(description: &str) -> String {
    if let Some(rest) = description.strip_prefix("is ") {
        format!("is not ({rest})")
    } else if let Some(rest) = description.strip_prefix("has ") {
        format!("has no ({rest})")
    } else {
        format!("not ({description})")
    }
}
