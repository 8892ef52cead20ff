//! Result and error types for Esperar.
//!
//! Two layers of failure exist. [`DriverError`] is what the driver handle
//! reports on a single call; most of its variants are recoverable and never
//! leave the wait loop. [`EsperarError`] is what callers see: a terminal
//! [`TimeoutFailure`], an unusable session, or a configuration problem.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::diagnostics;

/// Result type for Esperar operations
pub type EsperarResult<T> = Result<T, EsperarError>;

/// Result type for a single driver call
pub type DriverResult<T> = Result<T, DriverError>;

/// Errors reported by the driver handle
#[derive(Debug, Error)]
pub enum DriverError {
    /// Locator currently matches nothing
    #[error("NoSuchElementException: no such element: Unable to locate element: {selector}")]
    NoSuchElement {
        /// JSON rendering of the selector that failed
        selector: String,
    },

    /// Indexed access past the end of a collection
    #[error(
        "IndexError: cannot get element with index {index} \
         from webelements collection with length {length}"
    )]
    IndexOutOfRange {
        /// Requested index
        index: isize,
        /// Actual collection length
        length: usize,
    },

    /// No collection item satisfied a filtering condition
    #[error("ConditionMismatch: cannot find element by condition «{condition}» from {collection}")]
    NoElementMatching {
        /// Description of the filtering condition
        condition: String,
        /// Description of the collection that was searched
        collection: String,
    },

    /// Element reference no longer attached to the document
    #[error("StaleElementReferenceException: {message}")]
    StaleElement {
        /// Error message
        message: String,
    },

    /// Driver command failed but the session is still usable
    #[error("WebDriverException: {message}")]
    Command {
        /// Error message
        message: String,
    },

    /// Session is terminated or otherwise unusable
    #[error("InvalidSessionIdException: {message}")]
    Session {
        /// Error message
        message: String,
    },

    /// I/O error while talking to the driver or writing artifacts
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DriverError {
    /// Create a command error
    #[must_use]
    pub fn command(message: impl Into<String>) -> Self {
        Self::Command {
            message: message.into(),
        }
    }

    /// Create a session error
    #[must_use]
    pub fn session(message: impl Into<String>) -> Self {
        Self::Session {
            message: message.into(),
        }
    }

    /// Whether the wait loop may treat this error as a mismatch and retry
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Session { .. })
    }
}

/// Terminal failure: the deadline passed while the last outcome was a mismatch.
///
/// `Display` renders the full diagnostic message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutFailure {
    /// Entity description, e.g. `browser.element(('css selector', '#x'))`
    pub entity: String,
    /// Condition description, e.g. `has size 0`
    pub condition: String,
    /// Last mismatch reason
    pub reason: String,
    /// Last observed actual value, if the condition reported one
    pub actual: Option<String>,
    /// Timeout that elapsed
    pub timeout: Duration,
    /// Number of resolve/evaluate cycles performed
    pub attempts: usize,
    /// Dump of the live entity (outer HTML), when enabled
    pub actual_entity: Option<String>,
    /// Saved screenshot
    pub screenshot: Option<PathBuf>,
    /// Saved page source
    pub page_source: Option<PathBuf>,
}

impl TimeoutFailure {
    /// Create a failure without diagnostic artifacts
    #[must_use]
    pub fn new(
        entity: impl Into<String>,
        condition: impl Into<String>,
        reason: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            entity: entity.into(),
            condition: condition.into(),
            reason: reason.into(),
            actual: None,
            timeout,
            attempts: 0,
            actual_entity: None,
            screenshot: None,
            page_source: None,
        }
    }

    /// The `<entity>.<condition>` block of the message, with reason and artifacts
    #[must_use]
    pub fn message(&self) -> String {
        let reason = match &self.actual_entity {
            Some(dump) => format!("{}\n{dump}", self.reason),
            None => self.reason.clone(),
        };
        diagnostics::render(
            &self.entity,
            &self.condition,
            &reason,
            self.screenshot.as_deref(),
            self.page_source.as_deref(),
        )
    }
}

impl fmt::Display for TimeoutFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Timed out after {}s, while waiting for:\n{}",
            self.timeout.as_secs_f64(),
            self.message()
        )
    }
}

/// Errors that can surface from Esperar
#[derive(Debug, Error)]
pub enum EsperarError {
    /// Condition never held within the timeout
    #[error("{0}")]
    Timeout(TimeoutFailure),

    /// Unrecoverable driver failure, propagated without retrying
    #[error("{0}")]
    Driver(#[from] DriverError),

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Invalid text pattern in a condition
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// Error substituted by a failure hook
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl EsperarError {
    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Wrap an arbitrary error, typically from a failure hook
    #[must_use]
    pub fn other(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Other(Box::new(error))
    }

    /// Get the timeout failure, if this is one
    #[must_use]
    pub const fn as_timeout(&self) -> Option<&TimeoutFailure> {
        match self {
            Self::Timeout(failure) => Some(failure),
            _ => None,
        }
    }

    /// Whether the session behind the driver is unusable
    #[must_use]
    pub const fn is_session_error(&self) -> bool {
        matches!(self, Self::Driver(DriverError::Session { .. }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    mod driver_error_tests {
        use super::*;

        #[test]
        fn test_session_error_is_not_recoverable() {
            assert!(!DriverError::session("gone").is_recoverable());
        }

        #[test]
        fn test_lookup_errors_are_recoverable() {
            let not_found = DriverError::NoSuchElement {
                selector: "{}".into(),
            };
            assert!(not_found.is_recoverable());
            assert!(DriverError::command("js failed").is_recoverable());
            assert!(DriverError::IndexOutOfRange {
                index: 3,
                length: 1
            }
            .is_recoverable());
        }

        #[test]
        fn test_no_such_element_message() {
            let err = DriverError::NoSuchElement {
                selector: r#"{"method":"css selector","selector":"li#absent"}"#.into(),
            };
            assert_eq!(
                err.to_string(),
                "NoSuchElementException: no such element: Unable to locate element: \
                 {\"method\":\"css selector\",\"selector\":\"li#absent\"}"
            );
        }
    }

    mod timeout_failure_tests {
        use super::*;

        #[test]
        fn test_display_has_header_and_block() {
            let failure = TimeoutFailure::new(
                "browser.all(('css selector', '#hidden'))",
                "has size 0",
                "ConditionMismatch: actual size: 2",
                Duration::from_millis(100),
            );
            let text = failure.to_string();
            assert!(text.starts_with("Timed out after 0.1s, while waiting for:\n"));
            assert!(text.contains(
                "browser.all(('css selector', '#hidden')).has size 0\n\
                 \n\
                 Reason: ConditionMismatch: actual size: 2\n"
            ));
        }

        #[test]
        fn test_actual_entity_follows_reason() {
            let mut failure = TimeoutFailure::new("e", "is visible", "r", Duration::ZERO);
            failure.actual_entity = Some("Actual webelement: <li></li>".into());
            assert!(failure
                .message()
                .contains("Reason: r\nActual webelement: <li></li>\n"));
        }
    }

    mod esperar_error_tests {
        use super::*;

        #[test]
        fn test_session_error_detection() {
            let err = EsperarError::from(DriverError::session("crashed"));
            assert!(err.is_session_error());
            assert!(err.as_timeout().is_none());
        }

        #[test]
        fn test_timeout_accessor() {
            let err = EsperarError::Timeout(TimeoutFailure::new("e", "c", "r", Duration::ZERO));
            assert_eq!(err.as_timeout().unwrap().condition, "c");
            assert!(!err.is_session_error());
        }

        #[test]
        fn test_config_error_message() {
            let err = EsperarError::config("bad timeout");
            assert_eq!(err.to_string(), "Configuration error: bad timeout");
        }
    }
}
