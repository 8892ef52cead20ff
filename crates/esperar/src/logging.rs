//! Structured logging for waits
//!
//! The crate emits `tracing` events on its own (driver builds, artifact
//! capture failures). [`init_tracing`] installs a subscriber for callers
//! that have none, and [`log_attempts`] is a ready-made [`WaitDecorator`]
//! that opens one span per attempt.

use std::sync::{Arc, OnceLock};

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use crate::outcome::Outcome;
use crate::result::DriverResult;
use crate::wait::{AttemptContext, WaitDecorator};

static INIT: OnceLock<()> = OnceLock::new();

/// Output format of the installed subscriber
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Install a global subscriber.
///
/// `RUST_LOG` takes precedence over `level`. Only the first call in a
/// process has an effect; later calls, or a subscriber installed by the
/// host, are left alone.
pub fn init_tracing(level: &str, format: LogFormat) {
    INIT.get_or_init(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        let registry = Registry::default().with(filter);
        let _ = match format {
            LogFormat::Text => tracing::subscriber::set_global_default(
                registry.with(fmt::layer().with_ansi(false).with_target(false)),
            ),
            LogFormat::Json => tracing::subscriber::set_global_default(
                registry.with(fmt::layer().json().with_target(false)),
            ),
        };
    });
}

/// Decorator that traces every attempt inside a `wait` span
#[must_use]
pub fn log_attempts() -> WaitDecorator {
    Arc::new(
        |context: &AttemptContext<'_>, run: &mut dyn FnMut() -> DriverResult<Outcome>| {
            let span = tracing::info_span!(
                "wait",
                entity = %context.entity,
                condition = %context.condition,
                attempt = context.attempt,
            );
            let _entered = span.enter();
            let outcome = run();
            match &outcome {
                Ok(Outcome::Matched) => tracing::debug!("matched"),
                Ok(Outcome::Mismatched(mismatch)) => {
                    tracing::debug!(reason = %mismatch.reason, "mismatched");
                }
                Err(error) => tracing::debug!(%error, "driver error"),
            }
            outcome
        },
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::condition::Condition;
    use crate::wait::Wait;
    use std::time::Duration;

    #[test]
    fn test_init_tracing_is_repeatable() {
        init_tracing("debug", LogFormat::Text);
        init_tracing("info", LogFormat::Json);
        tracing::info!("after init");
    }

    #[test]
    fn test_log_attempts_passes_outcome_through() {
        let condition = Condition::<String>::by("is long", |text| Ok(text.len() > 3));
        let result = Wait::new("abcd".to_string(), Duration::ZERO)
            .with_decorator(Some(log_attempts()))
            .for_(&condition)
            .unwrap();
        assert_eq!(result.attempts, 1);

        let error = Wait::new("ab".to_string(), Duration::ZERO)
            .with_decorator(Some(log_attempts()))
            .for_(&condition)
            .unwrap_err();
        assert!(error.as_timeout().is_some());
    }
}
