//! Wait/retry engine
//!
//! Polls a [`Condition`] against an entity on the caller's thread until it
//! holds or the deadline passes.
//!
//! ```text
//! deadline = now + timeout
//! loop {
//!     outcome = decorator(|| condition.evaluate(entity))   // resolves fresh
//!     Matched                      -> Ok(WaitResult)
//!     Mismatched && now >= deadline -> failure hook(TimeoutFailure) -> Err
//!     Mismatched                   -> sleep(poll_interval)
//!     Err(session)                 -> Err, no retry, no hook
//! }
//! ```
//!
//! A timeout of zero evaluates exactly once.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::condition::Condition;
use crate::outcome::{Mismatch, Outcome};
use crate::result::{DriverResult, EsperarError, EsperarResult, TimeoutFailure};

/// Default timeout for waits (4 seconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 4_000;

/// Default polling interval (100ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// What a decorator knows about the attempt it wraps
#[derive(Debug, Clone, Copy)]
pub struct AttemptContext<'a> {
    /// Entity description
    pub entity: &'a str,
    /// Condition description
    pub condition: &'a str,
    /// 1-based attempt number
    pub attempt: usize,
}

/// Wraps every attempt; must call `run` to perform the evaluation
pub type WaitDecorator = Arc<
    dyn Fn(&AttemptContext<'_>, &mut dyn FnMut() -> DriverResult<Outcome>) -> DriverResult<Outcome>
        + Send
        + Sync,
>;

/// Maps the terminal error before it is returned.
///
/// May enrich or substitute the error; whatever it returns is still
/// terminal.
pub type FailureHook = Arc<dyn Fn(EsperarError) -> EsperarError + Send + Sync>;

/// Result of a successful wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitResult {
    /// Number of resolve/evaluate cycles performed
    pub attempts: usize,
    /// Time spent waiting
    pub elapsed: Duration,
    /// `<entity>.<condition>`
    pub waited_for: String,
}

enum Polled {
    Matched(WaitResult),
    TimedOut(Box<TimeoutFailure>),
}

/// Retry loop bound to one entity
#[derive(Clone)]
pub struct Wait<E> {
    entity: E,
    timeout: Duration,
    poll_interval: Duration,
    hook: Option<FailureHook>,
    decorator: Option<WaitDecorator>,
}

impl<E: fmt::Debug> fmt::Debug for Wait<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wait")
            .field("entity", &self.entity)
            .field("timeout", &self.timeout)
            .field("poll_interval", &self.poll_interval)
            .field("hook", &self.hook.is_some())
            .field("decorator", &self.decorator.is_some())
            .finish()
    }
}

impl<E: fmt::Display + 'static> Wait<E> {
    /// Create a wait with the default poll interval, no hook and no decorator
    #[must_use]
    pub fn new(entity: E, timeout: Duration) -> Self {
        Self {
            entity,
            timeout,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            hook: None,
            decorator: None,
        }
    }

    /// Entity being waited on
    #[must_use]
    pub const fn entity(&self) -> &E {
        &self.entity
    }

    /// Timeout
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Poll interval
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Same wait with another timeout
    #[must_use]
    pub fn at_most(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set polling interval
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Replace the failure hook
    #[must_use]
    pub fn or_fail_with(mut self, hook: Option<FailureHook>) -> Self {
        self.hook = hook;
        self
    }

    /// Replace the attempt decorator
    #[must_use]
    pub fn with_decorator(mut self, decorator: Option<WaitDecorator>) -> Self {
        self.decorator = decorator;
        self
    }

    /// Wait until `condition` holds.
    ///
    /// # Errors
    ///
    /// [`EsperarError::Timeout`] (after the failure hook) when the deadline
    /// passes on a mismatch, or the driver error when the session is
    /// unusable.
    pub fn for_(&self, condition: &Condition<E>) -> EsperarResult<WaitResult> {
        match self.poll(condition)? {
            Polled::Matched(result) => Ok(result),
            Polled::TimedOut(failure) => {
                let error = EsperarError::Timeout(*failure);
                Err(match &self.hook {
                    Some(hook) => hook(error),
                    None => error,
                })
            }
        }
    }

    /// Like [`Wait::for_`] but reports a timeout as `Ok(false)`.
    ///
    /// The failure hook is not run.
    ///
    /// # Errors
    ///
    /// Only when the session is unusable.
    pub fn until(&self, condition: &Condition<E>) -> EsperarResult<bool> {
        Ok(matches!(self.poll(condition)?, Polled::Matched(_)))
    }

    fn poll(&self, condition: &Condition<E>) -> EsperarResult<Polled> {
        let entity = self.entity.to_string();
        let description = condition.description();
        let start = Instant::now();
        let deadline = start.checked_add(self.timeout);
        let mut attempts = 0;

        loop {
            attempts += 1;
            let context = AttemptContext {
                entity: &entity,
                condition: description,
                attempt: attempts,
            };
            let mut run = || condition.evaluate(&self.entity);
            let outcome = match &self.decorator {
                Some(decorator) => decorator(&context, &mut run),
                None => run(),
            }?;

            let mismatch = match outcome {
                Outcome::Matched => {
                    return Ok(Polled::Matched(WaitResult {
                        attempts,
                        elapsed: start.elapsed(),
                        waited_for: format!("{entity}.{description}"),
                    }));
                }
                Outcome::Mismatched(mismatch) => mismatch,
            };

            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Ok(Polled::TimedOut(Box::new(self.failure(
                    entity,
                    description,
                    mismatch,
                    attempts,
                ))));
            }
            std::thread::sleep(self.poll_interval);
        }
    }

    fn failure(
        &self,
        entity: String,
        condition: &str,
        mismatch: Mismatch,
        attempts: usize,
    ) -> TimeoutFailure {
        let mut failure = TimeoutFailure::new(entity, condition, mismatch.reason, self.timeout);
        failure.actual = mismatch.actual;
        failure.attempts = attempts;
        failure
    }
}
