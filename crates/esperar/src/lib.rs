//! Esperar: fluent conditions and wait-retry assertions for UI automation
//!
//! Esperar (Spanish: "to wait") sits between a test and a browser driver.
//! Entities are lazy descriptions of what to look up; conditions are named
//! predicates over them; `should` polls until the condition holds or the
//! timeout passes, then fails with a message that says what was expected
//! and what was actually there.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────┐  should(cond)  ┌──────────┐  evaluate  ┌─────────────┐
//! │  Entity   │──────────────►│   Wait    │──────────►│  Condition   │
//! │ (lazy)    │               │ (polling) │           │ (predicate)  │
//! └─────┬─────┘               └────┬─────┘           └──────┬──────┘
//!       │ locate()                 │ timeout                 │
//!       ▼                          ▼                         ▼
//! ┌───────────┐            ┌───────────────┐         ┌────────────┐
//! │  Driver   │            │ failure hook  │         │  Outcome   │
//! │ (trait)   │            │ + diagnostics │         │ + actual   │
//! └───────────┘            └───────────────┘         └────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use esperar::{be, have, Browser, Entity, MockDriver, MockNode};
//!
//! let driver = MockDriver::with_body(vec![MockNode::new("ul").id("todos").children([
//!     MockNode::new("li").text("write docs"),
//!     MockNode::new("li").text("ship it"),
//! ])]);
//! let browser = Browser::with_driver(Arc::new(driver));
//!
//! browser.all("#todos li").should(have::size(2))?;
//! browser.all("#todos li").first().should(have::exact_text("write docs"))?;
//! browser.element("#missing").should(be::absent())?;
//! # Ok::<(), esperar::EsperarError>(())
//! ```

#![warn(missing_docs)]

mod condition;
pub mod conditions;
pub mod config;
pub mod diagnostics;
pub mod driver;
mod entity;
pub mod logging;
pub mod mock;
mod outcome;
mod result;
mod selector;
pub mod wait;

pub use condition::{Condition, Observation};
pub use conditions::{be, have};
pub use config::{Config, ConfigOverrides, Settings};
pub use diagnostics::ArtifactLog;
pub use driver::{Driver, DriverFactory, DriverHolder, DriverSettings, ElementId, WebElement};
pub use entity::{Browser, Collection, Element, Entity};
pub use logging::{init_tracing, log_attempts, LogFormat};
pub use mock::{MockDriver, MockNode};
pub use outcome::{Mismatch, Outcome, CONDITION_MISMATCH};
pub use result::{DriverError, DriverResult, EsperarError, EsperarResult, TimeoutFailure};
pub use selector::Selector;
pub use wait::{AttemptContext, FailureHook, Wait, WaitDecorator, WaitResult};
