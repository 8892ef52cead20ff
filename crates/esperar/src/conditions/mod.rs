//! Built-in condition library
//!
//! Conditions are grouped by the entity they apply to ([`element`],
//! [`collection`], [`browser`]) and re-exported through two reading-friendly
//! facades:
//!
//! ```ignore
//! use esperar::{be, have, Entity};
//!
//! browser.element("#new-todo").should(be::blank())?;
//! browser.all("#todo-list li").should(have::size(3))?;
//! browser.element("#clear").should(!be::visible())?;
//! ```

pub mod browser;
pub mod collection;
pub mod element;

use crate::condition::Condition;
use crate::entity::{Collection, Element};

/// Emptiness for either entity kind.
///
/// Converts into the element rule (form-aware, text or value based) or
/// into the collection rule (size is zero), whichever `should` expects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Empty;

impl From<Empty> for Condition<Element> {
    fn from(_: Empty) -> Self {
        element::empty()
    }
}

impl From<Empty> for Condition<Collection> {
    fn from(_: Empty) -> Self {
        collection::empty()
    }
}

/// State conditions: `be::visible()`, `be::empty()`, ...
pub mod be {
    pub use super::element::{
        absent, blank, clickable, disabled, enabled, existing, hidden, present, selected, visible,
    };
    use super::Empty;

    /// Element or collection is empty
    #[must_use]
    pub const fn empty() -> Empty {
        Empty
    }
}

/// Content conditions: `have::text("x")`, `have::size(2)`, ...
pub mod have {
    pub use super::browser::{title, title_containing, url, url_containing};
    pub use super::collection::{
        exact_texts, exact_texts_like, size, size_at_least, size_greater_than, size_less_than,
        texts, TextPattern,
    };
    pub use super::element::{
        attribute, css_class, exact_text, tag, tag_containing, text, text_matching, value,
        value_containing,
    };
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::entity::{Browser, Entity};
    use crate::mock::{MockDriver, MockNode};
    use std::sync::Arc;

    #[test]
    fn test_empty_converts_for_both_entities() {
        let browser = Browser::with_driver(Arc::new(MockDriver::with_body(vec![
            MockNode::new("ul").id("list"),
        ])));
        assert!(browser.element("#list").matching(be::empty()).unwrap());
        assert!(browser.all("#list li").matching(be::empty()).unwrap());
        assert!(!browser.all("#list").matching(be::empty()).unwrap());
    }

    #[test]
    fn test_facades_describe_like_their_modules() {
        assert_eq!(be::visible().description(), "is visible");
        assert_eq!((!be::visible()).description(), "is not (visible)");
        assert_eq!(have::size(2).description(), "has size 2");
        assert_eq!(
            have::attribute("href").value("/").description(),
            "has attribute 'href' with value '/'"
        );
    }
}
