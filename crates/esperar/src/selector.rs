//! Selectors: opaque, driver-specific descriptions of what to look up.
//!
//! Esperar never interprets a selector itself. It hands selectors to the
//! [`Driver`](crate::Driver) and renders them in failure messages.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Selector type for locating elements
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Selector {
    /// CSS selector (e.g., "button.primary")
    Css(String),
    /// XPath selector
    XPath(String),
    /// Text content selector
    Text(String),
    /// Test ID selector (data-testid attribute)
    TestId(String),
}

impl Selector {
    /// Create a CSS selector
    #[must_use]
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    /// Create an XPath selector
    #[must_use]
    pub fn xpath(selector: impl Into<String>) -> Self {
        Self::XPath(selector.into())
    }

    /// Create a text selector
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Create a test ID selector
    #[must_use]
    pub fn test_id(id: impl Into<String>) -> Self {
        Self::TestId(id.into())
    }

    /// Lookup strategy name, WebDriver style
    #[must_use]
    pub const fn strategy(&self) -> &'static str {
        match self {
            Self::Css(_) => "css selector",
            Self::XPath(_) => "xpath",
            Self::Text(_) => "text",
            Self::TestId(_) => "test id",
        }
    }

    /// The raw selector value
    #[must_use]
    pub fn value(&self) -> &str {
        match self {
            Self::Css(s) | Self::XPath(s) | Self::Text(s) | Self::TestId(s) => s,
        }
    }

    /// JSON form used in "no such element" messages:
    /// `{"method":"css selector","selector":"li#absent"}`
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::json!({
            "method": self.strategy(),
            "selector": self.value(),
        })
        .to_string()
    }
}

/// Renders as `('css selector', 'li#absent')`
impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "('{}', '{}')", self.strategy(), self.value())
    }
}

impl From<&str> for Selector {
    fn from(css: &str) -> Self {
        Self::css(css)
    }
}

impl From<String> for Selector {
    fn from(css: String) -> Self {
        Self::Css(css)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_tuple_form() {
        assert_eq!(
            Selector::css("li#absent").to_string(),
            "('css selector', 'li#absent')"
        );
        assert_eq!(Selector::xpath("//li").to_string(), "('xpath', '//li')");
    }

    #[test]
    fn test_json_form_keeps_key_order() {
        assert_eq!(
            Selector::css("li#absent").to_json(),
            r#"{"method":"css selector","selector":"li#absent"}"#
        );
    }

    #[test]
    fn test_str_defaults_to_css() {
        assert_eq!(Selector::from(".item"), Selector::Css(".item".into()));
        assert_eq!(Selector::from(String::from("a")).strategy(), "css selector");
    }

    #[test]
    fn test_value_accessor() {
        assert_eq!(Selector::test_id("score").value(), "score");
        assert_eq!(Selector::text("Start").strategy(), "text");
    }
}
