//! Conditions over the [`Browser`] page

use crate::condition::Condition;
use crate::entity::{Browser, Entity as _};
use crate::result::DriverResult;

fn url_of(browser: &Browser) -> DriverResult<String> {
    browser.config().driver()?.current_url()
}

fn title_of(browser: &Browser) -> DriverResult<String> {
    browser.config().driver()?.title()
}

/// Current URL equals `expected`
#[must_use]
pub fn url(expected: impl Into<String>) -> Condition<Browser> {
    let expected = expected.into();
    Condition::matching(
        format!("has url '{expected}'"),
        "url",
        url_of,
        move |actual: &String| *actual == expected,
    )
}

/// Current URL contains `part`
#[must_use]
pub fn url_containing(part: impl Into<String>) -> Condition<Browser> {
    let part = part.into();
    Condition::matching(
        format!("has url containing '{part}'"),
        "url",
        url_of,
        move |actual: &String| actual.contains(part.as_str()),
    )
}

/// Page title equals `expected`
#[must_use]
pub fn title(expected: impl Into<String>) -> Condition<Browser> {
    let expected = expected.into();
    Condition::matching(
        format!("has title '{expected}'"),
        "title",
        title_of,
        move |actual: &String| *actual == expected,
    )
}

/// Page title contains `part`
#[must_use]
pub fn title_containing(part: impl Into<String>) -> Condition<Browser> {
    let part = part.into();
    Condition::matching(
        format!("has title containing '{part}'"),
        "title",
        title_of,
        move |actual: &String| actual.contains(part.as_str()),
    )
}
