//! Conditions over a single [`Element`].
//!
//! Every probe resolves the element itself, so an element that cannot be
//! found fails with the driver's "no such element" reason, while a found
//! but hidden one reports `actual visibility: hidden`.

use regex::Regex;

use crate::condition::{Condition, Observation};
use crate::driver::WebElement;
use crate::entity::Element;
use crate::result::{DriverResult, EsperarResult};
use crate::selector::Selector;

/// Input kinds whose value never counts toward form emptiness
const NON_VALUE_INPUTS: &[&str] = &[
    "button", "submit", "reset", "image", "hidden", "range", "color",
];

fn visibility(element: &Element) -> DriverResult<&'static str> {
    Ok(if element.locate()?.is_displayed()? {
        "visible"
    } else {
        "hidden"
    })
}

fn text_of(element: &Element) -> DriverResult<String> {
    element.locate()?.text()
}

fn value_of(element: &WebElement) -> DriverResult<String> {
    Ok(element.attribute("value")?.unwrap_or_default())
}

fn is_text_field(tag: &str) -> bool {
    tag == "input" || tag == "textarea"
}

/// Element is present in the document
#[must_use]
pub fn present() -> Condition<Element> {
    Condition::new("is present", |element: &Element| {
        element.locate()?;
        Ok(Observation::of_actual(true, "presence", "present"))
    })
    .with_inverted_description("is absent")
}

/// Alias of [`present`]
#[must_use]
pub fn existing() -> Condition<Element> {
    present()
}

/// Element cannot be found
#[must_use]
pub fn absent() -> Condition<Element> {
    present().negate()
}

/// Element is present and rendered
#[must_use]
pub fn visible() -> Condition<Element> {
    Condition::matching("is visible", "visibility", visibility, |seen: &&str| {
        *seen == "visible"
    })
}

/// Element is present but not rendered
#[must_use]
pub fn hidden() -> Condition<Element> {
    Condition::matching("is hidden", "visibility", visibility, |seen: &&str| {
        *seen == "hidden"
    })
}

/// Element accepts interaction
#[must_use]
pub fn enabled() -> Condition<Element> {
    Condition::by("is enabled", |element: &Element| element.locate()?.is_enabled())
}

/// Element is present and does not accept interaction
#[must_use]
pub fn disabled() -> Condition<Element> {
    Condition::by("is disabled", |element: &Element| {
        Ok(!element.locate()?.is_enabled()?)
    })
}

/// Element is visible and enabled
#[must_use]
pub fn clickable() -> Condition<Element> {
    Condition::new("is clickable", |element: &Element| {
        let found = element.locate()?;
        let displayed = found.is_displayed()?;
        let enabled = found.is_enabled()?;
        let state = match (displayed, enabled) {
            (false, _) => "hidden",
            (true, false) => "disabled",
            (true, true) => "clickable",
        };
        Ok(Observation::of_actual(displayed && enabled, "state", state))
    })
}

/// Checkbox, radio or option is selected
#[must_use]
pub fn selected() -> Condition<Element> {
    Condition::by("is selected", |element: &Element| element.locate()?.is_selected())
}

/// No rendered text and, for text fields, no value
#[must_use]
pub fn blank() -> Condition<Element> {
    Condition::new("is blank", |element: &Element| {
        let found = element.locate()?;
        let text = found.text()?;
        if !text.is_empty() {
            return Ok(Observation::of_actual(false, "text", text));
        }
        if is_text_field(&found.tag_name()?.to_ascii_lowercase()) {
            let value = value_of(&found)?;
            if !value.is_empty() {
                return Ok(Observation::of_actual(false, "value", value));
            }
        }
        Ok(Observation::of_actual(true, "text", text))
    })
}

/// Context-sensitive emptiness.
///
/// * form: the concatenated values of its value-bearing fields are empty
/// * input or textarea: its value is empty
/// * anything else: its trimmed rendered text is empty
#[must_use]
pub fn empty() -> Condition<Element> {
    Condition::new("is empty", |element: &Element| {
        let found = element.locate()?;
        let tag = found.tag_name()?.to_ascii_lowercase();
        if tag == "form" {
            let values = form_values(&found)?;
            return Ok(Observation::of_actual(
                values.is_empty(),
                "values of all form inputs, textareas and selects",
                values,
            ));
        }
        if is_text_field(&tag) {
            let value = value_of(&found)?;
            return Ok(Observation::of_actual(value.is_empty(), "value", value));
        }
        let text = found.text()?;
        let text = text.trim();
        Ok(Observation::of_actual(text.is_empty(), "text", text))
    })
}

/// Values of text-entry inputs, textareas, checked checkboxes and radios,
/// and selects, concatenated in document order
fn form_values(form: &WebElement) -> DriverResult<String> {
    let mut values = String::new();
    for field in form.find_all(&Selector::css("input, textarea, select"))? {
        if field.tag_name()?.eq_ignore_ascii_case("input") {
            let kind = field
                .attribute("type")?
                .unwrap_or_else(|| "text".to_string())
                .to_ascii_lowercase();
            if NON_VALUE_INPUTS.contains(&kind.as_str()) {
                continue;
            }
            if (kind == "checkbox" || kind == "radio") && field.attribute("checked")?.is_none() {
                continue;
            }
        }
        values.push_str(&value_of(&field)?);
    }
    Ok(values)
}

/// Rendered text contains `expected`
#[must_use]
pub fn text(expected: impl Into<String>) -> Condition<Element> {
    let expected = expected.into();
    Condition::matching(
        format!("has text {expected}"),
        "text",
        text_of,
        move |actual: &String| actual.contains(expected.as_str()),
    )
}

/// Rendered text equals `expected`
#[must_use]
pub fn exact_text(expected: impl Into<String>) -> Condition<Element> {
    let expected = expected.into();
    Condition::matching(
        format!("has exact text {expected}"),
        "text",
        text_of,
        move |actual: &String| *actual == expected,
    )
}

/// Rendered text matches a regular expression
///
/// # Errors
///
/// Returns [`EsperarError::Pattern`](crate::EsperarError::Pattern) for an
/// invalid expression.
pub fn text_matching(pattern: &str) -> EsperarResult<Condition<Element>> {
    let regex = Regex::new(pattern)?;
    Ok(Condition::matching(
        format!("has text matching {pattern}"),
        "text",
        text_of,
        move |actual: &String| regex.is_match(actual),
    ))
}

/// `value` equals `expected`
#[must_use]
pub fn value(expected: impl Into<String>) -> Condition<Element> {
    let expected = expected.into();
    Condition::matching(
        format!("has value '{expected}'"),
        "value",
        |element: &Element| value_of(&element.locate()?),
        move |actual: &String| *actual == expected,
    )
}

/// `value` contains `expected`
#[must_use]
pub fn value_containing(expected: impl Into<String>) -> Condition<Element> {
    let expected = expected.into();
    Condition::matching(
        format!("has value containing '{expected}'"),
        "value",
        |element: &Element| value_of(&element.locate()?),
        move |actual: &String| actual.contains(expected.as_str()),
    )
}

/// `class` attribute lists `name`
#[must_use]
pub fn css_class(name: impl Into<String>) -> Condition<Element> {
    let name = name.into();
    Condition::matching(
        format!("has css class '{name}'"),
        "class attribute",
        |element: &Element| Ok(element.locate()?.attribute("class")?.unwrap_or_default()),
        move |classes: &String| classes.split_whitespace().any(|class| class == name),
    )
}

/// Tag name equals `name`
#[must_use]
pub fn tag(name: impl Into<String>) -> Condition<Element> {
    let name = name.into();
    Condition::matching(
        format!("has tag {name}"),
        "tag",
        |element: &Element| element.locate()?.tag_name(),
        move |actual: &String| *actual == name,
    )
}

/// Tag name contains `part`
#[must_use]
pub fn tag_containing(part: impl Into<String>) -> Condition<Element> {
    let part = part.into();
    Condition::matching(
        format!("has tag containing {part}"),
        "tag",
        |element: &Element| element.locate()?.tag_name(),
        move |actual: &String| actual.contains(part.as_str()),
    )
}

/// Attribute conditions; converts into a presence check
#[must_use]
pub fn attribute(name: impl Into<String>) -> AttributeCondition {
    AttributeCondition { name: name.into() }
}

/// Builder for conditions on one attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeCondition {
    name: String,
}

impl AttributeCondition {
    fn compare(
        &self,
        description: String,
        check: impl Fn(&str) -> bool + Send + Sync + 'static,
    ) -> Condition<Element> {
        let name = self.name.clone();
        Condition::new(description, move |element: &Element| {
            let actual = element.locate()?.attribute(&name)?;
            let holds = actual.as_deref().is_some_and(&check);
            Ok(Observation::of_actual(
                holds,
                &format!("attribute {name}"),
                actual.as_deref().unwrap_or("(absent)"),
            ))
        })
    }

    /// Attribute is present
    #[must_use]
    pub fn present(&self) -> Condition<Element> {
        self.compare(format!("has attribute '{}'", self.name), |_| true)
    }

    /// Attribute equals `expected`
    #[must_use]
    pub fn value(&self, expected: impl Into<String>) -> Condition<Element> {
        let expected = expected.into();
        self.compare(
            format!("has attribute '{}' with value '{expected}'", self.name),
            move |actual| actual == expected,
        )
    }

    /// Attribute contains `expected`
    #[must_use]
    pub fn value_containing(&self, expected: impl Into<String>) -> Condition<Element> {
        let expected = expected.into();
        self.compare(
            format!("has attribute '{}' with value containing '{expected}'", self.name),
            move |actual| actual.contains(expected.as_str()),
        )
    }
}

impl From<AttributeCondition> for Condition<Element> {
    fn from(attribute: AttributeCondition) -> Self {
        attribute.present()
    }
}
