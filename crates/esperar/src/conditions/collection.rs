//! Conditions over a [`Collection`]

use std::fmt;

use regex::Regex;

use crate::condition::Condition;
use crate::entity::Collection;
use crate::result::{DriverResult, EsperarError, EsperarResult};

/// Symbol for an item that equals none of the exact texts of a pattern
const OTHER: char = '_';

/// Symbols for exact texts start above the ASCII range of [`OTHER`]
const FIRST_SYMBOL: u32 = 0x1_0000;

fn size_of(collection: &Collection) -> DriverResult<usize> {
    Ok(collection.locate()?.len())
}

fn texts_of(collection: &Collection) -> DriverResult<Texts> {
    collection
        .locate()?
        .iter()
        .map(|element| element.text())
        .collect::<DriverResult<Vec<_>>>()
        .map(Texts)
}

/// Item texts, rendered as a list in mismatch reasons
#[derive(Debug, Clone, PartialEq, Eq)]
struct Texts(Vec<String>);

impl fmt::Display for Texts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

fn to_strings<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

/// Exactly `expected` items
#[must_use]
pub fn size(expected: usize) -> Condition<Collection> {
    Condition::matching(
        format!("has size {expected}"),
        "size",
        size_of,
        move |n: &usize| *n == expected,
    )
}

/// At least `minimum` items
#[must_use]
pub fn size_at_least(minimum: usize) -> Condition<Collection> {
    Condition::matching(
        format!("has size at least {minimum}"),
        "size",
        size_of,
        move |n: &usize| *n >= minimum,
    )
}

/// More than `bound` items
#[must_use]
pub fn size_greater_than(bound: usize) -> Condition<Collection> {
    Condition::matching(
        format!("has size greater than {bound}"),
        "size",
        size_of,
        move |n: &usize| *n > bound,
    )
}

/// Fewer than `bound` items
#[must_use]
pub fn size_less_than(bound: usize) -> Condition<Collection> {
    Condition::matching(
        format!("has size less than {bound}"),
        "size",
        size_of,
        move |n: &usize| *n < bound,
    )
}

/// No items
#[must_use]
pub fn empty() -> Condition<Collection> {
    Condition::matching("is empty", "size", size_of, |n: &usize| *n == 0)
}

/// Item `i` contains text `i`, and the sizes match
#[must_use]
pub fn texts<I, S>(expected: I) -> Condition<Collection>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let expected = to_strings(expected);
    Condition::matching(
        format!("has texts {expected:?}"),
        "texts",
        texts_of,
        move |actual: &Texts| {
            actual.0.len() == expected.len()
                && actual
                    .0
                    .iter()
                    .zip(&expected)
                    .all(|(text, part)| text.contains(part.as_str()))
        },
    )
}

/// Item texts equal `expected`, position by position
#[must_use]
pub fn exact_texts<I, S>(expected: I) -> Condition<Collection>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let expected = to_strings(expected);
    Condition::matching(
        format!("has exact texts {expected:?}"),
        "texts",
        texts_of,
        move |actual: &Texts| actual.0 == expected,
    )
}

/// One position of an [`exact_texts_like`] pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextPattern {
    /// Item with exactly this text
    Exact(String),
    /// Exactly one item, any text
    Any,
    /// Zero or one item
    ZeroOrOne,
    /// One or more items
    OneOrMore,
    /// Zero or more items
    ZeroOrMore,
}

impl TextPattern {
    fn regex(&self, alphabet: &Alphabet) -> String {
        match self {
            Self::Exact(text) => regex::escape(&alphabet.symbol(text).to_string()),
            Self::Any => ".".to_string(),
            Self::ZeroOrOne => ".?".to_string(),
            Self::OneOrMore => ".+".to_string(),
            Self::ZeroOrMore => ".*".to_string(),
        }
    }
}

/// One symbol per distinct exact text, so every item is exactly one symbol
#[derive(Debug, Default)]
struct Alphabet {
    texts: Vec<String>,
}

impl Alphabet {
    fn of(patterns: &[TextPattern]) -> EsperarResult<Self> {
        let mut alphabet = Self::default();
        for pattern in patterns {
            if let TextPattern::Exact(text) = pattern {
                if !alphabet.texts.contains(text) {
                    alphabet.texts.push(text.clone());
                }
            }
        }
        if char::from_u32(FIRST_SYMBOL + alphabet.texts.len() as u32).is_none() {
            return Err(EsperarError::Other(
                format!("too many distinct texts in pattern: {}", alphabet.texts.len()).into(),
            ));
        }
        Ok(alphabet)
    }

    fn symbol(&self, text: &str) -> char {
        self.texts
            .iter()
            .position(|known| known == text)
            .and_then(|index| char::from_u32(FIRST_SYMBOL + index as u32))
            .unwrap_or(OTHER)
    }

    fn spell(&self, texts: &[String]) -> String {
        texts.iter().map(|text| self.symbol(text)).collect()
    }
}

impl fmt::Display for TextPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(text) => write!(f, "{text:?}"),
            Self::Any => f.write_str("{...}"),
            Self::ZeroOrOne => f.write_str("[{...}]"),
            Self::OneOrMore => f.write_str("..."),
            Self::ZeroOrMore => f.write_str("[...]"),
        }
    }
}

impl From<&str> for TextPattern {
    fn from(text: &str) -> Self {
        Self::Exact(text.to_string())
    }
}

impl From<String> for TextPattern {
    fn from(text: String) -> Self {
        Self::Exact(text)
    }
}

/// Item texts match a positional pattern with wildcards
///
/// # Errors
///
/// Returns [`EsperarError::Pattern`] if the compiled expression exceeds the
/// regex size limits, or [`EsperarError::Other`] if the pattern holds more
/// distinct texts than there are symbols to spell them.
pub fn exact_texts_like<I, P>(patterns: I) -> EsperarResult<Condition<Collection>>
where
    I: IntoIterator<Item = P>,
    P: Into<TextPattern>,
{
    let patterns: Vec<TextPattern> = patterns.into_iter().map(Into::into).collect();
    let alphabet = Alphabet::of(&patterns)?;
    let body: String = patterns.iter().map(|pattern| pattern.regex(&alphabet)).collect();
    let regex = Regex::new(&format!("^{body}$"))?;
    let rendered = patterns
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    Ok(Condition::matching(
        format!("has exact texts like [{rendered}]"),
        "texts",
        texts_of,
        move |actual: &Texts| regex.is_match(&alphabet.spell(&actual.0)),
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::entity::{Browser, Entity};
    use crate::mock::{MockDriver, MockNode};
    use crate::outcome::Outcome;
    use std::sync::Arc;

    fn list(items: &[&str]) -> Browser {
        let nodes = items.iter().map(|text| MockNode::new("li").text(*text));
        Browser::with_driver(Arc::new(MockDriver::with_body(vec![
            MockNode::new("ul").children(nodes)
        ])))
    }

    fn reason(condition: &Condition<Collection>, collection: &Collection) -> String {
        match condition.evaluate(collection).unwrap() {
            Outcome::Matched => String::new(),
            Outcome::Mismatched(mismatch) => mismatch.reason,
        }
    }

    mod size_tests {
        use super::*;

        #[test]
        fn test_size_family() {
            let items = list(&["a", "b"]).all("li");
            assert!(items.matching(size(2)).unwrap());
            assert!(items.matching(size_at_least(2)).unwrap());
            assert!(items.matching(size_greater_than(1)).unwrap());
            assert!(items.matching(size_less_than(3)).unwrap());
            assert!(!items.matching(size_less_than(2)).unwrap());
            assert_eq!(reason(&size(0), &items), "ConditionMismatch: actual size: 2");
        }

        #[test]
        fn test_missing_parent_is_a_mismatch() {
            let items = list(&["a"]).element("#missing").all("li");
            assert!(reason(&size(0), &items).starts_with("NoSuchElementException"));
        }
    }

    mod text_tests {
        use super::*;

        #[test]
        fn test_texts_and_exact_texts() {
            let items = list(&["apple pie", "banana"]).all("li");
            assert!(items.matching(texts(["apple", "nan"])).unwrap());
            assert!(!items.matching(texts(["apple"])).unwrap());
            assert!(items.matching(exact_texts(["apple pie", "banana"])).unwrap());
            assert_eq!(
                reason(&exact_texts(["apple"]), &items),
                r#"ConditionMismatch: actual texts: ["apple pie", "banana"]"#
            );
        }

        #[test]
        fn test_exact_texts_like_wildcards() {
            let items = list(&["Jon", "Snow", "14", "Jon Snow"]).all("li");
            let matches = |patterns: Vec<TextPattern>| {
                items.matching(exact_texts_like(patterns).unwrap()).unwrap()
            };
            use TextPattern::{Any, OneOrMore, ZeroOrMore, ZeroOrOne};
            let exact = |text: &str| TextPattern::from(text);

            assert!(matches(vec![exact("Jon"), exact("Snow"), exact("14"), exact("Jon Snow")]));
            assert!(matches(vec![Any, exact("Snow"), Any, exact("Jon Snow")]));
            assert!(!matches(vec![Any, Any, exact("Jon Snow")]));
            assert!(matches(vec![OneOrMore, exact("Jon Snow")]));
            assert!(matches(vec![ZeroOrMore, exact("Jon"), ZeroOrMore]));
            assert!(matches(vec![exact("Jon"), ZeroOrOne, exact("Snow"), ZeroOrMore]));
            assert!(matches(vec![exact("Jon"), ZeroOrOne, exact("14"), ZeroOrMore]));
            assert!(!matches(vec![exact("Jon"), ZeroOrOne, exact("Jon Snow"), ZeroOrMore]));
            assert!(!matches(vec![exact("Jon"), OneOrMore, exact("Snow"), ZeroOrMore]));
        }

        #[test]
        fn test_exact_texts_like_escapes_text() {
            let items = list(&["a.b", "(c)"]).all("li");
            assert!(items.matching(exact_texts_like(["a.b", "(c)"]).unwrap()).unwrap());
            assert!(!items.matching(exact_texts_like(["axb", "(c)"]).unwrap()).unwrap());
        }

        #[test]
        fn test_exact_texts_like_counts_items_not_separators() {
            let items = list(&["a\u{1F}b"]).all("li");
            let matches = |patterns: Vec<TextPattern>| {
                items.matching(exact_texts_like(patterns).unwrap()).unwrap()
            };
            assert!(!matches(vec![TextPattern::Any, TextPattern::Any]));
            assert!(matches(vec![TextPattern::Any]));
            assert!(matches(vec![TextPattern::from("a\u{1F}b")]));
            assert!(!matches(vec![TextPattern::from("a"), TextPattern::from("b")]));
        }

        #[test]
        fn test_exact_texts_like_item_text_is_not_a_pattern() {
            let items = list(&["_", ".*"]).all("li");
            let matches = |patterns: Vec<TextPattern>| {
                items.matching(exact_texts_like(patterns).unwrap()).unwrap()
            };
            assert!(matches(vec![TextPattern::from("_"), TextPattern::from(".*")]));
            assert!(!matches(vec![TextPattern::from("x"), TextPattern::Any]));
            assert!(matches(vec![TextPattern::Any, TextPattern::from(".*")]));
        }

        #[test]
        fn test_exact_texts_like_description() {
            let condition =
                exact_texts_like(vec![TextPattern::Any, TextPattern::from("x"), TextPattern::ZeroOrMore])
                    .unwrap();
            assert_eq!(condition.description(), r#"has exact texts like [{...}, "x", [...]]"#);
        }
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(32))]

            #[test]
            fn prop_empty_iff_size_zero(n in 0usize..5) {
                let texts: Vec<String> = (0..n).map(|i| format!("item {i}")).collect();
                let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
                let items = list(&refs).all("li");
                prop_assert_eq!(items.matching(empty()).unwrap(), n == 0);
                prop_assert_eq!(items.matching(size(0)).unwrap(), n == 0);
            }
        }
    }
}
