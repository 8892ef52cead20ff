//! Entities: lazily resolved handles to live UI subjects.
//!
//! An entity is a locator rule plus a [`Config`]. It never holds on to a
//! [`WebElement`]; [`Element::locate`] and [`Collection::locate`] query the
//! driver again on every call, re-applying each derivation step (scoping,
//! indexing, filtering, slicing) against the freshly resolved parent.
//!
//! ```text
//! browser.all("li")            Collection::Root
//!   .by(have::css_class("x"))  Collection::Filtered
//!   .get(-1)                   Element::Indexed
//!   .element(".title")         Element::Within
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::condition::Condition;
use crate::config::{Config, ConfigOverrides};
use crate::driver::{Driver, WebElement};
use crate::result::{DriverError, DriverResult, EsperarResult};
use crate::selector::Selector;
use crate::wait::Wait;

/// Something conditions can be waited on
pub trait Entity: Clone + fmt::Display + Send + Sync + 'static {
    /// Session context this entity was created with
    fn config(&self) -> &Config;

    /// Dump of the live subject appended to failures when enabled
    ///
    /// # Errors
    ///
    /// Returns the driver error if the subject cannot be resolved.
    fn describe_actual(&self) -> DriverResult<Option<String>> {
        Ok(None)
    }

    /// Retry loop configured from this entity's config
    fn wait(&self) -> Wait<Self> {
        self.config().wait(self.clone())
    }

    /// Wait until `condition` holds, then return `self` for chaining
    ///
    /// # Errors
    ///
    /// Returns the (hook-processed) timeout failure, or a session error.
    fn should(&self, condition: impl Into<Condition<Self>>) -> EsperarResult<&Self> {
        self.wait().for_(&condition.into())?;
        Ok(self)
    }

    /// Evaluate `condition` once, without waiting
    ///
    /// # Errors
    ///
    /// Only for an unusable session.
    fn matching(&self, condition: impl Into<Condition<Self>>) -> EsperarResult<bool> {
        Ok(condition.into().evaluate(self)?.is_matched())
    }

    /// Wait for `condition`, reporting a timeout as `false`
    ///
    /// # Errors
    ///
    /// Only for an unusable session.
    fn wait_until(&self, condition: impl Into<Condition<Self>>) -> EsperarResult<bool> {
        self.wait().until(&condition.into())
    }
}

// =============================================================================
// ELEMENT
// =============================================================================

enum ElementLocation {
    Root(Selector),
    Within {
        parent: Element,
        selector: Selector,
    },
    Indexed {
        collection: Collection,
        index: isize,
    },
    FirstMatching {
        collection: Collection,
        condition: Condition<Element>,
    },
    Cached {
        description: String,
        element: WebElement,
    },
}

/// A single element
#[derive(Clone)]
pub struct Element {
    location: Arc<ElementLocation>,
    config: Config,
}

impl Element {
    /// Element found by `selector` in the whole document
    #[must_use]
    pub fn new(selector: impl Into<Selector>, config: Config) -> Self {
        Self::at(ElementLocation::Root(selector.into()), config)
    }

    fn at(location: ElementLocation, config: Config) -> Self {
        Self {
            location: Arc::new(location),
            config,
        }
    }

    /// An already resolved element, valid for one attempt only
    fn cached(description: String, element: WebElement, config: Config) -> Self {
        Self::at(ElementLocation::Cached { description, element }, config)
    }

    /// First descendant matching `selector`
    #[must_use]
    pub fn element(&self, selector: impl Into<Selector>) -> Self {
        Self::at(
            ElementLocation::Within {
                parent: self.clone(),
                selector: selector.into(),
            },
            self.config.clone(),
        )
    }

    /// All descendants matching `selector`
    #[must_use]
    pub fn all(&self, selector: impl Into<Selector>) -> Collection {
        Collection::at(
            CollectionLocation::Within {
                parent: self.clone(),
                selector: selector.into(),
            },
            self.config.clone(),
        )
    }

    /// Same element with config overrides
    #[must_use]
    pub fn with_(&self, overrides: ConfigOverrides) -> Self {
        Self {
            location: Arc::clone(&self.location),
            config: self.config.with_overrides(overrides),
        }
    }

    /// Same element with another timeout
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_(ConfigOverrides::new().timeout(timeout))
    }

    /// Resolve the live element now
    ///
    /// # Errors
    ///
    /// Returns the driver error when the element cannot be found.
    pub fn locate(&self) -> DriverResult<WebElement> {
        match self.location.as_ref() {
            ElementLocation::Root(selector) => {
                let driver = self.config.driver()?;
                let id = driver.find(None, selector)?;
                Ok(WebElement::new(id, driver))
            }
            ElementLocation::Within { parent, selector } => parent.locate()?.find(selector),
            ElementLocation::Indexed { collection, index } => {
                item_at(collection.locate()?, *index)
            }
            ElementLocation::FirstMatching {
                collection,
                condition,
            } => collection
                .matching_items(condition, true)?
                .into_iter()
                .next()
                .ok_or_else(|| DriverError::NoElementMatching {
                    condition: condition.to_string(),
                    collection: collection.to_string(),
                }),
            ElementLocation::Cached { element, .. } => Ok(element.clone()),
        }
    }
}

impl Entity for Element {
    fn config(&self) -> &Config {
        &self.config
    }

    fn describe_actual(&self) -> DriverResult<Option<String>> {
        let html = self.locate()?.outer_html()?;
        Ok(Some(format!("Actual webelement: {html}")))
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location.as_ref() {
            ElementLocation::Root(selector) => write!(f, "browser.element({selector})"),
            ElementLocation::Within { parent, selector } => {
                write!(f, "{parent}.element({selector})")
            }
            ElementLocation::Indexed { collection, index } => write!(f, "{collection}[{index}]"),
            ElementLocation::FirstMatching {
                collection,
                condition,
            } => write!(f, "{collection}.element_by({condition})"),
            ElementLocation::Cached { description, .. } => f.write_str(description),
        }
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Element").field(&self.to_string()).finish()
    }
}

fn item_at(items: Vec<WebElement>, index: isize) -> DriverResult<WebElement> {
    let length = items.len();
    let position = if index < 0 {
        length.checked_sub(index.unsigned_abs())
    } else {
        Some(index.unsigned_abs())
    };
    position
        .and_then(|position| items.into_iter().nth(position))
        .ok_or(DriverError::IndexOutOfRange { index, length })
}

// =============================================================================
// COLLECTION
// =============================================================================

enum CollectionLocation {
    Root(Selector),
    Within {
        parent: Element,
        selector: Selector,
    },
    Filtered {
        collection: Collection,
        condition: Condition<Element>,
    },
    Sliced {
        collection: Collection,
        start: usize,
        stop: Option<usize>,
    },
}

/// An ordered collection of elements
#[derive(Clone)]
pub struct Collection {
    location: Arc<CollectionLocation>,
    config: Config,
}

impl Collection {
    /// All elements matching `selector` in the whole document
    #[must_use]
    pub fn new(selector: impl Into<Selector>, config: Config) -> Self {
        Self::at(CollectionLocation::Root(selector.into()), config)
    }

    fn at(location: CollectionLocation, config: Config) -> Self {
        Self {
            location: Arc::new(location),
            config,
        }
    }

    /// Element at `index`; negative indexes count from the end
    #[must_use]
    pub fn get(&self, index: isize) -> Element {
        Element::at(
            ElementLocation::Indexed {
                collection: self.clone(),
                index,
            },
            self.config.clone(),
        )
    }

    /// First element
    #[must_use]
    pub fn first(&self) -> Element {
        self.get(0)
    }

    /// Second element
    #[must_use]
    pub fn second(&self) -> Element {
        self.get(1)
    }

    /// First element satisfying `condition`, re-searched on every resolution
    #[must_use]
    pub fn element_by(&self, condition: impl Into<Condition<Element>>) -> Element {
        Element::at(
            ElementLocation::FirstMatching {
                collection: self.clone(),
                condition: condition.into(),
            },
            self.config.clone(),
        )
    }

    /// Elements satisfying `condition`
    #[must_use]
    pub fn by(&self, condition: impl Into<Condition<Element>>) -> Self {
        Self::at(
            CollectionLocation::Filtered {
                collection: self.clone(),
                condition: condition.into(),
            },
            self.config.clone(),
        )
    }

    /// Elements from `start` up to, excluding, `stop`
    #[must_use]
    pub fn sliced(&self, start: usize, stop: Option<usize>) -> Self {
        Self::at(
            CollectionLocation::Sliced {
                collection: self.clone(),
                start,
                stop,
            },
            self.config.clone(),
        )
    }

    /// Same collection with config overrides
    #[must_use]
    pub fn with_(&self, overrides: ConfigOverrides) -> Self {
        Self {
            location: Arc::clone(&self.location),
            config: self.config.with_overrides(overrides),
        }
    }

    /// Same collection with another timeout
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_(ConfigOverrides::new().timeout(timeout))
    }

    /// Resolve the live elements now, in document order
    ///
    /// # Errors
    ///
    /// Returns the driver error when a parent cannot be found.
    pub fn locate(&self) -> DriverResult<Vec<WebElement>> {
        match self.location.as_ref() {
            CollectionLocation::Root(selector) => {
                let driver = self.config.driver()?;
                Ok(driver
                    .find_all(None, selector)?
                    .into_iter()
                    .map(|id| WebElement::new(id, Arc::clone(&driver)))
                    .collect())
            }
            CollectionLocation::Within { parent, selector } => parent.locate()?.find_all(selector),
            CollectionLocation::Filtered {
                collection,
                condition,
            } => collection.matching_items(condition, false),
            CollectionLocation::Sliced {
                collection,
                start,
                stop,
            } => {
                let items = collection.locate()?.into_iter().skip(*start);
                Ok(match stop {
                    Some(stop) => items.take(stop.saturating_sub(*start)).collect(),
                    None => items.collect(),
                })
            }
        }
    }

    /// Items satisfying `condition`, each evaluated once as a cached element
    fn matching_items(
        &self,
        condition: &Condition<Element>,
        first_only: bool,
    ) -> DriverResult<Vec<WebElement>> {
        let mut matched = Vec::new();
        for (index, item) in self.locate()?.into_iter().enumerate() {
            let cached = Element::cached(format!("{self}.cached[{index}]"), item, self.config.clone());
            if condition.evaluate(&cached)?.is_matched() {
                matched.push(cached.locate()?);
                if first_only {
                    break;
                }
            }
        }
        Ok(matched)
    }
}

impl Entity for Collection {
    fn config(&self) -> &Config {
        &self.config
    }

    fn describe_actual(&self) -> DriverResult<Option<String>> {
        let html = self
            .locate()?
            .iter()
            .map(WebElement::outer_html)
            .collect::<DriverResult<Vec<_>>>()?;
        Ok(Some(format!("Actual webelements collection:\n{}", html.join("\n"))))
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location.as_ref() {
            CollectionLocation::Root(selector) => write!(f, "browser.all({selector})"),
            CollectionLocation::Within { parent, selector } => write!(f, "{parent}.all({selector})"),
            CollectionLocation::Filtered {
                collection,
                condition,
            } => write!(f, "{collection}.by({condition})"),
            CollectionLocation::Sliced {
                collection,
                start,
                stop,
            } => match stop {
                Some(stop) => write!(f, "{collection}[{start}:{stop}]"),
                None => write!(f, "{collection}[{start}:]"),
            },
        }
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Collection").field(&self.to_string()).finish()
    }
}

// =============================================================================
// BROWSER
// =============================================================================

/// Root handle: the page as a whole
#[derive(Debug, Clone, Default)]
pub struct Browser {
    config: Config,
}

impl Browser {
    /// Browser over `config`
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// Browser over a ready driver with default settings
    #[must_use]
    pub fn with_driver(driver: Arc<dyn Driver>) -> Self {
        Self::new(Config::new().with_driver(driver))
    }

    /// Element by `selector`
    #[must_use]
    pub fn element(&self, selector: impl Into<Selector>) -> Element {
        Element::new(selector, self.config.clone())
    }

    /// All elements by `selector`
    #[must_use]
    pub fn all(&self, selector: impl Into<Selector>) -> Collection {
        Collection::new(selector, self.config.clone())
    }

    /// Same browser with config overrides
    #[must_use]
    pub fn with_(&self, overrides: ConfigOverrides) -> Self {
        Self::new(self.config.with_overrides(overrides))
    }

    /// Same browser with another timeout
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_(ConfigOverrides::new().timeout(timeout))
    }

    /// The driver, built on first access
    ///
    /// # Errors
    ///
    /// Returns a session error when no driver can be produced.
    pub fn driver(&self) -> EsperarResult<Arc<dyn Driver>> {
        Ok(self.config.driver()?)
    }
}

impl Entity for Browser {
    fn config(&self) -> &Config {
        &self.config
    }
}

impl fmt::Display for Browser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("browser")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mock::{MockDriver, MockNode};

    fn page() -> (MockDriver, Browser) {
        let mock = MockDriver::with_body(vec![
            MockNode::new("ul").id("todo").children(vec![
                MockNode::new("li").class("task").text("a"),
                MockNode::new("li").class("task").class("done").text("b"),
                MockNode::new("li").class("task").text("c"),
            ]),
            MockNode::new("ul").id("other").child(MockNode::new("li").text("z")),
        ]);
        let browser = Browser::with_driver(Arc::new(mock.clone()))
            .with_timeout(Duration::ZERO);
        (mock, browser)
    }

    fn text(element: &Element) -> String {
        element.locate().unwrap().text().unwrap()
    }

    mod description_tests {
        use super::*;

        #[test]
        fn test_root_and_nested() {
            let (_, browser) = page();
            let li = browser.element("#todo").element("li");
            assert_eq!(
                li.to_string(),
                "browser.element(('css selector', '#todo')).element(('css selector', 'li'))"
            );
            assert_eq!(
                browser.element("#todo").all(".task").to_string(),
                "browser.element(('css selector', '#todo')).all(('css selector', '.task'))"
            );
        }

        #[test]
        fn test_collection_derivations() {
            let (_, browser) = page();
            let tasks = browser.all(".task");
            assert_eq!(tasks.get(-1).to_string(), "browser.all(('css selector', '.task'))[-1]");
            assert_eq!(
                tasks.sliced(1, None).to_string(),
                "browser.all(('css selector', '.task'))[1:]"
            );
            assert_eq!(
                tasks.sliced(0, Some(2)).to_string(),
                "browser.all(('css selector', '.task'))[0:2]"
            );
            let done = Condition::by("is done", |e: &Element| {
                Ok(e.locate()?.attribute("class")?.unwrap_or_default().contains("done"))
            });
            assert_eq!(
                tasks.element_by(done.clone()).to_string(),
                "browser.all(('css selector', '.task')).element_by(is done)"
            );
            assert_eq!(
                tasks.by(done).to_string(),
                "browser.all(('css selector', '.task')).by(is done)"
            );
        }
    }

    mod resolution_tests {
        use super::*;

        #[test]
        fn test_scoped_lookup() {
            let (_, browser) = page();
            assert_eq!(text(&browser.element("#other").element("li")), "z");
            assert_eq!(browser.element("#todo").all("li").locate().unwrap().len(), 3);
        }

        #[test]
        fn test_indexing() {
            let (_, browser) = page();
            let tasks = browser.all(".task");
            assert_eq!(text(&tasks.first()), "a");
            assert_eq!(text(&tasks.second()), "b");
            assert_eq!(text(&tasks.get(-1)), "c");
            assert!(matches!(
                tasks.get(3).locate().unwrap_err(),
                DriverError::IndexOutOfRange { index: 3, length: 3 }
            ));
            assert!(matches!(
                tasks.get(-4).locate().unwrap_err(),
                DriverError::IndexOutOfRange { index: -4, length: 3 }
            ));
        }

        #[test]
        fn test_filtering_and_slicing() {
            let (_, browser) = page();
            let not_done = Condition::by("is open", |e: &Element| {
                Ok(!e.locate()?.attribute("class")?.unwrap_or_default().contains("done"))
            });
            let tasks = browser.all(".task");
            assert_eq!(tasks.by(not_done.clone()).locate().unwrap().len(), 2);
            assert_eq!(text(&tasks.by(not_done.clone()).get(1)), "c");
            assert_eq!(tasks.sliced(1, Some(10)).locate().unwrap().len(), 2);
            assert!(tasks.sliced(5, Some(2)).locate().unwrap().is_empty());

            let never = Condition::by("is never", |_: &Element| Ok(false));
            let err = tasks.element_by(never).locate().unwrap_err();
            assert_eq!(
                err.to_string(),
                "ConditionMismatch: cannot find element by condition «is never» \
                 from browser.all(('css selector', '.task'))"
            );
        }

        #[test]
        fn test_resolution_is_fresh_on_every_call() {
            let (mock, browser) = page();
            let last = browser.all(".task").get(-1);
            assert_eq!(text(&last), "c");
            mock.update_first("#todo", |ul| ul.push_child(MockNode::new("li").class("task").text("d")));
            assert_eq!(text(&last), "d");

            let before = mock.calls("find");
            let _ = last.locate().unwrap();
            assert_eq!(mock.calls("find"), before + 1);
        }

        #[test]
        fn test_replaced_document_is_resolved_again() {
            let (mock, browser) = page();
            let nested = browser.element("ul").element("li");
            let marked = |class: &'static str| {
                Condition::by(format!("has class {class}"), move |e: &Element| {
                    Ok(e.locate()?.attribute("class")?.unwrap_or_default().contains(class))
                })
            };
            let done = browser.all("li").element_by(marked("done"));
            assert_eq!(text(&nested), "a");
            assert_eq!(text(&done), "b");

            mock.set_document(MockNode::new("html").child(MockNode::new("body").children(vec![
                MockNode::new("ul").children(vec![
                    MockNode::new("li").class("done").text("w"),
                    MockNode::new("li").text("x"),
                ]),
                MockNode::new("ul").child(MockNode::new("li").class("done").text("y")),
            ])));
            assert_eq!(text(&nested), "w");
            assert_eq!(text(&done), "w");

            mock.update_first("li", |li| li.remove_attr("class"));
            assert_eq!(text(&done), "y");
        }

        #[test]
        fn test_with_does_not_change_original() {
            let (_, browser) = page();
            let element = browser.element("li");
            let slow = element.with_timeout(Duration::from_secs(9));
            assert_eq!(element.config().timeout(), Duration::ZERO);
            assert_eq!(slow.config().timeout(), Duration::from_secs(9));
            assert_eq!(slow.to_string(), element.to_string());
        }
    }

    mod actual_dump_tests {
        use super::*;

        #[test]
        fn test_element_and_collection_dumps() {
            let (_, browser) = page();
            assert_eq!(
                browser.element("#other li").describe_actual().unwrap().unwrap(),
                "Actual webelement: <li>z</li>"
            );
            assert_eq!(
                browser.all("#other").describe_actual().unwrap().unwrap(),
                "Actual webelements collection:\n<ul id=\"other\"><li>z</li></ul>"
            );
            assert!(browser.describe_actual().unwrap().is_none());
        }
    }
}
