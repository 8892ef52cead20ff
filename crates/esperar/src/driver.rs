//! Driver handle: the only way Esperar touches a live UI.
//!
//! ```text
//! ┌──────────────┐  resolve   ┌──────────────┐  find / text / attribute  ┌──────────┐
//! │ Element /    │───────────►│ WebElement   │──────────────────────────►│ dyn      │
//! │ Collection   │            │ (live handle)│                           │ Driver   │
//! └──────────────┘            └──────────────┘                           └──────────┘
//!        ▲                                                                     ▲
//!        │ config.driver()                DriverHolder (lazy, snapshot build)  │
//!        └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Implementations wrap a real WebDriver/Appium client; [`MockDriver`](crate::MockDriver)
//! is an in-memory one.

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::result::{DriverError, DriverResult};
use crate::selector::Selector;

/// Opaque identifier of an element inside a driver session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementId(String);

impl ElementId {
    /// Create an element id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw id
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Capabilities Esperar needs from a driver session.
///
/// `scope` restricts lookups to descendants of an element; `None` searches
/// the whole document. `find_all` returns matches in document order and an
/// empty vector when nothing matches.
pub trait Driver: Send + Sync {
    /// Find the first element matching `selector`
    fn find(&self, scope: Option<&ElementId>, selector: &Selector) -> DriverResult<ElementId>;

    /// Find all elements matching `selector`
    fn find_all(&self, scope: Option<&ElementId>, selector: &Selector)
        -> DriverResult<Vec<ElementId>>;

    /// Attribute or property value (`value`, `checked`, `outerHTML`, ...)
    fn attribute(&self, element: &ElementId, name: &str) -> DriverResult<Option<String>>;

    /// Rendered (visible) text
    fn text(&self, element: &ElementId) -> DriverResult<String>;

    /// Whether the element is rendered
    fn is_displayed(&self, element: &ElementId) -> DriverResult<bool>;

    /// Tag name in the markup's native casing
    fn tag_name(&self, element: &ElementId) -> DriverResult<String>;

    /// Whether the element accepts interaction
    fn is_enabled(&self, element: &ElementId) -> DriverResult<bool> {
        Ok(self.attribute(element, "disabled")?.is_none())
    }

    /// Whether a checkbox, radio or option is selected
    fn is_selected(&self, element: &ElementId) -> DriverResult<bool> {
        Ok(self.attribute(element, "checked")?.is_some()
            || self.attribute(element, "selected")?.is_some())
    }

    /// Write a PNG screenshot of the current page to `path`
    ///
    /// The caller picks `path` inside the reports folder; the driver only
    /// writes the file.
    fn save_screenshot(&self, path: &Path) -> DriverResult<()>;

    /// Current page source
    ///
    /// Returned as text; failure diagnostics write it next to the screenshot.
    fn page_source(&self) -> DriverResult<String>;

    /// Current URL
    fn current_url(&self) -> DriverResult<String>;

    /// Current page title
    fn title(&self) -> DriverResult<String>;

    /// Whether the session can still accept commands
    fn is_alive(&self) -> bool {
        true
    }
}

/// A live element: an id plus the session it belongs to.
///
/// Obtained fresh on every resolution; holding one across polls is how
/// stale-element errors happen, so entities never do.
#[derive(Clone)]
pub struct WebElement {
    id: ElementId,
    driver: Arc<dyn Driver>,
}

impl fmt::Debug for WebElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebElement")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl WebElement {
    /// Wrap an id found through `driver`
    #[must_use]
    pub fn new(id: ElementId, driver: Arc<dyn Driver>) -> Self {
        Self { id, driver }
    }

    /// Element id
    #[must_use]
    pub const fn id(&self) -> &ElementId {
        &self.id
    }

    /// Session this element belongs to
    #[must_use]
    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    /// Rendered text
    pub fn text(&self) -> DriverResult<String> {
        self.driver.text(&self.id)
    }

    /// Attribute or property value
    pub fn attribute(&self, name: &str) -> DriverResult<Option<String>> {
        self.driver.attribute(&self.id, name)
    }

    /// Whether the element is rendered
    pub fn is_displayed(&self) -> DriverResult<bool> {
        self.driver.is_displayed(&self.id)
    }

    /// Tag name
    pub fn tag_name(&self) -> DriverResult<String> {
        self.driver.tag_name(&self.id)
    }

    /// Whether the element accepts interaction
    pub fn is_enabled(&self) -> DriverResult<bool> {
        self.driver.is_enabled(&self.id)
    }

    /// Whether the element is selected or checked
    pub fn is_selected(&self) -> DriverResult<bool> {
        self.driver.is_selected(&self.id)
    }

    /// Outer HTML, empty when the driver cannot provide it
    pub fn outer_html(&self) -> DriverResult<String> {
        Ok(self.attribute("outerHTML")?.unwrap_or_default())
    }

    /// First descendant matching `selector`
    pub fn find(&self, selector: &Selector) -> DriverResult<Self> {
        let id = self.driver.find(Some(&self.id), selector)?;
        Ok(Self::new(id, Arc::clone(&self.driver)))
    }

    /// All descendants matching `selector`
    pub fn find_all(&self, selector: &Selector) -> DriverResult<Vec<Self>> {
        Ok(self
            .driver
            .find_all(Some(&self.id), selector)?
            .into_iter()
            .map(|id| Self::new(id, Arc::clone(&self.driver)))
            .collect())
    }
}

/// Driver-like options, handed to a [`DriverFactory`] by value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverSettings {
    /// Desired driver name ("chrome", "firefox", "appium", ...)
    pub name: String,
    /// Remote server URL; when set, factories should build a remote session
    pub remote_url: Option<String>,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            name: "chrome".to_string(),
            remote_url: None,
        }
    }
}

/// Builds a driver from a settings snapshot
pub type DriverFactory = Arc<dyn Fn(DriverSettings) -> DriverResult<Arc<dyn Driver>> + Send + Sync>;

/// Lazily-initialized driver slot.
///
/// Clones share the slot. The factory never sees the configuration that
/// owns the holder, only a [`DriverSettings`] snapshot, so building a
/// driver cannot recurse back into driver access.
#[derive(Clone, Default)]
pub struct DriverHolder {
    slot: Arc<Mutex<Option<Arc<dyn Driver>>>>,
    factory: Option<DriverFactory>,
}

impl fmt::Debug for DriverHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverHolder")
            .field("built", &self.is_built())
            .field("has_factory", &self.factory.is_some())
            .finish()
    }
}

impl DriverHolder {
    /// Holder with neither a driver nor a factory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Holder around an existing driver
    #[must_use]
    pub fn with_driver(driver: Arc<dyn Driver>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(driver))),
            factory: None,
        }
    }

    /// Holder that builds on first access
    #[must_use]
    pub fn lazy(factory: DriverFactory) -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            factory: Some(factory),
        }
    }

    /// Same factory, new empty slot
    #[must_use]
    pub fn fresh(&self) -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            factory: self.factory.clone(),
        }
    }

    /// Same factory, slot pre-filled with `driver`
    #[must_use]
    pub fn replaced(&self, driver: Arc<dyn Driver>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(driver))),
            factory: self.factory.clone(),
        }
    }

    /// Whether a driver currently sits in the slot
    #[must_use]
    pub fn is_built(&self) -> bool {
        self.slot.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }

    /// Get the driver, building it from `settings` if needed.
    ///
    /// With `rebuild_not_alive` a stored driver whose session died is
    /// replaced by a new one.
    pub fn get(
        &self,
        settings: &DriverSettings,
        rebuild_not_alive: bool,
    ) -> DriverResult<Arc<dyn Driver>> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| DriverError::session("driver holder lock poisoned"))?;
        if let Some(driver) = slot.as_ref() {
            if !rebuild_not_alive || driver.is_alive() {
                return Ok(Arc::clone(driver));
            }
            tracing::debug!(driver = %settings.name, "stored driver is not alive, rebuilding");
        }
        let factory = self.factory.as_ref().ok_or_else(|| {
            DriverError::session("no driver is set and no driver factory is configured")
        })?;
        let driver = factory(settings.clone())?;
        tracing::debug!(
            driver = %settings.name,
            remote = settings.remote_url.as_deref().unwrap_or("-"),
            "built driver"
        );
        *slot = Some(Arc::clone(&driver));
        Ok(driver)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mock::{MockDriver, MockNode};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_factory(builds: Arc<AtomicUsize>) -> DriverFactory {
        Arc::new(move |settings: DriverSettings| {
            builds.fetch_add(1, Ordering::SeqCst);
            let driver = MockDriver::with_body(vec![MockNode::new("p").text(settings.name)]);
            Ok(Arc::new(driver) as Arc<dyn Driver>)
        })
    }

    mod holder_tests {
        use super::*;

        #[test]
        fn test_empty_holder_fails_with_session_error() {
            let holder = DriverHolder::new();
            let err = holder.get(&DriverSettings::default(), false).err().unwrap();
            assert!(!err.is_recoverable());
        }

        #[test]
        fn test_lazy_holder_builds_once() {
            let builds = Arc::new(AtomicUsize::new(0));
            let holder = DriverHolder::lazy(counting_factory(Arc::clone(&builds)));
            assert!(!holder.is_built());
            holder.get(&DriverSettings::default(), false).unwrap();
            holder.get(&DriverSettings::default(), false).unwrap();
            assert!(holder.is_built());
            assert_eq!(builds.load(Ordering::SeqCst), 1);
        }

        #[test]
        fn test_factory_receives_settings_snapshot() {
            let holder = DriverHolder::lazy(counting_factory(Arc::new(AtomicUsize::new(0))));
            let settings = DriverSettings {
                name: "firefox".into(),
                remote_url: None,
            };
            let driver = holder.get(&settings, false).unwrap();
            let p = driver.find(None, &Selector::css("p")).unwrap();
            assert_eq!(driver.text(&p).unwrap(), "firefox");
        }

        #[test]
        fn test_clones_share_slot_fresh_does_not() {
            let builds = Arc::new(AtomicUsize::new(0));
            let holder = DriverHolder::lazy(counting_factory(Arc::clone(&builds)));
            let shared = holder.clone();
            let fresh = holder.fresh();
            holder.get(&DriverSettings::default(), false).unwrap();
            assert!(shared.is_built());
            assert!(!fresh.is_built());
        }

        #[test]
        fn test_dead_driver_rebuilt_only_when_enabled() {
            let builds = Arc::new(AtomicUsize::new(0));
            let holder = DriverHolder::lazy(counting_factory(Arc::clone(&builds)));
            let dead = MockDriver::new(MockNode::new("html"));
            dead.kill();
            let holder = holder.replaced(Arc::new(dead));

            let kept = holder.get(&DriverSettings::default(), false).unwrap();
            assert!(!kept.is_alive());
            assert_eq!(builds.load(Ordering::SeqCst), 0);

            let rebuilt = holder.get(&DriverSettings::default(), true).unwrap();
            assert!(rebuilt.is_alive());
            assert_eq!(builds.load(Ordering::SeqCst), 1);
        }
    }

    mod web_element_tests {
        use super::*;

        #[test]
        fn test_scoped_find() {
            let driver: Arc<dyn Driver> = Arc::new(MockDriver::with_body(vec![
                MockNode::new("ul").id("a").child(MockNode::new("li").text("one")),
                MockNode::new("ul").id("b").child(MockNode::new("li").text("two")),
            ]));
            let ul = WebElement::new(driver.find(None, &Selector::css("#b")).unwrap(), driver);
            let li = ul.find(&Selector::css("li")).unwrap();
            assert_eq!(li.text().unwrap(), "two");
            assert_eq!(ul.find_all(&Selector::css("li")).unwrap().len(), 1);
        }
    }
}
