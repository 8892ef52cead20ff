//! Configuration
//!
//! [`Config`] is an immutable value. Every `with_*` builder returns a new
//! config and leaves the original untouched; shared parts (the driver
//! holder, hooks, artifact bookkeeping) are reference counted.
//!
//! The serializable subset lives in [`Settings`], loadable from YAML or
//! JSON with durations in milliseconds.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::diagnostics::{self, ArtifactLog};
use crate::driver::{Driver, DriverFactory, DriverHolder, DriverSettings};
use crate::entity::Entity;
use crate::result::{DriverResult, EsperarError, EsperarResult, TimeoutFailure};
use crate::wait::{FailureHook, Wait, WaitDecorator, DEFAULT_POLL_INTERVAL_MS, DEFAULT_TIMEOUT_MS};

/// `~/.esperar/screenshots/<millis>`, or under the temp dir without a home
fn default_reports_folder() -> PathBuf {
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map_or_else(std::env::temp_dir, PathBuf::from);
    home.join(".esperar")
        .join("screenshots")
        .join(chrono::Utc::now().timestamp_millis().to_string())
}

// =============================================================================
// SETTINGS
// =============================================================================

/// Serializable configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Wait timeout in milliseconds
    pub timeout_ms: u64,
    /// Poll interval in milliseconds
    pub poll_interval_ms: u64,
    /// Driver name
    pub driver_name: String,
    /// Remote driver URL
    pub driver_remote_url: Option<String>,
    /// Rebuild the driver when its session died
    pub rebuild_not_alive_driver: bool,
    /// Where failure artifacts go; a timestamped home folder when unset
    pub reports_folder: Option<PathBuf>,
    /// Save a screenshot on wait failure
    pub save_screenshot_on_failure: bool,
    /// Save the page source on wait failure
    pub save_page_source_on_failure: bool,
    /// Append the entity's outer HTML to wait failures
    pub log_outer_html_on_failure: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            driver_name: DriverSettings::default().name,
            driver_remote_url: None,
            rebuild_not_alive_driver: false,
            reports_folder: None,
            save_screenshot_on_failure: true,
            save_page_source_on_failure: true,
            log_outer_html_on_failure: false,
        }
    }
}

impl Settings {
    /// Parse YAML settings
    ///
    /// # Errors
    ///
    /// Returns an error on malformed YAML or unknown keys.
    pub fn from_yaml(yaml: &str) -> EsperarResult<Self> {
        Ok(serde_yaml_ng::from_str(yaml)?)
    }

    /// Parse JSON settings
    ///
    /// # Errors
    ///
    /// Returns an error on malformed JSON or unknown keys.
    pub fn from_json(json: &str) -> EsperarResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load settings from a `.yaml`, `.yml` or `.json` file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or has
    /// another extension.
    pub fn load(path: &Path) -> EsperarResult<Self> {
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml" | "yml") => Self::from_yaml(&content),
            Some("json") => Self::from_json(&content),
            _ => Err(EsperarError::config(format!(
                "unsupported settings file: {}",
                path.display()
            ))),
        }
    }

    /// Render as YAML
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_yaml(&self) -> EsperarResult<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }
}

// =============================================================================
// OVERRIDES
// =============================================================================

/// Partial configuration applied by [`Config::with_overrides`]
#[derive(Clone, Default)]
pub struct ConfigOverrides {
    /// Wait timeout
    pub timeout: Option<Duration>,
    /// Poll interval
    pub poll_interval: Option<Duration>,
    /// Driver name
    pub driver_name: Option<String>,
    /// Remote driver URL
    pub driver_remote_url: Option<String>,
    /// Driver to use from now on
    pub driver: Option<Arc<dyn Driver>>,
    /// Factory for lazily built drivers
    pub driver_factory: Option<DriverFactory>,
    /// Rebuild the driver when its session died
    pub rebuild_not_alive_driver: Option<bool>,
    /// Failure artifact folder
    pub reports_folder: Option<PathBuf>,
    /// Save a screenshot on wait failure
    pub save_screenshot_on_failure: Option<bool>,
    /// Save the page source on wait failure
    pub save_page_source_on_failure: Option<bool>,
    /// Append the entity's outer HTML to wait failures
    pub log_outer_html_on_failure: Option<bool>,
    /// User failure hook
    pub hook_wait_failure: Option<FailureHook>,
    /// Attempt decorator
    pub wait_decorator: Option<WaitDecorator>,
}

impl fmt::Debug for ConfigOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigOverrides")
            .field("timeout", &self.timeout)
            .field("poll_interval", &self.poll_interval)
            .field("driver_name", &self.driver_name)
            .field("driver_remote_url", &self.driver_remote_url)
            .field("driver", &self.driver.is_some())
            .field("driver_factory", &self.driver_factory.is_some())
            .finish_non_exhaustive()
    }
}

impl ConfigOverrides {
    /// Empty overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the timeout
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Override the poll interval
    #[must_use]
    pub const fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = Some(poll_interval);
        self
    }

    /// Override the driver name
    #[must_use]
    pub fn driver_name(mut self, name: impl Into<String>) -> Self {
        self.driver_name = Some(name.into());
        self
    }

    /// Override the driver
    #[must_use]
    pub fn driver(mut self, driver: Arc<dyn Driver>) -> Self {
        self.driver = Some(driver);
        self
    }

    fn touches_driver_options(&self) -> bool {
        self.driver_name.is_some() || self.driver_remote_url.is_some()
    }
}

// =============================================================================
// CONFIG
// =============================================================================

/// Session context shared by entities
#[derive(Clone)]
pub struct Config {
    timeout: Duration,
    poll_interval: Duration,
    driver_name: String,
    driver_remote_url: Option<String>,
    rebuild_not_alive_driver: bool,
    reports_folder: PathBuf,
    save_screenshot_on_failure: bool,
    save_page_source_on_failure: bool,
    log_outer_html_on_failure: bool,
    hook_wait_failure: Option<FailureHook>,
    wait_decorator: Option<WaitDecorator>,
    driver: DriverHolder,
    artifacts: Arc<ArtifactLog>,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_settings(Settings::default(), DriverHolder::new())
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("timeout", &self.timeout)
            .field("poll_interval", &self.poll_interval)
            .field("driver_name", &self.driver_name)
            .field("driver_remote_url", &self.driver_remote_url)
            .field("rebuild_not_alive_driver", &self.rebuild_not_alive_driver)
            .field("reports_folder", &self.reports_folder)
            .field("save_screenshot_on_failure", &self.save_screenshot_on_failure)
            .field("save_page_source_on_failure", &self.save_page_source_on_failure)
            .field("log_outer_html_on_failure", &self.log_outer_html_on_failure)
            .field("hook_wait_failure", &self.hook_wait_failure.is_some())
            .field("wait_decorator", &self.wait_decorator.is_some())
            .field("driver", &self.driver)
            .finish()
    }
}

impl Config {
    /// Default configuration without a driver
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from settings and a driver holder
    #[must_use]
    pub fn from_settings(settings: Settings, driver: DriverHolder) -> Self {
        Self {
            timeout: Duration::from_millis(settings.timeout_ms),
            poll_interval: Duration::from_millis(settings.poll_interval_ms),
            driver_name: settings.driver_name,
            driver_remote_url: settings.driver_remote_url,
            rebuild_not_alive_driver: settings.rebuild_not_alive_driver,
            reports_folder: settings
                .reports_folder
                .unwrap_or_else(default_reports_folder),
            save_screenshot_on_failure: settings.save_screenshot_on_failure,
            save_page_source_on_failure: settings.save_page_source_on_failure,
            log_outer_html_on_failure: settings.log_outer_html_on_failure,
            hook_wait_failure: None,
            wait_decorator: None,
            driver,
            artifacts: Arc::new(ArtifactLog::new()),
        }
    }

    /// Serializable snapshot
    #[must_use]
    pub fn settings(&self) -> Settings {
        Settings {
            timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            poll_interval_ms: u64::try_from(self.poll_interval.as_millis()).unwrap_or(u64::MAX),
            driver_name: self.driver_name.clone(),
            driver_remote_url: self.driver_remote_url.clone(),
            rebuild_not_alive_driver: self.rebuild_not_alive_driver,
            reports_folder: Some(self.reports_folder.clone()),
            save_screenshot_on_failure: self.save_screenshot_on_failure,
            save_page_source_on_failure: self.save_page_source_on_failure,
            log_outer_html_on_failure: self.log_outer_html_on_failure,
        }
    }

    /// New config with `overrides` applied.
    ///
    /// Overriding the driver name or remote URL without also giving a
    /// driver yields an unbuilt holder, so the next access builds a new
    /// driver; otherwise the holder is shared with `self`.
    #[must_use]
    pub fn with_overrides(&self, overrides: ConfigOverrides) -> Self {
        let mut driver = match &overrides.driver_factory {
            Some(factory) => DriverHolder::lazy(Arc::clone(factory)),
            None if overrides.touches_driver_options() => self.driver.fresh(),
            None => self.driver.clone(),
        };
        if let Some(instance) = overrides.driver {
            driver = driver.replaced(instance);
        }
        Self {
            timeout: overrides.timeout.unwrap_or(self.timeout),
            poll_interval: overrides.poll_interval.unwrap_or(self.poll_interval),
            driver_name: overrides
                .driver_name
                .unwrap_or_else(|| self.driver_name.clone()),
            driver_remote_url: overrides
                .driver_remote_url
                .or_else(|| self.driver_remote_url.clone()),
            rebuild_not_alive_driver: overrides
                .rebuild_not_alive_driver
                .unwrap_or(self.rebuild_not_alive_driver),
            reports_folder: overrides
                .reports_folder
                .unwrap_or_else(|| self.reports_folder.clone()),
            save_screenshot_on_failure: overrides
                .save_screenshot_on_failure
                .unwrap_or(self.save_screenshot_on_failure),
            save_page_source_on_failure: overrides
                .save_page_source_on_failure
                .unwrap_or(self.save_page_source_on_failure),
            log_outer_html_on_failure: overrides
                .log_outer_html_on_failure
                .unwrap_or(self.log_outer_html_on_failure),
            hook_wait_failure: overrides
                .hook_wait_failure
                .or_else(|| self.hook_wait_failure.clone()),
            wait_decorator: overrides
                .wait_decorator
                .or_else(|| self.wait_decorator.clone()),
            driver,
            artifacts: Arc::clone(&self.artifacts),
        }
    }

    /// Set timeout
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_overrides(ConfigOverrides::new().timeout(timeout))
    }

    /// Set polling interval
    #[must_use]
    pub fn with_poll_interval(&self, poll_interval: Duration) -> Self {
        self.with_overrides(ConfigOverrides::new().poll_interval(poll_interval))
    }

    /// Use `driver`
    #[must_use]
    pub fn with_driver(&self, driver: Arc<dyn Driver>) -> Self {
        self.with_overrides(ConfigOverrides::new().driver(driver))
    }

    /// Build drivers lazily with `factory`
    #[must_use]
    pub fn with_driver_factory(&self, factory: DriverFactory) -> Self {
        self.with_overrides(ConfigOverrides {
            driver_factory: Some(factory),
            ..ConfigOverrides::default()
        })
    }

    /// Set the failure artifact folder
    #[must_use]
    pub fn with_reports_folder(&self, folder: impl Into<PathBuf>) -> Self {
        self.with_overrides(ConfigOverrides {
            reports_folder: Some(folder.into()),
            ..ConfigOverrides::default()
        })
    }

    /// Toggle screenshot and page-source capture together
    #[must_use]
    pub fn with_capture_on_failure(&self, enabled: bool) -> Self {
        self.with_overrides(ConfigOverrides {
            save_screenshot_on_failure: Some(enabled),
            save_page_source_on_failure: Some(enabled),
            ..ConfigOverrides::default()
        })
    }

    /// Toggle the outer-HTML dump
    #[must_use]
    pub fn with_log_outer_html_on_failure(&self, enabled: bool) -> Self {
        self.with_overrides(ConfigOverrides {
            log_outer_html_on_failure: Some(enabled),
            ..ConfigOverrides::default()
        })
    }

    /// Set the user failure hook
    #[must_use]
    pub fn with_hook_wait_failure(&self, hook: FailureHook) -> Self {
        self.with_overrides(ConfigOverrides {
            hook_wait_failure: Some(hook),
            ..ConfigOverrides::default()
        })
    }

    /// Set the attempt decorator
    #[must_use]
    pub fn with_wait_decorator(&self, decorator: WaitDecorator) -> Self {
        self.with_overrides(ConfigOverrides {
            wait_decorator: Some(decorator),
            ..ConfigOverrides::default()
        })
    }

    /// Wait timeout
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Poll interval
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Driver name
    #[must_use]
    pub fn driver_name(&self) -> &str {
        &self.driver_name
    }

    /// Remote driver URL
    #[must_use]
    pub fn driver_remote_url(&self) -> Option<&str> {
        self.driver_remote_url.as_deref()
    }

    /// Failure artifact folder
    #[must_use]
    pub fn reports_folder(&self) -> &Path {
        &self.reports_folder
    }

    /// Whether screenshots are saved on failure
    #[must_use]
    pub const fn save_screenshot_on_failure(&self) -> bool {
        self.save_screenshot_on_failure
    }

    /// Whether page sources are saved on failure
    #[must_use]
    pub const fn save_page_source_on_failure(&self) -> bool {
        self.save_page_source_on_failure
    }

    /// Whether failures carry the entity's outer HTML
    #[must_use]
    pub const fn log_outer_html_on_failure(&self) -> bool {
        self.log_outer_html_on_failure
    }

    /// Snapshot of the driver-like options
    #[must_use]
    pub fn driver_settings(&self) -> DriverSettings {
        DriverSettings {
            name: self.driver_name.clone(),
            remote_url: self.driver_remote_url.clone(),
        }
    }

    /// The driver, built on first access
    ///
    /// # Errors
    ///
    /// Returns a session error when no driver can be produced.
    pub fn driver(&self) -> DriverResult<Arc<dyn Driver>> {
        self.driver
            .get(&self.driver_settings(), self.rebuild_not_alive_driver)
    }

    /// Whether this config currently holds a built driver
    #[must_use]
    pub fn has_built_driver(&self) -> bool {
        self.driver.is_built()
    }

    /// Last screenshot saved by any config sharing this one's root
    #[must_use]
    pub fn last_screenshot(&self) -> Option<PathBuf> {
        self.artifacts.last_screenshot()
    }

    /// Last page source saved by any config sharing this one's root
    #[must_use]
    pub fn last_page_source(&self) -> Option<PathBuf> {
        self.artifacts.last_page_source()
    }

    /// Retry loop for `entity` with this config's timeout, decorator and
    /// failure pipeline (screenshot, page source, user hook).
    #[must_use]
    pub fn wait<E: Entity>(&self, entity: E) -> Wait<E> {
        let hook = self.failure_pipeline(entity.clone());
        Wait::new(entity, self.timeout)
            .with_poll_interval(self.poll_interval)
            .or_fail_with(Some(hook))
            .with_decorator(self.wait_decorator.clone())
    }

    fn failure_pipeline<E: Entity>(&self, entity: E) -> FailureHook {
        let config = self.clone();
        Arc::new(move |error: EsperarError| {
            let error = match error {
                EsperarError::Timeout(failure) => {
                    EsperarError::Timeout(config.enrich(failure, &entity))
                }
                other => other,
            };
            match &config.hook_wait_failure {
                Some(hook) => hook(error),
                None => error,
            }
        })
    }

    fn enrich<E: Entity>(&self, mut failure: TimeoutFailure, entity: &E) -> TimeoutFailure {
        if self.log_outer_html_on_failure {
            match entity.describe_actual() {
                Ok(dump) => failure.actual_entity = dump,
                Err(e) => tracing::warn!(entity = %entity, error = %e, "cannot dump actual entity"),
            }
        }
        if !(self.save_screenshot_on_failure || self.save_page_source_on_failure) {
            return failure;
        }
        let driver = match self.driver() {
            Ok(driver) => driver,
            Err(e) => {
                tracing::warn!(error = %e, "no driver for failure artifacts");
                return failure;
            }
        };
        if self.save_screenshot_on_failure {
            failure.screenshot =
                diagnostics::capture_screenshot(driver.as_ref(), &self.reports_folder, &self.artifacts);
        }
        if self.save_page_source_on_failure {
            failure.page_source = diagnostics::capture_page_source(
                driver.as_ref(),
                &self.reports_folder,
                failure.screenshot.as_deref(),
                &self.artifacts,
            );
        }
        failure
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mock::{MockDriver, MockNode};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn mock() -> Arc<dyn Driver> {
        Arc::new(MockDriver::new(MockNode::new("html")))
    }

    mod settings_tests {
        use super::*;

        #[test]
        fn test_defaults() {
            let settings = Settings::default();
            assert_eq!(settings.timeout_ms, 4_000);
            assert_eq!(settings.poll_interval_ms, 100);
            assert_eq!(settings.driver_name, "chrome");
            assert!(settings.save_screenshot_on_failure);
            assert!(settings.save_page_source_on_failure);
            assert!(!settings.log_outer_html_on_failure);
            assert!(!settings.rebuild_not_alive_driver);
        }

        #[test]
        fn test_yaml_partial() {
            let settings = Settings::from_yaml("timeout_ms: 250\ndriver_name: firefox\n").unwrap();
            assert_eq!(settings.timeout_ms, 250);
            assert_eq!(settings.driver_name, "firefox");
            assert_eq!(settings.poll_interval_ms, 100);
        }

        #[test]
        fn test_json_and_unknown_keys() {
            let settings =
                Settings::from_json(r#"{"save_screenshot_on_failure": false}"#).unwrap();
            assert!(!settings.save_screenshot_on_failure);
            assert!(Settings::from_json(r#"{"timeout": 1}"#).is_err());
        }

        #[test]
        fn test_load_by_extension() {
            let dir = tempfile::tempdir().unwrap();
            let yaml = dir.path().join("esperar.yml");
            std::fs::write(&yaml, "poll_interval_ms: 5\n").unwrap();
            assert_eq!(Settings::load(&yaml).unwrap().poll_interval_ms, 5);

            let toml = dir.path().join("esperar.toml");
            std::fs::write(&toml, "").unwrap();
            assert!(matches!(
                Settings::load(&toml).unwrap_err(),
                EsperarError::Config { .. }
            ));
        }

        #[test]
        fn test_yaml_round_trip_through_config() {
            let config = Config::new()
                .with_timeout(Duration::from_millis(1_500))
                .with_reports_folder("/tmp/esperar-reports");
            let yaml = config.settings().to_yaml().unwrap();
            let restored = Config::from_settings(Settings::from_yaml(&yaml).unwrap(), DriverHolder::new());
            assert_eq!(restored.timeout(), Duration::from_millis(1_500));
            assert_eq!(restored.reports_folder(), Path::new("/tmp/esperar-reports"));
        }
    }

    mod override_tests {
        use super::*;

        #[test]
        fn test_overrides_do_not_mutate_original() {
            let base = Config::new();
            let quick = base.with_timeout(Duration::from_millis(10));
            assert_eq!(base.timeout(), Duration::from_secs(4));
            assert_eq!(quick.timeout(), Duration::from_millis(10));
            assert_eq!(quick.poll_interval(), base.poll_interval());
        }

        #[test]
        fn test_driver_shared_unless_driver_options_change() {
            let builds = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&builds);
            let factory: DriverFactory = Arc::new(move |_settings: DriverSettings| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(mock())
            });
            let base = Config::new().with_driver_factory(factory);
            base.driver().unwrap();

            let same = base.with_timeout(Duration::ZERO);
            assert!(same.has_built_driver());
            same.driver().unwrap();
            assert_eq!(builds.load(Ordering::SeqCst), 1);

            let other = base.with_overrides(ConfigOverrides::new().driver_name("firefox"));
            assert!(!other.has_built_driver());
            other.driver().unwrap();
            assert_eq!(builds.load(Ordering::SeqCst), 2);
            assert_eq!(other.driver_settings().name, "firefox");
        }

        #[test]
        fn test_explicit_driver_wins() {
            let config = Config::new()
                .with_overrides(ConfigOverrides::new().driver_name("safari").driver(mock()));
            assert!(config.has_built_driver());
            assert!(config.driver().is_ok());
        }

        #[test]
        fn test_no_driver_is_session_error() {
            let err = Config::new().driver().err().unwrap();
            assert!(!err.is_recoverable());
        }
    }
}
