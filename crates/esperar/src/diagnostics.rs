//! Failure diagnostics
//!
//! Renders the terminal failure message and captures screenshot/page-source
//! artifacts on the failure path. Capture is best effort: any error is
//! logged with `warn!` and the artifact is simply left out of the message.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::driver::Driver;

/// Render `<entity>.<condition>\n\nReason: <reason>\n` plus artifact links
#[must_use]
pub fn render(
    entity: &str,
    condition: &str,
    reason: &str,
    screenshot: Option<&Path>,
    page_source: Option<&Path>,
) -> String {
    let mut message = format!("{entity}.{condition}\n\nReason: {reason}\n");
    if let Some(path) = screenshot {
        message.push_str(&format!("Screenshot: file://{}\n", path.display()));
    }
    if let Some(path) = page_source {
        message.push_str(&format!("PageSource: file://{}\n", path.display()));
    }
    message
}

/// Naming counter and record of the last saved artifacts.
///
/// Shared by every configuration derived from the same root.
#[derive(Debug)]
pub struct ArtifactLog {
    counter: AtomicU64,
    last_screenshot: Mutex<Option<PathBuf>>,
    last_page_source: Mutex<Option<PathBuf>>,
}

impl Default for ArtifactLog {
    fn default() -> Self {
        let seed = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default();
        Self::starting_at(seed)
    }
}

impl ArtifactLog {
    /// Counter seeded from the current time in milliseconds
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter starting at `seed`
    #[must_use]
    pub const fn starting_at(seed: u64) -> Self {
        Self {
            counter: AtomicU64::new(seed),
            last_screenshot: Mutex::new(None),
            last_page_source: Mutex::new(None),
        }
    }

    /// Next unique file stem
    pub fn next_name(&self) -> String {
        self.counter.fetch_add(1, Ordering::SeqCst).to_string()
    }

    /// Last saved screenshot
    #[must_use]
    pub fn last_screenshot(&self) -> Option<PathBuf> {
        self.last_screenshot.lock().ok().and_then(|last| last.clone())
    }

    /// Last saved page source
    #[must_use]
    pub fn last_page_source(&self) -> Option<PathBuf> {
        self.last_page_source.lock().ok().and_then(|last| last.clone())
    }

    fn record_screenshot(&self, path: &Path) {
        if let Ok(mut last) = self.last_screenshot.lock() {
            *last = Some(path.to_path_buf());
        }
    }

    fn record_page_source(&self, path: &Path) {
        if let Ok(mut last) = self.last_page_source.lock() {
            *last = Some(path.to_path_buf());
        }
    }
}

/// Save a screenshot into `folder`, returning its path on success
pub fn capture_screenshot(driver: &dyn Driver, folder: &Path, log: &ArtifactLog) -> Option<PathBuf> {
    let path = folder.join(format!("{}.png", log.next_name()));
    if let Err(e) = fs::create_dir_all(folder) {
        tracing::warn!(folder = %folder.display(), error = %e, "cannot create reports folder");
        return None;
    }
    match driver.save_screenshot(&path) {
        Ok(()) => {
            log.record_screenshot(&path);
            Some(path)
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to save screenshot");
            None
        }
    }
}

/// Save the page source into `folder`.
///
/// When `screenshot` is given the file reuses its name with an `.html`
/// extension.
pub fn capture_page_source(
    driver: &dyn Driver,
    folder: &Path,
    screenshot: Option<&Path>,
    log: &ArtifactLog,
) -> Option<PathBuf> {
    let path = match screenshot {
        Some(png) => png.with_extension("html"),
        None => folder.join(format!("{}.html", log.next_name())),
    };
    let source = match driver.page_source() {
        Ok(source) => source,
        Err(e) => {
            tracing::warn!(error = %e, "failed to read page source");
            return None;
        }
    };
    let written = path
        .parent()
        .map_or(Ok(()), fs::create_dir_all)
        .and_then(|()| fs::write(&path, source));
    match written {
        Ok(()) => {
            log.record_page_source(&path);
            Some(path)
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to save page source");
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mock::{MockDriver, MockNode};

    mod render_tests {
        use super::*;

        #[test]
        fn test_render_without_artifacts() {
            let message = render(
                "browser.element(('css selector', '#x'))",
                "is visible",
                "ConditionMismatch: actual visibility: hidden",
                None,
                None,
            );
            assert_eq!(
                message,
                "browser.element(('css selector', '#x')).is visible\n\n\
                 Reason: ConditionMismatch: actual visibility: hidden\n"
            );
        }

        #[test]
        fn test_render_with_artifacts() {
            let message = render(
                "e",
                "c",
                "r",
                Some(Path::new("/tmp/1.png")),
                Some(Path::new("/tmp/1.html")),
            );
            assert!(message.ends_with(
                "Reason: r\nScreenshot: file:///tmp/1.png\nPageSource: file:///tmp/1.html\n"
            ));
        }

        #[test]
        fn test_render_page_source_only() {
            let message = render("e", "c", "r", None, Some(Path::new("/tmp/2.html")));
            assert!(!message.contains("Screenshot"));
            assert!(message.contains("PageSource: file:///tmp/2.html\n"));
        }
    }

    mod capture_tests {
        use super::*;

        fn driver() -> MockDriver {
            MockDriver::with_body(vec![MockNode::new("p").text("hello")])
        }

        #[test]
        fn test_counter_is_monotonic() {
            let log = ArtifactLog::starting_at(41);
            assert_eq!(log.next_name(), "41");
            assert_eq!(log.next_name(), "42");
        }

        #[test]
        fn test_screenshot_then_page_source_share_name() {
            let dir = tempfile::tempdir().unwrap();
            let folder = dir.path().join("reports");
            let log = ArtifactLog::starting_at(7);
            let driver = driver();

            let png = capture_screenshot(&driver, &folder, &log).unwrap();
            let html = capture_page_source(&driver, &folder, Some(&png), &log).unwrap();

            assert_eq!(png, folder.join("7.png"));
            assert_eq!(html, folder.join("7.html"));
            assert!(fs::read_to_string(&html).unwrap().contains("<p>hello</p>"));
            assert_eq!(log.last_screenshot(), Some(png));
            assert_eq!(log.last_page_source(), Some(html));
        }

        #[test]
        fn test_screenshot_failure_is_swallowed() {
            let dir = tempfile::tempdir().unwrap();
            let log = ArtifactLog::starting_at(1);
            let driver = driver();
            driver.fail_screenshots(true);

            assert!(capture_screenshot(&driver, dir.path(), &log).is_none());
            assert!(log.last_screenshot().is_none());

            let html = capture_page_source(&driver, dir.path(), None, &log).unwrap();
            assert_eq!(html, dir.path().join("2.html"));
        }

        #[test]
        fn test_dead_session_skips_page_source() {
            let dir = tempfile::tempdir().unwrap();
            let log = ArtifactLog::starting_at(1);
            let driver = driver();
            driver.kill();
            assert!(capture_page_source(&driver, dir.path(), None, &log).is_none());
        }
    }
}
