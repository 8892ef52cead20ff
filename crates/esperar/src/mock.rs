//! Mock driver for unit testing
//!
//! [`MockDriver`] serves an in-memory [`MockNode`] tree. Clones share the
//! same document, so a test can keep one handle, give another to a
//! [`Config`](crate::Config), and mutate the page between polls.
//!
//! Supported CSS: type (`li`), id (`#x`), class (`.c`), attribute presence
//! and equality (`[type=text]`), compounds of those (`input#name.wide`),
//! the descendant combinator and selector lists. Rendered text follows
//! browser rules: hidden nodes render nothing and whitespace collapses.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::driver::{Driver, ElementId};
use crate::result::{DriverError, DriverResult};
use crate::selector::Selector;

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

const VOID_ELEMENTS: &[&str] = &["area", "br", "col", "hr", "img", "input", "link", "meta"];

const BOOLEAN_ATTRIBUTES: &[&str] = &[
    "checked", "disabled", "hidden", "multiple", "readonly", "required", "selected",
];

// =============================================================================
// DOCUMENT
// =============================================================================

/// A node of the mock document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockNode {
    tag: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<MockNode>,
}

impl MockNode {
    /// Create a node with the given tag
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: Vec::new(),
            text: String::new(),
            children: Vec::new(),
        }
    }

    /// Set the `id` attribute
    #[must_use]
    pub fn id(self, id: impl Into<String>) -> Self {
        self.attr("id", id)
    }

    /// Add a CSS class
    #[must_use]
    pub fn class(mut self, class: &str) -> Self {
        let classes = match self.attribute("class") {
            Some(existing) if !existing.is_empty() => format!("{existing} {class}"),
            _ => class.to_string(),
        };
        self.set_attr("class", classes);
        self
    }

    /// Set an attribute
    #[must_use]
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Set a boolean attribute such as `checked` or `disabled`
    #[must_use]
    pub fn flag(self, name: impl Into<String>) -> Self {
        self.attr(name, "")
    }

    /// Set the node's own text
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Hide the node with `display: none`
    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.set_hidden(true);
        self
    }

    /// Append a child
    #[must_use]
    pub fn child(mut self, child: Self) -> Self {
        self.children.push(child);
        self
    }

    /// Append several children
    #[must_use]
    pub fn children(mut self, children: impl IntoIterator<Item = Self>) -> Self {
        self.children.extend(children);
        self
    }

    /// Tag name
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Raw attribute value
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Own text, excluding children
    #[must_use]
    pub fn own_text(&self) -> &str {
        &self.text
    }

    /// Child nodes
    #[must_use]
    pub fn child_nodes(&self) -> &[Self] {
        &self.children
    }

    /// Replace the node's own text
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    /// Set or replace an attribute
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(key, _)| *key == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name, value)),
        }
    }

    /// Remove an attribute
    pub fn remove_attr(&mut self, name: &str) {
        self.attributes.retain(|(key, _)| key != name);
    }

    /// Show or hide the node
    pub fn set_hidden(&mut self, hidden: bool) {
        if hidden {
            self.set_attr("style", "display: none");
        } else {
            self.remove_attr("style");
        }
    }

    /// Append a child
    pub fn push_child(&mut self, child: Self) {
        self.children.push(child);
    }

    /// Remove all children
    pub fn clear_children(&mut self) {
        self.children.clear();
    }

    /// First descendant-or-self matching a CSS selector
    pub fn find_mut(&mut self, css: &str) -> Option<&mut Self> {
        let query = Query::Css(parse_css(css).ok()?);
        let path = query_paths(self, &query).into_iter().next()?;
        node_at_mut(self, &path)
    }

    fn is_self_displayed(&self) -> bool {
        let style_hidden = self
            .attribute("style")
            .is_some_and(|style| style.replace(' ', "").contains("display:none"));
        let hidden_input = self.tag.eq_ignore_ascii_case("input")
            && self
                .attribute("type")
                .is_some_and(|kind| kind.eq_ignore_ascii_case("hidden"));
        !(style_hidden || hidden_input || self.attribute("hidden").is_some())
    }

    fn rendered_text(&self) -> String {
        if !self.is_self_displayed() {
            return String::new();
        }
        let mut raw = self.text.clone();
        for child in &self.children {
            raw.push(' ');
            raw.push_str(&child.rendered_text());
        }
        collapse_whitespace(&raw)
    }

    fn is_tag(&self, tag: &str) -> bool {
        self.tag.eq_ignore_ascii_case(tag)
    }

    fn input_type(&self) -> String {
        self.attribute("type").unwrap_or("text").to_ascii_lowercase()
    }

    fn option_value(&self) -> String {
        self.attribute("value")
            .map_or_else(|| collapse_whitespace(&self.text), str::to_string)
    }

    /// Property-style `value`, as a browser reports it
    fn value(&self) -> Option<String> {
        if self.is_tag("textarea") {
            return Some(
                self.attribute("value")
                    .map_or_else(|| self.text.clone(), str::to_string),
            );
        }
        if self.is_tag("select") {
            let options = descendants(self)
                .into_iter()
                .filter(|node| node.is_tag("option"))
                .collect::<Vec<_>>();
            let chosen = options
                .iter()
                .find(|option| option.attribute("selected").is_some())
                .or_else(|| options.first());
            return Some(chosen.map(|option| option.option_value()).unwrap_or_default());
        }
        if self.is_tag("option") {
            return Some(self.option_value());
        }
        if self.is_tag("input") {
            if let Some(value) = self.attribute("value") {
                return Some(value.to_string());
            }
            let default = match self.input_type().as_str() {
                "range" => "50",
                "color" => "#000000",
                "checkbox" | "radio" => "on",
                _ => "",
            };
            return Some(default.to_string());
        }
        self.attribute("value").map(str::to_string)
    }

    fn outer_html(&self) -> String {
        let mut html = String::new();
        self.write_html(&mut html);
        html
    }

    fn inner_html(&self) -> String {
        let mut html = escape(&self.text, false);
        for child in &self.children {
            child.write_html(&mut html);
        }
        html
    }

    fn write_html(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.tag);
        for (name, value) in &self.attributes {
            if value.is_empty() && BOOLEAN_ATTRIBUTES.contains(&name.as_str()) {
                let _ = write!(out, " {name}");
            } else {
                let _ = write!(out, " {name}=\"{}\"", escape(value, true));
            }
        }
        out.push('>');
        if VOID_ELEMENTS.contains(&self.tag.to_ascii_lowercase().as_str()) {
            return;
        }
        out.push_str(&self.inner_html());
        let _ = write!(out, "</{}>", self.tag);
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn escape(text: &str, attribute: bool) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' if attribute => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn descendants(node: &MockNode) -> Vec<&MockNode> {
    let mut found = Vec::new();
    for child in &node.children {
        found.push(child);
        found.extend(descendants(child));
    }
    found
}

fn node_at<'a>(root: &'a MockNode, path: &[usize]) -> Option<&'a MockNode> {
    path.iter()
        .try_fold(root, |node, &index| node.children.get(index))
}

fn node_at_mut<'a>(root: &'a mut MockNode, path: &[usize]) -> Option<&'a mut MockNode> {
    path.iter()
        .try_fold(root, |node, &index| node.children.get_mut(index))
}

// =============================================================================
// SELECTOR MATCHING
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attributes: Vec<(String, Option<String>)>,
}

impl Compound {
    fn matches(&self, node: &MockNode) -> bool {
        if let Some(tag) = &self.tag {
            if !node.is_tag(tag) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if node.attribute("id") != Some(id.as_str()) {
                return false;
            }
        }
        let classes = node.attribute("class").unwrap_or_default();
        if !self
            .classes
            .iter()
            .all(|wanted| classes.split_whitespace().any(|class| class == wanted))
        {
            return false;
        }
        self.attributes.iter().all(|(name, expected)| {
            match (node.attribute(name), expected) {
                (None, _) => false,
                (Some(_), None) => true,
                (Some(actual), Some(expected)) => actual == expected,
            }
        })
    }
}

/// Descendant chain, outermost first
type Chain = Vec<Compound>;

fn is_ident(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn parse_css(selector: &str) -> DriverResult<Vec<Chain>> {
    let unsupported = || DriverError::command(format!("invalid selector: {selector}"));
    let mut list = Vec::new();
    for part in selector.split(',') {
        let chain = part
            .split_whitespace()
            .map(parse_compound)
            .collect::<Option<Chain>>()
            .ok_or_else(unsupported)?;
        if chain.is_empty() {
            return Err(unsupported());
        }
        list.push(chain);
    }
    Ok(list)
}

fn parse_compound(token: &str) -> Option<Compound> {
    let is_marker = |c: char| matches!(c, '#' | '.' | '[');
    let mut compound = Compound::default();
    let tag_end = token.find(is_marker).unwrap_or(token.len());
    let tag = &token[..tag_end];
    if !tag.is_empty() && tag != "*" {
        if !is_ident(tag) {
            return None;
        }
        compound.tag = Some(tag.to_string());
    }
    let mut rest = &token[tag_end..];
    while let Some(marker) = rest.chars().next() {
        if marker == '[' {
            let close = rest.find(']')?;
            let inner = &rest[1..close];
            let (name, value) = match inner.split_once('=') {
                Some((name, value)) => (
                    name.trim(),
                    Some(value.trim().trim_matches(['"', '\'']).to_string()),
                ),
                None => (inner.trim(), None),
            };
            if !is_ident(name) {
                return None;
            }
            compound.attributes.push((name.to_string(), value));
            rest = &rest[close + 1..];
            continue;
        }
        let body = &rest[1..];
        let end = body.find(is_marker).unwrap_or(body.len());
        let name = &body[..end];
        if !is_ident(name) {
            return None;
        }
        match marker {
            '#' => compound.id = Some(name.to_string()),
            '.' => compound.classes.push(name.to_string()),
            _ => return None,
        }
        rest = &body[end..];
    }
    Some(compound)
}

fn chain_matches(chain: &[Compound], node: &MockNode, ancestors: &[&MockNode]) -> bool {
    let Some((last, mut remaining)) = chain.split_last() else {
        return false;
    };
    if !last.matches(node) {
        return false;
    }
    for ancestor in ancestors.iter().rev() {
        match remaining.split_last() {
            None => break,
            Some((compound, before)) if compound.matches(ancestor) => remaining = before,
            Some(_) => {}
        }
    }
    remaining.is_empty()
}

enum Query {
    Css(Vec<Chain>),
    Text(String),
    TestId(String),
}

impl Query {
    fn parse(selector: &Selector) -> DriverResult<Self> {
        match selector {
            Selector::Css(css) => parse_css(css).map(Self::Css),
            Selector::Text(text) => Ok(Self::Text(text.clone())),
            Selector::TestId(id) => Ok(Self::TestId(id.clone())),
            Selector::XPath(xpath) => Err(DriverError::command(format!(
                "xpath is not supported by the mock driver: {xpath}"
            ))),
        }
    }

    fn matches(&self, node: &MockNode, ancestors: &[&MockNode]) -> bool {
        match self {
            Self::Css(list) => list
                .iter()
                .any(|chain| chain_matches(chain, node, ancestors)),
            Self::Text(text) => node.text.contains(text.as_str()),
            Self::TestId(id) => node.attribute("data-testid") == Some(id.as_str()),
        }
    }
}

/// Paths of all nodes matching `query`, document order, root included
fn query_paths(root: &MockNode, query: &Query) -> Vec<Vec<usize>> {
    fn walk<'a>(
        node: &'a MockNode,
        query: &Query,
        path: &mut Vec<usize>,
        ancestors: &mut Vec<&'a MockNode>,
        found: &mut Vec<Vec<usize>>,
    ) {
        if query.matches(node, ancestors) {
            found.push(path.clone());
        }
        ancestors.push(node);
        for (index, child) in node.children.iter().enumerate() {
            path.push(index);
            walk(child, query, path, ancestors, found);
            path.pop();
        }
        ancestors.pop();
    }

    let mut found = Vec::new();
    walk(root, query, &mut Vec::new(), &mut Vec::new(), &mut found);
    found
}

// =============================================================================
// DRIVER
// =============================================================================

#[derive(Debug)]
struct MockState {
    root: MockNode,
    generation: u64,
    alive: bool,
    fail_screenshots: bool,
    url: String,
    title: String,
    call_history: Vec<String>,
}

impl MockState {
    fn element_id(&self, path: &[usize]) -> ElementId {
        let path = path
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("/");
        ElementId::new(format!("{}:{path}", self.generation))
    }

    fn path_of(&self, element: &ElementId) -> DriverResult<Vec<usize>> {
        let stale = || DriverError::StaleElement {
            message: format!(
                "stale element reference: element {element} is not attached to the page document"
            ),
        };
        let (generation, path) = element.as_str().split_once(':').ok_or_else(stale)?;
        if generation.parse::<u64>().ok() != Some(self.generation) {
            return Err(stale());
        }
        let path = if path.is_empty() {
            Vec::new()
        } else {
            path.split('/')
                .map(str::parse::<usize>)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| stale())?
        };
        node_at(&self.root, &path).map(|_| path).ok_or_else(stale)
    }

    fn node(&self, element: &ElementId) -> DriverResult<&MockNode> {
        let path = self.path_of(element)?;
        node_at(&self.root, &path).ok_or_else(|| DriverError::StaleElement {
            message: format!("element {element} is gone"),
        })
    }

    /// Displayed only when the node and all its ancestors are
    fn is_displayed(&self, element: &ElementId) -> DriverResult<bool> {
        let path = self.path_of(element)?;
        let mut node = &self.root;
        if !node.is_self_displayed() {
            return Ok(false);
        }
        for &index in &path {
            match node.children.get(index) {
                Some(child) if child.is_self_displayed() => node = child,
                _ => return Ok(false),
            }
        }
        Ok(true)
    }
}

/// In-memory [`Driver`] over a [`MockNode`] document
#[derive(Debug, Clone)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    /// Create a mock driver serving `root` as the whole document
    #[must_use]
    pub fn new(root: MockNode) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                root,
                generation: 0,
                alive: true,
                fail_screenshots: false,
                url: "about:blank".to_string(),
                title: String::new(),
                call_history: Vec::new(),
            })),
        }
    }

    /// Create a mock driver serving `<html><body>children</body></html>`
    #[must_use]
    pub fn with_body(children: Vec<MockNode>) -> Self {
        Self::new(MockNode::new("html").child(MockNode::new("body").children(children)))
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn session(&self, call: impl Into<String>) -> DriverResult<MutexGuard<'_, MockState>> {
        let mut state = self.lock();
        state.call_history.push(call.into());
        if !state.alive {
            return Err(DriverError::session("invalid session id"));
        }
        Ok(state)
    }

    /// Replace the whole document; previously found elements become stale
    pub fn set_document(&self, root: MockNode) {
        let mut state = self.lock();
        state.root = root;
        state.generation += 1;
    }

    /// Mutate the document in place; found elements stay valid
    pub fn update(&self, mutate: impl FnOnce(&mut MockNode)) {
        mutate(&mut self.lock().root);
    }

    /// Mutate the first node matching `css`; returns whether one matched
    pub fn update_first(&self, css: &str, mutate: impl FnOnce(&mut MockNode)) -> bool {
        let mut state = self.lock();
        match state.root.find_mut(css) {
            Some(node) => {
                mutate(node);
                true
            }
            None => false,
        }
    }

    /// Set the current URL
    pub fn navigate(&self, url: impl Into<String>) {
        self.lock().url = url.into();
    }

    /// Set the page title
    pub fn set_title(&self, title: impl Into<String>) {
        self.lock().title = title.into();
    }

    /// Terminate the session; every later call fails unrecoverably
    pub fn kill(&self) {
        self.lock().alive = false;
    }

    /// Make screenshot capture fail
    pub fn fail_screenshots(&self, fail: bool) {
        self.lock().fail_screenshots = fail;
    }

    /// Get call history
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.lock().call_history.clone()
    }

    /// Number of recorded calls starting with `method`
    #[must_use]
    pub fn calls(&self, method: &str) -> usize {
        self.lock()
            .call_history
            .iter()
            .filter(|call| call.split(':').next() == Some(method))
            .count()
    }

    /// Check if method was called
    #[must_use]
    pub fn was_called(&self, method: &str) -> bool {
        self.calls(method) > 0
    }
}

impl Driver for MockDriver {
    fn find(&self, scope: Option<&ElementId>, selector: &Selector) -> DriverResult<ElementId> {
        let found = self.find_all(scope, selector)?;
        found
            .into_iter()
            .next()
            .ok_or_else(|| DriverError::NoSuchElement {
                selector: selector.to_json(),
            })
    }

    fn find_all(
        &self,
        scope: Option<&ElementId>,
        selector: &Selector,
    ) -> DriverResult<Vec<ElementId>> {
        let state = self.session(format!("find:{selector}"))?;
        let query = Query::parse(selector)?;
        let base = match scope {
            Some(element) => Some(state.path_of(element)?),
            None => None,
        };
        Ok(query_paths(&state.root, &query)
            .into_iter()
            .filter(|path| {
                base.as_ref()
                    .map_or(true, |base| path.len() > base.len() && path.starts_with(base))
            })
            .map(|path| state.element_id(&path))
            .collect())
    }

    fn attribute(&self, element: &ElementId, name: &str) -> DriverResult<Option<String>> {
        let state = self.session(format!("attribute:{name}"))?;
        let node = state.node(element)?;
        Ok(match name {
            "value" => node.value(),
            "outerHTML" => Some(node.outer_html()),
            "innerHTML" => Some(node.inner_html()),
            "textContent" => Some(node.text.clone()),
            flag if BOOLEAN_ATTRIBUTES.contains(&flag) => {
                node.attribute(flag).map(|_| "true".to_string())
            }
            other => node.attribute(other).map(str::to_string),
        })
    }

    fn text(&self, element: &ElementId) -> DriverResult<String> {
        let state = self.session("text")?;
        if !state.is_displayed(element)? {
            return Ok(String::new());
        }
        Ok(state.node(element)?.rendered_text())
    }

    fn is_displayed(&self, element: &ElementId) -> DriverResult<bool> {
        self.session("is_displayed")?.is_displayed(element)
    }

    fn tag_name(&self, element: &ElementId) -> DriverResult<String> {
        let state = self.session("tag_name")?;
        Ok(state.node(element)?.tag.clone())
    }

    fn is_selected(&self, element: &ElementId) -> DriverResult<bool> {
        let state = self.session("is_selected")?;
        let node = state.node(element)?;
        Ok(node.attribute("checked").is_some() || node.attribute("selected").is_some())
    }

    fn save_screenshot(&self, path: &Path) -> DriverResult<()> {
        let state = self.session(format!("save_screenshot:{}", path.display()))?;
        if state.fail_screenshots {
            return Err(DriverError::command("unable to capture screenshot"));
        }
        fs::write(path, PNG_SIGNATURE)?;
        Ok(())
    }

    fn page_source(&self) -> DriverResult<String> {
        Ok(self.session("page_source")?.root.outer_html())
    }

    fn current_url(&self) -> DriverResult<String> {
        Ok(self.session("current_url")?.url.clone())
    }

    fn title(&self) -> DriverResult<String> {
        Ok(self.session("title")?.title.clone())
    }

    fn is_alive(&self) -> bool {
        self.lock().alive
    }
}
