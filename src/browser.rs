use std::ffi::OsStr;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Duration;

use headless_chrome::browser::tab::NoElementFound;
use headless_chrome::{Browser, Element, LaunchOptions, Tab};
use log::{info, warn};
use serde_json::json;

use crate::config::BrowserOptions;
use crate::error::InteractionError;

// Keeps the DevTools connection alive while the user sits in the menu.
const IDLE_BROWSER_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// How to find an element on a page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    Name(String),
    Class(String),
    Tag(String),
    Css(String),
    XPath(String),
}

impl Locator {
    pub fn name(value: &str) -> Self {
        Locator::Name(value.to_string())
    }

    pub fn class(value: &str) -> Self {
        Locator::Class(value.to_string())
    }

    pub fn css(value: &str) -> Self {
        Locator::Css(value.to_string())
    }

    pub fn xpath(value: &str) -> Self {
        Locator::XPath(value.to_string())
    }

    /// CSS equivalent. `None` for XPath locators.
    pub fn to_css(&self) -> Option<String> {
        match self {
            Locator::Name(name) => Some(format!("[name=\"{}\"]", name)),
            Locator::Class(class) => Some(format!(".{}", class)),
            Locator::Tag(tag) => Some(tag.clone()),
            Locator::Css(css) => Some(css.clone()),
            Locator::XPath(_) => None,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Name(v) => write!(f, "name={}", v),
            Locator::Class(v) => write!(f, "class={}", v),
            Locator::Tag(v) => write!(f, "tag={}", v),
            Locator::Css(v) => write!(f, "css={}", v),
            Locator::XPath(v) => write!(f, "xpath={}", v),
        }
    }
}

/// Detached copy of an element: its visible text and outer HTML.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementSnapshot {
    pub text: String,
    pub html: String,
}

/// Query form of the search page.
#[derive(Debug, Clone)]
pub struct SearchForm<'a> {
    pub query: &'a Locator,
    pub term: &'a str,
    pub mode_select: &'a Locator,
    pub mode_options: &'a Locator,
    /// Substring looked for, case-insensitively, in the option texts.
    pub mode_hint: &'a str,
    pub submit: &'a Locator,
}

/// One live browser tab. Dropping the session shuts the browser down.
pub trait BrowserSession: Send {
    fn navigate(&mut self, url: &str) -> Result<(), InteractionError>;

    /// Blocks until `locator` matches, up to the session timeout.
    fn wait_for_element(&mut self, locator: &Locator) -> Result<ElementSnapshot, InteractionError>;

    /// Every current match, possibly none.
    fn find_all(&mut self, locator: &Locator) -> Result<Vec<ElementSnapshot>, InteractionError>;

    /// Clears the input and types `text` into it.
    fn fill(&mut self, locator: &Locator, text: &str) -> Result<(), InteractionError>;

    fn select_option(&mut self, locator: &Locator, index: usize) -> Result<(), InteractionError>;

    fn click(&mut self, locator: &Locator) -> Result<(), InteractionError>;

    fn current_url(&mut self) -> Result<String, InteractionError>;

    /// Enters the term, picks the first matching search mode and submits.
    ///
    /// Returns the index of the chosen option. `None` means no option
    /// matched and the page default was left selected.
    fn fill_and_submit_form(&mut self, form: &SearchForm<'_>) -> Result<Option<usize>, InteractionError> {
        self.fill(form.query, form.term)?;

        let options = self.find_all(form.mode_options)?;
        let choice = matching_option(&options, form.mode_hint);
        match choice {
            Some(index) => self.select_option(form.mode_select, index)?,
            None => warn!(
                "No search mode option matches '{}'; keeping the page default",
                form.mode_hint
            ),
        }

        self.click(form.submit)?;
        Ok(choice)
    }
}

/// Index of the first option whose text contains `hint`, ignoring case.
pub fn matching_option(options: &[ElementSnapshot], hint: &str) -> Option<usize> {
    let hint = hint.to_lowercase();
    options
        .iter()
        .position(|option| option.text.to_lowercase().contains(&hint))
}

/// Starts browser sessions.
pub trait Launcher {
    fn launch(
        &self,
        options: &BrowserOptions,
        timeout: Duration,
    ) -> Result<Box<dyn BrowserSession>, InteractionError>;
}

pub struct ChromeLauncher;

impl Launcher for ChromeLauncher {
    fn launch(
        &self,
        options: &BrowserOptions,
        timeout: Duration,
    ) -> Result<Box<dyn BrowserSession>, InteractionError> {
        let args = launch_args(options);
        let browser = Browser::new(launch_options(options, &args))
            .map_err(|e| InteractionError::Launch(e.to_string()))?;

        let tab = browser
            .new_tab()
            .map_err(|e| InteractionError::Launch(e.to_string()))?;
        tab.set_default_timeout(timeout);

        info!(
            "Browser launched (headless={}, images={})",
            options.headless, !options.disable_images
        );
        Ok(Box::new(ChromeSession { _browser: browser, tab, timeout }))
    }
}

fn launch_args(options: &BrowserOptions) -> Vec<String> {
    let mut args = vec![
        format!("--user-agent={}", options.user_agent),
        "--log-level=3".to_string(),
    ];
    if options.disable_images {
        args.push("--blink-settings=imagesEnabled=false".to_string());
    }
    args
}

fn launch_options<'a>(options: &BrowserOptions, args: &'a [String]) -> LaunchOptions<'a> {
    LaunchOptions {
        headless: options.headless,
        args: args.iter().map(OsStr::new).collect(),
        // Chrome's own stderr log stays off.
        enable_logging: false,
        idle_browser_timeout: IDLE_BROWSER_TIMEOUT,
        ..Default::default()
    }
}

/// Chrome driven over the DevTools protocol.
pub struct ChromeSession {
    // Owns the Chrome process; dropped last.
    _browser: Browser,
    tab: Arc<Tab>,
    timeout: Duration,
}

impl ChromeSession {
    fn find_one(&self, locator: &Locator) -> Result<Element<'_>, InteractionError> {
        let found = match (locator, locator.to_css()) {
            (Locator::XPath(xpath), _) => self.tab.wait_for_xpath_with_custom_timeout(xpath, self.timeout),
            (_, Some(css)) => self.tab.wait_for_element_with_custom_timeout(&css, self.timeout),
            (_, None) => return Err(element_error(locator, "no usable selector")),
        };
        found.map_err(|_| InteractionError::Timeout {
            locator: locator.to_string(),
            timeout: self.timeout,
        })
    }

    fn snapshot(locator: &Locator, element: &Element<'_>) -> Result<ElementSnapshot, InteractionError> {
        let text = element
            .get_inner_text()
            .map_err(|e| element_error(locator, e))?;
        let html = element.get_content().map_err(|e| element_error(locator, e))?;
        Ok(ElementSnapshot { text, html })
    }
}

impl BrowserSession for ChromeSession {
    fn navigate(&mut self, url: &str) -> Result<(), InteractionError> {
        info!("Navigating to {}", url);
        self.tab
            .navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated())
            .map(|_| ())
            .map_err(|e| InteractionError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            })
    }

    fn wait_for_element(&mut self, locator: &Locator) -> Result<ElementSnapshot, InteractionError> {
        let element = self.find_one(locator)?;
        Self::snapshot(locator, &element)
    }

    fn find_all(&mut self, locator: &Locator) -> Result<Vec<ElementSnapshot>, InteractionError> {
        let found = match (locator, locator.to_css()) {
            (Locator::XPath(xpath), _) => self.tab.find_elements_by_xpath(xpath),
            (_, Some(css)) => self.tab.find_elements(&css),
            (_, None) => return Err(element_error(locator, "no usable selector")),
        };
        let elements = none_found_as_empty(found).map_err(|e| element_error(locator, e))?;
        elements
            .iter()
            .map(|element| Self::snapshot(locator, element))
            .collect()
    }

    fn fill(&mut self, locator: &Locator, text: &str) -> Result<(), InteractionError> {
        let input = self.find_one(locator)?;
        input
            .call_js_fn("function() { this.value = ''; }", vec![], false)
            .map_err(|e| element_error(locator, e))?;
        input.type_into(text).map_err(|e| element_error(locator, e))?;
        Ok(())
    }

    fn select_option(&mut self, locator: &Locator, index: usize) -> Result<(), InteractionError> {
        let select = self.find_one(locator)?;
        select
            .call_js_fn(
                "function(index) { this.selectedIndex = index; this.dispatchEvent(new Event('change', { bubbles: true })); }",
                vec![json!(index)],
                false,
            )
            .map_err(|e| element_error(locator, e))?;
        Ok(())
    }

    fn click(&mut self, locator: &Locator) -> Result<(), InteractionError> {
        let element = self.find_one(locator)?;
        element.click().map_err(|e| element_error(locator, e))?;
        Ok(())
    }

    fn current_url(&mut self) -> Result<String, InteractionError> {
        Ok(self.tab.get_url())
    }
}

/// The tab reports an empty match set as `NoElementFound`.
fn none_found_as_empty<T>(found: anyhow::Result<Vec<T>>) -> anyhow::Result<Vec<T>> {
    match found {
        Err(e) if e.downcast_ref::<NoElementFound>().is_some() => Ok(Vec::new()),
        other => other,
    }
}

fn element_error(locator: &Locator, message: impl fmt::Display) -> InteractionError {
    InteractionError::Element {
        locator: locator.to_string(),
        message: message.to_string(),
    }
}

type SessionSlot = Arc<Mutex<Option<Box<dyn BrowserSession>>>>;

fn lock_slot(slot: &SessionSlot) -> MutexGuard<'_, Option<Box<dyn BrowserSession>>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

fn release_slot(slot: &SessionSlot) -> bool {
    match lock_slot(slot).take() {
        Some(session) => {
            drop(session);
            info!("Browser session released.");
            true
        }
        None => false,
    }
}

/// Owner of the single browser session.
///
/// The session is launched on first use and kept until `release` or drop.
/// All access goes through a mutex, one caller at a time.
pub struct SessionHandle {
    launcher: Box<dyn Launcher>,
    options: BrowserOptions,
    timeout: Duration,
    slot: SessionSlot,
}

impl SessionHandle {
    pub fn new(launcher: Box<dyn Launcher>, options: BrowserOptions, timeout: Duration) -> Self {
        SessionHandle {
            launcher,
            options,
            timeout,
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Launches the session unless one is already running.
    pub fn ensure_session(&self) -> Result<(), InteractionError> {
        let mut slot = lock_slot(&self.slot);
        self.ensure_locked(&mut slot)
    }

    fn ensure_locked(&self, slot: &mut Option<Box<dyn BrowserSession>>) -> Result<(), InteractionError> {
        if slot.is_none() {
            info!("Starting browser session...");
            *slot = Some(self.launcher.launch(&self.options, self.timeout)?);
        }
        Ok(())
    }

    /// Runs `f` against the live session, launching it first if needed.
    pub fn with_session<R>(
        &self,
        f: impl FnOnce(&mut dyn BrowserSession) -> Result<R, InteractionError>,
    ) -> Result<R, InteractionError> {
        let mut slot = lock_slot(&self.slot);
        self.ensure_locked(&mut slot)?;
        match slot.as_deref_mut() {
            Some(session) => f(session),
            None => Err(InteractionError::SessionClosed),
        }
    }

    pub fn is_active(&self) -> bool {
        lock_slot(&self.slot).is_some()
    }

    /// Shuts the browser down. Safe to call any number of times.
    pub fn release(&self) {
        release_slot(&self.slot);
    }

    pub fn release_hook(&self) -> ReleaseHook {
        ReleaseHook {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.release();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released,
    /// No session was running.
    Idle,
    /// A search holds the session right now.
    Busy,
}

/// Releases the session from another thread, e.g. a Ctrl-C handler.
#[derive(Clone)]
pub struct ReleaseHook {
    slot: SessionSlot,
}

impl ReleaseHook {
    /// Returns true if a live session was shut down. Waits for a running search.
    pub fn release(&self) -> bool {
        release_slot(&self.slot)
    }

    /// Like `release`, but never waits on a running search.
    pub fn try_release(&self) -> ReleaseOutcome {
        let mut slot = match self.slot.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return ReleaseOutcome::Busy,
        };
        match slot.take() {
            Some(session) => {
                drop(session);
                info!("Browser session released.");
                ReleaseOutcome::Released
            }
            None => ReleaseOutcome::Idle,
        }
    }
}
