use std::fmt;
use std::fs;
use std::str::FromStr;
use std::time::Duration;

use log::{error, info, warn};

use crate::browser::{BrowserSession, Launcher, Locator, ReleaseHook, SearchForm, SessionHandle};
use crate::config::Settings;
use crate::delay_manager::Pacer;
use crate::error::{ExtractionError, InteractionError};
use crate::extractor::{collect_records, BookRecord, Extractor};
use crate::history::SearchHistory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchType {
    Title,
    Author,
    Isbn,
}

impl SearchType {
    /// Text looked for in the site's search mode options.
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchType::Title => "title",
            SearchType::Author => "author",
            SearchType::Isbn => "isbn",
        }
    }
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "title" => Ok(SearchType::Title),
            "author" => Ok(SearchType::Author),
            "isbn" => Ok(SearchType::Isbn),
            other => Err(format!("unknown search type: {}", other)),
        }
    }
}

/// Where things live on the search site.
#[derive(Debug, Clone)]
pub struct SiteLayout {
    pub search_url: String,
    pub query_input: Locator,
    pub mode_select: Locator,
    pub mode_options: Locator,
    pub submit_button: Locator,
    pub results_table: Locator,
}

impl Default for SiteLayout {
    fn default() -> Self {
        SiteLayout {
            search_url: "https://libgen.is/".to_string(),
            query_input: Locator::name("req"),
            mode_select: Locator::name("column"),
            mode_options: Locator::css("select[name=\"column\"] option"),
            submit_button: Locator::xpath("//input[@type='submit']"),
            results_table: Locator::class("c"),
        }
    }
}

/// Runs searches against the site through one reusable browser session.
pub struct SearchEngine {
    session: SessionHandle,
    history: SearchHistory,
    pacer: Pacer,
    layout: SiteLayout,
    max_results: usize,
}

impl SearchEngine {
    /// Creates the download directory if it does not exist yet.
    /// The browser itself is only started by the first search.
    pub fn new(settings: &Settings, launcher: Box<dyn Launcher>) -> std::io::Result<Self> {
        Self::with_layout(settings, launcher, SiteLayout::default())
    }

    pub fn with_layout(
        settings: &Settings,
        launcher: Box<dyn Launcher>,
        layout: SiteLayout,
    ) -> std::io::Result<Self> {
        fs::create_dir_all(&settings.download_path).map_err(|e| {
            error!("Failed to create download directory {:?}: {}", settings.download_path, e);
            e
        })?;

        let session = SessionHandle::new(
            launcher,
            settings.browser_options.clone(),
            Duration::from_secs(settings.timeout),
        );
        Ok(SearchEngine {
            session,
            history: SearchHistory::new(&settings.search_history_file),
            pacer: Pacer::from_wait_time(settings.wait_time),
            layout,
            max_results: settings.max_results,
        })
    }

    /// Searches for `term` and returns at most `maxResults` records.
    ///
    /// Navigation and form errors are returned. Once the form is submitted,
    /// table or row problems only shrink the result, possibly to nothing.
    /// Every search that gets that far is recorded in the history.
    pub fn search(&self, term: &str, search_type: SearchType) -> Result<Vec<BookRecord>, InteractionError> {
        info!("Searching for '{}' by {}", term, search_type);

        let records = self
            .session
            .with_session(|session| self.run_search(session, term, search_type))
            .map_err(|e| {
                error!("Search error: {}", e);
                e
            })?;

        self.history.append(term, records.len());
        info!("Search for '{}' returned {} records", term, records.len());
        Ok(records)
    }

    fn run_search(
        &self,
        session: &mut dyn BrowserSession,
        term: &str,
        search_type: SearchType,
    ) -> Result<Vec<BookRecord>, InteractionError> {
        session.navigate(&self.layout.search_url)?;
        self.pacer.pause();

        let form = SearchForm {
            query: &self.layout.query_input,
            term,
            mode_select: &self.layout.mode_select,
            mode_options: &self.layout.mode_options,
            mode_hint: search_type.as_str(),
            submit: &self.layout.submit_button,
        };
        session.fill_and_submit_form(&form)?;
        self.pacer.pause();

        match self.extract(session) {
            Ok(records) => Ok(records),
            Err(e) => {
                error!("Data extraction error: {}", e);
                Ok(Vec::new())
            }
        }
    }

    fn extract(&self, session: &mut dyn BrowserSession) -> Result<Vec<BookRecord>, ExtractionError> {
        let table = session.wait_for_element(&self.layout.results_table)?;
        let page_url = session.current_url().unwrap_or_else(|e| {
            warn!("Could not read current page URL: {}", e);
            self.layout.search_url.clone()
        });

        let outcomes = Extractor::new(&page_url).parse_table(&table.html, self.max_results)?;
        Ok(collect_records(outcomes).records)
    }

    pub fn history(&self) -> &SearchHistory {
        &self.history
    }

    /// Handle for shutting the browser down from a signal handler.
    pub fn release_hook(&self) -> ReleaseHook {
        self.session.release_hook()
    }

    pub fn close(&self) {
        self.session.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::{html, text, FakeLauncher, FakePage};
    use crate::extractor::fixtures::results_table;

    fn settings(dir: &std::path::Path, max_results: usize) -> Settings {
        Settings {
            max_results,
            download_path: dir.join("downloads"),
            search_history_file: dir.join("history.json"),
            wait_time: (0.0, 0.0),
            ..Settings::default()
        }
    }

    fn search_page(results: Option<String>) -> FakePage {
        let layout = SiteLayout::default();
        let mut page = FakePage {
            url: "https://libgen.is/search.php?req=x".to_string(),
            ..Default::default()
        }
        .with(layout.query_input.clone(), vec![text("")])
        .with(layout.mode_select.clone(), vec![text("")])
        .with(
            layout.mode_options.clone(),
            vec![text("Title"), text("Author(s)"), text("Series"), text("ISBN")],
        )
        .with(layout.submit_button.clone(), vec![text("Search!")]);
        if let Some(table) = results {
            page = page.with(layout.results_table.clone(), vec![html(&table)]);
        }
        page
    }

    #[test]
    fn search_caps_results_and_records_history() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = FakeLauncher::new(search_page(Some(results_table(&[10; 25]))));
        let engine = SearchEngine::new(&settings(dir.path(), 20), Box::new(launcher.clone())).unwrap();

        let records = engine.search("Dune", SearchType::Title).unwrap();

        assert_eq!(records.len(), 20);
        let history = engine.history().entries().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].search_term, "Dune");
        assert_eq!(history[0].result_count, 20);
        assert!(dir.path().join("downloads").is_dir());
    }

    #[test]
    fn malformed_row_is_dropped_from_results() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = FakeLauncher::new(search_page(Some(results_table(&[10, 5, 9]))));
        let engine = SearchEngine::new(&settings(dir.path(), 20), Box::new(launcher)).unwrap();

        let records = engine.search("Dune", SearchType::Title).unwrap();

        let titles: Vec<_> = records.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Title 0", "Title 2"]);
        assert_eq!(records[0].download_link, "https://libgen.is/book/index.php?md5=0");
    }

    #[test]
    fn missing_mode_options_keep_default_and_search_completes() {
        let dir = tempfile::tempdir().unwrap();
        let mut page = search_page(Some(results_table(&[10, 10])));
        page.elements.remove(&SiteLayout::default().mode_options);
        let launcher = FakeLauncher::new(page);
        let engine = SearchEngine::new(&settings(dir.path(), 20), Box::new(launcher.clone())).unwrap();

        let records = engine.search("Dune", SearchType::Title).unwrap();

        assert_eq!(records.len(), 2);
        assert!(!launcher.journal.entries().iter().any(|e| e.starts_with("select")));
        assert_eq!(engine.history().entries().unwrap()[0].result_count, 2);
    }

    #[test]
    fn session_is_reused_across_searches() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = FakeLauncher::new(search_page(Some(results_table(&[10]))));
        let engine = SearchEngine::new(&settings(dir.path(), 20), Box::new(launcher.clone())).unwrap();

        engine.search("Dune", SearchType::Title).unwrap();
        engine.search("Herbert", SearchType::Author).unwrap();

        assert_eq!(launcher.launch_count(), 1);
        let steps = launcher.journal.entries();
        assert_eq!(
            steps,
            vec![
                "navigate https://libgen.is/".to_string(),
                "fill name=req Dune".to_string(),
                "select name=column 0".to_string(),
                "click xpath=//input[@type='submit']".to_string(),
                "navigate https://libgen.is/".to_string(),
                "fill name=req Herbert".to_string(),
                "select name=column 1".to_string(),
                "click xpath=//input[@type='submit']".to_string(),
            ]
        );
        assert_eq!(engine.history().entries().unwrap().len(), 2);
    }

    #[test]
    fn missing_results_table_yields_empty_result() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = FakeLauncher::new(search_page(None));
        let engine = SearchEngine::new(&settings(dir.path(), 20), Box::new(launcher)).unwrap();

        let records = engine.search("zzzz", SearchType::Isbn).unwrap();

        assert!(records.is_empty());
        let history = engine.history().entries().unwrap();
        assert_eq!(history[0].result_count, 0);
    }

    #[test]
    fn navigation_failure_propagates_without_history() {
        let dir = tempfile::tempdir().unwrap();
        let mut page = search_page(Some(results_table(&[10])));
        page.fail_navigation = true;
        let launcher = FakeLauncher::new(page);
        let engine = SearchEngine::new(&settings(dir.path(), 20), Box::new(launcher)).unwrap();

        let err = engine.search("Dune", SearchType::Title).unwrap_err();

        assert!(matches!(err, InteractionError::Navigation { .. }));
        assert!(engine.history().entries().unwrap().is_empty());
    }

    #[test]
    fn missing_form_field_propagates_and_keeps_session() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = FakeLauncher::new(FakePage::default());
        let engine = SearchEngine::new(&settings(dir.path(), 20), Box::new(launcher.clone())).unwrap();

        let err = engine.search("Dune", SearchType::Title).unwrap_err();

        assert!(matches!(err, InteractionError::Timeout { .. }));
        assert!(engine.session.is_active());
        engine.close();
        assert!(!engine.session.is_active());
        assert_eq!(launcher.journal.entries().last().map(String::as_str), Some("closed"));
    }

    #[test]
    fn search_type_parses_case_insensitively() {
        assert_eq!("Author".parse::<SearchType>(), Ok(SearchType::Author));
        assert_eq!(" isbn ".parse::<SearchType>(), Ok(SearchType::Isbn));
        assert!("series".parse::<SearchType>().is_err());
    }
}
