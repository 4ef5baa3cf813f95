pub mod browser;
pub mod config;
pub mod delay_manager;
pub mod error;
pub mod exporter;
pub mod extractor;
pub mod history;
pub mod logger;
pub mod search_engine;

// Exporting types for convenience
pub use browser::{BrowserSession, ChromeLauncher, Launcher, Locator, ReleaseOutcome, SessionHandle};
pub use config::{Configuration, Settings};
pub use exporter::{export, ExportFormat};
pub use extractor::BookRecord;
pub use history::{HistoryEntry, SearchHistory};
pub use search_engine::{SearchEngine, SearchType};
