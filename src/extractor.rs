use log::{info, warn};
use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ExtractionError;

/// One row of the search results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookRecord {
    pub title: String,
    pub author: String,
    pub year: String,
    pub format: String,
    pub size: String,
    pub language: String,
    pub page_count: String,
    pub publisher: String,
    /// Empty when the row has no ISBN column.
    pub isbn: String,
    pub download_link: String,
}

impl BookRecord {
    /// Column names used by every export format, in output order.
    pub const FIELD_NAMES: [&'static str; 10] = [
        "title",
        "author",
        "year",
        "format",
        "size",
        "language",
        "pageCount",
        "publisher",
        "isbn",
        "downloadLink",
    ];

    /// Values in `FIELD_NAMES` order.
    pub fn values(&self) -> [&str; 10] {
        [
            &self.title,
            &self.author,
            &self.year,
            &self.format,
            &self.size,
            &self.language,
            &self.page_count,
            &self.publisher,
            &self.isbn,
            &self.download_link,
        ]
    }

    fn set(&mut self, field: Field, value: String) {
        match field {
            Field::Author => self.author = value,
            Field::Title => self.title = value,
            Field::Publisher => self.publisher = value,
            Field::Year => self.year = value,
            Field::PageCount => self.page_count = value,
            Field::Language => self.language = value,
            Field::Size => self.size = value,
            Field::Format => self.format = value,
            Field::Isbn => self.isbn = value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Author,
    Title,
    Publisher,
    Year,
    PageCount,
    Language,
    Size,
    Format,
    Isbn,
}

/// Rows with fewer cells are dropped.
pub const MIN_CELLS: usize = 9;

/// Cell index to field, following the site's results layout.
/// Index 9 is optional and reads as empty when absent.
pub const COLUMN_MAP: [(usize, Field); 9] = [
    (1, Field::Author),
    (2, Field::Title),
    (3, Field::Publisher),
    (4, Field::Year),
    (5, Field::PageCount),
    (6, Field::Language),
    (7, Field::Size),
    (8, Field::Format),
    (9, Field::Isbn),
];

/// Cell holding the anchor to the book page.
pub const LINK_COLUMN: usize = 2;

/// Result of parsing one data row.
#[derive(Debug)]
pub enum RowOutcome {
    Parsed(BookRecord),
    Skipped(ExtractionError),
}

/// Turns the outer HTML of the results table into per-row outcomes.
pub struct Extractor {
    base_url: Option<Url>,
}

impl Extractor {
    /// `page_url` is used to resolve relative download links.
    pub fn new(page_url: &str) -> Self {
        let base_url = match Url::parse(page_url) {
            Ok(url) => Some(url),
            Err(e) => {
                warn!("Page URL '{}' is not usable as a link base: {}", page_url, e);
                None
            }
        };
        Extractor { base_url }
    }

    /// Parses at most `max_rows` data rows, skipping the header row.
    pub fn parse_table(&self, table_html: &str, max_rows: usize) -> Result<Vec<RowOutcome>, ExtractionError> {
        let fragment = Html::parse_fragment(table_html);
        let table = fragment
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .find(|el| el.value().name() == "table")
            .ok_or(ExtractionError::NotATable)?;

        let outcomes = table_rows(table)
            .skip(1)
            .take(max_rows)
            .enumerate()
            .map(|(i, row)| match self.parse_row(i + 1, row) {
                Ok(record) => RowOutcome::Parsed(record),
                Err(e) => RowOutcome::Skipped(e),
            })
            .collect();
        Ok(outcomes)
    }

    fn parse_row(&self, row_number: usize, row: ElementRef<'_>) -> Result<BookRecord, ExtractionError> {
        let cells: Vec<ElementRef<'_>> = child_elements(row, "td").collect();
        if cells.len() < MIN_CELLS {
            return Err(ExtractionError::TooFewCells {
                row: row_number,
                found: cells.len(),
                expected: MIN_CELLS,
            });
        }

        let mut record = BookRecord::default();
        for (index, field) in COLUMN_MAP {
            let value = cells.get(index).map(|cell| cell_text(*cell)).unwrap_or_default();
            record.set(field, value);
        }

        let href = cells[LINK_COLUMN]
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter(|el| el.value().name() == "a")
            .find_map(|el| el.value().attr("href"))
            .ok_or(ExtractionError::MissingLink { row: row_number })?;
        record.download_link = self.resolve_link(row_number, href)?;

        Ok(record)
    }

    fn resolve_link(&self, row_number: usize, href: &str) -> Result<String, ExtractionError> {
        let resolved = match &self.base_url {
            Some(base) => base.join(href),
            None => Url::parse(href),
        };
        resolved
            .map(|url| url.to_string())
            .map_err(|source| ExtractionError::BadLink {
                row: row_number,
                href: href.to_string(),
                source,
            })
    }
}

/// Parsed records in row order, plus how many rows were skipped.
#[derive(Debug, Default)]
pub struct CollectedRows {
    pub records: Vec<BookRecord>,
    /// One warning was logged per skipped row.
    pub skipped: usize,
}

/// Keeps parsed records in row order and logs every skipped row.
pub fn collect_records(outcomes: Vec<RowOutcome>) -> CollectedRows {
    let total = outcomes.len();
    let mut collected = CollectedRows::default();
    for outcome in outcomes {
        match outcome {
            RowOutcome::Parsed(record) => collected.records.push(record),
            RowOutcome::Skipped(e) => {
                warn!("Skipping result row: {}", e);
                collected.skipped += 1;
            }
        }
    }
    info!("Extracted {} of {} result rows", collected.records.len(), total);
    collected
}

// Rows that belong to `table` itself, not to tables nested in its cells.
fn table_rows<'a>(table: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    table
        .children()
        .filter_map(ElementRef::wrap)
        .flat_map(|child| match child.value().name() {
            "tr" => vec![child],
            "thead" | "tbody" | "tfoot" => child_elements(child, "tr").collect(),
            _ => Vec::new(),
        })
}

fn child_elements<'a>(parent: ElementRef<'a>, tag: &'static str) -> impl Iterator<Item = ElementRef<'a>> {
    parent
        .children()
        .filter_map(ElementRef::wrap)
        .filter(move |el| el.value().name() == tag)
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
