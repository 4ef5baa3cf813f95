use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::Local;
use log::{error, info};
use rust_xlsxwriter::Workbook;

use crate::error::ExportError;
use crate::extractor::BookRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Spreadsheet,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Spreadsheet => "xlsx",
            ExportFormat::Json => "json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "excel" | "xlsx" | "spreadsheet" => Ok(ExportFormat::Spreadsheet),
            "json" => Ok(ExportFormat::Json),
            _ => Err(ExportError::UnsupportedFormat(s.trim().to_string())),
        }
    }
}

/// Writes `records` to `search_results_<YYYYMMDD_HHMMSS>.<ext>` in `out_dir`.
///
/// The format is checked before anything touches the disk.
pub fn export(records: &[BookRecord], format: &str, out_dir: &Path) -> Result<PathBuf, ExportError> {
    let format = format.parse::<ExportFormat>().map_err(|e| {
        error!("Export error: {}", e);
        e
    })?;

    let file_name = format!(
        "search_results_{}.{}",
        Local::now().format("%Y%m%d_%H%M%S"),
        format.extension()
    );
    let path = out_dir.join(file_name);

    let written = match format {
        ExportFormat::Csv => write_csv(records, &path),
        ExportFormat::Spreadsheet => write_spreadsheet(records, &path),
        ExportFormat::Json => write_json(records, &path),
    };
    match written {
        Ok(()) => {
            info!("Exported {} records to {:?}", records.len(), path);
            Ok(path)
        }
        Err(e) => {
            error!("Export error for {:?}: {}", path, e);
            Err(e)
        }
    }
}

fn write_csv(records: &[BookRecord], path: &Path) -> Result<(), ExportError> {
    let mut writer = csv::WriterBuilder::new().from_path(path)?;
    writer.write_record(BookRecord::FIELD_NAMES)?;
    for record in records {
        writer.write_record(record.values())?;
    }
    writer.flush()?;
    Ok(())
}

fn write_spreadsheet(records: &[BookRecord], path: &Path) -> Result<(), ExportError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();

    for (col, name) in BookRecord::FIELD_NAMES.iter().enumerate() {
        sheet.write_string(0, col as u16, *name)?;
    }
    for (row, record) in records.iter().enumerate() {
        for (col, value) in record.values().iter().enumerate() {
            sheet.write_string(row as u32 + 1, col as u16, *value)?;
        }
    }

    workbook.save(path)?;
    Ok(())
}

fn write_json(records: &[BookRecord], path: &Path) -> Result<(), ExportError> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, records)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{open_workbook, Reader, Xlsx};
    use std::fs;

    fn sample() -> Vec<BookRecord> {
        vec![
            BookRecord {
                title: "Dune".to_string(),
                author: "Frank Herbert".to_string(),
                year: "1965".to_string(),
                format: "epub".to_string(),
                size: "1 Mb".to_string(),
                language: "English".to_string(),
                page_count: "412".to_string(),
                publisher: "Chilton".to_string(),
                isbn: "9780441013593".to_string(),
                download_link: "https://libgen.is/book/index.php?md5=A".to_string(),
            },
            BookRecord {
                title: "Children of Dune, \"Part 3\"".to_string(),
                author: "Frank Herbert".to_string(),
                year: "1976".to_string(),
                format: "pdf".to_string(),
                download_link: "https://libgen.is/book/index.php?md5=B".to_string(),
                ..Default::default()
            },
        ]
    }

    fn assert_timestamped_name(path: &Path, ext: &str) {
        let name = path.file_name().unwrap().to_str().unwrap();
        let stamp = name
            .strip_prefix("search_results_")
            .and_then(|rest| rest.strip_suffix(&format!(".{}", ext)))
            .unwrap();
        assert_eq!(stamp.len(), 15, "bad timestamp in {name}");
        assert!(stamp
            .chars()
            .enumerate()
            .all(|(i, c)| if i == 8 { c == '_' } else { c.is_ascii_digit() }));
    }

    #[test]
    fn csv_has_header_and_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = export(&sample(), "csv", dir.path()).unwrap();

        assert_timestamped_name(&path, "csv");
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 3);
        assert_eq!(
            content.lines().next().unwrap(),
            "title,author,year,format,size,language,pageCount,publisher,isbn,downloadLink"
        );

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let rows: Vec<BookRecord> = reader.deserialize().map(Result::unwrap).collect();
        assert_eq!(rows, sample());
    }

    #[test]
    fn json_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = export(&sample(), "JSON", dir.path()).unwrap();

        assert_timestamped_name(&path, "json");
        let parsed: Vec<BookRecord> = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed, sample());

        let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw[0]["pageCount"], "412");
        assert_eq!(raw[0]["downloadLink"], "https://libgen.is/book/index.php?md5=A");
    }

    #[test]
    fn spreadsheet_has_header_row_and_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = export(&sample(), "excel", dir.path()).unwrap();

        assert_timestamped_name(&path, "xlsx");
        let mut workbook: Xlsx<_> = open_workbook(&path).unwrap();
        let sheets = workbook.worksheets();
        let (_, range) = &sheets[0];
        let rows: Vec<Vec<String>> = range
            .rows()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], BookRecord::FIELD_NAMES.map(String::from).to_vec());
        assert_eq!(rows[1][0], "Dune");
        assert_eq!(rows[2][1], "Frank Herbert");
    }

    #[test]
    fn unsupported_format_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let err = export(&sample(), "pdf", dir.path()).unwrap_err();

        assert!(matches!(err, ExportError::UnsupportedFormat(ref f) if f == "pdf"));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn empty_record_set_still_gets_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = export(&[], "csv", dir.path()).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 1);
    }

    #[test]
    fn write_failure_is_returned() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(export(&sample(), "json", &missing).is_err());
    }

    #[test]
    fn format_aliases() {
        assert_eq!("xlsx".parse::<ExportFormat>().unwrap(), ExportFormat::Spreadsheet);
        assert_eq!("Spreadsheet".parse::<ExportFormat>().unwrap(), ExportFormat::Spreadsheet);
        assert_eq!(" csv ".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
    }
}
