use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use chrono::Local;
use env_logger::{Builder, Target};
use log::LevelFilter;

use crate::error::LoggerError;

pub const DEFAULT_LOG_FILE: &str = "book_searcher.log";

/// Installs the process-wide logger, appending to `log_file`.
///
/// Call once at startup. The module path of each record is written as the
/// component name; `RUST_LOG` can raise or lower the default INFO level.
pub fn init<P: AsRef<Path>>(log_file: P) -> Result<(), LoggerError> {
    let path = log_file.as_ref();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| LoggerError::Open {
            path: path.to_path_buf(),
            source: e,
        })?;

    Builder::new()
        .format(|buf, record| {
            writeln!(buf,
                "{} - {} - {} - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
                record.target(),
                record.level(),
                record.args()
            )
        })
        .filter(None, LevelFilter::Info)
        .parse_default_env()
        .target(Target::Pipe(Box::new(file)))
        .try_init()?;

    log::info!("Logger initialized.");
    Ok(())
}
