use std::error::Error;
use std::io::{self, BufRead, Write};
use std::path::Path;

use log::{error, info, warn};

use book_search_lib::config::{self, Configuration};
use book_search_lib::exporter;
use book_search_lib::logger;
use book_search_lib::{BookRecord, ChromeLauncher, ReleaseOutcome, SearchEngine, SearchType};

fn main() -> Result<(), Box<dyn Error>> {
    logger::init(logger::DEFAULT_LOG_FILE)?;
    info!("Starting Book Search Tool...");

    let config = Configuration::load(config::DEFAULT_CONFIG_FILE)?;
    let engine = SearchEngine::new(config.settings(), Box::new(ChromeLauncher))?;

    // Ctrl-C skips destructors, so the browser is shut down here explicitly.
    // A search in flight holds the session; Chrome shares our process group
    // and gets the same SIGINT, so exit without waiting for it.
    let hook = engine.release_hook();
    ctrlc::set_handler(move || {
        if hook.try_release() == ReleaseOutcome::Busy {
            warn!("Interrupted during a search; exiting without waiting for it.");
        }
        println!("\nProgram terminated by user.");
        std::process::exit(130);
    })?;

    let result = run_menu(&engine);
    engine.close();

    if let Err(e) = &result {
        error!("Menu loop failed: {}", e);
        println!("An error occurred: {}", e);
    }
    info!("Book Search Tool stopped.");
    Ok(result?)
}

fn run_menu(engine: &SearchEngine) -> io::Result<()> {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut last_results: Option<Vec<BookRecord>> = None;

    loop {
        println!("\n=== Book Search Tool ===");
        println!("1. Search by Title");
        println!("2. Search by Author");
        println!("3. Search by ISBN");
        println!("4. Export Last Results");
        println!("5. Exit");

        let Some(choice) = prompt(&mut input, "\nEnter your choice (1-5): ")? else {
            break;
        };

        let search_type = match choice.as_str() {
            "1" => SearchType::Title,
            "2" => SearchType::Author,
            "3" => SearchType::Isbn,
            "4" => {
                match &last_results {
                    Some(records) => export_interactive(&mut input, records)?,
                    None => println!("No results available to export."),
                }
                continue;
            }
            "5" => break,
            _ => {
                println!("Invalid choice. Please enter a number between 1 and 5.");
                continue;
            }
        };

        let Some(term) = prompt(&mut input, "Enter search term: ")? else {
            break;
        };

        println!("\nSearching... Please wait...\n");
        let records = match engine.search(&term, search_type) {
            Ok(records) => records,
            Err(e) => {
                println!("Search failed: {}", e);
                continue;
            }
        };

        if records.is_empty() {
            println!("No results found.");
        } else {
            println!("\nSearch Results:");
            print_results(&records);

            let answer = prompt(&mut input, "\nWould you like to export results? (y/n): ")?;
            if answer.is_some_and(|a| a.eq_ignore_ascii_case("y")) {
                export_interactive(&mut input, &records)?;
            }
        }
        last_results = Some(records);
    }

    Ok(())
}

/// `None` once stdin is exhausted.
fn prompt(input: &mut impl BufRead, message: &str) -> io::Result<Option<String>> {
    print!("{}", message);
    io::stdout().flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn export_interactive(input: &mut impl BufRead, records: &[BookRecord]) -> io::Result<()> {
    let Some(format) = prompt(input, "Enter export format (csv/excel/json): ")? else {
        return Ok(());
    };
    match exporter::export(records, &format, Path::new(".")) {
        Ok(path) => println!("Results exported to {}", path.display()),
        Err(e) => println!("Export failed: {}", e),
    }
    Ok(())
}

fn print_results(records: &[BookRecord]) {
    println!(
        "{:<50}  {:<30}  {:<6}  {:<6}  {:<10}",
        "title", "author", "year", "format", "size"
    );
    for record in records {
        println!(
            "{:<50}  {:<30}  {:<6}  {:<6}  {:<10}",
            clip(&record.title, 50),
            clip(&record.author, 30),
            clip(&record.year, 6),
            clip(&record.format, 6),
            clip(&record.size, 10)
        );
    }
}

fn clip(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        return value.to_string();
    }
    let mut clipped: String = value.chars().take(width.saturating_sub(3)).collect();
    clipped.push_str("...");
    clipped
}
