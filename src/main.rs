//! Datapage - Dataset Keyword Search Command Line Interface
//!
//! This binary drives the search library from the command line: it loads a
//! dataset registry, stages dataset files, runs paginated keyword searches,
//! and writes export artifacts. It is the same code path the embedding
//! service uses, which makes it the quickest way to validate a registry
//! document or a dataset file.
//!
//! # Commands
//!
//! - **`list`** - Shows every dataset the registry configures
//! - **`stage`** - Downloads a dataset's file and warms its session
//! - **`search`** - Runs a paginated keyword search, printing rows as JSON
//! - **`export`** - Writes the full filtered result set to a CSV/JSONL file
//!
//! # Usage Examples
//!
//! ```bash
//! # List configured datasets
//! datapage list registry.json
//!
//! # Stage a dataset ahead of searches
//! datapage stage registry.json dataA safetykorea
//!
//! # Search one field, page 2
//! datapage search registry.json dataA safetykorea "samsung" product_name 2
//!
//! # Export every matching row as CSV
//! datapage export registry.json dataA safetykorea "samsung" all csv
//!
//! # Show help
//! datapage --help
//! ```
//!
//! # Exit Codes
//!
//! - `0` - Success
//! - `1` - General error (bad arguments, unknown dataset, search failure)
//! - `2` - Staging failed (dataset remains searchable via its remote file)

use std::env;
use std::process;
use std::sync::Arc;

use datapage::{DatasetRegistry, ExportFormat, PrefetchEvent, SearchService};

/// Directory staged dataset files land in, relative to the working directory.
const STAGING_DIR: &str = "./staging";

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();

    // Handle --help flag
    if args.len() == 2 && (args[1] == "--help" || args[1] == "-h") {
        print_help();
        return;
    }

    // Validate minimum arguments
    if args.len() < 3 {
        eprintln!("Error: Not enough arguments\n");
        print_help();
        process::exit(1);
    }

    let command = &args[1];
    let service = load_service(&args[2]);

    match command.as_str() {
        "list" => {
            if args.len() != 3 {
                eprintln!("Error: 'list' command takes only the registry path\n");
                print_help();
                process::exit(1);
            }
            handle_list(&service);
        }
        "stage" => {
            if args.len() != 5 {
                eprintln!("Error: 'stage' command requires category and subcategory\n");
                print_help();
                process::exit(1);
            }
            handle_stage(&service, &args[3], &args[4]).await;
        }
        "search" => {
            if args.len() < 6 || args.len() > 9 {
                eprintln!(
                    "Error: 'search' command requires category, subcategory, and keyword\n"
                );
                print_help();
                process::exit(1);
            }
            let field = args.get(6).map(String::as_str);
            let page = match args.get(7).map(|raw| raw.parse::<u64>()) {
                Some(Ok(page)) => Some(page),
                Some(Err(_)) => {
                    eprintln!("Error: page must be a positive number\n");
                    process::exit(1);
                }
                None => None,
            };
            let page_size = match args.get(8).map(|raw| raw.parse::<usize>()) {
                Some(Ok(size)) => Some(size),
                Some(Err(_)) => {
                    eprintln!("Error: page size must be a positive number\n");
                    process::exit(1);
                }
                None => None,
            };
            handle_search(&service, &args[3], &args[4], &args[5], field, page, page_size)
                .await;
        }
        "export" => {
            if args.len() < 6 || args.len() > 8 {
                eprintln!(
                    "Error: 'export' command requires category, subcategory, and keyword\n"
                );
                print_help();
                process::exit(1);
            }
            let field = args.get(6).map(String::as_str);
            let format = match args.get(7).map(String::as_str) {
                None | Some("csv") => ExportFormat::Csv,
                Some("jsonl") => ExportFormat::JsonLines,
                Some(other) => {
                    eprintln!("Error: unknown export format '{}', use csv or jsonl\n", other);
                    process::exit(1);
                }
            };
            handle_export(&service, &args[3], &args[4], &args[5], field, format).await;
        }
        _ => {
            eprintln!("Error: Unknown command '{}'\n", command);
            print_help();
            process::exit(1);
        }
    }
}

/// Loads the registry document and builds the service, exiting on a bad file.
fn load_service(registry_path: &str) -> SearchService {
    match DatasetRegistry::from_json_file(registry_path) {
        Ok(registry) => SearchService::new(Arc::new(registry), STAGING_DIR),
        Err(e) => {
            eprintln!("✗ Failed to load registry '{}': {}", registry_path, e);
            process::exit(1);
        }
    }
}

/// Handles the `list` command: one line per configured dataset.
fn handle_list(service: &SearchService) {
    let mut keys: Vec<String> = service
        .registry()
        .iter()
        .map(|descriptor| {
            format!(
                "{}  ({} search fields, page size {})",
                descriptor.key(),
                descriptor.search_fields.len(),
                descriptor.page_size
            )
        })
        .collect();
    keys.sort();

    println!("Configured datasets: {}", keys.len());
    for line in keys {
        println!("  {}", line);
    }
}

/// Handles the `stage` command: kicks off staging and waits for the
/// dataset's readiness event.
///
/// # Exit Codes
///
/// - `0` - Dataset staged and warmed
/// - `2` - Staging failed; searches still work against the remote file
async fn handle_stage(service: &SearchService, category: &str, subcategory: &str) {
    println!("Staging dataset: {}/{}", category, subcategory);

    let mut events = service.subscribe_readiness();
    match service.ensure_ready(category, subcategory, None) {
        Ok(true) => {
            println!("✓ Already staged");
            return;
        }
        Ok(false) => {}
        Err(e) => {
            eprintln!("✗ {}", e);
            process::exit(1);
        }
    }

    loop {
        match events.recv().await {
            Ok(PrefetchEvent::Ready {
                local_path,
                degraded: false,
                ..
            }) => {
                match local_path {
                    Some(path) => println!("✓ Staged and warmed: {}", path.display()),
                    None => println!("✓ Warmed without staging"),
                }
                return;
            }
            Ok(PrefetchEvent::Ready { degraded: true, .. }) => {
                eprintln!("✗ Staging failed, dataset will be read remotely");
                process::exit(2);
            }
            Ok(PrefetchEvent::Error { reason, .. }) => {
                eprintln!("  staging error: {}", reason);
            }
            Err(_) => {
                eprintln!("✗ Lost the readiness event stream");
                process::exit(1);
            }
        }
    }
}

/// Handles the `search` command: one page of results, rows printed as JSON
/// lines followed by a pagination summary.
async fn handle_search(
    service: &SearchService,
    category: &str,
    subcategory: &str,
    keyword: &str,
    field: Option<&str>,
    page: Option<u64>,
    page_size: Option<usize>,
) {
    match service
        .search(category, subcategory, None, keyword, field, page, page_size)
        .await
    {
        Ok(page) => {
            for row in &page.rows {
                match serde_json::to_string(row) {
                    Ok(line) => println!("{}", line),
                    Err(e) => eprintln!("✗ Row serialization failed: {}", e),
                }
            }
            println!(
                "\n✓ Page {} of {} ({} rows total)",
                page.pagination.current_page,
                page.pagination.total_pages,
                page.pagination.total_count
            );
        }
        Err(e) => {
            eprintln!("✗ Search failed: {}", e);
            process::exit(1);
        }
    }
}

/// Handles the `export` command: streams the full filtered result set into
/// a timestamped file in the working directory.
async fn handle_export(
    service: &SearchService,
    category: &str,
    subcategory: &str,
    keyword: &str,
    field: Option<&str>,
    format: ExportFormat,
) {
    // Like `search`, an omitted field falls back to the dataset's default.
    let field = field.filter(|f| !f.is_empty());
    let handle = match service
        .export(category, subcategory, None, keyword, field, format)
        .await
    {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("✗ Export failed to start: {}", e);
            process::exit(1);
        }
    };

    let filename = handle.filename.clone();
    match handle.collect().await {
        Ok((chunks, rows)) => {
            let bytes: Vec<u8> = chunks.iter().flat_map(|c| c.to_vec()).collect();
            if let Err(e) = tokio::fs::write(&filename, bytes).await {
                eprintln!("✗ Could not write '{}': {}", filename, e);
                process::exit(1);
            }
            println!("✓ Exported {} rows to {}", rows, filename);
        }
        Err(e) => {
            eprintln!("✗ Export failed: {}", e);
            process::exit(1);
        }
    }
}

/// Prints usage information for all commands.
fn print_help() {
    println!("Datapage - Dataset Keyword Search");
    println!();
    println!("USAGE:");
    println!("    datapage <command> <registry.json> [arguments...]");
    println!();
    println!("COMMANDS:");
    println!("    list    <registry.json>");
    println!("            Show every configured dataset");
    println!();
    println!("    stage   <registry.json> <category> <subcategory>");
    println!("            Download the dataset's file and warm its session");
    println!();
    println!(
        "    search  <registry.json> <category> <subcategory> <keyword> [field] [page] [page_size]"
    );
    println!("            Run a paginated keyword search; 'all' searches every field");
    println!();
    println!("    export  <registry.json> <category> <subcategory> <keyword> [field] [csv|jsonl]");
    println!("            Write every matching row to a timestamped file");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help    Show this help message");
}
