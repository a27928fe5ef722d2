/// cogfilter Intent Replay
///
/// Loads a dataset and its display info, applies a file of intents (one JSON
/// object per line) and prints the resulting index state as JSON: the active
/// count, the first page of records and the bars of every group.
///
/// Usage: cogfilter-replay <dataset.json> <display_info.json> <intents.jsonl> [per_page]

use cogfilter::{DisplayInfo, IntentHandler, RecordStore};
use log::{error, info};
use serde_json::json;
use std::error::Error;
use std::fs;

const DEFAULT_PER_PAGE: usize = 10;

fn main() {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 4 {
        eprintln!("usage: {} <dataset.json> <display_info.json> <intents.jsonl> [per_page]", args[0]);
        std::process::exit(2);
    }

    if let Err(e) = run(&args[1], &args[2], &args[3], args.get(4).map(String::as_str)) {
        error!("replay failed: {}", e);
        std::process::exit(1);
    }
}

fn run(dataset: &str, display_info: &str, intents: &str, per_page: Option<&str>) -> Result<(), Box<dyn Error>> {
    let per_page = match per_page {
        Some(n) => n.parse::<usize>()?,
        None => DEFAULT_PER_PAGE,
    };

    let store = RecordStore::from_json(&fs::read_to_string(dataset)?)?;
    let info = DisplayInfo::from_json(&fs::read_to_string(display_info)?)?;
    let mut handler = IntentHandler::new(store, info);

    let mut applied = 0;
    for (line_no, line) in fs::read_to_string(intents)?.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        handler
            .handle_json(line)
            .map_err(|e| format!("{}:{}: {}", intents, line_no + 1, e))?;
        applied += 1;
    }
    info!("applied {} intents", applied);

    let page: Vec<_> = handler.page(1, per_page)?.iter().map(|r| r.to_json()).collect();
    let output = json!({
        "active": handler.active_len(),
        "total": handler.total_len(),
        "pages": handler.total_pages(per_page),
        "sort": handler.sort_spec(),
        "filters": handler.filters(),
        "page": page,
        "groups": handler.all_group_bars(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
