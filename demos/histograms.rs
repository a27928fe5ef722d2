/// Histograms Example
///
/// This example demonstrates:
/// - Adding columns to the filter view to build their groups
/// - Reading histogram and category bars
/// - How a group ignores its own filter but follows every other one

use cogfilter::{DisplayInfo, FilterState, FilterSpec, GroupBars, Intent, IntentHandler, RecordStore};

fn main() {
    println!("=== cogfilter Histograms Example ===\n");

    // Synthetic measurements across three sites
    let rows: Vec<String> = (0..60)
        .map(|i| {
            let site = ["north", "south", "east"][i % 3];
            let depth = (i * 7 % 50) as f64 + 0.5;
            format!(r#"{{"site": "{}", "depth": {}}}"#, site, depth)
        })
        .collect();
    let store = RecordStore::from_json(&format!("[{}]", rows.join(","))).unwrap();
    let info = DisplayInfo::from_json(
        r#"{"cogInfo": {
            "site": {"type": "factor"},
            "depth": {"type": "numeric", "breaks": [0, 10, 20, 30, 40], "delta": 10}
        }}"#,
    )
    .unwrap();
    let mut handler = IntentHandler::new(store, info);

    for name in ["depth", "site"] {
        handler
            .handle_json(&format!(r#"{{"type": "SET_FILTER_VIEW", "which": "add", "name": "{}"}}"#, name))
            .unwrap();
    }

    println!("1. Unfiltered");
    print_bars(&handler);

    println!("2. Depth brushed to [10, 30]");
    let intent = Intent::SetFilter {
        filter: FilterSpec::column("depth", FilterState::range(Some(10.0), Some(30.0))),
        sort: true,
    };
    handler.handle(intent).unwrap();
    print_bars(&handler);

    println!("3. Site limited to north");
    let intent = Intent::SetFilter {
        filter: FilterSpec::column("site", FilterState::select(["north"])),
        sort: true,
    };
    handler.handle(intent).unwrap();
    print_bars(&handler);

    println!("Active records: {} of {}", handler.active_len(), handler.total_len());
}

fn print_bars(handler: &IntentHandler) {
    for bars in handler.all_group_bars() {
        print_group(&bars);
    }
    println!();
}

fn print_group(bars: &GroupBars) {
    println!("   {} (max {})", bars.name, bars.max_count);
    for entry in &bars.entries {
        let width = if bars.max_count == 0 {
            0
        } else {
            entry.count * 30 / bars.max_count
        };
        println!("   {:>8} | {:<30} {}", entry.key.to_json().to_string(), "#".repeat(width), entry.count);
    }
}
