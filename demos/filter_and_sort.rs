/// Filter and Sort Example
///
/// This example demonstrates:
/// - Loading a dataset and its display info
/// - Applying numeric range and factor filters through intents
/// - Sorting by one and by several keys
/// - Paging through the ordered active records

use cogfilter::{DisplayInfo, IntentHandler, RecordStore};

fn main() {
    println!("=== cogfilter Filter and Sort Example ===\n");

    // 1. Load a small catalog
    println!("1. Loading catalog...");
    let store = RecordStore::from_json(
        r#"[
            {"product": "Laptop", "category": "Electronics", "price": 999.99, "rating": 4.5},
            {"product": "Mouse", "category": "Electronics", "price": 29.99, "rating": 4.1},
            {"product": "Desk", "category": "Furniture", "price": 299.99, "rating": 3.9},
            {"product": "Chair", "category": "Furniture", "price": 199.99, "rating": 4.5},
            {"product": "Monitor", "category": "Electronics", "price": 399.99, "rating": 4.7},
            {"product": "Lamp", "category": "Lighting", "price": 49.99, "rating": null}
        ]"#,
    )
    .unwrap();
    let info = DisplayInfo::from_json(
        r#"{"cogInfo": {
            "product": {"type": "key"},
            "category": {"type": "factor"},
            "price": {"type": "numeric", "breaks": [0, 250, 500, 750], "delta": 250},
            "rating": {"type": "numeric", "breaks": [3, 3.5, 4, 4.5], "delta": 0.5}
        }}"#,
    )
    .unwrap();
    let mut handler = IntentHandler::new(store, info);
    println!("   {} records loaded\n", handler.total_len());

    // 2. Price between 100 and 500
    println!("2. Filtering price to [100, 500]...");
    handler
        .handle_json(
            r#"{"type": "SET_FILTER", "sort": true,
                "filter": {"price": {"varType": "numeric", "value": {"from": 100, "to": 500}}}}"#,
        )
        .unwrap();
    print_page(&handler);

    // 3. Add a category filter
    println!("3. Keeping only Furniture and Electronics...");
    handler
        .handle_json(
            r#"{"type": "SET_FILTER", "sort": true,
                "filter": {"category": {"varType": "factor", "value": ["Furniture", "Electronics"]}}}"#,
        )
        .unwrap();
    print_page(&handler);

    // 4. Sort by rating, best first
    println!("4. Sorting by rating descending...");
    handler
        .handle_json(r#"{"type": "SET_SORT", "sort": [{"name": "rating", "dir": "desc"}]}"#)
        .unwrap();
    print_page(&handler);

    // 5. Clear the price filter and break rating ties by price
    println!("5. Clearing price, sorting by rating desc then price asc...");
    handler
        .handle_json(r#"{"type": "SET_FILTER", "sort": true, "filter": "price"}"#)
        .unwrap();
    handler
        .handle_json(
            r#"{"type": "SET_SORT", "sort": [{"name": "rating", "dir": "desc"}, {"name": "price", "dir": "asc"}]}"#,
        )
        .unwrap();
    print_page(&handler);

    // 6. Page through two at a time
    println!("6. Paging two at a time...");
    let pages = handler.total_pages(2);
    for n in 1..=pages {
        let names: Vec<String> = handler
            .page(n, 2)
            .unwrap()
            .iter()
            .map(|r| r.get("product").and_then(|v| v.as_str()).unwrap_or("?").to_string())
            .collect();
        println!("   page {}/{}: {:?}", n, pages, names);
    }

    // 7. Drop the primary sort key
    println!("\n7. Removing sort entry 0...");
    handler.handle_json(r#"{"type": "SET_SORT", "sort": 0}"#).unwrap();
    println!("   sort is now {}", handler.sort_spec());
    print_page(&handler);
}

fn print_page(handler: &IntentHandler) {
    println!("   {} of {} records active", handler.active_len(), handler.total_len());
    for record in handler.page(1, 10).unwrap() {
        println!(
            "   - {:<8} {:<12} price={:<8} rating={}",
            record.get("product").and_then(|v| v.as_str()).unwrap_or("?"),
            record.get("category").and_then(|v| v.as_str()).unwrap_or("?"),
            record.get("price").and_then(|v| v.as_f64()).unwrap_or(f64::NAN),
            record
                .get("rating")
                .and_then(|v| v.as_f64())
                .map(|r| r.to_string())
                .unwrap_or_else(|| "-".to_string()),
        );
    }
    println!();
}
