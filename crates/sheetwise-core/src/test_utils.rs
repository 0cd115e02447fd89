//! Test utilities for Sheetwise

use serde_json::{Value, json};

use crate::model::{Dataset, Record};

/// Build a record from `(column, value)` pairs, keeping column order.
pub fn record(cells: &[(&str, Value)]) -> Record {
    cells.iter().map(|(column, value)| (column.to_string(), value.clone())).collect()
}

/// Small monthly sales table used across tests.
pub fn sales_dataset() -> Dataset {
    Dataset::new(vec![
        record(&[("month", json!("Jan")), ("region", json!("North")), ("revenue", json!(1200.5))]),
        record(&[("month", json!("Feb")), ("region", json!("North")), ("revenue", json!(980))]),
        record(&[("month", json!("Mar")), ("region", json!("South")), ("revenue", json!(null))]),
    ])
}

/// A table with `rows` numbered rows.
pub fn numbered_dataset(rows: usize) -> Dataset {
    Dataset::new(
        (0..rows)
            .map(|i| record(&[("row", json!(i)), ("label", json!(format!("item-{i}")))]))
            .collect(),
    )
}
