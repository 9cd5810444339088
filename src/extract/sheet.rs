//! Spreadsheet reading via calamine.
//!
//! One `row-group` item per worksheet, holding the whole used range as a
//! cell matrix. Sheets are numbered from 1 in workbook order; empty cells
//! become `null` so column positions survive serialisation.

use crate::error::ReviewError;
use crate::model::ContentItem;
use calamine::{open_workbook_auto, Data, Range, Reader};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info, warn};

/// Extract one item per worksheet, in workbook order.
pub fn extract_sheets(path: &Path) -> Result<Vec<ContentItem>, ReviewError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| ReviewError::Extraction {
        path: path.to_path_buf(),
        detail: format!("Failed to open workbook: {e}"),
    })?;

    let names: Vec<String> = workbook.sheet_names().to_vec();
    let mut items = Vec::with_capacity(names.len());

    for (i, name) in names.iter().enumerate() {
        let index = i as u32 + 1;
        match workbook.worksheet_range(name) {
            Ok(range) => {
                let rows = range_rows(&range);
                debug!("Sheet {} '{}': {} rows", index, name, rows.len());
                items.push(ContentItem::sheet(index, name.clone(), rows));
            }
            // Chart sheets and the like have no cell range.
            Err(e) => {
                warn!("Sheet {} '{}' has no readable cells: {}", index, name, e);
                items.push(ContentItem::sheet(index, name.clone(), Vec::new()));
            }
        }
    }

    info!("Extracted {} sheets from {}", items.len(), path.display());
    Ok(items)
}

/// The used range as rows of JSON cells.
pub fn range_rows(range: &Range<Data>) -> Vec<Vec<Value>> {
    range
        .rows()
        .map(|row| row.iter().map(cell_value).collect())
        .collect()
}

fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::Int(i) => Value::from(*i),
        Data::Float(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Data::Bool(b) => Value::Bool(*b),
        Data::String(s) => Value::String(s.clone()),
        other => Value::String(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn range_keeps_shape_and_types() {
        let mut range: Range<Data> = Range::new((0, 0), (1, 2));
        range.set_value((0, 0), Data::String("Unit".into()));
        range.set_value((0, 1), Data::String("Design CFM".into()));
        range.set_value((0, 2), Data::String("Measured CFM".into()));
        range.set_value((1, 0), Data::String("AHU-1".into()));
        range.set_value((1, 1), Data::Int(1200));
        range.set_value((1, 2), Data::Float(1010.5));

        let rows = range_rows(&range);
        assert_eq!(
            rows,
            vec![
                vec![json!("Unit"), json!("Design CFM"), json!("Measured CFM")],
                vec![json!("AHU-1"), json!(1200), json!(1010.5)],
            ]
        );
    }

    #[test]
    fn empty_cells_are_null() {
        let mut range: Range<Data> = Range::new((0, 0), (0, 2));
        range.set_value((0, 0), Data::String("VAV-3".into()));
        range.set_value((0, 2), Data::Bool(true));

        let rows = range_rows(&range);
        assert_eq!(rows, vec![vec![json!("VAV-3"), Value::Null, json!(true)]]);
    }

    #[test]
    fn non_finite_float_becomes_null() {
        assert_eq!(cell_value(&Data::Float(f64::NAN)), Value::Null);
    }
}
