//! Tabular swap result set.
//!
//! Rows are flattened from the subgraph's nested JSON objects following the
//! query's field paths. Cells are kept as strings: subgraph numerics are
//! BigInt/BigDecimal values serialized as strings, and the artifact is CSV
//! anyway, so no precision is lost by not parsing them.

use super::provider::DataError;
use super::query::{FieldPath, SwapQuery};
use serde_json::Value;
use std::io;

/// Header of the column carrying the protocol label.
pub const PROTOCOL_COLUMN: &str = "protocol";

static NULL: Value = Value::Null;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SwapTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl SwapTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Flatten `records` into a table with one column per query field.
    pub fn from_records(query: &SwapQuery, records: &[Value]) -> Result<Self, DataError> {
        let mut table = Self::new(query.columns());
        table.extend_from_records(query, records)?;
        Ok(table)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append one row; its width must match the header.
    pub fn push_row(&mut self, row: Vec<String>) -> Result<(), DataError> {
        if row.len() != self.columns.len() {
            return Err(DataError::ResponseFormatChanged(format!(
                "row has {} cells, table has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Append rows flattened from subgraph records.
    pub fn extend_from_records(
        &mut self,
        query: &SwapQuery,
        records: &[Value],
    ) -> Result<(), DataError> {
        self.rows.reserve(records.len());
        for record in records {
            let row = query
                .fields
                .iter()
                .map(|path| lookup(record, path).map(cell))
                .collect::<Result<Vec<_>, _>>()?;
            self.push_row(row)?;
        }
        Ok(())
    }

    /// Insert a constant-valued column in front of every other column.
    pub fn insert_label_column(&mut self, name: &str, value: &str) {
        self.columns.insert(0, name.to_string());
        for row in &mut self.rows {
            row.insert(0, value.to_string());
        }
    }

    /// Write the header and every row as CSV.
    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<(), DataError> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(&self.columns)
            .map_err(|e| DataError::StoreError(format!("csv header: {e}")))?;
        for row in &self.rows {
            wtr.write_record(row)
                .map_err(|e| DataError::StoreError(format!("csv row: {e}")))?;
        }
        wtr.flush()
            .map_err(|e| DataError::StoreError(format!("csv flush: {e}")))?;
        Ok(())
    }
}

/// Walk `path` through `record`. A `null` link (e.g. a swap without a pool)
/// yields `null`; a missing key means the response doesn't match the query.
fn lookup<'a>(record: &'a Value, path: &FieldPath) -> Result<&'a Value, DataError> {
    let mut current = record;
    for segment in path.segments() {
        match current {
            Value::Null => return Ok(&NULL),
            Value::Object(map) => {
                current = map.get(segment).ok_or_else(|| {
                    DataError::ResponseFormatChanged(format!(
                        "record is missing field '{}'",
                        path.segments().join(".")
                    ))
                })?;
            }
            _ => {
                return Err(DataError::ResponseFormatChanged(format!(
                    "'{}' is not an object in the response",
                    path.segments().join(".")
                )))
            }
        }
    }
    Ok(current)
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::window::TimeWindow;
    use chrono::NaiveDate;
    use serde_json::json;

    fn query() -> SwapQuery {
        let w = TimeWindow::for_day(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()).unwrap();
        SwapQuery::for_window(&w, 100).with_fields(&["timestamp", "pool.id", "amountUSD"])
    }

    #[test]
    fn flattens_nested_records() {
        let records = vec![
            json!({"id": "a", "timestamp": "1704067300", "pool": {"id": "0xpool"}, "amountUSD": "12.5"}),
            json!({"id": "b", "timestamp": "1704067400", "pool": null, "amountUSD": 3}),
        ];
        let table = SwapTable::from_records(&query(), &records).unwrap();
        assert_eq!(
            table.columns(),
            &["swaps_timestamp", "swaps_pool_id", "swaps_amountUSD"]
        );
        assert_eq!(table.rows()[0], vec!["1704067300", "0xpool", "12.5"]);
        assert_eq!(table.rows()[1], vec!["1704067400", "", "3"]);
    }

    #[test]
    fn missing_field_is_a_format_error() {
        let records = vec![json!({"id": "a", "timestamp": "1", "amountUSD": "1"})];
        let err = SwapTable::from_records(&query(), &records).unwrap_err();
        assert!(matches!(err, DataError::ResponseFormatChanged(_)));
    }

    #[test]
    fn label_column_goes_first_on_every_row() {
        let mut table = SwapTable::new(vec!["a".into(), "b".into()]);
        table.push_row(vec!["1".into(), "2".into()]).unwrap();
        table.push_row(vec!["3".into(), "4".into()]).unwrap();
        table.insert_label_column(PROTOCOL_COLUMN, "uniswap_v3");

        assert_eq!(table.columns()[0], "protocol");
        assert!(table.rows().iter().all(|r| r[0] == "uniswap_v3" && r.len() == 3));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let mut table = SwapTable::new(vec!["a".into()]);
        assert!(table.push_row(vec!["1".into(), "2".into()]).is_err());
    }

    #[test]
    fn csv_output_quotes_where_needed() {
        let mut table = SwapTable::new(vec!["name".into(), "n".into()]);
        table.push_row(vec!["Wrapped, Ether".into(), "18".into()]).unwrap();
        let mut buf = Vec::new();
        table.write_csv(&mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "name,n\n\"Wrapped, Ether\",18\n");
    }
}
