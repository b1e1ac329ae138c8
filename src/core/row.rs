//! Positional rows built from records and a fixed column order

use super::error::{HookError, Result};
use super::record::{FieldValue, Record};
use serde::Serialize;

/// One value per column, in column order
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Row(Vec<FieldValue>);

impl Row {
    pub fn values(&self) -> &[FieldValue] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Build the row for `record` under `columns`
///
/// Fields not named in `columns` are ignored. The first column that is
/// missing or `Null` aborts the row with [`HookError::MalformedRecord`].
pub fn build_row(columns: &[String], record: &Record) -> Result<Row> {
    columns
        .iter()
        .map(|column| match record.get(column) {
            Some(FieldValue::Null) | None => Err(HookError::malformed(column.as_str())),
            Some(value) => Ok(value.clone()),
        })
        .collect::<Result<Vec<_>>>()
        .map(Row)
}

/// Build rows for every well-formed record, in order
///
/// `on_malformed` sees each rejected record together with its error; the
/// remaining records are unaffected.
pub fn build_rows<'a, I, F>(columns: &[String], records: I, mut on_malformed: F) -> Vec<Row>
where
    I: IntoIterator<Item = &'a Record>,
    F: FnMut(&Record, HookError),
{
    records
        .into_iter()
        .filter_map(|record| match build_row(columns, record) {
            Ok(row) => Some(row),
            Err(e) => {
                on_malformed(record, e);
                None
            }
        })
        .collect()
}
