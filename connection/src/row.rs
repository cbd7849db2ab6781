use std::sync::Arc;

use crate::value::SqlValue;

/// Reflection metadata the driver reports per returned column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMeta {
    pub name: String,
    /// The driver's raw type name, e.g. `"VARCHAR"`, `"DATETIME2"`.
    pub database_type_name: String,
}

/// One decoded row. Columns are shared across every row of a result set
/// via `Arc`, so cloning a row never re-allocates its column metadata.
#[derive(Debug, Clone)]
pub struct Row {
    values: Vec<SqlValue>,
    columns: Arc<[ColumnMeta]>,
}

impl Row {
    pub fn new(values: Vec<SqlValue>, columns: Arc<[ColumnMeta]>) -> Self {
        assert_eq!(values.len(), columns.len());
        Row { values, columns }
    }

    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn value(&self, idx: usize) -> &SqlValue {
        &self.values[idx]
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ColumnMeta, &SqlValue)> {
        self.columns.iter().zip(self.values.iter())
    }

    /// Looks up a cell by column name (first match), for callers that
    /// only care about one column (e.g. `__$operation`).
    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .map(|i| &self.values[i])
    }
}
