// In-memory table store: rows per dump table in dump order, plus the id -> name
// lookups the reconstruction engine builds once per run.

use crate::error::Result;
use crate::parser::schema::Column;
use crate::parser::RawRow;
use ahash::AHashMap;
use std::collections::BTreeMap;

/// Append-only rows per dump table name.
#[derive(Debug, Default)]
pub struct TableStore {
    tables: BTreeMap<String, Vec<RawRow>>,
}

impl TableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, table: &str, rows: Vec<RawRow>) {
        match self.tables.get_mut(table) {
            Some(existing) => existing.extend(rows),
            None => {
                self.tables.insert(table.to_string(), rows);
            }
        }
    }

    /// Rows of `table` in dump order; empty when nothing was loaded.
    pub fn rows(&self, table: &str) -> &[RawRow] {
        self.tables.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Row count per loaded table, sorted by table name.
    pub fn row_counts(&self) -> BTreeMap<String, usize> {
        self.tables
            .iter()
            .map(|(name, rows)| (name.clone(), rows.len()))
            .collect()
    }

    pub fn total_rows(&self) -> usize {
        self.tables.values().map(Vec::len).sum()
    }
}

/// Reverse index from id to display name (elements, tags).
///
/// Later rows win when an id repeats. Rows with a NULL name are left out so
/// they resolve like any other missing id.
#[derive(Debug, Default)]
pub struct NameIndex {
    names: AHashMap<i64, String>,
}

impl NameIndex {
    pub fn build(rows: &[RawRow], id: &Column, name: &Column) -> Result<Self> {
        let mut names = AHashMap::with_capacity(rows.len());
        for (pos, row) in rows.iter().enumerate() {
            let key = id.required_int(row, pos)?;
            if let Some(value) = name.text(row, pos)? {
                names.insert(key, value.to_string());
            }
        }
        Ok(Self { names })
    }

    pub fn resolve(&self, id: i64) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
