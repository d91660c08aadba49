// Schema binding: names for the positional fields of each dump table.
// Column order is configuration, never inferred from CREATE TABLE, because
// exports from different Omeka versions disagree on it.

use crate::error::{DumpError, Result};
use crate::parser::{RawField, RawRow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

pub const ITEMS: &str = "items";
pub const ELEMENTS: &str = "elements";
pub const ELEMENT_TEXTS: &str = "element_texts";
pub const TAGS: &str = "tags";
pub const TAGGINGS: &str = "taggings";
pub const FILES: &str = "files";

pub const DEFAULT_PREFIX: &str = "omeka_";

/// Built-in column layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVersion {
    /// Layout of the Omeka export read by the later extraction runs.
    Omeka,
    /// Layout assumed by the first extraction run.
    Legacy,
}

impl FromStr for SchemaVersion {
    type Err = DumpError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "omeka" => Ok(SchemaVersion::Omeka),
            "legacy" => Ok(SchemaVersion::Legacy),
            _ => Err(DumpError::UnknownSchema(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableBinding {
    /// Dump table name without the prefix.
    pub name: String,
    /// Column names in positional order.
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnBinding {
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Logical table (`items`, `tags`, ...) -> dump layout.
    pub tables: BTreeMap<String, TableBinding>,
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

type Layout = &'static [(&'static str, &'static [&'static str])];

const OMEKA_LAYOUT: Layout = &[
    (
        ITEMS,
        &[
            "id",
            "item_type_id",
            "collection_id",
            "featured",
            "public",
            "modified",
            "added",
            "owner_id",
        ],
    ),
    (
        ELEMENTS,
        &[
            "id",
            "record_type_id",
            "data_type_id",
            "element_set_id",
            "order",
            "name",
            "description",
        ],
    ),
    (
        ELEMENT_TEXTS,
        &["id", "record_id", "record_type_id", "element_id", "html", "text"],
    ),
    (TAGS, &["id", "name"]),
    (
        TAGGINGS,
        &["id", "relation_id", "tag_id", "tagger_id", "type", "time"],
    ),
    // mime_browser and archive_filename, under the names the
    // letter output uses.
    (
        FILES,
        &[
            "id",
            "item_id",
            "size",
            "has_derivative_image",
            "authentication",
            "mime_type",
            "mime_os",
            "type_os",
            "filename",
            "original_filename",
            "modified",
            "added",
            "stored",
            "metadata",
        ],
    ),
];

const LEGACY_LAYOUT: Layout = &[
    (
        ITEMS,
        &[
            "id",
            "item_type_id",
            "collection_id",
            "added",
            "modified",
            "featured",
            "public",
        ],
    ),
    (ELEMENTS, &["id", "element_set_id", "name"]),
    (
        ELEMENT_TEXTS,
        &["id", "record_id", "record_type_id", "element_id", "html", "text"],
    ),
    (TAGS, &["id", "name"]),
    (TAGGINGS, &["tag_id", "relation_id", "type"]),
    (
        FILES,
        &["id", "item_id", "filename", "original_filename", "mime_type"],
    ),
];

/// A resolved column: where to find a named value in rows of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub table: String,
    pub name: String,
    pub index: usize,
}

impl ColumnBinding {
    pub fn for_version(version: SchemaVersion) -> Self {
        let layout = match version {
            SchemaVersion::Omeka => OMEKA_LAYOUT,
            SchemaVersion::Legacy => LEGACY_LAYOUT,
        };

        let tables = layout
            .iter()
            .map(|(table, columns)| {
                (
                    table.to_string(),
                    TableBinding {
                        name: table.to_string(),
                        columns: columns.iter().map(|c| c.to_string()).collect(),
                    },
                )
            })
            .collect();
        Self {
            prefix: default_prefix(),
            tables,
        }
    }

    /// Load a binding from a JSON file shaped like the serialized struct.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn table(&self, table: &str) -> Result<&TableBinding> {
        self.tables.get(table).ok_or_else(|| DumpError::UnknownColumn {
            table: table.to_string(),
            column: "*".to_string(),
        })
    }

    /// Full dump table name for a logical table.
    pub fn dump_table(&self, table: &str) -> Result<String> {
        Ok(format!("{}{}", self.prefix, self.table(table)?.name))
    }

    /// Dump table names the scanner should collect.
    pub fn watched_tables(&self) -> Vec<String> {
        self.tables
            .values()
            .map(|t| format!("{}{}", self.prefix, t.name))
            .collect()
    }

    pub fn column_index(&self, table: &str, column: &str) -> Result<usize> {
        self.table(table)?
            .columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| DumpError::UnknownColumn {
                table: table.to_string(),
                column: column.to_string(),
            })
    }

    pub fn column(&self, table: &str, column: &str) -> Result<Column> {
        Ok(Column {
            table: self.dump_table(table)?,
            name: column.to_string(),
            index: self.column_index(table, column)?,
        })
    }
}

impl Column {
    /// Field of `row`; `pos` is the row's position in its table, for errors.
    pub fn field<'r>(&self, row: &'r RawRow, pos: usize) -> Result<&'r RawField> {
        row.get(self.index).ok_or_else(|| DumpError::ShortRow {
            table: self.table.clone(),
            column: self.name.clone(),
            row: pos,
            index: self.index,
            len: row.len(),
        })
    }

    pub fn text<'r>(&self, row: &'r RawRow, pos: usize) -> Result<Option<&'r str>> {
        Ok(self.field(row, pos)?.as_str())
    }

    /// Integer value; NULL and the empty string read as absent.
    pub fn int(&self, row: &RawRow, pos: usize) -> Result<Option<i64>> {
        match self.text(row, pos)?.map(str::trim) {
            None | Some("") => Ok(None),
            Some(value) => value.parse().map(Some).map_err(|_| self.not_integer(value)),
        }
    }

    pub fn required_int(&self, row: &RawRow, pos: usize) -> Result<i64> {
        self.int(row, pos)?.ok_or_else(|| self.not_integer("NULL"))
    }

    fn not_integer(&self, value: &str) -> DumpError {
        DumpError::InvalidInteger {
            table: self.table.clone(),
            column: self.name.clone(),
            value: value.to_string(),
        }
    }
}
