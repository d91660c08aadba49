// Typed views over dump rows and the letter record the tool emits.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub id: i64,
    pub item_type_id: Option<i64>,
    pub public: bool,
    pub added: Option<String>,
    pub modified: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementText {
    pub record_id: i64,
    pub element_id: i64,
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tagging {
    pub relation_id: i64,
    pub tag_id: i64,
}

/// An attached file as it appears in a letter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub original: Option<String>,
    pub filename: Option<String>,
    pub mime_type: Option<String>,
}

/// One reconstructed archival item.
///
/// `metadata` keys follow the order in which the item's element texts first
/// name each field, and every value of a field stays in dump order. `tags` is
/// sorted and free of exact duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Letter {
    pub id: i64,
    pub added: Option<String>,
    pub modified: Option<String>,
    pub public: bool,
    pub metadata: IndexMap<String, Vec<Option<String>>>,
    pub tags: Vec<String>,
    pub files: Vec<FileRef>,
}

impl Letter {
    /// First value of a metadata field, if any.
    pub fn first(&self, field: &str) -> Option<&str> {
        self.metadata
            .get(field)
            .and_then(|values| values.iter().flatten().next())
            .map(String::as_str)
    }
}
