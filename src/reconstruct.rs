// Reconstruction engine: joins items with their element texts, tags and files.
// Every index is built once before the per-item pass, which then runs on the
// current rayon pool against frozen, read-only state.

use crate::error::Result;
use crate::model::{ElementText, FileRef, Item, Letter, Tagging};
use crate::parser::schema::{
    Column, ColumnBinding, ELEMENTS, ELEMENT_TEXTS, FILES, ITEMS, TAGGINGS, TAGS,
};
use crate::store::{NameIndex, TableStore};
use ahash::AHashMap;
use indexmap::IndexMap;
use log::debug;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeSet;
use std::ops::AddAssign;
use std::time::Instant;

/// Subject type a tagging must carry to count for an item.
pub const ITEM_SUBJECT: &str = "Item";

/// Which items become letters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    All,
    ItemType(i64),
    Ids(BTreeSet<i64>),
}

impl Selector {
    pub fn matches(&self, item: &Item) -> bool {
        match self {
            Selector::All => true,
            Selector::ItemType(type_id) => item.item_type_id == Some(*type_id),
            Selector::Ids(ids) => ids.contains(&item.id),
        }
    }
}

/// References that had no matching row and got an `Unknown_<id>` label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Unresolved {
    pub elements: usize,
    pub tags: usize,
}

impl Unresolved {
    pub fn total(&self) -> usize {
        self.elements + self.tags
    }
}

impl AddAssign for Unresolved {
    fn add_assign(&mut self, other: Self) {
        self.elements += other.elements;
        self.tags += other.tags;
    }
}

#[derive(Debug)]
pub struct Reconstruction {
    pub items_seen: usize,
    pub letters: Vec<Letter>,
    pub unresolved: Unresolved,
}

// Every column the engine reads, resolved before any row is touched.
struct Columns {
    item_id: Column,
    item_type: Column,
    item_public: Column,
    item_added: Column,
    item_modified: Column,
    element_id: Column,
    element_name: Column,
    text_record: Column,
    text_element: Column,
    text_value: Column,
    tag_id: Column,
    tag_name: Column,
    tagging_relation: Column,
    tagging_tag: Column,
    tagging_type: Column,
    file_item: Column,
    file_filename: Column,
    file_original: Column,
    file_mime: Column,
}

impl Columns {
    fn resolve(binding: &ColumnBinding) -> Result<Self> {
        Ok(Self {
            item_id: binding.column(ITEMS, "id")?,
            item_type: binding.column(ITEMS, "item_type_id")?,
            item_public: binding.column(ITEMS, "public")?,
            item_added: binding.column(ITEMS, "added")?,
            item_modified: binding.column(ITEMS, "modified")?,
            element_id: binding.column(ELEMENTS, "id")?,
            element_name: binding.column(ELEMENTS, "name")?,
            text_record: binding.column(ELEMENT_TEXTS, "record_id")?,
            text_element: binding.column(ELEMENT_TEXTS, "element_id")?,
            text_value: binding.column(ELEMENT_TEXTS, "text")?,
            tag_id: binding.column(TAGS, "id")?,
            tag_name: binding.column(TAGS, "name")?,
            tagging_relation: binding.column(TAGGINGS, "relation_id")?,
            tagging_tag: binding.column(TAGGINGS, "tag_id")?,
            tagging_type: binding.column(TAGGINGS, "type")?,
            file_item: binding.column(FILES, "item_id")?,
            file_filename: binding.column(FILES, "filename")?,
            file_original: binding.column(FILES, "original_filename")?,
            file_mime: binding.column(FILES, "mime_type")?,
        })
    }
}

/// Fail fast when the binding lacks a column the engine needs.
pub fn check_binding(binding: &ColumnBinding) -> Result<()> {
    Columns::resolve(binding).map(|_| ())
}

// Owner id -> child records, each list in dump order.
type OwnerIndex<T> = AHashMap<i64, Vec<T>>;

// Frozen join state shared by all workers.
struct JoinIndex {
    element_names: NameIndex,
    tag_names: NameIndex,
    texts: OwnerIndex<ElementText>,
    taggings: OwnerIndex<Tagging>,
    files: OwnerIndex<FileRef>,
}

impl JoinIndex {
    fn build(store: &TableStore, cols: &Columns) -> Result<Self> {
        let element_names = NameIndex::build(
            store.rows(&cols.element_id.table),
            &cols.element_id,
            &cols.element_name,
        )?;
        let tag_names = NameIndex::build(store.rows(&cols.tag_id.table), &cols.tag_id, &cols.tag_name)?;

        let mut texts: OwnerIndex<ElementText> = AHashMap::new();
        for (pos, row) in store.rows(&cols.text_record.table).iter().enumerate() {
            let text = ElementText {
                record_id: cols.text_record.required_int(row, pos)?,
                element_id: cols.text_element.required_int(row, pos)?,
                text: cols.text_value.text(row, pos)?.map(str::to_string),
            };
            texts.entry(text.record_id).or_default().push(text);
        }

        let mut taggings: OwnerIndex<Tagging> = AHashMap::new();
        for (pos, row) in store.rows(&cols.tagging_relation.table).iter().enumerate() {
            if cols.tagging_type.text(row, pos)? != Some(ITEM_SUBJECT) {
                continue;
            }
            let tagging = Tagging {
                relation_id: cols.tagging_relation.required_int(row, pos)?,
                tag_id: cols.tagging_tag.required_int(row, pos)?,
            };
            taggings.entry(tagging.relation_id).or_default().push(tagging);
        }

        let mut files: OwnerIndex<FileRef> = AHashMap::new();
        for (pos, row) in store.rows(&cols.file_item.table).iter().enumerate() {
            // Files not attached to an item cannot belong to a letter.
            let Some(item_id) = cols.file_item.int(row, pos)? else {
                continue;
            };
            let file = FileRef {
                original: cols.file_original.text(row, pos)?.map(str::to_string),
                filename: cols.file_filename.text(row, pos)?.map(str::to_string),
                mime_type: cols.file_mime.text(row, pos)?.map(str::to_string),
            };
            files.entry(item_id).or_default().push(file);
        }

        debug!(
            "JoinIndex: {} elements, {} tags, {} items with texts, {} with taggings, {} with files",
            element_names.len(),
            tag_names.len(),
            texts.len(),
            taggings.len(),
            files.len()
        );

        Ok(Self {
            element_names,
            tag_names,
            texts,
            taggings,
            files,
        })
    }

    fn letter(&self, item: &Item) -> (Letter, Unresolved) {
        let mut unresolved = Unresolved::default();

        // Keys in first-mention order.
        let mut metadata: IndexMap<String, Vec<Option<String>>> = IndexMap::new();
        for text in self.texts.get(&item.id).into_iter().flatten() {
            let name = match self.element_names.resolve(text.element_id) {
                Some(name) => name.to_string(),
                None => {
                    unresolved.elements += 1;
                    fallback_label(text.element_id)
                }
            };
            metadata.entry(name).or_default().push(text.text.clone());
        }

        let mut tags = BTreeSet::new();
        for tagging in self.taggings.get(&item.id).into_iter().flatten() {
            let name = match self.tag_names.resolve(tagging.tag_id) {
                Some(name) => name.to_string(),
                None => {
                    unresolved.tags += 1;
                    fallback_label(tagging.tag_id)
                }
            };
            tags.insert(name);
        }

        let files = self.files.get(&item.id).cloned().unwrap_or_default();

        let letter = Letter {
            id: item.id,
            added: item.added.clone(),
            modified: item.modified.clone(),
            public: item.public,
            metadata,
            tags: tags.into_iter().collect(),
            files,
        };
        (letter, unresolved)
    }
}

fn fallback_label(id: i64) -> String {
    format!("Unknown_{id}")
}

fn load_items(store: &TableStore, cols: &Columns) -> Result<Vec<Item>> {
    let rows = store.rows(&cols.item_id.table);
    let mut items = Vec::with_capacity(rows.len());
    for (pos, row) in rows.iter().enumerate() {
        items.push(Item {
            id: cols.item_id.required_int(row, pos)?,
            item_type_id: cols.item_type.int(row, pos)?,
            public: cols.item_public.int(row, pos)?.is_some_and(|v| v != 0),
            added: cols.item_added.text(row, pos)?.map(str::to_string),
            modified: cols.item_modified.text(row, pos)?.map(str::to_string),
        });
    }
    Ok(items)
}

/// Build one letter per selected item, in dump order of the items table.
///
/// Schema mismatches (missing bindings, short rows, non-integer ids) abort
/// with an error before any letter is produced. Dangling element or tag ids
/// are labelled `Unknown_<id>` and counted in `unresolved`.
pub fn reconstruct(
    store: &TableStore,
    binding: &ColumnBinding,
    selector: &Selector,
) -> Result<Reconstruction> {
    let start = Instant::now();
    let cols = Columns::resolve(binding)?;
    let items = load_items(store, &cols)?;
    let index = JoinIndex::build(store, &cols)?;

    let selected: Vec<&Item> = items.iter().filter(|item| selector.matches(item)).collect();
    let built: Vec<(Letter, Unresolved)> = selected
        .par_iter()
        .map(|item| index.letter(item))
        .collect();

    let mut unresolved = Unresolved::default();
    let mut letters = Vec::with_capacity(built.len());
    for (letter, missing) in built {
        unresolved += missing;
        letters.push(letter);
    }

    debug!(
        "reconstruct: {} of {} items selected in {:?}",
        letters.len(),
        items.len(),
        start.elapsed()
    );

    Ok(Reconstruction {
        items_seen: items.len(),
        letters,
        unresolved,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DumpError;
    use crate::parser::schema::SchemaVersion;
    use crate::parser::values::tokenize_values;

    fn store_with(tables: &[(&str, &str)]) -> TableStore {
        let mut store = TableStore::new();
        for (table, values) in tables {
            store.append(table, tokenize_values(values).unwrap());
        }
        store
    }

    fn sample_store() -> TableStore {
        store_with(&[
            (
                "omeka_items",
                "(42,1,NULL,0,1,'2012-02-01','2012-01-01',1),\
                 (43,2,NULL,0,1,'2012-02-02','2012-01-02',1),\
                 (44,1,NULL,0,0,'2012-02-03','2012-01-03',1)",
            ),
            (
                "omeka_elements",
                "(50,2,1,1,1,'Title',NULL),(40,2,1,1,2,'Date',NULL)",
            ),
            (
                "omeka_element_texts",
                "(1,42,2,50,0,'first'),(2,42,2,40,0,'1902'),\
                 (3,42,2,50,0,'second'),(4,43,2,50,0,'other'),\
                 (5,42,2,50,0,'third'),(6,44,2,99,0,'orphan')",
            ),
            ("omeka_tags", "(1,'oslo'),(2,'Oslo'),(3,'Bergen')"),
            (
                "omeka_taggings",
                "(1,42,2,1,'Item','t'),(2,42,1,1,'Item','t'),\
                 (3,42,2,1,'Item','t'),(4,42,3,1,'Collection','t'),\
                 (5,44,77,1,'Item','t')",
            ),
            (
                "omeka_files",
                "(1,42,10,0,'','image/jpeg','','','b.jpg','page2.jpg',NULL,NULL,1,''),\
                 (2,NULL,10,0,'','image/png','','','x.png','loose.png',NULL,NULL,1,''),\
                 (3,42,10,0,'','image/jpeg','','','a.jpg','page1.jpg',NULL,NULL,1,'')",
            ),
        ])
    }

    fn omeka() -> ColumnBinding {
        ColumnBinding::for_version(SchemaVersion::Omeka)
    }

    #[test]
    fn groups_metadata_values_in_dump_order() {
        let result = reconstruct(&sample_store(), &omeka(), &Selector::ItemType(1)).unwrap();
        let letter = &result.letters[0];
        assert_eq!(letter.id, 42);
        assert_eq!(
            letter.metadata["Title"],
            vec![
                Some("first".to_string()),
                Some("second".to_string()),
                Some("third".to_string())
            ]
        );
        assert_eq!(letter.metadata["Date"], vec![Some("1902".to_string())]);
        let keys: Vec<_> = letter.metadata.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["Title", "Date"]);
        assert_eq!(letter.added.as_deref(), Some("2012-01-01"));
        assert_eq!(letter.modified.as_deref(), Some("2012-02-01"));
        assert!(letter.public);
    }

    #[test]
    fn tags_are_sorted_deduplicated_and_case_sensitive() {
        let result = reconstruct(&sample_store(), &omeka(), &Selector::ItemType(1)).unwrap();
        assert_eq!(result.letters[0].tags, vec!["Oslo", "oslo"]);
    }

    #[test]
    fn files_keep_table_order_and_skip_unowned_rows() {
        let result = reconstruct(&sample_store(), &omeka(), &Selector::ItemType(1)).unwrap();
        let originals: Vec<_> = result.letters[0]
            .files
            .iter()
            .map(|f| f.original.as_deref().unwrap())
            .collect();
        assert_eq!(originals, vec!["page2.jpg", "page1.jpg"]);
        assert_eq!(result.letters[0].files[0].filename.as_deref(), Some("b.jpg"));
        assert_eq!(result.letters[0].files[0].mime_type.as_deref(), Some("image/jpeg"));
    }

    #[test]
    fn dangling_references_get_fallback_labels() {
        let result = reconstruct(&sample_store(), &omeka(), &Selector::ItemType(1)).unwrap();
        let letter = &result.letters[1];
        assert_eq!(letter.id, 44);
        assert!(!letter.public);
        assert_eq!(letter.metadata["Unknown_99"], vec![Some("orphan".to_string())]);
        assert_eq!(letter.tags, vec!["Unknown_77"]);
        assert_eq!(result.unresolved, Unresolved { elements: 1, tags: 1 });
        assert_eq!(result.unresolved.total(), 2);
    }

    #[test]
    fn selects_by_type_or_explicit_ids() {
        let store = sample_store();
        let by_type = reconstruct(&store, &omeka(), &Selector::ItemType(1)).unwrap();
        let ids: Vec<_> = by_type.letters.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![42, 44]);
        assert_eq!(by_type.items_seen, 3);

        let explicit = Selector::Ids([43, 44].into_iter().collect());
        let by_id = reconstruct(&store, &omeka(), &explicit).unwrap();
        let ids: Vec<_> = by_id.letters.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![43, 44]);

        let all = reconstruct(&store, &omeka(), &Selector::All).unwrap();
        assert_eq!(all.letters.len(), 3);
    }

    #[test]
    fn reconstruction_is_idempotent() {
        let store = sample_store();
        let first = reconstruct(&store, &omeka(), &Selector::All).unwrap();
        let second = reconstruct(&store, &omeka(), &Selector::All).unwrap();
        assert_eq!(first.letters, second.letters);
        assert_eq!(
            serde_json::to_string(&first.letters).unwrap(),
            serde_json::to_string(&second.letters).unwrap()
        );
    }

    #[test]
    fn legacy_layout_reads_its_own_positions() {
        let store = store_with(&[
            ("omeka_items", "(7,1,NULL,'added','modified',0,1)"),
            ("omeka_elements", "(50,1,'Title')"),
            ("omeka_element_texts", "(1,7,2,50,0,'Hei')"),
            ("omeka_tags", "(3,'Bergen')"),
            ("omeka_taggings", "(3,7,'Item')"),
            ("omeka_files", "(1,7,'stored.jpg','scan.jpg','image/jpeg')"),
        ]);
        let binding = ColumnBinding::for_version(SchemaVersion::Legacy);
        let result = reconstruct(&store, &binding, &Selector::ItemType(1)).unwrap();
        let letter = &result.letters[0];
        assert_eq!(letter.added.as_deref(), Some("added"));
        assert_eq!(letter.modified.as_deref(), Some("modified"));
        assert_eq!(letter.first("Title"), Some("Hei"));
        assert_eq!(letter.tags, vec!["Bergen"]);
        assert_eq!(letter.files[0].filename.as_deref(), Some("stored.jpg"));
        assert_eq!(result.unresolved.total(), 0);
    }

    #[test]
    fn missing_column_binding_is_fatal() {
        let mut binding = omeka();
        binding
            .tables
            .get_mut(TAGS)
            .unwrap()
            .columns
            .retain(|c| c != "name");
        assert!(matches!(
            check_binding(&binding),
            Err(DumpError::UnknownColumn { .. })
        ));
        assert!(matches!(
            reconstruct(&sample_store(), &binding, &Selector::All),
            Err(DumpError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn short_rows_abort_instead_of_shifting_fields() {
        // A dump with fewer item columns than the binding expects.
        let store = store_with(&[("omeka_items", "(42,1,NULL,0,1)")]);
        assert!(matches!(
            reconstruct(&store, &omeka(), &Selector::All),
            Err(DumpError::ShortRow { .. })
        ));
    }

    #[test]
    fn empty_store_yields_no_letters() {
        let result = reconstruct(&TableStore::new(), &omeka(), &Selector::All).unwrap();
        assert!(result.letters.is_empty());
        assert_eq!(result.items_seen, 0);
    }
}
