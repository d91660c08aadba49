// Parser module: INSERT statement scanning, row tokenizing and the column
// bindings that give positional fields their names.

pub mod insert;
pub mod schema;
pub mod values;

/// One decoded literal from a VALUES tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawField {
    Null,
    Text(String),
}

impl RawField {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RawField::Null => None,
            RawField::Text(s) => Some(s),
        }
    }
}

/// One parenthesized tuple, fields in dump order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    fields: Vec<RawField>,
}

impl RawRow {
    pub fn new(fields: Vec<RawField>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[RawField] {
        &self.fields
    }

    pub fn get(&self, index: usize) -> Option<&RawField> {
        self.fields.get(index)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_fields(self) -> Vec<RawField> {
        self.fields
    }
}
