//! Rebuild letter records from an Omeka MySQL dump without a database.
//!
//! The pipeline is: [`parser::insert::InsertScanner`] pulls `INSERT`
//! statements for the configured tables out of the dump,
//! [`parser::values::tokenize_values`] decodes their rows into a
//! [`store::TableStore`], and [`reconstruct::reconstruct`] joins items with
//! element texts, tags and files through a [`parser::schema::ColumnBinding`].

pub mod error;
pub mod logger;
pub mod model;
pub mod output;
pub mod parser;
pub mod progress;
pub mod reconstruct;
pub mod report;
pub mod store;

pub use error::{DumpError, Result};
pub use model::{FileRef, Letter};
pub use parser::schema::{ColumnBinding, SchemaVersion};
pub use reconstruct::{reconstruct, Selector};
pub use store::TableStore;
