// Run summary: what the scan and the join produced. Printed before any output
// is written and optionally saved as JSON.

use crate::error::Result;
use crate::parser::insert::{Diagnostic, ScanStats};
use crate::reconstruct::{Reconstruction, Unresolved};
use crate::store::TableStore;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub statements_parsed: usize,
    /// Watched statements dropped as malformed; one diagnostic each.
    pub statements_skipped: usize,
    /// Statements for tables nobody asked for.
    pub statements_ignored: usize,
    pub diagnostics: Vec<Diagnostic>,
    pub rows: BTreeMap<String, usize>,
    pub items: usize,
    pub letters: usize,
    pub unresolved: Unresolved,
    pub clean: bool,
    pub wall_ms: u64,
}

impl RunReport {
    pub fn new(stats: &ScanStats, store: &TableStore, result: &Reconstruction) -> Self {
        Self {
            statements_parsed: stats.statements_parsed,
            statements_skipped: stats.statements_skipped,
            statements_ignored: stats.statements_ignored,
            diagnostics: stats.diagnostics.clone(),
            rows: store.row_counts(),
            items: result.items_seen,
            letters: result.letters.len(),
            unresolved: result.unresolved,
            clean: stats.diagnostics.is_empty() && result.unresolved.total() == 0,
            wall_ms: 0,
        }
    }

    /// Human-readable block, `=`-ruled.
    pub fn write_summary<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let sep = "=".repeat(60);
        writeln!(out, "\n{}\nSUMMARY\n{}", sep, sep)?;
        writeln!(out, "Statements parsed:    {}", self.statements_parsed)?;
        writeln!(out, "Malformed skipped:    {}", self.statements_skipped)?;
        writeln!(out, "Unwatched ignored:    {}", self.statements_ignored)?;
        writeln!(out, "Diagnostics:          {}", self.diagnostics.len())?;
        for diag in &self.diagnostics {
            let at = diag.offset.map(|o| format!(", offset {o}")).unwrap_or_default();
            writeln!(out, "  {} line {}{}: {}", diag.table, diag.line, at, diag.reason)?;
        }
        for (table, count) in &self.rows {
            writeln!(out, "Rows {:<24} {}", format!("{table}:"), count)?;
        }
        writeln!(out, "Items:                {}", self.items)?;
        writeln!(out, "Letters:              {}", self.letters)?;
        writeln!(
            out,
            "Unresolved refs:      {} (elements {}, tags {})",
            self.unresolved.total(),
            self.unresolved.elements,
            self.unresolved.tags
        )?;
        writeln!(out, "{}", sep)
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::insert::InsertScanner;
    use crate::reconstruct::{reconstruct, Selector};
    use crate::{ColumnBinding, SchemaVersion};

    fn run(dump: &str) -> RunReport {
        let binding = ColumnBinding::for_version(SchemaVersion::Omeka);
        let mut store = TableStore::new();
        let mut scanner = InsertScanner::new(binding.watched_tables());
        scanner
            .scan_reader(dump.as_bytes(), &mut store, None)
            .unwrap();
        let stats = scanner.finish();
        let result = reconstruct(&store, &binding, &Selector::ItemType(1)).unwrap();
        RunReport::new(&stats, &store, &result)
    }

    const ITEMS: &str =
        "INSERT INTO `omeka_items` VALUES (42,1,NULL,0,1,'2013-05-02','2013-04-30',1);\n";

    #[test]
    fn clean_run_has_no_diagnostics() {
        let report = run(&format!(
            "{ITEMS}INSERT INTO `omeka_tags` VALUES (1,'Oslo');\n"
        ));
        assert!(report.clean);
        assert_eq!(report.letters, 1);
        assert_eq!(report.rows["omeka_tags"], 1);
    }

    #[test]
    fn one_diagnostic_makes_the_run_unclean() {
        let report = run(&format!(
            "{ITEMS}INSERT INTO `omeka_tags` VALUES (1,'Oslo),(2,'x');\nINSERT INTO `omeka_tags` VALUES (3,'Bergen');\n"
        ));
        assert!(!report.clean);
        assert_eq!(report.statements_skipped, 1);
        assert_eq!(report.rows["omeka_tags"], 1);

        let mut text = Vec::new();
        report.write_summary(&mut text).unwrap();
        let text = String::from_utf8(text).unwrap();
        assert!(text.contains("Malformed skipped:    1"));
        assert!(text.contains("Diagnostics:          1"));
        assert!(text.contains("omeka_tags line 2"));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        report.write_json(&path).unwrap();
        let saved: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved["clean"], false);
        assert_eq!(saved["diagnostics"].as_array().unwrap().len(), 1);
        assert_eq!(saved["diagnostics"][0]["line"], 2);
        assert_eq!(saved["rows"]["omeka_items"], 1);
    }

    #[test]
    fn unresolved_references_make_the_run_unclean() {
        let report = run(&format!(
            "{ITEMS}INSERT INTO `omeka_taggings` VALUES (1,42,9,1,'Item','t');\n"
        ));
        assert!(report.diagnostics.is_empty());
        assert_eq!(report.unresolved.tags, 1);
        assert!(!report.clean);
    }
}
