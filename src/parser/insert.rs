// INSERT scanner: streams dump lines, reassembles multi-line INSERT statements
// for watched tables and hands each VALUES clause to the row tokenizer.
// Parsing stays shallow on purpose: anything that is not an INSERT line is
// ignored without interpretation.

use crate::error::{DumpError, Result};
use crate::parser::values::tokenize_values;
use crate::store::TableStore;
use ahash::AHashMap;
use log::{debug, warn};
use memmap2::Mmap;
use regex::Regex;
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// A statement that was dropped because it could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub table: String,
    /// 1-based line on which the statement started.
    pub line: usize,
    /// Byte offset from the start of the statement, when known.
    pub offset: Option<usize>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanStats {
    pub statements_parsed: usize,
    pub statements_skipped: usize,
    pub statements_ignored: usize,
    pub diagnostics: Vec<Diagnostic>,
}

// Quote/escape discipline used to find the terminating `;`. Mirrors the
// tokenizer: `\` escapes the next character inside quotes, `'` toggles.
#[derive(Debug, Default)]
struct QuoteTracker {
    in_quote: bool,
    escape_next: bool,
}

impl QuoteTracker {
    fn reset(&mut self) {
        self.in_quote = false;
        self.escape_next = false;
    }

    // Byte index of the first `;` outside quotes, if any.
    fn find_terminator(&mut self, text: &str) -> Option<usize> {
        for (i, c) in text.char_indices() {
            if self.escape_next {
                self.escape_next = false;
                continue;
            }
            match c {
                '\\' if self.in_quote => self.escape_next = true,
                '\'' => self.in_quote = !self.in_quote,
                ';' if !self.in_quote => return Some(i),
                _ => {}
            }
        }
        None
    }
}

enum Pending {
    Idle,
    Collecting {
        table: String,
        start_line: usize,
        buffer: String,
    },
    // Inside an INSERT for a table nobody asked for; only quotes are tracked.
    Skipping,
}

pub struct InsertScanner {
    insert_re: Regex,
    values_re: Regex,
    // Lowercased dump table name -> configured name.
    watched: AHashMap<String, String>,
    pending: Pending,
    quotes: QuoteTracker,
    line_no: usize,
    stats: ScanStats,
}

impl InsertScanner {
    // Build regexes once for reuse.
    pub fn new<I, S>(watched: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let insert_re = Regex::new(r"^\s*(?i:INSERT\s+INTO)\s+`?([^`\s(]+)`?")
            .expect("valid insert regex");
        let values_re = Regex::new(r"^\s*(?i:INSERT\s+INTO)\s+`?[^`\s(]+`?\s+(?i:VALUES)\b")
            .expect("valid values regex");
        let watched = watched
            .into_iter()
            .map(|name| {
                let name = name.into();
                (name.to_lowercase(), name)
            })
            .collect();
        Self {
            insert_re,
            values_re,
            watched,
            pending: Pending::Idle,
            quotes: QuoteTracker::default(),
            line_no: 0,
            stats: ScanStats::default(),
        }
    }

    /// Feed one line of the dump, trailing newline included.
    pub fn scan_line(&mut self, line: &str, store: &mut TableStore) {
        self.line_no += 1;
        // A line that starts a new INSERT while a statement is still open
        // means that statement lost its `;`, usually to an unclosed quote.
        if !matches!(self.pending, Pending::Idle) && self.insert_re.is_match(line) {
            self.abandon();
        }
        let mut rest = line;
        while !rest.is_empty() {
            if matches!(self.pending, Pending::Idle) && !self.begin(rest) {
                return;
            }
            let end = self.quotes.find_terminator(rest);
            let (chunk, tail) = match end {
                Some(i) => (&rest[..=i], &rest[i + 1..]),
                None => (rest, ""),
            };
            if let Pending::Collecting { buffer, .. } = &mut self.pending {
                buffer.push_str(chunk);
            }
            if end.is_some() {
                self.complete(store);
            }
            rest = tail;
        }
    }

    /// Close out the scan. A statement still open at end of input is
    /// reported and discarded.
    pub fn finish(mut self) -> ScanStats {
        self.abandon();
        debug!(
            "InsertScanner: {} lines, {} statements parsed, {} skipped, {} ignored",
            self.line_no,
            self.stats.statements_parsed,
            self.stats.statements_skipped,
            self.stats.statements_ignored
        );
        self.stats
    }

    /// Scan a buffered reader line by line.
    pub fn scan_reader<R: BufRead>(
        &mut self,
        mut reader: R,
        store: &mut TableStore,
        bar: Option<&indicatif::ProgressBar>,
    ) -> Result<()> {
        let mut line = String::new();
        while reader.read_line(&mut line)? > 0 {
            if let Some(b) = bar {
                b.inc(line.len() as u64);
            }
            self.scan_line(&line, store);
            line.clear();
        }
        Ok(())
    }

    /// Scan a dump file, through a memory map when `use_mmap` is set.
    pub fn scan_file(
        &mut self,
        path: &Path,
        use_mmap: bool,
        store: &mut TableStore,
        bar: Option<&indicatif::ProgressBar>,
    ) -> Result<()> {
        debug!("InsertScanner: opening {}", path.display());
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        if use_mmap && len > 0 {
            // The map is read-only and lives only for this scan.
            let map = unsafe { Mmap::map(&file)? };
            let text = std::str::from_utf8(&map)?;
            for line in text.split_inclusive('\n') {
                if let Some(b) = bar {
                    b.inc(line.len() as u64);
                }
                self.scan_line(line, store);
            }
        } else {
            self.scan_reader(BufReader::new(file), store, bar)?;
        }
        if let Some(b) = bar {
            b.finish();
        }
        Ok(())
    }

    // Try to start a statement at `text`. Returns false for lines that are
    // not INSERTs at all.
    fn begin(&mut self, text: &str) -> bool {
        let Some(caps) = self.insert_re.captures(text) else {
            return false;
        };
        self.quotes.reset();
        let name = caps[1].to_lowercase();
        self.pending = match self.watched.get(&name) {
            Some(table) => Pending::Collecting {
                table: table.clone(),
                start_line: self.line_no,
                buffer: String::new(),
            },
            None => Pending::Skipping,
        };
        true
    }

    fn complete(&mut self, store: &mut TableStore) {
        let (table, start_line, statement) =
            match std::mem::replace(&mut self.pending, Pending::Idle) {
                Pending::Collecting {
                    table,
                    start_line,
                    buffer,
                } => (table, start_line, buffer),
                Pending::Skipping => {
                    self.stats.statements_ignored += 1;
                    return;
                }
                Pending::Idle => return,
            };

        let Some(prefix) = self.values_re.find(&statement) else {
            self.reject(table, start_line, None, "expected VALUES after table name".into());
            return;
        };
        // The buffer always ends with the terminating `;`.
        let clause = &statement[prefix.end()..statement.len() - 1];
        match tokenize_values(clause) {
            Ok(rows) => {
                debug!(
                    "InsertScanner: {} rows for {} (line {})",
                    rows.len(),
                    table,
                    start_line
                );
                self.stats.statements_parsed += 1;
                store.append(&table, rows);
            }
            Err(DumpError::MalformedRow { offset, reason }) => {
                self.reject(table, start_line, Some(prefix.end() + offset), reason.into());
            }
            Err(other) => {
                self.reject(table, start_line, None, other.to_string());
            }
        }
    }

    // Drop the open statement, if any, and reset quote state.
    fn abandon(&mut self) {
        self.quotes.reset();
        match std::mem::replace(&mut self.pending, Pending::Idle) {
            Pending::Collecting {
                table,
                start_line,
                buffer,
            } => {
                let (offset, reason) = self.locate_break(&buffer);
                self.reject(table, start_line, offset, reason);
            }
            Pending::Skipping => self.stats.statements_ignored += 1,
            Pending::Idle => {}
        }
    }

    // Where a statement that never terminated goes wrong, as a byte offset
    // from the start of the statement.
    fn locate_break(&self, statement: &str) -> (Option<usize>, String) {
        let Some(prefix) = self.values_re.find(statement) else {
            return (None, "expected VALUES after table name".into());
        };
        match tokenize_values(&statement[prefix.end()..]) {
            Err(DumpError::MalformedRow { offset, reason }) => {
                (Some(prefix.end() + offset), reason.into())
            }
            Err(other) => (None, other.to_string()),
            Ok(_) => (
                Some(statement.len()),
                "missing `;` at end of statement".into(),
            ),
        }
    }

    fn reject(&mut self, table: String, line: usize, offset: Option<usize>, reason: String) {
        warn!(
            "skipping INSERT into {} at line {}{}: {}",
            table,
            line,
            offset.map(|o| format!(", offset {o}")).unwrap_or_default(),
            reason
        );
        self.stats.statements_skipped += 1;
        self.stats.diagnostics.push(Diagnostic {
            table,
            line,
            offset,
            reason,
        });
    }
}
