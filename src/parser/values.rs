// Row tokenizer: decodes the VALUES clause of one INSERT statement into rows.
// Character-level state machine; quotes, escapes and paren depth are tracked
// together so commas and parens inside literals never split anything.

use crate::error::{DumpError, Result};
use crate::parser::{RawField, RawRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    // Between rows: only whitespace and `,` are allowed.
    Outside,
    // Inside `( ... )`, not inside a quote.
    InRow,
    InQuoted,
    // Previous character was a backslash inside a quote.
    Escaped,
}

// Accumulates the current field of the current row.
struct FieldBuf {
    text: String,
    quoted: bool,
    touched: bool,
}

impl FieldBuf {
    fn new() -> Self {
        Self {
            text: String::new(),
            quoted: false,
            touched: false,
        }
    }

    fn push(&mut self, c: char) {
        self.text.push(c);
        self.touched = true;
    }

    // Close the field, applying NULL detection and unquoted trimming.
    fn take(&mut self) -> RawField {
        let field = if self.quoted {
            RawField::Text(std::mem::take(&mut self.text))
        } else {
            let trimmed = self.text.trim();
            if trimmed.eq_ignore_ascii_case("NULL") {
                RawField::Null
            } else {
                RawField::Text(trimmed.to_string())
            }
        };
        self.text.clear();
        self.quoted = false;
        self.touched = false;
        field
    }
}

/// Decode every `( ... )` tuple in a values clause.
///
/// The clause is the text between the `VALUES` keyword and the statement's
/// terminating `;`. On error the offset is a byte offset into `clause` and no
/// rows are returned. An unterminated literal is reported at its opening quote.
pub fn tokenize_values(clause: &str) -> Result<Vec<RawRow>> {
    let mut rows = Vec::new();
    let mut fields: Vec<RawField> = Vec::new();
    let mut field = FieldBuf::new();
    let mut state = State::Outside;
    let mut depth = 0usize;
    // Offset of the quote that opened the current literal.
    let mut quote_start = 0usize;

    let mut chars = clause.char_indices().peekable();
    while let Some((offset, c)) = chars.next() {
        match state {
            State::Outside => match c {
                '(' => {
                    state = State::InRow;
                    depth = 1;
                }
                ',' => {}
                c if c.is_whitespace() => {}
                ')' => return Err(malformed(offset, "closing parenthesis outside a row")),
                _ => return Err(malformed(offset, "unexpected text between rows")),
            },
            State::InRow => match c {
                '\'' => {
                    state = State::InQuoted;
                    quote_start = offset;
                    field.quoted = true;
                    field.touched = true;
                }
                ',' if depth == 1 => fields.push(field.take()),
                '(' => {
                    depth += 1;
                    field.push(c);
                }
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        if field.touched || !fields.is_empty() {
                            fields.push(field.take());
                        }
                        rows.push(RawRow::new(std::mem::take(&mut fields)));
                        state = State::Outside;
                    } else {
                        field.push(c);
                    }
                }
                c if c.is_whitespace() && (field.quoted || field.text.is_empty()) => {}
                _ => field.push(c),
            },
            State::InQuoted => match c {
                '\\' => state = State::Escaped,
                '\'' => {
                    if matches!(chars.peek(), Some((_, '\''))) {
                        chars.next();
                        field.push('\'');
                    } else {
                        state = State::InRow;
                    }
                }
                _ => field.push(c),
            },
            State::Escaped => {
                match decode_escape(c) {
                    Some(decoded) => field.push(decoded),
                    None => {
                        field.push('\\');
                        field.push(c);
                    }
                }
                state = State::InQuoted;
            }
        }
    }

    match state {
        State::Outside => Ok(rows),
        State::InRow => Err(malformed(clause.len(), "unclosed row at end of statement")),
        State::InQuoted | State::Escaped => {
            Err(malformed(quote_start, "unterminated quoted string"))
        }
    }
}

// MySQL dump escape payloads. Anything else is kept as `\<char>`.
fn decode_escape(c: char) -> Option<char> {
    match c {
        '\'' => Some('\''),
        '"' => Some('"'),
        '\\' => Some('\\'),
        'n' => Some('\n'),
        'r' => Some('\r'),
        't' => Some('\t'),
        '0' => Some('\0'),
        'Z' => Some('\u{1a}'),
        _ => None,
    }
}

fn malformed(offset: usize, reason: &'static str) -> DumpError {
    DumpError::MalformedRow { offset, reason }
}
