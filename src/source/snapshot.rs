//! In-memory table snapshot: headers, index, and campaign rows.

use std::collections::HashMap;

use crate::source::cell::CellValue;
use crate::source::headers;

/// One table row: an absolute 1-based row number plus its raw cell values.
///
/// Rows strictly below the header row belong to the campaign block; a row
/// may also be read out of band by absolute number (e.g. a test row above
/// the header) without belonging to any snapshot.
#[derive(Debug, Clone)]
pub struct Row {
    pub number: u32,
    pub cells: Vec<CellValue>,
}

impl Row {
    pub fn new(number: u32, cells: Vec<CellValue>) -> Self {
        Self { number, cells }
    }

    /// Cell at a zero-based column index. Short rows read as `Empty`.
    pub fn cell(&self, index: usize) -> &CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        self.cells.get(index).unwrap_or(&EMPTY)
    }

    /// Stringified cell at `index` (`Empty` → `""`).
    pub fn text(&self, index: usize) -> String {
        self.cell(index).to_display_string()
    }

    /// Boolean coercion of the cell at `index`.
    pub fn is_truthy(&self, index: usize) -> bool {
        self.cell(index).as_bool()
    }
}

/// A duplicate-header finding: the normalized label and the 1-based column
/// positions it occupies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateHeader {
    pub label: String,
    pub columns: Vec<usize>,
}

impl std::fmt::Display for DuplicateHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cols: Vec<String> = self.columns.iter().map(|c| c.to_string()).collect();
        write!(
            f,
            "Duplicate header \"{}\" found in columns: {}",
            self.label,
            cols.join(", ")
        )
    }
}

/// Immutable snapshot of the campaign table.
///
/// Built once per workflow invocation. Stale if the underlying source is
/// edited afterward; callers re-load, never mutate in place.
#[derive(Debug, Clone)]
pub struct TableSnapshot {
    /// Header labels as displayed, in column order.
    headers: Vec<String>,
    /// Normalized header name → zero-based column index, first occurrence wins.
    index: HashMap<String, usize>,
    /// Campaign rows, in table order.
    rows: Vec<Row>,
    /// Column count at load time.
    column_count: usize,
}

impl TableSnapshot {
    pub fn new(headers: Vec<String>, rows: Vec<Row>) -> Self {
        let column_count = headers.len();
        let mut index = HashMap::new();
        for (i, label) in headers.iter().enumerate() {
            let key = headers::normalize(label);
            if key.is_empty() {
                continue;
            }
            index.entry(key).or_insert(i);
        }
        Self {
            headers,
            index,
            rows,
            column_count,
        }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn column_count(&self) -> usize {
        self.column_count
    }

    /// Resolve a header name to its zero-based column index.
    ///
    /// The name is normalized first. If it belongs to a synonym group
    /// (reply-to, no-reply, from-name, from-email), the group's first
    /// spelling present in the table wins; otherwise a direct lookup.
    /// Absence is `None`, not an error.
    pub fn get_index(&self, name: &str) -> Option<usize> {
        let normalized = headers::normalize(name);
        if let Some(spellings) = headers::synonym_group(&normalized) {
            return spellings
                .iter()
                .find_map(|s| self.index.get(*s).copied());
        }
        self.index.get(&normalized).copied()
    }

    /// Group columns by normalized label and report every label that maps
    /// to more than one column, naming the 1-based positions. Empty labels
    /// are not headers and are skipped.
    pub fn validate_no_duplicate_headers(&self) -> Vec<DuplicateHeader> {
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, label) in self.headers.iter().enumerate() {
            let key = headers::normalize(label);
            if key.is_empty() {
                continue;
            }
            let entry = groups.entry(key.clone()).or_default();
            if entry.is_empty() {
                order.push(key);
            }
            entry.push(i + 1);
        }

        order
            .into_iter()
            .filter_map(|label| {
                let columns = groups.remove(&label)?;
                (columns.len() > 1).then_some(DuplicateHeader { label, columns })
            })
            .collect()
    }
}
