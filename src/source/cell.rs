//! Cell values: the typed contents of one table cell.

use chrono::{DateTime, Utc};

/// A single cell value as loaded from the tabular source.
///
/// Loosely-typed hosts hand back a grab-bag of value kinds; everything the
/// engine consumes goes through this sum type exactly once at load time.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Bool(bool),
    Text(String),
    Number(f64),
    DateTime(DateTime<Utc>),
}

impl CellValue {
    /// Coerce to boolean.
    ///
    /// Literal `true`, or text normalizing to `"true"`, `"yes"` or `"1"`,
    /// is true; everything else (including `Empty` and numbers) is false.
    pub fn as_bool(&self) -> bool {
        match self {
            CellValue::Bool(b) => *b,
            CellValue::Text(s) => {
                matches!(s.trim().to_lowercase().as_str(), "true" | "yes" | "1")
            }
            _ => false,
        }
    }

    /// Stringify for display and template substitution. `Empty` becomes `""`.
    pub fn to_display_string(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) => {
                // Whole numbers print without a trailing ".0".
                if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            CellValue::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    /// True when the cell holds nothing, or text that trims to nothing.
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Parse raw text (e.g. a CSV field) into the best-fitting value kind.
    pub fn parse(raw: &str) -> CellValue {
        if raw.is_empty() {
            return CellValue::Empty;
        }
        match raw.to_ascii_lowercase().as_str() {
            "true" => return CellValue::Bool(true),
            "false" => return CellValue::Bool(false),
            _ => {}
        }
        if let Ok(n) = raw.parse::<f64>() {
            return CellValue::Number(n);
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return CellValue::DateTime(dt.with_timezone(&Utc));
        }
        CellValue::Text(raw.to_string())
    }
}
