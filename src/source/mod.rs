//! Campaign table access: snapshot model, header resolution, adapters.

pub mod cell;
pub mod csv;
pub mod headers;
pub mod snapshot;

pub use cell::CellValue;
pub use csv::CsvSource;
pub use snapshot::{DuplicateHeader, Row, TableSnapshot};

use async_trait::async_trait;

use crate::error::SourceError;

/// Backend-agnostic campaign table.
///
/// Implementations load the header row and everything beneath it into a
/// [`TableSnapshot`] in at most two bulk reads, serve out-of-band reads by
/// absolute row number, and persist row-state writes so that a flush makes
/// them visible to any subsequent read of the same source.
#[async_trait]
pub trait TabularSource: Send + Sync {
    /// Identifier shown to the operator (file path, sheet name).
    fn identifier(&self) -> String;

    /// Load the header row and all rows beneath it.
    async fn load_snapshot(&self) -> Result<TableSnapshot, SourceError>;

    /// Read one row by absolute 1-based position, regardless of whether it
    /// lies inside the snapshot's row range.
    async fn read_absolute_row(&self, row_number: u32) -> Result<Row, SourceError>;

    /// Write a single cell by absolute 1-based row and zero-based column.
    async fn write_cell(
        &self,
        row_number: u32,
        column: usize,
        value: CellValue,
    ) -> Result<(), SourceError>;

    /// Force pending writes out so an operator watching the source sees
    /// live progress, and an interrupted batch leaves marks durable.
    async fn flush(&self) -> Result<(), SourceError>;
}
