//! CSV-backed tabular source.
//!
//! The whole file is held in memory as a raw string grid; cell writes
//! mutate the grid and `flush` rewrites the file atomically
//! (temp-then-rename), so marks survive an interrupted batch and a re-read
//! of the file observes them immediately.

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::SourceError;
use crate::source::cell::CellValue;
use crate::source::snapshot::{Row, TableSnapshot};
use crate::source::TabularSource;

pub struct CsvSource {
    path: PathBuf,
    /// 1-based position of the header row.
    header_row: u32,
    grid: Mutex<Vec<Vec<String>>>,
}

impl CsvSource {
    /// Open a CSV file and load its raw grid.
    pub fn open(path: impl Into<PathBuf>, header_row: u32) -> Result<Self, SourceError> {
        let path = path.into();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&path)
            .map_err(|e| SourceError::LoadFailed {
                source_id: path.display().to_string(),
                reason: e.to_string(),
            })?;

        let mut grid = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| SourceError::LoadFailed {
                source_id: path.display().to_string(),
                reason: e.to_string(),
            })?;
            grid.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self {
            path,
            header_row,
            grid: Mutex::new(grid),
        })
    }

    fn parse_row(number: u32, raw: &[String]) -> Row {
        Row::new(number, raw.iter().map(|s| CellValue::parse(s)).collect())
    }

    fn write_grid(&self, grid: &[Vec<String>]) -> Result<(), SourceError> {
        let tmp = self.path.with_extension("csv.tmp");
        {
            let mut writer = csv::WriterBuilder::new()
                .flexible(true)
                .from_path(&tmp)
                .map_err(|e| self.write_failed(e.to_string()))?;
            for row in grid {
                writer
                    .write_record(row)
                    .map_err(|e| self.write_failed(e.to_string()))?;
            }
            writer
                .flush()
                .map_err(|e| self.write_failed(e.to_string()))?;
        }
        std::fs::rename(&tmp, &self.path).map_err(|e| self.write_failed(e.to_string()))
    }

    fn write_failed(&self, reason: String) -> SourceError {
        SourceError::WriteFailed {
            source_id: self.identifier(),
            reason,
        }
    }
}

#[async_trait]
impl TabularSource for CsvSource {
    fn identifier(&self) -> String {
        self.path.display().to_string()
    }

    async fn load_snapshot(&self) -> Result<TableSnapshot, SourceError> {
        let grid = self.grid.lock().unwrap();
        let header_index = (self.header_row - 1) as usize;
        if header_index >= grid.len() {
            return Err(SourceError::HeaderRowOutOfRange {
                source_id: self.identifier(),
                header_row: self.header_row,
                row_count: grid.len(),
            });
        }

        let headers = grid[header_index].clone();
        let rows = grid[header_index + 1..]
            .iter()
            .enumerate()
            .map(|(i, raw)| Self::parse_row(self.header_row + 1 + i as u32, raw))
            .collect();

        Ok(TableSnapshot::new(headers, rows))
    }

    async fn read_absolute_row(&self, row_number: u32) -> Result<Row, SourceError> {
        let grid = self.grid.lock().unwrap();
        if row_number == 0 {
            return Err(SourceError::RowNotFound {
                source_id: self.identifier(),
                row: row_number,
            });
        }
        let raw = grid
            .get((row_number - 1) as usize)
            .ok_or_else(|| SourceError::RowNotFound {
                source_id: self.identifier(),
                row: row_number,
            })?;
        Ok(Self::parse_row(row_number, raw))
    }

    async fn write_cell(
        &self,
        row_number: u32,
        column: usize,
        value: CellValue,
    ) -> Result<(), SourceError> {
        let mut grid = self.grid.lock().unwrap();
        let width = grid
            .get((self.header_row - 1) as usize)
            .map(Vec::len)
            .unwrap_or(0);
        if column >= width {
            return Err(SourceError::ColumnOutOfRange {
                row: row_number,
                column,
            });
        }
        let row = grid
            .get_mut((row_number.saturating_sub(1)) as usize)
            .ok_or_else(|| SourceError::RowNotFound {
                source_id: self.path.display().to_string(),
                row: row_number,
            })?;
        // Ragged CSV rows are padded out to the written column.
        if row.len() <= column {
            row.resize(column + 1, String::new());
        }
        row[column] = value.to_display_string();
        Ok(())
    }

    async fn flush(&self) -> Result<(), SourceError> {
        let grid = self.grid.lock().unwrap();
        self.write_grid(&grid)
    }
}
