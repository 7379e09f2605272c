//! Error types for sheetmail.

/// Top-level error type for the merge engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Compose error: {0}")]
    Compose(#[from] ComposeError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Tabular source errors.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Failed to load table from {source_id}: {reason}")]
    LoadFailed { source_id: String, reason: String },

    #[error("Header row {header_row} is out of range ({row_count} rows in {source_id})")]
    HeaderRowOutOfRange {
        source_id: String,
        header_row: u32,
        row_count: usize,
    },

    #[error("Row {row} does not exist in {source_id}")]
    RowNotFound { source_id: String, row: u32 },

    #[error("Column {column} is out of range for row {row}")]
    ColumnOutOfRange { row: u32, column: usize },

    #[error("Failed to persist row state to {source_id}: {reason}")]
    WriteFailed { source_id: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-row composition errors (addresses, subject, variables).
#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error("Row {row} has no recipient address")]
    MissingRecipient { row: u32 },

    #[error("Required column {name:?} not found")]
    MissingColumn { name: String },
}

/// Template resolution and rendering errors.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Template {id:?} not found")]
    TemplateNotFound { id: String },

    #[error("Template {id:?} is not valid UTF-8 text")]
    NotText { id: String },

    #[error("Substitution failed for key {key:?}: {reason}")]
    SubstitutionFailed { key: String, reason: String },

    #[error("Failed to read back working copy: {reason}")]
    ReadBackFailed { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Email gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Invalid address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build message: {reason}")]
    BuildFailed { reason: String },

    #[error("Send failed: {reason}")]
    SendFailed { reason: String },
}

/// Result type alias for the merge engine.
pub type Result<T> = std::result::Result<T, Error>;
