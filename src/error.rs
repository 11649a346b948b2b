use thiserror::Error;

/// Domain errors surfaced to the interactive loop. Everything here is
/// recoverable: the loop prints the message and keeps reading input.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("No active query. Type keywords (or d <keywords>) to search")]
    NoActiveQuery,
    #[error("Already at the first page")]
    AtFirstPage,
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("Index out of bound: {0}")]
    OutOfBounds(usize),
    #[error("Failed to open URL: {0}")]
    Open(String),
    #[error("Clipboard copy failed: {0}")]
    Clipboard(String),
}
