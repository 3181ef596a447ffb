use std::path::PathBuf;

/// Errors from persistent containers and their views.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to load {path:?}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: Box<PersistError>,
    },
    #[error("malformed document: {0}")]
    Document(String),
    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },
    #[error("range {start}..{end} out of bounds for length {len}")]
    RangeOutOfBounds { start: usize, end: usize, len: usize },
    #[error("cursor has no current element")]
    NoCurrentElement,
    #[error("could not start background writer: {0}")]
    Writer(#[source] std::io::Error),
}
