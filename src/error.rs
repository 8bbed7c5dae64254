use thiserror::Error;

/// Errors raised while decoding a MATLAB level-5 file.
#[derive(Debug, Error)]
pub enum MatError {
    #[error("file is too short for a MAT header ({len} bytes)")]
    MissingHeader { len: usize },
    #[error("unsupported endian indicator {0:?}, only little-endian files are read")]
    UnsupportedEndian([u8; 2]),
    #[error("data element at offset {offset} is truncated")]
    Truncated { offset: usize },
    #[error("unexpected data type {found} at offset {offset}, expected {expected}")]
    UnexpectedType {
        offset: usize,
        expected: &'static str,
        found: u32,
    },
    #[error("unsupported numeric storage type {0}")]
    UnsupportedStorage(u32),
    #[error("array '{name}' holds {found} values but its dimensions require {expected}")]
    LengthMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("failed to inflate a compressed element: {0}")]
    Inflate(#[source] std::io::Error),
}

/// The dataset could not be fetched, read or decoded.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("io error on {path:?}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Format(#[from] MatError),
    #[error("variable '{0}' is missing from the MAT file")]
    MissingVariable(&'static str),
    #[error("label {label} at index {index} is outside 0..=9")]
    InvalidLabel { index: usize, label: f64 },
    #[error("unexpected shape for '{name}': {dims:?}")]
    ShapeMismatch { name: &'static str, dims: Vec<usize> },
}

impl DataError {
    pub(crate) fn io(path: impl Into<std::path::PathBuf>, source: std::io::Error) -> Self {
        DataError::Io {
            path: path.into(),
            source,
        }
    }
}
