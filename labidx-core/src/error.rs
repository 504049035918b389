use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the catalog pipeline.
///
/// Recoverable conditions (missing checksum manifests, malformed manifest
/// lines, missing or empty catalog files) never appear here; they degrade to
/// empty values or `Ok(None)` and are logged instead.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A family root or one of its subdirectories could not be read.
    #[error("scan failed under {path:?}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file vanished or became unreadable between enumeration and stat.
    #[error("asset file {path:?} unavailable: {source}")]
    Asset {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An existing catalog file does not contain valid JSON.
    #[error("invalid catalog JSON in {path:?}: {source}")]
    CatalogParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A catalog entry has no string `name`.
    #[error("catalog entry #{index} in `{sequence}` has no string `name`")]
    InvalidEntry { sequence: String, index: usize },

    /// Neither an entry array, an object with family keys, nor an object
    /// with an `images` array.
    #[error("catalog must be an entry array, an object with family keys, or an object with an `images` array")]
    UnsupportedShape,

    /// Two family catalogs disagree on their `url_properties`.
    #[error("url_properties of family {family} differ from those of {first}")]
    UrlPropertiesMismatch { first: String, family: String },

    #[error("mirror output {0:?} would overwrite its input")]
    OutputWouldOverwriteInput(PathBuf),

    #[error("unknown family {0:?}")]
    UnknownFamily(String),

    #[error("configuration error in {path:?}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("i/o error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("catalog serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl CatalogError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CatalogError::Io { path: path.into(), source }
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
