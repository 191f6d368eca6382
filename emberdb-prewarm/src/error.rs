use emberdb_catalog::error::Error as CatalogError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("schema not found")]
    SchemaNotFound,
    #[error("table not found")]
    TableNotFound,
    #[error("table '{0}' is not a native table")]
    TableNotNative(String),
    #[error("{0} not supported")]
    NotSupported(&'static str),
    #[error("insufficient memory({0})")]
    InsufficientMemory(usize),
    #[error("IO Error")]
    IOError,
    #[error("glob error")]
    GlobError,
    #[error("invalid state")]
    InvalidState,
}

impl From<std::io::Error> for Error {
    #[inline]
    fn from(_src: std::io::Error) -> Self {
        Error::IOError
    }
}

impl From<glob::GlobError> for Error {
    #[inline]
    fn from(_src: glob::GlobError) -> Self {
        Error::GlobError
    }
}

impl From<glob::PatternError> for Error {
    #[inline]
    fn from(src: glob::PatternError) -> Self {
        Error::InvalidInput(format!("invalid glob pattern: {src}"))
    }
}

impl From<CatalogError> for Error {
    #[inline]
    fn from(src: CatalogError) -> Self {
        match src {
            CatalogError::SchemaNotFound
            | CatalogError::SchemaNotDeleted
            | CatalogError::SchemaAlreadyExists => Error::SchemaNotFound,
            CatalogError::TableNotFound
            | CatalogError::TableNotDeleted
            | CatalogError::TableAlreadyExists => Error::TableNotFound,
        }
    }
}
