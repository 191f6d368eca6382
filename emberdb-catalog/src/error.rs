use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("schema not found")]
    SchemaNotFound,
    #[error("schema not deleted")]
    SchemaNotDeleted,
    #[error("schema already exists")]
    SchemaAlreadyExists,
    #[error("table not found")]
    TableNotFound,
    #[error("table not deleted")]
    TableNotDeleted,
    #[error("table already exists")]
    TableAlreadyExists,
}
