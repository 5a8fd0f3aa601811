//! Error types for flexsearch

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Index already exists: {0}")]
    IndexAlreadyExists(String),

    #[error("Index not found: {0}")]
    IndexNotFound(String),

    #[error("Index is offline: {0}")]
    IndexIsOffline(String),

    #[error("Index is opening: {0}")]
    IndexIsOpening(String),

    #[error("Index registration missing: {0}")]
    IndexRegistrationMissing(String),

    #[error("Failed to open index writer: {0}")]
    OpeningIndexWriter(String),

    #[error("Index is closed")]
    IndexClosed,

    #[error("Version mismatch for document: {0}")]
    VersionMismatch(String),

    #[error("Document id is missing or empty")]
    MissingId,

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Field is store-only and cannot be searched: {0}")]
    StoreOnlyField(String),

    #[error("Unknown query operator: {0}")]
    UnknownQueryOperator(String),

    #[error("Invalid condition: {0}")]
    InvalidCondition(String),

    #[error("Unknown search profile: {0}")]
    UnknownSearchProfile(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Command queue is closed")]
    QueueClosed,

    #[error("Search error: {0}")]
    Search(#[from] tantivy::TantivyError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
