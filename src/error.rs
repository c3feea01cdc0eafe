use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FilterError>;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("no filter named {0:?}")]
    NotFound(String),
    #[error("filter {0:?} already exists")]
    AlreadyExists(String),
    #[error("filter {0:?} is awaiting reclamation")]
    PendingDelete(String),
    #[error("filter {0:?} is not proxied")]
    NotProxied(String),
    #[error("invalid filter name {0:?}")]
    InvalidName(String),
    #[error("corruption detected: {0}")]
    Corruption(&'static str),
    #[error("internal error: {0}")]
    Internal(String),
}
