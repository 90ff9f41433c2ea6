use std::io;
use std::path::PathBuf;

use bitlink_symbol::SymbolError;
use thiserror::Error;

/// Malformed or unreadable bitcode container.
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("bitcode record truncated at offset {offset}")]
    Truncated { offset: usize },

    #[error("unknown IR kind {byte} at offset {offset}")]
    InvalidKind { byte: u8, offset: usize },

    #[error("symbol name at offset {offset} is not valid UTF-8")]
    InvalidName { offset: usize },

    #[error("name `{name}` is longer than 255 bytes")]
    NameTooLong { name: String },

    #[error("payload of module `{module}` exceeds 4 GiB")]
    PayloadTooLarge { module: String },
}

/// Failure to open a library at all.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("`{}` does not name a library file", path.display())]
    InvalidPath { path: PathBuf },

    #[error("failed to load native library {}: {message}", path.display())]
    Native { path: PathBuf, message: String },
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Open(#[from] OpenError),

    #[error(transparent)]
    Symbol(#[from] SymbolError),
}
