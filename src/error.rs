use crate::ir::Address;
use miette::Diagnostic;
use thiserror::Error;

/// Result type for CFG operations
pub type Result<T> = std::result::Result<T, Error>;

/// Custom error types for CFG construction
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum Error {
    #[error("cannot create a basic block with invalid start address {addr}")]
    #[diagnostic(code(proc_cfg::invalid_block_address))]
    InvalidBlockAddress { addr: Address },

    #[error("cannot create a basic block from an empty instruction batch")]
    #[diagnostic(code(proc_cfg::empty_block))]
    EmptyBlock,

    #[error("internal error: {message}")]
    #[diagnostic(code(proc_cfg::internal_error))]
    Internal { message: String },
}

impl Error {
    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal {
            message: message.into(),
        }
    }
}
