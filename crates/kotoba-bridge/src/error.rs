//! Bridge error types.

use thiserror::Error;

/// Errors raised by the host bridge.
///
/// Failures of host operations requested *by the guest* never surface as a
/// `BridgeError`; the dispatcher hands them back in-band as an error value
/// plus a success flag. These variants cover the host-side lifecycle and
/// guest faults that have to stop the current guest call.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The module could not be compiled, linked or instantiated.
    #[error("failed to load guest module: {0}")]
    LoadFailure(String),

    /// Command-line arguments and environment do not fit below the guest's
    /// minimum data address.
    #[error("argv and environment need {required} bytes past offset {base}, limit is {limit}")]
    ArgvOverflow {
        /// Offset at which argument encoding starts.
        base: u32,
        /// Bytes the encoding needs.
        required: u32,
        /// Bytes available before the guest's data segment.
        limit: u32,
    },

    /// An OS shim call with no real implementation.
    #[error("operation not supported: {0}")]
    UnsupportedOperation(String),

    /// A host call, invoke or construct threw.
    #[error("host operation {operation} threw: {message}")]
    DispatchFailure {
        /// The bridge operation that failed.
        operation: &'static str,
        /// String form of the thrown value.
        message: String,
    },

    /// The guest has already called `wasmExit`.
    #[error("guest program has already exited with code {0}")]
    AlreadyExited(i32),

    /// `start` was called on a guest that is already running.
    #[error("guest program has already been started")]
    AlreadyStarted,

    /// The guest module lacks a required export.
    #[error("guest module does not export `{0}`")]
    MissingExport(String),

    /// The guest read or wrote outside its linear memory.
    #[error("guest memory access out of bounds: {len} bytes at {addr:#x}")]
    MemoryAccess {
        /// Start address of the access.
        addr: u64,
        /// Length of the access.
        len: u64,
    },

    /// The guest referenced a handle that is not live.
    #[error("guest referenced dead value handle {0}")]
    InvalidHandle(u32),

    /// The guest trapped while running.
    #[error("guest trapped: {0}")]
    Trap(String),
}

impl BridgeError {
    /// The errno-style code the OS shim reports for this error, if any.
    #[must_use]
    pub fn errno_code(&self) -> Option<&'static str> {
        match self {
            Self::UnsupportedOperation(_) => Some("ENOSYS"),
            _ => None,
        }
    }
}

/// A specialized Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

pub(crate) fn trap(err: impl std::fmt::Display) -> BridgeError {
    BridgeError::Trap(err.to_string())
}
