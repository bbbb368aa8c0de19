//! Error types for DeepDB.

use std::fmt;
use std::io;

use crate::config::DbKind;

/// The result type used throughout DeepDB.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for DeepDB operations.
#[derive(Debug)]
pub enum Error {
    /// An I/O error occurred.
    Io(io::Error),

    /// The file does not begin with the `DPDB` signature.
    SignatureMismatch {
        /// The bytes actually found at the start of the file.
        found: Vec<u8>,
    },

    /// The database file could not be opened.
    CannotOpen(String),

    /// Data corruption was detected, including a re-index that produced
    /// an over-full sub-bucket.
    Corruption(String),

    /// A map-only operation was invoked on a list handle, or vice versa.
    WrongKind {
        /// The kind the operation requires.
        expected: DbKind,
        /// The kind of the handle it was invoked on.
        found: DbKind,
    },

    /// A negative list index resolved below element zero on a write.
    NonCreatableSubscript(i64),

    /// The operation or value is not supported by the engine.
    Unsupported(String),

    /// `optimize` was called while other handles were still open.
    OptimizeBusy(usize),

    /// The rename step of `optimize` failed; the original file is intact.
    RenameFailed(io::Error),
}

impl Error {
    /// Creates a new corruption error.
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Creates a new cannot-open error.
    pub fn cannot_open(msg: impl Into<String>) -> Self {
        Error::CannotOpen(msg.into())
    }

    /// Creates a new unsupported-operation error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Error::Unsupported(msg.into())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::SignatureMismatch { found } => {
                write!(f, "Signature mismatch: expected \"DPDB\", got {:?}", found)
            }
            Error::CannotOpen(msg) => write!(f, "Cannot open database: {}", msg),
            Error::Corruption(msg) => write!(f, "Data corruption: {}", msg),
            Error::WrongKind { expected, found } => {
                write!(
                    f,
                    "Wrong handle kind: operation requires {:?}, handle is {:?}",
                    expected, found
                )
            }
            Error::NonCreatableSubscript(i) => {
                write!(f, "Cannot create list element at negative index {}", i)
            }
            Error::Unsupported(msg) => write!(f, "Unsupported: {}", msg),
            Error::OptimizeBusy(count) => {
                write!(f, "Cannot optimize: {} handles are still open", count)
            }
            Error::RenameFailed(e) => write!(f, "Optimize rename failed: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) | Error::RenameFailed(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}
