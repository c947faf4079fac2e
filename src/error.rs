//! Error types for the protocol core.
//!
//! All fallible operations in this crate return [`Result<T>`], an alias for
//! `std::result::Result<T, Error>`.
//!
//! The set is closed and mirrors the two failure families of the protocol:
//! errors attributable to the caller (bad type name, out-of-range value,
//! unsupported native type) leave the session usable, while protocol-level
//! errors (unexpected opcode, checksum mismatch, I/O failure) break it.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur in the protocol core.
#[derive(Error, Debug)]
pub enum Error {
    /// An I/O error on the underlying TCP stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A read or write did not complete before the configured deadline.
    #[error("operation timed out after {deadline:?}")]
    Timeout {
        /// The deadline that fired.
        deadline: Duration,
    },

    /// Failed to establish a connection to the server.
    #[error("connection error: {0}")]
    Connection(String),

    /// The server sent an opcode or field inconsistent with the negotiated
    /// protocol revision. Fatal: the session is broken.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A textual type expression did not parse.
    #[error("malformed type name: {0}")]
    MalformedTypeName(String),

    /// The type exists on the wire but the codec registry has no mapping
    /// for it.
    #[error("type not supported: {0}")]
    TypeNotSupported(String),

    /// A parametric type is missing required arguments (e.g. an Enum with no
    /// members, a FixedString without a length).
    #[error("type not fully specified: {0}")]
    TypeNotFullySpecified(String),

    /// A value is outside the representable range of the target column.
    #[error("overflow: {0}")]
    Overflow(String),

    /// An invariant was broken inside the driver. Fatal.
    #[error("internal error: {0}")]
    Internal(String),

    /// LZ4/ZSTD encode or decode failure, or a malformed frame header.
    #[error("compression error: {0}")]
    Compression(String),

    /// The CityHash-128 checksum of a compression frame did not verify.
    /// Fatal: the stream can no longer be trusted.
    #[error("checksum mismatch: expected {expected:032x}, got {actual:032x}")]
    ChecksumMismatch {
        /// Checksum declared in the frame header.
        expected: u128,
        /// Checksum computed over the received frame.
        actual: u128,
    },

    /// An exception message sent by the server. The numeric code round-trips
    /// from the wire; the session returns to `Ready` after EndOfStream.
    #[error("server error {code} ({name}): {message}")]
    Server {
        /// ClickHouse error code.
        code: i32,
        /// Exception class name, e.g. `DB::Exception`.
        name: String,
        /// Human-readable message.
        message: String,
        /// Nested cause, if the server sent one.
        nested: Option<Box<Error>>,
    },

    /// A protocol feature the core deliberately does not implement
    /// (e.g. `SecondaryQuery`, distributed read tasks).
    #[error("not supported: {0}")]
    NotSupported(String),

    /// A column was asked to accept or yield an incompatible native type.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// The type that was expected.
        expected: String,
        /// The type that was provided.
        actual: String,
    },
}

impl Error {
    /// Whether this error must break the session (protocol errors are fatal,
    /// caller-attributable errors are not).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Io(_)
                | Error::Timeout { .. }
                | Error::Connection(_)
                | Error::Protocol(_)
                | Error::Internal(_)
                | Error::Compression(_)
                | Error::ChecksumMismatch { .. }
        )
    }
}

/// A type alias for `std::result::Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
