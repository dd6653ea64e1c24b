use std::{fmt, io};

/// Errors produced while encoding or decoding messages, or when validating names passed to the
/// resolver.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[non_exhaustive]
pub enum Error {
    /// The message ended in the middle of a field.
    Eof,
    /// A compression pointer did not point strictly backwards.
    PointerLoop,
    /// A field holds a reserved or nonsensical value.
    InvalidValue,
    /// The output buffer was too small. Only returned by [`MessageEncoder::finish`].
    ///
    /// [`MessageEncoder::finish`]: super::encoder::MessageEncoder::finish
    Truncated,
    /// A name contained an empty label, as in `a..b`.
    InvalidEmptyLabel,
    /// A label was longer than 63 bytes.
    LabelTooLong,
    /// A name does not fit into a cache entry (see [`MAX_NAME_LEN`]).
    ///
    /// [`MAX_NAME_LEN`]: crate::cache::MAX_NAME_LEN
    NameTooLong,
    /// A response carried a transaction ID that does not belong to an outstanding query.
    UnknownId,
}

impl Error {
    fn kind(&self) -> io::ErrorKind {
        match self {
            Error::Eof => io::ErrorKind::UnexpectedEof,
            Error::PointerLoop | Error::InvalidValue | Error::UnknownId => {
                io::ErrorKind::InvalidData
            }
            Error::InvalidEmptyLabel | Error::LabelTooLong | Error::NameTooLong => {
                io::ErrorKind::InvalidInput
            }
            Error::Truncated => io::ErrorKind::OutOfMemory,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Error::Eof => "unexpected end of message",
            Error::PointerLoop => "name compression pointer does not point backwards",
            Error::InvalidValue => "invalid value",
            Error::Truncated => "message does not fit the buffer",
            Error::InvalidEmptyLabel => "empty label in name",
            Error::LabelTooLong => "label longer than 63 bytes",
            Error::NameTooLong => "name too long for the cache",
            Error::UnknownId => "unknown transaction id",
        })
    }
}

impl std::error::Error for Error {}

impl From<Error> for io::Error {
    fn from(e: Error) -> io::Error {
        io::Error::new(e.kind(), e)
    }
}
