//! The `errors` module defines the common error types.

use std::error;
use std::fmt;
use std::io;

use super::Result;

/// `Error` provides an enumeration of all possible errors reported by this crate.
#[derive(Debug)]
pub enum Error {
    /// An IO error occurred while reading or writing a container/file.
    IoError(io::Error),
    /// A header was missing, carried a wrong identifier, an unknown version/mode,
    /// or was truncated.
    MalformedHeader(&'static str),
    /// A frame or block record claimed more bytes than remain in the stream.
    TruncatedStream(&'static str),
    /// A GBS mode (or other codec selector) outside the supported set.
    Unsupported(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::IoError(ref err) => err.fmt(f),
            Error::MalformedHeader(ref msg) => write!(f, "malformed header: {}", msg),
            Error::TruncatedStream(ref msg) => write!(f, "truncated stream: {}", msg),
            Error::Unsupported(ref what) => write!(f, "unsupported: {}", what),
        }
    }
}

impl error::Error for Error {
    fn cause(&self) -> Option<&dyn error::Error> {
        match *self {
            Error::IoError(ref err) => Some(err),
            Error::MalformedHeader(_) => None,
            Error::TruncatedStream(_) => None,
            Error::Unsupported(_) => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IoError(err)
    }
}

/// function to create a malformed-header error.
pub fn malformed_header_error<T>(desc: &'static str) -> Result<T> {
    Err(Error::MalformedHeader(desc))
}

/// function to create a truncated-stream error.
pub fn truncated_stream_error<T>(desc: &'static str) -> Result<T> {
    Err(Error::TruncatedStream(desc))
}

/// function to create an unsupported-codec error.
pub fn unsupported_error<T>(what: &'static str) -> Result<T> {
    Err(Error::Unsupported(what))
}
