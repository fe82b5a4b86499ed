use std::borrow::Cow;
use std::{error, fmt, io};

/// Type alias for the result of flatten operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Kinds of errors that may occur while flattening a movie file.
///
/// Variants correspond 1:1 to the stable numeric error codes of the format:
/// `NoFreeSpace=1`, `FileTooComplex=2`, `NotMovie=3`, `ReadError=4`,
/// `WriteError=5`, `MemoryError=6`.
#[derive(Debug)]
pub enum ErrorKind {
    /// The in-place path has no usable free space before `moov`.
    NoFreeSpace,
    /// The file is well-formed but uses a feature this implementation
    /// doesn't support (no `mdat`, an unsupported compression id, no
    /// `qt  ` compatible brand).
    FileTooComplex,
    /// Truncation, or a header value that is logically impossible.
    NotMovie,
    /// A system read failed.
    ReadError(io::Error),
    /// A system write failed.
    WriteError(io::Error),
    /// Allocation failed, or an internal invariant was violated.
    MemoryError,
}

impl ErrorKind {
    /// The stable numeric error code for this kind, as used by the CLI exit
    /// status and documented in the format's external interface.
    pub const fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::NoFreeSpace => 1,
            ErrorKind::FileTooComplex => 2,
            ErrorKind::NotMovie => 3,
            ErrorKind::ReadError(_) => 4,
            ErrorKind::WriteError(_) => 5,
            ErrorKind::MemoryError => 6,
        }
    }
}

/// Any error that may occur while flattening a movie file.
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// A human readable string describing the error.
    pub description: Cow<'static, str>,
}

impl Error {
    /// Builds an error from a kind and a human readable description.
    pub fn new(kind: ErrorKind, description: impl Into<Cow<'static, str>>) -> Error {
        Error { kind, description: description.into() }
    }

    /// The stable numeric error code, suitable for a process exit status.
    pub const fn exit_code(&self) -> i32 {
        self.kind.exit_code()
    }
}

impl error::Error for Error {
    fn cause(&self) -> Option<&dyn error::Error> {
        match &self.kind {
            ErrorKind::ReadError(err) | ErrorKind::WriteError(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.description.is_empty() {
            write!(f, "{:?}", self.kind)
        } else {
            write!(f, "{}:\n{:?}", self.description, self.kind)
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.description.is_empty() {
            write!(f, "{:?}", self.kind)
        } else {
            write!(f, "{}:\n{:?}", self.description, self.kind)
        }
    }
}
