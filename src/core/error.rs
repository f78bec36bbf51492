// Error kinds, context-carrying error type, and errno/exit-code mappings.
use std::error::Error as StdError;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Internal,
    Usage,
    InvalidArgument,
    Full,
    AllocationFailure,
    NotSupported,
    NotConnected,
    Io,
    Protocol,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    hint: Option<String>,
    path: Option<PathBuf>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            hint: None,
            path: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(path) = &self.path {
            write!(f, " (path: {})", path.display())?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::Usage => 2,
        ErrorKind::InvalidArgument => 3,
        ErrorKind::Full => 4,
        ErrorKind::AllocationFailure => 5,
        ErrorKind::NotSupported => 6,
        ErrorKind::NotConnected => 7,
        ErrorKind::Io => 8,
        ErrorKind::Protocol => 9,
    }
}

/// Errno reported on the wire for a failed endpoint call.
pub fn to_errno(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Usage | ErrorKind::InvalidArgument => libc::EINVAL,
        ErrorKind::Full => libc::ERANGE,
        ErrorKind::AllocationFailure => libc::ENOMEM,
        ErrorKind::NotSupported => libc::ENOTTY,
        ErrorKind::NotConnected => libc::ENODEV,
        ErrorKind::Protocol => libc::EPROTO,
        ErrorKind::Internal | ErrorKind::Io => libc::EIO,
    }
}

pub fn from_errno(errno: i32) -> ErrorKind {
    match errno {
        libc::EINVAL => ErrorKind::InvalidArgument,
        libc::ERANGE => ErrorKind::Full,
        libc::ENOMEM => ErrorKind::AllocationFailure,
        libc::ENOTTY => ErrorKind::NotSupported,
        libc::ENODEV | libc::ENXIO => ErrorKind::NotConnected,
        libc::EPROTO => ErrorKind::Protocol,
        libc::EIO => ErrorKind::Io,
        _ => ErrorKind::Internal,
    }
}
