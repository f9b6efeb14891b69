//! Error types for tracepoint metadata acquisition.
//!
//! Every fallible operation in this crate reports one of the [`TracepointError`]
//! variants. Hosts that still speak errno can use [`TracepointError::errno`].

use std::fmt;
use std::io;
use std::path::PathBuf;

use nix::errno::Errno;

/// Reasons a tracepoint format could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The format text is not valid UTF-8.
    InvalidUtf8,
    /// The record is larger than the span encoding allows.
    TooLong { len: usize },
    /// No `name:` line was found.
    MissingName,
    /// No `ID:` line was found.
    MissingId,
    /// The `ID:` value is not a 32-bit unsigned integer.
    InvalidId { value: String },
    /// No `format:` line was found.
    MissingFormat,
    /// A `field:` line could not be parsed.
    InvalidField { line: usize, reason: &'static str },
    /// No `common_type` field was found among the common fields.
    MissingCommonType,
    /// The `common_type` field has a size other than 1, 2 or 4.
    InvalidCommonTypeSize { size: u16 },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::InvalidUtf8 => write!(f, "format text is not valid UTF-8"),
            ParseError::TooLong { len } => write!(f, "format record too long ({len} bytes)"),
            ParseError::MissingName => write!(f, "missing 'name:' line"),
            ParseError::MissingId => write!(f, "missing 'ID:' line"),
            ParseError::InvalidId { value } => write!(f, "invalid event ID '{value}'"),
            ParseError::MissingFormat => write!(f, "missing 'format:' line"),
            ParseError::InvalidField { line, reason } => {
                write!(f, "line {line}: invalid field ({reason})")
            }
            ParseError::MissingCommonType => write!(f, "no common_type among the common fields"),
            ParseError::InvalidCommonTypeSize { size } => {
                write!(f, "common_type has unsupported size {size}")
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// Failures reported by the resolver, reader, locator and cache.
#[derive(Debug)]
pub enum TracepointError {
    /// A system or event name was empty or contained `/`, `.` or NUL.
    InvalidArgument { what: &'static str, value: String },
    /// No tracefs or debugfs mount was found.
    Unsupported,
    /// A tracing file could not be opened.
    NotFound { path: PathBuf, source: io::Error },
    /// Reading a tracing file failed part way through.
    Io { path: PathBuf, source: io::Error },
    /// The destination buffer could not grow.
    OutOfMemory,
    /// The composed format file path exceeded the path bound.
    TooLarge { len: usize, max: usize },
    /// An event with the same ID or name is already cached.
    AlreadyExists { id: u32, name: String },
    /// The format text could not be parsed.
    Malformed(ParseError),
}

impl TracepointError {
    /// The errno value the kernel-facing C API would have returned.
    pub fn errno(&self) -> Errno {
        match self {
            TracepointError::InvalidArgument { .. } => Errno::EINVAL,
            TracepointError::Unsupported => Errno::ENOTSUP,
            TracepointError::NotFound { .. } => Errno::ENOENT,
            TracepointError::Io { .. } => Errno::EIO,
            TracepointError::OutOfMemory => Errno::ENOMEM,
            TracepointError::TooLarge { .. } => Errno::E2BIG,
            TracepointError::AlreadyExists { .. } => Errno::EEXIST,
            TracepointError::Malformed(_) => Errno::EBADMSG,
        }
    }

    /// Already-exists is an expected outcome rather than a real failure.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, TracepointError::AlreadyExists { .. })
    }
}

impl fmt::Display for TracepointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TracepointError::InvalidArgument { what, value } => {
                write!(f, "invalid {what} name '{}'", value.escape_debug())
            }
            TracepointError::Unsupported => {
                write!(f, "tracing directory not found (no tracefs or debugfs mount)")
            }
            TracepointError::NotFound { path, source } => {
                write!(f, "unable to open {}: {source}", path.display())
            }
            TracepointError::Io { path, source } => {
                write!(f, "error reading {}: {source}", path.display())
            }
            TracepointError::OutOfMemory => write!(f, "out of memory growing read buffer"),
            TracepointError::TooLarge { len, max } => {
                write!(f, "format file path too long ({len} bytes, max {max})")
            }
            TracepointError::AlreadyExists { id, name } => {
                write!(f, "event {name} (id {id}) already cached")
            }
            TracepointError::Malformed(err) => write!(f, "malformed format: {err}"),
        }
    }
}

impl std::error::Error for TracepointError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TracepointError::NotFound { source, .. } | TracepointError::Io { source, .. } => {
                Some(source)
            }
            TracepointError::Malformed(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ParseError> for TracepointError {
    fn from(err: ParseError) -> Self {
        TracepointError::Malformed(err)
    }
}

pub type Result<T, E = TracepointError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(TracepointError::Unsupported.errno(), Errno::ENOTSUP);
        assert_eq!(TracepointError::OutOfMemory.errno(), Errno::ENOMEM);
        assert_eq!(
            TracepointError::TooLarge { len: 600, max: 511 }.errno(),
            Errno::E2BIG
        );
        assert_eq!(
            TracepointError::from(ParseError::MissingId).errno(),
            Errno::EBADMSG
        );
    }

    #[test]
    fn test_already_exists_is_benign() {
        let err = TracepointError::AlreadyExists {
            id: 5,
            name: "sched:sched_switch".to_string(),
        };
        assert!(err.is_already_exists());
        assert!(!TracepointError::Unsupported.is_already_exists());
        assert_eq!(err.to_string(), "event sched:sched_switch (id 5) already cached");
    }

    #[test]
    fn test_source_chain() {
        use std::error::Error;

        let err = TracepointError::NotFound {
            path: PathBuf::from("/nonexistent"),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert!(err.source().is_some());
        assert!(err.to_string().starts_with("unable to open /nonexistent"));
    }
}
