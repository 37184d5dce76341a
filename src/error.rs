//! `fbwire` error types.
use std::{backtrace::Backtrace, fmt, io, str::Utf8Error};

use crate::{config::ParseError, gds};

pub use crate::wire::ProtocolError;

/// A specialized [`Result`] type for `fbwire` operation.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// All possible error from `fbwire` library.
pub struct Error {
    context: String,
    backtrace: Backtrace,
    kind: ErrorKind,
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    /// The primary ISC error code, when the server reported one.
    pub fn gds_code(&self) -> Option<i32> {
        match &self.kind {
            ErrorKind::Gds(e) => Some(e.code()),
            _ => None,
        }
    }

    pub(crate) fn is_io(&self) -> bool {
        matches!(self.kind, ErrorKind::Io(_))
    }
}

/// All possible error kind from `fbwire` library.
pub enum ErrorKind {
    Config(ParseError),
    Protocol(ProtocolError),
    Io(io::Error),
    Gds(GdsError),
    State(StateError),
    Utf8(Utf8Error),
}

macro_rules! from {
    (<$ty:ty>$pat:pat => $body:expr) => {
        impl From<$ty> for Error {
            fn from($pat: $ty) -> Self {
                let backtrace = std::backtrace::Backtrace::capture();
                Self { context: String::new(), backtrace, kind: $body }
            }
        }
    };
}

from!(<ErrorKind>e => e);
from!(<ParseError>e => ErrorKind::Config(e));
from!(<ProtocolError>e => ErrorKind::Protocol(e));
from!(<io::Error>e => ErrorKind::Io(e));
from!(<GdsError>e => ErrorKind::Gds(e));
from!(<StateError>e => ErrorKind::State(e));
from!(<Utf8Error>e => ErrorKind::Utf8(e));

impl std::error::Error for Error { }

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.context.is_empty() {
            write!(f, "{}: ", self.context)?;
        }

        fmt::Display::fmt(&self.kind, f)?;

        if let std::backtrace::BacktraceStatus::Captured = self.backtrace.status() {
            let mut backtrace = self.backtrace.to_string();
            write!(f, "\n\n")?;
            writeln!(f, "Stack backtrace:")?;
            backtrace.truncate(backtrace.trim_end().len());
            write!(f, "{}", backtrace)?;
        }

        Ok(())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

impl std::error::Error for ErrorKind { }

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => e.fmt(f),
            Self::Protocol(e) => e.fmt(f),
            Self::Io(e) => e.fmt(f),
            Self::Gds(e) => e.fmt(f),
            Self::State(e) => e.fmt(f),
            Self::Utf8(e) => e.fmt(f),
        }
    }
}

impl fmt::Debug for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

/// Error reported by the server through a status vector, or raised
/// locally with an ISC code.
///
/// A vector may chain multiple errors. The rendered message joins them
/// with newlines and [`code`][GdsError::code] reports the first one.
pub struct GdsError {
    entries: Vec<Entry>,
    warning: bool,
}

struct Entry {
    code: i32,
    args: Vec<String>,
    interpreted: Option<String>,
}

impl GdsError {
    pub(crate) fn new() -> Self {
        Self { entries: Vec::new(), warning: false }
    }

    /// Raise a local error with an ISC code and message arguments.
    pub(crate) fn raise(code: i32, args: &[&str]) -> Self {
        let mut e = Self::new();
        e.push_code(code);
        for arg in args {
            e.push_arg((*arg).to_owned());
        }
        e
    }

    pub(crate) fn push_code(&mut self, code: i32) {
        self.entries.push(Entry { code, args: Vec::new(), interpreted: None });
    }

    pub(crate) fn push_arg(&mut self, arg: String) {
        if let Some(last) = self.entries.last_mut() {
            last.args.push(arg);
        }
    }

    pub(crate) fn push_interpreted(&mut self, message: String) {
        if let Some(last) = self.entries.last_mut() {
            last.interpreted = Some(message);
        }
    }

    pub(crate) fn set_warning(&mut self) {
        self.warning = true;
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The first reported ISC error code.
    pub fn code(&self) -> i32 {
        self.entries.first().map(|e| e.code).unwrap_or(0)
    }

    /// Whether the vector carried only warnings.
    pub fn is_warning(&self) -> bool {
        self.warning
    }

    /// The rendered message, chained errors joined by newline.
    pub fn message(&self) -> String {
        let mut message = String::new();
        for entry in &self.entries {
            if !message.is_empty() {
                message.push('\n');
            }
            match &entry.interpreted {
                Some(text) => message.push_str(text),
                None => message.push_str(&gds::msgs::format(entry.code, &entry.args)),
            }
        }
        message
    }
}

impl std::error::Error for GdsError { }

impl fmt::Display for GdsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (gds code {})", self.message(), self.code())
    }
}

impl fmt::Debug for GdsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

/// A caller-side lifecycle violation, detected without touching the wire.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("transaction {handle} is {state}")]
    Transaction { handle: i32, state: &'static str },
    #[error("statement is {state}, operation requires {required}")]
    Statement { state: &'static str, required: &'static str },
    #[error("blob is not open")]
    BlobNotOpen,
    #[error("event listener already stopped")]
    EventsStopped,
}
