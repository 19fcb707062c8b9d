//! Error handling
//!
//! Every failure in kft is fatal and is reported with its location.
//! The only tolerated "failure" is jumping to a tag whose visit budget is exhausted,
//!     which is defined to be a no-op.
//!
//! An [Error] is an [ErrorKind] plus a trace of source locations.
//! The first location is the directive where the error happened.
//! Each enclosing directive (for example the `{{<path}}` that included the file
//!     the error happened in) appends its own location as the error propagates.

use crate::color::Colorize;
use std::io;

/// The type of an error.
#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    /// Opening, reading or writing a file or stream failed.
    #[error("{path}: could not {action}: {source}")]
    Io {
        action: &'static str,
        path: String,
        #[source]
        source: io::Error,
    },
    /// A goto directive refers to a tag that was never set in the current input.
    #[error("{0}: tag not found")]
    TagNotFound(String),
    /// The visit budget in a `{{:NAME=N}}` directive is not a number.
    #[error("{0:?}: invalid visit budget")]
    InvalidBudget(String),
    /// Seeking the input back to a tag failed.
    ///
    /// This happens when the input is a pipe, or when the seek is requested
    ///     half way through an escape sequence.
    #[error("{tag}: seek failed: {source}")]
    Seek {
        tag: String,
        #[source]
        source: io::Error,
    },
    /// Creating the pipes to a subprocess failed.
    #[error("could not create pipe: {0}")]
    Pipe(#[source] io::Error),
    /// Spawning a subprocess failed.
    #[error("{program}: could not run: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    /// A subprocess exited with a non-zero status.
    #[error("{program}: exited with status {status}")]
    Subprocess { program: String, status: i32 },
    /// The worker thread feeding a subprocess panicked.
    #[error("{program}: the thread writing to the subprocess panicked")]
    Worker { program: String },
    /// A command line could not be split into words; e.g., an unbalanced quote.
    #[error("{0:?}: could not split command line into words")]
    WordSplit(String),
    /// A command line contains no words.
    #[error("empty command line")]
    EmptyCommand,
    /// The delimiter configuration is not valid.
    #[error("invalid delimiter configuration: {0}")]
    InvalidSpec(String),
}

impl ErrorKind {
    pub(crate) fn io<P: Into<String>>(action: &'static str, path: P, source: io::Error) -> Self {
        ErrorKind::Io {
            action,
            path: path.into(),
            source,
        }
    }
}

/// A position in a named input, as printed in diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub filename: String,
    /// Row, starting at 0.
    pub row: usize,
    /// Column in bytes, starting at 0.
    pub col: usize,
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.filename, self.row + 1, self.col + 1)
    }
}

/// A fully traced error.
#[derive(Debug)]
pub struct Error {
    kind: Box<ErrorKind>,
    trace: Vec<Location>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn into_kind(self) -> ErrorKind {
        *self.kind
    }

    /// Locations of the directives the error propagated through, innermost first.
    pub fn trace(&self) -> &[Location] {
        &self.trace
    }

    /// Append the location of an enclosing directive.
    pub(crate) fn at(mut self, location: Location) -> Self {
        self.trace.push(location);
        self
    }

    /// The process exit status that best describes this error.
    ///
    /// A failed subprocess passes its own status through; everything else is 1.
    pub fn exit_code(&self) -> i32 {
        match *self.kind {
            ErrorKind::Subprocess { status, .. } => status,
            _ => 1,
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error {
            kind: Box::new(kind),
            trace: vec![],
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&*self.kind)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut locations = self.trace.iter();
        match locations.next() {
            None => write!(f, "{}: {}", "error".bold().bright_red(), self.kind)?,
            Some(location) => write!(
                f,
                "{}: {}: {}",
                location,
                "error".bold().bright_red(),
                self.kind
            )?,
        }
        for location in locations {
            write!(
                f,
                "\n{}: {}: while running the directive here",
                location,
                "note".bold().bright_cyan()
            )?;
        }
        Ok(())
    }
}
