//! The delimiter specification.
//!
//! A [DelimiterSpec] fixes the escape byte and the start and end delimiters
//!     for one whole interpreter invocation tree.
//! Redirecting input or output never changes it: included files and the
//!     bodies piped to subprocesses are lexed with the same spec.

use crate::error::{Error, ErrorKind};

/// Default escape byte.
pub const DEFAULT_ESCAPE: u8 = b'\\';

/// Default start delimiter.
pub const DEFAULT_START: &str = "{{";

/// Default end delimiter.
pub const DEFAULT_END: &str = "}}";

/// Escape byte and delimiters used by the lexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelimiterSpec {
    escape: u8,
    start: Vec<u8>,
    end: Vec<u8>,
}

impl DelimiterSpec {
    /// Create a new spec, validating it.
    ///
    /// Both delimiters must be non-empty.
    /// Neither may begin with the escape byte or with a newline;
    ///     the lexer would never be able to recognize such a delimiter.
    pub fn new<S: Into<Vec<u8>>, E: Into<Vec<u8>>>(
        escape: u8,
        start: S,
        end: E,
    ) -> Result<DelimiterSpec, Error> {
        let start = start.into();
        let end = end.into();
        if escape == b'\n' {
            return Err(invalid("the escape character cannot be a newline"));
        }
        for (name, delim) in [("start", &start), ("end", &end)] {
            match delim.first() {
                None => return Err(invalid(format!("the {name} delimiter is empty"))),
                Some(&b) if b == escape => {
                    return Err(invalid(format!(
                        "the {name} delimiter begins with the escape character"
                    )))
                }
                Some(b'\n') => {
                    return Err(invalid(format!(
                        "the {name} delimiter begins with a newline"
                    )))
                }
                Some(_) => {}
            }
        }
        Ok(DelimiterSpec { escape, start, end })
    }

    pub fn escape(&self) -> u8 {
        self.escape
    }

    pub fn start(&self) -> &[u8] {
        &self.start
    }

    pub fn end(&self) -> &[u8] {
        &self.end
    }
}

impl Default for DelimiterSpec {
    fn default() -> Self {
        DelimiterSpec {
            escape: DEFAULT_ESCAPE,
            start: DEFAULT_START.into(),
            end: DEFAULT_END.into(),
        }
    }
}

fn invalid<T: Into<String>>(reason: T) -> Error {
    ErrorKind::InvalidSpec(reason.into()).into()
}
