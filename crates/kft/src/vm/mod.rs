//! The kft interpreter.
//!
//! The main loop [run] pulls tokens from the lexer and copies literal text to the output.
//! A start delimiter begins a directive.
//! The byte right after the delimiter, the sigil, selects what the directive does:
//!
//! | directive | effect |
//! | --- | --- |
//! | `{{$NAME}}` | write the value of a variable
//! | `{{$NAME=VALUE}}` | assign a variable; one assignment or read per line
//! | `{{!...}}` | run the body as a shell script and write what the shell prints
//! | `{{#cmd args...}}` | run a command; lines after the first are piped to its standard input
//! | `{{#!cmd args...}}` | same, but the body is passed as a trailing `/dev/fd/N` argument
//! | `{{:NAME}}` | set a tag at the position after the directive
//! | `{{@NAME}}` | jump back to a tag, at most as many times as the tag's budget
//! | `{{-...}}` | comment
//! | `{{>path}}` | write the rest of the enclosing scope to a file
//! | `{{<path}}` | expand a file in place
//!
//! Any other byte after the start delimiter is not consumed and the directive is just
//!     a nested scope whose expansion is written to the output.
//!
//! Directive arguments (names, paths, command lines) are themselves expanded by
//!     running the interpreter recursively into a memory sink.
//! The end delimiter closes the innermost scope; at the top level it ends the run.

use crate::error::{self, ErrorKind};
use crate::input::InputStream;
use crate::lexer::{self, Token};
use crate::output::OutputSink;
use crate::variable::Variables;

mod directives;

/// State shared by all directives of one run.
#[derive(Debug, Default)]
pub struct Context {
    pub variables: Variables,
}

impl Context {
    pub fn new(variables: Variables) -> Context {
        Context { variables }
    }
}

/// Flags modifying how [run] treats its input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags(u8);

impl Flags {
    /// Directives are not run and nothing is written; only nesting is tracked.
    pub const COMMENT: Flags = Flags(1);
    /// Stop at the first end of line, returning [Outcome::EndOfLine].
    pub const RETURN_ON_EOL: Flags = Flags(2);
    /// Copy bytes verbatim until the end of the input, without lexing them.
    pub const RAW: Flags = Flags(4);

    pub fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn without(self, other: Flags) -> Flags {
        Flags(self.0 & !other.0)
    }

    /// Flags for a scope nested in the current one.
    ///
    /// Stopping at the end of a line only applies to the scope that asked for it.
    fn nested(self) -> Flags {
        self.without(Flags::RETURN_ON_EOL)
    }
}

impl std::ops::BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

/// How a call to [run] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The end delimiter closing the scope, or the end of the input, was reached.
    Done,
    /// An end of line was reached and [Flags::RETURN_ON_EOL] was set.
    EndOfLine,
}

/// Expand the input into the output until the current scope ends.
pub fn run(
    ctx: &mut Context,
    input: &mut InputStream,
    output: &mut OutputSink,
    flags: Flags,
) -> error::Result<Outcome> {
    if flags.contains(Flags::RAW) {
        relay(input, output)?;
        return Ok(Outcome::Done);
    }
    let comment = flags.contains(Flags::COMMENT);
    loop {
        let start = input.position();
        match lexer::next_token(input) {
            Token::Literal(b) => {
                if !comment {
                    output.write(&[b])?;
                }
            }
            Token::EndOfLine => {
                if flags.contains(Flags::RETURN_ON_EOL) {
                    return Ok(Outcome::EndOfLine);
                }
                if !comment {
                    output.write(b"\n")?;
                }
            }
            Token::End | Token::EndOfStream => return Ok(Outcome::Done),
            Token::Begin => {
                if let Err(err) = directives::dispatch(ctx, input, output, flags.nested()) {
                    return Err(err.at(input.location_at(start)));
                }
            }
        }
    }
}

/// Copy the rest of the input to the output verbatim.
///
/// Used for the output of subprocesses, so delimiters they print are never reinterpreted.
pub(crate) fn relay(input: &mut InputStream, output: &mut OutputSink) -> error::Result<()> {
    while let Some(b) = input.fetch_raw() {
        input.commit(1);
        output.write(&[b])?;
    }
    Ok(())
}

/// Expand a whole input at the top level and flush the output.
///
/// An end delimiter with no matching start delimiter ends the expansion early;
///     the rest of the input is not read.
pub fn run_to_completion(
    ctx: &mut Context,
    input: &mut InputStream,
    output: &mut OutputSink,
) -> error::Result<()> {
    tracing::debug!(input = input.filename(), output = output.filename(), "expanding");
    let result = run(ctx, input, output, Flags::default()).and_then(|_| {
        output
            .flush()
            .map_err(|err| ErrorKind::io("write to", output.filename().to_string(), err).into())
    });
    // Failures outside any directive are reported where the input stopped.
    result.map_err(|err| {
        if err.trace().is_empty() {
            err.at(input.location())
        } else {
            err
        }
    })
}

#[cfg(test)]
mod tests;
