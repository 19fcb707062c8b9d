//! The delimiter-aware lexer, which reads bytes from an input stream and outputs logical tokens.
//!
//! The lexer is "just in time": it only produces the next token when that token is requested.
//! This is required because directives can seek the input backwards (`{{@NAME}}`)
//!     and because nested scopes are handed to other threads when piping to subprocesses.
//!
//! Delimiters are matched greedily.
//! When a byte could start a delimiter the lexer reads ahead to see if the full delimiter follows,
//!     and rolls back whatever it read if it does not.
//! The rollback exactly undoes every tentatively-read byte that is not part of the emitted token,
//!     so after each call no bytes are left fetched but uncommitted.
//!
//! Escapes work as follows, for the default escape `\` and delimiters `{{` and `}}`:
//!
//! - `\\` and `\<newline>` output the second byte; the escape is dropped.
//! - `\{{` and `\}}` output the delimiter bytes literally; the escape is dropped.
//! - `\` before anything else is output as is, and so is the byte after it.
//!     If that byte is the beginning of an incomplete delimiter (as in `\{x`)
//!     it is forced to be a literal so it cannot combine with what follows.

use crate::input::InputStream;

/// A logical token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Literal(u8),
    /// The start delimiter.
    Begin,
    /// The end delimiter.
    End,
    /// A newline that was not escaped.
    EndOfLine,
    /// The end of the input, or a read error.
    EndOfStream,
}

/// Read the next token from the stream.
pub fn next_token(input: &mut InputStream) -> Token {
    let spec = input.spec().clone();
    let b = match input.fetch_raw() {
        None => return Token::EndOfStream,
        Some(b) => b,
    };
    let pending = input.escape_pending();
    if pending > 0 {
        input.set_escape_pending(pending - 1);
        input.commit(1);
        return Token::Literal(b);
    }
    if b == spec.escape() {
        return next_escaped(input, spec.escape(), [spec.end(), spec.start()]);
    }
    for (delim, token) in [(spec.end(), Token::End), (spec.start(), Token::Begin)] {
        if b != delim[0] {
            continue;
        }
        match probe(input, &delim[1..]) {
            Probe::Complete => {
                input.commit(delim.len());
                return token;
            }
            Probe::Partial(fetched) => input.rollback(fetched),
        }
    }
    input.commit(1);
    match b {
        b'\n' => Token::EndOfLine,
        _ => Token::Literal(b),
    }
}

fn next_escaped(input: &mut InputStream, escape: u8, delims: [&[u8]; 2]) -> Token {
    let next = match input.fetch_raw() {
        None => {
            input.commit(1);
            return Token::Literal(escape);
        }
        Some(next) => next,
    };
    if next == escape || next == b'\n' {
        input.commit(2);
        return Token::Literal(next);
    }
    let mut prefix_matched = false;
    for delim in delims {
        if next != delim[0] {
            continue;
        }
        match probe(input, &delim[1..]) {
            Probe::Complete => {
                // ESC D0 D1 ... : the escape is dropped, D0 is returned now and
                // the remaining delimiter bytes are returned as literals next.
                input.rollback(delim.len() - 1);
                input.commit(2);
                input.set_escape_pending(delim.len() - 1);
                return Token::Literal(next);
            }
            Probe::Partial(fetched) => {
                input.rollback(fetched);
                prefix_matched = true;
            }
        }
    }
    input.rollback(1);
    input.commit(1);
    if prefix_matched {
        input.set_escape_pending(1);
    }
    Token::Literal(escape)
}

enum Probe {
    Complete,
    /// The delimiter did not match; this many bytes were fetched while probing.
    Partial(usize),
}

fn probe(input: &mut InputStream, rest: &[u8]) -> Probe {
    for (i, &expected) in rest.iter().enumerate() {
        match input.fetch_raw() {
            Some(b) if b == expected => {}
            Some(_) => return Probe::Partial(i + 1),
            None => return Probe::Partial(i),
        }
    }
    Probe::Complete
}
