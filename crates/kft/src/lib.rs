//! kft, a template expansion engine
//!
//! kft copies text through unchanged except for directives, which are delimited
//!     by `{{` and `}}` by default.
//! Directives read and assign variables, run commands and shell scripts,
//!     redirect output to files, include other files, and jump back to tags.
//! See the [vm] module for the list of directives.
//!
//! The crate is organized bottom up:
//!
//! - [spec]: the escape byte and delimiters.
//! - [input]: input streams with the lookahead and seeking the lexer needs.
//! - [lexer]: turns raw bytes into literal, delimiter and end-of-line tokens.
//! - [tags]: per-input tables of positions to jump back to.
//! - [output]: output sinks.
//! - [variable]: the variable store.
//! - [exec]: running subprocesses with their input and output piped through kft.
//! - [vm]: the interpreter.
//!
//! ```
//! use kft::{input::InputStream, output::OutputSink, vm};
//!
//! let mut ctx = vm::Context::default();
//! let mut input = InputStream::from_bytes(
//!     "{{$NAME=world}}hello {{$NAME}}",
//!     "<eval>",
//!     Default::default(),
//! );
//! let mut output = OutputSink::memory();
//! vm::run_to_completion(&mut ctx, &mut input, &mut output).unwrap();
//! assert_eq!(output.take_string(), "hello world");
//! ```

pub mod color;
pub mod error;
pub mod exec;
pub mod input;
pub mod lexer;
pub mod output;
pub mod spec;
pub mod tags;
pub mod variable;
pub mod vm;

pub use error::{Error, ErrorKind, Result};
