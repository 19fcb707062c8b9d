//! Input streams.
//!
//! An [InputStream] wraps a byte source with the lookahead buffer the lexer needs.
//! The lexer reads bytes speculatively: to decide whether `{` starts the delimiter `{{`
//!     it has to read the next byte, and if that byte is not `{` it has to put it back.
//! The buffer keeps three offsets for this:
//!
//! - *committed*: bytes before this offset have been accepted by the lexer.
//!     The row and column are updated as bytes are committed, and only then.
//! - *fetched*: the next byte returned by [InputStream::fetch_raw] is at this offset.
//!     Bytes between *committed* and *fetched* are tentative and may be rolled back.
//! - *prefetched*: the end of the bytes read from the source so far (the buffer length).
//!
//! Committed bytes are discarded from the buffer the next time the source is read.
//!
//! Each stream also owns the [TagTable] of the positions recorded in it.

use crate::error::{self, ErrorKind, Location};
use crate::spec::DelimiterSpec;
use crate::tags::{Position, TagTable};
use std::io::{self, Read, Seek, SeekFrom};
use std::os::fd::AsFd;
use std::path::Path;
use std::sync::Arc;

const CHUNK_SIZE: usize = 4096;

/// Name of standard input in diagnostics.
pub const STDIN_LABEL: &str = "/dev/stdin";

/// The backing storage of an [InputStream].
pub enum Source {
    File(std::fs::File),
    Memory(io::Cursor<Vec<u8>>),
    /// A stream that cannot seek; e.g., standard input or the output of a subprocess.
    Stream(Box<dyn Read + Send>),
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::File(file) => f.debug_tuple("File").field(file).finish(),
            Source::Memory(cursor) => f.debug_tuple("Memory").field(cursor).finish(),
            Source::Stream(_) => f.debug_tuple("Stream").finish_non_exhaustive(),
        }
    }
}

impl Source {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Source::File(file) => file.read(buf),
            Source::Memory(cursor) => cursor.read(buf),
            Source::Stream(reader) => reader.read(buf),
        }
    }

    fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        match self {
            Source::File(file) => file.seek(SeekFrom::Start(offset)).map(|_| ()),
            Source::Memory(cursor) => cursor.seek(SeekFrom::Start(offset)).map(|_| ()),
            Source::Stream(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "the input is not seekable",
            )),
        }
    }
}

/// A byte source with lookahead, position tracking and tags.
#[derive(Debug)]
pub struct InputStream {
    source: Source,
    filename: String,
    row: usize,
    col: usize,
    buf: Vec<u8>,
    // Offset in the source of buf[0].
    base: u64,
    committed: usize,
    fetched: usize,
    exhausted: bool,
    escape_pending: usize,
    spec: Arc<DelimiterSpec>,
    tags: TagTable,
}

impl InputStream {
    pub fn new<F: Into<String>>(source: Source, filename: F, spec: Arc<DelimiterSpec>) -> Self {
        InputStream {
            source,
            filename: filename.into(),
            row: 0,
            col: 0,
            buf: Vec::new(),
            base: 0,
            committed: 0,
            fetched: 0,
            exhausted: false,
            escape_pending: 0,
            spec,
            tags: TagTable::new(),
        }
    }

    /// Open a file for reading.
    pub fn open<P: AsRef<Path>>(path: P, spec: Arc<DelimiterSpec>) -> error::Result<Self> {
        let path = path.as_ref();
        let filename = path.to_string_lossy().to_string();
        match std::fs::File::open(path) {
            Ok(file) => {
                tracing::debug!(path = %filename, "opened input");
                Ok(InputStream::from_file(file, filename, spec))
            }
            Err(err) => Err(ErrorKind::io("open", filename, err).into()),
        }
    }

    /// Create a stream over an open file, starting at the file's current offset.
    ///
    /// Tags record absolute offsets, so seeking back works even if part of the file
    ///     was consumed before the stream was created.
    pub fn from_file<F: Into<String>>(
        mut file: std::fs::File,
        filename: F,
        spec: Arc<DelimiterSpec>,
    ) -> Self {
        let base = file.stream_position().unwrap_or(0);
        let mut input = InputStream::new(Source::File(file), filename, spec);
        input.base = base;
        input
    }

    /// Create a stream over standard input.
    ///
    /// When standard input is redirected from a regular file the stream can seek;
    ///     pipes and terminals cannot.
    pub fn stdin(spec: Arc<DelimiterSpec>) -> Self {
        let stdin = io::stdin();
        if let Ok(fd) = stdin.as_fd().try_clone_to_owned() {
            let file = std::fs::File::from(fd);
            if file.metadata().map(|m| m.is_file()).unwrap_or(false) {
                tracing::debug!("standard input is a regular file");
                return InputStream::from_file(file, STDIN_LABEL, spec);
            }
        }
        InputStream::from_reader(stdin, STDIN_LABEL, spec)
    }

    /// Create a stream over bytes in memory.
    pub fn from_bytes<B: Into<Vec<u8>>, F: Into<String>>(
        bytes: B,
        filename: F,
        spec: Arc<DelimiterSpec>,
    ) -> Self {
        InputStream::new(Source::Memory(io::Cursor::new(bytes.into())), filename, spec)
    }

    /// Create a stream over a reader that cannot seek.
    pub fn from_reader<R: Read + Send + 'static, F: Into<String>>(
        reader: R,
        filename: F,
        spec: Arc<DelimiterSpec>,
    ) -> Self {
        InputStream::new(Source::Stream(Box::new(reader)), filename, spec)
    }

    /// Fetch the next raw byte, remembering it so it can be rolled back.
    ///
    /// Returns [None] at the end of the source.
    /// A read error is logged and otherwise treated as the end of the source.
    pub fn fetch_raw(&mut self) -> Option<u8> {
        if self.fetched == self.buf.len() && !self.fill() {
            return None;
        }
        let b = self.buf[self.fetched];
        self.fetched += 1;
        Some(b)
    }

    fn fill(&mut self) -> bool {
        if self.exhausted {
            return false;
        }
        if self.committed > 0 {
            self.buf.drain(..self.committed);
            self.base += self.committed as u64;
            self.fetched -= self.committed;
            self.committed = 0;
        }
        let start = self.buf.len();
        self.buf.resize(start + CHUNK_SIZE, 0);
        loop {
            match self.source.read(&mut self.buf[start..]) {
                Ok(n) => {
                    self.buf.truncate(start + n);
                    if n == 0 {
                        self.exhausted = true;
                    }
                    return n > 0;
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    tracing::warn!(input = %self.filename, error = %err, "read failed; treating as end of input");
                    self.buf.truncate(start);
                    self.exhausted = true;
                    return false;
                }
            }
        }
    }

    /// Undo the last `count` fetches.
    ///
    /// Panics if this would roll back committed bytes.
    pub fn rollback(&mut self, count: usize) {
        assert!(
            count <= self.fetched - self.committed,
            "cannot roll back {count} bytes; only {} are uncommitted",
            self.fetched - self.committed
        );
        self.fetched -= count;
    }

    /// Accept the next `count` fetched bytes, updating the row and column.
    ///
    /// Panics if fewer than `count` bytes are fetched and uncommitted.
    pub fn commit(&mut self, count: usize) {
        assert!(
            count <= self.fetched - self.committed,
            "cannot commit {count} bytes; only {} are fetched",
            self.fetched - self.committed
        );
        for &b in &self.buf[self.committed..self.committed + count] {
            if b == b'\n' {
                self.row += 1;
                self.col = 0;
            } else {
                self.col += 1;
            }
        }
        self.committed += count;
    }

    /// Number of fetched bytes that are not yet committed.
    pub fn uncommitted(&self) -> usize {
        self.fetched - self.committed
    }

    /// The position just after the last committed byte.
    pub fn position(&self) -> Position {
        Position {
            offset: self.base + self.committed as u64,
            row: self.row,
            col: self.col,
        }
    }

    /// Seek to a position previously returned by [InputStream::position].
    ///
    /// All buffered lookahead is discarded.
    /// Seeking while an escape sequence is half way through being lexed is an error.
    pub fn seek(&mut self, position: Position) -> io::Result<()> {
        if self.escape_pending > 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "an escaped sequence is pending",
            ));
        }
        self.source.seek_to(position.offset)?;
        self.buf.clear();
        self.base = position.offset;
        self.committed = 0;
        self.fetched = 0;
        self.exhausted = false;
        self.row = position.row;
        self.col = position.col;
        Ok(())
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Location of the current position, for diagnostics.
    pub fn location(&self) -> Location {
        self.location_at(self.position())
    }

    /// Location of an earlier position in this stream.
    pub fn location_at(&self, position: Position) -> Location {
        Location {
            filename: self.filename.clone(),
            row: position.row,
            col: position.col,
        }
    }

    pub fn spec(&self) -> &Arc<DelimiterSpec> {
        &self.spec
    }

    pub fn tags_mut(&mut self) -> &mut TagTable {
        &mut self.tags
    }

    pub(crate) fn escape_pending(&self) -> usize {
        self.escape_pending
    }

    pub(crate) fn set_escape_pending(&mut self, n: usize) {
        self.escape_pending = n;
    }
}
