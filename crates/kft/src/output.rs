//! Output sinks.
//!
//! An [OutputSink] is where expanded output currently goes.
//! There are three kinds of sink:
//!
//! - a stream, such as standard output or the input pipe of a subprocess;
//! - a file opened by the sink itself, e.g. for `{{>path}}`;
//! - an in-memory accumulator. The interpreter evaluates directive arguments
//!     (variable names, file names, tag names, command lines) into memory sinks
//!     before acting on them.
//!
//! The sink owns its writer; dropping the sink flushes and closes it.
//! Use [OutputSink::close] to observe errors from the final flush.

use crate::error::{self, ErrorKind};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Label of memory sinks, as seen by `{{$OUTPUT}}`.
pub const MEMORY_LABEL: &str = "<inline>";

enum Backing {
    Stream(BufWriter<Box<dyn Write + Send>>),
    File(BufWriter<File>),
    Memory(Vec<u8>),
}

pub struct OutputSink {
    backing: Backing,
    filename: String,
}

impl OutputSink {
    /// Create a sink writing to a stream.
    pub fn stream<W: Write + Send + 'static, F: Into<String>>(writer: W, filename: F) -> Self {
        OutputSink {
            backing: Backing::Stream(BufWriter::new(Box::new(writer))),
            filename: filename.into(),
        }
    }

    /// Create or truncate a file and write to it.
    pub fn create<P: AsRef<Path>>(path: P) -> error::Result<Self> {
        let path = path.as_ref();
        let filename = path.to_string_lossy().to_string();
        match File::create(path) {
            Ok(file) => {
                tracing::debug!(path = %filename, "opened output");
                Ok(OutputSink {
                    backing: Backing::File(BufWriter::new(file)),
                    filename,
                })
            }
            Err(err) => Err(ErrorKind::io("create", filename, err).into()),
        }
    }

    /// Create an in-memory accumulator.
    pub fn memory() -> Self {
        OutputSink {
            backing: Backing::Memory(Vec::new()),
            filename: MEMORY_LABEL.into(),
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Write bytes, attributing a failure to this sink's file name.
    pub fn write(&mut self, bytes: &[u8]) -> error::Result<()> {
        let result = match &mut self.backing {
            Backing::Stream(w) => w.write_all(bytes),
            Backing::File(w) => w.write_all(bytes),
            Backing::Memory(v) => {
                v.extend_from_slice(bytes);
                Ok(())
            }
        };
        result.map_err(|err| ErrorKind::io("write to", self.filename.clone(), err).into())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        match &mut self.backing {
            Backing::Stream(w) => w.flush(),
            Backing::File(w) => w.flush(),
            Backing::Memory(_) => Ok(()),
        }
    }

    /// Flush and close the sink.
    pub fn close(mut self) -> error::Result<()> {
        self.flush()
            .map_err(|err| ErrorKind::io("write to", self.filename.clone(), err).into())
    }

    /// The accumulated bytes of a memory sink, or [None] for other kinds of sink.
    pub fn contents(&self) -> Option<&[u8]> {
        match &self.backing {
            Backing::Memory(v) => Some(v),
            _ => None,
        }
    }

    /// Take the accumulated bytes of a memory sink as a string, leaving it empty.
    ///
    /// Invalid UTF-8 is replaced. Other kinds of sink return an empty string.
    pub fn take_string(&mut self) -> String {
        match &mut self.backing {
            Backing::Memory(v) => {
                let s = String::from_utf8_lossy(v).into_owned();
                v.clear();
                s
            }
            _ => String::new(),
        }
    }
}

impl std::fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.backing {
            Backing::Stream(_) => "stream",
            Backing::File(_) => "file",
            Backing::Memory(_) => "memory",
        };
        f.debug_struct("OutputSink")
            .field("kind", &kind)
            .field("filename", &self.filename)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "disk on fire"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "disk on fire"))
        }
    }

    #[test]
    fn memory_sink_accumulates() {
        let mut sink = OutputSink::memory();
        sink.write(b"ab").unwrap();
        sink.write(b"c").unwrap();
        assert_eq!(sink.contents(), Some(&b"abc"[..]));
        assert_eq!(sink.filename(), MEMORY_LABEL);
        assert_eq!(sink.take_string(), "abc");
        assert_eq!(sink.contents(), Some(&b""[..]));
    }

    #[test]
    fn stream_sink_flushes_on_close() {
        let buffer = SharedBuffer::default();
        let mut sink = OutputSink::stream(buffer.clone(), "<stdout>");
        sink.write(b"hello").unwrap();
        assert_eq!(sink.contents(), None);
        sink.close().unwrap();
        assert_eq!(&*buffer.0.lock().unwrap(), b"hello");
    }

    #[test]
    fn file_sink_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out.txt");
        let mut sink = OutputSink::create(&path).unwrap();
        sink.write(b"line\n").unwrap();
        sink.close().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "line\n");
    }

    #[test]
    fn write_failure_names_the_sink() {
        let mut sink = OutputSink::stream(FailingWriter, "broken");
        sink.write(b"x").unwrap();
        let err = sink.close().unwrap_err();
        match err.kind() {
            ErrorKind::Io { path, action, .. } => {
                assert_eq!(path, "broken");
                assert_eq!(*action, "write to");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn create_in_missing_directory_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = OutputSink::create(dir.path().join("no/such/dir")).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Io { action: "create", .. }));
    }
}
