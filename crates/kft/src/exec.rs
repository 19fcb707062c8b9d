//! Running subprocesses.
//!
//! A subprocess directive connects up to two pipes to the child:
//!
//! - The child's standard output is always a pipe.
//!     The calling thread reads it to the end and copies it verbatim to the current output.
//! - Unless the mode is [PipeMode::None], the rest of the directive body is expanded
//!     by a worker thread and written to a second pipe.
//!     The child reads this pipe either as its standard input ([PipeMode::Stdin]) or
//!     through a `/dev/fd/N` path appended to its arguments ([PipeMode::PathArgument]).
//!
//! Both ends are serviced concurrently, so a child that writes a lot of output before
//!     reading its input (or the other way round) cannot deadlock the run.
//! If the child exits without reading all of its input the worker still expands
//!     the rest of the body, so the input ends up after the directive, but discards it.
//!
//! The worker is a scoped thread: it borrows the input stream and the context
//!     for as long as the directive runs, and is joined before the child is waited on.

use crate::error::{self, ErrorKind};
use crate::input::InputStream;
use crate::output::OutputSink;
use crate::vm::{self, Context, Flags};
use std::io::{self, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Command, ExitStatus, Stdio};

/// How the rest of the directive body reaches the subprocess.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeMode {
    /// The body is not read; the child's standard input is `/dev/null`.
    None,
    /// The body is the child's standard input.
    Stdin,
    /// The body is readable at a `/dev/fd/N` path given as the child's last argument.
    /// The child's standard input is `/dev/null`, so it cannot consume kft's own input.
    PathArgument,
}

/// Exit status reported when the child's status cannot be determined.
const UNKNOWN_STATUS: i32 = 127;

/// Run a program, weaving its output into `output`.
///
/// A non-zero exit status of the child is an error.
pub fn execute(
    ctx: &mut Context,
    input: &mut InputStream,
    output: &mut OutputSink,
    flags: Flags,
    program: &str,
    args: &[String],
    mode: PipeMode,
) -> error::Result<()> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());
    for (name, value) in ctx.variables.child_env() {
        match value {
            Some(value) => command.env(name, value),
            None => command.env_remove(name),
        };
    }
    let mut path_argument_reader = None;
    let to_child: Option<Box<dyn Write + Send>> = match mode {
        PipeMode::None => {
            command.stdin(Stdio::null());
            None
        }
        PipeMode::Stdin => {
            command.stdin(Stdio::piped());
            None
        }
        PipeMode::PathArgument => {
            command.stdin(Stdio::null());
            let (reader, writer) = io::pipe().map_err(ErrorKind::Pipe)?;
            let fd = reader.as_raw_fd();
            command.arg(format!("/dev/fd/{fd}"));
            // SAFETY: fcntl is async-signal-safe and only touches a descriptor the child owns.
            unsafe {
                command.pre_exec(move || inherit_fd(fd));
            }
            path_argument_reader = Some(reader);
            Some(Box::new(writer))
        }
    };

    tracing::debug!(program, ?args, ?mode, "spawning");
    let mut child = command.spawn().map_err(|source| ErrorKind::Spawn {
        program: program.to_string(),
        source,
    })?;
    // The read end now lives in the child.
    drop(path_argument_reader);
    let to_child = match (to_child, child.stdin.take()) {
        (Some(writer), _) => Some(writer),
        (None, Some(stdin)) => Some(Box::new(stdin) as Box<dyn Write + Send>),
        (None, None) => None,
    };
    let from_child = match child.stdout.take() {
        Some(stdout) => stdout,
        None => {
            return Err(ErrorKind::Pipe(io::Error::new(
                io::ErrorKind::Other,
                "the standard output of the child is not piped",
            ))
            .into())
        }
    };

    let label = format!("<{program}>");
    let spec = input.spec().clone();
    let (fed, relayed) = std::thread::scope(|s| {
        let worker = match to_child {
            None => None,
            Some(writer) => {
                let label = label.clone();
                Some(s.spawn(move || {
                    let mut sink = OutputSink::stream(ChildInput::new(writer, &label), label);
                    let result = vm::run(ctx, input, &mut sink, flags);
                    let closed = sink.close();
                    result.and(closed)
                }))
            }
        };
        let relayed = {
            let mut from_child = InputStream::from_reader(from_child, label.clone(), spec);
            vm::relay(&mut from_child, output)
        };
        let fed = match worker {
            None => Ok(()),
            Some(worker) => match worker.join() {
                Ok(result) => result,
                Err(_) => Err(ErrorKind::Worker {
                    program: program.to_string(),
                }
                .into()),
            },
        };
        (fed, relayed)
    });

    let status = child.wait().map_err(|source| ErrorKind::Spawn {
        program: program.to_string(),
        source,
    })?;
    let status = exit_code(status);
    tracing::debug!(program, status, "subprocess exited");
    fed?;
    relayed?;
    if status != 0 {
        return Err(ErrorKind::Subprocess {
            program: program.to_string(),
            status,
        }
        .into());
    }
    Ok(())
}

/// Clear close-on-exec on a descriptor. Runs in the child between fork and exec.
fn inherit_fd(fd: RawFd) -> io::Result<()> {
    // SAFETY: fcntl on an open descriptor has no memory safety requirements.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags == -1 {
        return Err(io::Error::last_os_error());
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Map an exit status to a shell-style exit code.
///
/// Death by signal N is 128+N.
fn exit_code(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => UNKNOWN_STATUS,
    }
}

/// The write end of a pipe to a child.
///
/// Once the child closes its end, writes succeed and the data is discarded.
struct ChildInput {
    inner: Box<dyn Write + Send>,
    label: String,
    closed: bool,
}

impl ChildInput {
    fn new(inner: Box<dyn Write + Send>, label: &str) -> Self {
        ChildInput {
            inner,
            label: label.to_string(),
            closed: false,
        }
    }

    fn check(&mut self, result: io::Result<()>) -> io::Result<()> {
        match result {
            Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {
                tracing::warn!(
                    program = %self.label,
                    "the subprocess stopped reading its input; discarding the rest"
                );
                self.closed = true;
                self.inner = Box::new(io::sink());
                Ok(())
            }
            other => other,
        }
    }
}

impl Write for ChildInput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Ok(buf.len());
        }
        let result = self.inner.write(buf);
        match result {
            Ok(n) => Ok(n),
            Err(err) => self.check(Err(err)).map(|()| buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        let result = self.inner.flush();
        self.check(result)
    }
}
