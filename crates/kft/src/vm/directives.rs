//! Handlers for each directive.

use super::{run, Context, Flags, Outcome};
use crate::error::{self, ErrorKind};
use crate::exec::{self, PipeMode};
use crate::input::InputStream;
use crate::output::OutputSink;
use crate::tags::DEFAULT_BUDGET;

/// Variable names whose values are synthesized from the interpreter state.
const INPUT: &str = "INPUT";
const OUTPUT: &str = "OUTPUT";
const OFFSET: &str = "OFFSET";

const SHELL_VARIABLES: [&str; 2] = ["KFT_SHELL", "SHELL"];
const DEFAULT_SHELL: &str = "/bin/sh";

/// Run the directive that starts right after a start delimiter.
pub(super) fn dispatch(
    ctx: &mut Context,
    input: &mut InputStream,
    output: &mut OutputSink,
    flags: Flags,
) -> error::Result<()> {
    if flags.contains(Flags::COMMENT) {
        run(ctx, input, output, flags)?;
        return Ok(());
    }
    let sigil = match input.fetch_raw() {
        None => None,
        Some(b) => match b {
            b'$' | b'!' | b'#' | b':' | b'@' | b'-' | b'>' | b'<' => {
                input.commit(1);
                Some(b)
            }
            _ => {
                input.rollback(1);
                None
            }
        },
    };
    tracing::trace!(sigil = ?sigil.map(char::from), at = %input.location(), "directive");
    match sigil {
        Some(b'$') => variables(ctx, input, output, flags),
        Some(b'!') => shell(ctx, input, output, flags),
        Some(b'#') => command(ctx, input, output, flags),
        Some(b':') => set_tag(ctx, input, flags),
        Some(b'@') => goto_tag(ctx, input, flags),
        Some(b'-') => {
            run(ctx, input, output, flags | Flags::COMMENT)?;
            Ok(())
        }
        Some(b'>') => write_file(ctx, input, flags),
        Some(b'<') => read_file(ctx, input, output, flags),
        _ => {
            run(ctx, input, output, flags)?;
            Ok(())
        }
    }
}

/// Expand the rest of the directive into a string.
fn evaluate(ctx: &mut Context, input: &mut InputStream, flags: Flags) -> error::Result<String> {
    let mut buffer = OutputSink::memory();
    run(ctx, input, &mut buffer, flags)?;
    Ok(buffer.take_string())
}

fn variables(
    ctx: &mut Context,
    input: &mut InputStream,
    output: &mut OutputSink,
    flags: Flags,
) -> error::Result<()> {
    let mut line = OutputSink::memory();
    loop {
        let outcome = run(ctx, input, &mut line, flags | Flags::RETURN_ON_EOL)?;
        let text = line.take_string();
        let scope_consumed = match text.split_once('=') {
            Some((name, value)) => assign(ctx, input, output, flags, name, value)?,
            None => {
                if let Some(value) = lookup(ctx, input, output, &text) {
                    output.write(value.as_bytes())?;
                }
                false
            }
        };
        if scope_consumed || outcome == Outcome::Done {
            return Ok(());
        }
    }
}

fn lookup(ctx: &Context, input: &InputStream, output: &OutputSink, name: &str) -> Option<String> {
    match name {
        "" => None,
        INPUT => Some(input.filename().to_string()),
        OUTPUT => Some(output.filename().to_string()),
        OFFSET => Some(input.position().offset.to_string()),
        _ => ctx.variables.get(name),
    }
}

/// Assign a variable.
///
/// Returns true if the assignment consumed the rest of the enclosing scope,
///     which is the case for `OUTPUT`.
fn assign(
    ctx: &mut Context,
    input: &mut InputStream,
    output: &mut OutputSink,
    flags: Flags,
    name: &str,
    value: &str,
) -> error::Result<bool> {
    match name {
        INPUT => {
            let mut included = InputStream::open(value, input.spec().clone())?;
            run(ctx, &mut included, output, flags)?;
            Ok(false)
        }
        OUTPUT => {
            redirect(ctx, input, flags, value)?;
            Ok(true)
        }
        OFFSET => {
            tracing::warn!(at = %input.location(), "{OFFSET} is read only; ignoring assignment");
            Ok(false)
        }
        _ => {
            tracing::debug!(name, value, "assigning variable");
            ctx.variables.set(name, value);
            Ok(false)
        }
    }
}

fn shell(
    ctx: &mut Context,
    input: &mut InputStream,
    output: &mut OutputSink,
    flags: Flags,
) -> error::Result<()> {
    let shell = SHELL_VARIABLES
        .iter()
        .filter_map(|name| ctx.variables.get(name))
        .find(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_SHELL.to_string());
    exec::execute(ctx, input, output, flags, &shell, &[], PipeMode::PathArgument)
}

fn command(
    ctx: &mut Context,
    input: &mut InputStream,
    output: &mut OutputSink,
    flags: Flags,
) -> error::Result<()> {
    let mut buffer = OutputSink::memory();
    let outcome = run(ctx, input, &mut buffer, flags | Flags::RETURN_ON_EOL)?;
    let line = buffer.take_string();
    let (path_argument, words) = match line.strip_prefix('!') {
        Some(words) => (true, words),
        None => (false, line.as_str()),
    };
    let mut args = shlex::split(words).ok_or_else(|| ErrorKind::WordSplit(words.to_string()))?;
    if args.is_empty() {
        return Err(ErrorKind::EmptyCommand.into());
    }
    let program = args.remove(0);
    let mode = match (outcome, path_argument) {
        (Outcome::Done, _) => PipeMode::None,
        (Outcome::EndOfLine, false) => PipeMode::Stdin,
        (Outcome::EndOfLine, true) => PipeMode::PathArgument,
    };
    exec::execute(ctx, input, output, flags, &program, &args, mode)
}

fn set_tag(ctx: &mut Context, input: &mut InputStream, flags: Flags) -> error::Result<()> {
    let name = evaluate(ctx, input, flags)?;
    let (key, budget) = match name.split_once('=') {
        None => (name.as_str(), DEFAULT_BUDGET),
        Some((key, budget)) => match budget.trim().parse::<usize>() {
            Ok(budget) => (key, budget),
            Err(_) => return Err(ErrorKind::InvalidBudget(budget.to_string()).into()),
        },
    };
    let position = input.position();
    tracing::debug!(tag = key, budget, offset = position.offset, "setting tag");
    input.tags_mut().set(key, position, budget);
    Ok(())
}

fn goto_tag(ctx: &mut Context, input: &mut InputStream, flags: Flags) -> error::Result<()> {
    let name = evaluate(ctx, input, flags)?;
    let target = match input.tags_mut().get_mut(&name) {
        None => return Err(ErrorKind::TagNotFound(name).into()),
        Some(entry) => entry.visit(),
    };
    match target {
        None => {
            tracing::debug!(tag = %name, "visit budget used up; not jumping");
            Ok(())
        }
        Some(position) => {
            tracing::debug!(tag = %name, offset = position.offset, "jumping to tag");
            input
                .seek(position)
                .map_err(|source| ErrorKind::Seek { tag: name, source }.into())
        }
    }
}

fn write_file(ctx: &mut Context, input: &mut InputStream, flags: Flags) -> error::Result<()> {
    let path = evaluate(ctx, input, flags)?;
    redirect(ctx, input, flags, &path)
}

/// Expand the rest of the enclosing scope into a file.
fn redirect(
    ctx: &mut Context,
    input: &mut InputStream,
    flags: Flags,
    path: &str,
) -> error::Result<()> {
    let mut file = OutputSink::create(path)?;
    run(ctx, input, &mut file, flags)?;
    file.close()
}

fn read_file(
    ctx: &mut Context,
    input: &mut InputStream,
    output: &mut OutputSink,
    flags: Flags,
) -> error::Result<()> {
    let path = evaluate(ctx, input, flags)?;
    let mut included = InputStream::open(&path, input.spec().clone())?;
    run(ctx, &mut included, output, flags)?;
    Ok(())
}
