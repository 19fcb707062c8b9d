use clap::Parser;
use kft::input::InputStream;
use kft::output::OutputSink;
use kft::spec::{self, DelimiterSpec};
use kft::variable::Variables;
use kft::vm::{self, Context};
use std::io::IsTerminal;
use std::sync::Arc;
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt, Layer};

fn main() {
    init_tracing();
    if let Err(err) = Cli::parse().run() {
        eprintln!("{err}");
        std::process::exit(err.exit_code());
    }
}

/// Log to standard error, filtered by the KFT_LOG environment variable.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("KFT_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time()
                .with_filter(filter),
        )
        .init();
}

/// Expand kft templates.
///
/// kft copies its input to its output, expanding the directives it contains.
/// Directives are enclosed in {{ and }}:
///
///     {{$NAME}}            value of a variable
///     {{$NAME=VALUE}}      assign a variable
///     {{!script}}          run a shell script
///     {{#cmd args}}        run a command; further lines are its standard input
///     {{:TAG}} {{@TAG}}    set a tag and jump back to it once
///     {{-comment}}         comment
///     {{>path}}            write the rest of the scope to a file
///     {{<path}}            expand a file
///
/// Assignments given before the input files seed the variables;
///     an empty value unsets a variable.
/// These assignments and inherited environment variables are exported to commands.
/// Variables assigned by a template are not, unless named with -x or -a is given:
///     `{{$X=1}}{{!echo $X}}` prints an empty line without -a.
/// With no input files, standard input is expanded.
#[derive(Debug, Parser)]
#[command(
    name = "kft",
    version = "0.1",
    about,
    long_about,
    max_term_width(100)
)]
struct Cli {
    /// Template to expand before the input files. May be repeated.
    ///
    /// When templates are given but no input files, standard input is only expanded
    ///     if it is not a terminal.
    #[arg(short = 'e', long = "eval", value_name = "TEMPLATE")]
    eval: Vec<String>,

    /// File to write the output to; `-` is standard output.
    #[arg(short = 'o', long, value_name = "PATH", default_value = "-")]
    output: String,

    /// Escape character.
    #[arg(short = 'E', long, env = "KFT_ESCAPE", default_value = "\\", value_parser = parse_escape)]
    escape: u8,

    /// Start delimiter.
    #[arg(short = 'S', long, env = "KFT_BEGIN", default_value = spec::DEFAULT_START)]
    start: String,

    /// End delimiter.
    #[arg(short = 'R', long, env = "KFT_END", default_value = spec::DEFAULT_END)]
    end: String,

    /// Export a variable to the commands run by kft. May be repeated.
    #[arg(short = 'x', long = "export", value_name = "NAME")]
    export: Vec<String>,

    /// Export every variable assigned by a template.
    ///
    /// Without this option a template assignment is only seen by commands if the
    ///     variable was exported with -x.
    #[arg(short = 'a', long)]
    export_all: bool,

    /// Variable assignments followed by input files; `-` is standard input.
    #[arg(value_name = "NAME=VALUE|FILE")]
    args: Vec<String>,
}

fn parse_escape(s: &str) -> Result<u8, String> {
    match s.as_bytes() {
        [] => Err("empty escape character".into()),
        [b] => Ok(*b),
        _ => Err(format!("the escape must be a single byte, got {s:?}")),
    }
}

impl Cli {
    fn run(self) -> Result<(), kft::Error> {
        let spec = Arc::new(DelimiterSpec::new(self.escape, self.start, self.end)?);
        let num_assignments = self
            .args
            .iter()
            .take_while(|arg| arg.contains('='))
            .count();
        let (assignments, files) = self.args.split_at(num_assignments);
        tracing::debug!(?spec, ?assignments, ?files, "starting");

        let mut variables = Variables::new();
        for assignment in assignments {
            let Some((name, value)) = assignment.split_once('=') else {
                continue;
            };
            if value.is_empty() {
                variables.unset(name);
            } else {
                variables.set(name, value);
            }
            variables.export(name);
        }
        for name in &self.export {
            variables.export(name);
        }
        variables.set_export_all(self.export_all);
        let mut ctx = Context::new(variables);

        let mut output = if self.output == "-" {
            OutputSink::stream(std::io::stdout(), "/dev/stdout")
        } else {
            OutputSink::create(&self.output)?
        };

        for template in &self.eval {
            let mut input = InputStream::from_bytes(template.as_bytes(), "<eval>", spec.clone());
            vm::run_to_completion(&mut ctx, &mut input, &mut output)?;
        }

        if files.is_empty() {
            if self.eval.is_empty() || !std::io::stdin().is_terminal() {
                let mut input = InputStream::stdin(spec);
                vm::run_to_completion(&mut ctx, &mut input, &mut output)?;
            }
            return output.close();
        }
        for file in files {
            let mut input = if file == "-" {
                InputStream::stdin(spec.clone())
            } else {
                InputStream::open(file, spec.clone())?
            };
            vm::run_to_completion(&mut ctx, &mut input, &mut output)?;
        }
        output.close()
    }
}

