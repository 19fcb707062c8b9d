use super::*;
use crate::error::Location;
use crate::spec::DelimiterSpec;
use std::sync::Arc;

fn context() -> Context {
    let mut ctx = Context::default();
    ctx.variables.set("KFT_SHELL", "/bin/sh");
    ctx
}

fn expand_with(ctx: &mut Context, spec: DelimiterSpec, template: &str) -> error::Result<String> {
    let mut input = InputStream::from_bytes(template, "main.kft", Arc::new(spec));
    let mut output = OutputSink::memory();
    run_to_completion(ctx, &mut input, &mut output)?;
    Ok(output.take_string())
}

fn expand(template: &str) -> error::Result<String> {
    expand_with(&mut context(), DelimiterSpec::default(), template)
}

macro_rules! expansion_tests {
    ( $( ($name: ident, $template: expr, $want: expr $(,)? ), )+ ) => {
        $(
            #[test]
            fn $name() {
                let got = expand($template).unwrap();
                assert_eq!(got, $want);
            }
        )+
    };
}

macro_rules! failure_tests {
    ( $( ($name: ident, $template: expr, $want: pat $(,)? ), )+ ) => {
        $(
            #[test]
            fn $name() {
                let err = expand($template).unwrap_err();
                assert!(matches!(err.kind(), $want), "unexpected error: {err}");
            }
        )+
    };
}

expansion_tests![
    (empty, "", ""),
    (plain_text, "hello\nworld\n", "hello\nworld\n"),
    (lone_braces, "a { b } c", "a { b } c"),
    (escaped_delimiters, r"\{{x\}}", "{{x}}"),
    (escaped_escape, r"a\\b", r"a\b"),
    (escaped_newline, "a\\\nb", "a\nb"),
    (escape_before_other, r"\n", r"\n"),
    (top_level_end_stops_the_run, "a}}b", "a"),
    (plain_scope, "a{{ b }}c", "a b c"),
    (empty_scope, "a{{}}b", "ab"),
    (unterminated_scope, "a{{b", "ab"),
    (assign_then_read, "{{$KFT_TEST_V=1}}{{$KFT_TEST_V}}", "1"),
    (assignment_writes_nothing, "a{{$KFT_TEST_V=1}}b", "ab"),
    (unknown_variable_is_empty, "a{{$KFT_TEST_NEVER_SET}}b", "ab"),
    (value_keeps_later_equals, "{{$KFT_TEST_V=a=b}}{{$KFT_TEST_V}}", "a=b"),
    (
        multi_line_block,
        "{{$\nKFT_TEST_A=1\nKFT_TEST_B=2\n\nKFT_TEST_B\nKFT_TEST_A\n}}",
        "21",
    ),
    (
        computed_name,
        "{{$KFT_TEST_N=X}}{{$KFT_TEST_{{$KFT_TEST_N}}=y}}{{$KFT_TEST_X}}",
        "y",
    ),
    (input_name, "{{$INPUT}}", "main.kft"),
    (output_name, "{{$OUTPUT}}", "<inline>"),
    (offset, "abc{{$OFFSET}}", "abc14"),
    (comment, "a{{- hidden }}b", "ab"),
    (nested_comment, "a{{- x {{$KFT_TEST_V=1}} {{ y }} z }}b{{$KFT_TEST_V}}", "ab"),
    (comment_hides_subprocesses, "{{-{{#false}}}}ok", "ok"),
    (tag_loop, "{{:L}}x{{@L}}", "xx"),
    (tag_budget, "{{:L=3}}x{{@L}}", "xxxx"),
    (tag_zero_budget, "{{:L=0}}x{{@L}}", "x"),
    (tag_computed_name, "{{$KFT_TEST_T=L}}{{:{{$KFT_TEST_T}}}}x{{@L}}", "xx"),
    (tag_reset_by_set, "{{:L}}x{{@L}}{{:L}}y{{@L}}", "xxyy"),
    (shell, "{{!echo hi}}", "hi\n"),
    (shell_multi_line, "{{!\necho a\necho b\n}}", "a\nb\n"),
    (shell_pipeline, "{{!printf a | tr a b}}", "b"),
    (command_without_input, "{{#echo hi}}", "hi\n"),
    (command_quoting, "{{#echo \"a  b\" 'c  d'}}", "a  b c  d\n"),
    (command_with_input, "{{#cat\nbody\n}}", "body\n"),
    (
        command_input_is_expanded,
        "{{$KFT_TEST_V=1}}{{#cat\nv={{$KFT_TEST_V}}\n}}",
        "v=1\n",
    ),
    (command_path_argument, "{{#!cat\nbody\n}}", "body\n"),
    (command_then_text, "{{#echo a}}b", "a\nb"),
    (command_output_not_reinterpreted, r"{{#printf '\\173\\173$A'}}", "{{$A"),
    (command_in_variable, "{{$KFT_TEST_V={{#printf x}}}}{{$KFT_TEST_V}}", "x"),
];

failure_tests![
    (tag_not_found, "{{@L}}", ErrorKind::TagNotFound(_)),
    (invalid_budget, "{{:L=many}}", ErrorKind::InvalidBudget(_)),
    (read_missing_file, "{{</kft/test/missing}}", ErrorKind::Io { action: "open", .. }),
    (
        include_missing_file,
        "{{$INPUT=/kft/test/missing}}",
        ErrorKind::Io { action: "open", .. },
    ),
    (
        write_to_missing_directory,
        "{{>/kft/test/missing/file}}",
        ErrorKind::Io { action: "create", .. },
    ),
    (unbalanced_quote, "{{#echo 'a}}", ErrorKind::WordSplit(_)),
    (empty_command, "{{#  }}", ErrorKind::EmptyCommand),
    (failing_command, "{{#false}}", ErrorKind::Subprocess { status: 1, .. }),
    (
        failing_shell,
        "{{!exit 4}}",
        ErrorKind::Subprocess { status: 4, .. },
    ),
    (
        missing_program,
        "{{#kft-test-program-that-does-not-exist}}",
        ErrorKind::Spawn { .. },
    ),
];

#[test]
fn error_location() {
    let err = expand("ab\ncd{{@L}}").unwrap_err();
    assert_eq!(
        err.trace(),
        &[Location {
            filename: "main.kft".into(),
            row: 1,
            col: 2,
        }]
    );
    assert!(err.to_string().contains("main.kft:2:3"), "{err}");
}

struct BrokenWriter;

impl std::io::Write for BrokenWriter {
    fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
        Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn top_level_write_failure_has_location() {
    let mut input = InputStream::from_bytes("ab\ncd", "main.kft", Default::default());
    let mut output = OutputSink::stream(BrokenWriter, "broken");
    let err = run_to_completion(&mut context(), &mut input, &mut output).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Io { action: "write to", .. }));
    assert_eq!(
        err.trace(),
        &[Location {
            filename: "main.kft".into(),
            row: 1,
            col: 2,
        }]
    );
}

#[test]
fn subprocess_status_is_exit_code() {
    let err = expand("{{#sh -c 'exit 5'}}").unwrap_err();
    assert_eq!(err.exit_code(), 5);
}

#[test]
fn assignments_do_not_touch_process_environment() {
    let mut ctx = context();
    expand_with(&mut ctx, DelimiterSpec::default(), "{{$KFT_TEST_LEAK=1}}").unwrap();
    assert_eq!(ctx.variables.get("KFT_TEST_LEAK"), Some("1".into()));
    assert!(std::env::var("KFT_TEST_LEAK").is_err());
}

#[test]
fn custom_delimiters() {
    let spec = DelimiterSpec::new(b'^', "<%", "%>").unwrap();
    let got = expand_with(
        &mut context(),
        spec,
        "{{<%$KFT_TEST_V=1%><%$KFT_TEST_V%>}} ^<%",
    )
    .unwrap();
    assert_eq!(got, "{{1}} <%");
}

#[test]
fn return_on_end_of_line() {
    let mut input = InputStream::from_bytes("ab\ncd", "main.kft", Default::default());
    let mut output = OutputSink::memory();
    let outcome = run(&mut context(), &mut input, &mut output, Flags::RETURN_ON_EOL).unwrap();
    assert_eq!(outcome, Outcome::EndOfLine);
    assert_eq!(output.take_string(), "ab");
    let outcome = run(&mut context(), &mut input, &mut output, Flags::RETURN_ON_EOL).unwrap();
    assert_eq!(outcome, Outcome::Done);
    assert_eq!(output.take_string(), "cd");
}

#[test]
fn raw_mode_copies_verbatim() {
    let mut input = InputStream::from_bytes(r"a{{$X}}\{{}}", "main.kft", Default::default());
    let mut output = OutputSink::memory();
    let outcome = run(&mut context(), &mut input, &mut output, Flags::RAW).unwrap();
    assert_eq!(outcome, Outcome::Done);
    assert_eq!(output.take_string(), r"a{{$X}}\{{}}");
}

#[test]
fn flags() {
    let flags = Flags::COMMENT | Flags::RETURN_ON_EOL;
    assert!(flags.contains(Flags::COMMENT));
    assert!(!flags.contains(Flags::RAW));
    assert_eq!(flags.nested(), Flags::COMMENT);
    assert_eq!(Flags::default().without(Flags::RAW), Flags::default());
}

mod files {
    use super::*;

    fn path(dir: &tempfile::TempDir, name: &str) -> String {
        dir.path().join(name).to_str().unwrap().to_string()
    }

    #[test]
    fn write_then_read() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = path(&dir, "out.txt");
        let got = expand(&format!("a{{{{>{file}}}}}hello}}}}b{{{{<{file}}}}}c")).unwrap();
        assert_eq!(got, "abhelloc");
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "hello");
    }

    #[test]
    fn write_rest_of_input() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = path(&dir, "out.txt");
        let got = expand(&format!("a{{{{>{file}}}}}b\nc")).unwrap();
        assert_eq!(got, "a");
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "b\nc");
    }

    #[test]
    fn output_variable_redirects_rest_of_scope() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = path(&dir, "out.txt");
        let got = expand(&format!("{{{{ {{{{$OUTPUT={file}}}}}x {{{{$OUTPUT}}}}}}}}y")).unwrap();
        assert_eq!(got, " y");
        assert_eq!(std::fs::read_to_string(&file).unwrap(), format!("x {file}"));
    }

    #[test]
    fn input_variable_includes_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = path(&dir, "in.kft");
        std::fs::write(&file, "[{{$INPUT}}]").unwrap();
        let got = expand(&format!("a{{{{$INPUT={file}}}}}b")).unwrap();
        assert_eq!(got, format!("a[{file}]b"));
    }

    #[test]
    fn included_file_has_its_own_tags() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = path(&dir, "in.kft");
        std::fs::write(&file, "{{:L}}i{{@L}}").unwrap();
        let got = expand(&format!("{{{{:L}}}}o{{{{<{file}}}}}{{{{@L}}}}")).unwrap();
        assert_eq!(got, "oiioii");
    }

    #[test]
    fn tags_in_included_file_are_not_visible_outside() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = path(&dir, "in.kft");
        std::fs::write(&file, "{{:INNER}}").unwrap();
        let err = expand(&format!("{{{{<{file}}}}}{{{{@INNER}}}}")).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::TagNotFound(tag) if tag == "INNER"));
    }

    #[test]
    fn error_trace_through_include() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = path(&dir, "in.kft");
        std::fs::write(&file, "line\n{{@MISSING}}").unwrap();
        let err = expand(&format!("x{{{{<{file}}}}}")).unwrap_err();
        assert_eq!(
            err.trace(),
            &[
                Location {
                    filename: file.clone(),
                    row: 1,
                    col: 0,
                },
                Location {
                    filename: "main.kft".into(),
                    row: 0,
                    col: 1,
                },
            ]
        );
    }
}
