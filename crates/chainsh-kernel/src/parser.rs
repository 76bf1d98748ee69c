//! Command-line parser: pipeline stages and output redirects.
//!
//! Parsing runs back to front because redirects are suffixes:
//!
//! ```text
//!   echo hi | grep h > out.txt 2> err.txt
//!   └────── stages ───────┘└ stdout ┘└ stderr ┘
//! ```
//!
//! Redirect detection is literal substring matching on `" 2>"` and `" >"`.
//! The leading space is part of the delimiter, so `foo2>bar` and `a>b` are
//! ordinary tokens. Since the error-output split happens first, anything after
//! `" 2>"` (including a later `" >"`) belongs to the error-output path.

use std::path::Path;

use chainsh_types::{PipelineSpec, Stage};

use crate::error::{ParseError, PipelineError};

const STDERR_REDIRECT: &str = " 2>";
const STDOUT_REDIRECT: &str = " >";
const PIPE: char = '|';

/// Parse a raw command line into a [`PipelineSpec`].
///
/// Empty pipe segments become stages with no tokens; they are rejected by
/// [`crate::validator::validate`], not here.
pub fn parse(input: &str) -> Result<PipelineSpec, ParseError> {
    let (rest, stderr_path) = split_redirect(input, STDERR_REDIRECT)
        .map_err(|count| ParseError::MultipleStderrRedirects { count })?;
    let (rest, stdout_path) = split_redirect(rest, STDOUT_REDIRECT)
        .map_err(|count| ParseError::MultipleStdoutRedirects { count })?;

    let stages = rest
        .split(PIPE)
        .map(|segment| segment.split_whitespace().collect::<Stage>())
        .collect();

    let mut spec = PipelineSpec::new(stages);
    if let Some(path) = stdout_path {
        spec = spec.with_stdout_path(path);
    }
    if let Some(path) = stderr_path {
        spec = spec.with_stderr_path(path);
    }

    tracing::trace!(stages = spec.stage_count(), "parsed pipeline");
    Ok(spec)
}

/// Read a command line from a file and parse it.
///
/// The first line that is neither blank nor a `#` comment is the command.
/// A shebang counts as a comment.
pub fn parse_pipeline_file(path: &Path) -> Result<PipelineSpec, PipelineError> {
    let content = std::fs::read_to_string(path)?;
    let line = content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))
        .unwrap_or("");
    Ok(parse(line)?)
}

/// Split off a trailing redirect target.
///
/// Returns the remaining command and the trimmed target, or the number of
/// occurrences when the delimiter appears more than once.
fn split_redirect<'a>(input: &'a str, delimiter: &str) -> Result<(&'a str, Option<&'a str>), usize> {
    let count = input.matches(delimiter).count();
    match count {
        0 => Ok((input, None)),
        1 => {
            let (command, target) = input
                .split_once(delimiter)
                .unwrap_or((input, ""));
            Ok((command.trim(), Some(target.trim())))
        }
        n => Err(n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(spec: &PipelineSpec, index: usize) -> Vec<&str> {
        spec.stages()[index].argv().iter().map(String::as_str).collect()
    }

    #[test]
    fn single_program_with_args() {
        let spec = parse("ls -la /tmp").unwrap();
        assert_eq!(spec.stage_count(), 1);
        assert_eq!(argv(&spec, 0), ["ls", "-la", "/tmp"]);
        assert!(spec.stdout_path().is_none());
        assert!(spec.stderr_path().is_none());
    }

    #[test]
    fn both_redirects_are_split_off() {
        let spec = parse("sort data.txt | uniq > out.txt 2> err.txt").unwrap();
        assert_eq!(spec.stage_count(), 2);
        assert_eq!(argv(&spec, 1), ["uniq"]);
        assert_eq!(spec.stdout_path(), Some(Path::new("out.txt")));
        assert_eq!(spec.stderr_path(), Some(Path::new("err.txt")));
    }

    #[test]
    fn stdout_after_stderr_stays_in_stderr_target() {
        let spec = parse("cmd 2> e > o").unwrap();
        assert_eq!(spec.stderr_path(), Some(Path::new("e > o")));
        assert!(spec.stdout_path().is_none());
    }

    #[test]
    fn redirect_without_leading_space_is_a_token() {
        let spec = parse("foo2>bar a>b").unwrap();
        assert_eq!(argv(&spec, 0), ["foo2>bar", "a>b"]);
        assert!(spec.stdout_path().is_none());
        assert!(spec.stderr_path().is_none());
    }

    #[test]
    fn pipeline_file_skips_shebang_and_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("count.chainsh");
        std::fs::write(&path, "#!/usr/bin/env chainsh\n\n echo hi | wc -l > o \n").unwrap();

        let spec = parse_pipeline_file(&path).unwrap();
        assert_eq!(spec.stage_count(), 2);
        assert_eq!(argv(&spec, 0), ["echo", "hi"]);
        assert_eq!(argv(&spec, 1), ["wc", "-l"]);
        assert_eq!(spec.stdout_path(), Some(Path::new("o")));
        assert!(spec.stderr_path().is_none());
    }

    #[test]
    fn pipeline_file_with_only_comments_is_an_empty_stage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.chainsh");
        std::fs::write(&path, "#!/usr/bin/env chainsh\n# nothing to run\n\n").unwrap();

        let spec = parse_pipeline_file(&path).unwrap();
        assert_eq!(spec.stage_count(), 1);
        assert!(spec.stages()[0].is_empty());

        let report = crate::validator::validate(&spec);
        assert!(!report.is_valid());
        assert_eq!(report.issues()[0].code, crate::validator::IssueCode::EmptyStage);
    }

    #[test]
    fn missing_pipeline_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = parse_pipeline_file(&dir.path().join("absent.chainsh"));
        assert!(matches!(result, Err(PipelineError::Io(_))), "{result:?}");
    }

    #[test]
    fn split_redirect_counts_occurrences() {
        assert_eq!(split_redirect("a > b > c", " >"), Err(2));
        assert_eq!(split_redirect("a > b", " >"), Ok(("a", Some("b"))));
        assert_eq!(split_redirect("a", " >"), Ok(("a", None)));
    }
}
