use std::io::{BufRead, Lines};
use std::path::{Path, PathBuf};

use crate::command::{normalize_relative, Command};
use crate::error::{Result, WarupError};

/// Outcome of running one rule against a line.
enum RuleMatch<'a> {
    NoMatch,
    Copy { from: &'a str, to: &'a str },
    Remove { path: &'a str },
}

struct Rule {
    name: &'static str,
    matcher: fn(&str) -> RuleMatch<'_>,
}

/// Every rule starts by consuming a distinct verb, so no well-formed line can
/// match more than one of them. `parse_line` checks this in debug builds.
const RULES: &[Rule] = &[
    Rule {
        name: "add|replace",
        matcher: match_copy,
    },
    Rule {
        name: "rm",
        matcher: match_remove,
    },
];

/// `(add|replace) --from=<P1> --to=<P2>`. Like a greedy regex, the split happens
/// at the last ` --to=`.
fn match_copy(line: &str) -> RuleMatch<'_> {
    let Some(rest) = line
        .strip_prefix("add ")
        .or_else(|| line.strip_prefix("replace "))
    else {
        return RuleMatch::NoMatch;
    };
    let Some(rest) = rest.strip_prefix("--from=") else {
        return RuleMatch::NoMatch;
    };
    match rest.rsplit_once(" --to=") {
        Some((from, to)) => RuleMatch::Copy { from, to },
        None => RuleMatch::NoMatch,
    }
}

/// `rm --from=<P1>`
fn match_remove(line: &str) -> RuleMatch<'_> {
    match line.strip_prefix("rm --from=") {
        Some(path) => RuleMatch::Remove { path },
        None => RuleMatch::NoMatch,
    }
}

/// Parse a single descriptor line. `line_number` is 1-based and only used for errors.
pub fn parse_line(line: &str, line_number: usize) -> Result<Command> {
    let mut matches = RULES
        .iter()
        .map(|rule| (rule.name, (rule.matcher)(line)))
        .filter(|(_, m)| !matches!(m, RuleMatch::NoMatch));

    let Some((_, matched)) = matches.next() else {
        return Err(WarupError::LineUnparseable {
            line_number,
            line: line.to_string(),
        });
    };
    debug_assert!(
        matches.next().is_none(),
        "command rules overlap on line {line:?}"
    );

    let resolve = |raw: &str| {
        normalize_relative(raw).ok_or_else(|| WarupError::UnsafePath {
            line_number,
            line: line.to_string(),
            path: raw.to_string(),
        })
    };

    match matched {
        RuleMatch::Copy { from, to } => Ok(Command::Copy {
            from: resolve(from)?,
            to: resolve(to)?,
        }),
        RuleMatch::Remove { path } => Ok(Command::Remove {
            path: resolve(path)?,
        }),
        RuleMatch::NoMatch => Err(WarupError::LineUnparseable {
            line_number,
            line: line.to_string(),
        }),
    }
}

/// Lazily parse a descriptor, in file order. Blank lines are skipped.
///
/// Each line is read and parsed only when the iterator is advanced, so a caller
/// executing commands as they come never sees a later line before an earlier
/// command has run.
pub fn read_descriptor<R: BufRead>(reader: R, source: &Path) -> Descriptor<R> {
    Descriptor {
        lines: reader.lines(),
        line_number: 0,
        source: source.to_path_buf(),
    }
}

/// Iterator over the commands of a descriptor, see [`read_descriptor`].
pub struct Descriptor<R> {
    lines: Lines<R>,
    line_number: usize,
    source: PathBuf,
}

impl<R: BufRead> Iterator for Descriptor<R> {
    type Item = Result<Command>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?;
            self.line_number += 1;
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    return Some(Err(WarupError::DescriptorUnreadable {
                        path: self.source.clone(),
                        source: e,
                    }))
                }
            };
            if !line.trim().is_empty() {
                return Some(parse_line(&line, self.line_number));
            }
        }
    }
}
