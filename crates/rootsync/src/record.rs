//! Input parsing.
//!
//! [`RecordParser`] turns the lines of an ID list into ordered
//! [`InputRecord`]s. It accepts three shapes per line:
//!
//! - a bare identifier: `864691135123456789`
//! - a numbered entry: `42 → 864691135123456789`
//! - the same with an ASCII arrow: `42 -> 864691135123456789`
//!
//! Lines that cannot be turned into an identifier are dropped and reported as
//! [`ParseWarning`]s. They never become records, so they never reach the
//! remote service.

use crate::types::{ParseIdError, RootId};
use std::io::BufRead;

const UNICODE_ARROW: char = '\u{2192}';
const ASCII_ARROW: &str = "->";
const COMMENT_MARKER: char = '#';

/// One successfully parsed identifier, in input order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputRecord {
    /// 0-based index among successfully parsed records. Used to restore input
    /// order after the concurrent stages.
    pub position: usize,
    /// The trimmed source line.
    pub raw_label: String,
    pub id: RootId,
}

/// A line that was dropped because it did not contain a valid identifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseWarning {
    /// 1-based line number in the input.
    pub line: usize,
    pub text: String,
    pub reason: ParseWarningReason,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseWarningReason {
    /// A `#` line in an input that does not allow comments.
    #[error("comment lines are not accepted here")]
    Comment,
    #[error("line is not valid UTF-8")]
    InvalidUtf8,
    #[error(transparent)]
    InvalidId(#[from] ParseIdError),
}

/// Result of parsing a whole input.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParseReport {
    pub records: Vec<InputRecord>,
    pub warnings: Vec<ParseWarning>,
}

impl ParseReport {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Line-oriented identifier parser.
#[derive(Clone, Copy, Debug, Default)]
pub struct RecordParser {
    allow_comments: bool,
}

impl RecordParser {
    pub const fn new(allow_comments: bool) -> Self {
        Self { allow_comments }
    }

    /// Parser for identity resolution inputs. `#` lines are not comments here
    /// and are reported as warnings.
    pub const fn identity() -> Self {
        Self::new(false)
    }

    /// Parser for coordinate inputs. `#` lines are skipped silently.
    pub const fn coordinates() -> Self {
        Self::new(true)
    }

    pub fn parse_lines<I, S>(&self, lines: I) -> ParseReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut report = ParseReport::default();
        for (idx, line) in lines.into_iter().enumerate() {
            self.parse_line(&mut report, idx + 1, line.as_ref());
        }
        report
    }

    /// Parses every line of `reader`.
    ///
    /// A line that is not valid UTF-8 becomes a warning like any other
    /// malformed line.
    ///
    /// # Errors
    ///
    /// Fails only on I/O errors.
    pub fn parse_reader<R: BufRead>(&self, mut reader: R) -> std::io::Result<ParseReport> {
        let mut report = ParseReport::default();
        let mut buf = Vec::new();
        let mut line_no = 0;

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            line_no += 1;

            match core::str::from_utf8(&buf) {
                Ok(line) => self.parse_line(&mut report, line_no, line),
                Err(_e) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Skipping line {line_no}: {_e}");
                    report.warnings.push(ParseWarning {
                        line: line_no,
                        text: String::from_utf8_lossy(&buf).trim().to_string(),
                        reason: ParseWarningReason::InvalidUtf8,
                    });
                }
            }
        }

        Ok(report)
    }

    fn parse_line(&self, report: &mut ParseReport, line_no: usize, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        if line.starts_with(COMMENT_MARKER) {
            if !self.allow_comments {
                report.warnings.push(ParseWarning {
                    line: line_no,
                    text: line.to_string(),
                    reason: ParseWarningReason::Comment,
                });
            }
            return;
        }

        match id_token(line).parse::<RootId>() {
            Ok(id) => {
                let position = report.records.len();
                report.records.push(InputRecord {
                    position,
                    raw_label: line.to_string(),
                    id,
                });
            }
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Skipping line {}: {:?} ({})", line_no, line, e);
                report.warnings.push(ParseWarning {
                    line: line_no,
                    text: line.to_string(),
                    reason: e.into(),
                });
            }
        }
    }
}

/// The identifier part of a trimmed line: whatever follows the last arrow, or
/// the whole line when there is none.
fn id_token(line: &str) -> &str {
    if let Some((_, rhs)) = line.rsplit_once(UNICODE_ARROW) {
        return rhs.trim();
    }
    if let Some((_, rhs)) = line.rsplit_once(ASCII_ARROW) {
        return rhs.trim();
    }
    line
}
