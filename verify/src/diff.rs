//! Diff engine: line and character divergence between actual and expected
//! text.
//!
//! Comparison is exact. Lines are split on `\n` only; trailing whitespace,
//! `\r`, and a final newline all count. When one side has fewer lines, every
//! missing index is reported (as `<MISSING>`), not just the first. For each
//! differing pair of present lines the first differing character position is
//! located, with a short line's positions past its end reading as `<END>`.
//! Character positions count Unicode scalar values, not bytes.

use std::fmt::{self, Write as _};

use serde::Serialize;

/// Rendering of a line absent on one side.
pub const MISSING_LINE: &str = "<MISSING>";
/// Rendering of a character position past the end of a line.
pub const END_OF_LINE: &str = "<END>";

/// Number of character differences shown per line in [`render_report`].
const RENDERED_CHAR_DIFFS: usize = 5;

/// One differing line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineDivergence {
    /// Zero-based line index.
    pub index: usize,
    /// The actual line, `None` past the end of the actual text.
    pub actual_line: Option<String>,
    /// The expected line, `None` past the end of the expected text.
    pub expected_line: Option<String>,
    /// First differing character position. `None` when either side is
    /// missing.
    pub first_char_divergence: Option<usize>,
}

impl LineDivergence {
    /// Actual line, or [`MISSING_LINE`].
    #[must_use]
    pub fn actual_display(&self) -> &str {
        self.actual_line.as_deref().unwrap_or(MISSING_LINE)
    }

    /// Expected line, or [`MISSING_LINE`].
    #[must_use]
    pub fn expected_display(&self) -> &str {
        self.expected_line.as_deref().unwrap_or(MISSING_LINE)
    }
}

/// Result of comparing two texts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffReport {
    /// Line count of the actual text.
    pub actual_line_count: usize,
    /// Line count of the expected text.
    pub expected_line_count: usize,
    /// Differing lines in index order. Empty iff the texts are identical.
    pub divergences: Vec<LineDivergence>,
}

impl DiffReport {
    /// Whether the texts were identical.
    #[must_use]
    pub fn is_identical(&self) -> bool {
        self.divergences.is_empty()
    }

    /// Indices of differing lines.
    #[must_use]
    pub fn divergent_indices(&self) -> Vec<usize> {
        self.divergences.iter().map(|d| d.index).collect()
    }
}

impl fmt::Display for DiffReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render_report(self))
    }
}

/// A character position: a real character or the end-of-line sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CharSlot {
    /// A character present at this position.
    Char(char),
    /// The line ended before this position.
    End,
}

impl fmt::Display for CharSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Char(c) => write!(f, "{c:?}"),
            Self::End => f.write_str(END_OF_LINE),
        }
    }
}

/// One differing character position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CharDivergence {
    /// Zero-based character position.
    pub position: usize,
    /// Character in the actual line.
    pub actual: CharSlot,
    /// Character in the expected line.
    pub expected: CharSlot,
}

/// Compare `actual` against `expected`.
#[must_use]
pub fn diff_text(actual: &str, expected: &str) -> DiffReport {
    let actual_lines: Vec<&str> = actual.split('\n').collect();
    let expected_lines: Vec<&str> = expected.split('\n').collect();
    let line_count = actual_lines.len().max(expected_lines.len());

    let divergences = (0..line_count)
        .filter_map(|index| {
            let a = actual_lines.get(index).copied();
            let e = expected_lines.get(index).copied();
            if a == e {
                return None;
            }
            let first_char_divergence = match (a, e) {
                (Some(a), Some(e)) => first_char_divergence(a, e),
                _ => None,
            };
            Some(LineDivergence {
                index,
                actual_line: a.map(str::to_string),
                expected_line: e.map(str::to_string),
                first_char_divergence,
            })
        })
        .collect();

    DiffReport {
        actual_line_count: actual_lines.len(),
        expected_line_count: expected_lines.len(),
        divergences,
    }
}

/// First character position where two lines differ, `None` if equal.
#[must_use]
pub fn first_char_divergence(actual_line: &str, expected_line: &str) -> Option<usize> {
    char_divergences(actual_line, expected_line, 1)
        .first()
        .map(|d| d.position)
}

/// The first `limit` differing character positions of two lines.
#[must_use]
pub fn char_divergences(actual_line: &str, expected_line: &str, limit: usize) -> Vec<CharDivergence> {
    let mut actual = actual_line.chars();
    let mut expected = expected_line.chars();
    let mut out = Vec::new();
    let mut position = 0;

    while out.len() < limit {
        let a = actual.next();
        let e = expected.next();
        if a.is_none() && e.is_none() {
            break;
        }
        if a != e {
            out.push(CharDivergence {
                position,
                actual: a.map_or(CharSlot::End, CharSlot::Char),
                expected: e.map_or(CharSlot::End, CharSlot::Char),
            });
        }
        position += 1;
    }
    out
}

/// Human-auditable rendering of a report: line counts, then each divergence
/// with both lines escaped and up to five character differences.
#[must_use]
pub fn render_report(report: &DiffReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "actual has {} lines, expected has {} lines",
        report.actual_line_count, report.expected_line_count
    );
    if report.is_identical() {
        out.push_str("no differences\n");
        return out;
    }
    let _ = writeln!(out, "{} line differences:", report.divergences.len());

    for d in &report.divergences {
        let _ = writeln!(out, "line {}:", d.index);
        let _ = writeln!(out, "  actual:   {}", escaped(d.actual_line.as_deref()));
        let _ = writeln!(out, "  expected: {}", escaped(d.expected_line.as_deref()));

        let (Some(a), Some(e)) = (&d.actual_line, &d.expected_line) else {
            continue;
        };
        let diffs = char_divergences(a, e, RENDERED_CHAR_DIFFS);
        let positions: Vec<String> = diffs.iter().map(|c| c.position.to_string()).collect();
        let _ = writeln!(out, "  character differences at positions [{}]", positions.join(", "));
        for c in &diffs {
            let _ = writeln!(
                out,
                "    pos {}: actual={} expected={}",
                c.position, c.actual, c.expected
            );
        }
    }
    out
}

fn escaped(line: Option<&str>) -> String {
    line.map_or_else(|| MISSING_LINE.to_string(), |l| format!("{l:?}"))
}

/// Verification failure: the texts differ. Carries the full report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{}", summary(.report))]
pub struct DiffMismatch {
    /// Positional detail of every divergence.
    pub report: DiffReport,
}

fn summary(report: &DiffReport) -> String {
    match report.divergences.first() {
        Some(first) => format!(
            "text differs on {} line(s); first at line {}{}",
            report.divergences.len(),
            first.index,
            first
                .first_char_divergence
                .map(|p| format!(", column {p}"))
                .unwrap_or_default()
        ),
        None => "text identical".to_string(),
    }
}

/// Compare and fail with the full report when the texts differ.
///
/// # Errors
///
/// Returns [`DiffMismatch`] when `actual != expected`.
pub fn verify_text(actual: &str, expected: &str) -> Result<(), DiffMismatch> {
    let report = diff_text(actual, expected);
    if report.is_identical() {
        Ok(())
    } else {
        Err(DiffMismatch { report })
    }
}
