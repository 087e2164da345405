//! Text diagnostics: byte/character accounting and hex dumps.
//!
//! Column-aligned kernel output goes wrong in ways that are invisible when
//! printed: a tab where spaces were expected, a stray `\r`, an ANSI escape,
//! a multi-byte character that shifts every column after it. The functions
//! here make those visible.

use std::fmt::Write as _;

use serde::Serialize;

/// Bytes per hex dump row.
pub const HEX_DUMP_ROW_WIDTH: usize = 16;

/// Width of the hex column in a dump row (`16 × "xx "` minus the final space,
/// padded by one).
const HEX_COLUMN_WIDTH: usize = HEX_DUMP_ROW_WIDTH * 3;

/// ANSI escape (`ESC`), the lead byte of terminal control sequences.
const ESCAPE: char = '\u{1b}';

/// Diagnostics for one text artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextDiagnostics {
    /// Length of the UTF-8 encoded form.
    pub byte_length: usize,
    /// Number of Unicode scalar values.
    pub char_length: usize,
    /// Contains an ANSI escape character.
    pub contains_control_sequences: bool,
    /// Contains `\t`.
    pub contains_tabs: bool,
    /// Contains `\r`.
    pub contains_carriage_returns: bool,
    /// Number of `' '` characters.
    pub space_count: usize,
    /// Number of `\n` characters.
    pub newline_count: usize,
    /// Number of `\t` characters.
    pub tab_count: usize,
    /// Number of `\r` characters.
    pub carriage_return_count: usize,
    #[serde(skip)]
    bytes: Vec<u8>,
}

impl TextDiagnostics {
    /// Hex dump of `length` bytes starting at `offset` of this text's UTF-8
    /// form. See [`hex_dump`].
    #[must_use]
    pub fn hex_dump(&self, offset: usize, length: usize) -> String {
        hex_dump(&self.bytes, offset, length)
    }

    /// The UTF-8 bytes the diagnostics were computed from.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Compute diagnostics for `text`.
#[must_use]
pub fn inspect_text(text: &str) -> TextDiagnostics {
    let mut space_count = 0;
    let mut newline_count = 0;
    let mut tab_count = 0;
    let mut carriage_return_count = 0;
    let mut contains_control_sequences = false;
    let mut char_length = 0;

    for ch in text.chars() {
        char_length += 1;
        match ch {
            ' ' => space_count += 1,
            '\n' => newline_count += 1,
            '\t' => tab_count += 1,
            '\r' => carriage_return_count += 1,
            ESCAPE => contains_control_sequences = true,
            _ => {}
        }
    }

    TextDiagnostics {
        byte_length: text.len(),
        char_length,
        contains_control_sequences,
        contains_tabs: tab_count > 0,
        contains_carriage_returns: carriage_return_count > 0,
        space_count,
        newline_count,
        tab_count,
        carriage_return_count,
        bytes: text.as_bytes().to_vec(),
    }
}

/// Render `bytes[offset..offset + length]` as a fixed-width hex dump.
///
/// One row per 16 bytes: a 4-digit hex address (absolute offset), the hex
/// bytes padded to a fixed column, and the printable-ASCII rendering with
/// `.` for anything outside `0x20..0x7f`. Every row ends with `\n`. The
/// range is clamped to the input; an empty range renders as `""`.
#[must_use]
pub fn hex_dump(bytes: &[u8], offset: usize, length: usize) -> String {
    let start = offset.min(bytes.len());
    let end = offset.saturating_add(length).min(bytes.len());
    let mut out = String::new();

    for (row_index, row) in bytes[start..end].chunks(HEX_DUMP_ROW_WIDTH).enumerate() {
        let address = start + row_index * HEX_DUMP_ROW_WIDTH;
        let hex_part = row
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join(" ");
        let ascii_part: String = row
            .iter()
            .map(|&b| {
                if (0x20..0x7f).contains(&b) {
                    char::from(b)
                } else {
                    '.'
                }
            })
            .collect();
        let _ = writeln!(
            out,
            "{address:04x}:  {hex_part:<HEX_COLUMN_WIDTH$}  {ascii_part}"
        );
    }
    out
}

/// Per-line summary used to eyeball spacing in tabular output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineBreakdown {
    /// Zero-based line index.
    pub index: usize,
    /// Number of characters on the line.
    pub char_count: usize,
    /// The line text.
    pub text: String,
    /// Code points of the first characters as space-separated hex.
    pub leading_hex: String,
    /// Whether `leading_hex` stops short of the full line.
    pub truncated: bool,
}

/// Break the first `max_lines` lines of `text` into [`LineBreakdown`]s,
/// rendering at most `hex_chars` leading code points per line.
#[must_use]
pub fn line_breakdown(text: &str, max_lines: usize, hex_chars: usize) -> Vec<LineBreakdown> {
    text.split('\n')
        .take(max_lines)
        .enumerate()
        .map(|(index, line)| {
            let char_count = line.chars().count();
            let leading_hex = line
                .chars()
                .take(hex_chars)
                .map(|c| format!("{:02x}", u32::from(c)))
                .collect::<Vec<_>>()
                .join(" ");
            LineBreakdown {
                index,
                char_count,
                text: line.to_string(),
                leading_hex,
                truncated: char_count > hex_chars,
            }
        })
        .collect()
}
