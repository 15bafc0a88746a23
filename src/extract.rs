//! Finding a person's name in OCR output.
//!
//! ID-style documents label the name field in one of two ways. Either the
//! label `姓名` shares a line with the name (or sits alone on the line just
//! above it), or the label is split into `姓` and `名` on two consecutive
//! lines, with the name on the line after that. We scan the lines in order
//! and take the first match.

use crate::ocr::RecognizedLine;

/// The combined "name" label.
const NAME_LABEL: &str = "姓名";

/// The "surname" half of a split label, with and without colons.
const SURNAME_LABELS: &[&str] = &["姓", "姓：", "姓:"];

/// The "given name" half of a split label, with and without colons.
const GIVEN_NAME_LABELS: &[&str] = &["名", "名：", "名:"];

/// Extract a person's name from recognized lines, if any of our label
/// patterns match.
pub fn extract_name(lines: &[RecognizedLine]) -> Option<String> {
    (0..lines.len())
        .find_map(|i| inline_label(lines, i).or_else(|| split_label(lines, i)))
}

/// The trimmed text of line `i`, if it exists.
fn line_text(lines: &[RecognizedLine], i: usize) -> Option<&str> {
    lines.get(i).map(|line| line.text.trim())
}

/// The trimmed text of line `i`, if it exists and isn't blank.
fn non_empty_line(lines: &[RecognizedLine], i: usize) -> Option<String> {
    line_text(lines, i)
        .filter(|text| !text.is_empty())
        .map(str::to_owned)
}

/// `姓名张三` on one line, or `姓名` followed by `张三` on the next.
fn inline_label(lines: &[RecognizedLine], i: usize) -> Option<String> {
    let text = line_text(lines, i)?;
    if !text.contains(NAME_LABEL) {
        return None;
    }
    let rest = text.replace(NAME_LABEL, "");
    let rest = rest.trim();
    if !rest.is_empty() {
        return Some(rest.to_owned());
    }
    non_empty_line(lines, i + 1)
}

/// `姓`, `名` and `张三` on three consecutive lines.
fn split_label(lines: &[RecognizedLine], i: usize) -> Option<String> {
    let surname = line_text(lines, i)?;
    if !SURNAME_LABELS.iter().any(|label| *label == surname) {
        return None;
    }
    let given_name = line_text(lines, i + 1)?;
    if !GIVEN_NAME_LABELS.iter().any(|label| *label == given_name) {
        return None;
    }
    non_empty_line(lines, i + 2)
}
