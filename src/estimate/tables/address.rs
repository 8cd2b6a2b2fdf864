//! Conversion between zero-based [`Rectangle`]s and one-based
//! `Sheet!A1:B2` addresses.

use crate::estimate::tables::error::{Result, TableError};
use crate::estimate::tables::model::Rectangle;

/// Encodes a one-based column number as bijective base-26 letters
/// (1 → `A`, 26 → `Z`, 27 → `AA`).
pub fn column_letters(column: u32) -> Result<String> {
    if column == 0 {
        return Err(TableError::InvalidAddress(
            "column numbers are one-based".to_string(),
        ));
    }

    Ok(encode_column(column))
}

/// Decodes column letters into a one-based column number.
pub fn column_number(letters: &str) -> Result<u32> {
    if letters.is_empty() {
        return Err(TableError::InvalidAddress("empty column letters".to_string()));
    }

    letters.chars().try_fold(0u32, |acc, ch| {
        if !ch.is_ascii_alphabetic() {
            return Err(TableError::InvalidAddress(format!(
                "invalid column letters '{letters}'"
            )));
        }
        let digit = ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1;
        acc.checked_mul(26)
            .and_then(|value| value.checked_add(digit))
            .ok_or_else(|| TableError::InvalidAddress(format!("column '{letters}' out of range")))
    })
}

/// Formats a rectangle as a one-based address on the given sheet.
///
/// The exclusive end row is numerically equal to the inclusive one-based last
/// row, so only the end column needs adjusting.
pub fn to_address(rect: &Rectangle, sheet_title: &str) -> String {
    // Rectangle guarantees start_col < end_col, so both columns are >= 1.
    let start = encode_column(rect.start_col() + 1);
    let end = encode_column(rect.end_col());
    format!(
        "{}!{}{}:{}{}",
        quote_sheet_title(sheet_title),
        start,
        rect.start_row() + 1,
        end,
        rect.end_row()
    )
}

/// Parses a `Sheet!A1:B2` (or `Sheet!A1`) address into its sheet title and
/// rectangle.
pub fn to_rectangle(address: &str) -> Result<(String, Rectangle)> {
    let invalid = || TableError::InvalidAddress(address.to_string());

    let (title, cells) = split_sheet_title(address).ok_or_else(invalid)?;
    let (first, last) = match cells.split_once(':') {
        Some((first, last)) => (first, last),
        None => (cells, cells),
    };

    let (start_col, start_row) = parse_cell(first).ok_or_else(invalid)?;
    let (end_col, end_row) = parse_cell(last).ok_or_else(invalid)?;
    if end_col < start_col || end_row < start_row {
        return Err(invalid());
    }

    let rect = Rectangle::new(start_row - 1, end_row, start_col - 1, end_col).ok_or_else(invalid)?;
    Ok((title, rect))
}

/// Letters for a column already known to be one-based.
fn encode_column(column: u32) -> String {
    let mut letters = Vec::new();
    let mut n = column;
    while n > 0 {
        n -= 1;
        letters.push(char::from(b'A' + (n % 26) as u8));
        n /= 26;
    }
    letters.into_iter().rev().collect()
}

fn quote_sheet_title(title: &str) -> String {
    let plain = !title.is_empty() && title.chars().all(|ch| ch.is_alphanumeric() || ch == '_');
    if plain {
        title.to_string()
    } else {
        format!("'{}'", title.replace('\'', "''"))
    }
}

fn split_sheet_title(address: &str) -> Option<(String, &str)> {
    if let Some(rest) = address.strip_prefix('\'') {
        let mut title = String::new();
        let mut chars = rest.char_indices();
        while let Some((idx, ch)) = chars.next() {
            if ch != '\'' {
                title.push(ch);
                continue;
            }
            match rest[idx + 1..].chars().next() {
                Some('\'') => {
                    title.push('\'');
                    chars.next();
                }
                Some('!') => return Some((title, &rest[idx + 2..])),
                _ => return None,
            }
        }
        None
    } else {
        let (title, cells) = address.rsplit_once('!')?;
        (!title.is_empty()).then(|| (title.to_string(), cells))
    }
}

/// Returns the one-based `(column, row)` of an `A1` reference.
fn parse_cell(cell: &str) -> Option<(u32, u32)> {
    let cell = cell.trim().replace('$', "");
    let split = cell.find(|ch: char| ch.is_ascii_digit())?;
    let (letters, digits) = cell.split_at(split);
    let column = column_number(letters).ok()?;
    let row: u32 = digits.parse().ok()?;
    (row > 0).then_some((column, row))
}
