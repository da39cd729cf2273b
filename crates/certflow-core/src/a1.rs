//! A1 notation helpers for spreadsheet ranges.

/// Last column read by a full-sheet load.
pub const LAST_READ_COLUMN: &str = "Z";

/// Converts a zero-based column index to its letter name (`0 -> A`, `26 -> AA`).
pub fn column_letters(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Quotes a sheet name for use in a range reference.
pub fn quote_sheet(sheet: &str) -> String {
    format!("'{}'", sheet.replace('\'', "''"))
}

/// Range covering every row of columns `A..Z`.
pub fn full_sheet(sheet: &str) -> String {
    format!("{}!A1:{}", quote_sheet(sheet), LAST_READ_COLUMN)
}

/// Top-left anchor cell of a sheet.
pub fn anchor(sheet: &str) -> String {
    format!("{}!A1", quote_sheet(sheet))
}

/// A vertical span of one column between two sheet rows (inclusive).
pub fn column_span(sheet: &str, column: usize, first_row: u32, last_row: u32) -> String {
    let letters = column_letters(column);
    if first_row == last_row {
        format!("{}!{}{}", quote_sheet(sheet), letters, first_row)
    } else {
        format!(
            "{}!{}{}:{}{}",
            quote_sheet(sheet),
            letters,
            first_row,
            letters,
            last_row
        )
    }
}
