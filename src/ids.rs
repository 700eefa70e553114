//! Sequential reference identifiers (`pos-0001`, `neg-0042`, ...).
//!
//! The next number is derived from the filenames already present in the
//! polarity folder. Nothing reserves the number between the listing and the
//! write, so two concurrent submissions can be handed the same id.

/// Extract `N` from `{prefix}-N.json`. Other names yield `None`.
pub fn parse_number(name: &str, prefix: &str) -> Option<u32> {
    let digits = name
        .strip_prefix(prefix)?
        .strip_prefix('-')?
        .strip_suffix(".json")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Highest existing number plus one; `1` for an empty folder.
pub fn next_number<'a>(names: impl IntoIterator<Item = &'a str>, prefix: &str) -> u32 {
    names
        .into_iter()
        .filter_map(|name| parse_number(name, prefix))
        .max()
        .unwrap_or(0)
        + 1
}

/// Render an id, zero padded to four digits.
pub fn format_id(prefix: &str, number: u32) -> String {
    format!("{prefix}-{number:04}")
}
