//! Display name normalization.

/// Reduce a full name to `"<first> <last>"`.
///
/// The name is split on whitespace. A single-token name is repeated
/// (`"Cher"` becomes `"Cher Cher"`). Returns `None` when the name has no
/// tokens at all.
#[must_use]
pub fn normalize_display_name(raw: &str) -> Option<String> {
    let mut tokens = raw.split_whitespace();
    let first = tokens.next()?;
    let last = tokens.last().unwrap_or(first);
    Some(format!("{first} {last}"))
}
