/// Parses filename stems that encode a Unix timestamp.
///
/// A stem qualifies only if it consists solely of ASCII digits and is
/// exactly 10 characters (seconds since the epoch) or 13 characters
/// (milliseconds, truncated to whole seconds by dropping the last three
/// digits). Everything else is rejected: letters, punctuation, a leading
/// sign, any other digit count.
pub fn parse_stem(stem: &str) -> Option<i64> {
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    match stem.len() {
        10 => stem.parse().ok(),
        13 => stem[..10].parse().ok(),
        _ => None,
    }
}
