//! Query truncation for logs and error text

use std::borrow::Cow;

/// Maximum length in bytes of a query included in an error or log line.
pub const MAX_QUERY_LOG_LEN: usize = 512;

/// Marker appended to a query that was shortened.
pub const TRUNCATION_TEXT: &str = " [TRUNCATED]";

/// Truncate `query` to [`MAX_QUERY_LOG_LEN`] bytes.
pub fn truncate_for_log(query: &str) -> Cow<'_, str> {
    truncate_query(query, MAX_QUERY_LOG_LEN)
}

/// Truncate `query` so the result is at most `max` bytes, marker included.
///
/// A `max` of 0 disables truncation. When `max` is too small to hold the
/// marker, the query is cut to `max` bytes without one. The cut is moved back
/// to the nearest char boundary so the result is always valid UTF-8.
pub fn truncate_query(query: &str, max: usize) -> Cow<'_, str> {
    if max == 0 || query.len() <= max {
        return Cow::Borrowed(query);
    }
    if max <= TRUNCATION_TEXT.len() {
        return Cow::Borrowed(&query[..floor_char_boundary(query, max)]);
    }
    let cut = floor_char_boundary(query, max - TRUNCATION_TEXT.len());
    Cow::Owned(format!("{}{}", &query[..cut], TRUNCATION_TEXT))
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}
