//! Utility functions shared by the request builders and validators.

use chrono::NaiveDateTime;

/// Timestamp layout the gateway expects in the `timestamp` parameter.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Formats a timestamp the way the gateway's public parameters require.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use paygate::utils::format_timestamp;
///
/// let ts = NaiveDate::from_ymd_opt(2024, 3, 9)
///     .unwrap()
///     .and_hms_opt(8, 5, 0)
///     .unwrap();
/// assert_eq!(format_timestamp(ts), "2024-03-09 08:05:00");
/// ```
pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Escapes text for use inside a double-quoted HTML attribute.
///
/// # Examples
///
/// ```
/// use paygate::utils::escape_html_attr;
///
/// assert_eq!(escape_html_attr(r#"{"a":"<b>"}"#), "{&quot;a&quot;:&quot;&lt;b&gt;&quot;}");
/// ```
pub fn escape_html_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Percent-encodes a single query component (`application/x-www-form-urlencoded`).
pub fn url_encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Constant-time string comparison.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_format_timestamp() {
        let ts = NaiveDate::from_ymd_opt(2023, 12, 31)
            .unwrap()
            .and_hms_opt(23, 59, 58)
            .unwrap();
        assert_eq!(format_timestamp(ts), "2023-12-31 23:59:58");
    }

    #[test]
    fn test_escape_html_attr() {
        assert_eq!(escape_html_attr("plain"), "plain");
        assert_eq!(escape_html_attr("a&b"), "a&amp;b");
        assert_eq!(escape_html_attr("it's"), "it&#39;s");
    }

    #[test]
    fn test_url_encode() {
        assert_eq!(url_encode("2024-01-01 10:00:00"), "2024-01-01+10%3A00%3A00");
        assert_eq!(url_encode("a=b&c"), "a%3Db%26c");
        assert_eq!(url_encode("abc"), "abc");
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("hello", "hello"));
        assert!(!constant_time_eq("hello", "world"));
        assert!(!constant_time_eq("hello", "hello world"));
    }
}
