//! Minimal cookie header handling for token persistence.
//!
//! Only the pieces the token storages need: parsing an inbound `Cookie`
//! header and serializing a `Set-Cookie` value. Values are percent-encoded
//! so the JSON token record survives the cookie-octet restrictions of
//! RFC 6265.

use std::collections::HashMap;

/// Attributes applied to every token cookie this crate writes.
#[derive(Debug, Clone)]
pub struct CookieOptions {
    pub path: &'static str,
    pub same_site: &'static str,
    /// `Some(0)` expires the cookie immediately (removal).
    pub max_age: Option<u64>,
}

impl CookieOptions {
    pub fn strict() -> Self {
        Self {
            path: "/",
            same_site: "Strict",
            max_age: None,
        }
    }

    pub fn removal() -> Self {
        Self {
            max_age: Some(0),
            ..Self::strict()
        }
    }
}

/// Parse a `Cookie` request header into name/value pairs. Malformed
/// segments are skipped; values that fail to percent-decode are kept raw.
pub fn parse_cookie_header(header: &str) -> HashMap<String, String> {
    let mut cookies = HashMap::new();
    for pair in header.split(';') {
        let Some((name, value)) = pair.split_once('=') else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        let value = value.trim();
        let value = urlencoding::decode(value)
            .map(|decoded| decoded.into_owned())
            .unwrap_or_else(|_| value.to_string());
        cookies.entry(name.to_string()).or_insert(value);
    }
    cookies
}

/// Serialize a `Set-Cookie` header value.
pub fn serialize_cookie(name: &str, value: &str, options: &CookieOptions) -> String {
    let mut cookie = format!("{}={}", name, urlencoding::encode(value));
    cookie.push_str("; Path=");
    cookie.push_str(options.path);
    cookie.push_str("; SameSite=");
    cookie.push_str(options.same_site);
    if let Some(max_age) = options.max_age {
        cookie.push_str("; Max-Age=");
        cookie.push_str(&max_age.to_string());
    }
    cookie
}

#[cfg(test)]
mod tests {
    use super::{CookieOptions, parse_cookie_header, serialize_cookie};

    #[test]
    fn parses_multiple_cookies() {
        let cookies = parse_cookie_header("a=1; b=two; c=%7B%22x%22%3A1%7D");
        assert_eq!(cookies.get("a").unwrap(), "1");
        assert_eq!(cookies.get("b").unwrap(), "two");
        assert_eq!(cookies.get("c").unwrap(), r#"{"x":1}"#);
    }

    #[test]
    fn skips_malformed_segments_and_keeps_first_value() {
        let cookies = parse_cookie_header("orphan; a=1; a=2; =empty");
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies.get("a").unwrap(), "1");
    }

    #[test]
    fn serializes_with_attributes() {
        let cookie = serialize_cookie("token", r#"{"a":1}"#, &CookieOptions::strict());
        assert_eq!(cookie, "token=%7B%22a%22%3A1%7D; Path=/; SameSite=Strict");
    }

    #[test]
    fn removal_sets_max_age_zero() {
        let cookie = serialize_cookie("token", "deleted", &CookieOptions::removal());
        assert!(cookie.ends_with("; Max-Age=0"));
    }

    #[test]
    fn serialize_parse_round_trip() {
        let value = r#"{"access_token":"t","scope":"read write"}"#;
        let cookie = serialize_cookie("token", value, &CookieOptions::strict());
        let header = cookie.split(';').next().unwrap();
        let parsed = parse_cookie_header(header);
        assert_eq!(parsed.get("token").unwrap(), value);
    }
}
