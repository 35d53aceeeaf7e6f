use crate::error::CoreError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Number of characters in every short code.
pub const CODE_LENGTH: usize = 8;

/// A content-addressed short code for an original URL.
///
/// Codes are the first eight characters of the URL-safe base64 encoding of
/// the MD5 digest of the URL bytes, so the same URL always maps to the same
/// code. Digest collisions are not resolved.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShortCode(String);

impl ShortCode {
    /// Derives the short code for `original_url`.
    ///
    /// # Examples
    ///
    /// ```
    /// use snip_core::ShortCode;
    ///
    /// let code = ShortCode::from_url("https://ya.ru");
    /// assert_eq!(code.as_str(), "6YGS4ZUF");
    /// ```
    pub fn from_url(original_url: &str) -> Self {
        let digest = Md5::digest(original_url.as_bytes());
        let mut encoded = URL_SAFE_NO_PAD.encode(digest);
        encoded.truncate(CODE_LENGTH);
        Self(encoded)
    }

    /// Creates a `ShortCode` after validating the input.
    ///
    /// Valid codes are exactly eight characters from the URL-safe base64
    /// alphabet `[a-zA-Z0-9_-]`.
    pub fn new(code: impl Into<String>) -> std::result::Result<Self, CoreError> {
        let code = code.into();
        Self::validate(&code)?;
        Ok(Self(code))
    }

    /// Creates a `ShortCode` without validation.
    ///
    /// Use this only for codes read back from a trusted store.
    pub fn new_unchecked(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Generates the full shortened URL based on the provided base URL.
    pub fn to_url(&self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self.0)
    }

    /// Returns the short code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(code: &str) -> std::result::Result<(), CoreError> {
        if code.len() != CODE_LENGTH {
            return Err(CoreError::InvalidShortCode(format!(
                "length must be {}, got {}",
                CODE_LENGTH,
                code.len()
            )));
        }

        if !code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(CoreError::InvalidShortCode(format!(
                "must contain only url-safe base64 characters: '{}'",
                code
            )));
        }

        Ok(())
    }
}

impl Display for ShortCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ShortCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_url_maps_to_known_code() {
        assert_eq!(ShortCode::from_url("https://ya.ru").as_str(), "6YGS4ZUF");
    }

    #[test]
    fn derivation_is_deterministic() {
        let first = ShortCode::from_url("https://example.com/some/path?q=1");
        let second = ShortCode::from_url("https://example.com/some/path?q=1");
        assert_eq!(first, second);
    }

    #[test]
    fn different_urls_get_different_codes() {
        let a = ShortCode::from_url("https://example.com/a");
        let b = ShortCode::from_url("https://example.com/b");
        assert_ne!(a, b);
    }

    #[test]
    fn derived_codes_use_url_safe_alphabet() {
        // md5("https://example.com") encodes to "yYTQaq--..." in the url-safe alphabet
        let code = ShortCode::from_url("https://example.com");
        assert_eq!(code.as_str(), "yYTQaq--");
        assert!(ShortCode::new(code.as_str()).is_ok());
    }

    #[test]
    fn valid_codes() {
        assert!(ShortCode::new("6YGS4ZUF").is_ok());
        assert!(ShortCode::new("ab-_CD12").is_ok());
    }

    #[test]
    fn wrong_length() {
        assert!(ShortCode::new("").is_err());
        assert!(ShortCode::new("abc").is_err());
        assert!(ShortCode::new("abcdefghi").is_err());
    }

    #[test]
    fn invalid_characters() {
        assert!(ShortCode::new("abc def1").is_err());
        assert!(ShortCode::new("abc/def1").is_err());
        assert!(ShortCode::new("abc+def1").is_err());
    }

    #[test]
    fn to_url_joins_base() {
        let code = ShortCode::new("6YGS4ZUF").unwrap();
        assert_eq!(
            code.to_url("http://localhost:8080"),
            "http://localhost:8080/6YGS4ZUF"
        );
        assert_eq!(
            code.to_url("http://localhost:8080/"),
            "http://localhost:8080/6YGS4ZUF"
        );
    }

    #[test]
    fn serializes_as_plain_string() {
        let code = ShortCode::new("6YGS4ZUF").unwrap();
        assert_eq!(serde_json::to_string(&code).unwrap(), "\"6YGS4ZUF\"");
    }
}
