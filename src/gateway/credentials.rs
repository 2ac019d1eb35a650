//! HTTP basic credentials for the internal completion endpoint

use crate::config::InternalApiConfig;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use ring::constant_time::verify_slices_are_equal;

#[derive(Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl BasicCredentials {
    pub fn new(user: &str, password: &str) -> Self {
        Self {
            user: user.to_string(),
            password: password.to_string(),
        }
    }

    /// Decode an `Authorization: Basic <base64(user:password)>` header value.
    pub fn from_header(value: &str) -> Option<Self> {
        let (scheme, encoded) = value.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return None;
        }
        let decoded = STANDARD.decode(encoded.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (user, password) = decoded.split_once(':')?;
        Some(Self::new(user, password))
    }

    pub fn to_header(&self) -> String {
        format!(
            "Basic {}",
            STANDARD.encode(format!("{}:{}", self.user, self.password))
        )
    }

    /// Compare against the shared internal credential in constant time.
    pub fn matches(&self, expected: &InternalApiConfig) -> bool {
        let user_ok = verify_slices_are_equal(self.user.as_bytes(), expected.user.as_bytes()).is_ok();
        let password_ok =
            verify_slices_are_equal(self.password.as_bytes(), expected.password.as_bytes()).is_ok();
        user_ok & password_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        let credentials = BasicCredentials::new("internal_user", "s3cr:et");
        let parsed = BasicCredentials::from_header(&credentials.to_header()).unwrap();
        assert_eq!(parsed, credentials);
    }

    #[test]
    fn non_basic_schemes_are_ignored() {
        assert_eq!(BasicCredentials::from_header("Bearer abc"), None);
        assert_eq!(BasicCredentials::from_header("Basic !!!"), None);
    }

    #[test]
    fn only_exact_credentials_match() {
        let expected = InternalApiConfig::default();
        assert!(BasicCredentials::new(&expected.user, &expected.password).matches(&expected));
        assert!(!BasicCredentials::new(&expected.user, "wrong").matches(&expected));
        assert!(!BasicCredentials::new("", "").matches(&expected));
    }

    #[test]
    fn debug_output_hides_the_password() {
        let rendered = format!("{:?}", BasicCredentials::new("u", "hunter2"));
        assert!(!rendered.contains("hunter2"));
    }
}
