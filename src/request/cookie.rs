//! Session cookies supplied by the caller.

use serde::{Deserialize, Serialize};

/// A cookie attached to outgoing requests.
///
/// Cookies are matched against a request by substring: the cookie is sent
/// only when its `domain` appears in the request URL. This mirrors how
/// platform session cookies are scoped (e.g. a `fantia.jp` cookie applies
/// to both the page host and its API paths).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: String,
    /// Domain the cookie is scoped to.
    pub domain: String,
}

impl SessionCookie {
    /// Creates a cookie.
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.into(),
        }
    }

    /// Returns `true` if this cookie applies to the given URL.
    #[must_use]
    pub fn matches_url(&self, url: &str) -> bool {
        url.contains(&self.domain)
    }
}

/// Builds a `Cookie` header value from the cookies that apply to `url`.
///
/// Returns `None` when no cookie matches, so callers can skip the header
/// entirely.
#[must_use]
pub(crate) fn cookie_header_for(url: &str, cookies: &[SessionCookie]) -> Option<String> {
    let applicable: Vec<String> = cookies
        .iter()
        .filter(|cookie| cookie.matches_url(url))
        .map(|cookie| format!("{}={}", cookie.name, cookie.value))
        .collect();
    if applicable.is_empty() {
        None
    } else {
        Some(applicable.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_matches_by_domain_substring() {
        let cookie = SessionCookie::new("_session_id", "abc", "fantia.jp");
        assert!(cookie.matches_url("https://fantia.jp/posts/123"));
        assert!(cookie.matches_url("https://cc.fantia.jp/uploads/x.jpg"));
        assert!(!cookie.matches_url("https://www.pixiv.net/artworks/1"));
    }

    #[test]
    fn test_cookie_header_joins_applicable_cookies() {
        let cookies = vec![
            SessionCookie::new("_session_id", "abc", "fantia.jp"),
            SessionCookie::new("PHPSESSID", "def", "pixiv.net"),
            SessionCookie::new("theme", "dark", "fantia.jp"),
        ];
        let header = cookie_header_for("https://fantia.jp/posts/1", &cookies);
        assert_eq!(header.as_deref(), Some("_session_id=abc; theme=dark"));
    }

    #[test]
    fn test_cookie_header_none_when_nothing_matches() {
        let cookies = vec![SessionCookie::new("session", "abc", "kemono.party")];
        assert_eq!(cookie_header_for("https://fantia.jp/posts/1", &cookies), None);
    }
}
