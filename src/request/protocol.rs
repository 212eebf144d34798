//! HTTP/2 vs HTTP/3 selection per URL.
//!
//! Some platforms serve noticeably faster over HTTP/3, but signed-URL
//! redirect targets (e.g. Fantia's S3-backed download links) only speak
//! HTTP/2. Selection is resolved from a static allow-list of known-good
//! prefixes, with the signed-URL patterns checked first as overrides.
//! The enum makes "exactly one protocol" hold by construction.

use std::sync::LazyLock;

use regex::Regex;

use crate::platform::Platform;

/// Fantia album-image URLs redirect to a signed AWS S3 URL that does not
/// support HTTP/3.
#[allow(clippy::expect_used)] // static pattern, safe to panic
static FANTIA_ALBUM_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://fantia\.jp/posts/\d+/album_image").expect("album regex is valid")
});

/// Fantia post-download URLs redirect to a signed AWS S3 URL that does not
/// support HTTP/3.
#[allow(clippy::expect_used)] // static pattern, safe to panic
static FANTIA_DOWNLOAD_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://fantia\.jp/posts/\d+/download/\d+").expect("download regex is valid")
});

/// URL prefixes known to support HTTP/3.
const HTTP3_SUPPORTED_PREFIXES: [&str; 4] = [
    "https://www.pixiv.net",
    "https://app-api.pixiv.net",
    "https://www.google.com",
    "https://drive.google.com",
];

/// The HTTP protocol a request will be sent over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolChoice {
    /// HTTP/2 (the default).
    H2,
    /// HTTP/3 over QUIC, for endpoints on the allow-list.
    H3,
}

impl ProtocolChoice {
    /// Resolves the protocol for a URL.
    ///
    /// Signed-download redirect targets force [`ProtocolChoice::H2`] even
    /// when the origin would otherwise qualify for HTTP/3; URLs matching
    /// the HTTP/3 allow-list get [`ProtocolChoice::H3`]; everything else
    /// falls back to HTTP/2.
    #[must_use]
    pub fn resolve(url: &str) -> Self {
        if FANTIA_DOWNLOAD_URL.is_match(url) || FANTIA_ALBUM_URL.is_match(url) {
            return Self::H2;
        }
        if HTTP3_SUPPORTED_PREFIXES
            .iter()
            .any(|prefix| url.starts_with(prefix))
        {
            return Self::H3;
        }
        Self::H2
    }

    /// Resolves the protocol for a platform's page vs API endpoints.
    ///
    /// API hosts for Fantia and Pixiv's web API do not speak HTTP/3 even
    /// though their page hosts do.
    #[must_use]
    pub fn for_platform(platform: Platform, is_api: bool) -> Self {
        match platform {
            Platform::Fantia | Platform::Pixiv => {
                if is_api {
                    Self::H2
                } else {
                    Self::H3
                }
            }
            Platform::PixivFanbox | Platform::Kemono => Self::H2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_defaults_to_h2() {
        assert_eq!(
            ProtocolChoice::resolve("https://kemono.party/api/creators"),
            ProtocolChoice::H2
        );
    }

    #[test]
    fn test_resolve_allow_list_selects_h3() {
        assert_eq!(
            ProtocolChoice::resolve("https://www.pixiv.net/artworks/1234"),
            ProtocolChoice::H3
        );
        assert_eq!(
            ProtocolChoice::resolve("https://drive.google.com/uc?id=abc"),
            ProtocolChoice::H3
        );
    }

    #[test]
    fn test_resolve_signed_download_urls_force_h2() {
        assert_eq!(
            ProtocolChoice::resolve("https://fantia.jp/posts/123456/download/7890"),
            ProtocolChoice::H2
        );
        assert_eq!(
            ProtocolChoice::resolve("https://fantia.jp/posts/123456/album_image?query=1"),
            ProtocolChoice::H2
        );
    }

    #[test]
    fn test_resolve_plain_fantia_post_is_h2() {
        // Not a signed pattern and not on the H3 allow-list.
        assert_eq!(
            ProtocolChoice::resolve("https://fantia.jp/posts/123456"),
            ProtocolChoice::H2
        );
    }

    #[test]
    fn test_for_platform_api_endpoints_use_h2() {
        assert_eq!(
            ProtocolChoice::for_platform(Platform::Pixiv, true),
            ProtocolChoice::H2
        );
        assert_eq!(
            ProtocolChoice::for_platform(Platform::Pixiv, false),
            ProtocolChoice::H3
        );
        assert_eq!(
            ProtocolChoice::for_platform(Platform::Fantia, false),
            ProtocolChoice::H3
        );
    }

    #[test]
    fn test_for_platform_fanbox_and_kemono_are_h2() {
        assert_eq!(
            ProtocolChoice::for_platform(Platform::PixivFanbox, false),
            ProtocolChoice::H2
        );
        assert_eq!(
            ProtocolChoice::for_platform(Platform::Kemono, false),
            ProtocolChoice::H2
        );
    }
}
