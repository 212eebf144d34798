//! Closed enum of supported content platforms.
//!
//! Platform strings enter the system exactly once, at the boundary where a
//! caller names a platform; parsing failures are typed construction errors
//! rather than panics deep inside request logic.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Error returned when a platform string is not one of the supported sites.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlatformError {
    /// The given platform id is not supported.
    #[error("unsupported platform: {0:?}")]
    Unsupported(String),
}

/// A content platform this pipeline can download from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// Fantia (fantia.jp).
    Fantia,
    /// Pixiv (www.pixiv.net).
    Pixiv,
    /// Pixiv Fanbox (www.fanbox.cc).
    PixivFanbox,
    /// Kemono (kemono.party / kemono.su).
    Kemono,
}

impl Platform {
    /// All supported platforms.
    pub const ALL: [Self; 4] = [Self::Fantia, Self::Pixiv, Self::PixivFanbox, Self::Kemono];

    /// Canonical lowercase id, used as the namespace in cache keys.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fantia => "fantia",
            Self::Pixiv => "pixiv",
            Self::PixivFanbox => "fanbox",
            Self::Kemono => "kemono",
        }
    }

    /// Human-readable platform name for user-facing output.
    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            Self::Fantia => "Fantia",
            Self::Pixiv => "Pixiv",
            Self::PixivFanbox => "Pixiv Fanbox",
            Self::Kemono => "Kemono",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fantia" => Ok(Self::Fantia),
            "pixiv" => Ok(Self::Pixiv),
            "fanbox" => Ok(Self::PixivFanbox),
            "kemono" => Ok(Self::Kemono),
            other => Err(PlatformError::Unsupported(other.to_string())),
        }
    }
}
