//! Cache categories.
//!
//! The worker keeps one store per category and decides which one a resource
//! lands in. The coordinator only names categories when clearing or reading
//! counts.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One of the worker's cache stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheCategory {
    /// Application shell assets
    Static,
    /// Song streams
    Audio,
    /// Cover art and other images
    Images,
    /// Metadata API responses
    Api,
}

impl CacheCategory {
    /// Every category, in report order.
    pub const ALL: [CacheCategory; 4] = [
        CacheCategory::Static,
        CacheCategory::Audio,
        CacheCategory::Images,
        CacheCategory::Api,
    ];

    /// Wire tag of the category.
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheCategory::Static => "static",
            CacheCategory::Audio => "audio",
            CacheCategory::Images => "images",
            CacheCategory::Api => "api",
        }
    }
}

impl fmt::Display for CacheCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing a tag outside the closed category set.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown cache category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for CacheCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CacheCategory::ALL
            .into_iter()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_parse_back() {
        for category in CacheCategory::ALL {
            assert_eq!(category.as_str().parse::<CacheCategory>(), Ok(category));
        }
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        assert_eq!(
            "video".parse::<CacheCategory>(),
            Err(UnknownCategory("video".to_string()))
        );
        assert!("Audio".parse::<CacheCategory>().is_err());
    }

    #[test]
    fn test_serde_uses_lowercase_tag() {
        assert_eq!(
            serde_json::to_value(CacheCategory::Images).unwrap(),
            serde_json::json!("images")
        );
    }
}
