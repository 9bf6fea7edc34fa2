//! # Worker Message Protocol
//!
//! Commands the coordinator sends to the cache worker and the replies the
//! worker answers on a call's reply port.
//!
//! ## Wire format
//!
//! Commands are JSON objects tagged by `type`:
//!
//! ```text
//! { "type": "CACHE_AUDIO", "url": "/api/songs/42/stream" }
//! { "type": "CLEAR_CACHE", "cacheName": "audio" }
//! { "type": "GET_CACHE_STATUS" }
//! ```
//!
//! Replies:
//!
//! ```text
//! { "type": "CACHE_STATUS", "static": 3, "audio": 7, "images": 2, "api": 1 }
//! { "musicCacheSize": 2, "cacheEntries": ["https://host/api/songs/1/stream", ...] }
//! { "error": "..." }
//! { "success": true }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;

use bridge_traits::WorkerMessage;

use crate::category::CacheCategory;
use crate::error::{CacheError, Result};

/// `type` tag of a status reply.
pub const STATUS_REPLY_TYPE: &str = "CACHE_STATUS";

/// A message for the cache worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CacheCommand {
    /// Fetch and store an audio resource.
    CacheAudio { url: String },
    /// Fetch and store an image resource.
    CacheImage { url: String },
    /// Drop one category store.
    ClearCache {
        #[serde(rename = "cacheName")]
        cache_name: CacheCategory,
    },
    /// Drop every category store.
    ClearAllCaches,
    /// Ask for per-category entry counts.
    GetCacheStatus,
    /// Ask for the cached audio entries.
    GetCacheStats,
    /// Drop the audio store and confirm.
    ClearMusicCache,
}

impl CacheCommand {
    pub fn kind(&self) -> CommandKind {
        match self {
            CacheCommand::CacheAudio { .. } => CommandKind::CacheAudio,
            CacheCommand::CacheImage { .. } => CommandKind::CacheImage,
            CacheCommand::ClearCache { .. } => CommandKind::ClearCache,
            CacheCommand::ClearAllCaches => CommandKind::ClearAllCaches,
            CacheCommand::GetCacheStatus => CommandKind::GetCacheStatus,
            CacheCommand::GetCacheStats => CommandKind::GetCacheStats,
            CacheCommand::ClearMusicCache => CommandKind::ClearMusicCache,
        }
    }

    /// Whether the worker answers this command on a reply port.
    pub fn expects_reply(&self) -> bool {
        self.kind().expects_reply()
    }

    /// Encode for the transport.
    pub fn to_message(&self) -> Result<WorkerMessage> {
        Ok(serde_json::to_value(self)?)
    }

    /// Decode a message received by a worker.
    pub fn from_message(message: WorkerMessage) -> Result<Self> {
        serde_json::from_value(message).map_err(|e| CacheError::MalformedReply(e.to_string()))
    }
}

/// Discriminant of a [`CacheCommand`], cheap to copy into logs and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    CacheAudio,
    CacheImage,
    ClearCache,
    ClearAllCaches,
    GetCacheStatus,
    GetCacheStats,
    ClearMusicCache,
}

impl CommandKind {
    /// Wire tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::CacheAudio => "CACHE_AUDIO",
            CommandKind::CacheImage => "CACHE_IMAGE",
            CommandKind::ClearCache => "CLEAR_CACHE",
            CommandKind::ClearAllCaches => "CLEAR_ALL_CACHES",
            CommandKind::GetCacheStatus => "GET_CACHE_STATUS",
            CommandKind::GetCacheStats => "GET_CACHE_STATS",
            CommandKind::ClearMusicCache => "CLEAR_MUSIC_CACHE",
        }
    }

    pub fn expects_reply(&self) -> bool {
        matches!(
            self,
            CommandKind::GetCacheStatus | CommandKind::GetCacheStats | CommandKind::ClearMusicCache
        )
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entry counts per category at the moment the worker answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CacheStatusReport {
    #[serde(rename = "static")]
    pub static_assets: u64,
    pub audio: u64,
    pub images: u64,
    pub api: u64,
}

impl CacheStatusReport {
    pub fn count(&self, category: CacheCategory) -> u64 {
        match category {
            CacheCategory::Static => self.static_assets,
            CacheCategory::Audio => self.audio,
            CacheCategory::Images => self.images,
            CacheCategory::Api => self.api,
        }
    }

    pub fn total(&self) -> u64 {
        CacheCategory::ALL.iter().map(|c| self.count(*c)).sum()
    }

    /// `(category, count)` pairs in report order.
    pub fn iter(&self) -> impl Iterator<Item = (CacheCategory, u64)> + '_ {
        CacheCategory::ALL.into_iter().map(|c| (c, self.count(c)))
    }

    /// Parse a status reply. A `type` other than `CACHE_STATUS` or a missing
    /// count is malformed.
    pub fn from_reply(reply: WorkerMessage) -> Result<Self> {
        if let Some(tag) = reply.get("type") {
            if tag.as_str() != Some(STATUS_REPLY_TYPE) {
                return Err(CacheError::MalformedReply(format!(
                    "unexpected status reply type {}",
                    tag
                )));
            }
        }
        serde_json::from_value(reply).map_err(|e| CacheError::MalformedReply(e.to_string()))
    }

    /// Encode as the worker's status reply.
    pub fn to_reply(&self) -> WorkerMessage {
        json!({
            "type": STATUS_REPLY_TYPE,
            "static": self.static_assets,
            "audio": self.audio,
            "images": self.images,
            "api": self.api,
        })
    }
}

/// Cached audio entries as reported by the controlling worker.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatsReport {
    pub music_cache_size: u64,
    pub cache_entries: Vec<String>,
}

impl CacheStatsReport {
    /// True when `url` is a substring of some reported entry.
    pub fn contains(&self, url: &str) -> bool {
        self.cache_entries.iter().any(|entry| entry.contains(url))
    }

    /// Song count as shown in status displays.
    pub fn size_label(&self) -> String {
        match self.music_cache_size {
            0 => "0 songs".to_string(),
            1 => "1 song".to_string(),
            n => format!("{} songs", n),
        }
    }

    /// Parse a stats reply. A worker-reported `error` becomes
    /// [`CacheError::StatsUnavailable`].
    pub fn from_reply(reply: WorkerMessage) -> Result<Self> {
        if let Some(message) = reply.get("error") {
            let reason = message
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| message.to_string());
            return Err(CacheError::StatsUnavailable(reason));
        }
        serde_json::from_value(reply).map_err(|e| CacheError::MalformedReply(e.to_string()))
    }

    pub fn to_reply(&self) -> WorkerMessage {
        json!({
            "musicCacheSize": self.music_cache_size,
            "cacheEntries": self.cache_entries,
        })
    }
}

/// Reply to `CLEAR_MUSIC_CACHE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearMusicCacheReply {
    pub success: bool,
}

impl ClearMusicCacheReply {
    pub fn from_reply(reply: WorkerMessage) -> Result<Self> {
        serde_json::from_value(reply).map_err(|e| CacheError::MalformedReply(e.to_string()))
    }

    pub fn to_reply(&self) -> WorkerMessage {
        json!({ "success": self.success })
    }
}
