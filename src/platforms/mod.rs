//! Platform integrations
//!
//! One adapter per supported social platform, each implementing the shared
//! [`PlatformAdapter`] contract for authorization, token exchange, refresh,
//! and profile fetches.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

pub mod adapter;
pub mod facebook;
pub mod instagram;
mod meta;
pub mod registry;
pub mod threads;
pub mod tiktok;
pub mod x;
pub mod youtube;

pub use adapter::{
    AdapterError, PlatformAdapter, PlatformCredentials, Profile, RefreshRequest, TokenGrant,
};
pub use registry::PlatformRegistry;

/// The set of supported social platforms.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Tiktok,
    Instagram,
    Facebook,
    Youtube,
    Threads,
    X,
}

impl Platform {
    /// All supported platforms, in display order.
    pub const ALL: [Platform; 6] = [
        Platform::Tiktok,
        Platform::Instagram,
        Platform::Facebook,
        Platform::Youtube,
        Platform::Threads,
        Platform::X,
    ];

    /// Stable string form used in URLs and database rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Tiktok => "tiktok",
            Platform::Instagram => "instagram",
            Platform::Facebook => "facebook",
            Platform::Youtube => "youtube",
            Platform::Threads => "threads",
            Platform::X => "x",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for platform names that do not match any supported platform.
#[derive(Debug, Clone, Error)]
#[error("unknown platform: {0}")]
pub struct UnknownPlatform(pub String);

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tiktok" => Ok(Platform::Tiktok),
            "instagram" => Ok(Platform::Instagram),
            "facebook" => Ok(Platform::Facebook),
            "youtube" => Ok(Platform::Youtube),
            "threads" => Ok(Platform::Threads),
            "x" => Ok(Platform::X),
            other => Err(UnknownPlatform(other.to_string())),
        }
    }
}
