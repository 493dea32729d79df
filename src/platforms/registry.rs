//! Platform adapter registry
//!
//! Holds one adapter per supported platform behind the shared trait object.
//! Constructed once at startup with the shared HTTP client and handed around
//! through application state.

use std::sync::Arc;

use super::Platform;
use super::adapter::PlatformAdapter;
use super::facebook::FacebookAdapter;
use super::instagram::InstagramAdapter;
use super::threads::ThreadsAdapter;
use super::tiktok::TikTokAdapter;
use super::x::XAdapter;
use super::youtube::YoutubeAdapter;

pub struct PlatformRegistry {
    tiktok: Arc<dyn PlatformAdapter>,
    instagram: Arc<dyn PlatformAdapter>,
    facebook: Arc<dyn PlatformAdapter>,
    youtube: Arc<dyn PlatformAdapter>,
    threads: Arc<dyn PlatformAdapter>,
    x: Arc<dyn PlatformAdapter>,
}

impl PlatformRegistry {
    /// Registry with production endpoints for every platform.
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            tiktok: Arc::new(TikTokAdapter::new(http.clone())),
            instagram: Arc::new(InstagramAdapter::new(http.clone())),
            facebook: Arc::new(FacebookAdapter::new(http.clone())),
            youtube: Arc::new(YoutubeAdapter::new(http.clone())),
            threads: Arc::new(ThreadsAdapter::new(http.clone())),
            x: Arc::new(XAdapter::new(http)),
        }
    }

    /// Registry with every adapter's API calls routed to one base URL.
    ///
    /// Token and profile paths never collide across platforms, so a single
    /// mock server can play all six upstreams in tests. Authorization URLs
    /// keep their production hosts; nothing ever fetches those.
    pub fn with_api_base(http: reqwest::Client, base: &str) -> Self {
        Self {
            tiktok: Arc::new(TikTokAdapter::with_api_base(http.clone(), base)),
            instagram: Arc::new(InstagramAdapter::with_api_base(http.clone(), base)),
            facebook: Arc::new(FacebookAdapter::with_api_base(http.clone(), base)),
            youtube: Arc::new(YoutubeAdapter::with_api_base(http.clone(), base)),
            threads: Arc::new(ThreadsAdapter::with_api_base(http.clone(), base)),
            x: Arc::new(XAdapter::with_api_base(http, base)),
        }
    }

    /// Look up the adapter for a platform. Total: every platform in the enum
    /// is always registered.
    pub fn get(&self, platform: Platform) -> Arc<dyn PlatformAdapter> {
        match platform {
            Platform::Tiktok => self.tiktok.clone(),
            Platform::Instagram => self.instagram.clone(),
            Platform::Facebook => self.facebook.clone(),
            Platform::Youtube => self.youtube.clone(),
            Platform::Threads => self.threads.clone(),
            Platform::X => self.x.clone(),
        }
    }
}
