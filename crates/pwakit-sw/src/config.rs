//! Compiled-in worker configuration.
//!
//! Everything here is a constant of the deployment. Bumping the generation
//! names is what makes the next activation evict the previous version's
//! caches.

use pwakit_common::UrlPattern;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

pub const SCRIPT_PATH: &str = "/sw.js";
pub const STATIC_CACHE: &str = "static-v1";
pub const DYNAMIC_CACHE: &str = "dynamic-v1";
pub const CRITICAL_ASSET_MARKER: &str = "_next/static/chunks/";

/// Application shell routes and assets seeded at install time.
pub const PRECACHE_MANIFEST: &[&str] = &[
    "/",
    "/dashboard",
    "/icons/icon-192x192.png",
    "/icons/icon-512x512.png",
    "/icons/badge-72x72.png",
    "/manifest.json",
];

/// Whether repeated failure reasons are broadcast again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenotifyPolicy {
    /// Broadcast on every invocation.
    #[default]
    Always,
    /// Broadcast each distinct reason once per worker instance.
    SuppressDuplicates,
}

/// A notification action button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionConfig {
    pub action: String,
    pub title: String,
}

/// Fixed presentation of push notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub actions: Vec<ActionConfig>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            icon: "/icons/icon-192x192.png".to_string(),
            badge: "/icons/badge-72x72.png".to_string(),
            vibrate: vec![100, 50, 100],
            actions: vec![
                ActionConfig {
                    action: "open".to_string(),
                    title: "Open Task".to_string(),
                },
                ActionConfig {
                    action: "close".to_string(),
                    title: "Close".to_string(),
                },
            ],
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Origin the worker is registered for; "basic" responses share it.
    pub origin: Url,

    /// Well-known registration path of the worker script.
    pub script_path: String,

    /// Static generation name.
    pub static_cache: String,

    /// Dynamic generation name.
    pub dynamic_cache: String,

    /// Same-origin paths seeded into the static generation, in order.
    pub precache: Vec<String>,

    /// Requests whose network failure is unrecoverable for the page.
    pub critical_assets: Vec<UrlPattern>,

    pub notification: NotificationConfig,

    pub renotify: RenotifyPolicy,

    /// SQLite file backing the cache generations; in-memory when `None`.
    pub persistence: Option<PathBuf>,
}

impl WorkerConfig {
    /// The compiled-in deployment, served from `origin`.
    pub fn for_origin(origin: Url) -> Self {
        Self {
            origin,
            script_path: SCRIPT_PATH.to_string(),
            static_cache: STATIC_CACHE.to_string(),
            dynamic_cache: DYNAMIC_CACHE.to_string(),
            precache: PRECACHE_MANIFEST.iter().map(|s| s.to_string()).collect(),
            critical_assets: vec![UrlPattern::contains(CRITICAL_ASSET_MARKER)],
            notification: NotificationConfig::default(),
            renotify: RenotifyPolicy::default(),
            persistence: None,
        }
    }

    /// Rename both generations for a deployment tagged `tag` (e.g. "v2").
    pub fn with_version(mut self, tag: &str) -> Self {
        self.static_cache = format!("static-{}", tag);
        self.dynamic_cache = format!("dynamic-{}", tag);
        self
    }

    pub fn with_renotify(mut self, policy: RenotifyPolicy) -> Self {
        self.renotify = policy;
        self
    }

    pub fn with_persistence(mut self, path: impl Into<PathBuf>) -> Self {
        self.persistence = Some(path.into());
        self
    }

    /// Names that survive activation.
    pub fn current_generations(&self) -> [&str; 2] {
        [self.static_cache.as_str(), self.dynamic_cache.as_str()]
    }

    /// Resolve a manifest path or relative URL against the origin.
    pub fn resolve(&self, path: &str) -> crate::Result<Url> {
        Ok(self.origin.join(path)?)
    }

    pub fn is_critical(&self, url: &Url) -> bool {
        UrlPattern::any_match(&self.critical_assets, url)
    }

    pub fn is_same_origin(&self, url: &Url) -> bool {
        url.origin() == self.origin.origin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tasks() -> WorkerConfig {
        WorkerConfig::for_origin(Url::parse("https://tasks.test/").unwrap())
    }

    #[test]
    fn test_defaults_match_deployment() {
        let config = tasks();
        assert_eq!(config.current_generations(), ["static-v1", "dynamic-v1"]);
        assert_eq!(config.precache.len(), 6);
        assert_eq!(config.precache[0], "/");
        assert_eq!(config.notification.vibrate, vec![100, 50, 100]);
        assert_eq!(config.renotify, RenotifyPolicy::Always);
        assert!(config.persistence.is_none());
    }

    #[test]
    fn test_with_version() {
        let config = tasks().with_version("v2");
        assert_eq!(config.static_cache, "static-v2");
        assert_eq!(config.dynamic_cache, "dynamic-v2");
    }

    #[test]
    fn test_resolve_and_classify() {
        let config = tasks();
        let chunk = config.resolve("/_next/static/chunks/app-1.js").unwrap();
        assert_eq!(chunk.as_str(), "https://tasks.test/_next/static/chunks/app-1.js");
        assert!(config.is_critical(&chunk));
        assert!(config.is_same_origin(&chunk));

        let css = config.resolve("/_next/static/css/app.css").unwrap();
        assert!(!config.is_critical(&css));

        let foreign = Url::parse("https://cdn.test/x.js").unwrap();
        assert!(!config.is_same_origin(&foreign));
    }

    #[test]
    fn test_config_serde() {
        let config = tasks().with_renotify(RenotifyPolicy::SuppressDuplicates);
        let json = serde_json::to_string(&config).unwrap();
        let back: WorkerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.renotify, RenotifyPolicy::SuppressDuplicates);
        assert_eq!(back.critical_assets, config.critical_assets);
    }
}
