#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Versioned offline asset cache.
//!
//! Keeps the app shell available without a network:
//!
//! 1. [`AssetCache::install`] fetches every manifest asset into the cache
//!    named after the current version. Either all assets are stored or
//!    none are.
//! 2. [`AssetCache::activate`] deletes caches left behind by older
//!    versions.
//! 3. [`AssetCache::handle_fetch`] answers same-origin requests from the
//!    cache and falls back to the network. Cross-origin requests are not
//!    intercepted.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

/// Default cache name; bump the version suffix to invalidate old caches.
pub const DEFAULT_CACHE_NAME: &str = "clean592-v1";

/// App shell assets cached at install time.
pub const DEFAULT_ASSETS: &[&str] = &["./", "./index.html", "./manifest.json", "./icon-192.png"];

/// Errors raised while populating the cache or forwarding a request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// The network request itself failed.
    #[error("Failed to fetch {url}: {message}")]
    Network {
        /// Requested URL.
        url: String,
        /// Description of what went wrong.
        message: String,
    },

    /// The server answered with a non-success status.
    #[error("Fetching {url} returned HTTP {status}")]
    BadStatus {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },
}

/// A stored or fetched HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// `Content-Type` header, if any.
    pub content_type: Option<String>,
    /// Response body.
    pub body: Vec<u8>,
}

impl Response {
    /// Whether the status is 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Fetches resources from the network.
#[async_trait]
pub trait Network: Send + Sync {
    /// Performs a GET request for `url`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Network`] if the request cannot be completed.
    async fn fetch(&self, url: &str) -> Result<Response, CacheError>;
}

/// How a request was answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Served from the cache.
    Cached(Response),
    /// Not cached; forwarded to the network.
    Network(Response),
    /// Cross-origin request, left to the caller.
    Passthrough,
}

/// Cache name, origin and asset manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Versioned cache name.
    pub name: String,
    /// Origin (scheme, host and port) requests must match to be served.
    pub origin: String,
    /// Asset paths relative to the origin.
    pub assets: Vec<String>,
}

impl CacheConfig {
    /// Config with the default name and manifest for `origin`.
    #[must_use]
    pub fn for_origin(origin: impl Into<String>) -> Self {
        Self {
            name: DEFAULT_CACHE_NAME.to_string(),
            origin: origin.into().trim_end_matches('/').to_string(),
            assets: DEFAULT_ASSETS.iter().map(ToString::to_string).collect(),
        }
    }

    /// Absolute URL of a manifest entry such as `./index.html`.
    #[must_use]
    pub fn resolve(&self, asset: &str) -> String {
        let path = asset.trim_start_matches('.').trim_start_matches('/');
        format!("{}/{path}", self.origin)
    }

    /// Whether `url` belongs to the configured origin.
    #[must_use]
    pub fn is_same_origin(&self, url: &str) -> bool {
        url.strip_prefix(&self.origin)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    }
}

type Entries = BTreeMap<String, Response>;

/// Named caches of responses keyed by URL.
#[derive(Debug)]
pub struct AssetCache {
    config: CacheConfig,
    caches: RwLock<BTreeMap<String, Entries>>,
}

impl AssetCache {
    /// Creates an empty cache set.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            caches: RwLock::new(BTreeMap::new()),
        }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Names of every cache currently held, sorted.
    #[must_use]
    pub fn cache_names(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Stores a response in the cache called `cache_name`, creating it if
    /// needed.
    pub fn put(&self, cache_name: &str, url: &str, response: Response) {
        self.write()
            .entry(cache_name.to_string())
            .or_default()
            .insert(strip_fragment(url).to_string(), response);
    }

    /// Fetches every manifest asset into the current cache.
    ///
    /// Returns the number of assets stored.
    ///
    /// # Errors
    ///
    /// Returns the first [`CacheError`] encountered; in that case nothing is
    /// stored.
    pub async fn install(&self, network: &dyn Network) -> Result<usize, CacheError> {
        let mut fetched = Vec::with_capacity(self.config.assets.len());

        for asset in &self.config.assets {
            let url = self.config.resolve(asset);
            let response = network.fetch(&url).await?;
            if !response.is_success() {
                return Err(CacheError::BadStatus {
                    url,
                    status: response.status,
                });
            }
            fetched.push((url, response));
        }

        let count = fetched.len();
        self.write()
            .entry(self.config.name.clone())
            .or_default()
            .extend(fetched);

        log::info!("Installed {count} asset(s) into cache '{}'", self.config.name);
        Ok(count)
    }

    /// Deletes every cache whose name is not the current version.
    ///
    /// Returns the names that were removed.
    pub fn activate(&self) -> Vec<String> {
        let mut caches = self.write();
        let stale: Vec<String> = caches
            .keys()
            .filter(|name| **name != self.config.name)
            .cloned()
            .collect();

        for name in &stale {
            caches.remove(name);
            log::info!("Deleted stale cache '{name}'");
        }
        stale
    }

    /// Answers a request: cache first, then network.
    ///
    /// Every held cache is searched, current version first.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the request is not cached and the network
    /// fetch fails.
    pub async fn handle_fetch(
        &self,
        url: &str,
        network: &dyn Network,
    ) -> Result<FetchOutcome, CacheError> {
        if !self.config.is_same_origin(url) {
            return Ok(FetchOutcome::Passthrough);
        }

        if let Some(cached) = self.lookup(url) {
            log::debug!("cache hit: {url}");
            return Ok(FetchOutcome::Cached(cached));
        }

        log::debug!("cache miss, forwarding to network: {url}");
        Ok(FetchOutcome::Network(network.fetch(url).await?))
    }

    fn lookup(&self, url: &str) -> Option<Response> {
        let key = strip_fragment(url);
        let caches = self.read();

        caches
            .get(&self.config.name)
            .and_then(|entries| entries.get(key))
            .or_else(|| caches.values().find_map(|entries| entries.get(key)))
            .cloned()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Entries>> {
        self.caches.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Entries>> {
        self.caches.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn strip_fragment(url: &str) -> &str {
    url.split_once('#').map_or(url, |(base, _)| base)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    use super::*;

    const ORIGIN: &str = "https://clean592.gy";

    /// Serves a fixed body for every URL except the ones marked missing.
    #[derive(Default)]
    struct FakeNetwork {
        missing: BTreeSet<String>,
        offline: bool,
        requests: Mutex<Vec<String>>,
    }

    impl FakeNetwork {
        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Network for FakeNetwork {
        async fn fetch(&self, url: &str) -> Result<Response, CacheError> {
            self.requests.lock().unwrap().push(url.to_string());
            if self.offline {
                return Err(CacheError::Network {
                    url: url.to_string(),
                    message: "offline".to_string(),
                });
            }
            let status = if self.missing.contains(url) { 404 } else { 200 };
            Ok(Response {
                status,
                content_type: None,
                body: url.as_bytes().to_vec(),
            })
        }
    }

    fn cache() -> AssetCache {
        AssetCache::new(CacheConfig::for_origin(ORIGIN))
    }

    #[test]
    fn resolves_manifest_entries() {
        let config = CacheConfig::for_origin("https://clean592.gy/");
        assert_eq!(config.resolve("./"), "https://clean592.gy/");
        assert_eq!(config.resolve("./index.html"), "https://clean592.gy/index.html");
    }

    #[test]
    fn origin_check_requires_boundary() {
        let config = CacheConfig::for_origin(ORIGIN);
        assert!(config.is_same_origin("https://clean592.gy/index.html"));
        assert!(config.is_same_origin("https://clean592.gy"));
        assert!(!config.is_same_origin("https://clean592.gy.evil.com/index.html"));
        assert!(!config.is_same_origin("https://tiles.example.com/1/2/3.png"));
    }

    #[tokio::test]
    async fn install_stores_every_asset() {
        let cache = cache();
        let network = FakeNetwork::default();

        let count = cache.install(&network).await.unwrap();

        assert_eq!(count, DEFAULT_ASSETS.len());
        assert_eq!(cache.cache_names(), vec![DEFAULT_CACHE_NAME.to_string()]);
    }

    #[tokio::test]
    async fn install_is_all_or_nothing() {
        let cache = cache();
        let network = FakeNetwork {
            missing: BTreeSet::from(["https://clean592.gy/manifest.json".to_string()]),
            ..FakeNetwork::default()
        };

        let result = cache.install(&network).await;

        assert!(matches!(result, Err(CacheError::BadStatus { status: 404, .. })));
        assert!(cache.cache_names().is_empty());
    }

    #[test]
    fn activate_purges_old_versions() {
        let cache = cache();
        let response = Response {
            status: 200,
            content_type: None,
            body: Vec::new(),
        };
        cache.put("clean592-v0", "https://clean592.gy/index.html", response.clone());
        cache.put(DEFAULT_CACHE_NAME, "https://clean592.gy/index.html", response);

        let purged = cache.activate();

        assert_eq!(purged, vec!["clean592-v0".to_string()]);
        assert_eq!(cache.cache_names(), vec![DEFAULT_CACHE_NAME.to_string()]);
    }

    #[tokio::test]
    async fn cached_asset_is_served_offline() {
        let cache = cache();
        cache.install(&FakeNetwork::default()).await.unwrap();
        let offline = FakeNetwork {
            offline: true,
            ..FakeNetwork::default()
        };

        let outcome = cache
            .handle_fetch("https://clean592.gy/index.html#top", &offline)
            .await
            .unwrap();

        assert!(matches!(outcome, FetchOutcome::Cached(_)));
        assert!(offline.requests().is_empty());
    }

    #[tokio::test]
    async fn uncached_request_goes_to_network() {
        let cache = cache();
        let network = FakeNetwork::default();

        let outcome = cache
            .handle_fetch("https://clean592.gy/reports.js", &network)
            .await
            .unwrap();

        assert!(matches!(outcome, FetchOutcome::Network(_)));
        assert_eq!(network.requests(), vec!["https://clean592.gy/reports.js".to_string()]);
    }

    #[tokio::test]
    async fn cross_origin_request_is_not_intercepted() {
        let cache = cache();
        let network = FakeNetwork::default();

        let outcome = cache
            .handle_fetch("https://cdn.example.com/lib.js", &network)
            .await
            .unwrap();

        assert_eq!(outcome, FetchOutcome::Passthrough);
        assert!(network.requests().is_empty());
    }

    #[tokio::test]
    async fn uncached_request_offline_is_an_error() {
        let cache = cache();
        let offline = FakeNetwork {
            offline: true,
            ..FakeNetwork::default()
        };

        let result = cache
            .handle_fetch("https://clean592.gy/reports.js", &offline)
            .await;

        assert!(matches!(result, Err(CacheError::Network { .. })));
    }
}
