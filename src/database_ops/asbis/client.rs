use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, instrument, warn};

use crate::database_ops::asbis::config::AsbisConfig;
use crate::database_ops::asbis::models::{apply_prices, parse_price_list, parse_product_list, VendorProduct};
use crate::sync::cache::{Clock, SystemClock, TtlCache};
use crate::sync::error::{SyncError, SyncOutcome};
use crate::sync::vendor::{CachedFeedInfo, VendorCatalog, VendorInfo};

const ASBIS_VENDOR_KEY: &str = "asbis";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    ProductListXml,
    PriceListXml,
    Products,
}

impl CacheKey {
    fn as_str(&self) -> &'static str {
        match self {
            CacheKey::ProductListXml => "product_list_xml",
            CacheKey::PriceListXml => "price_list_xml",
            CacheKey::Products => "products",
        }
    }
}

#[derive(Debug, Clone)]
enum CachedPayload {
    Raw(Arc<String>),
    Products(Arc<Vec<VendorProduct>>),
}

/// HTTP client for the Asbis XML feeds with a TTL-bounded payload cache.
pub struct AsbisClient {
    cfg: AsbisConfig,
    http: Client,
    cache: TtlCache<CacheKey, CachedPayload>,
    network_fetches: AtomicU64,
}

impl AsbisClient {
    pub fn new(cfg: AsbisConfig) -> Result<Self> {
        Self::with_clock(cfg, Arc::new(SystemClock))
    }

    pub fn with_clock(cfg: AsbisConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("asbis-sync/", env!("CARGO_PKG_VERSION")))
            .timeout(cfg.timeout)
            .connect_timeout(cfg.timeout.min(Duration::from_secs(15)))
            .build()?;
        let cache = TtlCache::with_clock(cfg.cache_ttl, clock);
        Ok(Self {
            cfg,
            http,
            cache,
            network_fetches: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &AsbisConfig {
        &self.cfg
    }

    fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        let req = self.http.request(method, url);
        match &self.cfg.username {
            Some(user) => req.basic_auth(user, self.cfg.password.as_deref()),
            None => req,
        }
    }

    /// GET with retries on network errors and 5xx. 4xx fails immediately.
    #[instrument(skip(self), fields(vendor = ASBIS_VENDOR_KEY))]
    async fn fetch_text(&self, url: &str) -> SyncOutcome<String> {
        let max_attempts = self.cfg.retry_attempts.max(1);
        let mut delay = Duration::from_millis(self.cfg.retry_base_delay_ms.max(1));
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let t0 = Instant::now();
            self.network_fetches.fetch_add(1, Ordering::Relaxed);

            let outcome = match self.request(Method::GET, url).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        match resp.text().await {
                            Ok(body) => Ok(body),
                            Err(e) => Err((true, SyncError::from(e))),
                        }
                    } else {
                        let retryable = status.is_server_error()
                            || status == StatusCode::TOO_MANY_REQUESTS;
                        Err((
                            retryable,
                            SyncError::unavailable(format!("HTTP {} from {}", status.as_u16(), url)),
                        ))
                    }
                }
                Err(e) => Err((true, SyncError::from(e))),
            };

            match outcome {
                Ok(body) => {
                    info!(
                        url = %url,
                        attempt,
                        body_len = body.len(),
                        elapsed_ms = t0.elapsed().as_millis() as u64,
                        "asbis feed fetched"
                    );
                    if body.trim().is_empty() {
                        return Err(SyncError::payload(format!("empty body from {url}")));
                    }
                    return Ok(body);
                }
                Err((retryable, err)) => {
                    warn!(url = %url, attempt, error = %err, "asbis feed request failed");
                    if !retryable || attempt >= max_attempts {
                        return Err(err);
                    }
                    sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
            }
        }
    }

    async fn cached_raw(&self, key: CacheKey, url: &str) -> SyncOutcome<Arc<String>> {
        if let Some(CachedPayload::Raw(body)) = self.cache.get(&key) {
            debug!(key = key.as_str(), "asbis cache hit");
            return Ok(body);
        }
        let body = Arc::new(self.fetch_text(url).await?);
        self.cache.put(key, CachedPayload::Raw(body.clone()));
        Ok(body)
    }
}

#[async_trait]
impl VendorCatalog for AsbisClient {
    /// HEAD on the product feed; the body is never downloaded. A server that
    /// refuses HEAD with 405 is still up.
    async fn test_connection(&self) -> bool {
        let url = self.cfg.product_list_url();
        match self.request(Method::HEAD, &url).send().await {
            Ok(resp) if resp.status().is_success() || resp.status() == StatusCode::METHOD_NOT_ALLOWED => {
                true
            }
            Ok(resp) => {
                warn!(status = resp.status().as_u16(), "asbis connection test: non-success status");
                false
            }
            Err(e) => {
                warn!(error = %e, "asbis connection test failed");
                false
            }
        }
    }

    async fn get_all_products(&self) -> SyncOutcome<Arc<Vec<VendorProduct>>> {
        if let Some(CachedPayload::Products(products)) = self.cache.get(&CacheKey::Products) {
            debug!(count = products.len(), "asbis product snapshot served from cache");
            return Ok(products);
        }

        let xml = self.get_raw_product_list_xml().await?;
        let mut products = parse_product_list(&xml)?;

        if let Some(price_url) = self.cfg.price_list_url() {
            // Price feed problems leave price/stock untouched rather than failing the run.
            match self.cached_raw(CacheKey::PriceListXml, &price_url).await {
                Ok(raw) => match parse_price_list(&raw) {
                    Ok(prices) => apply_prices(&mut products, &prices),
                    Err(e) => warn!(error = %e, "asbis price feed unparsable; prices not applied"),
                },
                Err(e) => warn!(error = %e, "asbis price feed unavailable; prices not applied"),
            }
        }

        let products = Arc::new(products);
        info!(count = products.len(), "asbis product snapshot cached");
        self.cache
            .put(CacheKey::Products, CachedPayload::Products(products.clone()));
        Ok(products)
    }

    async fn get_raw_product_list_xml(&self) -> SyncOutcome<Arc<String>> {
        let url = self.cfg.product_list_url();
        self.cached_raw(CacheKey::ProductListXml, &url).await
    }

    fn clear_cache(&self) {
        self.cache.clear();
        info!("asbis cache cleared");
    }

    fn hold_snapshot(&self, held: bool) {
        self.cache.hold(held);
        debug!(held, "asbis snapshot hold changed");
    }

    fn info(&self) -> VendorInfo {
        let mut cached_feeds: Vec<CachedFeedInfo> = self
            .cache
            .entries()
            .into_iter()
            .map(|e| CachedFeedInfo {
                key: e.key.as_str().to_string(),
                age_secs: e.age.as_secs(),
                expires_in_secs: e.expires_in.as_secs(),
            })
            .collect();
        cached_feeds.sort_by(|a, b| a.key.cmp(&b.key));
        VendorInfo {
            vendor: ASBIS_VENDOR_KEY.to_string(),
            base_url: self.cfg.base_url.clone(),
            product_list_url: self.cfg.product_list_url(),
            price_list_url: self.cfg.price_list_url(),
            timeout_secs: self.cfg.timeout.as_secs(),
            cache_ttl_secs: self.cfg.cache_ttl.as_secs(),
            credentials_configured: self.cfg.username.is_some(),
            network_fetches: self.network_fetches.load(Ordering::Relaxed),
            cached_feeds,
        }
    }
}
