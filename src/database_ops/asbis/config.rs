use std::time::Duration;

use crate::util::env::{env_opt, env_parse};

pub const DEFAULT_BASE_URL: &str = "https://services.it4profit.com/product/en/714";

/// Connection settings for the Asbis product feeds.
#[derive(Clone, Debug)]
pub struct AsbisConfig {
    pub base_url: String,
    pub product_list_path: String,
    /// Empty disables the price/stock feed.
    pub price_list_path: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
    pub cache_ttl: Duration,
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for AsbisConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            product_list_path: "ProductList.xml".to_string(),
            price_list_path: Some("PriceAvail.xml".to_string()),
            username: None,
            password: None,
            timeout: Duration::from_secs(60),
            cache_ttl: Duration::from_secs(1800),
            retry_attempts: 3,
            retry_base_delay_ms: 500,
        }
    }
}

impl AsbisConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let price_list_path = match std::env::var("ASBIS_PRICE_LIST_PATH") {
            Ok(v) if v.trim().is_empty() => None,
            Ok(v) => Some(v.trim().to_string()),
            Err(_) => defaults.price_list_path,
        };
        Self {
            base_url: env_opt("ASBIS_API_URL")
                .unwrap_or(defaults.base_url)
                .trim_end_matches('/')
                .to_string(),
            product_list_path: env_opt("ASBIS_PRODUCT_LIST_PATH")
                .unwrap_or(defaults.product_list_path),
            price_list_path,
            username: env_opt("ASBIS_USER"),
            password: env_opt("ASBIS_PASSWORD"),
            // A zero timeout would let vendor calls hang; clamp to one second.
            timeout: Duration::from_secs(env_parse("ASBIS_TIMEOUT_SECS", 60u64).max(1)),
            cache_ttl: Duration::from_secs(env_parse("ASBIS_CACHE_TTL_SECS", 1800u64)),
            retry_attempts: env_parse("ASBIS_RETRY_ATTEMPTS", defaults.retry_attempts),
            retry_base_delay_ms: env_parse(
                "ASBIS_RETRY_BASE_DELAY_MS",
                defaults.retry_base_delay_ms,
            ),
        }
    }

    pub fn product_list_url(&self) -> String {
        join_url(&self.base_url, &self.product_list_path)
    }

    pub fn price_list_url(&self) -> Option<String> {
        self.price_list_path
            .as_deref()
            .map(|p| join_url(&self.base_url, p))
    }
}

fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
