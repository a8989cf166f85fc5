use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Serialize;

// ------------------------------------------------------------
// Root configuration
// ------------------------------------------------------------
//
// Resolved exactly once at startup from the process environment
// and shared read-only afterwards.
//
// It defines:
// - Upstream listing target and proxy list
// - Collection budgets and concurrency
// - Occupancy filter bounds
// - Downstream forwarding target
//
#[derive(Debug, Clone)]
pub struct Config {
    /// Listing (game) identifier, used to build the default listing URL
    pub game_id: String,

    /// Full upstream listing URL (may already carry query parameters)
    pub listing_url: String,

    /// Downstream aggregation endpoint
    ///
    /// NOTE:
    /// Empty means dry-run: filtered ids are logged, never sent.
    pub main_api_url: String,

    /// Raw comma-separated proxy list (normalized by `ProxyPool`)
    pub proxies_raw: String,

    /// Page budget per cycle (pages whose items are kept)
    pub max_pages: usize,

    /// Leading pages fetched only to advance the cursor
    pub skip_pages: usize,

    /// Maximum number of fetches in flight at once
    pub concurrency: usize,

    /// Upstream request timeout
    pub request_timeout: Duration,

    /// Downstream POST timeout
    pub forward_timeout: Duration,

    /// Sleep between two cycles
    pub send_interval: Duration,

    /// Occupancy filter bounds (inclusive)
    pub min_players: i64,
    pub max_players: i64,

    /// Minimum number of ids required before a forward is attempted
    pub min_forward: usize,

    /// Upper bound of the cursor cache
    pub cursor_cache_size: usize,

    /// Failure budget multiplier (budget = max(1, proxies) * multiplier)
    pub retry_multiplier: usize,

    /// Pause after a rate-limited or failed fetch
    pub retry_backoff: Duration,

    /// Attempts per forward (1 = no retry within a cycle)
    pub forward_attempts: u32,

    /// Traversal mode selection
    pub sampling_mode: SamplingMode,

    /// Random mode also fetches the head page (no cursor)
    pub sample_include_head: bool,

    /// Random mode records cursors returned by sampled fetches
    pub rechain_sampled: bool,

    /// Period of the `[METRICS]` log line
    pub metrics_interval: Duration,

    /// Status endpoint port
    pub port: u16,
}

// ------------------------------------------------------------
// Sampling mode
// ------------------------------------------------------------
//
// - Auto:       sequential while the cursor cache is empty,
//               random sampling afterwards
// - Sequential: always traverse from the listing start
//
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingMode {
    Auto,
    Sequential,
}

impl FromStr for SamplingMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "random" => Ok(SamplingMode::Auto),
            "sequential" => Ok(SamplingMode::Sequential),
            other => bail!("unknown sampling mode '{}'", other),
        }
    }
}

pub const DEFAULT_GAME_ID: &str = "109983668079237";

/// Builds the public server listing URL for a game id.
pub fn listing_url_for(game_id: &str) -> String {
    format!(
        "https://games.roblox.com/v1/games/{}/servers/Public?limit=100",
        game_id
    )
}

impl Default for Config {
    fn default() -> Self {
        Self {
            game_id: DEFAULT_GAME_ID.to_string(),
            listing_url: listing_url_for(DEFAULT_GAME_ID),
            main_api_url: String::new(),
            proxies_raw: String::new(),
            max_pages: 80,
            skip_pages: 0,
            concurrency: 50,
            request_timeout: Duration::from_secs(5),
            forward_timeout: Duration::from_secs(10),
            send_interval: Duration::from_secs(25),
            min_players: 0,
            max_players: 9999,
            min_forward: 1,
            cursor_cache_size: 5000,
            retry_multiplier: 3,
            retry_backoff: Duration::from_millis(500),
            forward_attempts: 1,
            sampling_mode: SamplingMode::Auto,
            sample_include_head: true,
            rechain_sampled: true,
            metrics_interval: Duration::from_secs(30),
            port: 8080,
        }
    }
}

impl Config {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary key lookup.
    ///
    /// Missing or empty keys fall back to defaults. Malformed values
    /// are startup errors naming the offending variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let d = Config::default();

        let game_id = get("GAME_ID").unwrap_or(d.game_id);
        let listing_url = get("LISTING_URL").unwrap_or_else(|| listing_url_for(&game_id));

        let cfg = Config {
            listing_url,
            main_api_url: get("MAIN_API_URL").unwrap_or_default(),
            proxies_raw: get("PROXIES").unwrap_or_default(),
            max_pages: parse_or(&get, "MAX_PAGES", d.max_pages)?,
            skip_pages: parse_or(&get, "SKIP_PAGES", d.skip_pages)?,
            concurrency: parse_or(&get, "CONCURRENCY", d.concurrency)?,
            request_timeout: secs_or(&get, "REQUEST_TIMEOUT", d.request_timeout)?,
            forward_timeout: secs_or(&get, "FORWARD_TIMEOUT", d.forward_timeout)?,
            send_interval: secs_or(&get, "SEND_INTERVAL", d.send_interval)?,
            min_players: parse_or(&get, "MIN_PLAYERS", d.min_players)?,
            max_players: parse_or(&get, "MAX_PLAYERS", d.max_players)?,
            min_forward: parse_or(&get, "MIN_FORWARD", d.min_forward)?,
            cursor_cache_size: parse_or(&get, "CURSOR_CACHE_SIZE", d.cursor_cache_size)?,
            retry_multiplier: parse_or(&get, "RETRY_MULTIPLIER", d.retry_multiplier)?,
            retry_backoff: Duration::from_millis(parse_or(
                &get,
                "RETRY_BACKOFF_MS",
                d.retry_backoff.as_millis() as u64,
            )?),
            forward_attempts: parse_or(&get, "FORWARD_ATTEMPTS", d.forward_attempts)?,
            sampling_mode: parse_or(&get, "SAMPLING_MODE", d.sampling_mode)?,
            sample_include_head: parse_or(&get, "SAMPLE_INCLUDE_HEAD", d.sample_include_head)?,
            rechain_sampled: parse_or(&get, "RECHAIN_SAMPLED", d.rechain_sampled)?,
            metrics_interval: secs_or(&get, "METRICS_INTERVAL", d.metrics_interval)?,
            port: parse_or(&get, "PORT", d.port)?,
            game_id,
        };

        cfg.validate()?;
        Ok(cfg)
    }

    /// Rejects combinations that would make every cycle meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.min_players > self.max_players {
            bail!(
                "MIN_PLAYERS ({}) must not exceed MAX_PLAYERS ({})",
                self.min_players,
                self.max_players
            );
        }
        if self.concurrency == 0 {
            bail!("CONCURRENCY must be at least 1");
        }
        if self.cursor_cache_size == 0 {
            bail!("CURSOR_CACHE_SIZE must be at least 1");
        }
        Ok(())
    }
}

fn parse_or<G, T>(get: &G, key: &str, default: T) -> Result<T>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("invalid value for {}: '{}'", key, raw)),
        None => Ok(default),
    }
}

fn secs_or<G>(get: &G, key: &str, default: Duration) -> Result<Duration>
where
    G: Fn(&str) -> Option<String>,
{
    parse_or(get, key, default.as_secs()).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_environment_empty() {
        let cfg = load(&[]).unwrap();
        assert_eq!(cfg.game_id, DEFAULT_GAME_ID);
        assert_eq!(cfg.listing_url, listing_url_for(DEFAULT_GAME_ID));
        assert_eq!(cfg.max_pages, 80);
        assert_eq!(cfg.concurrency, 50);
        assert_eq!(cfg.send_interval, Duration::from_secs(25));
        assert_eq!(cfg.cursor_cache_size, 5000);
        assert_eq!(cfg.sampling_mode, SamplingMode::Auto);
        assert!(cfg.main_api_url.is_empty());
        assert!(cfg.proxies_raw.is_empty());
    }

    #[test]
    fn test_game_id_drives_listing_url() {
        let cfg = load(&[("GAME_ID", "42")]).unwrap();
        assert_eq!(
            cfg.listing_url,
            "https://games.roblox.com/v1/games/42/servers/Public?limit=100"
        );
    }

    #[test]
    fn test_explicit_listing_url_wins() {
        let cfg = load(&[("GAME_ID", "42"), ("LISTING_URL", "http://localhost/x")]).unwrap();
        assert_eq!(cfg.listing_url, "http://localhost/x");
    }

    #[test]
    fn test_overrides_parsed() {
        let cfg = load(&[
            ("MAX_PAGES", "5"),
            ("SKIP_PAGES", "2"),
            ("CONCURRENCY", "4"),
            ("REQUEST_TIMEOUT", "9"),
            ("MIN_PLAYERS", "3"),
            ("MAX_PLAYERS", "7"),
            ("RETRY_BACKOFF_MS", "20"),
            ("SAMPLING_MODE", "Sequential"),
            ("RECHAIN_SAMPLED", "false"),
        ])
        .unwrap();
        assert_eq!(cfg.max_pages, 5);
        assert_eq!(cfg.skip_pages, 2);
        assert_eq!(cfg.concurrency, 4);
        assert_eq!(cfg.request_timeout, Duration::from_secs(9));
        assert_eq!((cfg.min_players, cfg.max_players), (3, 7));
        assert_eq!(cfg.retry_backoff, Duration::from_millis(20));
        assert_eq!(cfg.sampling_mode, SamplingMode::Sequential);
        assert!(!cfg.rechain_sampled);
    }

    #[test]
    fn test_blank_value_uses_default() {
        let cfg = load(&[("MAX_PAGES", "  ")]).unwrap();
        assert_eq!(cfg.max_pages, 80);
    }

    #[test]
    fn test_invalid_number_names_variable() {
        let err = load(&[("MAX_PAGES", "lots")]).unwrap_err();
        assert!(format!("{:#}", err).contains("MAX_PAGES"));
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        assert!(load(&[("MIN_PLAYERS", "10"), ("MAX_PLAYERS", "1")]).is_err());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        assert!(load(&[("CONCURRENCY", "0")]).is_err());
    }

    #[test]
    fn test_unknown_sampling_mode_rejected() {
        assert!(load(&[("SAMPLING_MODE", "chaotic")]).is_err());
    }
}
