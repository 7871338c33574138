//! Server configuration
//!
//! Configuration is loaded from environment variables at startup.

use std::env;
use std::time::Duration;

/// Main server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listener configuration
    pub http: HttpConfig,
    /// Key-value store configuration
    pub store: StoreConfig,
    /// Optional watched metastore; absent means static table names
    pub metastore: Option<MetastoreConfig>,
    /// Search backend configuration
    pub search: SearchConfig,
    /// Tile geometry and request limits
    pub tile: TileConfig,
    /// Response cache configuration
    pub cache: CacheConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Server bind address
    pub host: String,
    /// Main service port
    pub port: u16,
    /// Admin port (health checks)
    pub admin_port: u16,
    /// Minimum response size before gzip kicks in
    pub gzip_min_bytes: u16,
}

/// Key-value store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Base URL of the store's REST gateway
    pub base_url: String,
    /// Physical tiles table, used when no metastore is configured or as
    /// the fallback while the watched value is missing
    pub tiles_table: String,
    /// Physical points table, same role
    pub points_table: String,
    /// Number of salt buckets the producers write across
    pub salt_modulus: u8,
}

/// Watched metastore configuration
#[derive(Debug, Clone)]
pub struct MetastoreConfig {
    /// URL of the coordination document holding the table mapping
    pub url: String,
    /// Refresh interval; bounds the table switch delay
    pub poll_interval: Duration,
}

/// Search backend configuration
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Base URL of the search cluster
    pub base_url: String,
    /// Occurrence index name
    pub index: String,
}

/// Tile geometry and request limits
#[derive(Debug, Clone)]
pub struct TileConfig {
    /// Tile size in pixels
    pub tile_size: u32,
    /// Buffer around each tile in pixels
    pub buffer_size: u32,
    /// Per-request wall clock limit
    pub request_timeout: Duration,
}

/// Response cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_size_bytes: u64,
    pub ttl: Duration,
    pub tti: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            store: StoreConfig::default(),
            metastore: None,
            search: SearchConfig::default(),
            tile: TileConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 7001,
            admin_port: 7002,
            gzip_min_bytes: 1024,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            tiles_table: String::new(),
            points_table: String::new(),
            salt_modulus: 10,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9200".to_string(),
            index: "occurrence".to_string(),
        }
    }
}

impl Default for TileConfig {
    fn default() -> Self {
        Self {
            tile_size: 512,
            buffer_size: 64,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: 256 * 1024 * 1024,
            ttl: Duration::from_secs(3600),
            tti: Duration::from_secs(1800),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = env::var("HOST") {
            config.http.host = host;
        }
        if let Some(port) = parse_var("PORT") {
            config.http.port = port;
        }
        if let Some(port) = parse_var("ADMIN_PORT") {
            config.http.admin_port = port;
        }
        if let Some(bytes) = parse_var("GZIP_MIN_BYTES") {
            config.http.gzip_min_bytes = bytes;
        }

        if let Ok(url) = env::var("KV_BASE_URL") {
            config.store.base_url = url;
        }
        if let Ok(table) = env::var("TILES_TABLE") {
            config.store.tiles_table = table;
        }
        if let Ok(table) = env::var("POINTS_TABLE") {
            config.store.points_table = table;
        }
        if let Some(modulus) = parse_var("SALT_MODULUS") {
            config.store.salt_modulus = modulus;
        }

        if let Ok(url) = env::var("METASTORE_URL") {
            if !url.is_empty() {
                let poll_interval = parse_var("METASTORE_POLL_MS")
                    .map(Duration::from_millis)
                    .unwrap_or_else(|| Duration::from_millis(1000));
                config.metastore = Some(MetastoreConfig { url, poll_interval });
            }
        }

        if let Ok(url) = env::var("ES_BASE_URL") {
            config.search.base_url = url;
        }
        if let Ok(index) = env::var("ES_INDEX") {
            config.search.index = index;
        }

        if let Some(size) = parse_var("TILE_SIZE") {
            config.tile.tile_size = size;
        }
        if let Some(size) = parse_var("BUFFER_SIZE") {
            config.tile.buffer_size = size;
        }
        if let Some(secs) = parse_var::<u64>("REQUEST_TIMEOUT_SECS") {
            config.tile.request_timeout = Duration::from_secs(secs);
        }

        if let Some(bytes) = parse_var("CACHE_MAX_BYTES") {
            config.cache.max_size_bytes = bytes;
        }
        if let Some(secs) = parse_var::<u64>("CACHE_TTL_SECS") {
            config.cache.ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>("CACHE_TTI_SECS") {
            config.cache.tti = Duration::from_secs(secs);
        }

        config
    }

    /// Reject configurations that cannot resolve a table mapping
    pub fn validate(&self) -> Result<(), String> {
        let has_static =
            !self.store.tiles_table.is_empty() && !self.store.points_table.is_empty();
        if self.metastore.is_none() && !has_static {
            return Err(
                "either METASTORE_URL or TILES_TABLE and POINTS_TABLE must be set".to_string(),
            );
        }
        if self.store.salt_modulus == 0 {
            return Err("SALT_MODULUS must be at least 1".to_string());
        }
        if self.tile.tile_size == 0 {
            return Err("TILE_SIZE must be at least 1".to_string());
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_geometry() {
        let config = Config::default();
        assert_eq!(config.tile.tile_size, 512);
        assert_eq!(config.tile.buffer_size, 64);
        assert_eq!(config.store.salt_modulus, 10);
        assert_eq!(config.tile.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn default_config_needs_a_table_source() {
        let mut config = Config::default();
        assert!(config.validate().is_err());

        config.store.tiles_table = "tiles_v1".to_string();
        config.store.points_table = "points_v1".to_string();
        assert!(config.validate().is_ok());

        config.store.salt_modulus = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn metastore_satisfies_validation_without_static_tables() {
        let mut config = Config::default();
        config.metastore = Some(MetastoreConfig {
            url: "http://meta/maps".to_string(),
            poll_interval: Duration::from_millis(500),
        });
        assert!(config.validate().is_ok());
    }
}
