use std::net::SocketAddr;
use std::sync::Arc;

use occmaps_server::config::Config;
use occmaps_server::meta::{HttpMetaSource, MetaSource, Metastore, StaticMetastore, TableNames};
use occmaps_server::search::EsHeatmapService;
use occmaps_server::store::{RestKvClient, RetryPolicy, SaltedTileStore};
use occmaps_server::meta::WatchedMetastore;
use occmaps_server::tile::{
    admin_routes, occurrence_routes, AppState, TileAssembler, TileCacheConfig,
};
use tower_http::compression::{predicate::SizeAbove, CompressionLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "occmaps=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = Config::from_env();
    config.validate().map_err(anyhow::Error::msg)?;
    info!(
        "Loaded configuration: host={}, port={}, tile_size={}, buffer={}",
        config.http.host, config.http.port, config.tile.tile_size, config.tile.buffer_size
    );

    // Resolve table names statically or through the watched metastore
    let static_tables = (!config.store.tiles_table.is_empty())
        .then(|| TableNames::new(&config.store.tiles_table, &config.store.points_table));
    let meta: Arc<dyn Metastore> = match &config.metastore {
        Some(metastore) => {
            info!("Watching table mapping at {}", metastore.url);
            let source: Arc<dyn MetaSource> = Arc::new(HttpMetaSource::new(&metastore.url));
            Arc::new(
                WatchedMetastore::start(source, static_tables, metastore.poll_interval).await,
            )
        }
        None => Arc::new(StaticMetastore::new(
            static_tables.expect("validated static tables"),
        )),
    };

    // Shared backend clients
    let kv_client = Arc::new(RestKvClient::new(&config.store.base_url));
    let store = SaltedTileStore::new(kv_client, config.store.salt_modulus, RetryPolicy::default());
    let assembler = Arc::new(TileAssembler::new(
        store,
        meta,
        TileCacheConfig {
            max_size_bytes: config.cache.max_size_bytes,
            ttl: config.cache.ttl,
            tti: config.cache.tti,
        },
        config.tile.tile_size,
        config.tile.buffer_size,
    ));
    let search = Arc::new(EsHeatmapService::new(
        &config.search.base_url,
        &config.search.index,
    ));

    let state = AppState {
        assembler,
        search,
        request_timeout: config.tile.request_timeout,
    };

    // Build the router
    let app = occurrence_routes(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CompressionLayer::new()
                .gzip(true)
                .compress_when(SizeAbove::new(config.http.gzip_min_bytes)),
        );

    // Serve the API and the admin listener together
    let addr: SocketAddr = format!("{}:{}", config.http.host, config.http.port).parse()?;
    let admin_addr: SocketAddr =
        format!("{}:{}", config.http.host, config.http.admin_port).parse()?;
    info!("Occurrence tile server listening on {}", addr);
    info!("Admin listener on {}", admin_addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let admin_listener = tokio::net::TcpListener::bind(admin_addr).await?;

    tokio::spawn(async move {
        if let Err(e) = axum::serve(admin_listener, admin_routes()).await {
            tracing::error!("admin listener failed: {}", e);
        }
    });
    axum::serve(listener, app).await?;

    Ok(())
}
