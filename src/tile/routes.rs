//! HTTP route handlers for the occurrence tile API

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, RawQuery, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bytes::Bytes;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, warn};

use crate::binning::{BinError, HexBin, PointSample, SquareBin, YearCounts};
use crate::mvt::{Attributes, Geom, TagValue, TileEncoder};
use crate::projection::{
    buffered_tile_boundary, to_tile_local_xy, validate_address, Double2D, TileAddress,
    TileProjection, TileSchema,
};
use crate::regression;
use crate::search::{EsHeatmapService, GridBucket, HeatmapService};

use super::assembler::TileAssembler;
use super::params::{
    self, RequestParams, DEFAULT_HEX_PER_TILE, SUITABLE_BASIS_OF_RECORDS,
};
use super::types::{AssembleRequest, BinSpec, ErrorResponse, TileError};

const PROTOBUF_CONTENT_TYPE: &str = "application/x-protobuf";

/// Application state shared by all routes
#[derive(Clone)]
pub struct AppState {
    pub assembler: Arc<TileAssembler>,
    pub search: Arc<dyn HeatmapService>,
    pub request_timeout: Duration,
}

/// Build the occurrence API router, CORS enabled on every route
pub fn occurrence_routes(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/occurrence/density/:z/:x/:y", get(density_tile))
        .route("/occurrence/adhoc/:z/:x/:y", get(adhoc_tile))
        .route("/occurrence/regression/:z/:x/:y", get(regression_surface))
        .route("/occurrence/regression", get(regression_json))
        .layer(cors)
        .with_state(state)
}

/// Minimal router for the admin listener
pub fn admin_routes() -> Router {
    Router::new().route("/health", get(health))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /occurrence/density/:z/:x/:y.mvt - precomputed density tile
async fn density_tile(
    State(state): State<AppState>,
    Path((z, x, y)): Path<(u32, u64, String)>,
    RawQuery(query): RawQuery,
) -> Result<Response, ErrorResponse> {
    let params = RequestParams::parse(query.as_deref());
    let request = AssembleRequest {
        address: TileAddress::new(z, x, params::tile_y(&y).map_err(fail)?),
        schema: params::schema(&params, "EPSG:3857").map_err(fail)?,
        map_key: params::map_key(&params).map_err(fail)?,
        filters: params::filters(&params).map_err(fail)?,
        bin: params::bin_spec(&params).map_err(fail)?,
    };

    let bytes = with_timeout(state.request_timeout, state.assembler.assemble(&request))
        .await
        .map_err(fail)?;
    Ok(tile_response(bytes))
}

/// GET /occurrence/adhoc/:z/:x/:y.mvt - search-backed tile, WGS84 only
async fn adhoc_tile(
    State(state): State<AppState>,
    Path((z, x, y)): Path<(u32, u64, String)>,
    RawQuery(query): RawQuery,
) -> Result<Response, ErrorResponse> {
    let params = RequestParams::parse(query.as_deref());
    let schema = params::schema(&params, "EPSG:4326").map_err(fail)?;
    if schema != TileSchema::Wgs84 {
        return Err(fail(TileError::Validation(
            "ad-hoc maps are only available in EPSG:4326".to_string(),
        )));
    }
    let y = params::tile_y(&y).map_err(fail)?;
    validate_address(schema, TileAddress::new(z, x, y))
        .map_err(|e| fail(TileError::Validation(e.to_string())))?;
    let bin = params::bin_spec(&params).map_err(fail)?;
    let search_query = params::search_query(&params);

    let tile_size = state.assembler.tile_size();
    let buffer_size = state.assembler.buffer_size();
    let bytes = with_timeout(state.request_timeout, async {
        let bbox = buffered_tile_boundary(z, x, y, schema, tile_size, buffer_size)?;
        let buckets = state
            .search
            .geogrid(
                &search_query,
                bbox,
                EsHeatmapService::precision_for_zoom(z),
            )
            .await?;
        adhoc_tile_bytes(&buckets, z, x, y, bin, tile_size, buffer_size)
    })
    .await
    .map_err(fail)?;

    Ok(tile_response(Bytes::from(bytes)))
}

/// GET /occurrence/regression/:z/:x/:y.mvt - regression surface over hex
/// tiles of the target taxon and a reference (higher) taxon
async fn regression_surface(
    State(state): State<AppState>,
    Path((z, x, y)): Path<(u32, u64, String)>,
    RawQuery(query): RawQuery,
) -> Result<Response, ErrorResponse> {
    let params = RequestParams::parse(query.as_deref());
    let y = params::tile_y(&y).map_err(fail)?;
    let higher_taxon = require(&params, "higherTaxonKey").map_err(fail)?;
    let min_years = min_years(&params).map_err(fail)?;

    let filters = super::types::Filters {
        years: match params.first("year") {
            Some(raw) => params::year_range(raw).map_err(fail)?,
            None => Default::default(),
        },
        basis_of_record: suitable_basis_of_records(),
        verbose: true,
    };
    let template = AssembleRequest {
        address: TileAddress::new(z, x, y),
        schema: params::schema(&params, "EPSG:3857").map_err(fail)?,
        map_key: params::map_key(&params).map_err(fail)?,
        filters,
        bin: Some(BinSpec::Hex {
            hex_per_tile: DEFAULT_HEX_PER_TILE,
        }),
    };
    let reference = AssembleRequest {
        map_key: format!("taxonKey:{higher_taxon}"),
        ..template.clone()
    };

    let tile_size = state.assembler.tile_size();
    let buffer_size = state.assembler.buffer_size();
    let bytes = with_timeout(state.request_timeout, async {
        let (target_tile, reference_tile) = tokio::try_join!(
            state.assembler.assemble(&template),
            state.assembler.assemble(&reference),
        )?;
        let origin = (
            (x * tile_size as u64) as i64,
            (y * tile_size as u64) as i64,
        );
        Ok(regression::regression_tile(
            &target_tile,
            &reference_tile,
            min_years,
            origin,
            tile_size,
            buffer_size,
        )?)
    })
    .await
    .map_err(fail)?;

    Ok(tile_response(Bytes::from(bytes)))
}

/// GET /occurrence/regression - JSON regression over a filter set
async fn regression_json(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Result<Response, ErrorResponse> {
    let params = RequestParams::parse(query.as_deref());
    let higher_taxon = require(&params, "higherTaxonKey").map_err(fail)?;

    // force the suitable basis-of-record list onto both facet queries
    let mut search_query = params::search_query(&params);
    search_query.terms.retain(|(field, _)| field != "basisOfRecord");
    for bor in SUITABLE_BASIS_OF_RECORDS {
        search_query.terms.push(("basisOfRecord".to_string(), bor.to_string()));
    }
    let reference_query = search_query.with_term("taxonKey", &higher_taxon);

    let meta = with_timeout(state.request_timeout, async {
        let (target_counts, reference_counts) = tokio::try_join!(
            year_facet(&*state.search, &search_query),
            year_facet(&*state.search, &reference_query),
        )?;
        Ok(regression::regression_meta(&target_counts, &reference_counts))
    })
    .await
    .map_err(fail)?;

    Ok(Json(meta).into_response())
}

async fn year_facet(
    search: &dyn HeatmapService,
    query: &crate::search::OccurrenceQuery,
) -> Result<YearCounts, TileError> {
    Ok(search.year_facet(query).await?)
}

/// Paint geogrid buckets into a tile: cell polygons by default, centroid
/// points re-binned when a bin spec is present
fn adhoc_tile_bytes(
    buckets: &[GridBucket],
    z: u32,
    x: u64,
    y: u64,
    bin: Option<BinSpec>,
    tile_size: u32,
    buffer_size: u32,
) -> Result<Vec<u8>, TileError> {
    let projection = TileProjection::new(TileSchema::Wgs84, tile_size);
    let local = |lat: f64, lng: f64| -> Result<Double2D, TileError> {
        let global = projection.to_global_pixel_xy(lat, lng, z)?;
        Ok(to_tile_local_xy(
            global,
            TileSchema::Wgs84,
            z,
            x,
            y,
            tile_size,
            buffer_size,
        ))
    };

    let mut encoder = TileEncoder::new(tile_size, buffer_size);
    let mut samples = Vec::new();

    for bucket in buckets {
        let north_west = local(bucket.max_lat, bucket.min_lng)?;
        let south_east = local(bucket.min_lat, bucket.max_lng)?;

        if bin.is_some() {
            let origin_x = (x * tile_size as u64) as f64;
            let origin_y = (y * tile_size as u64) as f64;
            samples.push(PointSample {
                gx: origin_x + (north_west.x + south_east.x) / 2.0,
                gy: origin_y + (north_west.y + south_east.y) / 2.0,
                total: bucket.doc_count,
                years: YearCounts::new(),
            });
        } else {
            let (x0, y0) = (north_west.x.round() as i32, north_west.y.round() as i32);
            let (x1, y1) = (south_east.x.round() as i32, south_east.y.round() as i32);
            let ring = vec![(x0, y0), (x1, y0), (x1, y1), (x0, y1)];
            let mut attrs = Attributes::new();
            attrs.insert("total".to_string(), TagValue::Int(bucket.doc_count));
            encoder.add_feature("occurrence", &attrs, &Geom::Polygon(vec![ring]));
        }
    }

    if let Some(spec) = bin {
        if !samples.is_empty() {
            let origin = (
                (x * tile_size as u64) as i64,
                (y * tile_size as u64) as i64,
            );
            let binned = match spec {
                BinSpec::Hex { hex_per_tile } => {
                    HexBin::new(tile_size, hex_per_tile).bin(origin, &samples)
                }
                BinSpec::Square { cell_size } => SquareBin::new(cell_size).bin(origin, &samples),
            };
            match binned {
                Ok(cells) => {
                    for cell in cells.values() {
                        let mut attrs = Attributes::new();
                        attrs.insert("total".to_string(), TagValue::Int(cell.total));
                        encoder.add_feature("occurrence", &attrs, &cell.geom);
                    }
                }
                Err(BinError::NoData) => {}
            }
        }
    }

    Ok(encoder.encode()?)
}

fn suitable_basis_of_records() -> BTreeSet<String> {
    SUITABLE_BASIS_OF_RECORDS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn require(params: &RequestParams, name: &str) -> Result<String, TileError> {
    params
        .first(name)
        .map(|v| v.to_string())
        .ok_or_else(|| TileError::Validation(format!("{name} is required")))
}

fn min_years(params: &RequestParams) -> Result<u64, TileError> {
    match params.first("minYears") {
        None => Ok(2),
        Some(raw) => raw
            .parse()
            .map_err(|_| TileError::Validation(format!("bad minYears: {raw}"))),
    }
}

async fn with_timeout<T>(
    timeout: Duration,
    work: impl Future<Output = Result<T, TileError>>,
) -> Result<T, TileError> {
    match tokio::time::timeout(timeout, work).await {
        Ok(result) => result,
        Err(_) => Err(TileError::Timeout),
    }
}

fn tile_response(bytes: Bytes) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, PROTOBUF_CONTENT_TYPE),
            (header::CACHE_CONTROL, "public, max-age=600"),
        ],
        bytes,
    )
        .into_response()
}

/// Convert a pipeline error to a response, logging the detail that must not
/// reach the client
fn fail(e: TileError) -> ErrorResponse {
    match &e {
        TileError::Validation(message) => warn!("rejected request: {}", message),
        TileError::Timeout => warn!("request timed out"),
        other => error!("tile request failed: {}", other),
    }
    e.into()
}
