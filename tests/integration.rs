//! Integration Tests for the Occurrence Tile Server
//!
//! These tests drive the real router over in-memory backends, verifying
//! routes, status codes and tile payloads end to end.

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use occmaps_server::mvt::{self, Geom, TagValue};
use occmaps_server::search::GridBucket;
use tower::util::ServiceExt;

mod common;
use common::*;

async fn get(app: axum::Router, uri: &str) -> (StatusCode, Option<String>, bytes::Bytes) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get("content-type")
        .map(|v| v.to_str().unwrap().to_string());
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, content_type, body)
}

mod density_routes {
    use super::*;

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let (app, _, _) = create_test_app();
        let (status, _, body) = get(app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn absent_data_returns_an_empty_tile_not_404() {
        let (app, _, _) = create_test_app();
        let (status, content_type, body) =
            get(app, "/occurrence/density/0/0/0.mvt?taxonKey=999999999").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("application/x-protobuf"));
        assert!(body.len() <= 4);
        assert!(mvt::decode(&body).unwrap().is_empty());
    }

    #[tokio::test]
    async fn stored_tiles_pass_through() {
        let (app, kv, _) = create_test_app();
        kv.put_tile(
            "taxonKey:212",
            0,
            0,
            0,
            encode_density_tile(&[
                ((10, 10), "OBSERVATION", &[("2000", 4)]),
                ((20, 20), "OBSERVATION", &[("2001", 2)]),
                ((30, 30), "PRESERVED_SPECIMEN", &[("1990", 1)]),
            ]),
        );

        let (status, _, body) = get(app, "/occurrence/density/0/0/0.mvt?taxonKey=212").await;
        assert_eq!(status, StatusCode::OK);

        let features = mvt::decode(&body).unwrap();
        assert_eq!(features.len(), 3);
        assert!(features.iter().all(|f| f.layer == "occurrence"));
    }

    #[tokio::test]
    async fn year_filter_and_verbose_breakdown() {
        let (app, kv, _) = create_test_app();
        kv.put_tile(
            "taxonKey:212",
            0,
            0,
            0,
            encode_density_tile(&[(
                (10, 10),
                "OBSERVATION",
                &[("1990", 10), ("2000", 20), ("2010", 30)],
            )]),
        );

        let (status, _, body) = get(
            app,
            "/occurrence/density/0/0/0.mvt?taxonKey=212&year=2000,2010&verbose=true",
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let features = mvt::decode(&body).unwrap();
        assert_eq!(features.len(), 1);
        let attrs = &features[0].attrs;
        assert_eq!(attrs["total"].as_i64(), Some(50));
        assert_eq!(attrs["2000"].as_i64(), Some(20));
        assert_eq!(attrs["2010"].as_i64(), Some(30));
        assert!(!attrs.contains_key("1990"));
    }

    #[tokio::test]
    async fn hex_binning_over_http() {
        let (app, kv, _) = create_test_app();
        let cluster: Vec<((i32, i32), &str, &[(&str, i64)])> = (0..100)
            .map(|i| {
                (
                    (200 + (i % 3), 300 + (i % 2)),
                    "OBSERVATION",
                    &[("2000", 1i64)] as &[_],
                )
            })
            .collect();
        kv.put_tile("taxonKey:212", 0, 0, 0, encode_density_tile(&cluster));

        let (status, _, body) = get(
            app,
            "/occurrence/density/0/0/0.mvt?taxonKey=212&bin=hex&hexPerTile=35",
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let features = mvt::decode(&body).unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].attrs["total"].as_i64(), Some(100));
        assert!(matches!(&features[0].geom, Geom::Polygon(rings) if rings[0].len() == 6));
    }

    #[tokio::test]
    async fn malformed_parameters_are_400() {
        let cases = [
            "/occurrence/density/0/0/0.mvt?srs=EPSG:9999",
            "/occurrence/density/0/0/0.mvt?bin=triangle",
            "/occurrence/density/0/0/0.mvt?year=199x",
            "/occurrence/density/0/0/0.mvt?taxonKey=1&country=DK",
            "/occurrence/density/0/9/0.mvt",
        ];
        for uri in cases {
            let (app, _, _) = create_test_app();
            let (status, _, body) = get(app, uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(json["code"], "invalid_parameter", "{uri}");
        }
    }

    #[tokio::test]
    async fn polar_schemes_are_served() {
        let (app, kv, _) = create_test_app();
        kv.put_tile(
            "taxonKey:212",
            0,
            0,
            0,
            encode_density_tile(&[((256, 256), "OBSERVATION", &[("2000", 1)])]),
        );
        let (status, _, body) =
            get(app, "/occurrence/density/0/0/0.mvt?taxonKey=212&srs=EPSG:3575").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(mvt::decode(&body).unwrap().len(), 1);
    }
}

mod adhoc_routes {
    use super::*;

    #[tokio::test]
    async fn rejects_non_wgs84_projections() {
        let (app, _, _) = create_test_app();
        let (status, _, body) = get(app, "/occurrence/adhoc/0/0/0.mvt?srs=EPSG:3857").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], "invalid_parameter");
    }

    #[tokio::test]
    async fn paints_buckets_as_cell_polygons() {
        let (app, _, search) = create_test_app();
        search.set_buckets(vec![GridBucket {
            min_lng: 0.0,
            min_lat: 0.0,
            max_lng: 11.25,
            max_lat: 11.25,
            doc_count: 42,
        }]);

        let (status, content_type, body) =
            get(app, "/occurrence/adhoc/1/1/0.mvt?taxonKey=212").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("application/x-protobuf"));

        let features = mvt::decode(&body).unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].attrs["total"].as_i64(), Some(42));
        assert!(matches!(&features[0].geom, Geom::Polygon(_)));
    }

    #[tokio::test]
    async fn bins_bucket_centroids_when_requested() {
        let (app, _, search) = create_test_app();
        search.set_buckets(vec![
            GridBucket {
                min_lng: 1.0,
                min_lat: 1.0,
                max_lng: 1.2,
                max_lat: 1.2,
                doc_count: 10,
            },
            GridBucket {
                min_lng: 1.2,
                min_lat: 1.0,
                max_lng: 1.4,
                max_lat: 1.2,
                doc_count: 5,
            },
        ]);

        let (status, _, body) = get(app, "/occurrence/adhoc/1/1/0.mvt?bin=hex").await;
        assert_eq!(status, StatusCode::OK);

        let features = mvt::decode(&body).unwrap();
        assert!(!features.is_empty());
        let total: i64 = features
            .iter()
            .map(|f| f.attrs["total"].as_i64().unwrap())
            .sum();
        assert_eq!(total, 15);
        assert!(features
            .iter()
            .all(|f| matches!(&f.geom, Geom::Polygon(rings) if rings[0].len() == 6)));
    }

    #[tokio::test]
    async fn empty_result_is_an_empty_tile() {
        let (app, _, _) = create_test_app();
        let (status, _, body) = get(app, "/occurrence/adhoc/0/0/0.mvt?country=DK").await;
        assert_eq!(status, StatusCode::OK);
        assert!(mvt::decode(&body).unwrap().is_empty());
    }
}

mod regression_routes {
    use super::*;

    fn seed_regression_tiles(kv: &MemoryKv) {
        // one shared location; species counts grow, the reference is flat
        kv.put_tile(
            "taxonKey:212",
            0,
            0,
            0,
            encode_density_tile(&[(
                (200, 200),
                "OBSERVATION",
                &[("2000", 5), ("2001", 10), ("2002", 15)],
            )]),
        );
        kv.put_tile(
            "taxonKey:44",
            0,
            0,
            0,
            encode_density_tile(&[(
                (200, 200),
                "OBSERVATION",
                &[("2000", 100), ("2001", 100), ("2002", 100)],
            )]),
        );
    }

    #[tokio::test]
    async fn regression_surface_reports_the_trend() {
        let (app, kv, _) = create_test_app();
        seed_regression_tiles(&kv);

        let (status, _, body) = get(
            app,
            "/occurrence/regression/0/0/0.mvt?taxonKey=212&higherTaxonKey=44",
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let features = mvt::decode(&body).unwrap();
        assert_eq!(features.len(), 1);
        let feature = &features[0];
        assert_eq!(feature.layer, "regression");

        let TagValue::Double(slope) = &feature.attrs["slope"] else {
            panic!("slope must be a double");
        };
        let TagValue::Double(intercept) = &feature.attrs["intercept"] else {
            panic!("intercept must be a double");
        };
        assert!((slope - 0.05).abs() < 1e-9);
        assert!((intercept - (-99.95)).abs() < 1e-6);
        assert!(matches!(&feature.geom, Geom::Polygon(_)));
    }

    #[tokio::test]
    async fn regression_requires_the_reference_taxon() {
        let (app, _, _) = create_test_app();
        let (status, _, body) = get(app, "/occurrence/regression/0/0/0.mvt?taxonKey=212").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], "invalid_parameter");
    }

    #[tokio::test]
    async fn min_years_gate_applies() {
        let (app, kv, _) = create_test_app();
        seed_regression_tiles(&kv);

        let (status, _, body) = get(
            app,
            "/occurrence/regression/0/0/0.mvt?taxonKey=212&higherTaxonKey=44&minYears=4",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(mvt::decode(&body).unwrap().is_empty());
    }

    #[tokio::test]
    async fn json_regression_over_year_facets() {
        let (app, _, search) = create_test_app();
        search.set_facet("212", &[(2000, 5), (2001, 10), (2002, 15)]);
        search.set_facet("44", &[(2000, 100), (2001, 100), (2002, 100)]);

        let (status, content_type, body) = get(
            app,
            "/occurrence/regression?taxonKey=212&higherTaxonKey=44",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(content_type.unwrap().starts_with("application/json"));

        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!((json["slope"].as_f64().unwrap() - 0.05).abs() < 1e-9);
        assert_eq!(
            json["speciesCounts"].as_str().unwrap(),
            "{\"2000\":5,\"2001\":10,\"2002\":15}"
        );
    }
}
