//! HTTP router.
//!
//! Returns a composable `Router` that can be mounted on any axum server.
//! `/compare` and `/summaries` sit behind the owner middleware; `/health`
//! and `/analyze` do not.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;

/// Upper bound for a whole multipart request (PDF + image + overhead).
pub const MAX_REQUEST_BYTES: usize = 55 * 1024 * 1024;

pub fn api_router(core: Arc<CoreState>) -> Router {
    build_router(ApiContext::new(core))
}

fn build_router(ctx: ApiContext) -> Router {
    // route_layer so unknown paths stay 404 instead of 401
    let owned = Router::new()
        .route("/compare", post(endpoints::compare::compare))
        .route("/summaries", get(endpoints::summaries::list))
        .route_layer(axum::middleware::from_fn(middleware::owner::require_owner))
        .with_state(ctx.clone());

    let open = Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/analyze", post(endpoints::analyze::analyze))
        .with_state(ctx);

    Router::new()
        .merge(open)
        .merge(owned)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
    use tower::ServiceExt;

    use crate::api::types::OWNER_HEADER;
    use crate::config::AppConfig;
    use crate::db::{open_memory_database, SqliteSummaryStore, SummaryStore};
    use crate::models::TargetLanguage;
    use crate::pipeline::inference::{
        InferenceConfig, MockClassifier, ModelRegistry, DEFAULT_CLASS_NAMES,
    };
    use crate::pipeline::narrative::MockNarrativeClient;

    const BOUNDARY: &str = "lucidcare-test-boundary";
    const NARRATIVE: &str = "**Patient Summary**\nYour chest X-ray suggests pneumonia.";

    const COMPARISON: &str = r#"{"verdict":"improved","confidence":80,"summary":"Better.",
        "highlights":[],"recommendation":"Keep going."}"#;

    fn pneumonia_registry() -> Arc<ModelRegistry> {
        let names = DEFAULT_CLASS_NAMES.iter().map(|s| s.to_string()).collect();
        Arc::new(
            ModelRegistry::builder(InferenceConfig::default())
                .with_classifier(
                    "stub",
                    Box::new(MockClassifier::new(vec![0.05, 0.05, 0.85, 0.05])),
                    names,
                )
                .build(),
        )
    }

    fn test_core(
        registry: Arc<ModelRegistry>,
        narrator: MockNarrativeClient,
    ) -> (Arc<CoreState>, Arc<SqliteSummaryStore>) {
        let store = Arc::new(SqliteSummaryStore::new(open_memory_database().unwrap()));
        let core = CoreState::from_parts(
            AppConfig::default(),
            registry,
            Arc::new(narrator),
            store.clone(),
        );
        (Arc::new(core), store)
    }

    fn png() -> Vec<u8> {
        let film = RgbImage::from_fn(64, 64, |x, _| Rgb([(x * 4) as u8, 40, 40]));
        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(film)
            .write_to(&mut cursor, ImageOutputFormat::Png)
            .unwrap();
        cursor.into_inner()
    }

    /// `(name, filename, bytes)` parts to a multipart body.
    fn multipart_body(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, filename, bytes) in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match filename {
                Some(f) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{f}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                ),
            }
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn analyze_request(parts: &[(&str, Option<&str>, &[u8])], owner: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/analyze")
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            );
        if let Some(o) = owner {
            builder = builder.header(OWNER_HEADER, o);
        }
        builder.body(Body::from(multipart_body(parts))).unwrap()
    }

    fn get_request(uri: &str, owner: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(o) = owner {
            builder = builder.header(OWNER_HEADER, o);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn compare_request(body: String, owner: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/compare")
            .header("Content-Type", "application/json");
        if let Some(o) = owner {
            builder = builder.header(OWNER_HEADER, o);
        }
        builder.body(Body::from(body)).unwrap()
    }

    async fn json_of(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_degraded_without_models() {
        let registry = Arc::new(ModelRegistry::empty(InferenceConfig::default()));
        let (core, _) = test_core(registry, MockNarrativeClient::new(NARRATIVE));
        let response = api_router(core).oneshot(get_request("/health", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_of(response).await;
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["narrative_model"], "mock");
    }

    #[tokio::test]
    async fn health_reports_ok_with_classifier() {
        let (core, _) = test_core(pneumonia_registry(), MockNarrativeClient::new(NARRATIVE));
        let response = api_router(core).oneshot(get_request("/health", None)).await.unwrap();
        assert_eq!(json_of(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn analyze_image_with_owner_persists() {
        let (core, store) = test_core(pneumonia_registry(), MockNarrativeClient::new(NARRATIVE));
        let image = png();
        let request = analyze_request(
            &[("language", None, b"en".as_slice()), ("image", Some("film.png"), image.as_slice())],
            Some("alice"),
        );

        let response = api_router(core).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_of(response).await;
        assert_eq!(json["summary"], NARRATIVE);
        assert_eq!(json["report"]["overall_status"], "Abnormal");
        assert_eq!(json["report"]["findings"][0]["condition"], "Pneumonia");
        assert!(json["summary_id"].is_string());

        let saved = store.list("alice").unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].source_filename.as_deref(), Some("film.png"));
    }

    #[tokio::test]
    async fn analyze_without_owner_does_not_persist() {
        let (core, store) = test_core(pneumonia_registry(), MockNarrativeClient::new(NARRATIVE));
        let image = png();
        let request = analyze_request(&[("image", Some("film.png"), image.as_slice())], None);

        let response = api_router(core).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(json_of(response).await.get("summary_id").is_none());
        assert!(store.list("alice").unwrap().is_empty());
    }

    #[tokio::test]
    async fn analyze_rejects_unknown_language() {
        let (core, _) = test_core(pneumonia_registry(), MockNarrativeClient::new(NARRATIVE));
        let image = png();
        let request = analyze_request(
            &[("language", None, b"klingon".as_slice()), ("image", Some("film.png"), image.as_slice())],
            None,
        );
        let response = api_router(core).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn analyze_without_uploads_is_bad_request() {
        let (core, _) = test_core(pneumonia_registry(), MockNarrativeClient::new(NARRATIVE));
        let request = analyze_request(&[("language", None, b"hi".as_slice())], None);
        let response = api_router(core).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn analyze_unusable_upload_is_unprocessable() {
        let (core, _) = test_core(pneumonia_registry(), MockNarrativeClient::new(NARRATIVE));
        let request = analyze_request(&[("image", Some("film.png"), b"not an image".as_slice())], None);
        let response = api_router(core).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json_of(response).await["error"]["code"], "NO_FINDINGS");
    }

    #[tokio::test]
    async fn narrative_failure_keeps_report() {
        let (core, _) = test_core(pneumonia_registry(), MockNarrativeClient::failing(503, "busy"));
        let image = png();
        let request = analyze_request(&[("image", Some("film.png"), image.as_slice())], Some("alice"));
        let response = api_router(core).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_of(response).await;
        assert!(json["summary"].is_null());
        assert!(json["narrative_error"].is_string());
        assert_eq!(json["report"]["overall_status"], "Abnormal");
    }

    #[tokio::test]
    async fn summaries_require_owner() {
        let (core, _) = test_core(pneumonia_registry(), MockNarrativeClient::new(NARRATIVE));
        let response = api_router(core).oneshot(get_request("/summaries", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn summaries_are_scoped_to_owner() {
        let (core, store) = test_core(pneumonia_registry(), MockNarrativeClient::new(NARRATIVE));
        store.save("alice", TargetLanguage::Hindi, "alice text", None).unwrap();
        store.save("bob", TargetLanguage::English, "bob text", None).unwrap();

        let response = api_router(core)
            .oneshot(get_request("/summaries", Some("alice")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_of(response).await;
        let list = json.as_array().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["summary_text"], "alice text");
        assert!(list[0]["summary_id"].is_string());
    }

    #[tokio::test]
    async fn compare_returns_verdict() {
        let (core, store) = test_core(pneumonia_registry(), MockNarrativeClient::new(COMPARISON));
        let a = store.save("alice", TargetLanguage::English, "first", None).unwrap();
        let b = store.save("alice", TargetLanguage::English, "second", None).unwrap();

        let request = compare_request(format!(r#"{{"ids":["{a}","{b}"]}}"#), Some("alice"));
        let response = api_router(core).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_of(response).await;
        assert_eq!(json["verdict"], "improved");
        assert_eq!(json["confidence"], 80);
    }

    #[tokio::test]
    async fn compare_other_owners_summary_is_not_found() {
        let (core, store) = test_core(pneumonia_registry(), MockNarrativeClient::new(COMPARISON));
        let a = store.save("alice", TargetLanguage::English, "first", None).unwrap();
        let b = store.save("bob", TargetLanguage::English, "second", None).unwrap();

        let request = compare_request(format!(r#"{{"ids":["{a}","{b}"]}}"#), Some("alice"));
        let response = api_router(core).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn compare_single_id_is_bad_request() {
        let (core, store) = test_core(pneumonia_registry(), MockNarrativeClient::new(COMPARISON));
        let a = store.save("alice", TargetLanguage::English, "first", None).unwrap();
        let request = compare_request(format!(r#"{{"ids":["{a}"]}}"#), Some("alice"));
        let response = api_router(core).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn compare_malformed_json_is_bad_request() {
        let (core, _) = test_core(pneumonia_registry(), MockNarrativeClient::new(COMPARISON));
        let request = compare_request("{\"ids\": [\"nope\"]}".into(), Some("alice"));
        let response = api_router(core).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let (core, _) = test_core(pneumonia_registry(), MockNarrativeClient::new(NARRATIVE));
        let response = api_router(core).oneshot(get_request("/nope", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
