//! HTTP surface: prediction, KOI listing, diagnostics and metrics routes

use crate::dataset::KoiDataset;
use crate::error::AdapterError;
use crate::metrics::{MetricsSnapshot, ServiceMetrics};
use crate::models::inference::InferenceAdapter;
use crate::models::registry::VersionReport;
use crate::types::features::ExoplanetFeatures;
use crate::types::koi::KoiRow;
use crate::types::prediction::{ErrorResponse, PredictionResponse};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub adapter: InferenceAdapter,
    pub dataset: Arc<KoiDataset>,
    pub metrics: Arc<ServiceMetrics>,
    /// Selector used when the request names none
    pub default_model: Arc<str>,
}

/// Build the application router
pub fn router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/predict", post(predict))
        .route("/koi/list", get(koi_list))
        .route("/diagnostics/versions", get(diagnostics))
        .route("/metrics", get(metrics))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS policy from configured origins; `"*"` allows any origin.
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    if allowed_origins.is_empty() || allowed_origins.iter().any(|o| o == "*") {
        return base.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(origins))
}

/// Error body with its status code
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    fn internal(error: &str, detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: ErrorResponse::new(error, detail),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: rejection.status(),
            body: ErrorResponse::new("invalid_request", rejection.body_text()),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorResponse::new("invalid_request", rejection.body_text()),
        }
    }
}

impl From<AdapterError> for ApiError {
    fn from(err: AdapterError) -> Self {
        let status = match err {
            AdapterError::InvalidSelector { .. } => StatusCode::BAD_REQUEST,
            AdapterError::PredictionFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            body: ErrorResponse::from(&err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "Welcome to the Exoplanet Classifier API 🚀" }))
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct PredictQuery {
    model: Option<String>,
}

async fn predict(
    State(state): State<AppState>,
    query: Result<Query<PredictQuery>, QueryRejection>,
    features: Result<Json<ExoplanetFeatures>, JsonRejection>,
) -> Result<Json<PredictionResponse>, ApiError> {
    let start = Instant::now();
    let Query(query) = query?;
    let Json(features) = features.map_err(|rejection| {
        warn!(error = %rejection.body_text(), "Rejected predict payload");
        ApiError::from(rejection)
    })?;
    let selector = query.model.as_deref().unwrap_or(&state.default_model);
    debug!(
        model = %selector,
        supplied = features.supplied(),
        "Predict request"
    );

    match state.adapter.predict(selector, &features.to_record()) {
        Ok(result) => {
            state
                .metrics
                .record_prediction(selector, &result.label, result.confidence, start.elapsed());
            Ok(Json(PredictionResponse::from(result)))
        }
        Err(err) => {
            match &err {
                AdapterError::InvalidSelector { .. } => {
                    warn!(model = %selector, "Rejected unknown model selector");
                    state.metrics.record_invalid_selector();
                }
                AdapterError::PredictionFailure { .. } => {
                    state.metrics.record_failure(start.elapsed());
                }
            }
            Err(err.into())
        }
    }
}

async fn koi_list(State(state): State<AppState>) -> Result<Json<Vec<KoiRow>>, ApiError> {
    let dataset = state.dataset.clone();
    let rows = tokio::task::spawn_blocking(move || dataset.list())
        .await
        .map_err(|e| {
            error!(error = %e, "KOI listing task failed");
            ApiError::internal("dataset_unavailable", e.to_string())
        })?
        .map_err(|e| {
            error!(error = %e, "Failed to read KOI dataset");
            ApiError::internal("dataset_unavailable", e.to_string())
        })?;
    Ok(Json(rows))
}

async fn diagnostics(State(state): State<AppState>) -> Json<VersionReport> {
    Json(state.adapter.registry().version_report())
}

async fn metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::registry::ModelRegistry;
    use crate::models::testing;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use tower::ServiceExt;

    const RAW: [&str; 3] = ["CANDIDATE", "CONFIRMED", "FALSE POSITIVE"];

    fn state(csv_path: &str) -> AppState {
        let canonical = vec![
            "Candidate".to_string(),
            "Confirmed".to_string(),
            "False Positive".to_string(),
        ];
        let mut stale = testing::forest(&RAW);
        stale.library_version = "1.2.2".to_string();
        for node in &mut stale.nodes {
            node.attrs.clear();
        }
        let registry = ModelRegistry::from_artifacts(
            canonical,
            vec![
                ("lr".to_string(), testing::logistic_pipeline(&["f0"], &RAW)),
                ("rf".to_string(), stale),
            ],
        )
        .unwrap();

        AppState {
            adapter: InferenceAdapter::new(Arc::new(registry)),
            dataset: Arc::new(KoiDataset::new(csv_path, 10)),
            metrics: Arc::new(ServiceMetrics::new()),
            default_model: Arc::from("rf"),
        }
    }

    fn app(state: AppState) -> Router {
        router(state, cors_layer(&["*".to_string()]))
    }

    async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn post_predict(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_default_model_used_without_selector() {
        let state = state("/nonexistent.csv");
        let metrics = state.metrics.clone();

        let (status, body) = call(app(state), post_predict("/predict", r#"{"f0": 1.0}"#)).await;

        // The default forest expects `f0`, which no request field supplies.
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "prediction_failure");
        assert_eq!(metrics.snapshot().failures, 1);
    }

    #[tokio::test]
    async fn test_predict_with_selector() {
        let (status, body) = call(
            app(state("/nonexistent.csv")),
            post_predict("/predict?model=lr", r#"{"koi_period": 10.5, "koi_fpflag_nt": null}"#),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let label = body["prediction"].as_str().unwrap();
        assert!(["Candidate", "Confirmed", "False Positive"].contains(&label));
        let confidence = body["confidence"].as_f64().unwrap();
        assert!((0.0..=1.0).contains(&confidence));
        assert_eq!((confidence * 1000.0).round() / 1000.0, confidence);
    }

    #[tokio::test]
    async fn test_invalid_selector_is_bad_request() {
        let state = state("/nonexistent.csv");
        let metrics = state.metrics.clone();

        let (status, body) =
            call(app(state), post_predict("/predict?model=svm", "{}")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_selector");
        assert!(body["detail"].as_str().unwrap().contains("lr, rf"));
        assert_eq!(metrics.snapshot().invalid_selectors, 1);
    }

    #[tokio::test]
    async fn test_float_encoded_flag_accepted() {
        let (status, body) = call(
            app(state("/nonexistent.csv")),
            post_predict("/predict?model=lr", r#"{"koi_period": 10.5, "koi_fpflag_nt": 1.0}"#),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["prediction"].is_string());
    }

    #[tokio::test]
    async fn test_malformed_body_uses_error_shape() {
        let (status, body) =
            call(app(state("/nonexistent.csv")), post_predict("/predict", "{ not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_request");
        assert!(body["detail"].is_string());

        let (status, body) = call(
            app(state("/nonexistent.csv")),
            post_predict("/predict", r#"{"koi_period": "long"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "invalid_request");
    }

    #[tokio::test]
    async fn test_diagnostics_reports_skew_and_patches() {
        let request = Request::builder()
            .uri("/diagnostics/versions")
            .body(Body::empty())
            .unwrap();
        let (status, body) = call(app(state("/nonexistent.csv")), request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["runtime_version"], crate::models::RUNTIME_LIBRARY_VERSION);
        let rf = body["models"]
            .as_array()
            .unwrap()
            .iter()
            .find(|m| m["selector"] == "rf")
            .unwrap();
        assert_eq!(rf["version_skew"], true);
        assert_eq!(rf["patched_attributes"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_koi_list() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            "kepid,kepoi_name,koi_disposition,koi_period\n10797460,K00752.01,CONFIRMED,9.488\n10811496,K00753.01,CANDIDATE,\n"
        )
        .unwrap();
        let request = Request::builder().uri("/koi/list").body(Body::empty()).unwrap();

        let (status, body) = call(app(state(file.path().to_str().unwrap())), request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);
        assert_eq!(body[0]["kepid"], 10797460);
        assert_eq!(body[1]["koi_period"], Value::Null);
    }

    #[tokio::test]
    async fn test_koi_list_missing_dataset() {
        let request = Request::builder().uri("/koi/list").body(Body::empty()).unwrap();
        let (status, body) = call(app(state("/nonexistent.csv")), request).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "dataset_unavailable");
    }

    #[tokio::test]
    async fn test_root_and_health() {
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let (status, body) = call(app(state("/nonexistent.csv")), request).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["message"].as_str().unwrap().starts_with("Welcome"));

        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app(state("/nonexistent.csv")).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let (status, body) = call(app(state("/nonexistent.csv")), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["requests"], 0);
        assert_eq!(body["confidence_distribution"].as_array().unwrap().len(), 10);
    }
}
