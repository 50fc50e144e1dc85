//! HTTP surface for the counter.
//!
//! Every response is wrapped in one envelope: `{"success": true, "data": ...}`
//! from handlers, `{"success": false, "error": ...}` from [`CounterError`].

use anyhow::Result;
use axum::{
    extract::State,
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::{
    error::CounterError,
    ethereum::{ContractInfo, TransactionOutcome},
    service::CounterService,
};

#[derive(Clone)]
pub struct AppState {
    pub counter: Arc<CounterService>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    pub timestamp: DateTime<Utc>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            timestamp: Utc::now(),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope<E> {
    pub success: bool,
    pub status_code: u16,
    pub error: E,
    pub timestamp: DateTime<Utc>,
}

impl<E: Serialize> ErrorEnvelope<E> {
    pub fn new(status: StatusCode, error: E) -> Self {
        Self {
            success: false,
            status_code: status.as_u16(),
            error,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: u64,
}

type ApiResult<T> = Result<ApiResponse<T>, CounterError>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/counter", get(get_count))
        .route("/counter/info", get(get_contract_info))
        .route("/counter/increment", post(increment))
        .route("/counter/decrement", post(decrement))
        .route("/counter/reset", post(reset))
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds the listener and serves until Ctrl-C.
pub async fn start_server(bind_addr: &str, state: AppState) -> Result<()> {
    let app = router(state);
    let listener = TcpListener::bind(bind_addr).await?;
    info!("Server is running on: http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn get_count(State(state): State<AppState>) -> ApiResult<CountResponse> {
    let count = state.counter.read_count().await?;
    Ok(ApiResponse::ok(CountResponse { count }))
}

async fn get_contract_info(State(state): State<AppState>) -> ApiResult<ContractInfo> {
    Ok(ApiResponse::ok(state.counter.contract_info()?))
}

async fn increment(State(state): State<AppState>) -> ApiResult<TransactionOutcome> {
    Ok(ApiResponse::ok(state.counter.increment().await?))
}

async fn decrement(State(state): State<AppState>) -> ApiResult<TransactionOutcome> {
    Ok(ApiResponse::ok(state.counter.decrement().await?))
}

async fn reset(State(state): State<AppState>) -> ApiResult<TransactionOutcome> {
    Ok(ApiResponse::ok(state.counter.reset().await?))
}

async fn not_found(uri: Uri) -> CounterError {
    CounterError::NotFound(uri.path().to_string())
}

async fn method_not_allowed(method: Method, uri: Uri) -> CounterError {
    CounterError::MethodNotAllowed {
        method: method.to_string(),
        path: uri.path().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ethereum::counter::mock::MockCounter;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app_with(service: CounterService) -> Router {
        router(AppState {
            counter: Arc::new(service),
        })
    }

    fn loaded_app() -> Router {
        app_with(CounterService::loaded(
            "localhost",
            Arc::new(MockCounter::new()),
            Duration::from_secs(5),
        ))
    }

    async fn call(app: &Router, method: Method, path: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(path)
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_get_count_wraps_data() {
        let app = loaded_app();
        let (status, body) = call(&app, Method::GET, "/counter").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["count"], 0);
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_increment_increment_decrement_scenario() {
        let app = loaded_app();
        call(&app, Method::POST, "/counter/increment").await;
        call(&app, Method::POST, "/counter/increment").await;
        let (status, body) = call(&app, Method::POST, "/counter/decrement").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["newCount"], 1);
        for key in ["txHash", "gasUsed", "gasPrice", "gasCostEth"] {
            assert!(body["data"][key].is_string(), "missing {}", key);
        }

        let (_, body) = call(&app, Method::GET, "/counter").await;
        assert_eq!(body["data"]["count"], 1);
    }

    #[tokio::test]
    async fn test_decrement_revert_is_distinct() {
        let app = loaded_app();
        let (status, body) = call(&app, Method::POST, "/counter/decrement").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert_eq!(body["statusCode"], 500);
        assert_eq!(body["error"]["code"], "STATE_TRANSITION_REJECTED");
    }

    #[tokio::test]
    async fn test_reset_route() {
        let app = loaded_app();
        call(&app, Method::POST, "/counter/increment").await;
        let (status, body) = call(&app, Method::POST, "/counter/reset").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["newCount"], 0);
    }

    #[tokio::test]
    async fn test_info_route() {
        let app = loaded_app();
        let (status, body) = call(&app, Method::GET, "/counter/info").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["data"]["address"],
            "0x5FbDB2315678afecb367f032d93F642f64180aa3"
        );
        assert_eq!(body["data"]["network"], "localhost");
    }

    #[tokio::test]
    async fn test_unloaded_count_is_bad_request() {
        let app = app_with(CounterService::unloaded(
            "localhost",
            "no deployment record",
            Duration::from_secs(5),
        ));

        for (method, path) in [
            (Method::GET, "/counter"),
            (Method::GET, "/counter/info"),
            (Method::POST, "/counter/increment"),
        ] {
            let (status, body) = call(&app, method, path).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", path);
            assert_eq!(body["error"]["code"], "NOT_INITIALIZED");
            assert!(body["error"]["message"]
                .as_str()
                .unwrap()
                .contains("not initialized"));
        }
    }

    #[tokio::test]
    async fn test_read_only_write_is_bad_request() {
        let app = app_with(CounterService::loaded(
            "localhost",
            Arc::new(MockCounter::read_only()),
            Duration::from_secs(5),
        ));

        let (status, body) = call(&app, Method::POST, "/counter/increment").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "CONFIGURATION_ERROR");
    }

    #[tokio::test]
    async fn test_chain_failure_is_server_error() {
        let mut mock = MockCounter::new();
        mock.fail_reads = true;
        let app = app_with(CounterService::loaded(
            "localhost",
            Arc::new(mock),
            Duration::from_secs(5),
        ));

        let (status, body) = call(&app, Method::GET, "/counter").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "CHAIN_CALL_ERROR");
    }

    #[tokio::test]
    async fn test_unknown_route_uses_envelope() {
        let app = loaded_app();
        let (status, body) = call(&app, Method::GET, "/nope").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_wrong_method_uses_envelope() {
        let app = loaded_app();

        for (method, path) in [
            (Method::GET, "/counter/increment"),
            (Method::POST, "/counter"),
            (Method::DELETE, "/counter/reset"),
        ] {
            let (status, body) = call(&app, method, path).await;
            assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED, "{}", path);
            assert_eq!(body["success"], false);
            assert_eq!(body["statusCode"], 405);
            assert_eq!(body["error"]["code"], "METHOD_NOT_ALLOWED");
            assert!(body["error"]["message"].as_str().unwrap().contains(path));
            assert!(body["timestamp"].is_string());
        }

        // the counter is untouched by the rejected GET
        let (_, body) = call(&app, Method::GET, "/counter").await;
        assert_eq!(body["data"]["count"], 0);
    }
}
