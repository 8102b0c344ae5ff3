//! Axum HTTP handlers for the insights gateway.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use insights_core::{InsightsError, InsightsRequest};
use tracing::{error, warn};

use crate::{
    models::{ErrorBody, InvalidateParams, InvalidateResponse},
    AppState,
};

fn error_response(err: &InsightsError) -> Response {
    let status = if err.is_client_error() {
        warn!(error = %err, "rejected insights request");
        StatusCode::BAD_REQUEST
    } else {
        error!(error = %err, "insights request failed");
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(ErrorBody::new(err.to_string()))).into_response()
}

// ------------------------------------------------------------------ //
//  GET /health                                                        //
// ------------------------------------------------------------------ //

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ------------------------------------------------------------------ //
//  POST /insights                                                     //
// ------------------------------------------------------------------ //

pub async fn post_insights(
    State(state): State<Arc<AppState>>,
    body: Result<Json<InsightsRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            warn!(error = %rejection, "undecodable insights request");
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody::new(rejection.body_text())),
            )
                .into_response();
        }
    };

    match state.service.insights(&request).await {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(e) => error_response(&e),
    }
}

// ------------------------------------------------------------------ //
//  DELETE /insights/cache                                             //
// ------------------------------------------------------------------ //

pub async fn invalidate_cache(
    State(state): State<Arc<AppState>>,
    Query(params): Query<InvalidateParams>,
) -> Response {
    let tenant_id = params.tenant_id.as_deref().filter(|t| !t.is_empty());
    match state.service.invalidate(tenant_id).await {
        Ok(deleted) => (StatusCode::OK, Json(InvalidateResponse { deleted })).into_response(),
        Err(e) => error_response(&e),
    }
}

// ------------------------------------------------------------------ //
//  Tests                                                              //
// ------------------------------------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use insights_core::shaper::{ColumnValue, InsightRow};
    use insights_core::{
        CacheSettings, InsightsCache, InsightsService, MemoryCacheStore, QueryExecutor, SqlQuery,
        TaskQueue, TaskQueueConfig,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct StaticExecutor {
        fail: bool,
    }

    #[async_trait]
    impl QueryExecutor for StaticExecutor {
        async fn fetch(&self, _query: &SqlQuery) -> anyhow::Result<Vec<InsightRow>> {
            if self.fail {
                anyhow::bail!("database unavailable");
            }
            Ok(vec![HashMap::from([
                ("device".to_string(), ColumnValue::Text("mobile_app".into())),
                ("currency".to_string(), ColumnValue::Text("USD".into())),
                (
                    "interval_start".to_string(),
                    ColumnValue::Timestamp("2023-01-23T00:00:00Z".parse().unwrap()),
                ),
                ("spend".to_string(), ColumnValue::Float(300.0)),
                ("impressions".to_string(), ColumnValue::Int(100)),
                ("clicks".to_string(), ColumnValue::Int(0)),
                ("cpm".to_string(), ColumnValue::Float(30.0)),
                ("cpc".to_string(), ColumnValue::Null),
            ])])
        }
    }

    fn state(fail: bool) -> Arc<AppState> {
        let queue = Arc::new(TaskQueue::start(TaskQueueConfig::default()));
        let cache = InsightsCache::new(
            Arc::new(MemoryCacheStore::new()),
            Arc::clone(&queue),
            CacheSettings::default(),
        );
        let service = InsightsService::new(Arc::new(StaticExecutor { fail }), cache);
        Arc::new(AppState { service, queue })
    }

    async fn call(state: Arc<AppState>, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let body = match body {
            Some(v) => Body::from(v.to_string()),
            None => Body::empty(),
        };
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body)
            .unwrap();
        let response = crate::app(state).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (status, body) = call(state(false), Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn insights_returns_a_page() {
        let body = json!({
            "tenantId": "org_1",
            "locale": "en-US",
            "filter": { "groupBy": ["device"], "orderBy": "spend_abs" }
        });
        let (status, body) = call(state(false), Method::POST, "/insights", Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["hasNext"], false);
        assert_eq!(body["edges"][0]["id"], "mobile_app|USD");
        assert_eq!(body["edges"][0]["device"], "mobile_app");
        assert!(body["edges"][0]["datapoints"][0]["cpc"].is_null());
    }

    #[tokio::test]
    async fn missing_tenant_is_bad_request() {
        let body = json!({ "locale": "en-US", "filter": {} });
        let (status, body) = call(state(false), Method::POST, "/insights", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("tenantId"));
    }

    #[tokio::test]
    async fn unknown_search_operator_is_bad_request() {
        let body = json!({
            "tenantId": "org_1",
            "locale": "en-US",
            "filter": { "search": { "term": { "field": "AdName", "operator": "Regex", "value": "x" } } }
        });
        let (status, _) = call(state(false), Method::POST, "/insights", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn executor_failure_is_internal_error() {
        let body = json!({ "tenantId": "org_1", "locale": "en-US", "filter": {} });
        let (status, body) = call(state(true), Method::POST, "/insights", Some(body)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "database unavailable");
    }

    #[tokio::test]
    async fn cache_invalidation_counts_deleted_entries() {
        let state = state(false);
        let body = json!({ "tenantId": "org_1", "locale": "en-US", "filter": {} });
        call(Arc::clone(&state), Method::POST, "/insights", Some(body)).await;
        state.queue.wait_idle().await;

        let (status, body) = call(
            Arc::clone(&state),
            Method::DELETE,
            "/insights/cache?tenantId=org_2",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "deleted": 0 }));

        let (_, body) = call(state, Method::DELETE, "/insights/cache", None).await;
        assert_eq!(body, json!({ "deleted": 1 }));
    }
}
