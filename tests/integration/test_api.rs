//! REST surface tests driven through the router with `oneshot`.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use budget_query::api::create_rest_router_with_shutdown;
use budget_query::{
    create_rest_router, DatabaseError, Record, ReportEngine, RestApiConfig, SchemaRegistry,
    StaticDatastore,
};

fn router(store: StaticDatastore) -> (Router, Arc<StaticDatastore>) {
    let store = Arc::new(store);
    let engine = ReportEngine::new(Arc::new(SchemaRegistry::municipal().unwrap()))
        .with_datastore(store.clone());
    let router = create_rest_router(Arc::new(engine), &RestApiConfig::default());
    (router, store)
}

fn count_rows(n: i64) -> Vec<Record> {
    vec![json!({"count": n}).as_object().unwrap().clone()]
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn post(router: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(router, request).await
}

async fn get(router: Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(router, request).await
}

#[tokio::test]
async fn test_health() {
    let (router, _) = router(StaticDatastore::default());
    let (status, body) = get(router, "/api/v1/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["datastore"], "static");
    assert_eq!(body["model"], false);
}

#[tokio::test]
async fn test_list_domains() {
    let (router, _) = router(StaticDatastore::default());
    let (status, body) = get(router, "/api/v1/schema/domains").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 5);
    assert_eq!(body["domains"][0]["key"], "tabarim");
    assert!(body["domains"][0]["fields"].as_array().unwrap().len() > 3);
}

#[tokio::test]
async fn test_query_completes() {
    let (router, store) = router(StaticDatastore::new(count_rows(9)));
    let (status, body) = post(
        router,
        "/api/v1/reports/query",
        json!({"query": "כמה פרויקטים פעילים יש"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["rows"][0]["count"], 9);
    assert_eq!(body["summary"]["totalRows"], 1);
    assert_eq!(body["metadata"]["querySource"], "rules");
    assert_eq!(store.calls(), 1);
}

#[tokio::test]
async fn test_confirmation_round_trip() {
    let (router, store) = router(StaticDatastore::new(count_rows(0)));

    let (status, body) = post(
        router.clone(),
        "/api/v1/reports/query",
        json!({"query": "xyz123"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "needs_confirmation");
    assert_eq!(body["intent"]["domain"], "comprehensive");
    assert_eq!(store.calls(), 0);

    let intent = body["intent"].clone();
    let (status, declined) = post(
        router.clone(),
        "/api/v1/reports/confirm",
        json!({"intent": intent, "confirmed": false}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(declined["status"], "declined");
    assert_eq!(store.calls(), 0);

    let (status, body) = post(
        router,
        "/api/v1/reports/confirm",
        json!({"intent": intent, "confirmed": true}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["metadata"]["querySource"], "fallback");
    assert_eq!(store.calls(), 1);
}

#[tokio::test]
async fn test_confirm_is_cancelled_on_shutdown() {
    let store = Arc::new(StaticDatastore::new(count_rows(3)));
    let engine = ReportEngine::new(Arc::new(SchemaRegistry::municipal().unwrap()))
        .with_datastore(store.clone());
    let shutdown = CancellationToken::new();
    let router = create_rest_router_with_shutdown(
        Arc::new(engine),
        &RestApiConfig::default(),
        shutdown.clone(),
    );
    shutdown.cancel();

    let intent = json!({
        "domain": "tabarim",
        "action": "count",
        "filters": {},
        "confidence": 0.5,
        "source": "rules"
    });
    let (status, body) = post(
        router,
        "/api/v1/reports/confirm",
        json!({"intent": intent, "confirmed": true}),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "cancelled");
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn test_empty_query_is_bad_request() {
    let (router, _) = router(StaticDatastore::default());
    let (status, body) = post(router, "/api/v1/reports/query", json!({"query": ""})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");
    assert_eq!(body["error"], "יש להזין שאלה");
}

#[tokio::test]
async fn test_unknown_structured_domain_is_bad_request() {
    let (router, _) = router(StaticDatastore::default());
    let (status, body) = post(
        router,
        "/api/v1/reports/query",
        json!({"domain": "salaries", "action": "list"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");
}

#[tokio::test]
async fn test_database_failure_hides_detail() {
    let (router, _) = router(
        StaticDatastore::new(vec![])
            .with_failure(DatabaseError::Query("relation \"tabarim\" does not exist".to_string())),
    );
    let (status, body) = post(
        router,
        "/api/v1/reports/query",
        json!({"query": "כמה פרויקטים פעילים יש"}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "database_error");
    assert!(!body["error"].as_str().unwrap().contains("relation"));
}

#[tokio::test]
async fn test_custom_prefix() {
    let engine = ReportEngine::new(Arc::new(SchemaRegistry::municipal().unwrap()));
    let config = RestApiConfig {
        enable_cors: false,
        prefix: "/reports-api".to_string(),
    };
    let router = create_rest_router(Arc::new(engine), &config);
    let (status, body) = get(router, "/reports-api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["datastore"], Value::Null);
}
