use super::*;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde_json::{Value, json};
use shelfscan::web::{AppState, create_router};
use std::time::Duration;
use tower::ServiceExt;

fn test_app(browser: Arc<ScriptedBrowser>) -> (Router, TestCoordinator) {
    let app = start_coordinator(browser);
    let router = create_router(AppState {
        coordinator: app.handle.clone(),
        shared: app.state.clone(),
        registry: Arc::new(StoreRegistry::new().unwrap()),
    });
    (router, app)
}

/// Helper to make HTTP requests to the test app
async fn make_request(app: &Router, method: Method, uri: &str, body: Option<Value>) -> anyhow::Result<(StatusCode, Value)> {
    let mut request = Request::builder().method(method).uri(uri);
    if body.is_some() {
        request = request.header("content-type", "application/json");
    }
    let request = request.body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))?;

    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    Ok((status, serde_json::from_slice(&bytes)?))
}

#[tokio::test]
async fn test_search_over_http_until_published() -> anyhow::Result<()> {
    let (router, app) = test_app(ScriptedBrowser::with_all_stores());

    let (status, body) = make_request(
        &router,
        Method::POST,
        "/api/search",
        Some(json!({"term": "milk", "settings": {
            "aldi": {"enabled": true, "closeTab": true},
            "costco": {"enabled": true, "closeTab": false},
            "kroger": {"enabled": false, "closeTab": true},
            "target": {"enabled": true, "closeTab": true}
        }})),
    )
    .await?;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["success"], true);

    let mut published = Value::Null;
    for _ in 0..50 {
        let (status, body) = make_request(&router, Method::GET, "/api/results", None).await?;
        assert_eq!(status, StatusCode::OK);
        if !body["searchResults"].is_null() {
            published = body;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    assert_eq!(published["currentSearchTerm"], "milk");
    let stores: Vec<_> = published["searchResults"]
        .as_array()
        .map(|results| results.iter().map(|r| r["store"].as_str().unwrap_or_default().to_string()).collect())
        .unwrap_or_default();
    assert_eq!(stores, vec!["aldi", "costco"]);
    assert_eq!(published["searchResults"][0]["products"][0]["name"], "Friendly Farms 2% Milk");
    assert_eq!(published["searchResults"][1]["products"][0]["salesDesc"], "");
    // Unknown stores are dropped from the stored settings.
    assert!(published["storeSettings"].get("target").is_none());

    app.handle.shutdown();
    Ok(())
}

#[tokio::test]
async fn test_store_report_message_over_http() -> anyhow::Result<()> {
    let (router, app) = test_app(ScriptedBrowser::new());

    let (status, body) = make_request(
        &router,
        Method::POST,
        "/api/messages",
        Some(json!({"action": "search", "term": "bread", "settings": {"meijer": {"enabled": true, "closeTab": true}}})),
    )
    .await?;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(body["data"]["session"].is_string());

    let (status, _) = make_request(
        &router,
        Method::POST,
        "/api/messages",
        Some(json!({
            "action": "meijerResults",
            "results": [{"name": "Meijer White Bread", "price": "$1.29", "image": "", "discount": false, "sale": false, "salesDesc": ""}],
            "searchUrl": "https://www.meijer.com/shopping/search.html?text=bread"
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::ACCEPTED);

    let results = tokio::time::timeout(
        Duration::from_secs(5),
        shelfscan::results_view::poll_for_results(&app.state, Duration::from_millis(50)),
    )
    .await?;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].products[0].name, "Meijer White Bread");
    assert_eq!(results[0].products[0].image_url, None);

    app.handle.shutdown();
    Ok(())
}

#[tokio::test]
async fn test_stores_listing() -> anyhow::Result<()> {
    let (router, _app) = test_app(ScriptedBrowser::new());
    let (status, body) = make_request(&router, Method::GET, "/api/stores", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().map(|a| a.len()), Some(5));
    assert_eq!(body["data"][0]["host"], "kroger.com");
    assert_eq!(body["data"][0]["polling"]["max_attempts"], 20);
    Ok(())
}
