//! End-to-end tests for the HTTP server manager on real sockets.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use axum::http::StatusCode;
use service_runtime::http::options::{
    with_address, with_default_routes, with_handler, with_request_id_header, with_shutdown_timeout, with_tls,
    with_write_timeout,
};
use service_runtime::http::{self, DefaultRoute, Endpoint, NoopBinder, Route, RouteInfo, ServerError};
use service_runtime::AppContext;

mod common;

#[tokio::test]
async fn test_ping_only_server() {
    let ctx = common::context();
    let handle = http::start(
        &ctx,
        &NoopBinder,
        [with_address("127.0.0.1:0"), with_default_routes([DefaultRoute::Ping])],
    )
    .unwrap();
    let addr = handle.local_addr();
    let client = common::client();

    let response = client.get(common::url(addr, "/ping")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "OK");

    let response = client.get(common::url(addr, "/status")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = client.get(common::url(addr, "/doesnotexist")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.text().await.unwrap(), "404 page not found");

    let response = client.post(common::url(addr, "/ping")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

    ctx.cancel();
    ctx.wait().await;
}

#[tokio::test]
async fn test_bound_address_is_rejected() {
    let ctx = common::context();
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = taken.local_addr().unwrap();

    let err = http::start(&ctx, &NoopBinder, [with_address(addr.to_string())]).unwrap_err();
    assert!(matches!(err, ServerError::Bind(_)), "unexpected error: {err}");
}

#[tokio::test]
async fn test_zero_byte_tls_material_fails_before_listening() {
    let ctx = common::context();
    let err = http::start(
        &ctx,
        &NoopBinder,
        [with_address("127.0.0.1:0"), with_tls(Vec::new(), Vec::new())],
    )
    .unwrap_err();
    assert!(matches!(err, ServerError::Tls(_)));

    // Nothing was spawned, so the context has no tasks to wait on.
    ctx.cancel();
    tokio::time::timeout(std::time::Duration::from_secs(1), ctx.wait())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_metrics_only_on_monitoring_listener() {
    let ctx = common::context();
    let public = http::start(
        &ctx,
        &NoopBinder,
        [with_address("127.0.0.1:0"), with_default_routes([DefaultRoute::Ping])],
    )
    .unwrap();
    let monitoring = http::start(
        &ctx,
        &NoopBinder,
        [with_address("127.0.0.1:0"), with_default_routes(DefaultRoute::ALL)],
    )
    .unwrap();
    assert_ne!(public.local_addr(), monitoring.local_addr());
    let client = common::client();

    let response = client.get(common::url(public.local_addr(), "/metrics")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = client
        .get(common::url(monitoring.local_addr(), "/metrics"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.text().await.unwrap();
    assert!(body.contains("http_requests_total"), "exposition: {body}");

    ctx.cancel();
    ctx.wait().await;
}

#[tokio::test]
async fn test_index_lists_every_route_once() {
    let ctx = common::context();
    let binder = |_: &AppContext| {
        vec![
            Route::get("/users", || async { "[]" }).with_description("List users"),
            Route::post("/users", || async { StatusCode::CREATED }).with_description("Create a user"),
        ]
    };
    let handle = http::start(
        &ctx,
        &binder,
        [
            with_address("127.0.0.1:0"),
            with_default_routes([DefaultRoute::Index, DefaultRoute::Ping, DefaultRoute::Pprof]),
        ],
    )
    .unwrap();

    let listed: Vec<RouteInfo> = common::client()
        .get(common::url(handle.local_addr(), "/"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(listed, handle.routes());
    let keys: HashSet<_> = listed.iter().map(|r| (r.method.as_str(), r.path.as_str())).collect();
    assert_eq!(keys.len(), listed.len());
    assert!(listed.contains(&RouteInfo {
        method: "POST".into(),
        path: "/users".into(),
        description: "Create a user".into(),
    }));
    assert!(keys.contains(&("GET", "/")));
    assert!(keys.contains(&("GET", "/pprof/{profile}")));

    ctx.cancel();
    ctx.wait().await;
}

async fn explode() -> &'static str {
    panic!("handler exploded")
}

#[tokio::test]
async fn test_handler_panic_is_contained() {
    let ctx = common::context();
    let binder = |_: &AppContext| vec![Route::get("/panic-test", explode)];
    let handle = http::start(
        &ctx,
        &binder,
        [with_address("127.0.0.1:0"), with_default_routes([DefaultRoute::Ping])],
    )
    .unwrap();
    let client = common::client();

    let response = client
        .get(common::url(handle.local_addr(), "/panic-test"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let response = client.get(common::url(handle.local_addr(), "/ping")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let exposition = ctx.metrics().render();
    assert!(exposition.contains(r#"operation="panic""#), "exposition: {exposition}");

    ctx.cancel();
    ctx.wait().await;
}

#[tokio::test]
async fn test_request_id_round_trip() {
    let ctx = common::context();
    let handle = http::start(
        &ctx,
        &NoopBinder,
        [
            with_address("127.0.0.1:0"),
            with_default_routes([DefaultRoute::Ping]),
            with_request_id_header("x-correlation-id"),
        ],
    )
    .unwrap();
    let client = common::client();

    let response = client
        .get(common::url(handle.local_addr(), "/ping"))
        .header("x-correlation-id", "trace-42")
        .send()
        .await
        .unwrap();
    assert_eq!(response.headers()["x-correlation-id"], "trace-42");

    let response = client.get(common::url(handle.local_addr(), "/missing")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.headers().contains_key("x-correlation-id"));

    ctx.cancel();
    ctx.wait().await;
}

#[tokio::test]
async fn test_status_handler_override() {
    let ctx = common::context();
    let degraded = Endpoint::handler(|| async { (StatusCode::SERVICE_UNAVAILABLE, "database down") });
    let handle = http::start(
        &ctx,
        &NoopBinder,
        [
            with_address("127.0.0.1:0"),
            with_default_routes([DefaultRoute::Status]),
            with_handler(DefaultRoute::Status, degraded),
        ],
    )
    .unwrap();

    let response = common::client()
        .get(common::url(handle.local_addr(), "/status"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    ctx.cancel();
    ctx.wait().await;
}

#[tokio::test]
async fn test_both_servers_stop_on_cancel() {
    let ctx = common::context();
    let first = http::start(&ctx, &NoopBinder, [with_address("127.0.0.1:0")]).unwrap();
    let second = http::start(&ctx, &NoopBinder, [with_address("127.0.0.1:0")]).unwrap();

    for addr in [first.local_addr(), second.local_addr()] {
        assert!(tokio::net::TcpStream::connect(addr).await.is_ok());
    }

    ctx.cancel();
    tokio::time::timeout(std::time::Duration::from_secs(15), ctx.wait())
        .await
        .unwrap();

    for addr in [first.local_addr(), second.local_addr()] {
        assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    }
}

#[tokio::test]
async fn test_tls_listener_serves_https() {
    let ctx = common::context();
    let (cert, key) = common::self_signed();
    let handle = http::start(
        &ctx,
        &NoopBinder,
        [
            with_address("127.0.0.1:0"),
            with_default_routes([DefaultRoute::Ping]),
            with_tls(cert, key),
        ],
    )
    .unwrap();
    let addr = handle.local_addr();

    let response = common::https_client()
        .get(format!("https://{addr}/ping"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "OK");

    // Plain HTTP is not spoken on a TLS listener.
    assert!(common::client().get(common::url(addr, "/ping")).send().await.is_err());

    ctx.cancel();
    ctx.wait().await;
}

async fn slow() -> &'static str {
    tokio::time::sleep(Duration::from_millis(500)).await;
    "done"
}

#[tokio::test]
async fn test_in_flight_request_finishes_after_cancel() {
    let ctx = common::context();
    let binder = |_: &AppContext| vec![Route::get("/slow", slow)];
    let handle = http::start(&ctx, &binder, [with_address("127.0.0.1:0")]).unwrap();

    let request = tokio::spawn(common::client().get(common::url(handle.local_addr(), "/slow")).send());
    tokio::time::sleep(Duration::from_millis(150)).await;
    ctx.cancel();

    let response = request.await.unwrap().unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "done");

    tokio::time::timeout(Duration::from_secs(5), ctx.wait()).await.unwrap();
    let exposition = ctx.metrics().render();
    assert!(exposition.contains(r#"code="ok"} 1"#), "exposition: {exposition}");
    assert!(!exposition.contains(r#"code="timeout""#), "exposition: {exposition}");
}

#[tokio::test]
async fn test_slow_handler_times_out_with_408() {
    let ctx = common::context();
    let binder = |_: &AppContext| vec![Route::get("/slow", slow)];
    let handle = http::start(
        &ctx,
        &binder,
        [with_address("127.0.0.1:0"), with_write_timeout(Duration::from_millis(100))],
    )
    .unwrap();

    let response = common::client()
        .get(common::url(handle.local_addr(), "/slow"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);

    ctx.cancel();
    ctx.wait().await;
}

async fn hang() -> &'static str {
    tokio::time::sleep(Duration::from_secs(60)).await;
    "too late"
}

#[tokio::test]
async fn test_shutdown_overrun_is_bounded_and_counted() {
    let ctx = common::context();
    let binder = |_: &AppContext| vec![Route::get("/hang", hang)];
    let handle = http::start(
        &ctx,
        &binder,
        [with_address("127.0.0.1:0"), with_shutdown_timeout(Duration::from_secs(1))],
    )
    .unwrap();

    let request = tokio::spawn(common::client().get(common::url(handle.local_addr(), "/hang")).send());
    tokio::time::sleep(Duration::from_millis(150)).await;

    let started = Instant::now();
    ctx.cancel();
    tokio::time::timeout(Duration::from_secs(10), ctx.wait()).await.unwrap();
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(900), "drained in {elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "drained in {elapsed:?}");

    // The hanging request was cut off rather than answered.
    assert!(request.await.unwrap().is_err());

    let exposition = ctx.metrics().render();
    assert!(exposition.contains(r#"code="timeout"} 1"#), "exposition: {exposition}");
}
