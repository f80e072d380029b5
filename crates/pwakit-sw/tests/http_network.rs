//! `HttpNetwork` against a mock HTTP server.

use pwakit_sw::{
    CacheStorage, Clients, HttpNetwork, InstallOutcome, MemoryNotificationCenter, Network,
    Request, RequestMode, ResponseType, WorkerConfig, WorkerContext, WorkerError, WorkerRuntime,
};
use std::sync::Arc;
use url::Url;
use wiremock::matchers::{body_string, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn server_url(server: &MockServer, route: &str) -> Url {
    Url::parse(&server.uri()).unwrap().join(route).unwrap()
}

#[tokio::test]
async fn test_same_origin_response_is_basic() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tasks"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(r#"[{"id":1}]"#, "application/json"),
        )
        .mount(&server)
        .await;

    let network = HttpNetwork::new(server_url(&server, "/")).unwrap();
    let response = network
        .fetch(Request::get(server_url(&server, "/api/tasks")))
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.response_type, ResponseType::Basic);
    assert_eq!(response.text().unwrap(), r#"[{"id":1}]"#);
    assert_eq!(
        response.headers.get("content-type").unwrap(),
        "application/json"
    );
    assert!(response.is_cacheable());
}

#[tokio::test]
async fn test_error_status_is_not_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let network = HttpNetwork::new(server_url(&server, "/")).unwrap();
    let response = network
        .fetch(Request::get(server_url(&server, "/missing")))
        .await
        .unwrap();
    assert_eq!(response.status, 404);
    assert!(!response.is_cacheable());
}

#[tokio::test]
async fn test_post_body_is_forwarded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/tasks"))
        .and(body_string(r#"{"title":"new"}"#))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let network = HttpNetwork::new(server_url(&server, "/")).unwrap();
    let response = network
        .fetch(Request::post(
            server_url(&server, "/api/tasks"),
            r#"{"title":"new"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status, 201);
}

#[tokio::test]
async fn test_cross_origin_responses() {
    let app = MockServer::start().await;
    let cdn = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("lib"))
        .mount(&cdn)
        .await;

    let network = HttpNetwork::new(server_url(&app, "/")).unwrap();
    let target = server_url(&cdn, "/lib.js");

    let cors = network.fetch(Request::get(target.clone())).await.unwrap();
    assert_eq!(cors.response_type, ResponseType::Cors);
    assert_eq!(cors.text().unwrap(), "lib");
    assert!(!cors.is_cacheable());

    let opaque = network
        .fetch(Request::get(target).mode(RequestMode::NoCors))
        .await
        .unwrap();
    assert_eq!(opaque.response_type, ResponseType::Opaque);
    assert!(opaque.body.is_empty());
}

#[tokio::test]
async fn test_unreachable_host_is_network_error() {
    let origin = Url::parse("http://127.0.0.1:1/").unwrap();
    let network = HttpNetwork::new(origin.clone()).unwrap();
    let result = network.fetch(Request::get(origin)).await;
    assert!(matches!(result, Err(WorkerError::Network(_))));
}

#[tokio::test]
async fn test_worker_installs_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("asset"))
        .mount(&server)
        .await;

    let origin = server_url(&server, "/");
    let config = WorkerConfig::for_origin(origin.clone());
    let manifest_len = config.precache.len();
    let caches = Arc::new(CacheStorage::new());
    let ctx = WorkerContext::new(
        config,
        Arc::clone(&caches),
        Arc::new(HttpNetwork::new(origin.clone()).unwrap()),
        Arc::new(Clients::new()),
        Arc::new(MemoryNotificationCenter::new()),
    );
    let handle = WorkerRuntime::new(ctx).spawn();

    assert_eq!(
        handle.install().await.unwrap(),
        InstallOutcome::Seeded {
            entries: manifest_len
        }
    );
    handle.activate().await.unwrap();

    let cached = handle
        .fetch(Request::get(origin.join("/dashboard").unwrap()))
        .await
        .unwrap();
    assert!(cached.from_cache);
    assert_eq!(cached.text().unwrap(), "asset");
    handle.shutdown().await;
}
