//! Integration tests for the OAuth loopback callback server
//!
//! Drives the server with real HTTP requests on an ephemeral port.

use std::sync::Arc;
use std::time::Duration;

use tern_core::{CallbackListener, CallbackListenerFactory};
use tern_domain::TernError;
use tern_infra::{LoopbackCallbackServer, LoopbackListenerFactory, LoopbackSettings};

fn ephemeral() -> LoopbackSettings {
    LoopbackSettings { host: "127.0.0.1".into(), port: 0, path: "/callback".into() }
}

fn http() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().expect("client builds")
}

#[tokio::test]
async fn callback_with_code_resolves_wait_and_stops_server() {
    let server = LoopbackCallbackServer::start(&ephemeral()).await.expect("server starts");
    let redirect = server.redirect_uri();
    assert_eq!(redirect, format!("http://127.0.0.1:{}/callback", server.port()));

    let browser = tokio::spawn(async move {
        let response =
            http().get(format!("{redirect}?code=abc123&state=xyz")).send().await.expect("request");
        (response.status(), response.text().await.expect("body"))
    });

    let result = server.wait_for_callback(Duration::from_secs(5)).await.expect("callback");
    assert_eq!(result.code.as_deref(), Some("abc123"));
    assert_eq!(result.state.as_deref(), Some("xyz"));
    assert!(!result.is_error());

    let (status, body) = browser.await.expect("browser task");
    assert_eq!(status, reqwest::StatusCode::OK);
    assert!(body.contains("Authorization Successful"));

    server.shutdown().await;
    assert!(tokio::net::TcpListener::bind(server.local_addr()).await.is_ok(), "port released");
}

#[tokio::test]
async fn denied_consent_is_delivered_with_failure_page() {
    let server = LoopbackCallbackServer::start(&ephemeral()).await.expect("server starts");
    let url = format!(
        "{}?error=access_denied&error_description=User%20declined&state=xyz",
        server.redirect_uri()
    );

    let response = http().get(url).send().await.expect("request");
    assert!(response.text().await.expect("body").contains("Authorization Failed"));

    let result = server.wait_for_callback(Duration::from_secs(5)).await.expect("callback");
    assert!(result.is_error());
    assert_eq!(result.error.as_deref(), Some("access_denied"));
    assert_eq!(result.error_description.as_deref(), Some("User declined"));
    assert_eq!(result.code, None);
}

#[tokio::test]
async fn other_paths_return_404_and_keep_waiting() {
    let server = Arc::new(LoopbackCallbackServer::start(&ephemeral()).await.expect("server starts"));
    let base = format!("http://{}", server.local_addr());

    let favicon = http().get(format!("{base}/favicon.ico")).send().await.expect("request");
    assert_eq!(favicon.status(), reqwest::StatusCode::NOT_FOUND);

    let waiter = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.wait_for_callback(Duration::from_secs(5)).await })
    };

    http().get(format!("{base}/callback?code=late&state=s1")).send().await.expect("request");
    let result = waiter.await.expect("join").expect("callback");
    assert_eq!(result.code.as_deref(), Some("late"));
}

#[tokio::test]
async fn wait_times_out_and_releases_port() {
    let server = LoopbackCallbackServer::start(&ephemeral()).await.expect("server starts");

    let err = server.wait_for_callback(Duration::from_millis(100)).await.unwrap_err();
    assert_eq!(err, TernError::CallbackTimeout);

    server.shutdown().await;
    assert!(tokio::net::TcpListener::bind(server.local_addr()).await.is_ok());
}

#[tokio::test]
async fn concurrent_wait_is_rejected_and_cancel_resolves_first() {
    let server = Arc::new(LoopbackCallbackServer::start(&ephemeral()).await.expect("server starts"));

    let first = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.wait_for_callback(Duration::from_secs(30)).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = server.wait_for_callback(Duration::from_secs(30)).await.unwrap_err();
    assert_eq!(second, TernError::CallbackAlreadyAwaited);

    server.cancel();
    let first = first.await.expect("join").unwrap_err();
    assert_eq!(first, TernError::CallbackCancelled);
}

#[tokio::test]
async fn stop_is_idempotent() {
    let server = LoopbackCallbackServer::start(&ephemeral()).await.expect("server starts");
    server.stop();
    server.stop();
    server.shutdown().await;

    let err = server.wait_for_callback(Duration::from_secs(1)).await.unwrap_err();
    assert_eq!(err, TernError::CallbackCancelled);
}

#[tokio::test]
async fn busy_fixed_port_reports_network_error() {
    let occupied = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = occupied.local_addr().expect("addr").port();

    let settings = LoopbackSettings { port, ..ephemeral() };
    let err = LoopbackCallbackServer::start(&settings).await.unwrap_err();
    assert!(matches!(err, TernError::NetworkError(_)));
}

#[tokio::test]
async fn relative_callback_path_is_rejected() {
    let settings = LoopbackSettings { path: "callback".into(), ..ephemeral() };
    let err = LoopbackCallbackServer::start(&settings).await.unwrap_err();
    assert!(matches!(err, TernError::Config(_)));
}

#[tokio::test]
async fn factory_starts_a_fresh_listener_each_time() {
    let factory = LoopbackListenerFactory::new(ephemeral());

    let first = factory.start().await.expect("first listener");
    let second = factory.start().await.expect("second listener");
    assert_ne!(first.redirect_uri(), second.redirect_uri());

    first.stop();
    second.stop();
}
