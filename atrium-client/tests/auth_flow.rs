//! Behavior of the authenticated client against a scripted backend

use atrium_client::{
    create_http_client, ApiClientConfig, ApiRequest, AuthClient, HttpTokenRefresher,
    RefreshEvent, SessionCheckWorker, TokenRefreshCoordinator,
};
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use reqwest::cookie::Jar;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct Script {
    data_hits: AtomicUsize,
    refresh_hits: AtomicUsize,
    check_hits: AtomicUsize,
}

async fn spawn_backend(app: Router) -> anyhow::Result<String> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Ok(format!("http://{}/api", addr))
}

fn build_client(base_url: &str) -> (Arc<AuthClient>, Arc<TokenRefreshCoordinator>) {
    let config = ApiClientConfig {
        base_url: base_url.to_string(),
        timeout_seconds: 5,
        ..Default::default()
    };
    let jar = Arc::new(Jar::default());
    let http = create_http_client(&config, Arc::clone(&jar)).unwrap();
    let refresher = HttpTokenRefresher::new(http.clone(), &config.base_url);
    let coordinator = Arc::new(TokenRefreshCoordinator::new(Arc::new(refresher)));
    let client =
        AuthClient::from_parts(http, jar, config, Arc::clone(&coordinator)).unwrap();
    (Arc::new(client), coordinator)
}

#[tokio::test]
async fn retry_once_after_successful_refresh() -> anyhow::Result<()> {
    let script = Arc::new(Script::default());

    let data_script = Arc::clone(&script);
    let refresh_script = Arc::clone(&script);
    let app = Router::new()
        .route(
            "/api/auth/data",
            get(move || {
                let script = Arc::clone(&data_script);
                async move {
                    if script.data_hits.fetch_add(1, Ordering::SeqCst) == 0 {
                        StatusCode::UNAUTHORIZED
                    } else {
                        StatusCode::OK
                    }
                }
            }),
        )
        .route(
            "/api/auth/refresh-token",
            post(move || {
                let script = Arc::clone(&refresh_script);
                async move {
                    script.refresh_hits.fetch_add(1, Ordering::SeqCst);
                    StatusCode::OK
                }
            }),
        );

    let base_url = spawn_backend(app).await?;
    let (client, _) = build_client(&base_url);

    let response = client.execute(&ApiRequest::get("auth/data")).await?;

    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(script.data_hits.load(Ordering::SeqCst), 2);
    assert_eq!(script.refresh_hits.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn second_401_is_surfaced_without_looping() -> anyhow::Result<()> {
    let script = Arc::new(Script::default());

    let data_script = Arc::clone(&script);
    let refresh_script = Arc::clone(&script);
    let app = Router::new()
        .route(
            "/api/auth/data",
            get(move || {
                let script = Arc::clone(&data_script);
                async move {
                    script.data_hits.fetch_add(1, Ordering::SeqCst);
                    StatusCode::UNAUTHORIZED
                }
            }),
        )
        .route(
            "/api/auth/refresh-token",
            post(move || {
                let script = Arc::clone(&refresh_script);
                async move {
                    script.refresh_hits.fetch_add(1, Ordering::SeqCst);
                    StatusCode::OK
                }
            }),
        );

    let base_url = spawn_backend(app).await?;
    let (client, _) = build_client(&base_url);

    let response = client.execute(&ApiRequest::get("auth/data")).await?;

    // The refresh "succeeded" but the endpoint still says 401. Exactly
    // two attempts, and the second 401 comes back unchanged.
    assert_eq!(response.status().as_u16(), 401);
    assert_eq!(script.data_hits.load(Ordering::SeqCst), 2);
    assert_eq!(script.refresh_hits.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn rejected_refresh_returns_original_401() -> anyhow::Result<()> {
    let script = Arc::new(Script::default());

    let data_script = Arc::clone(&script);
    let refresh_script = Arc::clone(&script);
    let app = Router::new()
        .route(
            "/api/auth/data",
            get(move || {
                let script = Arc::clone(&data_script);
                async move {
                    script.data_hits.fetch_add(1, Ordering::SeqCst);
                    StatusCode::UNAUTHORIZED
                }
            }),
        )
        .route(
            "/api/auth/refresh-token",
            post(move || {
                let script = Arc::clone(&refresh_script);
                async move {
                    script.refresh_hits.fetch_add(1, Ordering::SeqCst);
                    StatusCode::UNAUTHORIZED
                }
            }),
        );

    let base_url = spawn_backend(app).await?;
    let (client, coordinator) = build_client(&base_url);
    let mut events = coordinator.subscribe();

    let response = client.execute(&ApiRequest::get("auth/data")).await?;

    // No replay without a renewed session.
    assert_eq!(response.status().as_u16(), 401);
    assert_eq!(script.data_hits.load(Ordering::SeqCst), 1);
    assert_eq!(script.refresh_hits.load(Ordering::SeqCst), 1);

    assert_eq!(events.recv().await?, RefreshEvent::Started);
    assert_eq!(events.recv().await?, RefreshEvent::Failed);
    Ok(())
}

#[tokio::test]
async fn refreshed_cookies_reach_the_replay() -> anyhow::Result<()> {
    let app = Router::new()
        .route(
            "/api/auth/data",
            get(|headers: HeaderMap| async move {
                let authed = headers
                    .get(header::COOKIE)
                    .and_then(|value| value.to_str().ok())
                    .is_some_and(|cookies| cookies.contains("access_token=renewed"));
                if authed {
                    StatusCode::OK
                } else {
                    StatusCode::UNAUTHORIZED
                }
            }),
        )
        .route(
            "/api/auth/refresh-token",
            post(|| async {
                (
                    [(header::SET_COOKIE, "access_token=renewed; Path=/")],
                    "ok",
                )
            }),
        );

    let base_url = spawn_backend(app).await?;
    let (client, _) = build_client(&base_url);

    let response = client.execute(&ApiRequest::get("auth/data")).await?;

    assert_eq!(response.status().as_u16(), 200);
    Ok(())
}

#[tokio::test]
async fn post_body_is_replayed_identically() -> anyhow::Result<()> {
    let script = Arc::new(Script::default());

    let data_script = Arc::clone(&script);
    let refresh_script = Arc::clone(&script);
    let app = Router::new()
        .route(
            "/api/reports/export",
            post(move |Json(body): Json<serde_json::Value>| {
                let script = Arc::clone(&data_script);
                async move {
                    let attempt = script.data_hits.fetch_add(1, Ordering::SeqCst);
                    if body != json!({"format": "csv", "year": 2025}) {
                        StatusCode::UNPROCESSABLE_ENTITY
                    } else if attempt == 0 {
                        StatusCode::UNAUTHORIZED
                    } else {
                        StatusCode::OK
                    }
                }
            }),
        )
        .route(
            "/api/auth/refresh-token",
            post(move || {
                let script = Arc::clone(&refresh_script);
                async move {
                    script.refresh_hits.fetch_add(1, Ordering::SeqCst);
                    StatusCode::OK
                }
            }),
        );

    let base_url = spawn_backend(app).await?;
    let (client, _) = build_client(&base_url);

    let response = client
        .post_json("reports/export", &json!({"format": "csv", "year": 2025}))
        .await?;

    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(script.data_hits.load(Ordering::SeqCst), 2);
    assert_eq!(script.refresh_hits.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn user_cookie_snapshot_reads_and_clears() -> anyhow::Result<()> {
    // URL-encoded {"id":"u-9","firstName":"Ana","lastName":"Reyes"}
    let cookie = "user=%7B%22id%22%3A%22u-9%22%2C%22firstName%22%3A%22Ana%22%2C%22lastName%22%3A%22Reyes%22%7D; Path=/";
    let app = Router::new().route(
        "/api/auth/login",
        post(move || async move { ([(header::SET_COOKIE, cookie)], "ok") }),
    );

    let base_url = spawn_backend(app).await?;
    let (client, _) = build_client(&base_url);

    assert!(client.user_cookie_snapshot().is_none());

    client
        .http()
        .post(format!("{}/auth/login", base_url))
        .send()
        .await?;

    let snapshot = client.user_cookie_snapshot().expect("cookie should parse");
    assert_eq!(snapshot.id, "u-9");
    assert_eq!(snapshot.full_name(), "Ana Reyes");

    client.clear_session_cookies();
    assert!(client.user_cookie_snapshot().is_none());
    Ok(())
}

#[tokio::test]
async fn check_worker_poke_and_shutdown() -> anyhow::Result<()> {
    let script = Arc::new(Script::default());

    let check_script = Arc::clone(&script);
    let app = Router::new().route(
        "/api/auth/check-session",
        get(move || {
            let script = Arc::clone(&check_script);
            async move {
                script.check_hits.fetch_add(1, Ordering::SeqCst);
                StatusCode::OK
            }
        }),
    );

    let base_url = spawn_backend(app).await?;
    let (client, _) = build_client(&base_url);

    let mut worker = SessionCheckWorker::new(
        Arc::clone(&client),
        Duration::from_secs(3600),
        Duration::ZERO,
    );
    assert!(!worker.is_running());
    worker.start();
    assert!(worker.is_running());

    worker.poke();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(script.check_hits.load(Ordering::SeqCst), 1);

    worker.shutdown().await;
    assert!(!worker.is_running());

    // A poke after shutdown must not reach the backend.
    worker.poke();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(script.check_hits.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn check_worker_ticks_on_interval() -> anyhow::Result<()> {
    let script = Arc::new(Script::default());

    let check_script = Arc::clone(&script);
    let app = Router::new().route(
        "/api/auth/check-session",
        get(move || {
            let script = Arc::clone(&check_script);
            async move {
                script.check_hits.fetch_add(1, Ordering::SeqCst);
                StatusCode::OK
            }
        }),
    );

    let base_url = spawn_backend(app).await?;
    let (client, _) = build_client(&base_url);

    let mut worker = SessionCheckWorker::new(
        Arc::clone(&client),
        Duration::from_millis(200),
        Duration::ZERO,
    );
    worker.start();

    tokio::time::sleep(Duration::from_millis(700)).await;
    worker.shutdown().await;

    let hits = script.check_hits.load(Ordering::SeqCst);
    assert!((2..=4).contains(&hits), "expected 2-4 checks, saw {}", hits);
    Ok(())
}
