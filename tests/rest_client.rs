use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use palserver_admin::error::ErrorKind;
use palserver_admin::rest_api::{AdminApi, AdminApiClient, ApiPayload, Connection, GenericAck};
use serde_json::{json, Value};
use std::io::{Read, Write};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Default)]
struct Recorded {
    requests: Arc<Mutex<Vec<(String, Option<String>, Value)>>>,
}

async fn spawn(router: Router) -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind failed");
    let addr = listener.local_addr().expect("no local addr");
    tokio::spawn(async move {
        axum::Server::from_tcp(listener)
            .expect("server from listener")
            .serve(router.into_make_service())
            .await
            .expect("mock server failed");
    });
    addr
}

fn client(addr: SocketAddr, password: &str) -> AdminApiClient {
    let connection = Connection::new("127.0.0.1", addr.port(), password).expect("connection");
    AdminApiClient::new(connection).expect("client")
}

fn record(recorded: &Recorded, path: &str, headers: &HeaderMap, body: Value) {
    let auth = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    recorded
        .requests
        .lock()
        .unwrap()
        .push((path.to_string(), auth, body));
}

fn recording_router(recorded: Recorded) -> Router {
    Router::new()
        .route(
            "/v1/api/info",
            get(|| async { (StatusCode::OK, "{}".to_string()) }),
        )
        .route(
            "/v1/api/players",
            get(|| async {
                (
                    StatusCode::OK,
                    json!({ "players": [{ "name": "Anya", "level": 4, "userId": "steam_1" }] })
                        .to_string(),
                )
            }),
        )
        .route(
            "/v1/api/shutdown",
            post(
                |State(recorded): State<Recorded>, headers: HeaderMap, Json(body): Json<Value>| async move {
                    record(&recorded, "/shutdown", &headers, body);
                    StatusCode::OK
                },
            ),
        )
        .route(
            "/v1/api/kick",
            post(
                |State(recorded): State<Recorded>, headers: HeaderMap, Json(body): Json<Value>| async move {
                    record(&recorded, "/kick", &headers, body);
                    StatusCode::OK
                },
            ),
        )
        .route("/v1/api/save", post(|| async { StatusCode::OK }))
        .route(
            "/v1/api/announce",
            post(|| async { (StatusCode::BAD_REQUEST, "message is required".to_string()) }),
        )
        .route(
            "/v1/api/stop",
            post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "busy".to_string()) }),
        )
        .with_state(recorded)
}

#[tokio::test]
async fn empty_object_is_json_payload() {
    let addr = spawn(recording_router(Recorded::default())).await;
    let payload = client(addr, "secret").get_server_info().await.expect("info failed");
    assert_eq!(payload, ApiPayload::Json(json!({})));
}

#[tokio::test]
async fn empty_body_is_generic_ack() {
    let addr = spawn(recording_router(Recorded::default())).await;
    let payload = client(addr, "secret").save_world().await.expect("save failed");
    assert_eq!(payload, ApiPayload::Ack(GenericAck::success()));
}

#[tokio::test]
async fn shutdown_sends_clamped_waittime_with_basic_auth() {
    let recorded = Recorded::default();
    let addr = spawn(recording_router(recorded.clone())).await;

    client(addr, "secret")
        .shutdown(5, "bye")
        .await
        .expect("shutdown failed");

    let requests = recorded.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    let (path, auth, body) = &requests[0];
    assert_eq!(path, "/shutdown");
    assert_eq!(auth.as_deref(), Some("Basic YWRtaW46c2VjcmV0"));
    assert_eq!(body, &json!({ "waittime": 1 }));
}

#[tokio::test]
async fn kick_sends_user_id() {
    let recorded = Recorded::default();
    let addr = spawn(recording_router(recorded.clone())).await;

    client(addr, "secret")
        .kick_player("steam_1")
        .await
        .expect("kick failed");

    let requests = recorded.requests.lock().unwrap().clone();
    assert_eq!(requests[0].2, json!({ "userId": "steam_1" }));
}

#[tokio::test]
async fn error_statuses_are_classified() {
    let addr = spawn(recording_router(Recorded::default())).await;
    let api = client(addr, "secret");

    let err = api.announce("").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::BadRequest);
    assert_eq!(err.detail, "message is required");

    let err = api.stop().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::HttpError);
    assert_eq!(err.detail, "503: busy");
}

#[tokio::test]
async fn unauthorized_for_every_operation() {
    let router = Router::new().fallback(|| async { StatusCode::UNAUTHORIZED });
    let addr = spawn(router).await;
    let api = client(addr, "wrong");

    let results = vec![
        api.get_server_info().await,
        api.get_players().await,
        api.announce("hi").await,
        api.kick_player("steam_1").await,
        api.ban_player("steam_1").await,
        api.unban_player("steam_1").await,
        api.save_world().await,
        api.shutdown(1, "bye").await,
        api.stop().await,
    ];
    for result in results {
        let err = result.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unauthorized);
        assert_eq!(err.detail, "check credentials");
    }
}

#[tokio::test]
async fn refused_connection_is_connection_failed() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind failed");
    let addr = listener.local_addr().expect("no local addr");
    drop(listener);

    let err = client(addr, "secret").get_players().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ConnectionFailed);
}

#[tokio::test]
async fn slow_server_is_timeout() {
    let router = Router::new().route(
        "/v1/api/info",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            StatusCode::OK
        }),
    );
    let addr = spawn(router).await;
    let connection = Connection::new("127.0.0.1", addr.port(), "secret").expect("connection");
    let api = AdminApiClient::with_timeout(connection, Duration::from_millis(200)).expect("client");

    let err = api.get_server_info().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Timeout);
}

#[tokio::test]
async fn truncated_body_is_unknown() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind failed");
    let addr = listener.local_addr().expect("no local addr");
    std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept failed");
        let mut request = [0u8; 1024];
        let _ = stream.read(&mut request);
        let _ = stream.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nshort");
    });

    let err = client(addr, "secret").get_players().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Unknown);
}
