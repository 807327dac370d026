//! Shared harness for driving the full router in-process.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use opaque_ke::{
    ClientLogin, ClientLoginFinishParameters, ClientRegistration,
    ClientRegistrationFinishParameters, CredentialResponse, Identifiers, RegistrationResponse,
};
use rand::rngs::OsRng;
use serde_json::{json, Value};
use tempfile::TempDir;
use time::OffsetDateTime;
use tower::ServiceExt;

use ::common::crypto::pake::generate_server_setup;
use ::common::prelude::{PlannerConfig, RequestSigner, XferSuite};
use object_store::ObjectStoreConfig;
use xfer_daemon::service_config::ProtocolConfig;
use xfer_daemon::{ServiceConfig, ServiceState};

pub const SERVER_ID: &str = "xfer-test-server";
/// Chunk size the harness plans with, so multi-chunk uploads stay small.
pub const TEST_CHUNK_SIZE: u64 = 8;

pub struct TestServer {
    pub state: ServiceState,
    router: Router,
    _work_dir: TempDir,
}

pub async fn setup_server() -> TestServer {
    let work_dir = TempDir::new().unwrap();

    let protocol = ProtocolConfig {
        planner: PlannerConfig {
            base_chunk_size: TEST_CHUNK_SIZE,
            ..Default::default()
        },
        ..Default::default()
    };

    let config = ServiceConfig {
        listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        server_id: SERVER_ID.to_string(),
        server_setup: Arc::new(generate_server_setup()),
        object_store: ObjectStoreConfig::Memory,
        sqlite_path: None,
        work_dir: work_dir.path().join("work"),
        protocol,
        log_level: tracing::Level::DEBUG,
        log_dir: None,
    };

    let state = ServiceState::from_config(&config).await.unwrap();
    let router = xfer_daemon::http_server::router(state.clone());

    TestServer {
        state,
        router,
        _work_dir: work_dir,
    }
}

pub async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap()
}

pub fn now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

impl TestServer {
    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = self.send(request).await;
        (response.status(), json_body(response).await)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header("accept", "application/json")
            .body(Body::empty())
            .unwrap();
        let response = self.send(request).await;
        (response.status(), json_body(response).await)
    }

    /// Run both registration round trips. Returns the new bucket key.
    pub async fn create_bucket(&self, name: &str, password: &str) -> String {
        let start = ClientRegistration::<XferSuite>::start(&mut OsRng, password.as_bytes()).unwrap();
        let (status, s1) = self
            .post_json(
                "/api/v1/public/bucket/create/s1",
                json!({ "s1Req": STANDARD.encode(start.message.serialize()) }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{s1}");

        let s2_req = registration_upload(start.state, password, name, &s1);
        let (status, s2) = self
            .post_json(
                "/api/v1/public/bucket/create/s2",
                json!({
                    "bucName": name,
                    "s2Req": s2_req,
                    "reqID": s1["reqID"],
                    "cipher": "aes-256-gcm",
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{s2}");
        assert_eq!(s2["name"], name);
        s2["bucketKey"].as_str().unwrap().to_string()
    }

    /// Run both login round trips and return a signer for the new session.
    pub async fn open_bucket(&self, bucket_key: &str, password: &str) -> RequestSigner {
        let login = self.begin_login(bucket_key, password).await;
        let login_id = login.login_id.clone();
        let (ke3, session_key) = login.finish(password).unwrap();

        let (status, s2) = self
            .post_json(
                "/api/v1/public/bucket/open/s2",
                json!({ "ke3": ke3, "loginID": login_id }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{s2}");
        assert_eq!(s2["sessionID"], login_id.as_str());

        RequestSigner::new(s2["sessionID"].as_str().unwrap(), session_key)
    }

    /// Login step one only.
    pub async fn begin_login(&self, bucket_key: &str, password: &str) -> PendingLogin {
        let start = ClientLogin::<XferSuite>::start(&mut OsRng, password.as_bytes()).unwrap();
        let (status, s1) = self
            .post_json(
                "/api/v1/public/bucket/open/s1",
                json!({
                    "bucketKey": bucket_key,
                    "ke1": STANDARD.encode(start.message.serialize()),
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{s1}");

        PendingLogin {
            state: start.state,
            ke2: STANDARD.decode(s1["ke2"].as_str().unwrap()).unwrap(),
            client_id: s1["clientID"].as_str().unwrap().to_string(),
            login_id: s1["loginID"].as_str().unwrap().to_string(),
        }
    }

    /// Send a request signed at the current time.
    pub async fn signed(
        &self,
        signer: &RequestSigner,
        method: Method,
        uri: &str,
        body: Vec<u8>,
    ) -> Response {
        self.send(signed_request(signer, method, uri, body, now(), &[]))
            .await
    }
}

pub struct PendingLogin {
    state: ClientLogin<XferSuite>,
    ke2: Vec<u8>,
    pub client_id: String,
    pub login_id: String,
}

impl PendingLogin {
    /// Finish the client side. Returns base64 KE3 and the session key, or
    /// `None` when the password does not match.
    pub fn finish(self, password: &str) -> Option<(String, Vec<u8>)> {
        let response = CredentialResponse::<XferSuite>::deserialize(&self.ke2).unwrap();
        let finished = self
            .state
            .finish(
                password.as_bytes(),
                response,
                ClientLoginFinishParameters::new(
                    None,
                    Identifiers {
                        client: Some(self.client_id.as_bytes()),
                        server: Some(SERVER_ID.as_bytes()),
                    },
                    None,
                ),
            )
            .ok()?;
        Some((
            STANDARD.encode(finished.message.serialize()),
            finished.session_key.to_vec(),
        ))
    }
}

fn registration_upload(
    state: ClientRegistration<XferSuite>,
    password: &str,
    name: &str,
    s1: &Value,
) -> String {
    let response = RegistrationResponse::<XferSuite>::deserialize(
        &STANDARD.decode(s1["s1Resp"].as_str().unwrap()).unwrap(),
    )
    .unwrap();
    let server_id = s1["serverID"].as_str().unwrap();

    let finished = state
        .finish(
            &mut OsRng,
            password.as_bytes(),
            response,
            ClientRegistrationFinishParameters::new(
                Identifiers {
                    client: Some(name.as_bytes()),
                    server: Some(server_id.as_bytes()),
                },
                None,
            ),
        )
        .unwrap();
    STANDARD.encode(finished.message.serialize())
}

/// Build a request carrying the four auth headers. Chunk routes ignore
/// the JSON content type.
pub fn signed_request(
    signer: &RequestSigner,
    method: Method,
    uri: &str,
    body: Vec<u8>,
    timestamp: i64,
    extra_headers: &[(&str, &str)],
) -> Request<Body> {
    let (path, query) = uri.split_once('?').unwrap_or((uri, ""));
    let headers = signer
        .sign(method.as_str(), path, query, &body, timestamp)
        .unwrap();

    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    for (name, value) in headers.pairs() {
        builder = builder.header(name, value);
    }
    for (name, value) in extra_headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::from(body)).unwrap()
}

/// Serve the router on a loopback socket so responses go through a real
/// HTTP connection. The server task lives until the runtime shuts down.
pub async fn serve(server: &TestServer) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = server.router.clone();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Signed GET over a real connection.
pub async fn remote_get(
    client: &reqwest::Client,
    addr: SocketAddr,
    signer: &RequestSigner,
    uri: &str,
    extra_headers: &[(&str, &str)],
) -> reqwest::Response {
    let (path, query) = uri.split_once('?').unwrap_or((uri, ""));
    let headers = signer.sign("GET", path, query, &[], now()).unwrap();

    let mut request = client.get(format!("http://{addr}{uri}"));
    for (name, value) in headers.pairs() {
        request = request.header(name, value);
    }
    for (name, value) in extra_headers {
        request = request.header(*name, *value);
    }
    request.send().await.unwrap()
}

pub fn json_bytes(value: Value) -> Vec<u8> {
    value.to_string().into_bytes()
}
