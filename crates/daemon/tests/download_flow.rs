//! The ordered download protocol and file removal.

mod common;

use axum::http::{Method, StatusCode};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::json;

use ::common::crypto::{metadata_checksum, sha256_base64};
use ::common::prelude::RequestSigner;

const PAYLOAD: &[u8] = b"a file that spans a few chunks";
const DOWNLOAD_ID: &str = "x-download-id";

/// Open a bucket and upload `PAYLOAD` into it. Returns the file uuid.
async fn with_file() -> (common::TestServer, RequestSigner, String) {
    let server = common::setup_server().await;
    let key = server.create_bucket("b", "pw").await;
    let signer = server.open_bucket(&key, "pw").await;

    let body = common::json_bytes(json!({ "upSpeed": 1.0, "fileSize": PAYLOAD.len() }));
    let response = server
        .signed(&signer, Method::POST, "/api/v1/private/file/upload/init", body)
        .await;
    let plan = common::json_body(response).await;
    let upload_id = plan["uploadID"].as_str().unwrap();

    for (index, chunk) in PAYLOAD.chunks(common::TEST_CHUNK_SIZE as usize).enumerate() {
        let uri =
            format!("/api/v1/private/file/upload/part?upload_id={upload_id}&chunk_id={index}");
        let response = server
            .signed(&signer, Method::POST, &uri, chunk.to_vec())
            .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    let metadata = STANDARD.encode(b"sealed name and mime type");
    let body = common::json_bytes(json!({
        "uploadID": upload_id,
        "encFileInfo": "aW5mbw==",
        "encFileInfoNonce": "bm9uY2U=",
        "metaChecksum": metadata_checksum(&metadata).unwrap(),
        "metadata": metadata,
        "metaNonce": "bW4=",
        "dataChecksum": sha256_base64(PAYLOAD),
    }));
    let response = server
        .signed(&signer, Method::POST, "/api/v1/private/file/upload/complete", body)
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let file_uuid = common::json_body(response).await["fileUUID"]
        .as_str()
        .unwrap()
        .to_string();

    (server, signer, file_uuid)
}

async fn start(server: &common::TestServer, signer: &RequestSigner, file_uuid: &str) -> String {
    let uri = format!("/api/v1/private/file/download/init?file_id={file_uuid}");
    let response = server.signed(signer, Method::GET, &uri, Vec::new()).await;
    assert_eq!(response.status(), StatusCode::OK);
    let header = response
        .headers()
        .get(DOWNLOAD_ID)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let body = common::json_body(response).await;
    assert_eq!(body["downloadID"], header.as_str());
    header
}

async fn stage(
    server: &common::TestServer,
    signer: &RequestSigner,
    stage: &str,
    file_uuid: &str,
    download_id: &str,
) -> axum::response::Response {
    let uri = format!("/api/v1/private/file/download/{stage}?file_id={file_uuid}");
    let request = common::signed_request(
        signer,
        Method::GET,
        &uri,
        Vec::new(),
        common::now(),
        &[(DOWNLOAD_ID, download_id)],
    );
    server.send(request).await
}

#[tokio::test]
async fn test_download_in_order() {
    let (server, signer, file_uuid) = with_file().await;
    let download_id = start(&server, &signer, &file_uuid).await;

    let response = stage(&server, &signer, "data", &file_uuid, &download_id).await;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], PAYLOAD);

    let response = stage(&server, &signer, "meta", &file_uuid, &download_id).await;
    assert_eq!(response.status(), StatusCode::OK);
    let meta = common::json_body(response).await;
    assert_eq!(meta["encMeta"], STANDARD.encode(b"sealed name and mime type"));
    assert_eq!(meta["metaNonce"], "bW4=");

    let response = stage(&server, &signer, "digest", &file_uuid, &download_id).await;
    assert_eq!(response.status(), StatusCode::OK);
    let digest = common::json_body(response).await;
    assert_eq!(digest["dataChecksum"], sha256_base64(PAYLOAD));

    // every stage is spent
    for name in ["data", "meta", "digest"] {
        let response = stage(&server, &signer, name, &file_uuid, &download_id).await;
        assert_eq!(response.status(), StatusCode::CONFLICT, "{name}");
    }
}

#[tokio::test]
async fn test_download_in_order_over_tcp() {
    let (server, signer, file_uuid) = with_file().await;
    let addr = common::serve(&server).await;
    let client = reqwest::Client::new();

    let uri = format!("/api/v1/private/file/download/init?file_id={file_uuid}");
    let response = common::remote_get(&client, addr, &signer, &uri, &[]).await;
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let download_id = response
        .headers()
        .get(DOWNLOAD_ID)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let ids = [(DOWNLOAD_ID, download_id.as_str())];

    let uri = format!("/api/v1/private/file/download/data?file_id={file_uuid}");
    let response = common::remote_get(&client, addr, &signer, &uri, &ids).await;
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.content_length(), Some(PAYLOAD.len() as u64));
    assert_eq!(&response.bytes().await.unwrap()[..], PAYLOAD);

    let uri = format!("/api/v1/private/file/download/meta?file_id={file_uuid}");
    let response = common::remote_get(&client, addr, &signer, &uri, &ids).await;
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let meta: serde_json::Value = response.json().await.unwrap();
    assert_eq!(meta["metaNonce"], "bW4=");

    let uri = format!("/api/v1/private/file/download/digest?file_id={file_uuid}");
    let response = common::remote_get(&client, addr, &signer, &uri, &ids).await;
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let digest: serde_json::Value = response.json().await.unwrap();
    assert_eq!(digest["dataChecksum"], sha256_base64(PAYLOAD));
}

#[tokio::test]
async fn test_stages_cannot_be_skipped() {
    let (server, signer, file_uuid) = with_file().await;
    let download_id = start(&server, &signer, &file_uuid).await;

    let response = stage(&server, &signer, "meta", &file_uuid, &download_id).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = common::json_body(response).await;
    assert_eq!(body["error"], "StageViolation");
    assert_eq!(body["message"], "bad stage");

    let response = stage(&server, &signer, "digest", &file_uuid, &download_id).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // the failed attempts did not disturb the download
    let response = stage(&server, &signer, "data", &file_uuid, &download_id).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_download_requires_matching_ids() {
    let (server, signer, file_uuid) = with_file().await;
    let download_id = start(&server, &signer, &file_uuid).await;

    let response = stage(&server, &signer, "data", &file_uuid, "unknown").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let other_file = uuid::Uuid::new_v4().to_string();
    let response = stage(&server, &signer, "data", &other_file, &download_id).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // missing download id header
    let uri = format!("/api/v1/private/file/download/data?file_id={file_uuid}");
    let response = server.signed(&signer, Method::GET, &uri, Vec::new()).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_other_bucket_cannot_download() {
    let (server, signer, file_uuid) = with_file().await;
    let download_id = start(&server, &signer, &file_uuid).await;

    let other_key = server.create_bucket("other", "pw").await;
    let other = server.open_bucket(&other_key, "pw").await;

    let uri = format!("/api/v1/private/file/download/init?file_id={file_uuid}");
    let response = server.signed(&other, Method::GET, &uri, Vec::new()).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = stage(&server, &other, "data", &file_uuid, &download_id).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_file() {
    let (server, signer, file_uuid) = with_file().await;

    let uri = format!("/api/v1/private/file/delete?file_id={file_uuid}");
    let response = server.signed(&signer, Method::DELETE, &uri, Vec::new()).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = server
        .signed(&signer, Method::GET, "/api/v1/private/file/list", Vec::new())
        .await;
    assert_eq!(common::json_body(response).await, json!([]));

    let response = server.signed(&signer, Method::DELETE, &uri, Vec::new()).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let uri = format!("/api/v1/private/file/download/init?file_id={file_uuid}");
    let response = server.signed(&signer, Method::GET, &uri, Vec::new()).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    assert!(!server.state.storage().exists(&file_uuid).await.unwrap());
}
