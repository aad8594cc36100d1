//! Integration tests for the upload and release HTTP endpoints.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use bytes::Bytes;
use depot_storage::ObjectStore;
use common::{
    TestServer, addon_body, game_version_body, json_request, patch_body, raw_request,
    seeded_bytes, sha256_hex, split_chunks, start_body,
};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

/// Upload `data` in `n` chunks and return the upload id.
async fn upload_file(server: &TestServer, data: &Bytes, n: usize) -> String {
    let upload_id = server.start_upload(data.len(), n).await;
    server.put_chunks(&upload_id, &split_chunks(data, n)).await;
    upload_id
}

// =============================================================================
// Start
// =============================================================================

#[tokio::test]
async fn test_start_upload_returns_id_and_expiry() {
    let server = TestServer::new().await;

    let (status, body) = json_request(
        &server.router,
        "POST",
        "/v1/uploads",
        Some(start_body("game.zip", 300, 3)),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert!(Uuid::parse_str(body["upload_id"].as_str().unwrap()).is_ok());
    assert_eq!(body["total_chunks"], 3);
    assert!(body["expires_at"].is_string());
}

#[tokio::test]
async fn test_start_upload_rejects_invalid_arguments() {
    let server = TestServer::new().await;

    let mut cases = vec![
        start_body("game.zip", 0, 1),
        start_body("game.zip", 10, 0),
        start_body("", 10, 1),
        start_body("game.zip", 2, 3),
    ];
    let mut bad_owner = start_body("game.zip", 10, 1);
    bad_owner["owner_id"] = json!("not-a-uuid");
    cases.push(bad_owner);
    let mut bad_type = start_body("game.zip", 10, 1);
    bad_type["content_type"] = json!("");
    cases.push(bad_type);
    let mut bad_hash = start_body("game.zip", 10, 1);
    bad_hash["sha256"] = json!("xyz");
    cases.push(bad_hash);
    let mut signed_hash = start_body("game.zip", 10, 1);
    signed_hash["sha256"] = json!("+f".repeat(32));
    cases.push(signed_hash);

    for case in cases {
        let (status, body) = json_request(&server.router, "POST", "/v1/uploads", Some(case.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "accepted {case}");
        assert_eq!(body["code"], "invalid_argument");
    }
    assert!(server.state.pipeline.sessions().is_empty());
}

#[tokio::test]
async fn test_start_upload_rejects_malformed_json() {
    let server = TestServer::new().await;
    let (status, body) = raw_request(
        &server.router,
        "POST",
        "/v1/uploads",
        Body::from("{not json"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_argument");
}

// =============================================================================
// Chunks
// =============================================================================

#[tokio::test]
async fn test_chunk_receipt_tracks_progress() {
    let server = TestServer::new().await;
    let upload_id = server.start_upload(6, 3).await;

    let (status, body) = server.put_chunk(&upload_id, 2, Bytes::from_static(b"cd")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["chunk_number"], 2);
    assert_eq!(body["received_count"], 1);
    assert_eq!(body["complete"], false);

    // Re-sending does not double count
    let (_, body) = server.put_chunk(&upload_id, 2, Bytes::from_static(b"cd")).await;
    assert_eq!(body["received_count"], 1);

    server.put_chunk(&upload_id, 1, Bytes::from_static(b"ab")).await;
    let (_, body) = server.put_chunk(&upload_id, 3, Bytes::from_static(b"ef")).await;
    assert_eq!(body["received_count"], 3);
    assert_eq!(body["complete"], true);

    let (status, body) = server.upload_status(&upload_id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "open");
    assert_eq!(body["received_chunks"], json!([1, 2, 3]));
    assert_eq!(body["missing_chunks"], json!([]));
}

#[tokio::test]
async fn test_chunk_validation() {
    let server = TestServer::new().await;
    let upload_id = server.start_upload(6, 3).await;

    // Chunk number out of range
    let (status, body) = server.put_chunk(&upload_id, 4, Bytes::from_static(b"ab")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_argument");
    let (status, _) = server.put_chunk(&upload_id, 0, Bytes::from_static(b"ab")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Empty chunk
    let (status, _) = server.put_chunk(&upload_id, 1, Bytes::new()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Declared size disagrees with body
    let (status, _) = raw_request(
        &server.router,
        "PUT",
        &format!("/v1/uploads/{upload_id}/chunks/1?chunk_size=5"),
        Body::from("ab"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Missing declared size
    let (status, _) = raw_request(
        &server.router,
        "PUT",
        &format!("/v1/uploads/{upload_id}/chunks/1"),
        Body::from("ab"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Would exceed the declared file size
    let (status, _) = server
        .put_chunk(&upload_id, 1, Bytes::from_static(b"abcdefg"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = server.upload_status(&upload_id).await;
    assert_eq!(body["received_chunks"], json!([]));
}

#[tokio::test]
async fn test_chunk_larger_than_limit_rejected() {
    let server = TestServer::with_config(|c| c.server.max_chunk_size = 8).await;
    let upload_id = server.start_upload(32, 2).await;

    let (status, body) = server.put_chunk(&upload_id, 1, seeded_bytes(1, 16)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_argument");
}

#[tokio::test]
async fn test_unknown_and_malformed_upload_ids() {
    let server = TestServer::new().await;
    let unknown = Uuid::new_v4();

    let (status, body) = server.upload_status(&unknown.to_string()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");

    let (status, _) = server
        .put_chunk(&unknown.to_string(), 1, Bytes::from_static(b"x"))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = server.upload_status("not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Completion
// =============================================================================

#[tokio::test]
async fn test_scenario_out_of_order_game_version() {
    let server = TestServer::new().await;
    let data = seeded_bytes(42, 300);
    let chunks = split_chunks(&data, 3);

    let upload_id = server.start_upload(300, 3).await;
    for n in [2usize, 1, 3] {
        let (status, _) = server
            .put_chunk(&upload_id, n as u32, chunks[n - 1].clone())
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = server
        .complete(&upload_id, game_version_body("stellar-drift", "1.0.0"))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["kind"], "full_version");
    assert_eq!(body["product_id"], "stellar-drift");
    assert_eq!(body["file_size"], 300);
    assert_eq!(body["hash"], sha256_hex(&data));
    assert_eq!(body["upload_id"], upload_id);
    let files = body["files"].as_array().unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0]["file_name"], "stellar-drift-1.0.0.zip");
    assert_eq!(files[0]["is_archive"], true);

    // The blob holds exactly the chunks in order
    let key = body["blob_key"].as_str().unwrap();
    assert_eq!(
        key,
        format!("releases/stellar-drift/windows/1.0.0/{upload_id}/stellar-drift-1.0.0.zip")
    );
    assert_eq!(server.blobs().get(key).await.unwrap(), data);

    let (_, status_body) = server.upload_status(&upload_id).await;
    assert_eq!(status_body["status"], "completed");

    // Readable through the catalog
    let (status, release) = json_request(
        &server.router,
        "GET",
        "/v1/releases/stellar-drift/windows/1.0.0",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(release["version_id"], body["version_id"]);
    assert_eq!(release["hash"], sha256_hex(&data));
}

#[tokio::test]
async fn test_scenario_incomplete_upload_stays_open() {
    let server = TestServer::new().await;
    let upload_id = server.start_upload(4, 2).await;
    server.put_chunk(&upload_id, 1, Bytes::from_static(b"ab")).await;

    let (status, body) = server
        .complete(&upload_id, game_version_body("stellar-drift", "1.0.0"))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "incomplete_upload");

    let (_, body) = server.upload_status(&upload_id).await;
    assert_eq!(body["status"], "open");
    assert_eq!(body["missing_chunks"], json!([2]));

    // Finishing the upload makes completion succeed
    server.put_chunk(&upload_id, 2, Bytes::from_static(b"cd")).await;
    let (status, _) = server
        .complete(&upload_id, game_version_body("stellar-drift", "1.0.0"))
        .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_scenario_corrupted_chunk_fails_hash_check() {
    let server = TestServer::new().await;
    let upload_id = server.start_upload(8, 2).await;
    server
        .put_chunks(
            &upload_id,
            &[Bytes::from_static(b"abcd"), Bytes::from_static(b"efgh")],
        )
        .await;

    // Corrupt chunk 2 behind the server's back
    let key = format!("uploads/{upload_id}/chunks/00000002");
    server
        .scratch
        .put(&key, Bytes::from_static(b"EFGH"))
        .await
        .unwrap();

    let body = game_version_body("stellar-drift", "2.0.0");
    let (status, err) = server.complete(&upload_id, body).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(err["code"], "hash_mismatch");

    let blob_key = format!("releases/stellar-drift/windows/2.0.0/{upload_id}/stellar-drift-2.0.0.zip");
    assert!(!server.blobs().exists(&blob_key).await.unwrap());

    let (_, status_body) = server.upload_status(&upload_id).await;
    assert_eq!(status_body["status"], "aborted");

    let (status, _) = json_request(
        &server.router,
        "GET",
        "/v1/releases/stellar-drift/windows/2.0.0",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_scenario_patch_has_no_files() {
    let server = TestServer::new().await;
    let data = seeded_bytes(7, 64);
    let upload_id = upload_file(&server, &data, 2).await;

    let (status, body) = server
        .complete(&upload_id, patch_body("stellar-drift", Some("1.0"), Some("1.1")))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["kind"], "patch");
    assert_eq!(body["name"], "update.patch");
    assert_eq!(body["from_version"], "1.0");
    assert_eq!(body["to_version"], "1.1");
    assert!(body.get("files").is_none());

    let (status, patch) = json_request(
        &server.router,
        "GET",
        "/v1/patches/stellar-drift/windows/update.patch?from_version=1.0&to_version=1.1",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patch["patch_id"], body["patch_id"]);
    assert_eq!(patch["hash"], sha256_hex(&data));

    let (status, _) = json_request(
        &server.router,
        "GET",
        "/v1/patches/stellar-drift/windows/update.patch?from_version=2.0",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_addon_release() {
    let server = TestServer::new().await;
    let data = seeded_bytes(9, 40);
    let upload_id = upload_file(&server, &data, 1).await;

    let (status, body) = server
        .complete(&upload_id, addon_body("stellar-drift", Some("soundtrack"), "1.0"))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["kind"], "addon_version");
    assert_eq!(body["product_id"], "soundtrack");
    assert_eq!(body["base_game_id"], "stellar-drift");
    assert_eq!(body["files"][0]["is_archive"], false);

    let (status, release) =
        json_request(&server.router, "GET", "/v1/releases/soundtrack/linux/1.0", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(release["kind"], "addon_version");
}

#[tokio::test]
async fn test_declared_hash_mismatch_at_start() {
    let server = TestServer::new().await;
    let data = seeded_bytes(3, 20);

    let mut start = start_body("game.zip", 20, 2);
    start["sha256"] = json!(sha256_hex(b"something else"));
    let (_, body) = json_request(&server.router, "POST", "/v1/uploads", Some(start)).await;
    let upload_id = body["upload_id"].as_str().unwrap().to_string();
    server.put_chunks(&upload_id, &split_chunks(&data, 2)).await;

    let (status, err) = server
        .complete(&upload_id, game_version_body("stellar-drift", "3.0"))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(err["code"], "hash_mismatch");
    let files = server.blobs().list("releases/").await.unwrap();
    assert!(files.is_empty(), "blob left behind: {files:?}");
}

#[tokio::test]
async fn test_declared_hash_at_completion() {
    let server = TestServer::new().await;
    let data = seeded_bytes(4, 20);

    let upload_id = upload_file(&server, &data, 2).await;
    let mut body = game_version_body("stellar-drift", "3.1");
    body["sha256"] = json!(sha256_hex(&data));
    let (status, _) = server.complete(&upload_id, body).await;
    assert_eq!(status, StatusCode::CREATED);

    let upload_id = upload_file(&server, &data, 2).await;
    let mut body = game_version_body("stellar-drift", "3.2");
    body["sha256"] = json!(sha256_hex(b"nope"));
    let (status, err) = server.complete(&upload_id, body).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(err["code"], "hash_mismatch");
}

#[tokio::test]
async fn test_size_mismatch_when_chunks_fall_short() {
    let server = TestServer::new().await;
    // Declared 10 bytes, but the two chunks only carry 6
    let upload_id = server.start_upload(10, 2).await;
    server
        .put_chunks(
            &upload_id,
            &[Bytes::from_static(b"abc"), Bytes::from_static(b"def")],
        )
        .await;

    let (status, err) = server
        .complete(&upload_id, game_version_body("stellar-drift", "4.0"))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(err["code"], "size_mismatch");
    assert!(server.blobs().list("releases/").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_recompleting_is_invalid_state() {
    let server = TestServer::new().await;
    let upload_id = upload_file(&server, &seeded_bytes(5, 10), 1).await;

    let (status, _) = server
        .complete(&upload_id, game_version_body("stellar-drift", "5.0"))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, err) = server
        .complete(&upload_id, game_version_body("stellar-drift", "5.0"))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["code"], "invalid_state");

    // Chunks after completion are refused too
    let (status, err) = server
        .put_chunk(&upload_id, 1, Bytes::from_static(b"0123456789"))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["code"], "invalid_state");
}

// =============================================================================
// Abort
// =============================================================================

#[tokio::test]
async fn test_abort_deletes_chunks() {
    let server = TestServer::new().await;
    let upload_id = server.start_upload(4, 2).await;
    server.put_chunk(&upload_id, 1, Bytes::from_static(b"ab")).await;

    let (status, _) = json_request(
        &server.router,
        "DELETE",
        &format!("/v1/uploads/{upload_id}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(server.state.chunks.list_uploads().await.unwrap().is_empty());

    let (_, body) = server.upload_status(&upload_id).await;
    assert_eq!(body["status"], "aborted");

    let (status, err) = server
        .complete(&upload_id, game_version_body("stellar-drift", "1.0"))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["code"], "invalid_state");

    let (status, _) = json_request(
        &server.router,
        "DELETE",
        &format!("/v1/uploads/{upload_id}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

// =============================================================================
// Catalog
// =============================================================================

#[tokio::test]
async fn test_list_and_edit_releases() {
    let server = TestServer::new().await;
    for version in ["1.0", "1.1"] {
        let upload_id = upload_file(&server, &seeded_bytes(11, 30), 2).await;
        let (status, _) = server
            .complete(&upload_id, game_version_body("stellar-drift", version))
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, list) =
        json_request(&server.router, "GET", "/v1/releases/stellar-drift/windows", None).await;
    assert_eq!(status, StatusCode::OK);
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["version"], "1.1");
    assert_eq!(list[1]["version"], "1.0");

    let version_id = list[1]["version_id"].as_str().unwrap().to_string();
    let original_hash = list[1]["hash"].clone();
    let (status, updated) = json_request(
        &server.router,
        "PATCH",
        &format!("/v1/releases/versions/{version_id}"),
        Some(json!({
            "changelog": "Hotfix notes",
            "release_date": "2026-03-01T12:00:00Z",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{updated}");
    assert_eq!(updated["changelog"], "Hotfix notes");
    assert_eq!(updated["release_date"], "2026-03-01T12:00:00Z");
    assert_eq!(updated["hash"], original_hash);

    let (status, _) = json_request(
        &server.router,
        "PATCH",
        &format!("/v1/releases/versions/{}", Uuid::new_v4()),
        Some(json!({ "changelog": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_release_lookup_edge_cases() {
    let server = TestServer::new().await;

    let (status, body) =
        json_request(&server.router, "GET", "/v1/releases/nothing/windows/1.0", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");

    let (status, _) =
        json_request(&server.router, "GET", "/v1/releases/nothing/amiga/1.0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, list) =
        json_request(&server.router, "GET", "/v1/releases/nothing/linux", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list, Value::Array(vec![]));
}

#[tokio::test]
async fn test_republishing_version_creates_new_record() {
    let server = TestServer::new().await;
    let first = upload_file(&server, &seeded_bytes(1, 12), 1).await;
    let (_, a) = server
        .complete(&first, game_version_body("stellar-drift", "1.0"))
        .await;
    let second = upload_file(&server, &seeded_bytes(2, 12), 1).await;
    let (_, b) = server
        .complete(&second, game_version_body("stellar-drift", "1.0"))
        .await;

    assert_ne!(a["version_id"], b["version_id"]);
    assert_ne!(a["blob_key"], b["blob_key"]);

    let (_, latest) = json_request(
        &server.router,
        "GET",
        "/v1/releases/stellar-drift/windows/1.0",
        None,
    )
    .await;
    assert_eq!(latest["version_id"], b["version_id"]);

    // The first blob is untouched
    let first_key = a["blob_key"].as_str().unwrap();
    assert_eq!(
        server.blobs().get(first_key).await.unwrap(),
        seeded_bytes(1, 12)
    );
}

// =============================================================================
// Health and metrics
// =============================================================================

#[tokio::test]
async fn test_health_check() {
    let server = TestServer::new().await;
    let (status, body) = json_request(&server.router, "GET", "/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["blob_backend"], "filesystem");
    assert_eq!(body["scratch_backend"], "memory");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let server = TestServer::new().await;
    server.start_upload(10, 1).await;

    let request = Request::builder()
        .uri("/metrics")
        .body(Body::empty())
        .unwrap();
    let response = server.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let text = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(text.to_vec()).unwrap();
    assert!(text.contains("depot_uploads_started_total"));
}

#[tokio::test]
async fn test_metrics_endpoint_disabled() {
    let server = TestServer::with_config(|c| c.server.metrics_enabled = false).await;
    let (status, _) = json_request(&server.router, "GET", "/metrics", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
