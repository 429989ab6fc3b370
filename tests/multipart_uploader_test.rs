//! Multipart orchestrator integration tests
//!
//! Drives full multipart attempts against a mock control plane and a mock
//! object store: manifest content and ordering, per-part retries, the
//! missing-ETag protocol violation, cancellation, and transport parity.

use bytes::Bytes;
use kappa_upload::config::{RetryTuning, UploadTuning};
use kappa_upload::remote::RemoteClient;
use kappa_upload::session::Credentials;
use kappa_upload::transport::{DirectTransport, ObjectTransport, ProxiedTransport};
use kappa_upload::upload::multipart::{MultipartUploader, MIN_PART_SIZE};
use kappa_upload::upload::UploadError;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn create_test_uploader(
    control_plane: &MockServer,
    transport: Arc<dyn ObjectTransport>,
) -> MultipartUploader {
    let retry = RetryTuning {
        max_attempts: 3,
        delays_ms: vec![],
    };
    let remote = Arc::new(RemoteClient::from_client(
        reqwest::Client::new(),
        control_plane.uri(),
        retry.clone(),
    ));
    let tuning = UploadTuning {
        multipart_threshold: MIN_PART_SIZE,
        part_size: MIN_PART_SIZE,
        concurrent_parts: 4,
    };
    MultipartUploader::new(remote, transport, &tuning, retry)
}

/// Mount the multipart-upload-urls endpoint answering with `part_count`
/// store-backed part URLs and a completion URL.
async fn mount_multipart_urls(control_plane: &MockServer, store: &MockServer, part_count: usize) {
    let part_urls: Vec<_> = (1..=part_count)
        .map(|n| format!("{}/part-{n}", store.uri()))
        .collect();
    Mock::given(method("GET"))
        .and(path("/files/multipart-upload-urls"))
        .and(query_param("count", part_count.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "urls": {
                "objectKey": "staged/big-object",
                "partURLs": part_urls,
                "completeURL": format!("{}/complete", store.uri()),
            }
        })))
        .expect(1)
        .mount(control_plane)
        .await;
}

/// Three 5MB-part payload: 5MB + 5MB + 1MB
fn three_part_payload() -> Bytes {
    Bytes::from(vec![b'x'; MIN_PART_SIZE * 2 + MIN_PART_SIZE / 5])
}

#[tokio::test]
async fn test_manifest_lists_parts_in_order_regardless_of_completion_order() {
    let control_plane = MockServer::start().await;
    let store = MockServer::start().await;

    mount_multipart_urls(&control_plane, &store, 3).await;

    // Part 1 finishes last; the manifest must still lead with it.
    Mock::given(method("PUT"))
        .and(path("/part-1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"e1\"")
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&store)
        .await;
    for (part, etag) in [(2, "\"e2\""), (3, "\"e3\"")] {
        Mock::given(method("PUT"))
            .and(path(format!("/part-{part}")))
            .respond_with(ResponseTemplate::new(200).insert_header("ETag", etag))
            .expect(1)
            .mount(&store)
            .await;
    }

    Mock::given(method("POST"))
        .and(path("/complete"))
        .and(header("content-type", "text/xml"))
        .and(body_string(
            "<CompleteMultipartUpload>\n\
             <Part><PartNumber>1</PartNumber><ETag>\"e1\"</ETag></Part>\n\
             <Part><PartNumber>2</PartNumber><ETag>\"e2\"</ETag></Part>\n\
             <Part><PartNumber>3</PartNumber><ETag>\"e3\"</ETag></Part>\n\
             </CompleteMultipartUpload>",
        ))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&store)
        .await;

    let transport = Arc::new(DirectTransport::new().unwrap());
    let uploader = create_test_uploader(&control_plane, transport);

    let object = uploader
        .upload(
            three_part_payload(),
            &Credentials::account("t"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(object.object_key, "staged/big-object");
}

#[tokio::test]
async fn test_single_part_upload_uses_the_general_flow() {
    let control_plane = MockServer::start().await;
    let store = MockServer::start().await;

    mount_multipart_urls(&control_plane, &store, 1).await;

    Mock::given(method("PUT"))
        .and(path("/part-1"))
        .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"only\""))
        .expect(1)
        .mount(&store)
        .await;

    Mock::given(method("POST"))
        .and(path("/complete"))
        .and(body_string(
            "<CompleteMultipartUpload>\n\
             <Part><PartNumber>1</PartNumber><ETag>\"only\"</ETag></Part>\n\
             </CompleteMultipartUpload>",
        ))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&store)
        .await;

    let transport = Arc::new(DirectTransport::new().unwrap());
    let uploader = create_test_uploader(&control_plane, transport);

    let object = uploader
        .upload(
            Bytes::from(vec![b'x'; MIN_PART_SIZE / 2]),
            &Credentials::account("t"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(object.object_key, "staged/big-object");
}

#[tokio::test]
async fn test_part_retries_reuse_the_same_url() {
    let control_plane = MockServer::start().await;
    let store = MockServer::start().await;

    mount_multipart_urls(&control_plane, &store, 1).await;

    // Two transient failures, then success, all on the same pre-signed URL.
    Mock::given(method("PUT"))
        .and(path("/part-1"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&store)
        .await;
    Mock::given(method("PUT"))
        .and(path("/part-1"))
        .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"recovered\""))
        .expect(1)
        .mount(&store)
        .await;

    Mock::given(method("POST"))
        .and(path("/complete"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&store)
        .await;

    let transport = Arc::new(DirectTransport::new().unwrap());
    let uploader = create_test_uploader(&control_plane, transport);

    let result = uploader
        .upload(
            Bytes::from(vec![b'x'; MIN_PART_SIZE / 2]),
            &Credentials::account("t"),
            &CancellationToken::new(),
        )
        .await;

    assert!(result.is_ok());
}

#[tokio::test]
async fn test_part_without_etag_fails_without_completion() {
    let control_plane = MockServer::start().await;
    let store = MockServer::start().await;

    mount_multipart_urls(&control_plane, &store, 1).await;

    Mock::given(method("PUT"))
        .and(path("/part-1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&store)
        .await;

    Mock::given(method("POST"))
        .and(path("/complete"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&store)
        .await;

    let transport = Arc::new(DirectTransport::new().unwrap());
    let uploader = create_test_uploader(&control_plane, transport);

    let result = uploader
        .upload(
            Bytes::from(vec![b'x'; MIN_PART_SIZE / 2]),
            &Credentials::account("t"),
            &CancellationToken::new(),
        )
        .await;

    assert!(matches!(
        result,
        Err(UploadError::MissingPartEtag { part_number: 1 })
    ));
}

#[tokio::test]
async fn test_failed_part_reports_its_part_number() {
    let control_plane = MockServer::start().await;
    let store = MockServer::start().await;

    mount_multipart_urls(&control_plane, &store, 3).await;

    for part in [1, 3] {
        Mock::given(method("PUT"))
            .and(path(format!("/part-{part}")))
            .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"ok\""))
            .mount(&store)
            .await;
    }
    // Part 2 is rejected outright; 403 is not retried.
    Mock::given(method("PUT"))
        .and(path("/part-2"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&store)
        .await;

    Mock::given(method("POST"))
        .and(path("/complete"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&store)
        .await;

    let transport = Arc::new(DirectTransport::new().unwrap());
    let uploader = create_test_uploader(&control_plane, transport);

    let result = uploader
        .upload(
            three_part_payload(),
            &Credentials::account("t"),
            &CancellationToken::new(),
        )
        .await;

    assert!(matches!(
        result,
        Err(UploadError::Part { part_number: 2, .. })
    ));
}

#[tokio::test]
async fn test_cancellation_reports_failure_and_skips_completion() {
    let control_plane = MockServer::start().await;
    let store = MockServer::start().await;

    mount_multipart_urls(&control_plane, &store, 3).await;

    for part in [1, 2] {
        Mock::given(method("PUT"))
            .and(path(format!("/part-{part}")))
            .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"ok\""))
            .mount(&store)
            .await;
    }
    // Part 3 never finishes before the caller gives up.
    Mock::given(method("PUT"))
        .and(path("/part-3"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"late\"")
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&store)
        .await;

    Mock::given(method("POST"))
        .and(path("/complete"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&store)
        .await;

    let transport = Arc::new(DirectTransport::new().unwrap());
    let uploader = create_test_uploader(&control_plane, transport);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let result = uploader
        .upload(three_part_payload(), &Credentials::account("t"), &cancel)
        .await;

    assert!(matches!(result, Err(UploadError::Cancelled)));
}

#[tokio::test]
async fn test_proxied_upload_reaches_the_same_outcome() {
    let control_plane = MockServer::start().await;
    let store = MockServer::start().await;
    let worker = MockServer::start().await;

    mount_multipart_urls(&control_plane, &store, 1).await;

    // All traffic goes to the worker, which forwards to the real URLs.
    Mock::given(method("PUT"))
        .and(path("/multipart-upload"))
        .and(header("UPLOAD-URL", format!("{}/part-1", store.uri()).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"etag": "\"via-worker\""})))
        .expect(1)
        .mount(&worker)
        .await;

    Mock::given(method("POST"))
        .and(path("/multipart-complete"))
        .and(header("UPLOAD-URL", format!("{}/complete", store.uri()).as_str()))
        .and(body_string(
            "<CompleteMultipartUpload>\n\
             <Part><PartNumber>1</PartNumber><ETag>\"via-worker\"</ETag></Part>\n\
             </CompleteMultipartUpload>",
        ))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&worker)
        .await;

    let transport = Arc::new(ProxiedTransport::new(worker.uri()).unwrap());
    let uploader = create_test_uploader(&control_plane, transport);

    let object = uploader
        .upload(
            Bytes::from(vec![b'x'; MIN_PART_SIZE / 2]),
            &Credentials::account("t"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    // Same completed-object outcome as the direct path; only the origin
    // receiving the bytes differs.
    assert_eq!(object.object_key, "staged/big-object");
}
